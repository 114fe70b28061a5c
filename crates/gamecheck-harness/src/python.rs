//! The external CPython backend.
//!
//! Every interaction with the interpreter is a child process. Headless
//! rendering is configured per child through its environment, never by
//! mutating the host process environment.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Default interpreter executable.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Default bound on the bytes kept from each captured stream.
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// How the graphics library inside a child process should render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderingBackend {
    /// Dummy SDL video and audio drivers, no window is ever opened.
    #[default]
    Null,
    /// Whatever the host provides.
    Native,
}

impl FromStr for RenderingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "native" => Ok(Self::Native),
            other => Err(format!(
                "unknown rendering backend '{other}', supported: null, native"
            )),
        }
    }
}

/// A configured interpreter that can spawn child processes.
#[derive(Debug, Clone)]
pub struct Interpreter {
    program: String,
    rendering: RenderingBackend,
    max_capture_bytes: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

/// How a bounded child process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited (or was killed by a signal, `status` is then `None`).
    Finished {
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured standard output, lossily decoded.
        stdout: String,
        /// Captured standard error, lossily decoded.
        stderr: String,
    },
    /// The wall-clock deadline expired and the process was killed.
    TimedOut,
}

impl Interpreter {
    /// Use `program` (a name on `PATH` or a path) with the null rendering backend.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            rendering: RenderingBackend::Null,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }

    /// Keep at most `bytes` of each captured stream (the tail is kept).
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.max_capture_bytes = bytes;
        self
    }

    /// Select the rendering backend for spawned children.
    pub fn with_rendering(mut self, rendering: RenderingBackend) -> Self {
        self.rendering = rendering;
        self
    }

    /// The interpreter executable.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The rendering backend applied to children.
    pub fn rendering(&self) -> RenderingBackend {
        self.rendering
    }

    /// A command for this interpreter with the per-child environment applied.
    ///
    /// The host environment is inherited: interpreter shims and virtualenvs
    /// resolve through it.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.rendering == RenderingBackend::Null {
            cmd.env("SDL_VIDEODRIVER", "dummy")
                .env("SDL_AUDIODRIVER", "dummy")
                .env("PYGAME_HIDE_SUPPORT_PROMPT", "1");
        }
        cmd
    }

    /// Run the interpreter with `args`, capturing output, under a deadline.
    ///
    /// On expiry the child is killed and [`RunOutcome::TimedOut`] returned.
    /// Spawn failures surface as `Err`. Both streams are drained to the end
    /// but only their last `max_capture_bytes` are kept.
    pub async fn run<I, S>(
        &self,
        args: I,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> std::io::Result<RunOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_capture_bytes;

        // Dropping the future drops the child, and kill_on_drop reaps it.
        let finished = async move {
            let (stdout, stderr, status) = tokio::join!(
                capture_tail(stdout, limit),
                capture_tail(stderr, limit),
                child.wait()
            );
            Ok::<_, std::io::Error>(RunOutcome::Finished {
                status: status?.code(),
                stdout: String::from_utf8_lossy(&stdout?).into_owned(),
                stderr: String::from_utf8_lossy(&stderr?).into_owned(),
            })
        };
        match tokio::time::timeout(timeout, finished).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Ok(RunOutcome::TimedOut),
        }
    }

    /// Whether the interpreter can be spawned and runs a trivial program.
    pub async fn is_available(&self) -> bool {
        matches!(
            self.run(["-c", "import sys"], None, Duration::from_secs(10))
                .await,
            Ok(RunOutcome::Finished { status: Some(0), .. })
        )
    }
}

/// Read `reader` to the end, keeping only its last `limit` bytes.
async fn capture_tail<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
) -> std::io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        kept.extend_from_slice(&chunk[..n]);
        // amortized: trim only once the buffer doubles the limit
        if kept.len() > limit.saturating_mul(2).max(chunk.len()) {
            kept.drain(..kept.len() - limit);
        }
    }
    if kept.len() > limit {
        kept.drain(..kept.len() - limit);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_backend_parses() {
        assert_eq!("null".parse::<RenderingBackend>(), Ok(RenderingBackend::Null));
        assert_eq!(
            "native".parse::<RenderingBackend>(),
            Ok(RenderingBackend::Native)
        );
        let err = "opengl".parse::<RenderingBackend>().unwrap_err();
        assert!(err.contains("opengl"));
    }

    #[test]
    fn default_interpreter_is_headless_python3() {
        let interp = Interpreter::default();
        assert_eq!(interp.program(), DEFAULT_INTERPRETER);
        assert_eq!(interp.rendering(), RenderingBackend::Null);
    }

    #[test]
    fn null_backend_sets_dummy_drivers() {
        let cmd = Interpreter::new("python3").command();
        let envs: Vec<_> = cmd
            .as_std()
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect();
        assert!(envs.contains(&("SDL_VIDEODRIVER".into(), "dummy".into())));
        assert!(envs.contains(&("PYTHONUNBUFFERED".into(), "1".into())));
    }

    #[test]
    fn native_backend_leaves_drivers_alone() {
        let cmd = Interpreter::new("python3")
            .with_rendering(RenderingBackend::Native)
            .command();
        assert!(!cmd
            .as_std()
            .get_envs()
            .any(|(k, _)| k == "SDL_VIDEODRIVER"));
    }

    #[tokio::test]
    async fn capture_keeps_the_tail() {
        let text = b"line one\nline two\nTraceback: ValueError: boom\n";
        let kept = capture_tail(Some(&text[..]), 17).await.unwrap();
        assert_eq!(kept, b"ValueError: boom\n");

        let whole = capture_tail(Some(&text[..]), 1024).await.unwrap();
        assert_eq!(whole, text);
        assert!(capture_tail(None::<&[u8]>, 16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noisy_child_output_is_bounded() {
        let python = Interpreter::default().with_capture_limit(1024);
        if !python.is_available().await {
            eprintln!("skipping: '{}' is not available", python.program());
            return;
        }
        let script = "import sys\nfor _ in range(20000):\n    print('x' * 80)\nsys.stderr.write('done\\n')\nprint('last line')\n";
        let outcome = python
            .run(["-c", script], None, Duration::from_secs(20))
            .await
            .unwrap();
        match outcome {
            RunOutcome::Finished {
                status,
                stdout,
                stderr,
            } => {
                assert_eq!(status, Some(0));
                assert!(stdout.len() <= 1024, "kept {} bytes", stdout.len());
                assert!(stdout.ends_with("last line\n"), "{stdout}");
                assert_eq!(stderr, "done\n");
            }
            RunOutcome::TimedOut => panic!("noisy child timed out"),
        }
    }

    #[tokio::test]
    async fn missing_interpreter_is_spawn_error() {
        let interp = Interpreter::new("/nonexistent/gamecheck/python");
        let result = interp
            .run(["-c", "pass"], None, Duration::from_secs(1))
            .await;
        assert!(result.is_err());
        assert!(!interp.is_available().await);
    }
}
