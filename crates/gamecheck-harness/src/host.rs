//! SandboxHost: parent-side management of the sandbox worker process.
//!
//! Each load gets its own temporary directory and its own `python worker.py`
//! child. The neutralized artifact executes inside the child, and the parent
//! talks to it over length-delimited JSON IPC on stdin/stdout. Every wait is
//! bounded; on expiry the child is killed, so nothing outlives its deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::error::SandboxError;
use crate::ipc::{read_message, write_message, ChildMessage, ParentMessage};
use crate::namespace::{
    Bindings, CallError, CallErrorKind, CallValue, Namespace, ObjectInfo, Target,
};
use crate::neutralize::{neutralize, NeutralizerRules};
use crate::python::Interpreter;
use crate::syntax::ParsedModule;

/// The worker script, written next to the artifact on every load.
pub const WORKER_SCRIPT: &str = include_str!("python/worker.py");

/// The pygame stand-in imported by the worker.
pub const PYGAME_STUB: &str = include_str!("python/pygame_stub.py");

/// Module name the artifact executes under.
pub const MODULE_NAME: &str = "gamecheck_artifact";

/// Environment variable that lets worker stderr through to the host.
pub const DEBUG_ENV: &str = "GAMECHECK_DEBUG";

/// Settings for [`SandboxHost::load`].
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter hosting the worker.
    pub interpreter: Interpreter,
    /// Deadline for executing the module body.
    pub load_timeout: Duration,
    /// Deadline for each namespace request.
    pub call_timeout: Duration,
    /// Install the list-based numpy stand-in when numpy is missing.
    pub stub_numpy: bool,
    /// Which constructs the neutralizer removes.
    pub neutralizer: NeutralizerRules,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::default(),
            load_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(5),
            stub_numpy: true,
            neutralizer: NeutralizerRules::default(),
        }
    }
}

/// Spawns sandbox workers.
pub struct SandboxHost;

impl SandboxHost {
    /// Neutralize `source`, execute it in a fresh worker and return its namespace.
    ///
    /// 1. Parses and neutralizes the artifact
    /// 2. Writes worker, stub and artifact into a fresh temporary directory
    /// 3. Spawns the worker and sends `Load`
    /// 4. Waits for `Loaded` under `load_timeout`, killing the worker on expiry
    #[tracing::instrument(skip_all, fields(bytes = source.len()))]
    pub async fn load(
        source: &str,
        config: &SandboxConfig,
    ) -> Result<SandboxNamespace, SandboxError> {
        let parsed = ParsedModule::parse(source).map_err(|e| SandboxError::Parse {
            message: e.to_string(),
        })?;
        let program = neutralize(&parsed, &config.neutralizer).map_err(|e| match e {
            gamecheck_error::ProbeError::Neutralize(message) => SandboxError::Neutralize { message },
            other => SandboxError::Execution(anyhow::Error::new(other)),
        })?;
        tracing::debug!(elisions = program.elisions().len(), "artifact neutralized");

        let workdir = tempfile::Builder::new()
            .prefix("gamecheck-sandbox-")
            .tempdir()
            .map_err(|e| SandboxError::Execution(anyhow::anyhow!("failed to create workdir: {}", e)))?;
        let artifact = workdir.path().join("artifact.py");
        for (path, contents) in [
            (workdir.path().join("worker.py"), WORKER_SCRIPT),
            (workdir.path().join("pygame_stub.py"), PYGAME_STUB),
            (artifact.clone(), program.source()),
        ] {
            tokio::fs::write(&path, contents).await.map_err(|e| {
                SandboxError::Execution(anyhow::anyhow!(
                    "failed to write {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        let mut child = config
            .interpreter
            .command()
            .args(["-B", "-u", "worker.py"])
            .current_dir(workdir.path())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(if std::env::var(DEBUG_ENV).is_ok() {
                std::process::Stdio::inherit()
            } else {
                std::process::Stdio::null()
            })
            .spawn()
            .map_err(|e| {
                SandboxError::Execution(anyhow::anyhow!(
                    "failed to spawn worker with '{}': {}",
                    config.interpreter.program(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Execution(anyhow::anyhow!("no stdin on child")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Execution(anyhow::anyhow!("no stdout on child")))?;
        let mut stdout = BufReader::new(stdout);

        let load_msg = ParentMessage::Load {
            artifact: artifact.to_string_lossy().into_owned(),
            module_name: MODULE_NAME.to_string(),
            stub_numpy: config.stub_numpy,
        };
        write_message(&mut stdin, &load_msg)
            .await
            .map_err(|e| SandboxError::Execution(anyhow::anyhow!("failed to send Load: {}", e)))?;

        let loaded = tokio::time::timeout(config.load_timeout, await_loaded(&mut stdout)).await;
        let bindings = match loaded {
            Ok(Ok(bindings)) => bindings,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_elapsed) => {
                let _ = child.kill().await;
                tracing::warn!(
                    timeout_ms = config.load_timeout.as_millis() as u64,
                    "module execution timed out, worker killed"
                );
                return Err(SandboxError::Timeout {
                    timeout_ms: config.load_timeout.as_millis() as u64,
                });
            }
        };
        tracing::debug!(bindings = bindings.len(), "module loaded");

        Ok(SandboxNamespace {
            child,
            stdin,
            stdout,
            bindings,
            call_timeout: config.call_timeout,
            alive: true,
            _workdir: workdir,
        })
    }
}

/// Read until the worker reports the outcome of `Load`.
async fn await_loaded(
    stdout: &mut BufReader<ChildStdout>,
) -> Result<Bindings, SandboxError> {
    loop {
        let msg: Option<ChildMessage> = read_message(stdout)
            .await
            .map_err(|e| SandboxError::Execution(anyhow::anyhow!("IPC read error: {}", e)))?;
        match msg {
            Some(ChildMessage::Loaded { result }) => {
                return result.map_err(|message| SandboxError::LoadFailed { message });
            }
            Some(ChildMessage::Log { message }) => {
                tracing::info!(target: "gamecheck::sandbox::worker", "{}", message);
            }
            Some(other) => {
                return Err(SandboxError::Execution(anyhow::anyhow!(
                    "unexpected message before Loaded: {:?}",
                    other
                )));
            }
            None => {
                // Hard exits (os._exit, a crashed interpreter) close stdout early.
                return Err(SandboxError::LoadFailed {
                    message: "worker exited during module execution".to_string(),
                });
            }
        }
    }
}

/// A loaded module living in a worker process.
///
/// Dropping the namespace kills the worker and removes its directory;
/// [`shutdown`](Self::shutdown) asks it to exit first.
pub struct SandboxNamespace {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    bindings: Bindings,
    call_timeout: Duration,
    alive: bool,
    _workdir: TempDir,
}

impl std::fmt::Debug for SandboxNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxNamespace")
            .field("bindings", &self.bindings.len())
            .field("alive", &self.alive)
            .finish()
    }
}

impl SandboxNamespace {
    /// Whether the worker is still answering requests.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Ask the worker to exit, then reap it.
    pub async fn shutdown(mut self) {
        if self.alive {
            let _ = write_message(&mut self.stdin, &ParentMessage::Shutdown).await;
            if tokio::time::timeout(Duration::from_secs(1), self.child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
        let _ = self.child.kill().await;
    }

    async fn request(&mut self, msg: ParentMessage) -> Result<ChildMessage, CallError> {
        if !self.alive {
            return Err(CallError::new(
                CallErrorKind::WorkerGone,
                "sandbox worker is no longer running",
            ));
        }
        write_message(&mut self.stdin, &msg).await.map_err(|e| {
            self.alive = false;
            CallError::new(CallErrorKind::WorkerGone, format!("failed to send request: {}", e))
        })?;

        let stdout = &mut self.stdout;
        let reply = tokio::time::timeout(self.call_timeout, async move {
            loop {
                match read_message::<ChildMessage, _>(stdout).await {
                    Ok(Some(ChildMessage::Log { message })) => {
                        tracing::info!(target: "gamecheck::sandbox::worker", "{}", message);
                    }
                    other => return other,
                }
            }
        })
        .await;

        match reply {
            Ok(Ok(Some(msg))) => Ok(msg),
            Ok(Ok(None)) => {
                self.alive = false;
                Err(CallError::new(
                    CallErrorKind::WorkerGone,
                    "worker exited while handling a request",
                ))
            }
            Ok(Err(e)) => {
                self.alive = false;
                let _ = self.child.kill().await;
                Err(CallError::new(CallErrorKind::Protocol, format!("IPC read error: {}", e)))
            }
            Err(_elapsed) => {
                self.alive = false;
                let _ = self.child.kill().await;
                Err(CallError::new(
                    CallErrorKind::Timeout,
                    format!(
                        "request timed out after {}ms",
                        self.call_timeout.as_millis()
                    ),
                ))
            }
        }
    }

    async fn reply(&mut self, msg: ParentMessage) -> Result<CallValue, CallError> {
        match self.request(msg).await? {
            ChildMessage::Reply { result } => result,
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(msg: &ChildMessage) -> CallError {
    CallError::new(
        CallErrorKind::Protocol,
        format!("unexpected worker message: {:?}", msg),
    )
}

#[async_trait]
impl Namespace for SandboxNamespace {
    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    async fn call(&mut self, target: Target, args: Vec<Value>) -> Result<CallValue, CallError> {
        tracing::trace!(%target, args = args.len(), "call");
        self.reply(ParentMessage::Call { target, args }).await
    }

    async fn get(&mut self, target: Target) -> Result<CallValue, CallError> {
        self.reply(ParentMessage::Get { target }).await
    }

    async fn set_global(&mut self, name: &str, value: Value) -> Result<(), CallError> {
        self.reply(ParentMessage::SetGlobal {
            name: name.to_string(),
            value,
        })
        .await
        .map(|_| ())
    }

    async fn describe(&mut self, target: Target) -> Result<ObjectInfo, CallError> {
        match self.request(ParentMessage::Describe { target }).await? {
            ChildMessage::Described { result } => result,
            other => Err(unexpected(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_deadlines() {
        let config = SandboxConfig::default();
        assert_eq!(config.load_timeout, Duration::from_secs(10));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(config.stub_numpy);
    }

    #[test]
    fn embedded_scripts_agree_on_names() {
        assert!(WORKER_SCRIPT.contains("pygame_stub"));
        assert!(WORKER_SCRIPT.contains("\"Loaded\""));
        assert!(PYGAME_STUB.contains("def install("));
    }

    #[tokio::test]
    async fn embedded_stub_imports_under_interpreter() {
        let python = Interpreter::default();
        if !python.is_available().await {
            eprintln!("skipping: '{}' is not available", python.program());
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pygame_stub.py"), PYGAME_STUB).unwrap();
        let script = "import sys, pygame_stub\n\
                      pygame_stub.install(sys.modules, pygame_stub)\n\
                      import pygame\n\
                      assert pygame.key.name(97) == ''\n\
                      assert pygame.init() == (6, 0)\n\
                      print('stub ok')\n";
        let outcome = python
            .run(["-B", "-c", script], Some(dir.path()), Duration::from_secs(10))
            .await
            .unwrap();
        match outcome {
            crate::python::RunOutcome::Finished {
                status,
                stdout,
                stderr,
            } => {
                assert_eq!(status, Some(0), "stderr: {stderr}");
                assert!(stdout.contains("stub ok"), "stdout: {stdout}");
            }
            other => panic!("stub import did not finish: {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_error_short_circuits_before_spawn() {
        let config = SandboxConfig {
            interpreter: Interpreter::new("/nonexistent/python"),
            ..SandboxConfig::default()
        };
        let err = SandboxHost::load("x = 1 +", &config).await.unwrap_err();
        assert!(matches!(err, SandboxError::Parse { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn missing_interpreter_is_execution_error() {
        let config = SandboxConfig {
            interpreter: Interpreter::new("/nonexistent/python"),
            ..SandboxConfig::default()
        };
        let err = SandboxHost::load("x = 1\n", &config).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("failed to spawn worker"), "got: {msg}");
    }
}
