//! Syntax Validator: tree-sitter parse plus a backend compile pass.
//!
//! The parse stage catches malformed text without touching the backend. The
//! compile stage asks the interpreter itself, which rejects constructs the
//! grammar tolerates (`return` outside a function, Python 2 `print`, ...).

use std::io::Write;
use std::time::Duration;

use gamecheck_error::ProbeError;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::diagnostic;
use crate::python::{Interpreter, RunOutcome};

/// A successfully parsed source text together with its concrete syntax tree.
///
/// Immutable: rewrites such as neutralization produce a new `ParsedModule`.
pub struct ParsedModule {
    source: String,
    tree: Tree,
}

impl std::fmt::Debug for ParsedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedModule")
            .field("bytes", &self.source.len())
            .field("root", &self.tree.root_node().kind())
            .finish()
    }
}

impl ParsedModule {
    /// Parse `source`, failing with [`ProbeError::Parse`] on the first
    /// ERROR or MISSING node.
    pub fn parse(source: &str) -> Result<Self, ProbeError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ProbeError::Internal(anyhow::anyhow!("python grammar: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ProbeError::Internal(anyhow::anyhow!("parser produced no tree")))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ProbeError::Parse(describe_error(first_error(root))));
        }
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    /// The parsed text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root `module` node.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text spanned by `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }
}

/// Depth-first search for the first error in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

fn describe_error(node: Option<Node<'_>>) -> String {
    let Some(node) = node else {
        return "parse error: invalid syntax".to_string();
    };
    let pos = node.start_position();
    let (line, column) = (pos.row + 1, pos.column + 1);
    if node.is_missing() {
        format!(
            "parse error: missing `{}` at line {line}, column {column}",
            node.kind()
        )
    } else {
        format!("parse error: invalid syntax at line {line}, column {column}")
    }
}

/// Which check rejected an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxStage {
    /// The grammar rejected the text.
    Syntax,
    /// The backend's compiler rejected the text.
    Compile,
}

/// Outcome of [`SyntaxValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxReport {
    /// Whether both stages accepted the artifact.
    pub passed: bool,
    /// The stage that failed, if any.
    pub stage: Option<SyntaxStage>,
    /// The first error, if any.
    pub error: Option<String>,
}

impl SyntaxReport {
    fn passed() -> Self {
        Self {
            passed: true,
            stage: None,
            error: None,
        }
    }

    fn failed(stage: SyntaxStage, error: String) -> Self {
        Self {
            passed: false,
            stage: Some(stage),
            error: Some(error),
        }
    }
}

const COMPILE_SCRIPT: &str = r#"import sys
path = sys.argv[1]
try:
    with open(path, encoding="utf-8") as fh:
        compile(fh.read(), path, "exec")
except Exception as exc:
    sys.stderr.write(f"{type(exc).__name__}: {exc}\n")
    sys.exit(1)
"#;

/// Default deadline for the compile pass.
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses and compiles artifacts.
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    interpreter: Interpreter,
    compile_timeout: Duration,
}

impl SyntaxValidator {
    /// Create a validator that compiles with `interpreter`.
    pub fn new(interpreter: Interpreter, compile_timeout: Duration) -> Self {
        Self {
            interpreter,
            compile_timeout,
        }
    }

    /// Run the parse stage, then the compile stage. Reports the first error.
    #[tracing::instrument(skip_all, fields(bytes = source.len()))]
    pub async fn validate(&self, source: &str) -> SyntaxReport {
        if let Err(e) = ParsedModule::parse(source) {
            tracing::debug!(error = %e, "parse stage rejected artifact");
            return SyntaxReport::failed(SyntaxStage::Syntax, e.to_string());
        }
        match self.compile(source).await {
            Ok(()) => SyntaxReport::passed(),
            Err(e) => {
                tracing::debug!(error = %e, "compile stage rejected artifact");
                SyntaxReport::failed(SyntaxStage::Compile, e.to_string())
            }
        }
    }

    /// Compile `source` with the backend. The temporary copy is removed on
    /// every exit path when it drops.
    pub async fn compile(&self, source: &str) -> Result<(), ProbeError> {
        let mut file = tempfile::Builder::new()
            .prefix("gamecheck-compile-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| ProbeError::Compile(format!("compile error: temporary file: {e}")))?;
        file.write_all(source.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| ProbeError::Compile(format!("compile error: temporary file: {e}")))?;
        let path = file.into_temp_path();

        let outcome = self
            .interpreter
            .run(
                [
                    std::ffi::OsStr::new("-B"),
                    std::ffi::OsStr::new("-c"),
                    std::ffi::OsStr::new(COMPILE_SCRIPT),
                    path.as_os_str(),
                ],
                None,
                self.compile_timeout,
            )
            .await
            .map_err(|e| {
                ProbeError::Compile(format!(
                    "compile error: failed to spawn interpreter '{}': {e}",
                    self.interpreter.program()
                ))
            })?;

        match outcome {
            RunOutcome::Finished {
                status: Some(0), ..
            } => Ok(()),
            RunOutcome::Finished {
                status,
                stdout,
                stderr,
            } => {
                let message = diagnostic::pick_diagnostic(&stderr, &stdout)
                    .map(|d| diagnostic::summarize(d, Some(&*path)))
                    .unwrap_or_else(|| match status {
                        Some(code) => format!("compiler exited with status {code}"),
                        None => "compiler terminated by signal".to_string(),
                    });
                Err(ProbeError::Compile(message))
            }
            RunOutcome::TimedOut => Err(ProbeError::Compile(format!(
                "compile error: compiler timed out after {}ms",
                self.compile_timeout.as_millis()
            ))),
        }
    }
}
