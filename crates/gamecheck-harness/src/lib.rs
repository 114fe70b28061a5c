#![warn(missing_docs)]

//! # gamecheck-harness
//!
//! Evaluation harness for machine-generated pygame programs.
//!
//! An artifact is checked in three escalating tiers:
//!
//! - **Syntax**: tree-sitter parse, then a compile pass with the real interpreter
//! - **Runtime**: repeated bounded executions as independent processes
//! - **Semantics**: a keyword pre-filter ([`semantic`]), or behavioral probes
//!   ([`logic`]) against the module loaded in a sandbox worker ([`host`])
//!
//! ## Sandbox model
//!
//! - **Neutralized before execution**: entry-point guards, `while` loops and
//!   blocking top-level calls are removed from the syntax tree
//! - **Stubbed graphics**: pygame is replaced by an inert stand-in
//! - **Separate process**: the module runs in a worker child, one per load
//! - **Hard deadlines**: the worker is killed when a load or call overruns
//!
//! This defends against accidental blocking and crashes in benign code, not
//! against deliberate escape attempts.

pub mod diagnostic;
pub mod error;
pub mod evaluator;
pub mod fixtures;
pub mod game;
pub mod host;
pub mod ipc;
pub mod logic;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod namespace;
pub mod neutralize;
pub mod python;
pub mod runtime;
pub mod semantic;
pub mod syntax;

pub use error::SandboxError;
pub use evaluator::{EvaluationMode, EvaluationResult, EvaluationSummary, Evaluator, EvaluatorConfig};
pub use game::GameId;
pub use host::{SandboxConfig, SandboxHost, SandboxNamespace};
pub use namespace::Namespace;
pub use neutralize::{neutralize, NeutralizedProgram, NeutralizerRules};
pub use python::{Interpreter, RenderingBackend};
pub use runtime::{RuntimeProbeConfig, RuntimeProber};
pub use syntax::{ParsedModule, SyntaxValidator};
