//! Evaluation Orchestrator: sequences the probes and builds the result record.
//!
//! `Static` mode runs syntax, then the runtime probe, then the keyword probe.
//! `GameLogic` mode runs syntax, then the sandbox load, then the game-logic
//! probe; its `runtime` stage reports the load and its `semantic` stage the
//! logic probe. Nothing here panics or returns `Err`: every failure ends up
//! as a stage record.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gamecheck_error::{truncate, ProbeError, DEFAULT_MAX_ERROR_CHARS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::host::{SandboxConfig, SandboxHost};
use crate::logic;
use crate::python::Interpreter;
use crate::runtime::{IterationFailure, RuntimeProbeConfig, RuntimeProber, RuntimeReport};
use crate::semantic;
use crate::syntax::{SyntaxReport, SyntaxStage, SyntaxValidator, DEFAULT_COMPILE_TIMEOUT};

/// Marker error for stages skipped after a syntax failure.
pub const SKIPPED_SYNTAX: &str = "skipped due to syntax error";

/// Marker error for the logic stage skipped after a failed sandbox load.
pub const SKIPPED_LOAD: &str = "skipped due to sandbox load failure";

/// Which probe pipeline to run after the syntax stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Runtime probe, then keyword probe.
    Static,
    /// Sandbox load, then behavioral probe.
    GameLogic,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::GameLogic => "game_logic",
        })
    }
}

impl FromStr for EvaluationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "game-logic" | "game_logic" => Ok(Self::GameLogic),
            other => Err(format!(
                "unknown evaluation mode '{other}' (expected static or game-logic)"
            )),
        }
    }
}

/// Syntax stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxRecord {
    /// Whether parse and compile both succeeded.
    pub passed: bool,
    /// Which check failed.
    pub stage: Option<SyntaxStage>,
    /// First error.
    pub error: Option<String>,
}

/// Runtime stage record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    /// Whether the stage passed.
    pub passed: bool,
    /// Summary error.
    pub error: Option<String>,
    /// Failed iterations (empty in game-logic mode).
    pub per_iteration_errors: Vec<IterationFailure>,
    /// Fraction of clean iterations, when iterations ran.
    pub success_rate: Option<f64>,
}

impl RuntimeRecord {
    fn skipped(reason: &str) -> Self {
        Self {
            passed: false,
            error: Some(reason.to_string()),
            per_iteration_errors: Vec::new(),
            success_rate: None,
        }
    }

    fn from_load(outcome: &Result<(), String>) -> Self {
        Self {
            passed: outcome.is_ok(),
            error: outcome.as_ref().err().cloned(),
            per_iteration_errors: Vec::new(),
            success_rate: None,
        }
    }
}

impl From<RuntimeReport> for RuntimeRecord {
    fn from(report: RuntimeReport) -> Self {
        let success_rate = (report.iterations > 0).then(|| report.success_rate());
        Self {
            passed: report.passed,
            error: report.error,
            per_iteration_errors: report.failures,
            success_rate,
        }
    }
}

/// Semantic stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Whether the stage passed.
    pub passed: bool,
    /// Failure message.
    pub error: Option<String>,
}

impl StageRecord {
    fn skipped(reason: &str) -> Self {
        Self {
            passed: false,
            error: Some(reason.to_string()),
        }
    }

    fn from_probe(result: Result<(), ProbeError>, max_chars: usize) -> Self {
        match result {
            Ok(()) => Self {
                passed: true,
                error: None,
            },
            Err(e) => Self {
                passed: false,
                error: Some(e.render(max_chars)),
            },
        }
    }
}

/// The record produced for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Unique id of this evaluation.
    pub evaluation_id: Uuid,
    /// Game name as requested.
    pub game: String,
    /// Pipeline that ran.
    pub mode: EvaluationMode,
    /// Hex SHA-256 of the artifact text.
    pub artifact_sha256: String,
    /// When the evaluation started.
    pub evaluated_at: DateTime<Utc>,
    /// Wall-clock time spent.
    pub duration_ms: u64,
    /// Syntax stage.
    pub syntax: SyntaxRecord,
    /// Runtime stage (sandbox load in game-logic mode).
    pub runtime: RuntimeRecord,
    /// Semantic stage (game-logic probe in game-logic mode).
    pub semantic: StageRecord,
    /// All three stages passed.
    pub overall: bool,
}

/// Pass flags only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Syntax stage passed.
    pub syntax_passed: bool,
    /// Runtime stage passed.
    pub runtime_passed: bool,
    /// Semantic stage passed.
    pub semantic_passed: bool,
    /// Every stage passed.
    pub overall_passed: bool,
}

impl EvaluationResult {
    /// Collapse the record to its pass flags.
    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            syntax_passed: self.syntax.passed,
            runtime_passed: self.runtime.passed,
            semantic_passed: self.semantic.passed,
            overall_passed: self.syntax.passed && self.runtime.passed && self.semantic.passed,
        }
    }
}

/// Hex SHA-256 of `source`.
pub fn artifact_digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Settings for [`Evaluator`].
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Interpreter for compiling, running and hosting artifacts.
    pub interpreter: Interpreter,
    /// Deadline for the compile pass.
    pub compile_timeout: Duration,
    /// Runtime probe settings.
    pub runtime: RuntimeProbeConfig,
    /// Sandbox settings. Its interpreter is replaced by [`interpreter`](Self::interpreter).
    pub sandbox: SandboxConfig,
    /// Upper bound on every error string in the record.
    pub max_error_chars: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::default(),
            compile_timeout: DEFAULT_COMPILE_TIMEOUT,
            runtime: RuntimeProbeConfig::default(),
            sandbox: SandboxConfig::default(),
            max_error_chars: DEFAULT_MAX_ERROR_CHARS,
        }
    }
}

/// Runs whole evaluations.
pub struct Evaluator {
    syntax: SyntaxValidator,
    runtime: RuntimeProber,
    sandbox: SandboxConfig,
    max_error_chars: usize,
    #[cfg(feature = "metrics")]
    metrics: Option<std::sync::Arc<crate::metrics::HarnessMetrics>>,
}

impl Evaluator {
    /// Build an evaluator from `config`.
    pub fn new(config: EvaluatorConfig) -> Self {
        let EvaluatorConfig {
            interpreter,
            compile_timeout,
            mut runtime,
            mut sandbox,
            max_error_chars,
        } = config;
        runtime.max_error_chars = max_error_chars;
        sandbox.interpreter = interpreter.clone();
        Self {
            syntax: SyntaxValidator::new(interpreter.clone(), compile_timeout),
            runtime: RuntimeProber::new(interpreter, runtime),
            sandbox,
            max_error_chars,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record every evaluation into `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: std::sync::Arc<crate::metrics::HarnessMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Evaluate `source` as an implementation of `game`.
    #[tracing::instrument(skip(self, source), fields(bytes = source.len()))]
    pub async fn evaluate(&self, source: &str, game: &str, mode: EvaluationMode) -> EvaluationResult {
        let started = Instant::now();
        let evaluated_at = Utc::now();

        let syntax = self.syntax_record(self.syntax.validate(source).await);
        let (runtime, semantic) = if !syntax.passed {
            (
                RuntimeRecord::skipped(SKIPPED_SYNTAX),
                StageRecord::skipped(SKIPPED_SYNTAX),
            )
        } else {
            match mode {
                EvaluationMode::Static => self.run_static(source, game).await,
                EvaluationMode::GameLogic => self.run_game_logic(source, game).await,
            }
        };

        let overall = syntax.passed && runtime.passed && semantic.passed;
        let result = EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            game: game.to_string(),
            mode,
            artifact_sha256: artifact_digest(source),
            evaluated_at,
            duration_ms: started.elapsed().as_millis() as u64,
            syntax,
            runtime,
            semantic,
            overall,
        };
        tracing::info!(
            evaluation_id = %result.evaluation_id,
            game,
            %mode,
            syntax = result.syntax.passed,
            runtime = result.runtime.passed,
            semantic = result.semantic.passed,
            duration_ms = result.duration_ms,
            "evaluation complete"
        );
        self.record_metrics(&result);
        result
    }

    fn syntax_record(&self, report: SyntaxReport) -> SyntaxRecord {
        SyntaxRecord {
            passed: report.passed,
            stage: report.stage,
            error: report.error.map(|e| truncate(&e, self.max_error_chars)),
        }
    }

    async fn run_static(&self, source: &str, game: &str) -> (RuntimeRecord, StageRecord) {
        let runtime = RuntimeRecord::from(self.runtime.probe(source).await);
        let semantic = StageRecord::from_probe(semantic::probe(source, game), self.max_error_chars);
        (runtime, semantic)
    }

    async fn run_game_logic(&self, source: &str, game: &str) -> (RuntimeRecord, StageRecord) {
        let mut namespace = match SandboxHost::load(source, &self.sandbox).await {
            Ok(ns) => ns,
            Err(e) => {
                let error = ProbeError::from(e).render(self.max_error_chars);
                tracing::debug!(%error, "sandbox load failed");
                return (
                    RuntimeRecord::from_load(&Err(error)),
                    StageRecord::skipped(SKIPPED_LOAD),
                );
            }
        };

        let result = logic::probe_named(&mut namespace, game).await;
        namespace.shutdown().await;
        (
            RuntimeRecord::from_load(&Ok(())),
            StageRecord::from_probe(result, self.max_error_chars),
        )
    }

    #[cfg(feature = "metrics")]
    fn record_metrics(&self, result: &EvaluationResult) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_evaluation(
            &result.game,
            &result.mode.to_string(),
            result.overall,
            result.duration_ms as f64 / 1000.0,
        );
        for (stage, passed) in [
            ("syntax", result.syntax.passed),
            ("runtime", result.runtime.passed),
            ("semantic", result.semantic.passed),
        ] {
            if !passed {
                metrics.record_stage_failure(stage);
            }
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn record_metrics(&self, _result: &EvaluationResult) {}
}
