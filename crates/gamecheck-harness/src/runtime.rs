//! Runtime Prober: repeated bounded executions of an artifact.
//!
//! Each iteration writes the artifact to its own temporary file and runs it as
//! an independent interpreter process. The classification of each run is a
//! heuristic tuned for interactive programs: a run that is still alive at the
//! deadline is presumed to be sitting in its event loop and counts as clean,
//! and diagnostics blaming a known-absent dependency count as environment
//! noise. Both rules can hide genuine hangs or import defects, so the success
//! rate is a lossy signal rather than a correctness guarantee.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use gamecheck_error::{truncate, DEFAULT_MAX_ERROR_CHARS};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::diagnostic;
use crate::python::{Interpreter, RunOutcome};

/// Settings for [`RuntimeProber`].
#[derive(Debug, Clone)]
pub struct RuntimeProbeConfig {
    /// Number of independent executions.
    pub iterations: u32,
    /// Wall-clock deadline for each execution.
    pub timeout_per_run: Duration,
    /// Minimum success fraction for the probe to pass.
    pub pass_threshold: f64,
    /// Pause between sequential iterations.
    pub pause: Duration,
    /// Maximum executions in flight at once.
    pub concurrency: usize,
    /// Diagnostic substrings that mark a missing dependency.
    pub missing_dependency_markers: Vec<String>,
    /// Upper bound on each recorded error string.
    pub max_error_chars: usize,
}

impl Default for RuntimeProbeConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            timeout_per_run: Duration::from_secs(2),
            pass_threshold: 0.9,
            pause: Duration::from_millis(100),
            concurrency: 1,
            missing_dependency_markers: vec!["pygame".to_string()],
            max_error_chars: DEFAULT_MAX_ERROR_CHARS,
        }
    }
}

/// One failed iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationFailure {
    /// 1-based iteration number.
    pub iteration: u32,
    /// Condensed diagnostic.
    pub error: String,
}

/// How a single execution was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Exit status 0.
    Clean,
    /// Still running at the deadline; presumed blocked on its event loop.
    TimedOut,
    /// Failed, but the diagnostic blames a known-absent dependency.
    DependencyNoise,
    /// A genuine failure with its condensed diagnostic.
    Failed(String),
}

impl IterationOutcome {
    /// Whether the iteration counts towards the success rate.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Aggregate result of [`RuntimeProber::probe`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeReport {
    /// Whether the success rate reached the threshold.
    pub passed: bool,
    /// Summary error when the probe failed.
    pub error: Option<String>,
    /// Every failed iteration, in iteration order.
    pub failures: Vec<IterationFailure>,
    /// Number of iterations counted as successes.
    pub successes: u32,
    /// Number of iterations executed.
    pub iterations: u32,
}

impl RuntimeReport {
    /// Fraction of successful iterations (0.0 when none ran).
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.iterations)
        }
    }
}

/// Executes artifacts repeatedly and aggregates the outcomes.
#[derive(Debug, Clone)]
pub struct RuntimeProber {
    interpreter: Interpreter,
    config: RuntimeProbeConfig,
}

impl RuntimeProber {
    /// Create a prober running artifacts with `interpreter`.
    pub fn new(interpreter: Interpreter, config: RuntimeProbeConfig) -> Self {
        Self {
            interpreter,
            config,
        }
    }

    /// The active settings.
    pub fn config(&self) -> &RuntimeProbeConfig {
        &self.config
    }

    /// Run every iteration and aggregate.
    #[tracing::instrument(skip_all, fields(iterations = self.config.iterations))]
    pub async fn probe(&self, source: &str) -> RuntimeReport {
        let iterations = self.config.iterations;
        if iterations == 0 {
            return RuntimeReport {
                passed: false,
                error: Some("no iterations requested".to_string()),
                failures: Vec::new(),
                successes: 0,
                iterations: 0,
            };
        }

        let outcomes = if self.config.concurrency <= 1 {
            self.run_sequential(source).await
        } else {
            self.run_concurrent(source).await
        };
        self.aggregate(outcomes)
    }

    async fn run_sequential(&self, source: &str) -> Vec<(u32, IterationOutcome)> {
        let mut outcomes = Vec::with_capacity(self.config.iterations as usize);
        for iteration in 1..=self.config.iterations {
            let outcome = run_iteration(&self.interpreter, &self.config, source).await;
            tracing::debug!(iteration, ?outcome, "runtime iteration finished");
            outcomes.push((iteration, outcome));
            if iteration < self.config.iterations && !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }
        }
        outcomes
    }

    async fn run_concurrent(&self, source: &str) -> Vec<(u32, IterationOutcome)> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let source: Arc<str> = Arc::from(source);
        let mut tasks = JoinSet::new();

        for iteration in 1..=self.config.iterations {
            let permits = Arc::clone(&permits);
            let source = Arc::clone(&source);
            let interpreter = self.interpreter.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => run_iteration(&interpreter, &config, &source).await,
                    Err(_) => IterationOutcome::Failed("iteration scheduler closed".to_string()),
                };
                (iteration, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(self.config.iterations as usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((iteration, outcome)) => {
                    tracing::debug!(iteration, ?outcome, "runtime iteration finished");
                    outcomes.push((iteration, outcome));
                }
                Err(e) => tracing::warn!(error = %e, "runtime iteration task failed"),
            }
        }
        // Panicked tasks leave holes; report them as failures.
        for iteration in 1..=self.config.iterations {
            if !outcomes.iter().any(|(i, _)| *i == iteration) {
                outcomes.push((
                    iteration,
                    IterationOutcome::Failed("iteration task aborted".to_string()),
                ));
            }
        }
        outcomes.sort_by_key(|(i, _)| *i);
        outcomes
    }

    fn aggregate(&self, outcomes: Vec<(u32, IterationOutcome)>) -> RuntimeReport {
        let iterations = self.config.iterations;
        let mut successes = 0u32;
        let mut failures = Vec::new();
        for (iteration, outcome) in outcomes {
            match outcome {
                IterationOutcome::Failed(error) => failures.push(IterationFailure {
                    iteration,
                    error: truncate(&error, self.config.max_error_chars),
                }),
                _ => successes += 1,
            }
        }

        let rate = f64::from(successes) / f64::from(iterations);
        let passed = rate >= self.config.pass_threshold;
        let error = (!passed).then(|| {
            format!(
                "runtime errors in {}/{} iterations",
                failures.len(),
                iterations
            )
        });
        tracing::info!(successes, iterations, passed, "runtime probe finished");

        RuntimeReport {
            passed,
            error,
            failures,
            successes,
            iterations,
        }
    }
}

/// Execute one iteration in a fresh temporary file and classify it.
pub async fn run_iteration(
    interpreter: &Interpreter,
    config: &RuntimeProbeConfig,
    source: &str,
) -> IterationOutcome {
    let path = match write_artifact(source) {
        Ok(path) => path,
        Err(e) => return IterationOutcome::Failed(format!("temporary file: {e}")),
    };

    let outcome = interpreter
        .run([path.as_os_str()], None, config.timeout_per_run)
        .await;
    let classified = classify(outcome, &path, &config.missing_dependency_markers);
    // Best-effort removal; a failure here never affects the outcome.
    if let Err(e) = path.close() {
        tracing::debug!(error = %e, "failed to remove iteration artifact");
    }
    classified
}

fn write_artifact(source: &str) -> std::io::Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("gamecheck-run-")
        .suffix(".py")
        .tempfile()?;
    file.write_all(source.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

fn classify(
    outcome: std::io::Result<RunOutcome>,
    artifact: &std::path::Path,
    markers: &[String],
) -> IterationOutcome {
    match outcome {
        Err(e) => IterationOutcome::Failed(format!("failed to spawn interpreter: {e}")),
        Ok(RunOutcome::TimedOut) => IterationOutcome::TimedOut,
        Ok(RunOutcome::Finished {
            status: Some(0), ..
        }) => IterationOutcome::Clean,
        Ok(RunOutcome::Finished {
            status,
            stdout,
            stderr,
        }) => match diagnostic::pick_diagnostic(&stderr, &stdout) {
            Some(diag) if diagnostic::mentions_missing_dependency(diag, markers) => {
                IterationOutcome::DependencyNoise
            }
            Some(diag) => IterationOutcome::Failed(diagnostic::summarize(diag, Some(artifact))),
            None => IterationOutcome::Failed(match status {
                Some(code) => format!("exited with status {code} and no diagnostic"),
                None => "terminated by signal with no diagnostic".to_string(),
            }),
        },
    }
}
