//! Prometheus metrics for evaluations.
//!
//! Only compiled with the `metrics` feature.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Labels for per-evaluation metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EvaluationLabels {
    /// Game id, e.g. "tic_tac_toe".
    pub game: String,
    /// "static" or "game_logic".
    pub mode: String,
}

/// Labels for stage failures.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StageLabels {
    /// "syntax", "runtime" or "semantic".
    pub stage: String,
}

/// Evaluation counters and durations.
pub struct HarnessMetrics {
    /// Completed evaluations.
    pub evaluations_total: Family<EvaluationLabels, Counter>,
    /// Evaluations whose overall verdict passed.
    pub evaluations_passed_total: Family<EvaluationLabels, Counter>,
    /// Evaluation wall-clock time in seconds.
    pub evaluation_duration_seconds: Family<EvaluationLabels, Histogram>,
    /// Failed stages.
    pub stage_failures_total: Family<StageLabels, Counter>,
}

impl HarnessMetrics {
    /// Create the metrics and register them with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let evaluations_total = Family::default();
        registry.register(
            "gamecheck_evaluations_total",
            "Completed evaluations",
            evaluations_total.clone(),
        );

        let evaluations_passed_total = Family::default();
        registry.register(
            "gamecheck_evaluations_passed_total",
            "Evaluations with an overall pass",
            evaluations_passed_total.clone(),
        );

        let evaluation_duration_seconds =
            Family::<EvaluationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new([0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0].into_iter())
            });
        registry.register(
            "gamecheck_evaluation_duration_seconds",
            "Evaluation duration",
            evaluation_duration_seconds.clone(),
        );

        let stage_failures_total = Family::default();
        registry.register(
            "gamecheck_stage_failures_total",
            "Failed stages by name",
            stage_failures_total.clone(),
        );

        Self {
            evaluations_total,
            evaluations_passed_total,
            evaluation_duration_seconds,
            stage_failures_total,
        }
    }

    /// Record one finished evaluation.
    pub fn record_evaluation(&self, game: &str, mode: &str, passed: bool, duration_secs: f64) {
        let labels = EvaluationLabels {
            game: game.to_string(),
            mode: mode.to_string(),
        };
        self.evaluations_total.get_or_create(&labels).inc();
        if passed {
            self.evaluations_passed_total.get_or_create(&labels).inc();
        }
        self.evaluation_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed stage.
    pub fn record_stage_failure(&self, stage: &str) {
        let labels = StageLabels {
            stage: stage.to_string(),
        };
        self.stage_failures_total.get_or_create(&labels).inc();
    }
}
