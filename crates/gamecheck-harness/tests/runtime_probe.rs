//! Integration tests for the runtime prober against a real interpreter.

mod common;

use std::time::Duration;

use gamecheck_harness::{RuntimeProbeConfig, RuntimeProber};
use serial_test::serial;

fn quick(iterations: u32) -> RuntimeProbeConfig {
    RuntimeProbeConfig {
        iterations,
        timeout_per_run: Duration::from_secs(5),
        pause: Duration::ZERO,
        ..RuntimeProbeConfig::default()
    }
}

#[tokio::test]
#[serial]
async fn side_effect_free_program_always_succeeds() {
    let Some(python) = common::python().await else {
        return;
    };
    let prober = RuntimeProber::new(python, quick(5));
    let report = prober.probe("print('hello')\n").await;
    assert!(report.passed, "{report:?}");
    assert_eq!(report.success_rate(), 1.0);
    assert!(report.failures.is_empty());
}

#[tokio::test]
#[serial]
async fn crashing_program_records_every_iteration() {
    let Some(python) = common::python().await else {
        return;
    };
    let prober = RuntimeProber::new(python, quick(3));
    let report = prober.probe("x = 1 / 0\n").await;
    assert!(!report.passed);
    assert_eq!(report.error.as_deref(), Some("runtime errors in 3/3 iterations"));
    assert_eq!(
        report.failures.iter().map(|f| f.iteration).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(report.failures[0].error.contains("ZeroDivisionError"));
}

#[tokio::test]
#[serial]
async fn missing_dependency_is_noise() {
    let Some(python) = common::python().await else {
        return;
    };
    let prober = RuntimeProber::new(python, quick(2));
    let report = prober.probe("import pygame_not_installed_anywhere\n").await;
    assert!(report.passed, "{report:?}");
}

#[tokio::test]
#[serial]
async fn hanging_program_counts_as_running() {
    let Some(python) = common::python().await else {
        return;
    };
    let config = RuntimeProbeConfig {
        timeout_per_run: Duration::from_millis(500),
        ..quick(2)
    };
    let prober = RuntimeProber::new(python, config);
    let report = prober.probe("while True:\n    pass\n").await;
    assert!(report.passed, "{report:?}");
}

#[tokio::test]
#[serial]
async fn concurrent_iterations_keep_order() {
    let Some(python) = common::python().await else {
        return;
    };
    let config = RuntimeProbeConfig {
        concurrency: 4,
        ..quick(8)
    };
    let prober = RuntimeProber::new(python, config);
    let report = prober
        .probe("import random, sys\nsys.exit(0 if random.random() < 2 else 1)\n")
        .await;
    assert_eq!(report.iterations, 8);
    assert_eq!(report.successes, 8);
}

#[tokio::test]
#[serial]
async fn silent_nonzero_exit_is_failure() {
    let Some(python) = common::python().await else {
        return;
    };
    let prober = RuntimeProber::new(python, quick(1));
    let report = prober.probe("import sys\nsys.exit(3)\n").await;
    assert!(!report.passed);
    assert_eq!(
        report.failures[0].error,
        "exited with status 3 and no diagnostic"
    );
}
