//! Integration tests for the two-stage syntax validator.
//!
//! The parse stage needs nothing; the compile stage runs the interpreter.

mod common;

use gamecheck_harness::syntax::{SyntaxStage, DEFAULT_COMPILE_TIMEOUT};
use gamecheck_harness::SyntaxValidator;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn valid_program_passes_both_stages() {
    let Some(python) = common::python().await else {
        return;
    };
    let validator = SyntaxValidator::new(python, DEFAULT_COMPILE_TIMEOUT);
    let report = validator.validate("print('hello')\n").await;
    assert!(report.passed, "{report:?}");
    assert_eq!(report.stage, None);
    assert_eq!(report.error, None);
}

#[tokio::test]
#[serial]
async fn parse_error_is_syntax_stage() {
    let Some(python) = common::python().await else {
        return;
    };
    let validator = SyntaxValidator::new(python, DEFAULT_COMPILE_TIMEOUT);
    let report = validator.validate("def broken(:\n    pass\n").await;
    assert!(!report.passed);
    assert_eq!(report.stage, Some(SyntaxStage::Syntax));
    assert!(report.error.unwrap().starts_with("parse error"));
}

#[tokio::test]
#[serial]
async fn compiler_only_rejection_is_compile_stage() {
    let Some(python) = common::python().await else {
        return;
    };
    let validator = SyntaxValidator::new(python, DEFAULT_COMPILE_TIMEOUT);
    // the grammar accepts `return` anywhere; the compiler does not
    let report = validator.validate("x = 1\nreturn x\n").await;
    assert!(!report.passed, "{report:?}");
    assert_eq!(report.stage, Some(SyntaxStage::Compile));
    let error = report.error.unwrap();
    assert!(error.contains("SyntaxError"), "{error}");
    assert!(!error.contains("/tmp/"), "temporary path leaked: {error}");
}

#[tokio::test]
#[serial]
async fn reference_games_validate() {
    let Some(python) = common::python().await else {
        return;
    };
    let validator = SyntaxValidator::new(python, DEFAULT_COMPILE_TIMEOUT);
    for name in [
        "tic_tac_toe.py",
        "connect_four.py",
        "snake_game.py",
        "ball_bouncing.py",
        "snakes_and_ladders.py",
    ] {
        let report = validator.validate(&common::fixture(name)).await;
        assert!(report.passed, "{name}: {report:?}");
    }
}
