//! Shared helpers for suites that need a Python interpreter.

#![allow(dead_code)]

use std::path::PathBuf;

use gamecheck_harness::Interpreter;

/// The default interpreter, or `None` (with a note) when it cannot run.
pub async fn python() -> Option<Interpreter> {
    let interpreter = Interpreter::default();
    if interpreter.is_available().await {
        Some(interpreter)
    } else {
        eprintln!("skipping: '{}' is not available", interpreter.program());
        None
    }
}

/// Source of a reference game under `tests/fixtures/`.
pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read fixture {}: {e}", path.display()))
}
