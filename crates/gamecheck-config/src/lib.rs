#![warn(missing_docs)]

//! # gamecheck-config
//!
//! Configuration loading for the gamecheck evaluation harness.
//!
//! Supports TOML configuration files with environment variable expansion.
//! Every value is optional; absent values fall back to the harness defaults.
//!
//! ## Example
//!
//! ```toml
//! [python]
//! interpreter = "${HOME}/.venvs/games/bin/python"
//! rendering_backend = "null"
//!
//! [runtime]
//! iterations = 50
//! timeout_ms = 2000
//! pass_threshold = 0.9
//! concurrency = 4
//!
//! [sandbox]
//! load_timeout_secs = 10
//! call_timeout_secs = 5
//! stub_numpy = true
//!
//! [neutralizer]
//! blocking_functions = ["main", "run_game", "run", "game_loop"]
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level gamecheck configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GamecheckConfig {
    /// Interpreter selection and headless rendering.
    #[serde(default)]
    pub python: PythonOverrides,

    /// Runtime prober settings.
    #[serde(default)]
    pub runtime: RuntimeOverrides,

    /// Sandbox loader settings.
    #[serde(default)]
    pub sandbox: SandboxOverrides,

    /// Neutralizer rule overrides.
    #[serde(default)]
    pub neutralizer: NeutralizerOverrides,

    /// Result rendering settings.
    #[serde(default)]
    pub report: ReportOverrides,
}

/// Interpreter configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PythonOverrides {
    /// Interpreter executable (name on PATH or absolute path).
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Rendering backend: "null" (headless, default) or "native".
    #[serde(default)]
    pub rendering_backend: Option<String>,

    /// Timeout for the compile pass in seconds.
    #[serde(default)]
    pub compile_timeout_secs: Option<u64>,
}

/// Runtime prober overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeOverrides {
    /// Number of independent executions per artifact.
    #[serde(default)]
    pub iterations: Option<u32>,

    /// Per-run wall-clock timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Minimum success fraction for the stage to pass.
    #[serde(default)]
    pub pass_threshold: Option<f64>,

    /// Pause between sequential iterations in milliseconds.
    #[serde(default)]
    pub pause_ms: Option<u64>,

    /// Maximum iterations running at once.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Diagnostic substrings that mark a missing dependency rather than a defect.
    #[serde(default)]
    pub missing_dependency_markers: Option<Vec<String>>,
}

/// Sandbox loader overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxOverrides {
    /// Deadline for executing the neutralized module, in seconds.
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,

    /// Deadline for each probe request, in seconds.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,

    /// Install a list-based numpy stand-in when numpy is not importable.
    #[serde(default)]
    pub stub_numpy: Option<bool>,
}

/// Neutralizer rule overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeutralizerOverrides {
    /// Method names whose top-level calls are elided (`x.init()`, `x.quit()`...).
    #[serde(default)]
    pub blocking_methods: Option<Vec<String>>,

    /// Bare function names whose top-level calls are elided (`main()`...).
    #[serde(default)]
    pub blocking_functions: Option<Vec<String>>,
}

/// Result rendering overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportOverrides {
    /// Upper bound on every error string in a result record.
    #[serde(default)]
    pub max_error_chars: Option<usize>,
}

/// Rendering backends understood by the harness.
pub const RENDERING_BACKENDS: &[&str] = &["null", "native"];

impl GamecheckConfig {
    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: GamecheckConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string, expanding `${ENV_VAR}` references.
    pub fn from_toml_with_env(toml_str: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(toml_str);
        Self::from_toml(&expanded)
    }

    /// Load config from a file path, expanding environment variables.
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_with_env(&content)
    }

    /// Check every present value. Callers that layer overrides on a loaded
    /// config re-run this afterwards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(interpreter) = &self.python.interpreter {
            if interpreter.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "python.interpreter must not be empty".into(),
                ));
            }
        }
        if let Some(backend) = &self.python.rendering_backend {
            if !RENDERING_BACKENDS.contains(&backend.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "python.rendering_backend '{}' unsupported, supported: {}",
                    backend,
                    RENDERING_BACKENDS.join(", ")
                )));
            }
        }
        if self.python.compile_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "python.compile_timeout_secs must be at least 1".into(),
            ));
        }

        if self.runtime.iterations == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.iterations must be at least 1".into(),
            ));
        }
        if self.runtime.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.timeout_ms must be at least 1".into(),
            ));
        }
        if let Some(threshold) = self.runtime.pass_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "runtime.pass_threshold must be within 0.0..=1.0, got {threshold}"
                )));
            }
        }
        if self.runtime.concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.concurrency must be at least 1".into(),
            ));
        }

        if self.sandbox.load_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.load_timeout_secs must be at least 1".into(),
            ));
        }
        if self.sandbox.call_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "sandbox.call_timeout_secs must be at least 1".into(),
            ));
        }

        for (key, names) in [
            ("neutralizer.blocking_methods", &self.neutralizer.blocking_methods),
            ("neutralizer.blocking_functions", &self.neutralizer.blocking_functions),
        ] {
            if let Some(names) = names {
                if let Some(bad) = names.iter().find(|n| !is_identifier(n)) {
                    return Err(ConfigError::Invalid(format!(
                        "{key}: '{bad}' is not an identifier"
                    )));
                }
            }
        }

        if let Some(max) = self.report.max_error_chars {
            if max < 16 {
                return Err(ConfigError::Invalid(format!(
                    "report.max_error_chars must be at least 16, got {max}"
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Expand `${ENV_VAR}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(value) => result.push_str(&value),
                // unresolved placeholders stay verbatim
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(ch);
        }
    }

    result
}
