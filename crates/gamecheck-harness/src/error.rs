//! Error types for the sandbox loader.

use gamecheck_error::ProbeError;
use thiserror::Error;

/// Errors that can occur while loading an artifact into a sandbox worker.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The artifact does not parse.
    #[error("{message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// The neutralized rewrite does not parse.
    #[error("neutralization failed: {message}")]
    Neutralize {
        /// Parser message for the rewrite.
        message: String,
    },

    /// Module execution exceeded its deadline; the worker was killed.
    #[error("module execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// An exception escaped from the module body.
    #[error("module execution error: {message}")]
    LoadFailed {
        /// `ExcType: message (line N)` as reported by the worker.
        message: String,
    },

    /// The worker could not be started or the protocol broke down.
    #[error("sandbox execution failed: {0}")]
    Execution(#[from] anyhow::Error),
}

impl From<SandboxError> for ProbeError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Parse { message } => ProbeError::Parse(message),
            SandboxError::Neutralize { message } => ProbeError::Neutralize(message),
            e @ SandboxError::Timeout { .. } => ProbeError::TimeoutObserved(e.to_string()),
            e @ SandboxError::LoadFailed { .. } => ProbeError::LoadFailure(e.to_string()),
            SandboxError::Execution(e) => ProbeError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_timeout_observed() {
        let probe: ProbeError = SandboxError::Timeout { timeout_ms: 10_000 }.into();
        assert_eq!(probe.code(), "TIMEOUT");
        assert_eq!(probe.to_string(), "module execution timed out after 10000ms");
    }

    #[test]
    fn load_failure_keeps_message() {
        let probe: ProbeError = SandboxError::LoadFailed {
            message: "NameError: name 'screen' is not defined (line 4)".into(),
        }
        .into();
        assert_eq!(probe.code(), "LOAD_FAILURE");
        assert!(probe.to_string().starts_with("module execution error: NameError"));
    }

    #[test]
    fn neutralize_maps_through() {
        let probe: ProbeError = SandboxError::Neutralize {
            message: "parse error: invalid syntax at line 1, column 1".into(),
        }
        .into();
        assert_eq!(probe.code(), "NEUTRALIZE_ERROR");
    }

    #[test]
    fn execution_is_internal() {
        let probe: ProbeError = SandboxError::Execution(anyhow::anyhow!("spawn failed")).into();
        assert_eq!(probe.code(), "INTERNAL");
    }
}
