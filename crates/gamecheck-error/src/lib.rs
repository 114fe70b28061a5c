//! Typed error taxonomy for the gamecheck probers.
//!
//! Provides [`ProbeError`], the canonical failure type every prober reports.
//! Probers never let these escape as faults: the orchestrator renders them
//! into stage records with [`ProbeError::render`].

use thiserror::Error;

/// Default upper bound on the length of a rendered error string.
pub const DEFAULT_MAX_ERROR_CHARS: usize = 200;

/// Canonical failure type for gamecheck probe stages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The artifact is not well-formed source text.
    #[error("{0}")]
    Parse(String),

    /// The artifact parses but the execution backend rejects it.
    #[error("{0}")]
    Compile(String),

    /// A process-level non-zero exit with a genuine diagnostic.
    #[error("{0}")]
    RuntimeFailure(String),

    /// A wall-clock deadline expired.
    #[error("{0}")]
    TimeoutObserved(String),

    /// An exception escaped while executing the neutralized module.
    #[error("{0}")]
    LoadFailure(String),

    /// A required function, class or mapping is absent from the namespace.
    #[error("{0}")]
    MissingCapability(String),

    /// A required behaviour was invoked and produced the wrong answer on the
    /// primary fixture.
    #[error("{0}")]
    AssertionFailure(String),

    /// The game identifier does not name a known contract.
    #[error("unknown game: {0}")]
    UnknownGame(String),

    /// The neutralized rewrite of an artifact could not be reparsed.
    #[error("neutralization failed: {0}")]
    Neutralize(String),

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProbeError {
    /// Returns a static error code string for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::Compile(_) => "COMPILE_ERROR",
            Self::RuntimeFailure(_) => "RUNTIME_FAILURE",
            Self::TimeoutObserved(_) => "TIMEOUT",
            Self::LoadFailure(_) => "LOAD_FAILURE",
            Self::MissingCapability(_) => "MISSING_CAPABILITY",
            Self::AssertionFailure(_) => "ASSERTION_FAILURE",
            Self::UnknownGame(_) => "UNKNOWN_GAME",
            Self::Neutralize(_) => "NEUTRALIZE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the failure came from the artifact itself rather than the harness.
    pub fn is_artifact_fault(&self) -> bool {
        !matches!(self, Self::UnknownGame(_) | Self::Internal(_))
    }

    /// Render the error for a stage record, bounded to `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        truncate(&self.to_string(), max_chars)
    }
}

/// Truncate `text` to at most `max_chars` characters, marking the cut with `...`.
///
/// Cuts on character boundaries, so multi-byte text never splits a code point.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}
