//! Condensing interpreter diagnostics into stage error strings.
//!
//! Tracebacks from the backend carry temporary file paths that differ on
//! every run. They are replaced with `<artifact>` so identical defects render
//! identically across iterations and machines.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Temporary Python files created by the harness or by `tempfile` elsewhere.
static TEMP_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:/tmp|/var/folders|/private/var)(?:/[\w.\-]+)*/[\w.\-]+\.py"#).unwrap()
});

static WINDOWS_TEMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[A-Z]:\\[\w.\\\-]*\\Temp\\[\w.\\\-]+\.py"#).unwrap());

/// Placeholder substituted for the artifact's temporary path.
pub const ARTIFACT_PLACEHOLDER: &str = "<artifact>";

/// Replace every temporary script path in `text` with [`ARTIFACT_PLACEHOLDER`].
///
/// `artifact` is replaced first, so paths outside the usual temp roots (a
/// custom `TMPDIR`) are still caught.
pub fn redact_paths(text: &str, artifact: Option<&Path>) -> String {
    let mut msg = text.to_string();
    if let Some(path) = artifact.and_then(Path::to_str) {
        if !path.is_empty() {
            msg = msg.replace(path, ARTIFACT_PLACEHOLDER);
        }
    }
    msg = WINDOWS_TEMP_RE
        .replace_all(&msg, ARTIFACT_PLACEHOLDER)
        .to_string();
    TEMP_SCRIPT_RE
        .replace_all(&msg, ARTIFACT_PLACEHOLDER)
        .to_string()
}

/// The last non-blank line of a diagnostic, which for a Python traceback is
/// the `ExcType: message` summary.
pub fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

/// Pick the diagnostic stream of a finished process: stderr, else stdout.
pub fn pick_diagnostic<'a>(stderr: &'a str, stdout: &'a str) -> Option<&'a str> {
    [stderr, stdout]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Condense a diagnostic to its summary line with temp paths removed.
pub fn summarize(text: &str, artifact: Option<&Path>) -> String {
    let line = last_line(text).unwrap_or_default();
    redact_paths(line, artifact)
}

/// Whether a diagnostic blames one of the known-absent dependencies.
pub fn mentions_missing_dependency(text: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| text.contains(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACEBACK: &str = "Traceback (most recent call last):\n  File \"/tmp/.tmpAbC123/artifact.py\", line 3, in <module>\n    foo()\nNameError: name 'foo' is not defined\n";

    #[test]
    fn last_line_is_exception_summary() {
        assert_eq!(
            last_line(TRACEBACK),
            Some("NameError: name 'foo' is not defined")
        );
    }

    #[test]
    fn last_line_of_blank_is_none() {
        assert_eq!(last_line("  \n\n "), None);
    }

    #[test]
    fn redacts_tmp_paths() {
        let out = redact_paths(TRACEBACK, None);
        assert!(!out.contains("/tmp/"), "{out}");
        assert!(out.contains("File \"<artifact>\", line 3"), "{out}");
    }

    #[test]
    fn redacts_explicit_artifact_path() {
        let path = Path::new("/data/scratch/run7/prog.py");
        let out = redact_paths("  File \"/data/scratch/run7/prog.py\", line 1", Some(path));
        assert_eq!(out, "  File \"<artifact>\", line 1");
    }

    #[test]
    fn redacts_macos_temp() {
        let out = redact_paths(
            "Sorry: IndentationError (/var/folders/xy/T/tmp81kd.py, line 2)",
            None,
        );
        assert_eq!(out, "Sorry: IndentationError (<artifact>, line 2)");
    }

    #[test]
    fn preserves_unrelated_paths() {
        let text = "ModuleNotFoundError: No module named 'pygame' (/usr/lib/python3)";
        assert_eq!(redact_paths(text, None), text);
    }

    #[test]
    fn stderr_preferred_over_stdout() {
        assert_eq!(pick_diagnostic("boom", "out"), Some("boom"));
        assert_eq!(pick_diagnostic("  \n", "out"), Some("out"));
        assert_eq!(pick_diagnostic("", ""), None);
    }

    #[test]
    fn summarize_condenses() {
        assert_eq!(
            summarize(TRACEBACK, None),
            "NameError: name 'foo' is not defined"
        );
    }

    #[test]
    fn missing_dependency_markers() {
        let markers = vec!["pygame".to_string()];
        assert!(mentions_missing_dependency(
            "ModuleNotFoundError: No module named 'pygame'",
            &markers
        ));
        assert!(!mentions_missing_dependency("ZeroDivisionError", &markers));
        assert!(!mentions_missing_dependency("anything", &[String::new()]));
    }
}
