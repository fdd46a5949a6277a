//! Validation report formatting.

use std::fmt::{self, Write};
use std::path::Path;

use super::{ValidationIssue, ValidationResult, ValidationSeverity};

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            ValidationSeverity::Error => "ERROR",
            ValidationSeverity::Warning => "WARNING",
        };
        writeln!(f, "{} {}", label, self.path)?;
        writeln!(f, "  └─ {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            writeln!(f, "     {}", suggestion)?;
        }
        Ok(())
    }
}

/// Renders every issue of `result` for the config file at `source`,
/// errors first.
pub fn format_report(result: &ValidationResult, source: &Path) -> String {
    let error_count = result.error_count();
    let warning_count = result.warnings().count();

    if error_count + warning_count == 0 {
        return format!("{}: configuration is valid.", source.display());
    }

    let mut report = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        report,
        "{}: {} error(s), {} warning(s)\n",
        source.display(),
        error_count,
        warning_count
    );

    for issue in result.errors().chain(result.warnings()) {
        let _ = writeln!(report, "{}", issue);
    }

    if error_count > 0 {
        report.push_str("Fix the errors above and re-run.\n");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_come_before_warnings() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("encoding.small_options[0]", "Unknown x265 parameter: 'foo'"));
        result.add(
            ValidationIssue::error("workspace.source_dir", "Invalid working directory")
                .with_suggestion("Create it"),
        );

        let report = format_report(&result, Path::new("transcode-eval.yaml"));
        assert!(report.starts_with("transcode-eval.yaml: 1 error(s), 1 warning(s)\n"));
        let error_at = report.find("ERROR workspace.source_dir").unwrap();
        let warning_at = report.find("WARNING encoding.small_options[0]").unwrap();
        assert!(error_at < warning_at);
        assert!(report.contains("     Create it\n"));
        assert!(report.ends_with("re-run.\n"));
    }

    #[test]
    fn warnings_alone_do_not_ask_for_fixes() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("encoding.small_options", "Odd option"));

        let report = format_report(&result, Path::new("c.yaml"));
        assert!(!report.contains("re-run"));
    }

    #[test]
    fn clean_result_is_valid() {
        assert_eq!(
            format_report(&ValidationResult::new(), Path::new("c.yaml")),
            "c.yaml: configuration is valid."
        );
    }
}
