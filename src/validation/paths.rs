//! Path validation for the transcode workspace.

use std::path::Path;

use crate::config::model::AppConfig;

use super::{ValidationIssue, ValidationResult};

/// What a run needs to do inside a workspace directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Validates that the workspace directories exist.
///
/// The comparison directory is created on demand by the evaluator, so only
/// the source, output and performance directories are required up front.
pub fn validate(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    let workspace = &config.workspace;

    let required = [
        (workspace.source_path(), "workspace.source_dir", Access::Read),
        (workspace.output_path(), "workspace.output_dir", Access::Write),
        (workspace.performance_path(), "workspace.performance_dir", Access::Write),
    ];
    for (path, field, access) in &required {
        if let Some(issue) = check_directory(path, field, *access) {
            result.add(issue);
        }
    }

    let comparison = workspace.comparison_path();
    if comparison.exists() && !comparison.is_dir() {
        result.add(ValidationIssue::error(
            "workspace.comparison_dir",
            format!("Path is not a directory: '{}'", comparison.display()),
        ));
    }

    if workspace.source_dir == workspace.output_dir {
        result.add(ValidationIssue::error(
            "workspace.output_dir",
            "Source and output directories cannot be the same",
        ));
    }

    result
}

fn check_directory(path: &Path, field: &str, access: Access) -> Option<ValidationIssue> {
    if !path.exists() {
        return Some(
            ValidationIssue::error(
                field,
                format!("Invalid working directory, missing '{}'", path.display()),
            )
            .with_suggestion("Run from a workspace containing source/, hevc/ and performance/"),
        );
    }

    if !path.is_dir() {
        return Some(ValidationIssue::error(
            field,
            format!("Path is not a directory: '{}'", path.display()),
        ));
    }

    let (denied, adjective) = match access {
        Access::Read => (std::fs::read_dir(path).err(), "readable"),
        Access::Write => (probe_write(path).err(), "writable"),
    };

    denied.map(|e| {
        ValidationIssue::error(
            field,
            format!("Directory is not {} '{}': {}", adjective, path.display(), e),
        )
        .with_suggestion("Check directory permissions")
    })
}

/// Creates and removes a marker file.
fn probe_write(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(".transcode-eval-write-test");
    std::fs::write(&marker, b"")?;
    std::fs::remove_file(&marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("source")).unwrap();

        let mut config = AppConfig::default();
        config.workspace.root = dir.path().to_path_buf();

        let result = validate(&config);
        let paths: Vec<_> = result.errors().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["workspace.output_dir", "workspace.performance_dir"]);
    }

    #[test]
    fn rejects_identical_source_and_output() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["source", "performance"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }

        let mut config = AppConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        config.workspace.output_dir = "source".into();

        let result = validate(&config);
        assert_eq!(result.error_count(), 1);
        assert!(result.errors().next().unwrap().message.contains("cannot be the same"));
    }
}
