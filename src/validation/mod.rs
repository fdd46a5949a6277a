//! Checks a loaded configuration against the workspace before any work starts.

pub mod encoder_params;
pub mod paths;
pub mod report;

use crate::config::model::AppConfig;

/// How serious a [`ValidationIssue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    /// Refuses to run with this configuration.
    Error,
    /// Logged; the run continues.
    Warning,
}

/// One finding against a config field.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    /// Dotted field path, e.g. `encoding.small_options[1]`.
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn with_severity(severity: ValidationSeverity, path: String, message: String) -> Self {
        Self {
            severity,
            path,
            message,
            suggestion: None,
        }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(ValidationSeverity::Error, path.into(), message.into())
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(ValidationSeverity::Warning, path.into(), message.into())
    }

    /// Attaches a hint shown under the message.
    pub fn with_suggestion(self, suggestion: impl Into<String>) -> Self {
        Self {
            suggestion: Some(suggestion.into()),
            ..self
        }
    }
}

/// Issues collected by one validation pass.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    fn by_severity(&self, severity: ValidationSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.by_severity(ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.by_severity(ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Warnings alone keep a configuration valid.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }
}

/// Validates the configuration against the workspace on disk.
pub fn validate_config(config: &AppConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.extend(paths::validate(config));
    result.extend(encoder_params::validate_speed_preset(
        &config.encoding.default_speed_preset,
        "encoding.default_speed_preset",
    ));
    result.extend(encoder_params::validate_options(
        &config.encoding.small_options,
        "encoding.small_options",
    ));

    if config.encoding.output_extension.trim().is_empty() {
        result.add(ValidationIssue::error(
            "encoding.output_extension",
            "Output extension cannot be empty",
        ));
    }

    if config.evaluation.num_frames == 0 {
        result.add(
            ValidationIssue::error("evaluation.num_frames", "At least one sample frame is required")
                .with_suggestion("The default is 5"),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sample_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["source", "hevc", "performance"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }

        let mut config = AppConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        assert!(validate_config(&config).is_valid());

        config.evaluation.num_frames = 0;
        let result = validate_config(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors().next().unwrap().path, "evaluation.num_frames");
    }
}
