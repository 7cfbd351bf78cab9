//! Unified error types for the buildprobe workspace.
//!
//! The variants follow the harness taxonomy: render, build, contract,
//! missing-dependency (a skip, not a failure), and host I/O errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ContractViolation;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A host filesystem operation (probe or cleanup) failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A definition model is malformed or incomplete.
    #[error("cannot render definition: {message}")]
    Render {
        /// Description of the invalid field.
        message: String,
    },

    /// The builder exited non-zero, timed out, or could not be spawned.
    #[error("{}", describe_build_failure(.image, .exit_code, .timed_out, .output))]
    Build {
        /// Image path the build was asked to produce.
        image: PathBuf,
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
        /// Whether the build was killed after exceeding its timeout.
        timed_out: bool,
        /// Captured combined stdout and stderr.
        output: String,
    },

    /// The built artifact does not satisfy its declared contract.
    #[error("{} contract violation(s):\n{}", .violations.len(), join_violations(.violations))]
    Contract {
        /// Every unmet expectation found.
        violations: Vec<ContractViolation>,
    },

    /// A required external dependency is unavailable.
    #[error("{name} unavailable: {reason}")]
    MissingDependency {
        /// Name of the missing tool or capability.
        name: String,
        /// Why it is considered unavailable.
        reason: String,
    },

    /// A configuration value or scenario layout is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HarnessError {
    /// Shorthand for wrapping an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the error means "skip this scenario" rather than "fail".
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::MissingDependency { .. })
    }

    /// Returns the captured builder output carried by a build failure.
    pub fn build_output(&self) -> Option<&str> {
        match self {
            Self::Build { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn describe_build_failure(
    image: &std::path::Path,
    exit_code: &Option<i32>,
    timed_out: &bool,
    output: &str,
) -> String {
    let status = if *timed_out {
        "timed out".to_string()
    } else {
        exit_code.map_or_else(
            || "did not start or was killed".to_string(),
            |code| format!("exited with {code}"),
        )
    };
    if output.trim().is_empty() {
        format!("build of {} {status}", image.display())
    } else {
        format!(
            "build of {} {status}; output:\n{}",
            image.display(),
            output.trim_end()
        )
    }
}

fn join_violations(violations: &[ContractViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Check, Observed};

    #[test]
    fn build_error_display_includes_output() {
        let err = HarnessError::Build {
            image: PathBuf::from("/tmp/img"),
            exit_code: Some(255),
            timed_out: false,
            output: "FATAL: no such file\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/img"), "got: {msg}");
        assert!(msg.contains("exited with 255"), "got: {msg}");
        assert!(msg.contains("FATAL: no such file"), "got: {msg}");
    }

    #[test]
    fn build_error_display_reports_timeout() {
        let err = HarnessError::Build {
            image: PathBuf::from("/tmp/img"),
            exit_code: None,
            timed_out: true,
            output: String::new(),
        };
        assert_eq!(err.to_string(), "build of /tmp/img timed out");
    }

    #[test]
    fn contract_error_lists_every_violation() {
        let err = HarnessError::Contract {
            violations: vec![
                ContractViolation::new(Check::Labels, "FOO", "bar", Observed::Missing),
                ContractViolation::new(
                    Check::RunScript,
                    "/img/.singularity.d/runscript",
                    "mode 0755",
                    Observed::Value("mode 0644".into()),
                ),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 contract violation(s)"), "got: {msg}");
        assert!(msg.contains("labels: FOO"), "got: {msg}");
        assert!(msg.contains("observed mode 0644"), "got: {msg}");
    }

    #[test]
    fn only_missing_dependency_is_a_skip() {
        let skip = HarnessError::MissingDependency {
            name: "debootstrap".into(),
            reason: "not found in PATH".into(),
        };
        let fail = HarnessError::Config {
            message: "x".into(),
        };
        assert!(skip.is_skip());
        assert!(!fail.is_skip());
    }

    #[test]
    fn build_output_only_for_build_errors() {
        let err = HarnessError::Build {
            image: PathBuf::from("/i"),
            exit_code: Some(1),
            timed_out: false,
            output: "log".into(),
        };
        assert_eq!(err.build_output(), Some("log"));
        assert!(HarnessError::Render { message: "m".into() }.build_output().is_none());
    }
}
