//! Aggregated outcome of one comparator run.

use std::path::{Path, PathBuf};

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Check, ContractViolation, Observed};
use serde::Serialize;

/// Every check that ran against an image and every violation it found.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    image: PathBuf,
    checks: Vec<Check>,
    violations: Vec<ContractViolation>,
}

impl Report {
    /// Creates an empty report for `image`.
    #[must_use]
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            checks: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Records that `check` ran and produced `violations`.
    pub fn record(&mut self, check: Check, violations: Vec<ContractViolation>) {
        if violations.is_empty() {
            tracing::debug!(image = %self.image.display(), %check, "check passed");
        } else {
            tracing::warn!(
                image = %self.image.display(),
                %check,
                violations = violations.len(),
                "check failed"
            );
        }
        if !self.checks.contains(&check) {
            self.checks.push(check);
        }
        self.violations.extend(violations);
    }

    /// Records the outcome of `check`, keeping an I/O failure as a violation.
    ///
    /// # Errors
    ///
    /// Propagates every error other than [`HarnessError::Io`].
    pub fn settle(&mut self, check: Check, outcome: Result<Vec<ContractViolation>>) -> Result<()> {
        self.record(check, io_as_violation(check, outcome)?);
        Ok(())
    }

    /// Image the report is about.
    #[must_use]
    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Checks that ran, in execution order.
    #[must_use]
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Violations found so far.
    #[must_use]
    pub fn violations(&self) -> &[ContractViolation] {
        &self.violations
    }

    /// Whether no check found a violation.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts the report into `Ok(())` or a [`HarnessError::Contract`].
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Contract`] carrying every violation.
    pub fn into_result(self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Contract {
                violations: self.violations,
            })
        }
    }
}

/// Turns an unreadable path into a violation of `check`.
pub(crate) fn io_as_violation(
    check: Check,
    outcome: Result<Vec<ContractViolation>>,
) -> Result<Vec<ContractViolation>> {
    match outcome {
        Err(HarnessError::Io { path, source }) => {
            tracing::debug!(path = %path.display(), %check, error = %source, "path unreadable");
            Ok(vec![ContractViolation::new(
                check,
                path.display().to_string(),
                "readable path",
                Observed::Value(source.to_string()),
            )])
        }
        other => other,
    }
}
