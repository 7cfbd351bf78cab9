//! Domain primitive types used across the buildprobe workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(String);

impl ScenarioId {
    /// Creates a scenario ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random scenario ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first eight characters, used to suffix scenario-local paths.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Privilege level a scenario or step runs the builder with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// Run with whatever identity the harness has.
    #[default]
    Inherit,
    /// Requires root; skipped when the harness is unprivileged.
    Privileged,
    /// Drops to the configured unprivileged identity when running as root.
    Unprivileged,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => write!(f, "inherit"),
            Self::Privileged => write!(f, "privileged"),
            Self::Unprivileged => write!(f, "unprivileged"),
        }
    }
}

/// Numeric identity used for unprivileged execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIds {
    /// User ID.
    pub uid: u32,
    /// Group ID.
    pub gid: u32,
}

/// The independent check a contract violation was found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Always-present metadata paths.
    Presence,
    /// Help document.
    Help,
    /// Run script.
    RunScript,
    /// Start script.
    StartScript,
    /// Test script.
    TestScript,
    /// Runtime environment.
    Environment,
    /// Label record.
    Labels,
    /// Files copied by `%files`.
    Files,
    /// Host artifacts created by `%pre`.
    PreArtifact,
    /// Host artifacts created by `%setup`.
    SetupArtifact,
    /// In-image artifacts created by `%post`.
    PostArtifact,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Presence => "presence",
            Self::Help => "help",
            Self::RunScript => "runscript",
            Self::StartScript => "startscript",
            Self::TestScript => "test",
            Self::Environment => "environment",
            Self::Labels => "labels",
            Self::Files => "files",
            Self::PreArtifact => "pre",
            Self::SetupArtifact => "setup",
            Self::PostArtifact => "post",
        };
        f.write_str(name)
    }
}

/// What the comparator actually found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observed {
    /// The expected item does not exist.
    Missing,
    /// The item exists with this (mismatching) value.
    Value(String),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("<absent>"),
            Self::Value(v) => f.write_str(v),
        }
    }
}

/// A declared expectation the built artifact does not meet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractViolation {
    /// Check that found the violation.
    pub check: Check,
    /// Path, key, or line the violation concerns.
    pub subject: String,
    /// Declared value.
    pub expected: String,
    /// Observed value or absence.
    pub observed: Observed,
}

impl ContractViolation {
    /// Creates a violation record.
    #[must_use]
    pub fn new(
        check: Check,
        subject: impl Into<String>,
        expected: impl Into<String>,
        observed: Observed,
    ) -> Self {
        Self {
            check,
            subject: subject.into(),
            expected: expected.into(),
            observed,
        }
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: expected {}, observed {}",
            self.check, self.subject, self.expected, self.observed
        )
    }
}
