//! Builder abstraction shared by the comparator and the orchestrator.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use buildprobe_common::error::Result;
use buildprobe_common::types::Privilege;

/// What a build starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    /// A definition file on the host.
    DefinitionFile(PathBuf),
    /// A remote URI (`docker://busybox`, `shub://...`).
    Uri(String),
    /// Another built image.
    Image(PathBuf),
}

impl SpecSource {
    /// The argument passed to the builder.
    #[must_use]
    pub fn as_arg(&self) -> OsString {
        match self {
            Self::DefinitionFile(path) | Self::Image(path) => path.clone().into_os_string(),
            Self::Uri(uri) => OsString::from(uri),
        }
    }
}

impl fmt::Display for SpecSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefinitionFile(path) => write!(f, "definition {}", path.display()),
            Self::Uri(uri) => write!(f, "uri {uri}"),
            Self::Image(path) => write!(f, "image {}", path.display()),
        }
    }
}

/// Per-build options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Overwrite an existing image at the target path.
    pub force: bool,
    /// Produce a writable directory tree instead of a packed image.
    pub sandbox: bool,
    /// Replacement environment for the builder; `None` inherits the harness's.
    pub env: Option<Vec<(String, String)>>,
    /// Identity the builder runs with.
    pub privilege: Privilege,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Combined stdout and stderr of the builder.
    pub output: String,
    /// Wall-clock duration of the build.
    pub elapsed: Duration,
}

/// Output of a command run inside an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code, `None` if the command was killed.
    pub exit_code: Option<i32>,
    /// Whether the probe exceeded its timeout.
    pub timed_out: bool,
}

/// Interpretation of a predicate probe such as `test -f <path>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Exit code 0.
    True,
    /// Exit code 1.
    False,
    /// Any other exit, a kill, or a timeout.
    Unexpected(Option<i32>),
}

impl ExecOutput {
    /// Applies the probe exit-code convention: 0 true, 1 false, other unexpected.
    #[must_use]
    pub const fn predicate(&self) -> ProbeResult {
        if self.timed_out {
            return ProbeResult::Unexpected(None);
        }
        match self.exit_code {
            Some(0) => ProbeResult::True,
            Some(1) => ProbeResult::False,
            other => ProbeResult::Unexpected(other),
        }
    }
}

/// Runs commands inside a built image.
pub trait ImageProbe: Send + Sync {
    /// Runs `args` inside `image` through the builder's exec entry point.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or the privilege
    /// level cannot be satisfied. A non-zero exit is not an error.
    fn exec(&self, image: &Path, args: &[String], privilege: Privilege) -> Result<ExecOutput>;
}

/// Produces images from build specifications.
pub trait ImageBuilder: ImageProbe {
    /// Builds `image` from `source`, blocking until the builder exits.
    ///
    /// Callers own cleanup of `image`; nothing is removed on failure.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Build` for a non-zero exit, spawn failure, or
    /// timeout, and `HarnessError::MissingDependency` if the privilege level
    /// cannot be satisfied.
    fn build(&self, image: &Path, source: &SpecSource, options: &BuildOptions)
    -> Result<BuildOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_output(exit_code: Option<i32>, timed_out: bool) -> ExecOutput {
        ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            timed_out,
        }
    }

    #[test]
    fn predicate_follows_exit_code_convention() {
        assert_eq!(exec_output(Some(0), false).predicate(), ProbeResult::True);
        assert_eq!(exec_output(Some(1), false).predicate(), ProbeResult::False);
        assert_eq!(
            exec_output(Some(2), false).predicate(),
            ProbeResult::Unexpected(Some(2))
        );
        assert_eq!(exec_output(None, false).predicate(), ProbeResult::Unexpected(None));
    }

    #[test]
    fn timed_out_probe_is_unexpected_even_with_zero_exit() {
        assert_eq!(exec_output(Some(0), true).predicate(), ProbeResult::Unexpected(None));
    }

    #[test]
    fn spec_source_arguments() {
        assert_eq!(
            SpecSource::Uri("docker://busybox".into()).as_arg(),
            OsString::from("docker://busybox")
        );
        assert_eq!(
            SpecSource::Image(PathBuf::from("/tmp/container1")).as_arg(),
            OsString::from("/tmp/container1")
        );
    }

    #[test]
    fn build_options_default_inherits_environment() {
        let opts = BuildOptions::default();
        assert!(opts.env.is_none());
        assert!(!opts.force);
        assert!(!opts.sandbox);
        assert_eq!(opts.privilege, Privilege::Inherit);
    }
}
