//! Harness configuration.
//!
//! Values are resolved once at startup and then shared read-only between
//! scenarios.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HarnessError, Result};
use crate::types::UserIds;

/// Root configuration for a harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Builder binary, either a path or a name looked up on `$PATH`.
    pub builder: PathBuf,
    /// Base directory under which every scenario gets its own workspace.
    pub base_dir: PathBuf,
    /// Upper bound for a single build, in seconds.
    pub build_timeout_secs: u64,
    /// Upper bound for a single in-image probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Number of scenarios allowed to run concurrently.
    pub jobs: usize,
    /// Identity for unprivileged steps when the harness runs as root.
    pub unprivileged: Option<UserIds>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            builder: PathBuf::from(constants::DEFAULT_BUILDER_BIN),
            base_dir: constants::default_base_dir(),
            build_timeout_secs: constants::DEFAULT_BUILD_TIMEOUT_SECS,
            probe_timeout_secs: constants::DEFAULT_PROBE_TIMEOUT_SECS,
            jobs: constants::DEFAULT_JOBS,
            unprivileged: None,
        }
    }
}

impl HarnessConfig {
    /// Builds a configuration from defaults overlaid with `BUILDPROBE_*`
    /// variables and the `SUDO_UID`/`SUDO_GID` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HarnessConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(builder) = lookup(constants::ENV_BUILDER) {
            config.builder = PathBuf::from(builder);
        }
        if let Some(dir) = lookup(constants::ENV_TMPDIR) {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup(constants::ENV_BUILD_TIMEOUT) {
            config.build_timeout_secs = parse_number(constants::ENV_BUILD_TIMEOUT, &secs)?;
        }
        if let Some(jobs) = lookup(constants::ENV_JOBS) {
            config.jobs = parse_number(constants::ENV_JOBS, &jobs)?;
        }
        if let (Some(uid), Some(gid)) = (lookup("SUDO_UID"), lookup("SUDO_GID")) {
            config.unprivileged = Some(UserIds {
                uid: parse_number("SUDO_UID", &uid)?,
                gid: parse_number("SUDO_GID", &gid)?,
            });
        }
        tracing::debug!(?config, "resolved harness configuration");
        Ok(config)
    }

    /// Build timeout as a [`Duration`].
    #[must_use]
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Probe timeout as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Resolves the builder binary to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MissingDependency`] if the builder cannot be found.
    pub fn resolve_builder(&self) -> Result<PathBuf> {
        which::which(&self.builder).map_err(|e| HarnessError::MissingDependency {
            name: self.builder.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| HarnessError::Config {
        message: format!("{key} must be a non-negative integer, got \"{value}\""),
    })
}
