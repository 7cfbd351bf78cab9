//! Subprocess-backed builder: `build` and `exec` through the builder binary.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use buildprobe_common::config::HarnessConfig;
use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Privilege, UserIds};

use crate::backend::{BuildOptions, BuildOutput, ExecOutput, ImageBuilder, ImageProbe, SpecSource};
use crate::privilege;
use crate::process::{self, Capture, ProcessError};

/// Drives the external builder binary.
#[derive(Debug, Clone)]
pub struct BuildDriver {
    builder: PathBuf,
    build_timeout: Duration,
    probe_timeout: Duration,
    unprivileged: Option<UserIds>,
}

impl BuildDriver {
    /// Creates a driver for `builder` with default timeouts.
    #[must_use]
    pub fn new(builder: impl Into<PathBuf>) -> Self {
        let defaults = HarnessConfig::default();
        Self {
            builder: builder.into(),
            build_timeout: defaults.build_timeout(),
            probe_timeout: defaults.probe_timeout(),
            unprivileged: None,
        }
    }

    /// Creates a driver from the harness configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MissingDependency`] if the builder binary
    /// cannot be located.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let builder = config.resolve_builder()?;
        tracing::info!(builder = %builder.display(), "using builder");
        Ok(Self {
            builder,
            build_timeout: config.build_timeout(),
            probe_timeout: config.probe_timeout(),
            unprivileged: config.unprivileged,
        })
    }

    /// Sets the build timeout.
    #[must_use]
    pub const fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Sets the probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the identity used for unprivileged steps when running as root.
    #[must_use]
    pub const fn with_unprivileged(mut self, ids: Option<UserIds>) -> Self {
        self.unprivileged = ids;
        self
    }

    /// Path of the builder binary.
    #[must_use]
    pub fn builder(&self) -> &Path {
        &self.builder
    }

    /// Argument vector for `build [--force] [--sandbox] <image> <source>`.
    #[must_use]
    pub fn build_args(image: &Path, source: &SpecSource, options: &BuildOptions) -> Vec<OsString> {
        let mut argv = vec![OsString::from("build")];
        if options.force {
            argv.push(OsString::from("--force"));
        }
        if options.sandbox {
            argv.push(OsString::from("--sandbox"));
        }
        argv.push(image.as_os_str().to_os_string());
        argv.push(source.as_arg());
        argv
    }

    /// Argument vector for `exec <image> <args...>`.
    #[must_use]
    pub fn exec_args(image: &Path, args: &[String]) -> Vec<OsString> {
        let mut argv = vec![OsString::from("exec"), image.as_os_str().to_os_string()];
        argv.extend(args.iter().map(OsString::from));
        argv
    }
}

impl ImageProbe for BuildDriver {
    fn exec(&self, image: &Path, args: &[String], privilege: Privilege) -> Result<ExecOutput> {
        if args.is_empty() {
            return Err(HarnessError::Config {
                message: "exec command is empty".into(),
            });
        }
        let identity = privilege::resolve(privilege, self.unprivileged)?;

        let mut cmd = Command::new(&self.builder);
        let _ = cmd.args(Self::exec_args(image, args));
        privilege::apply(&mut cmd, identity);

        tracing::debug!(image = %image.display(), cmd = ?args, %privilege, "exec probe");
        let out = process::run_captured(&mut cmd, Capture::Separate, self.probe_timeout)
            .map_err(|e| HarnessError::io(&self.builder, into_io(e)))?;

        Ok(ExecOutput {
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
            timed_out: out.timed_out,
        })
    }
}

impl ImageBuilder for BuildDriver {
    fn build(
        &self,
        image: &Path,
        source: &SpecSource,
        options: &BuildOptions,
    ) -> Result<BuildOutput> {
        let identity = privilege::resolve(options.privilege, self.unprivileged)?;

        let mut cmd = Command::new(&self.builder);
        let _ = cmd.args(Self::build_args(image, source, options));
        if let Some(env) = &options.env {
            let _ = cmd
                .env_clear()
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        privilege::apply(&mut cmd, identity);

        tracing::info!(
            image = %image.display(),
            %source,
            force = options.force,
            sandbox = options.sandbox,
            privilege = %options.privilege,
            "building image"
        );

        let out = match process::run_captured(&mut cmd, Capture::Combined, self.build_timeout) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(image = %image.display(), error = %e, "builder could not run");
                return Err(HarnessError::Build {
                    image: image.to_path_buf(),
                    exit_code: None,
                    timed_out: false,
                    output: e.to_string(),
                });
            }
        };

        if out.timed_out || out.exit_code != Some(0) {
            tracing::warn!(
                image = %image.display(),
                exit_code = ?out.exit_code,
                timed_out = out.timed_out,
                "build failed"
            );
            return Err(HarnessError::Build {
                image: image.to_path_buf(),
                exit_code: out.exit_code,
                timed_out: out.timed_out,
                output: out.stdout,
            });
        }

        tracing::info!(image = %image.display(), elapsed_ms = out.elapsed.as_secs_f64() * 1000.0, "build finished");
        Ok(BuildOutput {
            output: out.stdout,
            elapsed: out.elapsed,
        })
    }
}

fn into_io(err: ProcessError) -> std::io::Error {
    match err {
        ProcessError::Spawn { source, .. } => source,
        ProcessError::Capture(source) | ProcessError::Wait(source) => source,
    }
}
