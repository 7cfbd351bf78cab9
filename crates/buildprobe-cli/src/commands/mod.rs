//! CLI command definitions and dispatch.

pub mod render;
pub mod run;
pub mod verify;

use std::path::PathBuf;
use std::process::ExitCode;

use buildprobe_common::config::HarnessConfig;
use buildprobe_common::constants::{ENV_BUILD_TIMEOUT, ENV_BUILDER, ENV_TMPDIR};
use clap::{Parser, Subcommand, ValueEnum};

/// buildprobe: verification harness for container image builders.
#[derive(Parser, Debug)]
#[command(name = "bprobe", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Builder binary, a path or a name on `$PATH`.
    #[arg(long, global = true, env = ENV_BUILDER)]
    pub builder: Option<PathBuf>,

    /// Base directory for scenario workspaces.
    #[arg(long, global = true, env = ENV_TMPDIR)]
    pub tmp_dir: Option<PathBuf>,

    /// Upper bound for a single build, in seconds.
    #[arg(long, global = true, env = ENV_BUILD_TIMEOUT, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the standard suite or a YAML suite file.
    Run(run::RunArgs),
    /// Render a YAML definition model to definition text.
    Render(render::RenderArgs),
    /// Verify an existing image against a definition.
    Verify(verify::VerifyArgs),
}

/// Report format on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

impl Cli {
    /// Resolves the harness configuration: defaults, then environment, then
    /// flags.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment value is malformed.
    pub fn config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = HarnessConfig::from_env()?;
        if let Some(builder) = &self.builder {
            config.builder.clone_from(builder);
        }
        if let Some(dir) = &self.tmp_dir {
            config.base_dir.clone_from(dir);
        }
        if let Some(secs) = self.timeout {
            config.build_timeout_secs = secs;
        }
        Ok(config)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command cannot be carried out. Scenario and
/// verification failures are reported through the exit code instead.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config()?;
    match cli.command {
        Command::Run(args) => run::execute(&args, config),
        Command::Render(args) => render::execute(&args),
        Command::Verify(args) => verify::execute(&args, &config),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "bprobe",
            "--builder",
            "/opt/builder/bin/singularity",
            "--tmp-dir",
            "/var/tmp/probe",
            "--timeout",
            "90",
            "run",
        ])
        .expect("parse");
        let config = cli.config().expect("config");
        assert_eq!(config.builder, PathBuf::from("/opt/builder/bin/singularity"));
        assert_eq!(config.base_dir, PathBuf::from("/var/tmp/probe"));
        assert_eq!(config.build_timeout_secs, 90);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["bprobe", "run", "--json", "--filter", "definition/"])
            .expect("parse");
        assert!(cli.json);
        match cli.command {
            Command::Run(args) => assert_eq!(args.filter.as_deref(), Some("definition/")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verify_requires_a_definition() {
        assert!(Cli::try_parse_from(["bprobe", "verify", "/tmp/image"]).is_err());
    }
}
