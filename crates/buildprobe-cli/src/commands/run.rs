//! `bprobe run`: Run verification scenarios against the builder.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::Context;
use buildprobe_common::config::HarnessConfig;
use buildprobe_common::constants::ENV_JOBS;
use buildprobe_driver::BuildDriver;
use buildprobe_scenario::suite;
use buildprobe_scenario::{Orchestrator, Outcome, Scenario};
use clap::Args;

use crate::commands::Format;
use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML suite file; the standard suite runs when omitted.
    #[arg(long, value_name = "FILE")]
    pub suite: Option<PathBuf>,

    /// Directory that relative definition-file paths resolve against.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub definitions_dir: PathBuf,

    /// Only run scenarios whose name contains this text.
    #[arg(long, value_name = "SUBSTR")]
    pub filter: Option<String>,

    /// Number of scenarios to run at the same time.
    #[arg(short, long, env = ENV_JOBS)]
    pub jobs: Option<usize>,

    /// List the selected scenarios without running them.
    #[arg(long)]
    pub list: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t)]
    pub format: Format,
}

/// Executes the `run` command.
///
/// Exits with failure if any scenario failed. Skipped scenarios do not fail
/// the run.
///
/// # Errors
///
/// Returns an error if the suite cannot be loaded, nothing matches the
/// filter, or the builder cannot be located.
pub fn execute(args: &RunArgs, mut config: HarnessConfig) -> anyhow::Result<ExitCode> {
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }

    let scenarios = select(args.suite.as_deref(), args.filter.as_deref())?;
    if args.list {
        for scenario in &scenarios {
            println!("{}", scenario.name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let driver = BuildDriver::from_config(&config).context("cannot use the configured builder")?;
    let orchestrator = Orchestrator::new(&driver, &config).with_definitions_dir(&args.definitions_dir);
    let cancel = orchestrator.cancel_flag();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .context("failed to install the interrupt handler")?;

    tracing::info!(
        scenarios = scenarios.len(),
        jobs = config.jobs,
        builder = %driver.builder().display(),
        "run started"
    );
    let reports = orchestrator.run_all(&scenarios);

    match args.format {
        Format::Table => print!("{}", output::summary(&reports)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    let failed = reports.iter().any(|r| r.outcome == Outcome::Failed);
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn select(suite_file: Option<&Path>, pattern: Option<&str>) -> anyhow::Result<Vec<Scenario>> {
    let scenarios = match suite_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read suite file {}", path.display()))?;
            suite::load_suite(&text).with_context(|| format!("invalid suite file {}", path.display()))?
        }
        None => suite::standard_suite(),
    };
    let selected = suite::filter(scenarios, pattern);
    if selected.is_empty() {
        anyhow::bail!("no scenario matches \"{}\"", pattern.unwrap_or_default());
    }
    Ok(selected)
}
