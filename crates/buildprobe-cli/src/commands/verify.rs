//! `bprobe verify`: Check an existing image against a definition.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use buildprobe_common::config::HarnessConfig;
use buildprobe_definition::DefinitionModel;
use buildprobe_definition::parser::parse_definition;
use buildprobe_driver::BuildDriver;
use buildprobe_verify::Comparator;
use clap::Args;

use crate::commands::{Format, render};
use crate::output;

/// Arguments for the `verify` command.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Sandbox image directory to inspect.
    pub image: PathBuf,

    /// Definition file, or a YAML model when it ends in `.yaml`/`.yml`.
    #[arg(long, value_name = "FILE")]
    pub definition: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t)]
    pub format: Format,
}

/// Executes the `verify` command.
///
/// Exits with failure if the image violates the definition.
///
/// # Errors
///
/// Returns an error if the definition cannot be loaded, the builder cannot
/// be located, or a probe cannot run at all.
pub fn execute(args: &VerifyArgs, config: &HarnessConfig) -> anyhow::Result<ExitCode> {
    let model = load_definition(&args.definition)?;
    let driver = BuildDriver::from_config(config).context("cannot use the configured builder")?;
    let report = Comparator::new(&driver)
        .verify_definition(&args.image, &model)
        .with_context(|| format!("cannot verify {}", args.image.display()))?;

    match args.format {
        Format::Table => print!("{}", output::report(&report)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Loads a verification contract from a definition file or a YAML model.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_definition(path: &Path) -> anyhow::Result<DefinitionModel> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        return render::load_model(path);
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    parse_definition(&text).with_context(|| format!("invalid definition file {}", path.display()))
}
