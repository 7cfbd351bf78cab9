//! `bprobe render`: Render a YAML definition model.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use buildprobe_definition::{DefinitionModel, RenderedDefinition, render};
use clap::Args;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// YAML file holding the definition model.
    pub model: PathBuf,

    /// Write the definition here instead of stdout. Inline `%files`
    /// sources are written next to it.
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,
}

/// Executes the `render` command.
///
/// # Errors
///
/// Returns an error if the model cannot be read or is invalid, or if the
/// output cannot be written.
pub fn execute(args: &RenderArgs) -> anyhow::Result<ExitCode> {
    let model = load_model(&args.model)?;
    match &args.output {
        Some(out) => {
            let dir = out.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = out
                .file_name()
                .with_context(|| format!("{} is not a file path", out.display()))?;
            std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
            let rendered = RenderedDefinition::write(&model, dir, &name.to_string_lossy())?;
            for aux in &rendered.aux_files {
                tracing::info!(path = %aux.display(), "auxiliary file written");
            }
        }
        None => print!("{}", render(&model)?),
    }
    Ok(ExitCode::SUCCESS)
}

/// Reads a YAML definition model.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load_model(path: &Path) -> anyhow::Result<DefinitionModel> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid definition model {}", path.display()))
}
