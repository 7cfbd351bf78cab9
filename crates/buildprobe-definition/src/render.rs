//! Rendering of a definition model into the builder's section-based text.
//!
//! Rendering is pure: the same model always yields byte-identical text.
//! Sections whose field is empty are omitted without affecting the others.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use buildprobe_common::error::{HarnessError, Result};

use crate::model::{DefinitionModel, FilePair, FileSource};
use crate::validator;

/// Indentation applied to every section body line.
const BODY_INDENT: &str = "    ";

/// Renders a model into definition text.
///
/// Every `%files` source must already be a host path; see [`materialize`].
///
/// # Errors
///
/// Returns [`HarnessError::Render`] if the model fails validation or still
/// carries inline files.
pub fn render(model: &DefinitionModel) -> Result<String> {
    validator::validate(model)?;

    let mut out = String::new();
    let _ = writeln!(out, "Bootstrap: {}", model.bootstrap.trim());
    if !model.from.trim().is_empty() {
        let _ = writeln!(out, "From: {}", model.from.trim());
    }

    push_section(&mut out, "help", model.help.iter().map(String::as_str));
    push_section(
        &mut out,
        "environment",
        model.environment.iter().map(|e| format!("export {e}")),
    );
    push_section(
        &mut out,
        "labels",
        model.labels.iter().map(|(k, v)| format!("{k} {v}")),
    );
    push_section(&mut out, "files", file_lines(&model.files)?);
    push_section(&mut out, "runscript", model.run_script.iter().map(String::as_str));
    push_section(&mut out, "startscript", model.start_script.iter().map(String::as_str));
    push_section(&mut out, "test", model.test_script.iter().map(String::as_str));
    push_section(&mut out, "pre", touch_lines(&model.pre));
    push_section(&mut out, "setup", touch_lines(&model.setup));
    push_section(&mut out, "post", touch_lines(&model.post));
    Ok(out)
}

fn push_section<I, S>(out: &mut String, name: &str, lines: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = lines.into_iter().peekable();
    if lines.peek().is_none() {
        return;
    }
    let _ = writeln!(out, "\n%{name}");
    for line in lines {
        let _ = writeln!(out, "{BODY_INDENT}{}", line.as_ref());
    }
}

fn file_lines(files: &[FilePair]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|pair| match &pair.source {
            FileSource::Src(src) if pair.dst.is_empty() => Ok(src.display().to_string()),
            FileSource::Src(src) => Ok(format!("{} {}", src.display(), pair.dst)),
            FileSource::Inline(file) => Err(HarnessError::Render {
                message: format!("inline file \"{}\" has not been materialized", file.name),
            }),
        })
        .collect()
}

fn touch_lines(paths: &[String]) -> impl Iterator<Item = String> + '_ {
    paths.iter().map(|p| format!("touch {p}"))
}

/// Writes inline `%files` sources into `dir`.
///
/// Returns a copy of the model whose file sources are all host paths, along
/// with the files that were written.
///
/// # Errors
///
/// Returns an error if a file cannot be written or its mode cannot be set.
pub fn materialize(model: &DefinitionModel, dir: &Path) -> Result<(DefinitionModel, Vec<PathBuf>)> {
    let mut resolved = model.clone();
    let mut written = Vec::new();
    for pair in &mut resolved.files {
        let FileSource::Inline(file) = &pair.source else {
            continue;
        };
        let path = dir.join(&file.name);
        std::fs::write(&path, &file.content).map_err(|e| HarnessError::io(&path, e))?;
        set_mode(&path, file.mode)?;
        tracing::debug!(path = %path.display(), mode = %format!("{:o}", file.mode), "materialized inline file");
        if pair.dst.is_empty() {
            pair.dst.clone_from(&file.name);
        }
        pair.source = FileSource::Src(path.clone());
        written.push(path);
    }
    Ok((resolved, written))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| HarnessError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// A definition file written to disk together with its auxiliary files.
#[derive(Debug, Clone)]
pub struct RenderedDefinition {
    /// Path of the definition file.
    pub path: PathBuf,
    /// Auxiliary files written for `%files` entries.
    pub aux_files: Vec<PathBuf>,
    /// Model with every file source resolved to a host path.
    pub model: DefinitionModel,
    /// The rendered text.
    pub text: String,
}

impl RenderedDefinition {
    /// Materializes, renders, and writes `model` as `dir/file_name`.
    ///
    /// # Errors
    ///
    /// Returns a render error for invalid models or an I/O error if any file
    /// cannot be written.
    pub fn write(model: &DefinitionModel, dir: &Path, file_name: &str) -> Result<Self> {
        validator::validate(model)?;
        let (resolved, aux_files) = materialize(model, dir)?;
        let text = render(&resolved)?;
        let path = dir.join(file_name);
        std::fs::write(&path, &text).map_err(|e| HarnessError::io(&path, e))?;
        tracing::info!(path = %path.display(), aux = aux_files.len(), "definition written");
        Ok(Self {
            path,
            aux_files,
            model: resolved,
            text,
        })
    }

    /// Every file this rendering put on disk.
    pub fn written_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.path.as_path()).chain(self.aux_files.iter().map(PathBuf::as_path))
    }
}
