//! Static validation of a definition model before it is rendered.
//!
//! Catches models the builder could not consume so that no subprocess is
//! spawned for them.

use std::collections::HashSet;
use std::path::Path;

use buildprobe_common::error::{HarnessError, Result};

use crate::model::{DefinitionModel, FileSource};

/// Validates a model for rendering.
///
/// # Checks performed
///
/// 1. The bootstrap kind is present and a single token.
/// 2. Environment entries are `KEY=VALUE` with a non-empty key.
/// 3. Label keys are non-empty and contain no whitespace.
/// 4. `%files` sources are non-empty and inline file names are unique.
/// 5. `%pre`/`%setup` paths are absolute host paths.
///
/// # Errors
///
/// Returns [`HarnessError::Render`] naming the first failing field.
pub fn validate(model: &DefinitionModel) -> Result<()> {
    tracing::debug!(bootstrap = %model.bootstrap, "validating definition model");
    check_bootstrap(model)?;
    check_environment(model)?;
    check_labels(model)?;
    check_files(model)?;
    check_host_paths("pre", &model.pre)?;
    check_host_paths("setup", &model.setup)?;
    Ok(())
}

fn render_err(message: String) -> HarnessError {
    HarnessError::Render { message }
}

fn check_bootstrap(model: &DefinitionModel) -> Result<()> {
    let kind = model.bootstrap.trim();
    if kind.is_empty() {
        return Err(render_err("bootstrap kind is required".into()));
    }
    if kind.split_whitespace().count() != 1 {
        return Err(render_err(format!(
            "bootstrap kind must be a single word, got \"{kind}\""
        )));
    }
    Ok(())
}

fn check_environment(model: &DefinitionModel) -> Result<()> {
    for entry in &model.environment {
        match entry.split_once('=') {
            Some((key, _)) if !key.trim().is_empty() => {}
            _ => {
                return Err(render_err(format!(
                    "environment entry \"{entry}\" is not KEY=VALUE"
                )));
            }
        }
    }
    Ok(())
}

fn check_labels(model: &DefinitionModel) -> Result<()> {
    for key in model.labels.keys() {
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(render_err(format!(
                "label key \"{key}\" must be non-empty without whitespace"
            )));
        }
    }
    Ok(())
}

fn check_files(model: &DefinitionModel) -> Result<()> {
    let mut inline_names = HashSet::new();
    for pair in &model.files {
        match &pair.source {
            FileSource::Src(path) if path.as_os_str().is_empty() => {
                return Err(render_err("%files entry has an empty source".into()));
            }
            FileSource::Src(path) if path.to_string_lossy().chars().any(char::is_whitespace) => {
                return Err(render_err(format!(
                    "%files source \"{}\" contains whitespace",
                    path.display()
                )));
            }
            FileSource::Inline(file)
                if file.name.is_empty()
                    || file.name.contains('/')
                    || file.name.chars().any(char::is_whitespace) =>
            {
                return Err(render_err(format!(
                    "inline file name \"{}\" must be a plain file name",
                    file.name
                )));
            }
            FileSource::Inline(file) if !inline_names.insert(file.name.as_str()) => {
                return Err(render_err(format!(
                    "duplicate inline file name \"{}\"",
                    file.name
                )));
            }
            _ => {}
        }
        if pair.dst.chars().any(char::is_whitespace) {
            return Err(render_err(format!(
                "%files destination \"{}\" contains whitespace",
                pair.dst
            )));
        }
    }
    Ok(())
}

fn check_host_paths(section: &str, paths: &[String]) -> Result<()> {
    for path in paths {
        if !Path::new(path).is_absolute() {
            return Err(render_err(format!(
                "%{section} artifact \"{path}\" must be an absolute host path"
            )));
        }
    }
    Ok(())
}
