//! Lookup of optional external tools a scenario depends on.

use std::path::PathBuf;

use buildprobe_common::error::{HarnessError, Result};

/// Locates `tool` on `$PATH`.
///
/// # Errors
///
/// Returns [`HarnessError::MissingDependency`] if the tool is not found.
pub fn require(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|e| HarnessError::MissingDependency {
        name: tool.to_string(),
        reason: format!("not found in PATH ({e})"),
    })
}

/// Checks every tool and returns the first one that is missing.
///
/// # Errors
///
/// Returns [`HarnessError::MissingDependency`] for the first missing tool.
pub fn require_all<S: AsRef<str>>(tools: &[S]) -> Result<()> {
    for tool in tools {
        let path = require(tool.as_ref())?;
        tracing::debug!(tool = tool.as_ref(), path = %path.display(), "dependency found");
    }
    Ok(())
}
