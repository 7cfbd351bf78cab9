//! Per-scenario workspace with guaranteed cleanup.
//!
//! Every scenario gets its own directory under the harness base directory.
//! Images, rendered definitions, auxiliary files, and host-side artifacts
//! are tracked and removed when the context is closed or dropped, including
//! when a step panics halfway through.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::ScenarioId;
use tempfile::TempDir;

/// Subdirectory that relative `%pre`/`%setup` paths resolve into.
const HOST_DIR: &str = "host";

/// Isolated workspace owned by one running scenario.
#[derive(Debug)]
pub struct ScenarioContext {
    id: ScenarioId,
    name: String,
    dir: Option<TempDir>,
    tracked: Vec<PathBuf>,
}

impl ScenarioContext {
    /// Creates a unique directory for `scenario` under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the directory cannot be created.
    pub fn new(base_dir: &Path, scenario: &str) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(|e| HarnessError::io(base_dir, e))?;
        let id = ScenarioId::generate();
        let prefix = format!("{}-{}-", sanitize(scenario), id.short());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(base_dir)
            .map_err(|e| HarnessError::io(base_dir, e))?;
        tracing::debug!(scenario, id = %id, dir = %dir.path().display(), "scenario context created");
        Ok(Self {
            id,
            name: scenario.to_string(),
            dir: Some(dir),
            tracked: Vec::new(),
        })
    }

    /// Identity of this scenario run.
    #[must_use]
    pub const fn id(&self) -> &ScenarioId {
        &self.id
    }

    /// The scenario directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.as_ref().map_or_else(|| Path::new(""), TempDir::path)
    }

    /// Directory for host-side build artifacts, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the directory cannot be created.
    pub fn host_dir(&self) -> Result<PathBuf> {
        let dir = self.dir().join(HOST_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| HarnessError::io(&dir, e))?;
        Ok(dir)
    }

    /// Scenario-local path for the image called `name`, tracked for removal.
    pub fn image_path(&mut self, name: &str) -> PathBuf {
        let path = self.dir().join(name);
        self.track(path.clone());
        path
    }

    /// Schedules `path` for removal when the scenario ends.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.tracked.contains(&path) {
            self.tracked.push(path);
        }
    }

    /// Paths scheduled for removal, in tracking order.
    #[must_use]
    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    /// Removes every tracked path and the scenario directory.
    ///
    /// # Errors
    ///
    /// Returns the first removal failure; removal of the remaining paths is
    /// still attempted.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let mut first_err = None;
        for path in self.tracked.drain(..).rev() {
            if let Err(e) = remove_path(&path) {
                tracing::warn!(scenario = %self.name, path = %path.display(), error = %e, "cleanup failed");
                let _ = first_err.get_or_insert(e);
            }
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(scenario = %self.name, path = %path.display(), error = %e, "cleanup failed");
                let _ = first_err.get_or_insert(HarnessError::io(path, e));
            }
        }
        tracing::debug!(scenario = %self.name, id = %self.id, "scenario context released");
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ScenarioContext {
    fn drop(&mut self) {
        if self.dir.is_some() {
            let _ = self.release();
        }
    }
}

fn remove_path(path: &Path) -> Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io(path, e)),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}
