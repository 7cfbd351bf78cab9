//! The definition model: a build's inputs and the side effects its image
//! must show.
//!
//! Every populated field maps to exactly one comparator check. An empty
//! collection makes no claim; it never means "must be empty".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Declared contract for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefinitionModel {
    /// Bootstrap agent understood by the builder (`docker`, `localimage`, ...).
    pub bootstrap: String,
    /// Source the bootstrap agent starts from (registry ref, URI, image path).
    pub from: String,
    /// Lines expected in the help document.
    pub help: Vec<String>,
    /// `KEY=VALUE` pairs expected in the runtime environment.
    pub environment: Vec<String>,
    /// Labels expected in the label record.
    pub labels: BTreeMap<String, String>,
    /// Host files copied into the image.
    pub files: Vec<FilePair>,
    /// Lines expected in the run script.
    pub run_script: Vec<String>,
    /// Lines expected in the start script.
    pub start_script: Vec<String>,
    /// Lines expected in the test script.
    pub test_script: Vec<String>,
    /// Host paths the `%pre` phase creates.
    pub pre: Vec<String>,
    /// Host paths the `%setup` phase creates.
    pub setup: Vec<String>,
    /// In-image paths the `%post` phase creates.
    pub post: Vec<String>,
}

/// One `%files` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePair {
    /// Where the file content comes from.
    #[serde(flatten)]
    pub source: FileSource,
    /// Destination inside the image; empty means the source's base name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst: String,
}

/// Origin of a `%files` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// An existing host file.
    Src(PathBuf),
    /// Content written into the scenario directory before rendering.
    Inline(InlineFile),
}

/// A file materialized by the harness itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineFile {
    /// File name inside the scenario directory.
    pub name: String,
    /// File content.
    pub content: String,
    /// Permission bits the file is created with.
    #[serde(default = "default_inline_mode")]
    pub mode: u32,
}

const fn default_inline_mode() -> u32 {
    0o644
}

impl FilePair {
    /// Pair copying an existing host file.
    #[must_use]
    pub fn host(src: impl Into<PathBuf>, dst: impl Into<String>) -> Self {
        Self {
            source: FileSource::Src(src.into()),
            dst: dst.into(),
        }
    }

    /// Pair copying a file the harness writes itself.
    #[must_use]
    pub fn inline(
        name: impl Into<String>,
        content: impl Into<String>,
        mode: u32,
        dst: impl Into<String>,
    ) -> Self {
        Self {
            source: FileSource::Inline(InlineFile {
                name: name.into(),
                content: content.into(),
                mode,
            }),
            dst: dst.into(),
        }
    }

    /// Host path of the source, if it has been materialized.
    #[must_use]
    pub fn host_source(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Src(path) => Some(path),
            FileSource::Inline(_) => None,
        }
    }

    /// Destination inside the image, defaulting to the source's base name.
    #[must_use]
    pub fn destination(&self) -> Option<String> {
        if !self.dst.is_empty() {
            return Some(self.dst.clone());
        }
        match &self.source {
            FileSource::Src(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            FileSource::Inline(file) if !file.name.is_empty() => Some(file.name.clone()),
            FileSource::Inline(_) => None,
        }
    }
}

impl DefinitionModel {
    /// Creates a model with only a bootstrap header.
    #[must_use]
    pub fn new(bootstrap: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            bootstrap: bootstrap.into(),
            from: from.into(),
            ..Self::default()
        }
    }

    /// Sets the expected help lines.
    #[must_use]
    pub fn with_help<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.help = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected `KEY=VALUE` environment entries.
    #[must_use]
    pub fn with_environment<S: Into<String>>(mut self, vars: impl IntoIterator<Item = S>) -> Self {
        self.environment = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one expected label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds one `%files` entry.
    #[must_use]
    pub fn with_file(mut self, pair: FilePair) -> Self {
        self.files.push(pair);
        self
    }

    /// Sets the expected run script lines.
    #[must_use]
    pub fn with_run_script<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.run_script = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected start script lines.
    #[must_use]
    pub fn with_start_script<S: Into<String>>(
        mut self,
        lines: impl IntoIterator<Item = S>,
    ) -> Self {
        self.start_script = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected test script lines.
    #[must_use]
    pub fn with_test_script<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.test_script = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the host paths `%pre` must create.
    #[must_use]
    pub fn with_pre<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.pre = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the host paths `%setup` must create.
    #[must_use]
    pub fn with_setup<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.setup = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the in-image paths `%post` must create.
    #[must_use]
    pub fn with_post<S: Into<String>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        self.post = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Anchors relative `%pre`/`%setup` paths under `host_dir`.
    ///
    /// Absolute paths are left untouched.
    pub fn resolve_host_paths(&mut self, host_dir: &Path) {
        for path in self.pre.iter_mut().chain(self.setup.iter_mut()) {
            if Path::new(path.as_str()).is_relative() {
                *path = host_dir.join(path.as_str()).to_string_lossy().into_owned();
            }
        }
    }

    /// Every host path the build is expected to create outside the image.
    pub fn host_artifacts(&self) -> impl Iterator<Item = &Path> {
        self.pre
            .iter()
            .chain(self.setup.iter())
            .map(|p| Path::new(p.as_str()))
    }

    /// What an image built from `self` on top of an image built from
    /// `base` is expected to show.
    ///
    /// Environment variables and labels from `base` survive unless `self`
    /// redefines the same key. Scripts and help are inherited only when
    /// `self` declares none. Files and build-phase artifacts belong to the
    /// build that declared them and are not carried over.
    #[must_use]
    pub fn layered_over(&self, base: &Self) -> Self {
        let mut merged = self.clone();

        let own_keys: Vec<&str> = self.environment.iter().map(|e| env_key(e)).collect();
        merged.environment = base
            .environment
            .iter()
            .filter(|e| !own_keys.contains(&env_key(e)))
            .chain(self.environment.iter())
            .cloned()
            .collect();

        for (key, value) in &base.labels {
            let _ = merged.labels.entry(key.clone()).or_insert_with(|| value.clone());
        }

        for (own, inherited) in [
            (&mut merged.help, &base.help),
            (&mut merged.run_script, &base.run_script),
            (&mut merged.start_script, &base.start_script),
            (&mut merged.test_script, &base.test_script),
        ] {
            if own.is_empty() {
                own.clone_from(inherited);
            }
        }
        merged
    }
}

fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(key, _)| key)
}
