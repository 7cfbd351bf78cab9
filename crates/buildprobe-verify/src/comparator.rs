//! Runs every applicable check against one built image.

use std::path::Path;

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::Check;
use buildprobe_definition::DefinitionModel;
use buildprobe_driver::ImageProbe;

use crate::report::Report;
use crate::{artifacts, env, files, labels, presence, scripts};

/// Checks built images through an [`ImageProbe`] and the host filesystem.
pub struct Comparator<'a> {
    probe: &'a dyn ImageProbe,
}

impl std::fmt::Debug for Comparator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator").finish_non_exhaustive()
    }
}

impl<'a> Comparator<'a> {
    /// Creates a comparator that runs in-image probes through `probe`.
    #[must_use]
    pub const fn new(probe: &'a dyn ImageProbe) -> Self {
        Self { probe }
    }

    /// Runs the presence probes only. Works for packed and sandbox images.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe cannot be executed.
    pub fn verify_structure(&self, image: &Path, labels: bool) -> Result<Report> {
        tracing::info!(image = %image.display(), labels, "verifying image structure");
        let mut report = Report::new(image);
        report.record(Check::Presence, presence::check(self.probe, image, labels)?);
        Ok(report)
    }

    /// Runs the presence probes plus every check `model` declares.
    ///
    /// Labels are always checked, since the system labels are required on
    /// every build. `image` must be a sandbox directory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for a packed image and propagates
    /// probe failures. Contract violations, including paths that cannot be
    /// read, are returned inside the [`Report`], not as errors.
    pub fn verify_definition(&self, image: &Path, model: &DefinitionModel) -> Result<Report> {
        if !image.is_dir() {
            return Err(HarnessError::Config {
                message: format!(
                    "definition checks need a sandbox image, {} is not a directory",
                    image.display()
                ),
            });
        }
        tracing::info!(image = %image.display(), "verifying image against definition");

        let mut report = Report::new(image);
        report.record(Check::Presence, presence::check(self.probe, image, false)?);
        if !model.help.is_empty() {
            report.settle(Check::Help, scripts::check(image, scripts::HELP, &model.help))?;
        }
        if !model.environment.is_empty() {
            report.settle(
                Check::Environment,
                env::check(self.probe, image, &model.environment),
            )?;
        }
        report.settle(Check::Labels, labels::check(image, &model.labels))?;
        if !model.files.is_empty() {
            report.settle(Check::Files, files::check(image, &model.files))?;
        }
        if !model.run_script.is_empty() {
            report.settle(
                Check::RunScript,
                scripts::check(image, scripts::RUNSCRIPT, &model.run_script),
            )?;
        }
        if !model.start_script.is_empty() {
            report.settle(
                Check::StartScript,
                scripts::check(image, scripts::STARTSCRIPT, &model.start_script),
            )?;
        }
        if !model.test_script.is_empty() {
            report.settle(
                Check::TestScript,
                scripts::check(image, scripts::TEST_SCRIPT, &model.test_script),
            )?;
        }
        if !model.pre.is_empty() {
            report.settle(
                Check::PreArtifact,
                artifacts::check_host(Check::PreArtifact, &model.pre),
            )?;
        }
        if !model.setup.is_empty() {
            report.settle(
                Check::SetupArtifact,
                artifacts::check_host(Check::SetupArtifact, &model.setup),
            )?;
        }
        if !model.post.is_empty() {
            report.settle(Check::PostArtifact, artifacts::check_image(image, &model.post))?;
        }

        tracing::info!(
            image = %image.display(),
            checks = report.checks().len(),
            violations = report.violations().len(),
            "definition verification finished"
        );
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use buildprobe_common::constants::{RUNSCRIPT_PATH, TEST_SCRIPT_PATH};
    use buildprobe_common::types::Observed;
    use buildprobe_definition::FilePair;

    use super::*;
    use crate::fixture::{TreeProbe, image_tree, write};

    fn busybox() -> DefinitionModel {
        DefinitionModel::new("docker", "alpine:latest")
    }

    #[test]
    fn bare_model_checks_presence_and_labels_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = image_tree(dir.path());
        let probe = TreeProbe::default();
        let report = Comparator::new(&probe)
            .verify_definition(&image, &busybox())
            .expect("verify");
        assert!(report.is_clean(), "{:?}", report.violations());
        assert_eq!(report.checks(), &[Check::Presence, Check::Labels]);
    }

    #[test]
    fn violations_from_independent_checks_are_aggregated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = image_tree(dir.path());
        let src = dir.path().join("host-file");
        write(&src, "Test file content\n", 0o644);
        let model = busybox()
            .with_label("FOO", "bar")
            .with_environment(["testvar1=one"])
            .with_file(FilePair::host(&src, "NewName.txt"))
            .with_post(["PostFile1"]);

        let probe = TreeProbe::default();
        let report = Comparator::new(&probe)
            .verify_definition(&image, &model)
            .expect("verify");
        let checks: Vec<Check> = report.violations().iter().map(|v| v.check).collect();
        assert_eq!(
            checks,
            [Check::Environment, Check::Labels, Check::Files, Check::PostArtifact]
        );
        assert!(report.into_result().is_err());
    }

    #[test]
    fn unreadable_host_source_does_not_hide_other_violations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = image_tree(dir.path());
        let gone = dir.path().join("never-written");
        let src = dir.path().join("host-file");
        write(&src, "Test file content\n", 0o644);
        let model = busybox()
            .with_label("FOO", "bar")
            .with_file(FilePair::host(&gone, "Missing.txt"))
            .with_file(FilePair::host(&src, "NewName.txt"));

        let probe = TreeProbe::default();
        let report = Comparator::new(&probe)
            .verify_definition(&image, &model)
            .expect("io failures become violations");
        let found: Vec<(Check, &str)> = report
            .violations()
            .iter()
            .map(|v| (v.check, v.subject.as_str()))
            .collect();
        let gone = gone.display().to_string();
        assert_eq!(
            found,
            [
                (Check::Labels, "FOO"),
                (Check::Files, gone.as_str()),
                (Check::Files, "/NewName.txt"),
            ]
        );
    }

    #[test]
    fn test_script_is_compared_with_declared_test_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = image_tree(dir.path());
        write(&image.join(RUNSCRIPT_PATH), "echo runscript line 1\n", 0o755);
        write(&image.join(TEST_SCRIPT_PATH), "echo testscript line 1\n", 0o755);
        let model = busybox()
            .with_run_script(["echo runscript line 1"])
            .with_test_script(["echo testscript line 1"]);

        let probe = TreeProbe::default();
        let report = Comparator::new(&probe)
            .verify_definition(&image, &model)
            .expect("verify");
        assert!(report.is_clean(), "{:?}", report.violations());
    }

    #[test]
    fn structure_only_runs_probes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = image_tree(dir.path());
        std::fs::remove_file(image.join("environment")).expect("rm");
        let probe = TreeProbe::default();
        let report = Comparator::new(&probe)
            .verify_structure(&image, true)
            .expect("verify");
        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].subject, "/environment");
        assert!(matches!(report.violations()[0].observed, Observed::Value(_)));
    }

    #[test]
    fn packed_image_cannot_be_content_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let packed = dir.path().join("container.sif");
        write(&packed, "SIF", 0o755);
        let probe = TreeProbe::default();
        let err = Comparator::new(&probe)
            .verify_definition(&packed, &busybox())
            .unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
    }
}
