//! The standard suite and YAML suite files.
//!
//! The standard suite covers single builds from definition files and URIs,
//! multi-stage chains, the bad-path failure case, and one definition
//! scenario per verifiable section.

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::Privilege;
use buildprobe_definition::{DefinitionModel, FilePair};
use serde::{Deserialize, Serialize};

use crate::scenario::{Expectation, Scenario, Step, StepSource, Verification};

/// Content of the auxiliary files the `files` scenario copies in.
pub const TEST_FILE_CONTENT: &str = "Test file content\n";

/// Top-level layout of a YAML suite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Scenarios in run order.
    pub scenarios: Vec<Scenario>,
}

/// Parses a YAML suite.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] if the text is not a valid suite or any
/// scenario fails validation.
pub fn load_suite(yaml: &str) -> Result<Vec<Scenario>> {
    let suite: SuiteFile = serde_yaml::from_str(yaml).map_err(|e| HarnessError::Config {
        message: format!("invalid suite file: {e}"),
    })?;
    for scenario in &suite.scenarios {
        let _ = scenario.validate()?;
    }
    tracing::debug!(scenarios = suite.scenarios.len(), "suite loaded");
    Ok(suite.scenarios)
}

/// Keeps the scenarios whose name contains `pattern`.
#[must_use]
pub fn filter(scenarios: Vec<Scenario>, pattern: Option<&str>) -> Vec<Scenario> {
    match pattern {
        Some(pattern) => scenarios
            .into_iter()
            .filter(|s| s.name.contains(pattern))
            .collect(),
        None => scenarios,
    }
}

/// Every scenario of the standard suite.
#[must_use]
pub fn standard_suite() -> Vec<Scenario> {
    let mut suite = build_scenarios();
    suite.extend(multi_stage_scenarios());
    suite.push(bad_path_scenario());
    suite.extend(definition_scenarios());
    suite
}

fn def_file(path: &str) -> StepSource {
    StepSource::DefinitionFile(path.into())
}

fn structure(labels: bool) -> Expectation {
    Expectation::Success(Verification::Structure { labels })
}

/// Single builds from definition files and URIs.
#[must_use]
pub fn build_scenarios() -> Vec<Scenario> {
    let cases: [(&str, Option<&str>, StepSource, bool); 10] = [
        ("busybox", None, def_file("busybox/Singularity"), false),
        ("busybox_sandbox", None, def_file("busybox/Singularity"), true),
        ("debootstrap", Some("debootstrap"), def_file("debian/Singularity"), true),
        ("docker_uri", None, StepSource::Uri("docker://busybox".into()), true),
        ("docker_def_file", None, def_file("docker/Singularity"), true),
        ("shub_uri", None, StepSource::Uri("shub://GodloveD/busybox".into()), true),
        ("shub_def_file", None, def_file("shub/Singularity"), true),
        ("library_def_file", None, def_file("library/Singularity"), true),
        ("yum", Some("yum"), def_file("centos/Singularity"), true),
        ("zypper", Some("zypper"), def_file("opensuse/Singularity"), true),
    ];
    cases
        .into_iter()
        .map(|(name, tool, source, sandbox)| {
            let mut step = Step::new(name, "container", source);
            step.options.sandbox = sandbox;
            let scenario = Scenario::new(format!("build/{name}"))
                .with_privilege(Privilege::Privileged)
                .step(step);
            match tool {
                Some(tool) => scenario.with_requirement(tool),
                None => scenario,
            }
        })
        .collect()
}

/// Chains where later steps build on earlier images.
#[must_use]
pub fn multi_stage_scenarios() -> Vec<Scenario> {
    let busybox = || def_file("busybox/Singularity");
    let local_image = |base: &str| StepSource::Chained {
        base: base.into(),
        definition: DefinitionModel::new("localimage", ""),
    };
    let local_image_label = |base: &str| StepSource::Chained {
        base: base.into(),
        definition: DefinitionModel::new("localimage", "").with_label("FOO", "bar"),
    };

    vec![
        Scenario::new("multi_stage/sif_to_sif")
            .step(Step::new("busybox", "container1", busybox()))
            .step(Step::new("sif", "container2", StepSource::Image("container1".into()))),
        Scenario::new("multi_stage/sandbox_to_sif")
            .step(Step::new("busybox_sandbox", "container1", busybox()).sandbox())
            .step(Step::new("sif", "container2", StepSource::Image("container1".into()))),
        Scenario::new("multi_stage/local_image")
            .step(Step::new("busybox", "container1", busybox()))
            .step(Step::new("local_image", "container2", local_image("container1")))
            .step(
                Step::new("local_image_label", "container3", local_image_label("container2"))
                    .expect(structure(true)),
            ),
        Scenario::new("multi_stage/local_image_sandbox")
            .step(Step::new("busybox_sandbox", "container2", busybox()).force().sandbox())
            .step(
                Step::new("local_image_label", "container3", local_image_label("container2"))
                    .expect(structure(true)),
            ),
        Scenario::new("multi_stage/chained_environment")
            .step(
                Step::new(
                    "base",
                    "container1",
                    StepSource::Definition(alpine().with_environment(["base_var=one"])),
                )
                .sandbox(),
            )
            .step(
                Step::new(
                    "derived",
                    "container2",
                    StepSource::Chained {
                        base: "container1".into(),
                        definition: DefinitionModel::new("localimage", "")
                            .with_environment(["derived_var=two"]),
                    },
                )
                .sandbox()
                .expect(Expectation::Success(Verification::Definition)),
            ),
    ]
    .into_iter()
    .map(|s| s.with_privilege(Privilege::Privileged))
    .collect()
}

/// A build from a path that does not exist must fail and leave nothing.
#[must_use]
pub fn bad_path_scenario() -> Scenario {
    Scenario::new("bad_path")
        .with_privilege(Privilege::Privileged)
        .step(
            Step::new("bad_path", "container", StepSource::RawPath("/some/dumb/path".into()))
                .expect(Expectation::Failure),
        )
}

fn alpine() -> DefinitionModel {
    DefinitionModel::new("docker", "alpine:latest")
}

/// One scenario per verifiable definition section, each a sandbox build
/// checked against its own model.
#[must_use]
pub fn definition_scenarios() -> Vec<Scenario> {
    let cases = [
        ("empty", alpine()),
        (
            "help",
            alpine().with_help(["help info line 1", "help info line 2", "help info line 3"]),
        ),
        (
            "files",
            alpine()
                .with_file(FilePair::inline("testFile-1", TEST_FILE_CONTENT, 0o644, "NewName2.txt"))
                .with_file(FilePair::inline("testFile-2", TEST_FILE_CONTENT, 0o644, "NewName.txt")),
        ),
        (
            "test",
            alpine().with_test_script([
                "echo testscript line 1",
                "echo testscript line 2",
                "echo testscript line 3",
            ]),
        ),
        (
            "startscript",
            alpine().with_start_script([
                "echo startscript line 1",
                "echo startscript line 2",
                "echo startscript line 3",
            ]),
        ),
        (
            "runscript",
            alpine().with_run_script([
                "echo runscript line 1",
                "echo runscript line 2",
                "echo runscript line 3",
            ]),
        ),
        (
            "env",
            alpine().with_environment(["testvar1=one", "testvar2=two", "testvar3=three"]),
        ),
        (
            "labels",
            alpine()
                .with_label("customLabel1", "one")
                .with_label("customLabel2", "two")
                .with_label("customLabel3", "three"),
        ),
        ("pre", alpine().with_pre(["PreFile1"])),
        ("setup", alpine().with_setup(["SetupFile1"])),
        ("post", alpine().with_post(["PostFile1"])),
    ];
    cases
        .into_iter()
        .map(|(name, model)| {
            Scenario::new(format!("definition/{name}"))
                .with_privilege(Privilege::Privileged)
                .step(
                    Step::new(name, "container", StepSource::Definition(model))
                        .sandbox()
                        .expect(Expectation::Success(Verification::Definition)),
                )
        })
        .collect()
}
