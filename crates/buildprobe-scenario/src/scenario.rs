//! Scenario and step value types.
//!
//! A scenario is an ordered list of steps. A step builds one scenario-local
//! image and states what the outcome must look like. Later steps may build
//! on the images of earlier ones.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::Privilege;
use buildprobe_definition::DefinitionModel;
use buildprobe_driver::BuildOptions;
use serde::{Deserialize, Serialize};

use crate::chain::ChainGraph;

/// A named sequence of dependent build steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Scenario name, used in reports and directory names.
    pub name: String,
    /// External tools that must be on `$PATH`; the scenario is skipped otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Privilege level for steps that do not set their own.
    #[serde(default)]
    pub privilege: Privilege,
    /// Steps, run strictly in order.
    pub steps: Vec<Step>,
}

/// One build inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Step name used in reports.
    pub name: String,
    /// Scenario-local name of the image this step produces.
    pub image: String,
    /// What the build starts from.
    pub source: StepSource,
    /// Builder flags.
    #[serde(default)]
    pub options: StepOptions,
    /// Required outcome.
    #[serde(default)]
    pub expect: Expectation,
    /// Overrides the scenario's privilege level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege: Option<Privilege>,
}

/// Where a step's build specification comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// A model rendered into the scenario directory.
    Definition(DefinitionModel),
    /// A model bootstrapped from the image of an earlier step.
    ///
    /// `from` is replaced by that image's path; an empty bootstrap becomes
    /// `localimage`.
    Chained {
        /// Image name of the earlier step.
        base: String,
        /// The model layered on top.
        definition: DefinitionModel,
    },
    /// An existing definition file; relative paths resolve against the
    /// orchestrator's definitions directory.
    DefinitionFile(PathBuf),
    /// A remote URI handed to the builder as-is.
    Uri(String),
    /// The image of an earlier step, converted by the builder.
    Image(String),
    /// A path passed to the builder verbatim, without resolution.
    RawPath(PathBuf),
}

impl StepSource {
    /// Image name of the earlier step this source builds on, if any.
    #[must_use]
    pub fn base_image(&self) -> Option<&str> {
        match self {
            Self::Chained { base, .. } | Self::Image(base) => Some(base.as_str()),
            _ => None,
        }
    }

    /// Whether a definition model can be obtained for verification.
    #[must_use]
    pub const fn has_definition(&self) -> bool {
        matches!(
            self,
            Self::Definition(_) | Self::Chained { .. } | Self::DefinitionFile(_)
        )
    }
}

/// Builder flags for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepOptions {
    /// Pass `--force`.
    pub force: bool,
    /// Pass `--sandbox`.
    pub sandbox: bool,
    /// Replacement environment for the builder; absent inherits the harness's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

impl StepOptions {
    /// Converts into driver options running with `privilege`.
    #[must_use]
    pub fn to_build_options(&self, privilege: Privilege) -> BuildOptions {
        BuildOptions {
            force: self.force,
            sandbox: self.sandbox,
            env: self
                .env
                .as_ref()
                .map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            privilege,
        }
    }
}

/// The outcome a step requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The build succeeds and the image passes `Verification`.
    Success(Verification),
    /// The build fails and leaves no image behind.
    Failure,
}

impl Default for Expectation {
    fn default() -> Self {
        Self::Success(Verification::Structure { labels: false })
    }
}

/// How a successfully built image is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// The build succeeding is enough.
    None,
    /// Presence probes; `labels` also requires the label record.
    Structure {
        /// Probe for the label record too.
        #[serde(default)]
        labels: bool,
    },
    /// Presence probes plus every check the step's definition declares.
    Definition,
}

impl Scenario {
    /// Creates an empty scenario.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            privilege: Privilege::default(),
            steps: Vec::new(),
        }
    }

    /// Adds an external tool the scenario needs.
    #[must_use]
    pub fn with_requirement(mut self, tool: impl Into<String>) -> Self {
        self.requires.push(tool.into());
        self
    }

    /// Sets the default privilege level of every step.
    #[must_use]
    pub const fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Privilege level `step` runs with.
    #[must_use]
    pub fn privilege_of(&self, step: &Step) -> Privilege {
        step.privilege.unwrap_or(self.privilege)
    }

    /// Checks the scenario before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for an empty scenario, a step that
    /// references an unknown or later image, an image rebuilt without
    /// `force`, or a definition check the step cannot support.
    pub fn validate(&self) -> Result<ChainGraph> {
        if self.steps.is_empty() {
            return Err(config_err(format!("scenario \"{}\" has no steps", self.name)));
        }
        for step in &self.steps {
            if !is_plain_name(&step.image) {
                return Err(config_err(format!(
                    "step \"{}\": image name \"{}\" must be a plain, non-empty name",
                    step.name, step.image
                )));
            }
            if step.expect == Expectation::Success(Verification::Definition) {
                if !step.source.has_definition() {
                    return Err(config_err(format!(
                        "step \"{}\": definition checks need a definition source",
                        step.name
                    )));
                }
                if !step.options.sandbox {
                    return Err(config_err(format!(
                        "step \"{}\": definition checks need a sandbox build",
                        step.name
                    )));
                }
            }
        }
        ChainGraph::from_scenario(self)
    }
}

impl Step {
    /// A step expecting a successful build with structure checks.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>, source: StepSource) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            source,
            options: StepOptions::default(),
            expect: Expectation::default(),
            privilege: None,
        }
    }

    /// Builds a sandbox directory instead of a packed image.
    #[must_use]
    pub const fn sandbox(mut self) -> Self {
        self.options.sandbox = true;
        self
    }

    /// Overwrites an existing image.
    #[must_use]
    pub const fn force(mut self) -> Self {
        self.options.force = true;
        self
    }

    /// Sets the required outcome.
    #[must_use]
    pub const fn expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    /// Overrides the scenario's privilege level for this step.
    #[must_use]
    pub const fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = Some(privilege);
        self
    }
}

fn config_err(message: String) -> HarnessError {
    HarnessError::Config { message }
}

/// A single normal path component: no separators, no `.` or `..`, and no
/// surrounding whitespace.
fn is_plain_name(name: &str) -> bool {
    if name.trim() != name || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}
