//! Runs scenarios: render, build, and verify each step in order.
//!
//! Steps inside a scenario are strictly sequential. A step only starts after
//! the build of the step before it has returned, and the driver returns only
//! once the builder process has exited. Independent scenarios may run
//! concurrently, each in its own [`ScenarioContext`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use buildprobe_common::config::HarnessConfig;
use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{ContractViolation, ScenarioId};
use buildprobe_definition::parser::parse_definition;
use buildprobe_definition::{DefinitionModel, RenderedDefinition};
use buildprobe_driver::{BuildOutput, ImageBuilder, SpecSource, prereq};
use buildprobe_verify::{Comparator, Report};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chain::ChainGraph;
use crate::context::ScenarioContext;
use crate::scenario::{Expectation, Scenario, Step, StepSource, Verification};

/// Result of a scenario or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every expectation held.
    Passed,
    /// An expectation did not hold, or the harness itself failed.
    Failed,
    /// A dependency was unavailable or the run was cancelled.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What one step did.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step name.
    pub name: String,
    /// Scenario-local image path the step built.
    pub image: PathBuf,
    /// Step result.
    pub outcome: Outcome,
    /// Why the step failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Captured builder output.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Contract violations found by verification.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ContractViolation>,
    /// Wall-clock time of build and verification.
    pub elapsed: Duration,
}

/// What one scenario did.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Identity of the run; absent if no workspace was created.
    pub id: Option<ScenarioId>,
    /// Scenario name.
    pub name: String,
    /// Scenario result.
    pub outcome: Outcome,
    /// Why the scenario failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Reports of the steps that ran.
    pub steps: Vec<StepReport>,
    /// When the scenario started.
    pub started_at: DateTime<Utc>,
    /// When the scenario finished, cleanup included.
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    fn start(scenario: &Scenario) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: scenario.name.clone(),
            outcome: Outcome::Passed,
            reason: None,
            steps: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self, outcome: Outcome, reason: Option<String>) -> Self {
        self.outcome = outcome;
        self.reason = reason;
        self.finished_at = Utc::now();
        self
    }

    /// Wall-clock duration of the scenario.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// An image a passed step produced, kept for later steps to build on.
#[derive(Debug, Clone)]
struct BuiltImage {
    path: PathBuf,
    model: Option<DefinitionModel>,
}

/// Build input of a step after rendering and reference resolution.
struct PreparedStep {
    source: SpecSource,
    model: Option<DefinitionModel>,
}

/// Runs scenarios against an [`ImageBuilder`].
pub struct Orchestrator<'a> {
    builder: &'a dyn ImageBuilder,
    base_dir: PathBuf,
    definitions_dir: PathBuf,
    jobs: usize,
    cancel: Arc<AtomicBool>,
}

impl fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_dir", &self.base_dir)
            .field("definitions_dir", &self.definitions_dir)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator using `config`'s base directory and job count.
    #[must_use]
    pub fn new(builder: &'a dyn ImageBuilder, config: &HarnessConfig) -> Self {
        Self {
            builder,
            base_dir: config.base_dir.clone(),
            definitions_dir: PathBuf::from("."),
            jobs: config.jobs.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the directory relative definition files resolve against.
    #[must_use]
    pub fn with_definitions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.definitions_dir = dir.into();
        self
    }

    /// Sets how many scenarios may run at once.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Shares an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// The flag that stops further steps when set.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Runs one scenario to completion and removes everything it created.
    pub fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let mut report = ScenarioReport::start(scenario);
        if self.is_cancelled() {
            return report.finish(Outcome::Skipped, Some("cancelled".into()));
        }

        let chain = match scenario.validate() {
            Ok(chain) => chain,
            Err(e) => {
                tracing::warn!(scenario = %scenario.name, error = %e, "invalid scenario");
                return report.finish(Outcome::Failed, Some(e.to_string()));
            }
        };
        if let Err(e) = prereq::require_all(&scenario.requires) {
            tracing::info!(scenario = %scenario.name, reason = %e, "scenario skipped");
            return report.finish(Outcome::Skipped, Some(e.to_string()));
        }
        let mut ctx = match ScenarioContext::new(&self.base_dir, &scenario.name) {
            Ok(ctx) => ctx,
            Err(e) => return report.finish(Outcome::Failed, Some(e.to_string())),
        };
        report.id = Some(ctx.id().clone());
        tracing::info!(scenario = %scenario.name, id = %ctx.id(), steps = scenario.steps.len(), "scenario started");

        let (outcome, reason) = self.run_steps(scenario, &chain, &mut ctx, &mut report.steps);
        let (outcome, reason) = match ctx.close() {
            Ok(()) => (outcome, reason),
            Err(e) => {
                let cleanup = format!("cleanup failed: {e}");
                let reason = reason.map_or_else(|| cleanup.clone(), |r| format!("{r}; {cleanup}"));
                (Outcome::Failed, Some(reason))
            }
        };

        let report = report.finish(outcome, reason);
        tracing::info!(
            scenario = %report.name,
            outcome = %report.outcome,
            elapsed_ms = report.duration().num_milliseconds(),
            "scenario finished"
        );
        report
    }

    /// Runs `scenarios` with up to the configured number at a time.
    ///
    /// Reports come back in input order. A panicking scenario is reported as
    /// failed; its workspace is still removed.
    pub fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        let workers = self.jobs.min(scenarios.len()).max(1);
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ScenarioReport>>> =
            Mutex::new((0..scenarios.len()).map(|_| None).collect());

        thread::scope(|scope| {
            for _ in 0..workers {
                let _ = scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(scenario) = scenarios.get(index) else {
                            break;
                        };
                        let report = self.run_guarded(scenario);
                        slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(report);
                    }
                });
            }
        });

        slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect()
    }

    fn run_guarded(&self, scenario: &Scenario) -> ScenarioReport {
        panic::catch_unwind(AssertUnwindSafe(|| self.run(scenario))).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            tracing::warn!(scenario = %scenario.name, %message, "scenario panicked");
            ScenarioReport::start(scenario).finish(Outcome::Failed, Some(format!("panicked: {message}")))
        })
    }

    fn run_steps(
        &self,
        scenario: &Scenario,
        chain: &ChainGraph,
        ctx: &mut ScenarioContext,
        reports: &mut Vec<StepReport>,
    ) -> (Outcome, Option<String>) {
        let mut built: Vec<Option<BuiltImage>> = vec![None; scenario.steps.len()];
        for (index, step) in scenario.steps.iter().enumerate() {
            if self.is_cancelled() {
                return (Outcome::Skipped, Some(format!("cancelled before step \"{}\"", step.name)));
            }
            let base = chain.base_of(index).and_then(|i| built[i].clone());
            let (report, image) = self.run_step(scenario, step, base.as_ref(), ctx);
            let outcome = report.outcome;
            let message = report.message.clone();
            reports.push(report);
            match outcome {
                Outcome::Passed => built[index] = image,
                Outcome::Failed | Outcome::Skipped => {
                    let why = message.unwrap_or_else(|| outcome.to_string());
                    return (outcome, Some(format!("step \"{}\": {why}", step.name)));
                }
            }
        }
        (Outcome::Passed, None)
    }

    fn run_step(
        &self,
        scenario: &Scenario,
        step: &Step,
        base: Option<&BuiltImage>,
        ctx: &mut ScenarioContext,
    ) -> (StepReport, Option<BuiltImage>) {
        let started = Instant::now();
        let image = ctx.image_path(&step.image);
        let mut report = StepReport {
            name: step.name.clone(),
            image: image.clone(),
            outcome: Outcome::Passed,
            message: None,
            output: String::new(),
            violations: Vec::new(),
            elapsed: Duration::ZERO,
        };
        tracing::info!(scenario = %scenario.name, step = %step.name, image = %image.display(), "step started");

        let prepared = match self.prepare(step, base, ctx) {
            Ok(prepared) => prepared,
            Err(e) => {
                settle_error(&mut report, &e);
                report.elapsed = started.elapsed();
                return (report, None);
            }
        };

        let options = step.options.to_build_options(scenario.privilege_of(step));
        let result = self.builder.build(&image, &prepared.source, &options);
        match step.expect {
            Expectation::Failure => settle_expected_failure(&mut report, &image, result),
            Expectation::Success(verification) => match result {
                Ok(out) => {
                    report.output = out.output;
                    match self.verify(verification, &image, prepared.model.as_ref()) {
                        Ok(Some(checked)) if !checked.is_clean() => {
                            report.violations = checked.violations().to_vec();
                            report.outcome = Outcome::Failed;
                            report.message = Some(format!(
                                "{} contract violation(s)",
                                report.violations.len()
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => settle_error(&mut report, &e),
                    }
                }
                Err(e) => settle_error(&mut report, &e),
            },
        }
        report.elapsed = started.elapsed();
        tracing::info!(
            scenario = %scenario.name,
            step = %step.name,
            outcome = %report.outcome,
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "step finished"
        );

        let built = (report.outcome == Outcome::Passed && matches!(step.expect, Expectation::Success(_)))
            .then(|| BuiltImage {
                path: image,
                model: prepared.model,
            });
        (report, built)
    }

    fn prepare(
        &self,
        step: &Step,
        base: Option<&BuiltImage>,
        ctx: &mut ScenarioContext,
    ) -> Result<PreparedStep> {
        match &step.source {
            StepSource::Definition(model) => {
                let rendered = render_into(model.clone(), step, ctx)?;
                Ok(PreparedStep {
                    source: SpecSource::DefinitionFile(rendered.path),
                    model: Some(rendered.model),
                })
            }
            StepSource::Chained { definition, .. } => {
                let base = require_base(step, base)?;
                let mut model = definition.clone();
                model.from = base.path.display().to_string();
                if model.bootstrap.trim().is_empty() {
                    model.bootstrap = "localimage".into();
                }
                let rendered = render_into(model, step, ctx)?;
                let expected = match &base.model {
                    Some(inherited) => rendered.model.layered_over(inherited),
                    None => rendered.model,
                };
                Ok(PreparedStep {
                    source: SpecSource::DefinitionFile(rendered.path),
                    model: Some(expected),
                })
            }
            StepSource::DefinitionFile(path) => {
                let path = self.resolve_definition(path);
                let model = if step.expect == Expectation::Success(Verification::Definition) {
                    let text = std::fs::read_to_string(&path).map_err(|e| HarnessError::io(&path, e))?;
                    Some(parse_definition(&text)?)
                } else {
                    None
                };
                Ok(PreparedStep {
                    source: SpecSource::DefinitionFile(path),
                    model,
                })
            }
            StepSource::Uri(uri) => Ok(PreparedStep {
                source: SpecSource::Uri(uri.clone()),
                model: None,
            }),
            StepSource::Image(_) => {
                let base = require_base(step, base)?;
                Ok(PreparedStep {
                    source: SpecSource::Image(base.path.clone()),
                    model: base.model.clone(),
                })
            }
            StepSource::RawPath(path) => Ok(PreparedStep {
                source: SpecSource::DefinitionFile(path.clone()),
                model: None,
            }),
        }
    }

    fn resolve_definition(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.definitions_dir.join(path)
        }
    }

    fn verify(
        &self,
        verification: Verification,
        image: &Path,
        model: Option<&DefinitionModel>,
    ) -> Result<Option<Report>> {
        let comparator = Comparator::new(self.builder);
        match verification {
            Verification::None => Ok(None),
            Verification::Structure { labels } => comparator.verify_structure(image, labels).map(Some),
            Verification::Definition => {
                let model = model.ok_or_else(|| HarnessError::Config {
                    message: "no definition available to verify against".into(),
                })?;
                comparator.verify_definition(image, model).map(Some)
            }
        }
    }
}

fn require_base<'b>(step: &Step, base: Option<&'b BuiltImage>) -> Result<&'b BuiltImage> {
    base.ok_or_else(|| HarnessError::Config {
        message: format!("step \"{}\" has no built base image", step.name),
    })
}

/// Materializes and renders `model` into a step-local directory, tracking
/// every file it introduces.
///
/// Only host artifacts that resolve inside the scenario's host directory are
/// tracked. Absolute paths elsewhere on the host belong to the caller and are
/// never removed.
fn render_into(mut model: DefinitionModel, step: &Step, ctx: &mut ScenarioContext) -> Result<RenderedDefinition> {
    let host_dir = ctx.host_dir()?;
    model.resolve_host_paths(&host_dir);
    let artifacts: Vec<PathBuf> = model
        .host_artifacts()
        .filter(|path| is_scenario_local(path, &host_dir))
        .map(Path::to_path_buf)
        .collect();
    for artifact in artifacts {
        ctx.track(artifact);
    }

    let dir = ctx.dir().join(format!("{}.spec", step.image));
    std::fs::create_dir_all(&dir).map_err(|e| HarnessError::io(&dir, e))?;
    ctx.track(&dir);
    let rendered = RenderedDefinition::write(&model, &dir, "definition")?;
    for path in rendered.written_paths() {
        ctx.track(path);
    }
    Ok(rendered)
}

fn is_scenario_local(path: &Path, host_dir: &Path) -> bool {
    path.starts_with(host_dir) && !path.components().any(|c| matches!(c, Component::ParentDir))
}

fn settle_error(report: &mut StepReport, err: &HarnessError) {
    report.outcome = if err.is_skip() {
        Outcome::Skipped
    } else {
        Outcome::Failed
    };
    if let Some(output) = err.build_output() {
        report.output = output.to_string();
    }
    report.message = Some(match err {
        HarnessError::Build { exit_code, timed_out, .. } if *timed_out || exit_code.is_some() => {
            if *timed_out {
                "build timed out".to_string()
            } else {
                format!("build exited with {}", exit_code.unwrap_or_default())
            }
        }
        other => other.to_string(),
    });
}

fn settle_expected_failure(report: &mut StepReport, image: &Path, result: Result<BuildOutput>) {
    match result {
        Ok(out) => {
            report.output = out.output;
            report.outcome = Outcome::Failed;
            report.message = Some("build succeeded but was expected to fail".into());
        }
        Err(e @ HarnessError::Build { .. }) => {
            report.output = e.build_output().unwrap_or_default().to_string();
            if std::fs::symlink_metadata(image).is_ok() {
                report.outcome = Outcome::Failed;
                report.message = Some(format!("failed build left an artifact at {}", image.display()));
            }
        }
        Err(e) => settle_error(report, &e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use buildprobe_common::constants::{LABELS_PATH, REQUIRED_FILES, RUNSCRIPT_PATH, SYSTEM_LABELS};
    use buildprobe_common::types::Privilege;
    use buildprobe_driver::{BuildOptions, ExecOutput, ImageProbe};

    use super::*;
    use crate::scenario::StepOptions;

    /// Builds sandbox trees in-process from the rendered definition.
    #[derive(Default)]
    struct MockBuilder {
        builds: Mutex<Vec<(PathBuf, SpecSource, BuildOptions)>>,
        missing_dependency: bool,
        leave_artifact_on_failure: bool,
        panic_on: Option<String>,
    }

    impl MockBuilder {
        fn populate(image: &Path, model: &DefinitionModel, base: Option<&Path>) {
            if let Some(base) = base {
                copy_tree(base, image);
            }
            for file in REQUIRED_FILES {
                write(&image.join(file.trim_start_matches('/')), "#!/bin/sh\n");
            }
            let mut labels: BTreeMap<String, String> = std::fs::read(image.join(LABELS_PATH))
                .ok()
                .and_then(|b| serde_json::from_slice(&b).ok())
                .unwrap_or_default();
            for key in SYSTEM_LABELS {
                let _ = labels.insert((*key).to_string(), "x".into());
            }
            labels.extend(model.labels.clone());
            write(&image.join(LABELS_PATH), &serde_json::to_string(&labels).unwrap());
            if !model.run_script.is_empty() {
                write(&image.join(RUNSCRIPT_PATH), &model.run_script.join("\n"));
            }
            let mut env = std::fs::read_to_string(image.join("env.txt")).unwrap_or_default();
            for var in &model.environment {
                env.push_str(var);
                env.push('\n');
            }
            write(&image.join("env.txt"), &env);
            for path in model.pre.iter().chain(&model.setup) {
                write(Path::new(path), "");
            }
            for pair in &model.files {
                let src = pair.host_source().unwrap();
                let dst = image.join(pair.destination().unwrap());
                let _ = std::fs::copy(src, dst).unwrap();
            }
            for path in &model.post {
                write(&image.join(path.trim_start_matches('/')), "");
            }
            #[cfg(unix)]
            {
                std::os::unix::fs::symlink(".singularity.d", image.join("environment")).unwrap();
                std::os::unix::fs::symlink(".singularity.d", image.join("singularity")).unwrap();
            }
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if path.ends_with("labels.json") { 0o644 } else { 0o755 };
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
    }

    fn copy_tree(from: &Path, to: &Path) {
        std::fs::create_dir_all(to).unwrap();
        for entry in std::fs::read_dir(from).unwrap() {
            let entry = entry.unwrap();
            let kind = entry.file_type().unwrap();
            let target = to.join(entry.file_name());
            if kind.is_dir() {
                copy_tree(&entry.path(), &target);
            } else if kind.is_file() {
                let _ = std::fs::copy(entry.path(), target).unwrap();
            }
        }
    }

    impl ImageProbe for MockBuilder {
        fn exec(&self, image: &Path, args: &[String], _privilege: Privilege) -> Result<ExecOutput> {
            let argv: Vec<&str> = args.iter().map(String::as_str).collect();
            let (code, stdout) = match argv.as_slice() {
                ["false"] => (1, String::new()),
                ["test", "-f", p] => (i32::from(!image.join(p.trim_start_matches('/')).is_file()), String::new()),
                ["test", "-L", p] => (
                    i32::from(std::fs::symlink_metadata(image.join(p.trim_start_matches('/'))).is_err()),
                    String::new(),
                ),
                ["env"] => (0, std::fs::read_to_string(image.join("env.txt")).unwrap_or_default()),
                _ => (127, String::new()),
            };
            Ok(ExecOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(code),
                timed_out: false,
            })
        }
    }

    impl ImageBuilder for MockBuilder {
        fn build(&self, image: &Path, source: &SpecSource, options: &BuildOptions) -> Result<BuildOutput> {
            self.builds
                .lock()
                .unwrap()
                .push((image.to_path_buf(), source.clone(), options.clone()));
            if self.missing_dependency {
                return Err(HarnessError::MissingDependency {
                    name: "root privileges".into(),
                    reason: "step requires privileged execution".into(),
                });
            }
            let fail = |output: &str| {
                if self.leave_artifact_on_failure {
                    write(image, "partial");
                }
                Err(HarnessError::Build {
                    image: image.to_path_buf(),
                    exit_code: Some(255),
                    timed_out: false,
                    output: output.into(),
                })
            };
            match source {
                SpecSource::DefinitionFile(path) => {
                    let Ok(text) = std::fs::read_to_string(path) else {
                        return fail("FATAL: no such definition file");
                    };
                    let model = parse_definition(&text).unwrap();
                    if self.panic_on.as_deref() == Some(model.from.as_str()) {
                        panic!("builder crashed");
                    }
                    let base = (model.bootstrap == "localimage").then(|| PathBuf::from(&model.from));
                    Self::populate(image, &model, base.as_deref());
                }
                SpecSource::Image(base) => Self::populate(image, &DefinitionModel::default(), Some(base)),
                SpecSource::Uri(_) => Self::populate(image, &DefinitionModel::default(), None),
            }
            Ok(BuildOutput {
                output: "INFO: build complete\n".into(),
                elapsed: Duration::from_millis(1),
            })
        }
    }

    fn config(base: &Path) -> HarnessConfig {
        HarnessConfig {
            base_dir: base.to_path_buf(),
            ..HarnessConfig::default()
        }
    }

    fn docker() -> DefinitionModel {
        DefinitionModel::new("docker", "alpine:latest")
    }

    fn definition_step(name: &str, model: DefinitionModel) -> Step {
        Step::new(name, "container", StepSource::Definition(model))
            .sandbox()
            .expect(Expectation::Success(Verification::Definition))
    }

    #[test]
    fn definition_scenario_passes_and_cleans_up() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let model = docker()
            .with_run_script(["echo runscript line 1", "echo runscript line 2"])
            .with_environment(["testvar1=one"])
            .with_label("customLabel1", "one")
            .with_pre(["PreFile1"])
            .with_post(["PostFile1"]);
        let report = orchestrator.run(&Scenario::new("definition").step(definition_step("runscript", model)));

        assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
        assert!(report.id.is_some());
        assert_eq!(report.steps[0].output, "INFO: build complete\n");
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn absolute_host_artifacts_outside_the_workspace_survive_cleanup() {
        let base = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        let keep = outside.path().join("keep.txt");
        std::fs::write(&keep, "user data").expect("write");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let model = docker().with_pre([keep.to_string_lossy().into_owned(), "PreFile1".to_string()]);
        let report = orchestrator.run(&Scenario::new("pre_absolute").step(definition_step("pre", model)));

        assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
        assert!(keep.is_file(), "host file outside the workspace was removed");
        assert!(outside.path().is_dir());
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn parent_components_never_make_an_artifact_local() {
        let host = Path::new("/work/scenario/host");
        assert!(is_scenario_local(&host.join("PreFile1"), host));
        assert!(!is_scenario_local(&host.join("../../sibling"), host));
        assert!(!is_scenario_local(Path::new("/etc/passwd"), host));
    }

    #[test]
    fn violations_are_reported_per_step() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let model = docker().with_start_script(["echo startscript line 1"]);
        let report = orchestrator.run(&Scenario::new("startscript").step(definition_step("startscript", model)));

        assert_eq!(report.outcome, Outcome::Failed);
        let step = &report.steps[0];
        assert_eq!(step.violations.len(), 1);
        assert_eq!(step.violations[0].subject, "/.singularity.d/startscript");
        assert!(report.reason.as_deref().unwrap().contains("startscript"));
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn chained_steps_build_on_earlier_images() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("chained_environment")
            .step(
                Step::new(
                    "base",
                    "container1",
                    StepSource::Definition(docker().with_environment(["base_var=one"]).with_label("FOO", "bar")),
                )
                .sandbox(),
            )
            .step(
                Step::new(
                    "derived",
                    "container2",
                    StepSource::Chained {
                        base: "container1".into(),
                        definition: DefinitionModel::default().with_environment(["derived_var=two"]),
                    },
                )
                .sandbox()
                .expect(Expectation::Success(Verification::Definition)),
            )
            .step(
                Step::new("packed", "container3", StepSource::Image("container2".into()))
                    .expect(Expectation::Success(Verification::Structure { labels: true })),
            );
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Passed, "{report:?}");

        let builds = builder.builds.lock().unwrap();
        assert_eq!(builds.len(), 3);
        let SpecSource::DefinitionFile(def) = &builds[1].1 else {
            panic!("expected rendered definition");
        };
        assert!(def.starts_with(builds[0].0.parent().unwrap()));
        assert_eq!(builds[2].1, SpecSource::Image(builds[1].0.clone()));
    }

    #[test]
    fn expected_failure_passes_without_artifact() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("bad_path").step(
            Step::new("bad_path", "container", StepSource::RawPath("/some/dumb/path".into()))
                .expect(Expectation::Failure),
        );
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
        assert!(report.steps[0].output.contains("no such definition file"));
    }

    #[test]
    fn expected_failure_leaving_an_artifact_fails() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder {
            leave_artifact_on_failure: true,
            ..MockBuilder::default()
        };
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("bad_path").step(
            Step::new("bad_path", "container", StepSource::RawPath("/some/dumb/path".into()))
                .expect(Expectation::Failure),
        );
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.steps[0].message.as_deref().unwrap().contains("left an artifact"));
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn failed_step_stops_the_scenario() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("multi")
            .step(Step::new("missing", "container1", StepSource::DefinitionFile("nope/Singularity".into())))
            .step(Step::new("sif", "container2", StepSource::Image("container1".into())));
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Failed);
        assert_eq!(report.steps.len(), 1);
        assert!(report.steps[0].message.as_deref().unwrap().contains("255"));
        assert_eq!(builder.builds.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_requirement_skips_before_building() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("debootstrap")
            .with_requirement("buildprobe-no-such-bootstrap-tool")
            .step(Step::new("debian", "container", StepSource::DefinitionFile("debian/Singularity".into())));
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Skipped);
        assert!(report.id.is_none());
        assert!(builder.builds.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_privilege_skips_the_step() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder {
            missing_dependency: true,
            ..MockBuilder::default()
        };
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("privileged")
            .with_privilege(Privilege::Privileged)
            .step(Step::new("busybox", "container", StepSource::Uri("docker://busybox".into())));
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Skipped);
        assert_eq!(builder.builds.lock().unwrap()[0].2.privilege, Privilege::Privileged);
    }

    #[test]
    fn invalid_chain_fails_before_building() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenario = Scenario::new("broken").step(Step::new("sif", "container2", StepSource::Image("container1".into())));
        let report = orchestrator.run(&scenario);
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(builder.builds.lock().unwrap().is_empty());
    }

    #[test]
    fn cancellation_skips_scenarios() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        orchestrator.cancel_flag().store(true, Ordering::SeqCst);
        let scenario = Scenario::new("busybox").step(Step::new("b", "c", StepSource::Uri("docker://busybox".into())));
        assert_eq!(orchestrator.run(&scenario).outcome, Outcome::Skipped);
    }

    #[test]
    fn run_all_keeps_input_order_and_isolates_scenarios() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path())).with_jobs(4);
        let scenarios: Vec<Scenario> = (0..6)
            .map(|i| {
                Scenario::new(format!("scenario{i}"))
                    .step(Step::new("busybox", "container", StepSource::Uri("docker://busybox".into())))
            })
            .collect();
        let reports = orchestrator.run_all(&scenarios);
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["scenario0", "scenario1", "scenario2", "scenario3", "scenario4", "scenario5"]);
        assert!(reports.iter().all(|r| r.outcome == Outcome::Passed));

        let images: HashSet<PathBuf> = builder
            .builds
            .lock()
            .unwrap()
            .iter()
            .map(|(image, _, _)| image.clone())
            .collect();
        assert_eq!(images.len(), 6);
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn panicking_scenario_is_reported_and_cleaned_up() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder {
            panic_on: Some("crash:me".into()),
            ..MockBuilder::default()
        };
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let scenarios = vec![
            Scenario::new("crash").step(Step::new("b", "c", StepSource::Definition(DefinitionModel::new("docker", "crash:me")))),
            Scenario::new("fine").step(Step::new("b", "c", StepSource::Uri("docker://busybox".into()))),
        ];
        let reports = orchestrator.run_all(&scenarios);
        assert_eq!(reports[0].outcome, Outcome::Failed);
        assert!(reports[0].reason.as_deref().unwrap().contains("builder crashed"));
        assert_eq!(reports[1].outcome, Outcome::Passed);
        assert_eq!(std::fs::read_dir(base.path()).expect("read").count(), 0);
    }

    #[test]
    fn step_options_reach_the_builder() {
        let base = tempfile::tempdir().expect("tempdir");
        let builder = MockBuilder::default();
        let orchestrator = Orchestrator::new(&builder, &config(base.path()));
        let mut step = Step::new("busybox", "container", StepSource::Uri("docker://busybox".into()));
        step.options = StepOptions {
            force: true,
            sandbox: true,
            env: Some(BTreeMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())])),
        };
        let _ = orchestrator.run(&Scenario::new("opts").step(step));
        let builds = builder.builds.lock().unwrap();
        let options = &builds[0].2;
        assert!(options.force && options.sandbox);
        assert_eq!(options.env.as_deref(), Some(&[("PATH".to_string(), "/usr/bin:/bin".to_string())][..]));
    }
}
