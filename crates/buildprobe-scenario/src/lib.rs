//! # buildprobe-scenario
//!
//! Composes render, build, and verify steps into scenarios.
//!
//! Handles:
//! - **Scenario**: tagged step and expectation value types, loadable from YAML.
//! - **Chain**: the step dependency graph for multi-stage builds.
//! - **Context**: a unique per-scenario directory whose contents are removed
//!   on every exit path.
//! - **Orchestrator**: sequential steps, concurrent scenarios, cancellation.
//! - **Suite**: the standard catalog of build, multi-stage, failure, and
//!   definition scenarios.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod chain;
pub mod context;
pub mod orchestrator;
pub mod scenario;
pub mod suite;

pub use context::ScenarioContext;
pub use orchestrator::{Orchestrator, Outcome, ScenarioReport, StepReport};
pub use scenario::{Expectation, Scenario, Step, StepOptions, StepSource, Verification};
