//! Build driver for the external image builder.
//!
//! Handles:
//! - **Backend**: the [`ImageBuilder`](backend::ImageBuilder) /
//!   [`ImageProbe`](backend::ImageProbe) seam the rest of the harness uses.
//! - **Build**: the subprocess-backed implementation of that seam.
//! - **Process**: spawning with captured output and a bounded wait.
//! - **Privilege**: root checks and identity dropping per step.
//! - **Prereq**: lookup of optional external tools.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod build;
pub mod privilege;
pub mod prereq;
pub mod process;

pub use backend::{BuildOptions, BuildOutput, ExecOutput, ImageBuilder, ImageProbe, ProbeResult, SpecSource};
pub use build::BuildDriver;
