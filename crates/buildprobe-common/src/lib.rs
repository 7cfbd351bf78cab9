//! # buildprobe-common
//!
//! Shared types, error definitions, harness configuration, and the image
//! metadata contract used across the entire buildprobe workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the definition, driver,
//! verify, and scenario crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
