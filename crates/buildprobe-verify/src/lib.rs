//! Artifact comparator for built images.
//!
//! Every populated field of a [`DefinitionModel`](buildprobe_definition::DefinitionModel)
//! maps to one independent check. Checks never stop at the first mismatch:
//! all violations end up in a single [`Report`].
//!
//! Presence and environment checks go through the builder's `exec` entry
//! point; content checks read the sandbox tree directly from the host.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod artifacts;
pub mod comparator;
pub mod env;
pub mod files;
pub mod labels;
pub mod layout;
pub mod presence;
pub mod report;
pub mod scripts;

#[cfg(all(test, unix))]
pub(crate) mod fixture;

pub use comparator::Comparator;
pub use report::Report;
