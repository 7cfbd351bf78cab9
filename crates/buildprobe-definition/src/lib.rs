//! # buildprobe-definition
//!
//! The declarative contract for one build and its textual form.
//!
//! Handles:
//! - **Model**: what a build is given and what its image must contain.
//! - **Validator**: rejects models the builder could not consume.
//! - **Render**: deterministic section-based definition text, plus the
//!   auxiliary files `%files` refers to.
//! - **Parser**: reads an existing definition file back into a model.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod model;
pub mod parser;
pub mod render;
pub mod validator;

pub use model::{DefinitionModel, FilePair, FileSource, InlineFile};
pub use render::{RenderedDefinition, render};
