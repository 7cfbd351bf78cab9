//! Definition file parser.
//!
//! Reads section-based definition text back into a [`DefinitionModel`] so an
//! existing definition file can serve as a verification contract. Only the
//! forms the renderer emits are understood inside `%pre`, `%setup`, and
//! `%post` (`touch <path>...`); other commands there make no claim.

pub mod lexer;

use buildprobe_common::error::{HarnessError, Result};

use self::lexer::Line;
use crate::model::{DefinitionModel, FilePair};

/// Parses definition text into a model.
///
/// # Errors
///
/// Returns [`HarnessError::Render`] if the header block is malformed or the
/// `Bootstrap` header is missing.
pub fn parse_definition(input: &str) -> Result<DefinitionModel> {
    let mut model = DefinitionModel::default();
    let mut section: Option<&str> = None;

    for line in lexer::tokenize(input) {
        match line {
            Line::Header { key, value } => apply_header(&mut model, key, value),
            Line::Stray(text) => {
                return Err(HarnessError::Render {
                    message: format!("expected \"Key: value\" header, got \"{text}\""),
                });
            }
            Line::Section(name) => section = Some(name),
            Line::Body(text) => {
                if let Some(name) = section {
                    apply_body(&mut model, name, text);
                }
            }
        }
    }

    if model.bootstrap.is_empty() {
        return Err(HarnessError::Render {
            message: "definition has no Bootstrap header".into(),
        });
    }
    Ok(model)
}

fn apply_header(model: &mut DefinitionModel, key: &str, value: &str) {
    if key.eq_ignore_ascii_case("bootstrap") {
        model.bootstrap = value.to_string();
    } else if key.eq_ignore_ascii_case("from") {
        model.from = value.to_string();
    } else {
        tracing::debug!(key, value, "ignoring header");
    }
}

fn apply_body(model: &mut DefinitionModel, section: &str, text: &str) {
    match section {
        "help" => model.help.push(text.to_string()),
        "environment" => {
            let entry = text.strip_prefix("export ").unwrap_or(text).trim();
            if entry.contains('=') {
                model.environment.push(entry.to_string());
            }
        }
        "labels" => {
            let (key, value) = text
                .split_once(char::is_whitespace)
                .map_or((text, ""), |(k, v)| (k, v.trim()));
            let _ = model.labels.insert(key.to_string(), value.to_string());
        }
        "files" => {
            let mut parts = text.split_whitespace();
            if let Some(src) = parts.next() {
                model
                    .files
                    .push(FilePair::host(src, parts.next().unwrap_or_default()));
            }
        }
        "runscript" => model.run_script.push(text.to_string()),
        "startscript" => model.start_script.push(text.to_string()),
        "test" => model.test_script.push(text.to_string()),
        "pre" => model.pre.extend(touched(text)),
        "setup" => model.setup.extend(touched(text)),
        "post" => model.post.extend(touched(text)),
        other => tracing::debug!(section = other, "ignoring section body"),
    }
}

fn touched(text: &str) -> Vec<String> {
    text.strip_prefix("touch ")
        .map(|rest| rest.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
