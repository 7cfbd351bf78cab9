//! Label record check.
//!
//! The record is a flat JSON object of strings. Declared labels must match
//! exactly; extra labels are tolerated. The system labels are always
//! required.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use buildprobe_common::constants::{LABELS_PATH, SYSTEM_LABELS};
use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Check, ContractViolation, Observed};

use crate::layout;

/// Reads and decodes the label record of a sandbox image.
///
/// Returns `Ok(None)` when the record does not exist.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the record cannot be read and
/// [`HarnessError::Serialization`] if it is not a flat string map.
pub fn read_labels(image: &Path) -> Result<Option<BTreeMap<String, String>>> {
    let path = layout::host_path(image, LABELS_PATH);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HarnessError::io(&path, e)),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Checks declared and system labels against the image's record.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the record exists but cannot be read.
pub fn check(image: &Path, declared: &BTreeMap<String, String>) -> Result<Vec<ContractViolation>> {
    let subject_path = format!("/{LABELS_PATH}");
    let record = match read_labels(image) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Ok(vec![ContractViolation::new(
                Check::Labels,
                subject_path,
                "label record present",
                Observed::Missing,
            )]);
        }
        Err(HarnessError::Serialization { source }) => {
            return Ok(vec![ContractViolation::new(
                Check::Labels,
                subject_path,
                "flat JSON object of strings",
                Observed::Value(source.to_string()),
            )]);
        }
        Err(e) => return Err(e),
    };

    let mut violations: Vec<ContractViolation> = declared
        .iter()
        .filter_map(|(key, value)| match record.get(key) {
            Some(found) if found == value => None,
            Some(found) => Some(ContractViolation::new(
                Check::Labels,
                key.clone(),
                value.clone(),
                Observed::Value(found.clone()),
            )),
            None => Some(ContractViolation::new(
                Check::Labels,
                key.clone(),
                value.clone(),
                Observed::Missing,
            )),
        })
        .collect();

    violations.extend(
        SYSTEM_LABELS
            .iter()
            .filter(|key| !record.contains_key(**key))
            .map(|key| ContractViolation::new(Check::Labels, *key, "system label present", Observed::Missing)),
    );
    Ok(violations)
}
