//! `%files` check: size, permission bits, and bytes of every copied file.

use std::io::ErrorKind;
use std::path::Path;

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Check, ContractViolation, Observed};
use buildprobe_definition::FilePair;
use sha2::{Digest, Sha256};

use crate::layout;
use crate::report::io_as_violation;

/// Compares every declared file pair against its copy inside `image`.
///
/// A pair whose host source or copy cannot be read yields a violation and
/// the remaining pairs are still compared.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] for an inline source that was never
/// written.
pub fn check(image: &Path, pairs: &[FilePair]) -> Result<Vec<ContractViolation>> {
    let mut violations = Vec::new();
    for pair in pairs {
        violations.extend(io_as_violation(Check::Files, check_pair(image, pair))?);
    }
    Ok(violations)
}

fn check_pair(image: &Path, pair: &FilePair) -> Result<Vec<ContractViolation>> {
    let (Some(src), Some(dst)) = (pair.host_source(), pair.destination()) else {
        return Err(HarnessError::Config {
            message: format!("file entry {pair:?} has no host source to compare against"),
        });
    };
    let subject = format!("/{}", dst.trim_start_matches('/'));
    let copy = layout::host_path(image, &dst);

    let src_meta = std::fs::metadata(src).map_err(|e| HarnessError::io(src, e))?;
    let copy_meta = match std::fs::metadata(&copy) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(vec![ContractViolation::new(
                Check::Files,
                subject,
                format!("copy of {}", src.display()),
                Observed::Missing,
            )]);
        }
        Err(e) => return Err(HarnessError::io(&copy, e)),
    };

    let mut violations = Vec::new();
    if src_meta.len() != copy_meta.len() {
        violations.push(ContractViolation::new(
            Check::Files,
            subject.clone(),
            format!("size {}", src_meta.len()),
            Observed::Value(format!("size {}", copy_meta.len())),
        ));
    }
    if let Some((want, got)) = layout::mode_of(&src_meta)
        .zip(layout::mode_of(&copy_meta))
        .filter(|(want, got)| want != got)
    {
        violations.push(ContractViolation::new(
            Check::Files,
            subject.clone(),
            format!("mode {}", layout::format_mode(want)),
            Observed::Value(format!("mode {}", layout::format_mode(got))),
        ));
    }
    if violations.is_empty() {
        let original = std::fs::read(src).map_err(|e| HarnessError::io(src, e))?;
        let copied = std::fs::read(&copy).map_err(|e| HarnessError::io(&copy, e))?;
        if original != copied {
            violations.push(ContractViolation::new(
                Check::Files,
                subject,
                format!("sha256 {}", digest(&original)),
                Observed::Value(format!("sha256 {}", digest(&copied))),
            ));
        }
    }
    Ok(violations)
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
