//! Runtime environment check through `exec <image> env`.

use std::path::Path;

use buildprobe_common::error::Result;
use buildprobe_common::types::{Check, ContractViolation, Observed, Privilege};
use buildprobe_driver::{ImageProbe, ProbeResult};

/// Checks that every declared `KEY=VALUE` appears in the image's `env` output.
///
/// # Errors
///
/// Returns an error only if the probe cannot be executed.
pub fn check(probe: &dyn ImageProbe, image: &Path, declared: &[String]) -> Result<Vec<ContractViolation>> {
    if declared.is_empty() {
        return Ok(Vec::new());
    }
    let out = probe.exec(image, &["env".to_string()], Privilege::Inherit)?;
    if out.predicate() != ProbeResult::True {
        let status = out
            .exit_code
            .map_or_else(|| "killed".to_string(), |code| format!("exit {code}"));
        return Ok(vec![ContractViolation::new(
            Check::Environment,
            "env",
            "exit 0",
            Observed::Value(format!("{status} ({})", out.stderr.trim())),
        )]);
    }

    let combined = format!("{}{}", out.stdout, out.stderr);
    tracing::debug!(image = %image.display(), vars = combined.lines().count(), "image environment read");
    Ok(declared
        .iter()
        .filter(|var| !combined.contains(var.as_str()))
        .map(|var| ContractViolation::new(Check::Environment, "env", var.clone(), Observed::Missing))
        .collect())
}
