//! Always-present metadata probes, run inside the image without privileges.

use std::path::Path;

use buildprobe_common::constants::{LABELS_IN_IMAGE, REQUIRED_FILES, REQUIRED_SYMLINKS};
use buildprobe_common::error::Result;
use buildprobe_common::types::{Check, ContractViolation, Observed, Privilege};
use buildprobe_driver::{ExecOutput, ImageProbe, ProbeResult};

/// One `exec` probe and the predicate outcome it must produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceProbe {
    /// Short name used as the violation subject.
    pub name: String,
    /// Command run inside the image.
    pub args: Vec<String>,
    /// Required outcome.
    pub expect: ProbeResult,
}

impl PresenceProbe {
    fn new(name: impl Into<String>, args: &[&str], expect: ProbeResult) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            expect,
        }
    }
}

/// The fixed probe set; `labels` adds the label record.
///
/// `false` must report exit 1 so a builder that swallows exit codes is caught.
#[must_use]
pub fn probes(labels: bool) -> Vec<PresenceProbe> {
    let mut probes = vec![PresenceProbe::new("false", &["false"], ProbeResult::False)];
    probes.extend(
        REQUIRED_FILES
            .iter()
            .map(|path| PresenceProbe::new(*path, &["test", "-f", *path], ProbeResult::True)),
    );
    probes.extend(
        REQUIRED_SYMLINKS
            .iter()
            .map(|path| PresenceProbe::new(*path, &["test", "-L", *path], ProbeResult::True)),
    );
    if labels {
        probes.push(PresenceProbe::new(
            LABELS_IN_IMAGE,
            &["test", "-f", LABELS_IN_IMAGE],
            ProbeResult::True,
        ));
    }
    probes
}

/// Runs every presence probe and collects mismatches.
///
/// # Errors
///
/// Returns an error only if a probe cannot be executed at all.
pub fn check(probe: &dyn ImageProbe, image: &Path, labels: bool) -> Result<Vec<ContractViolation>> {
    let mut violations = Vec::new();
    for spec in probes(labels) {
        let out = probe.exec(image, &spec.args, Privilege::Unprivileged)?;
        let got = out.predicate();
        if got != spec.expect {
            violations.push(ContractViolation::new(
                Check::Presence,
                spec.name,
                format!("`{}` to {}", spec.args.join(" "), describe(spec.expect)),
                Observed::Value(observed(&out, got)),
            ));
        }
    }
    Ok(violations)
}

const fn describe(result: ProbeResult) -> &'static str {
    match result {
        ProbeResult::True => "exit 0",
        ProbeResult::False => "exit 1",
        ProbeResult::Unexpected(_) => "fail unexpectedly",
    }
}

fn observed(out: &ExecOutput, got: ProbeResult) -> String {
    let status = match got {
        ProbeResult::Unexpected(_) if out.timed_out => "timed out".to_string(),
        ProbeResult::Unexpected(None) => "killed".to_string(),
        ProbeResult::Unexpected(Some(code)) => format!("exit {code}"),
        other => describe(other).to_string(),
    };
    let stderr = out.stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{status} ({stderr})")
    }
}
