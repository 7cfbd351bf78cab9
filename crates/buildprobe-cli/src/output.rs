//! Formatted output helpers for CLI commands.
//!
//! Renders scenario summaries and verification reports as plain-text tables.

use std::fmt::Write;

use buildprobe_scenario::{Outcome, ScenarioReport};
use buildprobe_verify::Report;

/// Formats a duration as milliseconds below one second, seconds otherwise.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_duration(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.1}s", millis as f64 / 1000.0)
    }
}

/// Scenario counts per outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Scenarios that passed.
    pub passed: usize,
    /// Scenarios that failed.
    pub failed: usize,
    /// Scenarios that were skipped.
    pub skipped: usize,
}

impl Tally {
    /// Counts `reports` by outcome.
    #[must_use]
    pub fn of(reports: &[ScenarioReport]) -> Self {
        reports.iter().fold(Self::default(), |mut tally, report| {
            match report.outcome {
                Outcome::Passed => tally.passed += 1,
                Outcome::Failed => tally.failed += 1,
                Outcome::Skipped => tally.skipped += 1,
            }
            tally
        })
    }
}

/// One row per scenario, the violations of failed steps, and a tally.
#[must_use]
pub fn summary(reports: &[ScenarioReport]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:<8} {:>9}  REASON", "SCENARIO", "OUTCOME", "DURATION");
    for report in reports {
        let _ = writeln!(
            out,
            "{:<40} {:<8} {:>9}  {}",
            report.name,
            report.outcome.to_string(),
            format_duration(report.duration()),
            report.reason.as_deref().unwrap_or("-")
        );
        for step in report.steps.iter().filter(|s| s.outcome == Outcome::Failed) {
            for violation in &step.violations {
                let _ = writeln!(out, "    {}: {violation}", step.name);
            }
        }
    }
    let tally = Tally::of(reports);
    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} skipped",
        tally.passed, tally.failed, tally.skipped
    );
    out
}

/// Checks performed on one image and any violations found.
#[must_use]
pub fn report(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "image: {}", report.image().display());
    let checks: Vec<String> = report.checks().iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "checks: {}", checks.join(", "));
    if report.is_clean() {
        let _ = writeln!(out, "ok");
    } else {
        for violation in report.violations() {
            let _ = writeln!(out, "  {violation}");
        }
        let _ = writeln!(out, "{} violation(s)", report.violations().len());
    }
    out
}
