//! Run, start, and test scripts plus the help document.
//!
//! Each declared line must appear somewhere in the file as a substring;
//! physical line order is not checked.

use std::io::ErrorKind;
use std::path::Path;

use buildprobe_common::constants::{
    HELP_MODE, HELP_PATH, RUNSCRIPT_PATH, SCRIPT_MODE, STARTSCRIPT_PATH, TEST_SCRIPT_PATH,
};
use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Check, ContractViolation, Observed};

use crate::layout;

/// Fixed location and mode of one scripted metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptTarget {
    /// Check the target belongs to.
    pub check: Check,
    /// Path relative to the image root.
    pub path: &'static str,
    /// Required permission bits.
    pub mode: u32,
}

/// `%runscript` output.
pub const RUNSCRIPT: ScriptTarget = ScriptTarget {
    check: Check::RunScript,
    path: RUNSCRIPT_PATH,
    mode: SCRIPT_MODE,
};

/// `%startscript` output.
pub const STARTSCRIPT: ScriptTarget = ScriptTarget {
    check: Check::StartScript,
    path: STARTSCRIPT_PATH,
    mode: SCRIPT_MODE,
};

/// `%test` output.
pub const TEST_SCRIPT: ScriptTarget = ScriptTarget {
    check: Check::TestScript,
    path: TEST_SCRIPT_PATH,
    mode: SCRIPT_MODE,
};

/// `%help` output.
pub const HELP: ScriptTarget = ScriptTarget {
    check: Check::Help,
    path: HELP_PATH,
    mode: HELP_MODE,
};

/// Checks `target` inside `image` against the declared `lines`.
///
/// Nothing is checked when `lines` is empty.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if the file exists but cannot be read.
pub fn check(image: &Path, target: ScriptTarget, lines: &[String]) -> Result<Vec<ContractViolation>> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }
    let path = layout::host_path(image, target.path);
    let subject = format!("/{}", target.path);

    let meta = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => {
            return Ok(vec![ContractViolation::new(
                target.check,
                subject,
                "regular file",
                Observed::Value("not a regular file".into()),
            )]);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(vec![ContractViolation::new(
                target.check,
                subject,
                "file present",
                Observed::Missing,
            )]);
        }
        Err(e) => return Err(HarnessError::io(&path, e)),
    };

    let mut violations = Vec::new();
    if let Some(mode) = layout::mode_of(&meta).filter(|mode| *mode != target.mode) {
        violations.push(ContractViolation::new(
            target.check,
            subject.clone(),
            format!("mode {}", layout::format_mode(target.mode)),
            Observed::Value(format!("mode {}", layout::format_mode(mode))),
        ));
    }

    let content = std::fs::read(&path).map_err(|e| HarnessError::io(&path, e))?;
    let content = String::from_utf8_lossy(&content);
    violations.extend(
        lines
            .iter()
            .filter(|line| !content.contains(line.as_str()))
            .map(|line| {
                ContractViolation::new(
                    target.check,
                    subject.clone(),
                    format!("line \"{line}\""),
                    Observed::Missing,
                )
            }),
    );
    Ok(violations)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fixture::write;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn undeclared_script_is_not_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(check(dir.path(), RUNSCRIPT, &[]).expect("check").is_empty());
    }

    #[test]
    fn runscript_with_all_lines_and_mode_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            &dir.path().join(RUNSCRIPT_PATH),
            "#!/bin/sh\n\necho runscript line 2\necho runscript line 1\n",
            0o755,
        );
        let declared = lines(&["echo runscript line 1", "echo runscript line 2"]);
        assert!(check(dir.path(), RUNSCRIPT, &declared).expect("check").is_empty());
    }

    #[test]
    fn missing_script_is_one_violation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let violations = check(dir.path(), STARTSCRIPT, &lines(&["echo a", "echo b"])).expect("check");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].observed, Observed::Missing);
        assert_eq!(violations[0].subject, "/.singularity.d/startscript");
    }

    #[test]
    fn wrong_mode_and_missing_line_are_both_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(&dir.path().join(TEST_SCRIPT_PATH), "echo testscript line 1\n", 0o644);
        let violations = check(
            dir.path(),
            TEST_SCRIPT,
            &lines(&["echo testscript line 1", "echo testscript line 2"]),
        )
        .expect("check");
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].expected, "mode 0755");
        assert_eq!(violations[0].observed, Observed::Value("mode 0644".into()));
        assert_eq!(violations[1].expected, "line \"echo testscript line 2\"");
    }

    #[test]
    fn help_requires_read_only_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(&dir.path().join(HELP_PATH), "help info line 1\n", 0o755);
        let violations = check(dir.path(), HELP, &lines(&["help info line 1"])).expect("check");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check, Check::Help);
        assert_eq!(violations[0].expected, "mode 0644");
    }
}
