//! Side effects of the `%pre`, `%setup`, and `%post` build phases.

use std::path::Path;

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Check, ContractViolation, Observed};

use crate::layout;

/// Checks that each declared `%pre` or `%setup` path exists on the host.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if existence cannot be determined.
pub fn check_host(check: Check, paths: &[String]) -> Result<Vec<ContractViolation>> {
    let mut violations = Vec::new();
    for path in paths {
        if !exists(Path::new(path))? {
            violations.push(ContractViolation::new(check, path.clone(), "file on host", Observed::Missing));
        }
    }
    Ok(violations)
}

/// Checks that each declared `%post` path exists inside the image.
///
/// # Errors
///
/// Returns [`HarnessError::Io`] if existence cannot be determined.
pub fn check_image(image: &Path, paths: &[String]) -> Result<Vec<ContractViolation>> {
    let mut violations = Vec::new();
    for path in paths {
        if !exists(&layout::host_path(image, path))? {
            violations.push(ContractViolation::new(
                Check::PostArtifact,
                format!("/{}", path.trim_start_matches('/')),
                "file in image",
                Observed::Missing,
            ));
        }
    }
    Ok(violations)
}

fn exists(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|e| HarnessError::io(path, e))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fixture::write;

    #[test]
    fn host_artifacts_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("PreFile1");
        write(&present, "", 0o644);
        let absent = dir.path().join("PreFile2");
        let paths = vec![
            present.display().to_string(),
            absent.display().to_string(),
        ];
        let violations = check_host(Check::PreArtifact, &paths).expect("check");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].check, Check::PreArtifact);
        assert_eq!(violations[0].subject, absent.display().to_string());
    }

    #[test]
    fn post_artifacts_resolve_against_image_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(&dir.path().join("PostFile1"), "", 0o644);
        let ok = check_image(dir.path(), &["PostFile1".to_string(), "/PostFile1".to_string()]).expect("check");
        assert!(ok.is_empty());

        let missing = check_image(dir.path(), &["PostFile2".to_string()]).expect("check");
        assert_eq!(missing[0].subject, "/PostFile2");
        assert_eq!(missing[0].check, Check::PostArtifact);
    }
}
