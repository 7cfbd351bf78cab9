//! Mapping between in-image paths and the sandbox tree on the host.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Host path of `in_image` inside the sandbox rooted at `image`.
///
/// Absolute and relative in-image paths both resolve against the image root.
#[must_use]
pub fn host_path(image: &Path, in_image: &str) -> PathBuf {
    image.join(in_image.trim_start_matches('/'))
}

/// Permission bits of a file, masked to `0o7777`.
#[cfg(unix)]
#[must_use]
pub fn mode_of(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & buildprobe_common::constants::PERMISSION_MASK)
}

/// Permission bits are not comparable off unix.
#[cfg(not(unix))]
#[must_use]
pub fn mode_of(_meta: &Metadata) -> Option<u32> {
    None
}

/// Formats a mode the way `ls`-style diagnostics expect, e.g. `0755`.
#[must_use]
pub fn format_mode(mode: u32) -> String {
    format!("{mode:04o}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_and_relative_paths_share_the_image_root() {
        let root = Path::new("/tmp/img");
        assert_eq!(host_path(root, "/.singularity.d/runscript"), root.join(".singularity.d/runscript"));
        assert_eq!(host_path(root, "NewName.txt"), root.join("NewName.txt"));
    }

    #[test]
    fn modes_are_zero_padded_octal() {
        assert_eq!(format_mode(0o755), "0755");
        assert_eq!(format_mode(0o4755), "4755");
    }
}
