//! Privilege handling for builder and probe invocations.

use std::process::Command;

use buildprobe_common::error::{HarnessError, Result};
use buildprobe_common::types::{Privilege, UserIds};

/// Returns whether the harness runs with an effective uid of 0.
#[must_use]
pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Decides which identity a child runs with.
///
/// `Ok(None)` keeps the harness's own identity.
///
/// # Errors
///
/// Returns [`HarnessError::MissingDependency`] when a privileged step is
/// requested without root.
pub fn plan_identity(
    privilege: Privilege,
    as_root: bool,
    unprivileged: Option<UserIds>,
) -> Result<Option<UserIds>> {
    match privilege {
        Privilege::Inherit => Ok(None),
        Privilege::Privileged if as_root => Ok(None),
        Privilege::Privileged => Err(HarnessError::MissingDependency {
            name: "root privileges".into(),
            reason: "step requires privileged execution".into(),
        }),
        Privilege::Unprivileged if as_root => {
            if unprivileged.is_none() {
                tracing::warn!("unprivileged step requested as root without SUDO_UID/SUDO_GID; running as root");
            }
            Ok(unprivileged)
        }
        Privilege::Unprivileged => Ok(None),
    }
}

/// Resolves the identity for `privilege` against the current process.
///
/// # Errors
///
/// See [`plan_identity`].
pub fn resolve(privilege: Privilege, unprivileged: Option<UserIds>) -> Result<Option<UserIds>> {
    plan_identity(privilege, running_as_root(), unprivileged)
}

/// Makes `cmd` run as `identity` when one is given.
#[cfg(unix)]
pub fn apply(cmd: &mut Command, identity: Option<UserIds>) {
    use std::os::unix::process::CommandExt;
    if let Some(ids) = identity {
        tracing::debug!(uid = ids.uid, gid = ids.gid, "dropping privileges for child");
        let _ = cmd.gid(ids.gid).uid(ids.uid);
    }
}

/// Makes `cmd` run as `identity` when one is given.
#[cfg(not(unix))]
pub fn apply(_cmd: &mut Command, _identity: Option<UserIds>) {}
