//! System-wide constants: default paths, timeouts, and the metadata layout
//! every built image is expected to carry.

use std::path::PathBuf;

/// Name of the builder binary looked up on `$PATH` when none is configured.
pub const DEFAULT_BUILDER_BIN: &str = "singularity";

/// Default upper bound for a single `build` invocation.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 30 * 60;

/// Default upper bound for a single in-image probe (`exec`).
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 60;

/// Poll interval used while waiting on a child process.
pub const CHILD_POLL_INTERVAL_MILLIS: u64 = 50;

/// Default number of scenarios allowed to run at the same time.
pub const DEFAULT_JOBS: usize = 1;

/// Environment variable overriding the builder binary path.
pub const ENV_BUILDER: &str = "BUILDPROBE_BUILDER";
/// Environment variable overriding the base temporary directory.
pub const ENV_TMPDIR: &str = "BUILDPROBE_TMPDIR";
/// Environment variable overriding the build timeout, in seconds.
pub const ENV_BUILD_TIMEOUT: &str = "BUILDPROBE_BUILD_TIMEOUT";
/// Environment variable overriding the number of concurrent scenarios.
pub const ENV_JOBS: &str = "BUILDPROBE_JOBS";

/// Returns the default base directory for scenario workspaces.
pub fn default_base_dir() -> PathBuf {
    std::env::temp_dir().join("buildprobe")
}

/// Metadata directory inside every built image.
pub const METADATA_DIR: &str = ".singularity.d";

/// Run script, relative to the image root.
pub const RUNSCRIPT_PATH: &str = ".singularity.d/runscript";
/// Start script, relative to the image root.
pub const STARTSCRIPT_PATH: &str = ".singularity.d/startscript";
/// Test script, relative to the image root.
pub const TEST_SCRIPT_PATH: &str = ".singularity.d/test";
/// Help document, relative to the image root.
pub const HELP_PATH: &str = ".singularity.d/runscript.help";
/// Label record, relative to the image root.
pub const LABELS_PATH: &str = ".singularity.d/labels.json";

/// Required mode of the run, start, and test scripts.
pub const SCRIPT_MODE: u32 = 0o755;
/// Required mode of the help document.
pub const HELP_MODE: u32 = 0o644;
/// Mask applied to `st_mode` before comparing permissions.
pub const PERMISSION_MASK: u32 = 0o7777;

/// In-image files that every successful build must produce.
pub const REQUIRED_FILES: &[&str] = &[
    "/.singularity.d/runscript",
    "/.singularity.d/env/01-base.sh",
    "/.singularity.d/actions/shell",
    "/.singularity.d/actions/exec",
    "/.singularity.d/actions/run",
];

/// In-image symlinks that every successful build must produce.
pub const REQUIRED_SYMLINKS: &[&str] = &["/environment", "/singularity"];

/// In-image path of the label record, as seen from inside the image.
pub const LABELS_IN_IMAGE: &str = "/.singularity.d/labels.json";

/// Labels the builder generates on every build, independent of `%labels`.
pub const SYSTEM_LABELS: &[&str] = &[
    "org.label-schema.schema-version",
    "org.label-schema.build-date",
    "org.label-schema.usage.singularity.version",
];

/// Application name used in CLI output.
pub const APP_NAME: &str = "buildprobe";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "bprobe";
