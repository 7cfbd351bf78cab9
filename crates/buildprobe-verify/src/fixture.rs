//! Test fixtures: a sandbox tree with the builder's metadata layout and a
//! probe that answers `exec` from that tree.

use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use buildprobe_common::constants;
use buildprobe_common::error::Result;
use buildprobe_common::types::Privilege;
use buildprobe_driver::{ExecOutput, ImageProbe};

pub fn write(path: &Path, content: &str, mode: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, content).expect("write");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).expect("chmod");
}

/// Lays out a minimal, contract-satisfying image under `root`.
pub fn image_tree(root: &Path) -> PathBuf {
    for file in constants::REQUIRED_FILES {
        write(&root.join(file.trim_start_matches('/')), "#!/bin/sh\n", 0o755);
    }
    std::fs::create_dir_all(root.join("bin")).expect("mkdir bin");
    symlink(".singularity.d/env/90-environment.sh", root.join("environment")).expect("symlink");
    symlink(".singularity.d", root.join("singularity")).expect("symlink");
    let labels = serde_json::json!({
        "org.label-schema.schema-version": "1.0",
        "org.label-schema.build-date": "Monday_19_October_2026_10:0:0_UTC",
        "org.label-schema.usage.singularity.version": "3.0.0",
    });
    write(&root.join(constants::LABELS_PATH), &labels.to_string(), 0o644);
    root.to_path_buf()
}

/// Answers probes from the host tree the image path points at.
#[derive(Default)]
pub struct TreeProbe {
    pub calls: Mutex<Vec<(Vec<String>, Privilege)>>,
}

impl ImageProbe for TreeProbe {
    fn exec(&self, image: &Path, args: &[String], privilege: Privilege) -> Result<ExecOutput> {
        self.calls.lock().unwrap().push((args.to_vec(), privilege));
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let (code, stdout) = match argv.as_slice() {
            ["false"] => (1, String::new()),
            ["true"] => (0, String::new()),
            ["test", "-f", p] => (i32::from(!image.join(p.trim_start_matches('/')).is_file()), String::new()),
            ["test", "-L", p] => {
                let is_link = std::fs::symlink_metadata(image.join(p.trim_start_matches('/')))
                    .is_ok_and(|m| m.file_type().is_symlink());
                (i32::from(!is_link), String::new())
            }
            ["env"] => {
                let script = std::fs::read_to_string(image.join(".singularity.d/env/90-environment.sh"))
                    .unwrap_or_default();
                let vars: String = script
                    .lines()
                    .filter_map(|l| l.trim().strip_prefix("export "))
                    .map(|kv| format!("{kv}\n"))
                    .collect();
                (0, format!("PATH=/bin\n{vars}"))
            }
            _ => (127, String::new()),
        };
        Ok(ExecOutput {
            stdout,
            stderr: if code == 127 { "command not found\n".into() } else { String::new() },
            exit_code: Some(code),
            timed_out: false,
        })
    }
}
