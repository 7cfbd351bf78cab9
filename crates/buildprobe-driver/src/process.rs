//! Subprocess execution with captured output and a bounded wait.
//!
//! Output goes to anonymous temporary files rather than pipes, so a chatty
//! child can never block on a full pipe while the parent polls it. On Unix
//! each child leads its own process group, so a timeout kills everything it
//! spawned along with it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use buildprobe_common::constants::CHILD_POLL_INTERVAL_MILLIS;
use thiserror::Error;

/// How stdout and stderr are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Both streams interleaved into `stdout`.
    Combined,
    /// Streams kept apart.
    Separate,
}

/// What a finished (or killed) child produced.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output, or both streams with [`Capture::Combined`].
    pub stdout: String,
    /// Standard error; empty with [`Capture::Combined`].
    pub stderr: String,
    /// Exit code, `None` if the child was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the child was killed for exceeding its timeout.
    pub timed_out: bool,
    /// Time between spawn and exit.
    pub elapsed: Duration,
}

/// Failures while running a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Output capture files could not be created or read.
    #[error("failed to capture output: {0}")]
    Capture(#[source] std::io::Error),
    /// Polling or reaping the child failed.
    #[error("failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
}

/// Spawns `cmd`, waits at most `timeout`, and returns its captured output.
///
/// A child still running at the deadline is killed together with its
/// process group, then reaped.
///
/// # Errors
///
/// Returns an error if the child cannot be spawned, waited for, or its
/// output cannot be captured.
pub fn run_captured(
    cmd: &mut Command,
    capture: Capture,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut out_file = tempfile::tempfile().map_err(ProcessError::Capture)?;
    let mut err_file = match capture {
        Capture::Combined => out_file.try_clone().map_err(ProcessError::Capture)?,
        Capture::Separate => tempfile::tempfile().map_err(ProcessError::Capture)?,
    };

    let _ = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(out_file.try_clone().map_err(ProcessError::Capture)?))
        .stderr(Stdio::from(err_file.try_clone().map_err(ProcessError::Capture)?));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let _ = cmd.process_group(0);
    }

    let started_at = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;
    let (status, timed_out) = wait_for_child(&mut child, timeout)?;
    let elapsed = started_at.elapsed();

    let stdout = read_back(&mut out_file)?;
    let stderr = match capture {
        Capture::Combined => String::new(),
        Capture::Separate => read_back(&mut err_file)?,
    };

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        timed_out,
        elapsed,
    })
}

fn wait_for_child(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool), ProcessError> {
    let started_at = Instant::now();
    let poll_interval = Duration::from_millis(CHILD_POLL_INTERVAL_MILLIS);

    loop {
        if let Some(status) = child.try_wait().map_err(ProcessError::Wait)? {
            return Ok((status, false));
        }
        if started_at.elapsed() >= timeout {
            tracing::warn!(pid = child.id(), timeout_secs = timeout.as_secs_f64(), "child exceeded timeout, killing");
            kill_group(child);
            let status = child.wait().map_err(ProcessError::Wait)?;
            return Ok((status, true));
        }
        thread::sleep(poll_interval);
    }
}

/// Kills the process group led by `child`, falling back to the child alone.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signalled = i32::try_from(child.id())
        .ok()
        .map(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL));
    match signalled {
        Some(Ok(())) => {}
        Some(Err(errno)) => {
            tracing::debug!(pid = child.id(), %errno, "killpg failed, killing child only");
            let _ = child.kill();
        }
        None => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

fn read_back(file: &mut File) -> Result<String, ProcessError> {
    let _ = file.seek(SeekFrom::Start(0)).map_err(ProcessError::Capture)?;
    let mut bytes = Vec::new();
    let _ = file.read_to_end(&mut bytes).map_err(ProcessError::Capture)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
