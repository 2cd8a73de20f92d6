//! Running external tools (virus scanner, OCR engine, PDF renderer) with a
//! hard wall-clock limit.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Program not found: {0}")]
    NotFound(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error while waiting for process: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout followed by stderr, the way a terminal would show them.
    pub fn combined_lossy(&self) -> String {
        let mut text = self.stdout_lossy();
        let stderr = self.stderr_lossy();
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }
}

/// Spawns `command` with piped output and waits at most `timeout` for it.
///
/// On Unix the child leads its own process group. On timeout the whole group
/// is killed and the child reaped before `CommandError::Timeout` is returned,
/// so helpers spawned by wrapper scripts die with it. The pipe readers are
/// detached rather than joined on that path; a descendant that moved itself
/// to another group keeps its reader alive until it exits. A program that
/// cannot be found maps to `NotFound` so callers can treat a missing tool
/// differently from a crashing one.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let program = command.get_program().to_string_lossy().into_owned();
    #[cfg(unix)]
    command.process_group(0);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CommandError::NotFound(program.clone())
            } else {
                CommandError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = wait_for_child(&mut child, timeout)?;

    Ok(CommandOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn wait_for_child(child: &mut Child, timeout: Duration) -> Result<ExitStatus, CommandError> {
    let start = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(status),
            None => {
                if start.elapsed() >= timeout {
                    kill_group(child);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandError::Timeout(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. The group id is the child's pid,
    // set by `process_group(0)` at spawn, and the child is not yet reaped.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
