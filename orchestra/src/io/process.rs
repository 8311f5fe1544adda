//! Shell command execution with a timeout and bounded output capture.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn stdout_lossy(&self) -> String {
        with_notice(&self.stdout, self.stdout_truncated)
    }

    pub fn stderr_lossy(&self) -> String {
        with_notice(&self.stderr, self.stderr_truncated)
    }
}

fn with_notice(bytes: &[u8], truncated: usize) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[truncated {truncated} bytes]"));
    }
    text
}

/// Build a platform shell invocation for `command`, run from `workdir`.
pub fn shell_command(command: &str, workdir: &Path) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.current_dir(workdir);
    cmd
}

/// Run `cmd` to completion or until `limits.timeout` elapses.
///
/// Stdout and stderr are drained on reader threads while the child runs so a
/// full pipe cannot stall it. Bytes beyond `output_limit_bytes` are counted
/// and discarded. The deadline covers both the shell and anything it left
/// running with the pipes open: when it passes, the whole process group is
/// killed and the result has `timed_out = true` and no captured output.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs()))]
pub fn run_with_timeout(mut cmd: Command, limits: ProcessLimits) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let (tx, rx) = mpsc::channel();
    spawn_reader(Stream::Stdout, stdout, limit, tx.clone());
    spawn_reader(Stream::Stderr, stderr, limit, tx);

    let mut timed_out = false;
    let status = match child.wait_timeout(limits.timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child);
            child.wait().context("wait command after kill")?
        }
    };

    let mut stdout_capture = None;
    let mut stderr_capture = None;
    if !timed_out {
        while stdout_capture.is_none() || stderr_capture.is_none() {
            let remaining = limits.timeout.saturating_sub(started.elapsed());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, captured)) => stdout_capture = Some(captured?),
                Ok((Stream::Stderr, captured)) => stderr_capture = Some(captured?),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("background processes still hold the output pipes, killing");
                    timed_out = true;
                    kill_process_group(&mut child);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("output reader thread exited without a result")
                }
            }
        }
    }

    let ((stdout, stdout_truncated), (stderr, stderr_truncated)) = if timed_out {
        ((Vec::new(), 0), (Vec::new(), 0))
    } else {
        (
            stdout_capture.unwrap_or_default(),
            stderr_capture.unwrap_or_default(),
        )
    };

    debug!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command finished"
    );
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Captured = Result<(Vec<u8>, usize)>;

fn spawn_reader<R>(stream: Stream, reader: R, limit: usize, tx: Sender<(Stream, Captured)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        // The receiver is gone once the deadline passed.
        let _ = tx.send((stream, read_limited(reader, limit)));
    });
}

/// Kill the shell and everything it spawned.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) takes no pointers; a negative pid targets the group
    // created by `process_group(0)` at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, "process group already gone");
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let keep = n.min(room);
        kept.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
    Ok((kept, dropped))
}
