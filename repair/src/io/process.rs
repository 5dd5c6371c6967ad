//! Child-process execution with a hard deadline and bounded output capture.
//!
//! Both the sandbox and the command-backed completion provider run untrusted or
//! slow programs through [`run_with_timeout`]. The child leads its own process
//! group; the whole group is killed at the deadline and again once the child
//! has exited, so nothing it started outlives the call or holds its pipes open.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long pipes may stay open once the child is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type Captured = Result<(Vec<u8>, usize)>;

/// Wall-clock and capture limits for one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes of stdout and of stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Run `cmd` to completion or until `limits.timeout`, whichever comes first.
///
/// Pipes are drained on reader threads while the child runs, so a chatty child
/// cannot deadlock on a full pipe. `stdin` is fed from its own thread and closed
/// afterwards. Readers get at most [`DRAIN_TIMEOUT`] after the child exits; a
/// pipe still held open past that (by a process that left the group) yields
/// empty output for that stream.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64, output_limit_bytes = limits.output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    limits: &ProcessLimits,
) -> Result<ProcessOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(program = ?cmd.get_program(), "spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            Some(spawn_collector(move || pipe.write_all(&input)))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_rx = spawn_collector(move || read_stream_limited(stdout, limit));
    let stderr_rx = spawn_collector(move || read_stream_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child.wait_timeout(limits.timeout).context("wait for child")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_ms = limits.timeout.as_millis() as u64,
                "child timed out, killing"
            );
            timed_out = true;
            kill_process_group(&child);
            child.kill().context("kill child")?;
            child.wait().context("wait child after kill")?
        }
    };
    // Background processes the child left behind.
    kill_process_group(&child);
    let elapsed = started.elapsed();

    let drain_deadline = Instant::now() + DRAIN_TIMEOUT;
    if let Some(rx) = stdin_handle {
        match rx.recv_timeout(drain_deadline.saturating_duration_since(Instant::now())) {
            // A child that exits without reading its input closes the pipe early.
            Ok(Err(e)) => debug!(err = %e, "stdin write did not complete"),
            Ok(Ok(())) => {}
            Err(RecvTimeoutError::Timeout) => debug!("stdin writer still blocked, abandoning it"),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("stdin writer thread panicked"));
            }
        }
    }
    let (stdout, stdout_truncated) =
        collect_output(&stdout_rx, "stdout", drain_deadline).context("join stdout")?;
    let (stderr, stderr_truncated) =
        collect_output(&stderr_rx, "stderr", drain_deadline).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(
        exit_code = ?status.code(),
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "child finished"
    );
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        elapsed,
    })
}

/// Run `work` on a detached thread and hand its result back over a channel.
fn spawn_collector<T, F>(work: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if the caller stopped waiting.
        let _ = tx.send(work());
    });
    rx
}

fn collect_output(rx: &Receiver<Captured>, stream: &str, deadline: Instant) -> Captured {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(stream, "pipe still open after child exit, dropping its output");
            Ok((Vec::new(), 0))
        }
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("{stream} reader thread panicked")),
    }
}

/// SIGKILL the process group led by `child`. A group that is already empty is fine.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(err = %err, pid, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Captured {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
