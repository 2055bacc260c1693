//! Launches the external search driver and keeps it within its time limit.
//!
//! While the child runs, three scoped threads are active: one drain per output
//! pipe, copying to this process's own stdout/stderr so the child never blocks
//! on a full pipe, and a watchdog that kills the child's whole process group
//! once the timeout has elapsed. The deadline covers the drains too: a
//! grandchild still holding a pipe after the child exited is killed with the
//! group. All three are joined before [`ProcessSupervisor::run`] returns.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use hp_types::ProcessError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_CHUNK_SIZE: usize = 8192;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    /// The watchdog killed the process group.
    pub killed: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    poll_interval: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ProcessSupervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Run `spec` to completion or until `timeout` has elapsed.
    ///
    /// The kill is best effort: the process may outlive `timeout` by up to one
    /// poll interval plus the time the OS needs to deliver the signal.
    pub fn run(&self, spec: &ProcessSpec, timeout: Duration) -> Result<ProcessOutcome, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so the watchdog also reaches the driver's children.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ProcessError::Launch {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(
            "Launched {} (pid {}) in {}, timeout {:?}",
            spec.program,
            pid,
            spec.working_dir.display(),
            timeout
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(1);
        let poll_interval = self.poll_interval;

        let (status, killed) = thread::scope(|scope| {
            let mut drains = Vec::with_capacity(2);
            if let Some(out) = stdout {
                drains.push(scope.spawn(move || drain(out, io::stdout(), "stdout")));
            }
            if let Some(err) = stderr {
                drains.push(scope.spawn(move || drain(err, io::stderr(), "stderr")));
            }
            let watchdog = scope.spawn(move || watch(pid, started, timeout, poll_interval, finished_rx));

            let status = child.wait();
            for handle in drains {
                if handle.join().is_err() {
                    warn!("Stream drain thread panicked");
                }
            }
            let _ = finished_tx.send(());
            drop(finished_tx);

            let killed = watchdog.join().unwrap_or_else(|_| {
                warn!("Watchdog thread panicked");
                false
            });
            (status, killed)
        });

        let status = status.map_err(|source| ProcessError::Wait {
            program: spec.program.clone(),
            source,
        })?;
        let elapsed = started.elapsed();
        if killed {
            warn!("{} killed after {:?}", spec.program, elapsed);
        } else {
            info!("{} exited with {} after {:?}", spec.program, status, elapsed);
        }

        Ok(ProcessOutcome {
            status,
            killed,
            elapsed,
        })
    }
}

/// Poll until the foreground reports that the child was reaped and both pipes
/// closed, or the deadline passes. Returns whether the process group was
/// killed.
fn watch(
    pid: u32,
    started: Instant,
    timeout: Duration,
    poll_interval: Duration,
    finished: Receiver<()>,
) -> bool {
    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        match finished.recv_timeout(remaining.min(poll_interval)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    // The foreground may have finished just as the deadline passed.
    if finished.try_recv().is_ok() {
        return false;
    }

    warn!("Timeout of {:?} reached, killing process group {}", timeout, pid);
    match kill_process_group(pid) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to kill process group {}: {}", pid, e);
            false
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pgid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid process group"));
    }

    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        // Already gone.
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process group kill is only available on unix",
    ))
}

/// Copy `reader` to `writer` until end of input.
///
/// Errors are logged, never returned. If the host stream fails the pipe is
/// still read to the end so the child cannot block on it.
fn drain<R: Read, W: Write>(mut reader: R, mut writer: W, stream: &str) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut forwarding = true;
    let mut total = 0usize;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Reading child {} failed: {}", stream, e);
                break;
            }
        };
        total += n;

        if forwarding {
            if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                warn!("Forwarding child {} failed, discarding further output: {}", stream, e);
                forwarding = false;
            }
        }
    }

    debug!("Child {} closed after {} bytes", stream, total);
}
