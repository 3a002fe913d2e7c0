//! Process runner: executes one test case against the simulator.
//!
//! Every subprocess is spawned with `kill_on_drop`, so dropping the runner
//! future kills it. On unix each step leads its own process group; timeout
//! and cancellation kill the whole group and reap the child before
//! returning, so helpers forked by a wrapper script die with it.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capture::{drain, Captured, SharedCapture};
use crate::config::RunConfig;
use crate::domain::TestCase;
use crate::error::RegressError;

/// How long output readers may keep draining after the process is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Raw result of executing one test, before classification.
#[derive(Debug, Default)]
pub struct RawOutcome {
    /// Exit code when the simulator terminated normally.
    pub exit_code: Option<i32>,

    /// Terminating signal (unix only).
    pub signal: Option<i32>,

    pub timed_out: bool,

    /// The run was interrupted while this test was in flight.
    pub cancelled: bool,

    /// Set when the simulator or the prepare step could not run.
    pub launch_error: Option<String>,

    pub stdout: Captured,
    pub stderr: Captured,

    pub elapsed: Duration,

    /// Collected artifact files; they live inside `workdir`.
    pub artifacts: Vec<PathBuf>,

    /// Scratch directory kept alive until artifacts are collected.
    pub workdir: Option<TempDir>,
}

impl RawOutcome {
    pub fn launch_failed(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            launch_error: Some(message.into()),
            elapsed,
            ..Self::default()
        }
    }

    /// stdout followed by stderr, lossily decoded.
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.text();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr.text());
        }
        out
    }

    pub fn output_truncated(&self) -> bool {
        self.stdout.truncated || self.stderr.truncated
    }
}

/// Executes test cases. The pipeline only sees this trait.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Run `case` to completion, timeout or cancellation.
    ///
    /// Never fails: launch problems are reported inside the [`RawOutcome`].
    async fn execute(&self, case: &TestCase, cancel: watch::Receiver<bool>) -> RawOutcome;
}

/// How one subprocess step ended.
#[derive(Debug)]
enum StepExit {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs the configured simulator as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunConfig,
}

impl ProcessRunner {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn simulator_command(&self, test: &Path) -> Vec<String> {
        let mut argv = vec![self.config.simulator.to_string_lossy().into_owned()];
        argv.extend(self.config.simulator_args(test));
        argv
    }

    /// Spawn `argv` in `cwd` and wait for it, the deadline or cancellation.
    async fn run_step(
        &self,
        argv: &[String],
        cwd: &Path,
        stdout: &SharedCapture,
        stderr: &SharedCapture,
        deadline: tokio::time::Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<StepExit, RegressError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RegressError::config("empty command line"))?;

        debug!(program = %program, args = ?args, cwd = %cwd.display(), "Spawning");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| RegressError::Launch {
                program: program.clone(),
                source,
            })?;

        let mut readers: Vec<JoinHandle<std::io::Result<()>>> = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(drain(out, stdout.clone())));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(drain(err, stderr.clone())));
        }

        let exit = tokio::select! {
            status = child.wait() => status.map(StepExit::Exited),
            _ = tokio::time::sleep_until(deadline) => {
                terminate(&mut child, program).await;
                Ok(StepExit::TimedOut)
            }
            _ = wait_cancelled(cancel) => {
                terminate(&mut child, program).await;
                Ok(StepExit::Cancelled)
            }
        };

        finish_readers(readers).await;
        exit.map_err(RegressError::from)
    }
}

#[async_trait]
impl TestExecutor for ProcessRunner {
    async fn execute(&self, case: &TestCase, mut cancel: watch::Receiver<bool>) -> RawOutcome {
        let start = Instant::now();

        let already_cancelled = *cancel.borrow();
        if already_cancelled {
            return RawOutcome {
                cancelled: true,
                ..RawOutcome::default()
            };
        }

        let workdir = match tempfile::Builder::new().prefix("simregress-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return RawOutcome::launch_failed(
                    format!("failed to create scratch directory: {e}"),
                    start.elapsed(),
                )
            }
        };

        let limit = self.config.max_output_bytes;
        let stdout = SharedCapture::new(limit);
        let stderr = SharedCapture::new(limit);
        let deadline = tokio::time::Instant::now() + self.config.timeout;

        let mut outcome = RawOutcome::default();

        if let Some(prepare) = self.config.prepare_command(&case.path) {
            match self
                .run_step(&prepare, workdir.path(), &stdout, &stderr, deadline, &mut cancel)
                .await
            {
                Ok(StepExit::Exited(status)) if status.success() => {}
                Ok(StepExit::Exited(status)) => {
                    outcome.launch_error = Some(format!("prepare command failed ({status})"));
                }
                Ok(StepExit::TimedOut) => outcome.timed_out = true,
                Ok(StepExit::Cancelled) => outcome.cancelled = true,
                Err(e) => outcome.launch_error = Some(e.to_string()),
            }
        }

        let prepared = outcome.launch_error.is_none() && !outcome.timed_out && !outcome.cancelled;
        if prepared {
            let argv = self.simulator_command(&case.path);
            match self
                .run_step(&argv, workdir.path(), &stdout, &stderr, deadline, &mut cancel)
                .await
            {
                Ok(StepExit::Exited(status)) => {
                    outcome.exit_code = status.code();
                    outcome.signal = exit_signal(&status);
                }
                Ok(StepExit::TimedOut) => outcome.timed_out = true,
                Ok(StepExit::Cancelled) => outcome.cancelled = true,
                Err(e) => {
                    warn!(test = %case.name, error = %e, "Simulator launch failed");
                    outcome.launch_error = Some(e.to_string());
                }
            }
        }

        outcome.artifacts = self
            .config
            .collect_artifacts
            .iter()
            .map(|name| workdir.path().join(name))
            .filter(|path| path.is_file())
            .collect();

        outcome.stdout = stdout.snapshot();
        outcome.stderr = stderr.snapshot();
        outcome.elapsed = start.elapsed();
        outcome.workdir = Some(workdir);
        outcome
    }
}

/// Kill `child` with its process group, then reap it.
async fn terminate(child: &mut Child, program: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        warn!(program = %program, error = %e, "Failed to kill subprocess");
    }
}

/// Resolves once cancellation is requested; never if the sender is gone.
pub(crate) async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Give readers a short grace period, then abandon them.
///
/// A grandchild that inherited the pipes can keep them open after the
/// simulator exits; what has been captured so far is kept either way.
async fn finish_readers(readers: Vec<JoinHandle<std::io::Result<()>>>) {
    for mut reader in readers {
        match tokio::time::timeout(READER_GRACE, &mut reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "Output reader failed"),
            Ok(Err(e)) => debug!(error = %e, "Output reader task failed"),
            Err(_) => {
                debug!("Output pipe still open after exit; abandoning reader");
                reader.abort();
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // The child was spawned with `process_group(0)`, so its pid is the pgid.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "Process group kill failed");
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
