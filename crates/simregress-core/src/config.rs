//! Regression run configuration.
//!
//! A [`RunConfig`] is built once by the front end and passed by reference into
//! every component; nothing reads the environment after startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegressError, Result};

/// Placeholder replaced by the absolute test binary path in argument templates.
pub const TEST_PLACEHOLDER: &str = "{test}";

/// Default per-test timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default per-stream capture limit (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Default recursion depth for test discovery.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Extra tracing requested from the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimVerbosity {
    #[default]
    Quiet,
    /// Instruction trace (`+v1`).
    Instructions,
    /// Pipeline stage state (`+v2`).
    Pipeline,
}

impl SimVerbosity {
    /// Plusarg appended to the simulator command line, if any.
    pub fn plusarg(&self) -> Option<&'static str> {
        match self {
            SimVerbosity::Quiet => None,
            SimVerbosity::Instructions => Some("+v1"),
            SimVerbosity::Pipeline => Some("+v2"),
        }
    }

    /// Parse the `v1`/`v2` command-line spelling.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "v0" | "quiet" => Ok(SimVerbosity::Quiet),
            "v1" => Ok(SimVerbosity::Instructions),
            "v2" => Ok(SimVerbosity::Pipeline),
            other => Err(RegressError::config(format!(
                "unknown simulator verbosity: {other} (expected v1 or v2)"
            ))),
        }
    }
}

/// Configuration for one regression run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Simulator executable.
    pub simulator: PathBuf,

    /// Root directory of the ISA test binaries.
    pub test_dir: PathBuf,

    /// Destination for per-test logs and the summary.
    pub log_dir: PathBuf,

    /// Wall-clock limit per test.
    pub timeout: Duration,

    /// Maximum number of tests running at once.
    pub jobs: usize,

    /// Simulator argument template; `{test}` expands to the test binary path.
    pub sim_args: Vec<String>,

    /// Optional command run in the test's scratch directory before the
    /// simulator, e.g. an ELF-to-hex converter. Same `{test}` expansion.
    pub prepare: Option<Vec<String>>,

    pub verbosity: SimVerbosity,

    /// Keep only test files whose name contains one of these prefixes.
    /// Empty means no filtering.
    pub families: Vec<String>,

    /// File extensions (without dot) that are never test binaries.
    pub exclude_extensions: Vec<String>,

    pub max_depth: usize,

    /// Capture limit per output stream.
    pub max_output_bytes: usize,

    /// Files left by the simulator in its working directory that are saved
    /// next to the log.
    pub collect_artifacts: Vec<String>,

    /// Machine-readable summary destination. Defaults to `<log_dir>/summary.json`.
    pub summary_path: Option<PathBuf>,
}

impl RunConfig {
    /// Create a configuration with default settings for the three required inputs.
    pub fn new(
        simulator: impl Into<PathBuf>,
        test_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            simulator: simulator.into(),
            test_dir: test_dir.into(),
            log_dir: log_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            jobs: default_jobs(),
            sim_args: vec![TEST_PLACEHOLDER.to_string()],
            prepare: None,
            verbosity: SimVerbosity::Quiet,
            families: Vec::new(),
            exclude_extensions: vec!["dump".to_string(), "log".to_string()],
            max_depth: DEFAULT_MAX_DEPTH,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            collect_artifacts: Vec::new(),
            summary_path: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Check the configuration and resolve the input paths to absolute form.
    ///
    /// Fails with [`RegressError::Config`] for a missing simulator, a missing
    /// test directory, a zero timeout or zero jobs. The log directory is not
    /// checked here: an unwritable log directory only produces warnings.
    pub fn validate(mut self) -> Result<Self> {
        if !self.simulator.is_file() {
            return Err(RegressError::config(format!(
                "simulator executable does not exist: {}",
                self.simulator.display()
            )));
        }
        if !self.test_dir.is_dir() {
            return Err(RegressError::config(format!(
                "test directory does not exist: {}",
                self.test_dir.display()
            )));
        }
        self.check_limits()?;

        self.simulator = self.simulator.canonicalize()?;
        self.test_dir = self.test_dir.canonicalize()?;
        self.log_dir = std::path::absolute(&self.log_dir)?;
        Ok(self)
    }

    /// Path-independent checks: non-zero timeout and jobs, non-empty prepare
    /// command. [`Pipeline::run`](crate::Pipeline::run) repeats these for
    /// configurations that never went through [`RunConfig::validate`].
    pub fn check_limits(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(RegressError::config("timeout must be greater than zero"));
        }
        if self.jobs == 0 {
            return Err(RegressError::config("jobs must be at least 1"));
        }
        if let Some(prepare) = &self.prepare {
            if prepare.is_empty() {
                return Err(RegressError::config("prepare command is empty"));
            }
        }
        Ok(())
    }

    /// Where the JSON summary is written.
    pub fn summary_file(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| self.log_dir.join("summary.json"))
    }

    /// Simulator arguments for `test`, verbosity plusarg last.
    pub fn simulator_args(&self, test: &Path) -> Vec<String> {
        let mut args = expand_template(&self.sim_args, test);
        if let Some(plusarg) = self.verbosity.plusarg() {
            args.push(plusarg.to_string());
        }
        args
    }

    /// Prepare command for `test` (program first), if configured.
    pub fn prepare_command(&self, test: &Path) -> Option<Vec<String>> {
        self.prepare
            .as_ref()
            .map(|template| expand_template(template, test))
    }
}

fn expand_template(template: &[String], test: &Path) -> Vec<String> {
    let test = test.to_string_lossy();
    template
        .iter()
        .map(|arg| arg.replace(TEST_PLACEHOLDER, &test))
        .collect()
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
