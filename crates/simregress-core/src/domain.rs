//! Core records of a regression run: test cases, results and the summary.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ISA test program found in the test directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Path relative to the test directory, `/`-separated. Unique within a run.
    pub name: String,

    /// Absolute path to the test binary.
    pub path: PathBuf,
}

impl TestCase {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// File-system safe stem used for the log file and collected artifacts.
    pub fn log_stem(&self) -> String {
        log_stem(&self.name)
    }
}

/// Flatten a test name into a single path component.
pub fn log_stem(name: &str) -> String {
    name.replace('/', "__")
}

/// Classification of a single test's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Pass,
    Fail,
    Timeout,
    Crash,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 4] = [
        OutcomeKind::Pass,
        OutcomeKind::Fail,
        OutcomeKind::Timeout,
        OutcomeKind::Crash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "PASS",
            OutcomeKind::Fail => "FAIL",
            OutcomeKind::Timeout => "TIMEOUT",
            OutcomeKind::Crash => "CRASH",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, OutcomeKind::Pass)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running one [`TestCase`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name (same as [`TestCase::name`]).
    pub name: String,

    pub outcome: OutcomeKind,

    /// Exit code, present only if the simulator terminated normally.
    pub exit_code: Option<i32>,

    /// Short human-readable reason for the classification.
    pub detail: String,

    /// Captured simulator output (bounded). Not part of the JSON summary.
    #[serde(skip)]
    pub output: String,

    /// Whether the captured output hit the capture limit.
    pub output_truncated: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// Aggregate over all results of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Number of recorded results. Equals the number of discovered tests.
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub crashed: usize,

    /// Names of non-passing tests, in discovery order.
    pub failing: Vec<String>,

    /// Tests whose log file could not be written.
    pub log_failures: usize,

    /// Collected artifacts that could not be copied into the log directory.
    pub artifact_failures: usize,

    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            total: 0,
            passed: 0,
            failed: 0,
            timed_out: 0,
            crashed: 0,
            failing: Vec::new(),
            log_failures: 0,
            artifact_failures: 0,
            duration_ms: 0,
        }
    }

    /// Fold one result into the summary. Callers feed results in discovery order.
    pub fn record(&mut self, result: &TestResult) {
        self.total += 1;
        match result.outcome {
            OutcomeKind::Pass => self.passed += 1,
            OutcomeKind::Fail => self.failed += 1,
            OutcomeKind::Timeout => self.timed_out += 1,
            OutcomeKind::Crash => self.crashed += 1,
        }
        if !result.passed() {
            self.failing.push(result.name.clone());
        }
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Pass => self.passed,
            OutcomeKind::Fail => self.failed,
            OutcomeKind::Timeout => self.timed_out,
            OutcomeKind::Crash => self.crashed,
        }
    }

    /// True when every recorded result passed.
    pub fn success(&self) -> bool {
        self.passed == self.total
    }
}
