//! Run reporting: live per-test lines, the final summary block and the
//! machine-readable `summary.json`.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{OutcomeKind, RunSummary, TestCase, TestResult};
use crate::error::{RegressError, Result};

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub simulator: PathBuf,
    pub test_dir: PathBuf,
    pub log_dir: PathBuf,
    pub timeout_ms: u64,
    pub jobs: usize,

    pub summary: RunSummary,

    /// One entry per discovered test, in discovery order.
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.summary.success()
    }

    /// Write the report as pretty JSON (captured output is not included).
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RegressError::SummaryWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Receives progress events from the pipeline driver.
///
/// Called from a single task, in completion order.
pub trait RunReporter: Send {
    fn run_started(&mut self, _tests: &[TestCase]) {}

    fn test_finished(&mut self, result: &TestResult);

    fn run_finished(&mut self, _report: &RunReport) {}
}

/// Discards all events.
#[derive(Debug, Default)]
pub struct NullReporter;

impl RunReporter for NullReporter {
    fn test_finished(&mut self, _result: &TestResult) {}
}

/// Human-readable reporter writing to any [`Write`] (stdout in the CLI).
#[derive(Debug)]
pub struct ConsoleReporter<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RunReporter for ConsoleReporter<W> {
    fn run_started(&mut self, tests: &[TestCase]) {
        let _ = writeln!(self.out, "Running {} tests", tests.len());
    }

    fn test_finished(&mut self, result: &TestResult) {
        let _ = writeln!(self.out, "{}", format_result_line(result));
    }

    fn run_finished(&mut self, report: &RunReport) {
        let _ = write!(self.out, "{}", format_summary(&report.summary));
        let _ = self.out.flush();
    }
}

/// One status line per test, e.g. `TIMEOUT sub.bin (2003 ms): timed out after 2003 ms`.
pub fn format_result_line(result: &TestResult) -> String {
    let mut line = format!(
        "{:<7} {} ({} ms)",
        result.outcome.as_str(),
        result.name,
        result.duration_ms
    );
    if !result.passed() && !result.detail.is_empty() {
        let _ = write!(line, ": {}", result.detail);
    }
    line
}

/// Final summary block with counts and non-passing tests.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "Executed: {} tests", summary.total);
    for kind in OutcomeKind::ALL {
        let label = format!("{}:", kind.as_str());
        let _ = writeln!(out, "{:<9} {}", label, summary.count(kind));
    }
    if summary.log_failures > 0 {
        let _ = writeln!(out, "Log write failures: {}", summary.log_failures);
    }
    if summary.artifact_failures > 0 {
        let _ = writeln!(out, "Artifact copy failures: {}", summary.artifact_failures);
    }
    if !summary.failing.is_empty() {
        let _ = writeln!(out, "Not passing:");
        for name in &summary.failing {
            let _ = writeln!(out, "  {name}");
        }
    }
    let _ = writeln!(out, "Duration: {} ms", summary.duration_ms);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn result(name: &str, outcome: OutcomeKind, detail: &str) -> TestResult {
        TestResult {
            name: name.to_string(),
            outcome,
            exit_code: None,
            detail: detail.to_string(),
            output: "captured".to_string(),
            output_truncated: false,
            duration_ms: 12,
        }
    }

    fn report() -> RunReport {
        let results = vec![
            result("add.bin", OutcomeKind::Pass, "exit code 0"),
            result("sub.bin", OutcomeKind::Timeout, "timed out after 2000 ms"),
        ];
        let mut summary = RunSummary::new(Uuid::new_v4(), Utc::now());
        for r in &results {
            summary.record(r);
        }
        RunReport {
            simulator: PathBuf::from("/sim/sim_ok"),
            test_dir: PathBuf::from("/isa"),
            log_dir: PathBuf::from("/logs"),
            timeout_ms: 2000,
            jobs: 2,
            summary,
            results,
        }
    }

    #[test]
    fn test_result_line_formats() {
        let pass = result("add.bin", OutcomeKind::Pass, "exit code 0");
        assert_eq!(format_result_line(&pass), "PASS    add.bin (12 ms)");

        let timeout = result("sub.bin", OutcomeKind::Timeout, "timed out after 2000 ms");
        assert_eq!(
            format_result_line(&timeout),
            "TIMEOUT sub.bin (12 ms): timed out after 2000 ms"
        );
    }

    #[test]
    fn test_summary_block() {
        let text = format_summary(&report().summary);
        assert!(text.contains("Executed: 2 tests"));
        assert!(text.contains("PASS:     1"));
        assert!(text.contains("TIMEOUT:  1"));
        assert!(text.contains("Not passing:\n  sub.bin\n"));
        assert!(!text.contains("Artifact copy failures"));
    }

    #[test]
    fn test_summary_block_reports_io_failures() {
        let mut summary = report().summary;
        summary.log_failures = 1;
        summary.artifact_failures = 2;
        let text = format_summary(&summary);
        assert!(text.contains("Log write failures: 1"));
        assert!(text.contains("Artifact copy failures: 2"));
    }

    #[test]
    fn test_console_reporter_writes_lines() {
        let mut reporter = ConsoleReporter::new(Vec::new());
        let report = report();
        for r in &report.results {
            reporter.test_finished(r);
        }
        reporter.run_finished(&report);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.starts_with("PASS    add.bin"));
        assert!(text.contains("Executed: 2 tests"));
    }

    #[test]
    fn test_write_json_omits_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let report = report();
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 2);
        assert_eq!(value["summary"]["failing"][0], "sub.bin");
        assert_eq!(value["results"][1]["outcome"], "TIMEOUT");
        assert!(value["results"][0].get("output").is_none());
    }

    #[test]
    fn test_write_json_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = report()
            .write_json(&dir.path().join("missing/summary.json"))
            .unwrap_err();
        assert!(matches!(err, RegressError::SummaryWrite { .. }));
    }
}
