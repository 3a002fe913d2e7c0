//! Integration tests for the regression pipeline with shell-script simulators.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use simregress_core::{
    MarkerMatcher, NullReporter, OutcomeKind, Pipeline, ProcessRunner, RunConfig, RunReport,
};
use tempfile::TempDir;
use tokio::sync::watch;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(tests: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("isa")).unwrap();
        for name in tests {
            std::fs::write(dir.path().join("isa").join(name), b"\x7fELF").unwrap();
        }
        Self { dir }
    }

    fn simulator(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("sim_ok");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn isa(&self) -> PathBuf {
        self.dir.path().join("isa")
    }

    fn logs(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    fn config(&self, sim: &Path) -> RunConfig {
        RunConfig::new(sim, self.isa(), self.logs())
            .with_timeout(Duration::from_secs(2))
            .with_jobs(2)
            .validate()
            .unwrap()
    }
}

async fn run(config: &RunConfig) -> RunReport {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    Pipeline::run(
        config,
        Arc::new(ProcessRunner::new(config)),
        Arc::new(MarkerMatcher::default()),
        &mut NullReporter,
        cancel_rx,
    )
    .await
    .expect("pipeline failed")
}

/// Test: simulator that always passes
#[tokio::test]
async fn test_all_pass() {
    let fx = Fixture::new(&["add.bin", "sub.bin"]);
    let sim = fx.simulator("echo PASS\nexit 0");

    let report = run(&fx.config(&sim)).await;

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.passed, 2);
    assert!(report.success());
    assert!(fx.logs().join("add.bin.log").is_file());
    assert!(fx.logs().join("sub.bin.log").is_file());
    assert!(fx.logs().join("summary.json").is_file());
}

/// Test: one test hangs and is killed at the timeout
#[tokio::test]
async fn test_hanging_test_times_out() {
    let fx = Fixture::new(&["add.bin", "sub.bin"]);
    let sim = fx.simulator(
        "case \"$1\" in\n  *sub.bin) exec sleep 60 ;;\nesac\necho PASS\nexit 0",
    );

    let report = run(&fx.config(&sim)).await;

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.timed_out, 1);
    assert_eq!(report.summary.failing, vec!["sub.bin"]);
    assert_eq!(report.results[1].outcome, OutcomeKind::Timeout);
    assert!(!report.success());
}

/// Test: same marker, non-zero exit flips PASS to FAIL
#[tokio::test]
async fn test_nonzero_exit_with_marker_fails() {
    let fx = Fixture::new(&["add.bin", "sub.bin"]);
    let sim = fx.simulator(
        "echo PASS\ncase \"$1\" in\n  *sub.bin) exit 1 ;;\nesac\nexit 0",
    );

    let report = run(&fx.config(&sim)).await;

    assert_eq!(report.results[0].outcome, OutcomeKind::Pass);
    assert_eq!(report.results[1].outcome, OutcomeKind::Fail);
    assert_eq!(report.results[1].exit_code, Some(1));
}

/// Test: missing marker and signals are crashes, not failures
#[tokio::test]
async fn test_crash_classification() {
    let fx = Fixture::new(&["nomarker.bin", "segv.bin"]);
    let sim = fx.simulator(
        "case \"$1\" in\n  *segv.bin) kill -SEGV $$ ;;\nesac\necho done\nexit 0",
    );

    let report = run(&fx.config(&sim)).await;

    assert_eq!(report.summary.crashed, 2);
    assert!(report.results[1].detail.contains("signal"));
}

/// Test: every discovered test yields exactly one result
#[tokio::test]
async fn test_total_matches_discovered() {
    let names: Vec<String> = (0..9).map(|i| format!("rv32ui-p-t{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let fx = Fixture::new(&refs);
    let sim = fx.simulator(
        "case \"$1\" in\n  *t3|*t7) echo FAIL; exit 1 ;;\nesac\necho PASS",
    );

    let mut config = fx.config(&sim);
    config.jobs = 3;
    let report = run(&config).await;

    assert_eq!(report.summary.total, 9);
    assert_eq!(report.results.len(), 9);
    assert_eq!(report.summary.passed + report.summary.failed, 9);
    assert_eq!(report.summary.failing, vec!["rv32ui-p-t3", "rv32ui-p-t7"]);
}

/// Test: re-running overwrites logs under the same names
#[tokio::test]
async fn test_rerun_replaces_logs() {
    let fx = Fixture::new(&["add.bin"]);
    let counter = fx.dir.path().join("count");
    let sim = fx.simulator(&format!(
        "echo x >> {c}\necho \"PASS run $(wc -l < {c} | tr -d ' ')\"",
        c = counter.display()
    ));
    let config = fx.config(&sim);

    run(&config).await;
    let first = std::fs::read_dir(fx.logs()).unwrap().count();
    run(&config).await;
    let second = std::fs::read_dir(fx.logs()).unwrap().count();

    assert_eq!(first, second);
    let log = std::fs::read_to_string(fx.logs().join("add.bin.log")).unwrap();
    assert!(log.trim_end().ends_with("run 2"), "unexpected log: {log}");
}

/// Test: an unusable log directory does not stop classification
#[tokio::test]
async fn test_unwritable_log_dir() {
    let fx = Fixture::new(&["add.bin", "sub.bin"]);
    let sim = fx.simulator("echo PASS");

    // A regular file where the log directory's parent should be.
    let blocker = fx.dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let config = RunConfig::new(&sim, fx.isa(), blocker.join("logs"))
        .with_timeout(Duration::from_secs(2))
        .validate()
        .unwrap();

    let report = run(&config).await;

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.passed, 2);
    assert_eq!(report.summary.log_failures, 2);
}

/// Test: the architecture family filter selects only relevant tests
#[tokio::test]
async fn test_family_filter() {
    let fx = Fixture::new(&["rv32ui-p-add", "rv32ui-p-add.dump", "rv64ui-p-add", "rv32uf-p-fadd"]);
    let sim = fx.simulator("echo PASS");

    let mut config = fx.config(&sim);
    config.families = vec!["rv32ui-p".to_string(), "rv32mi-p".to_string()];
    let report = run(&config).await;

    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["rv32ui-p-add"]);
}

/// Test: interrupting the run kills in-flight simulators
#[tokio::test]
async fn test_interrupt_kills_simulators() {
    let fx = Fixture::new(&["a.bin", "b.bin"]);
    let pids = fx.dir.path().join("pids");
    let sim = fx.simulator(&format!("echo $$ >> {}\nexec sleep 60", pids.display()));
    let config = fx.config(&sim);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = {
        let config = config.clone();
        tokio::spawn(async move {
            Pipeline::run(
                &config,
                Arc::new(ProcessRunner::new(&config)),
                Arc::new(MarkerMatcher::default()),
                &mut NullReporter,
                cancel_rx,
            )
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel_tx.send(true).unwrap();
    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, simregress_core::RegressError::Interrupted));

    let pids = std::fs::read_to_string(&pids).unwrap();
    for pid in pids.lines() {
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .status()
            .unwrap()
            .success();
        assert!(!alive, "simulator {pid} survived the interrupt");
    }
}
