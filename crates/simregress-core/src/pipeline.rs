//! Regression pipeline: discovery, bounded parallel execution, ordered
//! aggregation, logging and reporting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify, to_result, OutcomeMatcher};
use crate::config::RunConfig;
use crate::discovery::{discover, DiscoveryFilter};
use crate::domain::{OutcomeKind, RunSummary, TestCase, TestResult};
use crate::error::{RegressError, Result};
use crate::log_writer::LogWriter;
use crate::report::{RunReport, RunReporter};
use crate::runner::{wait_cancelled, TestExecutor};

/// A finished test, sent from a worker task to the driver.
struct Completed {
    index: usize,
    result: TestResult,
    cancelled: bool,
    artifacts: Vec<PathBuf>,
    // Dropped (and deleted) only after artifacts are collected.
    _workdir: Option<TempDir>,
}

/// Regression run orchestrator.
pub struct Pipeline;

impl Pipeline {
    /// Run every discovered test once and build the report.
    ///
    /// Tests run on at most `config.jobs` workers. Results reach the driver
    /// through one channel, so the driver is the only writer of the result
    /// slots, the logs and the reporter. Slots are indexed by discovery
    /// order, which keeps the summary deterministic whatever the completion
    /// order.
    ///
    /// Fails before running anything on a configuration error. When `cancel`
    /// flips to `true` every in-flight simulator is killed and reaped, then
    /// [`RegressError::Interrupted`] is returned.
    pub async fn run(
        config: &RunConfig,
        executor: Arc<dyn TestExecutor>,
        matcher: Arc<dyn OutcomeMatcher>,
        reporter: &mut dyn RunReporter,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        config.check_limits()?;

        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let cases = discover(&config.test_dir, &DiscoveryFilter::from_config(config))?;
        let log_writer = LogWriter::new(&config.log_dir);
        log_writer.prepare();

        info!(
            run_id = %run_id,
            tests = cases.len(),
            jobs = config.jobs,
            timeout_ms = config.timeout.as_millis() as u64,
            "Starting regression run"
        );
        reporter.run_started(&cases);

        let semaphore = Arc::new(Semaphore::new(config.jobs));
        let (tx, mut rx) = mpsc::unbounded_channel::<Completed>();
        let mut workers = JoinSet::new();

        for (index, case) in cases.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&executor);
            let matcher = Arc::clone(&matcher);
            let cancel = cancel.clone();
            let tx = tx.clone();

            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let skip = *cancel.borrow();
                if skip {
                    return;
                }

                debug!(test = %case.name, "Executing test");
                let mut raw = executor.execute(&case, cancel).await;
                let classification = classify(&raw, matcher.as_ref());
                let result = to_result(&case, &raw, classification);

                let _ = tx.send(Completed {
                    index,
                    result,
                    cancelled: raw.cancelled,
                    artifacts: std::mem::take(&mut raw.artifacts),
                    _workdir: raw.workdir.take(),
                });
            });
        }
        drop(tx);

        let mut slots: Vec<Option<TestResult>> = vec![None; cases.len()];
        let mut log_failures = 0usize;
        let mut artifact_failures = 0usize;
        let mut interrupted = false;

        loop {
            tokio::select! {
                biased;
                completed = rx.recv() => {
                    let Some(completed) = completed else { break };
                    if completed.cancelled {
                        continue;
                    }
                    let index = completed.index;
                    let persisted = match persist(log_writer.clone(), completed).await {
                        Ok(persisted) => persisted,
                        Err(e) => {
                            warn!(error = %e, "Log writer task failed");
                            continue;
                        }
                    };
                    if let Err(e) = &persisted.logged {
                        log_failures += 1;
                        warn!(test = %persisted.result.name, error = %e, "Log write failed");
                    }
                    artifact_failures += persisted.artifact_failures;
                    reporter.test_finished(&persisted.result);
                    slots[index] = Some(persisted.result);
                }
                _ = wait_cancelled(&mut cancel), if !interrupted => {
                    interrupted = true;
                    warn!("Interrupt received; terminating in-flight simulators");
                }
            }
        }

        // Every worker has sent or given up; reap them so no subprocess
        // outlives the run.
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task failed");
            }
        }

        let cancelled = *cancel.borrow();
        if interrupted || cancelled {
            return Err(RegressError::Interrupted);
        }

        let mut summary = RunSummary::new(run_id, started_at);
        let mut results = Vec::with_capacity(cases.len());
        for (case, slot) in cases.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| lost_result(case));
            summary.record(&result);
            results.push(result);
        }
        summary.log_failures = log_failures;
        summary.artifact_failures = artifact_failures;
        summary.duration_ms = start.elapsed().as_millis() as u64;

        let report = RunReport {
            simulator: config.simulator.clone(),
            test_dir: config.test_dir.clone(),
            log_dir: config.log_dir.clone(),
            timeout_ms: config.timeout.as_millis() as u64,
            jobs: config.jobs,
            summary,
            results,
        };

        let summary_path = config.summary_file();
        match report.write_json(&summary_path) {
            Ok(()) => debug!(path = %summary_path.display(), "Wrote summary"),
            Err(e) => warn!(error = %e, "Summary write failed"),
        }

        info!(
            run_id = %run_id,
            total = report.summary.total,
            passed = report.summary.passed,
            success = report.success(),
            "Regression run finished"
        );
        reporter.run_finished(&report);

        Ok(report)
    }
}

/// A result after its log and artifacts have been written.
struct Persisted {
    result: TestResult,
    logged: Result<PathBuf>,
    artifact_failures: usize,
}

/// Write the log, copy artifacts and remove the scratch directory on the
/// blocking pool.
async fn persist(
    log_writer: LogWriter,
    completed: Completed,
) -> std::result::Result<Persisted, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let Completed {
            result,
            artifacts,
            _workdir: workdir,
            ..
        } = completed;
        let logged = log_writer.write(&result);
        let artifact_failures = if artifacts.is_empty() {
            0
        } else {
            log_writer.collect_artifacts(&result.name, &artifacts)
        };
        drop(workdir);
        Persisted {
            result,
            logged,
            artifact_failures,
        }
    })
    .await
}

/// Result recorded for a test whose worker died without reporting.
fn lost_result(case: &TestCase) -> TestResult {
    TestResult {
        name: case.name.clone(),
        outcome: OutcomeKind::Crash,
        exit_code: None,
        detail: "worker task failed before reporting a result".to_string(),
        output: String::new(),
        output_truncated: false,
        duration_ms: 0,
    }
}
