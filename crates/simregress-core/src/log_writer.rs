//! Per-test log files and collected simulator artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::{log_stem, TestResult};
use crate::error::{RegressError, Result};

/// Writes logs into the configured log directory.
#[derive(Debug, Clone)]
pub struct LogWriter {
    log_dir: PathBuf,
}

impl LogWriter {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Create the log directory if needed.
    ///
    /// Failure is only a warning: every later write will report its own error
    /// and the run still classifies every test.
    pub fn prepare(&self) {
        if self.log_dir.is_dir() {
            return;
        }
        match fs::create_dir_all(&self.log_dir) {
            Ok(()) => info!(dir = %self.log_dir.display(), "Created log directory"),
            Err(e) => warn!(
                dir = %self.log_dir.display(),
                error = %e,
                "Cannot create log directory; logs will not be written"
            ),
        }
    }

    /// Log file path for a test name.
    pub fn log_path(&self, test_name: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", log_stem(test_name)))
    }

    /// Write (truncating) the captured output of `result`.
    pub fn write(&self, result: &TestResult) -> Result<PathBuf> {
        let path = self.log_path(&result.name);
        fs::write(&path, result.output.as_bytes()).map_err(|source| RegressError::LogWrite {
            path: path.clone(),
            source,
        })?;
        debug!(test = %result.name, path = %path.display(), "Wrote log");
        Ok(path)
    }

    /// Copy artifacts next to the log as `<stem>.<artifact file name>`.
    ///
    /// Returns the number of artifacts that could not be saved.
    pub fn collect_artifacts(&self, test_name: &str, artifacts: &[PathBuf]) -> usize {
        let stem = log_stem(test_name);
        let mut failures = 0;
        for artifact in artifacts {
            let Some(file_name) = artifact.file_name() else {
                continue;
            };
            let dest = self
                .log_dir
                .join(format!("{stem}.{}", file_name.to_string_lossy()));
            match fs::copy(artifact, &dest) {
                Ok(_) => info!(test = %test_name, path = %dest.display(), "Saved artifact"),
                Err(e) => {
                    failures += 1;
                    warn!(
                        test = %test_name,
                        path = %dest.display(),
                        error = %e,
                        "Failed to save artifact"
                    );
                }
            }
        }
        failures
    }
}
