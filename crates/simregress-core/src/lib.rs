//! simregress core
//!
//! Runs a directory of precompiled ISA test programs against a simulator
//! executable and reports the outcome of each:
//! - discovers test binaries (optionally filtered to the ISA test families of
//!   the simulated architecture)
//! - runs each test in its own subprocess with a timeout, on a bounded pool
//! - classifies PASS / FAIL / TIMEOUT / CRASH from exit status and markers
//! - writes one log per test plus a JSON summary

pub mod arch;
pub mod capture;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod log_writer;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use arch::{ArchSpec, Xlen};
pub use classify::{classify, Classification, Marker, MarkerMatcher, MarkerScan, OutcomeMatcher};
pub use config::{RunConfig, SimVerbosity};
pub use discovery::{discover, DiscoveryFilter};
pub use domain::{OutcomeKind, RunSummary, TestCase, TestResult};
pub use error::{RegressError, Result};
pub use log_writer::LogWriter;
pub use pipeline::Pipeline;
pub use report::{ConsoleReporter, NullReporter, RunReport, RunReporter};
pub use runner::{ProcessRunner, RawOutcome, TestExecutor};
pub use telemetry::init_tracing;
