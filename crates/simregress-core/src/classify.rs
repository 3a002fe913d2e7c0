//! Outcome classification: PASS / FAIL / TIMEOUT / CRASH.
//!
//! The textual marker convention differs between simulators and test suites,
//! so marker detection sits behind [`OutcomeMatcher`].

use regex::Regex;

use crate::domain::{OutcomeKind, TestCase, TestResult};
use crate::error::{RegressError, Result};
use crate::runner::RawOutcome;

/// Success token printed by the ISA test harness.
pub const DEFAULT_PASS_MARKER: &str = "PASS";

/// Failure token printed by the ISA test harness.
pub const DEFAULT_FAIL_MARKER: &str = "FAIL";

/// Markers found in a test's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerScan {
    pub pass: bool,
    pub fail: bool,
}

impl MarkerScan {
    pub fn any(&self) -> bool {
        self.pass || self.fail
    }
}

/// Detects pass/fail markers in captured simulator output.
pub trait OutcomeMatcher: Send + Sync {
    fn scan(&self, output: &str) -> MarkerScan;
}

/// A single marker: a literal token or a regular expression.
#[derive(Debug, Clone)]
pub enum Marker {
    Token(String),
    Pattern(Regex),
}

impl Marker {
    pub fn token(token: impl Into<String>) -> Self {
        Marker::Token(token.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Marker::Pattern)
            .map_err(|e| RegressError::config(format!("invalid marker pattern {pattern:?}: {e}")))
    }

    pub fn is_match(&self, output: &str) -> bool {
        match self {
            Marker::Token(token) => output.contains(token.as_str()),
            Marker::Pattern(re) => re.is_match(output),
        }
    }
}

/// Matcher built from a success marker and an optional failure marker.
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
    pass: Marker,
    fail: Option<Marker>,
}

impl MarkerMatcher {
    pub fn new(pass: Marker, fail: Option<Marker>) -> Self {
        Self { pass, fail }
    }
}

impl Default for MarkerMatcher {
    fn default() -> Self {
        Self::new(
            Marker::token(DEFAULT_PASS_MARKER),
            Some(Marker::token(DEFAULT_FAIL_MARKER)),
        )
    }
}

impl OutcomeMatcher for MarkerMatcher {
    fn scan(&self, output: &str) -> MarkerScan {
        MarkerScan {
            pass: self.pass.is_match(output),
            fail: self.fail.as_ref().is_some_and(|m| m.is_match(output)),
        }
    }
}

/// Outcome kind plus a short reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: OutcomeKind,
    pub detail: String,
}

impl Classification {
    fn new(kind: OutcomeKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Classify a raw outcome.
///
/// Order of precedence: timeout, infrastructure failure (launch error,
/// signal, missing marker), then exit code and markers.
pub fn classify(raw: &RawOutcome, matcher: &dyn OutcomeMatcher) -> Classification {
    if raw.timed_out {
        return Classification::new(
            OutcomeKind::Timeout,
            format!("timed out after {} ms", raw.elapsed.as_millis()),
        );
    }
    if raw.cancelled {
        return Classification::new(OutcomeKind::Crash, "interrupted");
    }
    if let Some(err) = &raw.launch_error {
        return Classification::new(OutcomeKind::Crash, err.clone());
    }

    let code = match (raw.exit_code, raw.signal) {
        (Some(code), _) => code,
        (None, Some(signal)) => {
            return Classification::new(OutcomeKind::Crash, format!("killed by signal {signal}"))
        }
        (None, None) => return Classification::new(OutcomeKind::Crash, "terminated abnormally"),
    };

    let scan = matcher.scan(&raw.combined_output());
    if !scan.any() {
        return Classification::new(
            OutcomeKind::Crash,
            format!("no pass/fail marker in output (exit code {code})"),
        );
    }

    if code == 0 && scan.pass && !scan.fail {
        Classification::new(OutcomeKind::Pass, "exit code 0")
    } else if scan.fail {
        Classification::new(
            OutcomeKind::Fail,
            format!("failure marker in output (exit code {code})"),
        )
    } else {
        Classification::new(OutcomeKind::Fail, format!("exit code {code}"))
    }
}

/// Build the immutable [`TestResult`] for `case`.
pub fn to_result(case: &TestCase, raw: &RawOutcome, classification: Classification) -> TestResult {
    TestResult {
        name: case.name.clone(),
        outcome: classification.kind,
        exit_code: raw.exit_code,
        detail: classification.detail,
        output: raw.combined_output(),
        output_truncated: raw.output_truncated(),
        duration_ms: raw.elapsed.as_millis() as u64,
    }
}
