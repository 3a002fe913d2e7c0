//! Diagnostic logging for simregress.
//!
//! Diagnostics always go to stderr. stdout belongs to the per-test report,
//! which scripts and CI logs parse.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset or unparsable.
fn fallback_filter(level: Level) -> EnvFilter {
    EnvFilter::new(level.as_str())
}

/// Install the process-wide subscriber; only the first call has an effect.
///
/// `RUST_LOG` overrides `level`. With `json` every event is one JSON object
/// per line, for log collectors.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter(level));

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init();
}
