//! simregress - ISA regression runner
//!
//! Runs every test binary below a directory against a simulator executable,
//! saves `<LOG_DIR>/<test>.log` per test and a `summary.json`, and exits
//! non-zero unless every test passed.
//!
//! ## Exit codes
//!
//! - `0`: all tests passed
//! - `1`: at least one test failed, timed out or crashed
//! - `2`: configuration or usage error
//! - `130`: interrupted

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use simregress_core::config::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_OUTPUT_BYTES, TEST_PLACEHOLDER};
use simregress_core::{
    ArchSpec, ConsoleReporter, Marker, MarkerMatcher, Pipeline, ProcessRunner, RegressError,
    RunConfig, SimVerbosity,
};

const EXIT_TEST_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "simregress")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run ISA test programs against a simulator and report PASS/FAIL/TIMEOUT/CRASH")]
#[command(after_help = "Example:\n  \
    simregress ../builds/RV32IMU_verilator/exe_HW_sim ./isa ./Logs --arch-filter \\\n      \
    --prepare 'elf_to_hex {test} Mem.hex' --sim-arg +tohost --collect trace_out.dat")]
struct Cli {
    /// Simulator executable
    simulator: PathBuf,

    /// Root directory of the ISA test binaries
    test_dir: PathBuf,

    /// Directory for per-test logs and the summary
    log_dir: PathBuf,

    /// Per-test timeout in seconds
    #[arg(short, long, default_value_t = 60)]
    timeout: u64,

    /// Maximum number of tests running at once (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Simulator argument; repeatable. `{test}` expands to the test binary path.
    /// Default: `{test}`
    #[arg(long = "sim-arg", value_name = "ARG", allow_hyphen_values = true)]
    sim_args: Vec<String>,

    /// Command run in the test's scratch directory before the simulator,
    /// e.g. 'elf_to_hex {test} Mem.hex'
    #[arg(long, value_name = "CMD")]
    prepare: Option<String>,

    /// Simulator tracing: v1 (instruction trace) or v2 (pipeline state)
    #[arg(long, value_name = "LEVEL", value_parser = parse_verbosity)]
    sim_verbosity: Option<SimVerbosity>,

    /// Only run the ISA test families implied by the architecture in the simulator path
    #[arg(long)]
    arch_filter: bool,

    /// Only run tests whose file name contains this prefix; repeatable
    #[arg(long = "family", value_name = "PREFIX")]
    families: Vec<String>,

    /// Skip files with this extension; repeatable. Default: dump, log
    #[arg(long = "exclude-ext", value_name = "EXT")]
    exclude_extensions: Vec<String>,

    /// Maximum directory depth searched for tests
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Success marker in simulator output
    #[arg(long, default_value = "PASS")]
    pass_marker: String,

    /// Failure marker in simulator output
    #[arg(long, default_value = "FAIL")]
    fail_marker: String,

    /// Do not look for a failure marker
    #[arg(long)]
    no_fail_marker: bool,

    /// Treat the markers as regular expressions
    #[arg(long)]
    marker_regex: bool,

    /// Capture limit per output stream, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    max_output: usize,

    /// File the simulator leaves in its working directory to save next to the log; repeatable
    #[arg(long = "collect", value_name = "FILE")]
    collect: Vec<String>,

    /// JSON summary path (default: <LOG_DIR>/summary.json)
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

fn parse_verbosity(s: &str) -> std::result::Result<SimVerbosity, String> {
    SimVerbosity::parse(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Resolve the command line into a validated [`RunConfig`].
    fn to_config(&self) -> Result<RunConfig> {
        let mut config = RunConfig::new(&self.simulator, &self.test_dir, &self.log_dir)
            .with_timeout(Duration::from_secs(self.timeout));

        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        config.sim_args = if self.sim_args.is_empty() {
            vec![TEST_PLACEHOLDER.to_string()]
        } else {
            self.sim_args.clone()
        };
        config.prepare = self
            .prepare
            .as_deref()
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect());
        config.verbosity = self.sim_verbosity.unwrap_or_default();
        if !self.exclude_extensions.is_empty() {
            config.exclude_extensions = self.exclude_extensions.clone();
        }
        config.max_depth = self.max_depth;
        config.max_output_bytes = self.max_output;
        config.collect_artifacts = self.collect.clone();
        config.summary_path = self.summary.clone();

        config.families = self.families.clone();
        if self.arch_filter {
            let arch = ArchSpec::from_simulator_path(&self.simulator).ok_or_else(|| {
                RegressError::config(format!(
                    "cannot find an architecture string (RV32... or RV64...) in simulator path {}",
                    self.simulator.display()
                ))
            })?;
            info!(arch = %arch, "Detected architecture");
            config.families.extend(arch.test_families());
        }

        Ok(config.validate()?)
    }

    fn matcher(&self) -> Result<MarkerMatcher> {
        let marker = |text: &str| -> Result<Marker> {
            if self.marker_regex {
                Ok(Marker::pattern(text)?)
            } else {
                Ok(Marker::token(text))
            }
        };
        let pass = marker(&self.pass_marker)?;
        let fail = if self.no_fail_marker {
            None
        } else {
            Some(marker(&self.fail_marker)?)
        };
        Ok(MarkerMatcher::new(pass, fail))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    simregress_core::init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_TEST_FAILURE),
        Err(e) => {
            let code = match e.downcast_ref::<RegressError>() {
                Some(RegressError::Interrupted) => EXIT_INTERRUPTED,
                _ => EXIT_USAGE,
            };
            eprintln!("error: {e:#}");
            ExitCode::from(code)
        }
    }
}

/// Run the regression. Returns whether every test passed.
async fn run(cli: &Cli) -> Result<bool> {
    let config = cli.to_config().context("invalid configuration")?;
    let matcher = cli.matcher().context("invalid marker")?;

    println!("Simulator: {}", config.simulator.display());
    println!("Tests:     {}", config.test_dir.display());
    println!("Logs:      {}", config.log_dir.display());
    if !config.families.is_empty() {
        println!("Test families: {}", config.families.join(", "));
    }
    println!();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    spawn_signal_listener(cancel_tx);

    let mut reporter = ConsoleReporter::new(std::io::stdout());
    let report = Pipeline::run(
        &config,
        Arc::new(ProcessRunner::new(&config)),
        Arc::new(matcher),
        &mut reporter,
        cancel_rx,
    )
    .await
    .context("regression run failed")?;

    Ok(report.success())
}

/// Flip the cancellation flag on Ctrl-C or SIGTERM.
fn spawn_signal_listener(cancel: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received");
        let _ = cancel.send(true);
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
