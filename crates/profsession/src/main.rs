//! profsession - runs one profiling session and writes the collected trace.
//!
//! Starts a session with the built-in collectors, keeps it running for the
//! requested window (or until Ctrl-C), then collects, post-processes and
//! stores the trace.

mod fs;
mod output;
mod proc_stat;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use profsession_core::clock;
use profsession_core::{
    PluginRegistry, ProfileOptions, ProfilerError, ProfilerSession, SessionContext, XSpace,
};

use crate::output::{OutputFormat, write_xspace};
use crate::proc_stat::register_builtin_collectors;

/// Profiling window used when neither the flags nor the options file set one.
const DEFAULT_DURATION_MS: u64 = 2000;

/// Profiling session runner.
#[derive(Parser, Debug)]
#[command(
    name = "profsession",
    about = "Runs one profiling session and writes the trace",
    version
)]
struct Args {
    /// Profiling window in milliseconds.
    #[arg(short, long)]
    duration_ms: Option<u64>,

    /// Delay the start of tracing by this many milliseconds.
    #[arg(long)]
    start_delay_ms: Option<u64>,

    /// JSON file with profile options. Flags override its values.
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Trace dataset pipeline ops.
    #[arg(long)]
    include_dataset_ops: Option<bool>,

    /// Output file. Defaults to ./profile-<UTC time>.<ext>.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value = "zstd")]
    format: OutputFormat,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["profsession", "profsession_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Builds the session options from the options file and the flags.
///
/// Without an options file the built-in defaults are used, so the start delay
/// is always honored.
fn load_options(args: &Args) -> Result<ProfileOptions, String> {
    let mut options = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("invalid options in {}: {}", path.display(), e))?
        }
        None => ProfileOptions::default_options(),
    };

    if let Some(include) = args.include_dataset_ops {
        options = options.with_dataset_ops(include);
    }
    if let Some(delay_ms) = args.start_delay_ms {
        if options.version == 0 {
            warn!("--start-delay-ms is ignored: options file has version 0");
        }
        let start_ns = i64::try_from(delay_ms)
            .ok()
            .and_then(|ms| ms.checked_mul(1_000_000))
            .and_then(|delay_ns| clock::now_nanos().checked_add(delay_ns))
            .ok_or_else(|| format!("start delay of {} ms is out of range", delay_ms))?;
        options = options.start_at(start_ns);
    }
    options.duration_ms = match (args.duration_ms, options.duration_ms) {
        (Some(ms), _) => ms,
        (None, 0) => DEFAULT_DURATION_MS,
        (None, ms) => ms,
    };
    Ok(options)
}

fn default_output_path(format: OutputFormat) -> PathBuf {
    PathBuf::from(format!(
        "profile-{}.{}",
        Utc::now().format("%Y%m%d-%H%M%S"),
        format.extension()
    ))
}

/// Describes the contents of a trace for logging.
fn describe_xspace(space: &XSpace) -> String {
    if space.planes.is_empty() {
        return "no planes".to_string();
    }
    space
        .planes
        .iter()
        .map(|p| format!("{} ({} events)", p.name, p.event_count()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sleeps for `window`, returning early once `running` is cleared.
fn wait_for(window: Duration, running: &AtomicBool) {
    let sleep_interval = Duration::from_millis(100);
    let mut remaining = window;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(sleep_interval);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}

/// Runs one session: start, wait for the window, collect.
fn run_session(
    options: &ProfileOptions,
    context: SessionContext,
    running: &AtomicBool,
) -> Result<XSpace, ProfilerError> {
    let session = ProfilerSession::create_with(options, context);
    session.status()?;
    info!(
        plugins = session.plugin_count(),
        duration_ms = options.duration_ms,
        "profiling"
    );

    wait_for(Duration::from_millis(options.duration_ms), running);
    if !running.load(Ordering::SeqCst) {
        info!("Profiling window interrupted, collecting early");
    }

    let mut space = XSpace::default();
    session.collect_data(&mut space)?;
    Ok(space)
}

fn run(args: &Args) -> Result<(), String> {
    let options = load_options(args)?;
    debug!(?options, "resolved profile options");

    register_builtin_collectors(&PluginRegistry::global(), &args.proc_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received interrupt signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let space = run_session(&options, SessionContext::default(), &running)
        .map_err(|e| format!("profiler session failed: {}", e))?;
    info!("Collected: {}", describe_xspace(&space));

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(args.format));
    let written = write_xspace(&path, &space, args.format)
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
    info!("Trace written to {} ({} bytes)", path.display(), written);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    info!("profsession {} starting", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
