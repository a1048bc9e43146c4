mod config;
mod duration;
mod reader;
mod scheduler;
mod signals;
mod timestamp;
mod writer;

use clap::{CommandFactory, Parser};
use config::{ConfigError, Overrides, ProbeConfig};
use scheduler::Scheduler;
use signals::SignalHandler;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

/// Exit status for usage and configuration errors.
const EXIT_USAGE: u8 = 2;

/// Heartbeat-file liveness probe: periodically write a timestamp marker,
/// check that a marker is still being refreshed, or both.
#[derive(Parser, Debug)]
#[command(name = "liveprobe", version, about)]
pub struct Cli {
    /// Write to this file
    #[arg(short, long, value_name = "PATH")]
    write: Option<PathBuf>,

    /// Read from this file
    #[arg(short, long, value_name = "PATH")]
    read: Option<PathBuf>,

    /// Interval to read/write, e.g. 5s, 1m30s, 250ms (default: 5s)
    #[arg(short, long, value_name = "DURATION")]
    interval: Option<String>,

    /// Append to the file instead of truncating
    #[arg(short, long)]
    append: bool,

    /// Check mtime instead of file contents
    #[arg(short, long)]
    mtime: bool,

    /// Config file path (CLI flags override its values)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate settings and print them, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging on stderr (per-pass details)
    #[arg(short, long)]
    verbose: bool,

    /// Only print stale verdicts, the banner and the final line
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            write: self.write.clone(),
            read: self.read.clone(),
            interval: self.interval.clone(),
            append: self.append,
            mtime: self.mtime,
            quiet: self.quiet,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let started = Instant::now();
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            if e.is_usage() {
                println!("{e}");
                if let Err(e) = Cli::command().print_help() {
                    tracing::debug!(error = %e, "failed to print help");
                }
            } else {
                tracing::error!(error = %e, "invalid configuration");
                eprintln!("fatal error: {e}");
            }
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if cli.dry_run {
        print!("{settings}");
        println!("Dry run mode: settings validated, not running.");
        return ExitCode::SUCCESS;
    }

    let signals = match SignalHandler::install() {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            eprintln!("fatal error: failed to install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    let scheduler = Scheduler::new(settings, started);
    let mut stdout = std::io::stdout();
    match scheduler.run(&mut stdout, signals.wait()).await {
        Ok(passes) => {
            tracing::info!(passes, "probe stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal probe failure");
            eprintln!("fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> Result<config::Settings, ConfigError> {
    let file = match &cli.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::default(),
    };
    file.resolve(cli.overrides())
}

/// Logs go to stderr; stdout carries only status lines.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "liveprobe=debug"
    } else {
        "liveprobe=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}
