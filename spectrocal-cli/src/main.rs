//! spectrocal CLI - Bench station for collecting spectro instrument calibration data.
//!
//! ## Features
//!
//! - Automatic discovery of the instrument's USB-UART adapter board
//! - Collection loop appending black/white-point tables to CSV files
//! - One-shot queries with JSON output
//! - Raw command access for bench debugging
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use spectrocal::{
    DiscoveryConfig, EngineConfig, NativePortLister, SessionConfig, Station,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod export;
mod prompt;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the operator pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// CLI-level failures with dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing interactive terminal (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Operator cancelled (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// spectrocal - Collect calibration data from spectro instruments.
///
/// Environment variables:
///   SPECTROCAL_PORT         - Serial port to use (skips adapter discovery)
///   SPECTROCAL_OUTPUT_DIR   - Directory for exported CSV files
#[derive(Parser)]
#[command(name = "spectrocal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (adapter is auto-detected if not specified).
    #[arg(short, long, global = true, env = "SPECTROCAL_PORT")]
    port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Collect instruments one after another into CSV files (default).
    Collect(CollectArgs),

    /// Interrogate one instrument and print the result.
    Query {
        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send one raw command and print the response lines.
    Send {
        /// Command token, e.g. SER.
        token: String,

        /// Collection window in milliseconds (defaults to the command's own window).
        #[arg(long, value_name = "MS")]
        window_ms: Option<u64>,
    },

    /// List serial ports and the adapter that would be used.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Include ports that are not instrument adapters.
        #[arg(long)]
        all: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Options for the collection loop.
#[derive(Args, Debug, Default)]
struct CollectArgs {
    /// Device model being collected (prompted if not given).
    #[arg(long)]
    device: Option<String>,

    /// Batch label such as passes or fails (prompted if not given).
    #[arg(long)]
    metric: Option<String>,

    /// Directory for the CSV files (defaults to your Documents folder).
    #[arg(short, long, value_name = "DIR", env = "SPECTROCAL_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<spectrocal::Error>() {
        Some(spectrocal::Error::Interrupted) => 130,
        Some(spectrocal::Error::InvalidCommand(_)) => 2,
        _ => 1,
    }
}

/// Route Ctrl-C into the library's interrupt checker. A second Ctrl-C exits.
fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    }) {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
    spectrocal::set_interrupt_checker(was_interrupted);
}

/// Build the acquisition workflow from flags and config.
fn build_station(cli: &Cli, config: &Config) -> Station<NativePortLister> {
    let discovery = DiscoveryConfig {
        usb: config.usb_id(),
        ..DiscoveryConfig::default()
    };
    let station = Station::new(
        NativePortLister,
        discovery,
        EngineConfig::default(),
        SessionConfig::default(),
    );

    match cli
        .port
        .clone()
        .or_else(|| config.port.serial.clone())
    {
        Some(port) => station.with_port(port),
        None => station,
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            // Session milestones are printed by the commands themselves
            0 => "info,spectrocal=warn",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "spectrocal v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        None => commands::collect::cmd_collect(&cli, &config, &CollectArgs::default()),
        Some(Commands::Collect(args)) => commands::collect::cmd_collect(&cli, &config, args),
        Some(Commands::Query { json }) => commands::query::cmd_query(&cli, &config, *json),
        Some(Commands::Send { token, window_ms }) => {
            commands::query::cmd_send(&cli, &config, token, *window_ms)
        },
        Some(Commands::ListPorts { json, all }) => {
            commands::ports::cmd_list_ports(&config, *json, *all)
        },
        Some(Commands::Completions { shell }) => commands::completions::cmd_completions(*shell),
    }
}
