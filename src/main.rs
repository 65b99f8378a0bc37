//! # autoupdate
//!
//! Keeps an installed application current.
//!
//! Subcommands:
//! - `autoupdate check` compares the local version with the server's
//! - `autoupdate update` downloads, unpacks and installs a newer package
//! - `autoupdate cleanup` removes the backup and scratch files an update leaves
//!
//! Settings are read from `updater.toml` next to the executable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use autoupdate::{cmd_check, cmd_cleanup, cmd_update};

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "autoupdate",
    version,
    about = "autoupdate - self-updater for installed applications",
    arg_required_else_help = true
)]
struct Cli {
    /// Configuration file (default: updater.toml next to the executable)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Executable to update (default: the running executable)
    #[arg(long, global = true, value_name = "PATH")]
    exe: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show whether a newer version is available
    Check,
    /// Download and install the newest version
    Update {
        /// Install without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove backup and temporary files left by an update
    Cleanup,
}

/// `RUST_LOG` wins; otherwise `-v` enables debug output and the default
/// is warnings only.
fn init_logging(verbose: bool) {
    let fallback = if verbose { "autoupdate=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<u8> {
    let config = cli.config.as_deref();
    let exe = cli.exe.as_deref();

    match cli.cmd {
        Cmd::Check => cmd_check(config, exe).map(|_| 0),
        Cmd::Update { yes } => cmd_update(config, exe, yes),
        Cmd::Cleanup => cmd_cleanup(exe).map(|_| 0),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
