pub mod archive;
pub mod download;
pub mod error;
pub mod filter;
pub mod install;
pub mod pipeline;
pub mod transport;

use anyhow::{Context, Result};
use colored::Colorize;
use std::cmp::Ordering;
use std::io::{self, IsTerminal};
use std::path::Path;
use tracing::info;

use crate::config::{Config, load_config};
use crate::paths::{Paths, paths};
use crate::version::compare;
use archive::ZipCodec;
use filter::InstallFilter;
use install::Installer;
use pipeline::{
    AssumeYes, Confirmation, Outcome, PipelineContext, PipelineOptions, UpdatePipeline,
    fetch_remote_version, stdin_confirmation,
};
use transport::ReqwestTransport;

/// Resolve the installation layout and load its configuration.
///
/// `exe` overrides the running executable; `config` overrides
/// `<install>/updater.toml`.
fn resolve(config: Option<&Path>, exe: Option<&Path>) -> Result<(Config, Paths)> {
    let p = match exe {
        Some(exe) => Paths::for_executable(exe)?,
        None => paths()?,
    };
    let cfg = load_config(config.unwrap_or(p.config.as_path()))?;
    Ok((cfg, p))
}

fn transport_for(cfg: &Config) -> Result<ReqwestTransport> {
    ReqwestTransport::new(&cfg.user_agent(), cfg.timeout()).context("failed to build HTTP client")
}

/// Print the local and remote versions without changing anything.
pub fn cmd_check(config: Option<&Path>, exe: Option<&Path>) -> Result<()> {
    let (cfg, _) = resolve(config, exe)?;
    let current = cfg.current_version()?;
    let transport = transport_for(&cfg)?;
    let remote = fetch_remote_version(&transport, &cfg.version_url)?;

    match compare(&current, &remote) {
        Ordering::Less => println!(
            "{} {} -> {}",
            "update available:".yellow(),
            current,
            remote.to_string().green()
        ),
        _ => println!("{} ({})", "up to date".green(), current),
    }
    Ok(())
}

/// Run the full update pipeline and return the process exit code.
///
/// Configuration problems are returned as errors; a failure inside the
/// pipeline is reported on stderr and mapped to its stage's exit code.
pub fn cmd_update(config: Option<&Path>, exe: Option<&Path>, assume_yes: bool) -> Result<u8> {
    let (cfg, p) = resolve(config, exe)?;
    let current = cfg.current_version()?;
    let transport = transport_for(&cfg)?;
    let filter = InstallFilter::new(&cfg.exclude, &cfg.module_extensions)?;

    let options = PipelineOptions {
        version_url: cfg.version_url.clone(),
        download_url: cfg.download_url.clone(),
        self_unlock: cfg.self_unlock,
        remove_backups: cfg.remove_backups,
        show_progress: io::stderr().is_terminal(),
    };
    let ctx = PipelineContext::new(current, &p);
    let mut pipeline = UpdatePipeline::new(ctx, options, &transport, &ZipCodec, filter);

    let mut confirm: Box<dyn Confirmation> = if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(stdin_confirmation())
    };

    let result = pipeline.run(confirm.as_mut());
    let log = pipeline.diagnostics();

    match result {
        Ok(Outcome::NoUpdate { current, remote }) => {
            println!("{} (local {}, remote {})", "already up to date".green(), current, remote);
            Ok(0)
        }
        Ok(Outcome::Declined { remote }) => {
            println!("update to {} skipped", remote);
            Ok(0)
        }
        Ok(Outcome::Done { version, report }) => {
            println!(
                "{} {} ({} new, {} replaced, {} unchanged modules)",
                "updated to".green(),
                version,
                report.files_created,
                report.files_overwritten,
                report.modules_unchanged
            );
            if !log.is_empty() {
                eprintln!("{}", log.report().yellow());
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("{} {}", "update failed:".red().bold(), e);
            eprintln!("{}", log.report().red());
            Ok(e.stage().exit_code())
        }
    }
}

/// Delete the backup executable and any scratch directory a previous run
/// left behind.
pub fn cmd_cleanup(exe: Option<&Path>) -> Result<()> {
    let p = match exe {
        Some(exe) => Paths::for_executable(exe)?,
        None => paths()?,
    };

    let filter = InstallFilter::new::<&str>(&[], &[])?;
    let installer = Installer::new(&filter);
    let mut log = crate::diagnostics::DiagnosticLog::new();

    let removed = installer.remove_backups(&[p.backup()], &mut log);
    installer.remove_temp(&p.temp)?;
    info!(removed, "cleanup finished");

    if !log.is_empty() {
        anyhow::bail!("{}", log.report());
    }
    if removed > 0 {
        println!("{} {}", "removed".green(), p.backup().display());
    } else {
        println!("nothing to clean up");
    }
    Ok(())
}
