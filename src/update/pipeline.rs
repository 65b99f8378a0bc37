use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use super::archive::{ArchiveCodec, extract};
use super::download::Downloader;
use super::error::{
    DownloadError, ExtractError, InstallError, PipelineError, TransportError, VersionError,
};
use super::filter::InstallFilter;
use super::install::{Installer, MergeReport};
use super::transport::HttpTransport;
use crate::diagnostics::{Code, DiagnosticLog};
use crate::paths::Paths;
use crate::progress::StageSpinner;
use crate::version::{ParseVersionError, Version, compare};

/// Asks the user whether to install an available update.
///
/// Returns the raw answer; the pipeline decides whether it is valid.
pub trait Confirmation {
    fn ask(&mut self, current: &Version, remote: &Version) -> io::Result<String>;
}

/// Announces the update on `out` and reads one line from `input`.
pub struct PromptConfirmation<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> PromptConfirmation<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }
}

impl<R: BufRead, W: Write> Confirmation for PromptConfirmation<R, W> {
    fn ask(&mut self, current: &Version, remote: &Version) -> io::Result<String> {
        writeln!(self.out, "An update is available.")?;
        writeln!(self.out, "Newest version:  {}", remote)?;
        writeln!(self.out, "Current version: {}", current)?;
        writeln!(self.out)?;
        write!(self.out, "Would you like to update? (y/n) ")?;
        self.out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "no answer given"));
        }
        Ok(line)
    }
}

/// Prompt on the terminal.
pub fn stdin_confirmation() -> PromptConfirmation<io::StdinLock<'static>, io::Stdout> {
    PromptConfirmation::new(io::stdin().lock(), io::stdout())
}

/// Answers yes without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn ask(&mut self, current: &Version, remote: &Version) -> io::Result<String> {
        info!(%current, %remote, "update accepted without prompting");
        Ok("y".to_string())
    }
}

/// Where a run currently is. `NoUpdate`, `Declined`, `Done` and `Failed`
/// are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    ProbeVersion,
    UpdateAvailable,
    AwaitConfirmation,
    Downloading,
    Extracting,
    Installing,
    CleaningUp,
    NoUpdate,
    Declined,
    Done,
    Failed(Code),
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::ProbeVersion => f.write_str("probe-version"),
            State::UpdateAvailable => f.write_str("update-available"),
            State::AwaitConfirmation => f.write_str("await-confirmation"),
            State::Downloading => f.write_str("downloading"),
            State::Extracting => f.write_str("extracting"),
            State::Installing => f.write_str("installing"),
            State::CleaningUp => f.write_str("cleaning-up"),
            State::NoUpdate => f.write_str("no-update"),
            State::Declined => f.write_str("declined"),
            State::Done => f.write_str("done"),
            State::Failed(code) => write!(f, "failed({})", code),
        }
    }
}

/// How a run ended when no stage failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoUpdate { current: Version, remote: Version },
    Declined { remote: Version },
    Done { version: Version, report: MergeReport },
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct PipelineContext {
    pub current: Version,
    pub remote: Option<Version>,
    pub exe: PathBuf,
    pub install_root: PathBuf,
    pub temp_dir: PathBuf,
    pub archive: PathBuf,
    pub extract_root: PathBuf,
    pub pending_deletion: Vec<PathBuf>,
    pub log: DiagnosticLog,
}

impl PipelineContext {
    pub fn new(current: Version, paths: &Paths) -> Self {
        Self {
            current,
            remote: None,
            exe: paths.exe.clone(),
            install_root: paths.install.clone(),
            temp_dir: paths.temp.clone(),
            archive: paths.archive.clone(),
            extract_root: paths.extract.clone(),
            pending_deletion: Vec::new(),
            log: DiagnosticLog::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub version_url: String,
    pub download_url: String,
    /// Move the running executable aside before merging.
    pub self_unlock: bool,
    /// Delete backups once the install is done.
    pub remove_backups: bool,
    pub show_progress: bool,
}

/// Probe, confirm, download, extract, install; stops at the first failure.
pub struct UpdatePipeline<'a> {
    ctx: PipelineContext,
    options: PipelineOptions,
    transport: &'a dyn HttpTransport,
    codec: &'a dyn ArchiveCodec,
    filter: InstallFilter,
    state: State,
}

impl<'a> UpdatePipeline<'a> {
    pub fn new(
        ctx: PipelineContext,
        options: PipelineOptions,
        transport: &'a dyn HttpTransport,
        codec: &'a dyn ArchiveCodec,
        filter: InstallFilter,
    ) -> Self {
        Self {
            ctx,
            options,
            transport,
            codec,
            filter,
            state: State::ProbeVersion,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.ctx.log
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    fn enter(&mut self, state: State) {
        debug!(from = %self.state, to = %state, "pipeline state");
        self.state = state;
    }

    /// Run every stage once. A failure is recorded in the diagnostic log
    /// and returned; no later stage is attempted.
    pub fn run(&mut self, confirm: &mut dyn Confirmation) -> Result<Outcome, PipelineError> {
        let res = self.run_stages(confirm);
        if let Err(e) = &res {
            self.ctx.log.record(e.to_flag());
            self.enter(State::Failed(e.code()));
        }
        res
    }

    /// Fetch and parse the remote version, storing it in the context.
    pub fn probe(&mut self) -> Result<Version, PipelineError> {
        self.enter(State::ProbeVersion);
        let spinner = StageSpinner::start(self.options.show_progress, "checking for updates…");

        match fetch_remote_version(self.transport, &self.options.version_url) {
            Ok(remote) => {
                spinner.clear();
                info!(current = %self.ctx.current, %remote, "remote version");
                self.ctx.remote = Some(remote.clone());
                Ok(remote)
            }
            Err(e) => {
                spinner.fail(format!("version check failed: {}", e));
                Err(e.into())
            }
        }
    }

    fn run_stages(&mut self, confirm: &mut dyn Confirmation) -> Result<Outcome, PipelineError> {
        let remote = self.probe()?;
        let current = self.ctx.current.clone();

        if compare(&current, &remote) != Ordering::Less {
            info!(%current, %remote, "already up to date");
            self.enter(State::NoUpdate);
            return Ok(Outcome::NoUpdate { current, remote });
        }

        self.enter(State::UpdateAvailable);
        self.enter(State::AwaitConfirmation);
        let answer = confirm
            .ask(&current, &remote)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        match answer.trim() {
            "y" => {}
            "n" => {
                info!("update declined");
                self.enter(State::Declined);
                return Ok(Outcome::Declined { remote });
            }
            other => return Err(PipelineError::InvalidInput(other.to_string())),
        }

        self.download()?;
        let root = self.extract()?;
        let report = self.install(root)?;

        if self.options.remove_backups {
            self.enter(State::CleaningUp);
            let installer = Installer::new(&self.filter);
            installer.remove_backups(&self.ctx.pending_deletion, &mut self.ctx.log);
        }

        self.enter(State::Done);
        info!(version = %remote, "update installed");
        Ok(Outcome::Done {
            version: remote,
            report,
        })
    }

    fn download(&mut self) -> Result<u64, PipelineError> {
        self.enter(State::Downloading);
        let spinner = StageSpinner::start(self.options.show_progress, "downloading update…");
        let res = Downloader::new(self.transport)
            .fetch_to_file(&self.options.download_url, &self.ctx.archive);
        match res {
            Ok(bytes) => {
                spinner.ok(format!("downloaded {} bytes", bytes));
                Ok(bytes)
            }
            Err(e) => {
                spinner.fail(format!("download failed: {}", e));
                Err(e.into())
            }
        }
    }

    fn extract(&mut self) -> Result<PathBuf, PipelineError> {
        self.enter(State::Extracting);
        let spinner = StageSpinner::start(self.options.show_progress, "unpacking update…");
        let res = clear_dir(&self.ctx.extract_root)
            .and_then(|_| extract(self.codec, &self.ctx.archive, &self.ctx.extract_root));
        match res {
            Ok(extracted) => {
                spinner.ok(format!("unpacked {} entries", extracted.entries));
                Ok(extracted.root)
            }
            Err(e) => {
                spinner.fail(format!("unpacking failed: {}", e));
                Err(e.into())
            }
        }
    }

    fn install(&mut self, root: PathBuf) -> Result<MergeReport, PipelineError> {
        self.enter(State::Installing);
        let spinner = StageSpinner::start(self.options.show_progress, "installing update…");
        let installer = Installer::new(&self.filter);

        let res = (|| -> Result<MergeReport, InstallError> {
            if self.options.self_unlock {
                let backup = installer.self_unlock(&self.ctx.exe)?;
                self.ctx.pending_deletion.push(backup);
            }
            spinner.message("merging files…");
            let report = installer.merge(&root, &self.ctx.install_root, &mut self.ctx.log)?;
            installer.remove_temp(&self.ctx.temp_dir)?;
            Ok(report)
        })();

        match res {
            Ok(report) => {
                spinner.ok(format!(
                    "installed ({} new, {} replaced)",
                    report.files_created, report.files_overwritten
                ));
                Ok(report)
            }
            Err(e) => {
                spinner.fail(format!("install failed: {}", e));
                Err(PipelineError::Install(e))
            }
        }
    }
}

/// Download the version descriptor and parse its first line.
pub fn fetch_remote_version(
    transport: &dyn HttpTransport,
    url: &str,
) -> Result<Version, VersionError> {
    let body = match Downloader::new(transport).fetch_to_memory(url) {
        Ok(body) => body,
        Err(DownloadError::Transport(TransportError::NotFound { url })) => {
            return Err(VersionError::NotFound { url });
        }
        Err(DownloadError::EmptyResponse { .. }) => {
            return Err(ParseVersionError::EmptyInput.into());
        }
        Err(e) => return Err(VersionError::Fetch(e)),
    };

    let text = String::from_utf8_lossy(&body);
    let first_line = text.split('\n').next().unwrap_or_default();
    Ok(Version::parse(first_line)?)
}

/// Remove leftovers of an earlier interrupted extraction.
fn clear_dir(dir: &std::path::Path) -> Result<(), ExtractError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ExtractError::CannotOpenDestination {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
