//! Self-update support for a desktop application.
//!
//! The updater compares the installed version with a version file on a
//! server, downloads a zip package, unpacks it into a scratch directory and
//! merges it over the installation. Every failure is recorded as a
//! diagnostic flag carrying a path, a message and a `stage/kind` code.
//!
//! The `pub use` re-exports below are what the `autoupdate` binary needs.

mod config;
mod diagnostics;
mod paths;
mod progress;
mod update;
mod version;

pub use config::{Config, load_config, parse_config};
pub use diagnostics::{Code, DiagnosticLog, Flag, Stage};
pub use paths::{Paths, paths};
pub use update::archive::{ArchiveCodec, ArchiveEntries, ArchiveEntry, Extracted, ZipCodec, extract};
pub use update::download::Downloader;
pub use update::error::{
    DownloadError, ExtractError, InstallError, PipelineError, TransportError, VersionError,
};
pub use update::filter::InstallFilter;
pub use update::install::{Installer, MergeReport};
pub use update::pipeline::{
    AssumeYes, Confirmation, Outcome, PipelineContext, PipelineOptions, PromptConfirmation, State,
    UpdatePipeline, fetch_remote_version, stdin_confirmation,
};
pub use update::transport::{HttpTransport, ReqwestTransport};
pub use update::{cmd_check, cmd_cleanup, cmd_update};
pub use version::{ParseVersionError, Version, compare};
