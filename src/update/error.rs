use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::diagnostics::{Code, Flag, Stage};
use crate::version::ParseVersionError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by an [`HttpTransport`](super::transport::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{url}: not found")]
    NotFound { url: String },
    #[error("{url}: server answered {status}")]
    Status { url: String, status: u16 },
    #[error("{url}: request failed: {source}")]
    Request {
        url: String,
        #[source]
        source: BoxError,
    },
}

/// Failure fetching a URL into memory or into a file.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{url}: response body is empty")]
    EmptyResponse { url: String },
    #[error("{url}: transfer interrupted: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot create {}: {source}", .path.display())]
    CannotCreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    /// Short machine-readable name, used as the kind half of a [`Code`].
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Transport(TransportError::NotFound { .. }) => "not-found",
            DownloadError::Transport(_) | DownloadError::Body { .. } => "transport",
            DownloadError::EmptyResponse { .. } => "empty-response",
            DownloadError::CannotCreateFile { .. } => "cannot-create-file",
            DownloadError::Write { .. } => "write",
        }
    }

    /// Local file the failure concerns; `None` for network failures.
    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadError::CannotCreateFile { path, .. } | DownloadError::Write { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

/// Failure obtaining the remote version.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("remote version: {0}")]
    Parse(#[from] ParseVersionError),
    #[error("version file not found at {url}")]
    NotFound { url: String },
    #[error("cannot fetch remote version: {0}")]
    Fetch(#[source] DownloadError),
}

impl VersionError {
    /// Parse kinds pass through; fetch failures use the download kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VersionError::Parse(e) => e.kind(),
            VersionError::NotFound { .. } => "not-found",
            VersionError::Fetch(e) => e.kind(),
        }
    }
}

/// Failure unpacking the downloaded archive. Members written before the
/// failure stay on disk.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot open archive {}: {source}", .path.display())]
    ArchiveNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unreadable archive header in {}: {message}", .path.display())]
    CorruptHeader { path: PathBuf, message: String },
    #[error("archive {} has no entries", .path.display())]
    EmptyArchive { path: PathBuf },
    #[error("cannot read entry #{index}: {message}")]
    FileInfo { index: usize, message: String },
    #[error("cannot open destination {}: {source}", .path.display())]
    CannotOpenDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read archive data for {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    /// Kebab-case name such as `corrupt-header`.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::ArchiveNotFound { .. } => "archive-not-found",
            ExtractError::CorruptHeader { .. } => "corrupt-header",
            ExtractError::EmptyArchive { .. } => "empty-archive",
            ExtractError::FileInfo { .. } => "file-info",
            ExtractError::CannotOpenDestination { .. } => "cannot-open-destination",
            ExtractError::Read { .. } => "read",
            ExtractError::Write { .. } => "write",
        }
    }

    /// Archive or destination path involved; `None` when only the member
    /// index is known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ExtractError::ArchiveNotFound { path, .. }
            | ExtractError::CorruptHeader { path, .. }
            | ExtractError::EmptyArchive { path }
            | ExtractError::CannotOpenDestination { path, .. }
            | ExtractError::Read { path, .. }
            | ExtractError::Write { path, .. } => Some(path),
            ExtractError::FileInfo { .. } => None,
        }
    }
}

/// Failure while installing the extracted tree.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("cannot move running executable {} aside: {source}", .path.display())]
    SelfUnlock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot install {}: {source}", .path.display())]
    TreeCopy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot remove {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// `self-unlock`, `tree-copy` or `cleanup`.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::SelfUnlock { .. } => "self-unlock",
            InstallError::TreeCopy { .. } => "tree-copy",
            InstallError::Cleanup { .. } => "cleanup",
        }
    }

    /// File or directory the failed operation was working on.
    pub fn path(&self) -> &Path {
        match self {
            InstallError::SelfUnlock { path, .. }
            | InstallError::TreeCopy { path, .. }
            | InstallError::Cleanup { path, .. } => path,
        }
    }
}

/// The first hard failure of a run, tagged with the stage it came from.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid answer {0:?}, expected 'y' or 'n'")]
    InvalidInput(String),
    #[error(transparent)]
    Probe(#[from] VersionError),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("installation failed: {0}")]
    Install(#[from] InstallError),
}

impl PipelineError {
    /// Stage the failure belongs to; also selects the process exit code.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidInput(_) => Stage::Confirm,
            PipelineError::Probe(_) => Stage::Probe,
            PipelineError::Download(_) => Stage::Download,
            PipelineError::Extract(_) => Stage::Extract,
            PipelineError::Install(_) => Stage::Install,
        }
    }

    /// Kind of the wrapped stage error.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid-input",
            PipelineError::Probe(e) => e.kind(),
            PipelineError::Download(e) => e.kind(),
            PipelineError::Extract(e) => e.kind(),
            PipelineError::Install(e) => e.kind(),
        }
    }

    /// `stage/kind` tag recorded with the diagnostic flag.
    pub fn code(&self) -> Code {
        Code::new(self.stage(), self.kind())
    }

    /// Path carried by the stage error, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PipelineError::Download(e) => e.path(),
            PipelineError::Extract(e) => e.path(),
            PipelineError::Install(e) => Some(e.path()),
            PipelineError::InvalidInput(_) | PipelineError::Probe(_) => None,
        }
    }

    /// Diagnostic flag for this failure, carrying its path when there is one.
    pub fn to_flag(&self) -> Flag {
        match self.path() {
            Some(p) => Flag::with_path(self.code(), p, self.to_string()),
            None => Flag::new(self.code(), self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pair_stage_and_kind() {
        let e = PipelineError::from(VersionError::NotFound {
            url: "http://h/v".into(),
        });
        assert_eq!(e.code(), Code::new(Stage::Probe, "not-found"));

        let e = PipelineError::from(ExtractError::EmptyArchive {
            path: "a.zip".into(),
        });
        assert_eq!(e.code().to_string(), "extract/empty-archive");

        let e = PipelineError::InvalidInput("maybe".into());
        assert_eq!(e.stage().exit_code(), 2);
    }

    #[test]
    fn flag_carries_error_path() {
        let e = PipelineError::from(InstallError::TreeCopy {
            path: "lib/x.txt".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        });
        let flag = e.to_flag();
        assert_eq!(flag.path(), Some(Path::new("lib/x.txt")));
        assert_eq!(flag.code(), Code::new(Stage::Install, "tree-copy"));
        assert!(flag.message().contains("denied"));
    }

    #[test]
    fn download_not_found_kind() {
        let e = DownloadError::from(TransportError::NotFound { url: "u".into() });
        assert_eq!(e.kind(), "not-found");
        assert!(e.path().is_none());
    }
}
