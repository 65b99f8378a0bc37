use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::InstallError;
use super::filter::InstallFilter;
use crate::diagnostics::{Code, DiagnosticLog, Flag, Stage};
use crate::paths::backup_path;

pub const MODULE_OVERWRITE: Code = Code::new(Stage::Install, "module-overwrite");
pub const REMOVE_BACKUP: Code = Code::new(Stage::Cleanup, "remove-backup");

/// What [`Installer::merge`] did, counted per action.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub dirs_created: usize,
    pub files_created: usize,
    pub files_overwritten: usize,
    pub modules_unchanged: usize,
    pub modules_failed: usize,
    pub excluded: usize,
}

/// Installs an extracted update tree over a live installation.
pub struct Installer<'a> {
    filter: &'a InstallFilter,
}

impl<'a> Installer<'a> {
    pub fn new(filter: &'a InstallFilter) -> Self {
        Self { filter }
    }

    /// Free the running executable's path so the merge can write to it.
    ///
    /// The executable is renamed to `<exe>.bak` (the running process keeps
    /// executing from the renamed file) and copied back to its original
    /// path as a new, unlocked file. Returns the backup path, which the
    /// caller owns for deferred deletion.
    pub fn self_unlock(&self, exe: &Path) -> Result<PathBuf, InstallError> {
        let backup = backup_path(exe);
        let fail = |source: io::Error| InstallError::SelfUnlock {
            path: exe.to_path_buf(),
            source,
        };

        if backup.exists() {
            debug!("removing stale backup {}", backup.display());
            fs::remove_file(&backup).map_err(|source| InstallError::SelfUnlock {
                path: backup.clone(),
                source,
            })?;
        }

        fs::rename(exe, &backup).map_err(fail)?;
        if let Err(source) = fs::copy(&backup, exe) {
            let _ = fs::remove_file(exe);
            let _ = fs::rename(&backup, exe);
            return Err(fail(source));
        }

        info!("moved running executable to {}", backup.display());
        Ok(backup)
    }

    /// Copy every file under `update_root` into `install_root`.
    ///
    /// - existing directories are left alone, missing ones are created
    /// - excluded file names are never touched
    /// - new files are created without overwriting
    /// - existing modules are replaced only when their size differs, and a
    ///   failed replacement is recorded in `log` instead of aborting
    /// - other existing files are overwritten
    pub fn merge(
        &self,
        update_root: &Path,
        install_root: &Path,
        log: &mut DiagnosticLog,
    ) -> Result<MergeReport, InstallError> {
        let mut report = MergeReport::default();

        let walker = WalkDir::new(update_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        for entry in walker {
            let entry = entry.map_err(|e| InstallError::TreeCopy {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| update_root.to_path_buf()),
                source: io::Error::from(e),
            })?;
            let src = entry.path();
            let Ok(rel) = src.strip_prefix(update_root) else {
                continue;
            };
            let dest = install_root.join(rel);

            if entry.file_type().is_dir() {
                if dest.is_dir() {
                    debug!("directory exists: {}", rel.display());
                    continue;
                }
                info!("creating directory: {}", rel.display());
                fs::create_dir_all(&dest).map_err(|source| InstallError::TreeCopy {
                    path: dest.clone(),
                    source,
                })?;
                report.dirs_created += 1;
                continue;
            }

            if self.filter.is_excluded(src) {
                debug!("excluded: {}", rel.display());
                report.excluded += 1;
                continue;
            }

            let tree_err = |source: io::Error| InstallError::TreeCopy {
                path: dest.clone(),
                source,
            };

            let existing = match fs::metadata(&dest) {
                Ok(meta) => Some(meta),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(tree_err(e)),
            };

            let Some(existing) = existing else {
                info!("creating file: {}", rel.display());
                copy_new(src, &dest).map_err(tree_err)?;
                report.files_created += 1;
                continue;
            };

            if self.filter.is_module(src) {
                let update_len = entry.metadata().map_err(|e| tree_err(e.into()))?.len();
                if update_len == existing.len() {
                    debug!("module unchanged (same size): {}", rel.display());
                    report.modules_unchanged += 1;
                    continue;
                }
                info!("overwriting module: {}", rel.display());
                if let Err(e) = fs::copy(src, &dest) {
                    warn!("failed to overwrite module {}: {}", rel.display(), e);
                    log.record(Flag::with_path(MODULE_OVERWRITE, &dest, e.to_string()));
                    report.modules_failed += 1;
                    continue;
                }
                report.files_overwritten += 1;
                continue;
            }

            info!("overwriting file: {}", rel.display());
            fs::copy(src, &dest).map_err(tree_err)?;
            report.files_overwritten += 1;
        }

        Ok(report)
    }

    /// Remove the scratch directory; a missing directory is not an error.
    pub fn remove_temp(&self, temp: &Path) -> Result<(), InstallError> {
        match fs::remove_dir_all(temp) {
            Ok(()) => {
                debug!("removed {}", temp.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(InstallError::Cleanup {
                path: temp.to_path_buf(),
                source,
            }),
        }
    }

    /// Delete backups left by [`Installer::self_unlock`]. Failures are
    /// recorded in `log`; returns how many files were removed.
    pub fn remove_backups(&self, backups: &[PathBuf], log: &mut DiagnosticLog) -> usize {
        let mut removed = 0;
        for b in backups {
            match fs::remove_file(b) {
                Ok(()) => {
                    info!("removed backup {}", b.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("cannot remove backup {}: {}", b.display(), e);
                    log.record(Flag::with_path(REMOVE_BACKUP, b, e.to_string()));
                }
            }
        }
        removed
    }
}

/// Copy `src` to `dest`, failing if `dest` already exists. Permission bits
/// follow the source.
fn copy_new(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut input = File::open(src)?;
    let perms = input.metadata()?.permissions();
    let mut output = OpenOptions::new().write(true).create_new(true).open(dest)?;
    let n = io::copy(&mut input, &mut output)?;
    output.set_permissions(perms)?;
    Ok(n)
}
