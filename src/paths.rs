use anyhow::{Context, Result, anyhow};
use std::{env, path::Path, path::PathBuf};

/// Name of the configuration file kept next to the executable.
pub const CONFIG_FILE: &str = "updater.toml";

/// Suffix appended to the executable name when it is moved aside.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Filesystem layout of one installation, derived from the executable path.
///
/// ```text
/// <install>/            install root (directory holding the executable)
/// <install>/<exe>       running executable
/// <install>/temp/       download + extraction scratch space
/// <install>/temp/<stem>.zip
/// <install>/temp/package/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub exe: PathBuf,
    pub install: PathBuf,
    pub temp: PathBuf,
    pub archive: PathBuf,
    pub extract: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    pub fn for_executable(exe: &Path) -> Result<Self> {
        let install = exe
            .parent()
            .ok_or_else(|| anyhow!("executable has no parent directory: {}", exe.display()))?
            .to_path_buf();
        let stem = exe
            .file_stem()
            .ok_or_else(|| anyhow!("executable has no file name: {}", exe.display()))?;

        let temp = install.join("temp");
        let mut archive_name = stem.to_os_string();
        archive_name.push(".zip");

        Ok(Self {
            exe: exe.to_path_buf(),
            archive: temp.join(archive_name),
            extract: temp.join("package"),
            temp,
            config: install.join(CONFIG_FILE),
            install,
        })
    }

    /// Sibling path the running executable is renamed to.
    pub fn backup(&self) -> PathBuf {
        backup_path(&self.exe)
    }
}

pub fn backup_path(exe: &Path) -> PathBuf {
    let mut name = exe.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Layout for the executable currently running.
pub fn paths() -> Result<Paths> {
    let exe = env::current_exe().context("cannot locate the running executable")?;
    Paths::for_executable(&exe)
}
