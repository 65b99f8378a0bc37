use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::version::Version;

/// Updater configuration loaded from `updater.toml`.
///
/// Example TOML:
/// ```toml
/// version_url  = "https://example.com/fileio/version"
/// download_url = "https://example.com/fileio/fileio.zip"
/// current_version = "1.0"
/// module_extensions = ["dll", "so"]
/// exclude = ["*.pdb"]
/// ```
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub version_url: String,
    pub download_url: String,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_module_extensions")]
    pub module_extensions: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_true")]
    pub self_unlock: bool,
    #[serde(default)]
    pub remove_backups: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_module_extensions() -> Vec<String> {
    ["dll", "so", "dylib"].iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Version of the local installation; falls back to this crate's version.
    pub fn current_version(&self) -> Result<Version> {
        let raw = self
            .current_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"));
        Version::parse(raw).with_context(|| format!("invalid current_version: {:?}", raw))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("autoupdate/{}", env!("CARGO_PKG_VERSION")))
    }
}

pub fn parse_config(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt).context("failed to parse updater.toml")?;
    Ok(cfg)
}

/// Load and parse the configuration file at `path`.
///
/// # Errors
/// - The file cannot be read (the error names the resolved path).
/// - The TOML is malformed or lacks `version_url` / `download_url`.
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("config not found: {}", path.display()))?;
    parse_config(&txt).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_minimal_config() {
        let cfg = parse_config(
            r#"
version_url = "http://h/version"
download_url = "http://h/pkg.zip"
"#,
        )
        .unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.module_extensions, vec!["dll", "so", "dylib"]);
        assert!(cfg.exclude.is_empty());
        assert!(cfg.self_unlock);
        assert!(!cfg.remove_backups);
        assert!(cfg.user_agent().starts_with("autoupdate/"));
        assert_eq!(
            cfg.current_version().unwrap(),
            Version::parse(env!("CARGO_PKG_VERSION")).unwrap()
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = parse_config(
            r#"
version_url = "http://h/version"
download_url = "http://h/pkg.zip"
current_version = "1.0"
timeout_secs = 5
module_extensions = ["pyd"]
exclude = ["*.pdb"]
self_unlock = false
remove_backups = true
user_agent = "fileio"
"#,
        )
        .unwrap();
        assert_eq!(cfg.current_version().unwrap(), Version::new(1, Some(0), ""));
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.module_extensions, vec!["pyd"]);
        assert_eq!(cfg.exclude, vec!["*.pdb"]);
        assert!(!cfg.self_unlock);
        assert!(cfg.remove_backups);
        assert_eq!(cfg.user_agent(), "fileio");
    }

    #[test]
    fn missing_urls_fail() {
        assert!(parse_config("version_url = \"http://h/v\"").is_err());
    }

    #[test]
    fn bad_current_version_is_reported() {
        let cfg = parse_config(
            r#"
version_url = "a"
download_url = "b"
current_version = "one"
"#,
        )
        .unwrap();
        assert!(cfg.current_version().is_err());
    }

    #[test]
    fn load_config_names_missing_path() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("updater.toml");
        let err = load_config(&p).unwrap_err();
        assert!(format!("{:#}", err).contains("updater.toml"));
    }
}
