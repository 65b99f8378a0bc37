use anyhow::{Context, Result};
use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;

use crate::paths::CONFIG_FILE;

/// File names an update must never overwrite: the updater's own
/// configuration and the backups it leaves behind.
pub const BUILTIN_EXCLUDES: &[&str] = &[CONFIG_FILE, "*.bak"];

/// Decides which update files are skipped and which are loadable modules.
#[derive(Debug, Clone)]
pub struct InstallFilter {
    excludes: Vec<Regex>,
    module_extensions: Vec<String>,
}

impl InstallFilter {
    /// Built-in excludes plus `extra_excludes`; module extensions are
    /// matched case-insensitively, with or without a leading dot.
    pub fn new<S: AsRef<str>>(extra_excludes: &[S], module_extensions: &[S]) -> Result<Self> {
        let mut excludes = Vec::new();
        for pat in BUILTIN_EXCLUDES
            .iter()
            .copied()
            .chain(extra_excludes.iter().map(AsRef::as_ref))
        {
            excludes.push(glob_to_regex(pat).with_context(|| format!("bad exclude: {pat}"))?);
        }
        let module_extensions = module_extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(Self {
            excludes,
            module_extensions,
        })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        self.excludes.iter().any(|re| re.is_match(name))
    }

    pub fn is_module(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.module_extensions.iter().any(|m| *m == ext)
            })
            .unwrap_or(false)
    }
}

/// Convert a file-name glob into an anchored regular expression.
/// `*` matches any run of characters, `?` exactly one; everything else is literal.
fn glob_to_regex(pat: &str) -> Result<Regex, regex::Error> {
    let mut s = String::from("^");
    for ch in pat.chars() {
        match ch {
            '*' => s.push_str(".*"),
            '?' => s.push('.'),
            c => s.push_str(&regex::escape(&c.to_string())),
        }
    }
    s.push('$');
    Regex::new(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(extra: &[&str]) -> InstallFilter {
        InstallFilter::new(extra, &["dll", ".SO"]).unwrap()
    }

    #[test]
    fn builtin_excludes_protect_config_and_backups() {
        let f = filter(&[]);
        assert!(f.is_excluded(Path::new("pkg/updater.toml")));
        assert!(f.is_excluded(Path::new("pkg/fileio.exe.bak")));
        assert!(!f.is_excluded(Path::new("pkg/fileio.exe")));
        assert!(!f.is_excluded(Path::new("pkg/updater.toml.sample")));
    }

    #[test]
    fn extra_patterns_are_globs() {
        let f = filter(&["*.pdb", "notes?.txt"]);
        assert!(f.is_excluded(Path::new("a/b/app.pdb")));
        assert!(f.is_excluded(Path::new("notes1.txt")));
        assert!(!f.is_excluded(Path::new("notes12.txt")));
        assert!(!f.is_excluded(Path::new("app.pdbx")));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let f = filter(&["a+b(1).txt"]);
        assert!(f.is_excluded(Path::new("a+b(1).txt")));
        assert!(!f.is_excluded(Path::new("aab1.txt")));
    }

    #[test]
    fn module_detection_ignores_case_and_dots() {
        let f = filter(&[]);
        assert!(f.is_module(Path::new("lib/zlib.DLL")));
        assert!(f.is_module(Path::new("lib/libz.so")));
        assert!(!f.is_module(Path::new("lib/libz.so.1")));
        assert!(!f.is_module(Path::new("README")));
    }
}
