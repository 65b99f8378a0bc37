use std::fmt;
use std::path::{Path, PathBuf};

/// A phase of the update run. Every diagnostic code is scoped to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Probe,
    Confirm,
    Download,
    Extract,
    Install,
    Cleanup,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Probe => "probe",
            Stage::Confirm => "confirm",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Install => "install",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Process exit status used when a run fails in this stage.
    pub fn exit_code(self) -> u8 {
        match self {
            Stage::Confirm => 2,
            Stage::Probe => 3,
            Stage::Download => 4,
            Stage::Extract => 5,
            Stage::Install => 6,
            Stage::Cleanup => 7,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage and error kind, rendered as `stage/kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    pub stage: Stage,
    pub kind: &'static str,
}

impl Code {
    pub const fn new(stage: Stage, kind: &'static str) -> Self {
        Self { stage, kind }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.kind)
    }
}

/// A recorded condition surfaced to the user once the run is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    path: Option<PathBuf>,
    message: String,
    code: Code,
}

impl Flag {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
            code,
        }
    }

    pub fn with_path(code: Code, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
            code,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Code {
        self.code
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "[{}] {}: {}", self.code, p.display(), self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

/// Append-only collection of [`Flag`]s, kept in the order recorded.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticLog {
    flags: Vec<Flag>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, flag: Flag) {
        tracing::debug!(code = %flag.code, "flag recorded: {}", flag.message);
        self.flags.push(flag);
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Render every flag, one block per flag, in recording order.
    ///
    /// Returns an empty string when nothing was recorded.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for flag in &self.flags {
            out.push_str("flagged:\n");
            if let Some(p) = flag.path() {
                out.push_str(&format!("  path:    {}\n", p.display()));
            }
            out.push_str(&format!("  message: {}\n", flag.message()));
            out.push_str(&format!("  code:    {}\n", flag.code()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: Code = Code::new(Stage::Install, "module-overwrite");

    #[test]
    fn report_is_empty_without_flags() {
        let log = DiagnosticLog::new();
        assert!(log.is_empty());
        assert_eq!(log.report(), "");
    }

    #[test]
    fn report_keeps_recording_order_and_optional_path() {
        let mut log = DiagnosticLog::new();
        log.record(Flag::with_path(MODULE, "lib/a.dll", "in use"));
        log.record(Flag::new(Code::new(Stage::Probe, "not-found"), "no version file"));

        let out = log.report();
        let first = out.find("lib/a.dll").unwrap();
        let second = out.find("no version file").unwrap();
        assert!(first < second);
        assert!(out.contains("code:    install/module-overwrite"));
        assert!(out.contains("code:    probe/not-found"));
        assert_eq!(out.matches("path:").count(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn flag_display_includes_code() {
        let f = Flag::with_path(MODULE, "x.so", "busy");
        assert_eq!(f.to_string(), "[install/module-overwrite] x.so: busy");
    }

    #[test]
    fn stage_exit_codes_are_distinct() {
        let stages = [
            Stage::Probe,
            Stage::Confirm,
            Stage::Download,
            Stage::Extract,
            Stage::Install,
            Stage::Cleanup,
        ];
        let mut codes: Vec<u8> = stages.iter().map(|s| s.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), stages.len());
        assert!(!codes.contains(&0));
    }
}
