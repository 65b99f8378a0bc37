use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of characters kept from the revision segment.
pub const REVISION_MAX_LEN: usize = 4;

/// A release identifier of the form `major[.minor[.revision]]`.
///
/// Field order matters: the derived `Ord` compares `major` first, then
/// `minor` (an absent minor sorts below any present one), then `revision`
/// as an opaque byte string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: Option<u32>,
    revision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseVersionError {
    #[error("version string is empty")]
    EmptyInput,
    #[error("invalid version string: {0:?}")]
    InvalidFormat(String),
}

impl ParseVersionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseVersionError::EmptyInput => "empty-input",
            ParseVersionError::InvalidFormat(_) => "invalid-format",
        }
    }
}

impl Version {
    /// Build a version from its parts. The revision is cut to
    /// [`REVISION_MAX_LEN`] characters and dropped when `minor` is absent,
    /// since `"N"` has no place to render it.
    pub fn new(major: u32, minor: Option<u32>, revision: impl Into<String>) -> Self {
        let revision: String = revision.into();
        let revision = match minor {
            Some(_) => truncate_revision(&revision),
            None => String::new(),
        };
        Self {
            major,
            minor,
            revision,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    /// `None` for a single-segment version.
    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Parse a dotted version string.
    ///
    /// Surrounding whitespace is ignored. `"N"` yields an absent minor,
    /// `"N.M"` an empty revision, and anything after the second `.` is the
    /// revision, cut to [`REVISION_MAX_LEN`] characters.
    pub fn parse(text: &str) -> Result<Self, ParseVersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseVersionError::EmptyInput);
        }

        let invalid = || ParseVersionError::InvalidFormat(text.to_string());
        let mut parts = text.splitn(3, '.');

        let major = parts.next().ok_or_else(invalid)?;
        let major = parse_number(major).ok_or_else(invalid)?;

        let minor = match parts.next() {
            Some(m) => Some(parse_number(m).ok_or_else(invalid)?),
            None => None,
        };

        let revision = parts.next().map(truncate_revision).unwrap_or_default();

        Ok(Self {
            major,
            minor,
            revision,
        })
    }
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn truncate_revision(s: &str) -> String {
    s.chars().take(REVISION_MAX_LEN).collect()
}

/// Total order over versions; see [`Version`] for the key order.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            None => write!(f, "{}", self.major),
            Some(minor) if self.revision.is_empty() => write!(f, "{}.{}", self.major, minor),
            Some(minor) => write!(f, "{}.{}.{}", self.major, minor, self.revision),
        }
    }
}
