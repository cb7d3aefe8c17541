//! Output format selection.
//!
//! The conversion front end accepts a format name from the user; this is the
//! point where it becomes a closed type, so everything downstream can match
//! exhaustively.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Requested output container type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Epub2,
    Epub3,
    Kepub,
    Kfx,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Epub2,
        OutputFormat::Epub3,
        OutputFormat::Kepub,
        OutputFormat::Kfx,
    ];

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Kfx => ".kfx",
            OutputFormat::Epub2 | OutputFormat::Epub3 => ".epub",
            OutputFormat::Kepub => ".kepub.epub",
        }
    }

    /// Whether the output targets Kindle devices.
    pub fn for_kindle(self) -> bool {
        self == OutputFormat::Kfx
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Epub2 => "epub2",
            OutputFormat::Epub3 => "epub3",
            OutputFormat::Kepub => "kepub",
            OutputFormat::Kfx => "kfx",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

impl TryFrom<u8> for OutputFormat {
    type Error = Error;

    /// Numeric codes as stored by configuration files (0 = epub2 .. 3 = kfx).
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        OutputFormat::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| Error::UnsupportedFormat(format!("OutputFormat({code})")))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
