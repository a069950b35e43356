use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A region of a source file.
///
/// Lines are 1-indexed and inclusive. Columns are 0-indexed and only
/// consulted on boundary lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: Utf8PathBuf,
    pub start_line: u32,
    pub end_line: u32,

    #[serde(default)]
    pub start_column: u32,

    #[serde(default)]
    pub end_column: u32,

    /// Name of the symbol at this location, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Location {
    pub fn lines(path: impl Into<Utf8PathBuf>, start_line: u32, end_line: u32) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
            start_column: 0,
            end_column: 0,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_columns(mut self, start_column: u32, end_column: u32) -> Self {
        self.start_column = start_column;
        self.end_column = end_column;
        self
    }

    pub fn is_single_line(&self) -> bool {
        self.start_line == self.end_line
    }

    /// Returns a message describing why this location is malformed.
    pub fn problem(&self) -> Option<String> {
        if self.path.as_str().trim().is_empty() {
            return Some("empty path".to_string());
        }
        if self.start_line == 0 {
            return Some("start_line must be >= 1".to_string());
        }
        if self.end_line < self.start_line {
            return Some("end_line must be >= start_line".to_string());
        }
        if self.is_single_line() && self.end_column < self.start_column {
            return Some("end_column must be >= start_column on a single line".to_string());
        }
        None
    }

    /// True when both regions share at least one position in the same file.
    pub fn overlaps(&self, other: &Location) -> bool {
        if self.path != other.path {
            return false;
        }

        if self.end_line < other.start_line || other.end_line < self.start_line {
            return false;
        }

        if self.is_single_line() && other.is_single_line() && self.start_line == other.start_line
        {
            return !(self.end_column < other.start_column
                || other.end_column < self.start_column);
        }

        true
    }

    /// True when `other` lies entirely within this region.
    pub fn contains(&self, other: &Location) -> bool {
        if self.path != other.path {
            return false;
        }

        if other.start_line < self.start_line || other.end_line > self.end_line {
            return false;
        }

        if other.start_line == self.start_line && other.start_column < self.start_column {
            return false;
        }

        if other.end_line == self.end_line && other.end_column > self.end_column {
            return false;
        }

        true
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.start_line, self.start_column)?;
        if self.end_line != self.start_line || self.end_column != self.start_column {
            write!(f, "-{}:{}", self.end_line, self.end_column)?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, " ({})", symbol)?;
        }
        Ok(())
    }
}
