// File I/O: CSV ingestion and persistence

use std::fmt;

pub mod csv;

pub use crate::csv::{encode_table, save_table, sniff_delimiter, CsvOptions, CsvSource};

/// Failures reading or writing table files.
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Csv(::csv::Error),
    /// The configured encoding label is not known.
    UnknownEncoding(String),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Csv(e) => write!(f, "invalid CSV: {e}"),
            Self::UnknownEncoding(label) => write!(f, "unknown encoding '{label}'"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::UnknownEncoding(_) => None,
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<::csv::Error> for IoError {
    fn from(e: ::csv::Error) -> Self {
        Self::Csv(e)
    }
}
