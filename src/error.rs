//! Crate-wide error type.
//!
//! Every failure is classified into one of four kinds (see [`ErrorKind`]):
//!
//! | Kind | Raised for |
//! |------|-----------|
//! | `NotFound` | missing database file, unknown table name |
//! | `Format` | signature not found, malformed schema text, unknown type tag, impossible counts, undecodable values |
//! | `Io` | underlying read/seek failure (including short reads) |
//! | `Truncated` | object data ran out before its declared length (strict mode only) |

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::page::PageAddr;
use crate::schema::parser::SchemaError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Cannot decode field {field} ({tag}): {reason}")]
    Decode {
        field:  String,
        tag:    &'static str,
        reason: String,
    },
    /// Only produced when the caller opted into strict truncation handling.
    #[error("Object at page {header} truncated: {delivered} of {declared} bytes available")]
    Truncated {
        header:    PageAddr,
        declared:  u64,
        delivered: u64,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Format,
    Io,
    Truncated,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileNotFound(_) | Error::TableNotFound(_) => ErrorKind::NotFound,
            Error::Format(_) | Error::Schema(_) | Error::Decode { .. } => ErrorKind::Format,
            Error::Truncated { .. } => ErrorKind::Truncated,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
