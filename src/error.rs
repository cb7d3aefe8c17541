//! Error types for KFX generation and inspection.

use thiserror::Error;

/// Errors that abort packing or unpacking of a single document.
///
/// CSS conversion problems are not represented here: they degrade to
/// warnings (see [`crate::css::ConversionError`]).
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown symbol: {0:?}")]
    UnknownSymbol(String),

    #[error("unknown symbol id: ${0}")]
    UnknownSymbolId(u32),

    #[error("malformed container at offset {offset}: {reason}")]
    MalformedContainer { offset: usize, reason: String },

    #[error("payload does not start with the Ion version marker")]
    MissingVersionMarker,

    #[error("encoded value does not start with the document prolog")]
    PrologMismatch,

    #[error("invalid Ion data at offset {offset}: {reason}")]
    Ion { offset: usize, reason: String },

    #[error("unrecognized shared symbol table size: {0}")]
    InvalidSymbolTable(i64),

    #[error("duplicate fragment {ftype}/{fid}")]
    DuplicateFragment { ftype: String, fid: String },

    #[error("fragment {ftype}/{fid} uses the reserved singleton id")]
    ReservedFragmentId { ftype: String, fid: String },

    #[error("fragment {ftype}/{fid} is not a blob")]
    RawFragmentNotBlob { ftype: String, fid: String },

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedContainer {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn ion(offset: usize, reason: impl Into<String>) -> Self {
        Error::Ion {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
