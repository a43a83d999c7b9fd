//! Error types for quire.

use crate::document::permissions::Permission;
use thiserror::Error;

/// Primary error type for document processing.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at offset {offset}: {msg}")]
    Parse { offset: usize, msg: String },

    #[error("validation error at {path}: {msg}")]
    Validation { path: String, msg: String },

    #[error("no supplied password authenticated")]
    Auth,

    #[error("operation not permitted: {0:?}")]
    Permission(Permission),

    #[error("invalid page selection: {0}")]
    Selection(String),

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encryption error: {0}")]
    EncryptionError(String),
}

impl PdfError {
    pub(crate) fn parse(offset: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            msg: msg.into(),
        }
    }

    pub(crate) fn validation(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            msg: msg.into(),
        }
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
