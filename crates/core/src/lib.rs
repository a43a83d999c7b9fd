//! quire - PDF document processing core.
//!
//! Parses PDF files into an in-memory object graph, validates and repairs
//! structure, deduplicates resources, edits pages and attachments, manages
//! encryption, extracts embedded payloads and writes the result back out.

pub mod api;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod model;
pub mod ops;
pub mod optimize;
pub mod parser;
pub mod validate;
pub mod writer;

pub use api::{Output, Params, WrittenDocument, process};
pub use config::{Command, Configuration, EncryptAlgorithm, Eol, PermissionsSpec, ValidationMode};
pub use document::security;
pub use error::{PdfError, Result};
pub use model::Context;
