//! PDF file parsing.
//!
//! - `lexer`: byte-level tokenizer
//! - `object`: objects from tokens
//! - `reader`: indirect objects at file offsets
//! - `xref`: cross-reference sections and trailer

pub mod lexer;
pub mod object;
pub mod reader;
pub mod xref;

pub use lexer::{Keyword, Lexer, Token};
pub use object::ObjectParser;
pub use reader::{IndirectObject, ObjectReader};
pub use xref::XRefData;
