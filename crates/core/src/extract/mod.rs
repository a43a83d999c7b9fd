//! Extraction of embedded payloads.
//!
//! Every extractor returns in-memory artifacts; naming and writing files is
//! up to the caller, helped by each artifact's `file_name`.

pub mod content;
pub mod fonts;
pub mod images;

pub use content::{ExtractedContent, ExtractedMetadata, extract_content, extract_metadata};
pub use fonts::{ExtractedFont, FontKind, extract_fonts};
pub use images::{ExtractedImage, ImageFormat, extract_images};

/// Reduce `name` to characters safe in a file name.
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
