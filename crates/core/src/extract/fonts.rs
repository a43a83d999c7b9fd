//! Embedded font programs.

use super::sanitize;
use crate::error::Result;
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object};
use crate::optimize::{font_descriptor, index_resources};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::debug;

/// Kind of an embedded font program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontKind {
    /// /FontFile
    Type1,
    /// /FontFile2
    TrueType,
    /// /FontFile3 with /Type1C or /CIDFontType0C
    Cff,
    /// /FontFile3 with /OpenType
    OpenType,
}

impl FontKind {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Type1 => "pfb",
            Self::TrueType => "ttf",
            Self::Cff => "cff",
            Self::OpenType => "otf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFont {
    pub obj_nr: u32,
    pub base_font: String,
    pub kind: FontKind,
    pub data: Vec<u8>,
}

impl ExtractedFont {
    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{stem}_{}_{}.{}",
            sanitize(&self.base_font),
            self.obj_nr,
            self.kind.extension()
        )
    }
}

/// Embedded programs of the fonts used on the selected pages, each font
/// once.
pub fn extract_fonts(ctx: &mut Context, selected: &BTreeSet<usize>) -> Result<Vec<ExtractedFont>> {
    if !ctx.optimize.is_indexed() {
        index_resources(ctx)?;
    }
    let mut visited = FxHashSet::default();
    let mut out = Vec::new();
    for &nr in selected {
        let Some(fonts) = ctx.optimize.page_fonts.get(nr.wrapping_sub(1)).cloned() else {
            continue;
        };
        for num in fonts {
            if !visited.insert(num) {
                continue;
            }
            let Some(font) = ctx.dict_opt(&Object::Ref(ObjRef::new(num, 0)))? else {
                continue;
            };
            let base_font = font.get_name("BaseFont").unwrap_or("").to_string();
            let Some(descriptor) = font_descriptor(ctx, &font)? else {
                debug!(obj = num, %base_font, "font without descriptor");
                continue;
            };
            let Some((kind, file)) = font_file(ctx, &descriptor)? else {
                debug!(obj = num, %base_font, "font not embedded");
                continue;
            };
            out.push(ExtractedFont {
                obj_nr: num,
                base_font,
                kind,
                data: ctx.stream_content(&file)?,
            });
        }
    }
    Ok(out)
}

fn font_file(ctx: &mut Context, descriptor: &Dict) -> Result<Option<(FontKind, Object)>> {
    if let Some(file) = descriptor.get("FontFile") {
        return Ok(Some((FontKind::Type1, file.clone())));
    }
    if let Some(file) = descriptor.get("FontFile2") {
        return Ok(Some((FontKind::TrueType, file.clone())));
    }
    let Some(file) = descriptor.get("FontFile3") else {
        return Ok(None);
    };
    let stream = ctx.dereference_stream(file)?;
    let kind = match stream.dict.get_name("Subtype") {
        Some("OpenType") => FontKind::OpenType,
        _ => FontKind::Cff,
    };
    Ok(Some((kind, file.clone())))
}
