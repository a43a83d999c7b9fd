//! Cross-reference loading: `startxref`, classical tables, xref streams,
//! the /Prev chain and a brute-force rebuild for damaged files.

use super::lexer::{Keyword, Token};
use super::object::ObjectParser;
use super::reader::{ObjectReader, rfind};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, ObjRef, Object};
use crate::model::xref::{XRefEntry, XRefTable};
use once_cell::sync::OnceCell;
use regex::bytes::Regex;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Trailer keys that describe one section rather than the document.
const SECTION_KEYS: [&str; 8] = [
    "Prev", "XRefStm", "Length", "Filter", "DecodeParms", "W", "Index", "Type",
];

/// Result of loading every cross-reference section.
#[derive(Debug)]
pub struct XRefData {
    pub table: XRefTable,
    pub trailer: Dict,
    /// True when the table was rebuilt by scanning for object headers.
    pub rebuilt: bool,
}

/// One section: its entries in file order and its trailer.
struct Section {
    entries: Vec<(u32, XRefEntry)>,
    trailer: Dict,
}

/// `%PDF-x.y` within the first 1024 bytes.
pub fn read_header_version(data: &[u8]) -> Result<String> {
    let window = &data[..data.len().min(1024)];
    let pos = super::reader::find(window, b"%PDF-")
        .ok_or_else(|| PdfError::parse(0, "missing %PDF header"))?;
    let version: String = data[pos + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| char::from(b))
        .collect();
    if version.is_empty() {
        return Err(PdfError::parse(pos, "malformed %PDF header"));
    }
    Ok(version)
}

/// Offset named by the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(1024);
    let pos = rfind(&data[tail_start..], b"startxref")
        .map(|p| p + tail_start)
        .or_else(|| rfind(data, b"startxref"))
        .ok_or_else(|| PdfError::parse(data.len(), "startxref not found"))?;
    let mut parser = ObjectParser::at(data, pos + b"startxref".len());
    match parser.next_token()? {
        Some((_, Token::Int(n))) if n >= 0 && (n as usize) < data.len() => Ok(n as usize),
        _ => Err(PdfError::parse(pos, "malformed startxref")),
    }
}

/// Load the cross-reference data of a whole file.
///
/// Falls back to [`rebuild`] when the chain is unreadable, unless `strict`.
pub fn load(data: &[u8], strict: bool) -> Result<XRefData> {
    match load_chain(data, strict) {
        Ok(xref) => Ok(xref),
        Err(e) if !strict => {
            warn!(error = %e, "cross-reference unreadable, scanning for objects");
            rebuild(data)
        }
        Err(e) => Err(e),
    }
}

fn load_chain(data: &[u8], strict: bool) -> Result<XRefData> {
    let mut pos = find_startxref(data)?;
    let mut visited = FxHashSet::default();
    let mut sections = Vec::new();
    loop {
        if !visited.insert(pos) {
            warn!(offset = pos, "cycle in /Prev chain");
            break;
        }
        let section = load_section(data, pos, strict)?;
        let prev = section.trailer.get_int("Prev");
        let xref_stm = section.trailer.get_int("XRefStm");
        sections.push(section);
        // Hybrid files: the stream is searched after the table, before /Prev.
        if let Some(stm) = xref_stm.map(|p| p as usize)
            && visited.insert(stm)
        {
            match load_xref_stream(data, stm, strict) {
                Ok(s) => sections.push(s),
                Err(e) => warn!(offset = stm, error = %e, "unreadable /XRefStm"),
            }
        }
        match prev {
            Some(p) if p >= 0 && (p as usize) < data.len() => pos = p as usize,
            Some(p) => return Err(PdfError::parse(pos, format!("/Prev {p} out of range"))),
            None => break,
        }
    }
    debug!(sections = sections.len(), "loaded cross-reference chain");
    Ok(merge(sections))
}

/// Newest section first; earlier entries win.
fn merge(sections: Vec<Section>) -> XRefData {
    let mut table = XRefTable::new();
    let mut trailer = Dict::new();
    for section in sections {
        for (num, entry) in section.entries {
            table.insert_if_absent(num, entry);
        }
        for (key, value) in section.trailer {
            if !SECTION_KEYS.contains(&key.as_str()) && !trailer.contains_key(&key) {
                trailer.insert(key, value);
            }
        }
    }
    XRefData {
        table,
        trailer,
        rebuilt: false,
    }
}

fn load_section(data: &[u8], pos: usize, strict: bool) -> Result<Section> {
    let mut parser = ObjectParser::at(data, pos);
    match parser.next_token()? {
        Some((_, Token::Keyword(Keyword::XRef))) => load_classical(&mut parser),
        Some(_) => load_xref_stream(data, pos, strict),
        None => Err(PdfError::parse(pos, "xref offset at end of file")),
    }
}

fn load_classical(parser: &mut ObjectParser<'_>) -> Result<Section> {
    let mut entries = Vec::new();
    loop {
        let (pos, token) = parser
            .next_token()?
            .ok_or_else(|| PdfError::parse(parser.tell(), "xref table without trailer"))?;
        let mut first = match token {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Int(n) if n >= 0 => n as u32,
            other => {
                return Err(PdfError::parse(pos, format!("corrupt xref subsection: {other:?}")));
            }
        };
        let count = match parser.next_token()? {
            Some((_, Token::Int(n))) if n >= 0 => n as u32,
            _ => return Err(PdfError::parse(pos, "corrupt xref subsection header")),
        };
        for i in 0..count {
            let (offset, generation, in_use) = read_entry(parser)?;
            // A subsection starting at 1 that still lists the object 0 entry.
            if i == 0 && first == 1 && !in_use && generation == 65535 {
                first = 0;
            }
            let num = first + i;
            let entry = if in_use {
                XRefEntry::InUse {
                    offset: offset as usize,
                    generation: generation as u16,
                    object: None,
                }
            } else {
                XRefEntry::Free {
                    next: offset as u32,
                    generation: generation as u16,
                }
            };
            entries.push((num, entry));
        }
    }
    let (start, token) = parser
        .next_token()?
        .ok_or_else(|| PdfError::parse(parser.tell(), "missing trailer dictionary"))?;
    if token != Token::DictStart {
        return Err(PdfError::parse(start, "missing trailer dictionary"));
    }
    let trailer = parser.parse_dict(start, 0)?;
    Ok(Section { entries, trailer })
}

fn read_entry(parser: &mut ObjectParser<'_>) -> Result<(u64, u64, bool)> {
    let at = parser.tell();
    let corrupt = || PdfError::parse(at, "corrupt xref entry");
    let offset = match parser.next_token()? {
        Some((_, Token::Int(n))) if n >= 0 => n as u64,
        _ => return Err(corrupt()),
    };
    let generation = match parser.next_token()? {
        Some((_, Token::Int(n))) if (0..=65535).contains(&n) => n as u64,
        _ => return Err(corrupt()),
    };
    let in_use = match parser.next_token()? {
        Some((_, Token::Keyword(Keyword::Other(k)))) if k == b"n" => true,
        Some((_, Token::Keyword(Keyword::Other(k)))) if k == b"f" => false,
        _ => return Err(corrupt()),
    };
    Ok((offset, generation, in_use))
}

fn load_xref_stream(data: &[u8], pos: usize, strict: bool) -> Result<Section> {
    let obj = ObjectReader::new(data, strict).read_at(pos, &mut |_| None)?;
    let stream = obj.object.as_stream()?;
    let dict = &stream.dict;
    if !dict.has_type("XRef") {
        return Err(PdfError::parse(pos, "expected xref stream"));
    }
    let widths = dict
        .get("W")
        .ok_or_else(|| PdfError::parse(pos, "xref stream without /W"))?
        .as_array()?
        .iter()
        .map(|w| w.as_int().map(|w| w.max(0) as usize))
        .collect::<Result<Vec<_>>>()?;
    let &[w0, w1, w2] = widths.as_slice() else {
        return Err(PdfError::parse(pos, "/W must have three entries"));
    };
    let size = dict
        .get_int("Size")
        .ok_or_else(|| PdfError::parse(pos, "xref stream without /Size"))?;
    let index: Vec<(u32, u32)> = match dict.get("Index") {
        Some(Object::Array(arr)) => arr
            .chunks_exact(2)
            .map(|pair| Ok((pair[0].as_int()? as u32, pair[1].as_int()? as u32)))
            .collect::<Result<_>>()?,
        _ => vec![(0, size as u32)],
    };

    let decoded = stream.decoded_data()?;
    let row = w0 + w1 + w2;
    let mut rows = decoded.chunks_exact(row.max(1));
    let mut entries = Vec::new();
    'sections: for (start, count) in index {
        for i in 0..count {
            let Some(fields) = rows.next() else {
                warn!(offset = pos, "xref stream shorter than /Index");
                break 'sections;
            };
            let kind = if w0 == 0 { 1 } else { be_uint(&fields[..w0]) };
            let f1 = be_uint(&fields[w0..w0 + w1]);
            let f2 = be_uint(&fields[w0 + w1..]);
            let entry = match kind {
                0 => XRefEntry::Free {
                    next: f1 as u32,
                    generation: f2 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f1 as usize,
                    generation: f2 as u16,
                    object: None,
                },
                2 => XRefEntry::Compressed {
                    stream: f1 as u32,
                    index: f2 as u32,
                    object: None,
                },
                // Unknown types are references to the null object.
                _ => continue,
            };
            entries.push((start + i, entry));
        }
    }
    Ok(Section {
        entries,
        trailer: dict.clone(),
    })
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn object_header_regex() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| {
        Regex::new(r"(?-u)(\d+)[ \t\r\n\f\x00]+(\d+)[ \t\r\n\f\x00]+obj\b")
            .map_err(|e| PdfError::Unsupported(e.to_string()))
    })
}

/// Rebuild the table by scanning for `N G obj` headers.
///
/// Later occurrences win. The trailer comes from the last `trailer`
/// keyword, else the last xref stream, else a synthesized one pointing
/// at the first catalog found.
pub fn rebuild(data: &[u8]) -> Result<XRefData> {
    let mut table = XRefTable::new();
    let reader = ObjectReader::new(data, false);
    let mut xref_stream_trailer = None;
    let mut catalog = None;
    for cap in object_header_regex()?.captures_iter(data) {
        let (Some(whole), Some(num), Some(generation)) = (cap.get(0), cap.get(1), cap.get(2))
        else {
            continue;
        };
        let parse = |m: regex::bytes::Match<'_>| {
            std::str::from_utf8(m.as_bytes())
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
        };
        let (Some(num), Some(generation)) = (parse(num), parse(generation)) else {
            continue;
        };
        if num == 0 || num > u64::from(u32::MAX) || generation > 65535 {
            continue;
        }
        let offset = whole.start();
        table.insert(
            num as u32,
            XRefEntry::InUse {
                offset,
                generation: generation as u16,
                object: None,
            },
        );
        if let Ok(found) = reader.read_at(offset, &mut |_| None)
            && let Some(dict) = found.object.dict_like()
        {
            if dict.has_type("XRef") {
                xref_stream_trailer = Some(dict.clone());
            } else if dict.has_type("Catalog") && catalog.is_none() {
                catalog = Some(found.id);
            }
        }
    }
    if table.in_use_numbers().is_empty() {
        return Err(PdfError::parse(0, "no objects found"));
    }

    let keyword_trailer = rfind(data, b"trailer").and_then(|pos| {
        let mut parser = ObjectParser::at(data, pos + b"trailer".len());
        match parser.next_token().ok()?? {
            (start, Token::DictStart) => parser.parse_dict(start, 0).ok(),
            _ => None,
        }
    });
    let mut trailer = keyword_trailer
        .or(xref_stream_trailer)
        .unwrap_or_default();
    for key in SECTION_KEYS {
        trailer.remove(key);
    }
    if trailer.get_ref("Root").is_none() {
        let root: ObjRef = catalog.ok_or_else(|| PdfError::parse(0, "no catalog found"))?;
        trailer.insert("Root", root);
    }
    trailer.insert("Size", table.size());
    warn!(objects = table.in_use_numbers().len(), "rebuilt cross-reference table");
    Ok(XRefData {
        table,
        trailer,
        rebuilt: true,
    })
}
