//! Indirect object reader: `N G obj ... endobj` at a byte offset.

use super::lexer::{Keyword, Token, is_whitespace};
use super::object::ObjectParser;
use crate::error::{PdfError, Result};
use crate::model::objects::{ObjRef, Object, Stream};
use tracing::{debug, warn};

/// An indirect object as found in the file.
#[derive(Debug)]
pub struct IndirectObject {
    pub id: ObjRef,
    pub object: Object,
    /// Offset just past the object.
    pub end: usize,
}

/// Reads indirect objects out of the raw file bytes.
pub struct ObjectReader<'a> {
    data: &'a [u8],
    strict: bool,
}

impl<'a> ObjectReader<'a> {
    pub const fn new(data: &'a [u8], strict: bool) -> Self {
        Self { data, strict }
    }

    /// Parse the indirect object at `offset`.
    ///
    /// `resolve_length` looks up an indirect /Length; returning `None` makes
    /// the reader locate the payload by scanning for `endstream`.
    pub fn read_at(
        &self,
        offset: usize,
        resolve_length: &mut dyn FnMut(ObjRef) -> Option<i64>,
    ) -> Result<IndirectObject> {
        if offset >= self.data.len() {
            return Err(PdfError::parse(
                offset,
                format!("object offset beyond end of file ({})", self.data.len()),
            ));
        }
        let mut parser = ObjectParser::at(self.data, offset);
        let id = self.read_header(&mut parser, offset)?;
        let object = parser.parse_object()?;

        match parser.next_token()? {
            Some((pos, Token::Keyword(Keyword::Stream))) => {
                let Object::Dict(dict) = object else {
                    return Err(PdfError::parse(pos, "stream keyword after non-dictionary"));
                };
                let declared = match dict.get("Length") {
                    Some(Object::Ref(r)) => resolve_length(*r),
                    Some(other) => other.as_int().ok(),
                    None => None,
                };
                let start = payload_start(self.data, pos + b"stream".len());
                let direct = matches!(dict.get("Length"), Some(l) if !matches!(l, Object::Ref(_)));
                let (data_end, after) = self.locate_payload(start, declared, direct)?;
                let stream = Stream::new(dict, self.data[start..data_end].to_vec());
                let end = self.expect_endobj(after, id)?;
                Ok(IndirectObject {
                    id,
                    object: Object::Stream(Box::new(stream)),
                    end,
                })
            }
            Some((pos, Token::Keyword(Keyword::EndObj))) => Ok(IndirectObject {
                id,
                object,
                end: pos + b"endobj".len(),
            }),
            other => {
                let pos = other.map_or(self.data.len(), |(p, _)| p);
                if self.strict {
                    return Err(PdfError::parse(pos, format!("missing endobj for {id}")));
                }
                warn!(offset = pos, obj = %id, "missing endobj");
                Ok(IndirectObject {
                    id,
                    object,
                    end: pos,
                })
            }
        }
    }

    fn read_header(&self, parser: &mut ObjectParser<'a>, offset: usize) -> Result<ObjRef> {
        let bad = || PdfError::parse(offset, "expected object header `N G obj`");
        let num = match parser.next_token()? {
            Some((_, Token::Int(n))) if n > 0 && n <= u32::MAX as i64 => n as u32,
            _ => return Err(bad()),
        };
        let generation = match parser.next_token()? {
            Some((_, Token::Int(g))) if (0..=65535).contains(&g) => g as u16,
            _ => return Err(bad()),
        };
        parser.expect_keyword(Keyword::Obj).map_err(|_| bad())?;
        Ok(ObjRef::new(num, generation))
    }

    /// End of payload and offset just past `endstream`.
    fn locate_payload(
        &self,
        start: usize,
        declared: Option<i64>,
        direct: bool,
    ) -> Result<(usize, usize)> {
        if let Some(len) = declared.filter(|l| *l >= 0).map(|l| l as usize) {
            let end = start.saturating_add(len);
            if end <= self.data.len()
                && let Some(after) = endstream_follows(self.data, end)
            {
                return Ok((end, after));
            }
            if self.strict {
                return Err(PdfError::parse(
                    start,
                    format!("/Length {len} does not reach endstream"),
                ));
            }
            warn!(offset = start, length = len, "bad /Length, scanning for endstream");
        } else if direct && self.strict {
            return Err(PdfError::parse(start, "invalid /Length"));
        } else {
            debug!(offset = start, "no usable /Length, scanning for endstream");
        }
        let rel = find(&self.data[start..], b"endstream")
            .ok_or_else(|| PdfError::parse(start, "unterminated stream"))?;
        let marker = start + rel;
        Ok((trim_eol(self.data, start, marker), marker + b"endstream".len()))
    }

    fn expect_endobj(&self, pos: usize, id: ObjRef) -> Result<usize> {
        let mut parser = ObjectParser::at(self.data, pos);
        match parser.next_token()? {
            Some((p, Token::Keyword(Keyword::EndObj))) => Ok(p + b"endobj".len()),
            _ if !self.strict => {
                warn!(offset = pos, obj = %id, "missing endobj after stream");
                Ok(pos)
            }
            _ => Err(PdfError::parse(pos, format!("missing endobj for {id}"))),
        }
    }
}

/// Skip the EOL that follows the `stream` keyword (CRLF, LF, or a lone CR).
fn payload_start(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos) == Some(&b' ') {
        pos += 1;
    }
    match (data.get(pos), data.get(pos + 1)) {
        (Some(b'\r'), Some(b'\n')) => pos + 2,
        (Some(b'\r' | b'\n'), _) => pos + 1,
        _ => pos,
    }
}

/// If `endstream` follows `pos` after optional whitespace, the offset past it.
fn endstream_follows(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..]
        .starts_with(b"endstream")
        .then_some(pos + b"endstream".len())
}

/// Drop the single EOL that precedes `endstream`.
fn trim_eol(data: &[u8], start: usize, mut end: usize) -> usize {
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_length(_: ObjRef) -> Option<i64> {
        None
    }

    #[test]
    fn test_reads_plain_object() {
        let data = b"7 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let obj = ObjectReader::new(data, true).read_at(0, &mut no_length).unwrap();
        assert_eq!(obj.id, ObjRef::new(7, 0));
        assert!(obj.object.as_dict().unwrap().has_type("Catalog"));
    }

    #[test]
    fn test_stream_with_exact_length() {
        let data = b"1 0 obj\n<< /Length 5 >>\nstream\r\nhello\nendstream\nendobj\n";
        let obj = ObjectReader::new(data, true).read_at(0, &mut no_length).unwrap();
        assert_eq!(obj.object.as_stream().unwrap().data, b"hello");
    }

    #[test]
    fn test_indirect_length_resolved() {
        let data = b"1 0 obj\n<< /Length 2 0 R >>\nstream\nabc\nendstream\nendobj\n";
        let obj = ObjectReader::new(data, true)
            .read_at(0, &mut |r| (r.num == 2).then_some(3))
            .unwrap();
        assert_eq!(obj.object.as_stream().unwrap().data, b"abc");
    }

    #[test]
    fn test_wrong_length_recovered_unless_strict() {
        let data = b"1 0 obj\n<< /Length 99 >>\nstream\nabc\nendstream\nendobj\n";
        let obj = ObjectReader::new(data, false).read_at(0, &mut no_length).unwrap();
        assert_eq!(obj.object.as_stream().unwrap().data, b"abc");
        assert!(matches!(
            ObjectReader::new(data, true).read_at(0, &mut no_length),
            Err(PdfError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_endobj_is_strict_only() {
        let data = b"1 0 obj\n42\n2 0 obj\n";
        assert!(ObjectReader::new(data, false).read_at(0, &mut no_length).is_ok());
        assert!(ObjectReader::new(data, true).read_at(0, &mut no_length).is_err());
    }
}
