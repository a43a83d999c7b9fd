//! Object parser - assembles PDF objects from tokens.

use super::lexer::{Keyword, Lexer, Token};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, ObjRef, Object};

/// Deepest array/dictionary nesting accepted before giving up.
const MAX_DEPTH: usize = 256;

/// PDF object parser.
///
/// Handles indirect references (`num gen R`) through a small lookahead buffer.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    lookahead: Vec<(usize, Token)>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: Vec::new(),
        }
    }

    /// Offset of the next unread token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map(|(pos, _)| *pos)
            .unwrap_or_else(|| self.lexer.tell())
    }

    /// Offset just past the last consumed token, with no lookahead pending.
    pub fn raw_pos(&self) -> usize {
        self.lexer.tell()
    }

    pub fn data(&self) -> &'a [u8] {
        self.lexer.data()
    }

    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token()
    }

    pub fn push_back(&mut self, pos: usize, tok: Token) {
        self.lookahead.push((pos, tok));
    }

    /// Expect a specific keyword next.
    pub fn expect_keyword(&mut self, kw: Keyword) -> Result<usize> {
        match self.next_token()? {
            Some((pos, Token::Keyword(k))) if k == kw => Ok(pos),
            Some((pos, tok)) => Err(PdfError::parse(
                pos,
                format!("expected {kw:?}, found {tok:?}"),
            )),
            None => Err(PdfError::parse(
                self.lexer.tell(),
                format!("expected {kw:?}, found end of data"),
            )),
        }
    }

    /// Parse the next object.
    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<Object> {
        let end = self.lexer.tell();
        let (pos, token) = self
            .next_token()?
            .ok_or_else(|| PdfError::parse(end, "unexpected end of data"))?;
        if depth > MAX_DEPTH {
            return Err(PdfError::parse(pos, "objects nested too deeply"));
        }
        match token {
            Token::Int(n) => self.int_or_ref(n),
            Token::Real(n) => Ok(Object::Real(n)),
            Token::Bool(b) => Ok(Object::Bool(b)),
            Token::Null => Ok(Object::Null),
            Token::Name(s) => Ok(Object::Name(s)),
            Token::String(s) => Ok(Object::String(s)),
            Token::HexString(s) => Ok(Object::HexString(s)),
            Token::ArrayStart => self.parse_array(pos, depth),
            Token::DictStart => self.parse_dict(pos, depth).map(Object::Dict),
            Token::ArrayEnd | Token::DictEnd => Err(PdfError::parse(pos, "unbalanced brackets")),
            Token::Keyword(kw) => Err(PdfError::parse(pos, format!("unexpected keyword {kw:?}"))),
        }
    }

    fn int_or_ref(&mut self, n: i64) -> Result<Object> {
        let Some((pos2, tok2)) = self.next_token()? else {
            return Ok(Object::Int(n));
        };
        if let Token::Int(m) = tok2 {
            match self.next_token()? {
                Some((_, Token::Keyword(Keyword::R))) if n > 0 && (0..=65535).contains(&m) => {
                    return Ok(Object::Ref(ObjRef::new(n as u32, m as u16)));
                }
                Some((pos3, tok3)) => self.push_back(pos3, tok3),
                None => {}
            }
        }
        self.push_back(pos2, tok2);
        Ok(Object::Int(n))
    }

    fn parse_array(&mut self, start: usize, depth: usize) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            match self.next_token()? {
                Some((_, Token::ArrayEnd)) => return Ok(Object::Array(items)),
                Some((pos, tok)) => {
                    self.push_back(pos, tok);
                    items.push(self.parse_nested(depth + 1)?);
                }
                None => {
                    return Err(PdfError::parse(
                        start,
                        "unbalanced brackets: unterminated array",
                    ));
                }
            }
        }
    }

    /// Parse dictionary entries after `<<`.
    pub fn parse_dict(&mut self, start: usize, depth: usize) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            match self.next_token()? {
                Some((_, Token::DictEnd)) => return Ok(dict),
                Some((_, Token::Name(key))) => match self.next_token()? {
                    // A key with no value before `>>` reads as null, i.e. absent.
                    Some((_, Token::DictEnd)) => return Ok(dict),
                    Some((pos, tok)) => {
                        self.push_back(pos, tok);
                        let value = self.parse_nested(depth + 1)?;
                        // A null value is equivalent to an absent key.
                        if !value.is_null() {
                            dict.insert(key, value);
                        }
                    }
                    None => break,
                },
                Some((pos, tok)) => {
                    return Err(PdfError::parse(
                        pos,
                        format!("dictionary key must be a name, found {tok:?}"),
                    ));
                }
                None => break,
            }
        }
        Err(PdfError::parse(
            start,
            "unbalanced brackets: unterminated dictionary",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_dict_with_ref() {
        let mut parser = ObjectParser::new(b"<< /Resources << /Font << /F1 1 0 R >> >> >>");
        let obj = parser.parse_object().unwrap();
        let font = obj
            .as_dict()
            .unwrap()
            .get("Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get("Font")
            .unwrap()
            .as_dict()
            .unwrap();
        assert_eq!(font.get_ref("F1"), Some(ObjRef::new(1, 0)));
    }

    #[test]
    fn test_ints_without_r_stay_ints() {
        let mut parser = ObjectParser::new(b"[1 2 3 4 0 R]");
        let obj = parser.parse_object().unwrap();
        assert_eq!(
            obj,
            Object::Array(vec![
                Object::Int(1),
                Object::Int(2),
                Object::Int(3),
                Object::Ref(ObjRef::new(4, 0)),
            ])
        );
    }

    #[test]
    fn test_unbalanced_array_fails() {
        let mut parser = ObjectParser::new(b"[1 2");
        assert!(matches!(parser.parse_object(), Err(PdfError::Parse { .. })));
    }

    #[test]
    fn test_null_value_is_absent() {
        let mut parser = ObjectParser::new(b"<< /A null /B 1 >>");
        let obj = parser.parse_object().unwrap();
        assert!(!obj.as_dict().unwrap().contains_key("A"));
    }
}
