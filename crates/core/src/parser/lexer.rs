//! Byte-level PDF tokenizer.
//!
//! Produces [`Token`]s from a byte slice, skipping whitespace and comments.
//! Objects are assembled from tokens by [`super::object::ObjectParser`].

use crate::error::{PdfError, Result};

/// PDF token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    Null,
    /// Name without the leading slash, `#XX` escapes decoded
    Name(String),
    String(Vec<u8>),
    HexString(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(Keyword),
}

/// Bare keywords that carry file structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    R,
    XRef,
    Trailer,
    StartXRef,
    Other(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"R" => Self::R,
            b"xref" => Self::XRef,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXRef,
            other => Self::Other(other.to_vec()),
        }
    }
}

pub(crate) const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

pub(crate) const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Tokenizer over a borrowed byte slice.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                while let Some(c) = self.advance() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    fn parse_name(&mut self) -> Token {
        self.advance(); // '/'
        let mut name = Vec::new();
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                if let (Some(h), Some(l)) = (
                    self.peek().and_then(hex_value),
                    self.peek_at(1).and_then(hex_value),
                ) {
                    self.pos += 2;
                    name.push((h << 4) | l);
                    continue;
                }
            }
            name.push(b);
        }
        Token::Name(name_from_bytes(&name))
    }

    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        // Tolerate doubled signs such as "--5" that some producers emit.
        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| PdfError::parse(start, "invalid number"))?;
        let trimmed = text.trim_start_matches(['+', '-']);
        let negative = text.starts_with('-');
        if has_dot {
            let body = if trimmed.is_empty() || trimmed == "." { "0" } else { trimmed };
            let val: f64 = body
                .parse()
                .map_err(|_| PdfError::parse(start, format!("invalid real: {text}")))?;
            Ok(Token::Real(if negative { -val } else { val }))
        } else {
            let val: i64 = trimmed
                .parse()
                .map_err(|_| PdfError::parse(start, format!("invalid int: {text}")))?;
            Ok(Token::Int(if negative { -val } else { val }))
        }
    }

    fn parse_literal_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1usize;
        loop {
            let Some(c) = self.advance() else {
                return Err(PdfError::parse(start, "unterminated literal string"));
            };
            match c {
                b'(' => {
                    depth += 1;
                    result.push(c);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    result.push(c);
                }
                b'\\' => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                    }
                    Some(b'\n') => {}
                    Some(d @ b'0'..=b'7') => {
                        let mut octal = u32::from(d - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(e @ b'0'..=b'7') => {
                                    self.pos += 1;
                                    octal = octal * 8 + u32::from(e - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(other) => result.push(other),
                    None => return Err(PdfError::parse(start, "unterminated literal string")),
                },
                _ => result.push(c),
            }
        }
        Ok(Token::String(result))
    }

    fn parse_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;
        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| {
                        PdfError::parse(self.pos - 1, "invalid character in hex string")
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::parse(start, "unterminated hex string")),
            }
        }
        // An odd trailing nibble is padded with 0.
        if let Some(high) = pending {
            result.push(high << 4);
        }
        Ok(Token::HexString(result))
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // Stray delimiter such as ')' or '}'.
            self.pos += 1;
        }
        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            b"null" => Token::Null,
            other => Token::Keyword(Keyword::from_bytes(other)),
        }
    }

    /// Next token and its start offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        self.skip_whitespace();
        let Some(b) = self.peek() else {
            return Ok(None);
        };
        let pos = self.pos;
        let token = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_literal_string()?,
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Token::DictStart
            }
            b'<' => self.parse_hex_string()?,
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Token::DictEnd
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let next = self.peek_at(1);
                let numeric = b.is_ascii_digit()
                    || matches!(next, Some(c) if c.is_ascii_digit() || c == b'.' || c == b'-');
                if numeric {
                    self.parse_number()?
                } else {
                    self.parse_keyword()
                }
            }
            _ => self.parse_keyword(),
        };
        Ok(Some((pos, token)))
    }
}

pub(crate) const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Names are stored as Latin-1 so every byte survives a round trip.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub(crate) fn name_to_bytes(name: &str) -> Vec<u8> {
    name.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
