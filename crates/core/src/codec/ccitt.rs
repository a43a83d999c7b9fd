//! CCITT fax decoder (ITU-T T.4 and T.6).
//!
//! Decodes Group 4 (`K < 0`), Group 3 one-dimensional (`K = 0`) and mixed
//! Group 3 two-dimensional (`K > 0`) data into packed 1-bit rows.

use crate::error::{PdfError, Result};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// Decoding parameters taken from /DecodeParms.
#[derive(Debug, Clone, Copy)]
pub struct CcittParams {
    pub k: i64,
    pub columns: usize,
    pub rows: Option<usize>,
    pub black_is_1: bool,
    pub encoded_byte_align: bool,
}

impl Default for CcittParams {
    fn default() -> Self {
        Self {
            k: 0,
            columns: 1728,
            rows: None,
            black_is_1: false,
            encoded_byte_align: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Pass,
    Horizontal,
    Vertical(i32),
    Eol,
}

/// Code tables keyed by (bit length, code).
static WHITE: Lazy<FxHashMap<(u8, u16), u16>> = Lazy::new(|| build_table(WHITE_CODES));
static BLACK: Lazy<FxHashMap<(u8, u16), u16>> = Lazy::new(|| build_table(BLACK_CODES));

fn build_table(codes: &[(&str, u16)]) -> FxHashMap<(u8, u16), u16> {
    codes
        .iter()
        .map(|(bits, run)| {
            let code = bits
                .bytes()
                .fold(0u16, |acc, b| (acc << 1) | u16::from(b == b'1'));
            ((bits.len() as u8, code), *run)
        })
        .collect()
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Option<u16> {
        let byte = *self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Some(u16::from(bit))
    }

    fn peek_bits(&self, n: usize) -> Option<u16> {
        let mut lookahead = BitReader {
            data: self.data,
            pos: self.pos,
        };
        let mut value = 0;
        for _ in 0..n {
            value = (value << 1) | lookahead.read_bit()?;
        }
        Some(value)
    }

    fn align(&mut self) {
        self.pos = self.pos.div_ceil(8) * 8;
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.data.len() * 8
    }

    /// Consume an EOL code (eleven zeros then a one, with optional fill).
    fn skip_eol(&mut self) -> bool {
        let start = self.pos;
        let mut zeros = 0;
        while let Some(bit) = self.peek_bits(1) {
            if bit == 1 {
                break;
            }
            zeros += 1;
            self.pos += 1;
        }
        if zeros >= 11 && self.read_bit() == Some(1) {
            return true;
        }
        self.pos = start;
        false
    }

    fn read_mode(&mut self) -> Option<Mode> {
        let mut code = 0u16;
        for len in 1..=7 {
            code = (code << 1) | self.read_bit()?;
            let mode = match (len, code) {
                (1, 0b1) => Mode::Vertical(0),
                (3, 0b011) => Mode::Vertical(1),
                (3, 0b010) => Mode::Vertical(-1),
                (3, 0b001) => Mode::Horizontal,
                (4, 0b0001) => Mode::Pass,
                (6, 0b000011) => Mode::Vertical(2),
                (6, 0b000010) => Mode::Vertical(-2),
                (7, 0b0000011) => Mode::Vertical(3),
                (7, 0b0000010) => Mode::Vertical(-3),
                _ => continue,
            };
            return Some(mode);
        }
        // Seven zeros so far: only an EOL can follow.
        self.pos -= 7;
        if self.skip_eol() { Some(Mode::Eol) } else { None }
    }

    /// Read one run length (make-up codes followed by a terminating code).
    fn read_run(&mut self, white: bool) -> Option<usize> {
        let table = if white { &*WHITE } else { &*BLACK };
        let mut total = 0usize;
        loop {
            let mut code = 0u16;
            let mut found = None;
            for len in 1..=13u8 {
                code = (code << 1) | self.read_bit()?;
                if let Some(run) = table.get(&(len, code)) {
                    found = Some(*run);
                    break;
                }
            }
            let run = found?;
            total += usize::from(run);
            if run < 64 {
                return Some(total);
            }
        }
    }
}

/// Decode CCITT fax data into rows of `ceil(columns / 8)` bytes.
pub fn ccittfaxdecode(data: &[u8], params: &CcittParams) -> Result<Vec<u8>> {
    let columns = params.columns;
    if columns == 0 {
        return Err(PdfError::DecodeError("CCITT /Columns must be positive".into()));
    }
    let row_bytes = columns.div_ceil(8);
    let mut reader = BitReader::new(data);
    let mut out = Vec::new();
    let mut reference: Vec<usize> = Vec::new();
    let mut row = 0usize;

    while params.rows.is_none_or(|rows| row < rows) {
        if params.encoded_byte_align && params.k >= 0 {
            reader.align();
        }
        let mut two_d = params.k < 0;
        if params.k >= 0 {
            let saw_eol = reader.skip_eol();
            if saw_eol && reader.skip_eol() {
                break; // RTC / EOFB
            }
            if params.k > 0 {
                match reader.read_bit() {
                    Some(tag) => two_d = tag == 0,
                    None => break,
                }
            }
        } else if params.encoded_byte_align {
            reader.align();
        }
        if reader.exhausted() {
            break;
        }

        let changes = if two_d {
            match decode_2d_row(&mut reader, &reference, columns) {
                Some(changes) => changes,
                None => break,
            }
        } else {
            match decode_1d_row(&mut reader, columns) {
                Some(changes) => changes,
                None => break,
            }
        };

        out.extend(render_row(&changes, columns, row_bytes, params.black_is_1));
        reference = changes;
        row += 1;
    }

    if let Some(rows) = params.rows {
        if row < rows {
            tracing::warn!(decoded = row, expected = rows, "CCITT data ended early");
        }
    }
    Ok(out)
}

fn decode_1d_row(reader: &mut BitReader<'_>, columns: usize) -> Option<Vec<usize>> {
    let mut changes = Vec::new();
    let mut pos = 0usize;
    let mut white = true;
    while pos < columns {
        let run = reader.read_run(white)?;
        pos = (pos + run).min(columns);
        if pos < columns {
            changes.push(pos);
        }
        white = !white;
    }
    Some(changes)
}

/// First changing element on the reference line right of `a0` whose new
/// colour is opposite to `white`, and the element after it.
fn find_b1_b2(
    reference: &[usize],
    a0: Option<usize>,
    white: bool,
    columns: usize,
) -> (usize, usize) {
    let start = if white { 0 } else { 1 };
    let mut i = start;
    while i < reference.len() {
        if a0.is_none_or(|a0| reference[i] > a0) {
            let b2 = reference.get(i + 1).copied().unwrap_or(columns);
            return (reference[i], b2);
        }
        i += 2;
    }
    (columns, columns)
}

fn decode_2d_row(
    reader: &mut BitReader<'_>,
    reference: &[usize],
    columns: usize,
) -> Option<Vec<usize>> {
    let mut changes = Vec::new();
    let mut a0: Option<usize> = None;
    let mut white = true;
    while a0.is_none_or(|a0| a0 < columns) {
        let (b1, b2) = find_b1_b2(reference, a0, white, columns);
        match reader.read_mode()? {
            Mode::Pass => a0 = Some(b2),
            Mode::Horizontal => {
                let start = a0.unwrap_or(0);
                let r1 = reader.read_run(white)?;
                let r2 = reader.read_run(!white)?;
                let a1 = (start + r1).min(columns);
                let a2 = (a1 + r2).min(columns);
                for a in [a1, a2] {
                    if a < columns {
                        changes.push(a);
                    }
                }
                a0 = Some(a2);
            }
            Mode::Vertical(delta) => {
                let a1 = (b1 as i64 + i64::from(delta)).clamp(0, columns as i64) as usize;
                if a1 < columns {
                    changes.push(a1);
                }
                a0 = Some(a1);
                white = !white;
            }
            Mode::Eol => return None,
        }
    }
    Some(changes)
}

fn render_row(changes: &[usize], columns: usize, row_bytes: usize, black_is_1: bool) -> Vec<u8> {
    // Start all white.
    let fill = if black_is_1 { 0x00 } else { 0xFF };
    let mut row = vec![fill; row_bytes];
    let mut i = 0;
    while i < changes.len() {
        let start = changes[i];
        let end = changes.get(i + 1).copied().unwrap_or(columns).min(columns);
        for x in start..end {
            let mask = 0x80u8 >> (x % 8);
            if black_is_1 {
                row[x / 8] |= mask;
            } else {
                row[x / 8] &= !mask;
            }
        }
        i += 2;
    }
    row
}


const WHITE_CODES: &[(&str, u16)] = &[
    ("00110101", 0), ("000111", 1), ("0111", 2), ("1000", 3),
    ("1011", 4), ("1100", 5), ("1110", 6), ("1111", 7),
    ("10011", 8), ("10100", 9), ("00111", 10), ("01000", 11),
    ("001000", 12), ("000011", 13), ("110100", 14), ("110101", 15),
    ("101010", 16), ("101011", 17), ("0100111", 18), ("0001100", 19),
    ("0001000", 20), ("0010111", 21), ("0000011", 22), ("0000100", 23),
    ("0101000", 24), ("0101011", 25), ("0010011", 26), ("0100100", 27),
    ("0011000", 28), ("00000010", 29), ("00000011", 30), ("00011010", 31),
    ("00011011", 32), ("00010010", 33), ("00010011", 34), ("00010100", 35),
    ("00010101", 36), ("00010110", 37), ("00010111", 38), ("00101000", 39),
    ("00101001", 40), ("00101010", 41), ("00101011", 42), ("00101100", 43),
    ("00101101", 44), ("00000100", 45), ("00000101", 46), ("00001010", 47),
    ("00001011", 48), ("01010010", 49), ("01010011", 50), ("01010100", 51),
    ("01010101", 52), ("00100100", 53), ("00100101", 54), ("01011000", 55),
    ("01011001", 56), ("01011010", 57), ("01011011", 58), ("01001010", 59),
    ("01001011", 60), ("00110010", 61), ("00110011", 62), ("00110100", 63),
    ("11011", 64), ("10010", 128), ("010111", 192), ("0110111", 256),
    ("00110110", 320), ("00110111", 384), ("01100100", 448), ("01100101", 512),
    ("01101000", 576), ("01100111", 640), ("011001100", 704), ("011001101", 768),
    ("011010010", 832), ("011010011", 896), ("011010100", 960), ("011010101", 1024),
    ("011010110", 1088), ("011010111", 1152), ("011011000", 1216), ("011011001", 1280),
    ("011011010", 1344), ("011011011", 1408), ("010011000", 1472), ("010011001", 1536),
    ("010011010", 1600), ("011000", 1664), ("010011011", 1728), ("00000001000", 1792),
    ("00000001100", 1856), ("00000001101", 1920), ("000000010010", 1984), ("000000010011", 2048),
    ("000000010100", 2112), ("000000010101", 2176), ("000000010110", 2240), ("000000010111", 2304),
    ("000000011100", 2368), ("000000011101", 2432), ("000000011110", 2496), ("000000011111", 2560),
];

const BLACK_CODES: &[(&str, u16)] = &[
    ("0000110111", 0), ("010", 1), ("11", 2), ("10", 3),
    ("011", 4), ("0011", 5), ("0010", 6), ("00011", 7),
    ("000101", 8), ("000100", 9), ("0000100", 10), ("0000101", 11),
    ("0000111", 12), ("00000100", 13), ("00000111", 14), ("000011000", 15),
    ("0000010111", 16), ("0000011000", 17), ("0000001000", 18), ("00001100111", 19),
    ("00001101000", 20), ("00001101100", 21), ("00000110111", 22), ("00000101000", 23),
    ("00000010111", 24), ("00000011000", 25), ("000011001010", 26), ("000011001011", 27),
    ("000011001100", 28), ("000011001101", 29), ("000001101000", 30), ("000001101001", 31),
    ("000001101010", 32), ("000001101011", 33), ("000011010010", 34), ("000011010011", 35),
    ("000011010100", 36), ("000011010101", 37), ("000011010110", 38), ("000011010111", 39),
    ("000001101100", 40), ("000001101101", 41), ("000011011010", 42), ("000011011011", 43),
    ("000001010100", 44), ("000001010101", 45), ("000001010110", 46), ("000001010111", 47),
    ("000001100100", 48), ("000001100101", 49), ("000001010010", 50), ("000001010011", 51),
    ("000000100100", 52), ("000000110111", 53), ("000000111000", 54), ("000000100111", 55),
    ("000000101000", 56), ("000001011000", 57), ("000001011001", 58), ("000000101011", 59),
    ("000000101100", 60), ("000001011010", 61), ("000001100110", 62), ("000001100111", 63),
    ("0000001111", 64), ("000011001000", 128), ("000011001001", 192), ("000001011011", 256),
    ("000000110011", 320), ("000000110100", 384), ("000000110101", 448), ("0000001101100", 512),
    ("0000001101101", 576), ("0000001001010", 640), ("0000001001011", 704), ("0000001001100", 768),
    ("0000001001101", 832), ("0000001110010", 896), ("0000001110011", 960), ("0000001110100", 1024),
    ("0000001110101", 1088), ("0000001110110", 1152), ("0000001110111", 1216), ("0000001010010", 1280),
    ("0000001010011", 1344), ("0000001010100", 1408), ("0000001010101", 1472), ("0000001011010", 1536),
    ("0000001011011", 1600), ("0000001100100", 1664), ("0000001100101", 1728), ("00000001000", 1792),
    ("00000001100", 1856), ("00000001101", 1920), ("000000010010", 1984), ("000000010011", 2048),
    ("000000010100", 2112), ("000000010101", 2176), ("000000010110", 2240), ("000000010111", 2304),
    ("000000011100", 2368), ("000000011101", 2432), ("000000011110", 2496), ("000000011111", 2560),
];
