//! ASCII85 and ASCIIHex codecs.

use crate::error::Result;
use crate::parser::lexer::hex_value;

/// Decode ASCII85-encoded data (PDF variant).
/// Handles: z-encoding, <~ ~> markers, whitespace, missing EOD.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut filled = 0;
    for &byte in data {
        match byte {
            b'z' if filled == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
                if filled == 5 {
                    result.extend_from_slice(&group_value(&group).to_be_bytes());
                    filled = 0;
                }
            }
            _ => {}
        }
    }
    if filled > 1 {
        for slot in group.iter_mut().skip(filled) {
            *slot = 84;
        }
        let bytes = group_value(&group).to_be_bytes();
        result.extend_from_slice(&bytes[..filled - 1]);
    }
    Ok(result)
}

fn group_value(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(u32::from(d)))
}

/// Encode data as ASCII85 terminated with `~>`.
pub fn ascii85encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 4);
    let mut line = 0;
    let mut push = |out: &mut Vec<u8>, bytes: &[u8]| {
        for &b in bytes {
            out.push(b);
            line += 1;
            if line == 72 {
                out.push(b'\n');
                line = 0;
            }
        }
    };
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);
        if chunk.len() == 4 && value == 0 {
            push(&mut out, b"z");
            continue;
        }
        let mut digits = [0u8; 5];
        for slot in digits.iter_mut().rev() {
            *slot = (value % 85) as u8 + b'!';
            value /= 85;
        }
        push(&mut out, &digits[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

/// Decode ASCIIHex-encoded data; stops at `>`.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if let Some(nibble) = hex_value(byte) {
            match pending.take() {
                Some(high) => result.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
    }
    if let Some(high) = pending {
        result.push(high << 4);
    }
    Ok(result)
}

/// Encode data as uppercase hex terminated with `>`.
pub fn asciihexencode(data: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2 + data.len() / 32 + 1);
    for (i, &b) in data.iter().enumerate() {
        if i > 0 && i % 32 == 0 {
            out.push(b'\n');
        }
        out.push(DIGITS[usize::from(b >> 4)]);
        out.push(DIGITS[usize::from(b & 0x0f)]);
    }
    out.push(b'>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii85_known_vector() {
        assert_eq!(ascii85decode(b"9jqo^BlbD-BleB1DJ+*+F(f,q~>").unwrap(), b"Man is distinguished");
    }

    #[test]
    fn test_ascii85_zero_group() {
        assert_eq!(ascii85encode(&[0, 0, 0, 0, 1]), b"z!<~>".to_vec());
        assert_eq!(ascii85decode(b"z!<~>").unwrap(), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_asciihex_ignores_whitespace() {
        assert_eq!(asciihexdecode(b"61 62\n6>").unwrap(), b"ab`");
    }
}
