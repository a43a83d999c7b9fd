//! RunLength codec.

use crate::error::Result;

/// Decode RunLength-encoded data.
///
/// - Length byte 0-127: copy next (length + 1) bytes literally
/// - Length byte 128: end of data
/// - Length byte 129-255: repeat next byte (257 - length) times
///
/// Truncated input stops decoding without error.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let end = (i + length as usize + 1).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else { break };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
            }
        }
    }
    Ok(result)
}

/// Encode data with runs of up to 128 bytes, terminated by EOD.
pub fn rlencode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut i = 0;
    while i < data.len() {
        let mut run = 1;
        while i + run < data.len() && run < 128 && data[i + run] == data[i] {
            run += 1;
        }
        if run > 1 {
            out.push((257 - run) as u8);
            out.push(data[i]);
            i += run;
            continue;
        }
        let start = i;
        while i < data.len()
            && i - start < 128
            && !(i + 1 < data.len() && data[i + 1] == data[i])
        {
            i += 1;
        }
        if i == start {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&data[start..i]);
    }
    out.push(128);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rldecode_literal_and_repeat() {
        assert_eq!(rldecode(&[2, b'a', b'b', b'c', 254, b'x', 128]).unwrap(), b"abcxxx");
    }

    #[test]
    fn test_rlencode_mixed_runs() {
        let data = b"abcccccccd";
        let encoded = rlencode(data);
        assert_eq!(encoded, vec![1, b'a', b'b', 250, b'c', 0, b'd', 128]);
        assert_eq!(rldecode(&encoded).unwrap(), data);
    }
}
