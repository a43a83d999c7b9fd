//! LZW codec using the weezl crate.

use crate::error::{PdfError, Result};
use weezl::{BitOrder, decode::Decoder, encode::Encoder};

/// Decode LZW-encoded data with the given /EarlyChange value.
///
/// EarlyChange=1 (the PDF default) switches code width one code early, which
/// weezl calls TIFF size switching.
pub fn lzwdecode(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    // Corrupt tails are tolerated; keep what decoded cleanly.
    let result = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = result.status {
        tracing::warn!(%err, decoded = output.len(), "LZW stream truncated");
    }
    Ok(output)
}

pub fn lzwencode(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut encoder = if early_change == 0 {
        Encoder::new(BitOrder::Msb, 8)
    } else {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    encoder
        .encode(data)
        .map_err(|e| PdfError::DecodeError(format!("LZW encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzw_reference_vector() {
        assert_eq!(
            lzwdecode(b"\x80\x0b\x60\x50\x22\x0c\x0c\x85\x01", 1).unwrap(),
            b"\x2d\x2d\x2d\x2d\x2d\x41\x2d\x2d\x2d\x42"
        );
    }

    #[test]
    fn test_lzw_long_input_crosses_code_widths() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
        for early in [0, 1] {
            let encoded = lzwencode(&data, early).unwrap();
            assert_eq!(lzwdecode(&encoded, early).unwrap(), data);
        }
    }
}
