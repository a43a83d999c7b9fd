//! FlateDecode via flate2.

use crate::error::Result;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Inflate zlib data.
///
/// Corrupt or truncated streams return whatever inflated before the damage.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    if decoder.read_to_end(&mut out).is_ok() {
        return Ok(out);
    }
    let partial = decompress_corrupted(data, true);
    if !partial.is_empty() {
        tracing::warn!(recovered = partial.len(), "corrupt flate stream, keeping partial output");
        return Ok(partial);
    }
    // Some producers omit the zlib header.
    let raw = decompress_corrupted(data, false);
    tracing::warn!(recovered = raw.len(), "flate stream without zlib header");
    Ok(raw)
}

/// Feed the decompressor one byte at a time so output up to the first
/// error is kept.
fn decompress_corrupted(data: &[u8], zlib_header: bool) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};
    let mut decoder = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_stream_keeps_prefix() {
        let data = b"hello hello hello hello hello world".repeat(20);
        let encoded = flate_encode(&data).unwrap();
        let truncated = &encoded[..encoded.len() - 6];
        let decoded = flate_decode(truncated).unwrap();
        assert!(!decoded.is_empty());
        assert!(data.starts_with(&decoded));
    }
}
