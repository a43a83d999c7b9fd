//! PNG (10-15) and TIFF (2) predictors for Flate and LZW streams.

use crate::error::{PdfError, Result};
use crate::model::objects::Dict;

/// Predictor settings from /DecodeParms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predictor {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Predictor {
    pub fn from_parms(parms: Option<&Dict>) -> Option<Self> {
        let parms = parms?;
        let predictor = parms.get_int("Predictor").unwrap_or(1);
        if predictor <= 1 {
            return None;
        }
        let positive = |key: &str, default: i64| {
            parms.get_int(key).filter(|v| *v > 0).unwrap_or(default) as usize
        };
        Some(Self {
            predictor,
            colors: positive("Colors", 1),
            bits_per_component: positive("BitsPerComponent", 8),
            columns: positive("Columns", 1),
        })
    }

    fn row_bytes(&self) -> usize {
        (self.colors * self.columns * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    /// Undo prediction after decompression.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.predictor {
            2 => Ok(self.tiff(data, false)),
            10..=15 => Ok(self.png_decode(data)),
            other => Err(PdfError::DecodeError(format!("unknown predictor {other}"))),
        }
    }

    /// Apply prediction before compression. PNG predictors always emit Up rows.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.predictor {
            2 => Ok(self.tiff(data, true)),
            10..=15 => Ok(self.png_encode_up(data)),
            other => Err(PdfError::DecodeError(format!("unknown predictor {other}"))),
        }
    }

    fn png_decode(&self, data: &[u8]) -> Vec<u8> {
        let row_bytes = self.row_bytes();
        let bpp = self.bytes_per_pixel();
        let mut result = Vec::with_capacity(data.len());
        let mut prev = vec![0u8; row_bytes];
        let mut cur = vec![0u8; row_bytes];

        for chunk in data.chunks(row_bytes + 1) {
            if chunk.len() < 2 {
                break;
            }
            let filter_type = chunk[0];
            let row = &chunk[1..];
            // A short final row is zero padded.
            cur.fill(0);
            cur[..row.len()].copy_from_slice(row);
            for i in 0..row_bytes {
                let left = if i >= bpp { cur[i - bpp] } else { 0 };
                let above = prev[i];
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                let base = match filter_type {
                    1 => left,
                    2 => above,
                    3 => ((u16::from(left) + u16::from(above)) / 2) as u8,
                    4 => paeth_predictor(left, above, upper_left),
                    _ => 0,
                };
                cur[i] = cur[i].wrapping_add(base);
            }
            result.extend_from_slice(&cur[..row.len().min(row_bytes)]);
            std::mem::swap(&mut prev, &mut cur);
        }
        result
    }

    fn png_encode_up(&self, data: &[u8]) -> Vec<u8> {
        let row_bytes = self.row_bytes();
        let mut out = Vec::with_capacity(data.len() + data.len() / row_bytes.max(1) + 1);
        let zero = vec![0u8; row_bytes];
        let mut prev: &[u8] = &zero;
        for row in data.chunks(row_bytes) {
            out.push(2);
            out.extend(row.iter().zip(prev.iter()).map(|(b, p)| b.wrapping_sub(*p)));
            prev = row;
        }
        out
    }

    /// TIFF horizontal differencing, per component.
    fn tiff(&self, data: &[u8], encode: bool) -> Vec<u8> {
        let row_bytes = self.row_bytes();
        let mut out = data.to_vec();
        match self.bits_per_component {
            8 => {
                for row in out.chunks_mut(row_bytes) {
                    if encode {
                        for i in (self.colors..row.len()).rev() {
                            row[i] = row[i].wrapping_sub(row[i - self.colors]);
                        }
                    } else {
                        for i in self.colors..row.len() {
                            row[i] = row[i].wrapping_add(row[i - self.colors]);
                        }
                    }
                }
            }
            16 => {
                let stride = self.colors;
                for row in out.chunks_mut(row_bytes) {
                    let mut samples: Vec<u16> = row
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect();
                    difference(&mut samples, stride, encode, u16::wrapping_add, u16::wrapping_sub);
                    for (dst, v) in row.chunks_exact_mut(2).zip(samples) {
                        dst.copy_from_slice(&v.to_be_bytes());
                    }
                }
            }
            bpc @ (1 | 2 | 4) => {
                let mask = (1u8 << bpc) - 1;
                let per_byte = 8 / bpc;
                let count = self.colors * self.columns;
                for row in out.chunks_mut(row_bytes) {
                    let mut samples: Vec<u8> = (0..count.min(row.len() * per_byte))
                        .map(|idx| (row[idx / per_byte] >> (8 - bpc * (idx % per_byte + 1))) & mask)
                        .collect();
                    difference(&mut samples, self.colors, encode, u8::wrapping_add, u8::wrapping_sub);
                    row.fill(0);
                    for (idx, v) in samples.into_iter().enumerate() {
                        row[idx / per_byte] |= (v & mask) << (8 - bpc * (idx % per_byte + 1));
                    }
                }
            }
            _ => {}
        }
        out
    }
}

/// Horizontal differencing over one row of samples.
fn difference<T: Copy>(
    samples: &mut [T],
    stride: usize,
    encode: bool,
    add: fn(T, T) -> T,
    sub: fn(T, T) -> T,
) {
    if encode {
        for i in (stride..samples.len()).rev() {
            samples[i] = sub(samples[i], samples[i - stride]);
        }
    } else {
        for i in stride..samples.len() {
            samples[i] = add(samples[i], samples[i - stride]);
        }
    }
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    #[test]
    fn test_png_sub_and_up_rows() {
        let p = Predictor::from_parms(Some(&dict! { "Predictor" => 12, "Columns" => 3 })).unwrap();
        // Row 1 Sub: 1,1,1 -> 1,2,3. Row 2 Up: 1,1,1 -> 2,3,4.
        let decoded = p.decode(&[1, 1, 1, 1, 2, 1, 1, 1]).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_tiff_predictor_rgb() {
        let p = Predictor::from_parms(Some(&dict! {
            "Predictor" => 2, "Colors" => 3, "Columns" => 2
        }))
        .unwrap();
        let raw = [10, 20, 30, 15, 25, 35];
        let encoded = p.encode(&raw).unwrap();
        assert_eq!(encoded, vec![10, 20, 30, 5, 5, 5]);
        assert_eq!(p.decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_predictor_one_is_absent() {
        assert!(Predictor::from_parms(Some(&dict! { "Predictor" => 1 })).is_none());
    }
}
