//! Image XObjects as standalone files.
//!
//! DCT and JPX payloads are already complete files. CCITT data gets a TIFF
//! wrapper. Everything else is decoded and re-encoded as PNG, mapping the
//! color space and bit depth onto the nearest PNG color type. A soft mask
//! becomes the PNG alpha channel and is never emitted on its own.

use crate::codec::{ccitt_params, decode_parms, decode_to_image_codec, filter_names};
use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object, Stream};
use crate::optimize::index_resources;
use byteorder::{LittleEndian, WriteBytesExt};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::{debug, warn};

const MAX_IMAGE_DECODED_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Jpeg2000,
    Tiff,
    Png,
}

impl ImageFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Jpeg2000 => "jpx",
            Self::Tiff => "tif",
            Self::Png => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// First selected page showing the image.
    pub page: usize,
    pub obj_nr: u32,
    pub resource_name: String,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl ExtractedImage {
    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{stem}_{}_{}.{}",
            self.page,
            super::sanitize(&self.resource_name),
            self.format.extension()
        )
    }
}

/// Images used on the selected pages, each object once.
pub fn extract_images(ctx: &mut Context, selected: &BTreeSet<usize>) -> Result<Vec<ExtractedImage>> {
    if !ctx.optimize.is_indexed() {
        index_resources(ctx)?;
    }
    let masks: FxHashSet<u32> = ctx
        .optimize
        .images
        .values()
        .filter_map(|rec| rec.soft_mask)
        .collect();
    let mut visited = FxHashSet::default();
    let mut out = Vec::new();
    for &nr in selected {
        let Some(images) = ctx.optimize.page_images.get(nr.wrapping_sub(1)).cloned() else {
            continue;
        };
        for num in images {
            if masks.contains(&num) || !visited.insert(num) {
                continue;
            }
            let resource_name = ctx
                .optimize
                .images
                .get(&num)
                .and_then(|rec| rec.resource_names.first().cloned())
                .unwrap_or_default();
            let stream = ctx.dereference_stream(&Object::Ref(ObjRef::new(num, 0)))?;
            match render(ctx, &stream) {
                Ok((format, data)) => out.push(ExtractedImage {
                    page: nr,
                    obj_nr: num,
                    resource_name,
                    format,
                    data,
                }),
                Err(e @ (PdfError::Unsupported(_) | PdfError::DecodeError(_))) if !ctx.is_strict() => {
                    warn!(obj = num, error = %e, "image skipped");
                }
                Err(e) => return Err(e),
            }
        }
    }
    debug!(images = out.len(), "extracted images");
    Ok(out)
}

/// Convert one image stream to a standalone file.
fn render(ctx: &mut Context, stream: &Stream) -> Result<(ImageFormat, Vec<u8>)> {
    let (data, codec) = if stream.decoded {
        let codec = filter_names(&stream.dict)
            .into_iter()
            .find(|f| matches!(f.as_str(), "DCTDecode" | "JPXDecode" | "JBIG2Decode"));
        (stream.data.clone(), codec)
    } else {
        decode_to_image_codec(&stream.data, &stream.dict)?
    };
    match codec.as_deref() {
        Some("DCTDecode") => Ok((ImageFormat::Jpeg, data)),
        Some("JPXDecode") => Ok((ImageFormat::Jpeg2000, data)),
        Some("CCITTFaxDecode") => Ok((ImageFormat::Tiff, ccitt_tiff(&stream.dict, &data)?)),
        Some(other) => Err(PdfError::Unsupported(format!("{other} image export"))),
        None => Ok((ImageFormat::Png, png_image(ctx, &stream.dict, &data)?)),
    }
}

/// Wrap raw CCITT data in a single-strip little-endian TIFF.
fn ccitt_tiff(dict: &Dict, data: &[u8]) -> Result<Vec<u8>> {
    let names = filter_names(dict);
    let parms = decode_parms(dict, names.len());
    let index = names.iter().position(|n| n == "CCITTFaxDecode").unwrap_or(0);
    let params = ccitt_params(parms.get(index).and_then(Option::as_ref), dict);
    let width = dict.get_int("Width").map_or(params.columns as u32, |w| w as u32);
    let height = params.rows.unwrap_or(0) as u32;
    let compression: u16 = if params.k < 0 { 4 } else { 3 };
    // With /BlackIs1 false, 0 bits are black.
    let photometric: u16 = if params.black_is_1 { 0 } else { 1 };

    const SHORT: u16 = 3;
    const LONG: u16 = 4;
    let data_offset = 8u32;
    let mut ifd_offset = data_offset + data.len() as u32;
    ifd_offset += ifd_offset % 2;
    let mut entries: Vec<(u16, u16, u32)> = vec![
        (256, LONG, width),
        (257, LONG, height),
        (258, SHORT, 1),
        (259, SHORT, compression.into()),
        (262, SHORT, photometric.into()),
        (273, LONG, data_offset),
        (277, SHORT, 1),
        (278, LONG, height),
        (279, LONG, data.len() as u32),
    ];
    if compression == 3 {
        let two_d = u32::from(params.k > 0);
        let fill = if params.encoded_byte_align { 4 } else { 0 };
        entries.push((292, LONG, two_d | fill));
    } else {
        entries.push((293, LONG, 0));
    }

    let mut out = Vec::with_capacity(ifd_offset as usize + 2 + entries.len() * 12 + 4);
    out.extend_from_slice(b"II");
    out.write_u16::<LittleEndian>(42)?;
    out.write_u32::<LittleEndian>(ifd_offset)?;
    out.extend_from_slice(data);
    if out.len() % 2 == 1 {
        out.push(0);
    }
    out.write_u16::<LittleEndian>(entries.len() as u16)?;
    for (tag, kind, value) in entries {
        out.write_u16::<LittleEndian>(tag)?;
        out.write_u16::<LittleEndian>(kind)?;
        out.write_u32::<LittleEndian>(1)?;
        if kind == SHORT {
            out.write_u16::<LittleEndian>(value as u16)?;
            out.write_u16::<LittleEndian>(0)?;
        } else {
            out.write_u32::<LittleEndian>(value)?;
        }
    }
    out.write_u32::<LittleEndian>(0)?;
    Ok(out)
}

/// Color model of an image after resolving its /ColorSpace.
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// RGB palette, three bytes per entry.
    Indexed(Vec<u8>),
}

impl ColorModel {
    const fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed(_) => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

fn color_model(ctx: &mut Context, cs: &Object) -> Result<ColorModel> {
    let cs = ctx.resolve(cs)?;
    let (family, args) = match &cs {
        Object::Name(n) => (n.as_str(), &[][..]),
        Object::Array(items) => match items.split_first() {
            Some((first, rest)) => (first.as_name()?, rest),
            None => return Err(PdfError::Unsupported("empty color space".into())),
        },
        Object::Null => return Ok(ColorModel::Gray),
        other => {
            return Err(PdfError::TypeError {
                expected: "color space",
                got: other.type_name(),
            });
        }
    };
    match family {
        "DeviceGray" | "CalGray" | "G" | "Separation" => Ok(ColorModel::Gray),
        "DeviceRGB" | "CalRGB" | "RGB" => Ok(ColorModel::Rgb),
        "DeviceCMYK" | "CMYK" => Ok(ColorModel::Cmyk),
        "ICCBased" => {
            let profile = args
                .first()
                .map(|p| ctx.dereference_stream(p))
                .transpose()?;
            match profile.and_then(|p| p.dict.get_int("N")) {
                Some(1) => Ok(ColorModel::Gray),
                Some(4) => Ok(ColorModel::Cmyk),
                _ => Ok(ColorModel::Rgb),
            }
        }
        "Indexed" | "I" => {
            let [base, hival, lookup, ..] = args else {
                return Err(PdfError::validation("ColorSpace", "short /Indexed array"));
            };
            let base = color_model(ctx, base)?;
            let entries = (ctx.dereference_int(hival)?.clamp(0, 255) + 1) as usize;
            let table = match ctx.resolve(lookup)? {
                Object::String(s) | Object::HexString(s) => s,
                Object::Stream(s) => s.decoded_data()?.into_owned(),
                other => {
                    return Err(PdfError::TypeError {
                        expected: "lookup table",
                        got: other.type_name(),
                    });
                }
            };
            let n = base.components();
            let mut palette = Vec::with_capacity(entries * 3);
            for i in 0..entries {
                let sample: Vec<u8> = (0..n).map(|c| table.get(i * n + c).copied().unwrap_or(0)).collect();
                palette.extend_from_slice(&to_rgb(&base, &sample));
            }
            Ok(ColorModel::Indexed(palette))
        }
        other => Err(PdfError::Unsupported(format!("{other} color space"))),
    }
}

fn to_rgb(model: &ColorModel, sample: &[u8]) -> [u8; 3] {
    match (model, sample) {
        (ColorModel::Rgb, [r, g, b, ..]) => [*r, *g, *b],
        (ColorModel::Cmyk, [c, m, y, k, ..]) => {
            let channel = |v: u8| ((255 - u32::from(v)) * (255 - u32::from(*k)) / 255) as u8;
            [channel(*c), channel(*m), channel(*y)]
        }
        (_, [g, ..]) => [*g; 3],
        _ => [0; 3],
    }
}

/// Unpacked samples of an image, one byte each. `scale` stretches depths
/// below 8 to 0..255; 16-bit samples keep their high byte.
fn unpack(data: &[u8], width: usize, height: usize, bpc: usize, comps: usize, scale: bool) -> Vec<u8> {
    let row_bytes = (width * comps * bpc).div_ceil(8);
    let max = (1u32 << bpc.min(8)) - 1;
    let byte = |i: usize| u32::from(data.get(i).copied().unwrap_or(0));
    let mut out = Vec::with_capacity(width * height * comps);
    for y in 0..height {
        let row = y * row_bytes;
        for i in 0..width * comps {
            let v = match bpc {
                8 => byte(row + i),
                16 => byte(row + 2 * i),
                _ => {
                    let bit = i * bpc;
                    (byte(row + bit / 8) >> (8 - bpc - bit % 8)) & max
                }
            };
            let v = if scale && bpc < 8 { v * 255 / max } else { v };
            out.push(v as u8);
        }
    }
    out
}

fn png_image(ctx: &mut Context, dict: &Dict, data: &[u8]) -> Result<Vec<u8>> {
    let width = dict.get_int("Width").unwrap_or(0);
    let height = dict.get_int("Height").unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(PdfError::validation("Image", "missing /Width or /Height"));
    }
    let (width, height) = (width as usize, height as usize);
    let image_mask = dict.get("ImageMask").and_then(|o| o.as_bool().ok()).unwrap_or(false);
    let bpc = if image_mask {
        1
    } else {
        dict.get_int("BitsPerComponent").unwrap_or(8) as usize
    };
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(PdfError::Unsupported(format!("{bpc} bits per component")));
    }
    let model = if image_mask {
        ColorModel::Gray
    } else {
        color_model(ctx, dict.get("ColorSpace").unwrap_or(&Object::Null))?
    };
    let comps = model.components();
    let row_bytes = (width * comps * bpc).div_ceil(8);
    if row_bytes.saturating_mul(height) > MAX_IMAGE_DECODED_BYTES {
        return Err(PdfError::Unsupported(format!("{width}x{height} image too large")));
    }
    let mut raw = data.to_vec();
    raw.resize(row_bytes * height, 0);
    if image_mask && decode_inverted(dict) {
        raw.iter_mut().for_each(|b| *b = !*b);
    }

    let alpha = soft_mask(ctx, dict, width, height)?;
    let (w, h) = (width as u32, height as u32);
    match (&model, alpha) {
        (ColorModel::Gray, None) => encode_png(w, h, png::ColorType::Grayscale, bit_depth(bpc), None, &raw),
        (ColorModel::Rgb, None) if bpc >= 8 => encode_png(w, h, png::ColorType::Rgb, bit_depth(bpc), None, &raw),
        (ColorModel::Indexed(palette), None) if bpc <= 8 => {
            encode_png(w, h, png::ColorType::Indexed, bit_depth(bpc), Some(palette.clone()), &raw)
        }
        (ColorModel::Gray, Some(alpha)) => {
            let gray = unpack(&raw, width, height, bpc, 1, true);
            let pixels: Vec<u8> = gray.iter().zip(&alpha).flat_map(|(g, a)| [*g, *a]).collect();
            encode_png(w, h, png::ColorType::GrayscaleAlpha, png::BitDepth::Eight, None, &pixels)
        }
        (_, alpha) => {
            let indexed = matches!(model, ColorModel::Indexed(_));
            let samples = unpack(&raw, width, height, bpc, comps, !indexed);
            let rgb: Vec<[u8; 3]> = samples
                .chunks_exact(comps)
                .map(|s| match &model {
                    ColorModel::Indexed(palette) => {
                        let i = usize::from(s[0]) * 3;
                        palette.get(i..i + 3).map_or([0; 3], |p| [p[0], p[1], p[2]])
                    }
                    other => to_rgb(other, s),
                })
                .collect();
            match alpha {
                Some(alpha) => {
                    let pixels: Vec<u8> = rgb
                        .iter()
                        .zip(&alpha)
                        .flat_map(|(p, a)| [p[0], p[1], p[2], *a])
                        .collect();
                    encode_png(w, h, png::ColorType::Rgba, png::BitDepth::Eight, None, &pixels)
                }
                None => {
                    let pixels: Vec<u8> = rgb.concat();
                    encode_png(w, h, png::ColorType::Rgb, png::BitDepth::Eight, None, &pixels)
                }
            }
        }
    }
}

/// `/Decode [1 0]` flips a stencil mask.
fn decode_inverted(dict: &Dict) -> bool {
    match dict.get("Decode") {
        Some(Object::Array(d)) => d.first().and_then(|o| o.as_int().ok()) == Some(1),
        _ => false,
    }
}

/// 8-bit alpha from /SMask, when its size matches the image.
fn soft_mask(ctx: &mut Context, dict: &Dict, width: usize, height: usize) -> Result<Option<Vec<u8>>> {
    let Some(smask) = dict.get("SMask") else {
        return Ok(None);
    };
    let Object::Stream(mask) = ctx.resolve(smask)? else {
        return Ok(None);
    };
    let mw = mask.dict.get_int("Width").unwrap_or(0) as usize;
    let mh = mask.dict.get_int("Height").unwrap_or(0) as usize;
    if (mw, mh) != (width, height) {
        warn!(image = ?(width, height), mask = ?(mw, mh), "soft mask size differs, alpha dropped");
        return Ok(None);
    }
    let bpc = mask.dict.get_int("BitsPerComponent").unwrap_or(8) as usize;
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Ok(None);
    }
    let data = mask.decoded_data()?;
    Ok(Some(unpack(&data, width, height, bpc, 1, true)))
}

const fn bit_depth(bpc: usize) -> png::BitDepth {
    match bpc {
        1 => png::BitDepth::One,
        2 => png::BitDepth::Two,
        4 => png::BitDepth::Four,
        16 => png::BitDepth::Sixteen,
        _ => png::BitDepth::Eight,
    }
}

fn encode_png(
    width: u32,
    height: u32,
    color: png::ColorType,
    depth: png::BitDepth,
    palette: Option<Vec<u8>>,
    data: &[u8],
) -> Result<Vec<u8>> {
    let png_err = |e: png::EncodingError| PdfError::Io(std::io::Error::other(e.to_string()));
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(depth);
        if let Some(palette) = palette {
            encoder.set_palette(palette);
        }
        let mut writer = encoder.write_header().map_err(png_err)?;
        writer.write_image_data(data).map_err(png_err)?;
        writer.finish().map_err(png_err)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dict;
    use crate::document::pages::{pages_root, set_kids};

    fn image(dict: Dict, data: Vec<u8>) -> Stream {
        let mut d = dict! {
            "Type" => Object::name("XObject"),
            "Subtype" => Object::name("Image"),
        };
        for (k, v) in dict {
            d.insert(k, v);
        }
        Stream::from_content(d, data)
    }

    fn doc_with(images: Vec<Stream>) -> Context {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let mut xobjects = Dict::new();
        for (i, img) in images.into_iter().enumerate() {
            xobjects.insert(format!("Im{i}"), ctx.add_object(img));
        }
        let page = dict! {
            "Type" => Object::name("Page"),
            "Resources" => dict! { "XObject" => xobjects },
        };
        let page = (ctx.add_object(page.clone()), page);
        set_kids(&mut ctx, root, vec![page]).unwrap();
        ctx
    }

    #[test]
    fn test_jpeg_passes_through() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9];
        let mut ctx = doc_with(vec![image(
            dict! { "Width" => 1, "Height" => 1, "Filter" => Object::name("DCTDecode") },
            jpeg.clone(),
        )]);
        let got = extract_images(&mut ctx, &BTreeSet::from([1])).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].format, ImageFormat::Jpeg);
        assert_eq!(got[0].data, jpeg);
        assert_eq!(got[0].file_name("doc"), "doc_1_Im0.jpg");
    }

    #[test]
    fn test_rgb_becomes_png() {
        let mut ctx = doc_with(vec![image(
            dict! {
                "Width" => 2, "Height" => 1,
                "BitsPerComponent" => 8,
                "ColorSpace" => Object::name("DeviceRGB"),
            },
            vec![255, 0, 0, 0, 0, 255],
        )]);
        let got = extract_images(&mut ctx, &BTreeSet::from([1])).unwrap();
        assert_eq!(got[0].format, ImageFormat::Png);
        assert_eq!(&got[0].data[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_soft_mask_not_emitted_alone() {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let mask = ctx.add_object(image(
            dict! { "Width" => 1, "Height" => 1, "BitsPerComponent" => 8, "ColorSpace" => Object::name("DeviceGray") },
            vec![128],
        ));
        let img = ctx.add_object(image(
            dict! { "Width" => 1, "Height" => 1, "BitsPerComponent" => 8, "ColorSpace" => Object::name("DeviceGray"), "SMask" => mask },
            vec![10],
        ));
        let page = dict! {
            "Type" => Object::name("Page"),
            "Resources" => dict! { "XObject" => dict! { "Im" => img, "Mask" => mask } },
        };
        let page = (ctx.add_object(page.clone()), page);
        set_kids(&mut ctx, root, vec![page]).unwrap();
        let got = extract_images(&mut ctx, &BTreeSet::from([1])).unwrap();
        assert_eq!(got.iter().map(|i| i.obj_nr).collect::<Vec<_>>(), vec![img.num]);
    }

    #[test]
    fn test_ccitt_wrapped_in_tiff() {
        let dict = dict! {
            "Width" => 8, "Height" => 2,
            "Filter" => Object::name("CCITTFaxDecode"),
            "DecodeParms" => dict! { "K" => -1, "Columns" => 8 },
        };
        let tiff = ccitt_tiff(&dict, &[1, 2, 3]).unwrap();
        assert_eq!(&tiff[..4], b"II*\0");
        assert_eq!(&tiff[8..11], &[1, 2, 3]);
        // IFD begins at the word-aligned offset 12.
        assert_eq!(u32::from_le_bytes([tiff[4], tiff[5], tiff[6], tiff[7]]), 12);
    }

    #[test]
    fn test_unpack_scales_low_depths() {
        assert_eq!(unpack(&[0b1000_0000], 2, 1, 1, 1, true), vec![255, 0]);
        assert_eq!(unpack(&[0b0111_0000], 2, 1, 2, 1, false), vec![1, 3]);
        assert_eq!(unpack(&[0x12, 0x34], 1, 1, 16, 1, true), vec![0x12]);
    }

    #[test]
    fn test_indexed_cmyk_palette() {
        let mut ctx = Context::new(Configuration::default());
        let cs = Object::Array(vec![
            Object::name("Indexed"),
            Object::name("DeviceCMYK"),
            Object::Int(1),
            Object::string(vec![0, 0, 0, 0, 0, 0, 0, 255]),
        ]);
        let model = color_model(&mut ctx, &cs).unwrap();
        assert_eq!(model, ColorModel::Indexed(vec![255, 255, 255, 0, 0, 0]));
    }
}
