//! Stream filter pipeline and the codecs behind it.
//!
//! - `flate`, `lzw`, `ascii85`, `runlength`, `ccitt`: stream filters
//! - `predictor`: PNG and TIFF predictors for Flate and LZW
//! - `aes`, `arcfour`: ciphers for the security handler
//!
//! Filters listed in /Filter are undone first to last when decoding and
//! applied last to first when encoding.

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod ccitt;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, Object};
use predictor::Predictor;

pub use ascii85::{ascii85decode, ascii85encode, asciihexdecode, asciihexencode};
pub use ccitt::{CcittParams, ccittfaxdecode};
pub use flate::{flate_decode, flate_encode};
pub use lzw::{lzwdecode, lzwencode};
pub use runlength::{rldecode, rlencode};

/// Expand inline-image abbreviations to full filter names.
pub fn canonical_filter_name(name: &str) -> &str {
    match name {
        "Fl" => "FlateDecode",
        "LZW" => "LZWDecode",
        "A85" => "ASCII85Decode",
        "AHx" => "ASCIIHexDecode",
        "RL" => "RunLengthDecode",
        "CCF" => "CCITTFaxDecode",
        "DCT" => "DCTDecode",
        other => other,
    }
}

/// Filters whose payload is kept verbatim (image codecs handled downstream).
pub fn is_passthrough(name: &str) -> bool {
    matches!(
        canonical_filter_name(name),
        "DCTDecode" | "JPXDecode" | "JBIG2Decode" | "Crypt"
    )
}

/// Names in the stream's /Filter entry, in listed order.
pub fn filter_names(dict: &Dict) -> Vec<String> {
    match dict.get("Filter") {
        Some(Object::Name(n)) => vec![canonical_filter_name(n).to_string()],
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok())
            .map(|n| canonical_filter_name(n).to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// /DecodeParms aligned with [`filter_names`].
pub fn decode_parms(dict: &Dict, count: usize) -> Vec<Option<Dict>> {
    let mut parms = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(Object::Dict(d)) => vec![Some(d.clone())],
        Some(Object::Array(arr)) => arr.iter().map(|o| o.as_dict().ok().cloned()).collect(),
        _ => Vec::new(),
    };
    parms.resize(count, None);
    parms
}

/// Decode a stream payload through its whole filter chain.
pub fn decode(data: &[u8], dict: &Dict) -> Result<Vec<u8>> {
    let names = filter_names(dict);
    let parms = decode_parms(dict, names.len());
    let mut out = data.to_vec();
    for (name, parm) in names.iter().zip(parms.iter()) {
        out = decode_filter(name, &out, parm.as_ref(), dict)?;
    }
    Ok(out)
}

/// Decode every filter before the first passthrough image codec. Returns the
/// partially decoded data and the name of the codec that remains, if any.
pub fn decode_to_image_codec(data: &[u8], dict: &Dict) -> Result<(Vec<u8>, Option<String>)> {
    let names = filter_names(dict);
    let parms = decode_parms(dict, names.len());
    let mut out = data.to_vec();
    for (name, parm) in names.iter().zip(parms.iter()) {
        if is_passthrough(name) && name != "Crypt" {
            return Ok((out, Some(name.clone())));
        }
        if name == "CCITTFaxDecode" {
            return Ok((out, Some(name.clone())));
        }
        out = decode_filter(name, &out, parm.as_ref(), dict)?;
    }
    Ok((out, None))
}

/// Encode a decoded payload through the filter chain, last filter first.
pub fn encode(data: &[u8], dict: &Dict) -> Result<Vec<u8>> {
    let names = filter_names(dict);
    let parms = decode_parms(dict, names.len());
    let mut out = data.to_vec();
    for (name, parm) in names.iter().zip(parms.iter()).rev() {
        out = encode_filter(name, &out, parm.as_ref())?;
    }
    Ok(out)
}

pub fn decode_filter(name: &str, data: &[u8], parms: Option<&Dict>, stream: &Dict) -> Result<Vec<u8>> {
    let predict = |out: Vec<u8>| match Predictor::from_parms(parms) {
        Some(p) => p.decode(&out),
        None => Ok(out),
    };
    match canonical_filter_name(name) {
        "FlateDecode" => predict(flate_decode(data)?),
        "LZWDecode" => {
            let early = parms.and_then(|p| p.get_int("EarlyChange")).unwrap_or(1);
            predict(lzwdecode(data, early)?)
        }
        "ASCII85Decode" => ascii85decode(data),
        "ASCIIHexDecode" => asciihexdecode(data),
        "RunLengthDecode" => rldecode(data),
        "CCITTFaxDecode" => ccittfaxdecode(data, &ccitt_params(parms, stream)),
        n if is_passthrough(n) => Ok(data.to_vec()),
        other => Err(PdfError::Unsupported(format!("filter {other}"))),
    }
}

pub fn encode_filter(name: &str, data: &[u8], parms: Option<&Dict>) -> Result<Vec<u8>> {
    let predicted = match Predictor::from_parms(parms) {
        Some(p) => p.encode(data)?,
        None => data.to_vec(),
    };
    match canonical_filter_name(name) {
        "FlateDecode" => flate_encode(&predicted),
        "LZWDecode" => {
            let early = parms.and_then(|p| p.get_int("EarlyChange")).unwrap_or(1);
            lzwencode(&predicted, early)
        }
        "ASCII85Decode" => Ok(ascii85encode(data)),
        "ASCIIHexDecode" => Ok(asciihexencode(data)),
        "RunLengthDecode" => Ok(rlencode(data)),
        "CCITTFaxDecode" => Err(PdfError::Unsupported("CCITT fax encoding".into())),
        n if is_passthrough(n) => Ok(data.to_vec()),
        other => Err(PdfError::Unsupported(format!("filter {other}"))),
    }
}

/// CCITT parameters; /Rows falls back to the image /Height.
pub fn ccitt_params(parms: Option<&Dict>, stream: &Dict) -> CcittParams {
    let mut p = CcittParams::default();
    if let Some(parms) = parms {
        p.k = parms.get_int("K").unwrap_or(0);
        p.columns = parms.get_int("Columns").filter(|c| *c > 0).unwrap_or(1728) as usize;
        p.rows = parms.get_int("Rows").filter(|r| *r > 0).map(|r| r as usize);
        p.black_is_1 = parms.get("BlackIs1").and_then(|o| o.as_bool().ok()).unwrap_or(false);
        p.encoded_byte_align = parms
            .get("EncodedByteAlign")
            .and_then(|o| o.as_bool().ok())
            .unwrap_or(false);
    }
    if p.rows.is_none() {
        p.rows = stream
            .get_int("Height")
            .or_else(|| stream.get_int("H"))
            .filter(|h| *h > 0)
            .map(|h| h as usize);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    #[test]
    fn test_chain_decodes_in_listed_order() {
        let dict = dict! {
            "Filter" => vec![Object::name("ASCIIHexDecode"), Object::name("FlateDecode")],
        };
        let content = b"BT /F1 12 Tf (Hi) Tj ET".to_vec();
        let encoded = encode(&content, &dict).unwrap();
        assert!(encoded.iter().all(|b| b.is_ascii_hexdigit() || *b == b'>' || *b == b'\n'));
        assert_eq!(decode(&encoded, &dict).unwrap(), content);
    }

    #[test]
    fn test_flate_with_png_predictor_matches_xref_layout() {
        let dict = dict! {
            "Filter" => Object::name("FlateDecode"),
            "DecodeParms" => dict! { "Predictor" => 12, "Columns" => 4 },
        };
        let rows = vec![1, 0, 0, 17, 1, 0, 1, 2];
        let encoded = encode(&rows, &dict).unwrap();
        assert_eq!(decode(&encoded, &dict).unwrap(), rows);
    }

    #[test]
    fn test_unknown_filter_is_unsupported() {
        let dict = dict! { "Filter" => Object::name("Bogus") };
        assert!(matches!(decode(b"x", &dict), Err(PdfError::Unsupported(_))));
    }

    #[test]
    fn test_dct_is_kept_verbatim() {
        let dict = dict! { "Filter" => vec![Object::name("FlateDecode"), Object::name("DCTDecode")] };
        let jpeg = b"\xff\xd8\xff\xe0fake".to_vec();
        let encoded = encode(&jpeg, &dict).unwrap();
        let (data, codec) = decode_to_image_codec(&encoded, &dict).unwrap();
        assert_eq!(data, jpeg);
        assert_eq!(codec.as_deref(), Some("DCTDecode"));
    }
}
