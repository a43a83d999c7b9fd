//! Object syntax.

use crate::model::objects::{Dict, Object};
use crate::parser::lexer::name_to_bytes;
use std::io::Write;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Append the textual form of `obj`. Stream payloads are not written; a
/// stream serializes as its dictionary.
pub fn write_object(out: &mut Vec<u8>, obj: &Object) {
    match obj {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Object::Real(f) => write_real(out, *f),
        Object::Name(n) => write_name(out, n),
        Object::String(s) => write_string(out, s),
        Object::HexString(s) => write_hex(out, s),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dict(d) => write_dict(out, d),
        Object::Stream(s) => write_dict(out, &s.dict),
        Object::Ref(r) => {
            let _ = write!(out, "{} {} R", r.num, r.generation);
        }
    }
}

pub fn write_dict(out: &mut Vec<u8>, dict: &Dict) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    out.extend_from_slice(b">>");
}

pub fn to_bytes(obj: &Object) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, obj);
    out
}

fn write_real(out: &mut Vec<u8>, f: f64) {
    if !f.is_finite() {
        out.push(b'0');
        return;
    }
    let text = format!("{f:.5}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-0" => out.push(b'0'),
        t => out.extend_from_slice(t.as_bytes()),
    }
}

/// Delimiters, whitespace, `#` and bytes outside `!`..`~` use `#xx`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for byte in name_to_bytes(name) {
        if !(b'!'..=b'~').contains(&byte) || b"#()/<>[]{}%".contains(&byte) {
            out.extend_from_slice(&[b'#', HEX[(byte >> 4) as usize], HEX[(byte & 0xF) as usize]]);
        } else {
            out.push(byte);
        }
    }
}

/// Mostly binary strings go out as hex; the rest as escaped literals.
fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    let unprintable = s.iter().filter(|b| !(0x20..=0x7E).contains(*b)).count();
    if unprintable > s.len() / 3 {
        return write_hex(out, s);
    }
    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', b]),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0x20..=0x7E => out.push(b),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out.push(b')');
}

fn write_hex(out: &mut Vec<u8>, s: &[u8]) {
    out.push(b'<');
    for &b in s {
        out.extend_from_slice(&[HEX[(b >> 4) as usize], HEX[(b & 0xF) as usize]]);
    }
    out.push(b'>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::model::objects::ObjRef;

    fn text(obj: &Object) -> String {
        String::from_utf8(to_bytes(obj)).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(text(&Object::Real(0.5)), "0.5");
        assert_eq!(text(&Object::Real(-0.000001)), "0");
        assert_eq!(text(&Object::Real(3.0)), "3");
        assert_eq!(text(&Object::Ref(ObjRef::new(4, 1))), "4 1 R");
    }

    #[test]
    fn test_name_escapes_delimiters() {
        assert_eq!(text(&Object::name("A B#")), "/A#20B#23");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(text(&Object::string(b"a(b)\\".to_vec())), "(a\\(b\\)\\\\)");
        assert_eq!(text(&Object::string(vec![0, 1, 2])), "<000102>");
    }

    #[test]
    fn test_dict_keeps_order() {
        let d = dict! { "Type" => Object::name("Page"), "Count" => 2 };
        assert_eq!(text(&Object::Dict(d)), "<</Type /Page/Count 2>>");
    }

    #[test]
    fn test_output_parses_back() {
        let original = Object::Dict(dict! {
            "A" => vec![Object::Int(1), Object::Real(2.5), Object::Null],
            "B" => Object::string(b"x\ny".to_vec()),
            "C" => ObjRef::new(9, 0),
        });
        let bytes = to_bytes(&original);
        let parsed = crate::parser::ObjectParser::new(&bytes).parse_object().unwrap();
        assert_eq!(parsed, original);
    }
}
