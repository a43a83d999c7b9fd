mod common;

use common::{PdfBuilder, open, pages_document, widths};
use quire_core::writer::write_to_vec;
use quire_core::{Configuration, Context, Eol};
use std::io::Cursor;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn rewrite(input: &[u8], config: Configuration) -> Vec<u8> {
    let mut ctx = Context::from_bytes(input.to_vec(), config).unwrap();
    write_to_vec(&mut ctx).unwrap()
}

#[test]
fn test_classical_output_layout() {
    init_tracing();
    let out = rewrite(&pages_document(&[100, 200]), Configuration::default());
    let text = String::from_utf8_lossy(&out);
    assert!(text.starts_with("%PDF-1.4\n"));
    assert!(text.contains("\nxref\n0 "));
    assert!(text.contains("0000000000 65535 f"));
    assert!(text.trim_end().ends_with("%%EOF"));
    assert!(!text.contains("/ObjStm"));

    let mut ctx = open(&out);
    assert_eq!(widths(&mut ctx), vec![100.0, 200.0]);
    assert!(ctx.file_id().is_none());
}

#[test]
fn test_object_streams_with_xref_stream() {
    init_tracing();
    let config = Configuration {
        write_object_streams: true,
        write_xref_stream: true,
        ..Configuration::default()
    };
    let out = rewrite(&pages_document(&[100, 200, 300]), config);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("/ObjStm"));
    assert!(text.contains("/Type /XRef"));
    assert!(!text.contains("\nxref\n"));
    assert!(text.starts_with("%PDF-1.5"));

    let mut ctx = open(&out);
    assert_eq!(widths(&mut ctx), vec![100.0, 200.0, 300.0]);
    let again = write_to_vec(&mut ctx).unwrap();
    assert_eq!(widths(&mut open(&again)), vec![100.0, 200.0, 300.0]);
}

#[test]
fn test_crlf_line_endings() {
    let config = Configuration {
        eol: Eol::CrLf,
        ..Configuration::default()
    };
    let out = rewrite(&pages_document(&[100]), config);
    assert!(out.windows(6).any(|w| w == b"\r\nxref"));
    assert!(out.windows(11).any(|w| w == b"startxref\r\n"));
    assert_eq!(widths(&mut open(&out)), vec![100.0]);
}

#[test]
fn test_id_kept_across_writes() {
    let input = PdfBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R] /Count 1>>")
        .object(3, "<</Type /Page /Parent 2 0 R /MediaBox [0 0 50 50]>>")
        .trailer("/ID [<00112233445566778899AABBCCDDEEFF> <00112233445566778899AABBCCDDEEFF>]")
        .build();
    let out = rewrite(&input, Configuration::default());
    let (first, _) = open(&out).file_id().unwrap();
    assert_eq!(hex::encode_upper(first), "00112233445566778899AABBCCDDEEFF");
}

#[test]
fn test_unreachable_objects_dropped() {
    let input = PdfBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R] /Count 1>>")
        .object(3, "<</Type /Page /Parent 2 0 R /MediaBox [0 0 50 50]>>")
        .object(4, "(orphan)")
        .build();
    let out = rewrite(&input, Configuration::default());
    assert!(!String::from_utf8_lossy(&out).contains("orphan"));
}

#[test]
fn test_open_from_reader_and_path() {
    let bytes = pages_document(&[100, 200]);
    let mut from_reader = Context::from_reader(Cursor::new(bytes.clone()), Configuration::default()).unwrap();
    assert_eq!(widths(&mut from_reader), vec![100.0, 200.0]);

    let path = std::env::temp_dir().join(format!("quire-roundtrip-{}.pdf", std::process::id()));
    std::fs::write(&path, &bytes).unwrap();
    let opened = Context::from_path(&path, Configuration::default());
    std::fs::remove_file(&path).unwrap();
    assert_eq!(widths(&mut opened.unwrap()), vec![100.0, 200.0]);
}

#[test]
fn test_damaged_xref_rebuilt() {
    let mut bytes = pages_document(&[100, 200]);
    let at = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    bytes.truncate(at);
    bytes.extend_from_slice(b"startxref\n999999\n%%EOF\n");
    let mut ctx = open(&bytes);
    assert!(ctx.rebuilt_xref);
    assert_eq!(widths(&mut ctx), vec![100.0, 200.0]);
}
