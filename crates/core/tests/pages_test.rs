mod common;

use common::{config, open, pages_document, widths};
use quire_core::document::{page_count, page_refs};
use quire_core::{Command, Output, Params, PdfError, WrittenDocument, process};

fn run(input: Vec<u8>, command: Command, params: Params) -> Vec<WrittenDocument> {
    match process([input], &params, &config(command)).unwrap() {
        Output::Documents(docs) => docs,
        other => panic!("expected documents, got {other:?}"),
    }
}

fn selecting(expr: &str) -> Params {
    Params {
        selection: Some(expr.to_string()),
        ..Params::default()
    }
}

#[test]
fn test_trim_with_exclusion() {
    let docs = run(pages_document(&[10, 20, 30, 40]), Command::Trim, selecting("1-3,!2"));
    let mut ctx = open(&docs[0].data);
    assert_eq!(widths(&mut ctx), vec![10.0, 30.0]);
}

#[test]
fn test_remove_odd_pages() {
    let docs = run(pages_document(&[10, 20, 30, 40, 50]), Command::RemovePages, selecting("odd"));
    let mut ctx = open(&docs[0].data);
    assert_eq!(widths(&mut ctx), vec![20.0, 40.0]);
}

#[test]
fn test_removing_every_page_fails() {
    let result = process(
        [pages_document(&[10, 20])],
        &selecting("1-"),
        &config(Command::RemovePages),
    );
    assert!(matches!(result, Err(PdfError::Selection(_))));
}

#[test]
fn test_selection_past_the_end() {
    let result = process([pages_document(&[10, 20])], &selecting("2-5"), &config(Command::Trim));
    assert!(matches!(result, Err(PdfError::Selection(_))));

    let tolerant = Params {
        allow_out_of_range: true,
        ..selecting("2-5")
    };
    let docs = run(pages_document(&[10, 20]), Command::Trim, tolerant);
    let mut ctx = open(&docs[0].data);
    assert_eq!(widths(&mut ctx), vec![20.0]);
}

#[test]
fn test_rotate_even_pages() {
    let params = Params {
        rotation: -90,
        ..selecting("even")
    };
    let docs = run(pages_document(&[10, 20, 30]), Command::Rotate, params);
    let mut ctx = open(&docs[0].data);
    let rotations: Vec<i64> = page_refs(&mut ctx)
        .unwrap()
        .iter()
        .map(|p| p.rotation(&mut ctx).unwrap())
        .collect();
    assert_eq!(rotations, vec![0, 270, 0]);
}

#[test]
fn test_rotate_by_odd_angle_fails() {
    let params = Params {
        rotation: 45,
        ..Params::default()
    };
    let result = process([pages_document(&[10])], &params, &config(Command::Rotate));
    assert!(matches!(result, Err(PdfError::Unsupported(_))));
}

#[test]
fn test_insert_blank_pages_after() {
    let params = Params {
        before: false,
        ..selecting("1")
    };
    let docs = run(pages_document(&[10, 20]), Command::InsertPages, params);
    let mut ctx = open(&docs[0].data);
    assert_eq!(widths(&mut ctx), vec![10.0, 10.0, 20.0]);
    let blank = &page_refs(&mut ctx).unwrap()[1];
    assert!(blank.contents(&mut ctx).unwrap().is_empty());
}

#[test]
fn test_split_into_labelled_parts() {
    let params = Params {
        span: 2,
        ..Params::default()
    };
    let docs = run(pages_document(&[10, 20, 30, 40, 50]), Command::Split, params);
    let labels: Vec<Option<usize>> = docs.iter().map(|d| d.label).collect();
    assert_eq!(labels, vec![Some(1), Some(3), Some(5)]);

    let mut last = open(&docs[2].data);
    assert_eq!(widths(&mut last), vec![50.0]);
    let mut first = open(&docs[0].data);
    assert_eq!(page_count(&mut first).unwrap(), 2);
}

#[test]
fn test_extract_pages_one_document_each() {
    let docs = run(pages_document(&[10, 20, 30]), Command::ExtractPages, selecting("1,3"));
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1].label, Some(3));
    let mut ctx = open(&docs[1].data);
    assert_eq!(widths(&mut ctx), vec![30.0]);
}

#[test]
fn test_merge_appends_in_order() {
    let inputs = [
        pages_document(&[10, 20]),
        pages_document(&[30]),
        pages_document(&[40, 50]),
    ];
    let out = process(inputs, &Params::default(), &config(Command::MergeCreate)).unwrap();
    let Output::Documents(docs) = out else {
        panic!("expected documents");
    };
    assert_eq!(docs.len(), 1);
    let mut ctx = open(&docs[0].data);
    assert_eq!(widths(&mut ctx), vec![10.0, 20.0, 30.0, 40.0, 50.0]);

    let contents: Vec<Vec<u8>> = page_refs(&mut ctx)
        .unwrap()
        .iter()
        .map(|p| p.contents(&mut ctx).unwrap().concat())
        .collect();
    assert_eq!(contents[2], b"BT (1) Tj ET");
    assert_eq!(contents[4], b"BT (2) Tj ET");
}
