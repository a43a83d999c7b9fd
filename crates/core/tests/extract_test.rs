mod common;

use common::{PdfBuilder, config, pages_document};
use quire_core::extract::ImageFormat;
use quire_core::ops::Attachment;
use quire_core::{Command, Output, Params, process};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn run(input: Vec<u8>, command: Command, params: &Params) -> Output {
    process([input], params, &config(command)).unwrap()
}

fn image_document() -> Vec<u8> {
    let jpeg = b"\xFF\xD8\xFF\xE0fake jpeg body\xFF\xD9";
    PdfBuilder::new()
        .object(1, "<</Type /Catalog /Pages 2 0 R /Metadata 20 0 R>>")
        .object(2, "<</Type /Pages /Kids [3 0 R 4 0 R] /Count 2>>")
        .object(
            3,
            "<</Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Resources <</XObject <</Photo 10 0 R>>>>>>",
        )
        .object(
            4,
            "<</Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Resources <</XObject <</Photo 10 0 R /Ramp 11 0 R>>>>>>",
        )
        .stream(
            10,
            "/Type /XObject /Subtype /Image /Width 4 /Height 4 /BitsPerComponent 8 /ColorSpace /DeviceRGB /Filter /DCTDecode",
            jpeg,
        )
        .stream(
            11,
            "/Type /XObject /Subtype /Image /Width 3 /Height 1 /BitsPerComponent 8 /ColorSpace /DeviceGray",
            &[0, 128, 255],
        )
        .stream(20, "/Type /Metadata /Subtype /XML", b"<x:xmpmeta/>")
        .build()
}

#[test]
fn test_extract_content_of_selected_pages() {
    let params = Params {
        selection: Some("2-3".into()),
        ..Params::default()
    };
    let Output::Contents(contents) = run(pages_document(&[10, 20, 30]), Command::ExtractContent, &params) else {
        panic!("expected contents");
    };
    let pages: Vec<usize> = contents.iter().map(|c| c.page).collect();
    assert_eq!(pages, vec![2, 3]);
    assert_eq!(contents[0].data, b"BT (2) Tj ET");
    assert_eq!(contents[0].file_name("in"), "in_Content_page_2.txt");
}

#[test]
fn test_extract_images_once_each() {
    let Output::Images(images) = run(image_document(), Command::ExtractImages, &Params::default()) else {
        panic!("expected images");
    };
    assert_eq!(images.len(), 2);

    let photo = images.iter().find(|i| i.resource_name == "Photo").unwrap();
    assert_eq!(photo.format, ImageFormat::Jpeg);
    assert_eq!(photo.page, 1);
    assert!(photo.data.starts_with(b"\xFF\xD8"));
    assert_eq!(photo.file_name("doc"), "doc_1_Photo.jpg");

    let ramp = images.iter().find(|i| i.resource_name == "Ramp").unwrap();
    assert_eq!(ramp.format, ImageFormat::Png);
    assert_eq!(ramp.page, 2);
    assert!(ramp.data.starts_with(PNG_SIGNATURE));
}

#[test]
fn test_extract_images_respects_selection() {
    let params = Params {
        selection: Some("1".into()),
        ..Params::default()
    };
    let Output::Images(images) = run(image_document(), Command::ExtractImages, &params) else {
        panic!("expected images");
    };
    let names: Vec<&str> = images.iter().map(|i| i.resource_name.as_str()).collect();
    assert_eq!(names, vec!["Photo"]);
}

#[test]
fn test_extract_metadata() {
    let Output::Metadata(found) = run(image_document(), Command::ExtractMetadata, &Params::default()) else {
        panic!("expected metadata");
    };
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].container_type, "Catalog");
    assert_eq!(found[0].data, b"<x:xmpmeta/>");
}

#[test]
fn test_attachment_lifecycle() {
    let add = Params {
        attachments: vec![
            Attachment::new("notes.txt", b"remember the milk".to_vec()).with_description("shopping"),
            Attachment::new("data.bin", vec![0, 1, 2, 3]),
        ],
        ..Params::default()
    };
    let Output::Documents(docs) = run(pages_document(&[10]), Command::AddAttachments, &add) else {
        panic!("expected documents");
    };
    let with_files = docs[0].data.clone();

    let Output::Listing(lines) = run(with_files.clone(), Command::ListAttachments, &Params::default()) else {
        panic!("expected a listing");
    };
    assert_eq!(lines, vec!["data.bin".to_string(), "notes.txt (shopping)".to_string()]);

    let pick = Params {
        names: vec!["notes.txt".into()],
        ..Params::default()
    };
    let Output::Attachments(found) = run(with_files.clone(), Command::ExtractAttachments, &pick) else {
        panic!("expected attachments");
    };
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].data, b"remember the milk");
    assert_eq!(found[0].description.as_deref(), Some("shopping"));

    let Output::Documents(docs) = run(with_files, Command::RemoveAttachments, &pick) else {
        panic!("expected documents");
    };
    let Output::Listing(lines) = run(docs[0].data.clone(), Command::ListAttachments, &Params::default()) else {
        panic!("expected a listing");
    };
    assert_eq!(lines, vec!["data.bin".to_string()]);
}
