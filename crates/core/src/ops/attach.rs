//! Embedded files.
//!
//! Attachments live in the catalog's `/Names /EmbeddedFiles` name tree.
//! The tree is read in full (through intermediate `/Kids` nodes) and always
//! written back as a single flat, sorted leaf.

use crate::dict;
use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, Object, Stream};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const MAX_TREE_DEPTH: usize = 32;

/// A file embedded in, or about to be embedded in, a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub description: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            description: None,
            data,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// MIME type from the file extension, stored as the stream /Subtype.
    pub fn mime_type(&self) -> &'static str {
        let lower = self.name.to_ascii_lowercase();
        let ext = lower.rsplit_once('.').map_or("", |(_, ext)| ext);
        match ext {
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            "xml" => "application/xml",
            "json" => "application/json",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "zip" => "application/zip",
            _ => "application/octet-stream",
        }
    }
}

/// One entry of an attachment listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub name: String,
    pub description: Option<String>,
    /// Uncompressed size from /Params, when recorded.
    pub size: Option<u64>,
}

/// Name tree entries in key order.
fn read_tree(ctx: &mut Context) -> Result<BTreeMap<String, Object>> {
    let mut entries = BTreeMap::new();
    let catalog = ctx.catalog()?;
    let names = catalog.get("Names").cloned().unwrap_or(Object::Null);
    let Some(names) = ctx.dict_opt(&names)? else {
        return Ok(entries);
    };
    let node = ctx.resolve_key(&names, "EmbeddedFiles")?;
    collect_node(ctx, &node, 0, &mut entries)?;
    Ok(entries)
}

fn collect_node(
    ctx: &mut Context,
    node: &Object,
    depth: usize,
    entries: &mut BTreeMap<String, Object>,
) -> Result<()> {
    if depth > MAX_TREE_DEPTH {
        warn!(depth, "embedded files tree too deep, truncated");
        return Ok(());
    }
    let Some(node) = ctx.dict_opt(node)? else {
        return Ok(());
    };
    if let Some(names) = node.get("Names") {
        let names = ctx.dereference_array(names)?;
        for pair in names.chunks(2) {
            let [key, value] = pair else {
                warn!("odd-length /Names array in embedded files tree");
                break;
            };
            let key = ctx.resolve(key)?;
            let key = decode_text(key.as_string()?);
            entries.insert(key, value.clone());
        }
    }
    if let Some(kids) = node.get("Kids") {
        for kid in ctx.dereference_array(kids)? {
            collect_node(ctx, &kid, depth + 1, entries)?;
        }
    }
    Ok(())
}

/// Replace the tree with one leaf holding `entries`; an empty map drops it.
fn write_tree(ctx: &mut Context, entries: BTreeMap<String, Object>) -> Result<()> {
    let mut catalog = ctx.catalog()?;
    let names_obj = catalog.get("Names").cloned().unwrap_or(Object::Null);
    let mut names = ctx.dict_opt(&names_obj)?.unwrap_or_default();
    if entries.is_empty() {
        names.remove("EmbeddedFiles");
    } else {
        let mut flat = Vec::with_capacity(entries.len() * 2);
        for (key, value) in entries {
            flat.push(Object::string(encode_text(&key)));
            flat.push(value);
        }
        names.insert("EmbeddedFiles", dict! { "Names" => flat });
    }
    match (names_obj, names.is_empty()) {
        (Object::Ref(r), false) => ctx.set_object(r, names),
        (_, true) => {
            catalog.remove("Names");
        }
        (_, false) => {
            catalog.insert("Names", names);
        }
    }
    let root = ctx.root;
    ctx.set_object(root, catalog);
    Ok(())
}

fn filespec_info(ctx: &mut Context, name: String, spec: &Object) -> Result<AttachmentInfo> {
    let spec = ctx.dict_opt(spec)?.unwrap_or_default();
    let description = match ctx.resolve_key(&spec, "Desc")? {
        Object::String(s) | Object::HexString(s) => Some(decode_text(&s)),
        _ => None,
    };
    let mut size = None;
    if let Some(file) = embedded_stream(ctx, &spec)? {
        let params = ctx.resolve_key(&file.dict, "Params")?;
        if let Object::Dict(params) = params {
            size = params.get_int("Size").and_then(|s| u64::try_from(s).ok());
        }
    }
    Ok(AttachmentInfo {
        name,
        description,
        size,
    })
}

/// The embedded file stream of a file specification, preferring /UF.
fn embedded_stream(ctx: &mut Context, spec: &Dict) -> Result<Option<Stream>> {
    let ef = spec.get("EF").cloned().unwrap_or(Object::Null);
    let Some(ef) = ctx.dict_opt(&ef)? else {
        return Ok(None);
    };
    for key in ["UF", "F"] {
        if let Some(obj) = ef.get(key) {
            return ctx.dereference_stream(obj).map(Some);
        }
    }
    Ok(None)
}

pub fn list_attachments(ctx: &mut Context) -> Result<Vec<AttachmentInfo>> {
    let entries = read_tree(ctx)?;
    let mut out = Vec::with_capacity(entries.len());
    for (name, spec) in entries {
        out.push(filespec_info(ctx, name, &spec)?);
    }
    Ok(out)
}

/// Embed `attachment`, replacing any attachment with the same name.
pub fn add_attachment(ctx: &mut Context, attachment: Attachment) -> Result<()> {
    if attachment.name.is_empty() {
        return Err(PdfError::Unsupported("attachment without a name".into()));
    }
    let stream = Stream::from_content(
        dict! {
            "Type" => Object::name("EmbeddedFile"),
            "Subtype" => Object::name(attachment.mime_type()),
            "Filter" => Object::name("FlateDecode"),
            "Params" => dict! { "Size" => attachment.data.len() },
        },
        attachment.data,
    );
    let file = ctx.add_object(stream);
    let encoded = Object::string(encode_text(&attachment.name));
    let mut spec = dict! {
        "Type" => Object::name("Filespec"),
        "F" => encoded.clone(),
        "UF" => encoded,
        "EF" => dict! { "F" => file, "UF" => file },
    };
    if let Some(desc) = &attachment.description {
        spec.insert("Desc", Object::string(encode_text(desc)));
    }
    let spec = ctx.add_object(spec);
    let mut entries = read_tree(ctx)?;
    entries.insert(attachment.name.clone(), Object::Ref(spec));
    write_tree(ctx, entries)?;
    debug!(name = %attachment.name, "added attachment");
    Ok(())
}

/// Remove the named attachments, or all of them when `names` is empty.
/// Returns how many were removed.
pub fn remove_attachments(ctx: &mut Context, names: &[String]) -> Result<usize> {
    let mut entries = read_tree(ctx)?;
    let before = entries.len();
    if names.is_empty() {
        entries.clear();
    } else {
        for name in names {
            if entries.remove(name).is_none() {
                warn!(%name, "no such attachment");
            }
        }
    }
    let removed = before - entries.len();
    write_tree(ctx, entries)?;
    Ok(removed)
}

/// Decoded contents of the named attachments, or all when `names` is empty.
pub fn extract_attachments(ctx: &mut Context, names: &[String]) -> Result<Vec<Attachment>> {
    let entries = read_tree(ctx)?;
    let mut out = Vec::new();
    for (name, spec) in entries {
        if !names.is_empty() && !names.contains(&name) {
            continue;
        }
        let info = filespec_info(ctx, name, &spec)?;
        let spec = ctx.dict_opt(&spec)?.unwrap_or_default();
        let Some(stream) = embedded_stream(ctx, &spec)? else {
            warn!(name = %info.name, "attachment has no embedded file stream");
            continue;
        };
        out.push(Attachment {
            name: info.name,
            description: info.description,
            data: stream.decoded_data()?.into_owned(),
        });
    }
    Ok(out)
}

/// PDF text string to Rust string: UTF-16BE with BOM, else Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Latin-1 when every char fits, UTF-16BE with BOM otherwise.
pub fn encode_text(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) < 0x100) {
        return text.chars().map(|c| c as u8).collect();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn names(ctx: &mut Context) -> Vec<String> {
        list_attachments(ctx)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect()
    }

    #[test]
    fn test_add_list_extract() {
        let mut ctx = Context::new(Configuration::default());
        add_attachment(&mut ctx, Attachment::new("b.txt", b"bravo".to_vec()).with_description("second")).unwrap();
        add_attachment(&mut ctx, Attachment::new("a.txt", b"alpha".to_vec())).unwrap();
        assert_eq!(names(&mut ctx), vec!["a.txt", "b.txt"]);

        let listed = list_attachments(&mut ctx).unwrap();
        assert_eq!(listed[1].description.as_deref(), Some("second"));
        assert_eq!(listed[1].size, Some(5));

        let got = extract_attachments(&mut ctx, &["b.txt".to_string()]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].data, b"bravo");
    }

    #[test]
    fn test_remove_named_then_all() {
        let mut ctx = Context::new(Configuration::default());
        for name in ["x", "y", "z"] {
            add_attachment(&mut ctx, Attachment::new(name, vec![1, 2, 3])).unwrap();
        }
        assert_eq!(remove_attachments(&mut ctx, &["y".to_string()]).unwrap(), 1);
        assert_eq!(names(&mut ctx), vec!["x", "z"]);
        assert_eq!(remove_attachments(&mut ctx, &[]).unwrap(), 2);
        assert!(names(&mut ctx).is_empty());
        assert!(ctx.catalog().unwrap().get("Names").is_none());
    }

    #[test]
    fn test_reads_nested_kids() {
        let mut ctx = Context::new(Configuration::default());
        let spec = ctx.add_object(dict! { "Type" => Object::name("Filespec") });
        let leaf = ctx.add_object(dict! { "Names" => vec![Object::string(b"deep".to_vec()), Object::Ref(spec)] });
        let mut catalog = ctx.catalog().unwrap();
        catalog.insert("Names", dict! { "EmbeddedFiles" => dict! { "Kids" => vec![Object::Ref(leaf)] } });
        let root = ctx.root;
        ctx.set_object(root, catalog);
        assert_eq!(names(&mut ctx), vec!["deep"]);
    }

    #[test]
    fn test_text_strings() {
        assert_eq!(decode_text(&encode_text("caf\u{e9}")), "caf\u{e9}");
        let wide = encode_text("\u{6587}");
        assert_eq!(&wide[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text(&wide), "\u{6587}");
    }
}
