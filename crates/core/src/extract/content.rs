//! Page content streams and XMP metadata.

use super::sanitize;
use crate::document::pages::page_refs;
use crate::error::Result;
use crate::model::Context;
use crate::model::objects::{ObjRef, Object};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// The concatenated content streams of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub page: usize,
    pub data: Vec<u8>,
}

impl ExtractedContent {
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}_Content_page_{}.txt", self.page)
    }
}

/// A metadata stream and the /Type of the object carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    /// Object number of the container.
    pub obj_nr: u32,
    pub container_type: String,
    pub data: Vec<u8>,
}

impl ExtractedMetadata {
    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{stem}_Metadata_{}_{}.xml",
            sanitize(&self.container_type),
            self.obj_nr
        )
    }
}

/// Decoded operators of each selected page; streams of an array are joined
/// by a newline.
pub fn extract_content(ctx: &mut Context, selected: &BTreeSet<usize>) -> Result<Vec<ExtractedContent>> {
    let pages = page_refs(ctx)?;
    let mut out = Vec::new();
    for &nr in selected {
        let Some(page) = pages.get(nr.wrapping_sub(1)) else {
            continue;
        };
        let streams = page.contents(ctx)?;
        if streams.is_empty() {
            debug!(page = nr, "page without content");
            continue;
        }
        out.push(ExtractedContent {
            page: nr,
            data: streams.join(&b'\n'),
        });
    }
    Ok(out)
}

/// Every /Metadata stream in the document, in object number order.
pub fn extract_metadata(ctx: &mut Context) -> Result<Vec<ExtractedMetadata>> {
    let mut out = Vec::new();
    for num in ctx.xref.in_use_numbers() {
        let obj = ctx.deref(ObjRef::new(num, 0))?;
        let Some(dict) = obj.dict_like() else { continue };
        let Some(meta) = dict.get("Metadata") else { continue };
        let container_type = dict.type_name().unwrap_or("unknown").to_string();
        let data = match ctx.resolve(meta)? {
            Object::Stream(s) => s.decoded_data()?.into_owned(),
            other => {
                warn!(obj = num, got = other.type_name(), "/Metadata is not a stream");
                continue;
            }
        };
        out.push(ExtractedMetadata {
            obj_nr: num,
            container_type,
            data,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dict;
    use crate::document::pages::{pages_root, set_kids};
    use crate::model::objects::{Dict, Stream};

    #[test]
    fn test_content_joins_streams() {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let a = ctx.add_object(Stream::from_content(Dict::new(), b"q".to_vec()));
        let b = ctx.add_object(Stream::from_content(Dict::new(), b"Q".to_vec()));
        let page = dict! {
            "Type" => Object::name("Page"),
            "Contents" => vec![Object::Ref(a), Object::Ref(b)],
        };
        let page = (ctx.add_object(page.clone()), page);
        set_kids(&mut ctx, root, vec![page]).unwrap();
        let got = extract_content(&mut ctx, &BTreeSet::from([1, 2])).unwrap();
        assert_eq!(got, vec![ExtractedContent { page: 1, data: b"q\nQ".to_vec() }]);
        assert_eq!(got[0].file_name("doc"), "doc_Content_page_1.txt");
    }

    #[test]
    fn test_metadata_labelled_by_container() {
        let mut ctx = Context::new(Configuration::default());
        let xmp = ctx.add_object(Stream::from_content(
            dict! { "Type" => Object::name("Metadata"), "Subtype" => Object::name("XML") },
            b"<x:xmpmeta/>".to_vec(),
        ));
        let mut catalog = ctx.catalog().unwrap();
        catalog.insert("Metadata", xmp);
        let root = ctx.root;
        ctx.set_object(root, catalog);
        ctx.add_object(dict! { "Metadata" => xmp });

        let got = extract_metadata(&mut ctx).unwrap();
        let types: Vec<_> = got.iter().map(|m| m.container_type.as_str()).collect();
        assert_eq!(types, vec!["Catalog", "unknown"]);
        assert_eq!(got[0].data, b"<x:xmpmeta/>");
    }
}
