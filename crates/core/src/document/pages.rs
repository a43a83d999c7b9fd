//! Page tree traversal.
//!
//! Pages are found by a depth-first walk from the catalog's /Pages node.
//! Attributes that a page may inherit (/Resources, /MediaBox, /CropBox and
//! /Rotate) are tracked along the walk as a chain of [`InheritedNode`]s.

use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::warn;

/// Page attributes a leaf may take from its ancestors.
pub const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// US Letter, used when no /MediaBox is found anywhere.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

#[derive(Debug, Default)]
struct InheritedNode {
    parent: Option<Arc<InheritedNode>>,
    attrs: Dict,
}

impl InheritedNode {
    fn from_dict(parent: Option<Arc<InheritedNode>>, dict: &Dict) -> Arc<Self> {
        let attrs = INHERITABLE
            .iter()
            .filter_map(|k| dict.get(k).map(|v| (k.to_string(), v.clone())))
            .collect();
        Arc::new(Self { parent, attrs })
    }

    fn resolve(&self, key: &str) -> Option<&Object> {
        self.attrs
            .get(key)
            .or_else(|| self.parent.as_ref().and_then(|p| p.resolve(key)))
    }
}

/// A leaf of the page tree.
#[derive(Debug, Clone)]
pub struct PageRef {
    pub obj: ObjRef,
    inherited: Arc<InheritedNode>,
}

impl PageRef {
    /// Value inherited from an ancestor node, ignoring the page itself.
    pub fn inherited(&self, key: &str) -> Option<&Object> {
        self.inherited.resolve(key)
    }

    /// The page dictionary with every inheritable attribute made explicit.
    pub fn flattened(&self, ctx: &mut Context) -> Result<Dict> {
        let mut dict = ctx.dereference_dict(&Object::Ref(self.obj))?;
        for key in INHERITABLE {
            if !dict.contains_key(key)
                && let Some(v) = self.inherited(key)
            {
                dict.insert(key, v.clone());
            }
        }
        Ok(dict)
    }

    /// Look up `key` on the page, then its ancestors; resolved.
    pub fn attr(&self, ctx: &mut Context, key: &str) -> Result<Object> {
        let dict = ctx.dereference_dict(&Object::Ref(self.obj))?;
        match dict.get(key).or_else(|| self.inherited(key)) {
            Some(v) => ctx.resolve(v),
            None => Ok(Object::Null),
        }
    }

    pub fn media_box(&self, ctx: &mut Context) -> Result<[f64; 4]> {
        let value = self.attr(ctx, "MediaBox")?;
        Ok(parse_rect(ctx, &value).unwrap_or(DEFAULT_MEDIA_BOX))
    }

    /// Effective rotation, normalized to 0, 90, 180 or 270.
    pub fn rotation(&self, ctx: &mut Context) -> Result<i64> {
        let r = self.attr(ctx, "Rotate")?.as_int().unwrap_or(0);
        Ok(r.rem_euclid(360) / 90 * 90)
    }

    /// Resolved resource dictionary, empty when absent.
    pub fn resources(&self, ctx: &mut Context) -> Result<Dict> {
        let value = self.attr(ctx, "Resources")?;
        Ok(match value {
            Object::Dict(d) => d,
            _ => Dict::new(),
        })
    }

    /// Decoded content streams, in order.
    pub fn contents(&self, ctx: &mut Context) -> Result<Vec<Vec<u8>>> {
        let dict = ctx.dereference_dict(&Object::Ref(self.obj))?;
        let Some(contents) = dict.get("Contents") else {
            return Ok(Vec::new());
        };
        let items = match ctx.resolve(contents)? {
            Object::Array(items) => items,
            Object::Null => Vec::new(),
            _ => vec![contents.clone()],
        };
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            match ctx.resolve(item)? {
                Object::Stream(s) => out.push(s.decoded_data()?.into_owned()),
                Object::Null => {}
                other => {
                    return Err(PdfError::TypeError {
                        expected: "stream",
                        got: other.type_name(),
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Parse a rectangle array, normalizing corner order.
pub fn parse_rect(ctx: &mut Context, value: &Object) -> Option<[f64; 4]> {
    let items = ctx.dereference_array(value).ok()?;
    if items.len() != 4 {
        return None;
    }
    let mut r = [0.0; 4];
    for (slot, item) in r.iter_mut().zip(&items) {
        *slot = ctx.resolve(item).ok()?.as_num().ok()?;
    }
    Some([r[0].min(r[2]), r[1].min(r[3]), r[0].max(r[2]), r[1].max(r[3])])
}

pub fn rect_object(r: [f64; 4]) -> Object {
    Object::Array(r.iter().map(|v| number(*v)).collect())
}

/// Integers are written without a fractional part.
pub fn number(v: f64) -> Object {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Object::Int(v as i64)
    } else {
        Object::Real(v)
    }
}

/// Reference of the root /Pages node.
pub fn pages_root(ctx: &mut Context) -> Result<ObjRef> {
    let catalog = ctx.catalog()?;
    catalog
        .get_ref("Pages")
        .ok_or_else(|| PdfError::validation("Root.Pages", "missing page tree root"))
}

/// All pages in document order.
pub fn page_refs(ctx: &mut Context) -> Result<Vec<PageRef>> {
    let root = pages_root(ctx)?;
    let mut stack = vec![(root, Arc::new(InheritedNode::default()))];
    let mut visited = FxHashSet::default();
    let mut pages = Vec::new();

    while let Some((obj, parent)) = stack.pop() {
        let Some(dict) = ctx.dict_opt(&Object::Ref(obj))? else {
            warn!(obj = %obj, "page tree node is not a dictionary");
            continue;
        };
        let is_node = dict.has_type("Pages") || (dict.type_name().is_none() && dict.contains_key("Kids"));
        if !is_node {
            pages.push(PageRef { obj, inherited: parent });
            continue;
        }
        if !visited.insert(obj.num) {
            warn!(obj = %obj, "page tree cycle");
            continue;
        }
        let inherited = InheritedNode::from_dict(Some(parent), &dict);
        let kids = match dict.get("Kids") {
            Some(k) => ctx.dereference_array(k).unwrap_or_default(),
            None => Vec::new(),
        };
        for kid in kids.iter().rev() {
            if let Object::Ref(r) = kid {
                stack.push((*r, Arc::clone(&inherited)));
            }
        }
    }
    Ok(pages)
}

pub fn page_count(ctx: &mut Context) -> Result<usize> {
    Ok(page_refs(ctx)?.len())
}

/// The page with 1-based number `page_nr`.
pub fn page_ref(ctx: &mut Context, page_nr: usize) -> Result<PageRef> {
    let pages = page_refs(ctx)?;
    let count = pages.len();
    pages
        .into_iter()
        .nth(page_nr.wrapping_sub(1))
        .ok_or_else(|| PdfError::Selection(format!("page {page_nr} out of range 1-{count}")))
}

/// Replace the page tree with a single flat /Pages node holding `pages`.
///
/// Inherited attributes are copied onto each page first so nothing is lost
/// when intermediate nodes drop out.
pub fn rebuild_page_tree(ctx: &mut Context, pages: &[PageRef]) -> Result<()> {
    let root = pages_root(ctx)?;
    let mut flattened = Vec::with_capacity(pages.len());
    for page in pages {
        flattened.push((page.obj, page.flattened(ctx)?));
    }
    set_kids(ctx, root, flattened)
}

/// Store `pages` (already flattened) as the kids of `root`.
pub(crate) fn set_kids(ctx: &mut Context, root: ObjRef, pages: Vec<(ObjRef, Dict)>) -> Result<()> {
    let mut kids = Vec::with_capacity(pages.len());
    for (obj, mut dict) in pages {
        dict.insert("Parent", root);
        ctx.set_object(obj, dict);
        kids.push(Object::Ref(obj));
    }
    let mut node = ctx.dereference_dict(&Object::Ref(root))?;
    let count = kids.len();
    node.insert("Kids", kids);
    node.insert("Count", count);
    for key in INHERITABLE {
        node.remove(key);
    }
    ctx.set_object(root, node);
    ctx.page_count = count;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dict;

    fn two_level_doc() -> (Context, ObjRef) {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let inner = ctx.add_object(dict! {
            "Type" => Object::name("Pages"),
            "Parent" => root,
            "Rotate" => 90,
            "Count" => 1,
        });
        let leaf = ctx.add_object(dict! { "Type" => Object::name("Page"), "Parent" => inner });
        let mut inner_dict = ctx.dereference_dict(&Object::Ref(inner)).unwrap();
        inner_dict.insert("Kids", vec![Object::Ref(leaf)]);
        ctx.set_object(inner, inner_dict);
        let mut root_dict = ctx.dereference_dict(&Object::Ref(root)).unwrap();
        root_dict.insert("Kids", vec![Object::Ref(inner)]);
        root_dict.insert("Count", 1);
        root_dict.insert("MediaBox", rect_object([0.0, 0.0, 200.0, 100.0]));
        ctx.set_object(root, root_dict);
        (ctx, leaf)
    }

    #[test]
    fn test_inherited_attributes_resolve_through_ancestors() {
        let (mut ctx, leaf) = two_level_doc();
        let pages = page_refs(&mut ctx).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].obj, leaf);
        assert_eq!(pages[0].rotation(&mut ctx).unwrap(), 90);
        assert_eq!(pages[0].media_box(&mut ctx).unwrap(), [0.0, 0.0, 200.0, 100.0]);
    }

    #[test]
    fn test_rebuild_flattens_inherited_attributes() {
        let (mut ctx, leaf) = two_level_doc();
        let pages = page_refs(&mut ctx).unwrap();
        rebuild_page_tree(&mut ctx, &pages).unwrap();
        let page = ctx.dereference_dict(&Object::Ref(leaf)).unwrap();
        assert_eq!(page.get_int("Rotate"), Some(90));
        assert!(page.contains_key("MediaBox"));
        assert_eq!(page.get_ref("Parent"), Some(pages_root(&mut ctx).unwrap()));
    }

    #[test]
    fn test_page_ref_out_of_range() {
        let (mut ctx, _) = two_level_doc();
        assert!(matches!(page_ref(&mut ctx, 2), Err(PdfError::Selection(_))));
        assert!(matches!(page_ref(&mut ctx, 0), Err(PdfError::Selection(_))));
    }
}
