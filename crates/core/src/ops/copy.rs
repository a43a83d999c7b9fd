//! Copying pages between contexts.
//!
//! A [`Copier`] moves an object graph from one context into another,
//! allocating fresh numbers in the destination and remembering the
//! translation so shared objects are copied once. Page and page tree
//! dictionaries are never pulled in through references; pages are only
//! copied explicitly, with their inherited attributes flattened.

use crate::document::pages::{PageRef, page_refs, pages_root, set_kids};
use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object, Stream};
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Copier {
    /// Source object number to destination reference.
    map: FxHashMap<u32, ObjRef>,
    /// First copy of each source page.
    pages: FxHashMap<u32, ObjRef>,
}

impl Copier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of source objects copied so far.
    pub fn translated(&self) -> usize {
        self.map.len()
    }

    /// Deep-copy `obj` from `src` into `dest`.
    pub fn copy(&mut self, src: &mut Context, dest: &mut Context, obj: &Object) -> Result<Object> {
        Ok(match obj {
            Object::Ref(r) => self.copy_ref(src, dest, *r)?,
            Object::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.copy(src, dest, item)?);
                }
                Object::Array(out)
            }
            Object::Dict(d) => Object::Dict(self.copy_dict(src, dest, d)?),
            Object::Stream(s) => Object::Stream(Box::new(Stream {
                dict: self.copy_dict(src, dest, &s.dict)?,
                data: s.data.clone(),
                decoded: s.decoded,
            })),
            other => other.clone(),
        })
    }

    fn copy_dict(&mut self, src: &mut Context, dest: &mut Context, dict: &Dict) -> Result<Dict> {
        let mut out = Dict::new();
        for (key, value) in dict {
            out.insert(key.clone(), self.copy(src, dest, value)?);
        }
        Ok(out)
    }

    fn copy_ref(&mut self, src: &mut Context, dest: &mut Context, r: ObjRef) -> Result<Object> {
        if let Some(target) = self.map.get(&r.num) {
            return Ok(Object::Ref(*target));
        }
        let target = src.deref(r)?;
        if target.is_null() {
            return Ok(Object::Null);
        }
        // Pages reached through /P, /Dest and the like are not followed.
        if target
            .dict_like()
            .is_some_and(|d| d.has_type("Page") || d.has_type("Pages"))
        {
            return Ok(Object::Null);
        }
        let new = dest.add_object(Object::Null);
        self.map.insert(r.num, new);
        let copied = self.copy(src, dest, &target)?;
        dest.set_object(new, copied);
        Ok(Object::Ref(new))
    }

    /// Copy one page, parented to `parent`; returns the new page.
    ///
    /// With `use_cache`, a page copied before is cloned from its first copy
    /// and shares that copy's content and resources.
    pub fn copy_page(
        &mut self,
        src: &mut Context,
        dest: &mut Context,
        page: &PageRef,
        parent: ObjRef,
        use_cache: bool,
    ) -> Result<(ObjRef, Dict)> {
        if use_cache
            && let Some(first) = self.pages.get(&page.obj.num).copied()
        {
            let dict = dest.dereference_dict(&Object::Ref(first))?;
            let new = dest.add_object(dict.clone());
            return Ok((new, dict));
        }
        let flattened = page.flattened(src)?;
        let new = dest.add_object(Object::Null);
        self.pages.entry(page.obj.num).or_insert(new);
        // Annotations point back at their page through /P.
        self.map.entry(page.obj.num).or_insert(new);
        let mut dict = Dict::new();
        for (key, value) in &flattened {
            if key == "Parent" {
                continue;
            }
            dict.insert(key.clone(), self.copy(src, dest, value)?);
        }
        dict.insert("Parent", parent);
        dest.set_object(new, dict.clone());
        Ok((new, dict))
    }
}

/// A new document made of `pages` (1-based) of `src`, in the given order.
///
/// Repeated page numbers produce repeated pages. Without `use_cache` every
/// copy gets its own translation, so repeats do not share resources.
pub fn extract_pages(src: &mut Context, pages: &[usize], use_cache: bool) -> Result<Context> {
    let all = page_refs(src)?;
    let mut dest = Context::new(src.config.clone());
    dest.version = src.version;
    dest.encrypt = src.encrypt.clone();
    let root = pages_root(&mut dest)?;
    let mut copier = Copier::new();
    let mut kids = Vec::with_capacity(pages.len());
    for &nr in pages {
        let page = all
            .get(nr.wrapping_sub(1))
            .ok_or_else(|| PdfError::Selection(format!("page {nr} out of range 1-{}", all.len())))?;
        if !use_cache {
            copier = Copier::new();
        }
        kids.push(copier.copy_page(src, &mut dest, page, root, use_cache)?);
    }
    set_kids(&mut dest, root, kids)?;
    debug!(pages = pages.len(), objects = dest.xref.in_use_numbers().len(), "extracted pages");
    Ok(dest)
}

/// Pages in exactly the given order, repeats sharing their resources.
pub fn collect(src: &mut Context, pages: &[usize]) -> Result<Context> {
    extract_pages(src, pages, true)
}

/// One single-page document per selected page.
pub fn extract_each_page(src: &mut Context, pages: &[usize]) -> Result<Vec<(usize, Context)>> {
    pages
        .iter()
        .map(|&nr| Ok((nr, extract_pages(src, &[nr], false)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dict;
    use crate::document::pages::{page_count, rect_object};

    fn sample(widths: &[f64]) -> Context {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let font = ctx.add_object(dict! { "Type" => Object::name("Font"), "Subtype" => Object::name("Type1"), "BaseFont" => Object::name("Helvetica") });
        let mut kids = Vec::new();
        for w in widths {
            let content = ctx.add_object(Stream::from_content(Dict::new(), b"BT ET".to_vec()));
            let page = ctx.add_object(dict! {
                "Type" => Object::name("Page"),
                "Parent" => root,
                "MediaBox" => rect_object([0.0, 0.0, *w, 100.0]),
                "Contents" => content,
                "Resources" => dict! { "Font" => dict! { "F1" => font } },
            });
            kids.push((page, ctx.dereference_dict(&Object::Ref(page)).unwrap()));
        }
        set_kids(&mut ctx, root, kids).unwrap();
        ctx
    }

    fn widths(ctx: &mut Context) -> Vec<f64> {
        page_refs(ctx)
            .unwrap()
            .iter()
            .map(|p| p.media_box(ctx).unwrap()[2])
            .collect()
    }

    #[test]
    fn test_extract_single_page() {
        let mut src = sample(&[10.0, 20.0, 30.0]);
        let mut out = extract_pages(&mut src, &[2], false).unwrap();
        assert_eq!(page_count(&mut out).unwrap(), 1);
        assert_eq!(widths(&mut out), vec![20.0]);
    }

    #[test]
    fn test_collect_keeps_order_and_repeats() {
        let mut src = sample(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let mut out = collect(&mut src, &[3, 1, 3, 2]).unwrap();
        assert_eq!(widths(&mut out), vec![30.0, 10.0, 30.0, 20.0]);
    }

    #[test]
    fn test_shared_font_copied_once() {
        let mut src = sample(&[10.0, 20.0]);
        let mut out = collect(&mut src, &[1, 2]).unwrap();
        let pages = page_refs(&mut out).unwrap();
        let f0 = pages[0].resources(&mut out).unwrap();
        let f1 = pages[1].resources(&mut out).unwrap();
        assert_eq!(f0.get("Font"), f1.get("Font"));
    }

    #[test]
    fn test_out_of_range_page() {
        let mut src = sample(&[10.0]);
        assert!(matches!(extract_pages(&mut src, &[2], true), Err(PdfError::Selection(_))));
    }
}
