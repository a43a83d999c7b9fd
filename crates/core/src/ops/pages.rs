//! Page tree edits: rotate, insert, remove, trim, split and merge.
//!
//! Edits that change the page list rebuild the tree as one flat /Pages
//! node; pages get their inherited attributes first.

use super::copy::{Copier, extract_pages};
use crate::dict;
use crate::document::pages::{page_refs, pages_root, rect_object, set_kids};
use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object};
use std::collections::BTreeSet;
use tracing::debug;

/// Add `degrees` to the rotation of every selected page.
pub fn rotate(ctx: &mut Context, selected: &BTreeSet<usize>, degrees: i64) -> Result<()> {
    if degrees % 90 != 0 {
        return Err(PdfError::Unsupported(format!(
            "rotation by {degrees} degrees, must be a multiple of 90"
        )));
    }
    let pages = page_refs(ctx)?;
    for (i, page) in pages.iter().enumerate() {
        if !selected.contains(&(i + 1)) {
            continue;
        }
        let rotation = (page.rotation(ctx)? + degrees).rem_euclid(360);
        let mut dict = ctx.dereference_dict(&Object::Ref(page.obj))?;
        dict.insert("Rotate", rotation);
        ctx.set_object(page.obj, dict);
    }
    debug!(pages = selected.len(), degrees, "rotated");
    Ok(())
}

/// Insert a blank page before (or after) each selected page. The blank
/// page takes its neighbour's media box.
pub fn insert_pages(ctx: &mut Context, selected: &BTreeSet<usize>, before: bool) -> Result<()> {
    let pages = page_refs(ctx)?;
    let root = pages_root(ctx)?;
    let mut kids = Vec::with_capacity(pages.len() + selected.len());
    for (i, page) in pages.iter().enumerate() {
        let flattened = (page.obj, page.flattened(ctx)?);
        if !selected.contains(&(i + 1)) {
            kids.push(flattened);
            continue;
        }
        let media_box = page.media_box(ctx)?;
        let blank = dict! {
            "Type" => Object::name("Page"),
            "Parent" => root,
            "MediaBox" => rect_object(media_box),
            "Resources" => Dict::new(),
        };
        let blank = (ctx.add_object(blank.clone()), blank);
        if before {
            kids.push(blank);
            kids.push(flattened);
        } else {
            kids.push(flattened);
            kids.push(blank);
        }
    }
    set_kids(ctx, root, kids)
}

/// Keep the pages for which `keep` holds; at least one must remain.
fn retain_pages(ctx: &mut Context, keep: impl Fn(usize) -> bool) -> Result<()> {
    let pages = page_refs(ctx)?;
    let root = pages_root(ctx)?;
    let mut kids: Vec<(ObjRef, Dict)> = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if keep(i + 1) {
            kids.push((page.obj, page.flattened(ctx)?));
        }
    }
    if kids.is_empty() {
        return Err(PdfError::Selection("no pages would remain".into()));
    }
    set_kids(ctx, root, kids)
}

pub fn remove_pages(ctx: &mut Context, selected: &BTreeSet<usize>) -> Result<()> {
    retain_pages(ctx, |nr| !selected.contains(&nr))
}

/// Keep only the selected pages.
pub fn trim(ctx: &mut Context, selected: &BTreeSet<usize>) -> Result<()> {
    retain_pages(ctx, |nr| selected.contains(&nr))
}

/// Split into documents of `span` pages each; the last may be shorter.
/// Each part is labelled with its first page number.
pub fn split(ctx: &mut Context, span: usize) -> Result<Vec<(usize, Context)>> {
    if span == 0 {
        return Err(PdfError::Selection("split span must be at least 1".into()));
    }
    let count = page_refs(ctx)?.len();
    let numbers: Vec<usize> = (1..=count).collect();
    numbers
        .chunks(span)
        .map(|chunk| Ok((chunk[0], extract_pages(ctx, chunk, false)?)))
        .collect()
}

/// Append every page of `src` to `dest`.
pub fn merge(dest: &mut Context, src: &mut Context) -> Result<()> {
    let existing = page_refs(dest)?;
    let root = pages_root(dest)?;
    let mut kids = Vec::new();
    for page in &existing {
        kids.push((page.obj, page.flattened(dest)?));
    }
    let mut copier = Copier::new();
    for page in page_refs(src)? {
        kids.push(copier.copy_page(src, dest, &page, root, false)?);
    }
    if src.version > dest.version {
        dest.version = src.version;
    }
    debug!(pages = kids.len(), copied = copier.translated(), "merged");
    set_kids(dest, root, kids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::document::pages::page_count;

    fn doc(n: usize) -> Context {
        let mut ctx = Context::new(Configuration::default());
        let root = pages_root(&mut ctx).unwrap();
        let kids = (0..n)
            .map(|i| {
                let d = dict! {
                    "Type" => Object::name("Page"),
                    "MediaBox" => rect_object([0.0, 0.0, 100.0 + i as f64, 100.0]),
                };
                (ctx.add_object(d.clone()), d)
            })
            .collect();
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
    fn test_rotate_adds_to_effective_rotation() {
        let mut ctx = doc(2);
        rotate(&mut ctx, &BTreeSet::from([1]), 270).unwrap();
        rotate(&mut ctx, &BTreeSet::from([1]), 180).unwrap();
        let pages = page_refs(&mut ctx).unwrap();
        assert_eq!(pages[0].rotation(&mut ctx).unwrap(), 90);
        assert_eq!(pages[1].rotation(&mut ctx).unwrap(), 0);
        assert!(rotate(&mut ctx, &BTreeSet::from([1]), 45).is_err());
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut ctx = doc(2);
        insert_pages(&mut ctx, &BTreeSet::from([2]), true).unwrap();
        assert_eq!(widths(&mut ctx), vec![100.0, 101.0, 101.0]);
        insert_pages(&mut ctx, &BTreeSet::from([1]), false).unwrap();
        assert_eq!(page_count(&mut ctx).unwrap(), 4);
    }

    #[test]
    fn test_remove_and_trim() {
        let mut ctx = doc(4);
        remove_pages(&mut ctx, &BTreeSet::from([1, 3])).unwrap();
        assert_eq!(widths(&mut ctx), vec![101.0, 103.0]);
        trim(&mut ctx, &BTreeSet::from([2])).unwrap();
        assert_eq!(widths(&mut ctx), vec![103.0]);
        assert!(matches!(remove_pages(&mut ctx, &BTreeSet::from([1])), Err(PdfError::Selection(_))));
    }

    #[test]
    fn test_split_and_merge() {
        let mut ctx = doc(5);
        let mut parts = split(&mut ctx, 2).unwrap();
        assert_eq!(parts.iter().map(|(first, _)| *first).collect::<Vec<_>>(), vec![1, 3, 5]);
        let (_, mut last) = parts.pop().unwrap();
        let (_, mut first) = parts.remove(0);
        merge(&mut first, &mut last).unwrap();
        assert_eq!(widths(&mut first), vec![100.0, 101.0, 104.0]);
    }
}
