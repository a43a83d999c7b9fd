//! Resource indexing and deduplication.
//!
//! Every page's /Font and image /XObject resources are indexed, following
//! form XObjects down to their own resources. Fonts and images whose
//! content hashes match are folded onto the lowest object number; every
//! reference in the document is rewritten and the duplicates are freed.

use crate::document::pages::page_refs;
use crate::error::Result;
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object};
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Reference chains deeper than this hash as opaque references.
const MAX_HASH_DEPTH: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontRecord {
    pub base_font: String,
    pub subtype: String,
    /// Carries a /FontFile, /FontFile2 or /FontFile3.
    pub embedded: bool,
    pub resource_names: BTreeSet<String>,
    pub pages: BTreeSet<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRecord {
    pub width: i64,
    pub height: i64,
    pub bits_per_component: i64,
    pub color_space: String,
    pub filters: Vec<String>,
    pub soft_mask: Option<u32>,
    pub resource_names: BTreeSet<String>,
    pub pages: BTreeSet<usize>,
}

/// What the optimizer learned about the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationState {
    pub fonts: BTreeMap<u32, FontRecord>,
    pub images: BTreeMap<u32, ImageRecord>,
    /// Font object numbers used by page n, at index n-1.
    pub page_fonts: Vec<BTreeSet<u32>>,
    pub page_images: Vec<BTreeSet<u32>>,
    /// Folded object number to the canonical one.
    pub duplicate_fonts: BTreeMap<u32, u32>,
    pub duplicate_images: BTreeMap<u32, u32>,
}

impl OptimizationState {
    pub fn is_indexed(&self) -> bool {
        !self.page_fonts.is_empty() || !self.page_images.is_empty()
    }
}

/// Rebuild the per-page font and image indexes.
pub fn index_resources(ctx: &mut Context) -> Result<()> {
    let pages = page_refs(ctx)?;
    let mut state = OptimizationState {
        duplicate_fonts: std::mem::take(&mut ctx.optimize.duplicate_fonts),
        duplicate_images: std::mem::take(&mut ctx.optimize.duplicate_images),
        ..Default::default()
    };
    for (i, page) in pages.iter().enumerate() {
        let page_nr = i + 1;
        let resources = page.resources(ctx)?;
        let mut fonts = BTreeSet::new();
        let mut images = BTreeSet::new();
        let mut forms = FxHashSet::default();
        collect_resources(ctx, &resources, page_nr, &mut state, &mut fonts, &mut images, &mut forms)?;
        state.page_fonts.push(fonts);
        state.page_images.push(images);
    }
    debug!(
        fonts = state.fonts.len(),
        images = state.images.len(),
        pages = pages.len(),
        "indexed resources"
    );
    ctx.optimize = state;
    Ok(())
}

fn collect_resources(
    ctx: &mut Context,
    resources: &Dict,
    page_nr: usize,
    state: &mut OptimizationState,
    fonts: &mut BTreeSet<u32>,
    images: &mut BTreeSet<u32>,
    forms: &mut FxHashSet<u32>,
) -> Result<()> {
    if let Some(font_dict) = resources.get("Font").cloned()
        && let Some(font_dict) = ctx.dict_opt(&font_dict)?
    {
        for (name, entry) in &font_dict {
            let Object::Ref(r) = entry else { continue };
            let Some(font) = ctx.dict_opt(entry)? else { continue };
            if !state.fonts.contains_key(&r.num) {
                let rec = font_record(ctx, &font)?;
                state.fonts.insert(r.num, rec);
            }
            let Some(record) = state.fonts.get_mut(&r.num) else { continue };
            record.resource_names.insert(name.clone());
            record.pages.insert(page_nr);
            fonts.insert(r.num);
        }
    }
    if let Some(xobjects) = resources.get("XObject").cloned()
        && let Some(xobjects) = ctx.dict_opt(&xobjects)?
    {
        for (name, entry) in &xobjects {
            let Object::Ref(r) = entry else { continue };
            let Object::Stream(stream) = ctx.resolve(entry)? else { continue };
            match stream.dict.get_name("Subtype") {
                Some("Image") => {
                    let record = state
                        .images
                        .entry(r.num)
                        .or_insert_with(|| image_record(&stream.dict));
                    record.resource_names.insert(name.clone());
                    record.pages.insert(page_nr);
                    images.insert(r.num);
                }
                Some("Form") if forms.insert(r.num) => {
                    if let Some(res) = stream.dict.get("Resources")
                        && let Some(res) = ctx.dict_opt(res)?
                    {
                        collect_resources(ctx, &res, page_nr, state, fonts, images, forms)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn font_record(ctx: &mut Context, font: &Dict) -> Result<FontRecord> {
    let descriptor = font_descriptor(ctx, font)?;
    let embedded = descriptor.is_some_and(|d| {
        ["FontFile", "FontFile2", "FontFile3"]
            .iter()
            .any(|k| d.contains_key(k))
    });
    Ok(FontRecord {
        base_font: font.get_name("BaseFont").unwrap_or("").to_string(),
        subtype: font.get_name("Subtype").unwrap_or("").to_string(),
        embedded,
        ..Default::default()
    })
}

/// The font's descriptor, following a Type0 font to its descendant.
pub(crate) fn font_descriptor(ctx: &mut Context, font: &Dict) -> Result<Option<Dict>> {
    if let Some(fd) = font.get("FontDescriptor") {
        return ctx.dict_opt(fd);
    }
    if font.get_name("Subtype") == Some("Type0")
        && let Some(desc) = font.get("DescendantFonts")
        && let Some(first) = ctx.dereference_array(desc)?.first()
        && let Some(cid_font) = ctx.dict_opt(first)?
        && let Some(fd) = cid_font.get("FontDescriptor")
    {
        return ctx.dict_opt(fd);
    }
    Ok(None)
}

fn image_record(dict: &Dict) -> ImageRecord {
    let color_space = match dict.get("ColorSpace") {
        Some(Object::Name(n)) => n.clone(),
        Some(Object::Array(a)) => a
            .first()
            .and_then(|o| o.as_name().ok())
            .unwrap_or("")
            .to_string(),
        Some(Object::Ref(_)) => "indirect".to_string(),
        _ => String::new(),
    };
    ImageRecord {
        width: dict.get_int("Width").unwrap_or(0),
        height: dict.get_int("Height").unwrap_or(0),
        bits_per_component: dict.get_int("BitsPerComponent").unwrap_or(0),
        color_space,
        filters: crate::codec::filter_names(dict),
        soft_mask: dict.get_ref("SMask").map(|r| r.num),
        ..Default::default()
    }
}

/// Hash of an object's content, following references.
fn content_hash(ctx: &mut Context, r: ObjRef) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    let mut path = Vec::new();
    hash_ref(ctx, r, &mut hasher, &mut path)?;
    Ok(hasher.finalize().into())
}

fn hash_ref(ctx: &mut Context, r: ObjRef, h: &mut Sha256, path: &mut Vec<u32>) -> Result<()> {
    if path.contains(&r.num) || path.len() >= MAX_HASH_DEPTH {
        h.update(b"R");
        h.update(r.num.to_be_bytes());
        return Ok(());
    }
    path.push(r.num);
    let obj = ctx.deref(r)?;
    hash_object(ctx, &obj, h, path)?;
    path.pop();
    Ok(())
}

fn hash_object(ctx: &mut Context, obj: &Object, h: &mut Sha256, path: &mut Vec<u32>) -> Result<()> {
    match obj {
        Object::Null => h.update(b"n"),
        Object::Bool(b) => h.update(if *b { b"t" } else { b"f" }),
        Object::Int(i) => {
            h.update(b"i");
            h.update(i.to_be_bytes());
        }
        Object::Real(f) => {
            h.update(b"r");
            h.update(f.to_bits().to_be_bytes());
        }
        Object::Name(n) => {
            h.update(b"/");
            h.update((n.len() as u64).to_be_bytes());
            h.update(n.as_bytes());
        }
        Object::String(s) | Object::HexString(s) => {
            h.update(b"s");
            h.update((s.len() as u64).to_be_bytes());
            h.update(s);
        }
        Object::Array(items) => {
            h.update(b"[");
            h.update((items.len() as u64).to_be_bytes());
            for item in items {
                hash_object(ctx, item, h, path)?;
            }
        }
        Object::Dict(d) => hash_dict(ctx, d, h, path, &[])?,
        Object::Stream(s) => {
            hash_dict(ctx, &s.dict, h, path, &["Length"])?;
            h.update(if s.decoded { b"D" } else { b"E" });
            h.update((s.data.len() as u64).to_be_bytes());
            h.update(&s.data);
        }
        Object::Ref(r) => hash_ref(ctx, *r, h, path)?,
    }
    Ok(())
}

/// Keys are hashed sorted so entry order does not matter.
fn hash_dict(ctx: &mut Context, d: &Dict, h: &mut Sha256, path: &mut Vec<u32>, skip: &[&str]) -> Result<()> {
    let mut keys: Vec<&String> = d.keys().filter(|k| !skip.contains(&k.as_str())).collect();
    keys.sort();
    h.update(b"<");
    h.update((keys.len() as u64).to_be_bytes());
    for key in keys {
        h.update((key.len() as u64).to_be_bytes());
        h.update(key.as_bytes());
        if let Some(value) = d.get(key) {
            hash_object(ctx, value, h, path)?;
        }
    }
    Ok(())
}

/// Group `candidates` by content; every non-lowest member maps to the lowest.
fn find_duplicates(ctx: &mut Context, candidates: impl Iterator<Item = u32>) -> Result<BTreeMap<u32, u32>> {
    let mut canonical: FxHashMap<[u8; 32], u32> = FxHashMap::default();
    let mut duplicates = BTreeMap::new();
    // Candidates arrive in ascending order, so the first seen is canonical.
    for num in candidates {
        let generation = ctx.xref.get(num).map_or(0, |e| e.generation());
        let hash = content_hash(ctx, ObjRef::new(num, generation))?;
        match canonical.get(&hash) {
            Some(&keep) => {
                duplicates.insert(num, keep);
            }
            None => {
                canonical.insert(hash, num);
            }
        }
    }
    Ok(duplicates)
}

/// Rewrite every reference to a folded object and free the folded ones.
fn fold(ctx: &mut Context, folded: &BTreeMap<u32, u32>) {
    let targets: FxHashMap<u32, ObjRef> = folded
        .iter()
        .map(|(&old, &keep)| {
            let generation = ctx.xref.get(keep).map_or(0, |e| e.generation());
            (old, ObjRef::new(keep, generation))
        })
        .collect();
    let mut remap = |r: ObjRef| targets.get(&r.num).copied().unwrap_or(r);
    for num in ctx.xref.in_use_numbers() {
        if let Some(obj) = ctx.xref.get_mut(num).and_then(|e| e.object_mut()) {
            obj.map_refs(&mut remap);
        }
    }
    let mut trailer = Object::Dict(std::mem::take(&mut ctx.trailer));
    trailer.map_refs(&mut remap);
    if let Object::Dict(d) = trailer {
        ctx.trailer = d;
    }
    for &old in folded.keys() {
        ctx.free_object(old);
    }
}

/// Index resources, fold duplicate fonts and images, then re-index.
pub fn optimize(ctx: &mut Context) -> Result<()> {
    ctx.load_all()?;
    index_resources(ctx)?;
    let font_nums: Vec<u32> = ctx.optimize.fonts.keys().copied().collect();
    let image_nums: Vec<u32> = ctx.optimize.images.keys().copied().collect();
    let fonts = find_duplicates(ctx, font_nums.into_iter())?;
    let images = find_duplicates(ctx, image_nums.into_iter())?;
    if fonts.is_empty() && images.is_empty() {
        debug!("no duplicate resources");
        return Ok(());
    }
    let mut folded = fonts.clone();
    folded.extend(images.iter().map(|(k, v)| (*k, *v)));
    fold(ctx, &folded);
    ctx.optimize.duplicate_fonts.extend(fonts);
    ctx.optimize.duplicate_images.extend(images);
    index_resources(ctx)?;
    info!(
        fonts = ctx.optimize.duplicate_fonts.len(),
        images = ctx.optimize.duplicate_images.len(),
        "folded duplicate resources"
    );
    Ok(())
}
