//! Structural validation and repair.
//!
//! Checks run over the trailer, the catalog, the page tree and every
//! resource reachable from a page. In relaxed mode a defect with an obvious
//! fix is repaired in the context and reported; in strict mode every defect
//! is a [`PdfError::Validation`]. Defects that leave nothing to work with
//! (no catalog, no page tree) fail in both modes.

use crate::config::ValidationMode;
use crate::document::pages::{DEFAULT_MEDIA_BOX, parse_rect, rect_object};
use crate::error::{PdfError, Result};
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Deeper page trees are treated as corrupt.
const MAX_TREE_DEPTH: usize = 64;

const FONT_SUBTYPES: [&str; 7] = [
    "Type0",
    "Type1",
    "MMType1",
    "Type3",
    "TrueType",
    "CIDFontType0",
    "CIDFontType2",
];

const RESOURCE_CATEGORIES: [&str; 7] = [
    "Font",
    "XObject",
    "ColorSpace",
    "ExtGState",
    "Pattern",
    "Shading",
    "Properties",
];

/// One defect found by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Object path, such as `Root.Pages.Kids[2]`.
    pub path: String,
    pub msg: String,
    pub repaired: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
    pub page_count: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn repairs(&self) -> usize {
        self.issues.iter().filter(|i| i.repaired).count()
    }
}

struct Validator {
    strict: bool,
    report: ValidationReport,
    checked: FxHashSet<u32>,
}

impl Validator {
    /// Record a defect. Strict mode fails; otherwise `repair` runs if given.
    fn defect(
        &mut self,
        ctx: &mut Context,
        path: &str,
        msg: impl Into<String>,
        repair: Option<&mut dyn FnMut(&mut Context)>,
    ) -> Result<()> {
        let msg = msg.into();
        if self.strict {
            return Err(PdfError::validation(path, msg));
        }
        let repaired = match repair {
            Some(f) => {
                f(ctx);
                true
            }
            None => false,
        };
        warn!(path, repaired, "{msg}");
        self.report.issues.push(Issue {
            path: path.to_string(),
            msg,
            repaired,
        });
        Ok(())
    }

    fn check_trailer(&mut self, ctx: &mut Context) -> Result<()> {
        let size = ctx.trailer.get_int("Size").unwrap_or(0);
        let needed = i64::from(ctx.xref.size());
        if size < needed {
            self.defect(
                ctx,
                "Trailer.Size",
                format!("/Size {size} does not exceed the highest object number"),
                Some(&mut |c: &mut Context| {
                    c.trailer.insert("Size", needed);
                }),
            )?;
        }
        if let Some(info) = ctx.trailer.get("Info").cloned()
            && ctx.dict_opt(&info)?.is_none()
        {
            self.defect(
                ctx,
                "Trailer.Info",
                "/Info is not a dictionary",
                Some(&mut |c: &mut Context| {
                    c.trailer.remove("Info");
                }),
            )?;
        }
        if ctx.is_encrypted() && !ctx.trailer.contains_key("ID") {
            self.defect(ctx, "Trailer.ID", "encrypted document without /ID", None)?;
        }
        Ok(())
    }

    fn check_catalog(&mut self, ctx: &mut Context) -> Result<ObjRef> {
        let root = ctx.root;
        let catalog = ctx
            .dict_opt(&Object::Ref(root))?
            .ok_or_else(|| PdfError::validation("Root", "catalog is not a dictionary"))?;
        if !catalog.has_type("Catalog") {
            let msg = match catalog.type_name() {
                Some(t) => format!("catalog /Type is /{t}"),
                None => "catalog without /Type".to_string(),
            };
            self.defect(
                ctx,
                "Root.Type",
                msg,
                Some(&mut |c: &mut Context| set_key(c, root, "Type", Object::name("Catalog"))),
            )?;
        }
        let pages = catalog
            .get_ref("Pages")
            .ok_or_else(|| PdfError::validation("Root.Pages", "missing page tree root"))?;
        if ctx.dict_opt(&Object::Ref(pages))?.is_none() {
            return Err(PdfError::validation("Root.Pages", "page tree root is not a dictionary"));
        }
        if let Some(version) = catalog.get("Version")
            && !matches!(version, Object::Name(_))
        {
            self.defect(
                ctx,
                "Root.Version",
                "/Version is not a name",
                Some(&mut |c: &mut Context| remove_key(c, root, "Version")),
            )?;
        }
        Ok(pages)
    }

    /// Validate the subtree at `node`; returns its leaf count.
    fn check_node(
        &mut self,
        ctx: &mut Context,
        node: ObjRef,
        parent: Option<ObjRef>,
        has_media_box: bool,
        path: &str,
        depth: usize,
        visited: &mut FxHashSet<u32>,
    ) -> Result<usize> {
        if depth > MAX_TREE_DEPTH {
            return Err(PdfError::validation(path, "page tree too deep"));
        }
        let Some(dict) = ctx.dict_opt(&Object::Ref(node))? else {
            self.defect(ctx, path, "page tree node is not a dictionary", None)?;
            return Ok(0);
        };
        let kind = match dict.type_name() {
            Some("Pages") => "Pages",
            Some("Page") => "Page",
            other => {
                let inferred = if dict.contains_key("Kids") { "Pages" } else { "Page" };
                let msg = match other {
                    Some(t) => format!("page tree node has /Type /{t}"),
                    None => "page tree node without /Type".to_string(),
                };
                self.defect(
                    ctx,
                    &format!("{path}.Type"),
                    msg,
                    Some(&mut |c: &mut Context| set_key(c, node, "Type", Object::name(inferred))),
                )?;
                inferred
            }
        };
        if let Some(parent) = parent
            && dict.get_ref("Parent") != Some(parent)
        {
            self.defect(
                ctx,
                &format!("{path}.Parent"),
                "wrong or missing /Parent",
                Some(&mut |c: &mut Context| set_key(c, node, "Parent", Object::Ref(parent))),
            )?;
        }
        let media_box = match dict.get("MediaBox") {
            Some(mb) => {
                let valid = parse_rect(ctx, mb).is_some();
                if !valid {
                    self.defect(
                        ctx,
                        &format!("{path}.MediaBox"),
                        "malformed /MediaBox",
                        Some(&mut |c: &mut Context| {
                            set_key(c, node, "MediaBox", rect_object(DEFAULT_MEDIA_BOX))
                        }),
                    )?;
                }
                true
            }
            None => has_media_box,
        };
        if let Some(res) = dict.get("Resources") {
            self.check_resources(ctx, res, &format!("{path}.Resources"))?;
        }

        if kind == "Page" {
            if !media_box {
                self.defect(
                    ctx,
                    &format!("{path}.MediaBox"),
                    "page without /MediaBox",
                    Some(&mut |c: &mut Context| {
                        set_key(c, node, "MediaBox", rect_object(DEFAULT_MEDIA_BOX))
                    }),
                )?;
            }
            self.check_contents(ctx, node, &dict, path)?;
            return Ok(1);
        }

        if !visited.insert(node.num) {
            return Err(PdfError::validation(path, "page tree cycle"));
        }
        let kids = match dict.get("Kids") {
            Some(k) => ctx.dereference_array(k).ok(),
            None => None,
        };
        let Some(kids) = kids else {
            self.defect(
                ctx,
                &format!("{path}.Kids"),
                "page tree node without /Kids array",
                Some(&mut |c: &mut Context| set_key(c, node, "Kids", Object::Array(Vec::new()))),
            )?;
            return Ok(0);
        };
        let mut count = 0;
        let mut kept = Vec::with_capacity(kids.len());
        for (i, kid) in kids.iter().enumerate() {
            if let Object::Ref(r) = kid
                && ctx.dict_opt(kid)?.is_some()
            {
                let kid_path = format!("{path}.Kids[{i}]");
                count += self.check_node(ctx, *r, Some(node), media_box, &kid_path, depth + 1, visited)?;
                kept.push(kid.clone());
            }
        }
        let dropped = kids.len() - kept.len();
        if dropped > 0 {
            self.defect(
                ctx,
                &format!("{path}.Kids"),
                format!("{dropped} kids are not page tree nodes"),
                Some(&mut |c: &mut Context| set_key(c, node, "Kids", Object::Array(kept.clone()))),
            )?;
        }
        if dict.get_int("Count") != Some(count as i64) {
            self.defect(
                ctx,
                &format!("{path}.Count"),
                format!("/Count {:?} but {count} pages below", dict.get_int("Count")),
                Some(&mut |c: &mut Context| set_key(c, node, "Count", Object::Int(count as i64))),
            )?;
        }
        Ok(count)
    }

    fn check_contents(&mut self, ctx: &mut Context, page: ObjRef, dict: &Dict, path: &str) -> Result<()> {
        let Some(contents) = dict.get("Contents") else {
            return Ok(());
        };
        let ok = match ctx.resolve(contents)? {
            Object::Stream(_) | Object::Null => true,
            Object::Array(items) => {
                let mut ok = true;
                for item in &items {
                    ok &= matches!(ctx.resolve(item)?, Object::Stream(_) | Object::Null);
                }
                ok
            }
            _ => false,
        };
        if !ok {
            self.defect(
                ctx,
                &format!("{path}.Contents"),
                "/Contents is neither a stream nor an array of streams",
                Some(&mut |c: &mut Context| remove_key(c, page, "Contents")),
            )?;
        }
        Ok(())
    }

    fn check_resources(&mut self, ctx: &mut Context, res: &Object, path: &str) -> Result<()> {
        if let Object::Ref(r) = res
            && !self.checked.insert(r.num)
        {
            return Ok(());
        }
        let Some(dict) = ctx.dict_opt(res)? else {
            return self.defect(ctx, path, "/Resources is not a dictionary", None);
        };
        for category in RESOURCE_CATEGORIES {
            let Some(sub) = dict.get(category) else {
                continue;
            };
            let sub_path = format!("{path}.{category}");
            let Some(sub) = ctx.dict_opt(sub)? else {
                self.defect(ctx, &sub_path, "resource category is not a dictionary", None)?;
                continue;
            };
            for (name, entry) in &sub {
                let entry_path = format!("{sub_path}.{name}");
                match category {
                    "Font" => self.check_font(ctx, entry, &entry_path)?,
                    "XObject" => self.check_xobject(ctx, entry, &entry_path)?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn check_font(&mut self, ctx: &mut Context, font: &Object, path: &str) -> Result<()> {
        if let Object::Ref(r) = font
            && !self.checked.insert(r.num)
        {
            return Ok(());
        }
        let Some(dict) = ctx.dict_opt(font)? else {
            return self.defect(ctx, path, "font is not a dictionary", None);
        };
        if !dict.has_type("Font") {
            let target = font.as_ref().ok();
            let mut fix = |c: &mut Context| {
                if let Some(r) = target {
                    set_key(c, r, "Type", Object::name("Font"));
                }
            };
            self.defect(ctx, &format!("{path}.Type"), "font without /Type /Font", Some(&mut fix))?;
        }
        let subtype = dict.get_name("Subtype").unwrap_or("");
        if !FONT_SUBTYPES.contains(&subtype) {
            self.defect(ctx, &format!("{path}.Subtype"), format!("unknown font subtype {subtype:?}"), None)?;
            return Ok(());
        }
        if subtype != "Type3" && !dict.contains_key("BaseFont") {
            self.defect(ctx, &format!("{path}.BaseFont"), "font without /BaseFont", None)?;
        }
        if subtype == "Type0" {
            let descendants = match dict.get("DescendantFonts") {
                Some(d) => ctx.dereference_array(d).unwrap_or_default(),
                None => Vec::new(),
            };
            if descendants.len() != 1 {
                self.defect(
                    ctx,
                    &format!("{path}.DescendantFonts"),
                    "Type0 font needs exactly one descendant",
                    None,
                )?;
            }
            if !dict.contains_key("Encoding") {
                self.defect(ctx, &format!("{path}.Encoding"), "Type0 font without /Encoding", None)?;
            }
        }
        if subtype == "Type3" {
            for key in ["FontBBox", "FontMatrix", "CharProcs", "Encoding"] {
                if !dict.contains_key(key) {
                    self.defect(ctx, &format!("{path}.{key}"), format!("Type3 font without /{key}"), None)?;
                }
            }
        }
        Ok(())
    }

    fn check_xobject(&mut self, ctx: &mut Context, xobj: &Object, path: &str) -> Result<()> {
        if let Object::Ref(r) = xobj
            && !self.checked.insert(r.num)
        {
            return Ok(());
        }
        let stream = match ctx.resolve(xobj)? {
            Object::Stream(s) => s,
            _ => return self.defect(ctx, path, "XObject is not a stream", None),
        };
        match stream.dict.get_name("Subtype") {
            Some("Image") => {
                for key in ["Width", "Height"] {
                    if !stream.dict.get_int(key).is_some_and(|v| v > 0) {
                        self.defect(ctx, &format!("{path}.{key}"), format!("image without positive /{key}"), None)?;
                    }
                }
                let mask = matches!(stream.dict.get("ImageMask"), Some(Object::Bool(true)));
                if !mask && !stream.has_filter("JPXDecode") && !stream.dict.contains_key("BitsPerComponent") {
                    self.defect(
                        ctx,
                        &format!("{path}.BitsPerComponent"),
                        "image without /BitsPerComponent",
                        None,
                    )?;
                }
            }
            Some("Form") => {
                if let Some(res) = stream.dict.get("Resources") {
                    self.check_resources(ctx, res, &format!("{path}.Resources"))?;
                }
            }
            Some("PS") => debug!(path, "PostScript XObject"),
            other => {
                self.defect(ctx, &format!("{path}.Subtype"), format!("unknown XObject subtype {other:?}"), None)?;
            }
        }
        Ok(())
    }

    /// References reachable from the trailer that point at nothing.
    fn check_references(&mut self, ctx: &mut Context) -> Result<()> {
        let mut dangling = BTreeSet::new();
        let mut seen = FxHashSet::default();
        let mut queue: Vec<ObjRef> = Vec::new();
        let trailer = Object::Dict(ctx.trailer.clone());
        trailer.for_each_ref(&mut |r| queue.push(r));
        while let Some(r) = queue.pop() {
            if !seen.insert(r.num) {
                continue;
            }
            match ctx.get(r)? {
                None => {
                    dangling.insert(r);
                }
                Some(obj) => obj.for_each_ref(&mut |child| queue.push(child)),
            }
        }
        if dangling.is_empty() {
            return Ok(());
        }
        let list = dangling.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let targets = dangling.clone();
        self.defect(
            ctx,
            "Trailer",
            format!("references to free or missing objects: {list}"),
            Some(&mut |c: &mut Context| {
                for num in c.xref.in_use_numbers() {
                    if let Some(obj) = c.xref.get_mut(num).and_then(|e| e.object_mut()) {
                        null_refs(obj, &targets);
                    }
                }
                null_refs_in_dict(&mut c.trailer, &targets);
            }),
        )
    }
}

fn set_key(ctx: &mut Context, r: ObjRef, key: &str, value: Object) {
    if let Ok(Some(obj)) = ctx.get_mut(r)
        && let Some(dict) = obj.dict_like_mut()
    {
        dict.insert(key, value);
    }
}

fn remove_key(ctx: &mut Context, r: ObjRef, key: &str) {
    if let Ok(Some(obj)) = ctx.get_mut(r)
        && let Some(dict) = obj.dict_like_mut()
    {
        dict.remove(key);
    }
}

fn null_refs(obj: &mut Object, targets: &BTreeSet<ObjRef>) {
    match obj {
        Object::Ref(r) if targets.contains(r) => *obj = Object::Null,
        Object::Array(items) => items.iter_mut().for_each(|o| null_refs(o, targets)),
        Object::Dict(d) => null_refs_in_dict(d, targets),
        Object::Stream(s) => null_refs_in_dict(&mut s.dict, targets),
        _ => {}
    }
}

fn null_refs_in_dict(dict: &mut Dict, targets: &BTreeSet<ObjRef>) {
    dict.values_mut().for_each(|o| null_refs(o, targets));
}

/// Validate `ctx` per its configured mode and set `ctx.page_count`.
pub fn validate(ctx: &mut Context) -> Result<ValidationReport> {
    let mode = ctx.config.validation_mode;
    if mode == ValidationMode::None {
        ctx.page_count = crate::document::pages::page_count(ctx)?;
        return Ok(ValidationReport {
            issues: Vec::new(),
            page_count: ctx.page_count,
        });
    }
    let mut v = Validator {
        strict: mode == ValidationMode::Strict,
        report: ValidationReport::default(),
        checked: FxHashSet::default(),
    };
    v.check_references(ctx)?;
    v.check_trailer(ctx)?;
    let pages = v.check_catalog(ctx)?;
    let mut visited = FxHashSet::default();
    let count = v.check_node(ctx, pages, None, false, "Root.Pages", 0, &mut visited)?;
    ctx.page_count = count;
    v.report.page_count = count;
    debug!(
        pages = count,
        issues = v.report.issues.len(),
        repairs = v.report.repairs(),
        "validated"
    );
    Ok(v.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::dict;

    fn doc_with_page(page: Dict, mode: ValidationMode) -> (Context, ObjRef) {
        let mut config = Configuration::default();
        config.validation_mode = mode;
        let mut ctx = Context::new(config);
        let root = crate::document::pages::pages_root(&mut ctx).unwrap();
        let mut page = page;
        page.insert("Parent", root);
        let p = ctx.add_object(page);
        set_key(&mut ctx, root, "Kids", Object::Array(vec![Object::Ref(p)]));
        set_key(&mut ctx, root, "Count", Object::Int(1));
        (ctx, p)
    }

    #[test]
    fn test_clean_document() {
        let page = dict! {
            "Type" => Object::name("Page"),
            "MediaBox" => rect_object([0.0, 0.0, 10.0, 10.0]),
        };
        let (mut ctx, _) = doc_with_page(page, ValidationMode::Strict);
        let report = validate(&mut ctx).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(ctx.page_count, 1);
    }

    #[test]
    fn test_relaxed_repairs_missing_type_and_media_box() {
        let (mut ctx, p) = doc_with_page(Dict::new(), ValidationMode::Relaxed);
        let report = validate(&mut ctx).unwrap();
        assert_eq!(report.repairs(), 2);
        let page = ctx.dereference_dict(&Object::Ref(p)).unwrap();
        assert!(page.has_type("Page"));
        assert!(page.contains_key("MediaBox"));
    }

    #[test]
    fn test_strict_rejects_missing_media_box() {
        let (mut ctx, _) = doc_with_page(dict! { "Type" => Object::name("Page") }, ValidationMode::Strict);
        assert!(matches!(validate(&mut ctx), Err(PdfError::Validation { .. })));
    }

    #[test]
    fn test_count_mismatch_repaired() {
        let page = dict! {
            "Type" => Object::name("Page"),
            "MediaBox" => rect_object([0.0, 0.0, 10.0, 10.0]),
        };
        let (mut ctx, _) = doc_with_page(page, ValidationMode::Relaxed);
        let root = crate::document::pages::pages_root(&mut ctx).unwrap();
        set_key(&mut ctx, root, "Count", Object::Int(7));
        validate(&mut ctx).unwrap();
        assert_eq!(ctx.dereference_dict(&Object::Ref(root)).unwrap().get_int("Count"), Some(1));
    }

    #[test]
    fn test_dangling_reference_nulled() {
        let page = dict! {
            "Type" => Object::name("Page"),
            "MediaBox" => rect_object([0.0, 0.0, 10.0, 10.0]),
            "Thumb" => ObjRef::new(40, 0),
        };
        let (mut ctx, p) = doc_with_page(page, ValidationMode::Relaxed);
        validate(&mut ctx).unwrap();
        let page = ctx.dereference_dict(&Object::Ref(p)).unwrap();
        assert_eq!(page.get("Thumb"), Some(&Object::Null));
    }
}
