//! PDF fixtures built in code.
//!
//! [`PdfBuilder`] writes objects verbatim, one revision at a time. Every
//! revision gets its own classical xref section and trailer; later
//! revisions point back with /Prev, like an incrementally updated file.
#![allow(dead_code)]

use quire_core::{Command, Configuration, Context};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: &'static str,
    revisions: Vec<BTreeMap<u32, Vec<u8>>>,
    root: u32,
    trailer_extra: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4",
            revisions: vec![BTreeMap::new()],
            root: 1,
            trailer_extra: String::new(),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Add `num 0 obj <body> endobj` to the current revision.
    pub fn object(mut self, num: u32, body: &str) -> Self {
        self.current().insert(num, body.as_bytes().to_vec());
        self
    }

    /// Add a stream object; /Length is filled in.
    pub fn stream(mut self, num: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body = format!("<<{dict_entries} /Length {}>>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.current().insert(num, body);
        self
    }

    /// Start an incremental update.
    pub fn revision(mut self) -> Self {
        self.revisions.push(BTreeMap::new());
        self
    }

    pub fn root(mut self, num: u32) -> Self {
        self.root = num;
        self
    }

    /// Extra trailer entries, e.g. `/Info 9 0 R`.
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer_extra = entries.to_string();
        self
    }

    fn current(&mut self) -> &mut BTreeMap<u32, Vec<u8>> {
        let last = self.revisions.len() - 1;
        &mut self.revisions[last]
    }

    pub fn build(&self) -> Vec<u8> {
        let size = self
            .revisions
            .iter()
            .flat_map(|r| r.keys())
            .max()
            .map_or(1, |n| n + 1);
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut prev: Option<usize> = None;
        for (i, objects) in self.revisions.iter().enumerate() {
            let mut offsets = BTreeMap::new();
            for (num, body) in objects {
                offsets.insert(*num, out.len());
                out.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
                out.extend_from_slice(body);
                out.extend_from_slice(b"\nendobj\n");
            }
            let xref_at = out.len();
            let mut table = String::from("xref\n");
            if i == 0 {
                offsets.insert(0, 0);
            }
            for run in runs(&offsets) {
                let _ = writeln!(table, "{} {}", run[0].0, run.len());
                for (num, offset) in run {
                    if num == 0 {
                        table.push_str("0000000000 65535 f\r\n");
                    } else {
                        let _ = write!(table, "{offset:010} 00000 n\r\n");
                    }
                }
            }
            let _ = write!(table, "trailer\n<</Size {size} /Root {} 0 R {}", self.root, self.trailer_extra);
            if let Some(p) = prev {
                let _ = write!(table, " /Prev {p}");
            }
            let _ = write!(table, ">>\nstartxref\n{xref_at}\n%%EOF\n");
            out.extend_from_slice(table.as_bytes());
            prev = Some(xref_at);
        }
        out
    }
}

/// Consecutive runs of object numbers.
fn runs(offsets: &BTreeMap<u32, usize>) -> Vec<Vec<(u32, usize)>> {
    let mut runs: Vec<Vec<(u32, usize)>> = Vec::new();
    for (&num, &offset) in offsets {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|(n, _)| n + 1 == num) => run.push((num, offset)),
            _ => runs.push(vec![(num, offset)]),
        }
    }
    runs
}

/// A document whose page n has a media box `widths[n-1]` wide and a
/// content stream drawing its number.
///
/// Objects: 1 catalog, 2 page tree, then a page and its content per page.
pub fn pages_document(widths: &[u32]) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    let kids: Vec<String> = (0..widths.len()).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    builder = builder
        .object(1, "<</Type /Catalog /Pages 2 0 R>>")
        .object(
            2,
            &format!("<</Type /Pages /Kids [{}] /Count {}>>", kids.join(" "), widths.len()),
        );
    for (i, w) in widths.iter().enumerate() {
        let page = 3 + 2 * i as u32;
        let content = page + 1;
        builder = builder
            .object(
                page,
                &format!(
                    "<</Type /Page /Parent 2 0 R /MediaBox [0 0 {w} 792] /Resources <<>> /Contents {content} 0 R>>"
                ),
            )
            .stream(content, "", format!("BT ({}) Tj ET", i + 1).as_bytes());
    }
    builder.build()
}

pub fn config(command: Command) -> Configuration {
    Configuration::for_command(command)
}

pub fn open(bytes: &[u8]) -> Context {
    Context::from_bytes(bytes.to_vec(), Configuration::default()).expect("parse fixture")
}

pub fn open_with(bytes: &[u8], user: &[u8], owner: &[u8]) -> Context {
    let config = Configuration::default().with_passwords(user, owner);
    Context::from_bytes(bytes.to_vec(), config).expect("parse fixture")
}

/// Media box widths of every page, in order.
pub fn widths(ctx: &mut Context) -> Vec<f64> {
    quire_core::document::page_refs(ctx)
        .expect("page tree")
        .iter()
        .map(|p| p.media_box(ctx).expect("media box")[2])
        .collect()
}
