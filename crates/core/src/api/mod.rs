//! Command dispatch.
//!
//! [`process`] runs one configured command end to end: every input is read,
//! validated and optimized, the command's operation runs, and the resulting
//! documents are written. Inputs are independent until the operation
//! itself, so reading and writing several documents runs in parallel.
//!
//! # Example
//!
//! ```ignore
//! use quire_core::api::{Params, process};
//! use quire_core::config::{Command, Configuration};
//!
//! let pdf = std::fs::read("in.pdf")?;
//! let config = Configuration::for_command(Command::Trim);
//! let params = Params { selection: Some("1-3,!2".into()), ..Params::default() };
//! let output = process([pdf], &params, &config)?;
//! ```

use crate::config::{Command, Configuration};
use crate::document::selection::{parse_selection, parse_selection_ordered};
use crate::error::{PdfError, Result};
use crate::extract::{
    ExtractedContent, ExtractedFont, ExtractedImage, ExtractedMetadata, extract_content, extract_fonts,
    extract_images, extract_metadata,
};
use crate::model::Context;
use crate::ops::{self, Attachment};
use crate::optimize::optimize;
use crate::validate::{ValidationReport, validate};
use crate::writer::write_to_vec;
use bytes::Bytes;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Operation arguments that are not part of [`Configuration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Page selection; `None` selects every page.
    pub selection: Option<String>,
    /// Tolerate selections naming pages past the end.
    pub allow_out_of_range: bool,
    /// Degrees for rotate.
    pub rotation: i64,
    /// Pages per part for split.
    pub span: usize,
    /// Insert blank pages before (rather than after) the selection.
    pub before: bool,
    pub attachments: Vec<Attachment>,
    /// Attachment names for remove and extract; empty means all.
    pub names: Vec<String>,
    /// Replacement password for change-user-pw and change-owner-pw.
    pub new_password: Vec<u8>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            selection: None,
            allow_out_of_range: false,
            rotation: 90,
            span: 1,
            before: true,
            attachments: Vec::new(),
            names: Vec::new(),
            new_password: Vec::new(),
        }
    }
}

/// A written PDF. Commands producing several documents label each one,
/// split by its first page and extract-pages by its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDocument {
    pub label: Option<usize>,
    pub data: Vec<u8>,
}

/// What a command produced.
#[derive(Debug)]
pub enum Output {
    Report(ValidationReport),
    Documents(Vec<WrittenDocument>),
    Images(Vec<ExtractedImage>),
    Fonts(Vec<ExtractedFont>),
    Contents(Vec<ExtractedContent>),
    Metadata(Vec<ExtractedMetadata>),
    Attachments(Vec<Attachment>),
    Listing(Vec<String>),
}

/// Run `config.command` over `inputs`.
///
/// Merge commands use every input, the first as the destination; all other
/// commands use the first input only.
pub fn process<I, B>(inputs: I, params: &Params, config: &Configuration) -> Result<Output>
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    let command = config.command;
    if matches!(command, Command::AddWatermarks | Command::RemoveWatermarks | Command::NUp) {
        return Err(PdfError::Unsupported(format!("{} is not handled here", command.tag())));
    }
    let mut inputs: Vec<Bytes> = inputs.into_iter().map(Into::into).collect();
    if !matches!(command, Command::MergeCreate | Command::MergeAppend) {
        inputs.truncate(1);
    }
    if inputs.is_empty() {
        return Err(PdfError::Unsupported("no input document".into()));
    }
    let mut contexts = inputs
        .into_par_iter()
        .map(|data| prepare(data, config))
        .collect::<Result<Vec<_>>>()?;
    let (mut ctx, report) = contexts.remove(0);
    info!(command = command.tag(), pages = ctx.page_count, "processing");

    let output = match command {
        Command::Validate => Output::Report(report),
        Command::Optimize => single(&mut ctx)?,
        Command::Trim => {
            let sel = selection(&mut ctx, params)?;
            ops::trim(&mut ctx, &sel)?;
            single(&mut ctx)?
        }
        Command::Split => written(ops::split(&mut ctx, params.span)?)?,
        Command::MergeCreate | Command::MergeAppend => {
            for (mut src, _) in contexts {
                ops::merge(&mut ctx, &mut src)?;
            }
            single(&mut ctx)?
        }
        Command::ExtractImages => {
            let sel = selection(&mut ctx, params)?;
            Output::Images(extract_images(&mut ctx, &sel)?)
        }
        Command::ExtractFonts => {
            let sel = selection(&mut ctx, params)?;
            Output::Fonts(extract_fonts(&mut ctx, &sel)?)
        }
        Command::ExtractContent => {
            let sel = selection(&mut ctx, params)?;
            Output::Contents(extract_content(&mut ctx, &sel)?)
        }
        Command::ExtractMetadata => Output::Metadata(extract_metadata(&mut ctx)?),
        Command::ExtractPages => {
            let pages: Vec<usize> = selection(&mut ctx, params)?.into_iter().collect();
            written(ops::extract_each_page(&mut ctx, &pages)?)?
        }
        Command::Collect => {
            let expr = params.selection.as_deref().unwrap_or("");
            let pages = parse_selection_ordered(expr, ctx.page_count, params.allow_out_of_range)?;
            let mut out = ops::collect(&mut ctx, &pages)?;
            single(&mut out)?
        }
        Command::Rotate => {
            let sel = selection(&mut ctx, params)?;
            ops::rotate(&mut ctx, &sel, params.rotation)?;
            single(&mut ctx)?
        }
        Command::InsertPages => {
            let sel = selection(&mut ctx, params)?;
            ops::insert_pages(&mut ctx, &sel, params.before)?;
            single(&mut ctx)?
        }
        Command::RemovePages => {
            let sel = selection(&mut ctx, params)?;
            ops::remove_pages(&mut ctx, &sel)?;
            single(&mut ctx)?
        }
        Command::ListPermissions => Output::Listing(match ops::list_permissions(&ctx) {
            Some(listing) => listing.lines,
            None => vec!["not encrypted".to_string()],
        }),
        Command::SetPermissions => {
            ops::set_permissions(&mut ctx, config.permissions.bits())?;
            single(&mut ctx)?
        }
        Command::Encrypt => {
            ops::encrypt(&mut ctx)?;
            single(&mut ctx)?
        }
        Command::Decrypt => {
            ops::decrypt(&mut ctx)?;
            single(&mut ctx)?
        }
        Command::ChangeUserPw => {
            ops::change_user_password(&mut ctx, &config.user_password, &params.new_password)?;
            single(&mut ctx)?
        }
        Command::ChangeOwnerPw => {
            ops::change_owner_password(&mut ctx, &config.owner_password, &params.new_password)?;
            single(&mut ctx)?
        }
        Command::ListAttachments => Output::Listing(
            ops::list_attachments(&mut ctx)?
                .into_iter()
                .map(|a| match a.description {
                    Some(desc) => format!("{} ({desc})", a.name),
                    None => a.name,
                })
                .collect(),
        ),
        Command::AddAttachments => {
            for attachment in &params.attachments {
                ops::add_attachment(&mut ctx, attachment.clone())?;
            }
            single(&mut ctx)?
        }
        Command::RemoveAttachments => {
            let removed = ops::remove_attachments(&mut ctx, &params.names)?;
            info!(removed, "removed attachments");
            single(&mut ctx)?
        }
        Command::ExtractAttachments => Output::Attachments(ops::extract_attachments(&mut ctx, &params.names)?),
        Command::AddWatermarks | Command::RemoveWatermarks | Command::NUp => {
            return Err(PdfError::Unsupported(command.tag().to_string()));
        }
    };
    Ok(output)
}

/// Read, validate, optimize and check permissions for one input.
fn prepare(data: Bytes, config: &Configuration) -> Result<(Context, ValidationReport)> {
    let mut ctx = Context::from_bytes(data, config.clone())?;
    // Listing permissions works on files no password opens.
    if ctx.encrypt.as_ref().is_some_and(|e| e.role.is_none()) {
        return Ok((ctx, ValidationReport::default()));
    }
    let report = validate(&mut ctx)?;
    for issue in &report.issues {
        warn!(path = %issue.path, repaired = issue.repaired, "{}", issue.msg);
    }
    if let Err(e) = optimize(&mut ctx) {
        if ctx.is_strict() {
            return Err(e);
        }
        warn!(error = %e, "optimization skipped");
    }
    ctx.ensure_permitted(config.command)?;
    Ok((ctx, report))
}

fn selection(ctx: &mut Context, params: &Params) -> Result<BTreeSet<usize>> {
    let expr = params.selection.as_deref().unwrap_or("");
    parse_selection(expr, ctx.page_count, params.allow_out_of_range)
}

fn single(ctx: &mut Context) -> Result<Output> {
    Ok(Output::Documents(vec![WrittenDocument {
        label: None,
        data: write_to_vec(ctx)?,
    }]))
}

fn written(parts: Vec<(usize, Context)>) -> Result<Output> {
    let docs = parts
        .into_par_iter()
        .map(|(label, mut ctx)| {
            Ok(WrittenDocument {
                label: Some(label),
                data: write_to_vec(&mut ctx)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Output::Documents(docs))
}
