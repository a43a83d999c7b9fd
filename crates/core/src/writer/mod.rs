//! PDF output.
//!
//! Writing never mutates the object graph apart from the version and the
//! /ID in the trailer. The steps are:
//!
//! 1. collect objects reachable from /Root and /Info
//! 2. keep their numbers, or compact them when many slots are free
//! 3. encode streams, pack object streams, encrypt
//! 4. emit objects, then a classical xref table or an xref stream

pub mod serialize;

use crate::config::{EncryptAlgorithm, Eol};
use crate::document::security::generate_file_id;
use crate::error::Result;
use crate::model::Context;
use crate::model::objects::{Dict, ObjRef, Object, Stream};
use crate::model::xref::XRefEntry;
use rustc_hash::FxHashMap;
use serialize::{write_dict, write_object};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufWriter, Write};
use tracing::{debug, info};

/// Objects per object stream.
pub const OBJECTS_PER_STREAM: usize = 100;

/// What the last write produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteState {
    /// Output object number to byte offset, for objects written directly.
    pub offsets: BTreeMap<u32, usize>,
    pub xref_offset: usize,
    /// Total bytes written.
    pub size: usize,
    pub object_count: usize,
    pub renumbered: bool,
    pub object_streams: Vec<u32>,
}

/// Write the document into a byte vector.
pub fn write_to_vec(ctx: &mut Context) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write(ctx, &mut out)?;
    Ok(out)
}

/// Write the document to `sink`, flushing once at the end.
pub fn write<W: Write>(ctx: &mut Context, sink: W) -> Result<()> {
    ctx.load_all()?;
    let reachable = reachable(ctx)?;
    let numbering = Numbering::plan(ctx, &reachable);

    let mut objects: BTreeMap<u32, (u16, Object)> = BTreeMap::new();
    for &old in &reachable {
        let (new, obj) = numbering.output_object(ctx, old);
        objects.insert(new.num, (new.generation, obj));
    }
    let mut trailer = Dict::new();
    for key in ["Root", "Info"] {
        if let Some(Object::Ref(r)) = ctx.trailer.get(key) {
            trailer.insert(key, numbering.map(*r));
        }
    }

    let uses_xref_stream = ctx.config.uses_xref_stream();
    if uses_xref_stream {
        ctx.require_version((1, 5));
    }
    if let Some(state) = &ctx.encrypt {
        match state.algorithm {
            EncryptAlgorithm::Aes128 => ctx.require_version((1, 6)),
            EncryptAlgorithm::Aes256 => ctx.require_version((1, 7)),
            _ => {}
        }
    }
    let id = file_id(ctx, &objects);
    if let Some(id) = &id {
        ctx.trailer.insert("ID", id.clone());
        trailer.insert("ID", id.clone());
    }

    let mut next = objects.keys().next_back().copied().unwrap_or(0) + 1;
    let encrypt_num = ctx.encrypt.as_ref().map(|state| {
        let num = next;
        next += 1;
        objects.insert(num, (0, Object::Dict(state.to_dict())));
        trailer.insert("Encrypt", ObjRef::new(num, 0));
        num
    });

    for (&num, (generation, obj)) in objects.iter_mut() {
        if let Object::Stream(stream) = obj {
            stream.encode()?;
        }
        if let Some(state) = &ctx.encrypt
            && Some(num) != encrypt_num
            && !(ctx.config.write_object_streams && packable(*generation, obj))
        {
            state.encrypt_object(ObjRef::new(num, *generation), obj)?;
            refresh_length(obj);
        }
    }

    let mut locations: BTreeMap<u32, XRefEntry> = BTreeMap::new();
    let mut object_streams = Vec::new();
    if ctx.config.write_object_streams {
        let members: Vec<u32> = objects
            .iter()
            .filter(|(num, (generation, obj))| Some(**num) != encrypt_num && packable(*generation, obj))
            .map(|(num, _)| *num)
            .collect();
        for chunk in members.chunks(OBJECTS_PER_STREAM) {
            let stm_num = next;
            next += 1;
            let mut packed = Vec::with_capacity(chunk.len());
            for (index, num) in chunk.iter().enumerate() {
                if let Some((_, obj)) = objects.remove(num) {
                    packed.push((*num, obj));
                    locations.insert(
                        *num,
                        XRefEntry::Compressed {
                            stream: stm_num,
                            index: index as u32,
                            object: None,
                        },
                    );
                }
            }
            let mut stream = Object::Stream(Box::new(object_stream(&packed)?));
            if let Some(state) = &ctx.encrypt {
                state.encrypt_object(ObjRef::new(stm_num, 0), &mut stream)?;
                refresh_length(&mut stream);
            }
            objects.insert(stm_num, (0, stream));
            object_streams.push(stm_num);
        }
    }

    let eol = ctx.config.eol;
    let mut w = CountingWriter::new(sink);
    let (major, minor) = ctx.version;
    w.write_line(format!("%PDF-{major}.{minor}").as_bytes(), eol)?;
    w.write_line(b"%\xE2\xE3\xCF\xD3", eol)?;

    let mut offsets = BTreeMap::new();
    for (&num, (generation, obj)) in &objects {
        offsets.insert(num, w.position());
        locations.insert(
            num,
            XRefEntry::InUse {
                offset: w.position(),
                generation: *generation,
                object: None,
            },
        );
        write_indirect(&mut w, num, *generation, obj, eol)?;
    }

    let size = next;
    let free = free_entries(ctx, &numbering, &locations, size);
    locations.extend(free);

    let xref_offset = w.position();
    if uses_xref_stream {
        locations.insert(
            size,
            XRefEntry::InUse {
                offset: xref_offset,
                generation: 0,
                object: None,
            },
        );
        let stream = xref_stream(&locations, size + 1, trailer)?;
        write_indirect(&mut w, size, 0, &Object::Stream(Box::new(stream)), eol)?;
    } else {
        write_xref_table(&mut w, &locations, size, eol)?;
        trailer.insert("Size", size);
        let mut text = Vec::new();
        write_dict(&mut text, &reorder_trailer(trailer));
        w.write_line(b"trailer", eol)?;
        w.write_line(&text, eol)?;
    }
    w.write_line(b"startxref", eol)?;
    w.write_line(xref_offset.to_string().as_bytes(), eol)?;
    w.write_all(b"%%EOF")?;
    w.write_all(eol.as_bytes())?;
    let total = w.finish()?;

    ctx.write = WriteState {
        object_count: offsets.len() + locations.values().filter(|e| matches!(e, XRefEntry::Compressed { .. })).count(),
        offsets,
        xref_offset,
        size: total,
        renumbered: numbering.compact,
        object_streams,
    };
    info!(
        bytes = total,
        objects = ctx.write.object_count,
        xref_stream = uses_xref_stream,
        "wrote document"
    );
    Ok(())
}

/// Object numbers reachable from the trailer's /Root and /Info.
fn reachable(ctx: &mut Context) -> Result<BTreeSet<u32>> {
    let mut seen = BTreeSet::new();
    let mut queue: Vec<ObjRef> = ["Root", "Info"]
        .iter()
        .filter_map(|k| ctx.trailer.get_ref(k))
        .collect();
    while let Some(r) = queue.pop() {
        if Some(r) == ctx.encrypt_ref || seen.contains(&r.num) {
            continue;
        }
        let Some(obj) = ctx.get(r)? else { continue };
        seen.insert(r.num);
        obj.for_each_ref(&mut |child| queue.push(child));
    }
    Ok(seen)
}

/// Output numbering: identity, or 1..n when too many slots would be free.
struct Numbering {
    compact: bool,
    map: FxHashMap<u32, ObjRef>,
}

impl Numbering {
    fn plan(ctx: &Context, reachable: &BTreeSet<u32>) -> Self {
        let highest = reachable.iter().next_back().copied().unwrap_or(0) as usize;
        let free = highest.saturating_sub(reachable.len());
        let compact = free * 4 > highest;
        let map = reachable
            .iter()
            .enumerate()
            .map(|(i, &num)| {
                let target = if compact {
                    ObjRef::new(i as u32 + 1, 0)
                } else {
                    let generation = ctx.xref.get(num).map_or(0, XRefEntry::generation);
                    ObjRef::new(num, generation)
                };
                (num, target)
            })
            .collect();
        if compact {
            debug!(objects = reachable.len(), free, "compacting object numbers");
        }
        Self { compact, map }
    }

    /// Unreachable targets become null.
    fn map(&self, r: ObjRef) -> Object {
        match self.map.get(&r.num) {
            Some(target) => Object::Ref(*target),
            None => Object::Null,
        }
    }

    fn output_object(&self, ctx: &Context, old: u32) -> (ObjRef, Object) {
        let target = self.map.get(&old).copied().unwrap_or(ObjRef::new(old, 0));
        let mut obj = ctx
            .xref
            .get(old)
            .and_then(XRefEntry::object)
            .cloned()
            .unwrap_or(Object::Null);
        // Refs to objects not written would otherwise land on a reused number.
        obj.replace_refs(&mut |r| self.map(r));
        (target, obj)
    }
}

fn refresh_length(obj: &mut Object) {
    if let Object::Stream(stream) = obj {
        let len = stream.data.len();
        stream.dict.insert("Length", len);
    }
}

/// Objects allowed inside an object stream.
fn packable(generation: u16, obj: &Object) -> bool {
    generation == 0 && !matches!(obj, Object::Stream(_))
}

/// First /ID element kept, second regenerated. Created only for encrypted
/// output or when the input had one.
fn file_id(ctx: &mut Context, objects: &BTreeMap<u32, (u16, Object)>) -> Option<Object> {
    let existing = ctx.file_id();
    let first = match (&ctx.encrypt, existing) {
        (Some(state), _) if !state.id.is_empty() => state.id.clone(),
        (_, Some((first, _))) => first,
        (Some(_), None) => generate_file_id(b"first"),
        (None, None) => return None,
    };
    let info = ctx
        .trailer
        .get("Info")
        .map(serialize::to_bytes)
        .unwrap_or_default();
    let mut seed = objects.len().to_le_bytes().to_vec();
    seed.extend_from_slice(&info);
    let second = generate_file_id(&seed);
    Some(Object::Array(vec![
        Object::HexString(first),
        Object::HexString(second),
    ]))
}

/// Pack `objects` into one Flate-compressed object stream.
fn object_stream(objects: &[(u32, Object)]) -> Result<Stream> {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for (num, obj) in objects {
        header.extend_from_slice(format!("{num} {} ", body.len()).as_bytes());
        write_object(&mut body, obj);
        body.push(b'\n');
    }
    let first = header.len();
    header.extend_from_slice(&body);
    let mut stream = Stream::from_content(
        crate::dict! {
            "Type" => Object::name("ObjStm"),
            "N" => objects.len(),
            "First" => first,
            "Filter" => Object::name("FlateDecode"),
        },
        header,
    );
    stream.encode()?;
    Ok(stream)
}

/// Free slots below `size`, linked into a list headed by object 0.
fn free_entries(
    ctx: &Context,
    numbering: &Numbering,
    used: &BTreeMap<u32, XRefEntry>,
    size: u32,
) -> Vec<(u32, XRefEntry)> {
    let free: Vec<u32> = (1..size).filter(|n| !used.contains_key(n)).collect();
    let mut entries = Vec::with_capacity(free.len() + 1);
    let head = free.first().copied().unwrap_or(0);
    entries.push((0, XRefEntry::Free { next: head, generation: 65535 }));
    for (i, &num) in free.iter().enumerate() {
        let next = free.get(i + 1).copied().unwrap_or(0);
        // Slots we vacated get their generation bumped.
        let generation = if numbering.compact {
            0
        } else {
            match ctx.xref.get(num) {
                Some(XRefEntry::Free { generation, .. }) => *generation,
                Some(entry) => entry.generation().saturating_add(1).min(65535),
                None => 0,
            }
        };
        entries.push((num, XRefEntry::Free { next, generation }));
    }
    entries
}

fn write_indirect<W: Write>(w: &mut CountingWriter<W>, num: u32, generation: u16, obj: &Object, eol: Eol) -> Result<()> {
    w.write_line(format!("{num} {generation} obj").as_bytes(), eol)?;
    let mut text = Vec::new();
    write_object(&mut text, obj);
    w.write_line(&text, eol)?;
    if let Object::Stream(stream) = obj {
        w.write_line(b"stream", eol)?;
        w.write_all(&stream.data)?;
        w.write_all(eol.as_bytes())?;
        w.write_line(b"endstream", eol)?;
    }
    w.write_line(b"endobj", eol)?;
    Ok(())
}

/// Entries are exactly 20 bytes; a one-byte EOL is preceded by a space.
fn write_xref_table<W: Write>(w: &mut CountingWriter<W>, entries: &BTreeMap<u32, XRefEntry>, size: u32, eol: Eol) -> Result<()> {
    let ending: &[u8] = match eol {
        Eol::Lf => b" \n",
        Eol::Cr => b" \r",
        Eol::CrLf => b"\r\n",
    };
    w.write_line(b"xref", eol)?;
    w.write_line(format!("0 {size}").as_bytes(), eol)?;
    for num in 0..size {
        let line = match entries.get(&num) {
            Some(XRefEntry::InUse { offset, generation, .. }) => format!("{offset:010} {generation:05} n"),
            Some(XRefEntry::Free { next, generation }) => format!("{next:010} {generation:05} f"),
            _ => format!("{:010} {:05} f", 0, 65535),
        };
        w.write_all(line.as_bytes())?;
        w.write_all(ending)?;
    }
    Ok(())
}

/// Cross-reference stream with `/W [1 n 2]`, Flate plus PNG Up rows.
fn xref_stream(entries: &BTreeMap<u32, XRefEntry>, size: u32, trailer: Dict) -> Result<Stream> {
    let max_offset = entries
        .values()
        .map(|e| match e {
            XRefEntry::InUse { offset, .. } => *offset as u64,
            XRefEntry::Compressed { stream, .. } => u64::from(*stream),
            XRefEntry::Free { next, .. } => u64::from(*next),
        })
        .max()
        .unwrap_or(0);
    let mut width = 1;
    while width < 8 && max_offset >> (8 * width) != 0 {
        width += 1;
    }
    let mut rows = Vec::with_capacity(size as usize * (width + 3));
    for num in 0..size {
        let (kind, field2, field3) = match entries.get(&num) {
            Some(XRefEntry::InUse { offset, generation, .. }) => (1u8, *offset as u64, u32::from(*generation)),
            Some(XRefEntry::Compressed { stream, index, .. }) => (2, u64::from(*stream), *index),
            Some(XRefEntry::Free { next, generation }) => (0, u64::from(*next), u32::from(*generation)),
            None => (0, 0, 65535),
        };
        rows.push(kind);
        rows.extend_from_slice(&field2.to_be_bytes()[8 - width..]);
        rows.extend_from_slice(&(field3.min(65535) as u16).to_be_bytes());
    }
    let mut dict = crate::dict! {
        "Type" => Object::name("XRef"),
        "Size" => size,
        "W" => vec![Object::Int(1), Object::Int(width as i64), Object::Int(2)],
        "Filter" => Object::name("FlateDecode"),
        "DecodeParms" => crate::dict! { "Predictor" => 12, "Columns" => width + 3 },
    };
    for (key, value) in reorder_trailer(trailer) {
        dict.insert(key, value);
    }
    let mut stream = Stream::from_content(dict, rows);
    stream.encode()?;
    Ok(stream)
}

/// Conventional trailer key order.
fn reorder_trailer(trailer: Dict) -> Dict {
    let mut ordered = Dict::new();
    for key in ["Size", "Root", "Info", "ID", "Encrypt"] {
        if let Some(v) = trailer.get(key) {
            ordered.insert(key, v.clone());
        }
    }
    ordered
}

/// Buffered sink that tracks its byte position.
struct CountingWriter<W: Write> {
    inner: BufWriter<W>,
    pos: usize,
}

impl<W: Write> CountingWriter<W> {
    fn new(sink: W) -> Self {
        Self {
            inner: BufWriter::new(sink),
            pos: 0,
        }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len();
        Ok(())
    }

    fn write_line(&mut self, data: &[u8], eol: Eol) -> Result<()> {
        self.write_all(data)?;
        self.write_all(eol.as_bytes())
    }

    fn finish(mut self) -> Result<usize> {
        self.inner.flush()?;
        Ok(self.pos)
    }
}
