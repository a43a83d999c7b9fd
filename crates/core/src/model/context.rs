//! The root document handle.
//!
//! A [`Context`] owns the source bytes, the cross-reference table and every
//! object loaded from it. Objects are parsed on first dereference and cached
//! in their xref slot; object streams are expanded whole on first access.

use super::objects::{Dict, ObjRef, Object, Stream};
use super::xref::{XRefEntry, XRefTable};
use crate::config::{Command, Configuration};
use crate::document::permissions::{Permissions, Requirement, requirement};
use crate::document::security::{EncryptionState, Role};
use crate::error::{PdfError, Result};
use crate::optimize::OptimizationState;
use crate::parser::object::ObjectParser;
use crate::parser::reader::ObjectReader;
use crate::parser::xref;
use crate::writer::WriteState;
use bytes::Bytes;
use memmap2::Mmap;
use rustc_hash::FxHashSet;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info, warn};

/// Reference chains longer than this are treated as broken.
const MAX_REF_CHAIN: usize = 32;

/// Document being processed.
pub struct Context {
    source: Bytes,
    pub xref: XRefTable,
    pub trailer: Dict,
    pub root: ObjRef,
    /// PDF version as (major, minor).
    pub version: (u8, u8),
    /// Set by the validator.
    pub page_count: usize,
    pub encrypt: Option<EncryptionState>,
    /// The /Encrypt dictionary's own reference; never decrypted or encrypted.
    pub encrypt_ref: Option<ObjRef>,
    pub optimize: OptimizationState,
    pub write: WriteState,
    pub config: Configuration,
    /// The xref was rebuilt by scanning the file.
    pub rebuilt_xref: bool,
    loading: FxHashSet<u32>,
    loading_streams: FxHashSet<u32>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("source_len", &self.source.len())
            .field("objects", &self.xref.in_use_numbers().len())
            .field("root", &self.root)
            .field("version", &self.version)
            .field("page_count", &self.page_count)
            .field("encrypted", &self.encrypt.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// An empty document: a catalog and a page tree with no pages.
    pub fn new(config: Configuration) -> Self {
        let mut xref = XRefTable::new();
        let pages = xref.add(Object::Dict(crate::dict! {
            "Type" => Object::name("Pages"),
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        }));
        let root = xref.add(Object::Dict(crate::dict! {
            "Type" => Object::name("Catalog"),
            "Pages" => pages,
        }));
        let trailer = crate::dict! { "Size" => xref.size(), "Root" => root };
        Self {
            source: Bytes::new(),
            xref,
            trailer,
            root,
            version: (1, 7),
            page_count: 0,
            encrypt: None,
            encrypt_ref: None,
            optimize: OptimizationState::default(),
            write: WriteState::default(),
            config,
            rebuilt_xref: false,
            loading: FxHashSet::default(),
            loading_streams: FxHashSet::default(),
        }
    }

    /// Parse a document held in memory.
    pub fn from_bytes(data: impl Into<Bytes>, config: Configuration) -> Result<Self> {
        Self::read(data.into(), config)
    }

    /// Parse a file through a memory map.
    pub fn from_path(path: impl AsRef<Path>, config: Configuration) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        // SAFETY: the map is read-only and the file is not modified while mapped.
        let mmap = unsafe { Mmap::map(&file) }?;
        Self::read(Bytes::from_owner(mmap), config)
    }

    /// Parse a document from any seekable source.
    pub fn from_reader<R: Read + Seek>(mut reader: R, config: Configuration) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::read(Bytes::from(data), config)
    }

    fn read(source: Bytes, config: Configuration) -> Result<Self> {
        let strict = config.is_strict();
        let version = parse_version(&xref::read_header_version(&source)?);
        let loaded = xref::load(&source, strict)?;
        let root = loaded
            .trailer
            .get_ref("Root")
            .ok_or_else(|| PdfError::parse(source.len(), "trailer without /Root"))?;
        let mut ctx = Self {
            source,
            xref: loaded.table,
            trailer: loaded.trailer,
            root,
            version,
            page_count: 0,
            encrypt: None,
            encrypt_ref: None,
            optimize: OptimizationState::default(),
            write: WriteState::default(),
            config,
            rebuilt_xref: loaded.rebuilt,
            loading: FxHashSet::default(),
            loading_streams: FxHashSet::default(),
        };
        if ctx.rebuilt_xref {
            ctx.index_object_streams();
        }
        ctx.setup_encryption()?;
        ctx.apply_catalog_version()?;
        info!(
            objects = ctx.xref.in_use_numbers().len(),
            version = ?ctx.version,
            encrypted = ctx.encrypt.is_some(),
            "parsed document"
        );
        Ok(ctx)
    }

    fn setup_encryption(&mut self) -> Result<()> {
        let Some(enc_obj) = self.trailer.get("Encrypt").cloned() else {
            return Ok(());
        };
        self.encrypt_ref = enc_obj.as_ref().ok();
        let dict = self.dereference_dict(&enc_obj)?;
        let id0 = self.file_id().map(|(first, _)| first).unwrap_or_default();
        let mut state = EncryptionState::from_dict(&dict, &id0)?;
        let (user, owner) = (
            self.config.user_password.clone(),
            self.config.owner_password.clone(),
        );
        match state.authenticate(&user, &owner) {
            Ok(_) => {}
            Err(PdfError::Auth) if self.config.command == Command::ListPermissions => {
                debug!("not authenticated, permissions listing only");
            }
            Err(e) => return Err(e),
        }
        self.encrypt = Some(state);
        Ok(())
    }

    fn apply_catalog_version(&mut self) -> Result<()> {
        let root = Object::Ref(self.root);
        let catalog = match self.resolve(&root) {
            Ok(Object::Dict(d)) => d,
            // The validator reports a bad catalog.
            Ok(_) => return Ok(()),
            Err(PdfError::Auth) => return Ok(()),
            Err(e) => return Err(e),
        };
        if let Some(v) = catalog.get_name("Version").map(parse_version)
            && v > self.version
        {
            self.version = v;
        }
        Ok(())
    }

    /// Raw source bytes.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn is_strict(&self) -> bool {
        self.config.is_strict()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }

    /// Both /ID strings, if present.
    pub fn file_id(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let ids = self.trailer.get("ID").cloned()?;
        let ids = self.resolve(&ids).ok()?;
        let arr = ids.as_array().ok()?;
        let first = arr.first()?.as_string().ok()?.to_vec();
        let second = arr
            .get(1)
            .and_then(|o| o.as_string().ok())
            .map_or_else(|| first.clone(), <[u8]>::to_vec);
        Some((first, second))
    }

    pub fn info_ref(&self) -> Option<ObjRef> {
        self.trailer.get_ref("Info")
    }

    // --- loading ---

    /// Make sure object `num` is parsed into its xref slot.
    fn load(&mut self, num: u32) -> Result<()> {
        let (offset, generation) = match self.xref.get(num) {
            Some(XRefEntry::InUse {
                object: None,
                offset,
                generation,
            }) => (*offset, *generation),
            Some(XRefEntry::Compressed {
                object: None,
                stream,
                ..
            }) => {
                let stream = *stream;
                return self.load_object_stream(stream);
            }
            _ => return Ok(()),
        };
        if !self.loading.insert(num) {
            return Err(PdfError::parse(offset, format!("reference cycle while loading object {num}")));
        }
        let result = self.parse_at(num, offset, generation);
        self.loading.remove(&num);
        let object = match result {
            Ok(obj) => obj,
            Err(PdfError::Auth) => return Err(PdfError::Auth),
            Err(e) if !self.is_strict() => {
                warn!(obj = num, offset, error = %e, "unreadable object treated as null");
                Object::Null
            }
            Err(e) => return Err(e),
        };
        if let Some(entry) = self.xref.get_mut(num) {
            entry.set_object(object);
        }
        Ok(())
    }

    fn parse_at(&mut self, num: u32, offset: usize, generation: u16) -> Result<Object> {
        let source = self.source.clone();
        let reader = ObjectReader::new(&source, self.is_strict());
        let found = reader.read_at(offset, &mut |r| {
            self.deref(r).ok().and_then(|o| o.as_int().ok())
        })?;
        if found.id.num != num {
            if self.is_strict() {
                return Err(PdfError::parse(
                    offset,
                    format!("expected object {num}, found {}", found.id),
                ));
            }
            warn!(offset, expected = num, found = %found.id, "xref offset points at another object");
        }
        let mut object = found.object;
        let id = ObjRef::new(num, generation);
        if let Some(state) = &self.encrypt
            && self.encrypt_ref != Some(id)
        {
            let state = state.clone();
            state.decrypt_object(id, &mut object)?;
        }
        if let Object::Stream(stream) = &mut object {
            self.resolve_filter_entries(&mut stream.dict)?;
        }
        Ok(object)
    }

    /// Inline indirect /Filter and /DecodeParms so the codecs see them.
    fn resolve_filter_entries(&mut self, dict: &mut Dict) -> Result<()> {
        for key in ["Filter", "DecodeParms"] {
            let Some(value) = dict.get(key).cloned() else {
                continue;
            };
            let mut value = self.resolve(&value)?;
            if let Object::Array(items) = &mut value {
                for item in items.iter_mut() {
                    *item = self.resolve(item)?;
                }
            }
            dict.insert(key, value);
        }
        Ok(())
    }

    /// Parse every object of object stream `num` into its xref slot.
    fn load_object_stream(&mut self, num: u32) -> Result<()> {
        if !self.loading_streams.insert(num) {
            return Err(PdfError::parse(0, format!("object stream {num} contains itself")));
        }
        let result = self.read_object_stream(num);
        self.loading_streams.remove(&num);
        let members = result?;
        for (obj_nr, object) in members {
            if let Some(entry) = self.xref.get_mut(obj_nr)
                && matches!(entry, XRefEntry::Compressed { stream, object: None, .. } if *stream == num)
            {
                entry.set_object(object);
            }
        }
        Ok(())
    }

    fn read_object_stream(&mut self, num: u32) -> Result<Vec<(u32, Object)>> {
        self.load(num)?;
        let stream = match self.xref.get(num).and_then(XRefEntry::object) {
            Some(Object::Stream(s)) => s.clone(),
            other => {
                return Err(PdfError::TypeError {
                    expected: "object stream",
                    got: other.map_or("null", Object::type_name),
                });
            }
        };
        parse_object_stream(num, &stream)
    }

    /// After a rebuild, register members of every object stream found.
    fn index_object_streams(&mut self) {
        for num in self.xref.in_use_numbers() {
            let is_objstm = matches!(
                self.get(ObjRef::new(num, 0)),
                Ok(Some(Object::Stream(s))) if s.dict.has_type("ObjStm")
            );
            if !is_objstm {
                continue;
            }
            let Ok(members) = self.read_object_stream(num) else {
                continue;
            };
            for (index, (obj_nr, object)) in members.into_iter().enumerate() {
                if !self.xref.contains(obj_nr) {
                    self.xref.insert(
                        obj_nr,
                        XRefEntry::Compressed {
                            stream: num,
                            index: index as u32,
                            object: Some(object),
                        },
                    );
                }
            }
        }
    }

    /// Parse every object in the table.
    pub fn load_all(&mut self) -> Result<()> {
        for num in self.xref.in_use_numbers() {
            self.load(num)?;
        }
        Ok(())
    }

    // --- dereference ---

    /// Borrow object `r`, parsing it if needed. Free or missing yields `None`.
    pub fn get(&mut self, r: ObjRef) -> Result<Option<&Object>> {
        self.load(r.num)?;
        Ok(self.xref.get(r.num).and_then(XRefEntry::object))
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Result<Option<&mut Object>> {
        self.load(r.num)?;
        Ok(self.xref.get_mut(r.num).and_then(XRefEntry::object_mut))
    }

    /// Clone of object `r`; Null when free or missing.
    pub fn deref(&mut self, r: ObjRef) -> Result<Object> {
        Ok(self.get(r)?.cloned().unwrap_or(Object::Null))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        let mut current = obj.clone();
        for _ in 0..MAX_REF_CHAIN {
            match current {
                Object::Ref(r) => current = self.deref(r)?,
                other => return Ok(other),
            }
        }
        warn!(obj = ?obj, "reference chain too long");
        Ok(Object::Null)
    }

    pub fn dereference_dict(&mut self, obj: &Object) -> Result<Dict> {
        match self.resolve(obj)? {
            Object::Dict(d) => Ok(d),
            other => Err(PdfError::TypeError {
                expected: "dict",
                got: other.type_name(),
            }),
        }
    }

    /// Like [`Self::dereference_dict`], but absent or non-dict yields `None`.
    pub fn dict_opt(&mut self, obj: &Object) -> Result<Option<Dict>> {
        match self.resolve(obj)? {
            Object::Dict(d) => Ok(Some(d)),
            _ => Ok(None),
        }
    }

    pub fn dereference_stream(&mut self, obj: &Object) -> Result<Stream> {
        match self.resolve(obj)? {
            Object::Stream(s) => Ok(*s),
            other => Err(PdfError::TypeError {
                expected: "stream",
                got: other.type_name(),
            }),
        }
    }

    pub fn dereference_array(&mut self, obj: &Object) -> Result<Vec<Object>> {
        match self.resolve(obj)? {
            Object::Array(a) => Ok(a),
            other => Err(PdfError::TypeError {
                expected: "array",
                got: other.type_name(),
            }),
        }
    }

    pub fn dereference_int(&mut self, obj: &Object) -> Result<i64> {
        self.resolve(obj)?.as_int()
    }

    /// Resolve `dict[key]`, treating a missing key as Null.
    pub fn resolve_key(&mut self, dict: &Dict, key: &str) -> Result<Object> {
        match dict.get(key) {
            Some(v) => self.resolve(v),
            None => Ok(Object::Null),
        }
    }

    /// Decoded payload of a stream object.
    pub fn stream_content(&mut self, obj: &Object) -> Result<Vec<u8>> {
        let stream = self.dereference_stream(obj)?;
        Ok(stream.decoded_data()?.into_owned())
    }

    pub fn catalog(&mut self) -> Result<Dict> {
        self.dereference_dict(&Object::Ref(self.root))
    }

    // --- mutation ---

    /// Store a new object under the next free number.
    pub fn add_object(&mut self, obj: impl Into<Object>) -> ObjRef {
        let r = self.xref.add(obj.into());
        self.trailer.insert("Size", self.xref.size());
        r
    }

    /// Replace the object stored at `r`.
    pub fn set_object(&mut self, r: ObjRef, obj: impl Into<Object>) {
        let obj = obj.into();
        match self.xref.get_mut(r.num) {
            Some(entry) if !entry.is_free() => entry.set_object(obj),
            _ => self.xref.insert(
                r.num,
                XRefEntry::InUse {
                    offset: 0,
                    generation: r.generation,
                    object: Some(obj),
                },
            ),
        }
    }

    /// Mark object `num` free.
    pub fn free_object(&mut self, num: u32) {
        self.xref.free(num);
    }

    // --- permissions ---

    pub fn permissions(&self) -> Option<Permissions> {
        self.encrypt
            .as_ref()
            .map(|e| Permissions::new(e.p, e.r))
    }

    /// Fail with a permission error unless the authenticated role may run `command`.
    pub fn ensure_permitted(&self, command: Command) -> Result<()> {
        let Some(state) = &self.encrypt else {
            return Ok(());
        };
        let role = state.role.ok_or(PdfError::Auth)?;
        if role == Role::Owner {
            return Ok(());
        }
        match requirement(command) {
            Requirement::Nothing => Ok(()),
            Requirement::Owner => Err(PdfError::Auth),
            Requirement::Permission(p) => {
                if Permissions::new(state.p, state.r).allows(p) {
                    Ok(())
                } else {
                    Err(PdfError::Permission(p))
                }
            }
        }
    }

    /// Raise the version to at least `min`.
    pub fn require_version(&mut self, min: (u8, u8)) {
        if self.version < min {
            self.version = min;
        }
    }
}

fn parse_version(s: &str) -> (u8, u8) {
    let mut parts = s.trim_start_matches('/').split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(4);
    (major, minor)
}

/// Parse the members of an object stream: `(obj_nr, object)` in index order.
pub(crate) fn parse_object_stream(num: u32, stream: &Stream) -> Result<Vec<(u32, Object)>> {
    let n = stream
        .dict
        .get_int("N")
        .ok_or_else(|| PdfError::parse(0, format!("object stream {num} without /N")))?
        .max(0) as usize;
    let first = stream
        .dict
        .get_int("First")
        .ok_or_else(|| PdfError::parse(0, format!("object stream {num} without /First")))?
        .max(0) as usize;
    let data = stream.decoded_data()?;
    if first > data.len() {
        return Err(PdfError::parse(first, format!("object stream {num}: /First beyond data")));
    }
    let mut header = ObjectParser::new(&data[..first]);
    // Each header entry takes at least four bytes.
    let mut index = Vec::with_capacity(n.min(first / 4));
    for _ in 0..n {
        let obj_nr = header.parse_object()?.as_int()?;
        let offset = header.parse_object()?.as_int()?;
        let obj_nr = u32::try_from(obj_nr)
            .ok()
            .filter(|&nr| nr >= 1)
            .ok_or_else(|| PdfError::parse(0, format!("object stream {num}: bad object number {obj_nr}")))?;
        let offset = usize::try_from(offset)
            .ok()
            .and_then(|o| first.checked_add(o))
            .ok_or_else(|| PdfError::parse(0, format!("object stream {num}: bad offset {offset}")))?;
        index.push((obj_nr, offset));
    }
    let mut members = Vec::with_capacity(index.len());
    for (obj_nr, offset) in index {
        if offset >= data.len() {
            warn!(stream = num, obj = obj_nr, "object stream offset out of range");
            continue;
        }
        let mut parser = ObjectParser::at(&data, offset);
        members.push((obj_nr, parser.parse_object()?));
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_has_empty_page_tree() {
        let mut ctx = Context::new(Configuration::default());
        let catalog = ctx.catalog().unwrap();
        let pages = ctx.dereference_dict(catalog.get("Pages").unwrap()).unwrap();
        assert_eq!(pages.get_int("Count"), Some(0));
        assert_eq!(ctx.trailer.get_int("Size"), Some(3));
    }

    #[test]
    fn test_free_object_dereferences_to_null() {
        let mut ctx = Context::new(Configuration::default());
        let r = ctx.add_object(Object::Int(5));
        ctx.free_object(r.num);
        assert_eq!(ctx.deref(r).unwrap(), Object::Null);
        assert_eq!(ctx.deref(ObjRef::new(999, 0)).unwrap(), Object::Null);
    }

    #[test]
    fn test_typed_dereference_fails_on_kind() {
        let mut ctx = Context::new(Configuration::default());
        let r = ctx.add_object(Object::Int(5));
        assert!(matches!(
            ctx.dereference_dict(&Object::Ref(r)),
            Err(PdfError::TypeError { expected: "dict", got: "int" })
        ));
    }

    #[test]
    fn test_parse_object_stream_members() {
        let stream = Stream::from_content(
            crate::dict! { "Type" => Object::name("ObjStm"), "N" => 2, "First" => 8 },
            b"5 0 6 2 42 (hi)".to_vec(),
        );
        let members = parse_object_stream(9, &stream).unwrap();
        assert_eq!(members[0], (5, Object::Int(42)));
        assert_eq!(members[1], (6, Object::String(b"hi".to_vec())));
    }

    #[test]
    fn test_object_stream_header_rejects_bad_entries() {
        let negative = Stream::from_content(
            crate::dict! { "Type" => Object::name("ObjStm"), "N" => 1, "First" => 5 },
            b"-3 0 42".to_vec(),
        );
        assert!(matches!(parse_object_stream(9, &negative), Err(PdfError::Parse { .. })));
        let huge = Stream::from_content(
            crate::dict! { "Type" => Object::name("ObjStm"), "N" => 1, "First" => 23 },
            format!("5 {} 42", i64::MAX).into_bytes(),
        );
        assert!(parse_object_stream(9, &huge).unwrap().is_empty());
        let many = Stream::from_content(
            crate::dict! { "Type" => Object::name("ObjStm"), "N" => i64::MAX, "First" => 4 },
            b"5 0 42".to_vec(),
        );
        assert!(parse_object_stream(9, &many).is_err());
    }

    #[test]
    fn test_compressed_objects_load_lazily() {
        let mut ctx = Context::new(Configuration::default());
        let value = ctx.add_object(Object::Int(42));
        let mut catalog = ctx.catalog().unwrap();
        catalog.insert("Answer", value);
        ctx.set_object(ctx.root, catalog);
        ctx.config.write_object_streams = true;
        let bytes = crate::writer::write_to_vec(&mut ctx).unwrap();

        let mut reread = Context::from_bytes(bytes, Configuration::default()).unwrap();
        assert!(matches!(reread.xref.get(reread.root.num), Some(XRefEntry::Compressed { .. })));
        let catalog = reread.catalog().unwrap();
        assert_eq!(reread.resolve_key(&catalog, "Answer").unwrap(), Object::Int(42));
    }
}
