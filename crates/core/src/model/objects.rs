//! PDF object types.
//!
//! Objects form a cyclic graph; every edge between indirect objects is an
//! [`ObjRef`] resolved through the cross-reference table, never a pointer.

use crate::error::{PdfError, Result};
use indexmap::IndexMap;
use std::borrow::Cow;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font), stored without the leading slash
    Name(String),
    /// Literal string `( ... )`
    String(Vec<u8>),
    /// Hex string `< ... >`
    HexString(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping, insertion ordered)
    Dict(Dict),
    /// Stream (dictionary + binary data)
    Stream(Box<Stream>),
    /// Indirect object reference
    Ref(ObjRef),
}

/// Indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    pub num: u32,
    pub generation: u16,
}

impl ObjRef {
    pub const fn new(num: u32, generation: u16) -> Self {
        Self { num, generation }
    }
}

impl std::fmt::Display for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.num, self.generation)
    }
}

macro_rules! type_err {
    ($expected:expr, $obj:expr) => {
        PdfError::TypeError {
            expected: $expected,
            got: $obj.type_name(),
        }
    };
}

impl Object {
    /// Build a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Build a literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(bytes.into())
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(type_err!("bool", self)),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            // Some writers emit whole numbers as reals.
            Self::Real(n) if n.fract() == 0.0 => Ok(*n as i64),
            _ => Err(type_err!("int", self)),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(type_err!("number", self)),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(type_err!("name", self)),
        }
    }

    /// Get string bytes, literal or hex.
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) | Self::HexString(s) => Ok(s),
            _ => Err(type_err!("string", self)),
        }
    }

    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(type_err!("array", self)),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(type_err!("array", self)),
        }
    }

    pub const fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(type_err!("dict", self)),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(type_err!("dict", self)),
        }
    }

    pub fn as_stream(&self) -> Result<&Stream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(type_err!("stream", self)),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(type_err!("stream", self)),
        }
    }

    pub const fn as_ref(&self) -> Result<ObjRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(type_err!("reference", self)),
        }
    }

    /// Dictionary of a dict or of a stream.
    pub fn dict_like(&self) -> Option<&Dict> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn dict_like_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::HexString(_) => "hexstring",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "reference",
        }
    }

    /// Visit every indirect reference contained in this object.
    pub fn for_each_ref(&self, f: &mut impl FnMut(ObjRef)) {
        match self {
            Self::Ref(r) => f(*r),
            Self::Array(arr) => arr.iter().for_each(|o| o.for_each_ref(f)),
            Self::Dict(d) => d.values().for_each(|o| o.for_each_ref(f)),
            Self::Stream(s) => s.dict.values().for_each(|o| o.for_each_ref(f)),
            _ => {}
        }
    }

    /// Rewrite every indirect reference contained in this object.
    pub fn map_refs(&mut self, f: &mut impl FnMut(ObjRef) -> ObjRef) {
        match self {
            Self::Ref(r) => *r = f(*r),
            Self::Array(arr) => arr.iter_mut().for_each(|o| o.map_refs(f)),
            Self::Dict(d) => d.values_mut().for_each(|o| o.map_refs(f)),
            Self::Stream(s) => s.dict.values_mut().for_each(|o| o.map_refs(f)),
            _ => {}
        }
    }

    /// Replace every indirect reference with whatever `f` returns.
    pub fn replace_refs(&mut self, f: &mut impl FnMut(ObjRef) -> Object) {
        match self {
            Self::Ref(r) => *self = f(*r),
            Self::Array(arr) => arr.iter_mut().for_each(|o| o.replace_refs(f)),
            Self::Dict(d) => d.values_mut().for_each(|o| o.replace_refs(f)),
            Self::Stream(s) => s.dict.values_mut().for_each(|o| o.replace_refs(f)),
            _ => {}
        }
    }

    /// Apply `f` to every string in this object (used by encryption).
    pub fn map_strings(&mut self, f: &mut impl FnMut(&[u8]) -> Result<Vec<u8>>) -> Result<()> {
        match self {
            Self::String(s) | Self::HexString(s) => *s = f(s)?,
            Self::Array(arr) => {
                for o in arr {
                    o.map_strings(f)?;
                }
            }
            Self::Dict(d) => {
                for o in d.values_mut() {
                    o.map_strings(f)?;
                }
            }
            Self::Stream(s) => {
                for o in s.dict.values_mut() {
                    o.map_strings(f)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u32> for Object {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for Object {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<ObjRef> for Object {
    fn from(v: ObjRef) -> Self {
        Self::Ref(v)
    }
}

impl From<Dict> for Object {
    fn from(v: Dict) -> Self {
        Self::Dict(v)
    }
}

impl From<Stream> for Object {
    fn from(v: Stream) -> Self {
        Self::Stream(Box::new(v))
    }
}

impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Self::Array(v)
    }
}

/// Ordered dictionary keyed by name (without the slash).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict(IndexMap<String, Object>);

impl Dict {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Object>) -> Option<Object> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Object> {
        self.0.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Object> {
        self.0.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Object> {
        self.0.values()
    }

    pub fn values_mut(&mut self) -> indexmap::map::ValuesMut<'_, String, Object> {
        self.0.values_mut()
    }

    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|o| o.as_name().ok())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|o| o.as_int().ok())
    }

    pub fn get_ref(&self, key: &str) -> Option<ObjRef> {
        self.get(key).and_then(|o| o.as_ref().ok())
    }

    /// The /Type entry, if present.
    pub fn type_name(&self) -> Option<&str> {
        self.get_name("Type")
    }

    pub fn has_type(&self, ty: &str) -> bool {
        self.type_name() == Some(ty)
    }
}

impl FromIterator<(String, Object)> for Dict {
    fn from_iter<T: IntoIterator<Item = (String, Object)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Dict {
    type Item = (String, Object);
    type IntoIter = indexmap::map::IntoIter<String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dict {
    type Item = (&'a String, &'a Object);
    type IntoIter = indexmap::map::Iter<'a, String, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`Dict`] from `key => value` pairs.
#[macro_export]
macro_rules! dict {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut d = $crate::model::objects::Dict::new();
        $(d.insert($key, $value);)*
        d
    }};
}

/// PDF Stream object.
///
/// `data` holds either the encoded payload (as stored in the file, after
/// decryption) or the fully decoded payload, as recorded by `decoded`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dict,
    pub data: Vec<u8>,
    pub decoded: bool,
}

impl Stream {
    /// Stream with an encoded payload, as read from a file.
    pub fn new(dict: Dict, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            decoded: false,
        }
    }

    /// Stream with a decoded payload; the writer encodes it per /Filter.
    pub fn from_content(dict: Dict, content: Vec<u8>) -> Self {
        Self {
            dict,
            data: content,
            decoded: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.dict.get(key)
    }

    /// Whether the filter chain contains a filter named `name`.
    pub fn has_filter(&self, name: &str) -> bool {
        crate::codec::filter_names(&self.dict).iter().any(|f| f == name)
    }

    /// Decode in place; subsequent calls are no-ops.
    pub fn decode(&mut self) -> Result<()> {
        if !self.decoded {
            self.data = crate::codec::decode(&self.data, &self.dict)?;
            self.decoded = true;
        }
        Ok(())
    }

    /// Decoded payload without mutating the stream.
    pub fn decoded_data(&self) -> Result<Cow<'_, [u8]>> {
        if self.decoded {
            Ok(Cow::Borrowed(&self.data))
        } else {
            crate::codec::decode(&self.data, &self.dict).map(Cow::Owned)
        }
    }

    /// Encode in place per /Filter and refresh /Length.
    pub fn encode(&mut self) -> Result<()> {
        if self.decoded {
            self.data = crate::codec::encode(&self.data, &self.dict)?;
            self.decoded = false;
        }
        self.dict.insert("Length", self.data.len());
        Ok(())
    }

    /// Replace the payload with decoded content.
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.data = content;
        self.decoded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_preserves_insertion_order() {
        let d = dict! { "Type" => Object::name("Page"), "Count" => 2, "Alpha" => true };
        let keys: Vec<_> = d.keys().cloned().collect();
        assert_eq!(keys, vec!["Type", "Count", "Alpha"]);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut d = dict! { "A" => 1, "B" => 2, "C" => 3 };
        d.remove("A");
        let keys: Vec<_> = d.keys().cloned().collect();
        assert_eq!(keys, vec!["B", "C"]);
    }

    #[test]
    fn test_type_error_names_kinds() {
        let err = Object::Int(3).as_dict().unwrap_err();
        assert!(matches!(
            err,
            PdfError::TypeError {
                expected: "dict",
                got: "int"
            }
        ));
    }

    #[test]
    fn test_map_refs_reaches_nested_values() {
        let mut obj = Object::Dict(dict! {
            "Kids" => vec![Object::Ref(ObjRef::new(4, 0)), Object::Ref(ObjRef::new(5, 0))],
            "Parent" => ObjRef::new(2, 0),
        });
        obj.map_refs(&mut |r| ObjRef::new(r.num + 10, 0));
        let mut seen = Vec::new();
        obj.for_each_ref(&mut |r| seen.push(r.num));
        assert_eq!(seen, vec![14, 15, 12]);
    }
}
