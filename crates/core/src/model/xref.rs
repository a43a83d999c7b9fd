//! Cross-reference table.

use super::objects::{ObjRef, Object};
use std::collections::BTreeMap;

/// Storage location of one object number.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    Free {
        next: u32,
        generation: u16,
    },
    /// Stored at a byte offset. Objects created in memory use offset 0 and
    /// always carry a populated slot.
    InUse {
        offset: usize,
        generation: u16,
        object: Option<Object>,
    },
    /// Stored inside an object stream.
    Compressed {
        stream: u32,
        index: u32,
        object: Option<Object>,
    },
}

impl XRefEntry {
    pub const fn is_free(&self) -> bool {
        matches!(self, Self::Free { .. })
    }

    pub const fn generation(&self) -> u16 {
        match self {
            Self::Free { generation, .. } | Self::InUse { generation, .. } => *generation,
            Self::Compressed { .. } => 0,
        }
    }

    pub const fn object(&self) -> Option<&Object> {
        match self {
            Self::Free { .. } => None,
            Self::InUse { object, .. } | Self::Compressed { object, .. } => object.as_ref(),
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Self::Free { .. } => None,
            Self::InUse { object, .. } | Self::Compressed { object, .. } => object.as_mut(),
        }
    }

    pub(crate) fn set_object(&mut self, obj: Object) {
        match self {
            Self::Free { .. } => {}
            Self::InUse { object, .. } | Self::Compressed { object, .. } => *object = Some(obj),
        }
    }
}

/// Mapping from object number to storage; object 0 is always free.
#[derive(Debug, Clone, PartialEq)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
}

impl Default for XRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XRefTable {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(0, XRefEntry::Free { next: 0, generation: 65535 });
        Self { entries }
    }

    pub fn get(&self, num: u32) -> Option<&XRefEntry> {
        self.entries.get(&num)
    }

    pub fn get_mut(&mut self, num: u32) -> Option<&mut XRefEntry> {
        self.entries.get_mut(&num)
    }

    /// Insert an entry; object 0 cannot be replaced.
    pub fn insert(&mut self, num: u32, entry: XRefEntry) {
        if num != 0 {
            self.entries.insert(num, entry);
        }
    }

    /// Insert only if no entry exists yet. Used when loading older sections.
    pub fn insert_if_absent(&mut self, num: u32, entry: XRefEntry) {
        if num != 0 {
            self.entries.entry(num).or_insert(entry);
        }
    }

    pub fn contains(&self, num: u32) -> bool {
        self.entries.contains_key(&num)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut XRefEntry)> {
        self.entries.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Object numbers of in-use and compressed entries, ascending.
    pub fn in_use_numbers(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn max_obj_nr(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Value for the trailer /Size.
    pub fn size(&self) -> u32 {
        self.max_obj_nr() + 1
    }

    /// Store a new in-memory object under the next free number.
    pub fn add(&mut self, obj: Object) -> ObjRef {
        let num = self.max_obj_nr() + 1;
        self.entries.insert(
            num,
            XRefEntry::InUse {
                offset: 0,
                generation: 0,
                object: Some(obj),
            },
        );
        ObjRef::new(num, 0)
    }

    /// Mark an entry free, bumping its generation.
    pub fn free(&mut self, num: u32) {
        if num == 0 {
            return;
        }
        if let Some(entry) = self.entries.get_mut(&num) {
            let generation = entry.generation().saturating_add(1).min(65535);
            *entry = XRefEntry::Free { next: 0, generation };
        }
    }

    pub fn free_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_free()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_zero_is_free() {
        let mut table = XRefTable::new();
        table.insert(
            0,
            XRefEntry::InUse {
                offset: 9,
                generation: 0,
                object: None,
            },
        );
        assert_eq!(table.get(0), Some(&XRefEntry::Free { next: 0, generation: 65535 }));
    }

    #[test]
    fn test_add_and_free() {
        let mut table = XRefTable::new();
        let r = table.add(Object::Int(1));
        assert_eq!(r, ObjRef::new(1, 0));
        assert_eq!(table.size(), 2);
        table.free(1);
        assert_eq!(table.get(1), Some(&XRefEntry::Free { next: 0, generation: 1 }));
        assert_eq!(table.free_count(), 2);
    }
}
