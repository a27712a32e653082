//! Inline property caches.
//!
//! Each property-access instruction owns one cache entry in its chunk. An
//! entry remembers the hidden class it last saw and the slot the property
//! lived in. Entries are monomorphic and are simply overwritten on a miss.
//!
//! An entry with `proto_class` set describes a property found on the direct
//! prototype. It applies only when the receiver still has the class that
//! missed the property (so its own lookup definitely misses again) and the
//! receiver's current prototype has `proto_class`.

use std::cell::Cell;

use super::shape::ClassId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyCacheEntry {
    /// Receiver class
    pub class: Option<ClassId>,
    pub proto_class: Option<ClassId>,
    pub slot: u32,
}

impl PropertyCacheEntry {
    pub fn own(class: ClassId, slot: u32) -> Self {
        Self {
            class: Some(class),
            proto_class: None,
            slot,
        }
    }

    pub fn proto(class: ClassId, proto_class: ClassId, slot: u32) -> Self {
        Self {
            class: Some(class),
            proto_class: Some(proto_class),
            slot,
        }
    }

    pub fn on_proto(&self) -> bool {
        self.proto_class.is_some()
    }
}

/// Per-chunk cache storage, mutable through a shared chunk
#[derive(Clone, Debug, Default)]
pub struct PropertyCaches {
    entries: Box<[Cell<PropertyCacheEntry>]>,
}

impl PropertyCaches {
    pub fn new(count: usize) -> Self {
        Self {
            entries: (0..count).map(|_| Cell::new(PropertyCacheEntry::default())).collect(),
        }
    }

    pub fn get(&self, index: u16) -> PropertyCacheEntry {
        self.entries
            .get(index as usize)
            .map(Cell::get)
            .unwrap_or_default()
    }

    pub fn set(&self, index: u16, entry: PropertyCacheEntry) {
        if let Some(cell) = self.entries.get(index as usize) {
            cell.set(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        for cell in self.entries.iter() {
            cell.set(PropertyCacheEntry::default());
        }
    }
}

/// Hit/miss counters for property caches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}
