//! Hidden classes.
//!
//! A hidden class describes an object's named-property layout: which keys it
//! has, in what order they were added, their attribute flags and the slot
//! each one occupies. Classes form a transition tree rooted at the empty
//! class; adding the same key with the same flags to two objects of the same
//! class always lands both on the same child class, so layout identity is
//! class identity.
//!
//! Classes are owned by the `ClassTable` and never collected. Objects whose
//! layout changes in ways the tree cannot express (deletion, attribute
//! changes, very many properties) leave the tree for a private
//! `DictionaryMap` stored on the object itself.

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::error::JsError;
use crate::value::{CheapClone, PropertyKey};

/// Objects with more named properties than this switch to dictionary mode
pub const DICTIONARY_THRESHOLD: usize = 64;

/// Insertion-ordered key to slot map
pub type PropertyMap = IndexMap<PropertyKey, SlotInfo, FxBuildHasher>;

/// Index into the class table
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Property attributes
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PropertyFlags {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    /// Slot holds a getter/setter pair instead of a value
    pub accessor: bool,
}

impl PropertyFlags {
    /// Plain assignment: writable, enumerable, configurable
    pub const DEFAULT: PropertyFlags = PropertyFlags {
        writable: true,
        enumerable: true,
        configurable: true,
        accessor: false,
    };

    /// Built-in methods and other non-enumerable data
    pub const HIDDEN: PropertyFlags = PropertyFlags {
        writable: true,
        enumerable: false,
        configurable: true,
        accessor: false,
    };

    /// Non-writable, non-enumerable, configurable (function `name`/`length`)
    pub const READONLY_HIDDEN: PropertyFlags = PropertyFlags {
        writable: false,
        enumerable: false,
        configurable: true,
        accessor: false,
    };

    pub const ACCESSOR: PropertyFlags = PropertyFlags {
        writable: false,
        enumerable: true,
        configurable: true,
        accessor: true,
    };
}

/// Where a property lives and how it behaves
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SlotInfo {
    pub slot: u32,
    pub flags: PropertyFlags,
}

/// One node of the transition tree
#[derive(Debug)]
pub struct HiddenClass {
    parent: Option<ClassId>,
    properties: PropertyMap,
    transitions: FxHashMap<(PropertyKey, PropertyFlags), ClassId>,
}

impl HiddenClass {
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }
}

/// Private layout of a dictionary-mode object
#[derive(Debug, Clone, Default)]
pub struct DictionaryMap {
    pub properties: PropertyMap,
    /// Slots vacated by deletions, reused by later additions
    pub free_slots: Vec<u32>,
}

/// Owner of every shared hidden class
pub struct ClassTable {
    classes: Vec<HiddenClass>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self {
            classes: vec![HiddenClass {
                parent: None,
                properties: PropertyMap::default(),
                transitions: FxHashMap::default(),
            }],
        }
    }

    /// The empty class every fresh object starts in
    pub fn root(&self) -> ClassId {
        ClassId(0)
    }

    pub fn get(&self, id: ClassId) -> Option<&HiddenClass> {
        self.classes.get(id.index())
    }

    fn class(&self, id: ClassId) -> Result<&HiddenClass, JsError> {
        self.get(id)
            .ok_or_else(|| JsError::internal_error(format!("unknown hidden class {}", id.0)))
    }

    pub fn lookup(&self, id: ClassId, key: &PropertyKey) -> Option<SlotInfo> {
        self.get(id)?.properties.get(key).copied()
    }

    pub fn property_count(&self, id: ClassId) -> usize {
        self.get(id).map_or(0, HiddenClass::property_count)
    }

    /// Follow (or create) the transition for adding `key` with `flags`.
    /// Returns the child class and the new property's slot.
    pub fn add_property(
        &mut self,
        id: ClassId,
        key: &PropertyKey,
        flags: PropertyFlags,
    ) -> Result<(ClassId, SlotInfo), JsError> {
        let parent = self.class(id)?;
        let slot = parent.properties.len() as u32;
        let info = SlotInfo { slot, flags };
        if let Some(next) = parent.transitions.get(&(key.cheap_clone(), flags)) {
            return Ok((*next, info));
        }

        let mut properties = parent.properties.clone();
        properties.insert(key.cheap_clone(), info);
        let next = ClassId(self.classes.len() as u32);
        self.classes.push(HiddenClass {
            parent: Some(id),
            properties,
            transitions: FxHashMap::default(),
        });
        if let Some(parent) = self.classes.get_mut(id.index()) {
            parent.transitions.insert((key.cheap_clone(), flags), next);
        }
        Ok((next, info))
    }

    /// Copy a class's layout into a private dictionary
    pub fn to_dictionary(&self, id: ClassId) -> Result<DictionaryMap, JsError> {
        Ok(DictionaryMap {
            properties: self.class(id)?.properties.clone(),
            free_slots: Vec::new(),
        })
    }

    /// Number of shared classes created so far
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}
