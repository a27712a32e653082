//! Heap objects.
//!
//! Every heap cell is a `JsObject`. Named properties live in `slots`, laid
//! out by the object's hidden class (or its private dictionary). Array-like
//! objects keep their indexed elements in a dense `elements` vector where
//! `JsValue::Empty` marks a hole. `kind` carries the exotic payload:
//! callable state, environments, generators, promises, collections.

pub mod cache;
pub mod function;
pub mod shape;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::environment::Environment;
use crate::error::JsError;
use crate::gc::{ObjectId, Traceable};
use crate::interpreter::generator::GeneratorState;
use crate::interpreter::promise::PromiseState;
use crate::value::{CheapClone, JsBigInt, JsString, JsSymbol, JsValue, MapKey, PropertyKey};

use function::{Callable, trace_value};
use shape::{ClassId, ClassTable, DICTIONARY_THRESHOLD, DictionaryMap, PropertyFlags, SlotInfo};

/// Property storage cell
#[derive(Debug, Clone)]
pub enum Slot {
    Data(JsValue),
    Accessor {
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
    },
}

impl Slot {
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Slot::Data(v) => Some(v),
            Slot::Accessor { .. } => None,
        }
    }
}

/// Named-property layout of an object
#[derive(Debug, Clone)]
pub enum Shape {
    /// Shared class from the transition tree; cacheable
    Class(ClassId),
    /// Private layout; never cached
    Dictionary(Box<DictionaryMap>),
}

/// Which view an iterator produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationKind {
    Keys,
    Values,
    Entries,
}

/// Exotic payload of an object
pub enum ObjectKind {
    Ordinary,
    Array,
    Arguments,
    Function(Callable),
    Error,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Symbol(JsSymbol),
    BigInt(JsBigInt),
    Environment(Environment),
    Generator(Box<GeneratorState>),
    Promise(Box<PromiseState>),
    Map(IndexMap<MapKey, (JsValue, JsValue), FxBuildHasher>),
    Set(IndexMap<MapKey, JsValue, FxBuildHasher>),
    ArrayIterator {
        target: JsValue,
        index: usize,
        kind: IterationKind,
        done: bool,
    },
    CollectionIterator {
        target: ObjectId,
        index: usize,
        kind: IterationKind,
        done: bool,
    },
}

impl ObjectKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary | ObjectKind::Environment(_) => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Arguments => "Arguments",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Boolean(_) => "Boolean",
            ObjectKind::Number(_) => "Number",
            ObjectKind::String(_) => "String",
            ObjectKind::Symbol(_) => "Symbol",
            ObjectKind::BigInt(_) => "BigInt",
            ObjectKind::Generator(_) => "Generator",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Set(_) => "Set",
            ObjectKind::ArrayIterator { .. } => "Array Iterator",
            ObjectKind::CollectionIterator { .. } => "Iterator",
        }
    }
}

pub struct JsObject {
    pub prototype: Option<ObjectId>,
    pub shape: Shape,
    pub slots: Vec<Slot>,
    pub elements: Vec<JsValue>,
    pub extensible: bool,
    pub kind: ObjectKind,
}

impl JsObject {
    pub fn new(prototype: Option<ObjectId>, class: ClassId, kind: ObjectKind) -> Self {
        Self {
            prototype,
            shape: Shape::Class(class),
            slots: Vec::new(),
            elements: Vec::new(),
            extensible: true,
            kind,
        }
    }

    /// Hidden class, or `None` in dictionary mode
    pub fn class_id(&self) -> Option<ClassId> {
        match &self.shape {
            Shape::Class(id) => Some(*id),
            Shape::Dictionary(_) => None,
        }
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.shape, Shape::Dictionary(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn callable(&self) -> Option<&Callable> {
        match &self.kind {
            ObjectKind::Function(c) => Some(c),
            _ => None,
        }
    }

    /// Arrays, arguments objects and string wrappers keep indexed elements
    pub fn has_elements(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Array | ObjectKind::Arguments | ObjectKind::String(_)
        ) || !self.elements.is_empty()
    }

    pub fn lookup_own(&self, classes: &ClassTable, key: &PropertyKey) -> Option<SlotInfo> {
        match &self.shape {
            Shape::Class(id) => classes.lookup(*id, key),
            Shape::Dictionary(dict) => dict.properties.get(key).copied(),
        }
    }

    pub fn slot(&self, index: u32) -> Option<&Slot> {
        self.slots.get(index as usize)
    }

    pub fn slot_mut(&mut self, index: u32) -> Option<&mut Slot> {
        self.slots.get_mut(index as usize)
    }

    /// Own data value of a named property (no accessors, no prototype walk)
    pub fn own_data(&self, classes: &ClassTable, key: &PropertyKey) -> Option<JsValue> {
        let info = self.lookup_own(classes, key)?;
        self.slot(info.slot)?.value().map(CheapClone::cheap_clone)
    }

    /// Append a new named property. The key must not already exist.
    pub fn add_property(
        &mut self,
        classes: &mut ClassTable,
        key: &PropertyKey,
        flags: PropertyFlags,
        slot: Slot,
    ) -> Result<(), JsError> {
        if let Shape::Class(id) = self.shape
            && classes.property_count(id) >= DICTIONARY_THRESHOLD
        {
            self.make_dictionary(classes)?;
        }
        match &mut self.shape {
            Shape::Class(id) => {
                let (next, info) = classes.add_property(*id, key, flags)?;
                *id = next;
                let index = info.slot as usize;
                if index < self.slots.len() {
                    if let Some(s) = self.slots.get_mut(index) {
                        *s = slot;
                    }
                } else {
                    self.slots.push(slot);
                }
            }
            Shape::Dictionary(dict) => {
                let index = match dict.free_slots.pop() {
                    Some(free) => free,
                    None => {
                        self.slots.push(Slot::Data(JsValue::Undefined));
                        (self.slots.len() - 1) as u32
                    }
                };
                dict.properties.insert(key.cheap_clone(), SlotInfo { slot: index, flags });
                if let Some(s) = self.slots.get_mut(index as usize) {
                    *s = slot;
                }
            }
        }
        Ok(())
    }

    /// Leave the transition tree for a private layout
    pub fn make_dictionary(&mut self, classes: &ClassTable) -> Result<(), JsError> {
        if let Shape::Class(id) = self.shape {
            self.shape = Shape::Dictionary(Box::new(classes.to_dictionary(id)?));
        }
        Ok(())
    }

    /// Remove a named property. Returns false if it was not present.
    pub fn remove_property(
        &mut self,
        classes: &ClassTable,
        key: &PropertyKey,
    ) -> Result<bool, JsError> {
        if self.lookup_own(classes, key).is_none() {
            return Ok(false);
        }
        self.make_dictionary(classes)?;
        if let Shape::Dictionary(dict) = &mut self.shape
            && let Some(info) = dict.properties.shift_remove(key)
        {
            if let Some(s) = self.slots.get_mut(info.slot as usize) {
                *s = Slot::Data(JsValue::Undefined);
            }
            dict.free_slots.push(info.slot);
        }
        Ok(true)
    }

    /// Change an existing property's attributes and storage in place
    pub fn redefine_property(
        &mut self,
        classes: &ClassTable,
        key: &PropertyKey,
        flags: PropertyFlags,
        slot: Slot,
    ) -> Result<(), JsError> {
        let current = self.lookup_own(classes, key);
        match current {
            Some(info) if info.flags == flags => {
                if let Some(s) = self.slots.get_mut(info.slot as usize) {
                    *s = slot;
                }
            }
            Some(_) => {
                self.make_dictionary(classes)?;
                if let Shape::Dictionary(dict) = &mut self.shape
                    && let Some(info) = dict.properties.get_mut(key)
                {
                    info.flags = flags;
                    if let Some(s) = self.slots.get_mut(info.slot as usize) {
                        *s = slot;
                    }
                }
            }
            None => {
                return Err(JsError::internal_error(format!(
                    "redefine of missing property {}",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Own named keys in insertion order
    pub fn named_keys(&self, classes: &ClassTable) -> Vec<(PropertyKey, SlotInfo)> {
        match &self.shape {
            Shape::Class(id) => classes
                .get(*id)
                .map(|c| {
                    c.properties()
                        .iter()
                        .map(|(k, v)| (k.cheap_clone(), *v))
                        .collect()
                })
                .unwrap_or_default(),
            Shape::Dictionary(dict) => dict
                .properties
                .iter()
                .map(|(k, v)| (k.cheap_clone(), *v))
                .collect(),
        }
    }

    pub fn element(&self, index: u32) -> Option<&JsValue> {
        self.elements.get(index as usize).filter(|v| !v.is_empty())
    }

    pub fn environment(&self) -> Option<&Environment> {
        match &self.kind {
            ObjectKind::Environment(env) => Some(env),
            _ => None,
        }
    }

    pub fn environment_mut(&mut self) -> Option<&mut Environment> {
        match &mut self.kind {
            ObjectKind::Environment(env) => Some(env),
            _ => None,
        }
    }
}

impl Traceable for JsObject {
    fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        if let Some(proto) = self.prototype {
            visitor(proto);
        }
        for slot in &self.slots {
            match slot {
                Slot::Data(v) => trace_value(v, visitor),
                Slot::Accessor { getter, setter } => {
                    if let Some(g) = getter {
                        visitor(*g);
                    }
                    if let Some(s) = setter {
                        visitor(*s);
                    }
                }
            }
        }
        for v in &self.elements {
            trace_value(v, visitor);
        }
        match &self.kind {
            ObjectKind::Function(callable) => callable.trace(visitor),
            ObjectKind::Environment(env) => env.trace(visitor),
            ObjectKind::Generator(state) => state.trace(visitor),
            ObjectKind::Promise(state) => state.trace(visitor),
            ObjectKind::Map(entries) => {
                for (k, v) in entries.values() {
                    trace_value(k, visitor);
                    trace_value(v, visitor);
                }
            }
            ObjectKind::Set(entries) => {
                for v in entries.values() {
                    trace_value(v, visitor);
                }
            }
            ObjectKind::ArrayIterator { target, .. } => trace_value(target, visitor),
            ObjectKind::CollectionIterator { target, .. } => visitor(*target),
            ObjectKind::Ordinary
            | ObjectKind::Array
            | ObjectKind::Arguments
            | ObjectKind::Error
            | ObjectKind::Boolean(_)
            | ObjectKind::Number(_)
            | ObjectKind::String(_)
            | ObjectKind::Symbol(_)
            | ObjectKind::BigInt(_) => {}
        }
    }
}
