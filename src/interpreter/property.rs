//! Property access
//!
//! Own-property lookup consults, in order: dense elements (arrays and
//! arguments objects; holes fall through), string-wrapper characters, the
//! virtual `length` of arrays and string wrappers, then the named layout.
//!
//! `get_by_id`/`put_by_id` put the inline caches in front of the generic
//! paths. A cache entry is only consulted for string keys on class-mode
//! objects, and never for the virtual `length`.

use crate::bytecode::{BytecodeChunk, CacheIndex};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::cache::PropertyCacheEntry;
use crate::object::shape::PropertyFlags;
use crate::object::{JsObject, ObjectKind, Shape, Slot};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey, to_uint32};

use super::Interpreter;

/// Arrays are dense; writing past this index is an invalid length
const MAX_DENSE_LENGTH: usize = 1 << 24;

const ARRAY_LENGTH_FLAGS: PropertyFlags = PropertyFlags {
    writable: true,
    enumerable: false,
    configurable: false,
    accessor: false,
};

const STRING_CHAR_FLAGS: PropertyFlags = PropertyFlags {
    writable: false,
    enumerable: true,
    configurable: false,
    accessor: false,
};

const STRING_LENGTH_FLAGS: PropertyFlags = PropertyFlags {
    writable: false,
    enumerable: false,
    configurable: false,
    accessor: false,
};

/// An own property as stored
#[derive(Debug, Clone)]
pub(crate) struct OwnProperty {
    pub slot: Slot,
    pub flags: PropertyFlags,
}

/// Partial descriptor for `Object.defineProperty`. `get`/`set` of
/// `Some(None)` means "present and undefined".
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub get: Option<Option<ObjectId>>,
    pub set: Option<Option<ObjectId>>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn data(value: JsValue, flags: PropertyFlags) -> Self {
        Self {
            value: Some(value),
            writable: Some(flags.writable),
            get: None,
            set: None,
            enumerable: Some(flags.enumerable),
            configurable: Some(flags.configurable),
        }
    }
}

/// Keys whose value is computed from the object kind
fn is_virtual_length(obj: &JsObject, key: &PropertyKey) -> bool {
    matches!(obj.kind, ObjectKind::Array | ObjectKind::String(_)) && key.eq_str("length")
}

fn uses_dense_elements(obj: &JsObject) -> bool {
    matches!(obj.kind, ObjectKind::Array | ObjectKind::Arguments)
}

fn key_text(key: &PropertyKey) -> String {
    key.to_string()
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════════
    // Own properties
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn get_own_property(
        &self,
        id: ObjectId,
        key: &PropertyKey,
    ) -> Result<Option<OwnProperty>, JsError> {
        let obj = self.obj(id)?;
        if let PropertyKey::Index(index) = key {
            if let ObjectKind::String(s) = &obj.kind
                && let Some(unit) = s.code_unit_at(*index as usize)
            {
                return Ok(Some(OwnProperty {
                    slot: Slot::Data(JsValue::String(unit)),
                    flags: STRING_CHAR_FLAGS,
                }));
            }
            if let Some(value) = obj.element(*index) {
                return Ok(Some(OwnProperty {
                    slot: Slot::Data(value.cheap_clone()),
                    flags: PropertyFlags::DEFAULT,
                }));
            }
        }
        if is_virtual_length(obj, key) {
            return Ok(Some(match &obj.kind {
                ObjectKind::String(s) => OwnProperty {
                    slot: Slot::Data(JsValue::Number(s.utf16_len() as f64)),
                    flags: STRING_LENGTH_FLAGS,
                },
                _ => OwnProperty {
                    slot: Slot::Data(JsValue::Number(obj.elements.len() as f64)),
                    flags: ARRAY_LENGTH_FLAGS,
                },
            }));
        }
        Ok(obj.lookup_own(&self.classes, key).and_then(|info| {
            obj.slot(info.slot).map(|slot| OwnProperty {
                slot: slot.clone(),
                flags: info.flags,
            })
        }))
    }

    pub(crate) fn has_own_property(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, JsError> {
        Ok(self.get_own_property(id, key)?.is_some())
    }

    pub(crate) fn has_property(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, JsError> {
        let mut current = Some(id);
        while let Some(cur) = current {
            if self.get_own_property(cur, key)?.is_some() {
                return Ok(true);
            }
            current = self.obj(cur)?.prototype;
        }
        Ok(false)
    }

    /// Own keys: integer indices ascending, then strings in insertion
    /// order, then symbols in insertion order
    pub(crate) fn own_keys(&self, id: ObjectId) -> Result<Vec<PropertyKey>, JsError> {
        let obj = self.obj(id)?;
        let named = obj.named_keys(&self.classes);
        let mut indices: Vec<u32> = named.iter().filter_map(|(k, _)| k.as_index()).collect();
        match &obj.kind {
            ObjectKind::String(s) => indices.extend(0..s.utf16_len() as u32),
            _ => indices.extend(
                obj.elements
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(i, _)| i as u32),
            ),
        }
        indices.sort_unstable();
        indices.dedup();

        let mut keys: Vec<PropertyKey> = indices.into_iter().map(PropertyKey::Index).collect();
        if matches!(obj.kind, ObjectKind::Array | ObjectKind::String(_)) {
            keys.push(PropertyKey::from("length"));
        }
        keys.extend(
            named
                .iter()
                .filter(|(k, _)| matches!(k, PropertyKey::String(_)))
                .map(|(k, _)| k.cheap_clone()),
        );
        keys.extend(
            named
                .iter()
                .filter(|(k, _)| k.is_symbol())
                .map(|(k, _)| k.cheap_clone()),
        );
        Ok(keys)
    }

    /// Own enumerable string-keyed properties, in `own_keys` order
    pub(crate) fn own_enumerable_string_keys(&self, id: ObjectId) -> Result<Vec<PropertyKey>, JsError> {
        let mut keys = Vec::new();
        for key in self.own_keys(id)? {
            if key.is_symbol() {
                continue;
            }
            if self
                .get_own_property(id, &key)?
                .is_some_and(|p| p.flags.enumerable)
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Get
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn primitive_prototype(&self, value: &JsValue) -> Option<ObjectId> {
        match value {
            JsValue::Boolean(_) => Some(self.realm.boolean_prototype),
            JsValue::Number(_) => Some(self.realm.number_prototype),
            JsValue::String(_) => Some(self.realm.string_prototype),
            JsValue::Symbol(_) => Some(self.realm.symbol_prototype),
            JsValue::BigInt(_) => Some(self.realm.bigint_prototype),
            _ => None,
        }
    }

    /// `[[Get]]` starting at `start` with `receiver` as `this` for getters.
    /// `None` when no object on the chain has the property.
    fn lookup_property(
        &mut self,
        start: ObjectId,
        key: &PropertyKey,
        receiver: &JsValue,
    ) -> Result<Option<JsValue>, JsError> {
        let mut current = Some(start);
        while let Some(cur) = current {
            if let Some(prop) = self.get_own_property(cur, key)? {
                return match prop.slot {
                    Slot::Data(value) => Ok(Some(value)),
                    Slot::Accessor { getter: Some(g), .. } => self
                        .call_value(&JsValue::Object(g), receiver.cheap_clone(), &[])
                        .map(Some),
                    Slot::Accessor { getter: None, .. } => Ok(Some(JsValue::Undefined)),
                };
            }
            current = self.obj(cur)?.prototype;
        }
        Ok(None)
    }

    pub(crate) fn get_property(&mut self, id: ObjectId, key: &PropertyKey) -> Result<JsValue, JsError> {
        Ok(self
            .lookup_property(id, key, &JsValue::Object(id))?
            .unwrap_or(JsValue::Undefined))
    }

    fn get_value_property_opt(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
    ) -> Result<Option<JsValue>, JsError> {
        match target {
            JsValue::Object(id) => self.lookup_property(*id, key, target),
            JsValue::Undefined | JsValue::Null | JsValue::Empty => {
                Err(JsError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    if matches!(target, JsValue::Null) { "null" } else { "undefined" },
                    key_text(key)
                )))
            }
            JsValue::String(s) => {
                if key.eq_str("length") {
                    return Ok(Some(JsValue::Number(s.utf16_len() as f64)));
                }
                if let Some(index) = key.as_index()
                    && let Some(unit) = s.code_unit_at(index as usize)
                {
                    return Ok(Some(JsValue::String(unit)));
                }
                self.lookup_property(self.realm.string_prototype, key, target)
            }
            primitive => match self.primitive_prototype(primitive) {
                Some(proto) => self.lookup_property(proto, key, target),
                None => Ok(None),
            },
        }
    }

    /// `target[key]` for any value; primitives read through their prototype
    pub(crate) fn get_value_property(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
    ) -> Result<JsValue, JsError> {
        Ok(self
            .get_value_property_opt(target, key)?
            .unwrap_or(JsValue::Undefined))
    }

    /// Whether the caches may describe `key` on this object
    fn cacheable(obj: &JsObject, key: &PropertyKey) -> bool {
        matches!(key, PropertyKey::String(_)) && !obj.is_dictionary() && !is_virtual_length(obj, key)
    }

    fn probe_cache(
        &self,
        id: ObjectId,
        key: &PropertyKey,
        entry: &PropertyCacheEntry,
    ) -> Result<Option<JsValue>, JsError> {
        let obj = self.obj(id)?;
        if entry.class.is_none() || obj.class_id() != entry.class || !Self::cacheable(obj, key) {
            return Ok(None);
        }
        let holder = match entry.proto_class {
            None => obj,
            Some(proto_class) => match obj.prototype {
                Some(proto) => {
                    let p = self.obj(proto)?;
                    if p.class_id() != Some(proto_class) {
                        return Ok(None);
                    }
                    p
                }
                None => return Ok(None),
            },
        };
        Ok(holder
            .slot(entry.slot)
            .and_then(Slot::value)
            .map(CheapClone::cheap_clone))
    }

    fn fill_cache(
        &self,
        id: ObjectId,
        key: &PropertyKey,
        chunk: &BytecodeChunk,
        cache: CacheIndex,
    ) -> Result<(), JsError> {
        let obj = self.obj(id)?;
        let Some(class) = obj.class_id() else {
            return Ok(());
        };
        if !Self::cacheable(obj, key) {
            return Ok(());
        }
        if let Some(info) = obj.lookup_own(&self.classes, key) {
            if !info.flags.accessor {
                chunk.caches.set(cache, PropertyCacheEntry::own(class, info.slot));
            }
            return Ok(());
        }
        let Some(proto) = obj.prototype else {
            return Ok(());
        };
        let p = self.obj(proto)?;
        if let Some(proto_class) = p.class_id()
            && Self::cacheable(p, key)
            && !(uses_dense_elements(p) && key.as_index().is_some())
            && let Some(info) = p.lookup_own(&self.classes, key)
            && !info.flags.accessor
        {
            chunk
                .caches
                .set(cache, PropertyCacheEntry::proto(class, proto_class, info.slot));
        }
        Ok(())
    }

    /// Cached `[[Get]]`. `None` when the property exists nowhere.
    pub(crate) fn get_by_id(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
        chunk: &BytecodeChunk,
        cache: CacheIndex,
    ) -> Result<Option<JsValue>, JsError> {
        if let JsValue::Object(id) = target
            && matches!(key, PropertyKey::String(_))
        {
            let entry = chunk.caches.get(cache);
            if let Some(value) = self.probe_cache(*id, key, &entry)? {
                self.cache_stats.hits += 1;
                return Ok(Some(value));
            }
            self.cache_stats.misses += 1;
            self.fill_cache(*id, key, chunk, cache)?;
        }
        self.get_value_property_opt(target, key)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Set
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cached `[[Set]]`; the fast path covers own writable data properties
    pub(crate) fn put_by_id(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
        value: JsValue,
        chunk: &BytecodeChunk,
        cache: CacheIndex,
    ) -> Result<(), JsError> {
        let strict = self.frame()?.is_strict();
        let JsValue::Object(id) = target else {
            return self.set_value_property(target, key.cheap_clone(), value, strict);
        };
        if !matches!(key, PropertyKey::String(_)) {
            return self.set_property(*id, key.cheap_clone(), value, strict);
        }
        let entry = chunk.caches.get(cache);
        if !entry.on_proto() && entry.class.is_some() {
            let obj = self.obj_mut(*id)?;
            if obj.class_id() == entry.class
                && !is_virtual_length(obj, key)
                && let Some(slot) = obj.slot_mut(entry.slot)
                && matches!(slot, Slot::Data(_))
            {
                *slot = Slot::Data(value);
                self.cache_stats.hits += 1;
                return Ok(());
            }
        }
        self.cache_stats.misses += 1;
        self.set_property(*id, key.cheap_clone(), value, strict)?;

        let obj = self.obj(*id)?;
        if let Some(class) = obj.class_id()
            && Self::cacheable(obj, key)
            && let Some(info) = obj.lookup_own(&self.classes, key)
            && info.flags.writable
            && !info.flags.accessor
        {
            chunk.caches.set(cache, PropertyCacheEntry::own(class, info.slot));
        }
        Ok(())
    }

    /// `target[key] = value` for any value
    pub(crate) fn set_value_property(
        &mut self,
        target: &JsValue,
        key: PropertyKey,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        match target {
            JsValue::Object(id) => self.set_property(*id, key, value, strict),
            JsValue::Undefined | JsValue::Null | JsValue::Empty => {
                Err(JsError::type_error(format!(
                    "Cannot set properties of {} (setting '{}')",
                    if matches!(target, JsValue::Null) { "null" } else { "undefined" },
                    key_text(&key)
                )))
            }
            primitive => {
                if let JsValue::String(s) = primitive
                    && (key.eq_str("length")
                        || key.as_index().is_some_and(|i| (i as usize) < s.utf16_len()))
                {
                    if strict {
                        return Err(JsError::type_error(format!(
                            "Cannot assign to read-only property '{}' of string '{}'",
                            key_text(&key),
                            s
                        )));
                    }
                    return Ok(());
                }
                let mut current = self.primitive_prototype(primitive);
                while let Some(cur) = current {
                    if let Some(prop) = self.get_own_property(cur, &key)? {
                        if let Slot::Accessor { setter: Some(s), .. } = prop.slot {
                            self.call_value(&JsValue::Object(s), primitive.cheap_clone(), &[value])?;
                            return Ok(());
                        }
                        break;
                    }
                    current = self.obj(cur)?.prototype;
                }
                if strict {
                    let shown = self.display_primitive(primitive);
                    return Err(JsError::type_error(format!(
                        "Cannot create property '{}' on {} '{}'",
                        key_text(&key),
                        self.type_of(primitive),
                        shown
                    )));
                }
                Ok(())
            }
        }
    }

    /// Ordinary `[[Set]]` with the object itself as receiver
    pub(crate) fn set_property(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        let mut current = Some(id);
        while let Some(cur) = current {
            if let Some(prop) = self.get_own_property(cur, &key)? {
                match prop.slot {
                    Slot::Accessor { setter: Some(s), .. } => {
                        self.call_value(&JsValue::Object(s), JsValue::Object(id), &[value])?;
                        return Ok(());
                    }
                    Slot::Accessor { setter: None, .. } => {
                        if strict {
                            return Err(JsError::type_error(format!(
                                "Cannot set property {} of #<Object> which has only a getter",
                                key_text(&key)
                            )));
                        }
                        return Ok(());
                    }
                    Slot::Data(_) => {
                        if !prop.flags.writable {
                            if strict {
                                return Err(JsError::type_error(format!(
                                    "Cannot assign to read-only property '{}' of object",
                                    key_text(&key)
                                )));
                            }
                            return Ok(());
                        }
                        if cur == id {
                            return self.write_own_data(id, &key, value);
                        }
                        break;
                    }
                }
            }
            current = self.obj(cur)?.prototype;
        }
        self.create_own_data(id, key, value, strict)
    }

    /// Overwrite an existing own writable data property
    fn write_own_data(&mut self, id: ObjectId, key: &PropertyKey, value: JsValue) -> Result<(), JsError> {
        let obj = self.obj(id)?;
        if matches!(obj.kind, ObjectKind::Array) && key.eq_str("length") {
            return self.set_array_length(id, &value);
        }
        if let Some(index) = key.as_index()
            && uses_dense_elements(obj)
            && obj.element(index).is_some()
        {
            let obj = self.obj_mut(id)?;
            if let Some(slot) = obj.elements.get_mut(index as usize) {
                *slot = value;
            }
            return Ok(());
        }
        let info = obj
            .lookup_own(&self.classes, key)
            .ok_or_else(|| JsError::internal_error("own property vanished during set"))?;
        if let Some(slot) = self.obj_mut(id)?.slot_mut(info.slot) {
            *slot = Slot::Data(value);
        }
        Ok(())
    }

    fn create_own_data(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        value: JsValue,
        strict: bool,
    ) -> Result<(), JsError> {
        if !self.obj(id)?.extensible {
            if strict {
                return Err(JsError::type_error(format!(
                    "Cannot add property {}, object is not extensible",
                    key_text(&key)
                )));
            }
            return Ok(());
        }
        self.define_data_property(id, key, value, PropertyFlags::DEFAULT)
    }

    fn set_array_element(&mut self, id: ObjectId, index: u32, value: JsValue) -> Result<(), JsError> {
        let idx = index as usize;
        let obj = self.obj_mut(id)?;
        if idx < obj.elements.len() {
            if let Some(slot) = obj.elements.get_mut(idx) {
                *slot = value;
            }
            return Ok(());
        }
        if idx >= MAX_DENSE_LENGTH {
            return Err(JsError::range_error("Invalid array length"));
        }
        obj.elements.resize(idx, JsValue::Empty);
        obj.elements.push(value);
        Ok(())
    }

    pub(crate) fn set_array_length(&mut self, id: ObjectId, value: &JsValue) -> Result<(), JsError> {
        let n = self.to_number(value)?;
        let len = to_uint32(n);
        if len as f64 != n {
            return Err(JsError::range_error("Invalid array length"));
        }
        let len = len as usize;
        if len > MAX_DENSE_LENGTH {
            return Err(JsError::range_error("Invalid array length"));
        }
        let obj = self.obj_mut(id)?;
        obj.elements.resize(len, JsValue::Empty);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Define
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create or overwrite an own data property with `flags`
    pub(crate) fn define_data_property(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        value: JsValue,
        flags: PropertyFlags,
    ) -> Result<(), JsError> {
        let obj = self.obj(id)?;
        if matches!(obj.kind, ObjectKind::Array) && key.eq_str("length") {
            return self.set_array_length(id, &value);
        }
        let named = obj.lookup_own(&self.classes, &key);
        if let Some(index) = key.as_index()
            && uses_dense_elements(obj)
        {
            if named.is_none() && flags == PropertyFlags::DEFAULT {
                return self.set_array_element(id, index, value);
            }
            self.punch_hole(id, index)?;
        }
        let classes = &mut self.classes;
        let obj = self
            .heap
            .get_mut(id)
            .ok_or_else(|| JsError::internal_error("dangling object in define"))?;
        if named.is_some() {
            obj.redefine_property(classes, &key, flags, Slot::Data(value))
        } else {
            obj.add_property(classes, &key, flags, Slot::Data(value))
        }
    }

    /// Mark an element as stored in the named layout instead
    fn punch_hole(&mut self, id: ObjectId, index: u32) -> Result<(), JsError> {
        let idx = index as usize;
        if idx >= MAX_DENSE_LENGTH {
            return Err(JsError::range_error("Invalid array length"));
        }
        let obj = self.obj_mut(id)?;
        if idx >= obj.elements.len() {
            obj.elements.resize(idx + 1, JsValue::Empty);
        } else if let Some(slot) = obj.elements.get_mut(idx) {
            *slot = JsValue::Empty;
        }
        Ok(())
    }

    /// Object-literal accessor definition; an absent half keeps the
    /// existing one
    pub(crate) fn define_accessor_property(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
        enumerable: bool,
    ) -> Result<(), JsError> {
        let (old_getter, old_setter) = match self.get_own_property(id, &key)? {
            Some(OwnProperty {
                slot: Slot::Accessor { getter, setter },
                ..
            }) => (getter, setter),
            _ => (None, None),
        };
        let slot = Slot::Accessor {
            getter: getter.or(old_getter),
            setter: setter.or(old_setter),
        };
        let flags = PropertyFlags {
            enumerable,
            ..PropertyFlags::ACCESSOR
        };
        self.write_named_slot(id, key, slot, flags)
    }

    fn write_named_slot(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        slot: Slot,
        flags: PropertyFlags,
    ) -> Result<(), JsError> {
        if let Some(index) = key.as_index()
            && uses_dense_elements(self.obj(id)?)
        {
            self.punch_hole(id, index)?;
        }
        let classes = &mut self.classes;
        let obj = self
            .heap
            .get_mut(id)
            .ok_or_else(|| JsError::internal_error("dangling object in define"))?;
        if obj.lookup_own(classes, &key).is_some() {
            obj.redefine_property(classes, &key, flags, slot)
        } else {
            obj.add_property(classes, &key, flags, slot)
        }
    }

    /// `[[DefineOwnProperty]]` as used by `Object.defineProperty`
    pub(crate) fn define_own_property(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<(), JsError> {
        let current = self.get_own_property(id, &key)?;
        let redefine = || JsError::type_error(format!("Cannot redefine property: {}", key_text(&key)));

        let (slot, flags) = match current {
            None => {
                if !self.obj(id)?.extensible {
                    return Err(JsError::type_error(format!(
                        "Cannot define property {}, object is not extensible",
                        key_text(&key)
                    )));
                }
                if desc.is_accessor() {
                    (
                        Slot::Accessor {
                            getter: desc.get.flatten(),
                            setter: desc.set.flatten(),
                        },
                        PropertyFlags {
                            writable: false,
                            enumerable: desc.enumerable.unwrap_or(false),
                            configurable: desc.configurable.unwrap_or(false),
                            accessor: true,
                        },
                    )
                } else {
                    (
                        Slot::Data(desc.value.unwrap_or(JsValue::Undefined)),
                        PropertyFlags {
                            writable: desc.writable.unwrap_or(false),
                            enumerable: desc.enumerable.unwrap_or(false),
                            configurable: desc.configurable.unwrap_or(false),
                            accessor: false,
                        },
                    )
                }
            }
            Some(cur) => {
                let was_accessor = matches!(cur.slot, Slot::Accessor { .. });
                let becomes_accessor = desc.is_accessor();
                let kind_change = (becomes_accessor && !was_accessor)
                    || (!becomes_accessor
                        && was_accessor
                        && (desc.value.is_some() || desc.writable.is_some()));
                if !cur.flags.configurable {
                    if desc.configurable == Some(true)
                        || desc.enumerable.is_some_and(|e| e != cur.flags.enumerable)
                        || kind_change
                    {
                        return Err(redefine());
                    }
                    match &cur.slot {
                        Slot::Data(old) if !cur.flags.writable => {
                            if desc.writable == Some(true)
                                || desc.value.as_ref().is_some_and(|v| !v.same_value(old))
                            {
                                return Err(redefine());
                            }
                        }
                        Slot::Accessor { getter, setter } => {
                            if desc.get.is_some_and(|g| g != *getter)
                                || desc.set.is_some_and(|s| s != *setter)
                            {
                                return Err(redefine());
                            }
                        }
                        Slot::Data(_) => {}
                    }
                }
                let enumerable = desc.enumerable.unwrap_or(cur.flags.enumerable);
                let configurable = desc.configurable.unwrap_or(cur.flags.configurable);
                if becomes_accessor || (was_accessor && !kind_change) {
                    let (old_get, old_set) = match cur.slot {
                        Slot::Accessor { getter, setter } => (getter, setter),
                        Slot::Data(_) => (None, None),
                    };
                    (
                        Slot::Accessor {
                            getter: desc.get.unwrap_or(old_get),
                            setter: desc.set.unwrap_or(old_set),
                        },
                        PropertyFlags {
                            writable: false,
                            enumerable,
                            configurable,
                            accessor: true,
                        },
                    )
                } else {
                    let (old_value, old_writable) = match cur.slot {
                        Slot::Data(v) => (v, cur.flags.writable),
                        Slot::Accessor { .. } => (JsValue::Undefined, false),
                    };
                    (
                        Slot::Data(desc.value.unwrap_or(old_value)),
                        PropertyFlags {
                            writable: desc.writable.unwrap_or(old_writable),
                            enumerable,
                            configurable,
                            accessor: false,
                        },
                    )
                }
            }
        };

        let obj = self.obj(id)?;
        if is_virtual_length(obj, &key) {
            if let (ObjectKind::Array, Slot::Data(value)) = (&obj.kind, &slot) {
                return self.set_array_length(id, value);
            }
            return Err(redefine());
        }
        match slot {
            Slot::Data(value) => self.define_data_property(id, key, value, flags),
            accessor => self.write_named_slot(id, key, accessor, flags),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Delete
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn delete_value_property(
        &mut self,
        target: &JsValue,
        key: &PropertyKey,
        strict: bool,
    ) -> Result<bool, JsError> {
        match target {
            JsValue::Object(id) => self.delete_property(*id, key, strict),
            JsValue::Undefined | JsValue::Null | JsValue::Empty => Err(JsError::type_error(
                "Cannot convert undefined or null to object",
            )),
            JsValue::String(s)
                if key.eq_str("length")
                    || key.as_index().is_some_and(|i| (i as usize) < s.utf16_len()) =>
            {
                if strict {
                    return Err(JsError::type_error(format!(
                        "Cannot delete property '{}' of [object String]",
                        key_text(key)
                    )));
                }
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    pub(crate) fn delete_property(
        &mut self,
        id: ObjectId,
        key: &PropertyKey,
        strict: bool,
    ) -> Result<bool, JsError> {
        let Some(prop) = self.get_own_property(id, key)? else {
            return Ok(true);
        };
        if !prop.flags.configurable {
            if strict {
                return Err(JsError::type_error(format!(
                    "Cannot delete property '{}' of #<Object>",
                    key_text(key)
                )));
            }
            return Ok(false);
        }
        let classes = &self.classes;
        let obj = self
            .heap
            .get_mut(id)
            .ok_or_else(|| JsError::internal_error("dangling object in delete"))?;
        if let Some(index) = key.as_index()
            && let Some(slot) = obj.elements.get_mut(index as usize)
            && !slot.is_empty()
        {
            *slot = JsValue::Empty;
            return Ok(true);
        }
        let removed = obj.remove_property(classes, key)?;
        if removed {
            tracing::trace!(key = %key, "delete moved object to dictionary mode");
        }
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // New-object layout cache
    // ═══════════════════════════════════════════════════════════════════════════

    /// Give a fresh `this` the final layout of `keys` in one step. Objects
    /// that already have properties, or are not plain objects, are left
    /// alone and take the per-store path.
    pub(crate) fn stamp_new_object(
        &mut self,
        target: &JsValue,
        keys: &[JsString],
        chunk: &BytecodeChunk,
        cache: CacheIndex,
    ) -> Result<(), JsError> {
        let Some(id) = target.as_object() else {
            return Ok(());
        };
        let root = self.classes.root();
        {
            let obj = self.obj(id)?;
            if obj.class_id() != Some(root)
                || !obj.slots.is_empty()
                || !matches!(obj.kind, ObjectKind::Ordinary)
            {
                return Ok(());
            }
        }
        if self.prototype_intercepts_stores(id, keys)? {
            return Ok(());
        }
        let entry = chunk.caches.get(cache);
        let class = match entry.class {
            Some(class) if !entry.on_proto() => {
                self.cache_stats.hits += 1;
                class
            }
            _ => {
                self.cache_stats.misses += 1;
                let mut class = root;
                for key in keys {
                    let (next, _) = self.classes.add_property(
                        class,
                        &PropertyKey::from(key.cheap_clone()),
                        PropertyFlags::DEFAULT,
                    )?;
                    class = next;
                }
                chunk.caches.set(cache, PropertyCacheEntry::own(class, 0));
                class
            }
        };
        let count = self.classes.property_count(class);
        let obj = self.obj_mut(id)?;
        obj.shape = Shape::Class(class);
        obj.slots = vec![Slot::Data(JsValue::Undefined); count];
        Ok(())
    }

    /// True if a prototype of `id` holds any of `keys` as a setter or a
    /// read-only property, so a plain store would not create an own slot
    fn prototype_intercepts_stores(&self, id: ObjectId, keys: &[JsString]) -> Result<bool, JsError> {
        let mut current = self.obj(id)?.prototype;
        while let Some(proto) = current {
            for key in keys {
                let key = PropertyKey::from(key.cheap_clone());
                if let Some(prop) = self.get_own_property(proto, &key)?
                    && (prop.flags.accessor || !prop.flags.writable)
                {
                    return Ok(true);
                }
            }
            current = self.obj(proto)?.prototype;
        }
        Ok(false)
    }
}
