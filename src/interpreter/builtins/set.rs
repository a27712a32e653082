//! Set constructor and Set.prototype

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::object::shape::PropertyFlags;
use crate::object::{IterationKind, ObjectKind};
use crate::value::{CheapClone, JsValue, MapKey};

use super::map::{collection_iterator_next, create_collection_iterator, fill_from_iterable};
use super::{arg, define_hidden, register_constructor, requires_new};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.set_prototype;
    interp.register_method(proto, "add", set_add, 1);
    interp.register_method(proto, "has", set_has, 1);
    interp.register_method(proto, "delete", set_delete, 1);
    interp.register_method(proto, "clear", set_clear, 0);
    interp.register_method(proto, "forEach", set_for_each, 1);
    interp.register_method(proto, "entries", set_entries, 0);
    interp.register_getter(proto, "size", set_size);

    // keys, values and @@iterator are the same function object
    let values = interp.create_native_function("values", set_values, 0, None);
    define_hidden(interp, proto, "values", JsValue::Object(values));
    define_hidden(interp, proto, "keys", JsValue::Object(values));
    let iterator_key = super::iterator_key(interp);
    interp.define_raw(
        proto,
        iterator_key,
        JsValue::Object(values),
        PropertyFlags::HIDDEN,
    );

    register_constructor(interp, "Set", set_call, Some(set_construct), 0, proto);

    let iter_proto = interp.realm.set_iterator_prototype;
    interp.register_method(iter_proto, "next", collection_iterator_next, 0);
}

fn set_call(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(requires_new("Set"))
}

fn set_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let fallback = interp.realm.set_prototype;
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    let set = interp.alloc_object(Some(proto), ObjectKind::Set(IndexMap::with_hasher(FxBuildHasher)));
    let iterable = arg(args, 0);
    if iterable.is_nullish() {
        return Ok(JsValue::Object(set));
    }
    let scope = interp.guard_scope();
    interp.guard_value(&JsValue::Object(set));
    let result = fill_from_iterable(interp, &iterable, |interp, value| {
        insert(set_entries_mut(interp, set)?, value);
        Ok(())
    });
    interp.release_guards(scope);
    result?;
    Ok(JsValue::Object(set))
}

fn insert(entries: &mut IndexMap<MapKey, JsValue, FxBuildHasher>, value: JsValue) {
    let value = match value {
        JsValue::Number(n) if n == 0.0 => JsValue::Number(0.0),
        other => other,
    };
    entries.entry(MapKey::from_value(&value)).or_insert(value);
}

fn this_set(interp: &Interpreter, this: &JsValue, method: &str) -> Result<ObjectId, JsError> {
    match this {
        JsValue::Object(id) if matches!(interp.obj(*id)?.kind, ObjectKind::Set(_)) => Ok(*id),
        other => Err(JsError::type_error(format!(
            "Method Set.prototype.{} called on incompatible receiver {}",
            method,
            interp.display_primitive(other)
        ))),
    }
}

fn set_entries_mut(
    interp: &mut Interpreter,
    id: ObjectId,
) -> Result<&mut IndexMap<MapKey, JsValue, FxBuildHasher>, JsError> {
    match &mut interp.obj_mut(id)?.kind {
        ObjectKind::Set(entries) => Ok(entries),
        _ => Err(JsError::internal_error("set storage missing")),
    }
}

fn set_entries_ref(interp: &Interpreter, id: ObjectId) -> Result<&IndexMap<MapKey, JsValue, FxBuildHasher>, JsError> {
    match &interp.obj(id)?.kind {
        ObjectKind::Set(entries) => Ok(entries),
        _ => Err(JsError::internal_error("set storage missing")),
    }
}

fn set_add(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "add")?;
    insert(set_entries_mut(interp, id)?, arg(args, 0));
    Ok(this)
}

fn set_has(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "has")?;
    let key = MapKey::from_value(&arg(args, 0));
    Ok(JsValue::Boolean(set_entries_ref(interp, id)?.contains_key(&key)))
}

fn set_delete(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "delete")?;
    let key = MapKey::from_value(&arg(args, 0));
    Ok(JsValue::Boolean(set_entries_mut(interp, id)?.shift_remove(&key).is_some()))
}

fn set_clear(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "clear")?;
    set_entries_mut(interp, id)?.clear();
    Ok(JsValue::Undefined)
}

fn set_size(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "size")?;
    Ok(JsValue::Number(set_entries_ref(interp, id)?.len() as f64))
}

fn set_for_each(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "forEach")?;
    let callback = arg(args, 0);
    if !interp.is_callable(&callback) {
        return Err(JsError::type_error(format!(
            "{} is not a function",
            interp.describe_for_error(&callback)
        )));
    }
    let this_arg = arg(args, 1);
    let mut index = 0;
    loop {
        let entry = set_entries_ref(interp, id)?
            .get_index(index)
            .map(|(_, v)| v.cheap_clone());
        let Some(value) = entry else {
            break;
        };
        interp.call_value(
            &callback,
            this_arg.cheap_clone(),
            &[value.cheap_clone(), value, this.cheap_clone()],
        )?;
        index += 1;
    }
    Ok(JsValue::Undefined)
}

fn set_values(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "values")?;
    Ok(create_collection_iterator(interp, id, IterationKind::Values))
}

fn set_entries(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_set(interp, &this, "entries")?;
    Ok(create_collection_iterator(interp, id, IterationKind::Entries))
}
