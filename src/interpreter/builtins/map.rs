//! Map constructor, Map.prototype and the collection iterators shared with Set

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::object::{IterationKind, ObjectKind};
use crate::value::{CheapClone, JsValue, MapKey, PropertyKey};

use super::{arg, register_constructor, register_iterator_method, requires_new};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.map_prototype;
    interp.register_method(proto, "get", map_get, 1);
    interp.register_method(proto, "set", map_set, 2);
    interp.register_method(proto, "has", map_has, 1);
    interp.register_method(proto, "delete", map_delete, 1);
    interp.register_method(proto, "clear", map_clear, 0);
    interp.register_method(proto, "forEach", map_for_each, 1);
    interp.register_method(proto, "keys", map_keys, 0);
    interp.register_method(proto, "values", map_values, 0);
    interp.register_method(proto, "entries", map_entries, 0);
    register_iterator_method(interp, proto, "[Symbol.iterator]", map_entries, false);
    interp.register_getter(proto, "size", map_size);
    register_constructor(interp, "Map", map_call, Some(map_construct), 0, proto);

    let iter_proto = interp.realm.map_iterator_prototype;
    interp.register_method(iter_proto, "next", collection_iterator_next, 0);
}

fn map_call(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(requires_new("Map"))
}

fn map_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let fallback = interp.realm.map_prototype;
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    let map = interp.alloc_object(Some(proto), ObjectKind::Map(IndexMap::with_hasher(FxBuildHasher)));
    let iterable = arg(args, 0);
    if iterable.is_nullish() {
        return Ok(JsValue::Object(map));
    }
    let scope = interp.guard_scope();
    interp.guard_value(&JsValue::Object(map));
    let result = fill_from_iterable(interp, &iterable, |interp, entry| {
        let JsValue::Object(pair) = &entry else {
            return Err(JsError::type_error(format!(
                "Iterator value {} is not an entry object",
                interp.display_primitive(&entry)
            )));
        };
        let pair = *pair;
        let key = interp.get_property(pair, &PropertyKey::Index(0))?;
        let value = interp.get_property(pair, &PropertyKey::Index(1))?;
        map_entries_mut(interp, map)?.insert(MapKey::from_value(&key), (key, value));
        Ok(())
    });
    interp.release_guards(scope);
    result?;
    Ok(JsValue::Object(map))
}

/// Feed every value of `iterable` to `add`, closing the iterator on error
pub(crate) fn fill_from_iterable(
    interp: &mut Interpreter,
    iterable: &JsValue,
    mut add: impl FnMut(&mut Interpreter, JsValue) -> Result<(), JsError>,
) -> Result<(), JsError> {
    let iterator = interp.get_iterator(iterable)?;
    let scope = interp.guard_scope();
    interp.guard_value(&iterator);
    let result = loop {
        let (value, done) = match interp.iterator_step(&iterator) {
            Ok(step) => step,
            Err(e) => break Err(e),
        };
        if done {
            break Ok(());
        }
        if let Err(e) = add(interp, value) {
            let closed = interp.iterator_close(&iterator, true);
            break closed.and(Err(e));
        }
    };
    interp.release_guards(scope);
    result
}

fn this_map(interp: &Interpreter, this: &JsValue, method: &str) -> Result<ObjectId, JsError> {
    match this {
        JsValue::Object(id) if matches!(interp.obj(*id)?.kind, ObjectKind::Map(_)) => Ok(*id),
        other => Err(JsError::type_error(format!(
            "Method Map.prototype.{} called on incompatible receiver {}",
            method,
            interp.display_primitive(other)
        ))),
    }
}

fn map_entries_mut(
    interp: &mut Interpreter,
    id: ObjectId,
) -> Result<&mut IndexMap<MapKey, (JsValue, JsValue), FxBuildHasher>, JsError> {
    match &mut interp.obj_mut(id)?.kind {
        ObjectKind::Map(entries) => Ok(entries),
        _ => Err(JsError::internal_error("map storage missing")),
    }
}

fn map_entries_ref(
    interp: &Interpreter,
    id: ObjectId,
) -> Result<&IndexMap<MapKey, (JsValue, JsValue), FxBuildHasher>, JsError> {
    match &interp.obj(id)?.kind {
        ObjectKind::Map(entries) => Ok(entries),
        _ => Err(JsError::internal_error("map storage missing")),
    }
}

fn map_get(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "get")?;
    let key = MapKey::from_value(&arg(args, 0));
    Ok(map_entries_ref(interp, id)?
        .get(&key)
        .map(|(_, v)| v.cheap_clone())
        .unwrap_or(JsValue::Undefined))
}

fn map_set(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "set")?;
    let key = match arg(args, 0) {
        JsValue::Number(n) if n == 0.0 => JsValue::Number(0.0),
        other => other,
    };
    let entries = map_entries_mut(interp, id)?;
    let map_key = MapKey::from_value(&key);
    match entries.get_mut(&map_key) {
        Some(slot) => slot.1 = arg(args, 1),
        None => {
            entries.insert(map_key, (key, arg(args, 1)));
        }
    }
    Ok(this)
}

fn map_has(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "has")?;
    let key = MapKey::from_value(&arg(args, 0));
    Ok(JsValue::Boolean(map_entries_ref(interp, id)?.contains_key(&key)))
}

fn map_delete(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "delete")?;
    let key = MapKey::from_value(&arg(args, 0));
    Ok(JsValue::Boolean(map_entries_mut(interp, id)?.shift_remove(&key).is_some()))
}

fn map_clear(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "clear")?;
    map_entries_mut(interp, id)?.clear();
    Ok(JsValue::Undefined)
}

fn map_size(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "size")?;
    Ok(JsValue::Number(map_entries_ref(interp, id)?.len() as f64))
}

fn map_for_each(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "forEach")?;
    let callback = arg(args, 0);
    if !interp.is_callable(&callback) {
        return Err(JsError::type_error(format!(
            "{} is not a function",
            interp.describe_for_error(&callback)
        )));
    }
    let this_arg = arg(args, 1);
    let mut index = 0;
    // Entries added during the walk are visited; the length is re-read each step
    loop {
        let entry = map_entries_ref(interp, id)?
            .get_index(index)
            .map(|(_, (k, v))| (k.cheap_clone(), v.cheap_clone()));
        let Some((key, value)) = entry else {
            break;
        };
        interp.call_value(&callback, this_arg.cheap_clone(), &[value, key, this.cheap_clone()])?;
        index += 1;
    }
    Ok(JsValue::Undefined)
}

fn map_keys(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "keys")?;
    Ok(create_collection_iterator(interp, id, IterationKind::Keys))
}

fn map_values(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "values")?;
    Ok(create_collection_iterator(interp, id, IterationKind::Values))
}

fn map_entries(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = this_map(interp, &this, "entries")?;
    Ok(create_collection_iterator(interp, id, IterationKind::Entries))
}

/// Iterator over a Map or Set; the prototype follows the target's kind
pub(crate) fn create_collection_iterator(
    interp: &mut Interpreter,
    target: ObjectId,
    kind: IterationKind,
) -> JsValue {
    let proto = match interp.obj(target).map(|o| matches!(o.kind, ObjectKind::Set(_))) {
        Ok(true) => interp.realm.set_iterator_prototype,
        _ => interp.realm.map_iterator_prototype,
    };
    JsValue::Object(interp.alloc_object(
        Some(proto),
        ObjectKind::CollectionIterator {
            target,
            index: 0,
            kind,
            done: false,
        },
    ))
}

/// `%MapIteratorPrototype%.next` and `%SetIteratorPrototype%.next`
pub(crate) fn collection_iterator_next(
    interp: &mut Interpreter,
    this: JsValue,
    _args: &[JsValue],
) -> Result<JsValue, JsError> {
    let incompatible = || JsError::type_error("next method called on incompatible receiver");
    let iter = this.as_object().ok_or_else(incompatible)?;
    let (target, index, kind) = match &interp.obj(iter)?.kind {
        ObjectKind::CollectionIterator { done: true, .. } => {
            return Ok(interp.iter_result(JsValue::Undefined, true));
        }
        ObjectKind::CollectionIterator {
            target, index, kind, ..
        } => (*target, *index, *kind),
        _ => return Err(incompatible()),
    };
    let entry = match &interp.obj(target)?.kind {
        ObjectKind::Map(entries) => entries
            .get_index(index)
            .map(|(_, (k, v))| (k.cheap_clone(), v.cheap_clone())),
        ObjectKind::Set(entries) => entries
            .get_index(index)
            .map(|(_, v)| (v.cheap_clone(), v.cheap_clone())),
        _ => return Err(incompatible()),
    };
    if let ObjectKind::CollectionIterator { index: i, done, .. } = &mut interp.obj_mut(iter)?.kind {
        match entry {
            Some(_) => *i += 1,
            None => *done = true,
        }
    }
    let Some((key, value)) = entry else {
        return Ok(interp.iter_result(JsValue::Undefined, true));
    };
    let result = match kind {
        IterationKind::Keys => key,
        IterationKind::Values => value,
        IterationKind::Entries => JsValue::Object(interp.create_array(vec![key, value])),
    };
    let scope = interp.guard_scope();
    interp.guard_value(&result);
    let out = interp.iter_result(result, false);
    interp.release_guards(scope);
    Ok(out)
}
