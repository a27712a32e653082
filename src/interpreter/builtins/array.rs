//! Array constructor, Array.prototype and array iterators

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::object::shape::PropertyFlags;
use crate::object::{IterationKind, ObjectKind};
use crate::value::{CheapClone, JsString, JsValue, PropertyKey};

use super::{arg, register_constructor, register_iterator_method};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.array_prototype;
    interp.register_method(proto, "push", array_push, 1);
    interp.register_method(proto, "pop", array_pop, 0);
    interp.register_method(proto, "join", array_join, 1);
    interp.register_method(proto, "toString", array_to_string, 0);
    interp.register_method(proto, "keys", array_keys, 0);
    interp.register_method(proto, "entries", array_entries, 0);

    let values = interp.realm.array_values;
    let name = interp.intern("values");
    interp.set_function_name_and_length(values, JsValue::String(name), 0);
    let values_key = interp.key("values");
    interp.define_raw(proto, values_key, JsValue::Object(values), PropertyFlags::HIDDEN);
    let iterator_key = super::iterator_key(interp);
    interp.define_raw(proto, iterator_key, JsValue::Object(values), PropertyFlags::HIDDEN);

    let ctor = register_constructor(interp, "Array", array_call, Some(array_construct), 1, proto);
    interp.register_method(ctor, "isArray", array_is_array, 1);

    let iter_proto = interp.realm.array_iterator_prototype;
    interp.register_method(iter_proto, "next", array_iterator_next, 0);

    let iterator_proto = interp.realm.iterator_prototype;
    register_iterator_method(interp, iterator_proto, "[Symbol.iterator]", return_this, false);
}

/// `%IteratorPrototype%[@@iterator]`
pub(crate) fn return_this(_interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(this)
}

fn array_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let proto = interp.realm.array_prototype;
    build_array(interp, proto, args)
}

fn array_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let fallback = interp.realm.array_prototype;
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    build_array(interp, proto, args)
}

fn build_array(interp: &mut Interpreter, proto: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.alloc_object(Some(proto), ObjectKind::Array);
    match args {
        [len @ JsValue::Number(_)] => interp.set_array_length(id, len)?,
        _ => interp.obj_mut(id)?.elements = args.to_vec(),
    }
    Ok(JsValue::Object(id))
}

fn array_is_array(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let is_array = match arg(args, 0) {
        JsValue::Object(id) => matches!(interp.obj(id)?.kind, ObjectKind::Array),
        _ => false,
    };
    Ok(JsValue::Boolean(is_array))
}

fn length_of(interp: &mut Interpreter, id: ObjectId) -> Result<usize, JsError> {
    let key = interp.key("length");
    let value = interp.get_property(id, &key)?;
    interp.to_length(&value)
}

fn set_length(interp: &mut Interpreter, id: ObjectId, len: usize) -> Result<(), JsError> {
    let key = interp.key("length");
    interp.set_property(id, key, JsValue::Number(len as f64), true)
}

fn array_push(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.to_object(&this)?;
    let mut len = length_of(interp, id)?;
    for value in args {
        let index = u32::try_from(len).map_err(|_| JsError::range_error("Invalid array length"))?;
        interp.set_property(id, PropertyKey::Index(index), value.cheap_clone(), true)?;
        len += 1;
    }
    set_length(interp, id, len)?;
    Ok(JsValue::Number(len as f64))
}

fn array_pop(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.to_object(&this)?;
    let len = length_of(interp, id)?;
    if len == 0 {
        set_length(interp, id, 0)?;
        return Ok(JsValue::Undefined);
    }
    let last = PropertyKey::from(len as u32 - 1);
    let value = interp.get_property(id, &last)?;
    interp.delete_property(id, &last, true)?;
    set_length(interp, id, len - 1)?;
    Ok(value)
}

fn array_join(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.to_object(&this)?;
    let separator = match arg(args, 0) {
        JsValue::Undefined => ",".to_string(),
        other => interp.to_js_string(&other)?.to_string(),
    };
    let len = length_of(interp, id)?;
    let mut out = String::new();
    for index in 0..len {
        if index > 0 {
            out.push_str(&separator);
        }
        let value = interp.get_property(id, &PropertyKey::from(index as u32))?;
        if !value.is_nullish() {
            out.push_str(interp.to_js_string(&value)?.as_str());
        }
    }
    Ok(JsValue::String(JsString::from(out)))
}

fn array_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    array_join(interp, this, &[])
}

fn create_array_iterator(
    interp: &mut Interpreter,
    this: JsValue,
    kind: IterationKind,
) -> Result<JsValue, JsError> {
    let target = JsValue::Object(interp.to_object(&this)?);
    let proto = interp.realm.array_iterator_prototype;
    let iter = interp.alloc_object(
        Some(proto),
        ObjectKind::ArrayIterator {
            target,
            index: 0,
            kind,
            done: false,
        },
    );
    Ok(JsValue::Object(iter))
}

/// `Array.prototype.values` and `@@iterator`
pub(crate) fn array_values(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    create_array_iterator(interp, this, IterationKind::Values)
}

fn array_keys(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    create_array_iterator(interp, this, IterationKind::Keys)
}

fn array_entries(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    create_array_iterator(interp, this, IterationKind::Entries)
}

fn array_iterator_next(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let iter = this.as_object().ok_or_else(|| {
        JsError::type_error("next method called on incompatible receiver")
    })?;
    let (target, index, kind) = match &interp.obj(iter)?.kind {
        ObjectKind::ArrayIterator { done: true, .. } => {
            return Ok(interp.iter_result(JsValue::Undefined, true));
        }
        ObjectKind::ArrayIterator {
            target, index, kind, ..
        } => (target.cheap_clone(), *index, *kind),
        _ => return Err(JsError::type_error("next method called on incompatible receiver")),
    };
    let target_id = target
        .as_object()
        .ok_or_else(|| JsError::internal_error("array iterator over a primitive"))?;
    let len = length_of(interp, target_id)?;
    let finished = index >= len;
    if let ObjectKind::ArrayIterator { index: i, done, .. } = &mut interp.obj_mut(iter)?.kind {
        if finished {
            *done = true;
        } else {
            *i += 1;
        }
    }
    if finished {
        return Ok(interp.iter_result(JsValue::Undefined, true));
    }
    let key = JsValue::Number(index as f64);
    let value = match kind {
        IterationKind::Keys => key,
        IterationKind::Values => interp.get_property(target_id, &PropertyKey::from(index as u32))?,
        IterationKind::Entries => {
            let value = interp.get_property(target_id, &PropertyKey::from(index as u32))?;
            JsValue::Object(interp.create_array(vec![key, value]))
        }
    };
    let scope = interp.guard_scope();
    interp.guard_value(&value);
    let result = interp.iter_result(value, false);
    interp.release_guards(scope);
    Ok(result)
}
