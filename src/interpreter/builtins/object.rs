//! Object constructor and Object.prototype

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::interpreter::property::PropertyDescriptor;
use crate::object::ObjectKind;
use crate::value::{JsString, JsValue};

use super::{arg, register_constructor};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.object_prototype;
    interp.register_method(proto, "hasOwnProperty", object_has_own_property, 1);
    interp.register_method(proto, "toString", object_to_string, 0);
    interp.register_method(proto, "valueOf", object_value_of, 0);

    let ctor = register_constructor(interp, "Object", object_call, Some(object_construct), 1, proto);
    interp.register_method(ctor, "create", object_create, 2);
    interp.register_method(ctor, "getPrototypeOf", object_get_prototype_of, 1);
    interp.register_method(ctor, "setPrototypeOf", object_set_prototype_of, 2);
    interp.register_method(ctor, "defineProperty", object_define_property, 3);
    interp.register_method(ctor, "keys", object_keys, 1);
}

fn object_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    if value.is_nullish() {
        return Ok(JsValue::Object(interp.create_object()));
    }
    Ok(JsValue::Object(interp.to_object(&value)?))
}

fn object_construct(
    interp: &mut Interpreter,
    new_target: ObjectId,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let value = arg(args, 0);
    if value.is_nullish() {
        let fallback = interp.realm.object_prototype;
        let proto = interp.prototype_from_constructor(new_target, fallback)?;
        return Ok(JsValue::Object(interp.alloc_object(Some(proto), ObjectKind::Ordinary)));
    }
    Ok(JsValue::Object(interp.to_object(&value)?))
}

/// `proto` argument of `create`/`setPrototypeOf`
fn prototype_arg(interp: &Interpreter, value: &JsValue) -> Result<Option<ObjectId>, JsError> {
    match value {
        JsValue::Object(id) => Ok(Some(*id)),
        JsValue::Null => Ok(None),
        other => Err(JsError::type_error(format!(
            "Object prototype may only be an Object or null: {}",
            interp.display_primitive(other)
        ))),
    }
}

fn object_create(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let proto = prototype_arg(interp, &arg(args, 0))?;
    let obj = interp.alloc_object(proto, ObjectKind::Ordinary);
    let properties = arg(args, 1);
    if let JsValue::Object(props) = properties {
        let scope = interp.guard_scope();
        interp.guard_value(&JsValue::Object(obj));
        let result = define_properties(interp, obj, props);
        interp.release_guards(scope);
        result?;
    }
    Ok(JsValue::Object(obj))
}

fn define_properties(interp: &mut Interpreter, target: ObjectId, props: ObjectId) -> Result<(), JsError> {
    for key in interp.own_enumerable_string_keys(props)? {
        let desc_value = interp.get_property(props, &key)?;
        let desc = to_property_descriptor(interp, &desc_value)?;
        interp.define_own_property(target, key, desc)?;
    }
    Ok(())
}

fn object_get_prototype_of(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let id = interp.to_object(&arg(args, 0))?;
    Ok(interp
        .obj(id)?
        .prototype
        .map(JsValue::Object)
        .unwrap_or(JsValue::Null))
}

fn object_set_prototype_of(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(JsError::type_error("Object.setPrototypeOf called on null or undefined"));
    }
    let proto = prototype_arg(interp, &arg(args, 1))?;
    let JsValue::Object(id) = target else {
        return Ok(target);
    };
    let obj = interp.obj(id)?;
    if obj.prototype == proto {
        return Ok(target);
    }
    if !obj.extensible {
        return Err(JsError::type_error("#<Object> is not extensible"));
    }
    let mut cursor = proto;
    while let Some(p) = cursor {
        if p == id {
            return Err(JsError::type_error("Cyclic __proto__ value"));
        }
        cursor = interp.obj(p)?.prototype;
    }
    interp.obj_mut(id)?.prototype = proto;
    Ok(target)
}

/// `ToPropertyDescriptor`
pub(crate) fn to_property_descriptor(
    interp: &mut Interpreter,
    value: &JsValue,
) -> Result<PropertyDescriptor, JsError> {
    let JsValue::Object(id) = value else {
        return Err(JsError::type_error(format!(
            "Property description must be an object: {}",
            interp.display_primitive(value)
        )));
    };
    let id = *id;
    let mut desc = PropertyDescriptor::default();
    let field = |interp: &mut Interpreter, name: &str| -> Result<Option<JsValue>, JsError> {
        let key = interp.key(name);
        if interp.has_property(id, &key)? {
            Ok(Some(interp.get_property(id, &key)?))
        } else {
            Ok(None)
        }
    };
    desc.enumerable = field(interp, "enumerable")?.map(|v| v.to_boolean());
    desc.configurable = field(interp, "configurable")?.map(|v| v.to_boolean());
    desc.value = field(interp, "value")?;
    desc.writable = field(interp, "writable")?.map(|v| v.to_boolean());
    for (name, slot) in [("get", &mut desc.get), ("set", &mut desc.set)] {
        let Some(f) = field(interp, name)? else {
            continue;
        };
        *slot = match f {
            JsValue::Undefined => Some(None),
            JsValue::Object(fid) if interp.is_callable(&f) => Some(Some(fid)),
            other => {
                let kind = if name == "get" { "Getter" } else { "Setter" };
                return Err(JsError::type_error(format!(
                    "{} must be a function: {}",
                    kind,
                    interp.describe_for_error(&other)
                )));
            }
        };
    }
    if desc.is_accessor() && (desc.value.is_some() || desc.writable.is_some()) {
        return Err(JsError::type_error(
            "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
        ));
    }
    Ok(desc)
}

fn object_define_property(
    interp: &mut Interpreter,
    _this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let target = arg(args, 0);
    let JsValue::Object(id) = target else {
        return Err(JsError::type_error("Object.defineProperty called on non-object"));
    };
    let key = interp.to_property_key(&arg(args, 1))?;
    let desc = to_property_descriptor(interp, &arg(args, 2))?;
    interp.define_own_property(id, key, desc)?;
    Ok(target)
}

fn object_keys(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.to_object(&arg(args, 0))?;
    let keys = interp
        .own_enumerable_string_keys(id)?
        .iter()
        .map(|k| k.to_value())
        .collect();
    Ok(JsValue::Object(interp.create_array(keys)))
}

fn object_has_own_property(
    interp: &mut Interpreter,
    this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let key = interp.to_property_key(&arg(args, 0))?;
    let id = interp.to_object(&this)?;
    Ok(JsValue::Boolean(interp.has_own_property(id, &key)?))
}

fn object_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let tag = match &this {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        other => {
            let id = interp.to_object(other)?;
            match &interp.obj(id)?.kind {
                ObjectKind::Array => "Array",
                ObjectKind::Arguments => "Arguments",
                ObjectKind::Function(_) => "Function",
                ObjectKind::Error => "Error",
                ObjectKind::Boolean(_) => "Boolean",
                ObjectKind::Number(_) => "Number",
                ObjectKind::String(_) => "String",
                _ => "Object",
            }
        }
    };
    Ok(JsValue::String(JsString::from(format!("[object {}]", tag))))
}

fn object_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let id = interp.to_object(&this)?;
    Ok(JsValue::Object(id))
}
