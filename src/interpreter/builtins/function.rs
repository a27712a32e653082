//! Function.prototype: call, apply, bind, toString

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::object::ObjectKind;
use crate::object::function::{BoundFunction, Callable};
use crate::object::shape::PropertyFlags;
use crate::object::Slot;
use crate::value::{JsString, JsValue};

use super::arg;

const POISONED_PROPERTY: &str = "'caller', 'callee', and 'arguments' properties may not be accessed on strict mode functions or the arguments objects for calls to them";

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.function_prototype;
    let name = interp.intern("");
    interp.set_function_name_and_length(proto, JsValue::String(name), 0);
    interp.register_method(proto, "call", function_call, 1);
    interp.register_method(proto, "apply", function_apply, 2);
    interp.register_method(proto, "bind", function_bind, 1);
    interp.register_method(proto, "toString", function_to_string, 0);

    let thrower = interp.create_native_function("", throw_type_error, 0, None);
    if let Ok(obj) = interp.obj_mut(thrower) {
        obj.extensible = false;
    }
    for name in ["caller", "arguments"] {
        let key = interp.key(name);
        interp.define_raw_slot(
            proto,
            key,
            Slot::Accessor {
                getter: Some(thrower),
                setter: Some(thrower),
            },
            PropertyFlags {
                enumerable: false,
                configurable: true,
                ..PropertyFlags::ACCESSOR
            },
        );
    }
}

/// `Function.prototype` itself is callable and returns undefined
pub(crate) fn function_prototype_call(
    _interp: &mut Interpreter,
    _this: JsValue,
    _args: &[JsValue],
) -> Result<JsValue, JsError> {
    Ok(JsValue::Undefined)
}

fn throw_type_error(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(JsError::type_error(POISONED_PROPERTY))
}

fn function_call(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let rest = args.get(1..).unwrap_or(&[]);
    interp.call_value(&this, arg(args, 0), rest)
}

fn function_apply(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    if !interp.is_callable(&this) {
        return Err(JsError::type_error(
            "Function.prototype.apply was called on a non-function",
        ));
    }
    let list = arg(args, 1);
    let call_args = if list.is_nullish() {
        Vec::new()
    } else {
        interp.array_like_to_args(&list)?
    };
    let scope = interp.guard_scope();
    interp.guard_values(&call_args);
    let result = interp.call_value(&this, arg(args, 0), &call_args);
    interp.release_guards(scope);
    result
}

fn function_bind(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let Some((target, _)) = interp.callable_of(&this) else {
        return Err(JsError::type_error("Bind must be called on a function"));
    };
    let bound_args = args.get(1..).unwrap_or(&[]).to_vec();
    let proto = interp.obj(target)?.prototype;

    let name_key = interp.key("name");
    let length_key = interp.key("length");
    let target_name = match interp.get_property(target, &name_key)? {
        JsValue::String(s) => s.to_string(),
        _ => String::new(),
    };
    let target_length = match interp.get_property(target, &length_key)? {
        JsValue::Number(n) if n.is_finite() => n.max(0.0) as usize,
        _ => 0,
    };

    let callable = Callable::Bound(BoundFunction {
        target,
        this: arg(args, 0),
        args: bound_args.clone(),
    });
    let bound = interp.alloc_object(proto, ObjectKind::Function(callable));
    let name = interp.intern(&format!("bound {}", target_name));
    interp.set_function_name_and_length(
        bound,
        JsValue::String(name),
        target_length.saturating_sub(bound_args.len()),
    );
    Ok(JsValue::Object(bound))
}

fn function_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let Some((_, callable)) = interp.callable_of(&this) else {
        return Err(JsError::type_error(
            "Function.prototype.toString requires that 'this' be a Function",
        ));
    };
    let name = callable.name().map(|n| n.to_string()).unwrap_or_default();
    let body = match callable {
        Callable::Closure(_) => "[bytecode]",
        _ => "[native code]",
    };
    Ok(JsValue::String(JsString::from(format!(
        "function {}() {{ {} }}",
        name, body
    ))))
}
