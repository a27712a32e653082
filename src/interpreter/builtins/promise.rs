//! Promise constructor, Promise.resolve/reject and Promise.prototype

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::value::{CheapClone, JsValue};

use super::{arg, register_constructor, requires_new};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.promise_prototype;
    interp.register_method(proto, "then", promise_then, 2);
    interp.register_method(proto, "catch", promise_catch, 1);
    let ctor = register_constructor(interp, "Promise", promise_call, Some(promise_construct), 1, proto);
    interp.register_method(ctor, "resolve", promise_resolve_static, 1);
    interp.register_method(ctor, "reject", promise_reject_static, 1);
}

fn promise_call(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(requires_new("Promise"))
}

fn promise_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let executor = arg(args, 0);
    if !interp.is_callable(&executor) {
        return Err(JsError::type_error(format!(
            "Promise resolver {} is not a function",
            interp.describe_for_error(&executor)
        )));
    }
    let fallback = interp.realm.promise_prototype;
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    let promise = interp.create_promise();
    interp.obj_mut(promise)?.prototype = Some(proto);

    let scope = interp.guard_scope();
    interp.guard_value(&JsValue::Object(promise));
    let (resolve, reject) = interp.create_resolving_functions(promise);
    interp.guard_values(&[JsValue::Object(resolve), JsValue::Object(reject)]);
    let result = match interp.call_value(
        &executor,
        JsValue::Undefined,
        &[JsValue::Object(resolve), JsValue::Object(reject)],
    ) {
        Err(e) if e.is_catchable() => interp.error_value(e).and_then(|reason| {
            interp.call_value(&JsValue::Object(reject), JsValue::Undefined, &[reason])
        }),
        other => other,
    };
    interp.release_guards(scope);
    result?;
    Ok(JsValue::Object(promise))
}

fn promise_resolve_static(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Object(interp.promise_resolve(&arg(args, 0))?))
}

fn promise_reject_static(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = interp.create_promise();
    interp.reject_promise(promise, arg(args, 0))?;
    Ok(JsValue::Object(promise))
}

fn this_promise(interp: &Interpreter, this: &JsValue, method: &str) -> Result<ObjectId, JsError> {
    interp.as_promise(this).ok_or_else(|| {
        JsError::type_error(format!(
            "Method Promise.prototype.{} called on incompatible receiver {}",
            method,
            interp.display_primitive(this)
        ))
    })
}

fn promise_then(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let promise = this_promise(interp, &this, "then")?;
    let derived = interp.promise_then(promise, &arg(args, 0), &arg(args, 1))?;
    Ok(JsValue::Object(derived))
}

/// `catch(f)` is `then(undefined, f)` looked up through the receiver
fn promise_catch(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let then_key = interp.key("then");
    let then = interp.get_value_property(&this, &then_key)?;
    interp.call_value(&then, this.cheap_clone(), &[JsValue::Undefined, arg(args, 0)])
}
