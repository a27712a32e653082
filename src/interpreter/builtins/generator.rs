//! Generator and async generator prototypes

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::generator::{GeneratorFlavor, ResumeAction};
use crate::interpreter::{Completion, Interpreter};
use crate::object::ObjectKind;
use crate::value::JsValue;

use super::array::return_this;
use super::{arg, register_iterator_method};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.generator_prototype;
    interp.register_method(proto, "next", generator_next, 1);
    interp.register_method(proto, "return", generator_return, 1);
    interp.register_method(proto, "throw", generator_throw, 1);

    let proto = interp.realm.async_generator_prototype;
    interp.register_method(proto, "next", async_generator_next, 1);
    interp.register_method(proto, "return", async_generator_return, 1);
    interp.register_method(proto, "throw", async_generator_throw, 1);

    let async_iterator_proto = interp.realm.async_iterator_prototype;
    register_iterator_method(
        interp,
        async_iterator_proto,
        "[Symbol.asyncIterator]",
        return_this,
        true,
    );
}

fn this_generator(interp: &Interpreter, this: &JsValue, async_generator: bool) -> Option<ObjectId> {
    let JsValue::Object(id) = this else {
        return None;
    };
    let obj = interp.obj(*id).ok()?;
    let ObjectKind::Generator(state) = &obj.kind else {
        return None;
    };
    let matches = match state.flavor {
        GeneratorFlavor::Sync => !async_generator,
        GeneratorFlavor::AsyncGenerator { .. } => async_generator,
        GeneratorFlavor::Async { .. } => false,
    };
    matches.then_some(*id)
}

fn incompatible(interp: &Interpreter, this: &JsValue, prefix: &str, method: &str) -> JsError {
    JsError::type_error(format!(
        "{}.prototype.{} called on incompatible receiver {}",
        prefix,
        method,
        interp.display_primitive(this)
    ))
}

fn resume_sync(
    interp: &mut Interpreter,
    this: JsValue,
    action: ResumeAction,
    value: JsValue,
    method: &str,
) -> Result<JsValue, JsError> {
    let gen_id = this_generator(interp, &this, false)
        .ok_or_else(|| incompatible(interp, &this, "Generator", method))?;
    match interp.resume_generator(gen_id, action, value)? {
        Completion::Yield(v) => Ok(interp.iter_result(v, false)),
        Completion::Return(v) => Ok(interp.iter_result(v, true)),
        Completion::Await(_) => Err(JsError::internal_error("await inside a sync generator")),
    }
}

fn generator_next(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_sync(interp, this, ResumeAction::Next, arg(args, 0), "next")
}

fn generator_return(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_sync(interp, this, ResumeAction::Return, arg(args, 0), "return")
}

fn generator_throw(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_sync(interp, this, ResumeAction::Throw, arg(args, 0), "throw")
}

/// Async generator methods never throw synchronously; a bad receiver
/// yields a rejected promise
fn resume_async(
    interp: &mut Interpreter,
    this: JsValue,
    action: ResumeAction,
    value: JsValue,
    method: &str,
) -> Result<JsValue, JsError> {
    let Some(gen_id) = this_generator(interp, &this, true) else {
        let error = incompatible(interp, &this, "AsyncGenerator", method);
        let reason = interp.error_value(error)?;
        let promise = interp.create_promise();
        interp.reject_promise(promise, reason)?;
        return Ok(JsValue::Object(promise));
    };
    Ok(JsValue::Object(interp.async_generator_enqueue(gen_id, action, value)?))
}

fn async_generator_next(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_async(interp, this, ResumeAction::Next, arg(args, 0), "next")
}

fn async_generator_return(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_async(interp, this, ResumeAction::Return, arg(args, 0), "return")
}

fn async_generator_throw(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    resume_async(interp, this, ResumeAction::Throw, arg(args, 0), "throw")
}
