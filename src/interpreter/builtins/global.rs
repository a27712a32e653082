//! Global functions: print, console, gc, quit, timers and queueMicrotask

use crate::error::JsError;
use crate::interpreter::Interpreter;
use crate::platform::ConsoleLevel;
use crate::value::JsValue;

use super::{arg, define_hidden};

pub fn install(interp: &mut Interpreter) {
    let global = interp.realm.global;
    define_hidden(interp, global, "globalThis", JsValue::Object(global));
    interp.register_method(global, "print", global_print, 1);
    interp.register_method(global, "gc", global_gc, 0);
    interp.register_method(global, "quit", global_quit, 0);
    interp.register_method(global, "setTimeout", global_set_timeout, 2);
    interp.register_method(global, "clearTimeout", global_clear_timeout, 1);
    interp.register_method(global, "queueMicrotask", global_queue_microtask, 1);

    let console = interp.create_object();
    interp.register_method(console, "log", console_log, 0);
    interp.register_method(console, "error", console_error, 0);
    define_hidden(interp, global, "console", JsValue::Object(console));
}

/// Arguments rendered with `ToString` and joined by spaces
fn format_args(interp: &mut Interpreter, args: &[JsValue]) -> Result<String, JsError> {
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
        let text = match value {
            JsValue::Symbol(_) => interp.display_primitive(value),
            other => interp.to_js_string(other)?.to_string(),
        };
        parts.push(text);
    }
    Ok(parts.join(" "))
}

fn global_print(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let line = format_args(interp, args)?;
    interp.write_console(ConsoleLevel::Log, &line);
    Ok(JsValue::Undefined)
}

fn console_log(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    global_print(interp, JsValue::Undefined, args)
}

fn console_error(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let line = format_args(interp, args)?;
    interp.write_console(ConsoleLevel::Error, &line);
    Ok(JsValue::Undefined)
}

fn global_gc(interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    interp.collect_garbage();
    Ok(JsValue::Undefined)
}

fn global_quit(_interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(JsError::Quit)
}

fn callback_arg(interp: &Interpreter, args: &[JsValue], api: &str) -> Result<JsValue, JsError> {
    let callee = arg(args, 0);
    if !interp.is_callable(&callee) {
        return Err(JsError::type_error(format!(
            "{}: callback {} is not a function",
            api,
            interp.describe_for_error(&callee)
        )));
    }
    Ok(callee)
}

fn global_set_timeout(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let callee = callback_arg(interp, args, "setTimeout")?;
    let delay = match arg(args, 1) {
        JsValue::Undefined => 0.0,
        v => interp.to_number(&v)?,
    };
    let delay = if delay.is_finite() && delay > 0.0 {
        delay as u64
    } else {
        0
    };
    let extra = args.get(2..).unwrap_or(&[]).to_vec();
    let id = interp.set_timeout(callee, delay, extra);
    Ok(JsValue::Number(id as f64))
}

fn global_clear_timeout(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    if let JsValue::Number(n) = arg(args, 0)
        && n.is_finite()
        && n >= 0.0
    {
        interp.clear_timeout(n as u64);
    }
    Ok(JsValue::Undefined)
}

fn global_queue_microtask(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let callee = callback_arg(interp, args, "queueMicrotask")?;
    interp.enqueue_microtask(callee);
    Ok(JsValue::Undefined)
}
