//! Error constructors and Error.prototype

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::object::function::{NativeCtor, NativeFn};
use crate::object::shape::PropertyFlags;
use crate::value::{JsString, JsValue};

use super::{arg, define_hidden, register_constructor};

#[derive(Debug, Clone, Copy)]
enum ErrorType {
    Error,
    Type,
    Range,
    Reference,
    Syntax,
}

impl ErrorType {
    fn name(self) -> &'static str {
        match self {
            ErrorType::Error => "Error",
            ErrorType::Type => "TypeError",
            ErrorType::Range => "RangeError",
            ErrorType::Reference => "ReferenceError",
            ErrorType::Syntax => "SyntaxError",
        }
    }

    fn prototype(self, interp: &Interpreter) -> ObjectId {
        let realm = &interp.realm;
        match self {
            ErrorType::Error => realm.error_prototype,
            ErrorType::Type => realm.type_error_prototype,
            ErrorType::Range => realm.range_error_prototype,
            ErrorType::Reference => realm.reference_error_prototype,
            ErrorType::Syntax => realm.syntax_error_prototype,
        }
    }
}

pub fn install(interp: &mut Interpreter) {
    let table: [(ErrorType, NativeFn, NativeCtor); 5] = [
        (ErrorType::Error, error_call, error_construct),
        (ErrorType::Type, type_error_call, type_error_construct),
        (ErrorType::Range, range_error_call, range_error_construct),
        (ErrorType::Reference, reference_error_call, reference_error_construct),
        (ErrorType::Syntax, syntax_error_call, syntax_error_construct),
    ];
    for (ty, call, construct) in table {
        let proto = ty.prototype(interp);
        let name = JsValue::String(interp.intern(ty.name()));
        define_hidden(interp, proto, "name", name);
        let empty = JsValue::String(interp.intern(""));
        define_hidden(interp, proto, "message", empty);
        register_constructor(interp, ty.name(), call, Some(construct), 1, proto);
    }
    let proto = interp.realm.error_prototype;
    interp.register_method(proto, "toString", error_to_string, 0);
}

fn create_error(
    interp: &mut Interpreter,
    proto: ObjectId,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let message = match arg(args, 0) {
        JsValue::Undefined => String::new(),
        other => interp.to_js_string(&other)?.to_string(),
    };
    let name_key = interp.key("name");
    let name = match interp.get_property(proto, &name_key)? {
        JsValue::String(s) => s.to_string(),
        _ => "Error".to_string(),
    };
    let id = interp.make_error(proto, &name, &message, true);
    if let JsValue::Object(options) = arg(args, 1) {
        let cause_key = interp.key("cause");
        if interp.has_property(options, &cause_key)? {
            let scope = interp.guard_scope();
            interp.guard_value(&JsValue::Object(id));
            let cause = interp.get_property(options, &cause_key);
            interp.release_guards(scope);
            interp.define_raw(id, cause_key, cause?, PropertyFlags::HIDDEN);
        }
    }
    Ok(JsValue::Object(id))
}

fn call_error(interp: &mut Interpreter, ty: ErrorType, args: &[JsValue]) -> Result<JsValue, JsError> {
    let proto = ty.prototype(interp);
    create_error(interp, proto, args)
}

fn construct_error(
    interp: &mut Interpreter,
    ty: ErrorType,
    new_target: ObjectId,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let fallback = ty.prototype(interp);
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    create_error(interp, proto, args)
}

fn error_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    call_error(interp, ErrorType::Error, args)
}

fn error_construct(interp: &mut Interpreter, nt: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    construct_error(interp, ErrorType::Error, nt, args)
}

fn type_error_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    call_error(interp, ErrorType::Type, args)
}

fn type_error_construct(interp: &mut Interpreter, nt: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    construct_error(interp, ErrorType::Type, nt, args)
}

fn range_error_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    call_error(interp, ErrorType::Range, args)
}

fn range_error_construct(interp: &mut Interpreter, nt: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    construct_error(interp, ErrorType::Range, nt, args)
}

fn reference_error_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    call_error(interp, ErrorType::Reference, args)
}

fn reference_error_construct(
    interp: &mut Interpreter,
    nt: ObjectId,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    construct_error(interp, ErrorType::Reference, nt, args)
}

fn syntax_error_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    call_error(interp, ErrorType::Syntax, args)
}

fn syntax_error_construct(interp: &mut Interpreter, nt: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    construct_error(interp, ErrorType::Syntax, nt, args)
}

/// Error.prototype.toString: "name: message", or whichever part is non-empty
fn error_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let JsValue::Object(id) = this else {
        return Err(JsError::type_error(
            "Error.prototype.toString called on non-object",
        ));
    };
    let name_key = interp.key("name");
    let message_key = interp.key("message");
    let name = match interp.get_property(id, &name_key)? {
        JsValue::Undefined => "Error".to_string(),
        v => interp.to_js_string(&v)?.to_string(),
    };
    let message = match interp.get_property(id, &message_key)? {
        JsValue::Undefined => String::new(),
        v => interp.to_js_string(&v)?.to_string(),
    };
    let text = match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    };
    Ok(JsValue::String(JsString::from(text)))
}
