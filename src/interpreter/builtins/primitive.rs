//! String, Number, Boolean, Symbol and BigInt constructors with their prototypes

use num_bigint::BigInt;
use num_traits::FromPrimitive;

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::interpreter::operations::{Hint, parse_bigint};
use crate::object::ObjectKind;
use crate::value::{CheapClone, JsString, JsSymbol, JsValue, number_to_string};

use super::{arg, define_hidden, register_constructor};

pub fn install(interp: &mut Interpreter) {
    let proto = interp.realm.string_prototype;
    interp.register_method(proto, "toString", string_value_of, 0);
    interp.register_method(proto, "valueOf", string_value_of, 0);
    register_constructor(interp, "String", string_call, Some(string_construct), 1, proto);

    let proto = interp.realm.number_prototype;
    interp.register_method(proto, "toString", number_to_string_method, 1);
    interp.register_method(proto, "valueOf", number_value_of, 0);
    register_constructor(interp, "Number", number_call, Some(number_construct), 1, proto);

    let proto = interp.realm.boolean_prototype;
    interp.register_method(proto, "toString", boolean_to_string, 0);
    interp.register_method(proto, "valueOf", boolean_value_of, 0);
    register_constructor(interp, "Boolean", boolean_call, Some(boolean_construct), 1, proto);

    let proto = interp.realm.symbol_prototype;
    interp.register_method(proto, "toString", symbol_to_string, 0);
    interp.register_method(proto, "valueOf", symbol_value_of, 0);
    interp.register_getter(proto, "description", symbol_description);
    let ctor = register_constructor(interp, "Symbol", symbol_call, Some(symbol_construct), 0, proto);
    let iterator = JsValue::Symbol(interp.realm.iterator_symbol.cheap_clone());
    define_hidden(interp, ctor, "iterator", iterator);
    let async_iterator = JsValue::Symbol(interp.realm.async_iterator_symbol.cheap_clone());
    define_hidden(interp, ctor, "asyncIterator", async_iterator);

    let proto = interp.realm.bigint_prototype;
    interp.register_method(proto, "toString", bigint_to_string, 0);
    interp.register_method(proto, "valueOf", bigint_value_of, 0);
    register_constructor(interp, "BigInt", bigint_call, Some(bigint_construct), 1, proto);
}

/// Wrap `kind` in an object whose prototype follows `new_target`
fn wrap(
    interp: &mut Interpreter,
    new_target: ObjectId,
    fallback: ObjectId,
    kind: ObjectKind,
) -> Result<JsValue, JsError> {
    let proto = interp.prototype_from_constructor(new_target, fallback)?;
    Ok(JsValue::Object(interp.alloc_object(Some(proto), kind)))
}

fn incompatible(method: &str) -> JsError {
    JsError::type_error(format!("{} requires that 'this' be of the matching type", method))
}

// String

fn string_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    match args.first() {
        None => Ok(JsValue::String(interp.intern(""))),
        Some(JsValue::Symbol(s)) => Ok(JsValue::String(JsString::from(s.to_string()))),
        Some(v) => Ok(JsValue::String(interp.to_js_string(v)?)),
    }
}

fn string_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let s = match args.first() {
        None => interp.intern(""),
        Some(v) => interp.to_js_string(v)?,
    };
    let fallback = interp.realm.string_prototype;
    wrap(interp, new_target, fallback, ObjectKind::String(s))
}

fn string_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    match &this {
        JsValue::String(_) => Ok(this),
        JsValue::Object(id) => match &interp.obj(*id)?.kind {
            ObjectKind::String(s) => Ok(JsValue::String(s.cheap_clone())),
            _ => Err(incompatible("String.prototype.valueOf")),
        },
        _ => Err(incompatible("String.prototype.valueOf")),
    }
}

// Number

fn this_number(interp: &Interpreter, this: &JsValue, method: &str) -> Result<f64, JsError> {
    match this {
        JsValue::Number(n) => Ok(*n),
        JsValue::Object(id) => match interp.obj(*id)?.kind {
            ObjectKind::Number(n) => Ok(n),
            _ => Err(incompatible(method)),
        },
        _ => Err(incompatible(method)),
    }
}

fn number_from_args(interp: &mut Interpreter, args: &[JsValue]) -> Result<f64, JsError> {
    let Some(value) = args.first() else {
        return Ok(0.0);
    };
    match interp.to_numeric(value)? {
        JsValue::BigInt(b) => Ok(b.to_f64()),
        other => interp.to_number(&other),
    }
}

fn number_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Number(number_from_args(interp, args)?))
}

fn number_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = number_from_args(interp, args)?;
    let fallback = interp.realm.number_prototype;
    wrap(interp, new_target, fallback, ObjectKind::Number(n))
}

fn number_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Number(this_number(interp, &this, "Number.prototype.valueOf")?))
}

fn number_to_string_method(
    interp: &mut Interpreter,
    this: JsValue,
    args: &[JsValue],
) -> Result<JsValue, JsError> {
    let n = this_number(interp, &this, "Number.prototype.toString")?;
    let radix = match arg(args, 0) {
        JsValue::Undefined => 10,
        v => {
            let r = interp.to_number(&v)?;
            if !(2.0..=36.0).contains(&r) {
                return Err(JsError::range_error("toString() radix must be between 2 and 36"));
            }
            r as u32
        }
    };
    let text = if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        number_to_string(n)
    } else {
        integer_to_radix(n, radix)
    };
    Ok(JsValue::String(JsString::from(text)))
}

/// Integral `n` in `radix`; fractional values fall back to base 10
fn integer_to_radix(n: f64, radix: u32) -> String {
    match BigInt::from_f64(n) {
        Some(b) => b.to_str_radix(radix),
        None => number_to_string(n),
    }
}

// Boolean

fn this_boolean(interp: &Interpreter, this: &JsValue, method: &str) -> Result<bool, JsError> {
    match this {
        JsValue::Boolean(b) => Ok(*b),
        JsValue::Object(id) => match interp.obj(*id)?.kind {
            ObjectKind::Boolean(b) => Ok(b),
            _ => Err(incompatible(method)),
        },
        _ => Err(incompatible(method)),
    }
}

fn boolean_call(_interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(arg(args, 0).to_boolean()))
}

fn boolean_construct(interp: &mut Interpreter, new_target: ObjectId, args: &[JsValue]) -> Result<JsValue, JsError> {
    let b = arg(args, 0).to_boolean();
    let fallback = interp.realm.boolean_prototype;
    wrap(interp, new_target, fallback, ObjectKind::Boolean(b))
}

fn boolean_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Boolean(this_boolean(interp, &this, "Boolean.prototype.valueOf")?))
}

fn boolean_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let b = this_boolean(interp, &this, "Boolean.prototype.toString")?;
    Ok(JsValue::String(interp.intern(if b { "true" } else { "false" })))
}

// Symbol

fn symbol_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let description = match arg(args, 0) {
        JsValue::Undefined => None,
        v => Some(interp.to_js_string(&v)?),
    };
    Ok(JsValue::Symbol(interp.new_symbol(description)))
}

fn symbol_construct(_interp: &mut Interpreter, _new_target: ObjectId, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(JsError::type_error("Symbol is not a constructor"))
}

fn this_symbol(interp: &Interpreter, this: &JsValue, method: &str) -> Result<JsSymbol, JsError> {
    match this {
        JsValue::Symbol(s) => Ok(s.cheap_clone()),
        JsValue::Object(id) => match &interp.obj(*id)?.kind {
            ObjectKind::Symbol(s) => Ok(s.cheap_clone()),
            _ => Err(incompatible(method)),
        },
        _ => Err(incompatible(method)),
    }
}

fn symbol_to_string(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let sym = this_symbol(interp, &this, "Symbol.prototype.toString")?;
    Ok(JsValue::String(JsString::from(sym.to_string())))
}

fn symbol_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Ok(JsValue::Symbol(this_symbol(interp, &this, "Symbol.prototype.valueOf")?))
}

fn symbol_description(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let sym = this_symbol(interp, &this, "Symbol.prototype.description")?;
    Ok(sym
        .description()
        .map(|d| JsValue::String(d.cheap_clone()))
        .unwrap_or(JsValue::Undefined))
}

// BigInt

fn bigint_call(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let prim = interp.to_primitive(&arg(args, 0), Hint::Number)?;
    match prim {
        JsValue::Number(n) => {
            if n.fract() != 0.0 || !n.is_finite() {
                return Err(JsError::range_error(format!(
                    "The number {} cannot be converted to a BigInt because it is not an integer",
                    number_to_string(n)
                )));
            }
            BigInt::from_f64(n)
                .map(JsValue::from)
                .ok_or_else(|| JsError::range_error("Invalid BigInt"))
        }
        JsValue::BigInt(_) => Ok(prim),
        JsValue::Boolean(b) => Ok(JsValue::from(BigInt::from(u8::from(b)))),
        JsValue::String(s) => parse_bigint(s.as_str())
            .map(JsValue::from)
            .ok_or_else(|| JsError::syntax_error(format!("Cannot convert {} to a BigInt", s))),
        other => Err(JsError::type_error(format!(
            "Cannot convert {} to a BigInt",
            interp.display_primitive(&other)
        ))),
    }
}

fn bigint_construct(_interp: &mut Interpreter, _new_target: ObjectId, _args: &[JsValue]) -> Result<JsValue, JsError> {
    Err(JsError::type_error("BigInt is not a constructor"))
}

fn this_bigint(interp: &Interpreter, this: &JsValue, method: &str) -> Result<JsValue, JsError> {
    match this {
        JsValue::BigInt(_) => Ok(this.cheap_clone()),
        JsValue::Object(id) => match &interp.obj(*id)?.kind {
            ObjectKind::BigInt(b) => Ok(JsValue::BigInt(b.cheap_clone())),
            _ => Err(incompatible(method)),
        },
        _ => Err(incompatible(method)),
    }
}

fn bigint_to_string(interp: &mut Interpreter, this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let JsValue::BigInt(b) = this_bigint(interp, &this, "BigInt.prototype.toString")? else {
        return Err(incompatible("BigInt.prototype.toString"));
    };
    let radix = match arg(args, 0) {
        JsValue::Undefined => 10,
        v => {
            let r = interp.to_number(&v)?;
            if !(2.0..=36.0).contains(&r) {
                return Err(JsError::range_error("toString() radix must be between 2 and 36"));
            }
            r as u32
        }
    };
    Ok(JsValue::String(JsString::from(b.value().to_str_radix(radix))))
}

fn bigint_value_of(interp: &mut Interpreter, this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    this_bigint(interp, &this, "BigInt.prototype.valueOf")
}
