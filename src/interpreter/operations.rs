//! Coercions and operators
//!
//! Type conversions (`ToPrimitive`, `ToNumber`, `ToString`, ...), the
//! arithmetic and comparison operators with their Number/BigInt split, and
//! the iterator protocol used by the iteration ops.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::function::Callable;
use crate::value::{
    CheapClone, JsBigInt, JsString, JsValue, PropertyKey, number_to_string, string_to_number,
    to_int32, to_uint32,
};

use super::Interpreter;

/// Largest BigInt exponent or shift accepted before a RangeError
const MAX_BIGINT_BITS: u64 = 1 << 20;

/// Preferred type for `ToPrimitive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    Default,
    Number,
    String,
}

/// Binary operators that coerce both sides with `ToNumeric`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumericOp {
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    URShift,
}

/// `**` on numbers; differs from `powf` for NaN exponents and |base| = 1
pub(crate) fn number_pow(base: f64, exp: f64) -> f64 {
    if exp.is_nan() || (base.abs() == 1.0 && exp.is_infinite()) {
        return f64::NAN;
    }
    libm::pow(base, exp)
}

fn number_op(op: NumericOp, a: f64, b: f64) -> f64 {
    match op {
        NumericOp::Sub => a - b,
        NumericOp::Mul => a * b,
        NumericOp::Div => a / b,
        NumericOp::Mod => a % b,
        NumericOp::Exp => number_pow(a, b),
        NumericOp::BitAnd => (to_int32(a) & to_int32(b)) as f64,
        NumericOp::BitOr => (to_int32(a) | to_int32(b)) as f64,
        NumericOp::BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        NumericOp::LShift => to_int32(a).wrapping_shl(to_uint32(b) & 31) as f64,
        NumericOp::RShift => to_int32(a).wrapping_shr(to_uint32(b) & 31) as f64,
        NumericOp::URShift => to_uint32(a).wrapping_shr(to_uint32(b) & 31) as f64,
    }
}

fn shift_amount(b: &BigInt) -> Result<i64, JsError> {
    match b.to_i64() {
        Some(n) if n.unsigned_abs() <= MAX_BIGINT_BITS => Ok(n),
        _ => Err(JsError::range_error("Maximum BigInt size exceeded")),
    }
}

fn shift_left(a: &BigInt, amount: i64) -> BigInt {
    if amount >= 0 {
        a << (amount as usize)
    } else {
        a >> (amount.unsigned_abs() as usize)
    }
}

fn bigint_op(op: NumericOp, a: &BigInt, b: &BigInt) -> Result<BigInt, JsError> {
    Ok(match op {
        NumericOp::Sub => a - b,
        NumericOp::Mul => a * b,
        NumericOp::Div | NumericOp::Mod if b.is_zero() => {
            return Err(JsError::range_error("Division by zero"));
        }
        NumericOp::Div => a / b,
        NumericOp::Mod => a % b,
        NumericOp::Exp => {
            if b.is_negative() {
                return Err(JsError::range_error("Exponent must be non-negative"));
            }
            match b.to_u32() {
                Some(e) if (e as u64) <= MAX_BIGINT_BITS => a.pow(e),
                _ if a.is_zero() || a.abs() == BigInt::from(1) => {
                    if a.is_negative() && (b % 2u32) == BigInt::from(1) {
                        a.clone()
                    } else if a.is_zero() {
                        BigInt::zero()
                    } else {
                        BigInt::from(1)
                    }
                }
                _ => return Err(JsError::range_error("Maximum BigInt size exceeded")),
            }
        }
        NumericOp::BitAnd => a & b,
        NumericOp::BitOr => a | b,
        NumericOp::BitXor => a ^ b,
        NumericOp::LShift => shift_left(a, shift_amount(b)?),
        NumericOp::RShift => shift_left(a, -shift_amount(b)?),
        NumericOp::URShift => {
            return Err(JsError::type_error(
                "BigInts have no unsigned right shift, use >> instead",
            ));
        }
    })
}

/// Order of a BigInt against a Number; `None` when the number is NaN
fn compare_bigint_number(a: &BigInt, n: f64) -> Option<Ordering> {
    if n.is_nan() {
        return None;
    }
    if n.is_infinite() {
        return Some(if n > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = BigInt::from_f64(n.floor())?;
    match a.cmp(&floor) {
        Ordering::Equal if n.fract() != 0.0 => Some(Ordering::Less),
        other => Some(other),
    }
}

pub(crate) fn parse_bigint(s: &str) -> Option<BigInt> {
    let t = s.trim();
    if t.is_empty() {
        return Some(BigInt::zero());
    }
    t.parse::<BigInt>().ok()
}

fn mixed_bigint_error(n: f64) -> JsError {
    JsError::type_error(format!("Cannot convert {} to BigInt", number_to_string(n)))
}

impl Interpreter {
    // ═══════════════════════════════════════════════════════════════════════════
    // Conversions
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn to_primitive(&mut self, value: &JsValue, hint: Hint) -> Result<JsValue, JsError> {
        let JsValue::Object(id) = value else {
            return Ok(value.cheap_clone());
        };
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default | Hint::Number => ["valueOf", "toString"],
        };
        for name in order {
            let key = self.key(name);
            let method = self.get_property(*id, &key)?;
            if self.is_callable(&method) {
                let result = self.call_value(&method, value.cheap_clone(), &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(JsError::type_error("Cannot convert object to primitive value"))
    }

    pub(crate) fn to_number(&mut self, value: &JsValue) -> Result<f64, JsError> {
        match value {
            JsValue::Undefined | JsValue::Empty => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => Ok(string_to_number(s.as_str())),
            JsValue::Symbol(_) => Err(JsError::type_error(
                "Cannot convert a Symbol value to a number",
            )),
            JsValue::BigInt(_) => Err(JsError::type_error("Cannot convert BigInt to number")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, Hint::Number)?;
                self.to_number(&prim)
            }
        }
    }

    /// Number or BigInt
    pub(crate) fn to_numeric(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        let prim = self.to_primitive(value, Hint::Number)?;
        match prim {
            JsValue::BigInt(_) | JsValue::Number(_) => Ok(prim),
            other => Ok(JsValue::Number(self.to_number(&other)?)),
        }
    }

    pub(crate) fn to_js_string(&mut self, value: &JsValue) -> Result<JsString, JsError> {
        match value {
            JsValue::String(s) => Ok(s.cheap_clone()),
            JsValue::Symbol(_) => Err(JsError::type_error(
                "Cannot convert a Symbol value to a string",
            )),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, Hint::String)?;
                self.to_js_string(&prim)
            }
            other => {
                let text = self.display_primitive(other);
                Ok(self.intern(&text))
            }
        }
    }

    /// Rendering of a value that never runs user code
    pub(crate) fn display_primitive(&self, value: &JsValue) -> String {
        match value {
            JsValue::Undefined | JsValue::Empty => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Boolean(b) => b.to_string(),
            JsValue::Number(n) => number_to_string(*n),
            JsValue::BigInt(b) => b.value().to_string(),
            JsValue::String(s) => s.to_string(),
            JsValue::Symbol(s) => s.to_string(),
            JsValue::Object(id) => {
                let name = self
                    .heap
                    .get(*id)
                    .map_or("Object", |o| o.kind.class_name());
                format!("#<{}>", name)
            }
        }
    }

    pub(crate) fn to_property_key(&mut self, value: &JsValue) -> Result<PropertyKey, JsError> {
        match value {
            JsValue::Number(n) => Ok(PropertyKey::from_number(*n)),
            JsValue::String(s) => Ok(PropertyKey::from(s.cheap_clone())),
            JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.cheap_clone())),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, Hint::String)?;
                self.to_property_key(&prim)
            }
            other => {
                let s = self.to_js_string(other)?;
                Ok(PropertyKey::from(s))
            }
        }
    }

    /// Box primitives; objects pass through
    pub(crate) fn to_object(&mut self, value: &JsValue) -> Result<ObjectId, JsError> {
        let (proto, kind) = match value {
            JsValue::Object(id) => return Ok(*id),
            JsValue::Undefined | JsValue::Null | JsValue::Empty => {
                return Err(JsError::type_error(
                    "Cannot convert undefined or null to object",
                ));
            }
            JsValue::Boolean(b) => (self.realm.boolean_prototype, ObjectKind::Boolean(*b)),
            JsValue::Number(n) => (self.realm.number_prototype, ObjectKind::Number(*n)),
            JsValue::String(s) => (self.realm.string_prototype, ObjectKind::String(s.cheap_clone())),
            JsValue::Symbol(s) => (self.realm.symbol_prototype, ObjectKind::Symbol(s.cheap_clone())),
            JsValue::BigInt(b) => (self.realm.bigint_prototype, ObjectKind::BigInt(b.cheap_clone())),
        };
        Ok(self.alloc_object(Some(proto), kind))
    }

    pub(crate) fn to_length(&mut self, value: &JsValue) -> Result<usize, JsError> {
        let n = self.to_number(value)?;
        if n.is_nan() || n <= 0.0 {
            return Ok(0);
        }
        Ok(n.floor().min(9007199254740991.0) as usize)
    }

    pub(crate) fn type_of(&self, value: &JsValue) -> &'static str {
        match value {
            JsValue::Undefined | JsValue::Empty => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::BigInt(_) => "bigint",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Object(_) => {
                if self.is_callable(value) {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Arithmetic
    // ═══════════════════════════════════════════════════════════════════════════

    /// The `+` operator
    pub(crate) fn add_values(&mut self, left: &JsValue, right: &JsValue) -> Result<JsValue, JsError> {
        let lp = self.to_primitive(left, Hint::Default)?;
        let rp = self.to_primitive(right, Hint::Default)?;
        if matches!(lp, JsValue::String(_)) || matches!(rp, JsValue::String(_)) {
            let ls = self.to_js_string(&lp)?;
            let rs = self.to_js_string(&rp)?;
            let mut out = String::with_capacity(ls.as_str().len() + rs.as_str().len());
            out.push_str(ls.as_str());
            out.push_str(rs.as_str());
            return Ok(JsValue::String(JsString::from(out)));
        }
        let ln = self.to_numeric(&lp)?;
        let rn = self.to_numeric(&rp)?;
        match (&ln, &rn) {
            (JsValue::Number(a), JsValue::Number(b)) => Ok(JsValue::Number(a + b)),
            (JsValue::BigInt(a), JsValue::BigInt(b)) => {
                Ok(JsValue::BigInt(JsBigInt::from(a.value() + b.value())))
            }
            (JsValue::Number(n), _) | (_, JsValue::Number(n)) => Err(mixed_bigint_error(*n)),
            _ => Err(JsError::internal_error("ToNumeric returned a non-numeric")),
        }
    }

    pub(crate) fn numeric_op(
        &mut self,
        op: NumericOp,
        left: &JsValue,
        right: &JsValue,
    ) -> Result<JsValue, JsError> {
        let ln = self.to_numeric(left)?;
        let rn = self.to_numeric(right)?;
        match (&ln, &rn) {
            (JsValue::Number(a), JsValue::Number(b)) => Ok(JsValue::Number(number_op(op, *a, *b))),
            (JsValue::BigInt(a), JsValue::BigInt(b)) => {
                Ok(JsValue::BigInt(JsBigInt::from(bigint_op(op, a.value(), b.value())?)))
            }
            (JsValue::BigInt(_), JsValue::Number(_)) | (JsValue::Number(_), JsValue::BigInt(_))
                if op == NumericOp::URShift =>
            {
                Err(JsError::type_error(
                    "BigInts have no unsigned right shift, use >> instead",
                ))
            }
            (JsValue::Number(n), _) | (_, JsValue::Number(n)) => Err(mixed_bigint_error(*n)),
            _ => Err(JsError::internal_error("ToNumeric returned a non-numeric")),
        }
    }

    pub(crate) fn negate(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        match self.to_numeric(value)? {
            JsValue::BigInt(b) => Ok(JsValue::BigInt(JsBigInt::from(-b.value()))),
            other => Ok(JsValue::Number(-self.to_number(&other)?)),
        }
    }

    pub(crate) fn bit_not(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        match self.to_numeric(value)? {
            JsValue::BigInt(b) => Ok(JsValue::BigInt(JsBigInt::from(-b.value() - BigInt::from(1)))),
            other => Ok(JsValue::Number(!to_int32(self.to_number(&other)?) as f64)),
        }
    }

    /// `++`/`--` on a non-number
    pub(crate) fn increment(&mut self, value: &JsValue, delta: i8) -> Result<JsValue, JsError> {
        match self.to_numeric(value)? {
            JsValue::BigInt(b) => Ok(JsValue::BigInt(JsBigInt::from(b.value() + BigInt::from(delta)))),
            other => Ok(JsValue::Number(self.to_number(&other)? + delta as f64)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Comparison
    // ═══════════════════════════════════════════════════════════════════════════

    /// The `==` operator
    pub(crate) fn loose_equals(&mut self, left: &JsValue, right: &JsValue) -> Result<bool, JsError> {
        use JsValue as V;
        Ok(match (left, right) {
            (V::Undefined | V::Null | V::Empty, V::Undefined | V::Null | V::Empty) => true,
            (V::Undefined | V::Null | V::Empty, _) | (_, V::Undefined | V::Null | V::Empty) => false,
            (V::Number(a), V::String(s)) | (V::String(s), V::Number(a)) => {
                *a == string_to_number(s.as_str())
            }
            (V::BigInt(b), V::String(s)) | (V::String(s), V::BigInt(b)) => {
                parse_bigint(s.as_str()).is_some_and(|p| &p == b.value())
            }
            (V::BigInt(b), V::Number(n)) | (V::Number(n), V::BigInt(b)) => {
                compare_bigint_number(b.value(), *n) == Some(Ordering::Equal)
            }
            (V::Boolean(b), other) | (other, V::Boolean(b)) if !matches!(other, V::Boolean(_)) => {
                let n = V::Number(if *b { 1.0 } else { 0.0 });
                return self.loose_equals(&n, other);
            }
            (V::Object(_), V::Number(_) | V::String(_) | V::BigInt(_) | V::Symbol(_)) => {
                let prim = self.to_primitive(left, Hint::Default)?;
                return self.loose_equals(&prim, right);
            }
            (V::Number(_) | V::String(_) | V::BigInt(_) | V::Symbol(_), V::Object(_)) => {
                let prim = self.to_primitive(right, Hint::Default)?;
                return self.loose_equals(left, &prim);
            }
            _ => left.strict_equals(right),
        })
    }

    /// Abstract relational comparison `left < right`. `None` means
    /// undefined (a NaN was involved). `left_first` fixes the order the
    /// operands are converted in.
    pub(crate) fn less_than(
        &mut self,
        left: &JsValue,
        right: &JsValue,
        left_first: bool,
    ) -> Result<Option<bool>, JsError> {
        let (lp, rp) = if left_first {
            let lp = self.to_primitive(left, Hint::Number)?;
            (lp, self.to_primitive(right, Hint::Number)?)
        } else {
            let rp = self.to_primitive(right, Hint::Number)?;
            (self.to_primitive(left, Hint::Number)?, rp)
        };
        match (&lp, &rp) {
            (JsValue::String(a), JsValue::String(b)) => {
                return Ok(Some(a.cmp_utf16(b) == Ordering::Less));
            }
            (JsValue::BigInt(a), JsValue::String(s)) => {
                return Ok(parse_bigint(s.as_str()).map(|b| a.value() < &b));
            }
            (JsValue::String(s), JsValue::BigInt(b)) => {
                return Ok(parse_bigint(s.as_str()).map(|a| &a < b.value()));
            }
            _ => {}
        }
        let ln = self.to_numeric(&lp)?;
        let rn = self.to_numeric(&rp)?;
        Ok(match (&ln, &rn) {
            (JsValue::Number(a), JsValue::Number(b)) => {
                if a.is_nan() || b.is_nan() {
                    None
                } else {
                    Some(a < b)
                }
            }
            (JsValue::BigInt(a), JsValue::BigInt(b)) => Some(a.value() < b.value()),
            (JsValue::BigInt(a), JsValue::Number(n)) => {
                compare_bigint_number(a.value(), *n).map(|o| o == Ordering::Less)
            }
            (JsValue::Number(n), JsValue::BigInt(b)) => {
                compare_bigint_number(b.value(), *n).map(|o| o == Ordering::Greater)
            }
            _ => None,
        })
    }

    pub(crate) fn instance_of(&mut self, value: &JsValue, ctor: &JsValue) -> Result<bool, JsError> {
        let not_callable = || JsError::type_error("Right-hand side of 'instanceof' is not callable");
        let (ctor_id, callable) = match ctor {
            JsValue::Object(_) => self.callable_of(ctor).ok_or_else(not_callable)?,
            _ => return Err(not_callable()),
        };
        if let Callable::Bound(bound) = callable {
            return self.instance_of(value, &JsValue::Object(bound.target));
        }
        let JsValue::Object(start) = value else {
            return Ok(false);
        };
        let key = self.key("prototype");
        let proto = match self.get_property(ctor_id, &key)? {
            JsValue::Object(p) => p,
            other => {
                return Err(JsError::type_error(format!(
                    "Function has non-object prototype '{}' in instanceof check",
                    self.display_primitive(&other)
                )));
            }
        };
        let mut current = self.obj(*start)?.prototype;
        while let Some(p) = current {
            if p == proto {
                return Ok(true);
            }
            current = self.obj(p)?.prototype;
        }
        Ok(false)
    }

    /// The `in` operator
    pub(crate) fn in_operator(&mut self, key: &JsValue, target: &JsValue) -> Result<bool, JsError> {
        let JsValue::Object(id) = target else {
            let key_text = self.display_primitive(key);
            return Err(JsError::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key_text,
                self.display_primitive(target)
            )));
        };
        let key = self.to_property_key(key)?;
        self.has_property(*id, &key)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Iteration
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn get_iterator(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        let key = PropertyKey::Symbol(self.realm.iterator_symbol.cheap_clone());
        let method = self.get_value_property(value, &key)?;
        if !self.is_callable(&method) {
            return Err(JsError::type_error(format!(
                "{} is not iterable",
                self.describe_for_error(value)
            )));
        }
        let iterator = self.call_value(&method, value.cheap_clone(), &[])?;
        if !iterator.is_object() {
            return Err(JsError::type_error(
                "Result of the Symbol.iterator method is not an object",
            ));
        }
        Ok(iterator)
    }

    /// `Symbol.asyncIterator`, falling back to the sync iterator
    pub(crate) fn get_async_iterator(&mut self, value: &JsValue) -> Result<JsValue, JsError> {
        let key = PropertyKey::Symbol(self.realm.async_iterator_symbol.cheap_clone());
        let method = self.get_value_property(value, &key)?;
        if method.is_nullish() {
            return self.get_iterator(value);
        }
        if !self.is_callable(&method) {
            return Err(JsError::type_error(format!(
                "{} is not async iterable",
                self.describe_for_error(value)
            )));
        }
        let iterator = self.call_value(&method, value.cheap_clone(), &[])?;
        if !iterator.is_object() {
            return Err(JsError::type_error(
                "Result of the Symbol.asyncIterator method is not an object",
            ));
        }
        Ok(iterator)
    }

    /// Call `next()`; returns `(value, done)`
    pub(crate) fn iterator_step(&mut self, iterator: &JsValue) -> Result<(JsValue, bool), JsError> {
        let next_key = self.key("next");
        let next = self.get_value_property(iterator, &next_key)?;
        let result = self.call_value(&next, iterator.cheap_clone(), &[])?;
        if !result.is_object() {
            return Err(JsError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_primitive(&result)
            )));
        }
        let done_key = self.key("done");
        let done = self.get_value_property(&result, &done_key)?.to_boolean();
        if done {
            return Ok((JsValue::Undefined, true));
        }
        let value_key = self.key("value");
        let value = self.get_value_property(&result, &value_key)?;
        Ok((value, false))
    }

    /// Call `return()` if the iterator has one. On the throw path its
    /// catchable errors and its result are ignored.
    pub(crate) fn iterator_close(&mut self, iterator: &JsValue, on_throw: bool) -> Result<(), JsError> {
        let key = self.key("return");
        let method = match self.get_value_property(iterator, &key) {
            Ok(m) => m,
            Err(e) if on_throw && e.is_catchable() => return Ok(()),
            Err(e) => return Err(e),
        };
        if method.is_nullish() {
            return Ok(());
        }
        let result = self.call_value(&method, iterator.cheap_clone(), &[]);
        if on_throw {
            return match result {
                Err(e) if !e.is_catchable() => Err(e),
                _ => Ok(()),
            };
        }
        let value = result?;
        if !value.is_object() {
            return Err(JsError::type_error(format!(
                "Iterator result {} is not an object",
                self.display_primitive(&value)
            )));
        }
        Ok(())
    }
}
