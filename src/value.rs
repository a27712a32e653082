//! JavaScript value representation
//!
//! Primitive values, property keys and the numeric conversions that do not
//! need the heap. Objects are referenced through `ObjectId` handles into the
//! interpreter's heap.

use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::gc::ObjectId;

/// Trait for types that have cheap (O(1), reference-counted) clones.
///
/// This makes it explicit at call sites when a clone only bumps a reference
/// count. Types implementing it must have O(1) clone operations.
pub trait CheapClone: Clone {
    fn cheap_clone(&self) -> Self {
        self.clone()
    }
}

impl<T: ?Sized> CheapClone for Rc<T> {}

/// A JavaScript value
#[derive(Clone, Default)]
pub enum JsValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(JsBigInt),
    String(JsString),
    Symbol(JsSymbol),
    Object(ObjectId),
    /// Uninitialized-binding sentinel. Never observable by JS code: reads
    /// through `ThrowIfEmpty` turn it into a ReferenceError.
    Empty,
}

impl CheapClone for JsValue {}

impl JsValue {
    pub fn number(n: impl Into<f64>) -> Self {
        JsValue::Number(n.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    /// Check if this value is null or undefined
    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Null | JsValue::Undefined)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, JsValue::Empty)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            JsValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert to boolean (ToBoolean)
    pub fn to_boolean(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null | JsValue::Empty => false,
            JsValue::Boolean(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::BigInt(b) => !b.value().is_zero(),
            JsValue::String(s) => !s.is_empty(),
            JsValue::Symbol(_) | JsValue::Object(_) => true,
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Empty, JsValue::Empty) => true,
            (JsValue::Boolean(a), JsValue::Boolean(b)) => a == b,
            // NaN !== NaN, +0 === -0
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::BigInt(a), JsValue::BigInt(b)) => a.value() == b.value(),
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => a == b,
            _ => false,
        }
    }

    /// SameValueZero: like `===` except NaN equals NaN
    pub fn same_value_zero(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Number(a), JsValue::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// SameValue: distinguishes +0 from -0 and equates NaN
    pub fn same_value(&self, other: &JsValue) -> bool {
        match (self, other) {
            (JsValue::Number(a), JsValue::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{}", b),
            JsValue::Number(n) => write!(f, "{}", number_to_string(*n)),
            JsValue::BigInt(b) => write!(f, "{}n", b.value()),
            JsValue::String(s) => write!(f, "\"{}\"", s.as_str()),
            JsValue::Symbol(s) => write!(f, "{}", s),
            JsValue::Object(id) => write!(f, "[object #{}]", id.index()),
            JsValue::Empty => write!(f, "<empty>"),
        }
    }
}

/// Structural equality for tests and host code: numbers compare with
/// SameValueZero so `NaN == NaN` here.
impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_value_zero(other)
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        JsValue::Boolean(b)
    }
}

impl From<f64> for JsValue {
    fn from(n: f64) -> Self {
        JsValue::Number(n)
    }
}

impl From<i32> for JsValue {
    fn from(n: i32) -> Self {
        JsValue::Number(n as f64)
    }
}

impl From<u32> for JsValue {
    fn from(n: u32) -> Self {
        JsValue::Number(n as f64)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        JsValue::String(JsString::from(s))
    }
}

impl From<JsString> for JsValue {
    fn from(s: JsString) -> Self {
        JsValue::String(s)
    }
}

impl From<ObjectId> for JsValue {
    fn from(id: ObjectId) -> Self {
        JsValue::Object(id)
    }
}

impl From<BigInt> for JsValue {
    fn from(b: BigInt) -> Self {
        JsValue::BigInt(JsBigInt::from(b))
    }
}

/// Reference-counted string for efficient string handling
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Rc<str>);

impl CheapClone for JsString {}

impl JsString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in UTF-16 code units, as seen by `.length`
    pub fn utf16_len(&self) -> usize {
        self.0.encode_utf16().count()
    }

    /// One-unit string at UTF-16 `index`. A lone half of a surrogate pair
    /// has no `str` form and reads as U+FFFD.
    pub fn code_unit_at(&self, index: usize) -> Option<JsString> {
        let unit = self.0.encode_utf16().nth(index)?;
        Some(JsString::from(String::from_utf16_lossy(&[unit])))
    }

    /// Ordering by UTF-16 code units, as used by relational comparison
    pub fn cmp_utf16(&self, other: &JsString) -> std::cmp::Ordering {
        self.0.encode_utf16().cmp(other.0.encode_utf16())
    }

    pub fn ptr_eq(a: &JsString, b: &JsString) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl AsRef<str> for JsString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for JsString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(s.into())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        JsString(s.into())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JavaScript Symbol primitive. Identity is the id; descriptions may repeat.
#[derive(Clone, Debug)]
pub struct JsSymbol(Rc<SymbolData>);

#[derive(Debug)]
struct SymbolData {
    id: u64,
    description: Option<JsString>,
}

impl CheapClone for JsSymbol {}

impl JsSymbol {
    pub fn new(id: u64, description: Option<JsString>) -> Self {
        JsSymbol(Rc::new(SymbolData { id, description }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn description(&self) -> Option<&JsString> {
        self.0.description.as_ref()
    }
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for JsSymbol {}

impl std::hash::Hash for JsSymbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.description {
            Some(desc) => write!(f, "Symbol({})", desc),
            None => write!(f, "Symbol()"),
        }
    }
}

/// Arbitrary-precision integer primitive
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JsBigInt(Rc<BigInt>);

impl CheapClone for JsBigInt {}

impl JsBigInt {
    pub fn value(&self) -> &BigInt {
        &self.0
    }

    /// Numeric value, rounding toward the nearest representable double
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }
}

impl From<BigInt> for JsBigInt {
    fn from(b: BigInt) -> Self {
        JsBigInt(Rc::new(b))
    }
}

impl From<i64> for JsBigInt {
    fn from(n: i64) -> Self {
        JsBigInt(Rc::new(BigInt::from(n)))
    }
}

/// Property key (string, array index, or symbol)
///
/// Canonical array-index strings ("0" through "4294967294") are always
/// stored as `Index`, so `o["1"]` and `o[1]` name the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    Index(u32),
    Symbol(JsSymbol),
}

impl CheapClone for PropertyKey {}

impl PropertyKey {
    pub fn is_symbol(&self) -> bool {
        matches!(self, PropertyKey::Symbol(_))
    }

    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Check if this key equals a string literal (avoids allocation)
    #[inline]
    pub fn eq_str(&self, s: &str) -> bool {
        match self {
            PropertyKey::String(js_str) => js_str.as_str() == s,
            PropertyKey::Index(_) | PropertyKey::Symbol(_) => false,
        }
    }

    /// The key as a JS value (indices become strings)
    pub fn to_value(&self) -> JsValue {
        match self {
            PropertyKey::String(s) => JsValue::String(s.cheap_clone()),
            PropertyKey::Index(i) => JsValue::String(JsString::from(i.to_string())),
            PropertyKey::Symbol(s) => JsValue::Symbol(s.cheap_clone()),
        }
    }

    /// Key for a numeric property access like `o[1.5]`
    pub fn from_number(n: f64) -> Self {
        if n >= 0.0 && n < u32::MAX as f64 && n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative())
        {
            PropertyKey::Index(n as u32)
        } else {
            PropertyKey::from(number_to_string(n))
        }
    }
}

fn parse_array_index(s: &str) -> Option<u32> {
    let first = s.bytes().next()?;
    if !first.is_ascii_digit() || (first == b'0' && s.len() > 1) {
        return None;
    }
    match s.parse::<u32>() {
        // 2^32 - 1 is not an array index
        Ok(idx) if idx != u32::MAX => Some(idx),
        _ => None,
    }
}

impl From<&str> for PropertyKey {
    #[inline]
    fn from(s: &str) -> Self {
        match parse_array_index(s) {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(JsString::from(s)),
        }
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        match parse_array_index(&s) {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(JsString::from(s)),
        }
    }
}

impl From<JsString> for PropertyKey {
    #[inline]
    fn from(s: JsString) -> Self {
        match parse_array_index(s.as_str()) {
            Some(idx) => PropertyKey::Index(idx),
            None => PropertyKey::String(s),
        }
    }
}

impl From<u32> for PropertyKey {
    fn from(idx: u32) -> Self {
        PropertyKey::Index(idx)
    }
}

impl From<JsSymbol> for PropertyKey {
    fn from(sym: JsSymbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Index(i) => write!(f, "{}", i),
            PropertyKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// Hashable SameValueZero key for Map and Set entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Undefined,
    Null,
    Boolean(bool),
    /// Canonical bits: every NaN maps to one pattern, -0 maps to +0
    Number(u64),
    BigInt(JsBigInt),
    String(JsString),
    Symbol(JsSymbol),
    Object(ObjectId),
}

impl MapKey {
    pub fn from_value(value: &JsValue) -> Self {
        match value {
            JsValue::Undefined | JsValue::Empty => MapKey::Undefined,
            JsValue::Null => MapKey::Null,
            JsValue::Boolean(b) => MapKey::Boolean(*b),
            JsValue::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0.0f64.to_bits()
                } else {
                    n.to_bits()
                };
                MapKey::Number(bits)
            }
            JsValue::BigInt(b) => MapKey::BigInt(b.cheap_clone()),
            JsValue::String(s) => MapKey::String(s.cheap_clone()),
            JsValue::Symbol(s) => MapKey::Symbol(s.cheap_clone()),
            JsValue::Object(id) => MapKey::Object(*id),
        }
    }
}

/// Number::toString(10)
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }

    // Shortest round-trip digits in scientific form, e.g. "1.2345e-7"
    let sci = format!("{:e}", n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let e: i32 = exp.parse().unwrap_or(0);
    // Decimal point position relative to the digit string
    let point = e + 1;

    if k <= point && point <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat_n('0', (point - k) as usize));
        out
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let exp_sign = if point - 1 >= 0 { "+" } else { "-" };
        let exp_abs = (point - 1).abs();
        let mut chars = digits.chars();
        let first = chars.next().unwrap_or('0');
        let rest: String = chars.collect();
        if rest.is_empty() {
            format!("{}e{}{}", first, exp_sign, exp_abs)
        } else {
            format!("{}.{}e{}{}", first, rest, exp_sign, exp_abs)
        }
    }
}

/// StringToNumber: whitespace-trimmed decimal, hex/octal/binary literals,
/// `Infinity`; anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix_prefixed = |prefix_lower: &str, radix: u32| -> Option<f64> {
        let lower = trimmed.get(..2)?.to_ascii_lowercase();
        if lower != prefix_lower {
            return None;
        }
        let body = trimmed.get(2..)?;
        if body.is_empty() {
            return Some(f64::NAN);
        }
        let mut value = 0.0f64;
        for c in body.chars() {
            let digit = match c.to_digit(radix) {
                Some(d) => d,
                None => return Some(f64::NAN),
            };
            value = value * radix as f64 + digit as f64;
        }
        Some(value)
    };
    if let Some(v) = radix_prefixed("0x", 16)
        .or_else(|| radix_prefixed("0o", 8))
        .or_else(|| radix_prefixed("0b", 2))
    {
        return v;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf"/"nan" spellings that JS rejects
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
    {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToInt32 on a number
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = libm::trunc(n) % 4294967296.0;
    let m = if m < 0.0 { m + 4294967296.0 } else { m };
    (m as u32) as i32
}

/// ToUint32 on a number
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}
