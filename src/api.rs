//! Host embedding helpers on [`Interpreter`]
//!
//! Values returned to the host by these helpers are rooted with
//! [`Interpreter::capture_escaping_value`] until the host calls
//! [`Interpreter::release_escaped_values`].
//!
//! # Example
//!
//! ```
//! use regvm::{Interpreter, JsValue};
//!
//! let mut interp = Interpreter::new();
//! let value = interp.value_from_json(&serde_json::json!({ "port": 8080 }));
//! interp.set_global("config", value).unwrap();
//! let back = interp.get_global("config").unwrap();
//! assert_eq!(
//!     interp.value_to_json(&back).unwrap(),
//!     serde_json::json!({ "port": 8080 })
//! );
//! ```

use serde_json::{Map, Number, Value as Json};

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::object::function::NativeFn;
use crate::object::shape::PropertyFlags;
use crate::object::ObjectKind;
use crate::value::{CheapClone, JsString, JsValue, PropertyKey};

/// Nesting accepted by `value_to_json` before giving up
const MAX_JSON_DEPTH: usize = 512;

impl Interpreter {
    /// Expose a native function as a global binding
    pub fn register_global_function(&mut self, name: &str, func: NativeFn, arity: usize) -> ObjectId {
        let f = self.create_native_function(name, func, arity, None);
        let global = self.realm.global;
        let key = self.key(name);
        self.define_raw(global, key, JsValue::Object(f), PropertyFlags::HIDDEN);
        f
    }

    /// Read a property of the global object; missing bindings read as undefined
    pub fn get_global(&mut self, name: &str) -> Result<JsValue, JsError> {
        let global = self.realm.global;
        let key = self.key(name);
        let value = self.get_property(global, &key)?;
        self.capture_escaping_value(&value);
        Ok(value)
    }

    /// Create or overwrite a property of the global object
    pub fn set_global(&mut self, name: &str, value: JsValue) -> Result<(), JsError> {
        let global = self.realm.global;
        let key = self.key(name);
        self.set_property(global, key, value, true)
    }

    /// `target[name]` for any value, running getters
    pub fn get(&mut self, target: &JsValue, name: &str) -> Result<JsValue, JsError> {
        let key = self.key(name);
        let value = self.get_value_property(target, &key)?;
        self.capture_escaping_value(&value);
        Ok(value)
    }

    /// `target[name] = value` in strict mode
    pub fn set(&mut self, target: ObjectId, name: &str, value: JsValue) -> Result<(), JsError> {
        let key = self.key(name);
        self.set_property(target, key, value, true)
    }

    /// `target[name](...args)`
    pub fn call_method(&mut self, target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, JsError> {
        let key = self.key(name);
        let scope = self.guard_scope();
        self.guard_value(target);
        self.guard_values(args);
        let result = self
            .get_value_property(target, &key)
            .and_then(|method| self.call_function(&method, target.cheap_clone(), args));
        self.release_guards(scope);
        result
    }

    /// Build a JS value from JSON. Objects and arrays get the realm prototypes.
    pub fn value_from_json(&mut self, json: &Json) -> JsValue {
        let value = self.json_to_value(json);
        self.capture_escaping_value(&value);
        value
    }

    fn json_to_value(&mut self, json: &Json) -> JsValue {
        match json {
            Json::Null => JsValue::Null,
            Json::Bool(b) => JsValue::Boolean(*b),
            Json::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => JsValue::String(JsString::from(s.as_str())),
            Json::Array(items) => {
                let elements = items.iter().map(|item| self.json_to_value(item)).collect();
                JsValue::Object(self.create_array(elements))
            }
            Json::Object(fields) => {
                let obj = self.create_object();
                for (name, item) in fields {
                    let value = self.json_to_value(item);
                    let key = PropertyKey::from(JsString::from(name.as_str()));
                    self.define_raw(obj, key, value, PropertyFlags::DEFAULT);
                }
                JsValue::Object(obj)
            }
        }
    }

    /// Serialize a value the way `JSON.stringify` would: undefined, functions
    /// and symbols are dropped from objects and become null in arrays,
    /// non-finite numbers become null.
    pub fn value_to_json(&mut self, value: &JsValue) -> Result<Json, JsError> {
        let scope = self.guard_scope();
        self.guard_value(value);
        let mut path = Vec::new();
        let result = self.serialize_json(value, &mut path);
        self.release_guards(scope);
        Ok(result?.unwrap_or(Json::Null))
    }

    /// `None` for values JSON has no encoding for
    fn serialize_json(&mut self, value: &JsValue, path: &mut Vec<ObjectId>) -> Result<Option<Json>, JsError> {
        let id = match value {
            JsValue::Undefined | JsValue::Empty | JsValue::Symbol(_) => return Ok(None),
            JsValue::Null => return Ok(Some(Json::Null)),
            JsValue::Boolean(b) => return Ok(Some(Json::Bool(*b))),
            JsValue::Number(n) => return Ok(Some(number_to_json(*n))),
            JsValue::String(s) => return Ok(Some(Json::String(s.to_string()))),
            JsValue::BigInt(_) => {
                return Err(JsError::type_error("Do not know how to serialize a BigInt"));
            }
            JsValue::Object(id) => *id,
        };
        let unwrapped = match &self.obj(id)?.kind {
            ObjectKind::Function(_) => return Ok(None),
            ObjectKind::Number(n) => Some(number_to_json(*n)),
            ObjectKind::String(s) => Some(Json::String(s.to_string())),
            ObjectKind::Boolean(b) => Some(Json::Bool(*b)),
            _ => None,
        };
        if unwrapped.is_some() {
            return Ok(unwrapped);
        }
        if path.contains(&id) {
            return Err(JsError::type_error("Converting circular structure to JSON"));
        }
        if path.len() >= MAX_JSON_DEPTH {
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        path.push(id);
        let result = if matches!(self.obj(id)?.kind, ObjectKind::Array) {
            self.serialize_array(id, path)
        } else {
            self.serialize_object(id, path)
        };
        path.pop();
        result.map(Some)
    }

    fn serialize_array(&mut self, id: ObjectId, path: &mut Vec<ObjectId>) -> Result<Json, JsError> {
        let length_key = self.key("length");
        let length = self.get_property(id, &length_key)?;
        let length = self.to_length(&length)?;
        let mut items = Vec::with_capacity(length.min(1024));
        for index in 0..length {
            let index = u32::try_from(index).map_err(|_| JsError::range_error("Invalid array length"))?;
            let item = self.get_property(id, &PropertyKey::Index(index))?;
            let scope = self.guard_scope();
            self.guard_value(&item);
            let encoded = self.serialize_json(&item, path);
            self.release_guards(scope);
            items.push(encoded?.unwrap_or(Json::Null));
        }
        Ok(Json::Array(items))
    }

    fn serialize_object(&mut self, id: ObjectId, path: &mut Vec<ObjectId>) -> Result<Json, JsError> {
        let mut fields = Map::new();
        for key in self.own_enumerable_string_keys(id)? {
            let item = self.get_property(id, &key)?;
            let scope = self.guard_scope();
            self.guard_value(&item);
            let encoded = self.serialize_json(&item, path);
            self.release_guards(scope);
            if let Some(encoded) = encoded? {
                fields.insert(key.to_string(), encoded);
            }
        }
        Ok(Json::Object(fields))
    }
}

/// Integral numbers serialize without a fraction
fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}
