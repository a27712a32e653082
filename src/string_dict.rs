//! String interning for property names.
//!
//! The interpreter interns every key it hands to the hidden-class table so
//! that lookups of the same name share one `Rc<str>` and key comparison can
//! short-circuit on pointer equality.

use rustc_hash::FxHashMap;

use crate::value::{CheapClone, JsString};

pub struct StringDict {
    strings: FxHashMap<Box<str>, JsString>,
}

impl StringDict {
    pub fn new() -> Self {
        Self {
            strings: FxHashMap::default(),
        }
    }

    /// Create a dictionary pre-populated with names the runtime uses itself.
    pub fn with_common_strings() -> Self {
        let mut dict = Self::new();
        for s in COMMON_STRINGS {
            dict.intern(s);
        }
        dict
    }

    /// Get an existing string or insert a new one.
    pub fn intern(&mut self, s: &str) -> JsString {
        if let Some(existing) = self.strings.get(s) {
            return existing.cheap_clone();
        }
        let js_str = JsString::from(s);
        self.strings.insert(s.into(), js_str.cheap_clone());
        js_str
    }

    /// Intern a string that was created elsewhere, returning the shared copy.
    pub fn intern_js(&mut self, js_str: &JsString) -> JsString {
        if let Some(existing) = self.strings.get(js_str.as_str()) {
            return existing.cheap_clone();
        }
        self.strings
            .insert(js_str.as_str().into(), js_str.cheap_clone());
        js_str.cheap_clone()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringDict {
    fn default() -> Self {
        Self::new()
    }
}

const COMMON_STRINGS: &[&str] = &[
    "length",
    "prototype",
    "constructor",
    "name",
    "message",
    "stack",
    "value",
    "done",
    "next",
    "return",
    "throw",
    "then",
    "toString",
    "valueOf",
    "callee",
    "get",
    "set",
    "writable",
    "enumerable",
    "configurable",
];
