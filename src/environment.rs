//! Lexical environments.
//!
//! An environment is a fixed-size array of binding slots plus a link to its
//! enclosing environment. Environments are heap cells like any object, so a
//! closure keeps its captured scope chain alive simply by referencing it.
//!
//! Lexical bindings (`let`, `const`, `class`) start out holding
//! `JsValue::Empty` and stay in their temporal dead zone until the first
//! store. `var` and parameter bindings start as `undefined`.

use crate::bytecode::{ScopeDescriptor, SlotKind};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::function::trace_value;
use crate::value::{CheapClone, JsValue};

#[derive(Debug, Clone)]
pub struct Environment {
    pub parent: Option<ObjectId>,
    pub slots: Vec<JsValue>,
}

impl Environment {
    pub fn new(parent: Option<ObjectId>, scope: &ScopeDescriptor) -> Self {
        let slots = scope
            .slots
            .iter()
            .map(|kind| match kind {
                SlotKind::Var => JsValue::Undefined,
                SlotKind::Lexical => JsValue::Empty,
            })
            .collect();
        Self { parent, slots }
    }

    /// Raw slot read. May return `Empty`; TDZ checks are separate ops.
    pub fn get(&self, slot: u16) -> Result<JsValue, JsError> {
        self.slots
            .get(slot as usize)
            .map(CheapClone::cheap_clone)
            .ok_or_else(|| JsError::internal_error(format!("environment slot {} out of range", slot)))
    }

    pub fn set(&mut self, slot: u16, value: JsValue) -> Result<(), JsError> {
        match self.slots.get_mut(slot as usize) {
            Some(s) => {
                *s = value;
                Ok(())
            }
            None => Err(JsError::internal_error(format!(
                "environment slot {} out of range",
                slot
            ))),
        }
    }

    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        if let Some(parent) = self.parent {
            visitor(parent);
        }
        for value in &self.slots {
            trace_value(value, visitor);
        }
    }
}
