//! Register stack and call frames
//!
//! All activations share one value stack. A frame owns the window
//! `[args_base, base + register_count)`: its arguments first, then its
//! registers. Frames are pushed for bytecode calls only; native functions run
//! on the Rust stack and never get a window.

use std::rc::Rc;

use crate::bytecode::{BytecodeChunk, Register};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::value::{CheapClone, JsValue};

/// Where a frame's return value goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTo {
    /// Back to the Rust caller that started this `execute` loop
    Host,
    /// Into a register of the calling frame
    Register(Register),
}

pub struct Frame {
    pub chunk: Rc<BytecodeChunk>,
    /// Next instruction to execute
    pub ip: usize,
    pub args_base: usize,
    pub argc: usize,
    /// Stack index of r0
    pub base: usize,
    pub this: JsValue,
    pub new_target: JsValue,
    /// Running function object; `None` for top-level code
    pub callee: Option<ObjectId>,
    /// Captured environment of the running closure
    pub env: Option<ObjectId>,
    pub return_to: ReturnTo,
    /// Running as `[[Construct]]`
    pub construct: bool,
    /// Generator object this activation belongs to
    pub generator: Option<ObjectId>,
}

impl Frame {
    pub fn is_strict(&self) -> bool {
        self.chunk.function_info.strict
    }

    /// Instruction currently executing (the one before `ip`)
    pub fn current_ip(&self) -> usize {
        self.ip.saturating_sub(1)
    }
}

/// Value stack backing every frame's arguments and registers
#[derive(Default)]
pub struct RegisterStack {
    values: Vec<JsValue>,
}

impl RegisterStack {
    pub fn new() -> Self {
        Self { values: Vec::with_capacity(1024) }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<JsValue, JsError> {
        self.values
            .get(index)
            .map(CheapClone::cheap_clone)
            .ok_or_else(|| JsError::internal_error(format!("stack read out of range: {}", index)))
    }

    pub fn set(&mut self, index: usize, value: JsValue) -> Result<(), JsError> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(JsError::internal_error(format!(
                "stack write out of range: {}",
                index
            ))),
        }
    }

    pub fn extend_from_slice(&mut self, values: &[JsValue]) {
        self.values.extend_from_slice(values);
    }

    /// Grow by `count` undefined slots
    pub fn grow(&mut self, count: usize) {
        self.values
            .resize(self.values.len() + count, JsValue::Undefined);
    }

    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Remove and return everything from `start` on
    pub fn split_off(&mut self, start: usize) -> Vec<JsValue> {
        if start >= self.values.len() {
            return Vec::new();
        }
        self.values.split_off(start)
    }

    pub fn slice(&self, start: usize, end: usize) -> &[JsValue] {
        self.values.get(start..end).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &JsValue> {
        self.values.iter()
    }
}
