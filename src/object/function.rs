//! Callable object payloads

use std::cell::Cell;
use std::rc::Rc;

use crate::bytecode::{BytecodeChunk, FunctionKind};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::interpreter::Interpreter;
use crate::value::{JsString, JsValue};

/// Host function signature: `(interp, this, args)`
pub type NativeFn = fn(&mut Interpreter, JsValue, &[JsValue]) -> Result<JsValue, JsError>;

/// Host constructor signature: `(interp, new_target, args)`
pub type NativeCtor = fn(&mut Interpreter, ObjectId, &[JsValue]) -> Result<JsValue, JsError>;

/// What happens when a function object is called
#[derive(Clone)]
pub enum Callable {
    Closure(Closure),
    Native(NativeFunction),
    Bound(BoundFunction),
    PromiseResolver(PromiseResolver),
}

impl Callable {
    pub fn name(&self) -> Option<&JsString> {
        match self {
            Callable::Closure(c) => c.chunk.function_info.name.as_ref(),
            Callable::Native(n) => Some(&n.name),
            Callable::Bound(_) | Callable::PromiseResolver(_) => None,
        }
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            Callable::Closure(c) => c.chunk.function_info.kind,
            _ => FunctionKind::Normal,
        }
    }

    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        match self {
            Callable::Closure(c) => {
                if let Some(env) = c.env {
                    visitor(env);
                }
                if let Some(init) = c.field_initializer {
                    visitor(init);
                }
            }
            Callable::Native(_) => {}
            Callable::Bound(b) => {
                visitor(b.target);
                trace_value(&b.this, visitor);
                for arg in &b.args {
                    trace_value(arg, visitor);
                }
            }
            Callable::PromiseResolver(r) => visitor(r.promise),
        }
    }
}

/// A bytecode function paired with its captured environment
#[derive(Clone)]
pub struct Closure {
    pub chunk: Rc<BytecodeChunk>,
    pub env: Option<ObjectId>,
    /// Class-field initializer run against each new instance
    pub field_initializer: Option<ObjectId>,
}

#[derive(Clone)]
pub struct NativeFunction {
    pub name: JsString,
    pub call: NativeFn,
    /// Present only for natives usable with `new`
    pub construct: Option<NativeCtor>,
}

/// Result of `Function.prototype.bind`
#[derive(Clone)]
pub struct BoundFunction {
    pub target: ObjectId,
    pub this: JsValue,
    pub args: Vec<JsValue>,
}

/// The resolve or reject function handed to a promise executor. Both
/// functions of a pair share `already_resolved`.
#[derive(Clone)]
pub struct PromiseResolver {
    pub promise: ObjectId,
    pub reject: bool,
    pub already_resolved: Rc<Cell<bool>>,
}

pub(crate) fn trace_value<F: FnMut(ObjectId)>(value: &JsValue, visitor: &mut F) {
    if let JsValue::Object(id) = value {
        visitor(*id);
    }
}
