//! Call and construct protocol
//!
//! Bytecode calling bytecode pushes a frame and returns to the dispatch loop.
//! Everything else (natives, bound functions, generator and async starts,
//! host entry points) goes through `call_value`, which re-enters `execute`
//! for bytecode targets.

use std::rc::Rc;

use crate::bytecode::{BytecodeChunk, FunctionKind, Register};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::function::{Callable, Closure, NativeFunction};
use crate::object::shape::PropertyFlags;
use crate::value::{CheapClone, JsValue, PropertyKey, number_to_string};

use super::stack::{Frame, ReturnTo};
use super::{Interpreter, NativeCall};

/// Arguments beyond this make `apply`-style calls throw
const MAX_SPREAD_ARGS: usize = 65535;

/// Everything needed to start a bytecode activation
pub(crate) struct FrameSetup<'a> {
    pub chunk: Rc<BytecodeChunk>,
    pub callee: Option<ObjectId>,
    pub env: Option<ObjectId>,
    pub this: JsValue,
    pub new_target: JsValue,
    pub args: &'a [JsValue],
    pub return_to: ReturnTo,
    pub construct: bool,
}

/// `prototype` of functions and classes: writable only for plain functions
const FUNCTION_PROTOTYPE_FLAGS: PropertyFlags = PropertyFlags {
    writable: true,
    enumerable: false,
    configurable: false,
    accessor: false,
};

const CLASS_PROTOTYPE_FLAGS: PropertyFlags = PropertyFlags {
    writable: false,
    enumerable: false,
    configurable: false,
    accessor: false,
};

impl Interpreter {
    pub(crate) fn push_frame(&mut self, setup: FrameSetup<'_>) -> Result<(), JsError> {
        if self.frames.len() >= self.config.max_stack_depth {
            tracing::trace!(depth = self.frames.len(), "frame stack limit hit");
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        let args_base = self.stack.len();
        self.stack.extend_from_slice(setup.args);
        let base = self.stack.len();
        self.stack.grow(setup.chunk.register_count as usize);
        let this = if setup.chunk.function_info.kind == FunctionKind::Arrow {
            JsValue::Undefined
        } else {
            setup.this
        };
        self.frames.push(Frame {
            chunk: setup.chunk,
            ip: 0,
            args_base,
            argc: setup.args.len(),
            base,
            this,
            new_target: setup.new_target,
            callee: setup.callee,
            env: setup.env,
            return_to: setup.return_to,
            construct: setup.construct,
            generator: None,
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Callable inspection
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn callable_of(&self, value: &JsValue) -> Option<(ObjectId, Callable)> {
        let id = value.as_object()?;
        let callable = self.heap.get(id)?.callable()?.clone();
        Some((id, callable))
    }

    pub fn is_callable(&self, value: &JsValue) -> bool {
        value
            .as_object()
            .and_then(|id| self.heap.get(id))
            .is_some_and(|o| o.is_callable())
    }

    pub(crate) fn is_constructor(&self, id: ObjectId) -> bool {
        match self.heap.get(id).and_then(|o| o.callable()) {
            Some(Callable::Closure(c)) => c.chunk.function_info.kind.is_constructor(),
            Some(Callable::Native(n)) => n.construct.is_some(),
            Some(Callable::Bound(b)) => self.is_constructor(b.target),
            Some(Callable::PromiseResolver(_)) | None => false,
        }
    }

    /// Literal-style rendering used in "is not a function" messages
    pub(crate) fn describe_for_error(&self, value: &JsValue) -> String {
        match value {
            JsValue::Undefined | JsValue::Empty => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Boolean(b) => b.to_string(),
            JsValue::Number(n) => number_to_string(*n),
            JsValue::String(s) => format!("\"{}\"", s),
            JsValue::Object(_) => "Object".to_string(),
            JsValue::Symbol(_) | JsValue::BigInt(_) => "Value".to_string(),
        }
    }

    fn not_a_function(&self, value: &JsValue) -> JsError {
        JsError::type_error(format!("{} is not a function", self.describe_for_error(value)))
    }

    fn not_a_constructor(&self, value: &JsValue) -> JsError {
        if self.is_callable(value) {
            JsError::type_error("Function is not a constructor")
        } else {
            JsError::type_error(format!(
                "{} is not a constructor",
                self.describe_for_error(value)
            ))
        }
    }

    fn class_call_error(closure: &Closure) -> JsError {
        let name = closure
            .chunk
            .name()
            .map(|n| n.to_string())
            .unwrap_or_default();
        JsError::type_error(format!(
            "Class constructor {} cannot be invoked without 'new'",
            name
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════════

    /// Call from a bytecode `Call*` op; the result lands in `dst` of the
    /// calling frame.
    pub(crate) fn call_from_bytecode(
        &mut self,
        dst: Register,
        callee: JsValue,
        this: JsValue,
        args: Vec<JsValue>,
    ) -> Result<(), JsError> {
        let (id, callable) = self
            .callable_of(&callee)
            .ok_or_else(|| self.not_a_function(&callee))?;
        if let Callable::Closure(closure) = &callable
            && matches!(
                closure.chunk.function_info.kind,
                FunctionKind::Normal | FunctionKind::Arrow | FunctionKind::Method
            )
        {
            return self.push_frame(FrameSetup {
                chunk: closure.chunk.cheap_clone(),
                callee: Some(id),
                env: closure.env,
                this,
                new_target: JsValue::Undefined,
                args: &args,
                return_to: ReturnTo::Register(dst),
                construct: false,
            });
        }
        let value = self.call_callable(id, callable, this, &args)?;
        let base = self.frame()?.base;
        self.set_reg(base, dst, value)
    }

    /// Call any value from Rust, re-entering the dispatch loop if needed
    pub(crate) fn call_value(
        &mut self,
        callee: &JsValue,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let (id, callable) = self
            .callable_of(callee)
            .ok_or_else(|| self.not_a_function(callee))?;
        self.call_callable(id, callable, this, args)
    }

    fn call_callable(
        &mut self,
        id: ObjectId,
        callable: Callable,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        match callable {
            Callable::Closure(closure) => match closure.chunk.function_info.kind {
                FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor => {
                    Err(Self::class_call_error(&closure))
                }
                FunctionKind::Generator | FunctionKind::AsyncGenerator => {
                    self.create_generator(id, &closure, this, args)
                }
                FunctionKind::AsyncFunction => self.start_async_function(id, &closure, this, args),
                FunctionKind::Normal | FunctionKind::Arrow | FunctionKind::Method => {
                    self.run_closure(id, &closure, this, JsValue::Undefined, args, false)
                }
            },
            Callable::Native(native) => self.call_native(&native, this, args),
            Callable::Bound(bound) => {
                let mut full = bound.args.clone();
                full.extend_from_slice(args);
                self.call_value(&JsValue::Object(bound.target), bound.this, &full)
            }
            Callable::PromiseResolver(resolver) => self.call_promise_resolver(&resolver, args),
        }
    }

    /// Run a bytecode function to completion on a nested `execute` loop
    fn run_closure(
        &mut self,
        id: ObjectId,
        closure: &Closure,
        this: JsValue,
        new_target: JsValue,
        args: &[JsValue],
        construct: bool,
    ) -> Result<JsValue, JsError> {
        self.enter_native()?;
        let depth = self.frames.len();
        let result = self
            .push_frame(FrameSetup {
                chunk: closure.chunk.cheap_clone(),
                callee: Some(id),
                env: closure.env,
                this,
                new_target,
                args,
                return_to: ReturnTo::Host,
                construct,
            })
            .and_then(|()| self.execute(depth))
            .and_then(|completion| completion.into_return());
        self.leave_native();
        result
    }

    pub(crate) fn call_native(
        &mut self,
        native: &NativeFunction,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        self.enter_native()?;
        let scope = self.guard_scope();
        self.guard_value(&this);
        self.guard_values(args);
        self.native_calls.push(NativeCall {
            depth: self.frames.len(),
            name: native.name.cheap_clone(),
        });
        let result = match (native.call)(self, this, args) {
            Err(e) if e.native_parts().is_some() && self.has_reachable_handler() => {
                self.error_value(e).and_then(|v| Err(JsError::thrown(v)))
            }
            other => other,
        };
        self.native_calls.pop();
        self.release_guards(scope);
        self.leave_native();
        result
    }

    /// Host entry point: call `callee` with `this` and `args`
    pub fn call_function(
        &mut self,
        callee: &JsValue,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        self.enter_host_call();
        let result = self.call_value(callee, this, args);
        self.leave_host_call();
        let value = result?;
        self.capture_escaping_value(&value);
        Ok(value)
    }

    /// Host entry point: `new callee(...args)`
    pub fn construct(&mut self, callee: &JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
        self.enter_host_call();
        let result = match callee.as_object() {
            Some(id) if self.is_constructor(id) => self.construct_with_target(id, args, id),
            _ => Err(self.not_a_constructor(callee)),
        };
        self.leave_host_call();
        let value = result?;
        self.capture_escaping_value(&value);
        Ok(value)
    }

    /// Collect call arguments from an array-like (`apply`, spread calls).
    /// Each element is rooted as soon as it is read, since reading later
    /// elements may run getters that allocate and collect.
    pub(crate) fn array_like_to_args(&mut self, list: &JsValue) -> Result<Vec<JsValue>, JsError> {
        let id = match list {
            JsValue::Undefined | JsValue::Null => return Ok(Vec::new()),
            JsValue::Object(id) => *id,
            _ => {
                return Err(JsError::type_error(
                    "CreateListFromArrayLike called on non-object",
                ));
            }
        };
        let length_key = self.key("length");
        let length = self.get_property(id, &length_key)?;
        let length = self.to_length(&length)?;
        if length > MAX_SPREAD_ARGS {
            return Err(JsError::range_error("Too many arguments in function call"));
        }
        let mut args = Vec::with_capacity(length);
        for index in 0..length {
            let value = self.get_property(id, &PropertyKey::Index(index as u32))?;
            self.guard_value(&value);
            args.push(value);
        }
        Ok(args)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Construct
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn construct_from_bytecode(
        &mut self,
        dst: Register,
        callee: JsValue,
        args: Vec<JsValue>,
    ) -> Result<(), JsError> {
        let id = match callee.as_object() {
            Some(id) if self.is_constructor(id) => id,
            _ => return Err(self.not_a_constructor(&callee)),
        };
        if let Some((_, Callable::Closure(closure))) = self.callable_of(&callee)
            && closure.chunk.function_info.kind != FunctionKind::DerivedConstructor
        {
            let this = JsValue::Object(self.create_this(id)?);
            if closure.field_initializer.is_some() {
                let scope = self.guard_scope();
                self.guard_value(&this);
                let result = self.run_field_initializer(&closure, &this);
                self.release_guards(scope);
                result?;
            }
            return self.push_frame(FrameSetup {
                chunk: closure.chunk.cheap_clone(),
                callee: Some(id),
                env: closure.env,
                this,
                new_target: JsValue::Object(id),
                args: &args,
                return_to: ReturnTo::Register(dst),
                construct: true,
            });
        }
        let value = self.construct_with_target(id, &args, id)?;
        let base = self.frame()?.base;
        self.set_reg(base, dst, value)
    }

    /// `[[Construct]]` with an explicit `new.target`
    pub(crate) fn construct_with_target(
        &mut self,
        callee: ObjectId,
        args: &[JsValue],
        new_target: ObjectId,
    ) -> Result<JsValue, JsError> {
        let callable = self
            .obj(callee)?
            .callable()
            .cloned()
            .ok_or_else(|| JsError::type_error("Function is not a constructor"))?;
        match callable {
            Callable::Closure(closure) if closure.chunk.function_info.kind.is_constructor() => {
                let derived = closure.chunk.function_info.kind == FunctionKind::DerivedConstructor;
                let this = if derived {
                    JsValue::Empty
                } else {
                    JsValue::Object(self.create_this(new_target)?)
                };
                let scope = self.guard_scope();
                self.guard_value(&this);
                let result = if derived {
                    Ok(())
                } else {
                    self.run_field_initializer(&closure, &this)
                }
                .and_then(|()| {
                    self.run_closure(callee, &closure, this, JsValue::Object(new_target), args, true)
                });
                self.release_guards(scope);
                result
            }
            Callable::Native(native) => match native.construct {
                Some(ctor) => {
                    self.enter_native()?;
                    let scope = self.guard_scope();
                    self.guard_values(args);
                    self.native_calls.push(NativeCall {
                        depth: self.frames.len(),
                        name: native.name.cheap_clone(),
                    });
                    let result = ctor(self, new_target, args);
                    self.native_calls.pop();
                    self.release_guards(scope);
                    self.leave_native();
                    result
                }
                None => Err(JsError::type_error("Function is not a constructor")),
            },
            Callable::Bound(bound) => {
                let target_new = if new_target == callee {
                    bound.target
                } else {
                    new_target
                };
                let mut full = bound.args.clone();
                full.extend_from_slice(args);
                self.construct_with_target(bound.target, &full, target_new)
            }
            _ => Err(JsError::type_error("Function is not a constructor")),
        }
    }

    /// Fresh receiver whose prototype comes from `new_target.prototype`
    pub(crate) fn create_this(&mut self, new_target: ObjectId) -> Result<ObjectId, JsError> {
        let proto = self.prototype_from_constructor(new_target, self.realm.object_prototype)?;
        Ok(self.alloc_object(Some(proto), ObjectKind::Ordinary))
    }

    /// `new_target.prototype` if it is an object, else `fallback`
    pub(crate) fn prototype_from_constructor(
        &mut self,
        new_target: ObjectId,
        fallback: ObjectId,
    ) -> Result<ObjectId, JsError> {
        let key = self.key("prototype");
        Ok(self
            .get_property(new_target, &key)?
            .as_object()
            .unwrap_or(fallback))
    }

    fn run_field_initializer(&mut self, closure: &Closure, this: &JsValue) -> Result<(), JsError> {
        if let Some(init) = closure.field_initializer {
            self.call_value(&JsValue::Object(init), this.cheap_clone(), &[])?;
        }
        Ok(())
    }

    /// Result of a construct frame: an object return wins, otherwise `this`
    pub(crate) fn construct_result(&self, frame: &Frame, value: JsValue) -> Result<JsValue, JsError> {
        if value.is_object() {
            return Ok(value);
        }
        if frame.chunk.function_info.kind == FunctionKind::DerivedConstructor && !value.is_undefined()
        {
            return Err(JsError::type_error(
                "Derived constructors may only return object or undefined",
            ));
        }
        if frame.this.is_empty() {
            return Err(JsError::reference_error(
                "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
            ));
        }
        Ok(frame.this.cheap_clone())
    }

    /// `super(...args)` in a derived constructor
    pub(crate) fn call_super(
        &mut self,
        base: usize,
        dst: Register,
        args: Vec<JsValue>,
    ) -> Result<(), JsError> {
        let frame = self.frame()?;
        let callee = frame
            .callee
            .ok_or_else(|| JsError::syntax_error("'super' keyword unexpected here"))?;
        let new_target = frame
            .new_target
            .as_object()
            .ok_or_else(|| JsError::syntax_error("'super' keyword unexpected here"))?;
        let parent = match self.obj(callee)?.prototype {
            Some(p) if self.is_constructor(p) => p,
            _ => return Err(JsError::type_error("Super constructor is not a constructor")),
        };
        let this = self.construct_with_target(parent, &args, new_target)?;
        if !self.frame()?.this.is_empty() {
            return Err(JsError::reference_error(
                "super() called twice in derived constructor",
            ));
        }
        self.frame_mut()?.this = this.cheap_clone();
        self.set_reg(base, dst, this.cheap_clone())?;
        if let Some((_, Callable::Closure(closure))) = self.callable_of(&JsValue::Object(callee)) {
            self.run_field_initializer(&closure, &this)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Function objects
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn create_closure(
        &mut self,
        chunk: Rc<BytecodeChunk>,
        env: Option<ObjectId>,
    ) -> Result<ObjectId, JsError> {
        let kind = chunk.function_info.kind;
        let strict = chunk.function_info.strict;
        let name = chunk.function_info.name.clone();
        let arity = chunk.function_info.param_count;
        let func = self.alloc_object(
            Some(self.realm.function_prototype),
            ObjectKind::Function(Callable::Closure(Closure {
                chunk,
                env,
                field_initializer: None,
            })),
        );
        let name = name.unwrap_or_else(|| self.intern(""));
        self.set_function_name_and_length(func, JsValue::String(name), arity);

        // Sloppy functions shadow the poisoned accessors on Function.prototype
        if kind == FunctionKind::Normal && !strict {
            for prop in ["caller", "arguments"] {
                let key = self.key(prop);
                self.define_raw(func, key, JsValue::Undefined, PropertyFlags::READONLY_HIDDEN);
            }
        }

        if kind.has_prototype() {
            let proto = match kind {
                FunctionKind::Generator => {
                    self.alloc_object(Some(self.realm.generator_prototype), ObjectKind::Ordinary)
                }
                FunctionKind::AsyncGenerator => self.alloc_object(
                    Some(self.realm.async_generator_prototype),
                    ObjectKind::Ordinary,
                ),
                _ => {
                    let proto = self.create_object();
                    let ctor_key = self.key("constructor");
                    self.define_raw(proto, ctor_key, JsValue::Object(func), PropertyFlags::HIDDEN);
                    proto
                }
            };
            let key = self.key("prototype");
            self.define_raw(func, key, JsValue::Object(proto), FUNCTION_PROTOTYPE_FLAGS);
        }
        Ok(func)
    }

    /// Class constructor and prototype object
    pub(crate) fn create_class(
        &mut self,
        chunk: Rc<BytecodeChunk>,
        env: Option<ObjectId>,
        super_class: Option<JsValue>,
        fields: Option<ObjectId>,
    ) -> Result<(ObjectId, ObjectId), JsError> {
        let function_proto = self.realm.function_prototype;
        let (proto_parent, ctor_parent) = match super_class {
            None => (Some(self.realm.object_prototype), function_proto),
            Some(JsValue::Null) => (None, function_proto),
            Some(JsValue::Object(sc)) if self.is_constructor(sc) => {
                let key = self.key("prototype");
                match self.get_property(sc, &key)? {
                    JsValue::Object(p) => (Some(p), sc),
                    JsValue::Null => (None, sc),
                    other => {
                        return Err(JsError::type_error(format!(
                            "Class extends value does not have valid prototype property {}",
                            self.describe_for_error(&other)
                        )));
                    }
                }
            }
            Some(other) => {
                return Err(JsError::type_error(format!(
                    "Class extends value {} is not a constructor or null",
                    self.describe_for_error(&other)
                )));
            }
        };

        let name = chunk.function_info.name.clone();
        let arity = chunk.function_info.param_count;
        let proto = self.alloc_object(proto_parent, ObjectKind::Ordinary);
        let ctor = self.alloc_object(
            Some(ctor_parent),
            ObjectKind::Function(Callable::Closure(Closure {
                chunk,
                env,
                field_initializer: fields,
            })),
        );
        let name = name.unwrap_or_else(|| self.intern(""));
        self.set_function_name_and_length(ctor, JsValue::String(name), arity);
        let proto_key = self.key("prototype");
        self.define_raw(ctor, proto_key, JsValue::Object(proto), CLASS_PROTOTYPE_FLAGS);
        let ctor_key = self.key("constructor");
        self.define_raw(proto, ctor_key, JsValue::Object(ctor), PropertyFlags::HIDDEN);
        Ok((ctor, proto))
    }

    /// Unmapped arguments object for the running frame
    pub(crate) fn create_arguments_object(&mut self) -> Result<ObjectId, JsError> {
        let frame = self.frame()?;
        let args = self
            .stack
            .slice(frame.args_base, frame.args_base + frame.argc)
            .to_vec();
        let argc = args.len();
        let id = self.alloc_object(Some(self.realm.object_prototype), ObjectKind::Arguments);
        self.obj_mut(id)?.elements = args;
        let length_key = self.key("length");
        self.define_raw(id, length_key, JsValue::Number(argc as f64), PropertyFlags::HIDDEN);
        let iterator = PropertyKey::Symbol(self.realm.iterator_symbol.cheap_clone());
        self.define_raw(
            id,
            iterator,
            JsValue::Object(self.realm.array_values),
            PropertyFlags::HIDDEN,
        );
        Ok(id)
    }
}
