//! Bytecode dispatch loop
//!
//! `execute` runs frames until the frame it was entered at returns or
//! suspends. Bytecode-to-bytecode calls push a frame and keep looping, so JS
//! recursion does not grow the Rust stack; only native functions that call
//! back into JS re-enter `execute`.
//!
//! Errors unwind through the exception table of each frame in turn. Native
//! errors are turned into JS error objects before the first frame is popped,
//! so the captured stack still shows where they were raised.

use std::rc::Rc;

use crate::bytecode::{BytecodeChunk, Constant, ConstantIndex, Op, Register};
use crate::environment::Environment;
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::shape::PropertyFlags;
use crate::value::{CheapClone, JsString, JsValue, PropertyKey};

use super::Interpreter;
use super::operations::NumericOp;
use super::stack::{Frame, ReturnTo};

/// How an `execute` loop ended
#[derive(Debug)]
pub enum Completion {
    Return(JsValue),
    /// A generator suspended at `yield`
    Yield(JsValue),
    /// An async body suspended at `await`
    Await(JsValue),
}

impl Completion {
    pub(crate) fn into_return(self) -> Result<JsValue, JsError> {
        match self {
            Completion::Return(v) => Ok(v),
            Completion::Yield(_) | Completion::Await(_) => Err(JsError::internal_error(
                "suspension escaped a non-generator frame",
            )),
        }
    }
}

const UNINITIALIZED: &str = "accessing an uninitialized variable";

fn missing_frame() -> JsError {
    JsError::internal_error("no active frame")
}

impl Interpreter {
    /// Run until the frame at `entry_depth` completes
    pub(crate) fn execute(&mut self, entry_depth: usize) -> Result<Completion, JsError> {
        loop {
            match self.run_frames(entry_depth) {
                Ok(completion) => return Ok(completion),
                Err(error) => self.unwind(error, entry_depth)?,
            }
        }
    }

    fn run_frames(&mut self, entry_depth: usize) -> Result<Completion, JsError> {
        loop {
            self.safepoint();
            self.tick()?;
            let (op, ip, base) = {
                let frame = self.frames.last().ok_or_else(missing_frame)?;
                let op = *frame.chunk.get(frame.ip).ok_or_else(|| {
                    JsError::internal_error(format!("fell off the end of the code at {}", frame.ip))
                })?;
                (op, frame.ip, frame.base)
            };
            if let Some(frame) = self.frames.last_mut() {
                frame.ip = ip + 1;
            }
            if self.debugger.is_active() {
                self.debug_step(ip)?;
            }
            if let Some(completion) = self.step(op, base, entry_depth)? {
                return Ok(completion);
            }
        }
    }

    /// Deliver `error` to the nearest handler at or above `entry_depth`
    fn unwind(&mut self, error: JsError, entry_depth: usize) -> Result<(), JsError> {
        if !error.is_catchable() {
            self.pop_frames_to(entry_depth);
            return Err(error);
        }
        let error = match error {
            JsError::Thrown { .. } => error,
            native if self.has_reachable_handler() => JsError::thrown(self.error_value(native)?),
            native => native,
        };
        while self.frames.len() > entry_depth {
            let target = self.frames.last().and_then(|frame| {
                frame
                    .chunk
                    .find_handler(frame.current_ip())
                    .map(|h| h.target as usize)
            });
            if let Some(target) = target {
                let value = self.error_value(error)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.ip = target;
                }
                self.thrown = Some(value);
                return Ok(());
            }
            self.pop_frame();
        }
        Err(error)
    }

    pub(crate) fn has_reachable_handler(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.chunk.find_handler(frame.current_ip()).is_some())
    }

    pub(crate) fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.stack.truncate(frame.args_base);
        Some(frame)
    }

    pub(crate) fn pop_frames_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            self.pop_frame();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Register and frame helpers
    // ═══════════════════════════════════════════════════════════════════════════

    #[inline]
    pub(crate) fn reg(&self, base: usize, r: Register) -> Result<JsValue, JsError> {
        self.stack.get(base + r as usize)
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, base: usize, r: Register, value: JsValue) -> Result<(), JsError> {
        self.stack.set(base + r as usize, value)
    }

    pub(crate) fn frame(&self) -> Result<&Frame, JsError> {
        self.frames.last().ok_or_else(missing_frame)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame, JsError> {
        self.frames.last_mut().ok_or_else(missing_frame)
    }

    fn current_chunk(&self) -> Result<Rc<BytecodeChunk>, JsError> {
        Ok(self.frame()?.chunk.cheap_clone())
    }

    fn constant(&self, idx: ConstantIndex) -> Result<Constant, JsError> {
        self.frame()?
            .chunk
            .get_constant(idx)
            .cloned()
            .ok_or_else(|| JsError::internal_error(format!("constant {} out of range", idx)))
    }

    fn constant_string(&self, idx: ConstantIndex) -> Result<JsString, JsError> {
        match self.constant(idx)? {
            Constant::String(s) => Ok(s),
            _ => Err(JsError::internal_error("expected a string constant")),
        }
    }

    fn constant_key(&self, idx: ConstantIndex) -> Result<PropertyKey, JsError> {
        self.constant_string(idx).map(PropertyKey::from)
    }

    fn jump(&mut self, target: u32) -> Result<(), JsError> {
        self.frame_mut()?.ip = target as usize;
        Ok(())
    }

    fn env_object(&self, value: &JsValue) -> Result<ObjectId, JsError> {
        value
            .as_object()
            .filter(|id| self.heap.get(*id).and_then(|o| o.environment()).is_some())
            .ok_or_else(|| JsError::internal_error("register does not hold an environment"))
    }

    fn args_from_registers(&self, base: usize, start: Register, count: u8) -> Result<Vec<JsValue>, JsError> {
        let from = base + start as usize;
        let to = from + count as usize;
        if to > self.stack.len() {
            return Err(JsError::internal_error("argument registers out of range"));
        }
        Ok(self.stack.slice(from, to).to_vec())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════════

    fn step(&mut self, op: Op, base: usize, entry_depth: usize) -> Result<Option<Completion>, JsError> {
        match op {
            // ─────────────────────────────────────────────────────────────────
            // Loads
            // ─────────────────────────────────────────────────────────────────
            Op::LoadConst { dst, idx } => {
                let value = match self.constant(idx)? {
                    Constant::String(s) => JsValue::String(s),
                    Constant::Number(n) => JsValue::Number(n),
                    Constant::BigInt(b) => JsValue::BigInt(b),
                    _ => return Err(JsError::internal_error("LoadConst of a non-primitive")),
                };
                self.set_reg(base, dst, value)?;
            }
            Op::LoadInt { dst, value } => self.set_reg(base, dst, JsValue::Number(value as f64))?,
            Op::LoadUndefined { dst } => self.set_reg(base, dst, JsValue::Undefined)?,
            Op::LoadNull { dst } => self.set_reg(base, dst, JsValue::Null)?,
            Op::LoadBool { dst, value } => self.set_reg(base, dst, JsValue::Boolean(value))?,
            Op::LoadEmpty { dst } => self.set_reg(base, dst, JsValue::Empty)?,
            Op::Mov { dst, src } => {
                let v = self.reg(base, src)?;
                self.set_reg(base, dst, v)?;
            }
            Op::LoadParam { dst, index } => {
                let frame = self.frame()?;
                let value = if (index as usize) < frame.argc {
                    self.stack.get(frame.args_base + index as usize)?
                } else {
                    JsValue::Undefined
                };
                self.set_reg(base, dst, value)?;
            }
            Op::GetArgumentsLength { dst } => {
                let argc = self.frame()?.argc;
                self.set_reg(base, dst, JsValue::Number(argc as f64))?;
            }
            Op::ReifyArguments { dst } => {
                let args = self.create_arguments_object()?;
                self.set_reg(base, dst, JsValue::Object(args))?;
            }
            Op::LoadThis { dst } => {
                let this = self.frame()?.this.cheap_clone();
                if this.is_empty() {
                    return Err(JsError::reference_error(
                        "Must call super constructor in derived class before accessing 'this' or returning from derived constructor",
                    ));
                }
                self.set_reg(base, dst, this)?;
            }
            Op::CoerceThisNS { dst, src } => {
                let value = self.reg(base, src)?;
                let coerced = match value {
                    JsValue::Undefined | JsValue::Null => JsValue::Object(self.realm.global),
                    JsValue::Object(_) => value,
                    other => JsValue::Object(self.to_object(&other)?),
                };
                self.set_reg(base, dst, coerced)?;
            }
            Op::GetNewTarget { dst } => {
                let nt = self.frame()?.new_target.cheap_clone();
                self.set_reg(base, dst, nt)?;
            }
            Op::GetGlobalObject { dst } => {
                self.set_reg(base, dst, JsValue::Object(self.realm.global))?;
            }
            Op::LoadCallee { dst } => {
                let callee = self
                    .frame()?
                    .callee
                    .map(JsValue::Object)
                    .unwrap_or(JsValue::Undefined);
                self.set_reg(base, dst, callee)?;
            }

            // ─────────────────────────────────────────────────────────────────
            // Arithmetic and comparison
            // ─────────────────────────────────────────────────────────────────
            Op::Add { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = match (&l, &r) {
                    (JsValue::Number(a), JsValue::Number(b)) => JsValue::Number(a + b),
                    _ => self.add_values(&l, &r)?,
                };
                self.set_reg(base, dst, result)?;
            }
            Op::Sub { dst, left, right } => self.numeric_step(base, dst, left, right, NumericOp::Sub)?,
            Op::Mul { dst, left, right } => self.numeric_step(base, dst, left, right, NumericOp::Mul)?,
            Op::Div { dst, left, right } => self.numeric_step(base, dst, left, right, NumericOp::Div)?,
            Op::Mod { dst, left, right } => self.numeric_step(base, dst, left, right, NumericOp::Mod)?,
            Op::Exp { dst, left, right } => self.numeric_step(base, dst, left, right, NumericOp::Exp)?,
            Op::BitAnd { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::BitAnd)?
            }
            Op::BitOr { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::BitOr)?
            }
            Op::BitXor { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::BitXor)?
            }
            Op::LShift { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::LShift)?
            }
            Op::RShift { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::RShift)?
            }
            Op::URShift { dst, left, right } => {
                self.numeric_step(base, dst, left, right, NumericOp::URShift)?
            }
            Op::Eq { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let eq = self.loose_equals(&l, &r)?;
                self.set_reg(base, dst, JsValue::Boolean(eq))?;
            }
            Op::Neq { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let eq = self.loose_equals(&l, &r)?;
                self.set_reg(base, dst, JsValue::Boolean(!eq))?;
            }
            Op::StrictEq { dst, left, right } => {
                let eq = self.reg(base, left)?.strict_equals(&self.reg(base, right)?);
                self.set_reg(base, dst, JsValue::Boolean(eq))?;
            }
            Op::StrictNeq { dst, left, right } => {
                let eq = self.reg(base, left)?.strict_equals(&self.reg(base, right)?);
                self.set_reg(base, dst, JsValue::Boolean(!eq))?;
            }
            Op::Less { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.less_than(&l, &r, true)? == Some(true);
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::LessEq { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.less_than(&r, &l, false)? == Some(false);
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::Greater { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.less_than(&r, &l, false)? == Some(true);
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::GreaterEq { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.less_than(&l, &r, true)? == Some(false);
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::InstanceOf { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.instance_of(&l, &r)?;
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::IsIn { dst, left, right } => {
                let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
                let result = self.in_operator(&l, &r)?;
                self.set_reg(base, dst, JsValue::Boolean(result))?;
            }
            Op::Negate { dst, src } => {
                let v = self.reg(base, src)?;
                let result = self.negate(&v)?;
                self.set_reg(base, dst, result)?;
            }
            Op::Not { dst, src } => {
                let v = self.reg(base, src)?;
                self.set_reg(base, dst, JsValue::Boolean(!v.to_boolean()))?;
            }
            Op::BitNot { dst, src } => {
                let v = self.reg(base, src)?;
                let result = self.bit_not(&v)?;
                self.set_reg(base, dst, result)?;
            }
            Op::TypeOf { dst, src } => {
                let v = self.reg(base, src)?;
                let name = self.type_of(&v);
                let s = self.intern(name);
                self.set_reg(base, dst, JsValue::String(s))?;
            }
            Op::ToNumeric { dst, src } => {
                let v = self.reg(base, src)?;
                let result = self.to_numeric(&v)?;
                self.set_reg(base, dst, result)?;
            }
            Op::Inc { dst, src } => {
                let v = self.reg(base, src)?;
                let result = match v {
                    JsValue::Number(n) => JsValue::Number(n + 1.0),
                    other => self.increment(&other, 1)?,
                };
                self.set_reg(base, dst, result)?;
            }
            Op::Dec { dst, src } => {
                let v = self.reg(base, src)?;
                let result = match v {
                    JsValue::Number(n) => JsValue::Number(n - 1.0),
                    other => self.increment(&other, -1)?,
                };
                self.set_reg(base, dst, result)?;
            }

            // ─────────────────────────────────────────────────────────────────
            // Control flow
            // ─────────────────────────────────────────────────────────────────
            Op::Jmp { target } => self.jump(target)?,
            Op::JmpTrue { cond, target } => {
                if self.reg(base, cond)?.to_boolean() {
                    self.jump(target)?;
                }
            }
            Op::JmpFalse { cond, target } => {
                if !self.reg(base, cond)?.to_boolean() {
                    self.jump(target)?;
                }
            }
            Op::JmpUndefined { cond, target } => {
                if self.reg(base, cond)?.is_undefined() {
                    self.jump(target)?;
                }
            }
            Op::JmpNullish { cond, target } => {
                if self.reg(base, cond)?.is_nullish() {
                    self.jump(target)?;
                }
            }
            Op::SwitchImm { value, table, default } => {
                let v = self.reg(base, value)?;
                let chunk = self.current_chunk()?;
                let table = chunk
                    .jump_tables
                    .get(table as usize)
                    .ok_or_else(|| JsError::internal_error("jump table out of range"))?;
                let target = match v {
                    JsValue::Number(n) if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 => {
                        let offset = (n as i64) - (table.min as i64);
                        usize::try_from(offset)
                            .ok()
                            .and_then(|i| table.targets.get(i).copied())
                            .unwrap_or(default)
                    }
                    _ => default,
                };
                self.jump(target)?;
            }
            Op::StringSwitch { value, table, default } => {
                let v = self.reg(base, value)?;
                let chunk = self.current_chunk()?;
                let table = chunk
                    .string_tables
                    .get(table as usize)
                    .ok_or_else(|| JsError::internal_error("string table out of range"))?;
                let target = match &v {
                    JsValue::String(s) => table.cases.get(s).copied().unwrap_or(default),
                    _ => default,
                };
                self.jump(target)?;
            }
            Op::Ret { value } => {
                let result = self.reg(base, value)?;
                return self.return_from_frame(result, entry_depth);
            }
            Op::Throw { value } => {
                let v = self.reg(base, value)?;
                return Err(JsError::thrown(v));
            }
            Op::Catch { dst } => {
                let v = self.thrown.take().unwrap_or(JsValue::Undefined);
                self.set_reg(base, dst, v)?;
            }
            Op::Debugger => self.debugger_statement()?,
            Op::Nop => {}
            Op::Unreachable => return Err(JsError::internal_error("reached unreachable code")),

            // ─────────────────────────────────────────────────────────────────
            // Environments
            // ─────────────────────────────────────────────────────────────────
            Op::CreateEnvironment { dst, parent, scope } => {
                let parent = match parent {
                    Some(r) => Some(self.env_object(&self.reg(base, r)?)?),
                    None => self.frame()?.env,
                };
                let chunk = self.current_chunk()?;
                let descriptor = chunk
                    .scopes
                    .get(scope as usize)
                    .ok_or_else(|| JsError::internal_error("scope out of range"))?;
                let env = Environment::new(parent, descriptor);
                let id = self.alloc_object(None, ObjectKind::Environment(env));
                self.set_reg(base, dst, JsValue::Object(id))?;
            }
            Op::GetEnvironment { dst, level } => {
                let mut env = self
                    .frame()?
                    .env
                    .ok_or_else(|| JsError::internal_error("function has no environment"))?;
                for _ in 0..level {
                    env = self
                        .obj(env)?
                        .environment()
                        .and_then(|e| e.parent)
                        .ok_or_else(|| JsError::internal_error("environment chain too short"))?;
                }
                self.set_reg(base, dst, JsValue::Object(env))?;
            }
            Op::LoadFromEnvironment { dst, env, slot } => {
                let id = self.env_object(&self.reg(base, env)?)?;
                let value = self
                    .obj(id)?
                    .environment()
                    .ok_or_else(|| JsError::internal_error("not an environment"))?
                    .get(slot)?;
                self.set_reg(base, dst, value)?;
            }
            Op::StoreToEnvironment { env, slot, value } => {
                let id = self.env_object(&self.reg(base, env)?)?;
                let v = self.reg(base, value)?;
                self.obj_mut(id)?
                    .environment_mut()
                    .ok_or_else(|| JsError::internal_error("not an environment"))?
                    .set(slot, v)?;
            }
            Op::ThrowIfEmpty { dst, src } => {
                let v = self.reg(base, src)?;
                if v.is_empty() {
                    return Err(JsError::reference_error(UNINITIALIZED));
                }
                self.set_reg(base, dst, v)?;
            }

            // ─────────────────────────────────────────────────────────────────
            // Properties
            // ─────────────────────────────────────────────────────────────────
            Op::GetById { dst, obj, key, cache } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let chunk = self.current_chunk()?;
                let value = self
                    .get_by_id(&target, &key, &chunk, cache)?
                    .unwrap_or(JsValue::Undefined);
                self.set_reg(base, dst, value)?;
            }
            Op::TryGetById { dst, obj, key, cache } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let chunk = self.current_chunk()?;
                match self.get_by_id(&target, &key, &chunk, cache)? {
                    Some(value) => self.set_reg(base, dst, value)?,
                    None => return Err(JsError::not_defined(&key.to_string())),
                }
            }
            Op::PutById { obj, key, value, cache } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let v = self.reg(base, value)?;
                let chunk = self.current_chunk()?;
                self.put_by_id(&target, &key, v, &chunk, cache)?;
            }
            Op::TryPutById { obj, key, value, cache } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let v = self.reg(base, value)?;
                let chunk = self.current_chunk()?;
                if chunk.function_info.strict && self.config.strict_globals {
                    let exists = match target.as_object() {
                        Some(id) => self.has_property(id, &key)?,
                        None => true,
                    };
                    if !exists {
                        return Err(JsError::not_defined(&key.to_string()));
                    }
                }
                self.put_by_id(&target, &key, v, &chunk, cache)?;
            }
            Op::PutNewOwnById { obj, key, value, enumerable } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let v = self.reg(base, value)?;
                let id = target
                    .as_object()
                    .ok_or_else(|| JsError::internal_error("PutNewOwnById on a primitive"))?;
                let flags = if enumerable {
                    PropertyFlags::DEFAULT
                } else {
                    PropertyFlags::HIDDEN
                };
                self.define_data_property(id, key, v, flags)?;
            }
            Op::GetByVal { dst, obj, key } => {
                let target = self.reg(base, obj)?;
                let key = self.reg(base, key)?;
                let key = self.to_property_key(&key)?;
                let value = self.get_value_property(&target, &key)?;
                self.set_reg(base, dst, value)?;
            }
            Op::PutByVal { obj, key, value } => {
                let target = self.reg(base, obj)?;
                let key = self.reg(base, key)?;
                let key = self.to_property_key(&key)?;
                let v = self.reg(base, value)?;
                let strict = self.frame()?.is_strict();
                self.set_value_property(&target, key, v, strict)?;
            }
            Op::DelById { dst, obj, key } => {
                let target = self.reg(base, obj)?;
                let key = self.constant_key(key)?;
                let strict = self.frame()?.is_strict();
                let deleted = self.delete_value_property(&target, &key, strict)?;
                self.set_reg(base, dst, JsValue::Boolean(deleted))?;
            }
            Op::DelByVal { dst, obj, key } => {
                let target = self.reg(base, obj)?;
                let key = self.reg(base, key)?;
                let key = self.to_property_key(&key)?;
                let strict = self.frame()?.is_strict();
                let deleted = self.delete_value_property(&target, &key, strict)?;
                self.set_reg(base, dst, JsValue::Boolean(deleted))?;
            }
            Op::PutOwnByIndex { obj, index, value } => {
                let target = self.reg(base, obj)?;
                let v = self.reg(base, value)?;
                let id = target
                    .as_object()
                    .ok_or_else(|| JsError::internal_error("PutOwnByIndex on a primitive"))?;
                self.define_data_property(id, PropertyKey::Index(index), v, PropertyFlags::DEFAULT)?;
            }
            Op::PutOwnGetterSetter { obj, key, getter, setter, enumerable } => {
                let target = self.reg(base, obj)?;
                let key = self.reg(base, key)?;
                let key = self.to_property_key(&key)?;
                let getter = self.reg(base, getter)?.as_object();
                let setter = self.reg(base, setter)?.as_object();
                let id = target
                    .as_object()
                    .ok_or_else(|| JsError::internal_error("PutOwnGetterSetter on a primitive"))?;
                self.define_accessor_property(id, key, getter, setter, enumerable)?;
            }
            Op::NewObject { dst } => {
                let id = self.create_object();
                self.set_reg(base, dst, JsValue::Object(id))?;
            }
            Op::NewObjectWithParent { dst, parent } => {
                let proto = match self.reg(base, parent)? {
                    JsValue::Object(p) => Some(p),
                    JsValue::Null => None,
                    _ => Some(self.realm.object_prototype),
                };
                let id = self.alloc_object(proto, ObjectKind::Ordinary);
                self.set_reg(base, dst, JsValue::Object(id))?;
            }
            Op::NewArray { dst, size } => {
                let id = self.create_array(Vec::with_capacity(size as usize));
                self.set_reg(base, dst, JsValue::Object(id))?;
            }
            Op::DeclareGlobalVar { name } => {
                let key = self.constant_key(name)?;
                let global = self.realm.global;
                if !self.has_own_property(global, &key)? {
                    let flags = PropertyFlags {
                        configurable: false,
                        ..PropertyFlags::DEFAULT
                    };
                    self.define_data_property(global, key, JsValue::Undefined, flags)?;
                }
            }
            Op::CacheNewObject { this, keys, cache } => {
                let target = self.reg(base, this)?;
                let keys = match self.constant(keys)? {
                    Constant::Keys(keys) => keys,
                    _ => return Err(JsError::internal_error("CacheNewObject needs a key list")),
                };
                let chunk = self.current_chunk()?;
                self.stamp_new_object(&target, &keys, &chunk, cache)?;
            }

            // ─────────────────────────────────────────────────────────────────
            // Functions and calls
            // ─────────────────────────────────────────────────────────────────
            Op::CreateClosure { dst, env, chunk } => {
                let env = match env {
                    Some(r) => Some(self.env_object(&self.reg(base, r)?)?),
                    None => self.frame()?.env,
                };
                let code = match self.constant(chunk)? {
                    Constant::Chunk(c) => c,
                    _ => return Err(JsError::internal_error("CreateClosure needs a function")),
                };
                let func = self.create_closure(code, env)?;
                self.set_reg(base, dst, JsValue::Object(func))?;
            }
            Op::CreateClass { dst, proto_dst, env, chunk, super_class, fields } => {
                let env = match env {
                    Some(r) => Some(self.env_object(&self.reg(base, r)?)?),
                    None => self.frame()?.env,
                };
                let code = match self.constant(chunk)? {
                    Constant::Chunk(c) => c,
                    _ => return Err(JsError::internal_error("CreateClass needs a function")),
                };
                let super_class = match super_class {
                    Some(r) => Some(self.reg(base, r)?),
                    None => None,
                };
                let fields = match fields {
                    Some(r) => self.reg(base, r)?.as_object(),
                    None => None,
                };
                let (ctor, proto) = self.create_class(code, env, super_class, fields)?;
                self.set_reg(base, dst, JsValue::Object(ctor))?;
                self.set_reg(base, proto_dst, JsValue::Object(proto))?;
            }
            Op::Call { dst, callee, this, args_start, argc } => {
                let args = self.args_from_registers(base, args_start, argc)?;
                let (f, t) = (self.reg(base, callee)?, self.reg(base, this)?);
                self.call_from_bytecode(dst, f, t, args)?;
            }
            Op::Call1 { dst, callee, this } => {
                let (f, t) = (self.reg(base, callee)?, self.reg(base, this)?);
                self.call_from_bytecode(dst, f, t, Vec::new())?;
            }
            Op::Call2 { dst, callee, this, arg0 } => {
                let args = vec![self.reg(base, arg0)?];
                let (f, t) = (self.reg(base, callee)?, self.reg(base, this)?);
                self.call_from_bytecode(dst, f, t, args)?;
            }
            Op::Call3 { dst, callee, this, arg0, arg1 } => {
                let args = vec![self.reg(base, arg0)?, self.reg(base, arg1)?];
                let (f, t) = (self.reg(base, callee)?, self.reg(base, this)?);
                self.call_from_bytecode(dst, f, t, args)?;
            }
            Op::Call4 { dst, callee, this, arg0, arg1, arg2 } => {
                let args = vec![
                    self.reg(base, arg0)?,
                    self.reg(base, arg1)?,
                    self.reg(base, arg2)?,
                ];
                let (f, t) = (self.reg(base, callee)?, self.reg(base, this)?);
                self.call_from_bytecode(dst, f, t, args)?;
            }
            Op::CallWithArgs { dst, callee, this, args } => {
                let list = self.reg(base, args)?;
                let scope = self.guard_scope();
                let result = self.array_like_to_args(&list).and_then(|args| {
                    let f = self.reg(base, callee)?;
                    let t = self.reg(base, this)?;
                    self.call_from_bytecode(dst, f, t, args)
                });
                self.release_guards(scope);
                result?;
            }
            Op::Construct { dst, callee, args_start, argc } => {
                let args = self.args_from_registers(base, args_start, argc)?;
                let f = self.reg(base, callee)?;
                self.construct_from_bytecode(dst, f, args)?;
            }
            Op::CallSuper { dst, args_start, argc } => {
                let args = self.args_from_registers(base, args_start, argc)?;
                self.call_super(base, dst, args)?;
            }

            // ─────────────────────────────────────────────────────────────────
            // Generators and async
            // ─────────────────────────────────────────────────────────────────
            Op::Yield { value, resume } => {
                let v = self.reg(base, value)?;
                return self.suspend(v, resume, false).map(Some);
            }
            Op::Await { value, resume } => {
                let v = self.reg(base, value)?;
                return self.suspend(v, resume, true).map(Some);
            }
            Op::ResumeGenerator { dst, is_return } => self.resume_in_frame(base, dst, is_return)?,

            // ─────────────────────────────────────────────────────────────────
            // Iteration
            // ─────────────────────────────────────────────────────────────────
            Op::GetIterator { dst, src } => {
                let v = self.reg(base, src)?;
                let iter = self.get_iterator(&v)?;
                self.set_reg(base, dst, iter)?;
            }
            Op::GetAsyncIterator { dst, src } => {
                let v = self.reg(base, src)?;
                let iter = self.get_async_iterator(&v)?;
                self.set_reg(base, dst, iter)?;
            }
            Op::IteratorNext { value, done, iter } => {
                let it = self.reg(base, iter)?;
                let (v, is_done) = self.iterator_step(&it)?;
                self.set_reg(base, value, v)?;
                self.set_reg(base, done, JsValue::Boolean(is_done))?;
            }
            Op::IteratorClose { iter, on_throw } => {
                let it = self.reg(base, iter)?;
                self.iterator_close(&it, on_throw)?;
            }
        }
        Ok(None)
    }

    fn numeric_step(
        &mut self,
        base: usize,
        dst: Register,
        left: Register,
        right: Register,
        op: NumericOp,
    ) -> Result<(), JsError> {
        let (l, r) = (self.reg(base, left)?, self.reg(base, right)?);
        let result = match (&l, &r, op) {
            (JsValue::Number(a), JsValue::Number(b), NumericOp::Sub) => JsValue::Number(a - b),
            (JsValue::Number(a), JsValue::Number(b), NumericOp::Mul) => JsValue::Number(a * b),
            _ => self.numeric_op(op, &l, &r)?,
        };
        self.set_reg(base, dst, result)
    }

    /// Pop the running frame and deliver its result
    fn return_from_frame(&mut self, value: JsValue, entry_depth: usize) -> Result<Option<Completion>, JsError> {
        let frame = self.pop_frame().ok_or_else(missing_frame)?;
        let value = if frame.construct {
            self.construct_result(&frame, value)?
        } else {
            value
        };
        match frame.return_to {
            ReturnTo::Register(dst) if self.frames.len() > entry_depth => {
                let base = self.frame()?.base;
                self.set_reg(base, dst, value)?;
                Ok(None)
            }
            _ => Ok(Some(Completion::Return(value))),
        }
    }
}
