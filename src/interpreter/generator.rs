//! Generators and async functions
//!
//! A suspended activation lives entirely inside its generator object: the
//! argument and register window is moved off the stack into `saved`
//! together with the resume address. Resuming pushes a fresh frame from the
//! snapshot and re-enters the dispatch loop, so no native coroutine support
//! is needed.
//!
//! Async functions are generators driven by promise reactions: each `await`
//! suspends and registers a reaction on the awaited promise that resumes the
//! body. Async generators additionally queue `next`/`return`/`throw`
//! requests and settle one request per `yield` or completion.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::bytecode::{BytecodeChunk, FunctionKind, JumpTarget, Register};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::function::{Closure, trace_value};
use crate::value::{CheapClone, JsValue};

use super::bytecode_vm::Completion;
use super::promise::{Reaction, ReactionHandler};
use super::stack::{Frame, ReturnTo};
use super::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

/// How a suspended generator is resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    Next,
    Return,
    Throw,
}

/// A pending `next`/`return`/`throw` on an async generator
pub struct AsyncGeneratorRequest {
    pub action: ResumeAction,
    pub value: JsValue,
    pub promise: ObjectId,
}

pub enum GeneratorFlavor {
    Sync,
    /// Async function body; settles `promise` on completion
    Async { promise: ObjectId },
    AsyncGenerator { queue: VecDeque<AsyncGeneratorRequest> },
}

pub struct GeneratorState {
    pub function: ObjectId,
    pub chunk: Rc<BytecodeChunk>,
    pub env: Option<ObjectId>,
    pub this: JsValue,
    pub status: GeneratorStatus,
    /// Arguments followed by registers, while suspended
    pub saved: Vec<JsValue>,
    pub argc: usize,
    pub ip: usize,
    /// Delivered by the next `ResumeGenerator`
    pub resume: Option<(ResumeAction, JsValue)>,
    /// Suspended at `await` rather than `yield`
    pub awaiting: bool,
    pub flavor: GeneratorFlavor,
}

impl GeneratorState {
    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        visitor(self.function);
        if let Some(env) = self.env {
            visitor(env);
        }
        trace_value(&self.this, visitor);
        for value in &self.saved {
            trace_value(value, visitor);
        }
        if let Some((_, value)) = &self.resume {
            trace_value(value, visitor);
        }
        match &self.flavor {
            GeneratorFlavor::Sync => {}
            GeneratorFlavor::Async { promise } => visitor(*promise),
            GeneratorFlavor::AsyncGenerator { queue } => {
                for request in queue {
                    trace_value(&request.value, visitor);
                    visitor(request.promise);
                }
            }
        }
    }
}

impl Interpreter {
    pub(crate) fn generator_state(&self, id: ObjectId) -> Result<&GeneratorState, JsError> {
        match &self.obj(id)?.kind {
            ObjectKind::Generator(state) => Ok(state),
            _ => Err(JsError::internal_error("not a generator object")),
        }
    }

    pub(crate) fn generator_state_mut(&mut self, id: ObjectId) -> Result<&mut GeneratorState, JsError> {
        match &mut self.obj_mut(id)?.kind {
            ObjectKind::Generator(state) => Ok(state),
            _ => Err(JsError::internal_error("not a generator object")),
        }
    }

    fn new_generator_state(
        id: ObjectId,
        closure: &Closure,
        this: JsValue,
        args: &[JsValue],
        flavor: GeneratorFlavor,
    ) -> GeneratorState {
        let mut saved = args.to_vec();
        saved.resize(args.len() + closure.chunk.register_count as usize, JsValue::Undefined);
        GeneratorState {
            function: id,
            chunk: closure.chunk.cheap_clone(),
            env: closure.env,
            this,
            status: GeneratorStatus::SuspendedStart,
            saved,
            argc: args.len(),
            ip: 0,
            resume: None,
            awaiting: false,
            flavor,
        }
    }

    /// Calling a generator function: a suspended generator object
    pub(crate) fn create_generator(
        &mut self,
        id: ObjectId,
        closure: &Closure,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let is_async = closure.chunk.function_info.kind == FunctionKind::AsyncGenerator;
        let fallback = if is_async {
            self.realm.async_generator_prototype
        } else {
            self.realm.generator_prototype
        };
        let proto = self.prototype_from_constructor(id, fallback)?;
        let flavor = if is_async {
            GeneratorFlavor::AsyncGenerator {
                queue: VecDeque::new(),
            }
        } else {
            GeneratorFlavor::Sync
        };
        let state = Self::new_generator_state(id, closure, this, args, flavor);
        let gen_id = self.alloc_object(Some(proto), ObjectKind::Generator(Box::new(state)));
        Ok(JsValue::Object(gen_id))
    }

    /// Calling an async function: runs to the first `await` and returns the
    /// result promise
    pub(crate) fn start_async_function(
        &mut self,
        id: ObjectId,
        closure: &Closure,
        this: JsValue,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let promise = self.create_promise();
        let state = Self::new_generator_state(
            id,
            closure,
            this,
            args,
            GeneratorFlavor::Async { promise },
        );
        let gen_id = self.alloc_object(None, ObjectKind::Generator(Box::new(state)));
        let scope = self.guard_scope();
        self.guard_value(&JsValue::Object(gen_id));
        let result = self.async_step(gen_id, ResumeAction::Next, JsValue::Undefined);
        self.release_guards(scope);
        result?;
        Ok(JsValue::Object(promise))
    }

    /// Run a generator until it yields, awaits, returns or throws
    pub(crate) fn resume_generator(
        &mut self,
        gen_id: ObjectId,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<Completion, JsError> {
        let state = self.generator_state_mut(gen_id)?;
        let finished = match state.status {
            GeneratorStatus::Executing => {
                return Err(JsError::type_error("Generator is already running"));
            }
            GeneratorStatus::Completed => true,
            GeneratorStatus::SuspendedStart if action != ResumeAction::Next => {
                state.status = GeneratorStatus::Completed;
                state.saved.clear();
                true
            }
            GeneratorStatus::SuspendedStart | GeneratorStatus::SuspendedYield => false,
        };
        if finished {
            return match action {
                ResumeAction::Next => Ok(Completion::Return(JsValue::Undefined)),
                ResumeAction::Return => Ok(Completion::Return(value)),
                ResumeAction::Throw => Err(JsError::thrown(value)),
            };
        }

        let saved = std::mem::take(&mut state.saved);
        state.status = GeneratorStatus::Executing;
        state.awaiting = false;
        state.resume = Some((action, value));
        let chunk = state.chunk.cheap_clone();
        let env = state.env;
        let this = state.this.cheap_clone();
        let function = state.function;
        let argc = state.argc;
        let ip = state.ip;

        if self.frames.len() >= self.config.max_stack_depth {
            let state = self.generator_state_mut(gen_id)?;
            state.status = GeneratorStatus::Completed;
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        let depth = self.frames.len();
        let args_base = self.stack.len();
        self.stack.extend_from_slice(&saved);
        self.frames.push(Frame {
            chunk,
            ip,
            args_base,
            argc,
            base: args_base + argc,
            this,
            new_target: JsValue::Undefined,
            callee: Some(function),
            env,
            return_to: ReturnTo::Host,
            construct: false,
            generator: Some(gen_id),
        });

        let result = match self.enter_native() {
            Ok(()) => {
                let r = self.execute(depth);
                self.leave_native();
                r
            }
            Err(e) => {
                self.pop_frames_to(depth);
                Err(e)
            }
        };
        if matches!(result, Ok(Completion::Return(_)) | Err(_)) {
            let state = self.generator_state_mut(gen_id)?;
            state.status = GeneratorStatus::Completed;
            state.saved.clear();
            state.resume = None;
        }
        result
    }

    /// `Yield`/`Await`: move the running frame into its generator
    pub(crate) fn suspend(
        &mut self,
        value: JsValue,
        resume: JumpTarget,
        awaiting: bool,
    ) -> Result<Completion, JsError> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| JsError::internal_error("suspend without a frame"))?;
        let gen_id = frame
            .generator
            .ok_or_else(|| JsError::internal_error("suspend outside a generator activation"))?;
        let saved = self.stack.split_off(frame.args_base);
        let state = self.generator_state_mut(gen_id)?;
        state.saved = saved;
        state.ip = resume as usize;
        state.status = GeneratorStatus::SuspendedYield;
        state.awaiting = awaiting;
        Ok(if awaiting {
            Completion::Await(value)
        } else {
            Completion::Yield(value)
        })
    }

    /// `ResumeGenerator`: deliver the resumption value
    pub(crate) fn resume_in_frame(
        &mut self,
        base: usize,
        dst: Register,
        is_return: Register,
    ) -> Result<(), JsError> {
        let gen_id = self
            .frame()?
            .generator
            .ok_or_else(|| JsError::internal_error("ResumeGenerator outside a generator"))?;
        let resume = self.generator_state_mut(gen_id)?.resume.take();
        let (value, returning) = match resume {
            Some((ResumeAction::Throw, v)) => return Err(JsError::thrown(v)),
            Some((ResumeAction::Return, v)) => (v, true),
            Some((ResumeAction::Next, v)) => (v, false),
            None => (JsValue::Undefined, false),
        };
        self.set_reg(base, dst, value)?;
        self.set_reg(base, is_return, JsValue::Boolean(returning))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Async functions
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resume an async function body and settle or re-suspend it
    pub(crate) fn async_step(
        &mut self,
        gen_id: ObjectId,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<(), JsError> {
        let promise = match &self.generator_state(gen_id)?.flavor {
            GeneratorFlavor::Async { promise } => *promise,
            _ => return Err(JsError::internal_error("async step on a non-async body")),
        };
        let scope = self.guard_scope();
        let result = match self.resume_generator(gen_id, action, value) {
            Ok(Completion::Await(v)) => {
                self.guard_value(&v);
                self.await_value(&v, ReactionHandler::AsyncResume(gen_id))
            }
            Ok(Completion::Return(v)) => {
                self.guard_value(&v);
                self.resolve_promise(promise, v)
            }
            Ok(Completion::Yield(_)) => Err(JsError::internal_error("yield in an async function")),
            Err(e) if e.is_catchable() => self
                .error_value(e)
                .and_then(|reason| self.reject_promise(promise, reason)),
            Err(e) => Err(e),
        };
        self.release_guards(scope);
        result
    }

    /// Register `handler` to run once `value` settles
    fn await_value(&mut self, value: &JsValue, handler: ReactionHandler) -> Result<(), JsError> {
        let promise = self.promise_resolve(value)?;
        self.add_reaction(
            promise,
            Reaction {
                handler,
                capability: None,
            },
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Async generators
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue a request on an async generator; returns its promise
    pub(crate) fn async_generator_enqueue(
        &mut self,
        gen_id: ObjectId,
        action: ResumeAction,
        value: JsValue,
    ) -> Result<ObjectId, JsError> {
        let promise = self.create_promise();
        match &mut self.generator_state_mut(gen_id)?.flavor {
            GeneratorFlavor::AsyncGenerator { queue } => queue.push_back(AsyncGeneratorRequest {
                action,
                value,
                promise,
            }),
            _ => return Err(JsError::internal_error("not an async generator")),
        }
        self.async_generator_drain(gen_id)?;
        Ok(promise)
    }

    fn front_request(&self, gen_id: ObjectId) -> Result<Option<(ResumeAction, JsValue)>, JsError> {
        match &self.generator_state(gen_id)?.flavor {
            GeneratorFlavor::AsyncGenerator { queue } => Ok(queue
                .front()
                .map(|r| (r.action, r.value.cheap_clone()))),
            _ => Err(JsError::internal_error("not an async generator")),
        }
    }

    fn pop_request(&mut self, gen_id: ObjectId) -> Result<Option<AsyncGeneratorRequest>, JsError> {
        match &mut self.generator_state_mut(gen_id)?.flavor {
            GeneratorFlavor::AsyncGenerator { queue } => Ok(queue.pop_front()),
            _ => Err(JsError::internal_error("not an async generator")),
        }
    }

    /// Serve queued requests until the queue is empty or the body awaits
    pub(crate) fn async_generator_drain(&mut self, gen_id: ObjectId) -> Result<(), JsError> {
        loop {
            let state = self.generator_state(gen_id)?;
            if state.status == GeneratorStatus::Executing || state.awaiting {
                return Ok(());
            }
            let Some((action, value)) = self.front_request(gen_id)? else {
                return Ok(());
            };
            let result = self.resume_generator(gen_id, action, value);
            if !self.settle_async_generator_step(gen_id, result)? {
                return Ok(());
            }
        }
    }

    /// Settle the front request from one resumption. Returns false while
    /// the body is suspended at an `await`.
    fn settle_async_generator_step(
        &mut self,
        gen_id: ObjectId,
        result: Result<Completion, JsError>,
    ) -> Result<bool, JsError> {
        let scope = self.guard_scope();
        let outcome = match result {
            Ok(Completion::Await(v)) => {
                self.guard_value(&v);
                self.await_value(&v, ReactionHandler::AsyncGeneratorResume(gen_id))
                    .map(|()| false)
            }
            Ok(Completion::Yield(v)) => self.settle_request(gen_id, Ok((v, false))).map(|()| true),
            Ok(Completion::Return(v)) => self.settle_request(gen_id, Ok((v, true))).map(|()| true),
            Err(e) if e.is_catchable() => self
                .error_value(e)
                .and_then(|reason| self.settle_request(gen_id, Err(reason)))
                .map(|()| true),
            Err(e) => Err(e),
        };
        self.release_guards(scope);
        outcome
    }

    fn settle_request(
        &mut self,
        gen_id: ObjectId,
        outcome: Result<(JsValue, bool), JsValue>,
    ) -> Result<(), JsError> {
        let Some(request) = self.pop_request(gen_id)? else {
            return Ok(());
        };
        match outcome {
            Ok((value, done)) => {
                let result = self.iter_result(value, done);
                self.resolve_promise(request.promise, result)
            }
            Err(reason) => self.reject_promise(request.promise, reason),
        }
    }

    /// Reaction job: an awaited promise inside an async generator settled
    pub(crate) fn async_generator_resume(
        &mut self,
        gen_id: ObjectId,
        rejected: bool,
        value: JsValue,
    ) -> Result<(), JsError> {
        let action = if rejected {
            ResumeAction::Throw
        } else {
            ResumeAction::Next
        };
        let result = self.resume_generator(gen_id, action, value);
        if self.settle_async_generator_step(gen_id, result)? {
            self.async_generator_drain(gen_id)?;
        }
        Ok(())
    }
}
