//! Promise state machine
//!
//! A promise is a heap object whose payload records its status, its result
//! and the reactions waiting on it. Settling never runs user code directly:
//! every reaction becomes a job on the interpreter's queues, which is what
//! gives `then` callbacks and `await` continuations their ordering.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::ObjectKind;
use crate::object::function::{Callable, PromiseResolver, trace_value};
use crate::value::{CheapClone, JsValue};

use super::Interpreter;
use super::generator::ResumeAction;
use super::jobs::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

pub struct PromiseState {
    pub status: PromiseStatus,
    /// Fulfillment value or rejection reason once settled
    pub result: JsValue,
    pub reactions: Vec<Reaction>,
}

impl PromiseState {
    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        trace_value(&self.result, visitor);
        for reaction in &self.reactions {
            reaction.trace(visitor);
        }
    }
}

/// What runs when a promise settles
#[derive(Debug, Clone)]
pub enum ReactionHandler {
    /// `then(on_fulfilled, on_rejected)`; a missing side passes the value through
    Then {
        on_fulfilled: Option<ObjectId>,
        on_rejected: Option<ObjectId>,
    },
    /// Continue an async function suspended at `await`
    AsyncResume(ObjectId),
    /// Continue an async generator suspended at `await`
    AsyncGeneratorResume(ObjectId),
}

#[derive(Debug, Clone)]
pub struct Reaction {
    pub handler: ReactionHandler,
    /// Derived promise settled with the handler's outcome
    pub capability: Option<ObjectId>,
}

impl Reaction {
    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        match &self.handler {
            ReactionHandler::Then {
                on_fulfilled,
                on_rejected,
            } => {
                if let Some(f) = on_fulfilled {
                    visitor(*f);
                }
                if let Some(r) = on_rejected {
                    visitor(*r);
                }
            }
            ReactionHandler::AsyncResume(id) | ReactionHandler::AsyncGeneratorResume(id) => {
                visitor(*id)
            }
        }
        if let Some(capability) = self.capability {
            visitor(capability);
        }
    }
}

impl Interpreter {
    /// Allocate a pending promise with `Promise.prototype`
    pub fn create_promise(&mut self) -> ObjectId {
        let state = PromiseState {
            status: PromiseStatus::Pending,
            result: JsValue::Undefined,
            reactions: Vec::new(),
        };
        self.alloc_object(
            Some(self.realm.promise_prototype),
            ObjectKind::Promise(Box::new(state)),
        )
    }

    /// The promise payload of a value, if it is a promise
    pub(crate) fn as_promise(&self, value: &JsValue) -> Option<ObjectId> {
        match value {
            JsValue::Object(id) => match self.heap.get(*id).map(|o| &o.kind) {
                Some(ObjectKind::Promise(_)) => Some(*id),
                _ => None,
            },
            _ => None,
        }
    }

    /// Status and result of a promise
    pub fn promise_status(&self, id: ObjectId) -> Result<(PromiseStatus, JsValue), JsError> {
        match &self.obj(id)?.kind {
            ObjectKind::Promise(state) => Ok((state.status, state.result.cheap_clone())),
            _ => Err(JsError::type_error("not a promise")),
        }
    }

    fn promise_state_mut(&mut self, id: ObjectId) -> Result<&mut PromiseState, JsError> {
        match &mut self.obj_mut(id)?.kind {
            ObjectKind::Promise(state) => Ok(state),
            _ => Err(JsError::type_error("not a promise")),
        }
    }

    /// Resolve `promise` with `value`, adopting the state of thenables
    pub(crate) fn resolve_promise(&mut self, promise: ObjectId, value: JsValue) -> Result<(), JsError> {
        if self.promise_status(promise)?.0 != PromiseStatus::Pending {
            return Ok(());
        }
        let JsValue::Object(id) = value else {
            return self.settle_promise(promise, PromiseStatus::Fulfilled, value);
        };
        if id == promise {
            let reason =
                self.error_value(JsError::type_error("Chaining cycle detected for promise #<Promise>"))?;
            return self.settle_promise(promise, PromiseStatus::Rejected, reason);
        }
        let then_key = self.key("then");
        let then = match self.get_property(id, &then_key) {
            Ok(then) => then,
            Err(e) if e.is_catchable() => {
                let reason = self.error_value(e)?;
                return self.settle_promise(promise, PromiseStatus::Rejected, reason);
            }
            Err(e) => return Err(e),
        };
        if self.is_callable(&then) {
            self.enqueue_promise_job(Job::ResolveThenable {
                promise,
                thenable: value,
                then,
            });
            return Ok(());
        }
        self.settle_promise(promise, PromiseStatus::Fulfilled, value)
    }

    pub(crate) fn reject_promise(&mut self, promise: ObjectId, reason: JsValue) -> Result<(), JsError> {
        self.settle_promise(promise, PromiseStatus::Rejected, reason)
    }

    fn settle_promise(
        &mut self,
        promise: ObjectId,
        status: PromiseStatus,
        value: JsValue,
    ) -> Result<(), JsError> {
        let state = self.promise_state_mut(promise)?;
        if state.status != PromiseStatus::Pending {
            return Ok(());
        }
        state.status = status;
        state.result = value.cheap_clone();
        let reactions = std::mem::take(&mut state.reactions);
        let rejected = status == PromiseStatus::Rejected;
        for reaction in reactions {
            self.enqueue_promise_job(Job::Reaction {
                reaction,
                argument: value.cheap_clone(),
                rejected,
            });
        }
        Ok(())
    }

    /// Wait for a promise; settled promises queue the reaction at once
    pub(crate) fn add_reaction(&mut self, promise: ObjectId, reaction: Reaction) -> Result<(), JsError> {
        let state = self.promise_state_mut(promise)?;
        match state.status {
            PromiseStatus::Pending => {
                state.reactions.push(reaction);
            }
            status => {
                let argument = state.result.cheap_clone();
                self.enqueue_promise_job(Job::Reaction {
                    reaction,
                    argument,
                    rejected: status == PromiseStatus::Rejected,
                });
            }
        }
        Ok(())
    }

    /// `PromiseResolve`: promises pass through, other values are wrapped
    pub(crate) fn promise_resolve(&mut self, value: &JsValue) -> Result<ObjectId, JsError> {
        if let Some(id) = self.as_promise(value)
            && self.obj(id)?.prototype == Some(self.realm.promise_prototype)
        {
            return Ok(id);
        }
        let promise = self.create_promise();
        let scope = self.guard_scope();
        self.guard_value(&JsValue::Object(promise));
        let result = self.resolve_promise(promise, value.cheap_clone());
        self.release_guards(scope);
        result.map(|()| promise)
    }

    /// `promise.then(on_fulfilled, on_rejected)`; returns the derived promise
    pub(crate) fn promise_then(
        &mut self,
        promise: ObjectId,
        on_fulfilled: &JsValue,
        on_rejected: &JsValue,
    ) -> Result<ObjectId, JsError> {
        let callable = |interp: &Self, v: &JsValue| match v {
            JsValue::Object(id) if interp.is_callable(v) => Some(*id),
            _ => None,
        };
        let on_fulfilled = callable(self, on_fulfilled);
        let on_rejected = callable(self, on_rejected);
        let capability = self.create_promise();
        self.add_reaction(
            promise,
            Reaction {
                handler: ReactionHandler::Then {
                    on_fulfilled,
                    on_rejected,
                },
                capability: Some(capability),
            },
        )?;
        Ok(capability)
    }

    /// Resolve and reject functions sharing one "already resolved" flag
    pub(crate) fn create_resolving_functions(&mut self, promise: ObjectId) -> (ObjectId, ObjectId) {
        let already_resolved = Rc::new(Cell::new(false));
        let make = |interp: &mut Self, reject: bool| {
            let callable = Callable::PromiseResolver(PromiseResolver {
                promise,
                reject,
                already_resolved: already_resolved.clone(),
            });
            let f = interp.alloc_object(
                Some(interp.realm.function_prototype),
                ObjectKind::Function(callable),
            );
            let name = interp.intern("");
            interp.set_function_name_and_length(f, JsValue::String(name), 1);
            f
        };
        let resolve = make(self, false);
        let scope = self.guard_scope();
        self.guard_value(&JsValue::Object(resolve));
        let reject = make(self, true);
        self.release_guards(scope);
        (resolve, reject)
    }

    /// Calling a resolve or reject function
    pub(crate) fn call_promise_resolver(
        &mut self,
        resolver: &PromiseResolver,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        if resolver.already_resolved.replace(true) {
            return Ok(JsValue::Undefined);
        }
        let value = args.first().cloned().unwrap_or(JsValue::Undefined);
        if resolver.reject {
            self.reject_promise(resolver.promise, value)?;
        } else {
            self.resolve_promise(resolver.promise, value)?;
        }
        Ok(JsValue::Undefined)
    }

    /// Run one settled reaction
    pub(crate) fn run_reaction_job(
        &mut self,
        reaction: Reaction,
        argument: JsValue,
        rejected: bool,
    ) -> Result<(), JsError> {
        let (on_fulfilled, on_rejected) = match reaction.handler {
            ReactionHandler::AsyncResume(gen_id) => {
                let action = if rejected {
                    ResumeAction::Throw
                } else {
                    ResumeAction::Next
                };
                return self.async_step(gen_id, action, argument);
            }
            ReactionHandler::AsyncGeneratorResume(gen_id) => {
                return self.async_generator_resume(gen_id, rejected, argument);
            }
            ReactionHandler::Then {
                on_fulfilled,
                on_rejected,
            } => (on_fulfilled, on_rejected),
        };
        let handler = if rejected { on_rejected } else { on_fulfilled };
        let outcome = match handler {
            Some(f) => match self.call_value(&JsValue::Object(f), JsValue::Undefined, &[argument]) {
                Ok(v) => Ok(v),
                Err(e) if e.is_catchable() => Err(self.error_value(e)?),
                Err(e) => return Err(e),
            },
            None if rejected => Err(argument),
            None => Ok(argument),
        };
        let Some(capability) = reaction.capability else {
            return Ok(());
        };
        match outcome {
            Ok(v) => self.resolve_promise(capability, v),
            Err(reason) => self.reject_promise(capability, reason),
        }
    }

    /// Call `thenable.then(resolve, reject)` for a promise adopting it
    pub(crate) fn run_thenable_job(
        &mut self,
        promise: ObjectId,
        thenable: JsValue,
        then: JsValue,
    ) -> Result<(), JsError> {
        let (resolve, reject) = self.create_resolving_functions(promise);
        let scope = self.guard_scope();
        self.guard_value(&JsValue::Object(resolve));
        self.guard_value(&JsValue::Object(reject));
        let result = self.call_value(
            &then,
            thenable,
            &[JsValue::Object(resolve), JsValue::Object(reject)],
        );
        let outcome = match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_catchable() => {
                let reason = self.error_value(e);
                match reason {
                    Ok(reason) => self
                        .call_value(&JsValue::Object(reject), JsValue::Undefined, &[reason])
                        .map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };
        self.release_guards(scope);
        outcome
    }
}
