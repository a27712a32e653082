//! Job queues
//!
//! Microtasks (promise reactions, `queueMicrotask`) run FIFO and drain to
//! empty before the next macrotask. Macrotasks (`setTimeout`) are ordered by
//! due time, then by scheduling order. Time is virtual: running a timer
//! advances the clock to its due time instead of sleeping.

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::error::JsError;
use crate::gc::ObjectId;
use crate::object::function::trace_value;
use crate::value::JsValue;

use super::Interpreter;
use super::promise::Reaction;

pub enum Job {
    /// A promise settled with `argument`
    Reaction {
        reaction: Reaction,
        argument: JsValue,
        rejected: bool,
    },
    /// A promise resolved with a thenable calls its `then`
    ResolveThenable {
        promise: ObjectId,
        thenable: JsValue,
        then: JsValue,
    },
    /// Plain callback from `setTimeout` or `queueMicrotask`
    Callback { callee: JsValue, args: Vec<JsValue> },
}

impl Job {
    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        match self {
            Job::Reaction {
                reaction, argument, ..
            } => {
                reaction.trace(visitor);
                trace_value(argument, visitor);
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                visitor(*promise);
                trace_value(thenable, visitor);
                trace_value(then, visitor);
            }
            Job::Callback { callee, args } => {
                trace_value(callee, visitor);
                for arg in args {
                    trace_value(arg, visitor);
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Job::Reaction { .. } => "reaction",
            Job::ResolveThenable { .. } => "resolve-thenable",
            Job::Callback { .. } => "callback",
        }
    }
}

#[derive(Default)]
pub struct JobQueues {
    microtasks: VecDeque<Job>,
    /// Keyed by `(due, sequence)`; the sequence number is the timer id
    macrotasks: BTreeMap<(u64, u64), Job>,
    next_seq: u64,
    /// Virtual clock in milliseconds
    now: u64,
}

impl JobQueues {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.microtasks.is_empty() && self.macrotasks.is_empty()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    pub fn pending_macrotasks(&self) -> usize {
        self.macrotasks.len()
    }

    /// Current virtual time
    pub fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn trace<F: FnMut(ObjectId)>(&self, visitor: &mut F) {
        for job in &self.microtasks {
            job.trace(visitor);
        }
        for job in self.macrotasks.values() {
            job.trace(visitor);
        }
    }

    fn push_macrotask(&mut self, delay: u64, job: Job) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.macrotasks.insert((self.now.saturating_add(delay), seq), job);
        seq
    }

    fn pop_macrotask(&mut self) -> Option<Job> {
        let ((due, _), job) = self.macrotasks.pop_first()?;
        self.now = self.now.max(due);
        Some(job)
    }
}

impl Interpreter {
    /// Queue a promise job: a microtask, or a macrotask when the microtask
    /// queue is disabled
    pub(crate) fn enqueue_promise_job(&mut self, job: Job) {
        if self.config.microtask_queue {
            self.jobs.microtasks.push_back(job);
        } else {
            self.jobs.push_macrotask(0, job);
        }
    }

    pub(crate) fn enqueue_microtask(&mut self, callee: JsValue) {
        self.jobs.microtasks.push_back(Job::Callback {
            callee,
            args: Vec::new(),
        });
    }

    /// Schedule `callee(args)` after `delay` virtual milliseconds; returns the timer id
    pub(crate) fn set_timeout(&mut self, callee: JsValue, delay: u64, args: Vec<JsValue>) -> u64 {
        self.jobs.push_macrotask(delay, Job::Callback { callee, args })
    }

    pub(crate) fn clear_timeout(&mut self, id: u64) {
        self.jobs.macrotasks.retain(|(_, seq), _| *seq != id);
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &JobQueues {
        &self.jobs
    }

    /// Run queued jobs until both queues are empty. Microtasks drain
    /// completely before each macrotask, including microtasks queued while
    /// draining. An exception escaping a callback stops draining and is
    /// returned; the remaining jobs stay queued.
    pub fn drain_jobs(&mut self) -> Result<(), JsError> {
        loop {
            while let Some(job) = self.jobs.microtasks.pop_front() {
                self.run_job(job)?;
            }
            match self.jobs.pop_macrotask() {
                Some(job) => self.run_job(job)?,
                None => return Ok(()),
            }
        }
    }

    fn run_job(&mut self, job: Job) -> Result<(), JsError> {
        trace!(kind = job.kind(), now = self.jobs.now, "running job");
        let scope = self.guard_scope();
        job.trace(&mut |id| self.heap.guard(id));
        self.enter_host_call();
        let result = match job {
            Job::Reaction {
                reaction,
                argument,
                rejected,
            } => self.run_reaction_job(reaction, argument, rejected),
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => self.run_thenable_job(promise, thenable, then),
            Job::Callback { callee, args } => self
                .call_value(&callee, JsValue::Undefined, &args)
                .map(|_| ()),
        };
        self.leave_host_call();
        self.release_guards(scope);
        result
    }
}
