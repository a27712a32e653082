//! Debugger support
//!
//! Breakpoints are keyed either by (function chunk, instruction index) or by
//! source line. When a breakpoint, a step condition or a `debugger`
//! statement triggers, the interpreter hands a read-only [`PauseContext`]
//! to the installed [`DebuggerHost`] and resumes according to the
//! [`DebugCommand`] it returns.
//!
//! The per-instruction hook only runs while a host is installed and there
//! is a breakpoint or a step in progress.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::bytecode::{BytecodeChunk, Register};
use crate::error::JsError;
use crate::gc::ObjectId;
use crate::value::{CheapClone, JsValue};

use super::stack_trace::StackFrameInfo;
use super::Interpreter;

pub type BreakpointId = u32;

#[derive(Clone)]
pub enum BreakpointLocation {
    /// An instruction of one function
    Instruction { chunk: Rc<BytecodeChunk>, ip: usize },
    /// First instruction of a source line; `file: None` matches any file
    Line { file: Option<String>, line: u32 },
}

#[derive(Clone)]
pub struct Breakpoint {
    pub location: BreakpointLocation,
    pub enabled: bool,
}

/// How to continue after a pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Continue,
    /// Stop at the next line, entering calls
    StepInto,
    /// Stop at the next line of this function or a caller
    StepOver,
    /// Stop once the current function returns
    StepOut,
    /// Terminate execution with the uncatchable `Quit` error
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint(BreakpointId),
    DebuggerStatement,
    StepFinished,
}

/// Receives pauses
pub trait DebuggerHost {
    fn on_pause(&mut self, ctx: &PauseContext<'_>) -> DebugCommand;
}

/// Where a step started
struct StepState {
    command: DebugCommand,
    depth: usize,
    chunk: Rc<BytecodeChunk>,
    ip: usize,
    line: Option<u32>,
}

#[derive(Default)]
pub(crate) struct Debugger {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
    next_id: BreakpointId,
    step: Option<StepState>,
    host: Option<Box<dyn DebuggerHost>>,
}

impl Debugger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether the dispatch loop must call `debug_step`
    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.host.is_some() && (self.step.is_some() || !self.breakpoints.is_empty())
    }
}

/// Read-only view of the paused interpreter. Frame index 0 is the
/// innermost bytecode frame.
pub struct PauseContext<'a> {
    interp: &'a Interpreter,
    reason: PauseReason,
}

impl PauseContext<'_> {
    pub fn reason(&self) -> PauseReason {
        self.reason
    }

    pub fn frame_count(&self) -> usize {
        self.interp.frames.len()
    }

    /// Bytecode frames, innermost first
    pub fn frames(&self) -> Vec<StackFrameInfo> {
        self.interp
            .capture_stack(false)
            .into_iter()
            .filter(|f| !f.native)
            .collect()
    }

    /// Full trace including native functions
    pub fn stack_trace(&self) -> Vec<StackFrameInfo> {
        self.interp.capture_stack(false)
    }

    fn frame(&self, index: usize) -> Option<&super::Frame> {
        let len = self.interp.frames.len();
        index
            .checked_add(1)
            .and_then(|i| len.checked_sub(i))
            .and_then(|i| self.interp.frames.get(i))
    }

    pub fn register(&self, frame: usize, register: Register) -> Option<JsValue> {
        let frame = self.frame(frame)?;
        if register >= frame.chunk.register_count {
            return None;
        }
        self.interp.stack.get(frame.base + register as usize).ok()
    }

    /// Argument `index` as passed by the caller
    pub fn argument(&self, frame: usize, index: usize) -> Option<JsValue> {
        let frame = self.frame(frame)?;
        if index >= frame.argc {
            return None;
        }
        self.interp.stack.get(frame.args_base + index).ok()
    }

    pub fn this(&self, frame: usize) -> Option<JsValue> {
        self.frame(frame).map(|f| f.this.cheap_clone())
    }

    /// Environment captured by the frame's closure, `level` scopes out
    pub fn closure_environment(&self, frame: usize, level: usize) -> Option<ObjectId> {
        let mut env = self.frame(frame)?.env?;
        for _ in 0..level {
            env = self.interp.heap.get(env)?.environment()?.parent?;
        }
        Some(env)
    }

    pub fn environment_slot(&self, env: ObjectId, slot: u16) -> Option<JsValue> {
        self.interp
            .heap
            .get(env)?
            .environment()?
            .slots
            .get(slot as usize)
            .map(CheapClone::cheap_clone)
    }

    pub fn environment_len(&self, env: ObjectId) -> Option<usize> {
        Some(self.interp.heap.get(env)?.environment()?.slots.len())
    }

    /// Short description of a value for display
    pub fn describe(&self, value: &JsValue) -> String {
        match value {
            JsValue::Object(id) => match self.interp.heap.get(*id) {
                Some(obj) => match obj.callable().and_then(|c| c.name()) {
                    Some(name) => format!("[Function: {}]", name),
                    None if obj.environment().is_some() => "[Environment]".to_string(),
                    None => format!("[object {}]", obj.kind.class_name()),
                },
                None => "[dead object]".to_string(),
            },
            JsValue::Empty => "<empty>".to_string(),
            other => self.interp.display_primitive(other),
        }
    }
}

fn line_at(chunk: &BytecodeChunk, ip: usize) -> Option<u32> {
    chunk.location(ip).map(|l| l.line)
}

/// `ip` begins a new source line
fn starts_line(chunk: &BytecodeChunk, ip: usize, line: u32) -> bool {
    line_at(chunk, ip) == Some(line) && (ip == 0 || line_at(chunk, ip - 1) != Some(line))
}

impl Interpreter {
    pub fn set_debugger_host(&mut self, host: Box<dyn DebuggerHost>) {
        self.debugger.host = Some(host);
    }

    pub fn clear_debugger_host(&mut self) -> Option<Box<dyn DebuggerHost>> {
        self.debugger.step = None;
        self.debugger.host.take()
    }

    pub fn set_breakpoint(&mut self, location: BreakpointLocation) -> BreakpointId {
        let id = self.debugger.next_id;
        self.debugger.next_id += 1;
        self.debugger.breakpoints.insert(
            id,
            Breakpoint {
                location,
                enabled: true,
            },
        );
        id
    }

    pub fn clear_breakpoint(&mut self, id: BreakpointId) -> bool {
        self.debugger.breakpoints.remove(&id).is_some()
    }

    pub fn set_breakpoint_enabled(&mut self, id: BreakpointId, enabled: bool) -> bool {
        match self.debugger.breakpoints.get_mut(&id) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = (BreakpointId, &Breakpoint)> {
        self.debugger.breakpoints.iter().map(|(id, bp)| (*id, bp))
    }

    /// Instruction hook: check breakpoints and step conditions before `ip` runs
    pub(crate) fn debug_step(&mut self, ip: usize) -> Result<(), JsError> {
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };
        let chunk = frame.chunk.cheap_clone();
        let hit = self.debugger.breakpoints.iter().find_map(|(id, bp)| {
            let matches = bp.enabled
                && match &bp.location {
                    BreakpointLocation::Instruction { chunk: c, ip: at } => {
                        Rc::ptr_eq(c, &chunk) && *at == ip
                    }
                    BreakpointLocation::Line { file, line } => {
                        let same_file = match (file, &chunk.file) {
                            (None, _) => true,
                            (Some(f), Some(cf)) => cf.as_str() == f,
                            (Some(_), None) => false,
                        };
                        same_file && starts_line(&chunk, ip, *line)
                    }
                };
            matches.then_some(*id)
        });
        if let Some(id) = hit {
            return self.pause(PauseReason::Breakpoint(id), &chunk, ip);
        }
        if self.step_finished(&chunk, ip) {
            return self.pause(PauseReason::StepFinished, &chunk, ip);
        }
        Ok(())
    }

    fn step_finished(&self, chunk: &Rc<BytecodeChunk>, ip: usize) -> bool {
        let Some(step) = &self.debugger.step else {
            return false;
        };
        let depth = self.frames.len();
        let same_function = Rc::ptr_eq(chunk, &step.chunk);
        let moved = match (line_at(chunk, ip), step.line) {
            (Some(line), Some(start)) => !same_function || line != start,
            _ => !same_function || ip != step.ip,
        };
        match step.command {
            DebugCommand::StepInto => depth != step.depth || moved,
            DebugCommand::StepOver => depth < step.depth || (depth == step.depth && moved),
            DebugCommand::StepOut => depth < step.depth,
            DebugCommand::Continue | DebugCommand::Quit => false,
        }
    }

    /// `debugger` statement
    pub(crate) fn debugger_statement(&mut self) -> Result<(), JsError> {
        if self.debugger.host.is_none() {
            return Ok(());
        }
        let frame = self.frame()?;
        let chunk = frame.chunk.cheap_clone();
        let ip = frame.current_ip();
        self.pause(PauseReason::DebuggerStatement, &chunk, ip)
    }

    fn pause(&mut self, reason: PauseReason, chunk: &Rc<BytecodeChunk>, ip: usize) -> Result<(), JsError> {
        let Some(mut host) = self.debugger.host.take() else {
            return Ok(());
        };
        debug!(?reason, ip, depth = self.frames.len(), "debugger paused");
        let command = {
            let ctx = PauseContext {
                interp: self,
                reason,
            };
            host.on_pause(&ctx)
        };
        self.debugger.host = Some(host);
        self.debugger.step = match command {
            DebugCommand::Continue => None,
            DebugCommand::Quit => {
                self.debugger.step = None;
                return Err(JsError::Quit);
            }
            step => Some(StepState {
                command: step,
                depth: self.frames.len(),
                chunk: chunk.cheap_clone(),
                ip,
                line: line_at(chunk, ip),
            }),
        };
        Ok(())
    }
}
