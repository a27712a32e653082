//! Interpreter for bytecode chunks
//!
//! The `Interpreter` is the whole runtime context: heap, hidden-class table,
//! string dictionary, realm intrinsics, register stack, job queues,
//! debugger and console. Nothing lives in global state, so several
//! interpreters can coexist in one process.

pub mod builtins;
mod bytecode_vm;
mod call;
pub mod debugger;
pub mod generator;
pub mod jobs;
mod operations;
pub mod promise;
mod property;
pub mod stack;
pub mod stack_trace;

use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::bytecode::{BytecodeChunk, verify};
use crate::config::RuntimeConfig;
use crate::error::JsError;
use crate::gc::{GcStats, GuardScope, Heap, ObjectId};
use crate::object::cache::CacheStats;
use crate::object::function::{Callable, NativeCtor, NativeFn, NativeFunction};
use crate::object::shape::{ClassTable, PropertyFlags};
use crate::object::{JsObject, ObjectKind, Slot};
use crate::platform::{ConsoleLevel, ConsoleProvider, StdConsoleProvider};
use crate::string_dict::StringDict;
use crate::value::{CheapClone, JsString, JsSymbol, JsValue, PropertyKey};

pub use builtins::Realm;
pub use bytecode_vm::Completion;
pub use debugger::{
    BreakpointId, BreakpointLocation, DebugCommand, DebuggerHost, PauseContext, PauseReason,
};
pub use stack::{Frame, RegisterStack, ReturnTo};
pub use stack_trace::StackFrameInfo;

use debugger::Debugger;
use jobs::JobQueues;

/// Nested native-to-bytecode re-entries allowed before `RangeError`
const MAX_NATIVE_DEPTH: usize = 256;

/// Instructions between time-limit checks
const TIME_CHECK_INTERVAL: u32 = 1024;

/// A native function on the Rust stack, for stack traces
pub(crate) struct NativeCall {
    /// Number of bytecode frames below it
    pub depth: usize,
    pub name: JsString,
}

/// The interpreter state
pub struct Interpreter {
    pub(crate) heap: Heap<JsObject>,
    pub(crate) classes: ClassTable,
    pub(crate) strings: StringDict,
    pub(crate) realm: Realm,
    pub(crate) stack: RegisterStack,
    pub(crate) frames: Vec<Frame>,
    pub(crate) jobs: JobQueues,
    pub(crate) debugger: Debugger,
    pub(crate) config: RuntimeConfig,
    pub(crate) cache_stats: CacheStats,
    pub(crate) native_calls: Vec<NativeCall>,
    console: Box<dyn ConsoleProvider>,
    /// Exception being delivered to the next `Catch`
    pub(crate) thrown: Option<JsValue>,
    next_symbol_id: u64,
    /// Instructions left before the next time-limit check
    time_check_countdown: u32,
    deadline: Option<Instant>,
    native_depth: usize,
    /// Values handed to the host that stay rooted until released
    escaped_values: Vec<JsValue>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut heap = Heap::new();
        heap.set_gc_threshold(config.gc_threshold);
        let mut classes = ClassTable::new();
        let mut strings = StringDict::with_common_strings();
        let realm = Realm::allocate(&mut heap, &mut classes, &mut strings);

        let mut interp = Self {
            heap,
            classes,
            strings,
            realm,
            stack: RegisterStack::new(),
            frames: Vec::new(),
            jobs: JobQueues::new(),
            debugger: Debugger::new(),
            config,
            cache_stats: CacheStats::default(),
            native_calls: Vec::new(),
            console: Box::new(StdConsoleProvider::new()),
            thrown: None,
            next_symbol_id: builtins::FIRST_USER_SYMBOL_ID,
            time_check_countdown: TIME_CHECK_INTERVAL,
            deadline: None,
            native_depth: 0,
            escaped_values: Vec::new(),
        };
        builtins::install(&mut interp);
        interp
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn set_console(&mut self, console: Box<dyn ConsoleProvider>) {
        self.console = console;
    }

    pub(crate) fn write_console(&self, level: ConsoleLevel, message: &str) {
        self.console.write(level, message);
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn global_object(&self) -> ObjectId {
        self.realm.global
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Heap access
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn obj(&self, id: ObjectId) -> Result<&JsObject, JsError> {
        self.heap
            .get(id)
            .ok_or_else(|| JsError::internal_error(format!("dangling object #{}", id.index())))
    }

    pub(crate) fn obj_mut(&mut self, id: ObjectId) -> Result<&mut JsObject, JsError> {
        self.heap
            .get_mut(id)
            .ok_or_else(|| JsError::internal_error(format!("dangling object #{}", id.index())))
    }

    /// Allocate an object with the empty root class
    pub(crate) fn alloc_object(&mut self, prototype: Option<ObjectId>, kind: ObjectKind) -> ObjectId {
        let root = self.classes.root();
        self.heap.alloc(JsObject::new(prototype, root, kind))
    }

    /// Create a plain object with Object.prototype
    pub fn create_object(&mut self) -> ObjectId {
        self.alloc_object(Some(self.realm.object_prototype), ObjectKind::Ordinary)
    }

    /// Create an array with the proper prototype
    pub fn create_array(&mut self, elements: Vec<JsValue>) -> ObjectId {
        let id = self.alloc_object(Some(self.realm.array_prototype), ObjectKind::Array);
        if let Some(obj) = self.heap.get_mut(id) {
            obj.elements = elements;
        }
        id
    }

    /// Intern a string in the dictionary, returning a shared JsString.
    #[inline]
    pub fn intern(&mut self, s: &str) -> JsString {
        self.strings.intern(s)
    }

    /// Create a PropertyKey from an interned string.
    #[inline]
    pub fn key(&mut self, s: &str) -> PropertyKey {
        PropertyKey::from(self.strings.intern(s))
    }

    pub(crate) fn new_symbol(&mut self, description: Option<JsString>) -> JsSymbol {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        JsSymbol::new(id, description)
    }

    /// Create a native function object with Function.prototype
    pub fn create_native_function(
        &mut self,
        name: &str,
        call: NativeFn,
        arity: usize,
        construct: Option<NativeCtor>,
    ) -> ObjectId {
        let name = self.intern(name);
        let callable = Callable::Native(NativeFunction {
            name: name.cheap_clone(),
            call,
            construct,
        });
        let func = self.alloc_object(
            Some(self.realm.function_prototype),
            ObjectKind::Function(callable),
        );
        self.set_function_name_and_length(func, JsValue::String(name), arity);
        func
    }

    pub(crate) fn set_function_name_and_length(&mut self, func: ObjectId, name: JsValue, arity: usize) {
        let length_key = self.key("length");
        let name_key = self.key("name");
        self.define_raw(func, length_key, JsValue::from(arity as f64), PropertyFlags::READONLY_HIDDEN);
        self.define_raw(func, name_key, name, PropertyFlags::READONLY_HIDDEN);
    }

    /// Register a native method on an object
    pub fn register_method(&mut self, target: ObjectId, name: &str, func: NativeFn, arity: usize) {
        let f = self.create_native_function(name, func, arity, None);
        let key = self.key(name);
        self.define_raw(target, key, JsValue::Object(f), PropertyFlags::HIDDEN);
    }

    /// Register a symbol-keyed native method
    pub(crate) fn register_symbol_method(
        &mut self,
        target: ObjectId,
        symbol: &JsSymbol,
        name: &str,
        func: NativeFn,
    ) {
        let f = self.create_native_function(name, func, 0, None);
        self.define_raw(
            target,
            PropertyKey::Symbol(symbol.cheap_clone()),
            JsValue::Object(f),
            PropertyFlags::HIDDEN,
        );
    }

    /// Register a getter-only accessor
    pub(crate) fn register_getter(&mut self, target: ObjectId, name: &str, getter: NativeFn) {
        let f = self.create_native_function(&format!("get {}", name), getter, 0, None);
        let key = self.key(name);
        let flags = PropertyFlags {
            enumerable: false,
            ..PropertyFlags::ACCESSOR
        };
        self.define_raw_slot(
            target,
            key,
            Slot::Accessor {
                getter: Some(f),
                setter: None,
            },
            flags,
        );
    }

    /// Define or overwrite an own data property without any checks.
    /// Used while building intrinsics and other objects the runtime owns.
    pub(crate) fn define_raw(&mut self, target: ObjectId, key: PropertyKey, value: JsValue, flags: PropertyFlags) {
        self.define_raw_slot(target, key, Slot::Data(value), flags);
    }

    pub(crate) fn define_raw_slot(&mut self, target: ObjectId, key: PropertyKey, slot: Slot, flags: PropertyFlags) {
        let Some(obj) = self.heap.get_mut(target) else {
            return;
        };
        let result = if obj.lookup_own(&self.classes, &key).is_some() {
            obj.redefine_property(&self.classes, &key, flags, slot)
        } else {
            obj.add_property(&mut self.classes, &key, flags, slot)
        };
        if let Err(e) = result {
            debug!(error = %e, "define_raw failed");
        }
    }

    /// `{ value, done }` iterator result
    pub(crate) fn iter_result(&mut self, value: JsValue, done: bool) -> JsValue {
        let obj = self.create_object();
        let value_key = self.key("value");
        let done_key = self.key("done");
        self.define_raw(obj, value_key, value, PropertyFlags::DEFAULT);
        self.define_raw(obj, done_key, JsValue::Boolean(done), PropertyFlags::DEFAULT);
        JsValue::Object(obj)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Garbage collection
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn guard_scope(&self) -> GuardScope {
        self.heap.guard_scope()
    }

    /// Root a value until the enclosing guard scope is released
    pub(crate) fn guard_value(&mut self, value: &JsValue) {
        if let JsValue::Object(id) = value {
            self.heap.guard(*id);
        }
    }

    pub(crate) fn guard_values(&mut self, values: &[JsValue]) {
        for value in values {
            self.guard_value(value);
        }
    }

    pub(crate) fn release_guards(&mut self, scope: GuardScope) {
        self.heap.release(scope);
    }

    fn roots(&self) -> Vec<ObjectId> {
        let mut roots = self.realm.objects();
        let mut push = |value: &JsValue| {
            if let JsValue::Object(id) = value {
                roots.push(*id);
            }
        };
        for value in self.stack.iter() {
            push(value);
        }
        for frame in &self.frames {
            push(&frame.this);
            push(&frame.new_target);
        }
        if let Some(value) = &self.thrown {
            push(value);
        }
        for value in &self.escaped_values {
            push(value);
        }
        for frame in &self.frames {
            roots.extend(frame.callee);
            roots.extend(frame.env);
            roots.extend(frame.generator);
        }
        self.jobs.trace(&mut |id| roots.push(id));
        roots
    }

    /// Run garbage collection now. Returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self.roots();
        self.heap.collect(roots)
    }

    /// Collect if the allocation threshold was reached
    pub(crate) fn safepoint(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Set the GC threshold
    ///
    /// - `0`: Disable automatic collection
    /// - `n > 0`: Collect at the first safepoint after every `n` allocations
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.config.gc_threshold = threshold;
        self.heap.set_gc_threshold(threshold);
    }

    /// Keep a value returned to the host rooted until released
    pub fn capture_escaping_value(&mut self, value: &JsValue) {
        if value.is_object() {
            self.escaped_values.push(value.cheap_clone());
        }
    }

    /// Release all escaped values, allowing them to be garbage collected
    pub fn release_escaped_values(&mut self) {
        self.escaped_values.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache_stats
    }

    /// Whether the object is still allocated (for GC tests)
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.heap.get(id).is_some()
    }

    /// Hidden class of an object, `None` in dictionary mode
    pub fn hidden_class(&self, id: ObjectId) -> Option<crate::object::shape::ClassId> {
        self.heap.get(id).and_then(JsObject::class_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Host entry points
    // ═══════════════════════════════════════════════════════════════════════════

    /// Verify a chunk tree and make it runnable
    pub fn load(&mut self, chunk: BytecodeChunk) -> Result<Rc<BytecodeChunk>, JsError> {
        verify(&chunk)?;
        Ok(Rc::new(chunk))
    }

    /// Verify and run a top-level chunk
    pub fn run(&mut self, chunk: BytecodeChunk) -> Result<JsValue, JsError> {
        let chunk = self.load(chunk)?;
        self.run_chunk(&chunk)
    }

    /// Run a loaded top-level chunk. `this` is the global object, or
    /// undefined for strict code.
    pub fn run_chunk(&mut self, chunk: &Rc<BytecodeChunk>) -> Result<JsValue, JsError> {
        let this = if chunk.function_info.strict {
            JsValue::Undefined
        } else {
            JsValue::Object(self.realm.global)
        };
        self.enter_host_call();
        let depth = self.frames.len();
        let result = self
            .push_frame(call::FrameSetup {
                chunk: chunk.cheap_clone(),
                callee: None,
                env: None,
                this,
                new_target: JsValue::Undefined,
                args: &[],
                return_to: ReturnTo::Host,
                construct: false,
            })
            .and_then(|()| self.execute(depth))
            .and_then(|completion| completion.into_return());
        self.leave_host_call();
        let value = result?;
        self.capture_escaping_value(&value);
        Ok(value)
    }

    /// Start the time limit clock when entering from an idle state
    fn enter_host_call(&mut self) {
        if self.frames.is_empty() && self.native_depth == 0 {
            self.deadline = self
                .config
                .time_limit_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms));
            self.time_check_countdown = TIME_CHECK_INTERVAL;
        }
    }

    fn leave_host_call(&mut self) {
        if self.frames.is_empty() && self.native_depth == 0 {
            self.deadline = None;
            self.thrown = None;
        }
    }

    /// Called once per instruction; checks the wall clock every
    /// `TIME_CHECK_INTERVAL` instructions.
    #[inline]
    pub(crate) fn tick(&mut self) -> Result<(), JsError> {
        self.time_check_countdown -= 1;
        if self.time_check_countdown == 0 {
            self.time_check_countdown = TIME_CHECK_INTERVAL;
            if let Some(deadline) = self.deadline
                && Instant::now() >= deadline
            {
                debug!("time limit exceeded");
                return Err(JsError::Timeout);
            }
        }
        Ok(())
    }

    /// Track native re-entry depth; natives recurse on the Rust stack
    pub(crate) fn enter_native(&mut self) -> Result<(), JsError> {
        if self.native_depth >= MAX_NATIVE_DEPTH {
            tracing::trace!(depth = self.native_depth, "native stack limit hit");
            return Err(JsError::range_error("Maximum call stack size exceeded"));
        }
        self.native_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_native(&mut self) {
        self.native_depth = self.native_depth.saturating_sub(1);
    }

    /// Write an uncaught error to the console's error stream
    pub fn report_error(&mut self, error: &JsError) {
        let text = self.error_to_string(error);
        debug!(error = %text, "uncaught exception");
        self.write_console(ConsoleLevel::Error, &format!("Uncaught {}", text));
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
