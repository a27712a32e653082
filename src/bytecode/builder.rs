//! BytecodeBuilder - helper for emitting bytecode instructions
//!
//! Provides register allocation, forward-referencing labels, try regions,
//! switch lowering and the new-object-cache eligibility check.

use rustc_hash::FxHashMap;
use std::rc::Rc;

use super::op::{CacheIndex, ConstantIndex, JumpTarget, Op, Register};
use super::{
    BytecodeChunk, Constant, ExceptionHandler, FunctionInfo, JumpTable, ScopeDescriptor,
    SourceLocation, SourceMapEntry, StringTable,
};
use crate::error::JsError;
use crate::object::cache::PropertyCaches;
use crate::value::{CheapClone, JsBigInt, JsString};

/// Switches with fewer cases than this always compile to a compare cascade
const SWITCH_TABLE_MIN_CASES: usize = 4;

/// Slack allowed in a dense jump table beyond two entries per case
const SWITCH_TABLE_SLACK: usize = 8;

const SWITCH_TABLE_MAX_RANGE: usize = 65536;

/// Marker used in jump operands until labels are resolved
const UNRESOLVED: JumpTarget = JumpTarget::MAX;

/// Register allocator for bytecode emission
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    next: u8,
    max_used: u8,
    free_list: Vec<u8>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> Result<Register, JsError> {
        if let Some(r) = self.free_list.pop() {
            return Ok(r);
        }
        if self.next == 255 {
            return Err(JsError::internal_error("Too many registers needed (max 255)"));
        }
        let r = self.next;
        self.next += 1;
        self.max_used = self.max_used.max(self.next);
        Ok(r)
    }

    /// Free a register for reuse
    pub fn free(&mut self, r: Register) {
        if r == self.next.saturating_sub(1) {
            self.next = r;
        } else {
            self.free_list.push(r);
        }
    }

    /// Reserve consecutive registers (call argument windows)
    pub fn reserve_range(&mut self, count: u8) -> Result<Register, JsError> {
        match self.next.checked_add(count) {
            Some(end) if end < 255 => {
                let start = self.next;
                self.next = end;
                self.max_used = self.max_used.max(self.next);
                Ok(start)
            }
            _ => Err(JsError::internal_error("Too many registers needed (max 255)")),
        }
    }

    /// Never hand out registers below `floor`
    fn raise_floor(&mut self, floor: u8) {
        if self.next < floor {
            self.next = floor;
            self.max_used = self.max_used.max(floor);
            self.free_list.retain(|&r| r >= floor);
        }
    }

    pub fn max_used(&self) -> u8 {
        self.max_used
    }
}

/// Forward-referencable jump destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Open protected region
#[derive(Debug, Clone, Copy)]
pub struct TryRegion {
    start: JumpTarget,
}

struct PendingHandler {
    start: JumpTarget,
    end: JumpTarget,
    handler: Label,
}

/// Builder for constructing bytecode chunks
pub struct BytecodeBuilder {
    code: Vec<Op>,
    constants: Vec<Constant>,
    string_map: FxHashMap<JsString, ConstantIndex>,
    number_map: FxHashMap<u64, ConstantIndex>,
    source_map: Vec<SourceMapEntry>,
    current_location: Option<SourceLocation>,
    registers: RegisterAllocator,
    /// One past the highest register any emitted op names
    register_floor: u16,
    labels: Vec<Option<JumpTarget>>,
    /// (instruction index, label) for direct jump operands
    fixups: Vec<(usize, Label)>,
    pending_handlers: Vec<PendingHandler>,
    pending_jump_tables: Vec<(i32, Vec<Label>)>,
    pending_string_tables: Vec<Vec<(JsString, Label)>>,
    scopes: Vec<ScopeDescriptor>,
    cache_count: u16,
    /// CacheNewObject instructions awaiting the eligibility check
    new_object_caches: Vec<usize>,
    function_info: FunctionInfo,
    file: Option<JsString>,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            string_map: FxHashMap::default(),
            number_map: FxHashMap::default(),
            source_map: Vec::new(),
            current_location: None,
            registers: RegisterAllocator::new(),
            register_floor: 0,
            labels: Vec::new(),
            fixups: Vec::new(),
            pending_handlers: Vec::new(),
            pending_jump_tables: Vec::new(),
            pending_string_tables: Vec::new(),
            scopes: Vec::new(),
            cache_count: 0,
            new_object_caches: Vec::new(),
            function_info: FunctionInfo::default(),
            file: None,
        }
    }

    /// Create a builder for a function body
    pub fn for_function(info: FunctionInfo) -> Self {
        let mut builder = Self::new();
        builder.function_info = info;
        builder
    }

    pub fn set_file(&mut self, file: &str) {
        self.file = Some(JsString::from(file));
    }

    /// Source location attached to the instructions emitted from now on
    pub fn set_location(&mut self, line: u32, column: u32) {
        self.current_location = Some(SourceLocation { line, column });
    }

    pub fn registers(&mut self) -> &mut RegisterAllocator {
        &mut self.registers
    }

    /// Allocate a register not used by any instruction emitted so far
    pub fn alloc_register(&mut self) -> Result<Register, JsError> {
        self.registers.raise_floor(self.register_floor.min(255) as u8);
        self.registers.alloc()
    }

    pub fn free_register(&mut self, r: Register) {
        self.registers.free(r);
    }

    pub fn reserve_registers(&mut self, count: u8) -> Result<Register, JsError> {
        self.registers.raise_floor(self.register_floor.min(255) as u8);
        self.registers.reserve_range(count)
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, op: Op) -> usize {
        let index = self.code.len();
        if let Some(location) = self.current_location {
            let changed = self
                .source_map
                .last()
                .is_none_or(|e| e.location != location);
            if changed {
                self.source_map.push(SourceMapEntry {
                    offset: index,
                    location,
                });
            }
        }
        if let Some(max) = op.registers().into_iter().max() {
            self.register_floor = self.register_floor.max(max as u16 + 1);
        }
        self.code.push(op);
        index
    }

    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Labels & jumps
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction
    pub fn bind_label(&mut self, label: Label) {
        let here = self.code.len() as JumpTarget;
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(here);
        }
    }

    fn emit_to_label(&mut self, op: Op, label: Label) -> usize {
        let index = self.emit(op);
        self.fixups.push((index, label));
        index
    }

    pub fn emit_jmp(&mut self, label: Label) -> usize {
        self.emit_to_label(Op::Jmp { target: UNRESOLVED }, label)
    }

    pub fn emit_jmp_true(&mut self, cond: Register, label: Label) -> usize {
        self.emit_to_label(
            Op::JmpTrue {
                cond,
                target: UNRESOLVED,
            },
            label,
        )
    }

    pub fn emit_jmp_false(&mut self, cond: Register, label: Label) -> usize {
        self.emit_to_label(
            Op::JmpFalse {
                cond,
                target: UNRESOLVED,
            },
            label,
        )
    }

    pub fn emit_jmp_undefined(&mut self, cond: Register, label: Label) -> usize {
        self.emit_to_label(
            Op::JmpUndefined {
                cond,
                target: UNRESOLVED,
            },
            label,
        )
    }

    pub fn emit_jmp_nullish(&mut self, cond: Register, label: Label) -> usize {
        self.emit_to_label(
            Op::JmpNullish {
                cond,
                target: UNRESOLVED,
            },
            label,
        )
    }

    /// Yield r[value]; resumption continues at `resume`
    pub fn emit_yield(&mut self, value: Register, resume: Label) -> usize {
        self.emit_to_label(
            Op::Yield {
                value,
                resume: UNRESOLVED,
            },
            resume,
        )
    }

    /// Await r[value]; resumption continues at `resume`
    pub fn emit_await(&mut self, value: Register, resume: Label) -> usize {
        self.emit_to_label(
            Op::Await {
                value,
                resume: UNRESOLVED,
            },
            resume,
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Exception regions
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn begin_try(&mut self) -> TryRegion {
        TryRegion {
            start: self.code.len() as JumpTarget,
        }
    }

    /// Close a protected region; exceptions inside it go to `handler`.
    /// Nested regions must be closed innermost first.
    pub fn end_try(&mut self, region: TryRegion, handler: Label) {
        self.pending_handlers.push(PendingHandler {
            start: region.start,
            end: self.code.len() as JumpTarget,
            handler,
        });
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Constants
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn add_constant(&mut self, constant: Constant) -> Result<ConstantIndex, JsError> {
        if self.constants.len() >= u16::MAX as usize {
            return Err(JsError::internal_error("Too many constants (max 65535)"));
        }
        let idx = self.constants.len() as ConstantIndex;
        self.constants.push(constant);
        Ok(idx)
    }

    /// Add a string constant to the pool (with deduplication)
    pub fn add_string(&mut self, s: &str) -> Result<ConstantIndex, JsError> {
        if let Some(&idx) = self.string_map.get(s) {
            return Ok(idx);
        }
        let js = JsString::from(s);
        let idx = self.add_constant(Constant::String(js.cheap_clone()))?;
        self.string_map.insert(js, idx);
        Ok(idx)
    }

    /// Add a number constant to the pool (with deduplication)
    pub fn add_number(&mut self, n: f64) -> Result<ConstantIndex, JsError> {
        let bits = n.to_bits();
        if let Some(&idx) = self.number_map.get(&bits) {
            return Ok(idx);
        }
        let idx = self.add_constant(Constant::Number(n))?;
        self.number_map.insert(bits, idx);
        Ok(idx)
    }

    /// Add a nested function body
    pub fn add_function(&mut self, chunk: BytecodeChunk) -> Result<ConstantIndex, JsError> {
        self.add_constant(Constant::Chunk(Rc::new(chunk)))
    }

    pub fn add_scope(&mut self, scope: ScopeDescriptor) -> u16 {
        self.scopes.push(scope);
        (self.scopes.len() - 1) as u16
    }

    pub fn new_cache(&mut self) -> CacheIndex {
        let idx = self.cache_count;
        self.cache_count = self.cache_count.saturating_add(1);
        idx
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Convenience emitters
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn emit_load_string(&mut self, dst: Register, s: &str) -> Result<(), JsError> {
        let idx = self.add_string(s)?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    pub fn emit_load_number(&mut self, dst: Register, n: f64) -> Result<(), JsError> {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            self.emit(Op::LoadInt {
                dst,
                value: n as i32,
            });
            return Ok(());
        }
        let idx = self.add_number(n)?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    pub fn emit_load_bigint(&mut self, dst: Register, n: i64) -> Result<(), JsError> {
        let idx = self.add_constant(Constant::BigInt(JsBigInt::from(n)))?;
        self.emit(Op::LoadConst { dst, idx });
        Ok(())
    }

    pub fn emit_get_by_id(&mut self, dst: Register, obj: Register, name: &str) -> Result<(), JsError> {
        let key = self.add_string(name)?;
        let cache = self.new_cache();
        self.emit(Op::GetById {
            dst,
            obj,
            key,
            cache,
        });
        Ok(())
    }

    pub fn emit_try_get_by_id(
        &mut self,
        dst: Register,
        obj: Register,
        name: &str,
    ) -> Result<(), JsError> {
        let key = self.add_string(name)?;
        let cache = self.new_cache();
        self.emit(Op::TryGetById {
            dst,
            obj,
            key,
            cache,
        });
        Ok(())
    }

    pub fn emit_put_by_id(&mut self, obj: Register, name: &str, value: Register) -> Result<(), JsError> {
        let key = self.add_string(name)?;
        let cache = self.new_cache();
        self.emit(Op::PutById {
            obj,
            key,
            value,
            cache,
        });
        Ok(())
    }

    pub fn emit_try_put_by_id(
        &mut self,
        obj: Register,
        name: &str,
        value: Register,
    ) -> Result<(), JsError> {
        let key = self.add_string(name)?;
        let cache = self.new_cache();
        self.emit(Op::TryPutById {
            obj,
            key,
            value,
            cache,
        });
        Ok(())
    }

    pub fn emit_put_new_own(
        &mut self,
        obj: Register,
        name: &str,
        value: Register,
        enumerable: bool,
    ) -> Result<(), JsError> {
        let key = self.add_string(name)?;
        self.emit(Op::PutNewOwnById {
            obj,
            key,
            value,
            enumerable,
        });
        Ok(())
    }

    pub fn emit_declare_global_var(&mut self, name: &str) -> Result<(), JsError> {
        let name = self.add_string(name)?;
        self.emit(Op::DeclareGlobalVar { name });
        Ok(())
    }

    /// Emit a new-object cache for `this` and the property list `keys`.
    /// The instruction survives `finish` only if the stores that follow
    /// initialize exactly these keys in straight-line code.
    pub fn emit_cache_new_object(&mut self, this: Register, keys: &[&str]) -> Result<usize, JsError> {
        let keys = self.add_constant(Constant::Keys(keys.iter().map(|k| JsString::from(*k)).collect()))?;
        let cache = self.new_cache();
        let index = self.emit(Op::CacheNewObject { this, keys, cache });
        self.new_object_caches.push(index);
        Ok(index)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Switch lowering
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lower an integer switch to a jump table when dense enough, else a
    /// compare cascade. Duplicate cases keep their first label.
    pub fn emit_switch_imm(
        &mut self,
        value: Register,
        cases: &[(i32, Label)],
        default: Label,
    ) -> Result<(), JsError> {
        let mut unique: Vec<(i32, Label)> = Vec::with_capacity(cases.len());
        for (case, label) in cases {
            if !unique.iter().any(|(c, _)| c == case) {
                unique.push((*case, *label));
            }
        }

        let min = unique.iter().map(|(c, _)| *c).min();
        let max = unique.iter().map(|(c, _)| *c).max();
        if let (Some(min), Some(max)) = (min, max) {
            let range = (max as i64 - min as i64 + 1) as usize;
            if Self::use_jump_table(unique.len(), range) {
                let mut targets = vec![default; range];
                for (case, label) in &unique {
                    if let Some(slot) = targets.get_mut((*case as i64 - min as i64) as usize) {
                        *slot = *label;
                    }
                }
                let table = self.pending_jump_tables.len() as u16;
                self.pending_jump_tables.push((min, targets));
                self.emit_to_label(
                    Op::SwitchImm {
                        value,
                        table,
                        default: UNRESOLVED,
                    },
                    default,
                );
                return Ok(());
            }
        }

        let case_reg = self.alloc_register()?;
        let cmp_reg = self.alloc_register()?;
        for (case, label) in &unique {
            self.emit(Op::LoadInt {
                dst: case_reg,
                value: *case,
            });
            self.emit(Op::StrictEq {
                dst: cmp_reg,
                left: value,
                right: case_reg,
            });
            self.emit_jmp_true(cmp_reg, *label);
        }
        self.emit_jmp(default);
        self.free_register(cmp_reg);
        self.free_register(case_reg);
        Ok(())
    }

    fn use_jump_table(case_count: usize, range: usize) -> bool {
        case_count >= SWITCH_TABLE_MIN_CASES
            && range <= 2 * case_count + SWITCH_TABLE_SLACK
            && range < SWITCH_TABLE_MAX_RANGE
    }

    /// Lower a string switch to a hashed table or a compare cascade
    pub fn emit_switch_string(
        &mut self,
        value: Register,
        cases: &[(&str, Label)],
        default: Label,
    ) -> Result<(), JsError> {
        let mut unique: Vec<(JsString, Label)> = Vec::with_capacity(cases.len());
        for (case, label) in cases {
            if !unique.iter().any(|(c, _)| c == case) {
                unique.push((JsString::from(*case), *label));
            }
        }

        if unique.len() >= SWITCH_TABLE_MIN_CASES {
            let table = self.pending_string_tables.len() as u16;
            self.pending_string_tables.push(unique);
            self.emit_to_label(
                Op::StringSwitch {
                    value,
                    table,
                    default: UNRESOLVED,
                },
                default,
            );
            return Ok(());
        }

        let case_reg = self.alloc_register()?;
        let cmp_reg = self.alloc_register()?;
        for (case, label) in &unique {
            self.emit_load_string(case_reg, case.as_str())?;
            self.emit(Op::StrictEq {
                dst: cmp_reg,
                left: value,
                right: case_reg,
            });
            self.emit_jmp_true(cmp_reg, *label);
        }
        self.emit_jmp(default);
        self.free_register(cmp_reg);
        self.free_register(case_reg);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Finishing
    // ═══════════════════════════════════════════════════════════════════════════

    fn resolve(&self, label: Label) -> Result<JumpTarget, JsError> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| JsError::Verify(format!("label {} was never bound", label.0)))
    }

    /// Whether the CacheNewObject at `index` is followed by straight-line
    /// stores of exactly its keys, in order, to the untouched `this` register.
    fn new_object_cache_eligible(&self, index: usize) -> bool {
        let (this, keys) = match self.code.get(index) {
            Some(Op::CacheNewObject { this, keys, .. }) => (*this, *keys),
            _ => return false,
        };
        let keys = match self.constants.get(keys as usize) {
            Some(Constant::Keys(keys)) => keys,
            _ => return false,
        };
        let jump_targets: Vec<JumpTarget> = self.labels.iter().flatten().copied().collect();

        let mut remaining = keys.iter();
        let mut expected = remaining.next();
        for (offset, op) in self.code.iter().enumerate().skip(index + 1) {
            let Some(key) = expected else {
                return true;
            };
            // A label inside the sequence means another path can reach it
            if jump_targets.contains(&(offset as JumpTarget)) {
                return false;
            }
            let stored = match op {
                Op::PutById { obj, key, value, .. } | Op::PutNewOwnById { obj, key, value, .. }
                    if *obj == this && *value != this =>
                {
                    Some(*key)
                }
                _ => None,
            };
            match stored {
                Some(name) => match self.constants.get(name as usize) {
                    Some(Constant::String(s)) if s == key => expected = remaining.next(),
                    _ => return false,
                },
                None => {
                    if op.is_terminator() || op.may_call() || op.registers().contains(&this) {
                        return false;
                    }
                }
            }
        }
        expected.is_none()
    }

    /// Resolve labels, run deferred checks and produce the chunk
    pub fn finish(mut self) -> Result<BytecodeChunk, JsError> {
        for index in std::mem::take(&mut self.new_object_caches) {
            if !self.new_object_cache_eligible(index)
                && let Some(op) = self.code.get_mut(index)
            {
                *op = Op::Nop;
            }
        }

        let fixups = std::mem::take(&mut self.fixups);
        for (index, label) in fixups {
            let target = self.resolve(label)?;
            if let Some(op) = self.code.get_mut(index) {
                op.map_targets(|_| target);
            }
        }

        let mut exception_table = Vec::with_capacity(self.pending_handlers.len());
        for pending in &self.pending_handlers {
            exception_table.push(ExceptionHandler {
                start: pending.start,
                end: pending.end,
                target: self.resolve(pending.handler)?,
            });
        }

        let mut jump_tables = Vec::with_capacity(self.pending_jump_tables.len());
        for (min, labels) in &self.pending_jump_tables {
            let targets = labels
                .iter()
                .map(|l| self.resolve(*l))
                .collect::<Result<Vec<_>, _>>()?;
            jump_tables.push(JumpTable { min: *min, targets });
        }

        let mut string_tables = Vec::with_capacity(self.pending_string_tables.len());
        for cases in &self.pending_string_tables {
            let mut table = StringTable::default();
            for (s, label) in cases {
                table.cases.insert(s.cheap_clone(), self.resolve(*label)?);
            }
            string_tables.push(table);
        }

        if self.register_floor > 255 {
            return Err(JsError::Verify("register 255 is reserved".to_string()));
        }
        let register_count = self.registers.max_used().max(self.register_floor as u8);

        Ok(BytecodeChunk {
            code: self.code,
            constants: self.constants,
            register_count,
            function_info: self.function_info,
            exception_table,
            jump_tables,
            string_tables,
            scopes: self.scopes,
            source_map: self.source_map,
            file: self.file,
            caches: PropertyCaches::new(self.cache_count as usize),
        })
    }
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
