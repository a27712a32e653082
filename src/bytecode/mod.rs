//! Bytecode chunk format
//!
//! A `BytecodeChunk` is one function body: its instructions, constant pool,
//! exception table, switch tables, environment layouts, source map and the
//! inline caches its property-access instructions use. Nested functions are
//! chunks stored in the constant pool.

mod builder;
mod disasm;
mod op;
mod verify;

pub use builder::{BytecodeBuilder, Label, RegisterAllocator};
pub use op::{CacheIndex, ConstantIndex, JumpTarget, Op, Register};
pub use verify::verify;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::object::cache::PropertyCaches;
use crate::value::{JsBigInt, JsString};

/// Function flavors with distinct call/construct behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionKind {
    #[default]
    Normal,
    Arrow,
    /// Object/class method: callable, never a constructor
    Method,
    Generator,
    AsyncFunction,
    AsyncGenerator,
    BaseConstructor,
    DerivedConstructor,
}

impl FunctionKind {
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            FunctionKind::Normal | FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor
        )
    }

    pub fn is_class_constructor(self) -> bool {
        matches!(
            self,
            FunctionKind::BaseConstructor | FunctionKind::DerivedConstructor
        )
    }

    /// Gets a fresh `prototype` object when turned into a closure
    pub fn has_prototype(self) -> bool {
        matches!(
            self,
            FunctionKind::Normal | FunctionKind::Generator | FunctionKind::AsyncGenerator
        )
    }
}

/// Function metadata
#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    pub name: Option<JsString>,
    /// Value of the function's `length` property
    pub param_count: usize,
    pub kind: FunctionKind,
    pub strict: bool,
}

impl FunctionInfo {
    pub fn new(name: Option<&str>, param_count: usize, kind: FunctionKind) -> Self {
        Self {
            name: name.map(JsString::from),
            param_count,
            kind,
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Constants that can be stored in the pool
#[derive(Debug, Clone)]
pub enum Constant {
    String(JsString),
    Number(f64),
    BigInt(JsBigInt),
    /// Nested function body
    Chunk(Rc<BytecodeChunk>),
    /// Ordered key list for `CacheNewObject`
    Keys(Vec<JsString>),
}

/// Protected instruction range `[start, end)` and its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: JumpTarget,
    pub end: JumpTarget,
    pub target: JumpTarget,
}

/// Dense integer switch table: case `min + i` jumps to `targets[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct JumpTable {
    pub min: i32,
    pub targets: Vec<JumpTarget>,
}

/// String switch table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringTable {
    pub cases: FxHashMap<JsString, JumpTarget>,
}

/// How an environment slot starts out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// `var`/parameter: starts as undefined
    Var,
    /// `let`/`const`/`class`: starts in the temporal dead zone
    Lexical,
}

/// Layout of one environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeDescriptor {
    pub slots: Vec<SlotKind>,
}

impl ScopeDescriptor {
    pub fn new(slots: Vec<SlotKind>) -> Self {
        Self { slots }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Source map entry: instructions from `offset` on map to `location`
#[derive(Debug, Clone)]
pub struct SourceMapEntry {
    pub offset: usize,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Default)]
pub struct BytecodeChunk {
    pub code: Vec<Op>,
    pub constants: Vec<Constant>,
    pub register_count: u8,
    pub function_info: FunctionInfo,
    /// Inner regions first
    pub exception_table: Vec<ExceptionHandler>,
    pub jump_tables: Vec<JumpTable>,
    pub string_tables: Vec<StringTable>,
    pub scopes: Vec<ScopeDescriptor>,
    /// Sorted by offset
    pub source_map: Vec<SourceMapEntry>,
    pub file: Option<JsString>,
    pub caches: PropertyCaches,
}

impl BytecodeChunk {
    pub fn get(&self, offset: usize) -> Option<&Op> {
        self.code.get(offset)
    }

    pub fn get_constant(&self, idx: ConstantIndex) -> Option<&Constant> {
        self.constants.get(idx as usize)
    }

    /// Source location for an instruction index
    pub fn location(&self, offset: usize) -> Option<SourceLocation> {
        let idx = self.source_map.binary_search_by_key(&offset, |e| e.offset);
        match idx {
            Ok(i) => self.source_map.get(i).map(|e| e.location),
            Err(i) if i > 0 => self.source_map.get(i - 1).map(|e| e.location),
            _ => None,
        }
    }

    /// Innermost handler covering `offset`
    pub fn find_handler(&self, offset: usize) -> Option<&ExceptionHandler> {
        let offset = offset as JumpTarget;
        self.exception_table
            .iter()
            .find(|h| h.start <= offset && offset < h.end)
    }

    pub fn name(&self) -> Option<&JsString> {
        self.function_info.name.as_ref()
    }

    /// Visit this chunk and every nested chunk
    pub fn for_each_chunk<'a>(self: &'a Rc<Self>, f: &mut impl FnMut(&'a Rc<BytecodeChunk>)) {
        f(self);
        for constant in &self.constants {
            if let Constant::Chunk(inner) = constant {
                inner.for_each_chunk(f);
            }
        }
    }
}
