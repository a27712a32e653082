//! Bytecode instruction set
//!
//! Register-based: every operand names one of the frame's (at most 256)
//! registers, a constant-pool index, a table index or an instruction index.

/// Virtual register index (0-255)
pub type Register = u8;

/// Constant pool index (0-65535)
pub type ConstantIndex = u16;

/// Jump target (instruction index)
pub type JumpTarget = u32;

/// Inline property-cache index
pub type CacheIndex = u16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // ═══════════════════════════════════════════════════════════════════════════════
    // Constants & Register Operations
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = constants[idx]
    LoadConst { dst: Register, idx: ConstantIndex },
    LoadInt { dst: Register, value: i32 },
    LoadUndefined { dst: Register },
    LoadNull { dst: Register },
    LoadBool { dst: Register, value: bool },
    /// r[dst] = <empty>, the uninitialized-binding sentinel
    LoadEmpty { dst: Register },
    Mov { dst: Register, src: Register },

    /// r[dst] = argument `index` (0-based, excluding `this`), or undefined
    LoadParam { dst: Register, index: u8 },
    GetArgumentsLength { dst: Register },
    /// r[dst] = fresh unmapped arguments object
    ReifyArguments { dst: Register },
    /// r[dst] = this. Throws ReferenceError in a derived constructor before super()
    LoadThis { dst: Register },
    /// Non-strict `this` coercion: nullish becomes the global object,
    /// primitives are boxed.
    CoerceThisNS { dst: Register, src: Register },
    GetNewTarget { dst: Register },
    GetGlobalObject { dst: Register },
    /// r[dst] = the running function object
    LoadCallee { dst: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Arithmetic, Comparison & Logic
    // ═══════════════════════════════════════════════════════════════════════════════
    Add { dst: Register, left: Register, right: Register },
    Sub { dst: Register, left: Register, right: Register },
    Mul { dst: Register, left: Register, right: Register },
    Div { dst: Register, left: Register, right: Register },
    Mod { dst: Register, left: Register, right: Register },
    Exp { dst: Register, left: Register, right: Register },
    BitAnd { dst: Register, left: Register, right: Register },
    BitOr { dst: Register, left: Register, right: Register },
    BitXor { dst: Register, left: Register, right: Register },
    LShift { dst: Register, left: Register, right: Register },
    RShift { dst: Register, left: Register, right: Register },
    URShift { dst: Register, left: Register, right: Register },
    Eq { dst: Register, left: Register, right: Register },
    Neq { dst: Register, left: Register, right: Register },
    StrictEq { dst: Register, left: Register, right: Register },
    StrictNeq { dst: Register, left: Register, right: Register },
    Less { dst: Register, left: Register, right: Register },
    LessEq { dst: Register, left: Register, right: Register },
    Greater { dst: Register, left: Register, right: Register },
    GreaterEq { dst: Register, left: Register, right: Register },
    /// r[dst] = r[left] instanceof r[right]
    InstanceOf { dst: Register, left: Register, right: Register },
    /// r[dst] = r[left] in r[right]
    IsIn { dst: Register, left: Register, right: Register },

    Negate { dst: Register, src: Register },
    Not { dst: Register, src: Register },
    BitNot { dst: Register, src: Register },
    TypeOf { dst: Register, src: Register },
    ToNumeric { dst: Register, src: Register },
    Inc { dst: Register, src: Register },
    Dec { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Control Flow
    // ═══════════════════════════════════════════════════════════════════════════════
    Jmp { target: JumpTarget },
    JmpTrue { cond: Register, target: JumpTarget },
    JmpFalse { cond: Register, target: JumpTarget },
    JmpUndefined { cond: Register, target: JumpTarget },
    JmpNullish { cond: Register, target: JumpTarget },
    /// Dense integer switch through `jump_tables[table]`; non-integers and
    /// out-of-range values go to `default`.
    SwitchImm { value: Register, table: u16, default: JumpTarget },
    /// String switch through `string_tables[table]`
    StringSwitch { value: Register, table: u16, default: JumpTarget },
    Ret { value: Register },
    Throw { value: Register },
    /// First instruction of a handler: r[dst] = the caught value
    Catch { dst: Register },
    Debugger,
    Nop,
    Unreachable,

    // ═══════════════════════════════════════════════════════════════════════════════
    // Environments
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = new environment for `scopes[scope]`. With no `parent` the
    /// running closure's captured environment is the parent.
    CreateEnvironment { dst: Register, parent: Option<Register>, scope: u16 },
    /// r[dst] = the closure environment, `level` parents up
    GetEnvironment { dst: Register, level: u8 },
    LoadFromEnvironment { dst: Register, env: Register, slot: u16 },
    StoreToEnvironment { env: Register, slot: u16, value: Register },
    /// r[dst] = r[src], or ReferenceError if r[src] is empty
    ThrowIfEmpty { dst: Register, src: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Objects & Properties
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = r[obj][constants[key]]
    GetById { dst: Register, obj: Register, key: ConstantIndex, cache: CacheIndex },
    /// Like GetById, but a missing property is a ReferenceError (global reads)
    TryGetById { dst: Register, obj: Register, key: ConstantIndex, cache: CacheIndex },
    PutById { obj: Register, key: ConstantIndex, value: Register, cache: CacheIndex },
    /// Like PutById, but strict code may not create a missing global
    TryPutById { obj: Register, key: ConstantIndex, value: Register, cache: CacheIndex },
    /// Define an own data property that is known not to exist yet
    PutNewOwnById { obj: Register, key: ConstantIndex, value: Register, enumerable: bool },
    GetByVal { dst: Register, obj: Register, key: Register },
    PutByVal { obj: Register, key: Register, value: Register },
    DelById { dst: Register, obj: Register, key: ConstantIndex },
    DelByVal { dst: Register, obj: Register, key: Register },
    PutOwnByIndex { obj: Register, index: u32, value: Register },
    /// Define an accessor; `getter`/`setter` registers holding undefined mean absent
    PutOwnGetterSetter {
        obj: Register,
        key: Register,
        getter: Register,
        setter: Register,
        enumerable: bool,
    },
    NewObject { dst: Register },
    NewObjectWithParent { dst: Register, parent: Register },
    /// r[dst] = [] with room for `size` elements
    NewArray { dst: Register, size: u16 },
    /// Create global `var` binding `constants[name]` if absent
    DeclareGlobalVar { name: ConstantIndex },
    /// Stamp `this` with the cached class for the property list
    /// `constants[keys]`; slots are filled by the stores that follow.
    CacheNewObject { this: Register, keys: ConstantIndex, cache: CacheIndex },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Functions & Calls
    // ═══════════════════════════════════════════════════════════════════════════════
    /// r[dst] = closure over `constants[chunk]` capturing r[env] (if any)
    CreateClosure { dst: Register, env: Option<Register>, chunk: ConstantIndex },
    /// r[dst] = class constructor from `constants[chunk]`, r[proto_dst] =
    /// its prototype object. `fields` is the instance-field initializer.
    CreateClass {
        dst: Register,
        proto_dst: Register,
        env: Option<Register>,
        chunk: ConstantIndex,
        super_class: Option<Register>,
        fields: Option<Register>,
    },
    /// r[dst] = r[callee].call(r[this], r[args_start..args_start + argc])
    Call { dst: Register, callee: Register, this: Register, args_start: Register, argc: u8 },
    /// Fixed-arity calls; the number counts `this`
    Call1 { dst: Register, callee: Register, this: Register },
    Call2 { dst: Register, callee: Register, this: Register, arg0: Register },
    Call3 { dst: Register, callee: Register, this: Register, arg0: Register, arg1: Register },
    Call4 {
        dst: Register,
        callee: Register,
        this: Register,
        arg0: Register,
        arg1: Register,
        arg2: Register,
    },
    /// Arguments taken from the array-like in r[args]
    CallWithArgs { dst: Register, callee: Register, this: Register, args: Register },
    Construct { dst: Register, callee: Register, args_start: Register, argc: u8 },
    /// super(...) inside a derived constructor; r[dst] = the bound this
    CallSuper { dst: Register, args_start: Register, argc: u8 },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Generators & Async
    // ═══════════════════════════════════════════════════════════════════════════════
    /// Suspend, producing r[value]; execution continues at `resume`
    Yield { value: Register, resume: JumpTarget },
    /// Suspend until r[value] settles; execution continues at `resume`
    Await { value: Register, resume: JumpTarget },
    /// r[dst] = the value sent by the resumer. A `throw()` resumption throws
    /// here; r[is_return] is true for a `return()` resumption.
    ResumeGenerator { dst: Register, is_return: Register },

    // ═══════════════════════════════════════════════════════════════════════════════
    // Iteration
    // ═══════════════════════════════════════════════════════════════════════════════
    GetIterator { dst: Register, src: Register },
    GetAsyncIterator { dst: Register, src: Register },
    /// Call r[iter].next(); r[value], r[done] = result fields
    IteratorNext { value: Register, done: Register, iter: Register },
    /// Call r[iter].return() if present. On the throw path errors from
    /// `return` are discarded.
    IteratorClose { iter: Register, on_throw: bool },
}

impl Op {
    /// Whether this op can end straight-line execution
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Jmp { .. }
                | Op::JmpTrue { .. }
                | Op::JmpFalse { .. }
                | Op::JmpUndefined { .. }
                | Op::JmpNullish { .. }
                | Op::SwitchImm { .. }
                | Op::StringSwitch { .. }
                | Op::Ret { .. }
                | Op::Throw { .. }
                | Op::Yield { .. }
                | Op::Await { .. }
                | Op::Unreachable
        )
    }

    /// Whether this op may run arbitrary JS (calls, getters, setters)
    pub fn may_call(&self) -> bool {
        !matches!(
            self,
            Op::LoadConst { .. }
                | Op::LoadInt { .. }
                | Op::LoadUndefined { .. }
                | Op::LoadNull { .. }
                | Op::LoadBool { .. }
                | Op::LoadEmpty { .. }
                | Op::Mov { .. }
                | Op::LoadParam { .. }
                | Op::GetArgumentsLength { .. }
                | Op::LoadThis { .. }
                | Op::GetNewTarget { .. }
                | Op::GetGlobalObject { .. }
                | Op::LoadCallee { .. }
                | Op::StrictEq { .. }
                | Op::StrictNeq { .. }
                | Op::Not { .. }
                | Op::TypeOf { .. }
                | Op::Nop
                | Op::CreateEnvironment { .. }
                | Op::GetEnvironment { .. }
                | Op::LoadFromEnvironment { .. }
                | Op::StoreToEnvironment { .. }
                | Op::ThrowIfEmpty { .. }
                | Op::PutNewOwnById { .. }
                | Op::NewObject { .. }
                | Op::NewObjectWithParent { .. }
                | Op::NewArray { .. }
                | Op::CacheNewObject { .. }
                | Op::CreateClosure { .. }
        )
    }

    /// Jump targets named directly by this op
    pub fn jump_targets(&self) -> Vec<JumpTarget> {
        match self {
            Op::Jmp { target }
            | Op::JmpTrue { target, .. }
            | Op::JmpFalse { target, .. }
            | Op::JmpUndefined { target, .. }
            | Op::JmpNullish { target, .. } => vec![*target],
            Op::SwitchImm { default, .. } | Op::StringSwitch { default, .. } => vec![*default],
            Op::Yield { resume, .. } | Op::Await { resume, .. } => vec![*resume],
            _ => Vec::new(),
        }
    }

    /// Redirect every direct jump target through `f`
    pub fn map_targets(&mut self, mut f: impl FnMut(JumpTarget) -> JumpTarget) {
        match self {
            Op::Jmp { target }
            | Op::JmpTrue { target, .. }
            | Op::JmpFalse { target, .. }
            | Op::JmpUndefined { target, .. }
            | Op::JmpNullish { target, .. } => *target = f(*target),
            Op::SwitchImm { default, .. } | Op::StringSwitch { default, .. } => {
                *default = f(*default)
            }
            Op::Yield { resume, .. } | Op::Await { resume, .. } => *resume = f(*resume),
            _ => {}
        }
    }

    /// Every register operand, for verification
    pub fn registers(&self) -> Vec<Register> {
        use Op::*;
        match self {
            LoadConst { dst, .. }
            | LoadInt { dst, .. }
            | LoadUndefined { dst }
            | LoadNull { dst }
            | LoadBool { dst, .. }
            | LoadEmpty { dst }
            | LoadParam { dst, .. }
            | GetArgumentsLength { dst }
            | ReifyArguments { dst }
            | LoadThis { dst }
            | GetNewTarget { dst }
            | GetGlobalObject { dst }
            | LoadCallee { dst }
            | Catch { dst }
            | GetEnvironment { dst, .. }
            | NewObject { dst }
            | NewArray { dst, .. } => vec![*dst],
            Mov { dst, src }
            | CoerceThisNS { dst, src }
            | Negate { dst, src }
            | Not { dst, src }
            | BitNot { dst, src }
            | TypeOf { dst, src }
            | ToNumeric { dst, src }
            | Inc { dst, src }
            | Dec { dst, src }
            | ThrowIfEmpty { dst, src }
            | GetIterator { dst, src }
            | GetAsyncIterator { dst, src } => vec![*dst, *src],
            Add { dst, left, right }
            | Sub { dst, left, right }
            | Mul { dst, left, right }
            | Div { dst, left, right }
            | Mod { dst, left, right }
            | Exp { dst, left, right }
            | BitAnd { dst, left, right }
            | BitOr { dst, left, right }
            | BitXor { dst, left, right }
            | LShift { dst, left, right }
            | RShift { dst, left, right }
            | URShift { dst, left, right }
            | Eq { dst, left, right }
            | Neq { dst, left, right }
            | StrictEq { dst, left, right }
            | StrictNeq { dst, left, right }
            | Less { dst, left, right }
            | LessEq { dst, left, right }
            | Greater { dst, left, right }
            | GreaterEq { dst, left, right }
            | InstanceOf { dst, left, right }
            | IsIn { dst, left, right } => vec![*dst, *left, *right],
            Jmp { .. } | Debugger | Nop | Unreachable | DeclareGlobalVar { .. } => Vec::new(),
            JmpTrue { cond, .. }
            | JmpFalse { cond, .. }
            | JmpUndefined { cond, .. }
            | JmpNullish { cond, .. } => vec![*cond],
            SwitchImm { value, .. }
            | StringSwitch { value, .. }
            | Ret { value }
            | Throw { value }
            | Yield { value, .. }
            | Await { value, .. } => vec![*value],
            CreateEnvironment { dst, parent, .. } => {
                let mut regs = vec![*dst];
                regs.extend(parent);
                regs
            }
            LoadFromEnvironment { dst, env, .. } => vec![*dst, *env],
            StoreToEnvironment { env, value, .. } => vec![*env, *value],
            GetById { dst, obj, .. } | TryGetById { dst, obj, .. } => vec![*dst, *obj],
            PutById { obj, value, .. }
            | TryPutById { obj, value, .. }
            | PutNewOwnById { obj, value, .. }
            | PutOwnByIndex { obj, value, .. } => vec![*obj, *value],
            GetByVal { dst, obj, key } | DelByVal { dst, obj, key } => vec![*dst, *obj, *key],
            PutByVal { obj, key, value } => vec![*obj, *key, *value],
            DelById { dst, obj, .. } => vec![*dst, *obj],
            PutOwnGetterSetter {
                obj,
                key,
                getter,
                setter,
                ..
            } => vec![*obj, *key, *getter, *setter],
            NewObjectWithParent { dst, parent } => vec![*dst, *parent],
            CacheNewObject { this, .. } => vec![*this],
            CreateClosure { dst, env, .. } => {
                let mut regs = vec![*dst];
                regs.extend(env);
                regs
            }
            CreateClass {
                dst,
                proto_dst,
                env,
                super_class,
                fields,
                ..
            } => {
                let mut regs = vec![*dst, *proto_dst];
                regs.extend(env);
                regs.extend(super_class);
                regs.extend(fields);
                regs
            }
            Call {
                dst,
                callee,
                this,
                args_start,
                argc,
            } => {
                let mut regs = vec![*dst, *callee, *this];
                if *argc > 0 {
                    regs.push(*args_start);
                    regs.push(args_start.saturating_add(*argc - 1));
                }
                regs
            }
            Call1 { dst, callee, this } => vec![*dst, *callee, *this],
            Call2 {
                dst,
                callee,
                this,
                arg0,
            } => vec![*dst, *callee, *this, *arg0],
            Call3 {
                dst,
                callee,
                this,
                arg0,
                arg1,
            } => vec![*dst, *callee, *this, *arg0, *arg1],
            Call4 {
                dst,
                callee,
                this,
                arg0,
                arg1,
                arg2,
            } => vec![*dst, *callee, *this, *arg0, *arg1, *arg2],
            CallWithArgs {
                dst,
                callee,
                this,
                args,
            } => vec![*dst, *callee, *this, *args],
            Construct {
                dst,
                callee,
                args_start,
                argc,
            } => {
                let mut regs = vec![*dst, *callee];
                if *argc > 0 {
                    regs.push(*args_start);
                    regs.push(args_start.saturating_add(*argc - 1));
                }
                regs
            }
            CallSuper {
                dst,
                args_start,
                argc,
            } => {
                let mut regs = vec![*dst];
                if *argc > 0 {
                    regs.push(*args_start);
                    regs.push(args_start.saturating_add(*argc - 1));
                }
                regs
            }
            ResumeGenerator { dst, is_return } => vec![*dst, *is_return],
            IteratorNext { value, done, iter } => vec![*value, *done, *iter],
            IteratorClose { iter, .. } => vec![*iter],
        }
    }
}
