//! Realm intrinsics and the minimal standard library
//!
//! `Realm::allocate` creates the prototype objects every other part of the
//! interpreter refers to by id. `install` then fills them with methods and
//! binds the constructors on the global object.

pub mod array;
pub mod error;
pub mod function;
pub mod generator;
pub mod global;
pub mod map;
pub mod object;
pub mod primitive;
pub mod promise;
pub mod set;

use crate::error::JsError;
use crate::gc::{Heap, ObjectId};
use crate::object::function::{Callable, NativeCtor, NativeFn, NativeFunction};
use crate::object::shape::{ClassTable, PropertyFlags};
use crate::object::{JsObject, ObjectKind};
use crate::string_dict::StringDict;
use crate::value::{CheapClone, JsSymbol, JsValue, PropertyKey};

use super::Interpreter;

/// Symbol ids below this are the well-known symbols
pub const FIRST_USER_SYMBOL_ID: u64 = 3;

/// Intrinsic objects shared by the whole interpreter
pub struct Realm {
    pub global: ObjectId,
    pub object_prototype: ObjectId,
    pub function_prototype: ObjectId,
    pub array_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub number_prototype: ObjectId,
    pub boolean_prototype: ObjectId,
    pub symbol_prototype: ObjectId,
    pub bigint_prototype: ObjectId,
    pub error_prototype: ObjectId,
    pub type_error_prototype: ObjectId,
    pub range_error_prototype: ObjectId,
    pub reference_error_prototype: ObjectId,
    pub syntax_error_prototype: ObjectId,
    pub iterator_prototype: ObjectId,
    pub async_iterator_prototype: ObjectId,
    pub array_iterator_prototype: ObjectId,
    pub map_iterator_prototype: ObjectId,
    pub set_iterator_prototype: ObjectId,
    pub generator_prototype: ObjectId,
    pub async_generator_prototype: ObjectId,
    pub promise_prototype: ObjectId,
    pub map_prototype: ObjectId,
    pub set_prototype: ObjectId,
    /// `Array.prototype.values`, also the `@@iterator` of arguments objects
    pub array_values: ObjectId,
    pub iterator_symbol: JsSymbol,
    pub async_iterator_symbol: JsSymbol,
}

impl Realm {
    pub(crate) fn allocate(
        heap: &mut Heap<JsObject>,
        classes: &mut ClassTable,
        strings: &mut StringDict,
    ) -> Self {
        let root = classes.root();
        let mut alloc =
            |proto: Option<ObjectId>, kind: ObjectKind| heap.alloc(JsObject::new(proto, root, kind));

        let object_prototype = alloc(None, ObjectKind::Ordinary);
        let op = Some(object_prototype);
        let function_prototype = alloc(
            op,
            ObjectKind::Function(Callable::Native(NativeFunction {
                name: strings.intern(""),
                call: function::function_prototype_call,
                construct: None,
            })),
        );
        let error_prototype = alloc(op, ObjectKind::Ordinary);
        let iterator_prototype = alloc(op, ObjectKind::Ordinary);
        let async_iterator_prototype = alloc(op, ObjectKind::Ordinary);
        let array_values = alloc(
            Some(function_prototype),
            ObjectKind::Function(Callable::Native(NativeFunction {
                name: strings.intern("values"),
                call: array::array_values,
                construct: None,
            })),
        );

        Realm {
            global: alloc(op, ObjectKind::Ordinary),
            object_prototype,
            function_prototype,
            array_prototype: alloc(op, ObjectKind::Array),
            string_prototype: alloc(op, ObjectKind::Ordinary),
            number_prototype: alloc(op, ObjectKind::Ordinary),
            boolean_prototype: alloc(op, ObjectKind::Ordinary),
            symbol_prototype: alloc(op, ObjectKind::Ordinary),
            bigint_prototype: alloc(op, ObjectKind::Ordinary),
            error_prototype,
            type_error_prototype: alloc(Some(error_prototype), ObjectKind::Ordinary),
            range_error_prototype: alloc(Some(error_prototype), ObjectKind::Ordinary),
            reference_error_prototype: alloc(Some(error_prototype), ObjectKind::Ordinary),
            syntax_error_prototype: alloc(Some(error_prototype), ObjectKind::Ordinary),
            iterator_prototype,
            async_iterator_prototype,
            array_iterator_prototype: alloc(Some(iterator_prototype), ObjectKind::Ordinary),
            map_iterator_prototype: alloc(Some(iterator_prototype), ObjectKind::Ordinary),
            set_iterator_prototype: alloc(Some(iterator_prototype), ObjectKind::Ordinary),
            generator_prototype: alloc(Some(iterator_prototype), ObjectKind::Ordinary),
            async_generator_prototype: alloc(Some(async_iterator_prototype), ObjectKind::Ordinary),
            promise_prototype: alloc(op, ObjectKind::Ordinary),
            map_prototype: alloc(op, ObjectKind::Ordinary),
            set_prototype: alloc(op, ObjectKind::Ordinary),
            array_values,
            iterator_symbol: JsSymbol::new(1, Some(strings.intern("Symbol.iterator"))),
            async_iterator_symbol: JsSymbol::new(2, Some(strings.intern("Symbol.asyncIterator"))),
        }
    }

    /// GC roots held by the realm
    pub fn objects(&self) -> Vec<ObjectId> {
        vec![
            self.global,
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.string_prototype,
            self.number_prototype,
            self.boolean_prototype,
            self.symbol_prototype,
            self.bigint_prototype,
            self.error_prototype,
            self.type_error_prototype,
            self.range_error_prototype,
            self.reference_error_prototype,
            self.syntax_error_prototype,
            self.iterator_prototype,
            self.async_iterator_prototype,
            self.array_iterator_prototype,
            self.map_iterator_prototype,
            self.set_iterator_prototype,
            self.generator_prototype,
            self.async_generator_prototype,
            self.promise_prototype,
            self.map_prototype,
            self.set_prototype,
            self.array_values,
        ]
    }
}

/// Populate the realm and the global object
pub(crate) fn install(interp: &mut Interpreter) {
    object::install(interp);
    function::install(interp);
    array::install(interp);
    error::install(interp);
    primitive::install(interp);
    map::install(interp);
    set::install(interp);
    promise::install(interp);
    generator::install(interp);
    global::install(interp);
}

/// Argument `index`, or undefined
pub(crate) fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).map(CheapClone::cheap_clone).unwrap_or(JsValue::Undefined)
}

/// Create a constructor bound to `prototype` and publish it as a global
pub(crate) fn register_constructor(
    interp: &mut Interpreter,
    name: &str,
    call: NativeFn,
    construct: Option<NativeCtor>,
    arity: usize,
    prototype: ObjectId,
) -> ObjectId {
    let ctor = interp.create_native_function(name, call, arity, construct);
    let proto_key = interp.key("prototype");
    interp.define_raw(ctor, proto_key, JsValue::Object(prototype), PropertyFlags::READONLY_HIDDEN);
    let ctor_key = interp.key("constructor");
    interp.define_raw(prototype, ctor_key, JsValue::Object(ctor), PropertyFlags::HIDDEN);
    let global = interp.realm.global;
    let name_key = interp.key(name);
    interp.define_raw(global, name_key, JsValue::Object(ctor), PropertyFlags::HIDDEN);
    ctor
}

/// Define a non-enumerable data property
pub(crate) fn define_hidden(interp: &mut Interpreter, target: ObjectId, name: &str, value: JsValue) {
    let key = interp.key(name);
    interp.define_raw(target, key, value, PropertyFlags::HIDDEN);
}

/// Native that only works with `new`
pub(crate) fn requires_new(name: &str) -> JsError {
    JsError::type_error(format!("Constructor {} requires 'new'", name))
}

/// Register a method keyed by a well-known symbol
pub(crate) fn register_iterator_method(
    interp: &mut Interpreter,
    target: ObjectId,
    name: &str,
    func: NativeFn,
    async_iterator: bool,
) {
    let symbol = if async_iterator {
        interp.realm.async_iterator_symbol.cheap_clone()
    } else {
        interp.realm.iterator_symbol.cheap_clone()
    };
    interp.register_symbol_method(target, &symbol, name, func);
}

/// Property key for a well-known symbol
pub(crate) fn iterator_key(interp: &Interpreter) -> PropertyKey {
    PropertyKey::Symbol(interp.realm.iterator_symbol.cheap_clone())
}
