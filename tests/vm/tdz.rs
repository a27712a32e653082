//! Temporal dead zone tests

use super::{closure_in, create_test_runtime, eval, function, load_num, native_message, str_value};
use regvm::JsValue;
use regvm::bytecode::{FunctionKind, Op, ScopeDescriptor, SlotKind};

/// Reads slot 0 of its closure environment with a TDZ check
fn reader() -> regvm::BytecodeChunk {
    function("read", 0, FunctionKind::Normal, |b| {
        b.emit(Op::GetEnvironment { dst: 0, level: 0 });
        b.emit(Op::LoadFromEnvironment {
            dst: 1,
            env: 0,
            slot: 0,
        });
        b.emit(Op::ThrowIfEmpty { dst: 1, src: 1 });
        b.emit(Op::Ret { value: 1 });
    })
}

#[test]
fn test_let_read_before_initialization_throws() {
    let result = eval(|b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        b.emit(Op::LoadFromEnvironment {
            dst: 1,
            env: 0,
            slot: 0,
        });
        b.emit(Op::ThrowIfEmpty { dst: 1, src: 1 });
        b.emit(Op::Ret { value: 1 });
    });
    let (name, message) = native_message(result);
    assert_eq!(name, "ReferenceError");
    assert_eq!(message, "accessing an uninitialized variable");
}

#[test]
fn test_let_read_after_initialization() {
    let result = eval(|b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        load_num(b, 1, 7.0);
        b.emit(Op::StoreToEnvironment {
            env: 0,
            slot: 0,
            value: 1,
        });
        b.emit(Op::LoadFromEnvironment {
            dst: 2,
            env: 0,
            slot: 0,
        });
        b.emit(Op::ThrowIfEmpty { dst: 2, src: 2 });
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(7.0));
}

#[test]
fn test_var_slots_start_undefined() {
    let result = eval(|b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical, SlotKind::Var]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        b.emit(Op::LoadFromEnvironment {
            dst: 1,
            env: 0,
            slot: 1,
        });
        b.emit(Op::ThrowIfEmpty { dst: 1, src: 1 });
        b.emit(Op::TypeOf { dst: 1, src: 1 });
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(result, str_value("undefined"));
}

#[test]
fn test_closure_sees_binding_leave_dead_zone() {
    // The first call happens before the store and must throw; the second
    // happens after it and must see the value.
    let result = eval(|b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        closure_in(b, 1, 0, reader());
        b.emit(Op::LoadUndefined { dst: 2 });

        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::Call1 {
            dst: 3,
            callee: 1,
            this: 2,
        });
        b.end_try(region, handler);
        b.emit_load_string(3, "no error").unwrap();
        b.emit(Op::Ret { value: 3 });

        b.bind_label(handler);
        b.emit(Op::Catch { dst: 4 });
        b.emit_get_by_id(5, 4, "name").unwrap();
        load_num(b, 6, 7.0);
        b.emit(Op::StoreToEnvironment {
            env: 0,
            slot: 0,
            value: 6,
        });
        b.emit(Op::Call1 {
            dst: 3,
            callee: 1,
            this: 2,
        });
        b.emit(Op::Add {
            dst: 5,
            left: 5,
            right: 3,
        });
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, str_value("ReferenceError7"));
}

#[test]
fn test_dead_zone_error_is_catchable_and_materialized() {
    let mut interp = create_test_runtime();
    let result = super::eval_in(&mut interp, |b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::LoadFromEnvironment {
            dst: 1,
            env: 0,
            slot: 0,
        });
        b.emit(Op::ThrowIfEmpty { dst: 1, src: 1 });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 1 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 2 });
        super::load_global(b, 3, "ReferenceError");
        b.emit(Op::InstanceOf {
            dst: 4,
            left: 2,
            right: 3,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Boolean(true));
}
