//! Closure and environment chain tests

use super::{closure, closure_in, create_test_runtime, eval, eval_in, function, load_num, load_str, str_value};
use regvm::JsValue;
use regvm::bytecode::{FunctionKind, Op, ScopeDescriptor, SlotKind};

#[test]
fn test_counter_closure_keeps_state_between_calls() {
    let mut interp = create_test_runtime();
    let counter = eval_in(&mut interp, |b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Var]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope,
        });
        load_num(b, 1, 0.0);
        b.emit(Op::StoreToEnvironment {
            env: 0,
            slot: 0,
            value: 1,
        });
        let bump = function("bump", 0, FunctionKind::Normal, |b| {
            b.emit(Op::GetEnvironment { dst: 0, level: 0 });
            b.emit(Op::LoadFromEnvironment {
                dst: 1,
                env: 0,
                slot: 0,
            });
            b.emit(Op::Inc { dst: 1, src: 1 });
            b.emit(Op::StoreToEnvironment {
                env: 0,
                slot: 0,
                value: 1,
            });
            b.emit(Op::Ret { value: 1 });
        });
        closure_in(b, 2, 0, bump);
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();

    for expected in 1..=3 {
        interp.collect_garbage();
        let value = interp.call_function(&counter, JsValue::Undefined, &[]).unwrap();
        assert_eq!(value, JsValue::Number(expected as f64));
    }
}

#[test]
fn test_environment_chain_levels() {
    let result = eval(|b| {
        let outer = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Var]));
        let inner = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        b.emit(Op::CreateEnvironment {
            dst: 0,
            parent: None,
            scope: outer,
        });
        load_num(b, 1, 40.0);
        b.emit(Op::StoreToEnvironment {
            env: 0,
            slot: 0,
            value: 1,
        });
        b.emit(Op::CreateEnvironment {
            dst: 2,
            parent: Some(0),
            scope: inner,
        });
        load_num(b, 1, 2.0);
        b.emit(Op::StoreToEnvironment {
            env: 2,
            slot: 0,
            value: 1,
        });
        let sum = function("sum", 0, FunctionKind::Normal, |b| {
            b.emit(Op::GetEnvironment { dst: 0, level: 0 });
            b.emit(Op::GetEnvironment { dst: 1, level: 1 });
            b.emit(Op::LoadFromEnvironment {
                dst: 2,
                env: 0,
                slot: 0,
            });
            b.emit(Op::LoadFromEnvironment {
                dst: 3,
                env: 1,
                slot: 0,
            });
            b.emit(Op::Add {
                dst: 2,
                left: 2,
                right: 3,
            });
            b.emit(Op::Ret { value: 2 });
        });
        closure_in(b, 3, 2, sum);
        b.emit(Op::LoadUndefined { dst: 4 });
        b.emit(Op::Call1 {
            dst: 5,
            callee: 3,
            this: 4,
        });
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(42.0));
}

#[test]
fn test_each_iteration_captures_its_own_binding() {
    // for (let i = 0; i < 3; i++) fns[i] = () => i;  fns.map(f => f()).join("")
    let result = eval(|b| {
        let scope = b.add_scope(ScopeDescriptor::new(vec![SlotKind::Lexical]));
        let read = function("read", 0, FunctionKind::Arrow, |b| {
            b.emit(Op::GetEnvironment { dst: 0, level: 0 });
            b.emit(Op::LoadFromEnvironment {
                dst: 1,
                env: 0,
                slot: 0,
            });
            b.emit(Op::ThrowIfEmpty { dst: 1, src: 1 });
            b.emit(Op::Ret { value: 1 });
        });
        let read = b.add_function(read).unwrap();

        b.emit(Op::NewArray { dst: 0, size: 3 });
        load_num(b, 1, 0.0);
        load_num(b, 2, 3.0);
        let top = b.new_label();
        let done = b.new_label();
        b.bind_label(top);
        b.emit(Op::Less {
            dst: 3,
            left: 1,
            right: 2,
        });
        b.emit_jmp_false(3, done);
        b.emit(Op::CreateEnvironment {
            dst: 4,
            parent: None,
            scope,
        });
        b.emit(Op::StoreToEnvironment {
            env: 4,
            slot: 0,
            value: 1,
        });
        b.emit(Op::CreateClosure {
            dst: 5,
            env: Some(4),
            chunk: read,
        });
        b.emit(Op::PutByVal {
            obj: 0,
            key: 1,
            value: 5,
        });
        b.emit(Op::Inc { dst: 1, src: 1 });
        b.emit_jmp(top);
        b.bind_label(done);

        load_str(b, 6, "");
        b.emit(Op::LoadUndefined { dst: 7 });
        load_num(b, 1, 0.0);
        let again = b.new_label();
        let end = b.new_label();
        b.bind_label(again);
        b.emit(Op::Less {
            dst: 3,
            left: 1,
            right: 2,
        });
        b.emit_jmp_false(3, end);
        b.emit(Op::GetByVal {
            dst: 5,
            obj: 0,
            key: 1,
        });
        b.emit(Op::Call1 {
            dst: 8,
            callee: 5,
            this: 7,
        });
        b.emit(Op::Add {
            dst: 6,
            left: 6,
            right: 8,
        });
        b.emit(Op::Inc { dst: 1, src: 1 });
        b.emit_jmp(again);
        b.bind_label(end);
        b.emit(Op::Ret { value: 6 });
    })
    .unwrap();
    assert_eq!(result, str_value("012"));
}

#[test]
fn test_arrow_functions_ignore_call_receiver() {
    let result = eval(|b| {
        let arrow = function("arrow", 0, FunctionKind::Arrow, |b| {
            b.emit(Op::LoadThis { dst: 0 });
            b.emit(Op::TypeOf { dst: 0, src: 0 });
            b.emit(Op::Ret { value: 0 });
        });
        closure(b, 0, arrow);
        b.emit(Op::NewObject { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();
    assert_eq!(result, str_value("undefined"));
}

#[test]
fn test_load_callee_supports_self_reference() {
    let result = eval(|b| {
        let named = function("named", 0, FunctionKind::Normal, |b| {
            b.emit(Op::LoadCallee { dst: 0 });
            b.emit_get_by_id(0, 0, "name").unwrap();
            b.emit(Op::Ret { value: 0 });
        });
        closure(b, 0, named);
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();
    assert_eq!(result, str_value("named"));
}
