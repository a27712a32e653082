//! Call protocol tests

use super::{
    closure, create_test_runtime, eval, eval_in, function, load_global, load_num, load_str,
    native_message, str_value, test_config,
};
use regvm::bytecode::{BytecodeBuilder, FunctionInfo, FunctionKind, Op, Register};
use regvm::{Interpreter, JsError, JsValue, RuntimeConfig};

/// r[dst] = r[callee]() with an undefined receiver
fn call_undefined(b: &mut BytecodeBuilder, dst: Register, callee: Register, scratch: Register) {
    b.emit(Op::LoadUndefined { dst: scratch });
    b.emit(Op::Call1 {
        dst,
        callee,
        this: scratch,
    });
}

fn not_a_function(load: impl FnOnce(&mut BytecodeBuilder)) -> String {
    let result = eval(|b| {
        load(b);
        call_undefined(b, 1, 0, 2);
        b.emit(Op::Ret { value: 1 });
    });
    let (name, message) = native_message(result);
    assert_eq!(name, "TypeError");
    message
}

#[test]
fn test_not_a_function_messages() {
    assert_eq!(
        not_a_function(|b| {
            b.emit(Op::LoadUndefined { dst: 0 });
        }),
        "undefined is not a function"
    );
    assert_eq!(
        not_a_function(|b| load_str(b, 0, "asdf")),
        "\"asdf\" is not a function"
    );
    assert_eq!(
        not_a_function(|b| {
            b.emit(Op::LoadNull { dst: 0 });
        }),
        "null is not a function"
    );
    assert_eq!(not_a_function(|b| load_num(b, 0, 1.5)), "1.5 is not a function");
    assert_eq!(
        not_a_function(|b| {
            b.emit(Op::LoadBool { dst: 0, value: true });
        }),
        "true is not a function"
    );
    assert_eq!(
        not_a_function(|b| {
            b.emit(Op::NewObject { dst: 0 });
        }),
        "Object is not a function"
    );
    assert_eq!(
        not_a_function(|b| {
            b.emit_load_bigint(0, 3).unwrap();
        }),
        "Value is not a function"
    );
}

fn add3() -> regvm::BytecodeChunk {
    function("add3", 3, FunctionKind::Normal, |b| {
        b.emit(Op::LoadParam { dst: 0, index: 0 });
        b.emit(Op::LoadParam { dst: 1, index: 1 });
        b.emit(Op::LoadParam { dst: 2, index: 2 });
        b.emit(Op::Add {
            dst: 0,
            left: 0,
            right: 1,
        });
        b.emit(Op::Add {
            dst: 0,
            left: 0,
            right: 2,
        });
        b.emit(Op::Ret { value: 0 });
    })
}

#[test]
fn test_call_with_register_window() {
    let result = eval(|b| {
        closure(b, 0, add3());
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 1.0);
        load_num(b, 3, 2.0);
        load_num(b, 4, 3.0);
        b.emit(Op::Call {
            dst: 5,
            callee: 0,
            this: 1,
            args_start: 2,
            argc: 3,
        });
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(6.0));
}

#[test]
fn test_fixed_arity_calls_count_the_receiver() {
    let result = eval(|b| {
        closure(b, 0, add3());
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 10.0);
        load_num(b, 3, 20.0);
        load_num(b, 4, 30.0);
        b.emit(Op::Call4 {
            dst: 5,
            callee: 0,
            this: 1,
            arg0: 2,
            arg1: 3,
            arg2: 4,
        });
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(60.0));
}

#[test]
fn test_missing_parameters_read_undefined() {
    let result = eval(|b| {
        let second = function("second", 2, FunctionKind::Normal, |b| {
            b.emit(Op::LoadParam { dst: 0, index: 1 });
            b.emit(Op::TypeOf { dst: 0, src: 0 });
            b.emit(Op::Ret { value: 0 });
        });
        closure(b, 0, second);
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 1.0);
        b.emit(Op::Call2 {
            dst: 3,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.emit(Op::Ret { value: 3 });
    })
    .unwrap();
    assert_eq!(result, str_value("undefined"));
}

#[test]
fn test_arguments_object_and_length() {
    let result = eval(|b| {
        let count = function("count", 0, FunctionKind::Normal, |b| {
            b.emit(Op::ReifyArguments { dst: 0 });
            b.emit_get_by_id(1, 0, "length").unwrap();
            b.emit(Op::GetArgumentsLength { dst: 2 });
            load_num(b, 3, 1.0);
            b.emit(Op::GetByVal {
                dst: 3,
                obj: 0,
                key: 3,
            });
            // length * 100 + argc * 10 + arguments[1]
            load_num(b, 4, 100.0);
            b.emit(Op::Mul {
                dst: 1,
                left: 1,
                right: 4,
            });
            load_num(b, 4, 10.0);
            b.emit(Op::Mul {
                dst: 2,
                left: 2,
                right: 4,
            });
            b.emit(Op::Add {
                dst: 1,
                left: 1,
                right: 2,
            });
            b.emit(Op::Add {
                dst: 1,
                left: 1,
                right: 3,
            });
            b.emit(Op::Ret { value: 1 });
        });
        closure(b, 0, count);
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 5.0);
        load_num(b, 3, 7.0);
        b.emit(Op::Call3 {
            dst: 4,
            callee: 0,
            this: 1,
            arg0: 2,
            arg1: 3,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(227.0));
}

fn fib() -> regvm::BytecodeChunk {
    function("fib", 1, FunctionKind::Normal, |b| {
        let recurse = b.new_label();
        b.emit(Op::LoadParam { dst: 0, index: 0 });
        load_num(b, 1, 2.0);
        b.emit(Op::Less {
            dst: 2,
            left: 0,
            right: 1,
        });
        b.emit_jmp_false(2, recurse);
        b.emit(Op::Ret { value: 0 });
        b.bind_label(recurse);
        b.emit(Op::LoadCallee { dst: 3 });
        b.emit(Op::LoadUndefined { dst: 4 });
        b.emit(Op::Dec { dst: 5, src: 0 });
        b.emit(Op::Call2 {
            dst: 6,
            callee: 3,
            this: 4,
            arg0: 5,
        });
        b.emit(Op::Dec { dst: 5, src: 5 });
        b.emit(Op::Call2 {
            dst: 7,
            callee: 3,
            this: 4,
            arg0: 5,
        });
        b.emit(Op::Add {
            dst: 6,
            left: 6,
            right: 7,
        });
        b.emit(Op::Ret { value: 6 });
    })
}

#[test]
fn test_recursive_calls() {
    let result = eval(|b| {
        closure(b, 0, fib());
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 15.0);
        b.emit(Op::Call2 {
            dst: 3,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.emit(Op::Ret { value: 3 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(610.0));
}

#[test]
fn test_host_calls_bytecode_function() {
    let mut interp = create_test_runtime();
    let f = eval_in(&mut interp, |b| {
        closure(b, 0, fib());
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    let result = interp
        .call_function(&f, JsValue::Undefined, &[JsValue::Number(10.0)])
        .unwrap();
    assert_eq!(result, JsValue::Number(55.0));
}

fn runaway() -> regvm::BytecodeChunk {
    function("runaway", 0, FunctionKind::Normal, |b| {
        b.emit(Op::LoadCallee { dst: 0 });
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.emit(Op::Ret { value: 2 });
    })
}

#[test]
fn test_stack_overflow_is_a_catchable_range_error() {
    let mut interp = Interpreter::with_config(RuntimeConfig {
        max_stack_depth: 64,
        ..test_config()
    });
    let result = eval_in(&mut interp, |b| {
        closure(b, 0, runaway());
        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 2 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 3 });
        b.emit_get_by_id(4, 3, "message").unwrap();
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, str_value("Maximum call stack size exceeded"));
}

#[test]
fn test_stack_overflow_without_handler_reaches_host() {
    let mut interp = Interpreter::with_config(RuntimeConfig {
        max_stack_depth: 64,
        ..test_config()
    });
    let result = eval_in(&mut interp, |b| {
        closure(b, 0, runaway());
        call_undefined(b, 1, 0, 2);
        b.emit(Op::Ret { value: 1 });
    });
    assert!(matches!(result, Err(JsError::RangeError { .. })));

    // The interpreter is usable again afterwards
    let again = eval_in(&mut interp, |b| {
        load_num(b, 0, 1.0);
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(again, JsValue::Number(1.0));
}

fn make_point(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let obj = interp.create_object();
    let x = args.first().cloned().unwrap_or(JsValue::Undefined);
    interp.set(obj, "x", x)?;
    Ok(JsValue::Object(obj))
}

#[test]
fn test_host_function_returns_fresh_object_per_call() {
    let mut interp = create_test_runtime();
    interp.register_global_function("makePoint", make_point, 1);
    let result = eval_in(&mut interp, |b| {
        load_global(b, 0, "makePoint");
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 3.0);
        b.emit(Op::Call2 {
            dst: 3,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.emit(Op::Call2 {
            dst: 4,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.emit(Op::StrictEq {
            dst: 5,
            left: 3,
            right: 4,
        });
        b.emit_get_by_id(6, 4, "x").unwrap();
        // (first === second) ? -1 : second.x
        let different = b.new_label();
        b.emit_jmp_false(5, different);
        load_num(b, 6, -1.0);
        b.bind_label(different);
        b.emit(Op::Ret { value: 6 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(3.0));
}

fn bump_hits(interp: &mut Interpreter, _this: JsValue, _args: &[JsValue]) -> Result<JsValue, JsError> {
    let stats = interp.get_global("stats")?;
    let Some(stats) = stats.as_object() else {
        return Err(JsError::type_error("stats is not an object"));
    };
    let hits = interp.get(&JsValue::Object(stats), "hits")?;
    let hits = hits.as_number().unwrap_or(0.0);
    interp.set(stats, "hits", JsValue::Number(hits + 1.0))?;
    Ok(JsValue::Undefined)
}

#[test]
fn test_host_function_mutates_existing_global() {
    let mut interp = create_test_runtime();
    let stats = interp.value_from_json(&serde_json::json!({ "hits": 0 }));
    interp.set_global("stats", stats).unwrap();
    interp.register_global_function("bump", bump_hits, 0);
    for _ in 0..3 {
        eval_in(&mut interp, |b| {
            load_global(b, 0, "bump");
            call_undefined(b, 1, 0, 2);
            b.emit(Op::Ret { value: 1 });
        })
        .unwrap();
    }
    let stats = interp.get_global("stats").unwrap();
    assert_eq!(interp.get(&stats, "hits").unwrap(), JsValue::Number(3.0));
}

fn reject_negative(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let n = args.first().and_then(JsValue::as_number).unwrap_or(0.0);
    if n < 0.0 {
        return Err(JsError::range_error("negative input"));
    }
    let _ = interp;
    Ok(JsValue::Number(n))
}

#[test]
fn test_host_function_errors_propagate_like_throws() {
    let mut interp = create_test_runtime();
    interp.register_global_function("check", reject_negative, 1);
    let result = eval_in(&mut interp, |b| {
        load_global(b, 0, "check");
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, -1.0);
        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::Call2 {
            dst: 3,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 3 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 4 });
        load_global(b, 5, "RangeError");
        b.emit(Op::InstanceOf {
            dst: 6,
            left: 4,
            right: 5,
        });
        b.emit(Op::Ret { value: 6 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Boolean(true));
}

#[test]
fn test_apply_with_collecting_getter() {
    // fn.apply(undefined, { length: 10, get 0() { gc(); return 10; } })
    // where fn returns arguments.length * 100 + arguments[0]
    let result = eval(|b| {
        let getter = function("get0", 0, FunctionKind::Method, |b| {
            load_global(b, 0, "gc");
            call_undefined(b, 1, 0, 2);
            // allocate after the collection so reuse of freed slots is observable
            b.emit(Op::NewObject { dst: 3 });
            load_num(b, 0, 10.0);
            b.emit(Op::Ret { value: 0 });
        });
        let target = function("target", 0, FunctionKind::Normal, |b| {
            b.emit(Op::GetArgumentsLength { dst: 0 });
            load_num(b, 1, 100.0);
            b.emit(Op::Mul {
                dst: 0,
                left: 0,
                right: 1,
            });
            b.emit(Op::LoadParam { dst: 1, index: 0 });
            b.emit(Op::Add {
                dst: 0,
                left: 0,
                right: 1,
            });
            b.emit(Op::Ret { value: 0 });
        });
        b.emit(Op::NewObject { dst: 0 });
        load_num(b, 1, 10.0);
        b.emit_put_by_id(0, "length", 1).unwrap();
        load_num(b, 2, 0.0);
        closure(b, 3, getter);
        b.emit(Op::LoadUndefined { dst: 4 });
        b.emit(Op::PutOwnGetterSetter {
            obj: 0,
            key: 2,
            getter: 3,
            setter: 4,
            enumerable: true,
        });
        closure(b, 5, target);
        b.emit_get_by_id(6, 5, "apply").unwrap();
        b.emit(Op::Call3 {
            dst: 7,
            callee: 6,
            this: 5,
            arg0: 4,
            arg1: 0,
        });
        b.emit(Op::Ret { value: 7 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(1010.0));
}

#[test]
fn test_call_with_args_spreads_array() {
    let result = eval(|b| {
        closure(b, 0, add3());
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::NewArray { dst: 2, size: 3 });
        for (index, value) in [(0u32, 4.0), (1, 5.0), (2, 6.0)] {
            load_num(b, 3, value);
            b.emit(Op::PutOwnByIndex {
                obj: 2,
                index,
                value: 3,
            });
        }
        b.emit(Op::CallWithArgs {
            dst: 4,
            callee: 0,
            this: 1,
            args: 2,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(15.0));
}

#[test]
fn test_bound_function_prepends_arguments() {
    let result = eval(|b| {
        closure(b, 0, add3());
        b.emit_get_by_id(1, 0, "bind").unwrap();
        b.emit(Op::LoadUndefined { dst: 2 });
        load_num(b, 3, 100.0);
        b.emit(Op::Call3 {
            dst: 4,
            callee: 1,
            this: 0,
            arg0: 2,
            arg1: 3,
        });
        load_num(b, 5, 20.0);
        load_num(b, 6, 3.0);
        b.emit(Op::Call3 {
            dst: 7,
            callee: 4,
            this: 2,
            arg0: 5,
            arg1: 6,
        });
        b.emit(Op::Ret { value: 7 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(123.0));
}

#[test]
fn test_non_strict_this_coercion() {
    let result = eval(|b| {
        let receiver = function("receiver", 0, FunctionKind::Normal, |b| {
            b.emit(Op::LoadThis { dst: 0 });
            b.emit(Op::CoerceThisNS { dst: 0, src: 0 });
            b.emit(Op::GetGlobalObject { dst: 1 });
            b.emit(Op::StrictEq {
                dst: 0,
                left: 0,
                right: 1,
            });
            b.emit(Op::Ret { value: 0 });
        });
        closure(b, 0, receiver);
        call_undefined(b, 1, 0, 2);
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Boolean(true));
}

fn poisoned_message(result: Result<JsValue, JsError>) -> String {
    let (name, message) = native_message(result);
    assert_eq!(name, "TypeError");
    message
}

fn returns_closure(interp: &mut Interpreter, chunk: regvm::BytecodeChunk) -> JsValue {
    eval_in(interp, |b| {
        closure(b, 0, chunk);
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap()
}

#[test]
fn test_sloppy_function_caller_and_arguments_are_undefined() {
    let mut interp = create_test_runtime();
    let f = returns_closure(&mut interp, add3());
    assert_eq!(interp.get(&f, "caller").unwrap(), JsValue::Undefined);
    assert_eq!(interp.get(&f, "arguments").unwrap(), JsValue::Undefined);

    let object = interp.get_global("Object").unwrap();
    let keys = interp.call_method(&object, "keys", &[f]).unwrap();
    assert_eq!(interp.get(&keys, "length").unwrap(), JsValue::Number(0.0));
}

#[test]
fn test_strict_function_caller_and_arguments_throw() {
    let mut interp = create_test_runtime();
    let mut b = BytecodeBuilder::for_function(
        FunctionInfo::new(Some("strict"), 0, FunctionKind::Normal).strict(),
    );
    b.emit(Op::LoadUndefined { dst: 0 });
    b.emit(Op::Ret { value: 0 });
    let f = returns_closure(&mut interp, b.finish().unwrap());

    let message = poisoned_message(interp.get(&f, "caller"));
    assert!(message.starts_with("'caller', 'callee', and 'arguments'"));
    poisoned_message(interp.get(&f, "arguments"));
}

#[test]
fn test_bound_function_caller_and_arguments_throw() {
    let mut interp = create_test_runtime();
    let f = returns_closure(&mut interp, add3());
    let bound = interp.call_method(&f, "bind", &[JsValue::Undefined]).unwrap();
    poisoned_message(interp.get(&bound, "caller"));
    poisoned_message(interp.get(&bound, "arguments"));
}
