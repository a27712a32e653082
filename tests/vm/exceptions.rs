//! throw/catch, finally, uncatchable errors and error reporting

use super::{
    closure, create_test_runtime, create_test_runtime_with_console, eval, eval_in, function,
    load_global, load_num, load_str, print, print_str, str_value, test_config,
};
use regvm::bytecode::{BytecodeBuilder, FunctionKind, Label, Op};
use regvm::{Interpreter, JsError, JsValue, RuntimeConfig};

#[test]
fn test_throw_and_catch_primitive() {
    let result = eval(|b| {
        let handler = b.new_label();
        let region = b.begin_try();
        load_num(b, 0, 41.0);
        b.emit(Op::Throw { value: 0 });
        b.end_try(region, handler);
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 1 });
        b.emit(Op::Inc { dst: 1, src: 1 });
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(42.0));
}

#[test]
fn test_uncaught_throw_reaches_host() {
    let err = eval(|b| {
        load_str(b, 0, "x");
        b.emit(Op::Throw { value: 0 });
    })
    .unwrap_err();
    assert!(matches!(&err, JsError::Thrown { .. }));
    assert_eq!(err.value(), Some(&str_value("x")));
}

#[test]
fn test_handler_in_caller_catches_callee_throw() {
    let result = eval(|b| {
        let thrower = function("thrower", 0, FunctionKind::Normal, |b| {
            load_str(b, 0, "inner");
            b.emit(Op::Throw { value: 0 });
        });
        let middle = function("middle", 0, FunctionKind::Normal, |b| {
            closure(b, 0, thrower);
            b.emit(Op::LoadUndefined { dst: 1 });
            b.emit(Op::Call1 {
                dst: 2,
                callee: 0,
                this: 1,
            });
            load_str(b, 2, "not reached");
            b.emit(Op::Ret { value: 2 });
        });
        closure(b, 0, middle);
        b.emit(Op::LoadUndefined { dst: 1 });
        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 2 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 3 });
        load_str(b, 4, "caught ");
        b.emit(Op::Add {
            dst: 4,
            left: 4,
            right: 3,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, str_value("caught inner"));
}

#[test]
fn test_nested_handlers_innermost_first() {
    // try { try { throw 1 } catch (e) { throw e + 1 } } catch (e) { e * 10 }
    let result = eval(|b| {
        let outer = b.new_label();
        let inner = b.new_label();
        let outer_region = b.begin_try();
        let inner_region = b.begin_try();
        load_num(b, 0, 1.0);
        b.emit(Op::Throw { value: 0 });
        b.end_try(inner_region, inner);
        b.bind_label(inner);
        b.emit(Op::Catch { dst: 1 });
        b.emit(Op::Inc { dst: 1, src: 1 });
        b.emit(Op::Throw { value: 1 });
        b.end_try(outer_region, outer);
        b.bind_label(outer);
        b.emit(Op::Catch { dst: 2 });
        load_num(b, 3, 10.0);
        b.emit(Op::Mul {
            dst: 2,
            left: 2,
            right: 3,
        });
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(20.0));
}

/// function f() { try { throw "x"; } finally { print("finally"); } }
/// try { f(); } catch (e) { print("caught " + e); }
fn finally_program(b: &mut BytecodeBuilder) {
    let f = function("f", 0, FunctionKind::Normal, |b| {
        let handler = b.new_label();
        let region = b.begin_try();
        load_str(b, 0, "x");
        b.emit(Op::Throw { value: 0 });
        b.end_try(region, handler);
        print_str(b, 2, "finally");
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Ret { value: 1 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 1 });
        print_str(b, 2, "finally");
        b.emit(Op::Throw { value: 1 });
    });
    closure(b, 0, f);
    b.emit(Op::LoadUndefined { dst: 1 });
    let handler = b.new_label();
    let region = b.begin_try();
    b.emit(Op::Call1 {
        dst: 2,
        callee: 0,
        this: 1,
    });
    b.end_try(region, handler);
    b.emit(Op::Ret { value: 2 });
    b.bind_label(handler);
    b.emit(Op::Catch { dst: 3 });
    load_str(b, 4, "caught ");
    b.emit(Op::Add {
        dst: 4,
        left: 4,
        right: 3,
    });
    print(b, 5, 4);
    b.emit(Op::Ret { value: 4 });
}

#[test]
fn test_finally_runs_once_before_rethrow() {
    let (mut interp, console) = create_test_runtime_with_console();
    eval_in(&mut interp, finally_program).unwrap();
    assert_eq!(console.output(), vec!["finally", "caught x"]);
}

/// Catch-all handler that runs the finally body and rethrows
fn rethrow_after(b: &mut BytecodeBuilder, handler: Label, finally: impl Fn(&mut BytecodeBuilder)) {
    b.bind_label(handler);
    b.emit(Op::Catch { dst: 20 });
    finally(b);
    b.emit(Op::Throw { value: 20 });
}

#[test]
fn test_finally_runs_once_on_normal_completion() {
    let (mut interp, console) = create_test_runtime_with_console();
    eval_in(&mut interp, |b| {
        let handler = b.new_label();
        let after = b.new_label();
        let region = b.begin_try();
        print_str(b, 0, "body");
        b.end_try(region, handler);
        print_str(b, 0, "finally");
        b.emit_jmp(after);
        rethrow_after(b, handler, |b| print_str(b, 0, "finally"));
        b.bind_label(after);
        print_str(b, 0, "after");
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(console.output(), vec!["body", "finally", "after"]);
}

#[test]
fn test_throw_from_finally_is_not_caught_by_its_own_try() {
    let (mut interp, console) = create_test_runtime_with_console();
    let err = eval_in(&mut interp, |b| {
        let handler = b.new_label();
        let region = b.begin_try();
        print_str(b, 0, "body");
        b.end_try(region, handler);
        print_str(b, 0, "finally");
        load_str(b, 0, "late");
        b.emit(Op::Throw { value: 0 });
        rethrow_after(b, handler, |b| print_str(b, 0, "finally"));
    })
    .unwrap_err();
    assert_eq!(err.value(), Some(&str_value("late")));
    assert_eq!(console.output(), vec!["body", "finally"]);
}

/// function f(c) { try { if (c) return "early"; print("rest"); }
///                 finally { print("finally"); } return "late"; }
fn early_return() -> regvm::BytecodeChunk {
    function("f", 1, FunctionKind::Normal, |b| {
        let handler = b.new_label();
        let rest = b.new_label();
        b.emit(Op::LoadParam { dst: 0, index: 0 });
        let first = b.begin_try();
        b.emit_jmp_false(0, rest);
        load_str(b, 1, "early");
        b.end_try(first, handler);
        print_str(b, 2, "finally");
        b.emit(Op::Ret { value: 1 });

        b.bind_label(rest);
        let second = b.begin_try();
        print_str(b, 2, "rest");
        b.end_try(second, handler);
        print_str(b, 2, "finally");
        load_str(b, 1, "late");
        b.emit(Op::Ret { value: 1 });

        rethrow_after(b, handler, |b| print_str(b, 2, "finally"));
    })
}

#[test]
fn test_finally_runs_once_on_early_return() {
    let (mut interp, console) = create_test_runtime_with_console();
    let result = eval_in(&mut interp, |b| {
        closure(b, 0, early_return());
        b.emit(Op::LoadUndefined { dst: 1 });
        for (dst, flag) in [(3, true), (4, false)] {
            b.emit(Op::LoadBool { dst: 2, value: flag });
            b.emit(Op::Call2 {
                dst,
                callee: 0,
                this: 1,
                arg0: 2,
            });
            print(b, 5, dst);
        }
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, str_value("late"));
    assert_eq!(
        console.output(),
        vec!["finally", "early", "rest", "finally", "late"]
    );
}

/// for (i = 0; i < 3; i++) {
///   try { if (i === 1) continue; if (i === 2) break; print("body " + i); }
///   finally { print("finally " + i); }
/// }
/// print("done");
#[test]
fn test_finally_runs_once_on_break_and_continue() {
    let (mut interp, console) = create_test_runtime_with_console();
    let finally = |b: &mut BytecodeBuilder| {
        load_str(b, 5, "finally ");
        b.emit(Op::Add {
            dst: 5,
            left: 5,
            right: 0,
        });
        print(b, 6, 5);
    };
    eval_in(&mut interp, |b| {
        let top = b.new_label();
        let next = b.new_label();
        let done = b.new_label();
        let handler = b.new_label();
        let not_continue = b.new_label();
        let not_break = b.new_label();
        b.emit(Op::LoadInt { dst: 0, value: 0 });
        b.emit(Op::LoadInt { dst: 1, value: 3 });
        b.emit(Op::LoadInt { dst: 3, value: 1 });
        b.emit(Op::LoadInt { dst: 4, value: 2 });
        b.bind_label(top);
        b.emit(Op::Less {
            dst: 2,
            left: 0,
            right: 1,
        });
        b.emit_jmp_false(2, done);

        let region = b.begin_try();
        b.emit(Op::StrictEq {
            dst: 2,
            left: 0,
            right: 3,
        });
        b.emit_jmp_false(2, not_continue);
        b.end_try(region, handler);
        finally(b);
        b.emit_jmp(next);

        b.bind_label(not_continue);
        let region = b.begin_try();
        b.emit(Op::StrictEq {
            dst: 2,
            left: 0,
            right: 4,
        });
        b.emit_jmp_false(2, not_break);
        b.end_try(region, handler);
        finally(b);
        b.emit_jmp(done);

        b.bind_label(not_break);
        let region = b.begin_try();
        load_str(b, 5, "body ");
        b.emit(Op::Add {
            dst: 5,
            left: 5,
            right: 0,
        });
        print(b, 6, 5);
        b.end_try(region, handler);
        finally(b);

        b.bind_label(next);
        b.emit(Op::Inc { dst: 0, src: 0 });
        b.emit_jmp(top);

        rethrow_after(b, handler, finally);

        b.bind_label(done);
        print_str(b, 6, "done");
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(
        console.output(),
        vec!["body 0", "finally 0", "finally 1", "finally 2", "done"]
    );
}

#[test]
fn test_native_error_is_materialized_for_handler() {
    let result = eval(|b| {
        let handler = b.new_label();
        let region = b.begin_try();
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Call1 {
            dst: 1,
            callee: 0,
            this: 0,
        });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 1 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 2 });
        load_global(b, 3, "TypeError");
        b.emit(Op::InstanceOf {
            dst: 4,
            left: 2,
            right: 3,
        });
        let wrong = b.new_label();
        b.emit_jmp_false(4, wrong);
        b.emit_get_by_id(5, 2, "stack").unwrap();
        b.emit(Op::Ret { value: 5 });
        b.bind_label(wrong);
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    let stack = result.as_str().unwrap().to_string();
    assert!(
        stack.starts_with("TypeError: undefined is not a function\n    at global"),
        "{}",
        stack
    );
}

#[test]
fn test_error_constructor_and_to_string() {
    let result = eval(|b| {
        load_global(b, 0, "RangeError");
        load_str(b, 1, "too far");
        b.emit(Op::Construct {
            dst: 2,
            callee: 0,
            args_start: 1,
            argc: 1,
        });
        b.emit_get_by_id(3, 2, "toString").unwrap();
        b.emit(Op::Call1 {
            dst: 3,
            callee: 3,
            this: 2,
        });
        // Calling without new also creates an error
        load_global(b, 4, "Error");
        b.emit(Op::LoadUndefined { dst: 5 });
        b.emit(Op::Call1 {
            dst: 6,
            callee: 4,
            this: 5,
        });
        b.emit(Op::InstanceOf {
            dst: 7,
            left: 6,
            right: 4,
        });
        b.emit_load_string(8, " ").unwrap();
        b.emit(Op::Add {
            dst: 3,
            left: 3,
            right: 8,
        });
        b.emit(Op::Add {
            dst: 3,
            left: 3,
            right: 7,
        });
        b.emit(Op::Ret { value: 3 });
    })
    .unwrap();
    assert_eq!(result, str_value("RangeError: too far true"));
}

#[test]
fn test_report_error_writes_uncaught_line() {
    let (mut interp, console) = create_test_runtime_with_console();
    let err = eval_in(&mut interp, |b| {
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Call1 {
            dst: 1,
            callee: 0,
            this: 0,
        });
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap_err();
    interp.report_error(&err);
    assert_eq!(
        console.errors(),
        vec!["Uncaught TypeError: undefined is not a function"]
    );
}

#[test]
fn test_report_error_uses_stack_of_thrown_error() {
    let (mut interp, console) = create_test_runtime_with_console();
    let err = eval_in(&mut interp, |b| {
        load_global(b, 0, "Error");
        load_str(b, 1, "boom");
        b.emit(Op::Construct {
            dst: 2,
            callee: 0,
            args_start: 1,
            argc: 1,
        });
        b.emit(Op::Throw { value: 2 });
    })
    .unwrap_err();
    interp.report_error(&err);
    let errors = console.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Uncaught Error: boom\n    at global"), "{}", errors[0]);
}

#[test]
fn test_quit_bypasses_handlers() {
    let (mut interp, console) = create_test_runtime_with_console();
    let result = eval_in(&mut interp, |b| {
        let handler = b.new_label();
        let region = b.begin_try();
        load_global(b, 0, "quit");
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
        print_str(b, 4, "caught");
        b.emit(Op::Ret { value: 3 });
    });
    assert!(matches!(result, Err(JsError::Quit)));
    assert!(console.output().is_empty());
}

#[test]
fn test_time_limit_stops_infinite_loop() {
    let mut interp = Interpreter::with_config(RuntimeConfig {
        time_limit_ms: Some(20),
        ..test_config()
    });
    let result = eval_in(&mut interp, |b| {
        let handler = b.new_label();
        let top = b.new_label();
        let region = b.begin_try();
        b.bind_label(top);
        b.emit(Op::Nop);
        b.emit_jmp(top);
        b.end_try(region, handler);
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    });
    assert!(matches!(result, Err(JsError::Timeout)));

    // A fresh host entry gets a fresh budget
    let again = eval_in(&mut interp, |b| {
        load_num(b, 0, 1.0);
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(again, JsValue::Number(1.0));
}

#[test]
fn test_unbound_label_fails_verification() {
    let mut interp = create_test_runtime();
    let result = eval_in(&mut interp, |b| {
        let nowhere = b.new_label();
        b.emit_jmp(nowhere);
    });
    assert!(matches!(result, Err(JsError::Verify(_))));
}

#[test]
fn test_out_of_range_constant_fails_verification() {
    let mut interp = create_test_runtime();
    let result = eval_in(&mut interp, |b| {
        b.emit(Op::LoadConst { dst: 0, idx: 40 });
        b.emit(Op::Ret { value: 0 });
    });
    assert!(matches!(result, Err(JsError::Verify(_))));
}

#[test]
fn test_empty_body_fails_verification() {
    let mut interp = create_test_runtime();
    let result = eval_in(&mut interp, |_| {});
    assert!(matches!(result, Err(JsError::Verify(_))));
}
