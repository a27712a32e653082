//! Generators, async functions and async generators

use super::{
    closure, create_test_runtime, create_test_runtime_with_console, eval_in, function,
    load_global, load_num, load_str, print_str, str_value,
};
use regvm::bytecode::{BytecodeBuilder, BytecodeChunk, FunctionKind, Label, Op, Register};
use regvm::interpreter::promise::PromiseStatus;
use regvm::{Interpreter, JsError, JsValue};

/// Yield r[value], then deliver the resumption into r[dst]; a `return()`
/// resumption jumps to `on_return` with the value in r[dst].
fn yield_value(b: &mut BytecodeBuilder, value: Register, dst: Register, on_return: Label) {
    let resume = b.new_label();
    b.emit_yield(value, resume);
    b.bind_label(resume);
    b.emit(Op::ResumeGenerator {
        dst,
        is_return: dst + 1,
    });
    b.emit_jmp_true(dst + 1, on_return);
}

/// function* count() { yield 1; yield 2; return 3; }
fn count() -> BytecodeChunk {
    function("count", 0, FunctionKind::Generator, |b| {
        let on_return = b.new_label();
        load_num(b, 0, 1.0);
        yield_value(b, 0, 1, on_return);
        load_num(b, 0, 2.0);
        yield_value(b, 0, 1, on_return);
        load_num(b, 0, 3.0);
        b.emit(Op::Ret { value: 0 });
        b.bind_label(on_return);
        b.emit(Op::Ret { value: 1 });
    })
}

/// Call a zero-argument function defined by `chunk` and hand the result to the host
fn start(interp: &mut Interpreter, chunk: BytecodeChunk) -> JsValue {
    let f = eval_in(interp, |b| {
        closure(b, 0, chunk);
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    interp.call_function(&f, JsValue::Undefined, &[]).unwrap()
}

/// (value, done) of an iterator result
fn step(interp: &mut Interpreter, generator: &JsValue, method: &str, arg: JsValue) -> (JsValue, bool) {
    let result = interp.call_method(generator, method, &[arg]).unwrap();
    let value = interp.get(&result, "value").unwrap();
    let done = interp.get(&result, "done").unwrap();
    (value, done == JsValue::Boolean(true))
}

#[test]
fn test_generator_yields_then_returns() {
    let mut interp = create_test_runtime();
    let generator = start(&mut interp, count());
    let steps: Vec<_> = (0..4)
        .map(|_| step(&mut interp, &generator, "next", JsValue::Undefined))
        .collect();
    assert_eq!(
        steps,
        vec![
            (JsValue::Number(1.0), false),
            (JsValue::Number(2.0), false),
            (JsValue::Number(3.0), true),
            (JsValue::Undefined, true),
        ]
    );
}

#[test]
fn test_generator_receives_sent_values() {
    // function* echo() { const a = yield 0; const b = yield a * 2; return a + b; }
    let mut interp = create_test_runtime();
    let echo = function("echo", 0, FunctionKind::Generator, |b| {
        let on_return = b.new_label();
        load_num(b, 0, 0.0);
        yield_value(b, 0, 1, on_return);
        load_num(b, 3, 2.0);
        b.emit(Op::Mul {
            dst: 4,
            left: 1,
            right: 3,
        });
        yield_value(b, 4, 5, on_return);
        b.emit(Op::Add {
            dst: 7,
            left: 1,
            right: 5,
        });
        b.emit(Op::Ret { value: 7 });
        b.bind_label(on_return);
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    });
    let generator = start(&mut interp, echo);
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Number(99.0)),
        (JsValue::Number(0.0), false)
    );
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Number(5.0)),
        (JsValue::Number(10.0), false)
    );
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Number(1.0)),
        (JsValue::Number(6.0), true)
    );
}

#[test]
fn test_return_runs_cleanup() {
    // function* g() { try { yield 1; yield 2; } finally { print("Cleanup performed"); } }
    let (mut interp, console) = create_test_runtime_with_console();
    let g = function("g", 0, FunctionKind::Generator, |b| {
        let on_return = b.new_label();
        load_num(b, 0, 1.0);
        yield_value(b, 0, 1, on_return);
        load_num(b, 0, 2.0);
        yield_value(b, 0, 1, on_return);
        print_str(b, 3, "Cleanup performed");
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Ret { value: 1 });
        b.bind_label(on_return);
        print_str(b, 3, "Cleanup performed");
        b.emit(Op::Ret { value: 1 });
    });
    let generator = start(&mut interp, g);
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Undefined),
        (JsValue::Number(1.0), false)
    );
    assert!(console.output().is_empty());
    assert_eq!(
        step(&mut interp, &generator, "return", JsValue::Number(5.0)),
        (JsValue::Number(5.0), true)
    );
    assert_eq!(console.output(), vec!["Cleanup performed".to_string()]);
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Undefined),
        (JsValue::Undefined, true)
    );
    assert_eq!(console.output().len(), 1);
}

#[test]
fn test_throw_is_catchable_inside_body() {
    // function* g() { try { yield 1; } catch (e) { yield "caught " + e; } }
    let mut interp = create_test_runtime();
    let g = function("g", 0, FunctionKind::Generator, |b| {
        let on_return = b.new_label();
        let handler = b.new_label();
        load_num(b, 0, 1.0);
        let region = b.begin_try();
        yield_value(b, 0, 1, on_return);
        b.end_try(region, handler);
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Ret { value: 1 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 3 });
        load_str(b, 4, "caught ");
        b.emit(Op::Add {
            dst: 4,
            left: 4,
            right: 3,
        });
        yield_value(b, 4, 1, on_return);
        b.bind_label(on_return);
        b.emit(Op::Ret { value: 1 });
    });
    let generator = start(&mut interp, g);
    step(&mut interp, &generator, "next", JsValue::Undefined);
    assert_eq!(
        step(&mut interp, &generator, "throw", str_value("boom")),
        (str_value("caught boom"), false)
    );
}

#[test]
fn test_throw_before_start_completes_generator() {
    let mut interp = create_test_runtime();
    let generator = start(&mut interp, count());
    let err = interp
        .call_method(&generator, "throw", &[str_value("early")])
        .unwrap_err();
    assert_eq!(err.value(), Some(&str_value("early")));
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Undefined),
        (JsValue::Undefined, true)
    );
}

#[test]
fn test_return_before_start_skips_body() {
    let (mut interp, console) = create_test_runtime_with_console();
    let generator = start(&mut interp, {
        function("g", 0, FunctionKind::Generator, |b| {
            print_str(b, 0, "body ran");
            b.emit(Op::LoadUndefined { dst: 0 });
            b.emit(Op::Ret { value: 0 });
        })
    });
    assert_eq!(
        step(&mut interp, &generator, "return", JsValue::Number(1.0)),
        (JsValue::Number(1.0), true)
    );
    assert!(console.output().is_empty());
}

#[test]
fn test_suspended_generator_keeps_registers_alive() {
    let mut interp = create_test_runtime();
    let g = function("g", 0, FunctionKind::Generator, |b| {
        let on_return = b.new_label();
        b.emit(Op::NewObject { dst: 0 });
        load_num(b, 1, 7.0);
        b.emit_put_by_id(0, "x", 1).unwrap();
        load_num(b, 2, 0.0);
        yield_value(b, 2, 3, on_return);
        b.emit_get_by_id(5, 0, "x").unwrap();
        b.emit(Op::Ret { value: 5 });
        b.bind_label(on_return);
        b.emit(Op::Ret { value: 3 });
    });
    let generator = start(&mut interp, g);
    step(&mut interp, &generator, "next", JsValue::Undefined);
    interp.release_escaped_values();
    interp.capture_escaping_value(&generator);
    interp.collect_garbage();
    interp.collect_garbage();
    assert_eq!(
        step(&mut interp, &generator, "next", JsValue::Undefined),
        (JsValue::Number(7.0), true)
    );
}

#[test]
fn test_generator_reentry_is_rejected() {
    let mut interp = create_test_runtime();
    let g = function("g", 0, FunctionKind::Generator, |b| {
        load_global(b, 0, "gen");
        b.emit_get_by_id(1, 0, "next").unwrap();
        b.emit(Op::Call1 {
            dst: 2,
            callee: 1,
            this: 0,
        });
        b.emit(Op::Ret { value: 2 });
    });
    let generator = start(&mut interp, g);
    interp.set_global("gen", generator.clone()).unwrap();
    let err = interp.call_method(&generator, "next", &[]).unwrap_err();
    assert_eq!(err.to_string(), "TypeError: Generator is already running");
}

#[test]
fn test_for_of_over_generator() {
    // let sum = 0; for (const v of count()) sum += v; sum
    let mut interp = create_test_runtime();
    let result = eval_in(&mut interp, |b| {
        closure(b, 0, count());
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        b.emit(Op::GetIterator { dst: 3, src: 2 });
        load_num(b, 4, 0.0);
        let top = b.new_label();
        let done = b.new_label();
        b.bind_label(top);
        b.emit(Op::IteratorNext {
            value: 5,
            done: 6,
            iter: 3,
        });
        b.emit_jmp_true(6, done);
        b.emit(Op::Add {
            dst: 4,
            left: 4,
            right: 5,
        });
        b.emit_jmp(top);
        b.bind_label(done);
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(3.0));
}

fn settled(interp: &Interpreter, promise: &JsValue) -> (PromiseStatus, JsValue) {
    interp.promise_status(promise.as_object().unwrap()).unwrap()
}

/// async function f() { return (await 40) + 2; }
fn add_after_await() -> BytecodeChunk {
    function("f", 0, FunctionKind::AsyncFunction, |b| {
        let resume = b.new_label();
        load_num(b, 0, 40.0);
        b.emit_await(0, resume);
        b.bind_label(resume);
        b.emit(Op::ResumeGenerator { dst: 1, is_return: 2 });
        load_num(b, 3, 2.0);
        b.emit(Op::Add {
            dst: 1,
            left: 1,
            right: 3,
        });
        b.emit(Op::Ret { value: 1 });
    })
}

#[test]
fn test_async_function_fulfills_after_jobs_run() {
    let mut interp = create_test_runtime();
    let promise = start(&mut interp, add_after_await());
    assert_eq!(settled(&interp, &promise).0, PromiseStatus::Pending);
    assert!(interp.has_pending_jobs());
    interp.drain_jobs().unwrap();
    assert_eq!(
        settled(&interp, &promise),
        (PromiseStatus::Fulfilled, JsValue::Number(42.0))
    );
}

#[test]
fn test_awaited_rejection_is_catchable() {
    // async function f() { try { await Promise.reject("no"); } catch (e) { return e + "!"; } }
    let mut interp = create_test_runtime();
    let f = function("f", 0, FunctionKind::AsyncFunction, |b| {
        let handler = b.new_label();
        let resume = b.new_label();
        load_global(b, 0, "Promise");
        b.emit_get_by_id(1, 0, "reject").unwrap();
        load_str(b, 2, "no");
        b.emit(Op::Call2 {
            dst: 3,
            callee: 1,
            this: 0,
            arg0: 2,
        });
        let region = b.begin_try();
        b.emit_await(3, resume);
        b.bind_label(resume);
        b.emit(Op::ResumeGenerator { dst: 4, is_return: 5 });
        b.end_try(region, handler);
        b.emit(Op::Ret { value: 4 });
        b.bind_label(handler);
        b.emit(Op::Catch { dst: 6 });
        load_str(b, 7, "!");
        b.emit(Op::Add {
            dst: 6,
            left: 6,
            right: 7,
        });
        b.emit(Op::Ret { value: 6 });
    });
    let promise = start(&mut interp, f);
    interp.drain_jobs().unwrap();
    assert_eq!(
        settled(&interp, &promise),
        (PromiseStatus::Fulfilled, str_value("no!"))
    );
}

#[test]
fn test_async_function_error_rejects_promise() {
    let mut interp = create_test_runtime();
    let f = function("f", 0, FunctionKind::AsyncFunction, |b| {
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Call1 {
            dst: 1,
            callee: 0,
            this: 0,
        });
        b.emit(Op::Ret { value: 1 });
    });
    // The error surfaces through the promise, not the call
    let promise = start(&mut interp, f);
    let (status, reason) = settled(&interp, &promise);
    assert_eq!(status, PromiseStatus::Rejected);
    assert_eq!(
        interp.get(&reason, "message").unwrap(),
        str_value("undefined is not a function")
    );
}

#[test]
fn test_async_function_runs_synchronously_until_first_await() {
    // async function f() { print("a"); await undefined; print("c"); }
    // f(); print("b");
    let (mut interp, console) = create_test_runtime_with_console();
    eval_in(&mut interp, |b| {
        let f = function("f", 0, FunctionKind::AsyncFunction, |b| {
            let resume = b.new_label();
            print_str(b, 0, "a");
            b.emit(Op::LoadUndefined { dst: 3 });
            b.emit_await(3, resume);
            b.bind_label(resume);
            b.emit(Op::ResumeGenerator { dst: 4, is_return: 5 });
            print_str(b, 0, "c");
            b.emit(Op::LoadUndefined { dst: 3 });
            b.emit(Op::Ret { value: 3 });
        });
        closure(b, 0, f);
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::Call1 {
            dst: 2,
            callee: 0,
            this: 1,
        });
        print_str(b, 3, "b");
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(console.output(), vec!["a", "b"]);
    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["a", "b", "c"]);
}

#[test]
fn test_async_generator_settles_queued_requests_in_order() {
    // async function* g() { yield 1; return 2; }
    let mut interp = create_test_runtime();
    let g = function("g", 0, FunctionKind::AsyncGenerator, |b| {
        let on_return = b.new_label();
        load_num(b, 0, 1.0);
        yield_value(b, 0, 1, on_return);
        load_num(b, 0, 2.0);
        b.emit(Op::Ret { value: 0 });
        b.bind_label(on_return);
        b.emit(Op::Ret { value: 1 });
    });
    let generator = start(&mut interp, g);
    let first = interp.call_method(&generator, "next", &[]).unwrap();
    let second = interp.call_method(&generator, "next", &[]).unwrap();
    let third = interp.call_method(&generator, "next", &[]).unwrap();
    interp.drain_jobs().unwrap();

    let mut results = Vec::new();
    for promise in [&first, &second, &third] {
        let (status, result) = settled(&interp, promise);
        assert_eq!(status, PromiseStatus::Fulfilled);
        let value = interp.get(&result, "value").unwrap();
        let done = interp.get(&result, "done").unwrap();
        results.push((value, done));
    }
    assert_eq!(
        results,
        vec![
            (JsValue::Number(1.0), JsValue::Boolean(false)),
            (JsValue::Number(2.0), JsValue::Boolean(true)),
            (JsValue::Undefined, JsValue::Boolean(true)),
        ]
    );
}

#[test]
fn test_async_generator_bad_receiver_rejects() {
    let mut interp = create_test_runtime();
    let g = function("g", 0, FunctionKind::AsyncGenerator, |b| {
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    });
    let generator = start(&mut interp, g);
    let next = interp.get(&generator, "next").unwrap();
    let promise = interp.call_function(&next, JsValue::Number(1.0), &[]).unwrap();
    assert_eq!(settled(&interp, &promise).0, PromiseStatus::Rejected);
}

#[test]
fn test_yield_outside_generator_fails_verification() {
    let mut interp = create_test_runtime();
    let result = eval_in(&mut interp, |b| {
        let resume = b.new_label();
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit_yield(0, resume);
        b.bind_label(resume);
        b.emit(Op::Ret { value: 0 });
    });
    assert!(matches!(result, Err(JsError::Verify(_))));
}
