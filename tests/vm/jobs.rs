//! Microtask and timer queues

use super::{
    closure, create_test_runtime_with_console, eval_in, function, load_global, load_num, print_str,
    printer, test_config,
};
use regvm::bytecode::{BytecodeBuilder, BytecodeChunk, FunctionKind, Op, Register};
use regvm::{BufferedConsole, Interpreter, JsValue, RuntimeConfig};

/// `api(callback, delay)`, using registers `scratch..scratch + 4`; the
/// call result lands in r[scratch]
fn schedule(
    b: &mut BytecodeBuilder,
    scratch: Register,
    api: &str,
    callback: BytecodeChunk,
    delay: Option<f64>,
) {
    load_global(b, scratch, api);
    b.emit(Op::LoadUndefined { dst: scratch + 1 });
    closure(b, scratch + 2, callback);
    match delay {
        Some(ms) => {
            load_num(b, scratch + 3, ms);
            b.emit(Op::Call3 {
                dst: scratch,
                callee: scratch,
                this: scratch + 1,
                arg0: scratch + 2,
                arg1: scratch + 3,
            });
        }
        None => {
            b.emit(Op::Call2 {
                dst: scratch,
                callee: scratch,
                this: scratch + 1,
                arg0: scratch + 2,
            });
        }
    }
}

/// `Promise.resolve().then(callback)`
fn then_resolved(b: &mut BytecodeBuilder, scratch: Register, callback: BytecodeChunk) {
    load_global(b, scratch, "Promise");
    b.emit_get_by_id(scratch + 1, scratch, "resolve").unwrap();
    b.emit(Op::Call1 {
        dst: scratch + 1,
        callee: scratch + 1,
        this: scratch,
    });
    b.emit_get_by_id(scratch + 2, scratch + 1, "then").unwrap();
    closure(b, scratch + 3, callback);
    b.emit(Op::Call2 {
        dst: scratch,
        callee: scratch + 2,
        this: scratch + 1,
        arg0: scratch + 3,
    });
}

fn run(interp: &mut Interpreter, build: impl FnOnce(&mut BytecodeBuilder)) {
    eval_in(interp, |b| {
        build(b);
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
}

fn interleave(microtask_queue: bool) -> Vec<String> {
    let mut interp = Interpreter::with_config(RuntimeConfig {
        microtask_queue,
        ..test_config()
    });
    let console = BufferedConsole::new();
    interp.set_console(Box::new(console.clone()));
    run(&mut interp, |b| {
        schedule(b, 0, "setTimeout", printer("f", "f"), Some(0.0));
        then_resolved(b, 0, printer("g", "g"));
        schedule(b, 0, "setTimeout", printer("h", "h"), Some(0.0));
    });
    assert!(console.output().is_empty());
    interp.drain_jobs().unwrap();
    console.output()
}

#[test]
fn test_promise_jobs_run_before_timers() {
    assert_eq!(interleave(true), vec!["g", "f", "h"]);
}

#[test]
fn test_promise_jobs_as_macrotasks() {
    assert_eq!(interleave(false), vec!["f", "g", "h"]);
}

#[test]
fn test_queue_microtask_runs_in_fifo_order() {
    let (mut interp, console) = create_test_runtime_with_console();
    run(&mut interp, |b| {
        schedule(b, 0, "queueMicrotask", printer("one", "1"), None);
        schedule(b, 0, "queueMicrotask", printer("two", "2"), None);
        print_str(b, 0, "sync");
    });
    assert_eq!(interp.jobs().pending_microtasks(), 2);
    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["sync", "1", "2"]);
    assert!(!interp.has_pending_jobs());
}

#[test]
fn test_timers_fire_by_due_time_then_schedule_order() {
    let (mut interp, console) = create_test_runtime_with_console();
    run(&mut interp, |b| {
        schedule(b, 0, "setTimeout", printer("a", "a"), Some(20.0));
        schedule(b, 0, "setTimeout", printer("b", "b"), Some(10.0));
        schedule(b, 0, "setTimeout", printer("c", "c"), Some(10.0));
    });
    assert_eq!(interp.jobs().pending_macrotasks(), 3);
    assert_eq!(interp.jobs().now(), 0);
    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["b", "c", "a"]);
    assert_eq!(interp.jobs().now(), 20);
}

#[test]
fn test_microtasks_from_a_timer_run_before_the_next_timer() {
    let (mut interp, console) = create_test_runtime_with_console();
    let first = function("first", 0, FunctionKind::Normal, |b| {
        print_str(b, 0, "t1");
        schedule(b, 0, "queueMicrotask", printer("m", "m"), None);
        b.emit(Op::LoadUndefined { dst: 0 });
        b.emit(Op::Ret { value: 0 });
    });
    run(&mut interp, |b| {
        schedule(b, 0, "setTimeout", first, Some(0.0));
        schedule(b, 0, "setTimeout", printer("second", "t2"), Some(0.0));
    });
    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["t1", "m", "t2"]);
}

#[test]
fn test_clear_timeout_cancels_timer() {
    let (mut interp, console) = create_test_runtime_with_console();
    run(&mut interp, |b| {
        schedule(b, 0, "setTimeout", printer("x", "cancelled"), Some(5.0));
        // r0 holds the timer id
        load_global(b, 1, "clearTimeout");
        b.emit(Op::LoadUndefined { dst: 2 });
        b.emit(Op::Call2 {
            dst: 3,
            callee: 1,
            this: 2,
            arg0: 0,
        });
        schedule(b, 0, "setTimeout", printer("y", "kept"), Some(5.0));
    });
    assert_eq!(interp.jobs().pending_macrotasks(), 1);
    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["kept"]);
}

#[test]
fn test_timer_ids_are_distinct() {
    let mut interp = super::create_test_runtime();
    let ids = eval_in(&mut interp, |b| {
        schedule(b, 0, "setTimeout", printer("x", "x"), Some(1.0));
        b.emit(Op::Mov { dst: 5, src: 0 });
        schedule(b, 0, "setTimeout", printer("y", "y"), Some(1.0));
        b.emit(Op::StrictEq {
            dst: 6,
            left: 0,
            right: 5,
        });
        b.emit(Op::Ret { value: 6 });
    })
    .unwrap();
    assert_eq!(ids, JsValue::Boolean(false));
}

#[test]
fn test_error_in_job_stops_draining() {
    let (mut interp, console) = create_test_runtime_with_console();
    let thrower = function("thrower", 0, FunctionKind::Normal, |b| {
        b.emit_load_string(0, "job failed").unwrap();
        b.emit(Op::Throw { value: 0 });
    });
    run(&mut interp, |b| {
        schedule(b, 0, "queueMicrotask", thrower, None);
        schedule(b, 0, "queueMicrotask", printer("later", "later"), None);
    });
    let err = interp.drain_jobs().unwrap_err();
    assert_eq!(err.value(), Some(&JsValue::from("job failed")));
    assert!(console.output().is_empty());
    assert_eq!(interp.jobs().pending_microtasks(), 1);

    interp.drain_jobs().unwrap();
    assert_eq!(console.output(), vec!["later"]);
}

#[test]
fn test_set_timeout_rejects_non_callable() {
    let mut interp = super::create_test_runtime();
    let result = eval_in(&mut interp, |b| {
        load_global(b, 0, "setTimeout");
        b.emit(Op::LoadUndefined { dst: 1 });
        load_num(b, 2, 1.0);
        b.emit(Op::Call2 {
            dst: 3,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        b.emit(Op::Ret { value: 3 });
    });
    let (name, message) = super::native_message(result);
    assert_eq!(name, "TypeError");
    assert_eq!(message, "setTimeout: callback 1 is not a function");
}
