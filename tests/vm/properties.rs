//! Property access, hidden classes and inline caches

use super::{
    closure, create_test_runtime, eval, eval_in, function, load_global, load_num, load_str,
    native_message, str_value,
};
use regvm::bytecode::{BytecodeBuilder, FunctionInfo, FunctionKind, Op};
use regvm::{Interpreter, JsError, JsValue};

/// Build `{a: 1, b: 2}` adding keys in the given order
fn object_literal(interp: &mut Interpreter, keys: &[&str]) -> JsValue {
    eval_in(interp, |b| {
        b.emit(Op::NewObject { dst: 0 });
        for (i, key) in keys.iter().enumerate() {
            load_num(b, 1, i as f64);
            b.emit_put_by_id(0, key, 1).unwrap();
        }
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap()
}

#[test]
fn test_same_insertion_order_shares_hidden_class() {
    let mut interp = create_test_runtime();
    let first = object_literal(&mut interp, &["a", "b"]);
    let second = object_literal(&mut interp, &["a", "b"]);
    let swapped = object_literal(&mut interp, &["b", "a"]);

    let class_of = |v: &JsValue| interp.hidden_class(v.as_object().unwrap());
    assert!(class_of(&first).is_some());
    assert_eq!(class_of(&first), class_of(&second));
    assert_ne!(class_of(&first), class_of(&swapped));
}

/// function readA(o) { return o.a; }
fn read_a() -> regvm::BytecodeChunk {
    function("readA", 1, FunctionKind::Normal, |b| {
        b.emit(Op::LoadParam { dst: 0, index: 0 });
        b.emit_get_by_id(1, 0, "a").unwrap();
        b.emit(Op::Ret { value: 1 });
    })
}

#[test]
fn test_delete_invalidates_cached_read() {
    let result = eval(|b| {
        closure(b, 0, read_a());
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::NewObject { dst: 2 });
        load_num(b, 3, 1.0);
        b.emit_put_by_id(2, "a", 3).unwrap();
        load_num(b, 3, 2.0);
        b.emit_put_by_id(2, "b", 3).unwrap();

        b.emit(Op::Call2 {
            dst: 4,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        let a = b.add_string("a").unwrap();
        b.emit(Op::DelById {
            dst: 5,
            obj: 2,
            key: a,
        });
        b.emit(Op::Call2 {
            dst: 6,
            callee: 0,
            this: 1,
            arg0: 2,
        });
        load_str(b, 7, ",");
        b.emit(Op::Add {
            dst: 4,
            left: 4,
            right: 7,
        });
        b.emit(Op::Add {
            dst: 4,
            left: 4,
            right: 6,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap();
    assert_eq!(result, str_value("1,undefined"));
}

#[test]
fn test_repeated_reads_hit_the_cache() {
    let mut interp = create_test_runtime();
    let before = interp.cache_stats();
    let result = eval_in(&mut interp, |b| {
        b.emit(Op::NewObject { dst: 0 });
        load_num(b, 1, 3.0);
        b.emit_put_by_id(0, "n", 1).unwrap();
        load_num(b, 2, 0.0);
        load_num(b, 3, 0.0);
        load_num(b, 4, 10.0);
        let top = b.new_label();
        let done = b.new_label();
        b.bind_label(top);
        b.emit(Op::Less {
            dst: 5,
            left: 2,
            right: 4,
        });
        b.emit_jmp_false(5, done);
        b.emit_get_by_id(6, 0, "n").unwrap();
        b.emit(Op::Add {
            dst: 3,
            left: 3,
            right: 6,
        });
        b.emit(Op::Inc { dst: 2, src: 2 });
        b.emit_jmp(top);
        b.bind_label(done);
        b.emit(Op::Ret { value: 3 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(30.0));
    let after = interp.cache_stats();
    assert!(after.hits - before.hits >= 9, "hits: {:?}", after);
}

#[test]
fn test_prototype_reads_follow_prototype_changes() {
    // proto = {a: 1}; o = Object.create(proto)
    // readA(o); proto.a = 2; readA(o); proto.z = 0; proto.a = 3; readA(o)
    let result = eval(|b| {
        closure(b, 0, read_a());
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::NewObject { dst: 2 });
        load_num(b, 3, 1.0);
        b.emit_put_by_id(2, "a", 3).unwrap();
        b.emit(Op::NewObjectWithParent { dst: 4, parent: 2 });

        load_str(b, 5, "");
        load_str(b, 6, ",");
        for step in 0..3 {
            match step {
                1 => {
                    load_num(b, 3, 2.0);
                    b.emit_put_by_id(2, "a", 3).unwrap();
                }
                2 => {
                    load_num(b, 3, 0.0);
                    b.emit_put_by_id(2, "z", 3).unwrap();
                    load_num(b, 3, 3.0);
                    b.emit_put_by_id(2, "a", 3).unwrap();
                }
                _ => {}
            }
            if step > 0 {
                b.emit(Op::Add {
                    dst: 5,
                    left: 5,
                    right: 6,
                });
            }
            b.emit(Op::Call2 {
                dst: 7,
                callee: 0,
                this: 1,
                arg0: 4,
            });
            b.emit(Op::Add {
                dst: 5,
                left: 5,
                right: 7,
            });
        }
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, str_value("1,2,3"));
}

#[test]
fn test_own_property_shadows_prototype_after_caching() {
    let result = eval(|b| {
        closure(b, 0, read_a());
        b.emit(Op::LoadUndefined { dst: 1 });
        b.emit(Op::NewObject { dst: 2 });
        load_num(b, 3, 1.0);
        b.emit_put_by_id(2, "a", 3).unwrap();
        b.emit(Op::NewObjectWithParent { dst: 4, parent: 2 });
        b.emit(Op::Call2 {
            dst: 5,
            callee: 0,
            this: 1,
            arg0: 4,
        });
        load_num(b, 3, 10.0);
        b.emit_put_by_id(4, "a", 3).unwrap();
        b.emit(Op::Call2 {
            dst: 6,
            callee: 0,
            this: 1,
            arg0: 4,
        });
        b.emit(Op::Add {
            dst: 5,
            left: 5,
            right: 6,
        });
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(11.0));
}

#[test]
fn test_accessor_property() {
    // o = { get v() { return this._v * 2 }, set v(x) { this._v = x } }; o.v = 21; o.v
    let result = eval(|b| {
        let getter = function("get v", 0, FunctionKind::Method, |b| {
            b.emit(Op::LoadThis { dst: 0 });
            b.emit_get_by_id(1, 0, "_v").unwrap();
            load_num(b, 2, 2.0);
            b.emit(Op::Mul {
                dst: 1,
                left: 1,
                right: 2,
            });
            b.emit(Op::Ret { value: 1 });
        });
        let setter = function("set v", 1, FunctionKind::Method, |b| {
            b.emit(Op::LoadThis { dst: 0 });
            b.emit(Op::LoadParam { dst: 1, index: 0 });
            b.emit_put_by_id(0, "_v", 1).unwrap();
            b.emit(Op::LoadUndefined { dst: 2 });
            b.emit(Op::Ret { value: 2 });
        });
        b.emit(Op::NewObject { dst: 0 });
        load_str(b, 1, "v");
        closure(b, 2, getter);
        closure(b, 3, setter);
        b.emit(Op::PutOwnGetterSetter {
            obj: 0,
            key: 1,
            getter: 2,
            setter: 3,
            enumerable: true,
        });
        load_num(b, 4, 21.0);
        b.emit_put_by_id(0, "v", 4).unwrap();
        b.emit_get_by_id(5, 0, "v").unwrap();
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(42.0));
}

#[test]
fn test_getter_only_property_ignores_sloppy_writes() {
    let result = eval(|b| {
        let getter = function("get k", 0, FunctionKind::Method, |b| {
            load_num(b, 0, 7.0);
            b.emit(Op::Ret { value: 0 });
        });
        b.emit(Op::NewObject { dst: 0 });
        load_str(b, 1, "k");
        closure(b, 2, getter);
        b.emit(Op::LoadUndefined { dst: 3 });
        b.emit(Op::PutOwnGetterSetter {
            obj: 0,
            key: 1,
            getter: 2,
            setter: 3,
            enumerable: true,
        });
        load_num(b, 4, 1.0);
        b.emit_put_by_id(0, "k", 4).unwrap();
        b.emit_get_by_id(5, 0, "k").unwrap();
        b.emit(Op::Ret { value: 5 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(7.0));
}

#[test]
fn test_missing_global_read() {
    let (name, message) = native_message(eval(|b| {
        load_global(b, 0, "nope");
        b.emit(Op::Ret { value: 0 });
    }));
    assert_eq!(name, "ReferenceError");
    assert_eq!(message, "nope is not defined");
}

#[test]
fn test_typeof_missing_global_is_undefined() {
    let result = eval(|b| {
        b.emit(Op::GetGlobalObject { dst: 0 });
        b.emit_get_by_id(1, 0, "nope").unwrap();
        b.emit(Op::TypeOf { dst: 1, src: 1 });
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(result, str_value("undefined"));
}

fn assign_global(strict: bool) -> (Interpreter, Result<JsValue, regvm::JsError>) {
    let mut interp = create_test_runtime();
    let info = FunctionInfo::new(None, 0, FunctionKind::Normal);
    let info = if strict { info.strict() } else { info };
    let mut b = BytecodeBuilder::for_function(info);
    b.emit(Op::GetGlobalObject { dst: 0 });
    load_num(&mut b, 1, 5.0);
    b.emit_try_put_by_id(0, "created", 1).unwrap();
    b.emit(Op::Ret { value: 1 });
    let result = interp.run(b.finish().unwrap());
    (interp, result)
}

#[test]
fn test_sloppy_assignment_creates_global() {
    let (mut interp, result) = assign_global(false);
    assert_eq!(result.unwrap(), JsValue::Number(5.0));
    assert_eq!(interp.get_global("created").unwrap(), JsValue::Number(5.0));
}

#[test]
fn test_strict_assignment_to_missing_global() {
    let (mut interp, result) = assign_global(true);
    let (name, message) = native_message(result);
    assert_eq!(name, "ReferenceError");
    assert_eq!(message, "created is not defined");
    assert_eq!(interp.get_global("created").unwrap(), JsValue::Undefined);
}

#[test]
fn test_declared_global_var_cannot_be_deleted() {
    let result = eval(|b| {
        b.emit_declare_global_var("counter").unwrap();
        b.emit(Op::GetGlobalObject { dst: 0 });
        let key = b.add_string("counter").unwrap();
        b.emit(Op::DelById {
            dst: 1,
            obj: 0,
            key,
        });
        b.emit_get_by_id(2, 0, "counter").unwrap();
        b.emit(Op::TypeOf { dst: 2, src: 2 });
        b.emit(Op::Add {
            dst: 1,
            left: 1,
            right: 2,
        });
        b.emit(Op::Ret { value: 1 });
    })
    .unwrap();
    assert_eq!(result, str_value("falseundefined"));
}

#[test]
fn test_declare_global_var_keeps_existing_value() {
    let mut interp = create_test_runtime();
    interp.set_global("existing", JsValue::Number(9.0)).unwrap();
    let result = eval_in(&mut interp, |b| {
        b.emit_declare_global_var("existing").unwrap();
        load_global(b, 0, "existing");
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(9.0));
}

#[test]
fn test_array_index_stores_track_length() {
    let result = eval(|b| {
        b.emit(Op::NewArray { dst: 0, size: 3 });
        for index in 0..3u32 {
            load_num(b, 1, f64::from(index) * 10.0);
            b.emit(Op::PutOwnByIndex {
                obj: 0,
                index,
                value: 1,
            });
        }
        b.emit_get_by_id(2, 0, "length").unwrap();
        load_num(b, 3, 9.0);
        b.emit(Op::PutByVal {
            obj: 0,
            key: 3,
            value: 3,
        });
        b.emit_get_by_id(4, 0, "length").unwrap();
        load_num(b, 5, 2.0);
        b.emit(Op::GetByVal {
            dst: 5,
            obj: 0,
            key: 5,
        });
        // "3/10/20"
        load_str(b, 6, "/");
        b.emit(Op::Add {
            dst: 2,
            left: 2,
            right: 6,
        });
        b.emit(Op::Add {
            dst: 2,
            left: 2,
            right: 4,
        });
        b.emit(Op::Add {
            dst: 2,
            left: 2,
            right: 6,
        });
        b.emit(Op::Add {
            dst: 2,
            left: 2,
            right: 5,
        });
        b.emit(Op::Ret { value: 2 });
    })
    .unwrap();
    assert_eq!(result, str_value("3/10/20"));
}

#[test]
fn test_in_operator_and_delete_by_value() {
    let result = eval(|b| {
        b.emit(Op::NewObject { dst: 0 });
        load_num(b, 1, 1.0);
        b.emit_put_by_id(0, "k", 1).unwrap();
        load_str(b, 2, "k");
        b.emit(Op::IsIn {
            dst: 3,
            left: 2,
            right: 0,
        });
        b.emit(Op::DelByVal {
            dst: 4,
            obj: 0,
            key: 2,
        });
        b.emit(Op::IsIn {
            dst: 5,
            left: 2,
            right: 0,
        });
        // true + true + false = 2
        b.emit(Op::Add {
            dst: 3,
            left: 3,
            right: 4,
        });
        b.emit(Op::Add {
            dst: 3,
            left: 3,
            right: 5,
        });
        b.emit(Op::Ret { value: 3 });
    })
    .unwrap();
    assert_eq!(result, JsValue::Number(2.0));
}

/// function Pair(x, y) { this.x = x; this.y = y; }
fn pair_constructor() -> regvm::BytecodeChunk {
    function("Pair", 2, FunctionKind::Normal, |b| {
        b.emit(Op::LoadThis { dst: 0 });
        b.emit_cache_new_object(0, &["x", "y"]).unwrap();
        b.emit(Op::LoadParam { dst: 1, index: 0 });
        b.emit_put_by_id(0, "x", 1).unwrap();
        b.emit(Op::LoadParam { dst: 2, index: 1 });
        b.emit_put_by_id(0, "y", 2).unwrap();
        b.emit(Op::LoadUndefined { dst: 3 });
        b.emit(Op::Ret { value: 3 });
    })
}

#[test]
fn test_new_object_cache_kept_for_straight_line_stores() {
    let chunk = pair_constructor();
    assert!(
        chunk
            .code
            .iter()
            .any(|op| matches!(op, Op::CacheNewObject { .. }))
    );

    let mut interp = create_test_runtime();
    let ctor = eval_in(&mut interp, |b| {
        closure(b, 0, chunk);
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    let first = interp
        .construct(&ctor, &[JsValue::Number(1.0), JsValue::Number(2.0)])
        .unwrap();
    let second = interp
        .construct(&ctor, &[JsValue::Number(3.0), JsValue::Number(4.0)])
        .unwrap();
    let first_class = interp.hidden_class(first.as_object().unwrap());
    assert!(first_class.is_some());
    assert_eq!(first_class, interp.hidden_class(second.as_object().unwrap()));
    assert_eq!(interp.get(&second, "x").unwrap(), JsValue::Number(3.0));
    assert_eq!(interp.get(&second, "y").unwrap(), JsValue::Number(4.0));
}

#[test]
fn test_new_object_cache_dropped_when_a_call_intervenes() {
    let chunk = function("Pair", 2, FunctionKind::Normal, |b| {
        b.emit(Op::LoadThis { dst: 0 });
        b.emit_cache_new_object(0, &["x", "y"]).unwrap();
        b.emit(Op::LoadParam { dst: 1, index: 0 });
        b.emit_put_by_id(0, "x", 1).unwrap();
        b.emit(Op::LoadUndefined { dst: 2 });
        b.emit(Op::Call1 {
            dst: 3,
            callee: 1,
            this: 2,
        });
        b.emit(Op::LoadParam { dst: 2, index: 1 });
        b.emit_put_by_id(0, "y", 2).unwrap();
        b.emit(Op::Ret { value: 2 });
    });
    assert!(
        !chunk
            .code
            .iter()
            .any(|op| matches!(op, Op::CacheNewObject { .. }))
    );
    assert!(matches!(chunk.code.get(1), Some(Op::Nop)));
}

#[test]
fn test_new_object_cache_dropped_for_wrong_key_order() {
    let chunk = function("Pair", 2, FunctionKind::Normal, |b| {
        b.emit(Op::LoadThis { dst: 0 });
        b.emit_cache_new_object(0, &["x", "y"]).unwrap();
        b.emit(Op::LoadParam { dst: 1, index: 0 });
        b.emit_put_by_id(0, "y", 1).unwrap();
        b.emit_put_by_id(0, "x", 1).unwrap();
        b.emit(Op::Ret { value: 1 });
    });
    assert!(matches!(chunk.code.get(1), Some(Op::Nop)));
}

fn record_store(interp: &mut Interpreter, _this: JsValue, args: &[JsValue]) -> Result<JsValue, JsError> {
    let seen = interp.get_global("seen")?;
    let value = args.first().cloned().unwrap_or(JsValue::Undefined);
    interp.call_method(&seen, "push", &[value])?;
    Ok(JsValue::Undefined)
}

fn has_own(interp: &mut Interpreter, target: &JsValue, name: &str) -> JsValue {
    interp
        .call_method(target, "hasOwnProperty", &[JsValue::from(name)])
        .unwrap()
}

#[test]
fn test_new_object_cache_respects_prototype_setter() {
    let mut interp = create_test_runtime();
    let seen = JsValue::Object(interp.create_array(vec![]));
    interp.set_global("seen", seen.clone()).unwrap();
    let setter = interp.register_global_function("recordStore", record_store, 1);
    let ctor = eval_in(&mut interp, |b| {
        closure(b, 0, pair_constructor());
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();

    // warm the cache before the prototype changes
    let before = interp
        .construct(&ctor, &[JsValue::Number(0.0), JsValue::Number(0.0)])
        .unwrap();
    assert_eq!(has_own(&mut interp, &before, "x"), JsValue::Boolean(true));

    let proto = interp.get(&ctor, "prototype").unwrap();
    let descriptor = interp.create_object();
    interp.set(descriptor, "set", JsValue::Object(setter)).unwrap();
    let object = interp.get_global("Object").unwrap();
    interp
        .call_method(
            &object,
            "defineProperty",
            &[proto, JsValue::from("x"), JsValue::Object(descriptor)],
        )
        .unwrap();

    let pair = interp
        .construct(&ctor, &[JsValue::Number(1.0), JsValue::Number(2.0)])
        .unwrap();
    let joined = interp.call_method(&seen, "join", &[]).unwrap();
    assert_eq!(joined, str_value("1"));
    assert_eq!(has_own(&mut interp, &pair, "x"), JsValue::Boolean(false));
    assert_eq!(interp.get(&pair, "x").unwrap(), JsValue::Undefined);
    assert_eq!(interp.get(&pair, "y").unwrap(), JsValue::Number(2.0));
}

#[test]
fn test_new_object_cache_respects_read_only_prototype_property() {
    let mut interp = create_test_runtime();
    let ctor = eval_in(&mut interp, |b| {
        closure(b, 0, pair_constructor());
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    let proto = interp.get(&ctor, "prototype").unwrap();
    let descriptor = interp.value_from_json(&serde_json::json!({"value": 9, "writable": false}));
    let object = interp.get_global("Object").unwrap();
    interp
        .call_method(&object, "defineProperty", &[proto, JsValue::from("y"), descriptor])
        .unwrap();

    let pair = interp
        .construct(&ctor, &[JsValue::Number(1.0), JsValue::Number(2.0)])
        .unwrap();
    assert_eq!(has_own(&mut interp, &pair, "y"), JsValue::Boolean(false));
    assert_eq!(interp.get(&pair, "y").unwrap(), JsValue::Number(9.0));
    assert_eq!(interp.get(&pair, "x").unwrap(), JsValue::Number(1.0));
}

/// Array.prototype[0] = "proto 0"; Array.prototype[1] = "proto 1";
/// const holey = [10, , 12];
/// holey[index]
fn read_holey_array(index: f64) -> JsValue {
    eval(|b| {
        load_global(b, 0, "Array");
        b.emit_get_by_id(0, 0, "prototype").unwrap();
        for (i, text) in [(0.0, "proto 0"), (1.0, "proto 1")] {
            load_num(b, 1, i);
            load_str(b, 2, text);
            b.emit(Op::PutByVal {
                obj: 0,
                key: 1,
                value: 2,
            });
        }
        b.emit(Op::NewArray { dst: 3, size: 3 });
        for i in [0.0, 2.0] {
            load_num(b, 1, i);
            load_num(b, 2, 10.0 + i);
            b.emit(Op::PutByVal {
                obj: 3,
                key: 1,
                value: 2,
            });
        }
        load_num(b, 1, index);
        b.emit(Op::GetByVal {
            dst: 4,
            obj: 3,
            key: 1,
        });
        b.emit(Op::Ret { value: 4 });
    })
    .unwrap()
}

#[test]
fn test_array_hole_reads_through_prototype() {
    assert_eq!(read_holey_array(1.0), str_value("proto 1"));
    assert_eq!(read_holey_array(0.0), JsValue::Number(10.0));
    assert_eq!(read_holey_array(2.0), JsValue::Number(12.0));
    assert_eq!(read_holey_array(3.0), JsValue::Undefined);
}

#[test]
fn test_array_hole_is_not_an_own_property() {
    let mut interp = create_test_runtime();
    let array = eval_in(&mut interp, |b| {
        b.emit(Op::NewArray { dst: 0, size: 0 });
        load_num(b, 1, 2.0);
        load_str(b, 2, "last");
        b.emit(Op::PutByVal {
            obj: 0,
            key: 1,
            value: 2,
        });
        b.emit(Op::Ret { value: 0 });
    })
    .unwrap();
    assert_eq!(interp.get(&array, "length").unwrap(), JsValue::Number(3.0));
    assert_eq!(has_own(&mut interp, &array, "1"), JsValue::Boolean(false));
    assert_eq!(has_own(&mut interp, &array, "2"), JsValue::Boolean(true));
    assert_eq!(interp.get(&array, "0").unwrap(), JsValue::Undefined);
}
