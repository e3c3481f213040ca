use std::rc::Rc;

use chaiscript::{
    BoxedValue, ChaiError, DispatchEngine, DispatchError, DynamicFunction, Engine, ProxyFn,
    conversion, fun,
};

#[test]
fn objects_resolve_innermost_first_and_die_with_their_frame() {
    let engine = DispatchEngine::new();
    engine.add_object("x", BoxedValue::new(1_i64));

    engine.push_scope();
    engine.add_object("x", BoxedValue::new(2_i64));
    assert_eq!(engine.get_object("x").unwrap().cast::<i64>().unwrap(), 2);

    engine.pop_scope().unwrap();
    assert_eq!(engine.get_object("x").unwrap().cast::<i64>().unwrap(), 1);
}

#[test]
fn popping_the_global_scope_fails() {
    let engine = DispatchEngine::new();
    assert!(matches!(engine.pop_scope(), Err(DispatchError::ScopeUnderflow)));

    engine.push_scope();
    engine.pop_scope().unwrap();
    assert!(engine.pop_scope().is_err());
}

#[test]
fn set_object_mutates_the_first_match_walking_outward() {
    let engine = DispatchEngine::new();
    engine.add_object("a", BoxedValue::new(1_i64));
    engine.push_scope();

    engine.set_object("a", BoxedValue::new(5_i64));
    engine.pop_scope().unwrap();
    assert_eq!(engine.get_object("a").unwrap().cast::<i64>().unwrap(), 5);

    // no frame holds the name: lands in the global frame
    engine.push_scope();
    engine.set_object("fresh", BoxedValue::new(7_i64));
    engine.pop_scope().unwrap();
    assert_eq!(engine.get_object("fresh").unwrap().cast::<i64>().unwrap(), 7);
}

#[test]
fn earlier_registration_wins_for_equal_argument_lists() {
    let engine = DispatchEngine::new();
    engine.register_function("pick", fun(|_: i64| "first".to_owned()));
    engine.register_function(
        "pick",
        Rc::new(DynamicFunction::new(Some(1), |_args, _engine| {
            Ok(BoxedValue::new("second".to_owned()))
        })) as ProxyFn,
    );

    let result = engine.call_name("pick", &[BoxedValue::new(1_i64)]).unwrap();
    assert_eq!(result.cast::<String>().unwrap(), "first");
}

#[test]
fn equal_signatures_deduplicate_on_registration() {
    let engine = DispatchEngine::new();
    assert!(engine.register_function("f", fun(|x: i64| x)));
    assert!(!engine.register_function("f", fun(|x: i64| x + 1)));
    assert!(engine.register_function("f", fun(|x: f64| x)));

    let result = engine.call_name("f", &[BoxedValue::new(3_i64)]).unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 3);
}

#[test]
fn guarded_overload_is_tried_before_falling_through() {
    let engine = DispatchEngine::new();

    let guard: ProxyFn = Rc::new(DynamicFunction::new(Some(1), |args, _engine| {
        let n = args[0].cast::<i64>()?;
        Ok(BoxedValue::new(n > 10))
    }));
    engine.register_function(
        "describe",
        Rc::new(
            DynamicFunction::new(Some(1), |_args, _engine| Ok(BoxedValue::new("big".to_owned())))
                .with_guard(guard),
        ) as ProxyFn,
    );
    engine.register_function(
        "describe",
        Rc::new(DynamicFunction::new(Some(1), |_args, _engine| {
            Ok(BoxedValue::new("small".to_owned()))
        })) as ProxyFn,
    );

    let big = engine.call_name("describe", &[BoxedValue::new(11_i64)]).unwrap();
    assert_eq!(big.cast::<String>().unwrap(), "big");
    let small = engine.call_name("describe", &[BoxedValue::new(2_i64)]).unwrap();
    assert_eq!(small.cast::<String>().unwrap(), "small");
}

#[test]
fn function_names_resolve_to_dispatch_groups() {
    let engine = DispatchEngine::new();
    engine.register_function("twice", fun(|x: i64| x * 2));

    let group = engine.get_object("twice").expect("functions are first-class");
    let callable = group.cast::<ProxyFn>().unwrap();
    let result = callable.call(&[BoxedValue::new(4_i64)], &engine).unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 8);
}

#[test]
fn unknown_names_resolve_to_nothing() {
    let engine = DispatchEngine::new();
    assert!(engine.get_object("missing").is_none());
    assert!(matches!(
        engine.call_name("missing", &[]),
        Err(DispatchError::NoMatch)
    ));
}

#[test]
fn save_and_restore_state_covers_functions_but_not_scopes() {
    let engine = DispatchEngine::new();
    engine.register_function("keep", fun(|| 1_i64));
    let snapshot = engine.save_state();

    engine.register_function("extra", fun(|| 2_i64));
    engine.add_object("local", BoxedValue::new(3_i64));

    engine.restore_state(snapshot);
    assert!(engine.call_name("keep", &[]).is_ok());
    assert!(matches!(engine.call_name("extra", &[]), Err(DispatchError::NoMatch)));
    // scopes are untouched by state restoration
    assert!(engine.get_object("local").is_some());
}

#[test]
fn locals_round_trip() {
    let engine = DispatchEngine::new();
    engine.add_object("kept", BoxedValue::new(9_i64));
    let locals = engine.get_locals();

    engine.set_locals(Vec::new());
    assert!(engine.get_object("kept").is_none());

    engine.set_locals(locals);
    assert_eq!(engine.get_object("kept").unwrap().cast::<i64>().unwrap(), 9);
}

#[derive(Clone)]
struct Feet(f64);
#[derive(Clone)]
struct Meters(f64);

#[test]
fn registered_conversions_widen_overload_matching() {
    let mut engine = Engine::new();
    engine.register_value_type::<Feet>();
    engine.register_value_type::<Meters>();
    engine.register_conversion(conversion(|f: &Feet| Meters(f.0 * 0.3048)));
    engine.register_function("in_meters", |m: Meters| m.0);

    engine.add("height", BoxedValue::new(Feet(10.0)));
    let meters = engine.eval_as::<f64>("in_meters(height)").unwrap();
    assert!((meters - 3.048).abs() < 1e-9);
}

#[test]
fn vector_conversion_bridges_script_arrays_to_host_vecs() {
    let mut engine = Engine::new();
    engine.register_vector_conversion::<i64>();
    engine.register_function("sum", |values: Vec<i64>| values.iter().sum::<i64>());

    assert_eq!(engine.eval_as::<i64>("sum([1, 2, 3, 4])").unwrap(), 10);
}

#[test]
fn host_call_function_dispatches_like_script() {
    let mut engine = Engine::new();
    engine.register_function("join2", |a: String, b: String| format!("{a}:{b}"));

    let result = engine
        .call_function(
            "join2",
            vec![BoxedValue::from("x"), BoxedValue::from("y")],
        )
        .unwrap();
    assert_eq!(result.cast::<String>().unwrap(), "x:y");

    assert!(matches!(
        engine.call_function("join2", vec![BoxedValue::new(1_i64)]),
        Err(ChaiError::Dispatch(_))
    ));
}

#[test]
fn script_definitions_join_the_overload_set() {
    let mut engine = Engine::new();
    engine.register_function("mix", |x: i64| x * 10);
    engine.eval("def mix(a, b) { a + b }").unwrap();

    assert_eq!(engine.eval_as::<i64>("mix(3)").unwrap(), 30);
    assert_eq!(engine.eval_as::<i64>("mix(3, 4)").unwrap(), 7);
}

#[test]
fn dynamic_functions_receive_the_raw_argument_list() {
    let mut engine = Engine::new();
    engine.register_dynamic("count_args", None, |args, _engine| {
        Ok(BoxedValue::new(args.len() as i64))
    });

    assert_eq!(engine.eval_as::<i64>("count_args(1, \"a\", 2.5)").unwrap(), 3);
    assert_eq!(engine.eval_as::<i64>("count_args()").unwrap(), 0);
}

#[test]
fn call_exists_inspects_overload_sets() {
    let mut engine = Engine::new();
    engine.register_function("only_int", |x: i64| x);

    assert!(engine.eval_as::<bool>("call_exists(only_int, 1)").unwrap());
    assert!(!engine.eval_as::<bool>("call_exists(only_int, \"s\")").unwrap());
    assert!(!engine.eval_as::<bool>("call_exists(only_int, 1, 2)").unwrap());
}
