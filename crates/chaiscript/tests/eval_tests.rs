use chaiscript::{BoxedValue, ChaiError, CollectStringPrint, Engine, NumericView, ProxyFn};
use pretty_assertions::assert_eq;

#[test]
fn arithmetic_promotion() {
    let mut engine = Engine::new();
    let result = engine.eval("1 + 2.5").unwrap();
    let view = NumericView::new(&result).unwrap();
    assert!(view.is_float);
    assert_eq!(view.as_f64, 3.5);
}

#[test]
fn integer_arithmetic_keeps_integer_semantics() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("7 / 2").unwrap(), 3);
    assert_eq!(engine.eval_as::<i64>("7 % 2").unwrap(), 1);
    assert_eq!(engine.eval_as::<f64>("7.0 / 2").unwrap(), 3.5);
}

#[test]
fn guarded_definition_and_recursion() {
    let mut engine = Engine::new();
    let result = engine
        .eval("def fact(n) : n <= 1 { 1 }\ndef fact(n) { n * fact(n - 1) }\nfact(5)")
        .unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 120);
}

#[test]
fn host_overloads_resolve_by_argument_type() {
    let mut engine = Engine::new();
    engine.register_function("f", |_x: i64| "int".to_owned());
    engine.register_function("f", |_x: f64| "double".to_owned());

    assert_eq!(engine.eval_as::<String>("f(1)").unwrap(), "int");
    assert_eq!(engine.eval_as::<String>("f(1.0)").unwrap(), "double");
}

#[test]
fn method_call_sugar_dispatches_with_receiver_first() {
    let mut engine = Engine::new();
    engine.register_function("reverse", |s: &mut String| s.chars().rev().collect::<String>());

    assert_eq!(engine.eval_as::<i64>("\"hello\".size()").unwrap(), 5);
    assert_eq!(engine.eval_as::<String>("\"abc\".reverse()").unwrap(), "cba");
}

#[test]
fn lambda_round_trips_to_the_host() {
    let mut engine = Engine::new();
    let boxed = engine.eval("fun(x) { x * x }").unwrap();
    let square: ProxyFn = engine.boxed_cast(&boxed).unwrap();

    let result = engine.call(&square, vec![BoxedValue::new(7_i64)]).unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 49);
}

#[test]
fn break_unwinds_to_the_innermost_loop() {
    let mut engine = Engine::new();
    let result = engine
        .eval("var i = 0\nwhile (true) { if (i == 3) { break }\ni += 1 }\ni")
        .unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 3);
}

#[test]
fn return_propagates_through_loops() {
    let mut engine = Engine::new();
    let result = engine
        .eval("def first_over(limit) { var i = 0\nwhile (true) { if (i > limit) { return i }\ni += 1 } }\nfirst_over(4)")
        .unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 5);
}

#[test]
fn parse_error_carries_the_position() {
    let mut engine = Engine::new();
    match engine.eval("if(x") {
        Err(ChaiError::Parse(error)) => {
            assert_eq!(error.loc.start_line, 1);
            assert_eq!(error.loc.start_col, 5);
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn dispatch_error_preserves_engine_state() {
    let mut engine = Engine::new();
    let depth_before = engine.dispatch().stack_depth();

    let error = engine.eval("undefined_name()").unwrap_err();
    assert!(matches!(error, ChaiError::Eval(_)));

    assert_eq!(engine.dispatch().stack_depth(), depth_before);
    assert_eq!(engine.eval_as::<i64>("1 + 1").unwrap(), 2);
}

#[test]
fn boolean_logic_short_circuits() {
    let mut engine = Engine::new();
    engine.register_function("explode", || -> bool { panic!("must not be evaluated") });

    assert!(!engine.eval_as::<bool>("false && explode()").unwrap());
    assert!(engine.eval_as::<bool>("true || explode()").unwrap());
    assert!(!engine.eval_as::<bool>("!true").unwrap());
}

#[test]
fn if_elseif_else_chain() {
    let mut engine = Engine::new();
    let source = "def grade(n) { if (n >= 90) { \"a\" } elseif (n >= 80) { \"b\" } else { \"c\" } }";
    engine.eval(source).unwrap();

    assert_eq!(engine.eval_as::<String>("grade(95)").unwrap(), "a");
    assert_eq!(engine.eval_as::<String>("grade(85)").unwrap(), "b");
    assert_eq!(engine.eval_as::<String>("grade(5)").unwrap(), "c");
}

#[test]
fn for_loop_accumulates() {
    let mut engine = Engine::new();
    let result = engine
        .eval("var total = 0\nfor (var i = 1; i <= 4; i += 1) { total += i }\ntotal")
        .unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 10);
}

#[test]
fn clone_on_copy_keeps_variables_independent() {
    let mut engine = Engine::new();
    let result = engine.eval("var a = 5\nvar b = a\nb = 7\na").unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 5);
}

#[test]
fn reference_rebind_shares_storage() {
    let mut engine = Engine::new();
    let result = engine.eval("var b = 5\nvar a\na := b\na = 7\nb").unwrap();
    assert_eq!(result.cast::<i64>().unwrap(), 7);

    let reverse = engine.eval("var d = 1\nvar c\nc := d\nd = 9\nc").unwrap();
    assert_eq!(reverse.cast::<i64>().unwrap(), 9);
}

#[test]
fn rebind_of_mismatched_types_fails() {
    let mut engine = Engine::new();
    let error = engine.eval("var a = 1\na := \"text\"").unwrap_err();
    match error {
        ChaiError::Eval(eval) => assert!(eval.reason.contains("Mismatched types")),
        other => panic!("expected an eval error, got {other}"),
    }
}

#[test]
fn inline_array_literals_build_vectors() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("[1, 2, 3].size()").unwrap(), 3);
    assert_eq!(engine.eval_as::<i64>("var v = [10, 20, 30]\nv[1]").unwrap(), 20);
    assert_eq!(engine.eval_as::<bool>("[].empty()").unwrap(), true);
}

#[test]
fn inline_map_literals_build_maps() {
    let mut engine = Engine::new();
    let source = "var m = [\"a\" : 1, \"b\" : 2]\nm[\"b\"]";
    assert_eq!(engine.eval_as::<i64>(source).unwrap(), 2);
    assert_eq!(engine.eval_as::<i64>("[\"x\" : 1].size()").unwrap(), 1);
}

#[test]
fn chained_indexing_through_a_member_call() {
    let mut engine = Engine::new();
    let result = engine
        .eval_as::<i64>("var rows = [[1, 2], [3, 4]]\nrows.clone()[1][0]")
        .unwrap();
    assert_eq!(result, 3);
}

#[test]
fn array_index_out_of_range_is_an_eval_error() {
    let mut engine = Engine::new();
    let error = engine.eval("var v = [1, 2]\nv[5]").unwrap_err();
    match error {
        ChaiError::Eval(eval) => assert!(eval.reason.contains("Out of bounds")),
        other => panic!("expected an eval error, got {other}"),
    }
}

#[test]
fn negation_works_through_multiplication_fallback() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("-4").unwrap(), -4);
    assert_eq!(engine.eval_as::<f64>("-(1.5 + 1.0)").unwrap(), -2.5);
}

#[test]
fn prefix_increment_mutates_in_place() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("var x = 1\n++x\nx").unwrap(), 2);
    assert_eq!(engine.eval_as::<i64>("var y = 1\n--y\ny").unwrap(), 0);
}

#[test]
fn prelude_to_string_and_print() {
    let mut engine = Engine::new();
    let writer = CollectStringPrint::new();
    let output = writer.handle();
    engine.set_print_writer(Box::new(writer));

    engine.eval("print(42)").unwrap();
    engine.eval("print(\"text\")").unwrap();
    engine.eval("print([1, 2])").unwrap();
    engine.eval("puts(1.5)").unwrap();

    assert_eq!(&*output.borrow(), "42\ntext\n[1, 2]\n1.5");
}

#[test]
fn prelude_map_and_reduce() {
    let mut engine = Engine::new();
    let doubled = engine.eval_as::<i64>("[1, 2, 3].map(fun(x) { x * 2 })[2]").unwrap();
    assert_eq!(doubled, 6);

    let total = engine
        .eval_as::<i64>("[1, 2, 3, 4].reduce(fun(x, acc) { x + acc }, 0)")
        .unwrap();
    assert_eq!(total, 10);

    let joined = engine.eval_as::<String>("[1, 2, 3].join(\"-\")").unwrap();
    assert_eq!(joined, "1-2-3");
}

#[test]
fn pair_to_string_selects_the_guarded_overload() {
    let mut engine = Engine::new();
    assert_eq!(
        engine.eval_as::<String>("to_string(Pair(1, 2))").unwrap(),
        "<1, 2>"
    );
    assert_eq!(engine.eval_as::<i64>("Pair(7, 8).first()").unwrap(), 7);
}

#[test]
fn backtick_names_make_operators_first_class() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("`+`(3, 4)").unwrap(), 7);
    assert_eq!(
        engine.eval_as::<i64>("[1, 2, 3].reduce(`+`, 0)").unwrap(),
        6
    );
}

#[test]
fn bind_partially_applies() {
    let mut engine = Engine::new();
    engine.register_function("sub", |a: i64, b: i64| a - b);
    assert_eq!(engine.eval_as::<i64>("var f = bind(sub, _, 3)\nf(10)").unwrap(), 7);
    assert_eq!(engine.eval_as::<i64>("var g = bind(sub, 10, _)\ng(3)").unwrap(), 7);
}

#[test]
fn eval_builtin_is_reentrant() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("eval(\"2 + 3\")").unwrap(), 5);
}

#[test]
fn top_level_return_yields_the_value() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("return 11").unwrap(), 11);
}

#[test]
fn statements_separated_by_semicolons() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<i64>("var x = 1; x += 2; x").unwrap(), 3);
}

#[test]
fn condition_must_be_boolean() {
    let mut engine = Engine::new();
    let error = engine.eval("if (1) { 2 }").unwrap_err();
    match error {
        ChaiError::Eval(eval) => assert!(eval.reason.contains("not boolean")),
        other => panic!("expected an eval error, got {other}"),
    }
}

#[test]
fn char_literals_compare_as_arithmetic() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<bool>("'a' == 'a'").unwrap(), true);
    assert_eq!(engine.eval_as::<bool>("'a' < 'b'").unwrap(), true);
}

#[test]
fn string_operations() {
    let mut engine = Engine::new();
    assert_eq!(engine.eval_as::<String>("\"foo\" + \"bar\"").unwrap(), "foobar");
    assert_eq!(engine.eval_as::<bool>("\"a\" < \"b\"").unwrap(), true);
    assert_eq!(engine.eval_as::<char>("var t = \"abc\"\nt[1]").unwrap(), 'b');
    assert_eq!(
        engine.eval_as::<String>("var s = \"a\"\ns += \"b\"\ns").unwrap(),
        "ab"
    );
}

#[test]
fn eval_file_reports_missing_files() {
    let mut engine = Engine::new();
    assert!(matches!(
        engine.eval_file("/nonexistent/path.chai"),
        Err(ChaiError::Io(_))
    ));
}

#[test]
fn host_function_sees_script_mutations_through_shared_values() {
    let mut engine = Engine::new();
    let shared = std::rc::Rc::new(std::cell::RefCell::new(0_i64));
    engine.add("counter", BoxedValue::shared(std::rc::Rc::clone(&shared)));

    engine.eval("counter = 41\ncounter += 1").unwrap();
    assert_eq!(*shared.borrow(), 42);
}
