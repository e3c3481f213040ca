//! Built-in registrations every engine starts with: promoted arithmetic,
//! the basic value types, containers and the function plumbing the prelude
//! depends on (`call_exists`, `clone`, `bind`).

use std::{any::Any, rc::Rc};

use indexmap::IndexMap;

use crate::{
    boxed::BoxedValue,
    dispatch::DispatchEngine,
    error::DispatchError,
    function::{BoundFunction, DynamicFunction, NativeFunction, Placeholder, ProxyFn},
    numeric::NumericView,
    register::{default_constructor, fun},
    type_info::TypeInfo,
};

/// The script `Vector` type: a heterogeneous array of boxes.
pub type ScriptVector = Vec<BoxedValue>;

/// The script `Map` type: string keys, insertion-ordered.
pub type ScriptMap = IndexMap<String, BoxedValue>;

/// The script `Pair` type.
#[derive(Clone)]
pub struct Pair {
    pub first: BoxedValue,
    pub second: BoxedValue,
}

impl Default for Pair {
    fn default() -> Self {
        Self {
            first: BoxedValue::undef(),
            second: BoxedValue::undef(),
        }
    }
}

/// A consuming view over a `Vector`, the prelude's iteration primitive.
#[derive(Clone)]
pub struct Range {
    container: BoxedValue,
    index: usize,
}

impl Range {
    fn empty(&self) -> bool {
        self.container
            .with_ref::<ScriptVector, _>(|v| self.index >= v.len())
            .unwrap_or(true)
    }

    fn front(&self) -> BoxedValue {
        self.container
            .with_ref::<ScriptVector, _>(|v| v.get(self.index).cloned())
            .ok()
            .flatten()
            .unwrap_or_else(BoxedValue::undef)
    }
}

fn native(
    types: Vec<TypeInfo>,
    f: impl Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError> + 'static,
) -> ProxyFn {
    Rc::new(NativeFunction::new(types, Box::new(f)))
}

fn dynamic(
    arity: Option<usize>,
    f: impl Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError> + 'static,
) -> ProxyFn {
    Rc::new(DynamicFunction::new(arity, f))
}

/// Registers `clone` and in-place `=` for a value type.
///
/// Every type assignable with `var x = y` needs these two; hosts get them
/// for their own types via `Engine::register_value_type`.
pub(crate) fn register_value_type<T: Any + Clone>(engine: &DispatchEngine) {
    // by-value extraction already clones out of the box
    engine.register_function("clone", fun(|value: T| value));
    engine.register_function(
        "=",
        dynamic(Some(2), |args, _engine| {
            let value = args[1].with_ref::<T, T>(Clone::clone)?;
            args[0].with_mut::<T, _>(|slot| *slot = value)?;
            Ok(args[0].clone())
        }),
    );
}

fn numeric_binary(
    engine: &DispatchEngine,
    name: &str,
    op: impl Fn(&NumericView, &NumericView) -> Result<BoxedValue, DispatchError> + 'static,
) {
    engine.register_function(
        name,
        dynamic(Some(2), move |args, _engine| {
            let lhs = NumericView::new(&args[0])?;
            let rhs = NumericView::new(&args[1])?;
            op(&lhs, &rhs)
        }),
    );
}

fn numeric_compound(
    engine: &DispatchEngine,
    name: &str,
    op: impl Fn(&NumericView, &NumericView) -> Result<BoxedValue, DispatchError> + 'static,
) {
    engine.register_function(
        name,
        dynamic(Some(2), move |args, _engine| {
            let lhs = NumericView::new(&args[0])?;
            let rhs = NumericView::new(&args[1])?;
            let result = NumericView::new(&op(&lhs, &rhs)?)?;
            result.store_into(&args[0])?;
            Ok(args[0].clone())
        }),
    );
}

fn add_numeric_operators(engine: &DispatchEngine) {
    numeric_binary(engine, "+", |l, r| Ok(l.add(r)));
    numeric_binary(engine, "-", |l, r| Ok(l.sub(r)));
    numeric_binary(engine, "*", |l, r| Ok(l.mul(r)));
    numeric_binary(engine, "/", NumericView::div);
    numeric_binary(engine, "%", NumericView::rem);

    numeric_binary(engine, "==", |l, r| Ok(BoxedValue::new(l.eq(r))));
    numeric_binary(engine, "!=", |l, r| Ok(BoxedValue::new(!l.eq(r))));
    numeric_binary(engine, "<", |l, r| Ok(BoxedValue::new(l.lt(r))));
    numeric_binary(engine, "<=", |l, r| Ok(BoxedValue::new(l.le(r))));
    numeric_binary(engine, ">", |l, r| Ok(BoxedValue::new(l.gt(r))));
    numeric_binary(engine, ">=", |l, r| Ok(BoxedValue::new(l.ge(r))));

    numeric_compound(engine, "+=", |l, r| Ok(l.add(r)));
    numeric_compound(engine, "-=", |l, r| Ok(l.sub(r)));
    numeric_compound(engine, "*=", |l, r| Ok(l.mul(r)));
    numeric_compound(engine, "/=", NumericView::div);

    // prefix increment/decrement mutate in place
    engine.register_function(
        "++",
        dynamic(Some(1), |args, _engine| {
            let one = NumericView::new(&BoxedValue::new(1_i64))?;
            let stepped = NumericView::new(&args[0])?.add(&one);
            NumericView::new(&stepped)?.store_into(&args[0])?;
            Ok(args[0].clone())
        }),
    );
    engine.register_function(
        "--",
        dynamic(Some(1), |args, _engine| {
            let one = NumericView::new(&BoxedValue::new(1_i64))?;
            let stepped = NumericView::new(&args[0])?.sub(&one);
            NumericView::new(&stepped)?.store_into(&args[0])?;
            Ok(args[0].clone())
        }),
    );

    // unary minus; the evaluator falls back to `* -1` when absent
    engine.register_function(
        "-",
        dynamic(Some(1), |args, _engine| Ok(NumericView::new(&args[0])?.neg())),
    );

    // cross-type numeric rebind, tried after the exact per-type `=`
    engine.register_function(
        "=",
        dynamic(Some(2), |args, _engine| {
            NumericView::new(&args[1])?.store_into(&args[0])?;
            Ok(args[0].clone())
        }),
    );
}

fn double_to_string(value: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_owned()
}

fn add_basic_types(engine: &DispatchEngine) {
    engine.register_type::<()>("void");
    engine.register_type::<bool>("bool");
    engine.register_type::<i64>("int");
    engine.register_type::<f64>("double");
    engine.register_type::<char>("char");
    engine.register_type::<String>("string");
    engine.register_type::<ProxyFn>("function");

    register_value_type::<bool>(engine);
    register_value_type::<i64>(engine);
    register_value_type::<f64>(engine);
    register_value_type::<char>(engine);
    register_value_type::<String>(engine);
    register_value_type::<ProxyFn>(engine);

    engine.register_function("internal_to_string", fun(|s: String| s));
    engine.register_function(
        "internal_to_string",
        fun(|b: bool| if b { "true".to_owned() } else { "false".to_owned() }),
    );
    engine.register_function("internal_to_string", fun(|i: i64| i.to_string()));
    engine.register_function("internal_to_string", fun(double_to_string));
    engine.register_function("internal_to_string", fun(|c: char| c.to_string()));

    engine.register_function(
        "to_int",
        native(vec![TypeInfo::of::<String>()], |args, engine| {
            let text = engine.boxed_cast::<String>(&args[0])?;
            text.trim()
                .parse::<i64>()
                .map(BoxedValue::new)
                .map_err(|_| DispatchError::Arithmetic(format!("can not parse '{text}' as int")))
        }),
    );
    engine.register_function(
        "to_double",
        native(vec![TypeInfo::of::<String>()], |args, engine| {
            let text = engine.boxed_cast::<String>(&args[0])?;
            text.trim()
                .parse::<f64>()
                .map(BoxedValue::new)
                .map_err(|_| DispatchError::Arithmetic(format!("can not parse '{text}' as double")))
        }),
    );
    engine.register_function("to_int", fun(|d: f64| d as i64));
    engine.register_function("to_double", fun(|i: i64| i as f64));
}

fn add_string_operators(engine: &DispatchEngine) {
    engine.register_function("+", fun(|a: String, b: String| format!("{a}{b}")));
    engine.register_function("+", fun(|a: String, c: char| format!("{a}{c}")));
    engine.register_function(
        "+=",
        fun(|a: &mut String, b: String| {
            a.push_str(&b);
            a.clone()
        }),
    );
    engine.register_function("==", fun(|a: String, b: String| a == b));
    engine.register_function("!=", fun(|a: String, b: String| a != b));
    engine.register_function("<", fun(|a: String, b: String| a < b));
    engine.register_function("<=", fun(|a: String, b: String| a <= b));
    engine.register_function(">", fun(|a: String, b: String| a > b));
    engine.register_function(">=", fun(|a: String, b: String| a >= b));

    engine.register_function("size", fun(|s: &mut String| s.chars().count() as i64));
    engine.register_function("empty", fun(|s: &mut String| s.is_empty()));
    engine.register_function(
        "[]",
        native(
            vec![TypeInfo::of_const_ref::<String>(), TypeInfo::of::<i64>()],
            |args, engine| {
                let index = engine.boxed_cast::<i64>(&args[1])?;
                let found = args[0].with_ref::<String, _>(|s| {
                    usize::try_from(index).ok().and_then(|i| s.chars().nth(i))
                })?;
                found.map(BoxedValue::new).ok_or(DispatchError::OutOfRange)
            },
        ),
    );
}

fn add_containers(engine: &DispatchEngine) {
    engine.register_type::<ScriptVector>("Vector");
    engine.register_type::<ScriptMap>("Map");
    engine.register_type::<Pair>("Pair");
    engine.register_type::<Range>("Range");

    register_value_type::<ScriptVector>(engine);
    register_value_type::<ScriptMap>(engine);
    register_value_type::<Pair>(engine);
    register_value_type::<Range>(engine);

    // Vector
    engine.register_function("Vector", default_constructor::<ScriptVector>());
    engine.register_function(
        "push_back",
        fun(|v: &mut ScriptVector, item: BoxedValue| {
            v.push(item);
        }),
    );
    engine.register_function(
        "pop_back",
        fun(|v: &mut ScriptVector| {
            v.pop();
        }),
    );
    engine.register_function("size", fun(|v: &mut ScriptVector| v.len() as i64));
    engine.register_function("empty", fun(|v: &mut ScriptVector| v.is_empty()));
    engine.register_function("clear", fun(|v: &mut ScriptVector| v.clear()));
    engine.register_function(
        "[]",
        native(
            vec![TypeInfo::of_const_ref::<ScriptVector>(), TypeInfo::of::<i64>()],
            |args, engine| {
                let index = engine.boxed_cast::<i64>(&args[1])?;
                let found = args[0].with_ref::<ScriptVector, _>(|v| {
                    usize::try_from(index).ok().and_then(|i| v.get(i).cloned())
                })?;
                found.ok_or(DispatchError::OutOfRange)
            },
        ),
    );

    // Map: `[]` creates the slot, assignment fills it
    engine.register_function("Map", default_constructor::<ScriptMap>());
    engine.register_function(
        "[]",
        native(
            vec![TypeInfo::of_ref::<ScriptMap>(), TypeInfo::of::<String>()],
            |args, engine| {
                let key = engine.boxed_cast::<String>(&args[1])?;
                args[0].with_mut::<ScriptMap, _>(|m| m.entry(key).or_insert_with(BoxedValue::undef).clone())
            },
        ),
    );
    engine.register_function("size", fun(|m: &mut ScriptMap| m.len() as i64));
    engine.register_function("empty", fun(|m: &mut ScriptMap| m.is_empty()));
    engine.register_function("clear", fun(|m: &mut ScriptMap| m.clear()));
    engine.register_function(
        "count",
        fun(|m: &mut ScriptMap, key: String| i64::from(m.contains_key(&key))),
    );

    // Pair
    engine.register_function("Pair", default_constructor::<Pair>());
    engine.register_function(
        "Pair",
        fun(|first: BoxedValue, second: BoxedValue| Pair { first, second }),
    );
    engine.register_function("first", fun(|p: &mut Pair| p.first.clone()));
    engine.register_function("second", fun(|p: &mut Pair| p.second.clone()));

    // Range over Vector
    engine.register_function(
        "range",
        native(vec![TypeInfo::of_const_ref::<ScriptVector>()], |args, _engine| {
            if !args[0].type_info().is::<ScriptVector>() {
                return Err(DispatchError::BadCast {
                    from: args[0].type_info().name(),
                    to: "Vector",
                });
            }
            Ok(BoxedValue::new(Range {
                container: args[0].clone(),
                index: 0,
            }))
        }),
    );
    engine.register_function("empty", fun(|r: &mut Range| r.empty()));
    engine.register_function("front", fun(|r: &mut Range| r.front()));
    engine.register_function(
        "pop_front",
        fun(|r: &mut Range| {
            r.index += 1;
        }),
    );
}

fn add_function_plumbing(engine: &DispatchEngine) {
    engine.add_object("_", BoxedValue::new(Placeholder));

    engine.register_function(
        "bind",
        dynamic(None, |args, _engine| {
            if args.len() < 2 {
                return Err(DispatchError::ArityMismatch {
                    expected: 2,
                    got: args.len(),
                });
            }
            let inner = args[0].cast::<ProxyFn>()?;
            let bound: ProxyFn = Rc::new(BoundFunction::new(inner, args[1..].to_vec()));
            Ok(BoxedValue::new(bound))
        }),
    );

    engine.register_function(
        "call_exists",
        dynamic(None, |args, engine| {
            if args.is_empty() {
                return Err(DispatchError::ArityMismatch {
                    expected: 1,
                    got: 0,
                });
            }
            let callable = args[0].cast::<ProxyFn>()?;
            Ok(BoxedValue::new(callable.types_match(&args[1..], engine)))
        }),
    );

    engine.register_function(
        "type_match",
        fun(|a: BoxedValue, b: BoxedValue| a.type_info().bare_eq(&b.type_info())),
    );

    engine.register_function(
        "eval",
        dynamic(Some(1), |args, engine| {
            let code = args[0].cast::<String>()?;
            crate::eval::eval_string(engine, &code, "__EVAL__").map_err(|error| match error {
                crate::error::ChaiError::Parse(parse) => DispatchError::Eval(Box::new(
                    crate::error::EvalError::new(parse.reason, Some(parse.loc)),
                )),
                crate::error::ChaiError::Eval(eval) => DispatchError::Eval(Box::new(eval)),
                other => DispatchError::Arithmetic(other.to_string()),
            })
        }),
    );
}

fn add_output(engine: &DispatchEngine) {
    engine.register_function(
        "print_string",
        native(vec![TypeInfo::of::<String>()], |args, engine| {
            let text = engine.boxed_cast::<String>(&args[0])?;
            engine.with_printer(|printer| printer.write_str(&text));
            Ok(BoxedValue::void_value())
        }),
    );
    engine.register_function(
        "println_string",
        native(vec![TypeInfo::of::<String>()], |args, engine| {
            let text = engine.boxed_cast::<String>(&args[0])?;
            engine.with_printer(|printer| printer.write_line(&text));
            Ok(BoxedValue::void_value())
        }),
    );

    engine.register_function(
        "dump_object",
        dynamic(Some(1), |args, engine| {
            let line = args[0].type_info().name().to_owned();
            engine.with_printer(|printer| printer.write_line(&line));
            Ok(BoxedValue::void_value())
        }),
    );
    engine.register_function(
        "dump_system",
        dynamic(Some(0), |_args, engine| {
            engine.with_printer(|printer| printer.write_line("Registered types:"));
            for (name, info) in engine.types() {
                let line = format!("  {name}: {}", info.name());
                engine.with_printer(|printer| printer.write_line(&line));
            }
            engine.with_printer(|printer| printer.write_line("Functions:"));
            for (name, function) in engine.functions() {
                let params: Vec<&str> = function.param_types().iter().map(TypeInfo::name).collect();
                let line = format!("  {name}({})", params.join(", "));
                engine.with_printer(|printer| printer.write_line(&line));
            }
            Ok(BoxedValue::void_value())
        }),
    );
}

/// Populates a fresh engine with the full built-in surface.
pub(crate) fn bootstrap(engine: &DispatchEngine) {
    add_basic_types(engine);
    add_numeric_operators(engine);
    add_string_operators(engine);
    add_containers(engine);
    add_function_plumbing(engine);
    add_output(engine);
}
