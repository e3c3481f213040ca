//! The tree-walking evaluator.
//!
//! Control flow is an explicit interrupt channel instead of exceptions:
//! `return` and `break` travel as [`EvalInterrupt`] variants until their
//! designated boundary (the innermost function call / loop) absorbs them,
//! and every scope push is paired with a drop guard so frames are released
//! on all exit paths.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::{
    boxed::BoxedValue,
    dispatch::DispatchEngine,
    error::{ChaiError, CodeLoc, DispatchError, EvalError},
    function::{DynamicFunction, ProxyFn},
    parse::{Node, NodeKind, parse},
};

/// Non-local exits of the evaluator.
pub(crate) enum EvalInterrupt {
    /// `return` unwinding to the nearest function call boundary.
    Return(BoxedValue),
    /// `break` unwinding to the innermost loop.
    Break(CodeLoc),
    /// A runtime error unwinding to the eval entry point.
    Error(Box<EvalError>),
}

type Flow = Result<BoxedValue, EvalInterrupt>;

type Args = SmallVec<[BoxedValue; 4]>;

/// Parses and evaluates a source text against the engine.
pub(crate) fn eval_string(
    engine: &DispatchEngine,
    source: &str,
    filename: &str,
) -> Result<BoxedValue, ChaiError> {
    match parse(source, filename)? {
        None => Ok(BoxedValue::void_value()),
        Some(ast) => eval_ast(engine, &ast).map_err(ChaiError::Eval),
    }
}

/// Evaluates a parsed file, absorbing a top-level `return`.
pub(crate) fn eval_ast(engine: &DispatchEngine, ast: &Rc<Node>) -> Result<BoxedValue, EvalError> {
    match eval_node(engine, ast) {
        Ok(value) => Ok(value),
        Err(EvalInterrupt::Return(value)) => Ok(value),
        Err(EvalInterrupt::Break(loc)) => Err(engine.make_error("'break' used outside of loop", Some(loc))),
        Err(EvalInterrupt::Error(error)) => Err(*error),
    }
}

/// Evaluates a script function body in a fresh scope frame.
///
/// Parameters bind by name in declaration order; a `return` unwind becomes
/// the call result here. This is the callable shape `def` and `fun` wrap
/// into a [`DynamicFunction`].
pub(crate) fn eval_script_function(
    engine: &DispatchEngine,
    body: &Rc<Node>,
    params: &[String],
    args: &[BoxedValue],
) -> Result<BoxedValue, DispatchError> {
    let _frame = engine.scope_guard();
    for (name, value) in params.iter().zip(args) {
        engine.add_object(name.clone(), value.clone());
    }
    match eval_node(engine, body) {
        Ok(value) => Ok(value),
        Err(EvalInterrupt::Return(value)) => Ok(value),
        Err(EvalInterrupt::Break(loc)) => Err(DispatchError::Eval(Box::new(
            engine.make_error("'break' used outside of loop", Some(loc)),
        ))),
        Err(EvalInterrupt::Error(error)) => Err(DispatchError::Eval(error)),
    }
}

fn error(engine: &DispatchEngine, reason: impl Into<String>, node: &Node) -> EvalInterrupt {
    EvalInterrupt::Error(Box::new(engine.make_error(reason, Some(node.loc.clone()))))
}

/// Maps a dispatch failure at an eval site onto an [`EvalInterrupt`].
///
/// Script-function errors pass through with their own location; everything
/// retryable that survived resolution means no overload fit.
fn failure(engine: &DispatchEngine, cause: DispatchError, what: &str, node: &Node) -> EvalInterrupt {
    match cause {
        DispatchError::Eval(inner) => EvalInterrupt::Error(inner),
        DispatchError::OutOfRange => error(engine, "Out of bounds exception", node),
        DispatchError::Arithmetic(reason) => error(engine, reason, node),
        DispatchError::NoMatch
        | DispatchError::BadCast { .. }
        | DispatchError::ArityMismatch { .. }
        | DispatchError::GuardFailed => error(engine, format!("Can not find appropriate '{what}'"), node),
        other => error(engine, other.to_string(), node),
    }
}

fn condition(engine: &DispatchEngine, value: &BoxedValue, what: &str, node: &Node) -> Result<bool, EvalInterrupt> {
    value.cast::<bool>().map_err(|_| error(engine, what, node))
}

fn eval_children_last(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut retval = BoxedValue::void_value();
    for child in &node.children {
        retval = eval_node(engine, child)?;
    }
    Ok(retval)
}

pub(crate) fn eval_node(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    match node.kind {
        NodeKind::File => eval_children_last(engine, node),
        NodeKind::Block => {
            let _frame = engine.scope_guard();
            eval_children_last(engine, node)
        }
        NodeKind::Id => eval_id(engine, node),
        NodeKind::Int => match node.text.parse::<i64>() {
            Ok(value) => Ok(BoxedValue::new(value)),
            Err(_) => Err(error(engine, "Integer literal out of range", node)),
        },
        NodeKind::Float => match node.text.parse::<f64>() {
            Ok(value) => Ok(BoxedValue::new(value)),
            Err(_) => Err(error(engine, "Malformed floating point literal", node)),
        },
        NodeKind::String => Ok(BoxedValue::new(node.text.clone())),
        NodeKind::Char => {
            let mut chars = node.text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(BoxedValue::new(c)),
                _ => Err(error(
                    engine,
                    "Single-quoted string must contain exactly one character",
                    node,
                )),
            }
        }
        NodeKind::VarDecl => {
            let name = node.children[0].text.clone();
            let fresh = BoxedValue::undef();
            engine.add_object(name, fresh.clone());
            Ok(fresh)
        }
        NodeKind::Equation => eval_equation(engine, node),
        NodeKind::Expression => eval_boolean_chain(engine, node),
        NodeKind::Comparison | NodeKind::Additive | NodeKind::Multiplicative => eval_binary_fold(engine, node),
        NodeKind::ArrayCall => eval_array_call(engine, node),
        NodeKind::Negate => eval_negate(engine, node),
        NodeKind::Not => {
            let value = eval_node(engine, &node.children[0])?;
            let cond = condition(engine, &value, "Boolean not('!') condition not boolean", &node.children[0])?;
            Ok(BoxedValue::new(!cond))
        }
        NodeKind::Prefix => {
            let op = &node.children[0];
            let operand = eval_node(engine, &node.children[1])?;
            engine
                .call_name(&op.text, &[operand])
                .map_err(|cause| failure(engine, cause, &op.text, op))
        }
        NodeKind::InlineArray => eval_inline_array(engine, node),
        NodeKind::InlineMap => eval_inline_map(engine, node),
        NodeKind::FunCall => eval_fun_call(engine, node),
        NodeKind::DotAccess => eval_dot_access(engine, node),
        NodeKind::If => eval_if(engine, node),
        NodeKind::While => eval_while(engine, node),
        NodeKind::For => eval_for(engine, node),
        NodeKind::Def => eval_def(engine, node),
        NodeKind::Lambda => Ok(BoxedValue::new(make_lambda(node))),
        NodeKind::Return => {
            let value = match node.children.first() {
                Some(child) => eval_node(engine, child)?,
                None => BoxedValue::void_value(),
            };
            Err(EvalInterrupt::Return(value))
        }
        NodeKind::Break => Err(EvalInterrupt::Break(node.loc.clone())),
        // structural nodes are consumed by their parents
        NodeKind::ArgList | NodeKind::MapPair | NodeKind::Str => Ok(BoxedValue::void_value()),
    }
}

fn eval_id(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    match node.text.as_str() {
        "true" => Ok(BoxedValue::new(true)),
        "false" => Ok(BoxedValue::new(false)),
        name => engine
            .get_object(name)
            .ok_or_else(|| error(engine, format!("Can not find object: {name}"), node)),
    }
}

/// Undef-aware assignment: clone-bind on first assignment, dispatch `=`
/// otherwise. Shared between `Equation` and inline map construction.
fn assign_value(engine: &DispatchEngine, lhs: BoxedValue, rhs: BoxedValue, op_node: &Node) -> Flow {
    if lhs.is_undef() {
        let cloned = engine
            .call_name("clone", std::slice::from_ref(&rhs))
            .map_err(|_| error(engine, "Can not clone right hand side of equation", op_node))?;
        lhs.assign(&cloned);
        Ok(lhs)
    } else {
        engine
            .call_name("=", &[lhs, rhs])
            .map_err(|cause| failure(engine, cause, "=", op_node))
    }
}

fn eval_equation(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let rhs = eval_node(engine, &node.children[2])?;
    let op = &node.children[1];
    let lhs = eval_node(engine, &node.children[0])?;
    match op.text.as_str() {
        "=" => assign_value(engine, lhs, rhs, op),
        ":=" => {
            if lhs.is_undef() || lhs.type_info().bare_eq(&rhs.type_info()) {
                lhs.assign(&rhs);
                Ok(lhs)
            } else {
                Err(error(engine, "Mismatched types in equation", op))
            }
        }
        compound => engine
            .call_name(compound, &[lhs, rhs])
            .map_err(|cause| failure(engine, cause, compound, op)),
    }
}

fn eval_boolean_chain(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut retval = eval_node(engine, &node.children[0])?;
    let mut index = 1;
    while index < node.children.len() {
        let op = &node.children[index];
        let lhs = condition(engine, &retval, "Condition not boolean", node)?;
        retval = match op.text.as_str() {
            "&&" => {
                if lhs {
                    eval_node(engine, &node.children[index + 1])?
                } else {
                    BoxedValue::new(false)
                }
            }
            _ => {
                if lhs {
                    BoxedValue::new(true)
                } else {
                    eval_node(engine, &node.children[index + 1])?
                }
            }
        };
        index += 2;
    }
    Ok(retval)
}

fn eval_binary_fold(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut retval = eval_node(engine, &node.children[0])?;
    let mut index = 1;
    while index < node.children.len() {
        let op = &node.children[index];
        let rhs = eval_node(engine, &node.children[index + 1])?;
        retval = engine
            .call_name(&op.text, &[retval, rhs])
            .map_err(|cause| failure(engine, cause, &op.text, op))?;
        index += 2;
    }
    Ok(retval)
}

fn eval_array_call(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut retval = eval_node(engine, &node.children[0])?;
    for index_node in &node.children[1..] {
        let index = eval_node(engine, index_node)?;
        retval = engine
            .call_name("[]", &[retval, index])
            .map_err(|cause| match cause {
                DispatchError::OutOfRange => error(engine, "Out of bounds exception", node),
                other => failure(engine, other, "[]", index_node),
            })?;
    }
    Ok(retval)
}

/// Negation tries a unary `-` overload first, then falls back to
/// multiplication by -1 so types registering only `*` still negate.
fn eval_negate(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let operand = eval_node(engine, &node.children[0])?;
    match engine.call_name("-", std::slice::from_ref(&operand)) {
        Ok(value) => Ok(value),
        Err(cause) if cause.is_retryable() || matches!(cause, DispatchError::NoMatch) => engine
            .call_name("*", &[operand, BoxedValue::new(-1_i64)])
            .map_err(|_| error(engine, "Can not find appropriate negation", &node.children[0])),
        Err(cause) => Err(failure(engine, cause, "-", &node.children[0])),
    }
}

fn eval_inline_array(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let retval = engine
        .call_name("Vector", &[])
        .map_err(|_| error(engine, "Can not find appropriate 'Vector()'", node))?;
    if let Some(elements) = node.children.first() {
        for element_node in &elements.children {
            let element = eval_node(engine, element_node)?;
            engine
                .call_name("push_back", &[retval.clone(), element])
                .map_err(|_| error(engine, "Can not find appropriate 'push_back'", element_node))?;
        }
    }
    Ok(retval)
}

fn eval_inline_map(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let retval = engine
        .call_name("Map", &[])
        .map_err(|_| error(engine, "Can not find appropriate 'Map()'", node))?;
    if let Some(pairs) = node.children.first() {
        for pair in &pairs.children {
            let key = eval_node(engine, &pair.children[0])?;
            let slot = engine
                .call_name("[]", &[retval.clone(), key])
                .map_err(|cause| failure(engine, cause, "[]", pair))?;
            let value = eval_node(engine, &pair.children[1])?;
            assign_value(engine, slot, value, pair)
                .map_err(|_| error(engine, "Can not find appropriate '=' for map init", pair))?;
        }
    }
    Ok(retval)
}

fn eval_fun_call(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut args = Args::new();
    if let Some(arg_list) = node.children.get(1)
        && arg_list.kind == NodeKind::ArgList
    {
        for arg_node in &arg_list.children {
            args.push(eval_node(engine, arg_node)?);
        }
    }

    let target = &node.children[0];
    let fn_value = eval_node(engine, target)?;
    let display_name = if target.text.is_empty() {
        "function expression".to_owned()
    } else {
        target.text.clone()
    };
    let Ok(callable) = fn_value.cast::<ProxyFn>() else {
        return Err(error(
            engine,
            format!("'{display_name}' does not evaluate to a function"),
            target,
        ));
    };

    engine.push_call_frame(&display_name, node.loc.clone());
    let result = {
        let _caller = engine.call_stack_guard();
        callable.call(&args, engine)
    };
    let outcome = result.map_err(|cause| failure(engine, cause, &display_name, target));
    engine.pop_call_frame();
    outcome
}

fn eval_dot_access(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let mut retval = eval_node(engine, &node.children[0])?;
    for accessor in &node.children[1..] {
        retval = eval_accessor(engine, retval, accessor)?;
    }
    Ok(retval)
}

/// One step of `a.b`: builds `[receiver, args...]` and dispatches the
/// accessor name against it with a fresh call stack. `a.b(args)[i]`
/// resolves the member call first, then indexes into its result; chained
/// brackets (`a.b[i][j]`) parse as nested `ArrayCall` nodes, so the base
/// recurses until it reaches the member itself.
fn eval_accessor(engine: &DispatchEngine, receiver: BoxedValue, accessor: &Rc<Node>) -> Flow {
    if accessor.kind == NodeKind::ArrayCall {
        let mut value = eval_accessor(engine, receiver, &accessor.children[0])?;
        for index_node in &accessor.children[1..] {
            let index = eval_node(engine, index_node)?;
            value = engine
                .call_name("[]", &[value, index])
                .map_err(|cause| match cause {
                    DispatchError::OutOfRange => error(engine, "Out of bounds exception", accessor),
                    other => failure(engine, other, "[]", index_node),
                })?;
        }
        return Ok(value);
    }
    eval_member(engine, receiver, accessor)
}

fn eval_member(engine: &DispatchEngine, receiver: BoxedValue, member: &Rc<Node>) -> Flow {
    let mut args = Args::new();
    args.push(receiver);

    let (fun_name, fun_node) = match member.kind {
        NodeKind::FunCall => {
            if let Some(arg_list) = member.children.get(1)
                && arg_list.kind == NodeKind::ArgList
            {
                for arg_node in &arg_list.children {
                    args.push(eval_node(engine, arg_node)?);
                }
            }
            (member.children[0].text.clone(), &member.children[0])
        }
        _ => (member.text.clone(), member),
    };

    dispatch_method(engine, &fun_name, &args, fun_node, member)
}

fn dispatch_method(
    engine: &DispatchEngine,
    fun_name: &str,
    args: &[BoxedValue],
    fun_node: &Rc<Node>,
    accessor: &Rc<Node>,
) -> Flow {
    engine.push_call_frame(fun_name, accessor.loc.clone());
    let result = {
        let _caller = engine.call_stack_guard();
        engine.call_name(fun_name, args)
    };
    let outcome = result.map_err(|cause| failure(engine, cause, fun_name, fun_node));
    engine.pop_call_frame();
    outcome
}

fn eval_if(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let cond_value = eval_node(engine, &node.children[0])?;
    let mut cond = condition(engine, &cond_value, "If condition not boolean", &node.children[0])?;
    let mut retval = cond_value;
    if cond {
        return eval_node(engine, &node.children[1]);
    }
    let mut index = 2;
    while !cond && index < node.children.len() {
        match node.children[index].text.as_str() {
            "else" => {
                retval = eval_node(engine, &node.children[index + 1])?;
                cond = true;
            }
            _ => {
                let elseif_value = eval_node(engine, &node.children[index + 1])?;
                cond = condition(
                    engine,
                    &elseif_value,
                    "Elseif condition not boolean",
                    &node.children[index + 1],
                )?;
                if cond {
                    retval = eval_node(engine, &node.children[index + 2])?;
                }
            }
        }
        index += 3;
    }
    Ok(retval)
}

fn eval_while(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    loop {
        let cond_value = eval_node(engine, &node.children[0])?;
        if !condition(engine, &cond_value, "While condition not boolean", &node.children[0])? {
            break;
        }
        match eval_node(engine, &node.children[1]) {
            Ok(_) => {}
            Err(EvalInterrupt::Break(_)) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(BoxedValue::void_value())
}

fn eval_for(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let has_init = node.children.len() == 4;
    if has_init {
        eval_node(engine, &node.children[0])?;
    }
    let offset = usize::from(has_init);
    let cond_node = &node.children[offset];
    let incr_node = &node.children[offset + 1];
    let body_node = &node.children[offset + 2];

    loop {
        let cond_value = eval_node(engine, cond_node)?;
        if !condition(engine, &cond_value, "For condition not boolean", cond_node)? {
            break;
        }
        match eval_node(engine, body_node) {
            Ok(_) => {}
            Err(EvalInterrupt::Break(_)) => break,
            Err(other) => return Err(other),
        }
        eval_node(engine, incr_node)?;
    }
    Ok(BoxedValue::void_value())
}

fn def_shape(node: &Rc<Node>) -> (Vec<String>, Option<Rc<Node>>, Rc<Node>) {
    // children: name, [arg list], [guard expression], block
    let mut params = Vec::new();
    let mut cursor = 1;
    if let Some(child) = node.children.get(cursor)
        && child.kind == NodeKind::ArgList
    {
        params = child.children.iter().map(|p| p.text.clone()).collect();
        cursor += 1;
    }
    let body = Rc::clone(node.children.last().expect("def always has a body"));
    let guard = if node.children.len() > cursor + 1 {
        Some(Rc::clone(&node.children[cursor]))
    } else {
        None
    };
    (params, guard, body)
}

fn make_script_function(body: Rc<Node>, params: Vec<String>) -> DynamicFunction {
    let arity = params.len();
    DynamicFunction::new(Some(arity), move |args, engine| {
        eval_script_function(engine, &body, &params, args)
    })
}

fn eval_def(engine: &DispatchEngine, node: &Rc<Node>) -> Flow {
    let name = node.children[0].text.clone();
    let (params, guard, body) = def_shape(node);

    let mut function = make_script_function(body, params.clone());
    if let Some(guard_body) = guard {
        let guard_fn: ProxyFn = Rc::new(make_script_function(guard_body, params));
        function = function.with_guard(guard_fn);
    }
    engine.register_function(name, Rc::new(function));
    Ok(BoxedValue::void_value())
}

fn make_lambda(node: &Rc<Node>) -> ProxyFn {
    let mut params = Vec::new();
    if let Some(child) = node.children.first()
        && child.kind == NodeKind::ArgList
    {
        params = child.children.iter().map(|p| p.text.clone()).collect();
    }
    let body = Rc::clone(node.children.last().expect("lambda always has a body"));
    Rc::new(make_script_function(body, params))
}
