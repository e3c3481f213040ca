#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing in value promotion is intentional")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts mirror promoted arithmetic semantics")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior matches integer promotion")]

mod bootstrap;
mod boxed;
mod convert;
mod dispatch;
mod engine;
mod error;
mod eval;
mod function;
mod io;
mod numeric;
mod parse;
mod prelude;
mod register;
mod type_info;

pub use crate::{
    boxed::BoxedValue,
    bootstrap::{Pair, Range, ScriptMap, ScriptVector},
    convert::{Conversions, TypeConversion, conversion, vector_conversion},
    dispatch::{DispatchEngine, EngineState, Scope},
    engine::Engine,
    error::{ChaiError, CodeLoc, DispatchError, EvalError, StackFrame},
    function::{
        BoundFunction, DispatchGroup, DynamicFunction, NativeFunction, Placeholder, ProxyFn,
        ProxyFunction, dispatch,
    },
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    numeric::NumericView,
    parse::{Node, NodeKind, ParseError, parse},
    register::{IntoProxyFunction, Mut, fun},
    type_info::TypeInfo,
};
