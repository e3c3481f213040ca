//! The host-facing engine: registration, evaluation, state snapshots.

use std::{any::Any, fs, path::Path, rc::Rc};

use crate::{
    bootstrap,
    boxed::BoxedValue,
    convert::{TypeConversion, vector_conversion},
    dispatch::{DispatchEngine, EngineState, Scope},
    error::{ChaiError, DispatchError},
    eval::eval_string,
    function::{DynamicFunction, ProxyFn},
    io::PrintWriter,
    register::{IntoProxyFunction, fun},
};

/// An embeddable scripting engine.
///
/// Construction bootstraps the built-in types and operators and evaluates
/// the script prelude, so a fresh engine can already print, iterate and
/// clone. Hosts then register their own functions and types and evaluate
/// script text against the shared dispatch state.
///
/// The engine is single-threaded and `!Send`; run one engine per thread.
///
/// # Example
/// ```
/// use chaiscript::Engine;
///
/// let mut engine = Engine::new();
/// engine.register_function("double_it", |x: i64| x * 2);
/// let out: i64 = engine.eval_as("double_it(20) + 2").unwrap();
/// assert_eq!(out, 42);
/// ```
pub struct Engine {
    dispatch: DispatchEngine,
}

impl Engine {
    /// A fully bootstrapped engine with the prelude loaded.
    #[must_use]
    pub fn new() -> Self {
        let dispatch = DispatchEngine::new();
        bootstrap::bootstrap(&dispatch);
        eval_string(&dispatch, crate::prelude::PRELUDE, "__PRELUDE__")
            .expect("the built-in prelude must evaluate");
        Self { dispatch }
    }

    /// Direct access to the dispatch layer, for embedders that need more
    /// than the engine surface (scope control, raw lookups).
    #[must_use]
    pub fn dispatch(&self) -> &DispatchEngine {
        &self.dispatch
    }

    // --- registration ---

    /// Registers a host callable under a script-visible name.
    ///
    /// Accepts plain functions, closures and method shapes (`&mut T` first
    /// parameter). Returns false when an equal-signature overload was
    /// already registered.
    pub fn register_function<F, Args>(&mut self, name: &str, f: F) -> bool
    where
        F: IntoProxyFunction<Args>,
    {
        self.dispatch.register_function(name, fun(f))
    }

    /// Registers an already-built proxy function (dynamic, bound, ...).
    pub fn register_proxy(&mut self, name: &str, function: ProxyFn) -> bool {
        self.dispatch.register_function(name, function)
    }

    /// Registers a variadic host callback receiving the raw argument list.
    pub fn register_dynamic(
        &mut self,
        name: &str,
        arity: Option<usize>,
        f: impl Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError> + 'static,
    ) -> bool {
        self.dispatch
            .register_function(name, Rc::new(DynamicFunction::new(arity, f)))
    }

    /// Records a type under a script-visible name.
    pub fn register_type<T: Any>(&mut self, name: &str) {
        self.dispatch.register_type::<T>(name);
    }

    /// Registers `clone` and `=` for a host value type, enabling
    /// `var x = host_value` and in-place assignment for it.
    pub fn register_value_type<T: Any + Clone>(&mut self) {
        bootstrap::register_value_type::<T>(&self.dispatch);
    }

    /// Adds a conversion edge used by casts and overload matching.
    pub fn register_conversion(&mut self, conversion: TypeConversion) {
        self.dispatch.register_conversion(conversion);
    }

    /// Registers both directions between script arrays and `Vec<U>`.
    pub fn register_vector_conversion<U: Any + Clone>(&mut self) {
        for edge in vector_conversion::<U>() {
            self.dispatch.register_conversion(edge);
        }
    }

    // --- objects ---

    /// Binds a value in the current (innermost) scope.
    pub fn add(&mut self, name: &str, value: impl Into<BoxedValue>) {
        self.dispatch.add_object(name, value.into());
    }

    /// Binds a value in the global scope.
    pub fn add_global(&mut self, name: &str, value: impl Into<BoxedValue>) {
        self.dispatch.add_global_object(name, value.into());
    }

    /// Resolves a name the way script code would.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BoxedValue> {
        self.dispatch.get_object(name)
    }

    // --- evaluation ---

    /// Parses and evaluates a source string.
    pub fn eval(&mut self, source: &str) -> Result<BoxedValue, ChaiError> {
        eval_string(&self.dispatch, source, "__EVAL__")
    }

    /// Evaluates and unboxes the result as `T`.
    pub fn eval_as<T: Any + Clone>(&mut self, source: &str) -> Result<T, ChaiError> {
        let value = self.eval(source)?;
        self.dispatch.boxed_cast::<T>(&value).map_err(ChaiError::Dispatch)
    }

    /// Loads and evaluates a script file.
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<BoxedValue, ChaiError> {
        let path = path.as_ref();
        let source =
            fs::read_to_string(path).map_err(|error| ChaiError::Io(format!("{}: {error}", path.display())))?;
        eval_string(&self.dispatch, &source, &path.display().to_string())
    }

    /// Dispatches a named function with host-supplied arguments.
    pub fn call_function(&mut self, name: &str, args: Vec<BoxedValue>) -> Result<BoxedValue, ChaiError> {
        let result = {
            let _caller = self.dispatch.call_stack_guard();
            self.dispatch.call_name(name, &args)
        };
        result.map_err(Self::call_error)
    }

    /// Invokes a callable obtained from script (lambda, dispatch group).
    pub fn call(&mut self, function: &ProxyFn, args: Vec<BoxedValue>) -> Result<BoxedValue, ChaiError> {
        let result = {
            let _caller = self.dispatch.call_stack_guard();
            function.call(&args, &self.dispatch)
        };
        result.map_err(Self::call_error)
    }

    fn call_error(error: DispatchError) -> ChaiError {
        match error {
            DispatchError::Eval(inner) => ChaiError::Eval(*inner),
            other => ChaiError::Dispatch(other),
        }
    }

    /// Typed unbox through the conversion registry.
    pub fn boxed_cast<T: Any + Clone>(&self, value: &BoxedValue) -> Result<T, ChaiError> {
        self.dispatch.boxed_cast::<T>(value).map_err(ChaiError::Dispatch)
    }

    // --- state ---

    /// Snapshot of functions, types and conversions (not scopes).
    #[must_use]
    pub fn get_state(&self) -> EngineState {
        self.dispatch.save_state()
    }

    pub fn set_state(&mut self, state: EngineState) {
        self.dispatch.restore_state(state);
    }

    /// Clone of the scope stack, global frame first.
    #[must_use]
    pub fn get_locals(&self) -> Vec<Scope> {
        self.dispatch.get_locals()
    }

    pub fn set_locals(&mut self, locals: Vec<Scope>) {
        self.dispatch.set_locals(locals);
    }

    /// Redirects script print output.
    pub fn set_print_writer(&mut self, writer: Box<dyn PrintWriter>) {
        self.dispatch.set_print_writer(writer);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
