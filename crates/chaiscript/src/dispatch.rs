//! The scoped symbol table, function registry and conversion registry that
//! the evaluator resolves every name and operator against.

use std::{
    any::{Any, TypeId},
    cell::RefCell,
    rc::Rc,
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    boxed::BoxedValue,
    convert::{Conversions, TypeConversion},
    error::{CodeLoc, DispatchError, EvalError, StackFrame},
    function::{DispatchGroup, ProxyFn, dispatch},
    io::{PrintWriter, StdPrint},
    type_info::TypeInfo,
};

/// One frame of the name resolution stack.
pub type Scope = AHashMap<String, BoxedValue>;

/// Snapshot of the registries taken by [`DispatchEngine::save_state`].
///
/// Covers functions, type names and conversions; deliberately not the
/// scope stack, which is transient evaluation state.
#[derive(Clone, Default)]
pub struct EngineState {
    functions: IndexMap<String, Vec<ProxyFn>>,
    types: IndexMap<String, TypeInfo>,
    conversions: Conversions,
}

/// The dispatch engine: scoped objects, a name-to-overloads multimap, the
/// type-name registry and the conversion registry.
///
/// Interior mutability throughout: the evaluator and re-entrant script
/// functions share the engine through `&` references within one thread.
/// Registries are expected to be mutated only between evaluations (or by
/// script `def`); the engine itself is single-threaded by construction.
pub struct DispatchEngine {
    scopes: RefCell<Vec<Scope>>,
    functions: RefCell<IndexMap<String, Vec<ProxyFn>>>,
    types: RefCell<IndexMap<String, TypeInfo>>,
    conversions: RefCell<Conversions>,
    call_frames: RefCell<Vec<StackFrame>>,
    printer: RefCell<Box<dyn PrintWriter>>,
}

impl DispatchEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: RefCell::new(vec![Scope::default()]),
            functions: RefCell::new(IndexMap::new()),
            types: RefCell::new(IndexMap::new()),
            conversions: RefCell::new(Conversions::default()),
            call_frames: RefCell::new(Vec::new()),
            printer: RefCell::new(Box::new(StdPrint)),
        }
    }

    // --- type registry ---

    /// Records a type under a script-visible name.
    pub fn register_type<T: Any>(&self, name: impl Into<String>) {
        self.types.borrow_mut().insert(name.into(), TypeInfo::of::<T>());
    }

    #[must_use]
    pub fn get_type(&self, name: &str) -> Option<TypeInfo> {
        self.types.borrow().get(name).copied()
    }

    /// Registered `(name, type)` pairs in registration order.
    #[must_use]
    pub fn types(&self) -> Vec<(String, TypeInfo)> {
        self.types
            .borrow()
            .iter()
            .map(|(name, info)| (name.clone(), *info))
            .collect()
    }

    // --- function registry ---

    /// Appends a function to the name's overload set.
    ///
    /// Returns false when an equal-signature overload is already present;
    /// the existing registration wins.
    pub fn register_function(&self, name: impl Into<String>, function: ProxyFn) -> bool {
        let name = name.into();
        let mut functions = self.functions.borrow_mut();
        let overloads = functions.entry(name).or_default();
        if overloads.iter().any(|existing| existing.signature_eq(&*function)) {
            return false;
        }
        overloads.push(function);
        true
    }

    /// The overload set visible under a name.
    ///
    /// A scope object holding a callable shadows registered functions:
    /// it is consulted first, matching name resolution order.
    #[must_use]
    pub fn get_functions(&self, name: &str) -> Vec<ProxyFn> {
        let mut found = Vec::new();
        {
            let scopes = self.scopes.borrow();
            for scope in scopes.iter().rev() {
                if let Some(object) = scope.get(name) {
                    if let Ok(callable) = object.cast::<ProxyFn>() {
                        found.push(callable);
                    }
                    break;
                }
            }
        }
        if let Some(overloads) = self.functions.borrow().get(name) {
            found.extend(overloads.iter().cloned());
        }
        found
    }

    /// All registered `(name, function)` pairs in registration order.
    #[must_use]
    pub fn functions(&self) -> Vec<(String, ProxyFn)> {
        self.functions
            .borrow()
            .iter()
            .flat_map(|(name, overloads)| overloads.iter().map(move |f| (name.clone(), Rc::clone(f))))
            .collect()
    }

    /// Resolves a name and runs overload dispatch over its candidates.
    pub fn call_name(&self, name: &str, args: &[BoxedValue]) -> Result<BoxedValue, DispatchError> {
        let candidates = self.get_functions(name);
        if candidates.is_empty() {
            return Err(DispatchError::NoMatch);
        }
        dispatch(&candidates, args, self)
    }

    // --- conversion registry ---

    pub fn register_conversion(&self, conversion: TypeConversion) {
        self.conversions.borrow_mut().add(conversion);
    }

    pub(crate) fn conversions_convertible(&self, from: TypeId, to: TypeId) -> bool {
        self.conversions.borrow().convertible(from, to)
    }

    /// Typed extraction that falls back to the conversion registry when the
    /// exact cast fails.
    pub fn boxed_cast<T: Any + Clone>(&self, value: &BoxedValue) -> Result<T, DispatchError> {
        match value.cast::<T>() {
            Ok(out) => Ok(out),
            Err(original) => {
                let converted = self.conversions.borrow().convert(value, TypeId::of::<T>());
                match converted {
                    Some(Ok(mid)) => mid.cast::<T>(),
                    Some(Err(error)) => Err(error),
                    None => Err(original),
                }
            }
        }
    }

    // --- scopes ---

    /// Binds a name in the innermost frame, replacing any previous binding
    /// in that frame.
    pub fn add_object(&self, name: impl Into<String>, value: BoxedValue) {
        let mut scopes = self.scopes.borrow_mut();
        let innermost = scopes.last_mut().expect("scope stack is never empty");
        innermost.insert(name.into(), value);
    }

    /// Binds a name in the outermost (global) frame.
    pub fn add_global_object(&self, name: impl Into<String>, value: BoxedValue) {
        let mut scopes = self.scopes.borrow_mut();
        let global = scopes.first_mut().expect("scope stack is never empty");
        global.insert(name.into(), value);
    }

    /// Rebinds the first matching name walking outward; adds a global
    /// binding when no frame holds the name.
    pub fn set_object(&self, name: impl Into<String>, value: BoxedValue) {
        let name = name.into();
        let mut scopes = self.scopes.borrow_mut();
        if let Some(slot) = scopes.iter_mut().rev().find_map(|scope| scope.get_mut(&name)) {
            *slot = value;
        } else {
            let global = scopes.first_mut().expect("scope stack is never empty");
            global.insert(name, value);
        }
    }

    /// Resolves a name innermost-outward.
    ///
    /// A name bound to no object but carrying registered functions yields a
    /// boxed [`DispatchGroup`], so functions are first-class values.
    #[must_use]
    pub fn get_object(&self, name: &str) -> Option<BoxedValue> {
        {
            let scopes = self.scopes.borrow();
            for scope in scopes.iter().rev() {
                if let Some(value) = scope.get(name) {
                    return Some(value.clone());
                }
            }
        }
        let functions = self.get_functions(name);
        if functions.is_empty() {
            None
        } else {
            let group: ProxyFn = Rc::new(DispatchGroup::new(name, functions));
            Some(BoxedValue::new(group))
        }
    }

    pub fn push_scope(&self) {
        self.scopes.borrow_mut().push(Scope::default());
    }

    /// Pops the innermost frame; popping the global frame fails.
    pub fn pop_scope(&self) -> Result<(), DispatchError> {
        let mut scopes = self.scopes.borrow_mut();
        if scopes.len() > 1 {
            scopes.pop();
            Ok(())
        } else {
            Err(DispatchError::ScopeUnderflow)
        }
    }

    /// Pushes a frame and returns a guard that pops it on drop, so the
    /// frame is released on every exit path.
    #[must_use]
    pub(crate) fn scope_guard(&self) -> ScopeGuard<'_> {
        self.push_scope();
        ScopeGuard { engine: self }
    }

    /// Swaps in a fresh single-frame stack for a function call and returns
    /// a guard that restores the caller's stack on drop.
    #[must_use]
    pub(crate) fn call_stack_guard(&self) -> StackGuard<'_> {
        let saved = self.scopes.replace(vec![Scope::default()]);
        StackGuard {
            engine: self,
            saved: Some(saved),
        }
    }

    /// Number of frames currently on the stack.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.scopes.borrow().len()
    }

    /// Clones the scope stack, innermost frame last.
    #[must_use]
    pub fn get_locals(&self) -> Vec<Scope> {
        self.scopes.borrow().clone()
    }

    /// Replaces the scope stack; an empty input resets to one global frame.
    pub fn set_locals(&self, mut locals: Vec<Scope>) {
        if locals.is_empty() {
            locals.push(Scope::default());
        }
        *self.scopes.borrow_mut() = locals;
    }

    // --- state snapshots ---

    /// Snapshots functions, types and conversions (not scopes).
    #[must_use]
    pub fn save_state(&self) -> EngineState {
        EngineState {
            functions: self.functions.borrow().clone(),
            types: self.types.borrow().clone(),
            conversions: self.conversions.borrow().clone(),
        }
    }

    pub fn restore_state(&self, state: EngineState) {
        *self.functions.borrow_mut() = state.functions;
        *self.types.borrow_mut() = state.types;
        *self.conversions.borrow_mut() = state.conversions;
    }

    // --- call stack bookkeeping ---

    pub(crate) fn push_call_frame(&self, name: impl Into<String>, loc: CodeLoc) {
        self.call_frames.borrow_mut().push(StackFrame {
            name: name.into(),
            loc,
        });
    }

    pub(crate) fn pop_call_frame(&self) {
        self.call_frames.borrow_mut().pop();
    }

    /// Builds an [`EvalError`] carrying the current call-stack snapshot.
    pub(crate) fn make_error(&self, reason: impl Into<String>, loc: Option<CodeLoc>) -> EvalError {
        let mut frames = self.call_frames.borrow().clone();
        frames.reverse();
        EvalError::new(reason, loc).with_call_stack(frames)
    }

    // --- output ---

    pub fn set_print_writer(&self, writer: Box<dyn PrintWriter>) {
        *self.printer.borrow_mut() = writer;
    }

    pub(crate) fn with_printer(&self, f: impl FnOnce(&mut dyn PrintWriter)) {
        let mut printer = self.printer.borrow_mut();
        f(printer.as_mut());
    }
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops one scope frame on drop.
pub(crate) struct ScopeGuard<'a> {
    engine: &'a DispatchEngine,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut scopes = self.engine.scopes.borrow_mut();
        debug_assert!(scopes.len() > 1, "scope guard popping the global frame");
        if scopes.len() > 1 {
            scopes.pop();
        }
    }
}

/// Restores a saved scope stack on drop.
pub(crate) struct StackGuard<'a> {
    engine: &'a DispatchEngine,
    saved: Option<Vec<Scope>>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.engine.scopes.borrow_mut() = saved;
        }
    }
}
