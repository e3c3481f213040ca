//! The uniform call interface over host, script, bound and grouped
//! callables, plus the overload resolution that picks between them.

use std::rc::Rc;

use crate::{
    boxed::BoxedValue,
    dispatch::DispatchEngine,
    error::DispatchError,
    type_info::TypeInfo,
};

/// Shared handle to any callable the engine can dispatch to.
pub type ProxyFn = Rc<dyn ProxyFunction>;

/// The uniform call interface.
///
/// Implementations must not partially consume their arguments on failure:
/// a retryable error leaves every argument box untouched so the resolver
/// can hand the same list to the next candidate.
pub trait ProxyFunction {
    /// Invokes the callable over a boxed argument list.
    fn call(&self, args: &[BoxedValue], engine: &DispatchEngine) -> Result<BoxedValue, DispatchError>;

    /// Per-parameter type descriptors; empty when unknown (dynamic, group).
    fn param_types(&self) -> &[TypeInfo];

    /// Fixed parameter count, if the callable has one.
    fn arity(&self) -> Option<usize>;

    /// Whether the argument list could possibly be accepted.
    ///
    /// A cheap prefilter: a bare-type match, an arithmetic pair, or a
    /// registered conversion per parameter. Passing the filter does not
    /// guarantee the call succeeds.
    fn types_match(&self, args: &[BoxedValue], engine: &DispatchEngine) -> bool;

    /// Signature equality, used to deduplicate registration.
    fn signature_eq(&self, other: &dyn ProxyFunction) -> bool;

    /// Whether this wraps a statically-typed host callable.
    fn is_native(&self) -> bool {
        false
    }
}

/// Whether one parameter would accept one argument.
pub(crate) fn param_matches(param: &TypeInfo, arg: &BoxedValue, engine: &DispatchEngine) -> bool {
    if param.is::<BoxedValue>() {
        return true;
    }
    let arg_info = arg.type_info();
    if arg_info.is_undef() {
        return false;
    }
    if param.bare_eq(&arg_info) {
        return true;
    }
    if param.is_arithmetic() && arg_info.is_arithmetic() {
        return true;
    }
    match (arg_info.bare_id(), param.bare_id()) {
        (Some(from), Some(to)) => engine.conversions_convertible(from, to),
        _ => false,
    }
}

/// Overload resolution over a candidate list.
///
/// Candidates that pass the type prefilter are attempted in registration
/// order; retryable failures move on to the next candidate, anything else
/// (host errors, out-of-range, script errors) propagates. Exhausting the
/// list is `NoMatch`. No ranking is computed: first-successful-by-order
/// keeps dispatch predictable, and guards give cheap disambiguation.
pub fn dispatch(
    candidates: &[ProxyFn],
    args: &[BoxedValue],
    engine: &DispatchEngine,
) -> Result<BoxedValue, DispatchError> {
    for candidate in candidates {
        if !candidate.types_match(args, engine) {
            continue;
        }
        match candidate.call(args, engine) {
            Err(error) if error.is_retryable() => {}
            other => return other,
        }
    }
    Err(DispatchError::NoMatch)
}

type NativeCall = Box<dyn Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError>>;

/// Wraps a host callable of statically-known signature.
///
/// Built by [`crate::register::fun`]; the generated closure extracts each
/// parameter through the engine's conversion-aware cast and boxes the
/// return value.
pub struct NativeFunction {
    types: Vec<TypeInfo>,
    call_impl: NativeCall,
}

impl NativeFunction {
    pub(crate) fn new(types: Vec<TypeInfo>, call_impl: NativeCall) -> Self {
        Self { types, call_impl }
    }
}

impl ProxyFunction for NativeFunction {
    fn call(&self, args: &[BoxedValue], engine: &DispatchEngine) -> Result<BoxedValue, DispatchError> {
        if args.len() != self.types.len() {
            return Err(DispatchError::ArityMismatch {
                expected: self.types.len(),
                got: args.len(),
            });
        }
        (self.call_impl)(args, engine)
    }

    fn param_types(&self) -> &[TypeInfo] {
        &self.types
    }

    fn arity(&self) -> Option<usize> {
        Some(self.types.len())
    }

    fn types_match(&self, args: &[BoxedValue], engine: &DispatchEngine) -> bool {
        args.len() == self.types.len()
            && self
                .types
                .iter()
                .zip(args)
                .all(|(param, arg)| param_matches(param, arg, engine))
    }

    fn signature_eq(&self, other: &dyn ProxyFunction) -> bool {
        other.is_native() && other.param_types() == self.types
    }

    fn is_native(&self) -> bool {
        true
    }
}

type DynamicCall = Rc<dyn Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError>>;

/// Wraps a callback that receives the raw boxed argument list.
///
/// Optionally carries a fixed arity and a guard: a further callable whose
/// boolean result filters dispatch. Script `def` bodies compile to this
/// shape, with the guard expression (if any) wrapped the same way.
pub struct DynamicFunction {
    call_impl: DynamicCall,
    arity: Option<usize>,
    guard: Option<ProxyFn>,
}

impl DynamicFunction {
    pub fn new(
        arity: Option<usize>,
        f: impl Fn(&[BoxedValue], &DispatchEngine) -> Result<BoxedValue, DispatchError> + 'static,
    ) -> Self {
        Self {
            call_impl: Rc::new(f),
            arity,
            guard: None,
        }
    }

    /// Attaches a guard; a false (or failing) guard skips this overload.
    #[must_use]
    pub fn with_guard(mut self, guard: ProxyFn) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl ProxyFunction for DynamicFunction {
    fn call(&self, args: &[BoxedValue], engine: &DispatchEngine) -> Result<BoxedValue, DispatchError> {
        if let Some(arity) = self.arity
            && args.len() != arity
        {
            return Err(DispatchError::ArityMismatch {
                expected: arity,
                got: args.len(),
            });
        }
        if let Some(guard) = &self.guard {
            let passed = match guard.call(args, engine) {
                Ok(result) => result.cast::<bool>().unwrap_or(false),
                Err(_) => false,
            };
            if !passed {
                return Err(DispatchError::GuardFailed);
            }
        }
        (self.call_impl)(args, engine)
    }

    fn param_types(&self) -> &[TypeInfo] {
        &[]
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }

    fn types_match(&self, args: &[BoxedValue], _engine: &DispatchEngine) -> bool {
        self.arity.is_none_or(|arity| arity == args.len())
    }

    fn signature_eq(&self, _other: &dyn ProxyFunction) -> bool {
        false
    }
}

/// Marker object bound to `_` in the global scope; open slot of a partial
/// application.
#[derive(Debug, Clone, Copy)]
pub struct Placeholder;

/// Partial application of another callable.
///
/// Bound arguments are fixed at construction; [`Placeholder`] boxes among
/// them mark open slots, filled left-to-right from the call's arguments.
pub struct BoundFunction {
    inner: ProxyFn,
    bound: Vec<BoxedValue>,
}

impl BoundFunction {
    pub fn new(inner: ProxyFn, bound: Vec<BoxedValue>) -> Self {
        Self { inner, bound }
    }

    fn placeholder_count(&self) -> usize {
        self.bound
            .iter()
            .filter(|slot| slot.type_info().is::<Placeholder>())
            .count()
    }

    fn assemble(&self, args: &[BoxedValue]) -> Result<Vec<BoxedValue>, DispatchError> {
        let expected = self.placeholder_count();
        if args.len() != expected {
            return Err(DispatchError::ArityMismatch {
                expected,
                got: args.len(),
            });
        }
        let mut supplied = args.iter();
        let mut full = Vec::with_capacity(self.bound.len());
        for slot in &self.bound {
            if slot.type_info().is::<Placeholder>() {
                full.push(supplied.next().cloned().unwrap_or_else(BoxedValue::undef));
            } else {
                full.push(slot.clone());
            }
        }
        Ok(full)
    }
}

impl ProxyFunction for BoundFunction {
    fn call(&self, args: &[BoxedValue], engine: &DispatchEngine) -> Result<BoxedValue, DispatchError> {
        let full = self.assemble(args)?;
        self.inner.call(&full, engine)
    }

    fn param_types(&self) -> &[TypeInfo] {
        &[]
    }

    fn arity(&self) -> Option<usize> {
        Some(self.placeholder_count())
    }

    fn types_match(&self, args: &[BoxedValue], engine: &DispatchEngine) -> bool {
        match self.assemble(args) {
            Ok(full) => self.inner.types_match(&full, engine),
            Err(_) => false,
        }
    }

    fn signature_eq(&self, _other: &dyn ProxyFunction) -> bool {
        false
    }
}

/// A named overload set captured at lookup time.
///
/// `get_object` on a function name yields a boxed group, which is how
/// functions become first-class script values; calling the group runs
/// overload resolution across its members.
pub struct DispatchGroup {
    name: String,
    functions: Vec<ProxyFn>,
}

impl DispatchGroup {
    pub fn new(name: impl Into<String>, functions: Vec<ProxyFn>) -> Self {
        Self {
            name: name.into(),
            functions,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn functions(&self) -> &[ProxyFn] {
        &self.functions
    }
}

impl ProxyFunction for DispatchGroup {
    fn call(&self, args: &[BoxedValue], engine: &DispatchEngine) -> Result<BoxedValue, DispatchError> {
        dispatch(&self.functions, args, engine)
    }

    fn param_types(&self) -> &[TypeInfo] {
        &[]
    }

    fn arity(&self) -> Option<usize> {
        None
    }

    fn types_match(&self, args: &[BoxedValue], engine: &DispatchEngine) -> bool {
        self.functions.iter().any(|f| f.types_match(args, engine))
    }

    fn signature_eq(&self, _other: &dyn ProxyFunction) -> bool {
        false
    }
}
