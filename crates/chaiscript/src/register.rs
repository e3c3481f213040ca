//! The generic front door that turns plain Rust callables into proxy
//! functions.
//!
//! A single macro generates, per arity, two impl families: all parameters
//! by value (extracted by cloning out of the box), and a `&mut T` receiver
//! followed by values. The receiver-first shape lines up with the method
//! call sugar (`a.b(args)` dispatches `b(a, args...)`), so host methods
//! register naturally. Only `&mut` receivers are supported: `&mut T` is
//! not `Clone`, which is exactly what keeps the two families unambiguous
//! during inference; a read-only method registers as a `&mut` receiver
//! that does not write.

use std::{any::Any, marker::PhantomData, rc::Rc};

use crate::{
    boxed::BoxedValue,
    dispatch::DispatchEngine,
    function::{NativeFunction, ProxyFn},
    type_info::TypeInfo,
};

/// Marker for the `&mut T` receiver in an `Args` tuple.
///
/// Deliberately not `Clone` and not constructible: the by-value impl
/// family requires `Clone`, so the marker keeps the families disjoint.
pub struct Mut<T>(PhantomData<T>);

/// Conversion from a host callable into a [`ProxyFn`].
///
/// `Args` is inferred from the callable's parameter list; hosts normally go
/// through [`fun`] (or `Engine::register_function`) and never name it.
pub trait IntoProxyFunction<Args> {
    fn into_proxy_function(self) -> ProxyFn;
}

/// Wraps a host function, method or lambda as a dispatchable callable.
pub fn fun<F, Args>(f: F) -> ProxyFn
where
    F: IntoProxyFunction<Args>,
{
    f.into_proxy_function()
}

/// Registers `T::default` as the script constructor shape used by
/// container bootstrap (`Vector()`, `Map()` and friends).
pub fn default_constructor<T: Any + Default>() -> ProxyFn {
    fun(|| T::default())
}

macro_rules! impl_into_proxy {
    ($($param:ident $binding:ident $idx:tt),*) => {
        impl<FN, RET, $($param,)*> IntoProxyFunction<($($param,)*)> for FN
        where
            FN: Fn($($param),*) -> RET + 'static,
            RET: Any,
            $($param: Any + Clone,)*
        {
            fn into_proxy_function(self) -> ProxyFn {
                let types = vec![$(TypeInfo::of::<$param>()),*];
                Rc::new(NativeFunction::new(
                    types,
                    Box::new(move |args: &[BoxedValue], engine: &DispatchEngine| {
                        let _ = (args, engine);
                        Ok(BoxedValue::new((self)(
                            $(engine.boxed_cast::<$param>(&args[$idx])?),*
                        )))
                    }),
                ))
            }
        }

        impl<FN, RET, RECV, $($param,)*> IntoProxyFunction<(Mut<RECV>, $($param,)*)> for FN
        where
            FN: Fn(&mut RECV, $($param),*) -> RET + 'static,
            RET: Any,
            RECV: Any,
            $($param: Any + Clone,)*
        {
            fn into_proxy_function(self) -> ProxyFn {
                let types = vec![TypeInfo::of_ref::<RECV>() $(, TypeInfo::of::<$param>())*];
                Rc::new(NativeFunction::new(
                    types,
                    Box::new(move |args: &[BoxedValue], engine: &DispatchEngine| {
                        let _ = engine;
                        $(let $binding = engine.boxed_cast::<$param>(&args[$idx + 1])?;)*
                        let ret = args[0].with_mut::<RECV, RET>(|recv| (self)(recv $(, $binding)*))?;
                        Ok(BoxedValue::new(ret))
                    }),
                ))
            }
        }
    };
}

impl_into_proxy!();
impl_into_proxy!(A a 0);
impl_into_proxy!(A a 0, B b 1);
impl_into_proxy!(A a 0, B b 1, C c 2);
impl_into_proxy!(A a 0, B b 1, C c 2, D d 3);
impl_into_proxy!(A a 0, B b 1, C c 2, D d 3, E e 4);
impl_into_proxy!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
impl_into_proxy!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6);
impl_into_proxy!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6, H h 7);
