//! The user-extensible type conversion registry.
//!
//! Conversions are a directed graph keyed by `(from bare, to bare)` type
//! identity. Lookup tries the direct edge first and then a bounded two-hop
//! path, so a `Derived -> Base` edge composes with a `Base -> Target` edge
//! without computing a transitive closure at registration time. Arithmetic
//! promotion is implicit and never registered here.

use std::{
    any::{Any, TypeId},
    rc::Rc,
};

use ahash::AHashMap;

use crate::{boxed::BoxedValue, error::DispatchError, type_info::TypeInfo};

type ConversionFn = Rc<dyn Fn(&BoxedValue) -> Result<BoxedValue, DispatchError>>;

/// One registered conversion edge.
#[derive(Clone)]
pub struct TypeConversion {
    from: TypeInfo,
    to: TypeInfo,
    apply: ConversionFn,
}

impl TypeConversion {
    #[must_use]
    pub fn from_type(&self) -> TypeInfo {
        self.from
    }

    #[must_use]
    pub fn to_type(&self) -> TypeInfo {
        self.to
    }
}

/// Builds a conversion edge from a plain Rust converter.
///
/// This is the Rust rendition of the base/derived upcast registration: for
/// types related by embedding or trait, the host supplies the projection
/// explicitly.
pub fn conversion<S, T>(f: impl Fn(&S) -> T + 'static) -> TypeConversion
where
    S: Any,
    T: Any,
{
    TypeConversion {
        from: TypeInfo::of::<S>(),
        to: TypeInfo::of::<T>(),
        apply: Rc::new(move |value| Ok(BoxedValue::new(value.with_ref::<S, T>(&f)?))),
    }
}

/// Conversion edges between script arrays and `Vec<U>`.
///
/// Registering these lets a heterogeneous script literal array be passed to
/// a host function taking `Vec<U>` (per-element cast), and a host `Vec<U>`
/// flow back into script container operations.
pub fn vector_conversion<U: Any + Clone>() -> [TypeConversion; 2] {
    let to_host = TypeConversion {
        from: TypeInfo::of::<Vec<BoxedValue>>(),
        to: TypeInfo::of::<Vec<U>>(),
        apply: Rc::new(|value| {
            let elements = value.with_ref::<Vec<BoxedValue>, _>(Clone::clone)?;
            let mut out = Vec::with_capacity(elements.len());
            for element in &elements {
                out.push(element.cast::<U>()?);
            }
            Ok(BoxedValue::new(out))
        }),
    };
    let to_script = TypeConversion {
        from: TypeInfo::of::<Vec<U>>(),
        to: TypeInfo::of::<Vec<BoxedValue>>(),
        apply: Rc::new(|value| {
            let elements = value.with_ref::<Vec<U>, _>(Clone::clone)?;
            let boxed: Vec<BoxedValue> = elements.into_iter().map(BoxedValue::new).collect();
            Ok(BoxedValue::new(boxed))
        }),
    };
    [to_host, to_script]
}

/// The conversion registry held by the dispatch engine.
#[derive(Clone, Default)]
pub struct Conversions {
    edges: AHashMap<(TypeId, TypeId), ConversionFn>,
}

impl Conversions {
    pub fn add(&mut self, conversion: TypeConversion) {
        let from = conversion
            .from
            .bare_id()
            .expect("conversion source must be a concrete type");
        let to = conversion
            .to
            .bare_id()
            .expect("conversion target must be a concrete type");
        self.edges.insert((from, to), conversion.apply);
    }

    /// Whether a path of at most two edges leads from `from` to `to`.
    #[must_use]
    pub fn convertible(&self, from: TypeId, to: TypeId) -> bool {
        if self.edges.contains_key(&(from, to)) {
            return true;
        }
        self.edges
            .keys()
            .any(|(first_from, first_to)| *first_from == from && self.edges.contains_key(&(*first_to, to)))
    }

    /// Applies the registered path from the value's bare type to `to`.
    ///
    /// Returns `None` when no path exists; the caller keeps its original
    /// cast failure in that case.
    pub fn convert(&self, value: &BoxedValue, to: TypeId) -> Option<Result<BoxedValue, DispatchError>> {
        let from = value.type_info().bare_id()?;
        if let Some(direct) = self.edges.get(&(from, to)) {
            return Some(direct(value));
        }
        for ((first_from, first_to), first) in &self.edges {
            if *first_from != from {
                continue;
            }
            if let Some(second) = self.edges.get(&(*first_to, to)) {
                return Some(first(value).and_then(|mid| second(&mid)));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Celsius(f64);
    #[derive(Clone)]
    struct Kelvin(f64);
    #[derive(Clone)]
    struct Fahrenheit(f64);

    #[test]
    fn direct_conversion_applies() {
        let mut registry = Conversions::default();
        registry.add(conversion(|c: &Celsius| Kelvin(c.0 + 273.15)));

        let boxed = BoxedValue::new(Celsius(0.0));
        assert!(registry.convertible(TypeId::of::<Celsius>(), TypeId::of::<Kelvin>()));
        let converted = registry
            .convert(&boxed, TypeId::of::<Kelvin>())
            .unwrap()
            .unwrap();
        assert_eq!(converted.cast::<Kelvin>().unwrap().0, 273.15);
    }

    #[test]
    fn two_hop_path_is_found() {
        let mut registry = Conversions::default();
        registry.add(conversion(|f: &Fahrenheit| Celsius((f.0 - 32.0) / 1.8)));
        registry.add(conversion(|c: &Celsius| Kelvin(c.0 + 273.15)));

        assert!(registry.convertible(TypeId::of::<Fahrenheit>(), TypeId::of::<Kelvin>()));
        let boxed = BoxedValue::new(Fahrenheit(32.0));
        let converted = registry
            .convert(&boxed, TypeId::of::<Kelvin>())
            .unwrap()
            .unwrap();
        assert_eq!(converted.cast::<Kelvin>().unwrap().0, 273.15);
    }

    #[test]
    fn missing_path_returns_none() {
        let registry = Conversions::default();
        let boxed = BoxedValue::new(Celsius(1.0));
        assert!(registry.convert(&boxed, TypeId::of::<Kelvin>()).is_none());
    }

    #[test]
    fn vector_conversion_casts_per_element() {
        let mut registry = Conversions::default();
        for edge in vector_conversion::<i64>() {
            registry.add(edge);
        }

        let script_array = BoxedValue::new(vec![BoxedValue::new(1_i64), BoxedValue::new(2_i64)]);
        let converted = registry
            .convert(&script_array, TypeId::of::<Vec<i64>>())
            .unwrap()
            .unwrap();
        assert_eq!(converted.cast::<Vec<i64>>().unwrap(), vec![1, 2]);

        let mixed = BoxedValue::new(vec![BoxedValue::new(1_i64), BoxedValue::new(String::from("x"))]);
        assert!(registry.convert(&mixed, TypeId::of::<Vec<i64>>()).unwrap().is_err());
    }
}
