//! Runtime type identity for boxed values and function parameters.

use std::{
    any::{Any, TypeId, type_name},
    cmp::Ordering,
    fmt,
};

/// Identifies a registered Rust type at runtime.
///
/// Qualifier variants (`&T`, `&mut T`, `const`) all collapse to the same
/// *bare* identity, so overload matching works on bare types while the
/// qualifier flags steer box/unbox decisions. Values are cheap to copy; one
/// canonical instance per type is produced by [`TypeInfo::of`].
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    /// Bare type identity; `None` marks the undef descriptor.
    bare: Option<TypeId>,
    name: &'static str,
    is_const: bool,
    is_reference: bool,
    is_void: bool,
    is_arithmetic: bool,
}

impl TypeInfo {
    /// The canonical descriptor for a plain owned `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            bare: Some(TypeId::of::<T>()),
            name: type_name::<T>(),
            is_const: false,
            is_reference: false,
            is_void: TypeId::of::<T>() == TypeId::of::<()>(),
            is_arithmetic: is_arithmetic_type::<T>(),
        }
    }

    /// Descriptor for a mutable reference parameter (`&mut T`).
    #[must_use]
    pub fn of_ref<T: Any>() -> Self {
        Self {
            is_reference: true,
            ..Self::of::<T>()
        }
    }

    /// Descriptor for a shared reference parameter (`&T`).
    #[must_use]
    pub fn of_const_ref<T: Any>() -> Self {
        Self {
            is_reference: true,
            is_const: true,
            ..Self::of::<T>()
        }
    }

    /// The descriptor of a value whose type is not yet known.
    #[must_use]
    pub fn undef() -> Self {
        Self {
            bare: None,
            name: "undef",
            is_const: false,
            is_reference: false,
            is_void: false,
            is_arithmetic: false,
        }
    }

    /// The bare type identity, `None` for undef.
    #[must_use]
    pub fn bare_id(&self) -> Option<TypeId> {
        self.bare
    }

    /// Whether two descriptors share the same bare type.
    ///
    /// Undef descriptors only match other undef descriptors.
    #[must_use]
    pub fn bare_eq(&self, other: &Self) -> bool {
        self.bare == other.bare
    }

    /// Whether this descriptor names the given type, ignoring qualifiers.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.bare == Some(TypeId::of::<T>())
    }

    /// Diagnostic name of the described type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.is_const
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.is_void
    }

    #[must_use]
    pub fn is_undef(&self) -> bool {
        self.bare.is_none()
    }

    /// True for the built-in integer widths, floats, `bool` and `char`.
    #[must_use]
    pub fn is_arithmetic(&self) -> bool {
        self.is_arithmetic
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.bare_eq(other)
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name)
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn is_arithmetic_type<T: Any>() -> bool {
    let id = TypeId::of::<T>();
    id == TypeId::of::<i8>()
        || id == TypeId::of::<i16>()
        || id == TypeId::of::<i32>()
        || id == TypeId::of::<i64>()
        || id == TypeId::of::<u8>()
        || id == TypeId::of::<u16>()
        || id == TypeId::of::<u32>()
        || id == TypeId::of::<u64>()
        || id == TypeId::of::<f32>()
        || id == TypeId::of::<f64>()
        || id == TypeId::of::<bool>()
        || id == TypeId::of::<char>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_variants_share_bare_identity() {
        let owned = TypeInfo::of::<String>();
        let by_ref = TypeInfo::of_ref::<String>();
        let by_const_ref = TypeInfo::of_const_ref::<String>();

        assert!(owned.bare_eq(&by_ref));
        assert!(owned.bare_eq(&by_const_ref));
        assert!(!owned.is_reference());
        assert!(by_ref.is_reference() && !by_ref.is_const());
        assert!(by_const_ref.is_reference() && by_const_ref.is_const());
    }

    #[test]
    fn distinct_types_do_not_compare_equal() {
        assert_ne!(TypeInfo::of::<i64>(), TypeInfo::of::<f64>());
        assert_eq!(TypeInfo::of::<i64>(), TypeInfo::of::<i64>());
    }

    #[test]
    fn undef_only_matches_undef() {
        assert_eq!(TypeInfo::undef(), TypeInfo::undef());
        assert_ne!(TypeInfo::undef(), TypeInfo::of::<i64>());
        assert!(TypeInfo::undef().is_undef());
    }

    #[test]
    fn arithmetic_flag_covers_numbers_bool_and_char() {
        assert!(TypeInfo::of::<i32>().is_arithmetic());
        assert!(TypeInfo::of::<u8>().is_arithmetic());
        assert!(TypeInfo::of::<f64>().is_arithmetic());
        assert!(TypeInfo::of::<bool>().is_arithmetic());
        assert!(TypeInfo::of::<char>().is_arithmetic());
        assert!(!TypeInfo::of::<String>().is_arithmetic());
    }

    #[test]
    fn void_flag() {
        assert!(TypeInfo::of::<()>().is_void());
        assert!(!TypeInfo::of::<i64>().is_void());
    }
}
