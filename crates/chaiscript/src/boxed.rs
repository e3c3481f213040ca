//! The type-erased value container at the heart of the dispatch kernel.

use std::{
    any::{Any, TypeId, type_name},
    cell::RefCell,
    rc::{Rc, Weak},
};

use ahash::AHashMap;

use crate::{error::DispatchError, type_info::TypeInfo};

/// Storage behind a boxed value.
///
/// `Owned` payloads hold shared ownership of a `RefCell<T>` allocation.
/// `Reference` payloads are a non-owning view of a host-owned allocation:
/// the referent's lifetime stays the host's responsibility, and a dangling
/// view surfaces as [`DispatchError::DanglingReference`] on access.
#[derive(Clone)]
enum Payload {
    /// No value bound yet (undef) or the void sentinel.
    Empty,
    Owned(Rc<dyn Any>),
    Reference(Weak<dyn Any>),
}

/// The mutable record shared by every handle to one boxed value.
///
/// Rebinding the record in place (see [`BoxedValue::assign`]) is what makes
/// `:=` and undef first-assignment visible through every alias.
#[derive(Clone)]
struct Record {
    type_info: TypeInfo,
    payload: Payload,
    is_const: bool,
}

thread_local! {
    /// Identity interning cache: payload address to live record.
    ///
    /// Re-wrapping an address that is already boxed adopts the existing
    /// record, so two boxings of one object share identity and rebinds.
    /// Thread-local because the engine is single-threaded by construction.
    static OBJECT_CACHE: RefCell<AHashMap<usize, Weak<RefCell<Record>>>> =
        RefCell::new(AHashMap::new());
}

/// Looks up or creates the record for a payload address.
///
/// Owned boxings insert into the cache; reference boxings only consult it,
/// so a view never claims the cache slot of the allocation it watches.
fn intern_record(addr: usize, record: Record, insert: bool) -> Rc<RefCell<Record>> {
    OBJECT_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = cache.get(&addr).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Rc::new(RefCell::new(record));
        if insert {
            cache.insert(addr, Rc::downgrade(&fresh));
        }
        fresh
    })
}

fn payload_addr(any: &Rc<dyn Any>) -> usize {
    Rc::as_ptr(any).cast::<()>() as usize
}

/// A type-erased value: the unit of exchange between host and script.
///
/// Cloning is cheap and shares the underlying record, so two clones observe
/// each other's mutations and rebinds. Values with no type bound yet
/// ([`BoxedValue::undef`]) support one-shot binding during variable
/// declaration; `()` results are represented by the void sentinel.
#[derive(Clone)]
pub struct BoxedValue {
    record: Rc<RefCell<Record>>,
}

impl BoxedValue {
    /// Boxes an owned value, allocating a fresh shared record.
    ///
    /// Two collapses keep generic return plumbing free of special cases:
    /// boxing `()` yields the void sentinel, and boxing a `BoxedValue`
    /// passes it through untouched.
    pub fn new<T: Any>(value: T) -> Self {
        if TypeId::of::<T>() == TypeId::of::<Self>() {
            let any: Box<dyn Any> = Box::new(value);
            match any.downcast::<Self>() {
                Ok(inner) => return *inner,
                Err(_) => unreachable!("TypeId matched BoxedValue"),
            }
        }
        if TypeId::of::<T>() == TypeId::of::<()>() {
            return Self::void_value();
        }
        Self::shared(Rc::new(RefCell::new(value)))
    }

    /// Boxes an owned value and marks it immutable.
    pub fn new_const<T: Any>(value: T) -> Self {
        let boxed = Self::new(value);
        boxed.record.borrow_mut().is_const = true;
        boxed
    }

    /// Adopts shared ownership of a host allocation.
    ///
    /// If the same allocation was boxed before and any handle is still
    /// alive, the existing record is reused so identity is preserved.
    pub fn shared<T: Any>(cell: Rc<RefCell<T>>) -> Self {
        let any: Rc<dyn Any> = cell;
        let addr = payload_addr(&any);
        let record = Record {
            type_info: TypeInfo::of::<T>(),
            payload: Payload::Owned(any),
            is_const: false,
        };
        Self {
            record: intern_record(addr, record, true),
        }
    }

    /// Boxes a non-owning view of a host-owned allocation.
    ///
    /// The box holds no ownership: extracting a shared handle from it fails,
    /// and accessing it after the host dropped the allocation fails with
    /// [`DispatchError::DanglingReference`].
    pub fn by_ref<T: Any>(cell: &Rc<RefCell<T>>) -> Self {
        Self::reference_impl(cell, false)
    }

    /// Like [`BoxedValue::by_ref`], but immutable through the box.
    pub fn by_const_ref<T: Any>(cell: &Rc<RefCell<T>>) -> Self {
        Self::reference_impl(cell, true)
    }

    fn reference_impl<T: Any>(cell: &Rc<RefCell<T>>, is_const: bool) -> Self {
        let any: Rc<dyn Any> = Rc::clone(cell) as Rc<dyn Any>;
        let addr = payload_addr(&any);
        let type_info = if is_const {
            TypeInfo::of_const_ref::<T>()
        } else {
            TypeInfo::of_ref::<T>()
        };
        let record = Record {
            type_info,
            payload: Payload::Reference(Rc::downgrade(&any)),
            is_const,
        };
        Self {
            record: intern_record(addr, record, false),
        }
    }

    /// The distinguished empty value returned by `()`-returning functions.
    #[must_use]
    pub fn void_value() -> Self {
        Self {
            record: Rc::new(RefCell::new(Record {
                type_info: TypeInfo::of::<()>(),
                payload: Payload::Empty,
                is_const: false,
            })),
        }
    }

    /// A value with no type bound yet, awaiting first assignment.
    #[must_use]
    pub fn undef() -> Self {
        Self {
            record: Rc::new(RefCell::new(Record {
                type_info: TypeInfo::undef(),
                payload: Payload::Empty,
                is_const: false,
            })),
        }
    }

    /// The descriptor of the currently stored type.
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        self.record.borrow().type_info
    }

    #[must_use]
    pub fn is_undef(&self) -> bool {
        self.record.borrow().type_info.is_undef()
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.record.borrow().type_info.is_void()
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.record.borrow().is_const
    }

    /// Whether the payload is a non-owning view of a host object.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.record.borrow().payload, Payload::Reference(_))
    }

    /// Rebinds this value's record to share the other value's storage.
    ///
    /// Every handle sharing this record observes the rebind. This is the
    /// primitive behind `:=` and undef first-assignment.
    pub fn assign(&self, rhs: &Self) {
        if Rc::ptr_eq(&self.record, &rhs.record) {
            return;
        }
        let contents = rhs.record.borrow().clone();
        *self.record.borrow_mut() = contents;
    }

    /// Whether two boxes refer to the same underlying storage.
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.record, &other.record) {
            return true;
        }
        match (&self.record.borrow().payload, &other.record.borrow().payload) {
            (Payload::Owned(a), Payload::Owned(b)) => payload_addr(a) == payload_addr(b),
            _ => false,
        }
    }

    fn bad_cast<T>(&self) -> DispatchError {
        DispatchError::BadCast {
            from: self.type_info().name(),
            to: type_name::<T>(),
        }
    }

    fn payload_rc<T>(&self) -> Result<Rc<dyn Any>, DispatchError> {
        match &self.record.borrow().payload {
            Payload::Empty => Err(self.bad_cast::<T>()),
            Payload::Owned(rc) => Ok(Rc::clone(rc)),
            Payload::Reference(weak) => weak.upgrade().ok_or(DispatchError::DanglingReference),
        }
    }

    /// Runs a closure over a shared borrow of the stored `T`.
    ///
    /// This is the Rust rendition of the `const T&` extraction form.
    pub fn with_ref<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, DispatchError> {
        let payload = self.payload_rc::<T>()?;
        let cell = payload
            .downcast_ref::<RefCell<T>>()
            .ok_or_else(|| self.bad_cast::<T>())?;
        let guard = cell.try_borrow().map_err(|_| DispatchError::BorrowConflict)?;
        Ok(f(&guard))
    }

    /// Runs a closure over a mutable borrow of the stored `T`.
    ///
    /// Fails on a const box and on aliased mutable access.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, DispatchError> {
        if self.is_const() {
            return Err(self.bad_cast::<T>());
        }
        let payload = self.payload_rc::<T>()?;
        let cell = payload
            .downcast_ref::<RefCell<T>>()
            .ok_or_else(|| self.bad_cast::<T>())?;
        let mut guard = cell.try_borrow_mut().map_err(|_| DispatchError::BorrowConflict)?;
        Ok(f(&mut guard))
    }

    /// Extracts a `T` by value, cloning out of the box.
    ///
    /// Exact bare-type match only; requesting `BoxedValue` passes the box
    /// through. Conversion-aware extraction lives on the dispatch engine.
    pub fn cast<T: Any + Clone>(&self) -> Result<T, DispatchError> {
        if TypeId::of::<T>() == TypeId::of::<Self>() {
            let any: Box<dyn Any> = Box::new(self.clone());
            return match any.downcast::<T>() {
                Ok(inner) => Ok(*inner),
                Err(_) => unreachable!("TypeId matched BoxedValue"),
            };
        }
        self.with_ref::<T, T>(Clone::clone)
    }

    /// Recovers the owning shared handle.
    ///
    /// Fails on a reference-held box: it has no ownership to give.
    pub fn cast_shared<T: Any>(&self) -> Result<Rc<RefCell<T>>, DispatchError> {
        let payload = {
            let record = self.record.borrow();
            match &record.payload {
                Payload::Owned(rc) => Rc::clone(rc),
                Payload::Empty | Payload::Reference(_) => return Err(self.bad_cast::<T>()),
            }
        };
        payload.downcast::<RefCell<T>>().map_err(|_| self.bad_cast::<T>())
    }
}

impl std::fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedValue")
            .field("type", &self.type_info().name())
            .field("is_const", &self.is_const())
            .field("is_reference", &self.is_reference())
            .finish()
    }
}

impl From<i64> for BoxedValue {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<f64> for BoxedValue {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<bool> for BoxedValue {
    fn from(value: bool) -> Self {
        Self::new(value)
    }
}

impl From<char> for BoxedValue {
    fn from(value: char) -> Self {
        Self::new(value)
    }
}

impl From<String> for BoxedValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for BoxedValue {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_cast() {
        let boxed = BoxedValue::new(42_i64);
        assert_eq!(boxed.cast::<i64>().unwrap(), 42);
        assert!(boxed.cast::<f64>().is_err());
    }

    #[test]
    fn void_and_undef_are_distinct() {
        assert!(BoxedValue::void_value().is_void());
        assert!(!BoxedValue::void_value().is_undef());
        assert!(BoxedValue::undef().is_undef());
    }

    #[test]
    fn boxing_a_boxed_value_passes_through() {
        let inner = BoxedValue::new(7_i64);
        let outer = BoxedValue::new(inner.clone());
        assert!(outer.is_same(&inner));
        assert_eq!(outer.cast::<i64>().unwrap(), 7);
    }

    #[test]
    fn assign_rebinds_all_aliases() {
        let a = BoxedValue::undef();
        let alias = a.clone();
        a.assign(&BoxedValue::new(5_i64));
        assert_eq!(alias.cast::<i64>().unwrap(), 5);
    }

    #[test]
    fn interning_preserves_identity() {
        let cell = Rc::new(RefCell::new(String::from("shared")));
        let first = BoxedValue::shared(Rc::clone(&cell));
        let second = BoxedValue::shared(Rc::clone(&cell));
        assert!(first.is_same(&second));

        first.with_mut::<String, _>(|s| s.push('!')).unwrap();
        assert_eq!(second.cast::<String>().unwrap(), "shared!");
    }

    #[test]
    fn const_box_rejects_mutation() {
        let boxed = BoxedValue::new_const(1_i64);
        assert!(boxed.with_mut::<i64, _>(|n| *n = 2).is_err());
        assert_eq!(boxed.cast::<i64>().unwrap(), 1);
    }

    #[test]
    fn reference_box_has_no_ownership_to_give() {
        let cell = Rc::new(RefCell::new(3_i64));
        let view = BoxedValue::by_ref(&cell);
        assert!(view.is_reference());
        assert!(view.cast_shared::<i64>().is_err());
        assert_eq!(view.cast::<i64>().unwrap(), 3);

        let owned = BoxedValue::shared(cell);
        assert!(owned.cast_shared::<i64>().is_ok());
    }

    #[test]
    fn dangling_reference_fails_cleanly() {
        let view = {
            let cell = Rc::new(RefCell::new(9_i64));
            BoxedValue::by_ref(&cell)
        };
        assert!(matches!(
            view.cast::<i64>(),
            Err(DispatchError::DanglingReference)
        ));
    }
}
