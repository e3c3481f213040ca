//! Promoted arithmetic over boxed values.
//!
//! Any box whose bare type is arithmetic decodes into a [`NumericView`],
//! which carries both integer and floating renditions of the value. Binary
//! operations promote per operand pair: integer semantics when both sides
//! are integral, floating otherwise. This is what lets `1 + 2.5` work
//! without registering an overload per type pair.

use std::any::Any;

use num_traits::ToPrimitive;

use crate::{boxed::BoxedValue, error::DispatchError};

/// A decoded arithmetic value.
#[derive(Debug, Clone, Copy)]
pub struct NumericView {
    /// Whether the source type was floating point.
    pub is_float: bool,
    pub as_i64: i64,
    pub as_f64: f64,
}

impl NumericView {
    /// Decodes an arithmetic box.
    ///
    /// Fails with `BadCast` for non-arithmetic and undef boxes, which is
    /// what lets the numeric operator overloads fall through to typed ones
    /// (string concatenation and the like) during dispatch.
    pub fn new(value: &BoxedValue) -> Result<Self, DispatchError> {
        let info = value.type_info();
        if info.is::<i64>() {
            return value.with_ref::<i64, _>(|n| Self::integer(*n));
        }
        if info.is::<f64>() {
            return value.with_ref::<f64, _>(|n| Self::floating(*n));
        }
        if info.is::<bool>() {
            return value.with_ref::<bool, _>(|b| Self::integer(i64::from(*b)));
        }
        if info.is::<char>() {
            return value.with_ref::<char, _>(|c| Self::integer(*c as i64));
        }
        if info.is::<f32>() {
            return read_float::<f32>(value);
        }
        if info.is::<i8>() {
            return read_int::<i8>(value);
        }
        if info.is::<i16>() {
            return read_int::<i16>(value);
        }
        if info.is::<i32>() {
            return read_int::<i32>(value);
        }
        if info.is::<u8>() {
            return read_int::<u8>(value);
        }
        if info.is::<u16>() {
            return read_int::<u16>(value);
        }
        if info.is::<u32>() {
            return read_int::<u32>(value);
        }
        if info.is::<u64>() {
            return read_int::<u64>(value);
        }
        Err(DispatchError::BadCast {
            from: info.name(),
            to: "arithmetic value",
        })
    }

    fn integer(value: i64) -> Self {
        Self {
            is_float: false,
            as_i64: value,
            as_f64: value as f64,
        }
    }

    fn floating(value: f64) -> Self {
        Self {
            is_float: true,
            as_i64: value as i64,
            as_f64: value,
        }
    }

    /// Boxes the view back out, preserving int/float-ness.
    #[must_use]
    pub fn into_boxed(self) -> BoxedValue {
        if self.is_float {
            BoxedValue::new(self.as_f64)
        } else {
            BoxedValue::new(self.as_i64)
        }
    }

    fn promoted(&self, rhs: &Self) -> bool {
        self.is_float || rhs.is_float
    }

    pub fn add(&self, rhs: &Self) -> BoxedValue {
        if self.promoted(rhs) {
            BoxedValue::new(self.as_f64 + rhs.as_f64)
        } else {
            BoxedValue::new(self.as_i64.wrapping_add(rhs.as_i64))
        }
    }

    pub fn sub(&self, rhs: &Self) -> BoxedValue {
        if self.promoted(rhs) {
            BoxedValue::new(self.as_f64 - rhs.as_f64)
        } else {
            BoxedValue::new(self.as_i64.wrapping_sub(rhs.as_i64))
        }
    }

    pub fn mul(&self, rhs: &Self) -> BoxedValue {
        if self.promoted(rhs) {
            BoxedValue::new(self.as_f64 * rhs.as_f64)
        } else {
            BoxedValue::new(self.as_i64.wrapping_mul(rhs.as_i64))
        }
    }

    pub fn div(&self, rhs: &Self) -> Result<BoxedValue, DispatchError> {
        if self.promoted(rhs) {
            Ok(BoxedValue::new(self.as_f64 / rhs.as_f64))
        } else if rhs.as_i64 == 0 {
            Err(DispatchError::Arithmetic("division by zero".to_owned()))
        } else {
            Ok(BoxedValue::new(self.as_i64.wrapping_div(rhs.as_i64)))
        }
    }

    pub fn rem(&self, rhs: &Self) -> Result<BoxedValue, DispatchError> {
        if self.promoted(rhs) {
            Ok(BoxedValue::new(self.as_f64 % rhs.as_f64))
        } else if rhs.as_i64 == 0 {
            Err(DispatchError::Arithmetic("modulo by zero".to_owned()))
        } else {
            Ok(BoxedValue::new(self.as_i64.wrapping_rem(rhs.as_i64)))
        }
    }

    #[must_use]
    pub fn neg(&self) -> BoxedValue {
        if self.is_float {
            BoxedValue::new(-self.as_f64)
        } else {
            BoxedValue::new(self.as_i64.wrapping_neg())
        }
    }

    pub fn eq(&self, rhs: &Self) -> bool {
        if self.promoted(rhs) {
            self.as_f64 == rhs.as_f64
        } else {
            self.as_i64 == rhs.as_i64
        }
    }

    pub fn lt(&self, rhs: &Self) -> bool {
        if self.promoted(rhs) {
            self.as_f64 < rhs.as_f64
        } else {
            self.as_i64 < rhs.as_i64
        }
    }

    pub fn le(&self, rhs: &Self) -> bool {
        if self.promoted(rhs) {
            self.as_f64 <= rhs.as_f64
        } else {
            self.as_i64 <= rhs.as_i64
        }
    }

    pub fn gt(&self, rhs: &Self) -> bool {
        if self.promoted(rhs) {
            self.as_f64 > rhs.as_f64
        } else {
            self.as_i64 > rhs.as_i64
        }
    }

    pub fn ge(&self, rhs: &Self) -> bool {
        if self.promoted(rhs) {
            self.as_f64 >= rhs.as_f64
        } else {
            self.as_i64 >= rhs.as_i64
        }
    }

    /// Writes this value back into an arithmetic box, converting to the
    /// target's stored type. Used by compound assignment and `++`/`--`.
    pub fn store_into(&self, target: &BoxedValue) -> Result<(), DispatchError> {
        let info = target.type_info();
        macro_rules! store {
            ($ty:ty) => {
                if info.is::<$ty>() {
                    let converted = if self.is_float {
                        self.as_f64 as $ty
                    } else {
                        self.as_i64 as $ty
                    };
                    return target.with_mut::<$ty, _>(|slot| *slot = converted);
                }
            };
        }
        store!(i8);
        store!(i16);
        store!(i32);
        store!(i64);
        store!(u8);
        store!(u16);
        store!(u32);
        store!(u64);
        store!(f32);
        store!(f64);
        if info.is::<bool>() {
            let converted = if self.is_float {
                self.as_f64 != 0.0
            } else {
                self.as_i64 != 0
            };
            return target.with_mut::<bool, _>(|slot| *slot = converted);
        }
        Err(DispatchError::BadCast {
            from: "arithmetic value",
            to: info.name(),
        })
    }
}

fn read_int<T: Any + ToPrimitive>(value: &BoxedValue) -> Result<NumericView, DispatchError> {
    value.with_ref::<T, _>(|n| {
        let widened = n
            .to_i64()
            .or_else(|| n.to_u64().map(|u| u as i64))
            .unwrap_or_default();
        NumericView::integer(widened)
    })
}

fn read_float<T: Any + ToPrimitive>(value: &BoxedValue) -> Result<NumericView, DispatchError> {
    value.with_ref::<T, _>(|n| NumericView::floating(n.to_f64().unwrap_or(f64::NAN)))
}
