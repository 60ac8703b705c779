use crate::func::FuncRef;
use crate::nan_preserving_float::{F32, F64};
use crate::types::ValueType;
use crate::v128::V128;
use crate::TrapKind;

/// Error for `LittleEndianConvert`
#[derive(Debug)]
pub enum Error {
    /// The buffer is too short for the type being deserialized
    InvalidLittleEndianBuffer,
}

/// Runtime representation of a value.
///
/// Wasm code manipulates values of seven types: integers and floating-point
/// (IEEE 754-2008) data of 32 or 64 bit width, 128-bit packed vectors, and
/// nullable references.
///
/// There is no distinction between signed and unsigned integer types.
/// Instead, integers are interpreted by respective operations as either
/// unsigned or signed in two's complement representation.
#[derive(Clone, Debug)]
pub enum Value {
    /// Value of 32-bit signed or unsigned integer.
    I32(i32),
    /// Value of 64-bit signed or unsigned integer.
    I64(i64),
    /// Value of 32-bit IEEE 754-2008 floating point number.
    F32(F32),
    /// Value of 64-bit IEEE 754-2008 floating point number.
    F64(F64),
    /// 128-bit packed vector.
    V128(V128),
    /// Nullable reference to a function.
    FuncRef(Option<FuncRef>),
    /// Nullable opaque host reference.
    ExternRef(Option<u32>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::V128(a), Value::V128(b)) => a == b,
            // Function references compare by identity.
            (Value::FuncRef(a), Value::FuncRef(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Value::ExternRef(a), Value::ExternRef(b)) => a == b,
            _ => false,
        }
    }
}

/// Trait for creating a value of a particular type from a [`Value`].
///
/// Typically each implementation can create a value from the specific type.
/// For example, values of type `bool` or `u32` are both represented by
/// [`I32`] and `f64` values are represented by [`F64`].
///
/// [`I32`]: enum.Value.html#variant.I32
/// [`F64`]: enum.Value.html#variant.F64
/// [`Value`]: enum.Value.html
pub trait FromValue
where
    Self: Sized,
{
    /// Create a value of type `Self` from a given [`Value`].
    ///
    /// Returns `None` if the [`Value`] is of type different than
    /// expected by the conversion in question.
    ///
    /// [`Value`]: enum.Value.html
    fn from_value(val: Value) -> Option<Self>;
}

/// Convert one type to another by wrapping.
pub trait WrapInto<T> {
    /// Convert one type to another by wrapping.
    fn wrap_into(self) -> T;
}

/// Convert one type to another by rounding to the nearest integer towards
/// zero, trapping when the result does not fit.
pub trait TryTruncateInto<T, E> {
    /// Convert one type to another by rounding to the nearest integer towards zero.
    fn try_truncate_into(self) -> Result<T, E>;
}

/// Convert one type to another by rounding to the nearest integer towards
/// zero, saturating at the bounds of the result type (NaN becomes zero).
pub trait TruncateSaturateInto<T> {
    /// Convert one type to another by saturating truncation.
    fn truncate_saturate_into(self) -> T;
}

/// Convert one type to another by extending with leading zeroes or the sign
/// bit.
pub trait ExtendInto<T> {
    /// Convert one type to another by extending with leading zeroes.
    fn extend_into(self) -> T;
}

/// Reinterprets the bits of a value of one type as another type.
pub trait TransmuteInto<T> {
    /// Reinterprets the bits of a value of one type as another type.
    fn transmute_into(self) -> T;
}

/// Convert from and to little endian.
pub trait LittleEndianConvert
where
    Self: Sized,
{
    /// Convert to little endian buffer.
    fn into_little_endian(self, buffer: &mut [u8]);
    /// Convert from little endian buffer.
    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error>;
}

/// Arithmetic operations.
pub trait ArithmeticOps<T> {
    /// Add two values.
    fn add(self, other: T) -> T;
    /// Subtract two values.
    fn sub(self, other: T) -> T;
    /// Multiply two values.
    fn mul(self, other: T) -> T;
    /// Divide two values.
    fn div(self, other: T) -> Result<T, TrapKind>;
}

/// Integer value.
pub trait Integer<T>: ArithmeticOps<T> {
    /// Counts leading zeros in the bitwise representation of the value.
    fn leading_zeros(self) -> T;
    /// Counts trailing zeros in the bitwise representation of the value.
    fn trailing_zeros(self) -> T;
    /// Counts 1-bits in the bitwise representation of the value.
    fn count_ones(self) -> T;
    /// Get left bit rotation result.
    fn rotl(self, other: T) -> T;
    /// Get right bit rotation result.
    fn rotr(self, other: T) -> T;
    /// Get division remainder.
    fn rem(self, other: T) -> Result<T, TrapKind>;
}

/// Float-point value.
pub trait Float<T>: ArithmeticOps<T> {
    /// Get absolute value.
    fn abs(self) -> T;
    /// Returns the largest integer less than or equal to a number.
    fn floor(self) -> T;
    /// Returns the smallest integer greater than or equal to a number.
    fn ceil(self) -> T;
    /// Returns the integer part of a number.
    fn trunc(self) -> T;
    /// Returns the nearest integer to a number. Ties are rounded to even.
    fn nearest(self) -> T;
    /// Takes the square root of a number.
    fn sqrt(self) -> T;
    /// Returns the minimum of the two numbers; any NaN operand produces a
    /// canonical quiet NaN, and `min(+0, -0)` is `-0`.
    fn min(self, other: T) -> T;
    /// Returns the maximum of the two numbers; any NaN operand produces a
    /// canonical quiet NaN, and `max(+0, -0)` is `+0`.
    fn max(self, other: T) -> T;
    /// Sets sign of this value to the sign of other value.
    fn copysign(self, other: T) -> T;
}

impl Value {
    /// Creates new default value of given type: zero for numeric types and
    /// the null reference for reference types.
    pub fn default(value_type: ValueType) -> Self {
        match value_type {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0f32.into()),
            ValueType::F64 => Value::F64(0f64.into()),
            ValueType::V128 => Value::V128(V128::default()),
            ValueType::FuncRef => Value::FuncRef(None),
            ValueType::ExternRef => Value::ExternRef(None),
        }
    }

    /// Creates new value by interpreting passed u32 as f32.
    pub fn decode_f32(val: u32) -> Self {
        Value::F32(F32::from_bits(val))
    }

    /// Creates new value by interpreting passed u64 as f64.
    pub fn decode_f64(val: u64) -> Self {
        Value::F64(F64::from_bits(val))
    }

    /// Get the type of this value.
    pub fn value_type(&self) -> ValueType {
        match *self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::V128(_) => ValueType::V128,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef(_) => ValueType::ExternRef,
        }
    }

    /// Whether this is a null reference value.
    pub fn is_null_ref(&self) -> bool {
        matches!(self, Value::FuncRef(None) | Value::ExternRef(None))
    }

    /// Returns `T` if this particular [`Value`] contains an
    /// appropriate type.
    ///
    /// See [`FromValue`] for details.
    ///
    /// [`FromValue`]: trait.FromValue.html
    /// [`Value`]: enum.Value.html
    pub fn try_into<T: FromValue>(self) -> Option<T> {
        FromValue::from_value(self)
    }
}

impl From<i8> for Value {
    fn from(val: i8) -> Self {
        Value::I32(val as i32)
    }
}

impl From<i16> for Value {
    fn from(val: i16) -> Self {
        Value::I32(val as i32)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::I32(val)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::I64(val)
    }
}

impl From<u8> for Value {
    fn from(val: u8) -> Self {
        Value::I32(val as i32)
    }
}

impl From<u16> for Value {
    fn from(val: u16) -> Self {
        Value::I32(val as i32)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Value::I32(val.transmute_into())
    }
}

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        Value::I64(val.transmute_into())
    }
}

impl From<F32> for Value {
    fn from(val: F32) -> Self {
        Value::F32(val)
    }
}

impl From<F64> for Value {
    fn from(val: F64) -> Self {
        Value::F64(val)
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::F32(val.into())
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::F64(val.into())
    }
}

impl From<V128> for Value {
    fn from(val: V128) -> Self {
        Value::V128(val)
    }
}

macro_rules! impl_from_value {
    ($expected_rt_ty: ident, $into: ty) => {
        impl FromValue for $into {
            fn from_value(val: Value) -> Option<Self> {
                match val {
                    Value::$expected_rt_ty(val) => Some(val.transmute_into()),
                    _ => None,
                }
            }
        }
    };
}

/// This conversion assumes that boolean values are represented by
/// [`I32`] type.
///
/// [`I32`]: enum.Value.html#variant.I32
impl FromValue for bool {
    fn from_value(val: Value) -> Option<Self> {
        match val {
            Value::I32(val) => Some(val != 0),
            _ => None,
        }
    }
}

///  This conversion assumes that `i8` is represented as an [`I32`].
///
/// [`I32`]: enum.Value.html#variant.I32
impl FromValue for i8 {
    fn from_value(val: Value) -> Option<Self> {
        let min = i8::MIN as i32;
        let max = i8::MAX as i32;
        match val {
            Value::I32(val) if min <= val && val <= max => Some(val as i8),
            _ => None,
        }
    }
}

///  This conversion assumes that `i16` is represented as an [`I32`].
///
/// [`I32`]: enum.Value.html#variant.I32
impl FromValue for i16 {
    fn from_value(val: Value) -> Option<Self> {
        let min = i16::MIN as i32;
        let max = i16::MAX as i32;
        match val {
            Value::I32(val) if min <= val && val <= max => Some(val as i16),
            _ => None,
        }
    }
}

///  This conversion assumes that `u8` is represented as an [`I32`].
///
/// [`I32`]: enum.Value.html#variant.I32
impl FromValue for u8 {
    fn from_value(val: Value) -> Option<Self> {
        let min = u8::MIN as i32;
        let max = u8::MAX as i32;
        match val {
            Value::I32(val) if min <= val && val <= max => Some(val as u8),
            _ => None,
        }
    }
}

///  This conversion assumes that `u16` is represented as an [`I32`].
///
/// [`I32`]: enum.Value.html#variant.I32
impl FromValue for u16 {
    fn from_value(val: Value) -> Option<Self> {
        let min = u16::MIN as i32;
        let max = u16::MAX as i32;
        match val {
            Value::I32(val) if min <= val && val <= max => Some(val as u16),
            _ => None,
        }
    }
}

impl FromValue for V128 {
    fn from_value(val: Value) -> Option<Self> {
        match val {
            Value::V128(val) => Some(val),
            _ => None,
        }
    }
}

impl_from_value!(I32, i32);
impl_from_value!(I64, i64);
impl_from_value!(F32, F32);
impl_from_value!(F64, F64);
impl_from_value!(I32, u32);
impl_from_value!(I64, u64);

macro_rules! impl_wrap_into {
    ($from:ident, $into:ident) => {
        impl WrapInto<$into> for $from {
            fn wrap_into(self) -> $into {
                self as $into
            }
        }
    };
    ($from:ident, $intermediate:ident, $into:ident) => {
        impl WrapInto<$into> for $from {
            fn wrap_into(self) -> $into {
                $into::from(self as $intermediate)
            }
        }
    };
}

impl_wrap_into!(i32, i8);
impl_wrap_into!(i32, i16);
impl_wrap_into!(i64, i8);
impl_wrap_into!(i64, i16);
impl_wrap_into!(i64, i32);
impl_wrap_into!(i64, f32, F32);
impl_wrap_into!(u64, f32, F32);
impl_wrap_into!(f64, f32);

impl WrapInto<F32> for F64 {
    fn wrap_into(self) -> F32 {
        (f64::from(self) as f32).into()
    }
}

macro_rules! impl_try_truncate_into {
    (@primitive $from: ident, $into: ident, $to_primitive:path) => {
        impl TryTruncateInto<$into, TrapKind> for $from {
            fn try_truncate_into(self) -> Result<$into, TrapKind> {
                // Casting from a float to an integer rounds towards zero;
                // `ToPrimitive` also checks that the result is in range.
                $to_primitive(&self).ok_or(TrapKind::InvalidConversionToInt)
            }
        }
    };
    (@wrapped $from:ident, $intermediate:ident, $into:ident) => {
        impl TryTruncateInto<$into, TrapKind> for $from {
            fn try_truncate_into(self) -> Result<$into, TrapKind> {
                $intermediate::from(self).try_truncate_into()
            }
        }
    };
}

impl_try_truncate_into!(@primitive f32, i32, num_traits::cast::ToPrimitive::to_i32);
impl_try_truncate_into!(@primitive f32, i64, num_traits::cast::ToPrimitive::to_i64);
impl_try_truncate_into!(@primitive f64, i32, num_traits::cast::ToPrimitive::to_i32);
impl_try_truncate_into!(@primitive f64, i64, num_traits::cast::ToPrimitive::to_i64);
impl_try_truncate_into!(@primitive f32, u32, num_traits::cast::ToPrimitive::to_u32);
impl_try_truncate_into!(@primitive f32, u64, num_traits::cast::ToPrimitive::to_u64);
impl_try_truncate_into!(@primitive f64, u32, num_traits::cast::ToPrimitive::to_u32);
impl_try_truncate_into!(@primitive f64, u64, num_traits::cast::ToPrimitive::to_u64);
impl_try_truncate_into!(@wrapped F32, f32, i32);
impl_try_truncate_into!(@wrapped F32, f32, i64);
impl_try_truncate_into!(@wrapped F64, f64, i32);
impl_try_truncate_into!(@wrapped F64, f64, i64);
impl_try_truncate_into!(@wrapped F32, f32, u32);
impl_try_truncate_into!(@wrapped F32, f32, u64);
impl_try_truncate_into!(@wrapped F64, f64, u32);
impl_try_truncate_into!(@wrapped F64, f64, u64);

macro_rules! impl_truncate_saturate_into {
    (@primitive $from:ident, $into:ident, $to_primitive:path, $trunc:path) => {
        impl TruncateSaturateInto<$into> for $from {
            fn truncate_saturate_into(self) -> $into {
                if self.is_nan() {
                    return 0;
                }
                let truncated = $trunc(self);
                match $to_primitive(&truncated) {
                    Some(value) => value,
                    None if truncated < 0.0 => <$into>::MIN,
                    None => <$into>::MAX,
                }
            }
        }
    };
    (@wrapped $from:ident, $intermediate:ident, $into:ident) => {
        impl TruncateSaturateInto<$into> for $from {
            fn truncate_saturate_into(self) -> $into {
                $intermediate::from(self).truncate_saturate_into()
            }
        }
    };
}

impl_truncate_saturate_into!(@primitive f32, i32, num_traits::cast::ToPrimitive::to_i32, fmath::f32::trunc);
impl_truncate_saturate_into!(@primitive f32, i64, num_traits::cast::ToPrimitive::to_i64, fmath::f32::trunc);
impl_truncate_saturate_into!(@primitive f64, i32, num_traits::cast::ToPrimitive::to_i32, fmath::f64::trunc);
impl_truncate_saturate_into!(@primitive f64, i64, num_traits::cast::ToPrimitive::to_i64, fmath::f64::trunc);
impl_truncate_saturate_into!(@primitive f32, u32, num_traits::cast::ToPrimitive::to_u32, fmath::f32::trunc);
impl_truncate_saturate_into!(@primitive f32, u64, num_traits::cast::ToPrimitive::to_u64, fmath::f32::trunc);
impl_truncate_saturate_into!(@primitive f64, u32, num_traits::cast::ToPrimitive::to_u32, fmath::f64::trunc);
impl_truncate_saturate_into!(@primitive f64, u64, num_traits::cast::ToPrimitive::to_u64, fmath::f64::trunc);
impl_truncate_saturate_into!(@wrapped F32, f32, i32);
impl_truncate_saturate_into!(@wrapped F32, f32, i64);
impl_truncate_saturate_into!(@wrapped F64, f64, i32);
impl_truncate_saturate_into!(@wrapped F64, f64, i64);
impl_truncate_saturate_into!(@wrapped F32, f32, u32);
impl_truncate_saturate_into!(@wrapped F32, f32, u64);
impl_truncate_saturate_into!(@wrapped F64, f64, u32);
impl_truncate_saturate_into!(@wrapped F64, f64, u64);

macro_rules! impl_extend_into {
    ($from:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            fn extend_into(self) -> $into {
                self as $into
            }
        }
    };
    ($from:ident, $intermediate:ident, $into:ident) => {
        impl ExtendInto<$into> for $from {
            fn extend_into(self) -> $into {
                $into::from(self as $intermediate)
            }
        }
    };
}

impl_extend_into!(i8, i32);
impl_extend_into!(u8, i32);
impl_extend_into!(i16, i32);
impl_extend_into!(u16, i32);
impl_extend_into!(i8, i64);
impl_extend_into!(u8, i64);
impl_extend_into!(i16, i64);
impl_extend_into!(u16, i64);
impl_extend_into!(i32, i64);
impl_extend_into!(u32, i64);
impl_extend_into!(u32, u64);
impl_extend_into!(i32, f32);
impl_extend_into!(i32, f64);
impl_extend_into!(u32, f32);
impl_extend_into!(u32, f64);
impl_extend_into!(i64, f64);
impl_extend_into!(u64, f64);
impl_extend_into!(f32, f64);

impl_extend_into!(i32, f32, F32);
impl_extend_into!(i32, f64, F64);
impl_extend_into!(u32, f32, F32);
impl_extend_into!(u32, f64, F64);
impl_extend_into!(i64, f64, F64);
impl_extend_into!(u64, f64, F64);
impl_extend_into!(f32, f64, F64);

impl ExtendInto<F64> for F32 {
    fn extend_into(self) -> F64 {
        (f32::from(self) as f64).into()
    }
}

macro_rules! impl_transmute_into_self {
    ($type: ident) => {
        impl TransmuteInto<$type> for $type {
            fn transmute_into(self) -> $type {
                self
            }
        }
    };
}

impl_transmute_into_self!(i32);
impl_transmute_into_self!(i64);
impl_transmute_into_self!(f32);
impl_transmute_into_self!(f64);
impl_transmute_into_self!(F32);
impl_transmute_into_self!(F64);
impl_transmute_into_self!(V128);

macro_rules! impl_transmute_into_as {
    ($from: ident, $into: ident) => {
        impl TransmuteInto<$into> for $from {
            fn transmute_into(self) -> $into {
                self as $into
            }
        }
    };
}

impl_transmute_into_as!(i8, u8);
impl_transmute_into_as!(i32, u32);
impl_transmute_into_as!(i64, u64);

macro_rules! impl_transmute_into_npf {
    ($npf:ident, $float:ident, $signed:ident, $unsigned:ident) => {
        impl TransmuteInto<$float> for $npf {
            fn transmute_into(self) -> $float {
                self.into()
            }
        }

        impl TransmuteInto<$npf> for $float {
            fn transmute_into(self) -> $npf {
                self.into()
            }
        }

        impl TransmuteInto<$signed> for $npf {
            fn transmute_into(self) -> $signed {
                self.to_bits() as _
            }
        }

        impl TransmuteInto<$unsigned> for $npf {
            fn transmute_into(self) -> $unsigned {
                self.to_bits()
            }
        }

        impl TransmuteInto<$npf> for $signed {
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self as _)
            }
        }

        impl TransmuteInto<$npf> for $unsigned {
            fn transmute_into(self) -> $npf {
                $npf::from_bits(self)
            }
        }
    };
}

impl_transmute_into_npf!(F32, f32, i32, u32);
impl_transmute_into_npf!(F64, f64, i64, u64);

impl TransmuteInto<i32> for f32 {
    fn transmute_into(self) -> i32 {
        self.to_bits() as i32
    }
}

impl TransmuteInto<i64> for f64 {
    fn transmute_into(self) -> i64 {
        self.to_bits() as i64
    }
}

impl TransmuteInto<f32> for i32 {
    fn transmute_into(self) -> f32 {
        f32::from_bits(self as u32)
    }
}

impl TransmuteInto<f64> for i64 {
    fn transmute_into(self) -> f64 {
        f64::from_bits(self as u64)
    }
}

impl TransmuteInto<i32> for u32 {
    fn transmute_into(self) -> i32 {
        self as _
    }
}

impl TransmuteInto<i64> for u64 {
    fn transmute_into(self) -> i64 {
        self as _
    }
}

macro_rules! impl_little_endian_convert_int {
    ($type:ident, $size:expr) => {
        impl LittleEndianConvert for $type {
            fn into_little_endian(self, buffer: &mut [u8]) {
                buffer.copy_from_slice(&self.to_le_bytes());
            }

            fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
                let mut res = [0u8; $size];
                buffer
                    .get(0..$size)
                    .map(|s| {
                        res.copy_from_slice(s);
                        Self::from_le_bytes(res)
                    })
                    .ok_or(Error::InvalidLittleEndianBuffer)
            }
        }
    };
}

impl_little_endian_convert_int!(i8, 1);
impl_little_endian_convert_int!(u8, 1);
impl_little_endian_convert_int!(i16, 2);
impl_little_endian_convert_int!(u16, 2);
impl_little_endian_convert_int!(i32, 4);
impl_little_endian_convert_int!(u32, 4);
impl_little_endian_convert_int!(i64, 8);
impl_little_endian_convert_int!(u64, 8);

macro_rules! impl_little_endian_convert_float {
    ($type:ident, $repr:ident) => {
        impl LittleEndianConvert for $type {
            fn into_little_endian(self, buffer: &mut [u8]) {
                self.to_bits().into_little_endian(buffer)
            }

            fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
                $repr::from_little_endian(buffer).map(Self::from_bits)
            }
        }
    };
}

impl_little_endian_convert_float!(f32, u32);
impl_little_endian_convert_float!(f64, u64);
impl_little_endian_convert_float!(F32, u32);
impl_little_endian_convert_float!(F64, u64);

impl LittleEndianConvert for V128 {
    fn into_little_endian(self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.to_bytes());
    }

    fn from_little_endian(buffer: &[u8]) -> Result<Self, Error> {
        let mut res = [0u8; 16];
        buffer
            .get(0..16)
            .map(|s| {
                res.copy_from_slice(s);
                Self::from_bytes(res)
            })
            .ok_or(Error::InvalidLittleEndianBuffer)
    }
}

macro_rules! impl_integer_arithmetic_ops {
    ($type: ident) => {
        impl ArithmeticOps<$type> for $type {
            fn add(self, other: $type) -> $type {
                self.wrapping_add(other)
            }
            fn sub(self, other: $type) -> $type {
                self.wrapping_sub(other)
            }
            fn mul(self, other: $type) -> $type {
                self.wrapping_mul(other)
            }
            fn div(self, other: $type) -> Result<$type, TrapKind> {
                if other == 0 {
                    Err(TrapKind::DivisionByZero)
                } else {
                    let (result, overflow) = self.overflowing_div(other);
                    if overflow {
                        Err(TrapKind::IntegerOverflow)
                    } else {
                        Ok(result)
                    }
                }
            }
        }
    };
}

impl_integer_arithmetic_ops!(i32);
impl_integer_arithmetic_ops!(u32);
impl_integer_arithmetic_ops!(i64);
impl_integer_arithmetic_ops!(u64);

macro_rules! impl_float_arithmetic_ops {
    ($type: ident) => {
        impl ArithmeticOps<$type> for $type {
            fn add(self, other: $type) -> $type {
                self + other
            }
            fn sub(self, other: $type) -> $type {
                self - other
            }
            fn mul(self, other: $type) -> $type {
                self * other
            }
            fn div(self, other: $type) -> Result<$type, TrapKind> {
                Ok(self / other)
            }
        }
    };
}

impl_float_arithmetic_ops!(f32);
impl_float_arithmetic_ops!(f64);
impl_float_arithmetic_ops!(F32);
impl_float_arithmetic_ops!(F64);

macro_rules! impl_integer {
    ($type: ident) => {
        impl Integer<$type> for $type {
            fn leading_zeros(self) -> $type {
                self.leading_zeros() as $type
            }
            fn trailing_zeros(self) -> $type {
                self.trailing_zeros() as $type
            }
            fn count_ones(self) -> $type {
                self.count_ones() as $type
            }
            fn rotl(self, other: $type) -> $type {
                self.rotate_left(other as u32)
            }
            fn rotr(self, other: $type) -> $type {
                self.rotate_right(other as u32)
            }
            fn rem(self, other: $type) -> Result<$type, TrapKind> {
                if other == 0 {
                    Err(TrapKind::DivisionByZero)
                } else {
                    // `MIN % -1` is 0 under wrapping semantics, not a trap.
                    Ok(self.wrapping_rem(other))
                }
            }
        }
    };
}

impl_integer!(i32);
impl_integer!(u32);
impl_integer!(i64);
impl_integer!(u64);

/// Float math that works both with `std` and, through `libm`, without it.
///
/// The `nearest` helper implements round-half-to-even on top of the basic
/// rounding primitives since neither `std` nor `libm` expose it under that
/// name directly.
#[cfg(feature = "std")]
pub(crate) mod fmath {
    pub mod f32 {
        pub fn abs(v: f32) -> f32 {
            f32::abs(v)
        }

        pub fn floor(v: f32) -> f32 {
            f32::floor(v)
        }

        pub fn ceil(v: f32) -> f32 {
            f32::ceil(v)
        }

        pub fn trunc(v: f32) -> f32 {
            f32::trunc(v)
        }

        pub fn round(v: f32) -> f32 {
            f32::round(v)
        }

        pub fn fract(v: f32) -> f32 {
            f32::fract(v)
        }

        pub fn sqrt(v: f32) -> f32 {
            f32::sqrt(v)
        }

        pub fn nearest(v: f32) -> f32 {
            super::super::nearest_f32(v)
        }
    }

    pub mod f64 {
        pub fn abs(v: f64) -> f64 {
            f64::abs(v)
        }

        pub fn floor(v: f64) -> f64 {
            f64::floor(v)
        }

        pub fn ceil(v: f64) -> f64 {
            f64::ceil(v)
        }

        pub fn trunc(v: f64) -> f64 {
            f64::trunc(v)
        }

        pub fn round(v: f64) -> f64 {
            f64::round(v)
        }

        pub fn fract(v: f64) -> f64 {
            f64::fract(v)
        }

        pub fn sqrt(v: f64) -> f64 {
            f64::sqrt(v)
        }

        pub fn nearest(v: f64) -> f64 {
            super::super::nearest_f64(v)
        }
    }
}

#[cfg(not(feature = "std"))]
pub(crate) mod fmath {
    pub mod f32 {
        pub fn abs(v: f32) -> f32 {
            libm::fabsf(v)
        }

        pub fn floor(v: f32) -> f32 {
            libm::floorf(v)
        }

        pub fn ceil(v: f32) -> f32 {
            libm::ceilf(v)
        }

        pub fn trunc(v: f32) -> f32 {
            libm::truncf(v)
        }

        pub fn round(v: f32) -> f32 {
            libm::roundf(v)
        }

        pub fn fract(v: f32) -> f32 {
            v - trunc(v)
        }

        pub fn sqrt(v: f32) -> f32 {
            libm::sqrtf(v)
        }

        pub fn nearest(v: f32) -> f32 {
            super::super::nearest_f32(v)
        }
    }

    pub mod f64 {
        pub fn abs(v: f64) -> f64 {
            libm::fabs(v)
        }

        pub fn floor(v: f64) -> f64 {
            libm::floor(v)
        }

        pub fn ceil(v: f64) -> f64 {
            libm::ceil(v)
        }

        pub fn trunc(v: f64) -> f64 {
            libm::trunc(v)
        }

        pub fn round(v: f64) -> f64 {
            libm::round(v)
        }

        pub fn fract(v: f64) -> f64 {
            v - trunc(v)
        }

        pub fn sqrt(v: f64) -> f64 {
            libm::sqrt(v)
        }

        pub fn nearest(v: f64) -> f64 {
            super::super::nearest_f64(v)
        }
    }
}

macro_rules! impl_nearest {
    ($name:ident, $fXX:ident) => {
        fn $name(v: $fXX) -> $fXX {
            let round = fmath::$fXX::round(v);
            if fmath::$fXX::abs(fmath::$fXX::fract(v)) != 0.5 {
                return round;
            }

            use core::ops::Rem;
            if round.rem(2.0) == 1.0 {
                fmath::$fXX::floor(v)
            } else if round.rem(2.0) == -1.0 {
                fmath::$fXX::ceil(v)
            } else {
                round
            }
        }
    };
}

impl_nearest!(nearest_f32, f32);
impl_nearest!(nearest_f64, f64);

macro_rules! impl_float {
    ($type:ident, $fXX:ident, $iXX:ident) => {
        // In this particular instance we want to directly compare floating point numbers.
        #[allow(clippy::float_cmp)]
        impl Float<$type> for $type {
            fn abs(self) -> $type {
                fmath::$fXX::abs($fXX::from(self)).into()
            }
            fn floor(self) -> $type {
                fmath::$fXX::floor($fXX::from(self)).into()
            }
            fn ceil(self) -> $type {
                fmath::$fXX::ceil($fXX::from(self)).into()
            }
            fn trunc(self) -> $type {
                fmath::$fXX::trunc($fXX::from(self)).into()
            }
            fn nearest(self) -> $type {
                fmath::$fXX::nearest($fXX::from(self)).into()
            }
            fn sqrt(self) -> $type {
                fmath::$fXX::sqrt($fXX::from(self)).into()
            }
            fn min(self, other: $type) -> $type {
                let (a, b) = ($fXX::from(self), $fXX::from(other));
                if a.is_nan() || b.is_nan() {
                    return <$type>::from($fXX::NAN);
                }
                if a == b {
                    // min(+0, -0) is -0.
                    return if a.is_sign_negative() { self } else { other };
                }
                if a < b {
                    self
                } else {
                    other
                }
            }
            fn max(self, other: $type) -> $type {
                let (a, b) = ($fXX::from(self), $fXX::from(other));
                if a.is_nan() || b.is_nan() {
                    return <$type>::from($fXX::NAN);
                }
                if a == b {
                    // max(+0, -0) is +0.
                    return if a.is_sign_negative() { other } else { self };
                }
                if a > b {
                    self
                } else {
                    other
                }
            }
            fn copysign(self, other: $type) -> $type {
                use core::mem::size_of;

                let sign_mask: $iXX = 1 << ((size_of::<$iXX>() << 3) - 1);
                let self_int: $iXX = self.transmute_into();
                let other_int: $iXX = other.transmute_into();
                if other_int & sign_mask != 0 {
                    (self_int | sign_mask).transmute_into()
                } else {
                    (self_int & !sign_mask).transmute_into()
                }
            }
        }
    };
}

impl_float!(f32, f32, i32);
impl_float!(f64, f64, i64);
impl_float!(F32, f32, i32);
impl_float!(F64, f64, i64);

#[cfg(test)]
mod tests {
    use super::{
        ArithmeticOps, Float, FromValue, Integer, TruncateSaturateInto, TryTruncateInto, Value,
    };
    use crate::nan_preserving_float::{F32, F64};
    use crate::TrapKind;
    use assert_matches::assert_matches;

    #[test]
    fn default_values_are_zero_or_null() {
        use crate::types::ValueType;
        assert_eq!(Value::default(ValueType::I32), Value::I32(0));
        assert_eq!(Value::default(ValueType::FuncRef), Value::FuncRef(None));
        assert!(Value::default(ValueType::ExternRef).is_null_ref());
    }

    #[test]
    fn integer_div_traps() {
        assert_matches!(
            ArithmeticOps::div(1i32, 0i32),
            Err(TrapKind::DivisionByZero)
        );
        assert_matches!(
            ArithmeticOps::div(i32::MIN, -1i32),
            Err(TrapKind::IntegerOverflow)
        );
        assert_eq!(ArithmeticOps::div(7i32, 2i32), Ok(3));
        assert_eq!(ArithmeticOps::div(i64::MIN + 1, -1i64), Ok(i64::MAX));
    }

    #[test]
    fn integer_rem_min_by_minus_one_is_zero() {
        assert_eq!(Integer::rem(i32::MIN, -1i32), Ok(0));
        assert_matches!(Integer::rem(1i32, 0i32), Err(TrapKind::DivisionByZero));
    }

    #[test]
    fn wrapping_arithmetic() {
        assert_eq!(ArithmeticOps::add(i32::MAX, 1), i32::MIN);
        assert_eq!(ArithmeticOps::mul(0x8000_0001u32 as i32, 2), 2);
    }

    #[test]
    fn trunc_traps_on_nan_and_out_of_range() {
        let nan = F32::from_float(f32::NAN);
        assert_matches!(
            TryTruncateInto::<i32, _>::try_truncate_into(nan),
            Err(TrapKind::InvalidConversionToInt)
        );
        assert_matches!(
            TryTruncateInto::<i32, _>::try_truncate_into(F64::from_float(3e10)),
            Err(TrapKind::InvalidConversionToInt)
        );
        assert_eq!(
            TryTruncateInto::<i32, _>::try_truncate_into(F64::from_float(-7.9)),
            Ok(-7)
        );
    }

    #[test]
    fn trunc_sat_clamps() {
        assert_eq!(
            TruncateSaturateInto::<i32>::truncate_saturate_into(f32::NAN),
            0
        );
        assert_eq!(
            TruncateSaturateInto::<i32>::truncate_saturate_into(f32::INFINITY),
            i32::MAX
        );
        assert_eq!(
            TruncateSaturateInto::<i32>::truncate_saturate_into(f32::NEG_INFINITY),
            i32::MIN
        );
        assert_eq!(
            TruncateSaturateInto::<u32>::truncate_saturate_into(-5.0f64),
            0
        );
        assert_eq!(
            TruncateSaturateInto::<u32>::truncate_saturate_into(7.9f64),
            7
        );
    }

    #[test]
    fn float_min_max_nan_and_zero() {
        let nan = F32::from_float(f32::NAN);
        let one = F32::from_float(1.0);
        assert!(Float::min(nan, one).is_nan());
        assert!(Float::max(one, nan).is_nan());

        let pos = F32::from_float(0.0);
        let neg = F32::from_float(-0.0);
        assert_eq!(Float::min(pos, neg).to_bits(), neg.to_bits());
        assert_eq!(Float::min(neg, pos).to_bits(), neg.to_bits());
        assert_eq!(Float::max(pos, neg).to_bits(), pos.to_bits());
        assert_eq!(Float::max(neg, pos).to_bits(), pos.to_bits());
    }

    #[test]
    fn nearest_rounds_ties_to_even() {
        assert_eq!(Float::nearest(2.5f64), 2.0);
        assert_eq!(Float::nearest(3.5f64), 4.0);
        assert_eq!(Float::nearest(-2.5f64), -2.0);
        assert_eq!(Float::nearest(4.6f64), 5.0);
    }

    #[test]
    fn copysign_applies_to_nan() {
        let nan = F64::from_float(f64::NAN);
        let negative = F64::from_float(-1.0);
        assert!(Float::copysign(nan, negative).is_sign_negative());
    }

    #[test]
    fn value_conversions() {
        assert_eq!(
            <i32 as FromValue>::from_value(Value::I32(17)),
            Some(17)
        );
        assert_eq!(<i32 as FromValue>::from_value(Value::I64(17)), None);
        assert_eq!(
            <bool as FromValue>::from_value(Value::I32(2)),
            Some(true)
        );
    }
}
