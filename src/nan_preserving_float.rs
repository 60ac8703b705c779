#![allow(missing_docs)]

//! Floating point types that preserve NaN bit patterns.
//!
//! Rust's `f32`/`f64` make no promises about the payload bits of NaNs that
//! pass through arithmetic or conversions, while wasm semantics are defined
//! on bit patterns. These wrappers store the raw bits and only convert to
//! native floats at the point of an actual arithmetic operation.

use core::cmp::{Ordering, PartialEq, PartialOrd};
use core::ops::{Add, Div, Mul, Neg, Rem, Sub};
use num_traits::float::FloatCore;

macro_rules! impl_binop {
    ($for:ident, $is:ident, $op:ident, $func_name:ident) => {
        impl<T: Into<$for>> $op<T> for $for {
            type Output = Self;

            fn $func_name(self, other: T) -> Self {
                $for(
                    $op::$func_name($is::from_bits(self.0), $is::from_bits(other.into().0))
                        .to_bits(),
                )
            }
        }
    };
}

macro_rules! float {
    ($for:ident, $rep:ident, $is:ident) => {
        /// A floating point value represented by its raw bit pattern.
        #[derive(Copy, Clone)]
        pub struct $for($rep);

        impl_binop!($for, $is, Add, add);
        impl_binop!($for, $is, Sub, sub);
        impl_binop!($for, $is, Mul, mul);
        impl_binop!($for, $is, Div, div);
        impl_binop!($for, $is, Rem, rem);

        impl $for {
            const SIGN_BIT: $rep = 1 << (::core::mem::size_of::<$rep>() * 8 - 1);

            pub fn from_bits(bits: $rep) -> Self {
                $for(bits)
            }

            pub fn to_bits(self) -> $rep {
                self.0
            }

            pub fn from_float(value: $is) -> Self {
                value.into()
            }

            pub fn to_float(self) -> $is {
                self.into()
            }

            pub fn is_nan(self) -> bool {
                self.to_float().is_nan()
            }

            pub fn is_sign_negative(self) -> bool {
                self.0 & Self::SIGN_BIT != 0
            }

            /// Clears the sign bit; unlike native `abs` this never
            /// canonicalizes a NaN payload.
            pub fn abs(self) -> Self {
                $for(self.0 & !Self::SIGN_BIT)
            }

            pub fn fract(self) -> Self {
                FloatCore::fract(self.to_float()).into()
            }
        }

        impl From<$is> for $for {
            fn from(value: $is) -> $for {
                $for(value.to_bits())
            }
        }

        impl From<$for> for $is {
            fn from(wrapped: $for) -> $is {
                <$is>::from_bits(wrapped.0)
            }
        }

        impl Neg for $for {
            type Output = Self;

            /// Flips the sign bit; negation must not quiet NaNs.
            fn neg(self) -> Self {
                $for(self.0 ^ Self::SIGN_BIT)
            }
        }

        #[allow(clippy::cmp_owned)]
        impl<T: Into<$for> + Copy> PartialEq<T> for $for {
            fn eq(&self, other: &T) -> bool {
                $is::from(*self) == $is::from((*other).into())
            }
        }

        impl<T: Into<$for> + Copy> PartialOrd<T> for $for {
            fn partial_cmp(&self, other: &T) -> Option<Ordering> {
                $is::from(*self).partial_cmp(&$is::from((*other).into()))
            }
        }

        impl ::core::fmt::Debug for $for {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                $is::from(*self).fmt(f)
            }
        }
    };
}

float!(F32, u32, f32);
float!(F64, u64, f64);

impl From<u32> for F32 {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<F32> for u32 {
    fn from(wrapped: F32) -> Self {
        wrapped.to_bits()
    }
}

impl From<u64> for F64 {
    fn from(bits: u64) -> Self {
        Self::from_bits(bits)
    }
}

impl From<F64> for u64 {
    fn from(wrapped: F64) -> Self {
        wrapped.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::{F32, F64};

    #[test]
    fn arithmetic_matches_native() {
        let pairs = [(0.0f32, 1.5f32), (-2.25, 4.5), (1e30, -1e30), (0.1, 0.2)];
        for &(a, b) in &pairs {
            assert_eq!((F32::from(a) + b).to_float(), a + b);
            assert_eq!((F32::from(a) - b).to_float(), a - b);
            assert_eq!((F32::from(a) * b).to_float(), a * b);
            assert_eq!((F32::from(a) / b).to_float(), a / b);
        }
    }

    #[test]
    fn neg_preserves_nan_payload() {
        assert_eq!((-F32::from_bits(0xff80_3210)).to_bits(), 0x7f80_3210);
        assert_eq!(
            (-F64::from_bits(0xff80_3210_0000_0000)).to_bits(),
            0x7f80_3210_0000_0000
        );
    }

    #[test]
    fn abs_preserves_nan_payload() {
        assert_eq!(F32::from_bits(0xff80_3210).abs().to_bits(), 0x7f80_3210);
        assert_eq!(F64::from_bits(0x8000_0000_0000_0000).abs().to_bits(), 0);
    }

    #[test]
    fn nan_compares_unequal() {
        let nan = F64::from_float(f64::NAN);
        assert!(nan != nan);
        assert!(nan.is_nan());
    }
}
