// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The `Arbitrary` trait and its implementations for standard types.
//!
//! Every value produced here respects the validity envelope of its type: a
//! `bool` is 0 or 1, a `char` is a Unicode scalar value, a `NonZeroU8` is never
//! zero. Havoc relies on this, since a replaced function may only leave valid
//! values behind.

use crate::source;
use std::marker::{PhantomData, PhantomPinned};
use std::num::*;

/// The default upper bound on the length of arbitrary collections.
pub const DEFAULT_COLLECTION_LENGTH: usize = 8;

/// Types whose valid values can be produced by the exploration backend.
pub trait Arbitrary
where
    Self: Sized,
{
    fn any() -> Self;
    fn any_array<const MAX_ARRAY_LENGTH: usize>() -> [Self; MAX_ARRAY_LENGTH] {
        [(); MAX_ARRAY_LENGTH].map(|_| Self::any())
    }
}

/// Integers are drawn uniformly, except for a share of boundary values.
macro_rules! integer_arbitrary {
    ( $type: ty, [ $($edge: expr),* ] ) => {
        impl Arbitrary for $type {
            #[inline]
            fn any() -> Self {
                source::draw(|s| {
                    if s.edge() {
                        s.pick(&[0, 1, 2, <$type>::MIN, <$type>::MAX, <$type>::MAX - 1 $(, $edge)*])
                    } else {
                        s.bits()
                    }
                })
            }
        }
    };
}

/// Floats are not constrained: NaN, infinities and subnormals are all valid.
macro_rules! float_arbitrary {
    ( $type: ty, $bits: ty ) => {
        impl Arbitrary for $type {
            #[inline]
            fn any() -> Self {
                source::draw(|s| {
                    if s.edge() {
                        s.pick(&[0.0, -0.0, 1.0, -1.0, <$type>::MIN, <$type>::MAX, <$type>::INFINITY, <$type>::NAN])
                    } else {
                        <$type>::from_bits(s.bits::<$bits>())
                    }
                })
            }
        }
    };
}

macro_rules! nonzero_arbitrary {
    ( $type: ty, $base: ty ) => {
        impl Arbitrary for $type {
            #[inline]
            fn any() -> Self {
                let val = <$base>::any();
                crate::assume(val != 0);
                match <$type>::new(val) {
                    Some(nonzero) => nonzero,
                    None => crate::context::prune(false),
                }
            }
        }
    };
}

integer_arbitrary!(u8, []);
integer_arbitrary!(u16, []);
integer_arbitrary!(u32, []);
integer_arbitrary!(u64, []);
integer_arbitrary!(u128, []);
integer_arbitrary!(usize, []);

integer_arbitrary!(i8, [-1]);
integer_arbitrary!(i16, [-1]);
integer_arbitrary!(i32, [-1]);
integer_arbitrary!(i64, [-1]);
integer_arbitrary!(i128, [-1]);
integer_arbitrary!(isize, [-1]);

float_arbitrary!(f32, u32);
float_arbitrary!(f64, u64);

nonzero_arbitrary!(NonZeroU8, u8);
nonzero_arbitrary!(NonZeroU16, u16);
nonzero_arbitrary!(NonZeroU32, u32);
nonzero_arbitrary!(NonZeroU64, u64);
nonzero_arbitrary!(NonZeroU128, u128);
nonzero_arbitrary!(NonZeroUsize, usize);

nonzero_arbitrary!(NonZeroI8, i8);
nonzero_arbitrary!(NonZeroI16, i16);
nonzero_arbitrary!(NonZeroI32, i32);
nonzero_arbitrary!(NonZeroI64, i64);
nonzero_arbitrary!(NonZeroI128, i128);
nonzero_arbitrary!(NonZeroIsize, isize);

impl Arbitrary for () {
    fn any() -> Self {}
}

impl Arbitrary for bool {
    #[inline]
    fn any() -> Self {
        source::draw(|s| s.bits())
    }
}

/// Only Unicode scalar values: the ranges [0x0, 0xD7FF] and [0xE000, 0x10FFFF].
impl Arbitrary for char {
    #[inline]
    fn any() -> Self {
        source::draw(|s| if s.edge() { s.pick(&['\0', 'a', '\u{D7FF}', '\u{E000}', char::MAX]) } else { s.bits() })
    }
}

impl<T, const N: usize> Arbitrary for [T; N]
where
    T: Arbitrary,
{
    fn any() -> Self {
        T::any_array::<N>()
    }
}

impl<T> Arbitrary for Option<T>
where
    T: Arbitrary,
{
    fn any() -> Self {
        if bool::any() { Some(T::any()) } else { None }
    }
}

impl<T, E> Arbitrary for Result<T, E>
where
    T: Arbitrary,
    E: Arbitrary,
{
    fn any() -> Self {
        if bool::any() { Ok(T::any()) } else { Err(E::any()) }
    }
}

impl<T: Arbitrary> Arbitrary for Box<T> {
    fn any() -> Self {
        Box::new(T::any())
    }
}

/// Vectors up to [`DEFAULT_COLLECTION_LENGTH`] elements; use
/// [`crate::any_vec`] for another bound.
impl<T: Arbitrary> Arbitrary for Vec<T> {
    fn any() -> Self {
        crate::any_vec::<T, DEFAULT_COLLECTION_LENGTH>()
    }
}

impl Arbitrary for String {
    fn any() -> Self {
        let len = source::draw(|s| s.below(DEFAULT_COLLECTION_LENGTH + 1));
        (0..len).map(|_| char::any()).collect()
    }
}

impl<T: ?Sized> Arbitrary for PhantomData<T> {
    fn any() -> Self {
        PhantomData
    }
}

impl Arbitrary for PhantomPinned {
    fn any() -> Self {
        PhantomPinned
    }
}

macro_rules! arbitrary_tuple {
    ($($type:ident),*) => {
        impl<$($type : Arbitrary),*>  Arbitrary for ($($type,)*) {
            #[inline(always)]
            fn any() -> Self {
                ($(crate::any::<$type>(),)*)
            }
        }
    }
}

arbitrary_tuple!(A);
arbitrary_tuple!(A, B);
arbitrary_tuple!(A, B, C);
arbitrary_tuple!(A, B, C, D);
arbitrary_tuple!(A, B, C, D, E);
arbitrary_tuple!(A, B, C, D, E, F);
arbitrary_tuple!(A, B, C, D, E, F, G);
arbitrary_tuple!(A, B, C, D, E, F, G, H);
arbitrary_tuple!(A, B, C, D, E, F, G, H, I);
arbitrary_tuple!(A, B, C, D, E, F, G, H, I, J);
arbitrary_tuple!(A, B, C, D, E, F, G, H, I, J, K);
arbitrary_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DEFAULT_EDGE_PERCENT, reseed};

    #[derive(crate::Arbitrary, Debug, PartialEq)]
    enum Shape {
        Dot,
        Square(u8),
        Rect { w: u8, h: u8 },
    }

    #[test]
    fn chars_are_scalar_values() {
        reseed(11, DEFAULT_EDGE_PERCENT);
        for _ in 0..512 {
            let c = char::any();
            assert!(char::from_u32(c as u32).is_some());
        }
    }

    #[test]
    fn nonzero_never_zero() {
        reseed(3, 100);
        // With every draw an edge value, zero comes up quickly; the only
        // outcome other than a non-zero value is a pruned path.
        for _ in 0..64 {
            if let Ok(v) = std::panic::catch_unwind(NonZeroU8::any) {
                assert_ne!(v.get(), 0);
            }
        }
    }

    #[test]
    fn collections_respect_default_bound() {
        reseed(5, DEFAULT_EDGE_PERCENT);
        for _ in 0..64 {
            assert!(Vec::<u8>::any().len() <= DEFAULT_COLLECTION_LENGTH);
            assert!(String::any().chars().count() <= DEFAULT_COLLECTION_LENGTH);
        }
    }

    #[test]
    fn derived_enum_reaches_every_variant() {
        reseed(1, DEFAULT_EDGE_PERCENT);
        let mut seen = [false; 3];
        for _ in 0..256 {
            match Shape::any() {
                Shape::Dot => seen[0] = true,
                Shape::Square(_) => seen[1] = true,
                Shape::Rect { .. } => seen[2] = true,
            }
        }
        assert_eq!(seen, [true, true, true]);
    }
}
