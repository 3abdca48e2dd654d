// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replacing the contents of memory with fresh valid values.

use crate::Arbitrary;
use std::ops::Range;

/// Types whose value can be replaced by an arbitrary valid one.
///
/// Every [`Arbitrary`] type can be havocked, and so can slices of them.
pub trait Havoc {
    /// Drop the current value and store a fresh arbitrary one.
    fn havoc(&mut self);

    #[doc(hidden)]
    fn erase(this: *mut Self) -> ErasedPlace;
}

/// A place with its type erased, so a list of places can be havocked later.
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct ErasedPlace {
    target: *mut (),
    count: usize,
    bytes: usize,
    writer: unsafe fn(*mut (), usize),
}

unsafe fn write_one<T: Arbitrary>(target: *mut (), _count: usize) {
    unsafe { *target.cast::<T>() = T::any() }
}

unsafe fn write_slice<T: Arbitrary>(target: *mut (), count: usize) {
    let first = target.cast::<T>();
    for i in 0..count {
        unsafe { *first.add(i) = T::any() }
    }
}

impl<T: Arbitrary> Havoc for T {
    fn havoc(&mut self) {
        *self = T::any();
    }

    fn erase(this: *mut T) -> ErasedPlace {
        ErasedPlace {
            target: this.cast(),
            count: 1,
            bytes: std::mem::size_of::<T>(),
            writer: write_one::<T>,
        }
    }
}

impl<T: Arbitrary> Havoc for [T] {
    fn havoc(&mut self) {
        for elem in self {
            *elem = T::any();
        }
    }

    fn erase(this: *mut [T]) -> ErasedPlace {
        let count = this.len();
        ErasedPlace {
            target: this.cast(),
            count,
            bytes: count * std::mem::size_of::<T>(),
            writer: write_slice::<T>,
        }
    }
}

/// A memory range a function declares it may write, as evaluated at a call.
#[derive(Clone, Debug)]
pub struct Place {
    /// The clause text the place was written as.
    pub label: &'static str,
    erased: ErasedPlace,
}

impl Place {
    pub(crate) fn new(label: &'static str, erased: ErasedPlace) -> Place {
        Place { label, erased }
    }

    pub fn range(&self) -> Range<usize> {
        let start = self.erased.target as usize;
        start..start + self.erased.bytes
    }

    /// Overwrite the place with fresh valid values.
    ///
    /// # Safety
    ///
    /// The place must still be valid for writes, initialized, and not borrowed
    /// by any reference that is used before the write completes.
    pub unsafe fn havoc(&self) {
        unsafe { (self.erased.writer)(self.erased.target, self.erased.count) }
    }
}

/// Pointer-like values that designate a place: `&mut T`, `&mut [T]`,
/// `*mut T` and `*mut [T]`.
pub trait Pointer {
    fn place(&self, label: &'static str) -> Place;
}

impl<T: ?Sized + Havoc> Pointer for &mut T {
    fn place(&self, label: &'static str) -> Place {
        let raw: *const T = &**self;
        Place { label, erased: T::erase(raw.cast_mut()) }
    }
}

impl<T: ?Sized + Havoc> Pointer for *mut T {
    fn place(&self, label: &'static str) -> Place {
        Place { label, erased: T::erase(*self) }
    }
}

/// Anything whose address designates an allocation: references, raw pointers
/// and boxes.
pub trait Addressable {
    fn address(&self) -> usize;
}

impl<T: ?Sized> Addressable for &T {
    fn address(&self) -> usize {
        (*self as *const T).cast::<u8>() as usize
    }
}

impl<T: ?Sized> Addressable for &mut T {
    fn address(&self) -> usize {
        (&**self as *const T).cast::<u8>() as usize
    }
}

impl<T: ?Sized> Addressable for *const T {
    fn address(&self) -> usize {
        self.cast::<u8>() as usize
    }
}

impl<T: ?Sized> Addressable for *mut T {
    fn address(&self) -> usize {
        self.cast::<u8>() as usize
    }
}

impl<T: ?Sized> Addressable for Box<T> {
    fn address(&self) -> usize {
        (&**self as *const T).cast::<u8>() as usize
    }
}

impl<T: ?Sized> Addressable for std::ptr::NonNull<T> {
    fn address(&self) -> usize {
        self.as_ptr().cast::<u8>() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::reseed;

    #[test]
    fn slice_place_spans_elements() {
        let mut data = [1u16, 2, 3, 4];
        let expected = {
            let start = data[1..3].as_ptr() as usize;
            start..start + 4
        };
        let place = Pointer::place(&&mut data[1..3], "&mut data[1..3]");
        assert_eq!(place.range(), expected);
    }

    #[test]
    fn havoc_through_place_touches_only_the_place() {
        reseed(9, 100);
        let mut data = [7u8; 4];
        let place = Pointer::place(&&mut data[2], "&mut data[2]");
        for _ in 0..32 {
            unsafe { place.havoc() };
        }
        assert_eq!(&data[..2], &[7, 7]);
        assert_eq!(data[3], 7);
    }

    #[test]
    fn raw_pointer_places_and_addresses_agree() {
        let mut value = 5u64;
        let raw: *mut u64 = &mut value;
        let place = Pointer::place(&raw, "ptr");
        assert_eq!(place.range().start, Addressable::address(&raw));
        assert_eq!(place.range().len(), 8);
    }
}
