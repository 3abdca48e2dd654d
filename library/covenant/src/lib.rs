// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Function contracts that are checked against the real implementation and
//! then substituted for it at call sites.
//!
//! ```ignore
//! #[covenant::requires(divisor != 0)]
//! #[covenant::ensures(|result: &u32| *result <= dividend)]
//! fn divide(dividend: u32, divisor: u32) -> u32 {
//!     dividend / divisor
//! }
//!
//! #[covenant::proof_for_contract(divide)]
//! fn check_divide() {
//!     divide(covenant::any(), covenant::any());
//! }
//!
//! #[covenant::proof]
//! #[covenant::stub_verified(divide)]
//! fn use_divide() {
//!     let x: u32 = covenant::any();
//!     covenant::assert(divide(x, 3) <= x, "quotient is bounded");
//! }
//! ```
//!
//! Harnesses are executed by `covenant-driver`, which orders them so that a
//! replacement is only used once its contract has been checked.

// Generated code refers to `::covenant`, including inside this crate's tests.
extern crate self as covenant;

pub mod alloc;
pub mod arbitrary;
pub mod backend;
mod context;
pub mod footprint;
pub mod havoc;
#[doc(hidden)]
pub mod internal;
mod source;

pub use alloc::TrackingAllocator;
pub use arbitrary::Arbitrary;
pub use footprint::Footprint;
pub use havoc::Havoc;

/// Covenant proc macros must be in a separate crate.
pub use covenant_macros::*;

use std::panic::Location;

/// Creates an assumption that holds for the rest of the current path.
///
/// When the condition is false the path is pruned: the harness stops exploring
/// it and nothing after this call is checked. Pruning is never reported as a
/// failure.
///
/// ```ignore
/// let i: i32 = covenant::any();
/// covenant::assume(i > 10);
/// assert!(i >= 0);
/// ```
#[track_caller]
pub fn assume(cond: bool) {
    if !cond {
        context::prune(false);
    }
}

/// Creates an assertion of the specified condition and message.
///
/// Inside a harness the outcome is recorded and exploration continues; outside
/// of one a failed assertion panics like `assert!`.
///
/// ```ignore
/// let x: bool = covenant::any();
/// let y = !x;
/// covenant::assert(x || y, "ORing a boolean variable with its negation must be true")
/// ```
#[track_caller]
pub fn assert(cond: bool, msg: &'static str) {
    let location = Location::caller();
    if !context::record_assertion(cond, msg, location) && !cond {
        panic!("{msg}");
    }
}

/// This creates a *valid* arbitrary value of type `T`.
///
/// In the snippet below the function under verification is exercised with
/// `NonZeroU8` values, i.e. every `u8` except zero.
///
/// ```ignore
/// let input = covenant::any::<std::num::NonZeroU8>();
/// fn_under_verification(input);
/// ```
#[inline(always)]
pub fn any<T: Arbitrary>() -> T {
    T::any()
}

/// An arbitrary value that satisfies `predicate`.
///
/// Values are drawn until one satisfies the predicate. When none does within
/// the attempt budget of the current path, the path is pruned.
pub fn any_where<T: Arbitrary, F: Fn(&T) -> bool>(predicate: F) -> T {
    for _ in 0..context::draw_attempts() {
        let value = T::any();
        if predicate(&value) {
            return value;
        }
    }
    context::prune(false)
}

/// A vector of arbitrary elements whose length is at most `MAX_LENGTH`.
pub fn any_vec<T: Arbitrary, const MAX_LENGTH: usize>() -> Vec<T> {
    let len = source::draw(|s| s.below(MAX_LENGTH + 1));
    (0..len).map(|_| T::any()).collect()
}
