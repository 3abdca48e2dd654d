// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attributes and derives of the covenant runtime. Use them through the
//! `covenant` crate, which re-exports everything defined here.

mod attrs;
mod contracts;
mod derive;
mod harness;

// proc_macro::quote is nightly-only, so we'll cobble things together instead
use proc_macro::TokenStream;
use proc_macro_error2::{abort_if_dirty, emit_error, proc_macro_error};

use attrs::{ClauseKind, HarnessAttr};

/// Turn the errors of an expansion into diagnostics, one per error.
fn report(result: syn::Result<proc_macro2::TokenStream>) -> TokenStream {
    match result {
        Ok(tokens) => tokens.into(),
        Err(errors) => {
            for error in errors {
                emit_error!(error.span(), "{}", error);
            }
            abort_if_dirty();
            TokenStream::new()
        }
    }
}

/// Marks a harness: an entry point explored by `covenant-driver`.
///
/// Harnesses take no parameters and return `()`.
#[proc_macro_error]
#[proc_macro_attribute]
pub fn proof(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(harness::expand(HarnessAttr::Proof, attr.into(), item.into()))
}

/// Marks a harness that checks the contract of the given function.
///
/// The function is called through its check variant inside this harness: its
/// preconditions are assumed, its postconditions and its write footprint are
/// checked. Exactly one target is allowed.
///
/// ```ignore
/// #[covenant::proof_for_contract(divide)]
/// fn check_divide() {
///     divide(covenant::any(), covenant::any());
/// }
/// ```
#[proc_macro_error]
#[proc_macro_attribute]
pub fn proof_for_contract(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(harness::expand(HarnessAttr::ProofForContract, attr.into(), item.into()))
}

/// Replace every call to the given function with its contract for the whole
/// harness. Only valid together with `proof` or `proof_for_contract`, and may
/// be repeated.
///
/// The driver runs such a harness only after the contract was checked.
#[proc_macro_error]
#[proc_macro_attribute]
pub fn stub_verified(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(harness::expand(HarnessAttr::StubVerified, attr.into(), item.into()))
}

/// Add a precondition to this function.
///
/// The condition is a side-effect free boolean expression over the
/// parameters. It is assumed when the contract is checked and asserted at
/// every call where the contract replaces the function.
#[proc_macro_error]
#[proc_macro_attribute]
pub fn requires(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(contracts::expand(ClauseKind::Requires, attr.into(), item.into()))
}

/// Add a postcondition to this function.
///
/// The condition is a closure that receives a reference to the result.
/// `old(EXPR)` inside it evaluates `EXPR` before the function runs.
///
/// ```ignore
/// #[covenant::ensures(|result: &Option<u8>| result.is_some() == (old(self.len()) > 0))]
/// ```
#[proc_macro_error]
#[proc_macro_attribute]
pub fn ensures(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(contracts::expand(ClauseKind::Ensures, attr.into(), item.into()))
}

/// Declare the memory this function may write: a comma separated list of
/// pointer-like places, optionally preceded by `if GUARD =>`.
///
/// Without any `modifies` clause every `&mut` parameter may be written.
#[proc_macro_error]
#[proc_macro_attribute]
pub fn modifies(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(contracts::expand(ClauseKind::Modifies, attr.into(), item.into()))
}

/// Declare the allocations this function may free.
#[proc_macro_error]
#[proc_macro_attribute]
pub fn frees(attr: TokenStream, item: TokenStream) -> TokenStream {
    report(contracts::expand(ClauseKind::Frees, attr.into(), item.into()))
}

/// Allow users to auto generate Arbitrary implementations by using `#[derive(Arbitrary)]` macro.
#[proc_macro_error]
#[proc_macro_derive(Arbitrary)]
pub fn derive_arbitrary(item: TokenStream) -> TokenStream {
    derive::expand_derive_arbitrary(item)
}

/// Record every field of a type for frame checking with `#[derive(Footprint)]`.
#[proc_macro_error]
#[proc_macro_derive(Footprint)]
pub fn derive_footprint(item: TokenStream) -> TokenStream {
    derive::expand_derive_footprint(item)
}
