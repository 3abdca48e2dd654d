// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The check variant: the real body, bracketed by the contract.

use super::ContractPlan;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

impl ContractPlan<'_> {
    /// Statements declaring the write footprint and the releasable
    /// allocations, snapshotting what the body may reach.
    fn frame_setup(&self) -> TokenStream {
        let explicit_modifies = !self.modifies.is_empty();
        let explicit_frees = !self.frees.is_empty();
        let modifies = self.modifies.iter().map(|clause| {
            let places = clause.places.iter().map(|place| {
                let place = self.place(&place.expr, &place.text);
                quote!(__covenant_frame.modifies(#place);)
            });
            Self::guarded(&clause.guard, quote!(#(#places)*))
        });
        let frees = self.frees.iter().map(|clause| {
            let places = clause.places.iter().map(|place| {
                let (expr, label) = (&place.expr, &place.text);
                quote! {
                    __covenant_frame.frees(#label, ::covenant::internal::Addressable::address(&(#expr)));
                }
            });
            Self::guarded(&clause.guard, quote!(#(#places)*))
        });
        let raw_roots = self.function.raw_params().map(|param| {
            let ident = &param.ident;
            quote!(__covenant_frame.raw_root(::covenant::internal::Addressable::address(&#ident));)
        });
        let mut roots: Vec<_> = self
            .function
            .unique_params()
            .map(|param| {
                let name = param.ident.to_string();
                let copy = param.copy_ident();
                quote!(__covenant_rec.root(#name, &**#copy);)
            })
            .collect();
        let mut pointers = Vec::new();
        for param in self.function.raw_mut_params() {
            let (ident, name) = (&param.ident, param.ident.to_string());
            let pointer = format_ident!("__covenant_ptr_{}", param.ident);
            pointers.push(quote!(let #pointer = #ident.cast_const();));
            roots.push(quote!(unsafe { __covenant_rec.pointee(#name, #pointer) };));
        }
        let roots_param = if roots.is_empty() { quote!(_) } else { quote!(__covenant_rec) };
        quote! {
            let mut __covenant_frame = __covenant_contract.frame(#explicit_modifies, #explicit_frees);
            #(#modifies)*
            #(#frees)*
            #(#raw_roots)*
            #(#pointers)*
            let __covenant_roots = |#roots_param: &mut ::covenant::footprint::Recorder| {
                #(#roots)*
            };
            __covenant_frame.before(&__covenant_roots);
        }
    }

    /// The check variant of the function with body `body`.
    pub(super) fn check_arm(&self, body: &syn::Block) -> TokenStream {
        let output = &self.function.output;
        let assumptions = self.requires.iter().enumerate().map(|(index, pre)| {
            let expr = &pre.expr;
            quote!(__covenant_contract.assume_precondition(#index, #expr);)
        });
        let copies = self.copies();
        let history = self.history.bindings();
        let (frame_setup, frame_check) = if self.has_frame() {
            (self.frame_setup(), quote!(__covenant_frame.after(&__covenant_roots);))
        } else {
            (quote!(), quote!())
        };
        let assertions = self.ensures.iter().enumerate().map(|(index, post)| {
            let closure = &post.closure;
            quote! {
                __covenant_contract.assert_postcondition(
                    #index,
                    ::covenant::internal::ensure_holds(&__covenant_result, #closure),
                );
            }
        });
        quote!({
            #(#assumptions)*
            #copies
            #history
            #frame_setup
            let __covenant_guard = __covenant_contract.enter();
            #[allow(clippy::redundant_closure_call)]
            let __covenant_result: #output = (|| -> #output #body)();
            ::core::mem::drop(__covenant_guard);
            #frame_check
            #(#assertions)*
            __covenant_result
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::attrs::ClauseKind;
    use crate::contracts::expand;
    use quote::quote;

    fn position(haystack: &str, needle: &str) -> usize {
        haystack.find(needle).unwrap_or_else(|| panic!("`{needle}` not found in {haystack}"))
    }

    #[test]
    fn preconditions_are_assumed_before_history_is_captured() {
        let item = quote! {
            #[covenant::ensures(|r: &u32| *r == old(x + 1))]
            fn inc(x: u32) -> u32 { x + 1 }
        };
        let out = expand(ClauseKind::Requires, quote!(x < u32::MAX), item).unwrap().to_string();
        let check = &out[position(&out, "Mode :: Check")..];
        assert!(position(check, "assume_precondition") < position(check, "__covenant_old_0 ="));
        assert!(position(check, "__covenant_old_0 =") < position(check, "__covenant_guard ="));
    }

    #[test]
    fn frame_is_only_emitted_for_explicit_clauses() {
        let item = quote!(fn bump(x: &mut u32) { *x += 1; });
        let without = expand(ClauseKind::Requires, quote!(*x < 10), item.clone()).unwrap().to_string();
        assert!(!without.contains("__covenant_frame"));
        let with = expand(ClauseKind::Modifies, quote!(x), item).unwrap().to_string();
        assert!(with.contains("__covenant_frame . before"));
        assert!(with.contains("root (\"x\" , & * * __covenant_arg_x)"), "{with}");
    }

    #[test]
    fn raw_mutable_pointees_are_frame_roots() {
        let item = quote!(fn write_both(a: &mut u32, b: *mut u32, c: *const u32) {});
        let out = expand(ClauseKind::Modifies, quote!(a), item).unwrap().to_string();
        assert!(out.contains("let __covenant_ptr_b = b . cast_const ()"), "{out}");
        assert!(out.contains("__covenant_rec . pointee (\"b\" , __covenant_ptr_b)"), "{out}");
        assert!(!out.contains("__covenant_ptr_c"));
        let check = &out[position(&out, "Mode :: Check")..];
        assert!(position(check, "__covenant_ptr_b =") < position(check, "__covenant_frame . before"));
    }
}
