// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The replacement variant: the contract standing in for the body.
//!
//! The caller's obligations are asserted, then the footprint is havocked and a
//! result drawn until the postconditions hold for both. Without a `modifies`
//! clause the footprint is the pointee of every `&mut` parameter and of every
//! non-null `*mut` parameter.

use super::ContractPlan;
use proc_macro2::TokenStream;
use quote::quote;

impl ContractPlan<'_> {
    fn havoc_footprint(&self) -> (TokenStream, TokenStream) {
        if self.modifies.is_empty() {
            let inferred = self.function.unique_params().map(|param| {
                let ident = &param.ident;
                quote!(::covenant::Havoc::havoc(&mut *#ident);)
            });
            let pointees = self.function.raw_mut_params().map(|param| {
                let ident = &param.ident;
                quote! {
                    if !#ident.is_null() {
                        unsafe { ::covenant::Havoc::havoc(&mut *#ident) };
                    }
                }
            });
            return (quote!(), quote!(#(#inferred)* #(#pointees)*));
        }
        let places = self.modifies.iter().map(|clause| {
            let places = clause.places.iter().map(|place| {
                let place = self.place(&place.expr, &place.text);
                quote!(__covenant_places.push(#place);)
            });
            Self::guarded(&clause.guard, quote!(#(#places)*))
        });
        let collect = quote! {
            let mut __covenant_places = ::std::vec::Vec::new();
            #(#places)*
        };
        let havoc = quote!(unsafe { ::covenant::internal::havoc_places(&__covenant_places) };);
        (collect, havoc)
    }

    pub(super) fn replace_arm(&self) -> TokenStream {
        let output = &self.function.output;
        let obligations = self.requires.iter().enumerate().map(|(index, pre)| {
            let expr = &pre.expr;
            quote!(__covenant_contract.assert_precondition(#index, #expr);)
        });
        let copies = self.copies();
        let history = self.history.bindings();
        let (collect, havoc) = self.havoc_footprint();
        let accept = if self.ensures.is_empty() {
            quote!(::core::option::Option::Some(__covenant_result))
        } else {
            let holds = self.ensures.iter().map(|post| {
                let closure = &post.closure;
                quote!(::covenant::internal::ensure_holds(&__covenant_result, #closure))
            });
            quote!((#(#holds)&&*).then_some(__covenant_result))
        };
        quote!({
            #(#obligations)*
            #copies
            #history
            #collect
            __covenant_contract.replace(|| {
                #havoc
                let __covenant_result: #output = ::covenant::any();
                #accept
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::attrs::ClauseKind;
    use crate::contracts::expand;
    use quote::quote;

    fn replace_arm(out: &str) -> &str {
        let start = out.find("Mode :: Replace").unwrap();
        &out[start..]
    }

    #[test]
    fn preconditions_become_obligations() {
        let item = quote!(fn divide(a: u32, b: u32) -> u32 { a / b });
        let out = expand(ClauseKind::Requires, quote!(b != 0), item).unwrap().to_string();
        let arm = replace_arm(&out);
        assert!(arm.contains("assert_precondition (0usize , b != 0)"), "{arm}");
        assert!(arm.contains("Option :: Some (__covenant_result)"));
    }

    #[test]
    fn inferred_footprint_havocs_mutable_parameters() {
        let item = quote!(fn fill(buf: &mut [u8], len: usize, seen: &Vec<u8>) {});
        let out = expand(ClauseKind::Requires, quote!(len <= buf.len()), item).unwrap().to_string();
        let arm = replace_arm(&out);
        assert!(arm.contains("Havoc :: havoc (& mut * buf)"), "{arm}");
        assert!(!arm.contains("havoc (& mut * seen)"));
        assert!(!arm.contains("__covenant_places"));
    }

    #[test]
    fn inferred_footprint_havocs_raw_mutable_pointees() {
        let item = quote!(fn set_raw(p: *mut u32, q: *const u32) {});
        let out = expand(ClauseKind::Ensures, quote!(|_| true), item).unwrap().to_string();
        let arm = replace_arm(&out);
        assert!(arm.contains("if ! p . is_null ()"), "{arm}");
        assert!(arm.contains("Havoc :: havoc (& mut * p)"), "{arm}");
        assert!(!arm.contains("havoc (& mut * q)"));
    }

    #[test]
    fn explicit_footprint_is_collected_before_the_attempts() {
        let item = quote! {
            #[covenant::ensures(|r: &bool| *r || *flag == old(*flag))]
            fn toggle(flag: &mut bool, log: &mut Vec<u8>) -> bool { true }
        };
        let out = expand(ClauseKind::Modifies, quote!(if true => flag), item).unwrap().to_string();
        let arm = replace_arm(&out);
        let collect = arm.find("__covenant_places . push").unwrap();
        let attempts = arm.find("__covenant_contract . replace").unwrap();
        assert!(collect < attempts);
        assert!(!arm.contains("havoc (& mut * log)"));
        assert!(arm.contains(". then_some (__covenant_result)"));
    }
}
