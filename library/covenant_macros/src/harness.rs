// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expansion of `proof`, `proof_for_contract` and `stub_verified`.
//!
//! A harness keeps its body and gains a static description that the driver
//! reads by calling the harness once in describe mode.

use crate::attrs::{self, HarnessAttr, Recognized};
use crate::contracts::helpers::display_tokens;
use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, quote};
use syn::spanned::Spanned;
use syn::{ItemFn, Path};

fn parse_target(attr: HarnessAttr, args: TokenStream, span: Span) -> syn::Result<String> {
    if args.is_empty() {
        let message = format!("`{}` needs the path of a function with a contract", attr.name());
        return Err(syn::Error::new(span, message));
    }
    let path: Path = syn::parse2(args).map_err(|error| {
        syn::Error::new(
            error.span(),
            format!("`{}` takes exactly one path to a function with a contract", attr.name()),
        )
    })?;
    Ok(path_text(&path))
}

fn path_text(path: &Path) -> String {
    let segments = path.segments.iter().map(|segment| match &segment.arguments {
        syn::PathArguments::AngleBracketed(generics) => {
            format!("{}::<{}>", segment.ident, display_tokens(generics.args.to_token_stream()))
        }
        _ => segment.ident.to_string(),
    });
    let text = segments.collect::<Vec<_>>().join("::");
    if path.leading_colon.is_some() { format!("::{text}") } else { text }
}

/// Target texts as written may differ in a leading `crate::` or `self::`.
fn same_target(a: &str, b: &str) -> bool {
    let trim = |s: &str| -> String {
        let mut s = s.trim_start_matches("::");
        while let Some(rest) = s.strip_prefix("crate::").or_else(|| s.strip_prefix("self::")) {
            s = rest;
        }
        s.to_owned()
    };
    trim(a) == trim(b)
}

/// Expand a harness attribute `attr(args)` and its siblings on `item`.
pub fn expand(attr: HarnessAttr, args: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let mut item: ItemFn = syn::parse2(item)?;
    let mut harness = vec![(attr, args, Span::call_site())];
    let mut errors = Vec::new();
    for taken in attrs::take(&mut item.attrs)? {
        match taken.what {
            Recognized::Harness(attr) => harness.push((attr, taken.args, taken.span)),
            Recognized::Clause(kind) => errors.push(syn::Error::new(
                taken.span,
                format!("a harness cannot have a contract (`{}`)", kind.name()),
            )),
        }
    }

    let mut kinds = Vec::new();
    let mut check = None;
    let mut stubs: Vec<(String, Span)> = Vec::new();
    for (attr, args, span) in harness {
        match attr {
            HarnessAttr::Proof => {
                if !args.is_empty() {
                    errors.push(syn::Error::new(args.span(), "`proof` takes no arguments"));
                }
                kinds.push((attr, span));
            }
            HarnessAttr::ProofForContract => {
                match parse_target(attr, args, span) {
                    Ok(target) => check = Some(target),
                    Err(error) => errors.push(error),
                }
                kinds.push((attr, span));
            }
            HarnessAttr::StubVerified => match parse_target(attr, args, span) {
                Ok(target) => stubs.push((target, span)),
                Err(error) => errors.push(error),
            },
        }
    }
    match kinds.as_slice() {
        [_] => {}
        [] => errors.push(syn::Error::new(
            item.sig.ident.span(),
            "`stub_verified` is only allowed on a harness: add `proof` or `proof_for_contract`",
        )),
        [_, rest @ ..] => {
            for (attr, span) in rest {
                errors.push(syn::Error::new(
                    *span,
                    format!("duplicate harness attribute `{}`: a function is at most one harness", attr.name()),
                ));
            }
        }
    }
    if let Some(target) = &check {
        for (stub, span) in &stubs {
            if same_target(target, stub) {
                errors.push(syn::Error::new(
                    *span,
                    format!("`{target}` cannot be both checked and replaced by the same harness"),
                ));
            }
        }
    }
    let sig = &item.sig;
    if !sig.inputs.is_empty() {
        errors.push(syn::Error::new(sig.inputs.span(), "harnesses take no parameters"));
    }
    if let syn::ReturnType::Type(_, ty) = &sig.output {
        errors.push(syn::Error::new(ty.span(), "harnesses return `()`"));
    }
    if !sig.generics.params.is_empty() {
        errors.push(syn::Error::new(sig.generics.span(), "harnesses cannot be generic"));
    }
    if let Some(asyncness) = &sig.asyncness {
        errors.push(syn::Error::new(asyncness.span(), "harnesses cannot be `async`"));
    }
    crate::contracts::combine_errors(errors)?;

    let ItemFn { attrs, vis, sig, block } = item;
    let name = sig.ident.to_string();
    let check = match check {
        Some(target) => quote!(::core::option::Option::Some(#target)),
        None => quote!(::core::option::Option::None),
    };
    let stubs = stubs.iter().map(|(stub, _)| stub);
    let stmts = &block.stmts;
    Ok(quote! {
        #[allow(dead_code)]
        #(#attrs)*
        #vis #sig {
            static __COVENANT_HARNESS: ::covenant::internal::HarnessDef = ::covenant::internal::HarnessDef {
                name: #name,
                module: ::core::module_path!(),
                file: ::core::file!(),
                line: ::core::line!(),
                check: #check,
                stubs: &[#(#stubs),*],
            };
            if ::covenant::internal::begin_harness(&__COVENANT_HARNESS) {
                return;
            }
            #(#stmts)*
        }
    })
}
