// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lifting `old(EXPR)` out of postconditions.
//!
//! Every history expression is evaluated once, before the function body runs,
//! and bound to a fresh local. The postcondition then refers to that local.
//! Identical expressions share one capture.

use super::{Access, ContractFn};
use proc_macro2::{Ident, Span, TokenStream};
use quote::{ToTokens, format_ident, quote};
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::visit_mut::{self, VisitMut};
use syn::{Expr, ExprCall, ExprPath, parse_quote};

/// One history expression and the local it is captured in.
pub struct Capture {
    pub ident: Ident,
    pub expr: Expr,
    key: String,
    /// Captured through a reference parameter: the local holds the pointee
    /// and the postcondition sees a reference to it.
    through_ref: bool,
}

/// The history expressions of all postconditions of one function.
#[derive(Default)]
pub struct History {
    pub captures: Vec<Capture>,
}

impl History {
    /// Replace every `old(..)` in `expr` by its capture.
    pub fn lift(&mut self, function: &ContractFn, expr: &mut Expr) -> syn::Result<()> {
        let mut lifter = OldVisitor { history: self, function, errors: Vec::new() };
        lifter.visit_expr_mut(expr);
        combine(lifter.errors)
    }

    /// The `let` statements evaluating the captures.
    pub fn bindings(&self) -> TokenStream {
        let bindings = self.captures.iter().map(|capture| {
            let Capture { ident, expr, through_ref, .. } = capture;
            if *through_ref {
                quote!(let #ident = ::covenant::internal::capture(&*#expr);)
            } else {
                quote!(let #ident = ::covenant::internal::capture(&(#expr));)
            }
        });
        quote!(#(#bindings)*)
    }
}

pub fn combine(errors: Vec<syn::Error>) -> syn::Result<()> {
    let mut errors = errors.into_iter();
    match errors.next() {
        None => Ok(()),
        Some(mut first) => {
            errors.for_each(|error| first.combine(error));
            Err(first)
        }
    }
}

/// Whether `expr` is a call `old(..)`.
fn is_old_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call(ExprCall { func, .. }) => matches!(
            func.as_ref(),
            Expr::Path(ExprPath { qself: None, path, .. })
                if path.leading_colon.is_none() && path.is_ident("old")
        ),
        _ => false,
    }
}

struct OldVisitor<'a> {
    history: &'a mut History,
    function: &'a ContractFn,
    errors: Vec<syn::Error>,
}

impl OldVisitor<'_> {
    fn lift_one(&mut self, call: &ExprCall, span: Span) -> Option<Expr> {
        if call.args.len() != 1 {
            self.errors.push(syn::Error::new(span, "`old` takes exactly one expression"));
            return None;
        }
        let inner = call.args.first()?.clone();
        let mut denier = OldDenier { errors: Vec::new() };
        denier.visit_expr(&inner);
        if !denier.errors.is_empty() {
            self.errors.extend(denier.errors);
            return None;
        }

        let through_ref = match &inner {
            Expr::Path(path) => path.path.get_ident().is_some_and(|ident| {
                self.function
                    .param(&ident.to_string())
                    .is_some_and(|param| matches!(param.access, Access::Shared | Access::Unique))
            }),
            _ => false,
        };
        let key = inner.to_token_stream().to_string();
        let existing = self.history.captures.iter().find(|c| c.key == key);
        let ident = match existing {
            Some(capture) => capture.ident.clone(),
            None => {
                let ident = format_ident!("__covenant_old_{}", self.history.captures.len());
                self.history.captures.push(Capture {
                    ident: ident.clone(),
                    expr: inner,
                    key,
                    through_ref,
                });
                ident
            }
        };
        Some(if through_ref { parse_quote!((&#ident)) } else { parse_quote!((#ident)) })
    }
}

impl VisitMut for OldVisitor<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if is_old_call(expr) {
            let span = expr.span();
            if let Expr::Call(call) = &*expr {
                if let Some(replacement) = self.lift_one(call, span) {
                    *expr = replacement;
                }
            }
        } else {
            visit_mut::visit_expr_mut(self, expr)
        }
    }
}

struct OldDenier {
    errors: Vec<syn::Error>,
}

impl<'ast> syn::visit::Visit<'ast> for OldDenier {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if is_old_call(expr) {
            self.errors.push(syn::Error::new(expr.span(), "history expression may not be nested"));
        }
        syn::visit::visit_expr(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ContractFn;

    fn function() -> ContractFn {
        let item: syn::ItemFn = parse_quote!(
            fn pop(stack: &mut Vec<u8>, n: usize) -> Option<u8> { stack.pop() }
        );
        ContractFn::analyze(&item).unwrap()
    }

    #[test]
    fn captures_are_shared_between_identical_expressions() {
        let function = function();
        let mut history = History::default();
        let mut post: Expr = parse_quote!(|r: &Option<u8>| stack.len() + 1 == old(stack.len()) || old(stack.len()) == 0);
        history.lift(&function, &mut post).unwrap();
        assert_eq!(history.captures.len(), 1);
        let text = post.to_token_stream().to_string();
        assert_eq!(text.matches("__covenant_old_0").count(), 2);
        assert!(!text.contains("old ("));
    }

    #[test]
    fn reference_parameters_are_captured_by_pointee() {
        let function = function();
        let mut history = History::default();
        let mut post: Expr = parse_quote!(|r: &Option<u8>| old(stack).len() >= stack.len());
        history.lift(&function, &mut post).unwrap();
        let bindings = history.bindings().to_string();
        assert!(bindings.contains("capture (& * stack)"), "{bindings}");
        assert!(post.to_token_stream().to_string().contains("(& __covenant_old_0)"));
    }

    #[test]
    fn nested_history_is_rejected() {
        let function = function();
        let mut history = History::default();
        let mut post: Expr = parse_quote!(|r: &Option<u8>| old(old(n)) == n);
        let error = history.lift(&function, &mut post).unwrap_err();
        assert_eq!(error.to_string(), "history expression may not be nested");
    }
}
