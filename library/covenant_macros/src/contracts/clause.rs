// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parsing the arguments of contract attributes.

use super::helpers::display_tokens;
use crate::attrs::ClauseKind;
use proc_macro2::{Span, TokenStream};
use quote::ToTokens;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Expr, Token};

/// One clause of a contract, in the order it was written.
pub enum Clause {
    Requires { expr: Expr, text: String },
    Ensures { closure: Expr, text: String },
    Modifies(FrameClause),
    Frees(FrameClause),
}

/// A `modifies` or `frees` clause: `[if GUARD =>] PLACE, PLACE, ...`.
pub struct FrameClause {
    pub guard: Option<Expr>,
    pub places: Vec<FramePlace>,
    pub text: String,
}

pub struct FramePlace {
    pub expr: Expr,
    pub text: String,
}

struct FrameArgs {
    guard: Option<Expr>,
    places: Punctuated<Expr, Token![,]>,
}

impl Parse for FrameArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let guard = if input.peek(Token![if]) {
            input.parse::<Token![if]>()?;
            let guard = Expr::parse_without_eager_brace(input)?;
            input.parse::<Token![=>]>()?;
            Some(guard)
        } else {
            None
        };
        let places = Punctuated::parse_terminated(input)?;
        Ok(FrameArgs { guard, places })
    }
}

impl Clause {
    pub fn parse(kind: ClauseKind, args: TokenStream, span: Span) -> syn::Result<Clause> {
        if args.is_empty() {
            return Err(syn::Error::new(span, format!("`{}` needs an argument", kind.name())));
        }
        let text = display_tokens(args.clone());
        match kind {
            ClauseKind::Requires => Ok(Clause::Requires { expr: syn::parse2(args)?, text }),
            ClauseKind::Ensures => {
                let closure: Expr = syn::parse2(args)?;
                match &closure {
                    Expr::Closure(c) if c.inputs.len() == 1 => Ok(Clause::Ensures { closure, text }),
                    Expr::Closure(c) => Err(syn::Error::new_spanned(
                        &c.inputs,
                        "a postcondition closure takes exactly one argument: a reference to the result",
                    )),
                    other => Err(syn::Error::new_spanned(
                        other,
                        "a postcondition is a closure over the result, e.g. `|result: &u32| *result > 0`",
                    )),
                }
            }
            ClauseKind::Modifies | ClauseKind::Frees => {
                let FrameArgs { guard, places } = syn::parse2(args)?;
                if places.is_empty() {
                    return Err(syn::Error::new(
                        span,
                        format!("`{}` needs at least one place", kind.name()),
                    ));
                }
                let places = places
                    .into_iter()
                    .map(|expr| FramePlace { text: display_tokens(expr.to_token_stream()), expr })
                    .collect();
                let clause = FrameClause { guard, places, text };
                Ok(if kind == ClauseKind::Modifies {
                    Clause::Modifies(clause)
                } else {
                    Clause::Frees(clause)
                })
            }
        }
    }
}
