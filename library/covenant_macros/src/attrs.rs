// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recognizing the covenant attributes stacked on an item.
//!
//! Attribute macros expand outermost first, and each expansion sees the
//! attributes below it. The first covenant attribute to expand therefore
//! takes all of its siblings off the item and handles the whole stack at once.

use proc_macro2::{Span, TokenStream};
use syn::spanned::Spanned;
use syn::{Attribute, Meta};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClauseKind {
    Requires,
    Ensures,
    Modifies,
    Frees,
}

impl ClauseKind {
    pub fn name(self) -> &'static str {
        match self {
            ClauseKind::Requires => "requires",
            ClauseKind::Ensures => "ensures",
            ClauseKind::Modifies => "modifies",
            ClauseKind::Frees => "frees",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarnessAttr {
    Proof,
    ProofForContract,
    StubVerified,
}

impl HarnessAttr {
    pub fn name(self) -> &'static str {
        match self {
            HarnessAttr::Proof => "proof",
            HarnessAttr::ProofForContract => "proof_for_contract",
            HarnessAttr::StubVerified => "stub_verified",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recognized {
    Clause(ClauseKind),
    Harness(HarnessAttr),
}

/// One covenant attribute taken off an item.
pub struct Taken {
    pub what: Recognized,
    pub args: TokenStream,
    pub span: Span,
}

/// Which covenant attribute, if any, `attr` is.
///
/// Accepts `covenant::NAME`, `::covenant::NAME` and a bare `NAME` (imported
/// with `use covenant::NAME`).
pub fn recognize(attr: &Attribute) -> Option<Recognized> {
    let path = attr.path();
    let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    let name = match segments.as_slice() {
        [name] if path.leading_colon.is_none() => name.as_str(),
        [krate, name] if krate == "covenant" => name.as_str(),
        _ => return None,
    };
    let recognized = match name {
        "requires" => Recognized::Clause(ClauseKind::Requires),
        "ensures" => Recognized::Clause(ClauseKind::Ensures),
        "modifies" => Recognized::Clause(ClauseKind::Modifies),
        "frees" => Recognized::Clause(ClauseKind::Frees),
        "proof" => Recognized::Harness(HarnessAttr::Proof),
        "proof_for_contract" => Recognized::Harness(HarnessAttr::ProofForContract),
        "stub_verified" => Recognized::Harness(HarnessAttr::StubVerified),
        _ => return None,
    };
    Some(recognized)
}

/// Remove the covenant attributes from `attrs` and return them in declaration
/// order.
pub fn take(attrs: &mut Vec<Attribute>) -> syn::Result<Vec<Taken>> {
    let mut taken = Vec::new();
    let mut kept = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        let Some(what) = recognize(&attr) else {
            kept.push(attr);
            continue;
        };
        let args = match &attr.meta {
            Meta::Path(_) => TokenStream::new(),
            Meta::List(list) => list.tokens.clone(),
            Meta::NameValue(nv) => {
                return Err(syn::Error::new(nv.span(), "expected parenthesized arguments"));
            }
        };
        taken.push(Taken { what, args, span: attr.span() });
    }
    *attrs = kept;
    Ok(taken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn recognizes_qualified_and_bare_paths() {
        let attr: Attribute = parse_quote!(#[covenant::requires(x > 0)]);
        assert_eq!(recognize(&attr), Some(Recognized::Clause(ClauseKind::Requires)));
        let attr: Attribute = parse_quote!(#[::covenant::stub_verified(f)]);
        assert_eq!(recognize(&attr), Some(Recognized::Harness(HarnessAttr::StubVerified)));
        let attr: Attribute = parse_quote!(#[ensures(|r| *r)]);
        assert_eq!(recognize(&attr), Some(Recognized::Clause(ClauseKind::Ensures)));
        let attr: Attribute = parse_quote!(#[other::requires(x)]);
        assert_eq!(recognize(&attr), None);
        let attr: Attribute = parse_quote!(#[inline]);
        assert_eq!(recognize(&attr), None);
    }

    #[test]
    fn take_keeps_foreign_attributes_in_place() {
        let mut attrs: Vec<Attribute> = vec![
            parse_quote!(#[inline]),
            parse_quote!(#[covenant::ensures(|r| true)]),
            parse_quote!(#[doc = "x"]),
            parse_quote!(#[covenant::modifies(x)]),
        ];
        let taken = take(&mut attrs).unwrap();
        assert_eq!(attrs.len(), 2);
        let kinds: Vec<_> = taken.iter().map(|t| t.what).collect();
        assert_eq!(
            kinds,
            vec![
                Recognized::Clause(ClauseKind::Ensures),
                Recognized::Clause(ClauseKind::Modifies)
            ]
        );
        assert_eq!(taken[1].args.to_string(), "x");
    }
}
