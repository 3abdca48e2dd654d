// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Implementation of the function contract attributes.
//!
//! # Interface
//!
//! A contract is a stack of `requires`, `ensures`, `modifies` and `frees`
//! attributes on a free function or a method. The first of them to expand
//! takes the others off the function and folds all clauses, in the order they
//! were written, into one [`ContractPlan`]. The plan is then emitted as a new
//! body for the function that keeps its signature:
//!
//! ```ignore
//! fn divide(dividend: u32, divisor: u32) -> u32 {
//!     static __COVENANT_CONTRACT: ContractDef = ContractDef { .. };
//!     let __covenant_contract = Contract::new(&__COVENANT_CONTRACT, "");
//!     match __covenant_contract.mode() {
//!         Mode::Real => { dividend / divisor }
//!         Mode::Check => { /* assume pre, run body, assert post */ }
//!         Mode::Replace => { /* assert pre, havoc, draw result until post holds */ }
//!     }
//! }
//! ```
//!
//! The mode is chosen at run time by the harness being explored, so the same
//! compiled function serves as implementation, check variant and replacement.
//!
//! # Parameters in clauses
//!
//! Postconditions are evaluated after the body, which may have consumed its
//! parameters. They therefore read copies taken before the body runs:
//! reference and raw pointer parameters are copied bitwise, parameters taken by
//! value are cloned. History expressions (`old(..)`) are cloned too.

mod check;
mod clause;
pub(crate) mod helpers;
mod history;
mod purity;
mod replace;

use crate::attrs::{self, ClauseKind, Recognized};
use clause::{Clause, FrameClause};
use helpers::{Renamer, mentions_ident, return_type_to_type};
use history::{History, combine};
pub(crate) use history::combine as combine_errors;
use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, format_ident, quote};
use std::collections::{BTreeSet, HashMap};
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::{Expr, FnArg, ItemFn, Pat, Type, parse_quote};

/// How a function receives a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Value,
    Shared,
    Unique,
    RawConst,
    RawMut,
}

impl Access {
    fn of(ty: &Type) -> Access {
        match ty {
            Type::Reference(reference) if reference.mutability.is_some() => Access::Unique,
            Type::Reference(_) => Access::Shared,
            Type::Ptr(ptr) if ptr.mutability.is_some() => Access::RawMut,
            Type::Ptr(_) => Access::RawConst,
            Type::Paren(inner) => Access::of(&inner.elem),
            Type::Group(inner) => Access::of(&inner.elem),
            _ => Access::Value,
        }
    }
}

pub struct Param {
    pub ident: syn::Ident,
    pub access: Access,
}

impl Param {
    fn copy_ident(&self) -> syn::Ident {
        format_ident!("__covenant_arg_{}", self.ident)
    }

    /// What a postcondition reads instead of the parameter.
    fn copy_expr(&self) -> Expr {
        let copy = self.copy_ident();
        match self.access {
            Access::Value => parse_quote!((#copy)),
            _ => parse_quote!((*#copy)),
        }
    }

    /// The statement taking the copy.
    fn copy_binding(&self) -> TokenStream {
        let copy = self.copy_ident();
        let ident = &self.ident;
        match self.access {
            Access::Value => quote!(let #copy = ::covenant::internal::capture(&#ident);),
            _ => quote!(let #copy = unsafe { ::covenant::internal::untracked_deref(&#ident) };),
        }
    }
}

/// The signature facts the generated code depends on.
pub struct ContractFn {
    pub name: String,
    pub params: Vec<Param>,
    pub output: Type,
    /// Whether the function is named after `Self` rather than its module.
    pub is_method: bool,
}

/// Finds types no replacement can produce.
#[derive(Default)]
struct UnsupportedReturn(Option<(Span, &'static str)>);

impl<'ast> Visit<'ast> for UnsupportedReturn {
    fn visit_type_reference(&mut self, node: &'ast syn::TypeReference) {
        self.0.get_or_insert((node.span(), "a reference"));
    }
    fn visit_type_ptr(&mut self, node: &'ast syn::TypePtr) {
        self.0.get_or_insert((node.span(), "a raw pointer"));
    }
    fn visit_type_impl_trait(&mut self, node: &'ast syn::TypeImplTrait) {
        self.0.get_or_insert((node.span(), "`impl Trait`"));
    }
    fn visit_type_never(&mut self, node: &'ast syn::TypeNever) {
        self.0.get_or_insert((node.span(), "`!`"));
    }
}

/// Finds mutable references and pointers a by-value parameter carries.
/// Function signatures inside the type only describe callees.
#[derive(Default)]
struct NestedMutable(Option<Span>);

impl<'ast> Visit<'ast> for NestedMutable {
    fn visit_type_reference(&mut self, node: &'ast syn::TypeReference) {
        if node.mutability.is_some() {
            self.0.get_or_insert(node.span());
        }
        syn::visit::visit_type_reference(self, node);
    }
    fn visit_type_ptr(&mut self, node: &'ast syn::TypePtr) {
        if node.mutability.is_some() {
            self.0.get_or_insert(node.span());
        }
        syn::visit::visit_type_ptr(self, node);
    }
    fn visit_type_bare_fn(&mut self, _: &'ast syn::TypeBareFn) {}
    fn visit_parenthesized_generic_arguments(&mut self, _: &'ast syn::ParenthesizedGenericArguments) {}
}

impl ContractFn {
    pub fn analyze(item: &ItemFn) -> syn::Result<ContractFn> {
        let sig = &item.sig;
        let mut errors = Vec::new();
        if let Some(asyncness) = &sig.asyncness {
            errors.push(syn::Error::new(asyncness.span(), "contracts on `async` functions are not supported"));
        }
        if let Some(constness) = &sig.constness {
            errors.push(syn::Error::new(constness.span(), "contracts on `const` functions are not supported"));
        }
        if let Some(variadic) = &sig.variadic {
            errors.push(syn::Error::new(variadic.span(), "contracts on variadic functions are not supported"));
        }

        let mut params = Vec::new();
        for input in &sig.inputs {
            match input {
                FnArg::Receiver(receiver) => params.push(Param {
                    ident: syn::Ident::from(receiver.self_token),
                    access: Access::of(&receiver.ty),
                }),
                FnArg::Typed(typed) => {
                    if let Type::ImplTrait(_) = typed.ty.as_ref() {
                        errors.push(syn::Error::new(
                            typed.ty.span(),
                            "contracts do not support `impl Trait` parameters, use a type parameter",
                        ));
                    }
                    let access = Access::of(&typed.ty);
                    if access == Access::Value {
                        let mut nested = NestedMutable::default();
                        nested.visit_type(&typed.ty);
                        if let Some(span) = nested.0 {
                            errors.push(syn::Error::new(
                                span,
                                "contracts cannot see writes through a mutable reference inside a by-value \
                                 parameter, pass the reference itself",
                            ));
                        }
                    }
                    match typed.pat.as_ref() {
                        Pat::Ident(pat) if pat.subpat.is_none() && pat.by_ref.is_none() => {
                            params.push(Param { ident: pat.ident.clone(), access })
                        }
                        other => errors.push(syn::Error::new(
                            other.span(),
                            "parameters of functions with contracts must be plain identifiers",
                        )),
                    }
                }
            }
        }

        let output = return_type_to_type(&sig.output).into_owned();
        let mut unsupported = UnsupportedReturn::default();
        unsupported.visit_type(&output);
        if let Some((span, what)) = unsupported.0 {
            errors.push(syn::Error::new(
                span,
                format!("functions with contracts cannot return {what}: no replacement can produce it"),
            ));
        }
        combine(errors)?;

        let has_receiver = sig.receiver().is_some();
        let is_method = has_receiver
            || mentions_ident(sig.to_token_stream(), "Self")
            || mentions_ident(item.block.to_token_stream(), "Self");
        Ok(ContractFn { name: sig.ident.to_string(), params, output, is_method })
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.ident == name)
    }

    fn unique_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.access == Access::Unique)
    }

    fn raw_mut_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.access == Access::RawMut)
    }

    fn raw_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| matches!(p.access, Access::RawConst | Access::RawMut))
    }

    fn renames(&self) -> HashMap<String, Expr> {
        self.params.iter().map(|p| (p.ident.to_string(), p.copy_expr())).collect()
    }
}

pub struct Precondition {
    pub expr: Expr,
    pub text: String,
}

pub struct Postcondition {
    /// The closure with history lifted and parameters replaced by copies.
    pub closure: Expr,
    pub text: String,
}

/// Everything the clauses of one function say, in declaration order.
pub struct ContractPlan<'a> {
    function: &'a ContractFn,
    requires: Vec<Precondition>,
    ensures: Vec<Postcondition>,
    history: History,
    modifies: Vec<FrameClause>,
    frees: Vec<FrameClause>,
    /// Parameters the postconditions read.
    read_by_post: BTreeSet<String>,
}

impl<'a> ContractPlan<'a> {
    pub fn new(function: &'a ContractFn) -> Self {
        ContractPlan {
            function,
            requires: Vec::new(),
            ensures: Vec::new(),
            history: History::default(),
            modifies: Vec::new(),
            frees: Vec::new(),
            read_by_post: BTreeSet::new(),
        }
    }

    /// Fold one more clause into the plan.
    pub fn with(mut self, clause: Clause) -> syn::Result<Self> {
        match clause {
            Clause::Requires { expr, text } => {
                purity::check(&expr, "requires")?;
                self.requires.push(Precondition { expr, text });
            }
            Clause::Ensures { mut closure, text } => {
                purity::check(&closure, "ensures")?;
                self.history.lift(self.function, &mut closure)?;
                let renames = self.function.renames();
                let mut renamer = Renamer::new(&renames);
                syn::visit_mut::VisitMut::visit_expr_mut(&mut renamer, &mut closure);
                self.read_by_post.extend(renamer.used);
                self.ensures.push(Postcondition { closure, text });
            }
            Clause::Modifies(clause) => {
                if let Some(guard) = &clause.guard {
                    purity::check(guard, "modifies")?;
                }
                for place in &clause.places {
                    purity::check_place(&place.expr)?;
                }
                self.modifies.push(clause);
            }
            Clause::Frees(clause) => {
                if let Some(guard) = &clause.guard {
                    purity::check(guard, "frees")?;
                }
                for place in &clause.places {
                    purity::check(&place.expr, "frees")?;
                }
                self.frees.push(clause);
            }
        }
        Ok(self)
    }

    fn has_frame(&self) -> bool {
        !self.modifies.is_empty() || !self.frees.is_empty()
    }

    /// Parameters copied before the body: those read by postconditions, and
    /// every `&mut` parameter when the frame is checked.
    fn copied_params(&self) -> impl Iterator<Item = &Param> {
        let frame = self.has_frame();
        self.function.params.iter().filter(move |p| {
            self.read_by_post.contains(&p.ident.to_string()) || (frame && p.access == Access::Unique)
        })
    }

    fn copies(&self) -> TokenStream {
        let copies = self.copied_params().map(Param::copy_binding);
        quote!(#(#copies)*)
    }

    fn contract_def(&self) -> TokenStream {
        let name = &self.function.name;
        let requires = self.requires.iter().map(|r| &r.text);
        let ensures = self.ensures.iter().map(|e| &e.text);
        let modifies = self.modifies.iter().map(|m| &m.text);
        let frees = self.frees.iter().map(|f| &f.text);
        quote! {
            static __COVENANT_CONTRACT: ::covenant::internal::ContractDef = ::covenant::internal::ContractDef {
                name: #name,
                module: ::core::module_path!(),
                file: ::core::file!(),
                line: ::core::line!(),
                requires: &[#(#requires),*],
                ensures: &[#(#ensures),*],
                modifies: &[#(#modifies),*],
                frees: &[#(#frees),*],
            };
        }
    }

    /// Turn a place of a `modifies` clause into an expression producing a
    /// `Place`. Slice projections get their bounds checked.
    fn place(&self, expr: &Expr, label: &str) -> TokenStream {
        if let Expr::Reference(reference) = expr {
            if reference.mutability.is_some() {
                if let Expr::Index(index) = reference.expr.as_ref() {
                    if let Expr::Range(range) = index.index.as_ref() {
                        let base = &index.expr;
                        let lo = range.start.as_ref().map_or_else(|| quote!(0), |lo| quote!(#lo));
                        let hi = match (&range.end, &range.limits) {
                            (None, _) => quote!(::core::option::Option::None),
                            (Some(hi), syn::RangeLimits::HalfOpen(_)) => {
                                quote!(::core::option::Option::Some(#hi))
                            }
                            (Some(hi), syn::RangeLimits::Closed(_)) => {
                                quote!(::core::option::Option::Some((#hi) + 1))
                            }
                        };
                        return quote! {
                            __covenant_contract.slice_place(&(&mut #base[..]), #lo, #hi, #label)
                        };
                    }
                }
            }
        }
        quote!(::covenant::internal::Pointer::place(&(#expr), #label))
    }

    fn guarded(guard: &Option<Expr>, statements: TokenStream) -> TokenStream {
        match guard {
            Some(guard) => quote!(if #guard { #statements }),
            None => statements,
        }
    }

    pub fn emit(&self, item: ItemFn) -> TokenStream {
        let ItemFn { attrs, vis, mut sig, block } = item;
        self.require_arbitrary_result(&mut sig);
        let contract_def = self.contract_def();
        let owner = if self.function.is_method {
            quote!(::core::any::type_name::<Self>())
        } else {
            quote!("")
        };
        let check = self.check_arm(&block);
        let replace = self.replace_arm();
        quote! {
            #(#attrs)*
            #vis #sig {
                #contract_def
                let __covenant_contract = ::covenant::internal::Contract::new(&__COVENANT_CONTRACT, #owner);
                match __covenant_contract.mode() {
                    ::covenant::internal::Mode::Real => #block
                    ::covenant::internal::Mode::Check => #check
                    ::covenant::internal::Mode::Replace => #replace
                }
            }
        }
    }

    /// Replacements draw the result with `covenant::any()`. When the result
    /// type mentions a type parameter of the function, require it to be
    /// `Arbitrary` in the signature.
    fn require_arbitrary_result(&self, sig: &mut syn::Signature) {
        let output = &self.function.output;
        let generic = sig.generics.type_params().any(|param| {
            mentions_ident(output.to_token_stream(), &param.ident.to_string())
        });
        if generic {
            sig.generics.make_where_clause().predicates.push(parse_quote!(#output: ::covenant::Arbitrary));
        }
    }
}

/// Expand the contract attribute `kind(args)` and its siblings on `item`.
pub fn expand(kind: ClauseKind, args: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let mut item: ItemFn = syn::parse2(item)?;
    let mut sources = vec![(kind, args, Span::call_site())];
    let mut errors = Vec::new();
    for taken in attrs::take(&mut item.attrs)? {
        match taken.what {
            Recognized::Clause(kind) => sources.push((kind, taken.args, taken.span)),
            Recognized::Harness(harness) => errors.push(syn::Error::new(
                taken.span,
                format!("contract clauses cannot be attached to a harness (`{}`)", harness.name()),
            )),
        }
    }
    combine(errors)?;

    let function = ContractFn::analyze(&item)?;
    let mut clauses = Vec::new();
    let mut errors = Vec::new();
    for (kind, args, span) in sources {
        match Clause::parse(kind, args, span) {
            Ok(clause) => clauses.push(clause),
            Err(error) => errors.push(error),
        }
    }
    combine(errors)?;
    let plan = clauses.into_iter().try_fold(ContractPlan::new(&function), ContractPlan::with)?;
    Ok(plan.emit(item))
}
