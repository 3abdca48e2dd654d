// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rejecting clauses that could change the state they describe.
//!
//! A clause is evaluated in both variants of a function, so it must not write
//! memory, allocate, perform I/O or run unsafe code. This is a syntactic
//! approximation: calls to user functions are trusted.

use super::history::combine;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{BinOp, Expr};

/// Methods of the standard collections and cells that mutate their receiver.
const MUTATING_METHODS: &[&str] = &[
    "push", "push_back", "push_front", "push_str", "pop", "pop_back", "pop_front", "insert",
    "remove", "clear", "truncate", "drain", "retain", "append", "extend", "sort", "sort_by",
    "sort_unstable", "dedup", "reverse", "swap", "fill", "resize", "set", "replace", "take",
    "get_mut", "iter_mut", "as_mut", "borrow_mut", "write", "store", "fetch_add", "fetch_sub",
];

const IO_MACROS: &[&str] =
    &["print", "println", "eprint", "eprintln", "write", "writeln", "dbg", "panic", "todo"];

const ALLOCATING_MACROS: &[&str] = &["vec", "format"];

const ALLOCATING_TYPES: &[&str] =
    &["Box", "Vec", "String", "Rc", "Arc", "HashMap", "HashSet", "BTreeMap", "BTreeSet", "VecDeque"];

const DROPPING_FUNCTIONS: &[&str] = &["drop", "forget", "replace", "take", "swap"];

/// Check that `expr`, written as part of a `what` clause, has no side effects.
pub fn check(expr: &Expr, what: &str) -> syn::Result<()> {
    let mut purity = Purity { what, errors: Vec::new(), in_history: 0 };
    purity.visit_expr(expr);
    combine(purity.errors)
}

/// Check a place of a `modifies` clause: the outermost `&mut` is allowed.
pub fn check_place(expr: &Expr) -> syn::Result<()> {
    match expr {
        Expr::Reference(reference) if reference.mutability.is_some() => {
            check(&reference.expr, "modifies")
        }
        Expr::RawAddr(raw) => check(&raw.expr, "modifies"),
        Expr::Paren(paren) => check_place(&paren.expr),
        other => check(other, "modifies"),
    }
}

struct Purity<'a> {
    what: &'a str,
    errors: Vec<syn::Error>,
    /// Depth of `old(..)` calls: history captures may allocate.
    in_history: usize,
}

impl Purity<'_> {
    fn deny(&mut self, node: &impl Spanned, effect: &str) {
        let message = format!("side effect in `{}` clause: {effect}", self.what);
        self.errors.push(syn::Error::new(node.span(), message));
    }
}

fn is_compound_assign(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

fn last_segments(path: &syn::Path) -> (Option<String>, String) {
    let mut segments = path.segments.iter().rev().map(|s| s.ident.to_string());
    let last = segments.next().unwrap_or_default();
    (segments.next(), last)
}

impl<'ast> Visit<'ast> for Purity<'_> {
    fn visit_expr_assign(&mut self, node: &'ast syn::ExprAssign) {
        self.deny(node, "assignment");
        visit::visit_expr_assign(self, node)
    }

    fn visit_expr_binary(&mut self, node: &'ast syn::ExprBinary) {
        if is_compound_assign(&node.op) {
            self.deny(node, "compound assignment");
        }
        visit::visit_expr_binary(self, node)
    }

    fn visit_expr_reference(&mut self, node: &'ast syn::ExprReference) {
        if node.mutability.is_some() {
            self.deny(node, "mutable borrow");
        }
        visit::visit_expr_reference(self, node)
    }

    fn visit_expr_raw_addr(&mut self, node: &'ast syn::ExprRawAddr) {
        if matches!(node.mutability, syn::PointerMutability::Mut(_)) {
            self.deny(node, "mutable raw borrow");
        }
        visit::visit_expr_raw_addr(self, node)
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        let method = node.method.to_string();
        if MUTATING_METHODS.contains(&method.as_str()) {
            self.deny(&node.method, &format!("call to mutating method `{method}`"));
        }
        visit::visit_expr_method_call(self, node)
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Expr::Path(func) = node.func.as_ref() {
            let (owner, name) = last_segments(&func.path);
            if name == "old" && owner.is_none() {
                self.in_history += 1;
                visit::visit_expr_call(self, node);
                self.in_history -= 1;
                return;
            }
            let is_mem = owner.as_deref() == Some("mem") || (owner.is_none() && name == "drop");
            if is_mem && DROPPING_FUNCTIONS.contains(&name.as_str()) {
                self.deny(node, &format!("call to `{name}`"));
            }
            let allocates = owner.as_deref().is_some_and(|owner| ALLOCATING_TYPES.contains(&owner));
            if allocates && self.in_history == 0 {
                self.deny(node, &format!("allocation through `{}::{name}`", owner.unwrap_or_default()));
            }
        }
        visit::visit_expr_call(self, node)
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        let (_, name) = last_segments(&node.path);
        if IO_MACROS.contains(&name.as_str()) {
            self.deny(node, &format!("`{name}!`"));
        } else if ALLOCATING_MACROS.contains(&name.as_str()) && self.in_history == 0 {
            self.deny(node, &format!("allocation through `{name}!`"));
        }
        visit::visit_macro(self, node)
    }

    fn visit_expr_unsafe(&mut self, node: &'ast syn::ExprUnsafe) {
        self.deny(node, "unsafe block");
        visit::visit_expr_unsafe(self, node)
    }
}
