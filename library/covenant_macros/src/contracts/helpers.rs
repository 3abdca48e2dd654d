// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Functions that operate on syn data structures with no logic that is
//! specific to contracts.

use proc_macro2::{Delimiter, Spacing, TokenStream, TokenTree};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use syn::visit_mut::{self, VisitMut};
use syn::{Expr, Pat};

/// If an explicit return type was provided it is returned, otherwise `()`.
pub fn return_type_to_type(return_type: &syn::ReturnType) -> Cow<'_, syn::Type> {
    match return_type {
        syn::ReturnType::Default => Cow::Owned(syn::Type::Tuple(syn::TypeTuple {
            paren_token: syn::token::Paren::default(),
            elems: Default::default(),
        })),
        syn::ReturnType::Type(_, typ) => Cow::Borrowed(typ.as_ref()),
    }
}

/// Extract all local bindings from a given pattern.
pub fn pat_to_bindings(pat: &Pat) -> Vec<String> {
    match pat {
        Pat::Ident(ident) => {
            let mut names = ident.subpat.as_ref().map_or_else(Vec::new, |(_, sub)| pat_to_bindings(sub));
            names.push(ident.ident.to_string());
            names
        }
        Pat::Tuple(tup) => tup.elems.iter().flat_map(pat_to_bindings).collect(),
        Pat::Slice(slice) => slice.elems.iter().flat_map(pat_to_bindings).collect(),
        // The same bindings must exist in every alternative.
        Pat::Or(pat_or) => pat_or.cases.first().map(pat_to_bindings).unwrap_or_default(),
        Pat::Paren(inner) => pat_to_bindings(&inner.pat),
        Pat::Reference(inner) => pat_to_bindings(&inner.pat),
        Pat::Struct(strct) => {
            strct.fields.iter().flat_map(|field_pat| pat_to_bindings(&field_pat.pat)).collect()
        }
        Pat::Type(pt) => pat_to_bindings(pt.pat.as_ref()),
        Pat::TupleStruct(tup) => tup.elems.iter().flat_map(pat_to_bindings).collect(),
        _ => vec![],
    }
}

/// Whether `tokens` contain the identifier `name`, at any depth.
pub fn mentions_ident(tokens: TokenStream, name: &str) -> bool {
    tokens.into_iter().any(|token| match token {
        TokenTree::Ident(ident) => ident == name,
        TokenTree::Group(group) => mentions_ident(group.stream(), name),
        _ => false,
    })
}

/// Replaces free occurrences of the renamed identifiers by their replacement
/// expression, and records which of them were used.
///
/// Bindings introduced inside the expression (closure parameters, `let`,
/// `match` arms, `for` and `if let`) shadow the renamed identifiers for the
/// rest of their scope.
pub struct Renamer<'a> {
    renames: &'a HashMap<String, Expr>,
    shadowed: Vec<HashSet<String>>,
    pub used: HashSet<String>,
}

impl<'a> Renamer<'a> {
    pub fn new(renames: &'a HashMap<String, Expr>) -> Self {
        Renamer { renames, shadowed: Vec::new(), used: HashSet::new() }
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.shadowed.iter().any(|scope| scope.contains(name))
    }

    fn scoped(&mut self, bindings: Vec<String>, f: impl FnOnce(&mut Self)) {
        self.shadowed.push(bindings.into_iter().collect());
        f(self);
        self.shadowed.pop();
    }
}

fn let_bindings(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::Let(expr_let) => pat_to_bindings(&expr_let.pat),
        Expr::Binary(binary) => {
            let mut names = let_bindings(&binary.left);
            names.extend(let_bindings(&binary.right));
            names
        }
        Expr::Paren(paren) => let_bindings(&paren.expr),
        _ => vec![],
    }
}

impl VisitMut for Renamer<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let Expr::Path(path) = expr {
            if path.qself.is_none() && path.path.leading_colon.is_none() {
                if let Some(ident) = path.path.get_ident() {
                    let name = ident.to_string();
                    if let Some(replacement) = self.renames.get(&name) {
                        if !self.is_shadowed(&name) {
                            self.used.insert(name);
                            *expr = replacement.clone();
                            return;
                        }
                    }
                }
            }
        }
        visit_mut::visit_expr_mut(self, expr)
    }

    fn visit_expr_closure_mut(&mut self, closure: &mut syn::ExprClosure) {
        let bindings = closure.inputs.iter().flat_map(pat_to_bindings).collect();
        self.scoped(bindings, |this| this.visit_expr_mut(&mut closure.body));
    }

    fn visit_block_mut(&mut self, block: &mut syn::Block) {
        self.shadowed.push(HashSet::new());
        for stmt in &mut block.stmts {
            self.visit_stmt_mut(stmt);
            if let syn::Stmt::Local(local) = stmt {
                let bindings = pat_to_bindings(&local.pat);
                if let Some(scope) = self.shadowed.last_mut() {
                    scope.extend(bindings);
                }
            }
        }
        self.shadowed.pop();
    }

    fn visit_local_mut(&mut self, local: &mut syn::Local) {
        // The initializer is evaluated before the new bindings exist.
        if let Some(init) = &mut local.init {
            self.visit_expr_mut(&mut init.expr);
            if let Some((_, diverge)) = &mut init.diverge {
                self.visit_expr_mut(diverge);
            }
        }
    }

    fn visit_arm_mut(&mut self, arm: &mut syn::Arm) {
        let bindings = pat_to_bindings(&arm.pat);
        self.scoped(bindings, |this| {
            if let Some((_, guard)) = &mut arm.guard {
                this.visit_expr_mut(guard);
            }
            this.visit_expr_mut(&mut arm.body);
        });
    }

    fn visit_expr_for_loop_mut(&mut self, for_loop: &mut syn::ExprForLoop) {
        self.visit_expr_mut(&mut for_loop.expr);
        let bindings = pat_to_bindings(&for_loop.pat);
        self.scoped(bindings, |this| this.visit_block_mut(&mut for_loop.body));
    }

    fn visit_expr_if_mut(&mut self, expr_if: &mut syn::ExprIf) {
        self.visit_expr_mut(&mut expr_if.cond);
        let bindings = let_bindings(&expr_if.cond);
        self.scoped(bindings, |this| this.visit_block_mut(&mut expr_if.then_branch));
        if let Some((_, else_branch)) = &mut expr_if.else_branch {
            self.visit_expr_mut(else_branch);
        }
    }

    fn visit_expr_let_mut(&mut self, expr_let: &mut syn::ExprLet) {
        self.visit_expr_mut(&mut expr_let.expr);
    }

    fn visit_expr_while_mut(&mut self, expr_while: &mut syn::ExprWhile) {
        self.visit_expr_mut(&mut expr_while.cond);
        let bindings = let_bindings(&expr_while.cond);
        self.scoped(bindings, |this| this.visit_block_mut(&mut expr_while.body));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Last {
    Start,
    Open,
    Word,
    Close,
    Unary,
    Binary,
    Joiner,
    Comma,
    Colon,
    MacroBang,
    ClosureClose,
}

/// Render tokens the way a person would write them, for clause texts shown in
/// reports.
pub fn display_tokens(tokens: TokenStream) -> String {
    let mut printer = Printer { out: String::new(), last: Last::Start, in_params: false };
    printer.stream(tokens);
    printer.out
}

struct Printer {
    out: String,
    last: Last,
    in_params: bool,
}

impl Printer {
    fn word_gap(&mut self) {
        if matches!(
            self.last,
            Last::Word | Last::Close | Last::Binary | Last::Comma | Last::Colon | Last::ClosureClose
        ) {
            self.out.push(' ');
        }
    }

    fn unary_position(&self) -> bool {
        matches!(
            self.last,
            Last::Start
                | Last::Open
                | Last::Unary
                | Last::Binary
                | Last::Comma
                | Last::Colon
                | Last::ClosureClose
        )
    }

    fn stream(&mut self, tokens: TokenStream) {
        let mut iter = tokens.into_iter().peekable();
        while let Some(token) = iter.next() {
            match token {
                TokenTree::Ident(ident) => {
                    self.word_gap();
                    self.out.push_str(&ident.to_string());
                    self.last = Last::Word;
                }
                TokenTree::Literal(lit) => {
                    self.word_gap();
                    self.out.push_str(&lit.to_string());
                    self.last = Last::Word;
                }
                TokenTree::Group(group) => {
                    let (open, close) = match group.delimiter() {
                        Delimiter::Parenthesis => ("(", ")"),
                        Delimiter::Bracket => ("[", "]"),
                        Delimiter::Brace => ("{ ", " }"),
                        Delimiter::None => ("", ""),
                    };
                    let call_or_index = matches!(
                        group.delimiter(),
                        Delimiter::Parenthesis | Delimiter::Bracket
                    ) && matches!(self.last, Last::Word | Last::Close | Last::MacroBang);
                    if !call_or_index {
                        self.word_gap();
                    }
                    self.out.push_str(open);
                    self.last = Last::Open;
                    self.stream(group.stream());
                    self.out.push_str(close);
                    self.last = Last::Close;
                }
                TokenTree::Punct(punct) => {
                    let mut op = punct.as_char().to_string();
                    let mut spacing = punct.spacing();
                    while spacing == Spacing::Joint {
                        match iter.peek() {
                            Some(TokenTree::Punct(next)) => {
                                op.push(next.as_char());
                                spacing = next.spacing();
                                iter.next();
                            }
                            _ => break,
                        }
                    }
                    self.punct(&op);
                }
            }
        }
    }

    fn punct(&mut self, op: &str) {
        match op {
            "." | "::" | ".." | "..=" | "'" => {
                self.out.push_str(op);
                self.last = Last::Joiner;
            }
            "," | ";" => {
                self.out.push_str(op);
                self.last = Last::Comma;
            }
            ":" => {
                self.out.push(':');
                self.last = Last::Colon;
            }
            "!" if self.last == Last::Word => {
                self.out.push('!');
                self.last = Last::MacroBang;
            }
            "|" | "||" if self.in_params => {
                self.out.push_str(op);
                self.in_params = false;
                self.last = Last::ClosureClose;
            }
            "||" if self.unary_position() => {
                self.word_gap();
                self.out.push_str(op);
                self.last = Last::ClosureClose;
            }
            "|" if self.unary_position() => {
                self.word_gap();
                self.out.push('|');
                self.in_params = true;
                self.last = Last::Open;
            }
            "&" | "*" | "-" | "!" | "&&" if self.unary_position() => {
                self.word_gap();
                self.out.push_str(op);
                self.last = Last::Unary;
            }
            _ => {
                if !matches!(self.last, Last::Start | Last::Open) {
                    self.out.push(' ');
                }
                self.out.push_str(op);
                self.last = Last::Binary;
            }
        }
    }
}
