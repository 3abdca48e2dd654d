// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Index the items of a crate that matter to contracts by parsing its sources.
//!
//! The index is syntactic: calls and paths are recorded as written and
//! resolved later by name, which over-approximates what a function may reach.

use covenant_metadata::{HarnessAttributes, HarnessKind, HarnessMetadata, SourceLocation};
use proc_macro2::Span;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{
    Attribute, Block, Expr, ExprCall, ExprMethodCall, ExprPath, ImplItem, Item, Macro, MacroDelimiter, Meta,
    MetaList, StaticMutability, Token, Type,
};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse `{}` at {}:{}", file.display(), line, column)]
    Parse {
        file: PathBuf,
        line: usize,
        column: usize,
        #[source]
        source: syn::Error,
    },
    #[error("no Rust sources under `{}`", .0.display())]
    NoSources(PathBuf),
}

/// Types whose statics can be written through a shared reference.
const INTERIOR_MUTABLE: &[&str] = &[
    "AtomicBool",
    "AtomicI8",
    "AtomicI16",
    "AtomicI32",
    "AtomicI64",
    "AtomicIsize",
    "AtomicU8",
    "AtomicU16",
    "AtomicU32",
    "AtomicU64",
    "AtomicUsize",
    "AtomicPtr",
    "Mutex",
    "RwLock",
    "Cell",
    "RefCell",
    "UnsafeCell",
];

/// Contract clauses as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clauses {
    pub requires: Vec<String>,
    pub ensures: Vec<String>,
    pub modifies: Vec<String>,
    pub frees: Vec<String>,
    /// Identifiers mentioned by the `modifies` clauses.
    pub modified_names: Vec<String>,
}

impl Clauses {
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty() && self.ensures.is_empty() && self.modifies.is_empty() && self.frees.is_empty()
    }
}

/// A call as written in a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `a::b(..)`, by segment.
    Path(Vec<String>),
    /// `x.m(..)`, by method name.
    Method(String),
}

#[derive(Debug, Clone)]
pub struct FnItem {
    /// `crate_name::module::[Type::]name`.
    pub path: String,
    pub name: String,
    pub module: Vec<String>,
    /// The type of the enclosing `impl`, without generics.
    pub self_ty: Option<String>,
    pub location: SourceLocation,
    pub clauses: Clauses,
    pub calls: Vec<Call>,
    /// Every path expression, as potential references to statics.
    pub paths: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct StaticItem {
    pub path: String,
    pub name: String,
    pub module: Vec<String>,
    /// `static mut`, or a static of an interior-mutable type.
    pub mutable: bool,
    pub location: SourceLocation,
}

/// Everything found in the sources of one crate.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    pub crate_name: String,
    pub functions: Vec<FnItem>,
    pub statics: Vec<StaticItem>,
    pub harnesses: Vec<HarnessMetadata>,
}

impl SourceIndex {
    /// Index every `.rs` file under `root`, or `root` itself if it is a file.
    pub fn from_path(root: &Path, crate_name: &str) -> Result<SourceIndex, AnalysisError> {
        let mut index = SourceIndex { crate_name: crate_name.to_string(), ..Default::default() };
        index.add_root(root, crate_name)?;
        Ok(index)
    }

    /// Add the sources under `root` as items of `crate_name`. An integration
    /// test is its own crate, so one index may span several crate names.
    pub fn add_root(&mut self, root: &Path, crate_name: &str) -> Result<(), AnalysisError> {
        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        if files.is_empty() {
            return Err(AnalysisError::NoSources(root.to_path_buf()));
        }
        files.sort();
        let outer = mem::replace(&mut self.crate_name, crate_name.to_string());
        let indexed = self.add_files(root, &files);
        self.crate_name = outer;
        indexed?;
        debug!(
            root = %root.display(),
            crate_name,
            functions = self.functions.len(),
            statics = self.statics.len(),
            harnesses = self.harnesses.len(),
            "indexed sources"
        );
        Ok(())
    }

    fn add_files(&mut self, root: &Path, files: &[PathBuf]) -> Result<(), AnalysisError> {
        for file in files {
            let source =
                fs::read_to_string(file).map_err(|source| AnalysisError::Io { path: file.clone(), source })?;
            let module = if root.is_file() { Vec::new() } else { module_of(root, file) };
            self.add_source(file, module, &source)?;
        }
        Ok(())
    }

    /// Index the items of one file, declared in `module`.
    pub fn add_source(&mut self, file: &Path, module: Vec<String>, source: &str) -> Result<(), AnalysisError> {
        let parsed = syn::parse_file(source).map_err(|source| {
            let start = source.span().start();
            AnalysisError::Parse { file: file.to_path_buf(), line: start.line, column: start.column + 1, source }
        })?;
        let file = file.display().to_string();
        self.add_items(&file, &module, &parsed.items);
        Ok(())
    }

    pub fn contracted(&self) -> impl Iterator<Item = &FnItem> {
        self.functions.iter().filter(|f| !f.clauses.is_empty())
    }

    fn qualify(&self, module: &[String], rest: &[&str]) -> String {
        let mut segments = vec![self.crate_name.as_str()];
        segments.extend(module.iter().map(String::as_str));
        segments.extend(rest);
        segments.join("::")
    }

    fn add_items(&mut self, file: &str, module: &[String], items: &[Item]) {
        for item in items {
            match item {
                Item::Fn(item_fn) => {
                    self.add_fn(file, module, None, &item_fn.attrs, &item_fn.sig.ident, &item_fn.block)
                }
                Item::Impl(item_impl) => {
                    let self_ty = type_name(&item_impl.self_ty);
                    for impl_item in &item_impl.items {
                        if let ImplItem::Fn(method) = impl_item {
                            self.add_fn(
                                file,
                                module,
                                self_ty.clone(),
                                &method.attrs,
                                &method.sig.ident,
                                &method.block,
                            );
                        }
                    }
                }
                Item::Mod(item_mod) => {
                    if let Some((_, content)) = &item_mod.content {
                        let mut inner = module.to_vec();
                        inner.push(item_mod.ident.to_string());
                        self.add_items(file, &inner, content);
                    }
                }
                Item::Static(item_static) => {
                    let name = item_static.ident.to_string();
                    let mutable = matches!(item_static.mutability, StaticMutability::Mut(_))
                        || type_name(&item_static.ty).is_some_and(|ty| INTERIOR_MUTABLE.contains(&ty.as_str()));
                    self.statics.push(StaticItem {
                        path: self.qualify(module, &[&name]),
                        name,
                        module: module.to_vec(),
                        mutable,
                        location: location(file, item_static.ident.span()),
                    });
                }
                _ => {}
            }
        }
    }

    fn add_fn(
        &mut self,
        file: &str,
        module: &[String],
        self_ty: Option<String>,
        attrs: &[Attribute],
        ident: &syn::Ident,
        block: &Block,
    ) {
        let name = ident.to_string();
        let path = match &self_ty {
            Some(ty) => self.qualify(module, &[ty, &name]),
            None => self.qualify(module, &[&name]),
        };
        let location = location(file, ident.span());
        let mut clauses = Clauses::default();
        let mut harness: Option<HarnessKind> = None;
        let mut stubs = Vec::new();
        for attr in attrs {
            let Some(kind) = covenant_attribute(attr) else { continue };
            let text = match &attr.meta {
                Meta::List(list) => delimited_text(list),
                _ => String::new(),
            };
            match kind {
                "requires" => clauses.requires.push(text),
                "ensures" => clauses.ensures.push(text),
                "modifies" => {
                    if let Meta::List(list) = &attr.meta {
                        clauses.modified_names.extend(idents(list.tokens.clone()));
                    }
                    clauses.modifies.push(text);
                }
                "frees" => clauses.frees.push(text),
                "proof" => harness = Some(HarnessKind::Proof),
                "proof_for_contract" => harness = Some(HarnessKind::ProofForContract { target_fn: text }),
                "stub_verified" => stubs.push(text),
                _ => {}
            }
        }
        if let Some(kind) = harness {
            self.harnesses.push(HarnessMetadata {
                pretty_name: path.clone(),
                original_file: location.file.clone(),
                original_line: location.line,
                attributes: HarnessAttributes { kind, verified_stubs: stubs },
            });
        }
        let mut body = BodyVisitor::default();
        body.visit_block(block);
        trace!(function = %path, calls = body.calls.len(), "indexed function");
        self.functions.push(FnItem {
            path,
            name,
            module: module.to_vec(),
            self_ty,
            location,
            clauses,
            calls: body.calls,
            paths: body.paths,
        });
    }
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<(), AnalysisError> {
    let io = |source| AnalysisError::Io { path: path.to_path_buf(), source };
    if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path.to_path_buf());
        }
        return Ok(());
    }
    for entry in fs::read_dir(path).map_err(io)? {
        let entry = entry.map_err(io)?;
        collect_files(&entry.path(), files)?;
    }
    Ok(())
}

/// The module a file under `root` declares: `a/b.rs` and `a/b/mod.rs` are `a::b`.
fn module_of(root: &Path, file: &Path) -> Vec<String> {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");
    let mut module: Vec<String> =
        relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    if module.len() == 1 && matches!(module[0].as_str(), "lib" | "main") {
        module.clear();
    } else if module.last().is_some_and(|last| last == "mod") {
        module.pop();
    }
    module
}

/// The name of a covenant attribute, for `#[covenant::x]` or a bare `#[x]`.
fn covenant_attribute(attr: &Attribute) -> Option<&'static str> {
    const NAMES: &[&str] =
        &["requires", "ensures", "modifies", "frees", "proof", "proof_for_contract", "stub_verified"];
    let segments: Vec<String> = attr.path().segments.iter().map(|s| s.ident.to_string()).collect();
    let name = match segments.as_slice() {
        [name] => name,
        [krate, name] if krate == "covenant" => name,
        _ => return None,
    };
    NAMES.iter().copied().find(|known| *known == name.as_str())
}

/// The clause between the delimiters, as it appears in the source.
fn delimited_text(list: &MetaList) -> String {
    let span = match &list.delimiter {
        MacroDelimiter::Paren(paren) => paren.span.join(),
        MacroDelimiter::Brace(brace) => brace.span.join(),
        MacroDelimiter::Bracket(bracket) => bracket.span.join(),
    };
    span.source_text()
        .and_then(|text| text.get(1..text.len().saturating_sub(1)).map(|inner| inner.trim().to_string()))
        .unwrap_or_else(|| list.tokens.to_string())
}

fn idents(tokens: proc_macro2::TokenStream) -> Vec<String> {
    let mut found = Vec::new();
    for token in tokens {
        match token {
            proc_macro2::TokenTree::Ident(ident) => found.push(ident.to_string()),
            proc_macro2::TokenTree::Group(group) => found.extend(idents(group.stream())),
            _ => {}
        }
    }
    found
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|segment| segment.ident.to_string()),
        Type::Reference(reference) => type_name(&reference.elem),
        Type::Paren(paren) => type_name(&paren.elem),
        Type::Group(group) => type_name(&group.elem),
        _ => None,
    }
}

fn location(file: &str, span: Span) -> SourceLocation {
    let start = span.start();
    SourceLocation { file: file.to_string(), line: start.line as u32, column: start.column as u32 + 1 }
}

fn segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|segment| segment.ident.to_string()).collect()
}

#[derive(Default)]
struct BodyVisitor {
    calls: Vec<Call>,
    paths: Vec<Vec<String>>,
}

impl<'ast> Visit<'ast> for BodyVisitor {
    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        if let Expr::Path(path) = &*call.func {
            self.calls.push(Call::Path(segments(&path.path)));
        }
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        self.calls.push(Call::Method(call.method.to_string()));
        visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_path(&mut self, path: &'ast ExprPath) {
        self.paths.push(segments(&path.path));
        visit::visit_expr_path(self, path);
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        // Arguments of expression-like macros such as `println!` or `assert!`.
        if let Ok(args) = mac.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
            let mut inner = BodyVisitor::default();
            for arg in &args {
                inner.visit_expr(arg);
            }
            self.calls.extend(inner.calls);
            self.paths.extend(inner.paths);
        }
        visit::visit_macro(self, mac);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(source: &str) -> SourceIndex {
        let mut index = SourceIndex { crate_name: "demo".to_string(), ..Default::default() };
        index.add_source(Path::new("lib.rs"), Vec::new(), source).unwrap();
        index
    }

    #[test]
    fn contracts_and_harnesses_are_indexed() {
        let index = index(
            r#"
            struct Stack { items: Vec<u8> }
            impl Stack {
                #[covenant::modifies(&mut self.items)]
                #[covenant::ensures(|r: &Option<u8>| r.is_some() == (old(self.items.len()) > 0))]
                fn pop(&mut self) -> Option<u8> { self.items.pop() }
            }
            #[covenant::proof_for_contract(Stack::pop)]
            #[covenant::stub_verified(helpers::len)]
            fn check_pop() { let mut s: Stack = covenant::any(); s.pop(); }
            "#,
        );
        let pop = index.contracted().next().unwrap();
        assert_eq!(pop.path, "demo::Stack::pop");
        assert_eq!(pop.clauses.modifies, vec!["&mut self.items"]);
        assert_eq!(pop.clauses.ensures, vec!["|r: &Option<u8>| r.is_some() == (old(self.items.len()) > 0)"]);
        assert!(pop.clauses.modified_names.contains(&"items".to_string()));
        let harness = &index.harnesses[0];
        assert_eq!(harness.pretty_name, "demo::check_pop");
        assert_eq!(harness.check_target(), Some("Stack::pop"));
        assert_eq!(harness.verified_stubs(), ["helpers::len".to_string()]);
    }

    #[test]
    fn statics_calls_and_modules() {
        let index = index(
            r#"
            static mut COUNTER: u32 = 0;
            static LIMIT: u32 = 10;
            mod inner {
                use std::sync::atomic::AtomicU64;
                pub static HITS: AtomicU64 = AtomicU64::new(0);
                pub fn touch() { println!("{}", super::LIMIT); helper(1).max(2); }
                fn helper(x: u32) -> u32 { x }
            }
            "#,
        );
        let mutable: Vec<_> = index.statics.iter().filter(|s| s.mutable).map(|s| s.path.as_str()).collect();
        assert_eq!(mutable, vec!["demo::COUNTER", "demo::inner::HITS"]);
        let touch = index.functions.iter().find(|f| f.name == "touch").unwrap();
        assert_eq!(touch.module, vec!["inner"]);
        assert!(touch.calls.contains(&Call::Path(vec!["helper".to_string()])));
        assert!(touch.calls.contains(&Call::Method("max".to_string())));
        // Paths inside macro arguments are seen.
        assert!(touch.paths.contains(&vec!["super".to_string(), "LIMIT".to_string()]));
    }

    #[test]
    fn modules_follow_the_file_layout() {
        let root = Path::new("src");
        assert!(module_of(root, Path::new("src/lib.rs")).is_empty());
        assert_eq!(module_of(root, Path::new("src/a/mod.rs")), vec!["a"]);
        assert_eq!(module_of(root, Path::new("src/a/b.rs")), vec!["a", "b"]);
    }

    #[test]
    fn roots_keep_their_own_crate_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("lib.rs"), "pub static mut SEEN: u8 = 0;").unwrap();
        let test = dir.path().join("hits.rs");
        fs::write(&test, "#[covenant::ensures(|_| true)] fn hit() {}").unwrap();

        let mut index = SourceIndex::from_path(&src, "demo").unwrap();
        index.add_root(&test, "hits").unwrap();
        assert_eq!(index.crate_name, "demo");
        assert_eq!(index.statics[0].path, "demo::SEEN");
        assert_eq!(index.contracted().next().unwrap().path, "hits::hit");
    }

    #[test]
    fn parse_errors_carry_the_file() {
        let mut index = SourceIndex::default();
        let error = index.add_source(Path::new("broken.rs"), Vec::new(), "fn f( {").unwrap_err();
        assert!(error.to_string().starts_with("cannot parse `broken.rs`"), "{error}");
    }
}
