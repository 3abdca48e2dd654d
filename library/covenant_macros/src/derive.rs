// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! This module provides the `derive` macros for `Arbitrary` and `Footprint`.
//!
//! ```ignore
//! use covenant::{Arbitrary, Footprint};
//!
//! #[derive(Arbitrary, Footprint)]
//! struct S { len: usize, items: Vec<u8> }
//! ```
use proc_macro2::{Ident, Span, TokenStream};
use proc_macro_error2::abort;
use quote::{format_ident, quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{
    parse_macro_input, parse_quote, Data, DataEnum, DeriveInput, Fields, GenericParam, Generics,
    Index,
};

pub fn expand_derive_arbitrary(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let derive_item = parse_macro_input!(item as DeriveInput);
    let item_name = &derive_item.ident;

    let generics = add_trait_bound(derive_item.generics, parse_quote!(::covenant::Arbitrary));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = fn_any_body(item_name, &derive_item.data);
    let expanded = quote! {
        impl #impl_generics ::covenant::Arbitrary for #item_name #ty_generics #where_clause {
            fn any() -> Self {
                #body
            }
        }
    };
    proc_macro::TokenStream::from(expanded)
}

/// Add `bound` to every type parameter.
fn add_trait_bound(mut generics: Generics, bound: syn::TypeParamBound) -> Generics {
    generics.params.iter_mut().for_each(|param| {
        if let GenericParam::Type(type_param) = param {
            type_param.bounds.push(bound.clone());
        }
    });
    generics
}

/// Generate the body of the function `any()`.
/// E.g.:
/// ```ignore
/// #[derive(Arbitrary)]
/// struct Point { x: u8, y: u8 }
/// ```
/// will generate the following body for `fn any()`:
/// ```ignore
/// fn any() -> Self {
///    Point { x: ::covenant::any(), y: ::covenant::any() }
/// }
/// ```
fn fn_any_body(ident: &Ident, data: &Data) -> TokenStream {
    match data {
        Data::Struct(struct_data) => init_arbitrary_item(ident, &struct_data.fields),
        Data::Enum(enum_data) => fn_any_enum(ident, enum_data),
        Data::Union(_) => {
            abort!(Span::call_site(), "Cannot derive `Arbitrary` for `{}` union", ident;
                note = ident.span() =>
                "`#[derive(Arbitrary)]` cannot be used for unions such as `{}`", ident
            )
        }
    }
}

/// Generate an item initialization where an item can be a struct or a variant.
/// For named fields: `Item { field1: ::covenant::any(), .. }`, for unnamed
/// fields `Item(::covenant::any(), ..)`, and for unit items just `Item`.
fn init_arbitrary_item(ident: &Ident, fields: &Fields) -> TokenStream {
    match fields {
        Fields::Named(fields) => {
            // Use the span of each field, so that a field type missing `Arbitrary`
            // is underlined in the compiler's error.
            let init = fields.named.iter().map(|field| {
                let name = &field.ident;
                quote_spanned! {field.span()=>
                    #name: ::covenant::any()
                }
            });
            quote! {
                #ident {#( #init,)*}
            }
        }
        Fields::Unnamed(fields) => {
            let init = fields.unnamed.iter().map(|field| {
                quote_spanned! {field.span()=>
                    ::covenant::any()
                }
            });
            quote! {
                #ident(#( #init,)*)
            }
        }
        Fields::Unit => {
            quote! {
                #ident
            }
        }
    }
}

/// Generate the body of `any()` for enums. Zero-variant enums panic, the
/// others pick a variant and then fill its fields:
/// ```ignore
/// match ::covenant::internal::any_variant(3) {
///     0 => Enum::WithoutData,
///     1 => Enum::WithUnNamedData(::covenant::any()),
///     _ => Enum::WithNamedData { i: ::covenant::any() },
/// }
/// ```
fn fn_any_enum(ident: &Ident, data: &DataEnum) -> TokenStream {
    if data.variants.is_empty() {
        let msg = format!(
            "Cannot create an arbitrary `{ident}`. Enums with zero-variants cannot be instantiated"
        );
        return quote! {
            panic!(#msg)
        };
    }
    let count = data.variants.len();
    let arms = data.variants.iter().enumerate().map(|(idx, variant)| {
        let init = init_arbitrary_item(&variant.ident, &variant.fields);
        if idx + 1 < count {
            let index = Index::from(idx);
            quote! {
                #index => #ident::#init,
            }
        } else {
            quote! {
                _ => #ident::#init,
            }
        }
    });
    quote! {
        match ::covenant::internal::any_variant(#count) {
            #(#arms)*
        }
    }
}

pub fn expand_derive_footprint(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let derive_item = parse_macro_input!(item as DeriveInput);
    let item_name = &derive_item.ident;

    let generics = add_trait_bound(derive_item.generics, parse_quote!(::covenant::Footprint));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = fn_record_body(item_name, &derive_item.data);
    let expanded = quote! {
        impl #impl_generics ::covenant::Footprint for #item_name #ty_generics #where_clause {
            fn record(&self, rec: &mut ::covenant::footprint::Recorder) {
                #body
            }
        }
    };
    proc_macro::TokenStream::from(expanded)
}

/// Bindings for the fields of a struct or variant, and the pattern binding them.
fn field_bindings(fields: &Fields) -> (TokenStream, Vec<(String, Ident)>) {
    match fields {
        Fields::Named(named) => {
            let bindings: Vec<_> = named
                .named
                .iter()
                .filter_map(|field| field.ident.clone())
                .map(|ident| (ident.to_string(), format_ident!("__covenant_{}", ident)))
                .collect();
            let pats = named.named.iter().zip(&bindings).map(|(field, (_, binding))| {
                let name = &field.ident;
                quote!(#name: #binding)
            });
            (quote!({ #(#pats),* }), bindings)
        }
        Fields::Unnamed(unnamed) => {
            let bindings: Vec<_> = (0..unnamed.unnamed.len())
                .map(|index| (index.to_string(), format_ident!("__covenant_{}", index)))
                .collect();
            let pats = bindings.iter().map(|(_, binding)| binding);
            (quote!(( #(#pats),* )), bindings)
        }
        Fields::Unit => (quote!(), Vec::new()),
    }
}

fn record_fields(bindings: &[(String, Ident)]) -> TokenStream {
    let fields = bindings.iter().map(|(name, binding)| quote!(rec.field(#name, #binding);));
    quote!(#(#fields)*)
}

/// Generate the body of `record()`: every field is recorded under its name,
/// and enums additionally record which variant is active.
fn fn_record_body(ident: &Ident, data: &Data) -> TokenStream {
    match data {
        Data::Struct(struct_data) => {
            let (pattern, bindings) = field_bindings(&struct_data.fields);
            let fields = record_fields(&bindings);
            quote! {
                let #ident #pattern = self;
                #fields
            }
        }
        Data::Enum(enum_data) => {
            if enum_data.variants.is_empty() {
                return quote!(match *self {});
            }
            let arms = enum_data.variants.iter().map(|variant| {
                let name = &variant.ident;
                let text = name.to_string();
                let (pattern, bindings) = field_bindings(&variant.fields);
                let fields = record_fields(&bindings);
                quote! {
                    #ident::#name #pattern => {
                        rec.variant(self, #text);
                        #fields
                    }
                }
            });
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Union(_) => {
            abort!(Span::call_site(), "Cannot derive `Footprint` for `{}` union", ident;
                note = ident.span() =>
                "the active field of a union such as `{}` is unknown", ident
            )
        }
    }
}
