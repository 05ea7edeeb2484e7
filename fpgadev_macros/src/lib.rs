//! Procedural macros for fpgadev.
//!
//! `#[bus_driver(name = "...", compatible = "...")]` on a struct implements
//! `crate::driver::DriverMatch` for it: the driver name and its match table. Repeat
//! `compatible` to match several device revisions.
//!
//! ```ignore
//! #[bus_driver(name = "h2f", compatible = "altr,bridge-15.0")]
//! pub struct BridgeDriver { /* ... */ }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Expr, ExprLit, ItemStruct, Lit, LitStr, MetaNameValue, Token, parse_macro_input};

#[proc_macro_attribute]
pub fn bus_driver(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr with Punctuated::<MetaNameValue, Token![,]>::parse_terminated);
    let item = parse_macro_input!(item as ItemStruct);

    let mut name: Option<LitStr> = None;
    let mut compatible: Vec<LitStr> = Vec::new();
    for arg in args {
        let value = match &arg.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) => s.clone(),
            other => {
                return syn::Error::new_spanned(other, "expected a string literal")
                    .to_compile_error()
                    .into();
            }
        };
        if arg.path.is_ident("name") {
            if name.replace(value).is_some() {
                return syn::Error::new_spanned(&arg.path, "`name` given twice")
                    .to_compile_error()
                    .into();
            }
        } else if arg.path.is_ident("compatible") {
            if value.value().is_empty() {
                return syn::Error::new_spanned(&value, "empty compatible string")
                    .to_compile_error()
                    .into();
            }
            compatible.push(value);
        } else {
            return syn::Error::new_spanned(&arg.path, "expected `name` or `compatible`")
                .to_compile_error()
                .into();
        }
    }

    let Some(name) = name else {
        return syn::Error::new_spanned(&item.ident, "bus_driver needs a `name`")
            .to_compile_error()
            .into();
    };
    if compatible.is_empty() {
        return syn::Error::new_spanned(&item.ident, "bus_driver needs a `compatible` entry")
            .to_compile_error()
            .into();
    }

    let ident = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    quote! {
        #item

        impl #impl_generics crate::driver::DriverMatch for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const OF_MATCH_TABLE: &'static [&'static str] = &[#(#compatible),*];
        }
    }
    .into()
}
