//! Procedural macros for TableSync
//!
//! `#[derive(SyncTable)]` walks a struct's fields and emits a
//! `table_sync::models::SyncTable` implementation describing the table.
//!
//! ```ignore
//! #[derive(SyncTable)]
//! #[table(name = "users", comment = "registered users")]
//! struct User {
//!     #[ddl("primaryKey")]
//!     id: i64,
//!     #[ddl("size:64;not null;uniqueIndex")]
//!     username: String,
//!     #[ddl(flatten)]
//!     timestamps: Timestamps,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::parse::ParseStream;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, LitStr};

/// Derive macro for SyncTable
#[proc_macro_derive(SyncTable, attributes(table, ddl))]
pub fn derive_sync_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(expanded) => expanded.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct TableArgs {
    name: Option<String>,
    comment: Option<String>,
    charset: Option<String>,
}

enum FieldArgs {
    Tags(String),
    Flatten,
    Skip,
}

fn parse_table_args(input: &DeriveInput) -> syn::Result<TableArgs> {
    let mut args = TableArgs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("table")) {
        attr.parse_nested_meta(|meta| {
            let value: LitStr = meta.value()?.parse()?;
            if meta.path.is_ident("name") {
                args.name = Some(value.value());
            } else if meta.path.is_ident("comment") {
                args.comment = Some(value.value());
            } else if meta.path.is_ident("charset") {
                args.charset = Some(value.value());
            } else {
                return Err(meta.error("expected `name`, `comment` or `charset`"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

fn parse_field_args(field: &syn::Field) -> syn::Result<FieldArgs> {
    let mut args = FieldArgs::Tags(String::new());

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("ddl")) {
        args = attr.parse_args_with(|input: ParseStream| {
            if input.peek(LitStr) {
                return Ok(FieldArgs::Tags(input.parse::<LitStr>()?.value()));
            }
            let ident: Ident = input.parse()?;
            match ident.to_string().as_str() {
                "flatten" => Ok(FieldArgs::Flatten),
                "skip" => Ok(FieldArgs::Skip),
                _ => Err(syn::Error::new(
                    ident.span(),
                    "expected a tag string, `flatten` or `skip`",
                )),
            }
        })?;
    }

    Ok(args)
}

fn optional_string(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(v) => quote! { ::std::option::Option::Some(::std::string::String::from(#v)) },
        None => quote! { ::std::option::Option::None },
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "SyncTable only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "SyncTable only supports structs")),
    };

    let args = parse_table_args(input)?;
    let mut field_tokens = Vec::new();

    for field in fields {
        let ident = match &field.ident {
            Some(ident) => ident,
            None => continue,
        };
        let ty = &field.ty;

        match parse_field_args(field)? {
            FieldArgs::Skip => {}
            FieldArgs::Flatten => field_tokens.push(quote! {
                fields.extend(<#ty as ::table_sync::models::SyncTable>::table_definition().fields);
            }),
            FieldArgs::Tags(ddl) => {
                let field_name = ident.to_string();
                let rust_type = ty.to_token_stream().to_string();
                field_tokens.push(quote! {
                    fields.push(::table_sync::models::FieldDefinition::new(#field_name, #rust_type, #ddl));
                });
            }
        }
    }

    let name_str = name.to_string();
    let table_name = optional_string(&args.name);
    let charset = optional_string(&args.charset);
    let comment = args.comment.unwrap_or_default();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::table_sync::models::SyncTable for #name #ty_generics #where_clause {
            fn table_definition() -> ::table_sync::models::TableDefinition {
                #[allow(unused_mut)]
                let mut fields = ::std::vec::Vec::new();
                #(#field_tokens)*

                ::table_sync::models::TableDefinition {
                    name: ::std::string::String::from(#name_str),
                    table_name: #table_name,
                    comment: ::std::string::String::from(#comment),
                    charset: #charset,
                    fields,
                }
            }
        }
    })
}
