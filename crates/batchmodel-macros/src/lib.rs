//! Procedural macros for BatchModel Rust.
//!
//! `batchmodel-macros` is the **compile-time reflection layer**. Batch
//! commands walk entities generically, so every entity needs a static
//! description of its properties plus field-level getters and setters.
//!
//! - `#[derive(Entity)]` implements `Reflect` and `Entity` for a root entity.
//! - `#[derive(Reflect)]` implements `Reflect` alone, for owned sub-objects.
//! - `#[derive(Enumeration)]` maps a fieldless enum to its integral discriminant.
//!
//! These macros are used by application crates via the `batchmodel` facade.

use proc_macro::TokenStream;
use quote::quote;

mod infer;
mod parse;
mod validate;

use parse::{EntityDef, EnumerationDef, FieldDef, FieldKind, option_inner, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// Generates the `Reflect` implementation (property descriptors, getters,
/// setters and owned-object access) and the `Entity` implementation.
/// The struct must also implement `Default`.
///
/// # Attributes
///
/// - `#[entity(table = "name")]` - Override table name (defaults to snake_case plural)
/// - `#[entity(column = "name")]` - Override column name
/// - `#[entity(sql_type = "VARCHAR(64)")]` - Configure the storage type
/// - `#[entity(unmapped)]` - Keep the property declared but without a column
/// - `#[entity(enumeration)]` - Field is a `#[derive(Enumeration)]` enum
/// - `#[entity(owned)]` - Field is an owned sub-object stored in this row
/// - `#[entity(navigation)]` - Field references another aggregate; never mapped
/// - `#[entity(skip)]` - Hide the field from reflection entirely
///
/// # Example
///
/// ```ignore
/// use batchmodel::prelude::*;
///
/// #[derive(Entity, Default)]
/// #[entity(table = "orders")]
/// struct Order {
///     id: i64,
///     #[entity(column = "order_total")]
///     total: f64,
///     #[entity(enumeration)]
///     status: Status,
///     #[entity(owned)]
///     shipping: Option<Address>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_entity(&entity, true) {
        return e.to_compile_error().into();
    }

    let reflect = match generate_reflect_impl(&entity) {
        Ok(tokens) => tokens,
        Err(e) => return e.to_compile_error().into(),
    };

    let name = &entity.name;
    let table_name = &entity.table_name;
    let (impl_generics, ty_generics, _) = entity.generics.split_for_impl();
    let mut where_clause = match reflect_where_clause(&entity) {
        Ok(clause) => clause,
        Err(e) => return e.to_compile_error().into(),
    };
    where_clause
        .predicates
        .push(syn::parse_quote!(#name #ty_generics: Default + 'static));

    quote! {
        #reflect

        impl #impl_generics batchmodel_core::Entity for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table_name;
        }
    }
    .into()
}

/// Derive macro for the `Reflect` trait alone.
///
/// Used on owned sub-objects, which have no table of their own. Accepts the
/// same field attributes as `#[derive(Entity)]`.
#[proc_macro_derive(Reflect, attributes(entity))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_entity(&entity, false) {
        return e.to_compile_error().into();
    }

    match generate_reflect_impl(&entity) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive macro for the `Enumeration` trait.
///
/// Only fieldless enums are accepted. Explicit discriminants are honoured;
/// implicit ones follow the compiler's numbering.
///
/// # Example
///
/// ```ignore
/// #[derive(Enumeration, Default)]
/// enum Status {
///     #[default]
///     Pending,
///     Shipped = 10,
///     Delivered,
/// }
/// ```
#[proc_macro_derive(Enumeration)]
pub fn derive_enumeration(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let def = match parse::parse_enumeration(&input) {
        Ok(d) => d,
        Err(e) => return e.to_compile_error().into(),
    };

    if def.variants.is_empty() {
        return syn::Error::new_spanned(&input, "Enumeration requires at least one variant")
            .to_compile_error()
            .into();
    }

    generate_enumeration_impl(&def).into()
}

fn generate_reflect_impl(entity: &EntityDef) -> syn::Result<proc_macro2::TokenStream> {
    let name = &entity.name;
    let (impl_generics, ty_generics, _) = entity.generics.split_for_impl();
    let where_clause = Some(reflect_where_clause(entity)?).filter(|c| !c.predicates.is_empty());
    let type_name = name.to_string();
    let property_infos = generate_property_infos(entity)?;
    let get_value_arms = generate_get_value_arms(entity);
    let set_value_body = generate_set_value(entity);
    let (owned_arms, owned_mut_arms) = generate_owned_arms(entity);

    Ok(quote! {
        impl #impl_generics batchmodel_core::Reflect for #name #ty_generics #where_clause {
            fn properties() -> &'static [batchmodel_core::PropertyInfo] {
                static PROPERTIES: &[batchmodel_core::PropertyInfo] = &[
                    #(#property_infos),*
                ];
                PROPERTIES
            }

            fn type_name(&self) -> &'static str {
                #type_name
            }

            fn get_value(&self, name: &str) -> Option<batchmodel_core::PropertyValue> {
                match name {
                    #(#get_value_arms)*
                    _ => None,
                }
            }

            fn set_value(
                &mut self,
                name: &str,
                value: batchmodel_core::Value,
            ) -> batchmodel_core::Result<()> {
                #set_value_body
            }

            fn owned(&self, name: &str) -> Option<&dyn batchmodel_core::Reflect> {
                match name {
                    #(#owned_arms)*
                    _ => None,
                }
            }

            fn owned_mut(&mut self, name: &str) -> Option<&mut dyn batchmodel_core::Reflect> {
                match name {
                    #(#owned_mut_arms)*
                    _ => None,
                }
            }
        }
    })
}

/// Build the where clause shared by the `Reflect` and `Entity` impls.
///
/// The descriptor slice is a single static shared by every instantiation,
/// so type parameters may only appear in scalar, enumeration and navigation
/// fields. Those fields get the conversion bounds the generated accessors
/// need.
fn reflect_where_clause(entity: &EntityDef) -> syn::Result<syn::WhereClause> {
    if let Some(lifetime) = entity.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "entities cannot borrow; lifetime parameters are not supported",
        ));
    }

    let mut clause = entity
        .generics
        .where_clause
        .clone()
        .unwrap_or_else(|| syn::parse_quote!(where));

    for param in entity.generics.type_params() {
        let ident = &param.ident;
        clause.predicates.push(syn::parse_quote!(#ident: Send + Sync));
    }

    for field in entity.reflected_fields() {
        let ty = &field.ty;
        if !mentions_type_param(ty, &entity.generics) {
            continue;
        }
        match field.kind {
            FieldKind::Scalar => {
                clause
                    .predicates
                    .push(syn::parse_quote!(#ty: Clone + batchmodel_core::FromValue));
                clause
                    .predicates
                    .push(syn::parse_quote!(batchmodel_core::Value: From<#ty>));
            }
            FieldKind::Enumeration => {
                let inner = option_inner(ty).unwrap_or(ty);
                clause
                    .predicates
                    .push(syn::parse_quote!(#inner: batchmodel_core::Enumeration));
            }
            FieldKind::Owned => {
                return Err(syn::Error::new_spanned(
                    ty,
                    "owned properties cannot depend on type parameters; property descriptors are static",
                ));
            }
            FieldKind::Navigation => {}
        }
    }

    Ok(clause)
}

fn mentions_type_param(ty: &syn::Type, generics: &syn::Generics) -> bool {
    fn walk(tokens: proc_macro2::TokenStream, params: &[&syn::Ident]) -> bool {
        tokens.into_iter().any(|tree| match tree {
            proc_macro2::TokenTree::Ident(ident) => params.iter().any(|p| **p == ident),
            proc_macro2::TokenTree::Group(group) => walk(group.stream(), params),
            _ => false,
        })
    }

    let params: Vec<_> = generics.type_params().map(|p| &p.ident).collect();
    !params.is_empty() && walk(quote!(#ty), &params)
}

/// Generate one `PropertyInfo` const expression per reflected field.
fn generate_property_infos(entity: &EntityDef) -> syn::Result<Vec<proc_macro2::TokenStream>> {
    let mut infos = Vec::new();

    for field in entity.reflected_fields() {
        let field_name = field.name.to_string();
        let ty = &field.ty;
        let rust_type = quote!(#ty).to_string().replace(' ', "");

        let mut info = match field.kind {
            FieldKind::Scalar => {
                quote! { batchmodel_core::PropertyInfo::scalar(#field_name, #rust_type) }
            }
            FieldKind::Enumeration => {
                quote! { batchmodel_core::PropertyInfo::enumeration(#field_name, #rust_type) }
            }
            FieldKind::Owned => {
                let inner = owned_type(field);
                quote! {
                    batchmodel_core::PropertyInfo::owned(
                        #field_name,
                        #rust_type,
                        <#inner as batchmodel_core::Reflect>::properties,
                    )
                }
            }
            FieldKind::Navigation => {
                quote! { batchmodel_core::PropertyInfo::navigation(#field_name, #rust_type) }
            }
        };

        if let Some(column) = &field.column {
            info = quote! { #info.column(#column) };
        }
        if let Some(raw) = &field.sql_type {
            let sql_type = infer::parse_sql_type(raw, field.name.span())?;
            info = quote! { #info.sql_type(#sql_type) };
        }
        if field.unmapped {
            info = quote! { #info.unmapped() };
        }
        if field.optional {
            info = quote! { #info.nullable(true) };
        }

        infos.push(info);
    }

    Ok(infos)
}

fn owned_type(field: &FieldDef) -> &syn::Type {
    option_inner(&field.ty).unwrap_or(&field.ty)
}

fn generate_get_value_arms(entity: &EntityDef) -> Vec<proc_macro2::TokenStream> {
    entity
        .primitive_fields()
        .into_iter()
        .map(|field| {
            let ident = &field.name;
            let key = ident.to_string();
            let ty = &field.ty;
            match (field.kind, field.optional) {
                (FieldKind::Enumeration, true) => quote! {
                    #key => Some(batchmodel_core::PropertyValue::Enumeration(
                        self.#ident.as_ref().map(batchmodel_core::Enumeration::to_raw),
                    )),
                },
                (FieldKind::Enumeration, false) => quote! {
                    #key => Some(batchmodel_core::PropertyValue::Enumeration(Some(
                        batchmodel_core::Enumeration::to_raw(&self.#ident),
                    ))),
                },
                _ => quote! {
                    #key => Some(batchmodel_core::PropertyValue::Scalar(
                        <batchmodel_core::Value as From<#ty>>::from(self.#ident.clone()),
                    )),
                },
            }
        })
        .collect()
}

fn generate_set_value(entity: &EntityDef) -> proc_macro2::TokenStream {
    let type_name = entity.name.to_string();
    let fields = entity.primitive_fields();

    let arms: Vec<_> = fields
        .iter()
        .map(|field| {
            let ident = &field.name;
            let key = ident.to_string();
            let ty = &field.ty;
            let convert = match (field.kind, option_inner(ty)) {
                (FieldKind::Enumeration, Some(_)) => quote! {
                    if value.is_null() {
                        None
                    } else {
                        Some(batchmodel_core::enumeration_from_value(&value)?)
                    }
                },
                (FieldKind::Enumeration, None) => quote! {
                    batchmodel_core::enumeration_from_value(&value)?
                },
                _ => quote! {
                    <#ty as batchmodel_core::FromValue>::from_value(&value)?
                },
            };
            quote! {
                #key => {
                    self.#ident = #convert;
                    Ok(())
                }
            }
        })
        .collect();

    let silence = if fields.is_empty() {
        quote! { let _ = value; }
    } else {
        quote! {}
    };

    quote! {
        #silence
        match name {
            #(#arms)*
            _ => Err(batchmodel_core::Error::Mapping(batchmodel_core::MappingError::new(
                batchmodel_core::MappingErrorKind::UnknownProperty,
                #type_name,
                Some(name.to_string()),
                format!("{} has no primitive property '{}'", #type_name, name),
            ))),
        }
    }
}

fn generate_owned_arms(
    entity: &EntityDef,
) -> (Vec<proc_macro2::TokenStream>, Vec<proc_macro2::TokenStream>) {
    let mut owned = Vec::new();
    let mut owned_mut = Vec::new();

    for field in entity.owned_fields() {
        let ident = &field.name;
        let key = ident.to_string();
        if field.optional {
            owned.push(quote! {
                #key => self
                    .#ident
                    .as_ref()
                    .map(|v| v as &dyn batchmodel_core::Reflect),
            });
            owned_mut.push(quote! {
                #key => Some(
                    self.#ident.get_or_insert_with(Default::default)
                        as &mut dyn batchmodel_core::Reflect,
                ),
            });
        } else {
            owned.push(quote! {
                #key => Some(&self.#ident as &dyn batchmodel_core::Reflect),
            });
            owned_mut.push(quote! {
                #key => Some(&mut self.#ident as &mut dyn batchmodel_core::Reflect),
            });
        }
    }

    (owned, owned_mut)
}

fn generate_enumeration_impl(def: &EnumerationDef) -> proc_macro2::TokenStream {
    let name = &def.name;
    let to_raw_arms = def.variants.iter().map(|(ident, expr)| {
        quote! { Self::#ident => #expr, }
    });
    let from_raw_checks = def.variants.iter().map(|(ident, expr)| {
        quote! {
            if raw == #expr {
                return Some(Self::#ident);
            }
        }
    });

    quote! {
        impl batchmodel_core::Enumeration for #name {
            #[allow(clippy::unnecessary_cast)]
            fn to_raw(&self) -> i64 {
                match self {
                    #(#to_raw_arms)*
                }
            }

            #[allow(clippy::unnecessary_cast)]
            fn from_raw(raw: i64) -> Option<Self> {
                #(#from_raw_checks)*
                None
            }
        }
    }
}
