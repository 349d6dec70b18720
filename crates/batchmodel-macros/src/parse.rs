//! Parsing logic for the entity derive macros.
//!
//! This module extracts struct-level and field-level `#[entity(...)]`
//! attributes from the derive input to build `EntityDef` and `FieldDef`
//! structures used for code generation.

use proc_macro2::Span;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, GenericArgument, Generics, Ident, Lit,
    PathArguments, Result, Type,
};

/// Parsed entity definition from a struct with `#[derive(Entity)]` or
/// `#[derive(Reflect)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `Order`).
    pub name: Ident,
    /// The SQL table name (e.g., `"orders"`).
    pub table_name: String,
    /// Parsed field definitions.
    pub fields: Vec<FieldDef>,
    /// Generic parameters from the struct.
    pub generics: Generics,
}

/// How a field participates in reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Enumeration,
    Owned,
    Navigation,
}

/// Parsed field definition from a struct field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub ty: Type,
    pub kind: FieldKind,
    /// Explicit column override
    pub column: Option<String>,
    /// Configured storage type, as written in the attribute
    pub sql_type: Option<String>,
    pub unmapped: bool,
    /// Field is invisible to reflection
    pub skip: bool,
    /// Field type is `Option<T>`
    pub optional: bool,
}

impl EntityDef {
    /// Fields visible to reflection.
    pub fn reflected_fields(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| !f.skip).collect()
    }

    /// Fields read and written through `get_value` / `set_value`.
    pub fn primitive_fields(&self) -> Vec<&FieldDef> {
        self.fields
            .iter()
            .filter(|f| !f.skip && matches!(f.kind, FieldKind::Scalar | FieldKind::Enumeration))
            .collect()
    }

    pub fn owned_fields(&self) -> Vec<&FieldDef> {
        self.fields
            .iter()
            .filter(|f| !f.skip && f.kind == FieldKind::Owned)
            .collect()
    }
}

/// Parse a `DeriveInput` into an `EntityDef`.
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();
    let generics = input.generics.clone();

    let table_name = parse_struct_attrs(&input.attrs)?
        .unwrap_or_else(|| derive_table_name(&name.to_string()));

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs; use #[derive(Enumeration)] for enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    Ok(EntityDef {
        name,
        table_name,
        fields,
        generics,
    })
}

/// Parse struct-level `#[entity(...)]` attributes.
///
/// Supported keys:
/// - `table = "name"` (overrides derived table name)
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table_name: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: Lit = meta.value()?.parse()?;
                if let Lit::Str(lit_str) = value {
                    table_name = Some(lit_str.value());
                    Ok(())
                } else {
                    Err(Error::new_spanned(
                        value,
                        "expected string literal for table name",
                    ))
                }
            } else {
                Err(meta.error("unknown entity attribute; expected `table`"))
            }
        })?;
    }

    Ok(table_name)
}

/// Derive table name from struct name: convert to snake_case and pluralize.
///
/// Examples:
/// - `Order` -> `orders`
/// - `LineItem` -> `line_items`
/// - `Category` -> `categories`
fn derive_table_name(struct_name: &str) -> String {
    let snake = to_snake_case(struct_name);
    pluralize(&snake)
}

/// Convert PascalCase to snake_case.
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                // word boundary, or the end of an acronym
                if prev.is_lowercase()
                    || (prev.is_uppercase() && next.is_some_and(|n| n.is_lowercase()))
                {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

/// Intermediate struct for collecting field attributes.
#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    sql_type: Option<String>,
    unmapped: bool,
    owned: bool,
    enumeration: bool,
    navigation: bool,
    skip: bool,
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let ty = field.ty.clone();
    let attrs = parse_field_attrs(&field.attrs, &name)?;

    let kind = if attrs.owned {
        FieldKind::Owned
    } else if attrs.enumeration {
        FieldKind::Enumeration
    } else if attrs.navigation {
        FieldKind::Navigation
    } else {
        FieldKind::Scalar
    };

    Ok(FieldDef {
        optional: is_option_type(&ty),
        name,
        ty,
        kind,
        column: attrs.column,
        sql_type: attrs.sql_type,
        unmapped: attrs.unmapped,
        skip: attrs.skip,
    })
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<String> {
    let value: Lit = meta.value()?.parse()?;
    if let Lit::Str(lit_str) = value {
        Ok(lit_str.value())
    } else {
        Err(Error::new_spanned(
            value,
            format!("expected string literal for {what}"),
        ))
    }
}

/// Parse all `#[entity(...)]` attributes on a field.
fn parse_field_attrs(attrs: &[Attribute], field_name: &Ident) -> Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("column") {
                result.column = Some(string_value(&meta, "column name")?);
            } else if path.is_ident("sql_type") {
                result.sql_type = Some(string_value(&meta, "sql_type")?);
            } else if path.is_ident("unmapped") {
                result.unmapped = true;
            } else if path.is_ident("owned") {
                result.owned = true;
            } else if path.is_ident("enumeration") {
                result.enumeration = true;
            } else if path.is_ident("navigation") {
                result.navigation = true;
            } else if path.is_ident("skip") {
                result.skip = true;
            } else {
                return Err(meta.error(
                    "unknown entity field attribute; expected one of `column`, `sql_type`, \
                     `unmapped`, `owned`, `enumeration`, `navigation`, `skip`",
                ));
            }
            Ok(())
        })?;
    }

    validate_field_attrs(&result, field_name)?;
    Ok(result)
}

fn validate_field_attrs(attrs: &FieldAttrs, field_name: &Ident) -> Result<()> {
    let markers = [attrs.owned, attrs.enumeration, attrs.navigation]
        .iter()
        .filter(|m| **m)
        .count();
    if markers > 1 {
        return Err(Error::new_spanned(
            field_name,
            "`owned`, `enumeration` and `navigation` are mutually exclusive",
        ));
    }

    if attrs.skip && (markers > 0 || attrs.column.is_some() || attrs.unmapped) {
        return Err(Error::new_spanned(
            field_name,
            "`skip` hides the field from reflection; other entity attributes are redundant",
        ));
    }

    if (attrs.owned || attrs.navigation) && (attrs.column.is_some() || attrs.sql_type.is_some()) {
        return Err(Error::new_spanned(
            field_name,
            "`column` and `sql_type` only apply to scalar and enumeration fields",
        ));
    }

    Ok(())
}

/// Check if a type is `Option<T>`.
pub fn is_option_type(ty: &Type) -> bool {
    option_inner(ty).is_some()
}

/// The `T` of an `Option<T>`.
pub fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) => Some(inner),
        _ => None,
    }
}

/// Parsed fieldless enum from `#[derive(Enumeration)]`.
#[derive(Debug)]
pub struct EnumerationDef {
    pub name: Ident,
    /// Variant identifiers with their discriminant expressions
    pub variants: Vec<(Ident, syn::Expr)>,
}

/// Parse a fieldless enum, computing implicit discriminants the way the
/// compiler does: one more than the previous variant.
pub fn parse_enumeration(input: &DeriveInput) -> Result<EnumerationDef> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(
            input,
            "Enumeration can only be derived for enums",
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Enumeration cannot be derived for generic enums",
        ));
    }

    let mut variants = Vec::with_capacity(data.variants.len());
    let mut previous: Option<syn::Expr> = None;
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(Error::new_spanned(
                variant,
                "Enumeration variants cannot carry data",
            ));
        }
        let discriminant: syn::Expr = match (&variant.discriminant, &previous) {
            (Some((_, expr)), _) => syn::parse_quote! { (#expr) as i64 },
            (None, Some(prev)) => syn::parse_quote! { (#prev) + 1 },
            (None, None) => syn::parse_quote! { 0i64 },
        };
        previous = Some(discriminant.clone());
        variants.push((variant.ident.clone(), discriminant));
    }

    Ok(EnumerationDef {
        name: input.ident.clone(),
        variants,
    })
}
