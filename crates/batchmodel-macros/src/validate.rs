//! Compile-time validation for the entity derive macros.
//!
//! All problems are collected and reported together, each pointing at the
//! offending source location.

use std::collections::HashSet;

use proc_macro2::Span;
use syn::{Error, Type};

use crate::parse::{EntityDef, FieldDef, FieldKind, option_inner};

/// Validate a parsed entity definition.
pub fn validate_entity(entity: &EntityDef, check_table: bool) -> Result<(), Error> {
    let mut errors = Vec::new();

    validate_has_fields(entity, &mut errors);
    if check_table {
        validate_table_name(&entity.table_name, entity.name.span(), &mut errors);
    }
    validate_no_duplicate_columns(entity, &mut errors);

    for field in entity.reflected_fields() {
        validate_field(field, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

fn validate_has_fields(entity: &EntityDef, errors: &mut Vec<Error>) {
    if entity.reflected_fields().is_empty() {
        errors.push(Error::new(
            entity.name.span(),
            "entity struct must have at least one non-skipped field",
        ));
    }
}

/// Table names are emitted quoted, but quote characters and statement
/// separators are still rejected.
fn validate_table_name(table_name: &str, span: Span, errors: &mut Vec<Error>) {
    const DANGEROUS_CHARS: &[char] = &[';', '\'', '"', '`', '\\', '\0', '\n', '\r'];

    if table_name.trim().is_empty() {
        errors.push(Error::new(span, "table name cannot be empty or whitespace"));
        return;
    }
    if let Some(ch) = table_name.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        errors.push(Error::new(
            span,
            format!("table name contains invalid character '{}'", ch.escape_default()),
        ));
    }
}

/// No two mapped primitives of one struct may share a column.
fn validate_no_duplicate_columns(entity: &EntityDef, errors: &mut Vec<Error>) {
    let mut seen: HashSet<String> = HashSet::new();
    for field in entity.primitive_fields() {
        if field.unmapped {
            continue;
        }
        let column = field
            .column
            .clone()
            .unwrap_or_else(|| field.name.to_string());
        if !seen.insert(column.clone()) {
            errors.push(Error::new(
                field.name.span(),
                format!("duplicate column name '{column}'"),
            ));
        }
    }
}

fn validate_field(field: &FieldDef, errors: &mut Vec<Error>) {
    if let Some(inner) = option_inner(&field.ty) {
        if option_inner(inner).is_some() {
            errors.push(Error::new(
                field.name.span(),
                "nested Option<Option<T>> cannot be told apart from NULL",
            ));
        }
    }

    if field.kind == FieldKind::Owned && is_collection(&field.ty) {
        errors.push(Error::new(
            field.name.span(),
            "owned fields hold a single object; collections are not supported",
        ));
    }
}

fn is_collection(ty: &Type) -> bool {
    let ty = option_inner(ty).unwrap_or(ty);
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return matches!(
                segment.ident.to_string().as_str(),
                "Vec" | "HashSet" | "BTreeSet" | "HashMap" | "BTreeMap"
            );
        }
    }
    matches!(ty, Type::Array(_) | Type::Slice(_))
}
