//! Translation of `sql_type = ".."` attributes into `SqlType` constructors.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::Error;

/// Turn a storage type name into a const expression building the matching
/// `SqlType` variant.
///
/// Known names are case-insensitive. `VARCHAR(n)` and `DECIMAL(p, s)` carry
/// their arguments; anything else becomes `SqlType::Custom` and is emitted
/// verbatim.
pub fn parse_sql_type(raw: &str, span: Span) -> syn::Result<TokenStream> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::new(span, "sql_type cannot be empty"));
    }
    let upper = trimmed.to_ascii_uppercase();

    let simple = match upper.as_str() {
        "TINYINT" => Some(quote! { batchmodel_core::SqlType::TinyInt }),
        "SMALLINT" => Some(quote! { batchmodel_core::SqlType::SmallInt }),
        "INT" | "INTEGER" => Some(quote! { batchmodel_core::SqlType::Integer }),
        "BIGINT" => Some(quote! { batchmodel_core::SqlType::BigInt }),
        "REAL" | "FLOAT" => Some(quote! { batchmodel_core::SqlType::Real }),
        "DOUBLE" | "DOUBLE PRECISION" => Some(quote! { batchmodel_core::SqlType::Double }),
        "BOOL" | "BOOLEAN" => Some(quote! { batchmodel_core::SqlType::Boolean }),
        "TEXT" => Some(quote! { batchmodel_core::SqlType::Text }),
        "BLOB" | "BYTEA" => Some(quote! { batchmodel_core::SqlType::Blob }),
        "DATE" => Some(quote! { batchmodel_core::SqlType::Date }),
        "TIME" => Some(quote! { batchmodel_core::SqlType::Time }),
        "TIMESTAMP" | "DATETIME" => Some(quote! { batchmodel_core::SqlType::Timestamp }),
        "TIMESTAMPTZ" => Some(quote! { batchmodel_core::SqlType::TimestampTz }),
        "UUID" => Some(quote! { batchmodel_core::SqlType::Uuid }),
        "JSON" | "JSONB" => Some(quote! { batchmodel_core::SqlType::Json }),
        _ => None,
    };
    if let Some(tokens) = simple {
        return Ok(tokens);
    }

    if let Some(args) = parenthesized(&upper, "VARCHAR") {
        let len: u32 = args
            .parse()
            .map_err(|_| Error::new(span, format!("invalid VARCHAR length `{args}`")))?;
        return Ok(quote! { batchmodel_core::SqlType::VarChar(#len) });
    }

    if let Some(args) = parenthesized(&upper, "DECIMAL").or_else(|| parenthesized(&upper, "NUMERIC"))
    {
        let (precision, scale) = args.split_once(',').unwrap_or((args, "0"));
        let precision: u8 = precision
            .trim()
            .parse()
            .map_err(|_| Error::new(span, format!("invalid DECIMAL precision in `{raw}`")))?;
        let scale: u8 = scale
            .trim()
            .parse()
            .map_err(|_| Error::new(span, format!("invalid DECIMAL scale in `{raw}`")))?;
        if scale > precision {
            return Err(Error::new(
                span,
                format!("DECIMAL scale ({scale}) cannot be greater than precision ({precision})"),
            ));
        }
        return Ok(quote! { batchmodel_core::SqlType::Decimal { precision: #precision, scale: #scale } });
    }

    Ok(quote! { batchmodel_core::SqlType::Custom(#trimmed) })
}

fn parenthesized<'a>(upper: &'a str, name: &str) -> Option<&'a str> {
    upper
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}
