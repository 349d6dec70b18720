//! Row scoping shared by set-based UPDATE and DELETE.

use batchmodel_core::{CommandError, CommandErrorKind, Dialect, Error, Result};
use batchmodel_mapping::EntityMapping;

/// Reject `limit(0)`.
pub(crate) fn check_limit(limit: Option<u64>) -> Result<()> {
    if limit == Some(0) {
        return Err(Error::Command(CommandError::new(
            CommandErrorKind::InvalidLimit,
            "limit must be greater than zero",
        )));
    }
    Ok(())
}

/// The clause that follows `UPDATE .. SET ..` or `DELETE FROM ..`.
///
/// Without a limit this is just the predicate. With one, Postgres and
/// SQLite pick rows through their physical row locator in a sub-query;
/// MySQL orders by the `id` column when there is one.
pub(crate) fn row_scope(
    dialect: Dialect,
    mapping: &EntityMapping,
    predicate: Option<&str>,
    limit: Option<u64>,
) -> String {
    let filter = predicate
        .map(|p| format!(" WHERE {p}"))
        .unwrap_or_default();
    let Some(limit) = limit else {
        return filter;
    };

    match dialect.row_locator() {
        Some(locator) => format!(
            " WHERE {locator} IN (SELECT {locator} FROM {}{filter} ORDER BY {locator} LIMIT {limit})",
            dialect.quote_identifier(mapping.table)
        ),
        None => {
            let order = mapping
                .find_leaf("id")
                .and_then(|leaf| leaf.mapped_column())
                .map(|column| format!(" ORDER BY {}", dialect.quote_identifier(column)))
                .unwrap_or_default();
            format!("{filter}{order} LIMIT {limit}")
        }
    }
}
