//! Writing values returned by a statement back into entities.

use batchmodel_core::{CommandError, CommandErrorKind, Error, Reflect, Result, Row, Value};
use batchmodel_mapping::{MappingNode, assign};

/// Assign `row[offset..]` to the `columns` of `entity`, in column order.
pub(crate) fn write_row(
    entity: &mut dyn Reflect,
    columns: &[MappingNode],
    row: &Row,
    offset: usize,
) -> Result<()> {
    for (i, leaf) in columns.iter().enumerate() {
        let value = row.get(offset + i).cloned().ok_or_else(|| {
            Error::Command(CommandError::new(
                CommandErrorKind::OutputMismatch,
                format!(
                    "returned row has {} columns, expected at least {}",
                    row.len(),
                    offset + columns.len()
                ),
            ))
        })?;
        assign(entity, &leaf.default_name, value)?;
    }
    Ok(())
}

/// Canonical key of a compare tuple, equal for values the database would
/// compare equal after a round trip (`Int(1)` and `BigInt(1)`).
pub(crate) fn compare_key<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values
        .into_iter()
        .map(Value::match_key)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

/// Fail with `OutputMismatch` unless exactly one row came back per row
/// written. Output is matched positionally, so any difference would leave
/// entities with missing or misplaced values.
pub(crate) fn require_count(table: &str, expected: usize, returned: usize) -> Result<()> {
    if expected == returned {
        return Ok(());
    }
    tracing::warn!(
        table = table,
        expected = expected,
        returned = returned,
        "Returned row count differs from written rows"
    );
    Err(Error::Command(CommandError::new(
        CommandErrorKind::OutputMismatch,
        format!("{table}: {returned} rows returned for {expected} rows written"),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_count() {
        assert!(require_count("orders", 3, 3).is_ok());
        let err = require_count("orders", 3, 2).unwrap_err();
        assert_eq!(err.command_kind(), Some(CommandErrorKind::OutputMismatch));
        assert!(err.to_string().contains("2 rows returned for 3"));
    }

    #[test]
    fn test_compare_key_normalizes_integers() {
        let sent = [Value::Int(1), Value::Text("a".into())];
        let back = [Value::BigInt(1), Value::Text("a".into())];
        assert_eq!(compare_key(&sent), compare_key(&back));
        assert_ne!(
            compare_key(&[Value::Text("1".into())]),
            compare_key(&[Value::Int(1)])
        );
    }
}
