//! Set-based UPDATE.

use std::marker::PhantomData;

use asupersync::{Cx, Outcome};
use batchmodel_core::{
    CommandError, CommandErrorKind, Connection, Dialect, Entity, Error, Result,
};
use batchmodel_mapping::MappingRegistry;

use crate::chunk::Statement;
use crate::expr::Expr;
use crate::scope::{check_limit, row_scope};

/// Update every row matching a predicate in one statement.
///
/// # Example
///
/// ```ignore
/// let updated = UpdateCommand::<Order>::new()
///     .set("total", Expr::prop("total").add(5))
///     .filter(Expr::prop("status").eq(1))
///     .limit(100)
///     .execute(&cx, &conn)
///     .await;
/// ```
#[derive(Debug)]
pub struct UpdateCommand<'r, E: Entity> {
    registry: &'r MappingRegistry,
    assignments: Vec<(String, Expr)>,
    predicate: Option<Expr>,
    limit: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> UpdateCommand<'static, E> {
    pub fn new() -> Self {
        Self::with_registry(MappingRegistry::global())
    }
}

impl<E: Entity> Default for UpdateCommand<'static, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, E: Entity> UpdateCommand<'r, E> {
    pub fn with_registry(registry: &'r MappingRegistry) -> Self {
        Self {
            registry,
            assignments: Vec::new(),
            predicate: None,
            limit: None,
            _entity: PhantomData,
        }
    }

    /// Assign `value` to the property at `path`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.assignments.push((path.into(), value.into()));
        self
    }

    /// Restrict the update. Repeated filters are combined with AND.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Update at most `n` rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Build the UPDATE statement for `dialect`.
    pub fn statement(&self, dialect: Dialect) -> Result<Statement> {
        check_limit(self.limit)?;
        if self.assignments.is_empty() {
            return Err(Error::Command(CommandError::new(
                CommandErrorKind::EmptySelection,
                format!("update of {} assigns nothing", E::TABLE_NAME),
            )));
        }
        let mapping = self.registry.resolve::<E>()?;

        let mut params = Vec::new();
        let mut sets = Vec::with_capacity(self.assignments.len());
        for (path, value) in &self.assignments {
            let column = dialect.quote_identifier(mapping.column_for(path)?);
            let value = value.build(dialect, &mapping, &mut params)?;
            sets.push(format!("{column} = {value}"));
        }
        let predicate = self
            .predicate
            .as_ref()
            .map(|p| p.build(dialect, &mapping, &mut params))
            .transpose()?;

        let sql = format!(
            "UPDATE {} SET {}{}",
            dialect.quote_identifier(mapping.table),
            sets.join(", "),
            row_scope(dialect, &mapping, predicate.as_deref(), self.limit)
        );
        Ok(Statement {
            sql,
            params,
            rows: 0..0,
        })
    }

    /// Run the update and return the number of rows changed.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = E::TABLE_NAME))]
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let statement = match self.statement(conn.dialect()) {
            Ok(statement) => statement,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(
            table = E::TABLE_NAME,
            limit = ?self.limit,
            params = statement.params.len(),
            "Executing batch update"
        );
        conn.execute(cx, &statement.sql, &statement.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnection, Order, unwrap_outcome};
    use asupersync::runtime::RuntimeBuilder;
    use batchmodel_core::{MappingErrorKind, Value};

    #[test]
    fn test_update_sql_set_params_precede_where() {
        let registry = MappingRegistry::new();
        let statement = UpdateCommand::<Order>::with_registry(&registry)
            .set("total", Expr::prop("total").add(5))
            .set("shipping.city", "Oslo")
            .filter(Expr::prop("id").gt(10))
            .statement(Dialect::Postgres)
            .unwrap();

        assert_eq!(
            statement.sql,
            "UPDATE \"orders\" SET \"total\" = \"total\" + $1, \"shipping_city\" = $2 \
             WHERE \"id\" > $3"
        );
        assert_eq!(
            statement.params,
            vec![Value::Int(5), Value::Text("Oslo".into()), Value::Int(10)]
        );
    }

    #[test]
    fn test_update_nested_arithmetic_keeps_grouping() {
        let registry = MappingRegistry::new();
        let statement = UpdateCommand::<Order>::with_registry(&registry)
            .set("total", Expr::prop("total").sub(Expr::lit(10_i64).sub(3_i64)))
            .statement(Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE \"orders\" SET \"total\" = \"total\" - (?1 - ?2)"
        );
    }

    #[test]
    fn test_update_with_limit_per_dialect() {
        let registry = MappingRegistry::new();
        let command = UpdateCommand::<Order>::with_registry(&registry)
            .set("total", 0)
            .filter(Expr::prop("total").lt(3))
            .limit(2);

        assert_eq!(
            command.statement(Dialect::Sqlite).unwrap().sql,
            "UPDATE \"orders\" SET \"total\" = ?1 WHERE rowid IN \
             (SELECT rowid FROM \"orders\" WHERE \"total\" < ?2 ORDER BY rowid LIMIT 2)"
        );
        assert_eq!(
            command.statement(Dialect::Mysql).unwrap().sql,
            "UPDATE `orders` SET `total` = ? WHERE `total` < ? ORDER BY `id` LIMIT 2"
        );
    }

    #[test]
    fn test_repeated_filters_are_conjoined() {
        let registry = MappingRegistry::new();
        let statement = UpdateCommand::<Order>::with_registry(&registry)
            .set("total", 1)
            .filter(Expr::prop("id").ge(1))
            .filter(Expr::prop("shipping.city").is_null())
            .statement(Dialect::Sqlite)
            .unwrap();
        assert!(
            statement
                .sql
                .ends_with("WHERE \"id\" >= ?2 AND \"shipping_city\" IS NULL")
        );
    }

    #[test]
    fn test_update_rejections() {
        let registry = MappingRegistry::new();
        let nothing = UpdateCommand::<Order>::with_registry(&registry);
        assert_eq!(
            nothing.statement(Dialect::Sqlite).unwrap_err().command_kind(),
            Some(CommandErrorKind::EmptySelection)
        );

        let zero = UpdateCommand::<Order>::with_registry(&registry)
            .set("total", 1)
            .limit(0);
        assert_eq!(
            zero.statement(Dialect::Sqlite).unwrap_err().command_kind(),
            Some(CommandErrorKind::InvalidLimit)
        );

        let unmapped = UpdateCommand::<Order>::with_registry(&registry).set("note", "x");
        assert_eq!(
            unmapped.statement(Dialect::Sqlite).unwrap_err().mapping_kind(),
            Some(MappingErrorKind::UnmappedProperty)
        );
    }

    #[test]
    fn test_update_execute_returns_affected() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = MockConnection::new(Dialect::Sqlite);
        conn.push_affected(2);
        let registry = MappingRegistry::new();

        rt.block_on(async {
            let n = unwrap_outcome(
                UpdateCommand::<Order>::with_registry(&registry)
                    .set("total", 9)
                    .limit(2)
                    .execute(&cx, &conn)
                    .await,
            );
            assert_eq!(n, 2);
        });
        assert_eq!(conn.calls().len(), 1);
    }
}
