//! Set-based DELETE.

use std::marker::PhantomData;

use asupersync::{Cx, Outcome};
use batchmodel_core::{Connection, Dialect, Entity, Error, Result};
use batchmodel_mapping::MappingRegistry;

use crate::chunk::Statement;
use crate::expr::Expr;
use crate::scope::{check_limit, row_scope};

/// Delete every row matching a predicate in one statement.
#[derive(Debug)]
pub struct DeleteCommand<'r, E: Entity> {
    registry: &'r MappingRegistry,
    predicate: Option<Expr>,
    limit: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> DeleteCommand<'static, E> {
    pub fn new() -> Self {
        Self::with_registry(MappingRegistry::global())
    }
}

impl<E: Entity> Default for DeleteCommand<'static, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, E: Entity> DeleteCommand<'r, E> {
    pub fn with_registry(registry: &'r MappingRegistry) -> Self {
        Self {
            registry,
            predicate: None,
            limit: None,
            _entity: PhantomData,
        }
    }

    /// Restrict the delete. Repeated filters are combined with AND.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Delete at most `n` rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn statement(&self, dialect: Dialect) -> Result<Statement> {
        check_limit(self.limit)?;
        let mapping = self.registry.resolve::<E>()?;
        let mut params = Vec::new();
        let predicate = self
            .predicate
            .as_ref()
            .map(|p| p.build(dialect, &mapping, &mut params))
            .transpose()?;

        Ok(Statement {
            sql: format!(
                "DELETE FROM {}{}",
                dialect.quote_identifier(mapping.table),
                row_scope(dialect, &mapping, predicate.as_deref(), self.limit)
            ),
            params,
            rows: 0..0,
        })
    }

    /// Run the delete and return the number of rows removed.
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
            "Executing batch delete"
        );
        conn.execute(cx, &statement.sql, &statement.params).await
    }
}
