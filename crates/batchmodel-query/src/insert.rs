//! Batch INSERT with optional output capture.

use std::marker::PhantomData;

use asupersync::{Cx, Outcome};
use batchmodel_core::{
    CommandError, CommandErrorKind, Connection, Dialect, Entity, Error, Result, Value,
};
use batchmodel_mapping::{EntityMapping, MappingNode, MappingRegistry, RowExtractor};

use crate::chunk::{BatchOptions, Statement, chunk_failure, chunk_ranges};
use crate::output::{require_count, write_row};
use crate::property_set::PropertySet;

/// Multi-row INSERT for many entities.
///
/// # Example
///
/// ```ignore
/// let inserted = InsertCommand::<Order>::new()
///     .insert(PropertySet::all().exclude("id"))
///     .output(PropertySet::none().include("id"))
///     .execute(&cx, &conn, &mut orders)
///     .await;
/// ```
#[derive(Debug)]
pub struct InsertCommand<'r, E: Entity> {
    registry: &'r MappingRegistry,
    options: BatchOptions,
    insert: PropertySet,
    output: PropertySet,
    _entity: PhantomData<fn() -> E>,
}

/// Resolved columns of an insert.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub mapping: EntityMapping,
    pub columns: Vec<MappingNode>,
    pub output: Vec<MappingNode>,
}

impl<E: Entity> InsertCommand<'static, E> {
    /// Create an insert resolved through the global registry.
    pub fn new() -> Self {
        Self::with_registry(MappingRegistry::global())
    }
}

impl<E: Entity> Default for InsertCommand<'static, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, E: Entity> InsertCommand<'r, E> {
    pub fn with_registry(registry: &'r MappingRegistry) -> Self {
        Self {
            registry,
            options: BatchOptions::default(),
            insert: PropertySet::all(),
            output: PropertySet::none(),
            _entity: PhantomData,
        }
    }

    pub fn options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Properties written by the insert. Defaults to every mapped property.
    pub fn insert(mut self, set: PropertySet) -> Self {
        self.insert = set;
        self
    }

    /// Properties read back from the inserted rows. Defaults to none.
    pub fn output(mut self, set: PropertySet) -> Self {
        self.output = set;
        self
    }

    /// Resolve and validate the columns for `dialect`.
    pub fn plan(&self, dialect: Dialect) -> Result<InsertPlan> {
        let mapping = self.registry.resolve::<E>()?;
        let columns = self.insert.select(&mapping)?;
        if columns.is_empty() {
            return Err(Error::Command(CommandError::new(
                CommandErrorKind::EmptySelection,
                format!("insert into {} selects no columns", mapping.table),
            )));
        }
        let output = self.output.select(&mapping)?;
        if !output.is_empty() && !dialect.supports_returning() {
            return Err(Error::Command(CommandError::new(
                CommandErrorKind::UnsupportedDialect,
                format!("{:?} cannot return inserted values", dialect),
            )));
        }
        Ok(InsertPlan {
            mapping,
            columns,
            output,
        })
    }

    /// Generate the chunked statements for `entities`.
    pub fn statements(
        &self,
        plan: &InsertPlan,
        dialect: Dialect,
        connection_max: usize,
        entities: &[E],
    ) -> Vec<Statement> {
        let per_chunk = self
            .options
            .rows_per_chunk(connection_max, plan.columns.len());
        let column_list = plan
            .columns
            .iter()
            .filter_map(MappingNode::mapped_column)
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let returning = returning_clause(dialect, &plan.output);
        let table = dialect.quote_identifier(plan.mapping.table);
        let mut extractor = RowExtractor::new(&plan.mapping, &plan.columns);

        chunk_ranges(entities.len(), per_chunk)
            .into_iter()
            .map(|rows| {
                let mut params: Vec<Value> = Vec::with_capacity(rows.len() * plan.columns.len());
                let mut tuples = Vec::with_capacity(rows.len());
                for entity in &entities[rows.clone()] {
                    let values = extractor.row(entity);
                    let placeholders: Vec<_> = values
                        .into_iter()
                        .map(|v| {
                            params.push(v);
                            dialect.placeholder(params.len())
                        })
                        .collect();
                    tuples.push(format!("({})", placeholders.join(", ")));
                }
                Statement {
                    sql: format!(
                        "INSERT INTO {} ({}) VALUES {}{}",
                        table,
                        column_list,
                        tuples.join(", "),
                        returning
                    ),
                    params,
                    rows,
                }
            })
            .collect()
    }

    /// Insert `entities`, writing requested output values back into them.
    ///
    /// Returns the number of inserted rows. An empty slice returns 0
    /// without touching the connection.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, entities), fields(table = E::TABLE_NAME, rows = entities.len()))]
    pub async fn execute<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        entities: &mut [E],
    ) -> Outcome<u64, Error> {
        if entities.is_empty() {
            return Outcome::Ok(0);
        }
        let dialect = conn.dialect();
        let plan = match self.plan(dialect) {
            Ok(plan) => plan,
            Err(e) => return Outcome::Err(e),
        };
        let statements = self.statements(&plan, dialect, conn.max_params(), entities);
        let total = statements.len();
        let mut affected = 0u64;

        for (index, statement) in statements.into_iter().enumerate() {
            tracing::debug!(
                table = plan.mapping.table,
                chunk = index,
                rows = statement.rows.len(),
                params = statement.params.len(),
                "Executing batch insert"
            );

            if plan.output.is_empty() {
                match conn.execute(cx, &statement.sql, &statement.params).await {
                    Outcome::Ok(n) => affected += n,
                    Outcome::Err(e) => {
                        return Outcome::Err(chunk_failure(e, index, total, affected));
                    }
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
                continue;
            }

            let rows = match conn.query(cx, &statement.sql, &statement.params).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => {
                    return Outcome::Err(chunk_failure(e, index, total, affected));
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if let Err(e) = require_count(plan.mapping.table, statement.rows.len(), rows.len()) {
                let written = affected + rows.len() as u64;
                return Outcome::Err(chunk_failure(e, index, total, written));
            }
            for (entity, row) in entities[statement.rows.clone()].iter_mut().zip(&rows) {
                if let Err(e) = write_row(entity, &plan.output, row, 0) {
                    return Outcome::Err(e);
                }
            }
            affected += rows.len() as u64;
        }

        Outcome::Ok(affected)
    }
}

/// ` RETURNING "a", "b"`, or nothing when no output is requested.
pub(crate) fn returning_clause(dialect: Dialect, output: &[MappingNode]) -> String {
    if output.is_empty() {
        return String::new();
    }
    let columns: Vec<_> = output
        .iter()
        .filter_map(MappingNode::mapped_column)
        .map(|c| dialect.quote_identifier(c))
        .collect();
    format!(" RETURNING {}", columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Embedded, MockConnection, Order, unwrap_outcome};
    use asupersync::runtime::RuntimeBuilder;
    use batchmodel_core::Row;

    fn orders(n: i64) -> Vec<Order> {
        (1..=n)
            .map(|i| Order {
                id: 0,
                total: i * 10,
                status: None,
                shipping: (i % 2 == 0).then(|| Embedded {
                    city: format!("city{i}"),
                }),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_insert_sql_shape() {
        let registry = MappingRegistry::new();
        let command = InsertCommand::<Order>::with_registry(&registry)
            .insert(PropertySet::all().exclude("id"));
        let plan = command.plan(Dialect::Postgres).unwrap();
        let statements = command.statements(&plan, Dialect::Postgres, 65_535, &orders(2));

        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO \"orders\" (\"total\", \"status\", \"shipping_city\") \
             VALUES ($1, $2, $3), ($4, $5, $6)"
        );
        assert_eq!(
            statements[0].params,
            vec![
                Value::BigInt(10),
                Value::Null,
                Value::Null,
                Value::BigInt(20),
                Value::Null,
                Value::Text("city2".into()),
            ]
        );
    }

    #[test]
    fn test_insert_chunks_by_parameter_ceiling() {
        let registry = MappingRegistry::new();
        let command = InsertCommand::<Order>::with_registry(&registry)
            .insert(PropertySet::none().include("total").include("id"))
            .options(BatchOptions {
                max_parameters: Some(5),
                max_rows_per_statement: None,
            });
        let plan = command.plan(Dialect::Sqlite).unwrap();
        let statements = command.statements(&plan, Dialect::Sqlite, 32_766, &orders(5));

        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].rows, 0..2);
        assert_eq!(statements[2].rows, 4..5);
        assert_eq!(
            statements[2].sql,
            "INSERT INTO \"orders\" (\"total\", \"id\") VALUES (?1, ?2)"
        );
        assert_eq!(statements[2].params, vec![Value::BigInt(50), Value::BigInt(0)]);
    }

    #[test]
    fn test_insert_plan_errors() {
        let registry = MappingRegistry::new();
        let empty = InsertCommand::<Order>::with_registry(&registry).insert(PropertySet::none());
        assert_eq!(
            empty.plan(Dialect::Postgres).unwrap_err().command_kind(),
            Some(CommandErrorKind::EmptySelection)
        );

        let mysql = InsertCommand::<Order>::with_registry(&registry)
            .output(PropertySet::none().include("id"));
        assert_eq!(
            mysql.plan(Dialect::Mysql).unwrap_err().command_kind(),
            Some(CommandErrorKind::UnsupportedDialect)
        );
        assert!(mysql.plan(Dialect::Sqlite).is_ok());
    }

    #[test]
    fn test_insert_with_output_writes_back() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = MockConnection::new(Dialect::Postgres);
        conn.push_rows(vec![
            Row::new(vec!["id".into()], vec![Value::BigInt(101)]),
            Row::new(vec!["id".into()], vec![Value::BigInt(102)]),
        ]);

        let registry = MappingRegistry::new();
        let command = InsertCommand::<Order>::with_registry(&registry)
            .insert(PropertySet::all().exclude("id"))
            .output(PropertySet::none().include("id"));
        let mut batch = orders(2);

        rt.block_on(async {
            let inserted = unwrap_outcome(command.execute(&cx, &conn, &mut batch).await);
            assert_eq!(inserted, 2);
        });

        assert_eq!(batch[0].id, 101);
        assert_eq!(batch[1].id, 102);
        let calls = conn.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.ends_with(" RETURNING \"id\""));
    }

    #[test]
    fn test_insert_output_short_of_rows_is_an_error() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = MockConnection::new(Dialect::Sqlite);
        conn.push_rows(vec![Row::new(vec!["id".into()], vec![Value::BigInt(7)])]);

        let registry = MappingRegistry::new();
        let command = InsertCommand::<Order>::with_registry(&registry)
            .insert(PropertySet::all().exclude("id"))
            .output(PropertySet::none().include("id"));
        let mut batch = orders(2);

        rt.block_on(async {
            match command.execute(&cx, &conn, &mut batch).await {
                Outcome::Err(e) => {
                    assert_eq!(e.command_kind(), Some(CommandErrorKind::OutputMismatch));
                }
                other => panic!("expected output mismatch, got {other:?}"),
            }
        });
        // nothing is written back from a mismatched result
        assert!(batch.iter().all(|o| o.id == 0));
    }

    #[test]
    fn test_insert_empty_batch_skips_round_trip() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = MockConnection::new(Dialect::Sqlite);
        let registry = MappingRegistry::new();

        rt.block_on(async {
            let mut none: Vec<Order> = Vec::new();
            let n = unwrap_outcome(
                InsertCommand::<Order>::with_registry(&registry)
                    .execute(&cx, &conn, &mut none)
                    .await,
            );
            assert_eq!(n, 0);
        });
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn test_chunk_failure_reports_completed_rows() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = MockConnection::new(Dialect::Sqlite);
        conn.push_affected(2);
        conn.fail_on_call(2);

        let registry = MappingRegistry::new();
        let command = InsertCommand::<Order>::with_registry(&registry)
            .insert(PropertySet::none().include("total"))
            .options(BatchOptions {
                max_parameters: None,
                max_rows_per_statement: Some(2),
            });
        let mut batch = orders(5);

        rt.block_on(async {
            match command.execute(&cx, &conn, &mut batch).await {
                Outcome::Err(Error::Chunk(chunk)) => {
                    assert_eq!(chunk.index, 1);
                    assert_eq!(chunk.total, 3);
                    assert_eq!(chunk.rows_affected, 2);
                }
                other => panic!("expected chunk error, got {other:?}"),
            }
        });
        assert_eq!(conn.calls().len(), 2);
    }
}
