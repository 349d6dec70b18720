//! Ordered, windowed reads with an optional total count.

use std::marker::PhantomData;

use asupersync::{Cx, Outcome};
use batchmodel_core::{
    CommandError, CommandErrorKind, Connection, Dialect, Entity, Error, Result, Value,
};
use batchmodel_mapping::{EntityMapping, MappingNode, MappingRegistry};

use crate::expr::Expr;
use crate::output::write_row;
use crate::property_set::PropertySet;

const TOTAL_ROWS: &str = "_total_rows";

/// One page of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<E> {
    pub data: Vec<E>,
    /// Rows matching the filter across all pages, when requested
    pub total_rows: Option<u64>,
    pub skip: u64,
    pub take: u64,
}

impl<E> Page<E> {
    /// Number of pages of `take` rows, when the total is known.
    pub fn page_count(&self) -> Option<u64> {
        self.total_rows.map(|total| total.div_ceil(self.take.max(1)))
    }
}

/// Generated SQL of a page read.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub sql: String,
    pub params: Vec<Value>,
    /// Fallback count for an empty page, when a total is requested
    pub count: Option<(String, Vec<Value>)>,
}

/// Read a page of entities.
///
/// # Example
///
/// ```ignore
/// let page = PageCommand::<Order>::new()
///     .filter(Expr::prop("total").gt(100))
///     .order_by("id", true)
///     .page(1, 10)
///     .with_total(true)
///     .execute(&cx, &conn)
///     .await;
/// ```
#[derive(Debug)]
pub struct PageCommand<'r, E: Entity> {
    registry: &'r MappingRegistry,
    columns: PropertySet,
    predicate: Option<Expr>,
    order_by: Vec<(String, bool)>,
    skip: u64,
    take: u64,
    with_total: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PageCommand<'static, E> {
    pub fn new() -> Self {
        Self::with_registry(MappingRegistry::global())
    }
}

impl<E: Entity> Default for PageCommand<'static, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, E: Entity> PageCommand<'r, E> {
    pub fn with_registry(registry: &'r MappingRegistry) -> Self {
        Self {
            registry,
            columns: PropertySet::all(),
            predicate: None,
            order_by: Vec::new(),
            skip: 0,
            take: 0,
            with_total: false,
            _entity: PhantomData,
        }
    }

    /// Properties loaded into each entity. Defaults to every mapped property.
    pub fn columns(mut self, set: PropertySet) -> Self {
        self.columns = set;
        self
    }

    /// Restrict the rows. Repeated filters are combined with AND.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add a sort key. At least one is required.
    pub fn order_by(mut self, path: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((path.into(), ascending));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.take = take;
        self
    }

    /// Zero-based page `index` of `size` rows.
    pub fn page(self, index: u64, size: u64) -> Self {
        self.skip(index.saturating_mul(size)).take(size)
    }

    pub fn with_total(mut self, with_total: bool) -> Self {
        self.with_total = with_total;
        self
    }

    fn check(&self) -> Result<()> {
        if self.take == 0 {
            return Err(paging_error("take must be greater than zero"));
        }
        if self.order_by.is_empty() {
            return Err(paging_error("paging requires at least one order_by"));
        }
        Ok(())
    }

    fn where_clause(
        &self,
        dialect: Dialect,
        mapping: &EntityMapping,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        Ok(match &self.predicate {
            Some(p) => format!(" WHERE {}", p.build(dialect, mapping, params)?),
            None => String::new(),
        })
    }

    /// Build the page query for `dialect`.
    pub fn query(&self, dialect: Dialect) -> Result<PageQuery> {
        self.prepare(dialect).map(|(_, query)| query)
    }

    fn prepare(&self, dialect: Dialect) -> Result<(Vec<MappingNode>, PageQuery)> {
        self.check()?;
        let mapping = self.registry.resolve::<E>()?;
        let columns = self.columns.select(&mapping)?;
        if columns.is_empty() {
            return Err(Error::Command(CommandError::new(
                CommandErrorKind::EmptySelection,
                format!("page of {} selects no columns", mapping.table),
            )));
        }
        let query = self.query_for(dialect, &mapping, &columns)?;
        Ok((columns, query))
    }

    fn query_for(
        &self,
        dialect: Dialect,
        mapping: &EntityMapping,
        columns: &[MappingNode],
    ) -> Result<PageQuery> {
        let table = dialect.quote_identifier(mapping.table);
        let mut selected: Vec<String> = columns
            .iter()
            .filter_map(MappingNode::mapped_column)
            .map(|c| dialect.quote_identifier(c))
            .collect();
        if self.with_total {
            selected.push(format!(
                "COUNT(*) OVER() AS {}",
                dialect.quote_identifier(TOTAL_ROWS)
            ));
        }

        let order = self
            .order_by
            .iter()
            .map(|(path, ascending)| {
                let column = dialect.quote_identifier(mapping.column_for(path)?);
                Ok(format!("{column} {}", if *ascending { "ASC" } else { "DESC" }))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut params = Vec::new();
        let filter = self.where_clause(dialect, mapping, &mut params)?;
        let sql = format!(
            "SELECT {} FROM {table}{filter} ORDER BY {} LIMIT {} OFFSET {}",
            selected.join(", "),
            order.join(", "),
            self.take,
            self.skip
        );

        let count = if self.with_total {
            let mut count_params = Vec::new();
            let filter = self.where_clause(dialect, mapping, &mut count_params)?;
            Some((format!("SELECT COUNT(*) FROM {table}{filter}"), count_params))
        } else {
            None
        };

        Ok(PageQuery { sql, params, count })
    }

    /// Read the page.
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = E::TABLE_NAME, offset = self.skip, limit = self.take))]
    pub async fn execute<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Page<E>, Error> {
        let (columns, query) = match self.prepare(conn.dialect()) {
            Ok(prepared) => prepared,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(
            table = E::TABLE_NAME,
            params = query.params.len(),
            with_total = self.with_total,
            "Executing page query"
        );

        let rows = match conn.query(cx, &query.sql, &query.params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut data = Vec::with_capacity(rows.len());
        let mut total_rows = None;
        for row in &rows {
            let mut entity = E::default();
            if let Err(e) = write_row(&mut entity, &columns, row, 0) {
                return Outcome::Err(e);
            }
            data.push(entity);
            if self.with_total && total_rows.is_none() {
                total_rows = row
                    .get_named::<i64>(TOTAL_ROWS)
                    .ok()
                    .and_then(|n| u64::try_from(n).ok());
            }
        }

        if let (None, Some((sql, params))) = (total_rows, &query.count) {
            tracing::debug!(table = E::TABLE_NAME, "Page is empty, counting separately");
            let count = match conn.query(cx, sql, params).await {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            total_rows = Some(
                count
                    .first()
                    .and_then(|row| row.get(0))
                    .and_then(Value::as_i64)
                    .and_then(|n| u64::try_from(n).ok())
                    .unwrap_or(0),
            );
        }

        Outcome::Ok(Page {
            data,
            total_rows,
            skip: self.skip,
            take: self.take,
        })
    }
}

fn paging_error(message: &str) -> Error {
    Error::Command(CommandError::new(CommandErrorKind::InvalidPaging, message))
}
