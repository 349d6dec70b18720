//! Batch MERGE: insert-or-update keyed by compare properties.
//!
//! Postgres runs a native `MERGE` per chunk. SQLite has no `MERGE`, so each
//! chunk is emulated with an `UPDATE .. FROM` followed by an
//! `INSERT .. SELECT .. WHERE NOT EXISTS`, both reading the chunk from a
//! `VALUES` common table expression. Every source row carries its
//! chunk-local index in a trailing `_row_index` column.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Range;

use asupersync::{Cx, Outcome};
use batchmodel_core::{
    CommandError, CommandErrorKind, Connection, Dialect, Entity, Error, Result, Row, Value,
};
use batchmodel_mapping::{EntityMapping, MappingNode, MappingRegistry, RowExtractor};
use serde::{Deserialize, Serialize};

use crate::chunk::{BatchOptions, chunk_failure, chunk_ranges};
use crate::insert::returning_clause;
use crate::output::{compare_key, require_count, write_row};
use crate::property_set::{PropertySet, require_subset};

const ROW_INDEX: &str = "_row_index";
const SOURCE: &str = "_source";

/// Which branches of the merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeType {
    /// Insert source rows with no match, leave matches untouched
    Insert,
    /// Update matches, drop source rows with no match
    Update,
    /// Both
    #[default]
    Upsert,
}

impl MergeType {
    pub const fn inserts(self) -> bool {
        matches!(self, MergeType::Insert | MergeType::Upsert)
    }

    pub const fn updates(self) -> bool {
        matches!(self, MergeType::Update | MergeType::Upsert)
    }
}

/// What a generated statement does, which decides how its result is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStepKind {
    /// Native MERGE; output rows lead with the row index
    Merge,
    /// Update branch; output rows lead with the compare values
    Update,
    /// Row indexes of source rows without a match
    Unmatched,
    /// Insert branch; output rows follow the unmatched rows in order
    Insert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeStep {
    pub kind: MergeStepKind,
    pub sql: String,
}

/// Statements for one chunk. All steps bind the same parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeChunk {
    pub rows: Range<usize>,
    pub params: Vec<Value>,
    pub steps: Vec<MergeStep>,
}

/// Resolved property sets of a merge.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub mapping: EntityMapping,
    pub source: Vec<MappingNode>,
    pub compare: Vec<MappingNode>,
    pub insert: Vec<MappingNode>,
    pub update: Vec<MappingNode>,
    pub output: Vec<MappingNode>,
}

/// Insert-or-update many entities matched on compare properties.
///
/// # Example
///
/// ```ignore
/// let affected = MergeCommand::<Order>::new()
///     .compare(PropertySet::none().include("id"))
///     .output(PropertySet::none().include("total"))
///     .execute(&cx, &conn, &mut orders)
///     .await;
/// ```
#[derive(Debug)]
pub struct MergeCommand<'r, E: Entity> {
    registry: &'r MappingRegistry,
    options: BatchOptions,
    merge_type: MergeType,
    source: PropertySet,
    compare: PropertySet,
    insert: Option<PropertySet>,
    update: Option<PropertySet>,
    output: PropertySet,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MergeCommand<'static, E> {
    pub fn new() -> Self {
        Self::with_registry(MappingRegistry::global())
    }
}

impl<E: Entity> Default for MergeCommand<'static, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r, E: Entity> MergeCommand<'r, E> {
    pub fn with_registry(registry: &'r MappingRegistry) -> Self {
        Self {
            registry,
            options: BatchOptions::default(),
            merge_type: MergeType::default(),
            source: PropertySet::all(),
            compare: PropertySet::none(),
            insert: None,
            update: None,
            output: PropertySet::none(),
            _entity: PhantomData,
        }
    }

    pub fn options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn merge_type(mut self, merge_type: MergeType) -> Self {
        self.merge_type = merge_type;
        self
    }

    /// Properties sent to the database. Defaults to every mapped property.
    pub fn source(mut self, set: PropertySet) -> Self {
        self.source = set;
        self
    }

    /// Properties that identify a matching row. Required.
    pub fn compare(mut self, set: PropertySet) -> Self {
        self.compare = set;
        self
    }

    /// Properties written for new rows. Defaults to the source properties.
    pub fn insert(mut self, set: PropertySet) -> Self {
        self.insert = Some(set);
        self
    }

    /// Properties written on matches. Defaults to the source properties
    /// that are not compared on.
    pub fn update(mut self, set: PropertySet) -> Self {
        self.update = Some(set);
        self
    }

    /// Properties read back into the entities. Defaults to none.
    pub fn output(mut self, set: PropertySet) -> Self {
        self.output = set;
        self
    }

    /// Resolve and validate every property set for `dialect`.
    pub fn plan(&self, dialect: Dialect) -> Result<MergePlan> {
        if !matches!(dialect, Dialect::Postgres | Dialect::Sqlite) {
            return Err(command_error(
                CommandErrorKind::UnsupportedDialect,
                format!("merge is not supported on {:?}", dialect),
            ));
        }
        let mapping = self.registry.resolve::<E>()?;

        let source = self.source.select(&mapping)?;
        if source.is_empty() {
            return Err(command_error(
                CommandErrorKind::EmptySelection,
                format!("merge into {} has no source properties", mapping.table),
            ));
        }
        let compare = self.compare.select(&mapping)?;
        if compare.is_empty() {
            return Err(command_error(
                CommandErrorKind::EmptySelection,
                format!("merge into {} has no compare properties", mapping.table),
            ));
        }
        let insert = match &self.insert {
            Some(set) => set.select(&mapping)?,
            None => source.clone(),
        };
        let update = match &self.update {
            Some(set) => set.select(&mapping)?,
            None => source
                .iter()
                .filter(|s| !compare.iter().any(|c| c.default_name == s.default_name))
                .cloned()
                .collect(),
        };
        require_subset(&mapping, "compare", &compare, &source)?;
        require_subset(&mapping, "insert", &insert, &source)?;
        require_subset(&mapping, "update", &update, &source)?;

        if self.merge_type.inserts() && insert.is_empty() {
            return Err(command_error(
                CommandErrorKind::EmptySelection,
                format!("merge into {} inserts no properties", mapping.table),
            ));
        }
        if self.merge_type == MergeType::Update && update.is_empty() {
            return Err(command_error(
                CommandErrorKind::EmptySelection,
                format!("merge into {} updates no properties", mapping.table),
            ));
        }
        let output = self.output.select(&mapping)?;

        Ok(MergePlan {
            mapping,
            source,
            compare,
            insert,
            update,
            output,
        })
    }

    /// Generate the chunked statements for `entities`.
    pub fn statements(
        &self,
        plan: &MergePlan,
        dialect: Dialect,
        connection_max: usize,
        entities: &[E],
    ) -> Vec<MergeChunk> {
        let per_chunk = self
            .options
            .rows_per_chunk(connection_max, plan.source.len());
        let mut extractor = RowExtractor::new(&plan.mapping, &plan.source);

        chunk_ranges(entities.len(), per_chunk)
            .into_iter()
            .map(|rows| {
                let mut params = Vec::with_capacity(rows.len() * plan.source.len());
                let values = values_list(
                    dialect,
                    &plan.source,
                    &mut extractor,
                    &entities[rows.clone()],
                    &mut params,
                );
                let steps = match dialect {
                    Dialect::Postgres => vec![native_merge(self.merge_type, plan, dialect, &values)],
                    _ => emulated_merge(self.merge_type, plan, dialect, &values),
                };
                MergeChunk {
                    rows,
                    params,
                    steps,
                }
            })
            .collect()
    }

    /// Merge `entities` and return inserted plus updated rows.
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
        let chunks = self.statements(&plan, dialect, conn.max_params(), entities);
        let total = chunks.len();
        let mut affected = 0u64;

        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::debug!(
                table = plan.mapping.table,
                chunk = index,
                rows = chunk.rows.len(),
                params = chunk.params.len(),
                steps = chunk.steps.len(),
                "Executing batch merge"
            );
            let batch = &mut entities[chunk.rows.clone()];
            let mut chunk_affected = 0u64;
            let mut unmatched: Vec<usize> = Vec::new();

            for step in &chunk.steps {
                let reads_rows =
                    !plan.output.is_empty() || step.kind == MergeStepKind::Unmatched;
                if !reads_rows {
                    match conn.execute(cx, &step.sql, &chunk.params).await {
                        Outcome::Ok(n) => chunk_affected += n,
                        Outcome::Err(e) => {
                            return Outcome::Err(chunk_failure(e, index, total, affected));
                        }
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                    continue;
                }

                let rows = match conn.query(cx, &step.sql, &chunk.params).await {
                    Outcome::Ok(rows) => rows,
                    Outcome::Err(e) => {
                        return Outcome::Err(chunk_failure(e, index, total, affected));
                    }
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                let result = match step.kind {
                    MergeStepKind::Merge => write_by_index(&plan, batch, &rows),
                    MergeStepKind::Update => write_by_compare(&plan, batch, &rows),
                    MergeStepKind::Unmatched => rows
                        .iter()
                        .map(row_index)
                        .collect::<Result<Vec<_>>>()
                        .map(|found| {
                            unmatched = found;
                        }),
                    MergeStepKind::Insert => {
                        require_count(plan.mapping.table, unmatched.len(), rows.len()).and_then(
                            |()| {
                                unmatched.iter().zip(&rows).try_for_each(|(&i, row)| {
                                    match batch.get_mut(i) {
                                        Some(entity) => write_row(entity, &plan.output, row, 0),
                                        None => Err(row_index_error(i)),
                                    }
                                })
                            },
                        )
                    }
                };
                if let Err(e) = result {
                    return Outcome::Err(e);
                }
                if step.kind != MergeStepKind::Unmatched {
                    chunk_affected += rows.len() as u64;
                }
            }
            affected += chunk_affected;
        }

        Outcome::Ok(affected)
    }
}

fn command_error(kind: CommandErrorKind, message: String) -> Error {
    Error::Command(CommandError::new(kind, message))
}

fn row_index_error(index: usize) -> Error {
    command_error(
        CommandErrorKind::OutputMismatch,
        format!("returned row index {index} is outside the chunk"),
    )
}

fn row_index(row: &Row) -> Result<usize> {
    row.get(0)
        .and_then(Value::as_i64)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| {
            command_error(
                CommandErrorKind::OutputMismatch,
                "returned row has no row index".to_string(),
            )
        })
}

fn write_by_index<E: Entity>(plan: &MergePlan, batch: &mut [E], rows: &[Row]) -> Result<()> {
    for row in rows {
        let index = row_index(row)?;
        let entity = batch.get_mut(index).ok_or_else(|| row_index_error(index))?;
        write_row(entity, &plan.output, row, 1)?;
    }
    Ok(())
}

/// Match update output back to every source row with the same compare key.
fn write_by_compare<E: Entity>(plan: &MergePlan, batch: &mut [E], rows: &[Row]) -> Result<()> {
    let mut extractor = RowExtractor::new(&plan.mapping, &plan.compare);
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, entity) in batch.iter().enumerate() {
        let key = compare_key(&extractor.row(entity));
        by_key.entry(key).or_default().push(i);
    }
    for row in rows {
        let key = compare_key(row.values().take(plan.compare.len()));
        let Some(targets) = by_key.get(&key) else {
            tracing::warn!(
                table = plan.mapping.table,
                "Updated row matches no source row"
            );
            continue;
        };
        for &i in targets {
            write_row(&mut batch[i], &plan.output, row, plan.compare.len())?;
        }
    }
    Ok(())
}

fn quoted(dialect: Dialect, nodes: &[MappingNode]) -> Vec<String> {
    nodes
        .iter()
        .filter_map(MappingNode::mapped_column)
        .map(|c| dialect.quote_identifier(c))
        .collect()
}

/// `(p1, p2, 0), (p3, p4, 1)` with values appended to `params`.
fn values_list<E: Entity>(
    dialect: Dialect,
    source: &[MappingNode],
    extractor: &mut RowExtractor,
    entities: &[E],
    params: &mut Vec<Value>,
) -> String {
    entities
        .iter()
        .enumerate()
        .map(|(i, entity)| {
            let mut cells: Vec<String> = source
                .iter()
                .zip(extractor.row(entity))
                .map(|(leaf, value)| {
                    params.push(value);
                    let placeholder = dialect.placeholder(params.len());
                    match (dialect, leaf.configured_type()) {
                        (Dialect::Postgres, Some(ty)) => {
                            format!("CAST({placeholder} AS {})", ty.sql_name())
                        }
                        _ => placeholder,
                    }
                })
                .collect();
            cells.push(i.to_string());
            format!("({})", cells.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn native_merge(merge_type: MergeType, plan: &MergePlan, dialect: Dialect, values: &str) -> MergeStep {
    let target = dialect.quote_identifier("t");
    let source = dialect.quote_identifier("s");
    let row_index = dialect.quote_identifier(ROW_INDEX);
    let on = quoted(dialect, &plan.compare)
        .iter()
        .map(|c| format!("{target}.{c} = {source}.{c}"))
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut sql = format!(
        "MERGE INTO {} AS {target} USING (VALUES {values}) AS {source}({}, {row_index}) ON {on}",
        dialect.quote_identifier(plan.mapping.table),
        quoted(dialect, &plan.source).join(", "),
    );
    if merge_type.updates() && !plan.update.is_empty() {
        let sets: Vec<_> = quoted(dialect, &plan.update)
            .iter()
            .map(|c| format!("{c} = {source}.{c}"))
            .collect();
        sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", sets.join(", ")));
    }
    if merge_type.inserts() {
        let columns = quoted(dialect, &plan.insert);
        let values: Vec<_> = columns.iter().map(|c| format!("{source}.{c}")).collect();
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ));
    }
    if !plan.output.is_empty() {
        let mut returning = vec![format!("{source}.{row_index}")];
        returning.extend(
            quoted(dialect, &plan.output)
                .iter()
                .map(|c| format!("{target}.{c}")),
        );
        sql.push_str(&format!(" RETURNING {}", returning.join(", ")));
    }

    MergeStep {
        kind: MergeStepKind::Merge,
        sql,
    }
}

fn emulated_merge(
    merge_type: MergeType,
    plan: &MergePlan,
    dialect: Dialect,
    values: &str,
) -> Vec<MergeStep> {
    let table = dialect.quote_identifier(plan.mapping.table);
    let source = dialect.quote_identifier(SOURCE);
    let row_index = dialect.quote_identifier(ROW_INDEX);
    let cte = format!(
        "WITH {source}({}, {row_index}) AS (VALUES {values})",
        quoted(dialect, &plan.source).join(", ")
    );
    let matches = quoted(dialect, &plan.compare)
        .iter()
        .map(|c| format!("{table}.{c} = {source}.{c}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let not_exists = format!("NOT EXISTS (SELECT 1 FROM {table} WHERE {matches})");

    let mut steps = Vec::new();
    if merge_type.updates() && !plan.update.is_empty() {
        let sets: Vec<_> = quoted(dialect, &plan.update)
            .iter()
            .map(|c| format!("{c} = {source}.{c}"))
            .collect();
        let mut sql = format!(
            "{cte} UPDATE {table} SET {} FROM {source} WHERE {matches}",
            sets.join(", ")
        );
        if !plan.output.is_empty() {
            let mut returning = quoted(dialect, &plan.compare);
            returning.extend(quoted(dialect, &plan.output));
            sql.push_str(&format!(" RETURNING {}", returning.join(", ")));
        }
        steps.push(MergeStep {
            kind: MergeStepKind::Update,
            sql,
        });
    }
    if merge_type.inserts() {
        if !plan.output.is_empty() {
            steps.push(MergeStep {
                kind: MergeStepKind::Unmatched,
                sql: format!(
                    "{cte} SELECT {row_index} FROM {source} WHERE {not_exists} ORDER BY {row_index}"
                ),
            });
        }
        let columns = quoted(dialect, &plan.insert);
        let selected: Vec<_> = columns.iter().map(|c| format!("{source}.{c}")).collect();
        steps.push(MergeStep {
            kind: MergeStepKind::Insert,
            sql: format!(
                "{cte} INSERT INTO {table} ({}) SELECT {} FROM {source} WHERE {not_exists} ORDER BY {row_index}{}",
                columns.join(", "),
                selected.join(", "),
                returning_clause(dialect, &plan.output)
            ),
        });
    }
    steps
}
