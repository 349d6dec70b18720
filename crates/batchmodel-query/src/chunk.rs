//! Splitting batches so no statement exceeds the parameter ceiling.

use std::ops::Range;

use batchmodel_core::{ChunkError, Error, Value};
use serde::{Deserialize, Serialize};

/// Limits applied when a batch is split into statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Parameter ceiling per statement; the connection's own limit when unset
    pub max_parameters: Option<usize>,
    /// Additional cap on rows per statement
    pub max_rows_per_statement: Option<usize>,
}

impl BatchOptions {
    /// Rows that fit in one statement.
    ///
    /// Always at least one, even when a single row exceeds the ceiling.
    pub fn rows_per_chunk(&self, connection_max: usize, params_per_row: usize) -> usize {
        let ceiling = self.max_parameters.unwrap_or(connection_max);
        let mut rows = (ceiling / params_per_row.max(1)).max(1);
        if let Some(cap) = self.max_rows_per_statement {
            rows = rows.min(cap.max(1));
        }
        rows
    }
}

/// Consecutive row ranges of at most `per_chunk` rows covering `0..len`.
pub fn chunk_ranges(len: usize, per_chunk: usize) -> Vec<Range<usize>> {
    let per_chunk = per_chunk.max(1);
    (0..len)
        .step_by(per_chunk)
        .map(|start| start..(start + per_chunk).min(len))
        .collect()
}

/// One generated statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Input rows covered by this statement
    pub rows: Range<usize>,
}

/// Attach chunk context to a failure.
///
/// A batch that ran as a single statement reports the failure unchanged.
pub(crate) fn chunk_failure(error: Error, index: usize, total: usize, rows_affected: u64) -> Error {
    if total <= 1 {
        return error;
    }
    tracing::debug!(
        chunk = index,
        total = total,
        rows_affected = rows_affected,
        "Batch chunk failed"
    );
    Error::Chunk(ChunkError {
        index,
        total,
        rows_affected,
        source: Box::new(error),
    })
}
