//! The host executor consumed by batch commands.
//!
//! Batch commands never manage connections or transactions themselves; they
//! only need something that can run a parameterized statement and report
//! either the affected-row count or the rows it produced. All operations
//! take a `Cx` context so cancellation and timeouts stay with the host.

use crate::dialect::Dialect;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// A database connection capable of executing batch statements.
///
/// Implementations must be `Send + Sync` so one connection can serve
/// concurrent batch operations from independent call sites.
///
/// # Example
///
/// ```rust,ignore
/// let affected = conn.execute(&cx, "DELETE FROM logs WHERE level = $1", &[Value::Int(0)]).await;
/// let rows = conn.query(&cx, "SELECT id FROM logs", &[]).await;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    ///
    /// Statements with a RETURNING clause are run through this method.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE, MERGE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Parameter ceiling for one statement.
    fn max_params(&self) -> usize {
        self.dialect().max_params()
    }
}
