//! Batch commands for BatchModel Rust.
//!
//! `batchmodel-query` turns a resolved entity mapping into set-based SQL:
//!
//! - **Insert**: multi-row `INSERT .. VALUES` with optional `RETURNING` write-back
//! - **Update / Delete**: one statement per call, optionally limited
//! - **Merge**: native `MERGE` on Postgres, an `UPDATE .. FROM` plus
//!   `INSERT .. SELECT` emulation on SQLite
//! - **Page**: ordered `LIMIT/OFFSET` reads with a windowed total
//!
//! Batches are split so no statement exceeds the connection's parameter
//! ceiling. Commands run through the `Connection` trait from
//! `batchmodel-core`; most users reach them through the `batchmodel`
//! repository.

pub mod chunk;
pub mod delete;
pub mod expr;
pub mod insert;
pub mod merge;
pub mod page;
pub mod property_set;
pub mod update;

mod output;
mod scope;

#[cfg(test)]
mod testing;

pub use chunk::{BatchOptions, Statement, chunk_ranges};
pub use delete::DeleteCommand;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use insert::{InsertCommand, InsertPlan};
pub use merge::{MergeChunk, MergeCommand, MergePlan, MergeStep, MergeStepKind, MergeType};
pub use page::{Page, PageCommand, PageQuery};
pub use property_set::PropertySet;
pub use update::UpdateCommand;
