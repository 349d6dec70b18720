//! Core types and traits for BatchModel Rust.
//!
//! This crate provides the foundations shared by the mapping layer and the
//! batch commands:
//!
//! - `Value` / `Row` for parameters and results
//! - `Entity` / `Reflect` for field-level access to entities without runtime reflection
//! - `ColumnCatalog` for column metadata, with the convention-based `ModelCatalog`
//! - `Connection` trait consumed by batch commands
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod catalog;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod path;
pub mod row;
pub mod types;
pub mod value;

pub use catalog::{CatalogColumn, ColumnCatalog, ModelCatalog, ScopeHandle};
pub use connection::Connection;
pub use dialect::Dialect;
pub use entity::{
    Entity, Enumeration, PropertyInfo, PropertyKind, PropertyValue, Reflect,
    enumeration_from_value,
};
pub use error::{
    ChunkError, CommandError, CommandErrorKind, ConfigError, ConnectionError,
    ConnectionErrorKind, Error, MappingError, MappingErrorKind, QueryError, QueryErrorKind,
    Result, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::SqlType;
pub use value::Value;
