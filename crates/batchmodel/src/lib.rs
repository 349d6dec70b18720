//! BatchModel Rust - set-based batch operations over mapped entities.
//!
//! Entities derive their column layout once; batch commands then turn whole
//! slices of entities (or a predicate) into a handful of statements:
//!
//! - Multi-row INSERT with generated values written back into the entities
//! - UPDATE and DELETE by predicate, optionally limited
//! - MERGE (insert-or-update) keyed by compare properties
//! - Ordered paging with a total row count
//!
//! # Quick Start
//!
//! ```ignore
//! use batchmodel::prelude::*;
//!
//! #[derive(Entity, Debug, Default)]
//! #[entity(table = "orders")]
//! struct Order {
//!     id: i64,
//!     total: i64,
//!     #[entity(owned)]
//!     shipping: Option<Address>,
//! }
//!
//! #[derive(Reflect, Debug, Default)]
//! struct Address {
//!     city: String,
//! }
//!
//! async fn example(cx: &Cx, conn: &impl Connection, orders: &mut [Order]) {
//!     let repo = Repository::new(conn);
//!
//!     // Insert, reading generated ids back
//!     repo.insert::<Order>()
//!         .insert(PropertySet::all().exclude("id"))
//!         .output(PropertySet::none().include("id"))
//!         .execute(cx, conn, orders)
//!         .await;
//!
//!     // Bump totals for one city
//!     repo.update_many::<Order>(Expr::prop("shipping.city").eq("Oslo"))
//!         .set("total", Expr::prop("total").add(1))
//!         .execute(cx, conn)
//!         .await;
//!
//!     // Second page of ten
//!     let page = repo
//!         .find_page::<Order>(PageRequest::new(1, 10).order_by("id", true).with_total(true))
//!         .execute(cx, conn)
//!         .await;
//! }
//! ```
//!
//! Statements are split so none exceeds the connection's bound-parameter
//! limit; see [`BatchConfig`] to lower it.

pub use batchmodel_core::{
    // Core traits and types
    CatalogColumn,
    ColumnCatalog,
    CommandErrorKind,
    Connection,
    Cx,
    Dialect,
    Entity,
    Enumeration,
    Error,
    MappingErrorKind,
    ModelCatalog,
    Outcome,
    Reflect,
    Result,
    Row,
    ScopeHandle,
    SqlType,
    Value,
};

pub use batchmodel_macros::{Entity, Enumeration, Reflect};

pub use batchmodel_mapping::{EntityMapping, MappingNode, MappingRegistry};

pub use batchmodel_query::{
    BatchOptions, DeleteCommand, Expr, InsertCommand, MergeCommand, MergeType, Page,
    PageCommand, PropertySet, UpdateCommand,
};

pub mod config;
pub mod repository;

pub use config::{BatchConfig, RegistryChoice};
pub use repository::{PageRequest, Repository};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use batchmodel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BatchConfig,
        // Core traits and types
        Connection,
        Cx,
        Dialect,
        Entity,
        Enumeration,
        Error,
        // Commands
        Expr,
        MergeType,
        Outcome,
        Page,
        PageRequest,
        PropertySet,
        Reflect,
        RegistryChoice,
        Repository,
        Result,
        Row,
        Value,
    };
}
