//! Entity mapping for BatchModel Rust.
//!
//! `batchmodel-mapping` turns an entity type into the list of columns a
//! batch statement works with:
//!
//! - `MappingRegistry` resolves and caches one mapping tree per entity type
//! - `filter` / `flatten` / `reorder` narrow a copy of the tree per call
//! - `extract` / `RowExtractor` read values off entities, `assign` writes them back

pub mod extract;
pub mod filter;
pub mod node;
pub mod resolver;

pub use extract::{RowExtractor, assign, extract};
pub use filter::{Selection, filter, flatten, reorder, select};
pub use node::{EntityMapping, MappingNode, NodeKind, PropertyAccessor};
pub use resolver::{MappingRegistry, build_mapping, mapped_leaf_count};
