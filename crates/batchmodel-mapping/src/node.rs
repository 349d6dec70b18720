//! The mapping tree.
//!
//! A resolved entity is a tree of [`MappingNode`]s: leaves for properties
//! stored in a column, composites for owned sub-objects whose children are
//! leaves. Trees are cached by the registry and handed out as deep copies,
//! so every command may filter and fill its own copy freely.

use batchmodel_core::error::{MappingError, MappingErrorKind};
use batchmodel_core::path::is_valid_path;
use batchmodel_core::{Error, Result, SqlType, Value};

/// Getter/setter capability for one property.
///
/// Resolved against the parent instance through `Reflect`; for a property
/// of an owned object the parent is the owned object itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAccessor {
    pub name: &'static str,
    /// Values read through this accessor are raw enum discriminants
    pub enumeration: bool,
}

/// Leaf or composite payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf {
        /// `None` when the catalog declares the property without a column
        mapped_column: Option<String>,
        configured_type: Option<SqlType>,
    },
    Composite {
        children: Vec<MappingNode>,
    },
}

/// One property in a mapping tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingNode {
    pub accessor: PropertyAccessor,
    /// Dot-joined path from the root, e.g. `embedded.address`
    pub default_name: String,
    pub kind: NodeKind,
    /// Transient slot filled by the extractor
    pub value: Option<Value>,
}

impl MappingNode {
    pub fn leaf(
        accessor: PropertyAccessor,
        default_name: String,
        mapped_column: Option<String>,
        configured_type: Option<SqlType>,
    ) -> Self {
        Self {
            accessor,
            default_name,
            kind: NodeKind::Leaf {
                mapped_column,
                configured_type,
            },
            value: None,
        }
    }

    pub fn composite(
        accessor: PropertyAccessor,
        default_name: String,
        children: Vec<MappingNode>,
    ) -> Self {
        Self {
            accessor,
            default_name,
            kind: NodeKind::Composite { children },
            value: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Column for a leaf. Always `None` for composites.
    pub fn mapped_column(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Leaf { mapped_column, .. } => mapped_column.as_deref(),
            NodeKind::Composite { .. } => None,
        }
    }

    pub fn configured_type(&self) -> Option<SqlType> {
        match &self.kind {
            NodeKind::Leaf {
                configured_type, ..
            } => *configured_type,
            NodeKind::Composite { .. } => None,
        }
    }

    pub fn children(&self) -> &[MappingNode] {
        match &self.kind {
            NodeKind::Composite { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<MappingNode>> {
        match &mut self.kind {
            NodeKind::Composite { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Root of a resolved mapping tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    /// Rust type name of the entity
    pub entity: &'static str,
    pub table: &'static str,
    /// Leaves first in declaration order, then composites
    pub properties: Vec<MappingNode>,
}

impl EntityMapping {
    /// All leaves in pre-order, mapped or not.
    pub fn leaves(&self) -> Vec<&MappingNode> {
        fn walk<'a>(nodes: &'a [MappingNode], out: &mut Vec<&'a MappingNode>) {
            for node in nodes {
                if node.is_leaf() {
                    out.push(node);
                } else {
                    walk(node.children(), out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.properties, &mut out);
        out
    }

    pub fn find_leaf(&self, path: &str) -> Option<&MappingNode> {
        self.leaves().into_iter().find(|n| n.default_name == path)
    }

    /// Reject a path that is not one or two dot-separated identifiers.
    pub fn check_path(&self, path: &str) -> Result<()> {
        if is_valid_path(path) {
            return Ok(());
        }
        Err(Error::Mapping(MappingError::new(
            MappingErrorKind::UnknownProperty,
            self.entity,
            Some(path.to_string()),
            format!("malformed property path '{}' on {}", path, self.entity),
        )))
    }

    /// Column behind a property path.
    ///
    /// Fails with `UnknownProperty` when the path is malformed or no leaf
    /// has it, and with `UnmappedProperty` when the leaf has no column.
    pub fn column_for(&self, path: &str) -> Result<&str> {
        self.check_path(path)?;
        let leaf = self.find_leaf(path).ok_or_else(|| self.unknown_property(path))?;
        leaf.mapped_column().ok_or_else(|| {
            Error::Mapping(MappingError::new(
                MappingErrorKind::UnmappedProperty,
                self.entity,
                Some(path.to_string()),
                format!("property '{}' is not mapped to a column", path),
            ))
        })
    }

    pub(crate) fn unknown_property(&self, path: &str) -> Error {
        unknown_property(self.entity, path)
    }
}

pub(crate) fn unknown_property(entity: &'static str, path: &str) -> Error {
    Error::Mapping(MappingError::new(
        MappingErrorKind::UnknownProperty,
        entity,
        Some(path.to_string()),
        format!("no property '{}' on {}", path, entity),
    ))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn accessor(name: &'static str) -> PropertyAccessor {
        PropertyAccessor {
            name,
            enumeration: false,
        }
    }

    pub fn leaf(path: &str, name: &'static str, column: Option<&str>) -> MappingNode {
        MappingNode::leaf(
            accessor(name),
            path.to_string(),
            column.map(str::to_string),
            None,
        )
    }

    /// `id`, `name`, `note` (unmapped), `embedded { address, city }`
    pub fn sample() -> EntityMapping {
        EntityMapping {
            entity: "Sample",
            table: "samples",
            properties: vec![
                leaf("id", "id", Some("id")),
                leaf("name", "name", Some("name")),
                leaf("note", "note", None),
                MappingNode::composite(
                    accessor("embedded"),
                    "embedded".to_string(),
                    vec![
                        leaf("embedded.address", "address", Some("embedded_address")),
                        leaf("embedded.city", "city", Some("embedded_city")),
                    ],
                ),
            ],
        }
    }
}
