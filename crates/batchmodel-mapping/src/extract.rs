//! Reading property values off entities and writing them back.

use batchmodel_core::path::split_path;
use batchmodel_core::{PropertyValue, Reflect, Result, Value};

use crate::filter::{Selection, filter, flatten};
use crate::node::{EntityMapping, MappingNode, NodeKind, unknown_property};

fn storage_value(value: Option<PropertyValue>) -> Value {
    match value {
        Some(PropertyValue::Scalar(v)) => v,
        Some(PropertyValue::Enumeration(Some(raw))) => Value::BigInt(raw),
        Some(PropertyValue::Enumeration(None)) | None => Value::Null,
    }
}

/// Fill the value slot of every leaf from `entity`.
///
/// Composites descend into their owned object. When the owned object (or
/// the entity itself) is absent every leaf below gets `Value::Null`.
pub fn extract(nodes: &mut [MappingNode], entity: Option<&dyn Reflect>) {
    for node in nodes {
        let name = node.accessor.name;
        match &mut node.kind {
            NodeKind::Leaf { .. } => {
                node.value = Some(storage_value(entity.and_then(|e| e.get_value(name))));
            }
            NodeKind::Composite { children } => {
                extract(children, entity.and_then(|e| e.owned(name)));
            }
        }
    }
}

/// Reads the values of a fixed list of columns off entities.
///
/// Holds the mapping tree filtered down to the selected leaves. Each row
/// is read by [`extract`] over that tree; the filled slots are then put in
/// column order, which may differ from tree order after a reorder.
#[derive(Debug, Clone)]
pub struct RowExtractor {
    tree: Vec<MappingNode>,
    /// Pre-order leaf position of every column
    order: Vec<Option<usize>>,
}

impl RowExtractor {
    /// Extractor for `columns`, the flattened selection of `mapping`.
    pub fn new(mapping: &EntityMapping, columns: &[MappingNode]) -> Self {
        let mut tree = mapping.properties.clone();
        filter(
            &mut tree,
            &Selection {
                include: columns.iter().map(|c| c.default_name.clone()).collect(),
                exclude: Vec::new(),
                exclude_all_by_default: true,
            },
        );
        let leaves = flatten(&tree);
        let order = columns
            .iter()
            .map(|c| leaves.iter().position(|l| l.default_name == c.default_name))
            .collect();
        Self { tree, order }
    }

    /// Number of values in a row.
    pub fn width(&self) -> usize {
        self.order.len()
    }

    /// The filtered tree, with the slots of the last extracted row.
    pub fn tree(&self) -> &[MappingNode] {
        &self.tree
    }

    /// Values of one entity in column order.
    pub fn row(&mut self, entity: &dyn Reflect) -> Vec<Value> {
        extract(&mut self.tree, Some(entity));
        let mut filled = Vec::with_capacity(self.order.len());
        collect_slots(&self.tree, &mut filled);
        self.order
            .iter()
            .map(|i| i.and_then(|i| filled.get(i).cloned()).unwrap_or(Value::Null))
            .collect()
    }
}

fn collect_slots(nodes: &[MappingNode], out: &mut Vec<Value>) {
    for node in nodes {
        if node.is_leaf() {
            out.push(node.value.clone().unwrap_or(Value::Null));
        } else {
            collect_slots(node.children(), out);
        }
    }
}

/// Write a storage value back into the property at `path`.
///
/// Optional owned objects are created on demand, except for a null value
/// aimed at an owned object that does not exist yet.
pub fn assign(entity: &mut dyn Reflect, path: &str, value: Value) -> Result<()> {
    match split_path(path) {
        (Some(owner), name) => {
            if value.is_null() && entity.owned(owner).is_none() {
                return Ok(());
            }
            let type_name = entity.type_name();
            let owned = entity
                .owned_mut(owner)
                .ok_or_else(|| unknown_property(type_name, path))?;
            owned.set_value(name, value)
        }
        (None, name) => entity.set_value(name, value),
    }
}
