//! Per-call filtering, flattening and reordering of a mapping tree.

use batchmodel_core::Result;

use crate::node::{EntityMapping, MappingNode, unknown_property};

/// Which leaves a command works with.
///
/// Paths are full `default_name`s (`id`, `embedded.address`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// With no include or exclude list, select nothing instead of everything
    pub exclude_all_by_default: bool,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn none() -> Self {
        Self {
            exclude_all_by_default: true,
            ..Self::default()
        }
    }

    fn keeps(&self, node: &MappingNode) -> bool {
        let nothing = self.include.is_empty() && self.exclude.is_empty() && self.exclude_all_by_default;
        if !node.is_leaf() {
            // composites survive until their children have been filtered
            return !nothing;
        }
        if !self.include.is_empty() {
            self.include.contains(&node.default_name)
        } else if !self.exclude.is_empty() {
            !self.exclude.contains(&node.default_name)
        } else {
            !self.exclude_all_by_default
        }
    }
}

/// Filter a tree level by level.
///
/// Leaves are kept according to the selection, then leaves without a
/// column are dropped. Composites are filtered recursively and pruned
/// when nothing is left under them.
pub fn filter(nodes: &mut Vec<MappingNode>, selection: &Selection) {
    nodes.retain(|node| selection.keeps(node));
    nodes.retain(|node| !node.is_leaf() || node.mapped_column().is_some());
    for node in nodes.iter_mut() {
        if let Some(children) = node.children_mut() {
            filter(children, selection);
        }
    }
    nodes.retain(|node| node.is_leaf() || !node.children().is_empty());
}

/// Pre-order list of the leaves of a tree.
pub fn flatten(nodes: &[MappingNode]) -> Vec<MappingNode> {
    let mut out = Vec::new();
    for node in nodes {
        if node.is_leaf() {
            out.push(node.clone());
        } else {
            out.extend(flatten(node.children()));
        }
    }
    out
}

/// Put flattened leaves in the literal order of `include`.
///
/// An empty `include` leaves the input untouched.
pub fn reorder(
    leaves: Vec<MappingNode>,
    include: &[String],
    entity: &'static str,
) -> Result<Vec<MappingNode>> {
    if include.is_empty() {
        return Ok(leaves);
    }
    include
        .iter()
        .map(|path| {
            leaves
                .iter()
                .find(|leaf| &leaf.default_name == path)
                .cloned()
                .ok_or_else(|| unknown_property(entity, path))
        })
        .collect()
}

/// Filter, flatten and reorder a copy of `mapping`.
pub fn select(mapping: &EntityMapping, selection: &Selection) -> Result<Vec<MappingNode>> {
    let mut nodes = mapping.properties.clone();
    filter(&mut nodes, selection);
    reorder(flatten(&nodes), &selection.include, mapping.entity)
}
