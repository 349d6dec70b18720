//! Fluent property sets (insert, update, output, merge source/compare).

use batchmodel_core::error::{MappingError, MappingErrorKind};
use batchmodel_core::{Error, Result};
use batchmodel_mapping::{EntityMapping, MappingNode, Selection, select};

/// The properties one part of a batch command works with.
///
/// # Example
///
/// ```ignore
/// let set = PropertySet::all().exclude("created_at").exclude("shipping.city");
/// let output = PropertySet::none().include("id");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    include: Vec<String>,
    exclude: Vec<String>,
    exclude_all_by_default: bool,
}

impl PropertySet {
    /// Every mapped property unless narrowed.
    pub fn all() -> Self {
        Self::default()
    }

    /// No property unless one is included.
    pub fn none() -> Self {
        Self {
            exclude_all_by_default: true,
            ..Self::default()
        }
    }

    /// Select a property. Once anything is included, only included
    /// properties are selected, in inclusion order.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.include.push(path.into());
        self
    }

    /// Drop a property. Ignored once anything is included.
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.exclude.push(path.into());
        self
    }

    pub fn includes(&self) -> &[String] {
        &self.include
    }

    /// Whether this set selects nothing without consulting a mapping.
    pub fn is_none(&self) -> bool {
        self.include.is_empty() && self.exclude_all_by_default
    }

    /// Validate the set against `mapping` and return the selected leaves.
    ///
    /// Every path must be well formed and name a leaf of the full tree. An explicitly
    /// included path must also have a column.
    pub fn select(&self, mapping: &EntityMapping) -> Result<Vec<MappingNode>> {
        let leaves = mapping.leaves();
        for path in self.include.iter().chain(self.exclude.iter()) {
            mapping.check_path(path)?;
            if !leaves.iter().any(|leaf| &leaf.default_name == path) {
                return Err(mapping_error(
                    MappingErrorKind::UnknownProperty,
                    mapping,
                    path,
                    format!("no property '{}' on {}", path, mapping.entity),
                ));
            }
        }
        for path in &self.include {
            if mapping.column_for(path).is_err() {
                return Err(mapping_error(
                    MappingErrorKind::UnmappedProperty,
                    mapping,
                    path,
                    format!("property '{}' is not mapped to a column", path),
                ));
            }
        }

        select(
            mapping,
            &Selection {
                include: self.include.clone(),
                exclude: self.exclude.clone(),
                exclude_all_by_default: self.exclude_all_by_default,
            },
        )
    }
}

fn mapping_error(
    kind: MappingErrorKind,
    mapping: &EntityMapping,
    path: &str,
    message: String,
) -> Error {
    Error::Mapping(MappingError::new(
        kind,
        mapping.entity,
        Some(path.to_string()),
        message,
    ))
}

/// Check that every leaf of `subset` is also in `source`.
pub(crate) fn require_subset(
    mapping: &EntityMapping,
    role: &str,
    subset: &[MappingNode],
    source: &[MappingNode],
) -> Result<()> {
    for leaf in subset {
        if !source.iter().any(|s| s.default_name == leaf.default_name) {
            return Err(mapping_error(
                MappingErrorKind::MissingSourceProperty,
                mapping,
                &leaf.default_name,
                format!(
                    "{} property '{}' is not part of the source properties",
                    role, leaf.default_name
                ),
            ));
        }
    }
    Ok(())
}
