//! Mapping resolution and the process-wide mapping cache.
//!
//! Resolution walks an entity's property descriptors against a
//! [`ColumnCatalog`] and produces its [`EntityMapping`]. The result depends
//! only on the entity type, so it is built once per type and cached for
//! the life of the process.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use batchmodel_core::error::{MappingError, MappingErrorKind};
use batchmodel_core::path::join_path;
use batchmodel_core::{
    ColumnCatalog, Entity, Error, PropertyInfo, PropertyKind, Result, ScopeHandle,
};

use crate::node::{EntityMapping, MappingNode, NodeKind, PropertyAccessor};

/// Owned objects may nest one level below the root.
const MAX_OWNED_DEPTH: usize = 1;

/// Cache of resolved mapping trees keyed by entity type.
///
/// Entries are inserted once and never evicted. Callers always receive a
/// deep copy, never the cached tree itself.
///
/// # Example
///
/// ```ignore
/// let mapping = MappingRegistry::global().resolve::<Order>()?;
/// assert_eq!(mapping.table, "orders");
/// ```
#[derive(Debug, Default)]
pub struct MappingRegistry {
    cache: RwLock<HashMap<TypeId, Arc<EntityMapping>>>,
    builds: AtomicUsize,
}

impl MappingRegistry {
    /// Create an empty, private registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static MappingRegistry {
        static GLOBAL: OnceLock<MappingRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MappingRegistry::new)
    }

    /// Resolve `E` against its own catalog.
    pub fn resolve<E: Entity>(&self) -> Result<EntityMapping> {
        self.resolve_inner::<E>(|| Box::new(E::catalog()))
    }

    /// Resolve `E` against an explicit catalog.
    ///
    /// The catalog is only consulted when `E` is not cached yet.
    pub fn resolve_with<E: Entity>(&self, catalog: &dyn ColumnCatalog) -> Result<EntityMapping> {
        self.resolve_inner::<E>(|| Box::new(CatalogRef(catalog)))
    }

    fn resolve_inner<'a, E: Entity>(
        &self,
        catalog: impl FnOnce() -> Box<dyn ColumnCatalog + 'a>,
    ) -> Result<EntityMapping> {
        let key = TypeId::of::<E>();

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(mapping) = cache.get(&key) {
                return Ok(EntityMapping::clone(mapping));
            }
        }

        // Build under the write lock so concurrent first use builds once.
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(mapping) = cache.get(&key) {
            return Ok(EntityMapping::clone(mapping));
        }

        let catalog = catalog();
        let mapping = build_mapping(
            std::any::type_name::<E>(),
            E::TABLE_NAME,
            E::properties(),
            catalog.as_ref(),
        )?;
        self.builds.fetch_add(1, Ordering::Relaxed);

        let copy = mapping.clone();
        cache.insert(key, Arc::new(mapping));
        Ok(copy)
    }

    /// Whether `E` has been resolved already.
    pub fn contains<E: Entity>(&self) -> bool {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.contains_key(&TypeId::of::<E>())
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of trees built so far. Equals `len()` unless builds raced.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

struct CatalogRef<'a>(&'a dyn ColumnCatalog);

impl ColumnCatalog for CatalogRef<'_> {
    fn root_scope(&self) -> ScopeHandle {
        self.0.root_scope()
    }

    fn owned_scope(&self, navigation: &str) -> Option<ScopeHandle> {
        self.0.owned_scope(navigation)
    }

    fn lookup(&self, path: &str) -> Option<batchmodel_core::CatalogColumn> {
        self.0.lookup(path)
    }
}

/// Build a mapping tree without touching any cache.
#[tracing::instrument(level = "debug", skip(properties, catalog))]
pub fn build_mapping(
    entity: &'static str,
    table: &'static str,
    properties: &'static [PropertyInfo],
    catalog: &dyn ColumnCatalog,
) -> Result<EntityMapping> {
    let scope = catalog.root_scope();
    let nodes = build_scope(entity, properties, catalog, &scope, &[], 0)?;

    tracing::debug!(
        entity = entity,
        leaves = nodes.iter().filter(|n| n.is_leaf()).count(),
        composites = nodes.iter().filter(|n| !n.is_leaf()).count(),
        "Built entity mapping"
    );

    Ok(EntityMapping {
        entity,
        table,
        properties: nodes,
    })
}

fn build_scope(
    entity: &'static str,
    properties: &'static [PropertyInfo],
    catalog: &dyn ColumnCatalog,
    scope: &ScopeHandle,
    parents: &[&str],
    depth: usize,
) -> Result<Vec<MappingNode>> {
    let mut leaves = Vec::new();
    let mut composites = Vec::new();

    for info in properties {
        match info.kind {
            PropertyKind::Scalar | PropertyKind::Enumeration => {
                if !scope.declares_property(info.name) {
                    continue;
                }
                let path = join_path(parents, info.name);
                let column = catalog.lookup(&path).unwrap_or_default();
                leaves.push(MappingNode::leaf(
                    PropertyAccessor {
                        name: info.name,
                        enumeration: matches!(info.kind, PropertyKind::Enumeration),
                    },
                    path,
                    column.column_name,
                    column.configured_type,
                ));
            }
            PropertyKind::Owned(nested) => {
                let path = join_path(parents, info.name);
                if depth >= MAX_OWNED_DEPTH {
                    return Err(Error::Mapping(MappingError::new(
                        MappingErrorKind::DepthExceeded,
                        entity,
                        Some(path),
                        format!(
                            "owned objects may nest {} level(s) below the root",
                            MAX_OWNED_DEPTH
                        ),
                    )));
                }
                if !scope.declares_owned(info.name) {
                    continue;
                }
                let owned_scope = catalog.owned_scope(info.name).ok_or_else(|| {
                    Error::Mapping(MappingError::new(
                        MappingErrorKind::ScopeNotFound,
                        entity,
                        Some(path.clone()),
                        format!("catalog has no scope for owned property '{}'", path),
                    ))
                })?;

                let mut owner = parents.to_vec();
                owner.push(info.name);
                let children =
                    build_scope(entity, nested(), catalog, &owned_scope, &owner, depth + 1)?;
                if !children.is_empty() {
                    composites.push(MappingNode::composite(
                        PropertyAccessor {
                            name: info.name,
                            enumeration: false,
                        },
                        path,
                        children,
                    ));
                }
            }
            PropertyKind::Navigation => {}
        }
    }

    leaves.extend(composites);
    Ok(leaves)
}

/// Count of mapped leaves, the number of columns a default selection yields.
pub fn mapped_leaf_count(mapping: &EntityMapping) -> usize {
    fn count(nodes: &[MappingNode]) -> usize {
        nodes
            .iter()
            .map(|n| match &n.kind {
                NodeKind::Leaf { mapped_column, .. } => usize::from(mapped_column.is_some()),
                NodeKind::Composite { children } => count(children),
            })
            .sum()
    }
    count(&mapping.properties)
}
