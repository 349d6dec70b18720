//! Column metadata catalog.
//!
//! The catalog is the authority on which properties of an entity are
//! persisted and under which column. The mapping resolver asks it for the
//! declared properties of a scope (the root entity or one owned
//! navigation) and for the column behind each property path.

use std::collections::HashMap;

use crate::entity::{PropertyInfo, PropertyKind};
use crate::path::split_path;
use crate::types::SqlType;

/// Column metadata for one property path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogColumn {
    /// `None` marks a declared property without a column
    pub column_name: Option<String>,
    pub configured_type: Option<SqlType>,
}

/// The declared contents of one catalog scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeHandle {
    /// Declared scalar property names
    pub properties: Vec<String>,
    /// Declared owned navigation names
    pub owned: Vec<String>,
}

impl ScopeHandle {
    pub fn declares_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    pub fn declares_owned(&self, name: &str) -> bool {
        self.owned.iter().any(|o| o == name)
    }
}

/// Read-only source of column metadata.
pub trait ColumnCatalog: Send + Sync {
    /// Declared contents of the root entity.
    fn root_scope(&self) -> ScopeHandle;

    /// Declared contents of an owned navigation. `None` if the navigation
    /// has no scope.
    fn owned_scope(&self, navigation: &str) -> Option<ScopeHandle>;

    /// Column metadata for a property path.
    fn lookup(&self, path: &str) -> Option<CatalogColumn>;
}

#[derive(Debug, Clone, Default)]
struct Scope {
    columns: Vec<(String, CatalogColumn)>,
    owned: Vec<String>,
}

impl Scope {
    fn handle(&self) -> ScopeHandle {
        ScopeHandle {
            properties: self.columns.iter().map(|(name, _)| name.clone()).collect(),
            owned: self.owned.clone(),
        }
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut CatalogColumn> {
        self.columns
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    fn column(&self, name: &str) -> Option<&CatalogColumn> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }
}

/// Convention-based catalog derived from property descriptors.
///
/// Root scalars map to a column named after the property. Scalars of an
/// owned object map to `{owner}_{name}`. Attribute overrides on the
/// descriptor win over the convention, and builder overrides win over both.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = ModelCatalog::conventional(Order::properties())
///     .column("total", "order_total")
///     .ignore("scratch")
///     .without_owned("audit");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    root: Scope,
    owned: HashMap<String, Scope>,
}

impl ModelCatalog {
    /// Build the conventional catalog for a set of root descriptors.
    pub fn conventional(properties: &[PropertyInfo]) -> Self {
        let mut catalog = Self {
            root: scope_for(None, properties),
            owned: HashMap::new(),
        };
        for info in properties {
            if let Some(nested) = info.kind.owned_properties() {
                catalog
                    .owned
                    .insert(info.name.to_string(), scope_for(Some(info.name), nested));
            }
        }
        catalog
    }

    fn scope_mut(&mut self, owner: Option<&str>) -> Option<&mut Scope> {
        match owner {
            None => Some(&mut self.root),
            Some(owner) => self.owned.get_mut(owner),
        }
    }

    /// Stop declaring a property. The resolver drops it entirely.
    pub fn ignore(mut self, path: &str) -> Self {
        let (owner, name) = split_path(path);
        if let Some(scope) = self.scope_mut(owner) {
            scope.columns.retain(|(n, _)| n != name);
        }
        self
    }

    /// Override the column name of a property.
    pub fn column(mut self, path: &str, column: impl Into<String>) -> Self {
        let (owner, name) = split_path(path);
        if let Some(c) = self.scope_mut(owner).and_then(|s| s.column_mut(name)) {
            c.column_name = Some(column.into());
        }
        self
    }

    /// Keep a property declared but without a column.
    pub fn unmapped(mut self, path: &str) -> Self {
        let (owner, name) = split_path(path);
        if let Some(c) = self.scope_mut(owner).and_then(|s| s.column_mut(name)) {
            c.column_name = None;
        }
        self
    }

    /// Override the configured storage type of a property.
    pub fn configured_type(mut self, path: &str, sql_type: SqlType) -> Self {
        let (owner, name) = split_path(path);
        if let Some(c) = self.scope_mut(owner).and_then(|s| s.column_mut(name)) {
            c.configured_type = Some(sql_type);
        }
        self
    }

    /// Stop declaring an owned navigation and its scope.
    pub fn without_owned(mut self, navigation: &str) -> Self {
        self.root.owned.retain(|o| o != navigation);
        self.owned.remove(navigation);
        self
    }
}

fn scope_for(owner: Option<&str>, properties: &[PropertyInfo]) -> Scope {
    let mut scope = Scope::default();
    for info in properties {
        match info.kind {
            PropertyKind::Scalar | PropertyKind::Enumeration => {
                let column_name = if info.mapped {
                    Some(match (info.column, owner) {
                        (Some(column), _) => column.to_string(),
                        (None, Some(owner)) => format!("{}_{}", owner, info.name),
                        (None, None) => info.name.to_string(),
                    })
                } else {
                    None
                };
                scope.columns.push((
                    info.name.to_string(),
                    CatalogColumn {
                        column_name,
                        configured_type: info.sql_type,
                    },
                ));
            }
            PropertyKind::Owned(_) => scope.owned.push(info.name.to_string()),
            PropertyKind::Navigation => {}
        }
    }
    scope
}

impl ColumnCatalog for ModelCatalog {
    fn root_scope(&self) -> ScopeHandle {
        self.root.handle()
    }

    fn owned_scope(&self, navigation: &str) -> Option<ScopeHandle> {
        if !self.root.owned.iter().any(|o| o == navigation) {
            return None;
        }
        self.owned.get(navigation).map(Scope::handle)
    }

    fn lookup(&self, path: &str) -> Option<CatalogColumn> {
        let (owner, name) = split_path(path);
        let scope = match owner {
            None => &self.root,
            Some(owner) => self.owned.get(owner)?,
        };
        scope.column(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded() -> &'static [PropertyInfo] {
        static PROPS: &[PropertyInfo] = &[
            PropertyInfo::scalar("address", "String"),
            PropertyInfo::scalar("city", "String").column("town"),
        ];
        PROPS
    }

    static ROOT: &[PropertyInfo] = &[
        PropertyInfo::scalar("id", "i64"),
        PropertyInfo::scalar("name", "String").sql_type(SqlType::VarChar(64)),
        PropertyInfo::scalar("scratch", "String").unmapped(),
        PropertyInfo::owned("embedded", "Embedded", embedded),
        PropertyInfo::navigation("parent", "Parent"),
    ];

    #[test]
    fn test_conventional_root_scope() {
        let catalog = ModelCatalog::conventional(ROOT);
        let scope = catalog.root_scope();
        assert_eq!(scope.properties, vec!["id", "name", "scratch"]);
        assert_eq!(scope.owned, vec!["embedded"]);
        assert_eq!(
            catalog.lookup("name"),
            Some(CatalogColumn {
                column_name: Some("name".to_string()),
                configured_type: Some(SqlType::VarChar(64)),
            })
        );
        assert_eq!(catalog.lookup("scratch").unwrap().column_name, None);
        assert_eq!(catalog.lookup("parent"), None);
    }

    #[test]
    fn test_owned_columns_are_prefixed() {
        let catalog = ModelCatalog::conventional(ROOT);
        let scope = catalog.owned_scope("embedded").unwrap();
        assert_eq!(scope.properties, vec!["address", "city"]);
        assert_eq!(
            catalog.lookup("embedded.address").unwrap().column_name.as_deref(),
            Some("embedded_address")
        );
        assert_eq!(
            catalog.lookup("embedded.city").unwrap().column_name.as_deref(),
            Some("town")
        );
        assert!(catalog.owned_scope("parent").is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let catalog = ModelCatalog::conventional(ROOT)
            .ignore("name")
            .column("id", "Id")
            .unmapped("embedded.city")
            .configured_type("embedded.address", SqlType::Text);

        assert!(!catalog.root_scope().declares_property("name"));
        assert_eq!(catalog.lookup("id").unwrap().column_name.as_deref(), Some("Id"));
        assert_eq!(catalog.lookup("embedded.city").unwrap().column_name, None);
        assert_eq!(
            catalog.lookup("embedded.address").unwrap().configured_type,
            Some(SqlType::Text)
        );
    }

    #[test]
    fn test_without_owned() {
        let catalog = ModelCatalog::conventional(ROOT).without_owned("embedded");
        assert!(!catalog.root_scope().declares_owned("embedded"));
        assert!(catalog.owned_scope("embedded").is_none());
        assert!(catalog.lookup("embedded.address").is_none());
    }
}
