//! Entity reflection.
//!
//! Batch commands work on arbitrary entity types without knowing their
//! fields at compile time. Each entity describes itself through a static
//! slice of [`PropertyInfo`] and exposes its values through the
//! object-safe [`Reflect`] trait. Both are normally generated by
//! `#[derive(Entity)]` / `#[derive(Reflect)]` from `batchmodel-macros`.

use crate::Result;
use crate::catalog::ModelCatalog;
use crate::error::{Error, TypeError};
use crate::row::FromValue;
use crate::types::SqlType;
use crate::value::Value;

/// How a property participates in storage mapping.
#[derive(Debug, Clone, Copy)]
pub enum PropertyKind {
    /// Primitive-like value (numbers, strings, bools, UUIDs, optionals of those)
    Scalar,
    /// Fieldless enum stored as its integral discriminant
    Enumeration,
    /// Owned sub-object stored in the parent's row; carries the nested
    /// type's descriptors
    Owned(fn() -> &'static [PropertyInfo]),
    /// Reference to another aggregate; never mapped to a column
    Navigation,
}

impl PropertyKind {
    /// Scalars and enumerations map to exactly one column.
    pub const fn is_primitive(&self) -> bool {
        matches!(self, PropertyKind::Scalar | PropertyKind::Enumeration)
    }

    /// Nested descriptors, if this is an owned property.
    pub fn owned_properties(&self) -> Option<&'static [PropertyInfo]> {
        match self {
            PropertyKind::Owned(properties) => Some(properties()),
            _ => None,
        }
    }
}

/// Static description of one entity property.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    /// Rust field name; also the property's path segment
    pub name: &'static str,
    pub kind: PropertyKind,
    /// Rust type as written in the struct
    pub rust_type: &'static str,
    /// Explicit column name override
    pub column: Option<&'static str>,
    /// Configured storage type
    pub sql_type: Option<SqlType>,
    /// `false` keeps the property declared but without a column
    pub mapped: bool,
    pub nullable: bool,
}

impl PropertyInfo {
    const fn new(name: &'static str, kind: PropertyKind, rust_type: &'static str) -> Self {
        Self {
            name,
            kind,
            rust_type,
            column: None,
            sql_type: None,
            mapped: true,
            nullable: false,
        }
    }

    pub const fn scalar(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, PropertyKind::Scalar, rust_type)
    }

    pub const fn enumeration(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, PropertyKind::Enumeration, rust_type)
    }

    pub const fn owned(
        name: &'static str,
        rust_type: &'static str,
        properties: fn() -> &'static [PropertyInfo],
    ) -> Self {
        Self::new(name, PropertyKind::Owned(properties), rust_type)
    }

    pub const fn navigation(name: &'static str, rust_type: &'static str) -> Self {
        Self::new(name, PropertyKind::Navigation, rust_type)
    }

    /// Set the column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    /// Set the configured storage type.
    pub const fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Keep the property declared but report no column for it.
    pub const fn unmapped(mut self) -> Self {
        self.mapped = false;
        self
    }

    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }
}

/// A property value as read off an instance.
///
/// Enumerations are kept apart from scalars so the extractor decides how
/// they are stored.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Value),
    /// Raw discriminant, `None` for an absent optional enum
    Enumeration(Option<i64>),
}

/// Object-safe access to an instance's properties.
pub trait Reflect: Send + Sync {
    /// Property descriptors in declaration order.
    fn properties() -> &'static [PropertyInfo]
    where
        Self: Sized;

    /// Rust type name, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Read a primitive property. `None` if no such primitive exists.
    fn get_value(&self, name: &str) -> Option<PropertyValue>;

    /// Write a primitive property from a storage value.
    fn set_value(&mut self, name: &str, value: Value) -> Result<()>;

    /// Borrow an owned sub-object. `None` when absent or not owned.
    fn owned(&self, name: &str) -> Option<&dyn Reflect>;

    /// Mutably borrow an owned sub-object, materializing a default one for
    /// optional owned properties.
    fn owned_mut(&mut self, name: &str) -> Option<&mut dyn Reflect>;
}

/// A root entity stored in its own table.
pub trait Entity: Reflect + Default + 'static {
    /// Table the entity is stored in.
    const TABLE_NAME: &'static str;

    /// Column metadata authority for this entity.
    ///
    /// Defaults to the naming conventions of [`ModelCatalog::conventional`].
    fn catalog() -> ModelCatalog {
        ModelCatalog::conventional(Self::properties())
    }
}

/// Fieldless enum stored as an integer.
pub trait Enumeration: Sized {
    fn to_raw(&self) -> i64;
    fn from_raw(raw: i64) -> Option<Self>;
}

/// Decode an enumeration from a storage value.
pub fn enumeration_from_value<T: Enumeration>(value: &Value) -> Result<T> {
    let raw = i64::from_value(value)?;
    T::from_raw(raw).ok_or_else(|| {
        Error::Type(TypeError {
            expected: std::any::type_name::<T>(),
            actual: format!("unknown discriminant {}", raw),
            column: None,
            rust_type: Some(std::any::type_name::<T>()),
        })
    })
}
