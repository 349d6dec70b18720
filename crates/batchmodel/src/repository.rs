//! Repository: batch commands bound to one connection and configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use batchmodel::prelude::*;
//!
//! let repo = Repository::new(&conn);
//!
//! // Insert and read generated ids back
//! repo.insert::<Order>()
//!     .insert(PropertySet::all().exclude("id"))
//!     .output(PropertySet::none().include("id"))
//!     .execute(&cx, repo.connection(), &mut orders)
//!     .await;
//!
//! // Delete in one statement
//! repo.delete_many::<Order>(Expr::prop("total").lt(10))
//!     .execute(&cx, repo.connection())
//!     .await;
//! ```

use batchmodel_core::{Connection, Entity, Result};
use batchmodel_mapping::MappingRegistry;
use batchmodel_query::{
    DeleteCommand, Expr, InsertCommand, MergeCommand, PageCommand, UpdateCommand,
};

use crate::config::{BatchConfig, RegistryChoice};

#[derive(Debug)]
enum Registry {
    Global,
    Local(MappingRegistry),
}

/// Which page of entities to read.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub filter: Option<Expr>,
    pub order_by: Vec<(String, bool)>,
    pub skip: u64,
    pub take: u64,
    pub with_total: bool,
}

impl PageRequest {
    /// Zero-based page `index` of `size` rows.
    pub fn new(index: u64, size: u64) -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            skip: index.saturating_mul(size),
            take: size,
            with_total: false,
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((path.into(), ascending));
        self
    }

    pub fn with_total(mut self, with_total: bool) -> Self {
        self.with_total = with_total;
        self
    }
}

/// Batch commands over one connection.
///
/// The repository never opens transactions; wrap calls in one on the
/// connection when several commands must commit together.
#[derive(Debug)]
pub struct Repository<'c, C: Connection> {
    connection: &'c C,
    registry: Registry,
    config: BatchConfig,
}

impl<'c, C: Connection> Repository<'c, C> {
    /// Repository with the default configuration and the global registry.
    pub fn new(connection: &'c C) -> Self {
        Self {
            connection,
            registry: Registry::Global,
            config: BatchConfig::default(),
        }
    }

    /// Repository with a validated configuration.
    pub fn with_config(connection: &'c C, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let registry = match config.registry {
            RegistryChoice::Global => Registry::Global,
            RegistryChoice::Local => Registry::Local(MappingRegistry::new()),
        };
        tracing::debug!(
            registry = ?config.registry,
            max_parameters = ?config.max_parameters,
            max_rows_per_statement = ?config.max_rows_per_statement,
            "Created batch repository"
        );
        Ok(Self {
            connection,
            registry,
            config,
        })
    }

    pub fn connection(&self) -> &'c C {
        self.connection
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// The registry entity mappings are resolved through.
    pub fn registry(&self) -> &MappingRegistry {
        match &self.registry {
            Registry::Global => MappingRegistry::global(),
            Registry::Local(registry) => registry,
        }
    }

    pub fn insert<E: Entity>(&self) -> InsertCommand<'_, E> {
        InsertCommand::with_registry(self.registry()).options(self.config.batch_options())
    }

    pub fn update_many<E: Entity>(&self, predicate: Expr) -> UpdateCommand<'_, E> {
        UpdateCommand::with_registry(self.registry()).filter(predicate)
    }

    pub fn delete_many<E: Entity>(&self, predicate: Expr) -> DeleteCommand<'_, E> {
        DeleteCommand::with_registry(self.registry()).filter(predicate)
    }

    pub fn merge<E: Entity>(&self) -> MergeCommand<'_, E> {
        MergeCommand::with_registry(self.registry()).options(self.config.batch_options())
    }

    pub fn find_page<E: Entity>(&self, request: PageRequest) -> PageCommand<'_, E> {
        let mut command = PageCommand::with_registry(self.registry())
            .skip(request.skip)
            .take(request.take)
            .with_total(request.with_total);
        if let Some(predicate) = request.filter {
            command = command.filter(predicate);
        }
        for (path, ascending) in request.order_by {
            command = command.order_by(path, ascending);
        }
        command
    }
}
