//! Repository configuration.

use batchmodel_core::{ConfigError, Error, Result};
use batchmodel_query::BatchOptions;
use serde::{Deserialize, Serialize};

/// Which mapping registry a repository resolves entities through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryChoice {
    /// The process-wide registry shared by every repository
    #[default]
    Global,
    /// A registry owned by the repository
    Local,
}

/// Limits and registry selection for batch commands.
///
/// # Example
///
/// ```ignore
/// let config = BatchConfig::from_json(r#"{ "max_parameters": 999, "registry": "local" }"#)?;
/// let config = BatchConfig::new().max_rows_per_statement(500);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Parameter ceiling per statement; the connection's limit when unset
    pub max_parameters: Option<usize>,
    /// Additional cap on rows per statement
    pub max_rows_per_statement: Option<usize>,
    pub registry: RegistryChoice,
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_parameters(mut self, n: usize) -> Self {
        self.max_parameters = Some(n);
        self
    }

    pub fn max_rows_per_statement(mut self, n: usize) -> Self {
        self.max_rows_per_statement = Some(n);
        self
    }

    pub fn registry(mut self, registry: RegistryChoice) -> Self {
        self.registry = registry;
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid batch configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero limits.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_parameters", self.max_parameters),
            ("max_rows_per_statement", self.max_rows_per_statement),
        ] {
            if value == Some(0) {
                return Err(Error::Config(ConfigError {
                    message: format!("{name} must be greater than zero"),
                    source: None,
                }));
            }
        }
        Ok(())
    }

    /// Chunking limits handed to insert and merge commands.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_parameters: self.max_parameters,
            max_rows_per_statement: self.max_rows_per_statement,
        }
    }
}
