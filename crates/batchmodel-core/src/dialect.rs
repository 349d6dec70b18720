//! SQL dialect differences that batch statements depend on.

use serde::{Deserialize, Serialize};

/// SQL dialect for generating database-specific SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                let escaped = name.replace('"', "\"\"");
                format!("\"{}\"", escaped)
            }
            Dialect::Mysql => {
                let escaped = name.replace('`', "``");
                format!("`{}`", escaped)
            }
        }
    }

    /// Largest number of bound parameters a single statement may carry.
    pub const fn max_params(self) -> usize {
        match self {
            Dialect::Postgres | Dialect::Mysql => 65_535,
            // SQLITE_MAX_VARIABLE_NUMBER since 3.32
            Dialect::Sqlite => 32_766,
        }
    }

    /// Whether INSERT/UPDATE/DELETE accept a RETURNING clause.
    pub const fn supports_returning(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Hidden physical row identifier usable in a row-selection sub-query.
    pub const fn row_locator(self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => Some("ctid"),
            Dialect::Sqlite => Some("rowid"),
            Dialect::Mysql => None,
        }
    }
}
