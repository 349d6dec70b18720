//! Error types for batch operations.

use std::fmt;

/// The primary error type for all BatchModel operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors reported by the host executor
    Connection(ConnectionError),
    /// Query execution errors reported by the host executor
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Entity mapping errors (resolver, property sets, paths)
    Mapping(MappingError),
    /// Batch command configuration errors
    Command(CommandError),
    /// A chunk of a multi-statement batch failed
    Chunk(ChunkError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Deadlock or busy database
    Deadlock,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

/// Failure while resolving or addressing an entity's mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingError {
    pub kind: MappingErrorKind,
    /// Rust type name of the root entity
    pub entity: &'static str,
    /// Property path involved, if any
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// Owned properties nested deeper than one level
    DepthExceeded,
    /// The catalog has no scope for a declared owned property
    ScopeNotFound,
    /// A requested path has no matching leaf
    UnknownProperty,
    /// A requested path exists but maps to no column
    UnmappedProperty,
    /// A merge property set references a path not present in the source set
    MissingSourceProperty,
}

/// A command was configured in a way that cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// Row limit of zero
    InvalidLimit,
    /// Paging bounds that cannot produce a page
    InvalidPaging,
    /// A property set selected no columns where at least one is required
    EmptySelection,
    /// The connection's dialect cannot express the statement
    UnsupportedDialect,
    /// Returned output rows could not be matched to the input entities
    OutputMismatch,
}

/// One statement of a chunked batch failed.
///
/// `rows_affected` covers the chunks that completed before `index`.
#[derive(Debug)]
pub struct ChunkError {
    /// Zero-based index of the failing chunk
    pub index: usize,
    /// Total number of chunks in the batch
    pub total: usize,
    /// Rows affected by the chunks that completed
    pub rows_affected: u64,
    pub source: Box<Error>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a fatal configuration problem (never worth retrying)?
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Mapping(_) | Error::Command(_) | Error::Config(_)
        )
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Chunk(c) => c.source.is_connection_error(),
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Chunk(c) => c.source.sql(),
            _ => None,
        }
    }

    /// Mapping error kind, if this is a mapping error.
    pub fn mapping_kind(&self) -> Option<MappingErrorKind> {
        match self {
            Error::Mapping(m) => Some(m.kind),
            _ => None,
        }
    }

    /// Command error kind, if this is a command error.
    pub fn command_kind(&self) -> Option<CommandErrorKind> {
        match self {
            Error::Command(c) => Some(c.kind),
            _ => None,
        }
    }
}

impl MappingError {
    pub fn new(
        kind: MappingErrorKind,
        entity: &'static str,
        path: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            entity,
            path,
            message: message.into(),
        }
    }
}

impl CommandError {
    pub fn new(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Mapping(e) => write!(f, "Mapping error: {}", e),
            Error::Command(e) => write!(f, "Command error: {}", e.message),
            Error::Chunk(e) => write!(f, "Batch error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Chunk(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({}.{})", self.message, self.entity, path),
            None => write!(f, "{} ({})", self.message, self.entity),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} of {} failed after {} rows affected: {}",
            self.index + 1,
            self.total,
            self.rows_affected,
            self.source
        )
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Self {
        Error::Command(err)
    }
}

impl From<ChunkError> for Error {
    fn from(err: ChunkError) -> Self {
        Error::Chunk(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for BatchModel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_error_exposes_inner_sql_and_source() {
        let inner = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("INSERT INTO t VALUES (?1)".to_string()),
            sqlstate: None,
            message: "UNIQUE constraint failed".to_string(),
            source: None,
        });
        let err = Error::Chunk(ChunkError {
            index: 1,
            total: 3,
            rows_affected: 500,
            source: Box::new(inner),
        });

        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (?1)"));
        assert!(std::error::Error::source(&err).is_some());
        let text = err.to_string();
        assert!(text.contains("chunk 2 of 3"), "{text}");
        assert!(text.contains("500 rows"), "{text}");
    }

    #[test]
    fn configuration_errors_are_classified() {
        let mapping = Error::Mapping(MappingError::new(
            MappingErrorKind::DepthExceeded,
            "Order",
            Some("a.b".to_string()),
            "nested too deep",
        ));
        let command = Error::Command(CommandError::new(
            CommandErrorKind::InvalidLimit,
            "limit must be positive",
        ));
        assert!(mapping.is_configuration_error());
        assert!(command.is_configuration_error());
        assert!(!Error::Custom("busy".into()).is_configuration_error());
        assert_eq!(mapping.mapping_kind(), Some(MappingErrorKind::DepthExceeded));
        assert_eq!(command.command_kind(), Some(CommandErrorKind::InvalidLimit));
        assert_eq!(
            mapping.to_string(),
            "Mapping error: nested too deep (Order.a.b)"
        );
    }

    #[test]
    fn connection_flag_sees_through_chunks() {
        let conn = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "lost connection".to_string(),
            source: None,
        });
        let chunk = Error::Chunk(ChunkError {
            index: 0,
            total: 2,
            rows_affected: 0,
            source: Box::new(conn),
        });
        assert!(chunk.is_connection_error());
    }
}
