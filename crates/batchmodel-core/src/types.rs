//! Configured storage types.

/// Storage type a catalog may configure for a column.
///
/// Batch statements only need it where the database cannot infer a type on
/// its own, e.g. untyped `VALUES` rows feeding a `MERGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    // Integer types
    TinyInt,
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal { precision: u8, scale: u8 },

    // Boolean
    Boolean,

    // String types
    VarChar(u32),
    Text,

    // Binary types
    Blob,

    // Date/time types
    Date,
    Time,
    Timestamp,
    TimestampTz,

    // UUID
    Uuid,

    // JSON
    Json,

    // Custom type name, emitted verbatim
    Custom(&'static str),
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::TinyInt => "TINYINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => (*name).to_string(),
        }
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt
                | SqlType::SmallInt
                | SqlType::Integer
                | SqlType::BigInt
                | SqlType::Real
                | SqlType::Double
                | SqlType::Decimal { .. }
        )
    }
}
