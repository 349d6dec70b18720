//! Result rows and typed conversion out of [`Value`].

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    ///
    /// A repeated name resolves to its first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.into_iter().enumerate() {
            name_to_index.entry(name).or_insert(i);
        }
        Self { name_to_index }
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }
}

/// A single row returned from a query.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    ///
    /// For multiple rows from the same result set, prefer `with_columns`
    /// to share the column metadata.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a typed value by column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .columns
            .index_of(name)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| {
                Error::Type(TypeError {
                    expected: std::any::type_name::<T>(),
                    actual: format!("column '{}' not found", name),
                    column: Some(name.to_string()),
                    rust_type: None,
                })
            })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Iterate over all values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

/// Trait for converting from a `Value` to a typed value.
///
/// Generated `Reflect::set_value` implementations route every scalar
/// property through this trait.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_error(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

fn narrow<T: TryFrom<i64>>(expected: &'static str, value: &Value) -> Result<T> {
    let wide = value.as_i64().ok_or_else(|| type_error(expected, value))?;
    T::try_from(wide).map_err(|_| {
        Error::Type(TypeError {
            expected,
            actual: format!("{} out of range", wide),
            column: None,
            rust_type: Some(expected),
        })
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| type_error("bool", value))
    }
}

impl FromValue for i8 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("i8", value)
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("i16", value)
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("i32", value)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| type_error("i64", value))
    }
}

impl FromValue for u8 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("u8", value)
    }
}

impl FromValue for u16 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("u16", value)
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        narrow("u32", value)
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| type_error("f32", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| type_error("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            _ => Err(type_error("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| type_error("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "valid JSON",
                    actual: format!("invalid JSON: {}", e),
                    column: None,
                    rust_type: None,
                })
            }),
            _ => Err(type_error("JSON", value)),
        }
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::Bytes(v) if v.len() == 16 => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(v);
                Ok(arr)
            }
            _ => Err(type_error("UUID (16 bytes)", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_basic_access() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(1), Value::Text("Alice".to_string())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get_named::<String>("name").unwrap(), "Alice");
        assert!(row.get_named::<String>("missing").is_err());
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i32::from_value(&Value::BigInt(42)).unwrap(), 42);
        assert!(i32::from_value(&Value::BigInt(i64::MAX)).is_err());
        assert_eq!(u8::from_value(&Value::Int(255)).unwrap(), 255);
        assert!(u8::from_value(&Value::Int(-1)).is_err());
    }

    #[test]
    fn test_row_type_errors_carry_column() {
        let row = Row::new(
            vec!["id".to_string()],
            vec![Value::Text("not a number".to_string())],
        );
        match row.get_named::<i32>("id") {
            Err(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("id")),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_and_uuid_handling() {
        let row = Row::new(
            vec!["maybe".to_string(), "guid".to_string()],
            vec![Value::Null, Value::Bytes(vec![1; 16])],
        );
        assert_eq!(row.get_named::<Option<i32>>("maybe").unwrap(), None);
        assert!(row.get_named::<i32>("maybe").is_err());
        assert_eq!(row.get_named::<[u8; 16]>("guid").unwrap(), [1; 16]);
    }
}
