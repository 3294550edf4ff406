//! SQL type definitions and mapping.

use crate::value::Value;

/// SQL data types a mapped column can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// 64-bit integer, used for generated keys and foreign keys
    BigInt,
    /// Integer
    Integer,
    /// Double precision floating point
    Double,
    /// Boolean
    Boolean,
    /// Bounded string
    VarChar(u32),
    /// Unbounded string
    Text,
    /// Binary data
    Blob,
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    /// Whether `value` can be bound to a column of this type.
    ///
    /// NULL is never accepted here; nullability is checked by the caller.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SqlType::BigInt | SqlType::Integer => matches!(value, Value::Int(_) | Value::BigInt(_)),
            SqlType::Double => matches!(
                value,
                Value::Double(_) | Value::Int(_) | Value::BigInt(_)
            ),
            SqlType::Boolean => matches!(value, Value::Bool(_) | Value::Int(_)),
            SqlType::VarChar(_) | SqlType::Text => matches!(value, Value::Text(_)),
            SqlType::Blob => matches!(value, Value::Bytes(_)),
        }
    }
}
