use std::collections::HashMap;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};

/// A bound SQL parameter value.
///
/// Row batches are records keyed by column name; this wrapper is the value
/// side of those records and knows how to bind itself to a prepared
/// statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(Value),
}

impl SqlValue {
    /// Maps a JSON value onto the closest SQL value. Integral numbers become
    /// BIGINT, other numbers DOUBLE PRECISION; arrays and objects stay JSON.
    pub fn from_json(value: Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(value) => SqlValue::Bool(value),
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    SqlValue::BigInt(value)
                } else {
                    SqlValue::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(value) => SqlValue::Text(value),
            value => SqlValue::Json(value),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => value.to_sql(ty, out),
            SqlValue::SmallInt(value) => value.to_sql(ty, out),
            SqlValue::Int(value) => value.to_sql(ty, out),
            SqlValue::BigInt(value) => value.to_sql(ty, out),
            SqlValue::Float(value) => value.to_sql(ty, out),
            SqlValue::Numeric(value) => value.to_sql(ty, out),
            SqlValue::Text(value) => value.to_sql(ty, out),
            SqlValue::Timestamp(value) => value.to_sql(ty, out),
            SqlValue::Date(value) => value.to_sql(ty, out),
            SqlValue::Json(value) => value.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true // We accept all types
    }

    to_sql_checked!();
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::SmallInt(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

/// One incoming row: field name to value. Fields may be any subset of the
/// scratch table's non-key columns.
pub type Record = HashMap<String, SqlValue>;

/// Builds a record from a JSON object. Non-object values are rejected since
/// the row-source boundary is "records keyed by column name".
pub fn record_from_json(value: Value) -> Option<Record> {
    match value {
        Value::Object(fields) => Some(
            fields.into_iter().map(|(name, value)| (name, SqlValue::from_json(value))).collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(json!(42)), SqlValue::BigInt(42));
        assert_eq!(SqlValue::from_json(json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(
            SqlValue::from_json(json!("a@x.com")),
            SqlValue::Text("a@x.com".to_string())
        );
    }

    #[test]
    fn test_from_json_nested_values_stay_json() {
        assert_eq!(
            SqlValue::from_json(json!([1, 2])),
            SqlValue::Json(json!([1, 2]))
        );
        assert_eq!(
            SqlValue::from_json(json!({"a": 1})),
            SqlValue::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_record_from_json() {
        let record =
            record_from_json(json!({"email": "a@x.com", "name": "Alice"})).unwrap();
        assert_eq!(record.get("email"), Some(&SqlValue::Text("a@x.com".to_string())));
        assert_eq!(record.get("name"), Some(&SqlValue::Text("Alice".to_string())));

        assert!(record_from_json(json!([1, 2])).is_none());
    }
}
