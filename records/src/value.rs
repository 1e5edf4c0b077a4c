//! Conversions between JSON bodies, bound SQL values and result rows.

use sea_orm::{DbErr, QueryResult, Value};
use serde_json::Value as JsonValue;

use crate::resource::{Column, ColumnKind};

/// Parse a key segment for a column of `kind`.
///
/// Integer keys that are not integers cannot match a row, so callers skip the
/// round trip entirely instead of sending a statement the engine would reject.
pub fn parse_key(kind: ColumnKind, raw: &str) -> Option<Value> {
    match kind {
        ColumnKind::Integer => raw.parse::<i64>().ok().map(Value::from),
        ColumnKind::Text => Some(Value::from(raw.to_string())),
    }
}

/// Coerce a body field into the value bound for a column of `kind`.
///
/// Missing fields and `null` bind SQL NULL so the engine's own constraints
/// decide whether the row is acceptable.
pub fn bind(kind: ColumnKind, value: Option<&JsonValue>) -> Value {
    match (kind, value) {
        (ColumnKind::Integer, None | Some(JsonValue::Null)) => Value::BigInt(None),
        (ColumnKind::Integer, Some(JsonValue::Number(number))) => match number.as_i64() {
            Some(int) => Value::from(int),
            None => Value::from(number.as_f64()),
        },
        (ColumnKind::Integer, Some(JsonValue::String(text))) => match text.parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => Value::from(text.clone()),
        },
        (ColumnKind::Integer, Some(JsonValue::Bool(flag))) => Value::from(i64::from(*flag)),
        (ColumnKind::Text, None | Some(JsonValue::Null)) => Value::String(None),
        (ColumnKind::Text, Some(JsonValue::String(text))) => Value::from(text.clone()),
        (_, Some(other)) => Value::from(other.to_string()),
    }
}

/// Read one column of a result row back into JSON.
pub(crate) fn read(row: &QueryResult, column: &Column) -> Result<JsonValue, DbErr> {
    match column.kind {
        ColumnKind::Integer => {
            let value = match row.try_get::<Option<i64>>("", column.name) {
                Ok(value) => value,
                // int4 columns on postgres refuse to decode as i64
                Err(_) => row
                    .try_get::<Option<i32>>("", column.name)?
                    .map(i64::from),
            };
            Ok(value.map_or(JsonValue::Null, JsonValue::from))
        }
        ColumnKind::Text => Ok(row
            .try_get::<Option<String>>("", column.name)?
            .map_or(JsonValue::Null, JsonValue::from)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_keys_reject_sql_fragments() {
        assert_eq!(parse_key(ColumnKind::Integer, "42"), Some(Value::from(42_i64)));
        assert_eq!(parse_key(ColumnKind::Integer, "1; DROP TABLE employees"), None);
        assert_eq!(parse_key(ColumnKind::Integer, " 1"), None);
        assert_eq!(parse_key(ColumnKind::Integer, ""), None);
    }

    #[test]
    fn text_keys_are_taken_literally() {
        assert_eq!(
            parse_key(ColumnKind::Text, "x' OR '1'='1"),
            Some(Value::from("x' OR '1'='1".to_string()))
        );
    }

    #[test]
    fn bind_follows_column_kind() {
        assert_eq!(bind(ColumnKind::Integer, Some(&json!(7))), Value::from(7_i64));
        assert_eq!(bind(ColumnKind::Integer, Some(&json!("7"))), Value::from(7_i64));
        assert_eq!(
            bind(ColumnKind::Integer, Some(&json!("seven"))),
            Value::from("seven".to_string())
        );
        assert_eq!(
            bind(ColumnKind::Text, Some(&json!("12.50"))),
            Value::from("12.50".to_string())
        );
        assert_eq!(
            bind(ColumnKind::Text, Some(&json!(12.5))),
            Value::from("12.5".to_string())
        );
    }

    #[test]
    fn missing_and_null_bind_sql_null() {
        assert_eq!(bind(ColumnKind::Text, None), Value::String(None));
        assert_eq!(bind(ColumnKind::Text, Some(&JsonValue::Null)), Value::String(None));
        assert_eq!(bind(ColumnKind::Integer, None), Value::BigInt(None));
    }
}
