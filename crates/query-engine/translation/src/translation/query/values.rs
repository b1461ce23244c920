//! Handle the translation of literal values.

use query_engine_metadata::metadata::ScalarType;
use query_engine_models::CastType;

use crate::translation::error::Error;

/// Check that a JSON value can be bound against a column of the given type.
///
/// Strings are accepted for every type, so callers can pass numbers, dates and
/// uuids in their textual form. `null` is accepted everywhere.
pub fn check_value(field: &str, value: &serde_json::Value, scalar_type: ScalarType) -> Result<(), Error> {
    let fits = match value {
        serde_json::Value::Null | serde_json::Value::String(_) => true,
        serde_json::Value::Bool(_) => matches!(scalar_type, ScalarType::Boolean) || scalar_type.is_json(),
        serde_json::Value::Number(number) => match scalar_type {
            ScalarType::Smallint | ScalarType::Integer | ScalarType::Bigint => {
                number.is_i64() || number.is_u64()
            }
            ScalarType::Real | ScalarType::DoublePrecision | ScalarType::Numeric => true,
            other => other.is_json(),
        },
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => scalar_type.is_json(),
    };
    if fits {
        Ok(())
    } else {
        Err(Error::type_mismatch(field, scalar_type.to_string(), value))
    }
}

/// The SQL type a JSON operand or sort key is cast to.
pub fn cast_type_name(cast: CastType) -> &'static str {
    match cast {
        CastType::String => "text",
        CastType::Int => "integer",
        CastType::Boolean => "boolean",
        CastType::Decimal => "numeric",
        CastType::Timestamp => "timestamp",
    }
}

/// Infer the type of a JSON operand from the shape of the literal.
pub fn infer_cast_type(value: &serde_json::Value) -> CastType {
    match value {
        serde_json::Value::Bool(_) => CastType::Boolean,
        serde_json::Value::Number(number) if number.is_i64() || number.is_u64() => CastType::Int,
        serde_json::Value::Number(_) => CastType::Decimal,
        serde_json::Value::String(s) if looks_like_timestamp(s) => CastType::Timestamp,
        serde_json::Value::Array(items) => items.first().map_or(CastType::String, infer_cast_type),
        _ => CastType::String,
    }
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn looks_like_timestamp(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    let date_shape = bytes[..10].iter().enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'-',
        _ => byte.is_ascii_digit(),
    });
    date_shape
        && (bytes.len() == 10
            || (matches!(bytes[10], b'T' | b' ') && bytes.get(11).is_some_and(u8::is_ascii_digit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_must_fit_integer_columns() {
        assert!(check_value("age", &json!(42), ScalarType::Integer).is_ok());
        assert!(check_value("age", &json!("42"), ScalarType::Integer).is_ok());
        assert!(check_value("age", &json!(4.2), ScalarType::Integer).is_err());
        assert!(check_value("age", &json!(true), ScalarType::Integer).is_err());
        assert!(check_value("age", &json!(null), ScalarType::Integer).is_ok());
    }

    #[test]
    fn cast_types_are_inferred_from_literals() {
        assert_eq!(infer_cast_type(&json!(true)), CastType::Boolean);
        assert_eq!(infer_cast_type(&json!(3)), CastType::Int);
        assert_eq!(infer_cast_type(&json!(3.5)), CastType::Decimal);
        assert_eq!(infer_cast_type(&json!("2024-02-01")), CastType::Timestamp);
        assert_eq!(infer_cast_type(&json!("2024-02-01T10:00:00Z")), CastType::Timestamp);
        assert_eq!(infer_cast_type(&json!("2024-02-01 is a date")), CastType::String);
        assert_eq!(infer_cast_type(&json!("gold")), CastType::String);
        assert_eq!(infer_cast_type(&json!([1, 2])), CastType::Int);
    }
}
