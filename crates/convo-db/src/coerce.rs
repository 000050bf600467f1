//! Schema-driven value coercion.
//!
//! Writes are strict: a value that cannot represent the field type is a
//! validation error. Reads are best-effort: whatever the backend stored is
//! upgraded to the field type when possible and otherwise passed through with
//! a warning, so a bad row never fails a whole query.

use crate::error::{DataError, Result};
use crate::query::{Condition, Operator};
use crate::types::{FieldType, SchemaDefinition};
use crate::value::{format_datetime, DataValue, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

/// Parse the timestamp formats backends hand back: RFC 3339, naive
/// `YYYY-MM-DD HH:MM:SS[.f]` / `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC), or
/// a bare date
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    // Postgres text output: "2024-01-01 10:00:00+00"
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn mismatch(field: &str, expected: FieldType, value: &DataValue) -> DataError {
    DataError::validation(format!(
        "field '{}' expects {}, got {}",
        field,
        expected,
        value.type_name()
    ))
}

/// Convert a value supplied by a caller into the representation of `field_type`
pub fn coerce_for_write(field: &str, field_type: FieldType, value: DataValue) -> Result<DataValue> {
    if value.is_null() {
        return Ok(value);
    }

    let coerced = match (field_type, value) {
        (FieldType::String | FieldType::Text, DataValue::Text(s)) => DataValue::Text(s),
        (FieldType::String | FieldType::Text, DataValue::DateTime(dt)) => {
            DataValue::Text(format_datetime(&dt))
        }
        (FieldType::String | FieldType::Text, DataValue::Json(v)) => {
            DataValue::Text(serde_json::to_string(&v)?)
        }
        (FieldType::String | FieldType::Text, v @ DataValue::List(_)) => {
            DataValue::Text(serde_json::to_string(&v.to_json())?)
        }
        (FieldType::String | FieldType::Text, v) => DataValue::Text(v.to_string()),

        (FieldType::Integer, DataValue::Int(i)) => DataValue::Int(i),
        (FieldType::Integer, v @ DataValue::Float(_)) => match v.as_i64() {
            Some(i) => DataValue::Int(i),
            None => return Err(mismatch(field, field_type, &v)),
        },
        (FieldType::Integer, DataValue::Text(s)) => match s.trim().parse::<i64>() {
            Ok(i) => DataValue::Int(i),
            Err(_) => return Err(mismatch(field, field_type, &DataValue::Text(s))),
        },

        (FieldType::Float, DataValue::Float(f)) => DataValue::Float(f),
        (FieldType::Float, DataValue::Int(i)) => DataValue::Float(i as f64),
        (FieldType::Float, DataValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(f) => DataValue::Float(f),
            Err(_) => return Err(mismatch(field, field_type, &DataValue::Text(s))),
        },

        (FieldType::Boolean, DataValue::Bool(b)) => DataValue::Bool(b),
        (FieldType::Boolean, DataValue::Int(0)) => DataValue::Bool(false),
        (FieldType::Boolean, DataValue::Int(1)) => DataValue::Bool(true),
        (FieldType::Boolean, DataValue::Text(s)) => match parse_bool(&s) {
            Some(b) => DataValue::Bool(b),
            None => return Err(mismatch(field, field_type, &DataValue::Text(s))),
        },

        (FieldType::DateTime, DataValue::DateTime(dt)) => DataValue::DateTime(dt),
        (FieldType::DateTime, DataValue::Text(s)) => match parse_datetime(&s) {
            Some(dt) => DataValue::DateTime(dt),
            None => return Err(mismatch(field, field_type, &DataValue::Text(s))),
        },
        (FieldType::DateTime, DataValue::Int(ms)) => match DateTime::from_timestamp_millis(ms) {
            Some(dt) => DataValue::DateTime(dt),
            None => return Err(mismatch(field, field_type, &DataValue::Int(ms))),
        },

        (FieldType::Json, DataValue::Json(v)) => DataValue::Json(v),
        (FieldType::Json, v) => DataValue::Json(v.to_json()),

        (expected, v) => return Err(mismatch(field, expected, &v)),
    };

    Ok(coerced)
}

/// Upgrade a value read from a backend to `field_type`, falling back to the
/// raw value with a warning
pub fn coerce_for_read(field: &str, field_type: FieldType, value: DataValue) -> DataValue {
    match (field_type, value) {
        (_, DataValue::Null) => DataValue::Null,

        (FieldType::Boolean, DataValue::Int(i)) => DataValue::Bool(i != 0),
        (FieldType::Boolean, DataValue::Text(s)) => match parse_bool(&s) {
            Some(b) => DataValue::Bool(b),
            None => {
                warn!("Field '{}' holds non-boolean text '{}', keeping raw value", field, s);
                DataValue::Text(s)
            }
        },

        (FieldType::DateTime, DataValue::Text(s)) => match parse_datetime(&s) {
            Some(dt) => DataValue::DateTime(dt),
            None => {
                warn!("Field '{}' holds unparseable timestamp '{}', keeping raw value", field, s);
                DataValue::Text(s)
            }
        },
        (FieldType::DateTime, DataValue::Int(ms)) => DateTime::from_timestamp_millis(ms)
            .map(DataValue::DateTime)
            .unwrap_or(DataValue::Int(ms)),

        (FieldType::Json, DataValue::Text(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(v) => DataValue::Json(v),
            Err(e) => {
                warn!("Field '{}' holds invalid JSON ({}), keeping raw string", field, e);
                DataValue::Text(s)
            }
        },
        (FieldType::Json, v @ DataValue::List(_)) => DataValue::Json(v.to_json()),

        (FieldType::Integer, v @ DataValue::Float(_)) => match v.as_i64() {
            Some(i) => DataValue::Int(i),
            None => v,
        },
        (FieldType::Integer, DataValue::Text(s)) => match s.trim().parse::<i64>() {
            Ok(i) => DataValue::Int(i),
            Err(_) => DataValue::Text(s),
        },
        (FieldType::Float, DataValue::Int(i)) => DataValue::Float(i as f64),

        (FieldType::String | FieldType::Text, DataValue::DateTime(dt)) => {
            DataValue::Text(format_datetime(&dt))
        }

        (_, v) => v,
    }
}

/// Apply read coercion to every schema field present in a row; unknown
/// fields pass through untouched
pub fn normalize_record(schema: &SchemaDefinition, mut record: Record) -> Record {
    for field in &schema.fields {
        if let Some(value) = record.remove(&field.name) {
            let value = coerce_for_read(&field.name, field.field_type, value);
            record.insert(field.name.clone(), value);
        }
    }
    record
}

/// Mark values of JSON fields as JSON for backends that store them as
/// native documents, so a JSON string is never parsed a second time on read
pub fn tag_native_json(schema: &SchemaDefinition, mut record: Record) -> Record {
    for field in schema.fields.iter().filter(|f| f.field_type == FieldType::Json) {
        if let Some(value) = record.get_mut(&field.name) {
            if !matches!(value, DataValue::Null | DataValue::Json(_)) {
                *value = DataValue::Json(value.to_json());
            }
        }
    }
    record
}

/// Coerce the value of a condition to its field type so typed drivers bind
/// it correctly
pub fn coerce_condition(schema: &SchemaDefinition, condition: &Condition) -> Result<Condition> {
    let Some(field) = schema.get_field(&condition.field) else {
        return Ok(condition.clone());
    };

    let value = match condition.operator {
        Operator::Like => condition.value.clone(),
        Operator::In => {
            let items = condition
                .list_values()?
                .into_iter()
                .map(|v| coerce_for_write(&field.name, field.field_type, v))
                .collect::<Result<Vec<_>>>()?;
            DataValue::List(items)
        }
        _ => coerce_for_write(&field.name, field.field_type, condition.value.clone())?,
    };

    Ok(Condition {
        field: condition.field.clone(),
        operator: condition.operator,
        value,
    })
}
