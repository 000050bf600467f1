use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A single stored value, independent of the backend that holds it.
///
/// Serializes to plain JSON: dates become RFC 3339 strings with millisecond
/// precision and lists become arrays. Deserializing never produces
/// `DateTime`; schema-driven coercion upgrades text to dates where the field
/// type says so.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum DataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    /// Structured JSON (objects, or arrays stored in a JSON field)
    Json(Value),
    /// Ordered values, used by `in` conditions
    List(Vec<DataValue>),
}

/// A plain key/value record as read from or written to a backend
pub type Record = HashMap<String, DataValue>;

/// Build a [`Record`] from `key => value` pairs.
///
/// ```
/// use convo_db::record;
/// let r = record! { "id" => "u1", "active" => true };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($key.to_string(), $crate::DataValue::from($value)); )+
        record
    }};
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            DataValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Int(i) => Some(*i as f64),
            DataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Values of a list, or of a JSON array
    pub fn as_list(&self) -> Option<Vec<DataValue>> {
        match self {
            DataValue::List(items) => Some(items.clone()),
            DataValue::Json(Value::Array(items)) => {
                Some(items.iter().cloned().map(DataValue::from).collect())
            }
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "null",
            DataValue::Bool(_) => "boolean",
            DataValue::Int(_) => "integer",
            DataValue::Float(_) => "float",
            DataValue::Text(_) => "string",
            DataValue::DateTime(_) => "datetime",
            DataValue::Json(_) => "json",
            DataValue::List(_) => "list",
        }
    }

    /// Convert into a plain JSON value
    pub fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

/// Canonical text form of a timestamp; sorts lexicographically
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "null"),
            DataValue::Bool(b) => write!(f, "{}", b),
            DataValue::Int(i) => write!(f, "{}", i),
            DataValue::Float(v) => write!(f, "{}", v),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
            DataValue::Json(v) => write!(f, "{}", v),
            DataValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl From<Value> for DataValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => DataValue::Null,
            Value::Bool(b) => DataValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DataValue::Int(i),
                None => n.as_f64().map(DataValue::Float).unwrap_or(DataValue::Null),
            },
            Value::String(s) => DataValue::Text(s),
            Value::Array(items) => DataValue::List(items.into_iter().map(DataValue::from).collect()),
            obj @ Value::Object(_) => DataValue::Json(obj),
        }
    }
}

impl From<DataValue> for Value {
    fn from(value: DataValue) -> Self {
        match value {
            DataValue::Null => Value::Null,
            DataValue::Bool(b) => Value::Bool(b),
            DataValue::Int(i) => Value::Number(i.into()),
            DataValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DataValue::Text(s) => Value::String(s),
            DataValue::DateTime(dt) => Value::String(format_datetime(&dt)),
            DataValue::Json(v) => v,
            DataValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}

impl From<&String> for DataValue {
    fn from(value: &String) -> Self {
        DataValue::Text(value.clone())
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<u32> for DataValue {
    fn from(value: u32) -> Self {
        DataValue::Int(value as i64)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<DateTime<Utc>> for DataValue {
    fn from(value: DateTime<Utc>) -> Self {
        DataValue::DateTime(value)
    }
}

impl From<Vec<DataValue>> for DataValue {
    fn from(value: Vec<DataValue>) -> Self {
        DataValue::List(value)
    }
}

impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DataValue::Null)
    }
}

/// Convert a record into a JSON object
pub fn record_to_json(record: &Record) -> Value {
    let map: serde_json::Map<String, Value> = record
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Value::Object(map)
}

/// Convert a JSON object into a record; anything else is rejected
pub fn record_from_json(value: Value) -> crate::Result<Record> {
    match value {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, DataValue::from(v)))
            .collect()),
        other => Err(crate::DataError::validation(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_shape() {
        let value = DataValue::from(json!({"a": [1, 2]}));
        assert!(matches!(value, DataValue::Json(_)));

        let list = DataValue::from(json!(["x", 2, true]));
        assert_eq!(
            list,
            DataValue::List(vec![
                DataValue::Text("x".into()),
                DataValue::Int(2),
                DataValue::Bool(true)
            ])
        );
        assert_eq!(DataValue::from(json!(1.5)), DataValue::Float(1.5));
    }

    #[test]
    fn test_datetime_serializes_as_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_value(DataValue::DateTime(dt)).unwrap();
        assert_eq!(json, json!("2024-03-01T12:30:00.000Z"));
    }

    #[test]
    fn test_record_macro_and_json() {
        let r = record! { "id" => "u1", "count" => 3, "active" => true };
        let json = record_to_json(&r);
        assert_eq!(json["id"], json!("u1"));
        assert_eq!(json["count"], json!(3));

        let back = record_from_json(json).unwrap();
        assert_eq!(back, r);
        assert!(record_from_json(json!([1])).is_err());
    }

    #[test]
    fn test_as_list_accepts_json_arrays() {
        let values = DataValue::Json(json!(["a", "b"])).as_list().unwrap();
        assert_eq!(values.len(), 2);
        assert!(DataValue::Text("a".into()).as_list().is_none());
    }
}
