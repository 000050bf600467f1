use convo_db::value::record_to_json;
use convo_db::{DataError, Record};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub type DBDateTime = chrono::DateTime<chrono::Utc>;

/// Typed view of a stored record
pub fn from_record<T: DeserializeOwned>(record: &Record) -> Result<T, DataError> {
    serde_json::from_value(record_to_json(record)).map_err(|e| {
        DataError::Serialization(format!("record does not match model: {}", e))
    })
}

/// Record holding every non-null field of a model
pub fn to_record<T: Serialize>(model: &T) -> Result<Record, DataError> {
    let mut record = convo_db::value::record_from_json(serde_json::to_value(model)?)?;
    record.retain(|_, v| !v.is_null());
    Ok(record)
}
