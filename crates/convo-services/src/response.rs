use convo_core::{ServiceError, ServiceResult};
use convo_db::{DataError, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why a [`ServiceResponse`] is unsuccessful
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Invalid,
    NotFound,
    Conflict,
}

/// Uniform result of an entity service call.
///
/// Expected failures (bad input, duplicates, missing records) come back as
/// `success: false` with a message; `Err(ServiceError)` is reserved for the
/// unexpected ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip)]
    pub failure: Option<Failure>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            failure: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn failed(failure: Failure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            failure: Some(failure),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::failed(Failure::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failed(Failure::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::failed(Failure::Conflict, message)
    }

    /// Same failure, different payload type
    pub fn cast<U>(self) -> ServiceResponse<U> {
        ServiceResponse {
            success: self.success,
            message: self.message,
            data: None,
            failure: self.failure,
        }
    }
}

impl ServiceResponse<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            failure: None,
        }
    }
}

/// Turn expected database failures into unsuccessful responses
pub fn recover<T>(error: DataError) -> ServiceResult<ServiceResponse<T>> {
    match error {
        DataError::Validation(message) => {
            debug!("Rejected: {}", message);
            Ok(ServiceResponse::invalid(message))
        }
        DataError::DuplicateKey { entity, message } => {
            debug!("Duplicate on {}: {}", entity, message);
            Ok(ServiceResponse::conflict(format!("{} already exists", entity)))
        }
        other => Err(ServiceError::from(other)),
    }
}

/// A page of results plus the full match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Clamp caller paging to sane bounds
pub fn paging(limit: Option<u64>, offset: Option<u64>) -> (u64, u64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (limit, offset.unwrap_or(0))
}

pub fn model<T: DeserializeOwned>(record: &Record) -> ServiceResult<T> {
    Ok(convo_entities::from_record(record)?)
}

pub fn models<T: DeserializeOwned>(records: &[Record]) -> ServiceResult<Vec<T>> {
    records.iter().map(model).collect()
}
