//! Service-level error shared by entity services and route handlers

use crate::problemdetails::{self, Problem};
use axum::http::StatusCode;
use convo_db::DataError;
use thiserror::Error;

/// Failures a service cannot turn into an unsuccessful response itself
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[source] DataError),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration {
            message: message.into(),
        }
    }
}

impl From<DataError> for ServiceError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::Validation(message) => ServiceError::Validation { message },
            DataError::NotFound(resource) => ServiceError::NotFound { resource },
            DataError::DuplicateKey { message, .. } => ServiceError::Conflict { message },
            DataError::ConnectionFailed(message) => ServiceError::Unavailable(message),
            DataError::InvalidConfiguration(message) => ServiceError::Configuration { message },
            other => ServiceError::Database(other),
        }
    }
}

impl From<crate::encryption::CryptoError> for ServiceError {
    fn from(error: crate::encryption::CryptoError) -> Self {
        ServiceError::Encryption(error.to_string())
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<ServiceError> for Problem {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Validation { message } => problemdetails::new(StatusCode::BAD_REQUEST)
                .with_title("Validation Error")
                .with_detail(message),
            ServiceError::NotFound { resource } => problemdetails::new(StatusCode::NOT_FOUND)
                .with_title("Not Found")
                .with_detail(resource),
            ServiceError::Conflict { message } => problemdetails::new(StatusCode::CONFLICT)
                .with_title("Conflict")
                .with_detail(message),
            ServiceError::Unavailable(message) => {
                problemdetails::new(StatusCode::SERVICE_UNAVAILABLE)
                    .with_title("Database Unavailable")
                    .with_detail(message)
            }
            ServiceError::Configuration { message } => {
                problemdetails::new(StatusCode::BAD_REQUEST)
                    .with_title("Invalid Configuration")
                    .with_detail(message)
            }
            _ => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Internal Server Error")
                .with_detail(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_errors_map_to_service_errors() {
        let dup: ServiceError = DataError::duplicate_key("users", "email taken").into();
        assert!(matches!(dup, ServiceError::Conflict { .. }));

        let down: ServiceError = DataError::ConnectionFailed("refused".into()).into();
        assert!(matches!(down, ServiceError::Unavailable(_)));

        let schema: ServiceError = DataError::Schema("no schema".into()).into();
        assert!(matches!(schema, ServiceError::Database(_)));
    }

    #[test]
    fn test_problem_status_codes() {
        let status = |e: ServiceError| Problem::from(e).status_code;
        assert_eq!(status(ServiceError::validation("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::not_found("user u1")), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ServiceError::Conflict {
                message: "dup".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(DataError::QueryFailed("syntax".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
