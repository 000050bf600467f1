use thiserror::Error;

/// Unified error type for all universal database operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Caller-supplied record or query is malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity, record or collection not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated on write
    #[error("Duplicate key on {entity}: {message}")]
    DuplicateKey { entity: String, message: String },

    /// Backend unreachable or misconfigured
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Entity has no registered schema, or the schema could not be materialized
    #[error("Schema error: {0}")]
    Schema(String),

    /// Table, collection or index already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation not supported by this backend
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    /// Generic backend error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DataError::Validation(msg.into())
    }

    /// Create a "not found" error with custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        DataError::NotFound(msg.into())
    }

    /// Create a duplicate key error for an entity
    pub fn duplicate_key(entity: impl Into<String>, msg: impl Into<String>) -> Self {
        DataError::DuplicateKey {
            entity: entity.into(),
            message: msg.into(),
        }
    }

    /// Create an operation not supported error
    pub fn operation_not_supported(msg: impl Into<String>) -> Self {
        DataError::OperationNotSupported(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DataError::DuplicateKey { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, DataError::ConnectionFailed(_))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
