//! Pieces shared by every Convo crate above the database layer: the
//! service error type, RFC 7807 problem responses and encryption of
//! secrets at rest.

pub mod encryption;
pub mod error;
pub mod problemdetails;

pub use encryption::{CryptoError, EncryptionService};
pub use error::{ServiceError, ServiceResult};
pub use problemdetails::Problem;

// Re-export external dependencies
pub use anyhow;
pub use serde_json;
pub use thiserror;
pub use tracing;
