//! # convo-db
//!
//! Backend-agnostic data access for Convo.
//!
//! One declarative [`SchemaDefinition`] per entity and one small query
//! language ([`QuerySpec`] / [`Condition`]) are mapped onto five storage
//! backends:
//! - MongoDB (Document)
//! - PostgreSQL (SQL)
//! - MySQL (SQL)
//! - SQLite (Embedded SQL file)
//! - Supabase (Hosted PostgREST API)
//!
//! ## Architecture
//!
//! - **SchemaRegistry**: entity name → schema, populated at startup
//! - **ConnectionProvider**: lazily connects and caches the configured backend
//! - **Backend**: capability trait each backend crate implements
//! - **UniversalDatabaseService**: validates, defaults and coerces input,
//!   materialises storage on first use, dispatches to the backend and
//!   normalises rows on the way back
//!
//! ## Example
//!
//! ```rust
//! use convo_db::{
//!     record, BackendConfig, ConnectionProvider, FieldDef, FieldType, QuerySpec,
//!     SchemaDefinition, SchemaRegistry, UniversalDatabaseService,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> convo_db::Result<()> {
//! let registry = Arc::new(SchemaRegistry::new());
//! registry
//!     .register(
//!         SchemaDefinition::new("users")
//!             .field(FieldDef::id("id"))
//!             .field(FieldDef::new("email", FieldType::String).required().unique())
//!             .with_timestamps(),
//!     )
//!     .await?;
//!
//! let provider = Arc::new(ConnectionProvider::new(BackendConfig::sqlite(":memory:")));
//! // provider.register_factory(Arc::new(SqliteBackendFactory)).await;
//!
//! let db = UniversalDatabaseService::new(registry, provider);
//! // db.insert("users", record! { "email" => "a@x.com" }).await?;
//! // db.find_one("users", QuerySpec::new().where_eq("email", "a@x.com")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backend Implementation
//!
//! To add a backend:
//!
//! 1. Create a struct that implements [`Backend`]
//! 2. Create a [`BackendFactory`] for it
//! 3. Register the factory with the [`ConnectionProvider`]
//!
//! Backend crates:
//! - `convo-db-mongodb`
//! - `convo-db-postgres`
//! - `convo-db-mysql`
//! - `convo-db-sqlite`
//! - `convo-db-supabase`

pub mod coerce;
pub mod config;
pub mod error;
pub mod provider;
pub mod query;
pub mod registry;
pub mod service;
pub mod sql;
pub mod traits;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use config::{BackendConfig, BackendKind};
pub use error::{DataError, Result};
pub use provider::{BackendFactory, ConnectionProvider};
pub use query::{Condition, Operator, OrderBy, QuerySpec, SortDirection};
pub use registry::SchemaRegistry;
pub use service::UniversalDatabaseService;
pub use traits::Backend;
pub use types::{
    DeleteResult, FieldDef, FieldType, FindManyResult, InsertResult, SchemaDefinition,
    UpdateResult, CREATED_AT, UPDATED_AT,
};
pub use value::{DataValue, Record};
