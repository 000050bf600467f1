use crate::config::BackendKind;
use crate::error::Result;
use crate::query::{Condition, QuerySpec};
use crate::types::SchemaDefinition;
use crate::value::Record;
use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};

/// Capability interface every concrete backend implements.
///
/// Backends receive already validated, defaulted and type-coerced input from
/// [`crate::UniversalDatabaseService`]; they only translate it into native
/// statements/calls and hand back raw rows. Driver errors must be converted
/// into [`crate::DataError`] here, with unique violations reported as
/// `DuplicateKey` and an existing table/index as `AlreadyExists`.
#[async_trait]
pub trait Backend: Send + Sync + Downcast {
    /// Which kind of backend this is
    fn kind(&self) -> BackendKind;

    /// Create the table/collection and indexes for a schema if absent
    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()>;

    /// Write one record
    async fn insert(&self, schema: &SchemaDefinition, record: &Record) -> Result<()>;

    /// Read matching records, honouring order, limit, offset and select
    async fn find(&self, schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<Record>>;

    /// Count matching records
    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64>;

    /// Merge `changes` into every matching record, returning how many changed
    async fn update(
        &self,
        schema: &SchemaDefinition,
        conditions: &[Condition],
        changes: &Record,
    ) -> Result<u64>;

    /// Remove every matching record, returning how many were removed
    async fn delete(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64>;

    /// Cheap round trip proving the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Close the connection gracefully
    async fn close(&self) -> Result<()>;
}

impl_downcast!(Backend);
