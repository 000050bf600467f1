//! The translation core every entity service talks to.

use crate::coerce::{coerce_condition, coerce_for_write, normalize_record};
use crate::config::BackendKind;
use crate::error::{DataError, Result};
use crate::provider::ConnectionProvider;
use crate::query::{Condition, QuerySpec};
use crate::registry::SchemaRegistry;
use crate::traits::Backend;
use crate::types::{
    DeleteResult, FieldType, FindManyResult, InsertResult, SchemaDefinition, UpdateResult,
    CREATED_AT, UPDATED_AT,
};
use crate::value::{DataValue, Record};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Backend-agnostic CRUD over registered entities.
///
/// Resolves the entity schema, fetches the live backend from the provider,
/// materialises storage on first use and hands the backend validated,
/// defaulted and coerced input. Rows coming back are normalised to the
/// schema's field types. Missing targets of update/delete are reported as
/// zero counts, never as errors.
pub struct UniversalDatabaseService {
    registry: Arc<SchemaRegistry>,
    provider: Arc<ConnectionProvider>,
    /// (provider generation, entity) pairs whose storage is known to exist
    ensured: RwLock<HashSet<(u64, String)>>,
}

/// Timestamps are kept at millisecond precision so every backend round-trips
/// them unchanged
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn log_failure(operation: &str, entity: &str, err: &DataError) {
    match err {
        DataError::Validation(_) | DataError::DuplicateKey { .. } => {
            debug!("{} on '{}' rejected: {}", operation, entity, err)
        }
        _ => error!("{} on '{}' failed: {}", operation, entity, err),
    }
}

fn check_length(schema: &SchemaDefinition, name: &str, value: &DataValue) -> Result<()> {
    let Some(field) = schema.get_field(name) else {
        return Ok(());
    };
    if let (Some(max), Some(text)) = (field.max_length, value.as_str()) {
        if matches!(field.field_type, FieldType::String | FieldType::Text)
            && text.chars().count() > max
        {
            return Err(DataError::validation(format!(
                "field '{}' exceeds maximum length of {}",
                name, max
            )));
        }
    }
    Ok(())
}

/// Coerce every schema field present in `record`; unknown fields are left
/// for the backend to keep or drop
fn coerce_record(schema: &SchemaDefinition, mut record: Record) -> Result<Record> {
    for field in &schema.fields {
        if let Some(value) = record.remove(&field.name) {
            let value = coerce_for_write(&field.name, field.field_type, value)?;
            check_length(schema, &field.name, &value)?;
            record.insert(field.name.clone(), value);
        }
    }
    Ok(record)
}

fn coerce_conditions(schema: &SchemaDefinition, conditions: &[Condition]) -> Result<Vec<Condition>> {
    conditions
        .iter()
        .map(|c| {
            c.validate()?;
            coerce_condition(schema, c)
        })
        .collect()
}

impl UniversalDatabaseService {
    pub fn new(registry: Arc<SchemaRegistry>, provider: Arc<ConnectionProvider>) -> Self {
        Self {
            registry,
            provider,
            ensured: RwLock::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    /// Kind of the backend currently configured
    pub async fn backend_kind(&self) -> BackendKind {
        self.provider.kind().await
    }

    async fn ensure_on(
        &self,
        schema: &SchemaDefinition,
        backend: &dyn Backend,
        generation: u64,
    ) -> Result<()> {
        let key = (generation, schema.entity.clone());
        if self.ensured.read().await.contains(&key) {
            return Ok(());
        }

        match backend.ensure_schema(schema).await {
            Ok(()) => {
                info!(
                    "Ensured storage for '{}' on {}",
                    schema.entity,
                    backend.kind()
                );
            }
            Err(DataError::AlreadyExists(what)) => {
                debug!("Storage for '{}' already exists: {}", schema.entity, what);
            }
            Err(e) => {
                error!("Failed to ensure storage for '{}': {}", schema.entity, e);
                return Err(e);
            }
        }

        self.ensured.write().await.insert(key);
        Ok(())
    }

    /// Materialise table/collection and indexes for `schema` on the active
    /// backend if absent
    pub async fn ensure(&self, schema: &SchemaDefinition) -> Result<()> {
        let generation = self.provider.generation();
        let (backend, _) = self.provider.get_connection().await?;
        self.ensure_on(schema, backend.as_ref(), generation).await
    }

    /// [`ensure`](Self::ensure) every registered schema
    pub async fn ensure_all(&self) -> Result<()> {
        for schema in self.registry.list().await {
            self.ensure(&schema).await?;
        }
        Ok(())
    }

    /// Schema plus live backend, with storage ensured
    async fn resolve(&self, entity: &str) -> Result<(Arc<SchemaDefinition>, Arc<dyn Backend>)> {
        let schema = self.registry.require(entity).await?;
        let generation = self.provider.generation();
        let (backend, _) = self.provider.get_connection().await?;
        self.ensure_on(&schema, backend.as_ref(), generation).await?;
        Ok((schema, backend))
    }

    fn prepare_insert(&self, schema: &SchemaDefinition, mut record: Record) -> Result<(Record, String)> {
        let pk = schema.primary_key().to_string();
        let id = match record.get(&pk) {
            Some(DataValue::Null) | None => None,
            Some(DataValue::Text(s)) if s.is_empty() => None,
            Some(value) => Some(value.to_string()),
        };
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        record.insert(pk, DataValue::Text(id.clone()));

        for field in &schema.fields {
            let missing = record.get(&field.name).map(DataValue::is_null).unwrap_or(true);
            if missing {
                if let Some(default) = &field.default_value {
                    record.insert(field.name.clone(), default.clone());
                }
            }
        }

        if schema.timestamps {
            let stamp = now();
            let created_missing = record
                .get(CREATED_AT)
                .map(DataValue::is_null)
                .unwrap_or(true);
            if created_missing {
                record.insert(CREATED_AT.to_string(), DataValue::DateTime(stamp));
            }
            record.insert(UPDATED_AT.to_string(), DataValue::DateTime(stamp));
        }

        if let Some(field) = schema
            .fields
            .iter()
            .filter(|f| f.required)
            .find(|f| record.get(&f.name).map(DataValue::is_null).unwrap_or(true))
        {
            return Err(DataError::validation(format!(
                "field '{}' is required on '{}'",
                field.name, schema.entity
            )));
        }

        Ok((coerce_record(schema, record)?, id))
    }

    fn prepare_changes(&self, schema: &SchemaDefinition, mut changes: Record) -> Result<Record> {
        let pk = schema.primary_key();
        if changes.remove(pk).is_some() {
            debug!("Ignoring primary key '{}' in update of '{}'", pk, schema.entity);
        }

        if let Some(field) = schema.fields.iter().filter(|f| f.required).find(|f| {
            changes
                .get(&f.name)
                .map(DataValue::is_null)
                .unwrap_or(false)
        }) {
            return Err(DataError::validation(format!(
                "field '{}' is required on '{}' and cannot be cleared",
                field.name, schema.entity
            )));
        }

        if schema.timestamps {
            changes.insert(UPDATED_AT.to_string(), DataValue::DateTime(now()));
        }

        coerce_record(schema, changes)
    }

    /// Write one record, generating its id when the caller gave none
    pub async fn insert(&self, entity: &str, record: Record) -> Result<InsertResult> {
        let (schema, backend) = self.resolve(entity).await?;
        let (record, id) = self.prepare_insert(&schema, record).inspect_err(|e| {
            log_failure("insert", entity, e);
        })?;

        debug!("Inserting '{}' record {}", entity, id);
        backend
            .insert(&schema, &record)
            .await
            .inspect_err(|e| log_failure("insert", entity, e))?;

        Ok(InsertResult {
            success: true,
            id: Some(id),
        })
    }

    /// First match or `None`
    pub async fn find_one(&self, entity: &str, query: QuerySpec) -> Result<Option<Record>> {
        let query = QuerySpec {
            limit: Some(1),
            offset: None,
            ..query
        };
        let (schema, backend) = self.resolve(entity).await?;
        query.validate()?;
        let query = QuerySpec {
            conditions: coerce_conditions(&schema, &query.conditions)?,
            ..query
        };

        let rows = backend
            .find(&schema, &query)
            .await
            .inspect_err(|e| log_failure("find_one", entity, e))?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| normalize_record(&schema, row)))
    }

    /// Matching page plus the full match count
    pub async fn find_many(&self, entity: &str, query: QuerySpec) -> Result<FindManyResult> {
        let (schema, backend) = self.resolve(entity).await?;
        query.validate()?;
        let query = QuerySpec {
            conditions: coerce_conditions(&schema, &query.conditions)?,
            ..query
        };

        let rows = backend
            .find(&schema, &query)
            .await
            .inspect_err(|e| log_failure("find_many", entity, e))?;

        let total = if query.limit.is_none() && query.offset.is_none() {
            rows.len() as u64
        } else {
            backend
                .count(&schema, &query.conditions)
                .await
                .inspect_err(|e| log_failure("find_many", entity, e))?
        };

        Ok(FindManyResult {
            data: rows
                .into_iter()
                .map(|row| normalize_record(&schema, row))
                .collect(),
            total,
        })
    }

    pub async fn find_by_id(&self, entity: &str, id: &str) -> Result<Option<Record>> {
        let schema = self.registry.require(entity).await?;
        let query = QuerySpec::new().where_eq(schema.primary_key(), id);
        self.find_one(entity, query).await
    }

    /// Merge `partial` into the record with `id`; `modified_count == 0` when
    /// no such record exists
    pub async fn update(&self, entity: &str, id: &str, partial: Record) -> Result<UpdateResult> {
        let schema = self.registry.require(entity).await?;
        let query = QuerySpec::new().where_eq(schema.primary_key(), id);
        self.update_many(entity, partial, query).await
    }

    pub async fn update_many(
        &self,
        entity: &str,
        partial: Record,
        query: QuerySpec,
    ) -> Result<UpdateResult> {
        let (schema, backend) = self.resolve(entity).await?;
        let conditions = coerce_conditions(&schema, &query.conditions)?;
        let changes = self
            .prepare_changes(&schema, partial)
            .inspect_err(|e| log_failure("update", entity, e))?;

        if changes.is_empty() {
            debug!("Empty update on '{}', nothing to write", entity);
            return Ok(UpdateResult {
                success: true,
                modified_count: 0,
            });
        }

        let modified_count = backend
            .update(&schema, &conditions, &changes)
            .await
            .inspect_err(|e| log_failure("update", entity, e))?;

        Ok(UpdateResult {
            success: true,
            modified_count,
        })
    }

    pub async fn delete(&self, entity: &str, id: &str) -> Result<DeleteResult> {
        let schema = self.registry.require(entity).await?;
        let query = QuerySpec::new().where_eq(schema.primary_key(), id);
        self.delete_many(entity, query).await
    }

    pub async fn delete_many(&self, entity: &str, query: QuerySpec) -> Result<DeleteResult> {
        let (schema, backend) = self.resolve(entity).await?;
        let conditions = coerce_conditions(&schema, &query.conditions)?;
        if conditions.is_empty() {
            warn!("Deleting every record of '{}'", entity);
        }

        let deleted_count = backend
            .delete(&schema, &conditions)
            .await
            .inspect_err(|e| log_failure("delete", entity, e))?;

        Ok(DeleteResult {
            success: true,
            deleted_count,
        })
    }

    pub async fn count(&self, entity: &str, query: QuerySpec) -> Result<u64> {
        let (schema, backend) = self.resolve(entity).await?;
        let conditions = coerce_conditions(&schema, &query.conditions)?;
        backend
            .count(&schema, &conditions)
            .await
            .inspect_err(|e| log_failure("count", entity, e))
    }

    pub async fn exists(&self, entity: &str, query: QuerySpec) -> Result<bool> {
        Ok(self.count(entity, query).await? > 0)
    }
}
