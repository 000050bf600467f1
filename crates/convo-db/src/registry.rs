use crate::error::{DataError, Result};
use crate::types::SchemaDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Entity name → schema definition, populated at startup and read-only after
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<SchemaDefinition>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register a schema; re-registering an entity replaces the old definition
    pub async fn register(&self, schema: SchemaDefinition) -> Result<()> {
        // Definitions loaded from JSON may set the flag without the fields
        let schema = if schema.timestamps {
            schema.with_timestamps()
        } else {
            schema
        };
        schema.validate()?;

        let mut schemas = self.schemas.write().await;
        if schemas.contains_key(&schema.entity) {
            warn!("Overwriting existing schema for entity: {}", schema.entity);
        }

        debug!("Registered schema for entity: {}", schema.entity);
        schemas.insert(schema.entity.clone(), Arc::new(schema));
        Ok(())
    }

    pub async fn get(&self, entity: &str) -> Option<Arc<SchemaDefinition>> {
        self.schemas.read().await.get(entity).cloned()
    }

    /// Like [`get`](Self::get) but an unknown entity is a schema error
    pub async fn require(&self, entity: &str) -> Result<Arc<SchemaDefinition>> {
        self.get(entity).await.ok_or_else(|| {
            DataError::Schema(format!("No schema registered for entity: {}", entity))
        })
    }

    /// All registered schemas, sorted by entity name
    pub async fn list(&self) -> Vec<Arc<SchemaDefinition>> {
        let mut schemas: Vec<_> = self.schemas.read().await.values().cloned().collect();
        schemas.sort_by(|a, b| a.entity.cmp(&b.entity));
        schemas
    }

    pub async fn contains(&self, entity: &str) -> bool {
        self.schemas.read().await.contains_key(entity)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
