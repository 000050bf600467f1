use crate::config::BackendKind;
use crate::value::{DataValue, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the creation timestamp stamped on entities with `timestamps`
pub const CREATED_AT: &str = "createdAt";
/// Name of the modification timestamp stamped on entities with `timestamps`
pub const UPDATED_AT: &str = "updatedAt";

/// Logical field types understood by every backend
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Short string, bounded by `max_length`
    String,
    /// Unbounded text
    Text,
    /// 64-bit signed integer
    Integer,
    /// 64-bit floating point
    Float,
    /// Boolean true/false
    Boolean,
    /// UTC timestamp
    DateTime,
    /// Structured JSON
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Text => write!(f, "text"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Json => write!(f, "json"),
        }
    }
}

/// Definition of a single field in an entity schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DataValue>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary_key: false,
            required: false,
            unique: false,
            max_length: None,
            default_value: None,
        }
    }

    /// String primary key; implies required and unique
    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String).primary_key()
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn default_value(mut self, value: impl Into<DataValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Declarative, backend-agnostic shape of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Logical entity name used by callers
    pub entity: String,
    /// Table name for SQL-style backends
    pub table_name: String,
    /// Collection name for document backends
    pub collection_name: String,
    pub fields: Vec<FieldDef>,
    /// Ordered field-name tuples, one index each
    #[serde(default)]
    pub indexes: Vec<Vec<String>>,
    /// Stamp `createdAt` / `updatedAt` automatically
    #[serde(default)]
    pub timestamps: bool,
}

impl SchemaDefinition {
    /// Start a schema whose table and collection share the entity name
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            table_name: entity.clone(),
            collection_name: entity.clone(),
            entity,
            fields: Vec::new(),
            indexes: Vec::new(),
            timestamps: false,
        }
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, fields: &[&str]) -> Self {
        self.indexes
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Enable automatic timestamps, adding the two fields when missing
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        for name in [CREATED_AT, UPDATED_AT] {
            if self.get_field(name).is_none() {
                self.fields.push(FieldDef::new(name, FieldType::DateTime));
            }
        }
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name of the primary key field, `id` when none is declared
    pub fn primary_key(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .unwrap_or("id")
    }

    /// Physical table or collection name on a given backend
    pub fn storage_name(&self, kind: BackendKind) -> &str {
        if kind.is_document() {
            &self.collection_name
        } else {
            &self.table_name
        }
    }

    /// Structural checks performed at registration
    pub fn validate(&self) -> crate::Result<()> {
        if self.entity.trim().is_empty() {
            return Err(crate::DataError::Schema("entity name is empty".to_string()));
        }
        if self.fields.iter().filter(|f| f.primary_key).count() > 1 {
            return Err(crate::DataError::Schema(format!(
                "entity '{}' declares more than one primary key",
                self.entity
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(crate::DataError::Schema(format!(
                    "entity '{}' declares field '{}' twice",
                    self.entity, field.name
                )));
            }
        }
        for index in &self.indexes {
            if index.is_empty() {
                return Err(crate::DataError::Schema(format!(
                    "entity '{}' has an empty index",
                    self.entity
                )));
            }
            if let Some(missing) = index.iter().find(|f| self.get_field(f).is_none()) {
                return Err(crate::DataError::Schema(format!(
                    "index on '{}' references unknown field '{}'",
                    self.entity, missing
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a single insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResult {
    pub success: bool,
    /// Primary key of the stored record (generated when the caller gave none)
    pub id: Option<String>,
}

/// Outcome of `find_many`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindManyResult {
    pub data: Vec<Record>,
    /// Full match count, ignoring limit/offset
    pub total: u64,
}

/// Outcome of update operations; `modified_count == 0` means nothing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub success: bool,
    pub modified_count: u64,
}

/// Outcome of delete operations; `deleted_count == 0` means nothing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub deleted_count: u64,
}
