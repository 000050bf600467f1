use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENTITY: &str = "provider_configs";

/// Stored provider credentials; `api_key` holds the encrypted key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub name: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub models: Option<Value>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("userId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("provider", FieldType::String).required().max_length(50))
        .field(FieldDef::new("name", FieldType::String).max_length(100))
        .field(FieldDef::new("apiKey", FieldType::Text).required())
        .field(FieldDef::new("baseUrl", FieldType::Text))
        .field(FieldDef::new("models", FieldType::Json))
        .field(FieldDef::new("isDefault", FieldType::Boolean).default_value(false))
        .field(FieldDef::new("isActive", FieldType::Boolean).default_value(true))
        .index(&["userId"])
        .index(&["userId", "provider"])
        .with_timestamps()
}
