use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENTITY: &str = "workspaces";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub settings: Option<Value>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("ownerId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("name", FieldType::String).required().max_length(100))
        .field(FieldDef::new("description", FieldType::Text))
        .field(FieldDef::new("isDefault", FieldType::Boolean).default_value(false))
        .field(FieldDef::new("settings", FieldType::Json))
        .index(&["ownerId"])
        .with_timestamps()
}
