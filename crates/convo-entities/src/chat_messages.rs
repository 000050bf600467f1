use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENTITY: &str = "chat_messages";

/// Author roles a message can carry
pub const ROLES: [&str; 3] = ["user", "assistant", "system"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub model: Option<String>,
    pub tokens: Option<i64>,
    pub metadata: Option<Value>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("sessionId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("role", FieldType::String).required().max_length(20))
        .field(FieldDef::new("content", FieldType::Text).required())
        .field(FieldDef::new("model", FieldType::String).max_length(100))
        .field(FieldDef::new("tokens", FieldType::Integer))
        .field(FieldDef::new("metadata", FieldType::Json))
        .index(&["sessionId"])
        .with_timestamps()
}
