use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};

pub const ENTITY: &str = "chat_sessions";
pub const DEFAULT_TITLE: &str = "New Chat";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub title: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub is_archived: bool,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("userId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("workspaceId", FieldType::String).max_length(64))
        .field(
            FieldDef::new("title", FieldType::String)
                .max_length(255)
                .default_value(DEFAULT_TITLE),
        )
        .field(FieldDef::new("provider", FieldType::String).max_length(50))
        .field(FieldDef::new("model", FieldType::String).max_length(100))
        .field(FieldDef::new("systemPrompt", FieldType::Text))
        .field(FieldDef::new("isArchived", FieldType::Boolean).default_value(false))
        .index(&["userId"])
        .index(&["workspaceId"])
        .index(&["userId", "isArchived"])
        .with_timestamps()
}
