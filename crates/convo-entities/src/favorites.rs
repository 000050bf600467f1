use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};

pub const ENTITY: &str = "favorites";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub user_id: String,
    /// What is pinned: `session`, `model`, `prompt`
    pub item_type: String,
    pub item_id: String,
    pub label: Option<String>,
    pub sort_order: i64,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("userId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("itemType", FieldType::String).required().max_length(20))
        .field(FieldDef::new("itemId", FieldType::String).required().max_length(255))
        .field(FieldDef::new("label", FieldType::String).max_length(255))
        .field(FieldDef::new("sortOrder", FieldType::Integer).default_value(0))
        .index(&["userId"])
        .index(&["userId", "itemType", "itemId"])
        .with_timestamps()
}
