use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENTITY: &str = "settings";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub user_id: String,
    pub key: String,
    pub value: Option<Value>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(FieldDef::new("userId", FieldType::String).required().max_length(64))
        .field(FieldDef::new("key", FieldType::String).required().max_length(100))
        .field(FieldDef::new("value", FieldType::Json))
        .index(&["userId", "key"])
        .with_timestamps()
}
