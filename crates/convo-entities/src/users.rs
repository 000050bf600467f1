use crate::types::DBDateTime;
use convo_db::{FieldDef, FieldType, SchemaDefinition};
use serde::{Deserialize, Serialize};

pub const ENTITY: &str = "users";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DBDateTime>,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

pub fn schema() -> SchemaDefinition {
    SchemaDefinition::new(ENTITY)
        .field(FieldDef::id("id"))
        .field(
            FieldDef::new("email", FieldType::String)
                .required()
                .unique()
                .max_length(255),
        )
        .field(FieldDef::new("name", FieldType::String).max_length(100))
        .field(FieldDef::new("avatarUrl", FieldType::Text))
        .field(
            FieldDef::new("role", FieldType::String)
                .max_length(20)
                .default_value("user"),
        )
        .field(FieldDef::new("isActive", FieldType::Boolean).default_value(true))
        .field(FieldDef::new("lastLoginAt", FieldType::DateTime))
        .index(&["isActive"])
        .with_timestamps()
}
