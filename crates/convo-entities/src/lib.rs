//! Schema definitions and typed models for every Convo entity

pub mod chat_messages;
pub mod chat_sessions;
pub mod favorites;
pub mod provider_configs;
pub mod settings;
pub mod types;
pub mod users;
pub mod workspaces;

pub use types::{from_record, to_record, DBDateTime};

use convo_db::{Result, SchemaDefinition, SchemaRegistry};
use tracing::info;

/// Every entity schema, in registration order
pub fn all_schemas() -> Vec<SchemaDefinition> {
    vec![
        users::schema(),
        workspaces::schema(),
        chat_sessions::schema(),
        chat_messages::schema(),
        provider_configs::schema(),
        favorites::schema(),
        settings::schema(),
    ]
}

pub async fn register_all(registry: &SchemaRegistry) -> Result<()> {
    let schemas = all_schemas();
    let count = schemas.len();
    for schema in schemas {
        registry.register(schema).await?;
    }
    info!("Registered {} entity schemas", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_db::{record, DataValue, CREATED_AT, UPDATED_AT};
    use std::collections::HashSet;

    #[test]
    fn test_schemas_are_valid_and_distinct() {
        let schemas = all_schemas();
        let names: HashSet<_> = schemas.iter().map(|s| s.entity.clone()).collect();
        assert_eq!(names.len(), schemas.len());

        for schema in &schemas {
            schema.validate().unwrap();
            assert_eq!(schema.primary_key(), "id");
            assert!(schema.timestamps);
            assert!(schema.get_field(CREATED_AT).is_some());
        }
    }

    #[tokio::test]
    async fn test_register_all() {
        let registry = SchemaRegistry::new();
        register_all(&registry).await.unwrap();
        assert_eq!(registry.list().await.len(), 7);
        assert!(registry.contains(chat_messages::ENTITY).await);
    }

    #[test]
    fn test_model_from_record() {
        let record = record! {
            "id" => "s1",
            "userId" => "u1",
            "title" => "Hello",
            "isArchived" => false,
            "workspaceId" => DataValue::Null,
            CREATED_AT => "2024-05-01T10:00:00.000Z",
            UPDATED_AT => "2024-05-01T10:00:00.000Z"
        };
        let session: chat_sessions::Model = from_record(&record).unwrap();
        assert_eq!(session.title, "Hello");
        assert!(session.workspace_id.is_none());

        let back = to_record(&session).unwrap();
        assert!(!back.contains_key("workspaceId"));
        assert_eq!(back["userId"], DataValue::Text("u1".into()));

        let incomplete = record! { "id" => "s2" };
        assert!(from_record::<chat_sessions::Model>(&incomplete).is_err());
    }
}
