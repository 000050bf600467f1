use convo_core::EncryptionService;
use async_trait::async_trait;
use convo_db::{
    record, Backend, BackendConfig, BackendFactory, BackendKind, Condition, ConnectionProvider,
    DataError, QuerySpec, Record, SchemaDefinition,
};
use convo_db_sqlite::{SqliteBackendFactory, MEMORY_PATH};
use convo_entities::provider_configs;
use convo_services::{
    AddFavoriteRequest, AddMessageRequest, AppContext, ConfigStore, CreateProviderConfigRequest,
    CreateSessionRequest, CreateUserRequest, CreateWorkspaceRequest, Failure, FileConfigStore,
    ListSessionsQuery, UpdateProviderConfigRequest, UpdateSessionRequest, UpdateUserRequest,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const OPENAI_KEY: &str = "sk-abcdefghijklmnopqrstuvwxyz0123";
const ANTHROPIC_KEY: &str = "sk-ant-REDACTED";

struct Harness {
    ctx: AppContext,
    store: Arc<FileConfigStore>,
    dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileConfigStore::in_dir(dir.path()));
    let provider = Arc::new(ConnectionProvider::new(BackendConfig::sqlite(MEMORY_PATH)));
    provider.register_factory(Arc::new(SqliteBackendFactory)).await;
    let encryption = Arc::new(EncryptionService::from_passphrase("test secret"));

    let ctx = AppContext::new(provider, encryption, store.clone())
        .await
        .unwrap();
    Harness { ctx, store, dir }
}

async fn create_user(ctx: &AppContext, email: &str) -> String {
    let response = ctx
        .users
        .create(CreateUserRequest {
            email: email.to_string(),
            name: Some("Ada".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(response.success, "{:?}", response.message);
    response.data.unwrap().id
}

// Users

#[tokio::test]
async fn test_user_lifecycle() {
    let h = harness().await;
    let users = &h.ctx.users;

    let created = users
        .create(CreateUserRequest {
            email: "  Ada@Example.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let user = created.data.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.role, "user");
    assert!(user.is_active);

    let by_email = users.get_by_email("ADA@example.com").await.unwrap();
    assert_eq!(by_email.data.unwrap().id, user.id);

    let updated = users
        .update(
            &user.id,
            UpdateUserRequest {
                name: Some("Ada Lovelace".to_string()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Ada Lovelace"));
    assert!(!updated.is_active);
    assert!(updated.updated_at >= updated.created_at);

    assert!(users.delete(&user.id).await.unwrap().success);
    let gone = users.get(&user.id).await.unwrap();
    assert!(!gone.success);
    assert_eq!(gone.failure, Some(Failure::NotFound));
}

#[tokio::test]
async fn test_user_validation_and_duplicates() {
    let h = harness().await;
    let users = &h.ctx.users;

    let invalid = users
        .create(CreateUserRequest {
            email: "nope".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(invalid.failure, Some(Failure::Invalid));

    let bad_role = users
        .create(CreateUserRequest {
            email: "a@x.com".to_string(),
            role: Some("root".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bad_role.failure, Some(Failure::Invalid));

    create_user(&h.ctx, "a@x.com").await;
    let duplicate = users
        .create(CreateUserRequest {
            email: "A@X.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!duplicate.success);
    assert_eq!(duplicate.failure, Some(Failure::Conflict));

    let other = create_user(&h.ctx, "b@x.com").await;
    let steal = users
        .update(
            &other,
            UpdateUserRequest {
                email: Some("a@x.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(steal.failure, Some(Failure::Conflict));

    let missing = users
        .update("nobody", UpdateUserRequest::default())
        .await
        .unwrap();
    assert_eq!(missing.failure, Some(Failure::NotFound));
}

#[tokio::test]
async fn test_user_list_pagination() {
    let h = harness().await;
    for i in 0..5 {
        create_user(&h.ctx, &format!("user{}@x.com", i)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let page = h.ctx.users.list(Some(2), Some(1)).await.unwrap().data.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.limit, 2);
    assert_eq!(page.offset, 1);
    let emails: Vec<_> = page.items.iter().map(|u| u.email.as_str()).collect();
    assert_eq!(emails, vec!["user3@x.com", "user2@x.com"]);
}

// Workspaces

#[tokio::test]
async fn test_workspaces_are_scoped_to_owner() {
    let h = harness().await;
    let workspaces = &h.ctx.workspaces;

    let created = workspaces
        .create(
            "owner-1",
            CreateWorkspaceRequest {
                name: " Research ".to_string(),
                settings: Some(json!({"color": "blue"})),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(created.name, "Research");
    assert!(!created.is_default);
    assert_eq!(created.settings, Some(json!({"color": "blue"})));

    let foreign = workspaces.get("owner-2", &created.id).await.unwrap();
    assert_eq!(foreign.failure, Some(Failure::NotFound));
    assert!(workspaces
        .list_for_owner("owner-2")
        .await
        .unwrap()
        .data
        .unwrap()
        .is_empty());

    let not_deleted = workspaces.delete("owner-2", &created.id).await.unwrap();
    assert_eq!(not_deleted.failure, Some(Failure::NotFound));

    assert!(workspaces.delete("owner-1", &created.id).await.unwrap().success);
    assert!(workspaces
        .list_for_owner("owner-1")
        .await
        .unwrap()
        .data
        .unwrap()
        .is_empty());
}

// Chat

#[tokio::test]
async fn test_chat_session_and_messages() {
    let h = harness().await;
    let chat = &h.ctx.chat;

    let session = chat
        .create_session("u1", CreateSessionRequest::default())
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(session.title, "New Chat");
    assert!(!session.is_archived);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let first = chat
        .add_message(
            "u1",
            &session.id,
            AddMessageRequest {
                role: "user".to_string(),
                content: "Hello".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(first.session_id, session.id);

    tokio::time::sleep(Duration::from_millis(5)).await;
    chat.add_message(
        "u1",
        &session.id,
        AddMessageRequest {
            role: "assistant".to_string(),
            content: "Hi there".to_string(),
            tokens: Some(3),
            metadata: Some(json!({"finish": "stop"})),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // Adding a message bumps the session
    let touched = chat.get_session("u1", &session.id).await.unwrap().data.unwrap();
    assert!(touched.updated_at > session.updated_at);

    let messages = chat
        .list_messages("u1", &session.id, None, None)
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(messages.total, 2);
    let contents: Vec<_> = messages.items.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello", "Hi there"]);
    assert_eq!(messages.items[1].tokens, Some(3));
    assert_eq!(messages.limit, 20);

    let second = chat
        .list_messages("u1", &session.id, Some(1), Some(1))
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].content, "Hi there");

    let capped = chat
        .list_messages("u1", &session.id, Some(10_000), None)
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(capped.limit, 100);
    assert_eq!(capped.items.len(), 2);

    let bad_role = chat
        .add_message(
            "u1",
            &session.id,
            AddMessageRequest {
                role: "robot".to_string(),
                content: "beep".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(bad_role.failure, Some(Failure::Invalid));

    let intruder = chat
        .list_messages("u2", &session.id, None, None)
        .await
        .unwrap();
    assert_eq!(intruder.failure, Some(Failure::NotFound));
}

#[tokio::test]
async fn test_archived_sessions_are_hidden_by_default() {
    let h = harness().await;
    let chat = &h.ctx.chat;

    let keep = chat
        .create_session(
            "u1",
            CreateSessionRequest {
                title: Some("Keep".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    let archive = chat
        .create_session(
            "u1",
            CreateSessionRequest {
                title: Some("Old".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();

    let archived = chat
        .update_session(
            "u1",
            &archive.id,
            UpdateSessionRequest {
                is_archived: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(archived.is_archived);

    let visible = chat
        .list_sessions("u1", ListSessionsQuery::default())
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(visible.total, 1);
    assert_eq!(visible.items[0].id, keep.id);

    let all = chat
        .list_sessions(
            "u1",
            ListSessionsQuery {
                include_archived: true,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(all.total, 2);

    let empty_title = chat
        .update_session(
            "u1",
            &keep.id,
            UpdateSessionRequest {
                title: Some("  ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(empty_title.failure, Some(Failure::Invalid));
}

#[tokio::test]
async fn test_deleting_session_removes_its_messages() {
    let h = harness().await;
    let chat = &h.ctx.chat;

    let session = chat
        .create_session("u1", CreateSessionRequest::default())
        .await
        .unwrap()
        .data
        .unwrap();
    let other = chat
        .create_session("u1", CreateSessionRequest::default())
        .await
        .unwrap()
        .data
        .unwrap();
    for (id, content) in [(&session.id, "one"), (&session.id, "two"), (&other.id, "three")] {
        chat.add_message(
            "u1",
            id,
            AddMessageRequest {
                role: "user".to_string(),
                content: content.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    assert!(chat.delete_session("u1", &session.id).await.unwrap().success);

    let remaining = h
        .ctx
        .db
        .count(convo_entities::chat_messages::ENTITY, Default::default())
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert_eq!(
        chat.get_session("u1", &session.id).await.unwrap().failure,
        Some(Failure::NotFound)
    );
}

// Provider configs

#[tokio::test]
async fn test_provider_keys_are_encrypted_and_masked() {
    let h = harness().await;
    let configs = &h.ctx.provider_configs;

    let view = configs
        .create(
            "u1",
            CreateProviderConfigRequest {
                provider: "openai".to_string(),
                api_key: OPENAI_KEY.to_string(),
                name: Some("Work".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(view.api_key, "sk-a...0123");
    assert!(view.is_active);

    let stored = h
        .ctx
        .db
        .find_by_id(provider_configs::ENTITY, &view.id)
        .await
        .unwrap()
        .unwrap();
    let ciphertext = stored["apiKey"].as_str().unwrap();
    assert_ne!(ciphertext, OPENAI_KEY);

    let plain = configs.api_key("u1", &view.id).await.unwrap().data.unwrap();
    assert_eq!(plain, OPENAI_KEY);

    let wrong_format = configs
        .create(
            "u1",
            CreateProviderConfigRequest {
                provider: "anthropic".to_string(),
                api_key: OPENAI_KEY.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(wrong_format.failure, Some(Failure::Invalid));

    let unknown = configs
        .create(
            "u1",
            CreateProviderConfigRequest {
                provider: "mistral".to_string(),
                api_key: OPENAI_KEY.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unknown.failure, Some(Failure::Invalid));

    let updated = configs
        .update(
            "u1",
            &view.id,
            UpdateProviderConfigRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(!updated.is_active);
}

#[tokio::test]
async fn test_unencrypted_keys_fall_back_to_stored_text() {
    let h = harness().await;
    let inserted = h
        .ctx
        .db
        .insert(
            provider_configs::ENTITY,
            record! {
                "userId" => "u1",
                "provider" => "anthropic",
                "apiKey" => ANTHROPIC_KEY
            },
        )
        .await
        .unwrap();
    let id = inserted.id.unwrap();

    let view = h.ctx.provider_configs.get("u1", &id).await.unwrap().data.unwrap();
    assert_eq!(view.api_key, "sk-a...wxyz");
    let plain = h.ctx.provider_configs.api_key("u1", &id).await.unwrap().data.unwrap();
    assert_eq!(plain, ANTHROPIC_KEY);
}

#[tokio::test]
async fn test_set_default_leaves_exactly_one_default() {
    let h = harness().await;
    let configs = &h.ctx.provider_configs;

    let first = configs
        .create(
            "u1",
            CreateProviderConfigRequest {
                provider: "openai".to_string(),
                api_key: OPENAI_KEY.to_string(),
                is_default: true,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(first.is_default);

    let second = configs
        .create(
            "u1",
            CreateProviderConfigRequest {
                provider: "anthropic".to_string(),
                api_key: ANTHROPIC_KEY.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(!second.is_default);

    configs.set_default("u1", &second.id).await.unwrap();

    let all = configs.list("u1").await.unwrap().data.unwrap();
    let defaults: Vec<_> = all.iter().filter(|c| c.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, second.id);

    let default = configs.get_default("u1").await.unwrap().data.unwrap();
    assert_eq!(default.provider, "anthropic");

    assert_eq!(
        configs.get_default("u2").await.unwrap().failure,
        Some(Failure::NotFound)
    );
    assert_eq!(
        configs.set_default("u2", &first.id).await.unwrap().failure,
        Some(Failure::NotFound)
    );
}

// Favorites

#[tokio::test]
async fn test_favorites_add_reorder_remove() {
    let h = harness().await;
    let favorites = &h.ctx.favorites;

    let mut ids = Vec::new();
    for item in ["s1", "s2", "s3"] {
        let favorite = favorites
            .add(
                "u1",
                AddFavoriteRequest {
                    item_type: "session".to_string(),
                    item_id: item.to_string(),
                    label: None,
                },
            )
            .await
            .unwrap()
            .data
            .unwrap();
        ids.push(favorite.id);
    }

    let duplicate = favorites
        .add(
            "u1",
            AddFavoriteRequest {
                item_type: "session".to_string(),
                item_id: "s2".to_string(),
                label: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(duplicate.failure, Some(Failure::Conflict));

    let bad_type = favorites
        .add(
            "u1",
            AddFavoriteRequest {
                item_type: "planet".to_string(),
                item_id: "earth".to_string(),
                label: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(bad_type.failure, Some(Failure::Invalid));

    let listed = favorites.list("u1").await.unwrap().data.unwrap();
    let order: Vec<_> = listed.iter().map(|f| f.sort_order).collect();
    assert_eq!(order, vec![0, 1, 2]);

    let reversed: Vec<String> = ids.iter().rev().cloned().collect();
    let reordered = favorites.reorder("u1", &reversed).await.unwrap().data.unwrap();
    let items: Vec<_> = reordered.iter().map(|f| f.item_id.as_str()).collect();
    assert_eq!(items, vec!["s3", "s2", "s1"]);

    assert!(favorites.remove("u1", &ids[0]).await.unwrap().success);
    assert_eq!(
        favorites.remove("u1", &ids[0]).await.unwrap().failure,
        Some(Failure::NotFound)
    );
    assert_eq!(favorites.list("u1").await.unwrap().data.unwrap().len(), 2);
}

// Settings

#[tokio::test]
async fn test_settings_upsert() {
    let h = harness().await;
    let settings = &h.ctx.settings;

    assert_eq!(
        settings.get("u1", "theme").await.unwrap().failure,
        Some(Failure::NotFound)
    );

    settings.set("u1", "theme", json!("dark")).await.unwrap();
    settings
        .set("u1", "editor", json!({"fontSize": 14}))
        .await
        .unwrap();
    let overwritten = settings.set("u1", "theme", json!("light")).await.unwrap();
    assert!(overwritten.success);

    assert_eq!(
        settings.get("u1", "theme").await.unwrap().data.unwrap(),
        json!("light")
    );
    let rows = h
        .ctx
        .db
        .count(convo_entities::settings::ENTITY, Default::default())
        .await
        .unwrap();
    assert_eq!(rows, 2);

    let all = settings.list("u1").await.unwrap().data.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["editor"], json!({"fontSize": 14}));

    assert!(settings.list("u2").await.unwrap().data.unwrap().is_empty());
    assert!(settings.delete("u1", "theme").await.unwrap().success);
    assert_eq!(
        settings.delete("u1", "theme").await.unwrap().failure,
        Some(Failure::NotFound)
    );
}

// Setup

#[tokio::test]
async fn test_setup_test_and_apply() {
    let h = harness().await;
    let setup = &h.ctx.setup;

    let status = setup.status().await.unwrap().data.unwrap();
    assert!(!status.configured);
    assert_eq!(status.backend, BackendKind::Sqlite);
    assert!(status.connected);

    let incomplete = setup
        .test(&BackendConfig::new(BackendKind::Sqlite))
        .await
        .unwrap();
    assert_eq!(incomplete.failure, Some(Failure::Invalid));

    let unregistered = setup
        .apply(BackendConfig::new(BackendKind::Postgres).with_url("postgres://localhost/convo"))
        .await
        .unwrap();
    assert!(!unregistered.success);
    assert!(h.store.load().await.unwrap().is_none());

    let file = h.dir.path().join("convo.db");
    let config = BackendConfig::sqlite(file.to_string_lossy());
    assert!(setup.test(&config).await.unwrap().success);

    let applied = setup.apply(config.clone()).await.unwrap().data.unwrap();
    assert!(applied.configured);
    assert!(applied.connected);
    assert_eq!(h.store.load().await.unwrap(), Some(config.clone()));

    // The new backend is live and has every table
    let user = create_user(&h.ctx, "after@x.com").await;
    assert!(h.ctx.users.get(&user).await.unwrap().success);
    assert!(file.exists());

    // Once saved, only the operator path may change the backend
    let other = BackendConfig::sqlite(h.dir.path().join("other.db").to_string_lossy());
    let again = setup.apply(other.clone()).await.unwrap();
    assert_eq!(again.failure, Some(Failure::Conflict));
    assert_eq!(h.store.load().await.unwrap(), Some(config));

    let switched = setup.switch(other.clone()).await.unwrap();
    assert!(switched.success, "{:?}", switched.message);
    assert_eq!(h.store.load().await.unwrap(), Some(other));
}

/// Connects and pings fine but cannot create tables
struct UnprovisionableFactory;

struct UnprovisionableBackend;

#[async_trait]
impl Backend for UnprovisionableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }
    async fn ensure_schema(&self, schema: &SchemaDefinition) -> convo_db::Result<()> {
        Err(DataError::QueryFailed(format!(
            "permission denied to create {}",
            schema.table_name
        )))
    }
    async fn insert(&self, _: &SchemaDefinition, _: &Record) -> convo_db::Result<()> {
        Ok(())
    }
    async fn find(&self, _: &SchemaDefinition, _: &QuerySpec) -> convo_db::Result<Vec<Record>> {
        Ok(Vec::new())
    }
    async fn count(&self, _: &SchemaDefinition, _: &[Condition]) -> convo_db::Result<u64> {
        Ok(0)
    }
    async fn update(
        &self,
        _: &SchemaDefinition,
        _: &[Condition],
        _: &Record,
    ) -> convo_db::Result<u64> {
        Ok(0)
    }
    async fn delete(&self, _: &SchemaDefinition, _: &[Condition]) -> convo_db::Result<u64> {
        Ok(0)
    }
    async fn ping(&self) -> convo_db::Result<()> {
        Ok(())
    }
    async fn close(&self) -> convo_db::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BackendFactory for UnprovisionableFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }
    async fn connect(&self, _: &BackendConfig) -> convo_db::Result<Arc<dyn Backend>> {
        Ok(Arc::new(UnprovisionableBackend))
    }
}

#[tokio::test]
async fn test_failed_apply_restores_previous_backend() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("live.db");
    let provider = Arc::new(ConnectionProvider::new(BackendConfig::sqlite(
        live.to_string_lossy(),
    )));
    provider.register_factory(Arc::new(SqliteBackendFactory)).await;
    provider.register_factory(Arc::new(UnprovisionableFactory)).await;
    let store = Arc::new(FileConfigStore::in_dir(dir.path()));
    let ctx = AppContext::new(
        provider.clone(),
        Arc::new(EncryptionService::from_passphrase("test secret")),
        store.clone(),
    )
    .await
    .unwrap();

    let original = provider.config().await;
    let user = create_user(&ctx, "before@x.com").await;

    let candidate = BackendConfig::new(BackendKind::Postgres).with_url("postgres://db/convo");
    let applied = ctx.setup.apply(candidate).await.unwrap();
    assert_eq!(applied.failure, Some(Failure::Invalid));
    assert!(applied.message.unwrap().contains("permission denied"));

    assert_eq!(provider.config().await, original);
    assert!(store.load().await.unwrap().is_none());
    assert!(ctx.users.get(&user).await.unwrap().success);
}

#[tokio::test]
async fn test_null_json_value_round_trips() {
    let h = harness().await;
    let saved = h
        .ctx
        .settings
        .set("u1", "cleared", serde_json::Value::Null)
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(saved.value, None);
    assert_eq!(
        h.ctx.settings.get("u1", "cleared").await.unwrap().data.unwrap(),
        serde_json::Value::Null
    );
}
