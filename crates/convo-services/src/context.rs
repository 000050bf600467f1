use crate::chat::ChatService;
use crate::favorites::FavoriteService;
use crate::provider_configs::ProviderConfigService;
use crate::settings::SettingsService;
use crate::setup::{ConfigStore, SetupService};
use crate::users::UserService;
use crate::workspaces::WorkspaceService;
use convo_core::{EncryptionService, ServiceResult};
use convo_db::{ConnectionProvider, SchemaRegistry, UniversalDatabaseService};
use std::sync::Arc;
use tracing::info;

/// Every service, wired once at startup and handed to whoever needs them
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<UniversalDatabaseService>,
    pub users: UserService,
    pub workspaces: WorkspaceService,
    pub chat: ChatService,
    pub provider_configs: ProviderConfigService,
    pub favorites: FavoriteService,
    pub settings: SettingsService,
    pub setup: SetupService,
}

impl AppContext {
    /// Registers every entity schema and builds the services on top of
    /// `provider`. No connection is made until the first query.
    pub async fn new(
        provider: Arc<ConnectionProvider>,
        encryption: Arc<EncryptionService>,
        store: Arc<dyn ConfigStore>,
    ) -> ServiceResult<Self> {
        let registry = Arc::new(SchemaRegistry::new());
        convo_entities::register_all(&registry).await?;

        let db = Arc::new(UniversalDatabaseService::new(registry, provider));
        info!("Application context ready");

        Ok(Self {
            users: UserService::new(db.clone()),
            workspaces: WorkspaceService::new(db.clone()),
            chat: ChatService::new(db.clone()),
            provider_configs: ProviderConfigService::new(db.clone(), encryption),
            favorites: FavoriteService::new(db.clone()),
            settings: SettingsService::new(db.clone()),
            setup: SetupService::new(db.clone(), store),
            db,
        })
    }
}
