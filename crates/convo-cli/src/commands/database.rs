use anyhow::Context;
use clap::Args;
use convo_core::EncryptionService;
use convo_db::{BackendConfig, BackendKind, ConnectionProvider};
use convo_services::{AppContext, ConfigStore, FileConfigStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ENCRYPTION_KEY_FILE: &str = "encryption_key";
pub const DEFAULT_SQLITE_FILE: &str = "convo.db";

/// Data directory and backend selection shared by every command
#[derive(Args, Clone, Debug, Default)]
pub struct DatabaseArgs {
    /// Data directory for the saved backend config, the encryption key and
    /// the default SQLite file
    #[arg(long, env = "CONVO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Backend type: mongodb, postgres, mysql, sqlite, supabase
    #[arg(long = "db-type", env = "CONVO_DB_TYPE")]
    pub db_type: Option<String>,

    /// Connection URL (or project URL for supabase)
    #[arg(long = "db-url", env = "CONVO_DB_URL")]
    pub db_url: Option<String>,

    #[arg(long = "db-host", env = "CONVO_DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long = "db-port", env = "CONVO_DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long = "db-user", env = "CONVO_DB_USER")]
    pub db_user: Option<String>,

    #[arg(long = "db-password", env = "CONVO_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Database name
    #[arg(long = "db-name", env = "CONVO_DB_NAME")]
    pub db_name: Option<String>,

    /// SQLite file path
    #[arg(long = "db-path", env = "CONVO_DB_PATH")]
    pub db_path: Option<String>,

    /// Supabase service key
    #[arg(long = "db-api-key", env = "CONVO_DB_API_KEY", hide_env_values = true)]
    pub db_api_key: Option<String>,

    /// Supabase schema exposed through PostgREST
    #[arg(long = "db-schema", env = "CONVO_DB_SCHEMA")]
    pub db_schema: Option<String>,

    /// Secret used to encrypt provider API keys; 64 hex characters or any
    /// passphrase. Generated into the data directory when absent.
    #[arg(long, env = "CONVO_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,
}

impl DatabaseArgs {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".convo"))
                .unwrap_or_else(|| PathBuf::from(".convo"))
        })
    }

    pub fn config_store(&self) -> FileConfigStore {
        FileConfigStore::in_dir(self.data_dir())
    }

    /// Backend described by flags/environment, if a type was given
    pub fn flag_config(&self) -> anyhow::Result<Option<BackendConfig>> {
        let Some(db_type) = &self.db_type else {
            return Ok(None);
        };
        let kind: BackendKind = db_type.parse()?;

        let mut config = BackendConfig::new(kind);
        config.url = self.db_url.clone();
        config.host = self.db_host.clone();
        config.port = self.db_port;
        config.username = self.db_user.clone();
        config.password = self.db_password.clone();
        config.database = self.db_name.clone();
        config.path = self.db_path.clone();
        config.api_key = self.db_api_key.clone();
        if let Some(schema) = &self.db_schema {
            config = config.with_option("schema", schema.clone());
        }
        Ok(Some(config))
    }

    fn default_config(&self) -> BackendConfig {
        let path = self.data_dir().join(DEFAULT_SQLITE_FILE);
        BackendConfig::sqlite(path.to_string_lossy())
    }

    /// Saved config first, then flags/environment, then a SQLite file in
    /// the data directory
    pub async fn resolve_config(&self) -> anyhow::Result<BackendConfig> {
        let store = self.config_store();
        if let Some(config) = store.load().await? {
            info!("Using saved database config from {}", store.path().display());
            return Ok(config);
        }
        if let Some(config) = self.flag_config()? {
            info!("Using database config from flags/environment");
            return Ok(config);
        }

        let config = self.default_config();
        warn!(
            "No database configured, falling back to {}",
            config.connection_string()
        );
        Ok(config)
    }

    pub fn encryption(&self) -> anyhow::Result<EncryptionService> {
        if let Some(secret) = &self.encryption_key {
            return Ok(EncryptionService::from_secret(secret)?);
        }
        let key = load_or_create_key(&self.data_dir())?;
        Ok(EncryptionService::new(&key)?)
    }

    /// Provider for `config` with every backend registered
    pub async fn provider(&self, config: BackendConfig) -> Arc<ConnectionProvider> {
        let provider = Arc::new(ConnectionProvider::new(config));
        provider
            .register_factory(Arc::new(convo_db_mongodb::MongoBackendFactory))
            .await;
        provider
            .register_factory(Arc::new(convo_db_postgres::PostgresBackendFactory))
            .await;
        provider
            .register_factory(Arc::new(convo_db_mysql::MySqlBackendFactory))
            .await;
        provider
            .register_factory(Arc::new(convo_db_sqlite::SqliteBackendFactory))
            .await;
        provider
            .register_factory(Arc::new(convo_db_supabase::SupabaseBackendFactory))
            .await;
        provider
    }

    /// Fully wired services on the resolved backend
    pub async fn context(&self) -> anyhow::Result<Arc<AppContext>> {
        fs::create_dir_all(self.data_dir())
            .with_context(|| format!("Failed to create {}", self.data_dir().display()))?;

        let config = self.resolve_config().await?;
        let provider = self.provider(config).await;
        let encryption = Arc::new(self.encryption()?);
        let store = Arc::new(self.config_store());

        let ctx = AppContext::new(provider, encryption, store).await?;
        Ok(Arc::new(ctx))
    }
}

/// Hex key from `<data_dir>/encryption_key`, generated on first use
fn load_or_create_key(data_dir: &Path) -> anyhow::Result<String> {
    let path = data_dir.join(ENCRYPTION_KEY_FILE);
    if path.exists() {
        debug!("Loading encryption key from {}", path.display());
        return Ok(fs::read_to_string(&path)?.trim().to_string());
    }

    fs::create_dir_all(data_dir)?;
    let key = EncryptionService::generate_key();
    fs::write(&path, &key).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Generated new encryption key at {}", path.display());
    Ok(key)
}
