use crate::config::{BackendConfig, BackendKind};
use crate::error::{DataError, Result};
use crate::traits::Backend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Factory trait for connecting a backend from configuration
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Get the backend kind this factory handles
    fn kind(&self) -> BackendKind;

    /// Establish a new connection
    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>>;
}

/// Hands out the live backend for the current configuration.
///
/// Connections are established lazily on first use and cached per backend
/// kind until the configuration changes. There is no pooling policy, health
/// check or reconnect: a dropped connection surfaces as an error of the call
/// that hits it.
pub struct ConnectionProvider {
    config: RwLock<BackendConfig>,
    factories: RwLock<HashMap<BackendKind, Arc<dyn BackendFactory>>>,
    connections: RwLock<HashMap<BackendKind, Arc<dyn Backend>>>,
    connect_lock: Mutex<()>,
    generation: AtomicU64,
}

impl ConnectionProvider {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config: RwLock::new(config),
            factories: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            connect_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Register a factory for a backend kind
    pub async fn register_factory(&self, factory: Arc<dyn BackendFactory>) {
        let kind = factory.kind();
        let mut factories = self.factories.write().await;

        if factories.contains_key(&kind) {
            warn!("Overwriting existing factory for backend: {}", kind);
        }

        factories.insert(kind, factory);
        debug!("Registered factory for backend: {}", kind);
    }

    /// Current configuration
    pub async fn config(&self) -> BackendConfig {
        self.config.read().await.clone()
    }

    /// Bumped on every [`reconfigure`](Self::reconfigure); lets callers
    /// invalidate state tied to the previous backend
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Kind of the configured backend
    pub async fn kind(&self) -> BackendKind {
        self.config.read().await.kind
    }

    async fn factory_for(&self, kind: BackendKind) -> Result<Arc<dyn BackendFactory>> {
        self.factories
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                DataError::invalid_configuration(format!(
                    "No factory registered for backend: {}",
                    kind
                ))
            })
    }

    /// Live handle for the configured backend, connecting on first use
    pub async fn get_connection(&self) -> Result<(Arc<dyn Backend>, BackendKind)> {
        let config = self.config().await;
        let kind = config.kind;

        if let Some(backend) = self.connections.read().await.get(&kind) {
            return Ok((backend.clone(), kind));
        }

        // Serialize first connects so concurrent callers share one handle
        let _guard = self.connect_lock.lock().await;
        if let Some(backend) = self.connections.read().await.get(&kind) {
            return Ok((backend.clone(), kind));
        }

        config.validate()?;
        let factory = self.factory_for(kind).await?;

        info!("Connecting to {}", config.connection_string());
        let backend = factory.connect(&config).await?;

        self.connections
            .write()
            .await
            .insert(kind, backend.clone());

        Ok((backend, kind))
    }

    /// Connect with a candidate configuration and close again, without
    /// touching the cache
    pub async fn test_connection(&self, config: &BackendConfig) -> Result<()> {
        config.validate()?;
        let factory = self.factory_for(config.kind).await?;

        debug!("Testing connection to {}", config.connection_string());
        let backend = factory.connect(config).await?;
        let ping = backend.ping().await;
        let _ = backend.close().await;
        ping
    }

    /// Replace the configuration and drop every cached connection
    pub async fn reconfigure(&self, config: BackendConfig) -> Result<()> {
        config.validate()?;

        let _guard = self.connect_lock.lock().await;
        let mut connections = self.connections.write().await;
        for (kind, backend) in connections.drain() {
            debug!("Closing {} connection", kind);
            if let Err(e) = backend.close().await {
                warn!("Failed to close {} connection: {}", kind, e);
            }
        }

        info!("Backend reconfigured to {}", config.connection_string());
        *self.config.write().await = config;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, QuerySpec};
    use crate::types::SchemaDefinition;
    use crate::value::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Sqlite
        }
        async fn ensure_schema(&self, _: &SchemaDefinition) -> Result<()> {
            Ok(())
        }
        async fn insert(&self, _: &SchemaDefinition, _: &Record) -> Result<()> {
            Ok(())
        }
        async fn find(&self, _: &SchemaDefinition, _: &QuerySpec) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }
        async fn count(&self, _: &SchemaDefinition, _: &[Condition]) -> Result<u64> {
            Ok(0)
        }
        async fn update(&self, _: &SchemaDefinition, _: &[Condition], _: &Record) -> Result<u64> {
            Ok(0)
        }
        async fn delete(&self, _: &SchemaDefinition, _: &[Condition]) -> Result<u64> {
            Ok(0)
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct CountingFactory {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl BackendFactory for CountingFactory {
        fn kind(&self) -> BackendKind {
            BackendKind::Sqlite
        }

        async fn connect(&self, _config: &BackendConfig) -> Result<Arc<dyn Backend>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullBackend))
        }
    }

    #[tokio::test]
    async fn test_connection_is_cached_per_kind() {
        let provider = ConnectionProvider::new(BackendConfig::sqlite(":memory:"));
        let factory = Arc::new(CountingFactory {
            connects: AtomicUsize::new(0),
        });
        provider.register_factory(factory.clone()).await;

        let (_, kind) = provider.get_connection().await.unwrap();
        assert_eq!(kind, BackendKind::Sqlite);
        provider.get_connection().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);

        provider
            .reconfigure(BackendConfig::sqlite("/tmp/other.db"))
            .await
            .unwrap();
        provider.get_connection().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
        assert_eq!(provider.generation(), 1);
    }

    #[tokio::test]
    async fn test_missing_factory_is_configuration_error() {
        let provider = ConnectionProvider::new(
            BackendConfig::new(BackendKind::Postgres).with_url("postgres://localhost/convo"),
        );
        let err = provider.get_connection().await.err().unwrap();
        assert!(matches!(err, DataError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_test_connection_does_not_cache() {
        let provider = ConnectionProvider::new(BackendConfig::sqlite(":memory:"));
        let factory = Arc::new(CountingFactory {
            connects: AtomicUsize::new(0),
        });
        provider.register_factory(factory.clone()).await;

        provider
            .test_connection(&BackendConfig::sqlite(":memory:"))
            .await
            .unwrap();
        provider.get_connection().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }
}
