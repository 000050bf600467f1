//! MySQL backend for convo-db
//!
//! Implements [`Backend`] over an `sqlx::MySqlPool` using statements from the
//! shared [`SqlBuilder`].

use async_trait::async_trait;
use convo_db::sql::{SqlBuilder, SqlDialect, SqlStatement};
use convo_db::{
    Backend, BackendConfig, BackendFactory, BackendKind, Condition, DataError, DataValue,
    QuerySpec, Record, Result, SchemaDefinition,
};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlDatabaseError, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, MySqlPool, Row, TypeInfo};
use std::sync::Arc;
use tracing::{debug, error};

/// Duplicate key name (index already exists)
const ER_DUP_KEYNAME: u16 = 1061;
/// Table already exists
const ER_TABLE_EXISTS_ERROR: u16 = 1050;

/// MySQL backend implementation
pub struct MySqlBackend {
    pool: MySqlPool,
}

/// Build connect options from discrete parameters or a connection URL
pub fn mysql_options(config: &BackendConfig) -> Result<MySqlConnectOptions> {
    if let Some(url) = &config.url {
        return url.parse::<MySqlConnectOptions>().map_err(|e| {
            DataError::invalid_configuration(format!("Invalid MySQL connection url: {}", e))
        });
    }

    let mut options = MySqlConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port.unwrap_or(3306));
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    Ok(options)
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DataValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        DataValue::Null => query.bind(None::<String>),
        DataValue::Bool(b) => query.bind(*b),
        DataValue::Int(i) => query.bind(*i),
        DataValue::Float(f) => query.bind(*f),
        DataValue::Text(s) => query.bind(s.clone()),
        DataValue::DateTime(dt) => query.bind(dt.naive_utc()),
        DataValue::Json(v) => query.bind(v.to_string()),
        DataValue::List(_) => query.bind(value.to_json().to_string()),
    }
}

impl MySqlBackend {
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let options = mysql_options(config)?;
        debug!("Connecting to MySQL: {}", config.connection_string());

        let pool = MySqlPool::connect_with(options).await.map_err(|e| {
            DataError::ConnectionFailed(format!("MySQL connection failed: {}", e))
        })?;

        debug!("Successfully connected to MySQL");
        Ok(Self { pool })
    }

    fn builder<'a>(&self, schema: &'a SchemaDefinition) -> SqlBuilder<'a> {
        SqlBuilder::new(SqlDialect::MySql, schema)
    }

    /// Normalise a driver error
    fn map_error(entity: &str, e: sqlx::Error) -> DataError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DataError::duplicate_key(entity, db.message())
            }
            sqlx::Error::Database(db) => {
                let number = db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(|m| m.number());
                match number {
                    Some(ER_DUP_KEYNAME) | Some(ER_TABLE_EXISTS_ERROR) => {
                        DataError::AlreadyExists(db.message().to_string())
                    }
                    _ => {
                        error!("MySQL statement on '{}' failed: {}", entity, e);
                        DataError::QueryFailed(db.message().to_string())
                    }
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                error!("MySQL connection error: {}", e);
                DataError::ConnectionFailed(e.to_string())
            }
            _ => {
                error!("MySQL statement on '{}' failed: {}", entity, e);
                DataError::QueryFailed(e.to_string())
            }
        }
    }

    async fn execute(&self, entity: &str, stmt: &SqlStatement) -> Result<u64> {
        debug!("Executing: {}", stmt.sql);
        let query = stmt
            .params
            .iter()
            .fold(sqlx::query(&stmt.sql), bind_value);
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_error(entity, e))?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, entity: &str, stmt: &SqlStatement) -> Result<Vec<MySqlRow>> {
        debug!("Querying: {}", stmt.sql);
        let query = stmt
            .params
            .iter()
            .fold(sqlx::query(&stmt.sql), bind_value);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_error(entity, e))
    }

    fn row_to_record(row: &MySqlRow) -> Record {
        row.columns()
            .iter()
            .map(|column| {
                (
                    column.name().to_string(),
                    Self::extract_value(row, column.ordinal(), column.type_info().name()),
                )
            })
            .collect()
    }

    /// Extract value from MySQL row by reported column type
    fn extract_value(row: &MySqlRow, idx: usize, type_name: &str) -> DataValue {
        let type_name = type_name.to_ascii_uppercase();

        match type_name.as_str() {
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(DataValue::Bool)
                .unwrap_or(DataValue::Null),

            t if t.contains("INT") && t.ends_with("UNSIGNED") => row
                .try_get::<Option<u64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Int(v as i64))
                .unwrap_or(DataValue::Null),

            t if t.contains("INT") => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(DataValue::Int)
                .unwrap_or(DataValue::Null),

            "FLOAT" => row
                .try_get::<Option<f32>, _>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Float(v as f64))
                .unwrap_or(DataValue::Null),

            "DOUBLE" => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(DataValue::Float)
                .unwrap_or(DataValue::Null),

            "DATETIME" | "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::DateTime(v.and_utc()))
                .unwrap_or(DataValue::Null),

            "JSON" => row
                .try_get::<Option<serde_json::Value>, _>(idx)
                .ok()
                .flatten()
                .map(DataValue::Json)
                .unwrap_or(DataValue::Null),

            _ => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .or_else(|| {
                    // Binary collations come back as bytes
                    row.try_get::<Option<Vec<u8>>, _>(idx)
                        .ok()
                        .flatten()
                        .map(|b| String::from_utf8_lossy(&b).into_owned())
                })
                .map(DataValue::Text)
                .unwrap_or(DataValue::Null),
        }
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        let builder = self.builder(schema);
        let create = builder.create_table();
        debug!("Ensuring table: {}", create);
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;

        // No IF NOT EXISTS for indexes; an existing one reports ER_DUP_KEYNAME
        for index in builder.create_indexes() {
            debug!("Ensuring index: {}", index);
            match sqlx::query(&index).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) => match Self::map_error(&schema.entity, e) {
                    DataError::AlreadyExists(msg) => debug!("Index exists: {}", msg),
                    other => return Err(other),
                },
            }
        }
        Ok(())
    }

    async fn insert(&self, schema: &SchemaDefinition, record: &Record) -> Result<()> {
        let stmt = self.builder(schema).insert(record)?;
        self.execute(&schema.entity, &stmt).await?;
        Ok(())
    }

    async fn find(&self, schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<Record>> {
        let stmt = self.builder(schema).select(query)?;
        let rows = self.fetch(&schema.entity, &stmt).await?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let stmt = self.builder(schema).count(conditions)?;
        let rows = self.fetch(&schema.entity, &stmt).await?;
        let count = rows
            .first()
            .and_then(|row| row.try_get::<i64, _>(0).ok())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn update(
        &self,
        schema: &SchemaDefinition,
        conditions: &[Condition],
        changes: &Record,
    ) -> Result<u64> {
        let stmt = self.builder(schema).update(conditions, changes)?;
        self.execute(&schema.entity, &stmt).await
    }

    async fn delete(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let stmt = self.builder(schema).delete(conditions)?;
        self.execute(&schema.entity, &stmt).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::ConnectionFailed(format!("MySQL ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing MySQL pool");
        self.pool.close().await;
        Ok(())
    }
}

/// Connects [`MySqlBackend`]s for the provider
pub struct MySqlBackendFactory;

#[async_trait]
impl BackendFactory for MySqlBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(MySqlBackend::connect(config).await?))
    }
}
