//! PostgreSQL backend for convo-db
//!
//! Implements [`Backend`] over a single `tokio_postgres::Client`. Statements
//! come from the shared [`SqlBuilder`]; parameters are bound through
//! [`PgParam`], which encodes each [`DataValue`] for the column type the
//! server reports.

use async_trait::async_trait;
use bytes::BytesMut;
use convo_db::sql::{SqlBuilder, SqlDialect, SqlStatement};
use convo_db::{
    Backend, BackendConfig, BackendFactory, BackendKind, Condition, DataError, DataValue,
    QuerySpec, Record, Result, SchemaDefinition,
};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use std::sync::Arc;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

/// Default PostgreSQL schema tables are created in
pub const DEFAULT_NAMESPACE: &str = "public";

/// PostgreSQL backend implementation
pub struct PostgresBackend {
    client: Arc<Client>,
    namespace: String,
}

/// Build driver configuration from a connection URL or discrete parameters
pub fn pg_config(config: &BackendConfig) -> Result<tokio_postgres::Config> {
    if let Some(url) = &config.url {
        return url.parse::<tokio_postgres::Config>().map_err(|e| {
            DataError::invalid_configuration(format!("Invalid PostgreSQL connection url: {}", e))
        });
    }

    let mut pg = tokio_postgres::Config::new();
    pg.host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port.unwrap_or(5432));
    if let Some(username) = &config.username {
        pg.user(username);
    }
    if let Some(password) = &config.password {
        pg.password(password);
    }
    if let Some(database) = &config.database {
        pg.dbname(database);
    }
    Ok(pg)
}

impl PostgresBackend {
    /// Connect and spawn the connection task
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let pg = pg_config(config)?;
        debug!("Connecting to PostgreSQL: {}", config.connection_string());

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            DataError::ConnectionFailed(format!("PostgreSQL connection failed: {}", e))
        })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        let namespace = config
            .option("schema")
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string();

        debug!("Successfully connected to PostgreSQL (schema {})", namespace);

        Ok(Self {
            client: Arc::new(client),
            namespace,
        })
    }

    fn builder<'a>(&self, schema: &'a SchemaDefinition) -> SqlBuilder<'a> {
        SqlBuilder::new(SqlDialect::Postgres, schema).with_namespace(&self.namespace)
    }

    /// Normalise a driver error
    fn map_error(entity: &str, e: tokio_postgres::Error) -> DataError {
        let message = e
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| e.to_string());

        match e.code() {
            Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
                DataError::duplicate_key(entity, message)
            }
            Some(code)
                if *code == SqlState::DUPLICATE_TABLE || *code == SqlState::DUPLICATE_OBJECT =>
            {
                DataError::AlreadyExists(message)
            }
            _ if e.is_closed() => {
                error!("PostgreSQL connection closed: {}", e);
                DataError::ConnectionFailed(message)
            }
            _ => {
                error!("PostgreSQL statement on '{}' failed: {}", entity, e);
                DataError::QueryFailed(message)
            }
        }
    }

    async fn execute(&self, entity: &str, stmt: &SqlStatement) -> Result<u64> {
        debug!("Executing: {}", stmt.sql);
        let params: Vec<PgParam> = stmt.params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.client
            .execute(stmt.sql.as_str(), &refs)
            .await
            .map_err(|e| Self::map_error(entity, e))
    }

    async fn query(&self, entity: &str, stmt: &SqlStatement) -> Result<Vec<Row>> {
        debug!("Querying: {}", stmt.sql);
        let params: Vec<PgParam> = stmt.params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.client
            .query(stmt.sql.as_str(), &refs)
            .await
            .map_err(|e| Self::map_error(entity, e))
    }

    /// Convert PostgreSQL row to Record
    fn row_to_record(row: &Row) -> Record {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name().to_string(), Self::extract_value(row, idx)))
            .collect()
    }

    /// Extract value from PostgreSQL row
    fn extract_value(row: &Row, idx: usize) -> DataValue {
        let type_name = row.columns()[idx].type_().name();

        match type_name {
            "bool" => row
                .try_get::<_, Option<bool>>(idx)
                .ok()
                .flatten()
                .map(DataValue::Bool)
                .unwrap_or(DataValue::Null),

            "int2" => row
                .try_get::<_, Option<i16>>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Int(v as i64))
                .unwrap_or(DataValue::Null),

            "int4" => row
                .try_get::<_, Option<i32>>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Int(v as i64))
                .unwrap_or(DataValue::Null),

            "int8" => row
                .try_get::<_, Option<i64>>(idx)
                .ok()
                .flatten()
                .map(DataValue::Int)
                .unwrap_or(DataValue::Null),

            "float4" => row
                .try_get::<_, Option<f32>>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Float(v as f64))
                .unwrap_or(DataValue::Null),

            "float8" => row
                .try_get::<_, Option<f64>>(idx)
                .ok()
                .flatten()
                .map(DataValue::Float)
                .unwrap_or(DataValue::Null),

            "timestamptz" => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                .ok()
                .flatten()
                .map(DataValue::DateTime)
                .unwrap_or(DataValue::Null),

            "timestamp" => row
                .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::DateTime(v.and_utc()))
                .unwrap_or(DataValue::Null),

            "json" | "jsonb" => row
                .try_get::<_, Option<serde_json::Value>>(idx)
                .ok()
                .flatten()
                .map(DataValue::Json)
                .unwrap_or(DataValue::Null),

            "uuid" => row
                .try_get::<_, Option<uuid::Uuid>>(idx)
                .ok()
                .flatten()
                .map(|v| DataValue::Text(v.to_string()))
                .unwrap_or(DataValue::Null),

            _ => {
                // Try to get as string for unknown types
                row.try_get::<_, Option<String>>(idx)
                    .ok()
                    .flatten()
                    .map(DataValue::Text)
                    .unwrap_or(DataValue::Null)
            }
        }
    }
}

/// Binds a [`DataValue`] as whatever PostgreSQL type the placeholder has
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a DataValue);

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }
        if is_text(ty) {
            return match value {
                DataValue::Json(v) => serde_json::to_string(v)?.to_sql(ty, out),
                other => other.to_string().to_sql(ty, out),
            };
        }

        match value {
            DataValue::Null => Ok(IsNull::Yes),
            DataValue::Bool(b) => b.to_sql(ty, out),
            DataValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            DataValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::INT8 => (*f as i64).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            DataValue::Text(s) => match *ty {
                Type::JSON | Type::JSONB => serde_json::Value::String(s.clone()).to_sql(ty, out),
                _ => s.to_sql(ty, out),
            },
            DataValue::DateTime(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            DataValue::Json(v) => v.to_sql(ty, out),
            DataValue::List(_) => value.to_json().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[async_trait]
impl Backend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        let builder = self.builder(schema);
        let create = builder.create_table();
        debug!("Ensuring table: {}", create);
        self.client
            .batch_execute(&create)
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;

        for index in builder.create_indexes() {
            debug!("Ensuring index: {}", index);
            self.client
                .batch_execute(&index)
                .await
                .map_err(|e| Self::map_error(&schema.entity, e))?;
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
        let rows = self.query(&schema.entity, &stmt).await?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let stmt = self.builder(schema).count(conditions)?;
        let rows = self.query(&schema.entity, &stmt).await?;
        let count = rows
            .first()
            .and_then(|row| row.try_get::<_, i64>(0).ok())
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
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DataError::ConnectionFailed(format!("PostgreSQL ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The client closes when its last handle is dropped
        debug!("Closing PostgreSQL connection");
        Ok(())
    }
}

/// Connects [`PostgresBackend`]s for the provider
pub struct PostgresBackendFactory;

#[async_trait]
impl BackendFactory for PostgresBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(PostgresBackend::connect(config).await?))
    }
}
