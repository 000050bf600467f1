//! SQLite backend for convo-db
//!
//! One `rusqlite::Connection` per backend, guarded by a mutex; every call runs
//! on the blocking pool. Storage classes are limited, so booleans are kept as
//! 0/1, timestamps as millisecond RFC 3339 text and JSON as text. Reads are
//! upgraded back to the schema's field types by the universal service.

use async_trait::async_trait;
use convo_db::sql::{SqlBuilder, SqlDialect, SqlStatement};
use convo_db::value::format_datetime;
use convo_db::{
    Backend, BackendConfig, BackendFactory, BackendKind, Condition, DataError, DataValue,
    QuerySpec, Record, Result, SchemaDefinition,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Path that selects a private in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite backend implementation
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

fn log_statement(sql: &str) {
    trace!(target: "convo_db_sqlite::sql", "{}", sql);
}

/// Storage representation of a value
pub fn to_sqlite(value: &DataValue) -> Value {
    match value {
        DataValue::Null => Value::Null,
        DataValue::Bool(b) => Value::Integer(i64::from(*b)),
        DataValue::Int(i) => Value::Integer(*i),
        DataValue::Float(f) => Value::Real(*f),
        DataValue::Text(s) => Value::Text(s.clone()),
        DataValue::DateTime(dt) => Value::Text(format_datetime(dt)),
        DataValue::Json(v) => Value::Text(v.to_string()),
        DataValue::List(_) => Value::Text(value.to_json().to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> DataValue {
    match value {
        ValueRef::Null => DataValue::Null,
        ValueRef::Integer(i) => DataValue::Int(i),
        ValueRef::Real(f) => DataValue::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            DataValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Normalise a driver error
pub fn map_error(entity: &str, e: rusqlite::Error) -> DataError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DataError::duplicate_key(entity, msg.clone().unwrap_or_else(|| e.to_string()))
        }
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied
            ) =>
        {
            error!("SQLite database unavailable: {}", e);
            DataError::ConnectionFailed(e.to_string())
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("already exists") => {
            DataError::AlreadyExists(msg.clone())
        }
        _ => {
            error!("SQLite statement on '{}' failed: {}", entity, e);
            DataError::QueryFailed(e.to_string())
        }
    }
}

fn open(path: &str) -> Result<Connection> {
    let conn = if path == MEMORY_PATH {
        Connection::open_in_memory()
    } else {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DataError::ConnectionFailed(format!(
                    "Cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Connection::open(path)
    }
    .map_err(|e| DataError::ConnectionFailed(format!("SQLite open failed: {}", e)))?;

    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| DataError::ConnectionFailed(e.to_string()))?;
    if path != MEMORY_PATH {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| DataError::ConnectionFailed(e.to_string()))?;
    }
    Ok(conn)
}

impl SqliteBackend {
    /// Open (creating if needed) the database file named by `config.path`
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let path = config
            .path
            .clone()
            .ok_or_else(|| DataError::invalid_configuration("sqlite requires a file path"))?;

        debug!("Opening SQLite database: {}", path);
        let open_path = path.clone();
        let mut conn = tokio::task::spawn_blocking(move || open(&open_path))
            .await
            .map_err(|e| DataError::Internal(format!("SQLite open task failed: {}", e)))??;
        conn.trace(Some(log_statement));

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn builder<'a>(&self, schema: &'a SchemaDefinition) -> SqlBuilder<'a> {
        SqlBuilder::new(SqlDialect::Sqlite, schema)
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| DataError::Internal("SQLite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| DataError::Internal(format!("SQLite task failed: {}", e)))?
    }

    async fn execute(&self, entity: &str, stmt: SqlStatement) -> Result<u64> {
        debug!("Executing: {}", stmt.sql);
        let entity = entity.to_string();
        self.with_conn(move |conn| {
            let params: Vec<Value> = stmt.params.iter().map(to_sqlite).collect();
            conn.execute(&stmt.sql, params_from_iter(params.iter()))
                .map(|n| n as u64)
                .map_err(|e| map_error(&entity, e))
        })
        .await
    }

    async fn fetch(&self, entity: &str, stmt: SqlStatement) -> Result<Vec<Record>> {
        debug!("Querying: {}", stmt.sql);
        let entity = entity.to_string();
        self.with_conn(move |conn| {
            let params: Vec<Value> = stmt.params.iter().map(to_sqlite).collect();
            let mut prepared = conn
                .prepare(&stmt.sql)
                .map_err(|e| map_error(&entity, e))?;
            let columns: Vec<String> = prepared
                .column_names()
                .iter()
                .map(|c| c.to_string())
                .collect();

            let rows = prepared
                .query_map(params_from_iter(params.iter()), |row| {
                    let mut record = Record::with_capacity(columns.len());
                    for (idx, name) in columns.iter().enumerate() {
                        record.insert(name.clone(), from_sqlite(row.get_ref(idx)?));
                    }
                    Ok(record)
                })
                .map_err(|e| map_error(&entity, e))?;

            let records = rows
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| map_error(&entity, e))?;
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        let builder = self.builder(schema);
        let mut statements = vec![builder.create_table()];
        statements.extend(builder.create_indexes());
        let entity = schema.entity.clone();

        self.with_conn(move |conn| {
            for sql in &statements {
                debug!("Ensuring: {}", sql);
                conn.execute_batch(sql).map_err(|e| map_error(&entity, e))?;
            }
            Ok(())
        })
        .await
    }

    async fn insert(&self, schema: &SchemaDefinition, record: &Record) -> Result<()> {
        let stmt = self.builder(schema).insert(record)?;
        self.execute(&schema.entity, stmt).await?;
        Ok(())
    }

    async fn find(&self, schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<Record>> {
        let stmt = self.builder(schema).select(query)?;
        self.fetch(&schema.entity, stmt).await
    }

    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let stmt = self.builder(schema).count(conditions)?;
        let rows = self.fetch(&schema.entity, stmt).await?;
        let count = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().next())
            .and_then(|v| v.as_i64())
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
        self.execute(&schema.entity, stmt).await
    }

    async fn delete(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let stmt = self.builder(schema).delete(conditions)?;
        self.execute(&schema.entity, stmt).await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| DataError::ConnectionFailed(format!("SQLite ping failed: {}", e)))
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        // The connection closes when its last handle is dropped
        debug!("Closing SQLite database {}", self.path);
        Ok(())
    }
}

/// Opens [`SqliteBackend`]s for the provider
pub struct SqliteBackendFactory;

#[async_trait]
impl BackendFactory for SqliteBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(SqliteBackend::connect(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_db::{record, FieldDef, FieldType};

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new("notes")
            .field(FieldDef::id("id"))
            .field(FieldDef::new("title", FieldType::String).unique())
            .field(FieldDef::new("pinned", FieldType::Boolean))
            .index(&["pinned"])
    }

    async fn backend() -> SqliteBackend {
        let backend = SqliteBackend::connect(&BackendConfig::sqlite(MEMORY_PATH))
            .await
            .unwrap();
        backend.ensure_schema(&schema()).await.unwrap();
        backend
    }

    #[test]
    fn test_storage_representation() {
        assert_eq!(to_sqlite(&DataValue::Bool(true)), Value::Integer(1));
        assert_eq!(
            to_sqlite(&DataValue::Json(serde_json::json!({"a": [1, 2]}))),
            Value::Text(r#"{"a":[1,2]}"#.to_string())
        );
        assert_eq!(to_sqlite(&DataValue::Null), Value::Null);
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let backend = backend().await;
        backend.ensure_schema(&schema()).await.unwrap();
        backend.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_duplicate_key() {
        let backend = backend().await;
        let schema = schema();
        backend
            .insert(&schema, &record! { "id" => "n1", "title" => "a" })
            .await
            .unwrap();

        let same_title = backend
            .insert(&schema, &record! { "id" => "n2", "title" => "a" })
            .await
            .unwrap_err();
        assert!(same_title.is_duplicate_key());

        let same_id = backend
            .insert(&schema, &record! { "id" => "n1", "title" => "b" })
            .await
            .unwrap_err();
        assert!(same_id.is_duplicate_key());
    }

    #[tokio::test]
    async fn test_raw_rows_keep_storage_types() {
        let backend = backend().await;
        let schema = schema();
        backend
            .insert(&schema, &record! { "id" => "n1", "title" => "a", "pinned" => true })
            .await
            .unwrap();

        let rows = backend.find(&schema, &QuerySpec::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pinned"], DataValue::Int(1));
        assert_eq!(
            backend
                .count(&schema, &[Condition::eq("pinned", true)])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let backend = SqliteBackend::connect(&BackendConfig::sqlite(MEMORY_PATH))
            .await
            .unwrap();
        let err = backend.find(&schema(), &QuerySpec::new()).await.unwrap_err();
        assert!(matches!(err, DataError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("convo.db");
        let backend = SqliteBackend::connect(&BackendConfig::sqlite(path.to_string_lossy()))
            .await
            .unwrap();
        backend.ensure_schema(&schema()).await.unwrap();
        assert!(path.exists());
    }
}
