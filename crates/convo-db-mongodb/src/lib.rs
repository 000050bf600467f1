//! MongoDB backend for convo-db
//!
//! Entities live in the collection named by `collection_name`; the primary
//! key field is stored as `_id`. Collections are created implicitly on first
//! write, so materialising a schema only creates its indexes: one unique
//! index per unique field and one compound index per declared index tuple.
//!
//! ## Example
//!
//! ```rust,no_run
//! use convo_db::{BackendConfig, BackendKind};
//! use convo_db_mongodb::MongoBackend;
//!
//! # async fn example() -> convo_db::Result<()> {
//! let config = BackendConfig::new(BackendKind::MongoDb)
//!     .with_url("mongodb://localhost:27017")
//!     .with_database("convo");
//! let backend = MongoBackend::connect(&config).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use convo_db::coerce::tag_native_json;
use convo_db::{
    Backend, BackendConfig, BackendFactory, BackendKind, Condition, DataError, DataValue,
    Operator, QuerySpec, Record, Result, SchemaDefinition, SortDirection,
};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Document key holding the primary key
pub const ID_FIELD: &str = "_id";

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;
/// Index with the same name but different options/keys already exists
const INDEX_CONFLICT_CODES: [i32; 2] = [85, 86];

/// MongoDB backend implementation
pub struct MongoBackend {
    client: Client,
    database: Database,
}

/// Connection string from the config: the URL verbatim, or one assembled
/// from host/port/credentials
pub fn connection_url(config: &BackendConfig) -> String {
    if let Some(url) = &config.url {
        return url.clone();
    }

    let credentials = match (&config.username, &config.password) {
        (Some(user), Some(password)) => format!("{}:{}@", user, password),
        (Some(user), None) => format!("{}@", user),
        _ => String::new(),
    };

    format!(
        "mongodb://{}{}:{}",
        credentials,
        config.host.as_deref().unwrap_or("localhost"),
        config.port.unwrap_or(27017)
    )
}

/// Stored key for a logical field name
fn stored_name<'a>(schema: &SchemaDefinition, field: &'a str) -> &'a str {
    if field == schema.primary_key() {
        ID_FIELD
    } else {
        field
    }
}

/// Convert a value into its BSON form
pub fn to_bson(value: &DataValue) -> Result<Bson> {
    Ok(match value {
        DataValue::Null => Bson::Null,
        DataValue::Bool(b) => Bson::Boolean(*b),
        DataValue::Int(i) => Bson::Int64(*i),
        DataValue::Float(f) => Bson::Double(*f),
        DataValue::Text(s) => Bson::String(s.clone()),
        DataValue::DateTime(dt) => {
            Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis()))
        }
        DataValue::Json(v) => bson::to_bson(v)
            .map_err(|e| DataError::Serialization(format!("JSON to BSON failed: {}", e)))?,
        DataValue::List(items) => Bson::Array(
            items
                .iter()
                .map(to_bson)
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

/// Convert a BSON value read back from the server
pub fn from_bson(value: Bson) -> DataValue {
    match value {
        Bson::Null | Bson::Undefined => DataValue::Null,
        Bson::Boolean(b) => DataValue::Bool(b),
        Bson::Int32(i) => DataValue::Int(i as i64),
        Bson::Int64(i) => DataValue::Int(i),
        Bson::Double(f) => DataValue::Float(f),
        Bson::String(s) => DataValue::Text(s),
        Bson::ObjectId(oid) => DataValue::Text(oid.to_hex()),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map(DataValue::DateTime)
            .unwrap_or(DataValue::Null),
        other => DataValue::Json(other.into_relaxed_extjson()),
    }
}

/// Build a filter document; conditions are combined with `$and`
pub fn build_filter(schema: &SchemaDefinition, conditions: &[Condition]) -> Result<Document> {
    let mut clauses = Vec::with_capacity(conditions.len());

    for condition in conditions {
        let field = stored_name(schema, &condition.field);
        let clause = match condition.operator {
            Operator::In => {
                let values = condition
                    .list_values()?
                    .iter()
                    .map(to_bson)
                    .collect::<Result<Vec<_>>>()?;
                let mut clause = Document::new();
                clause.insert(field, doc! { "$in": values });
                clause
            }
            Operator::Like => {
                let raw = condition.value.as_str().ok_or_else(|| {
                    DataError::validation(format!(
                        "operator 'like' on '{}' needs a string value",
                        condition.field
                    ))
                })?;
                let mut clause = Document::new();
                clause.insert(field, doc! { "$regex": regex::escape(raw) });
                clause
            }
            op => {
                let mongo_op = match op {
                    Operator::Eq => "$eq",
                    Operator::Ne => "$ne",
                    Operator::Gt => "$gt",
                    Operator::Lt => "$lt",
                    Operator::Gte => "$gte",
                    _ => "$lte",
                };
                let mut comparison = Document::new();
                comparison.insert(mongo_op, to_bson(&condition.value)?);
                let mut clause = Document::new();
                clause.insert(field, comparison);
                clause
            }
        };
        clauses.push(clause);
    }

    Ok(match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    })
}

/// Translate order/limit/offset/select into find options
pub fn find_options(schema: &SchemaDefinition, query: &QuerySpec) -> FindOptions {
    let mut options = FindOptions::default();

    if !query.order_by.is_empty() {
        let mut sort = Document::new();
        for order in &query.order_by {
            let direction = match order.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(stored_name(schema, &order.field), direction);
        }
        options.sort = Some(sort);
    }

    options.skip = query.offset;
    options.limit = query.limit.map(|l| l as i64);

    if let Some(select) = query.select.as_ref().filter(|s| !s.is_empty()) {
        let mut projection = Document::new();
        for field in select {
            projection.insert(stored_name(schema, field), 1);
        }
        if !projection.contains_key(ID_FIELD) {
            projection.insert(ID_FIELD, 0);
        }
        options.projection = Some(projection);
    }

    options
}

fn record_to_document(schema: &SchemaDefinition, record: &Record) -> Result<Document> {
    let mut document = Document::new();
    for (key, value) in record {
        document.insert(stored_name(schema, key), to_bson(value)?);
    }
    Ok(document)
}

fn document_to_record(schema: &SchemaDefinition, document: Document) -> Record {
    let pk = schema.primary_key();
    let record = document
        .into_iter()
        .map(|(key, value)| {
            let key = if key == ID_FIELD { pk.to_string() } else { key };
            (key, from_bson(value))
        })
        .collect();
    tag_native_json(schema, record)
}

fn error_code(e: &mongodb::error::Error) -> Option<i32> {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        ErrorKind::Command(command_error) => Some(command_error.code),
        _ => None,
    }
}

impl MongoBackend {
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let url = connection_url(config);
        debug!("Creating MongoDB client for {}", config.connection_string());

        let client_options = ClientOptions::parse(&url).await.map_err(|e| {
            error!("Failed to parse MongoDB URL: {}", e);
            DataError::ConnectionFailed(format!("Failed to parse MongoDB URL: {}", e))
        })?;

        let client = Client::with_options(client_options).map_err(|e| {
            error!("Failed to create MongoDB client: {}", e);
            DataError::ConnectionFailed(format!("Failed to create MongoDB client: {}", e))
        })?;

        let database_name = config
            .database
            .as_deref()
            .ok_or_else(|| DataError::invalid_configuration("mongodb requires a database name"))?;
        let database = client.database(database_name);

        // Test connection
        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            error!("Failed to connect to MongoDB: {}", e);
            DataError::ConnectionFailed(format!("Failed to connect to MongoDB: {}", e))
        })?;

        debug!("MongoDB client created successfully");
        Ok(Self { client, database })
    }

    fn collection(&self, schema: &SchemaDefinition) -> Collection<Document> {
        self.database.collection(&schema.collection_name)
    }

    /// Normalise a driver error
    fn map_error(entity: &str, e: mongodb::error::Error) -> DataError {
        match error_code(&e) {
            Some(DUPLICATE_KEY_CODE) => return DataError::duplicate_key(entity, e.to_string()),
            Some(code) if INDEX_CONFLICT_CODES.contains(&code) => {
                return DataError::AlreadyExists(e.to_string())
            }
            _ => {}
        }

        match e.kind.as_ref() {
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. } => {
                error!("MongoDB connection error: {}", e);
                DataError::ConnectionFailed(e.to_string())
            }
            _ => {
                error!("MongoDB operation on '{}' failed: {}", entity, e);
                DataError::QueryFailed(e.to_string())
            }
        }
    }

    /// Index models for a schema: unique fields first, then declared tuples
    pub fn index_models(schema: &SchemaDefinition) -> Vec<IndexModel> {
        let pk = schema.primary_key();
        let name = |fields: &[&str]| format!("idx_{}_{}", schema.collection_name, fields.join("_"));

        let unique = schema
            .fields
            .iter()
            .filter(|f| f.unique && f.name != pk)
            .map(|f| {
                let mut keys = Document::new();
                keys.insert(f.name.as_str(), 1);
                IndexModel::builder()
                    .keys(keys)
                    .options(
                        IndexOptions::builder()
                            .name(name(&[f.name.as_str()]))
                            .unique(true)
                            .build(),
                    )
                    .build()
            });

        let declared = schema.indexes.iter().map(|fields| {
            let mut keys = Document::new();
            for field in fields {
                keys.insert(stored_name(schema, field), 1);
            }
            let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(name(&names)).build())
                .build()
        });

        unique.chain(declared).collect()
    }
}

#[async_trait]
impl Backend for MongoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        let collection = self.collection(schema);
        for model in Self::index_models(schema) {
            debug!("Ensuring index on {}: {:?}", schema.collection_name, model.keys);
            match collection.create_index(model).await {
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
        let document = record_to_document(schema, record)?;
        self.collection(schema)
            .insert_one(document)
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;
        Ok(())
    }

    async fn find(&self, schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<Record>> {
        let filter = build_filter(schema, &query.conditions)?;
        debug!("Finding in {}: {}", schema.collection_name, filter);

        let cursor = self
            .collection(schema)
            .find(filter)
            .with_options(find_options(schema, query))
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;

        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;

        Ok(documents
            .into_iter()
            .map(|d| document_to_record(schema, d))
            .collect())
    }

    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let filter = build_filter(schema, conditions)?;
        self.collection(schema)
            .count_documents(filter)
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))
    }

    async fn update(
        &self,
        schema: &SchemaDefinition,
        conditions: &[Condition],
        changes: &Record,
    ) -> Result<u64> {
        let filter = build_filter(schema, conditions)?;
        let set = record_to_document(schema, changes)?;
        let result = self
            .collection(schema)
            .update_many(filter, doc! { "$set": set })
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;
        Ok(result.modified_count)
    }

    async fn delete(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let filter = build_filter(schema, conditions)?;
        let result = self
            .collection(schema)
            .delete_many(filter)
            .await
            .map_err(|e| Self::map_error(&schema.entity, e))?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DataError::ConnectionFailed(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing MongoDB connection");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Connects [`MongoBackend`]s for the provider
pub struct MongoBackendFactory;

#[async_trait]
impl BackendFactory for MongoBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(MongoBackend::connect(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use convo_db::{record, FieldDef, FieldType};
    use serde_json::json;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new("users")
            .collection_name("app_users")
            .field(FieldDef::id("id"))
            .field(FieldDef::new("email", FieldType::String).unique())
            .field(FieldDef::new("workspaceId", FieldType::String))
            .field(FieldDef::new("isActive", FieldType::Boolean))
            .field(FieldDef::new("value", FieldType::Json))
            .index(&["workspaceId", "isActive"])
    }

    #[test]
    fn test_connection_url() {
        let config = BackendConfig::new(BackendKind::MongoDb)
            .with_host("mongo")
            .with_username("convo")
            .with_password("pw")
            .with_database("chat");
        assert_eq!(connection_url(&config), "mongodb://convo:pw@mongo:27017");

        let config = config.with_url("mongodb+srv://cluster.example.net");
        assert_eq!(connection_url(&config), "mongodb+srv://cluster.example.net");
    }

    #[test]
    fn test_filter_single_and_multiple_conditions() {
        let schema = schema();
        let single = build_filter(&schema, &[Condition::eq("id", "u1")]).unwrap();
        assert_eq!(single, doc! { "_id": { "$eq": "u1" } });

        let multiple = build_filter(
            &schema,
            &[
                Condition::is_in("email", vec!["a@x.com", "b@x.com"]),
                Condition::gte("loginCount", 3),
                Condition::like("email", "a.b"),
            ],
        )
        .unwrap();
        assert_eq!(
            multiple,
            doc! { "$and": [
                { "email": { "$in": ["a@x.com", "b@x.com"] } },
                { "loginCount": { "$gte": 3_i64 } },
                { "email": { "$regex": "a\\.b" } },
            ] }
        );

        assert!(build_filter(&schema, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_find_options_map_primary_key_and_projection() {
        let schema = schema();
        let query = QuerySpec::new()
            .order_by("id", SortDirection::Desc)
            .limit(5)
            .offset(10)
            .select(&["email"]);
        let options = find_options(&schema, &query);
        assert_eq!(options.sort, Some(doc! { "_id": -1 }));
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.projection, Some(doc! { "email": 1, "_id": 0 }));
    }

    #[test]
    fn test_index_models() {
        let models = MongoBackend::index_models(&schema());
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].keys, doc! { "email": 1 });
        assert_eq!(
            models[0].options.as_ref().and_then(|o| o.unique),
            Some(true)
        );
        assert_eq!(models[1].keys, doc! { "workspaceId": 1, "isActive": 1 });
        assert_eq!(
            models[1].options.as_ref().and_then(|o| o.name.clone()),
            Some("idx_app_users_workspaceId_isActive".to_string())
        );
    }

    #[test]
    fn test_document_conversion() {
        let schema = schema();
        let joined = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = record! {
            "id" => "u1",
            "isActive" => true,
            "joinedAt" => joined,
            "profile" => json!({"tags": ["a"]})
        };

        let document = record_to_document(&schema, &record).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "u1");
        assert!(document.get_datetime("joinedAt").is_ok());

        let back = document_to_record(&schema, document);
        assert_eq!(back["id"], DataValue::Text("u1".into()));
        assert_eq!(back["joinedAt"], DataValue::DateTime(joined));
        assert_eq!(back["profile"], DataValue::Json(json!({"tags": ["a"]})));
    }

    #[test]
    fn test_json_field_strings_read_back_as_strings() {
        let schema = schema();
        for stored in ["123", "true", "null"] {
            let record = record! { "id" => "s1", "value" => DataValue::Json(json!(stored)) };
            let document = record_to_document(&schema, &record).unwrap();
            assert_eq!(document.get_str("value").unwrap(), stored);

            let back = document_to_record(&schema, document);
            assert_eq!(back["value"], DataValue::Json(json!(stored)));
        }

        let document = doc! { "_id": "s2", "value": 42_i64, "email": "a@x.com" };
        let back = document_to_record(&schema, document);
        assert_eq!(back["value"], DataValue::Json(json!(42)));
        assert_eq!(back["email"], DataValue::Text("a@x.com".into()));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_duplicate_key_against_mongodb() {
        use testcontainers::{
            core::{ContainerPort, WaitFor},
            runners::AsyncRunner,
            GenericImage,
        };

        let node = GenericImage::new("mongo", "7")
            .with_exposed_port(ContainerPort::Tcp(27017))
            .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
            .start()
            .await
            .expect("Failed to start MongoDB container");
        let port = node
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get port");

        let config = BackendConfig::new(BackendKind::MongoDb)
            .with_url(format!("mongodb://localhost:{}", port))
            .with_database("convo_test");
        let backend = MongoBackend::connect(&config).await.unwrap();
        let schema = schema();
        backend.ensure_schema(&schema).await.unwrap();
        backend.ensure_schema(&schema).await.unwrap();

        backend
            .insert(&schema, &record! { "id" => "u1", "email" => "a@x.com", "isActive" => true })
            .await
            .unwrap();
        let err = backend
            .insert(&schema, &record! { "id" => "u2", "email" => "a@x.com" })
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let rows = backend
            .find(&schema, &QuerySpec::new().where_eq("isActive", true))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], DataValue::Text("u1".into()));
        assert_eq!(
            backend
                .update(&schema, &[Condition::eq("id", "missing")], &record! { "isActive" => false })
                .await
                .unwrap(),
            0
        );
    }
}
