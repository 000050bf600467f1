//! Supabase backend for convo-db
//!
//! Talks to the project's PostgREST endpoint (`<project url>/rest/v1`) with
//! the service key. Conditions become PostgREST filter parameters, counts
//! come from the `Content-Range` header of a `count=exact` request.
//!
//! PostgREST cannot run DDL, so materialising a schema probes the table and,
//! when it is missing, sends the generated Postgres DDL to a SQL-executing
//! RPC function (`exec_sql(sql text)` unless the `ddl_rpc` option names
//! another one). Projects without that function get
//! `OperationNotSupported` and have to create their tables up front.

use async_trait::async_trait;
use convo_db::coerce::tag_native_json;
use convo_db::sql::{SqlBuilder, SqlDialect};
use convo_db::value::{format_datetime, record_from_json};
use convo_db::{
    Backend, BackendConfig, BackendFactory, BackendKind, Condition, DataError, DataValue,
    Operator, QuerySpec, Record, Result, SchemaDefinition,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_NAMESPACE: &str = "public";
const DEFAULT_DDL_RPC: &str = "exec_sql";
const REST_PATH: &str = "/rest/v1";
const UNIQUE_VIOLATION: &str = "23505";
/// Codes PostgREST uses for a table it cannot see
const MISSING_TABLE_CODES: [&str; 2] = ["42P01", "PGRST205"];

/// Error body PostgREST sends with non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl PostgrestError {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| PostgrestError {
            message: Some(body.to_string()),
            ..Default::default()
        })
    }

    fn describe(&self, status: StatusCode) -> String {
        let mut text = self
            .message
            .clone()
            .unwrap_or_else(|| status.to_string());
        if let Some(details) = &self.details {
            text.push_str(&format!(" ({})", details));
        }
        text
    }

    fn is_missing_table(&self, status: StatusCode) -> bool {
        status == StatusCode::NOT_FOUND
            || self
                .code
                .as_deref()
                .map(|c| MISSING_TABLE_CODES.contains(&c))
                .unwrap_or(false)
    }
}

/// Supabase (PostgREST) backend implementation
pub struct SupabaseBackend {
    client: Client,
    rest_url: String,
    namespace: String,
    ddl_rpc: String,
}

/// REST root for a project URL; a URL already pointing at it is kept
pub fn rest_url(project_url: &str) -> String {
    let trimmed = project_url.trim_end_matches('/');
    if trimmed.ends_with(REST_PATH) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, REST_PATH)
    }
}

/// Text form of a value inside a filter parameter
fn filter_text(value: &DataValue) -> String {
    match value {
        DataValue::DateTime(dt) => format_datetime(dt),
        DataValue::Json(v) => v.to_string(),
        other => other.to_string(),
    }
}

/// Items of an `in.(...)` list, quoted when they contain reserved characters
fn list_item(value: &DataValue) -> String {
    let text = filter_text(value);
    let reserved = text.is_empty()
        || text
            .chars()
            .any(|c| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | '\\') || c.is_whitespace());
    if reserved {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

/// `like` operand matching `raw` anywhere, with LIKE metacharacters escaped
fn like_operand(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('*');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

fn check_field(schema: &SchemaDefinition, name: &str, role: &str) -> Result<()> {
    if schema.get_field(name).is_none() {
        return Err(DataError::validation(format!(
            "unknown {} field '{}' on '{}'",
            role, name, schema.entity
        )));
    }
    Ok(())
}

/// One PostgREST filter parameter for a condition
pub fn condition_param(schema: &SchemaDefinition, condition: &Condition) -> Result<(String, String)> {
    check_field(schema, &condition.field, "filter")?;

    let value = &condition.value;
    let filter = match (condition.operator, value) {
        (Operator::Eq, DataValue::Null) => "is.null".to_string(),
        (Operator::Ne, DataValue::Null) => "not.is.null".to_string(),
        (Operator::Eq, v) => format!("eq.{}", filter_text(v)),
        (Operator::Ne, v) => format!("neq.{}", filter_text(v)),
        (Operator::Gt, v) => format!("gt.{}", filter_text(v)),
        (Operator::Lt, v) => format!("lt.{}", filter_text(v)),
        (Operator::Gte, v) => format!("gte.{}", filter_text(v)),
        (Operator::Lte, v) => format!("lte.{}", filter_text(v)),
        (Operator::In, _) => {
            let items: Vec<String> = condition.list_values()?.iter().map(list_item).collect();
            format!("in.({})", items.join(","))
        }
        (Operator::Like, v) => {
            let raw = v.as_str().ok_or_else(|| {
                DataError::validation(format!(
                    "operator 'like' on '{}' needs a string value",
                    condition.field
                ))
            })?;
            format!("like.{}", like_operand(raw))
        }
    };

    Ok((condition.field.clone(), filter))
}

fn filter_params(schema: &SchemaDefinition, conditions: &[Condition]) -> Result<Vec<(String, String)>> {
    conditions
        .iter()
        .map(|c| condition_param(schema, c))
        .collect()
}

/// Full parameter list for a read: filters, projection, order and paging
pub fn query_params(schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<(String, String)>> {
    let mut params = filter_params(schema, &query.conditions)?;

    let select = match &query.select {
        Some(fields) if !fields.is_empty() => {
            for field in fields {
                check_field(schema, field, "select")?;
            }
            fields.join(",")
        }
        _ => "*".to_string(),
    };
    params.push(("select".to_string(), select));

    if !query.order_by.is_empty() {
        let mut order = Vec::with_capacity(query.order_by.len());
        for o in &query.order_by {
            check_field(schema, &o.field, "order")?;
            order.push(format!(
                "{}.{}",
                o.field,
                o.direction.as_sql().to_ascii_lowercase()
            ));
        }
        params.push(("order".to_string(), order.join(",")));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }

    Ok(params)
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// JSON body for a write, dropping fields the schema does not declare
fn record_body(schema: &SchemaDefinition, record: &Record) -> Value {
    let mut body = Map::new();
    for (name, value) in record {
        if schema.get_field(name).is_none() {
            warn!("Dropping unknown field '{}' on '{}'", name, schema.entity);
            continue;
        }
        body.insert(name.clone(), value.to_json());
    }
    Value::Object(body)
}

fn transport_error(e: reqwest::Error) -> DataError {
    if e.is_connect() || e.is_timeout() {
        error!("Supabase connection error: {}", e);
        DataError::ConnectionFailed(e.to_string())
    } else {
        error!("Supabase request failed: {}", e);
        DataError::QueryFailed(e.to_string())
    }
}

/// Normalise a PostgREST error response
fn map_status(entity: &str, status: StatusCode, body: &PostgrestError) -> DataError {
    let message = body.describe(status);

    if status == StatusCode::CONFLICT || body.code.as_deref() == Some(UNIQUE_VIOLATION) {
        return DataError::duplicate_key(entity, message);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!("Supabase rejected credentials: {}", message);
            DataError::ConnectionFailed(message)
        }
        _ => {
            error!(
                "Supabase operation on '{}' failed with {}: {}",
                entity, status, message
            );
            DataError::QueryFailed(message)
        }
    }
}

impl SupabaseBackend {
    pub fn connect(config: &BackendConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| DataError::invalid_configuration("supabase requires a project url"))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| DataError::invalid_configuration("supabase requires an api key"))?;

        let header = |value: String| {
            HeaderValue::from_str(&value).map_err(|e| {
                DataError::invalid_configuration(format!("Invalid supabase api key: {}", e))
            })
        };
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header(api_key.to_string())?);
        headers.insert(AUTHORIZATION, header(format!("Bearer {}", api_key))?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                DataError::ConnectionFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        let rest_url = rest_url(url);
        debug!("Supabase REST endpoint: {}", rest_url);

        Ok(Self {
            client,
            rest_url,
            namespace: config
                .option("schema")
                .unwrap_or(DEFAULT_NAMESPACE)
                .to_string(),
            ddl_rpc: config
                .option("ddl_rpc")
                .unwrap_or(DEFAULT_DDL_RPC)
                .to_string(),
        })
    }

    fn table_url(&self, schema: &SchemaDefinition) -> String {
        format!("{}/{}", self.rest_url, schema.table_name)
    }

    /// Point reads at a non-default schema
    fn read_profile(&self, request: RequestBuilder) -> RequestBuilder {
        if self.namespace == DEFAULT_NAMESPACE {
            request
        } else {
            request.header("Accept-Profile", &self.namespace)
        }
    }

    fn write_profile(&self, request: RequestBuilder) -> RequestBuilder {
        if self.namespace == DEFAULT_NAMESPACE {
            request
        } else {
            request.header("Content-Profile", &self.namespace)
        }
    }

    /// Send and turn non-2xx responses into errors
    async fn send(&self, entity: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_status(entity, status, &PostgrestError::parse(&body)))
    }

    async fn json_rows(response: Response) -> Result<Vec<Value>> {
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| DataError::Serialization(format!("Invalid PostgREST response: {}", e)))
    }

    /// Whether the table is visible through PostgREST
    async fn table_exists(&self, schema: &SchemaDefinition) -> Result<bool> {
        let request = self.read_profile(
            self.client
                .get(self.table_url(schema))
                .query(&[("select", "*"), ("limit", "0")]),
        );
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let body = PostgrestError::parse(&response.text().await.unwrap_or_default());
        if body.is_missing_table(status) {
            Ok(false)
        } else {
            Err(map_status(&schema.entity, status, &body))
        }
    }

    /// Table and index DDL, followed by a schema cache reload
    pub fn ddl(&self, schema: &SchemaDefinition) -> String {
        let builder = SqlBuilder::new(SqlDialect::Postgres, schema).with_namespace(&self.namespace);
        let mut statements = vec![builder.create_table()];
        statements.extend(builder.create_indexes());
        statements.push("NOTIFY pgrst, 'reload schema'".to_string());
        statements.join(";\n")
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Supabase
    }

    async fn ensure_schema(&self, schema: &SchemaDefinition) -> Result<()> {
        if self.table_exists(schema).await? {
            debug!("Table {} already visible through PostgREST", schema.table_name);
            return Ok(());
        }

        info!(
            "Creating table {} through rpc/{}",
            schema.table_name, self.ddl_rpc
        );
        let url = format!("{}/rpc/{}", self.rest_url, self.ddl_rpc);
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "sql": self.ddl(schema) }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = PostgrestError::parse(&response.text().await.unwrap_or_default());
        if status == StatusCode::NOT_FOUND {
            return Err(DataError::operation_not_supported(format!(
                "table '{}' is missing and the project has no '{}(sql text)' function to create it",
                schema.table_name, self.ddl_rpc
            )));
        }
        Err(map_status(&schema.entity, status, &body))
    }

    async fn insert(&self, schema: &SchemaDefinition, record: &Record) -> Result<()> {
        let request = self.write_profile(
            self.client
                .post(self.table_url(schema))
                .header("Prefer", "return=minimal")
                .json(&record_body(schema, record)),
        );
        self.send(&schema.entity, request).await?;
        Ok(())
    }

    async fn find(&self, schema: &SchemaDefinition, query: &QuerySpec) -> Result<Vec<Record>> {
        let params = query_params(schema, query)?;
        debug!("Finding in {}: {:?}", schema.table_name, params);

        let request = self.read_profile(self.client.get(self.table_url(schema)).query(&params));
        let response = self.send(&schema.entity, request).await?;

        Self::json_rows(response)
            .await?
            .into_iter()
            .map(|row| Ok(tag_native_json(schema, record_from_json(row)?)))
            .collect()
    }

    async fn count(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let mut params = filter_params(schema, conditions)?;
        params.push(("select".to_string(), schema.primary_key().to_string()));

        let request = self.read_profile(
            self.client
                .head(self.table_url(schema))
                .header("Prefer", "count=exact")
                .query(&params),
        );
        let response = self.send(&schema.entity, request).await?;

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| {
                DataError::QueryFailed(format!(
                    "count on '{}' returned no Content-Range total",
                    schema.entity
                ))
            })
    }

    async fn update(
        &self,
        schema: &SchemaDefinition,
        conditions: &[Condition],
        changes: &Record,
    ) -> Result<u64> {
        let mut params = filter_params(schema, conditions)?;
        params.push(("select".to_string(), schema.primary_key().to_string()));

        let request = self.write_profile(
            self.client
                .patch(self.table_url(schema))
                .header("Prefer", "return=representation")
                .query(&params)
                .json(&record_body(schema, changes)),
        );
        let response = self.send(&schema.entity, request).await?;
        Ok(Self::json_rows(response).await?.len() as u64)
    }

    async fn delete(&self, schema: &SchemaDefinition, conditions: &[Condition]) -> Result<u64> {
        let mut params = filter_params(schema, conditions)?;
        params.push(("select".to_string(), schema.primary_key().to_string()));

        let request = self.write_profile(
            self.client
                .delete(self.table_url(schema))
                .header("Prefer", "return=representation")
                .query(&params),
        );
        let response = self.send(&schema.entity, request).await?;
        Ok(Self::json_rows(response).await?.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/", self.rest_url))
            .send()
            .await
            .map_err(|e| DataError::ConnectionFailed(format!("Supabase ping failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DataError::ConnectionFailed(
                "Supabase rejected the api key".to_string(),
            )),
            status if status.is_server_error() => Err(DataError::ConnectionFailed(format!(
                "Supabase ping failed with {}",
                status
            ))),
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        debug!("Closing Supabase client");
        Ok(())
    }
}

/// Connects [`SupabaseBackend`]s for the provider
pub struct SupabaseBackendFactory;

#[async_trait]
impl BackendFactory for SupabaseBackendFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Supabase
    }

    async fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(SupabaseBackend::connect(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_db::{record, FieldDef, FieldType, SortDirection};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new("users")
            .field(FieldDef::id("id"))
            .field(FieldDef::new("email", FieldType::String).required().unique())
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("isActive", FieldType::Boolean))
            .field(FieldDef::new("loginCount", FieldType::Integer))
            .index(&["isActive"])
    }

    fn create_mock_backend(mock_server: &MockServer) -> SupabaseBackend {
        let config = BackendConfig::new(BackendKind::Supabase)
            .with_url(mock_server.uri())
            .with_api_key("test-key");
        SupabaseBackend::connect(&config).unwrap()
    }

    #[test]
    fn test_rest_url() {
        assert_eq!(
            rest_url("https://abc.supabase.co/"),
            "https://abc.supabase.co/rest/v1"
        );
        assert_eq!(
            rest_url("https://abc.supabase.co/rest/v1"),
            "https://abc.supabase.co/rest/v1"
        );
    }

    #[test]
    fn test_condition_params() {
        let schema = schema();
        let param = |c: Condition| condition_param(&schema, &c).unwrap();

        assert_eq!(
            param(Condition::eq("isActive", true)),
            ("isActive".to_string(), "eq.true".to_string())
        );
        assert_eq!(param(Condition::eq("name", DataValue::Null)).1, "is.null");
        assert_eq!(param(Condition::ne("name", DataValue::Null)).1, "not.is.null");
        assert_eq!(param(Condition::gte("loginCount", 3)).1, "gte.3");
        assert_eq!(
            param(Condition::is_in("email", vec!["a@x.com", "b,c"])).1,
            "in.(\"a@x.com\",\"b,c\")"
        );
        assert_eq!(param(Condition::is_in("id", vec!["u1", "u2"])).1, "in.(u1,u2)");
        assert_eq!(param(Condition::like("name", "50%_off")).1, "like.*50\\%\\_off*");

        let unknown = condition_param(&schema, &Condition::eq("nickname", "x"));
        assert!(matches!(unknown, Err(DataError::Validation(_))));
    }

    #[test]
    fn test_query_params() {
        let query = QuerySpec::new()
            .where_eq("isActive", true)
            .order_by("loginCount", SortDirection::Desc)
            .order_by("name", SortDirection::Asc)
            .limit(10)
            .offset(20)
            .select(&["id", "name"]);

        let params = query_params(&schema(), &query).unwrap();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("isActive"), Some("eq.true"));
        assert_eq!(get("select"), Some("id,name"));
        assert_eq!(get("order"), Some("loginCount.desc,name.asc"));
        assert_eq!(get("limit"), Some("10"));
        assert_eq!(get("offset"), Some("20"));

        let defaults = query_params(&schema(), &QuerySpec::new()).unwrap();
        assert_eq!(defaults, vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_map_status() {
        let duplicate = PostgrestError::parse(
            r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
        );
        assert!(map_status("users", StatusCode::CONFLICT, &duplicate).is_duplicate_key());

        let plain = PostgrestError::parse("not json");
        assert!(map_status("users", StatusCode::UNAUTHORIZED, &plain).is_connection());
        assert!(matches!(
            map_status("users", StatusCode::BAD_REQUEST, &plain),
            DataError::QueryFailed(msg) if msg == "not json"
        ));
    }

    #[test]
    fn test_ddl_creates_table_and_indexes() {
        let config = BackendConfig::new(BackendKind::Supabase)
            .with_url("https://abc.supabase.co")
            .with_api_key("k")
            .with_option("schema", "convo");
        let backend = SupabaseBackend::connect(&config).unwrap();

        let ddl = backend.ddl(&schema());
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"convo\".\"users\""));
        assert!(ddl.contains("CREATE INDEX IF NOT EXISTS"));
        assert!(ddl.ends_with("NOTIFY pgrst, 'reload schema'"));
    }

    #[tokio::test]
    async fn test_ensure_schema_skips_existing_table() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(header("apikey", "test-key"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/exec_sql"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        backend.ensure_schema(&schema()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_missing_table() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "PGRST205",
                "message": "Could not find the table 'public.users' in the schema cache"
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/exec_sql"))
            .and(body_string_contains("CREATE TABLE IF NOT EXISTS"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        backend.ensure_schema(&schema()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_schema_without_ddl_function() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": "42P01"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/exec_sql"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": "PGRST202"})))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        let err = backend.ensure_schema(&schema()).await.unwrap_err();
        assert!(matches!(err, DataError::OperationNotSupported(_)));
    }

    #[tokio::test]
    async fn test_insert_duplicate_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(header("prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"users_email_key\""
            })))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        let err = backend
            .insert(&schema(), &record! { "id" => "u2", "email" => "a@x.com" })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateKey { entity, .. } if entity == "users"));
    }

    #[tokio::test]
    async fn test_find_sends_filters_and_parses_rows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("isActive", "eq.true"))
            .and(query_param("order", "loginCount.desc"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "u3", "email": "c@x.com", "isActive": true, "loginCount": 9},
                {"id": "u1", "email": "a@x.com", "isActive": true, "loginCount": 1}
            ])))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        let query = QuerySpec::new()
            .where_eq("isActive", true)
            .order_by("loginCount", SortDirection::Desc)
            .limit(2);
        let rows = backend.find(&schema(), &query).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], DataValue::Text("u3".into()));
        assert_eq!(rows[0]["loginCount"], DataValue::Int(9));
    }

    #[tokio::test]
    async fn test_find_keeps_json_strings() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "s1", "value": "123"},
                {"id": "s2", "value": "true"},
                {"id": "s3", "value": {"theme": "dark"}}
            ])))
            .mount(&mock_server)
            .await;

        let schema = SchemaDefinition::new("settings")
            .field(FieldDef::id("id"))
            .field(FieldDef::new("value", FieldType::Json));
        let backend = create_mock_backend(&mock_server);
        let rows = backend.find(&schema, &QuerySpec::new()).await.unwrap();

        assert_eq!(rows[0]["value"], DataValue::Json(json!("123")));
        assert_eq!(rows[1]["value"], DataValue::Json(json!("true")));
        assert_eq!(rows[2]["value"], DataValue::Json(json!({"theme": "dark"})));
        assert_eq!(rows[0]["id"], DataValue::Text("s1".into()));
    }

    #[tokio::test]
    async fn test_count_reads_content_range() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/users"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-1/7"))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        let total = backend
            .count(&schema(), &[Condition::eq("isActive", true)])
            .await
            .unwrap();
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn test_update_and_delete_count_returned_rows() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u1"))
            .and(body_string_contains("Ada"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "u1"}])))
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        let modified = backend
            .update(
                &schema(),
                &[Condition::eq("id", "u1")],
                &record! { "name" => "Ada", "nickname" => "ignored" },
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let deleted = backend
            .delete(&schema(), &[Condition::eq("id", "ghost")])
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_ping_rejects_bad_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let backend = create_mock_backend(&mock_server);
        assert!(backend.ping().await.unwrap_err().is_connection());
    }
}
