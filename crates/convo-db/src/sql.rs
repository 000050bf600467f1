//! Statement builder shared by the SQL-family backends.
//!
//! Every value is bound as a parameter; only identifiers (quoted per dialect)
//! and numeric limits are written into the statement text.

use crate::error::{DataError, Result};
use crate::query::{Condition, Operator, QuerySpec};
use crate::types::{FieldDef, FieldType, SchemaDefinition};
use crate::value::{DataValue, Record};
use tracing::warn;

/// Escape character used for LIKE patterns; valid in every dialect without
/// string-literal escaping rules getting in the way
const LIKE_ESCAPE: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    MySql,
    Sqlite,
}

impl SqlDialect {
    /// Quote an identifier, doubling any embedded quote character
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Placeholder for the `index`-th parameter (1-based)
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::MySql | SqlDialect::Sqlite => "?".to_string(),
        }
    }

    pub fn column_type(&self, field: &FieldDef) -> String {
        let varchar = || format!("VARCHAR({})", field.max_length.unwrap_or(255));
        match (self, field.field_type) {
            (SqlDialect::Postgres, FieldType::String) => varchar(),
            (SqlDialect::Postgres, FieldType::Text) => "TEXT".to_string(),
            (SqlDialect::Postgres, FieldType::Integer) => "BIGINT".to_string(),
            (SqlDialect::Postgres, FieldType::Float) => "DOUBLE PRECISION".to_string(),
            (SqlDialect::Postgres, FieldType::Boolean) => "BOOLEAN".to_string(),
            (SqlDialect::Postgres, FieldType::DateTime) => "TIMESTAMPTZ".to_string(),
            (SqlDialect::Postgres, FieldType::Json) => "JSONB".to_string(),

            (SqlDialect::MySql, FieldType::String) => varchar(),
            (SqlDialect::MySql, FieldType::Text) => "LONGTEXT".to_string(),
            (SqlDialect::MySql, FieldType::Integer) => "BIGINT".to_string(),
            (SqlDialect::MySql, FieldType::Float) => "DOUBLE".to_string(),
            (SqlDialect::MySql, FieldType::Boolean) => "TINYINT(1)".to_string(),
            (SqlDialect::MySql, FieldType::DateTime) => "DATETIME(3)".to_string(),
            (SqlDialect::MySql, FieldType::Json) => "LONGTEXT".to_string(),

            (SqlDialect::Sqlite, FieldType::String | FieldType::Text) => "TEXT".to_string(),
            (SqlDialect::Sqlite, FieldType::Integer | FieldType::Boolean) => "INTEGER".to_string(),
            (SqlDialect::Sqlite, FieldType::Float) => "REAL".to_string(),
            (SqlDialect::Sqlite, FieldType::DateTime | FieldType::Json) => "TEXT".to_string(),
        }
    }

    fn supports_index_if_not_exists(&self) -> bool {
        !matches!(self, SqlDialect::MySql)
    }
}

/// A statement plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<DataValue>,
}

/// Escape LIKE wildcards in user text and wrap it for substring matching
pub fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for c in raw.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Builds statements for one schema in one dialect
pub struct SqlBuilder<'a> {
    dialect: SqlDialect,
    schema: &'a SchemaDefinition,
    table: String,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: SqlDialect, schema: &'a SchemaDefinition) -> Self {
        Self {
            dialect,
            table: dialect.quote_ident(&schema.table_name),
            schema,
        }
    }

    /// Qualify the table with a namespace (PostgreSQL schema)
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.table = format!(
            "{}.{}",
            self.dialect.quote_ident(namespace),
            self.dialect.quote_ident(&self.schema.table_name)
        );
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn column(&self, field: &str) -> Result<String> {
        if self.schema.get_field(field).is_none() {
            return Err(DataError::validation(format!(
                "unknown field '{}' on entity '{}'",
                field, self.schema.entity
            )));
        }
        Ok(self.dialect.quote_ident(field))
    }

    fn bind(&self, params: &mut Vec<DataValue>, value: DataValue) -> String {
        params.push(value);
        self.dialect.placeholder(params.len())
    }

    pub fn create_table(&self) -> String {
        let columns: Vec<String> = self
            .schema
            .fields
            .iter()
            .map(|field| {
                let mut column = format!(
                    "{} {}",
                    self.dialect.quote_ident(&field.name),
                    self.dialect.column_type(field)
                );
                if field.primary_key {
                    column.push_str(" PRIMARY KEY");
                } else {
                    if field.required {
                        column.push_str(" NOT NULL");
                    }
                    if field.unique {
                        column.push_str(" UNIQUE");
                    }
                }
                column
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }

    pub fn index_name(&self, fields: &[String]) -> String {
        format!("idx_{}_{}", self.schema.table_name, fields.join("_"))
    }

    pub fn create_indexes(&self) -> Vec<String> {
        self.schema
            .indexes
            .iter()
            .map(|fields| {
                let columns: Vec<String> = fields
                    .iter()
                    .map(|f| self.dialect.quote_ident(f))
                    .collect();
                let if_not_exists = if self.dialect.supports_index_if_not_exists() {
                    "IF NOT EXISTS "
                } else {
                    ""
                };
                format!(
                    "CREATE INDEX {}{} ON {} ({})",
                    if_not_exists,
                    self.dialect.quote_ident(&self.index_name(fields)),
                    self.table,
                    columns.join(", ")
                )
            })
            .collect()
    }

    /// Record fields that have a column, in schema order; the rest are dropped
    fn known_values(&self, record: &Record) -> Vec<(String, DataValue)> {
        for key in record.keys() {
            if self.schema.get_field(key).is_none() {
                warn!(
                    "Dropping field '{}' on '{}': no column to store it",
                    key, self.schema.entity
                );
            }
        }
        self.schema
            .fields
            .iter()
            .filter_map(|f| record.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect()
    }

    pub fn insert(&self, record: &Record) -> Result<SqlStatement> {
        let values = self.known_values(record);
        if values.is_empty() {
            return Err(DataError::validation(format!(
                "nothing to insert into '{}'",
                self.schema.entity
            )));
        }

        let mut params = Vec::with_capacity(values.len());
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (name, value) in values {
            columns.push(self.dialect.quote_ident(&name));
            placeholders.push(self.bind(&mut params, value));
        }

        Ok(SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        })
    }

    fn where_clause(&self, conditions: &[Condition], params: &mut Vec<DataValue>) -> Result<String> {
        if conditions.is_empty() {
            return Ok(String::new());
        }

        let mut clauses = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let column = self.column(&condition.field)?;
            let clause = match (condition.operator, &condition.value) {
                (Operator::Eq, DataValue::Null) => format!("{} IS NULL", column),
                (Operator::Ne, DataValue::Null) => format!("{} IS NOT NULL", column),
                (Operator::In, _) => {
                    let values = condition.list_values()?;
                    if values.is_empty() {
                        "1 = 0".to_string()
                    } else {
                        let placeholders: Vec<String> =
                            values.into_iter().map(|v| self.bind(params, v)).collect();
                        format!("{} IN ({})", column, placeholders.join(", "))
                    }
                }
                (Operator::Like, value) => {
                    let raw = value.as_str().ok_or_else(|| {
                        DataError::validation(format!(
                            "operator 'like' on '{}' needs a string value",
                            condition.field
                        ))
                    })?;
                    let ph = self.bind(params, DataValue::Text(like_pattern(raw)));
                    format!("{} LIKE {} ESCAPE '{}'", column, ph, LIKE_ESCAPE)
                }
                (op, value) => {
                    let sql_op = match op {
                        Operator::Eq => "=",
                        Operator::Ne => "<>",
                        Operator::Gt => ">",
                        Operator::Lt => "<",
                        Operator::Gte => ">=",
                        _ => "<=",
                    };
                    let ph = self.bind(params, value.clone());
                    format!("{} {} {}", column, sql_op, ph)
                }
            };
            clauses.push(clause);
        }

        Ok(format!(" WHERE {}", clauses.join(" AND ")))
    }

    pub fn select(&self, query: &QuerySpec) -> Result<SqlStatement> {
        let projection = match &query.select {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|f| self.column(f))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
            _ => "*".to_string(),
        };

        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection, self.table);
        sql.push_str(&self.where_clause(&query.conditions, &mut params)?);

        if !query.order_by.is_empty() {
            let order = query
                .order_by
                .iter()
                .map(|o| Ok(format!("{} {}", self.column(&o.field)?, o.direction.as_sql())))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => match self.dialect {
                SqlDialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                SqlDialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                SqlDialect::MySql => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", u64::MAX, offset))
                }
            },
            (None, None) => {}
        }

        Ok(SqlStatement { sql, params })
    }

    pub fn count(&self, conditions: &[Condition]) -> Result<SqlStatement> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        sql.push_str(&self.where_clause(conditions, &mut params)?);
        Ok(SqlStatement { sql, params })
    }

    pub fn update(&self, conditions: &[Condition], changes: &Record) -> Result<SqlStatement> {
        let values = self.known_values(changes);
        if values.is_empty() {
            return Err(DataError::validation(format!(
                "nothing to update on '{}'",
                self.schema.entity
            )));
        }

        let mut params = Vec::new();
        let assignments: Vec<String> = values
            .into_iter()
            .map(|(name, value)| {
                let ph = self.bind(&mut params, value);
                format!("{} = {}", self.dialect.quote_ident(&name), ph)
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        sql.push_str(&self.where_clause(conditions, &mut params)?);
        Ok(SqlStatement { sql, params })
    }

    pub fn delete(&self, conditions: &[Condition]) -> Result<SqlStatement> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table);
        sql.push_str(&self.where_clause(conditions, &mut params)?);
        Ok(SqlStatement { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;
    use crate::record;

    fn users() -> SchemaDefinition {
        SchemaDefinition::new("users")
            .field(FieldDef::id("id"))
            .field(
                FieldDef::new("email", FieldType::String)
                    .required()
                    .unique()
                    .max_length(320),
            )
            .field(FieldDef::new("isActive", FieldType::Boolean))
            .field(FieldDef::new("profile", FieldType::Json))
            .index(&["email", "isActive"])
    }

    #[test]
    fn test_create_table_postgres() {
        let schema = users();
        let sql = SqlBuilder::new(SqlDialect::Postgres, &schema).create_table();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(sql.contains("\"id\" VARCHAR(255) PRIMARY KEY"));
        assert!(sql.contains("\"email\" VARCHAR(320) NOT NULL UNIQUE"));
        assert!(sql.contains("\"isActive\" BOOLEAN"));
        assert!(sql.contains("\"profile\" JSONB"));
    }

    #[test]
    fn test_create_table_mysql_and_sqlite_types() {
        let schema = users();
        let mysql = SqlBuilder::new(SqlDialect::MySql, &schema).create_table();
        assert!(mysql.contains("`isActive` TINYINT(1)"));
        assert!(mysql.contains("`profile` LONGTEXT"));

        let sqlite = SqlBuilder::new(SqlDialect::Sqlite, &schema).create_table();
        assert!(sqlite.contains("\"isActive\" INTEGER"));
        assert!(sqlite.contains("\"email\" TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn test_create_indexes() {
        let schema = users();
        let pg = SqlBuilder::new(SqlDialect::Postgres, &schema).create_indexes();
        assert_eq!(
            pg,
            vec![
                "CREATE INDEX IF NOT EXISTS \"idx_users_email_isActive\" ON \"users\" (\"email\", \"isActive\")"
                    .to_string()
            ]
        );
        let mysql = SqlBuilder::new(SqlDialect::MySql, &schema).create_indexes();
        assert!(mysql[0].starts_with("CREATE INDEX `idx_users_email_isActive`"));
    }

    #[test]
    fn test_select_numbers_postgres_placeholders() {
        let schema = users();
        let query = QuerySpec::new()
            .where_eq("email", "a@x.com")
            .filter(Condition::is_in("id", vec!["u1", "u2"]))
            .filter(Condition::like("email", "50%"))
            .order_by("email", SortDirection::Desc)
            .limit(10)
            .offset(20);

        let stmt = SqlBuilder::new(SqlDialect::Postgres, &schema)
            .with_namespace("public")
            .select(&query)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"public\".\"users\" WHERE \"email\" = $1 AND \"id\" IN ($2, $3) \
             AND \"email\" LIKE $4 ESCAPE '!' ORDER BY \"email\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(stmt.params.len(), 4);
        assert_eq!(stmt.params[3], DataValue::Text("%50!%%".into()));
    }

    #[test]
    fn test_select_mysql_offset_without_limit() {
        let schema = users();
        let query = QuerySpec::new().select(&["id", "email"]).offset(5);
        let stmt = SqlBuilder::new(SqlDialect::MySql, &schema)
            .select(&query)
            .unwrap();
        assert!(stmt.sql.starts_with("SELECT `id`, `email` FROM `users`"));
        assert!(stmt.sql.ends_with("OFFSET 5"));
        assert!(stmt.sql.contains("LIMIT 18446744073709551615"));
    }

    #[test]
    fn test_null_and_empty_in_conditions() {
        let schema = users();
        let conditions = vec![
            Condition::eq("profile", DataValue::Null),
            Condition::ne("email", DataValue::Null),
            Condition::is_in::<&str>("id", vec![]),
        ];
        let stmt = SqlBuilder::new(SqlDialect::Sqlite, &schema)
            .count(&conditions)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM \"users\" WHERE \"profile\" IS NULL AND \"email\" IS NOT NULL AND 1 = 0"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_unknown_condition_field_rejected() {
        let schema = users();
        let err = SqlBuilder::new(SqlDialect::Sqlite, &schema)
            .delete(&[Condition::eq("nope", 1)])
            .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
    }

    #[test]
    fn test_insert_and_update_drop_unknown_fields() {
        let schema = users();
        let builder = SqlBuilder::new(SqlDialect::Postgres, &schema);

        let insert = builder
            .insert(&record! { "id" => "u1", "email" => "a@x.com", "stray" => 1 })
            .unwrap();
        assert_eq!(
            insert.sql,
            "INSERT INTO \"users\" (\"id\", \"email\") VALUES ($1, $2)"
        );

        let update = builder
            .update(&[Condition::eq("id", "u1")], &record! { "isActive" => false })
            .unwrap();
        assert_eq!(
            update.sql,
            "UPDATE \"users\" SET \"isActive\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(update.params, vec![DataValue::Bool(false), DataValue::Text("u1".into())]);

        assert!(builder.update(&[], &record! { "stray" => 1 }).is_err());
    }
}
