//! Backend-independent query description: filters, ordering, pagination
//! and projection.

use crate::error::{DataError, Result};
use crate::value::DataValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators a condition can use
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    /// Substring match; case sensitivity is whatever the backend does by default
    Like,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Like => "like",
        };
        write!(f, "{}", s)
    }
}

/// One filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: DataValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<DataValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Gte, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self::new(field, Operator::Lte, value)
    }

    pub fn is_in<V: Into<DataValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        let values: Vec<DataValue> = values.into_iter().map(Into::into).collect();
        Self::new(field, Operator::In, DataValue::List(values))
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, Operator::Like, DataValue::Text(pattern.into()))
    }

    /// Values for an `in` condition
    pub fn list_values(&self) -> Result<Vec<DataValue>> {
        self.value.as_list().ok_or_else(|| {
            DataError::validation(format!(
                "operator 'in' on '{}' needs a list value, got {}",
                self.field,
                self.value.type_name()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(DataError::validation("condition field name is empty"));
        }
        match self.operator {
            Operator::In => {
                self.list_values()?;
            }
            Operator::Like => {
                if self.value.as_str().is_none() {
                    return Err(DataError::validation(format!(
                        "operator 'like' on '{}' needs a string value",
                        self.field
                    )));
                }
            }
            Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte => {
                if self.value.is_null() {
                    return Err(DataError::validation(format!(
                        "operator '{}' on '{}' cannot compare with null",
                        self.operator, self.field
                    )));
                }
            }
            Operator::Eq | Operator::Ne => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// A complete query: conditions are implicitly AND-ed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.filter(Condition::eq(field, value))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            condition.validate()?;
        }
        if let Some(order) = self.order_by.iter().find(|o| o.field.trim().is_empty()) {
            return Err(DataError::validation(format!(
                "order by field name is empty ({:?})",
                order
            )));
        }
        if let Some(select) = &self.select {
            if select.iter().any(|f| f.trim().is_empty()) {
                return Err(DataError::validation("select contains an empty field name"));
            }
        }
        Ok(())
    }
}
