use crate::response::{model, models, paging, recover, Page, ServiceResponse};
use convo_core::ServiceResult;
use convo_db::{record, QuerySpec, Record, SortDirection, UniversalDatabaseService, CREATED_AT};
use convo_entities::users::{self, Model as User};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

const ROLES: [&str; 2] = ["user", "admin"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

fn normalize_email(email: &str) -> Result<String, String> {
    let email = email.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(format!("'{}' is not a valid email address", email))
    }
}

fn check_role(role: &str) -> Result<(), String> {
    if ROLES.contains(&role) {
        Ok(())
    } else {
        Err(format!("role must be one of {}", ROLES.join(", ")))
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<UniversalDatabaseService>,
}

impl UserService {
    pub fn new(db: Arc<UniversalDatabaseService>) -> Self {
        Self { db }
    }

    async fn email_taken(&self, email: &str, except: Option<&str>) -> ServiceResult<bool> {
        let existing = self
            .db
            .find_one(users::ENTITY, QuerySpec::new().where_eq("email", email))
            .await?;
        Ok(match (existing, except) {
            (Some(user), Some(id)) => user.get("id").and_then(|v| v.as_str()) != Some(id),
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    pub async fn create(&self, request: CreateUserRequest) -> ServiceResult<ServiceResponse<User>> {
        let email = match normalize_email(&request.email) {
            Ok(email) => email,
            Err(message) => return Ok(ServiceResponse::invalid(message)),
        };
        if let Some(role) = &request.role {
            if let Err(message) = check_role(role) {
                return Ok(ServiceResponse::invalid(message));
            }
        }

        if self.email_taken(&email, None).await? {
            return Ok(ServiceResponse::conflict(format!(
                "A user with email {} already exists",
                email
            )));
        }

        let record = record! {
            "email" => email.as_str(),
            "name" => request.name,
            "avatarUrl" => request.avatar_url,
            "role" => request.role
        };
        let id = match self.db.insert(users::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };

        info!("Created user {} ({})", id, email);
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> ServiceResult<ServiceResponse<User>> {
        match self.db.find_by_id(users::ENTITY, id).await? {
            Some(record) => Ok(ServiceResponse::ok(model(&record)?)),
            None => Ok(ServiceResponse::not_found(format!("User {} not found", id))),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> ServiceResult<ServiceResponse<User>> {
        let email = email.trim().to_lowercase();
        let found = self
            .db
            .find_one(users::ENTITY, QuerySpec::new().where_eq("email", email.as_str()))
            .await?;
        match found {
            Some(record) => Ok(ServiceResponse::ok(model(&record)?)),
            None => Ok(ServiceResponse::not_found(format!(
                "No user with email {}",
                email
            ))),
        }
    }

    /// Newest first
    pub async fn list(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ServiceResult<ServiceResponse<Page<User>>> {
        let (limit, offset) = paging(limit, offset);
        let query = QuerySpec::new()
            .order_by(CREATED_AT, SortDirection::Desc)
            .limit(limit)
            .offset(offset);
        let result = self.db.find_many(users::ENTITY, query).await?;

        Ok(ServiceResponse::ok(Page {
            items: models(&result.data)?,
            total: result.total,
            limit,
            offset,
        }))
    }

    pub async fn update(
        &self,
        id: &str,
        request: UpdateUserRequest,
    ) -> ServiceResult<ServiceResponse<User>> {
        let mut changes = Record::new();

        if let Some(email) = &request.email {
            let email = match normalize_email(email) {
                Ok(email) => email,
                Err(message) => return Ok(ServiceResponse::invalid(message)),
            };
            if self.email_taken(&email, Some(id)).await? {
                return Ok(ServiceResponse::conflict(format!(
                    "A user with email {} already exists",
                    email
                )));
            }
            changes.insert("email".to_string(), email.into());
        }
        if let Some(role) = &request.role {
            if let Err(message) = check_role(role) {
                return Ok(ServiceResponse::invalid(message));
            }
            changes.insert("role".to_string(), role.into());
        }
        if let Some(name) = request.name {
            changes.insert("name".to_string(), name.into());
        }
        if let Some(avatar_url) = request.avatar_url {
            changes.insert("avatarUrl".to_string(), avatar_url.into());
        }
        if let Some(is_active) = request.is_active {
            changes.insert("isActive".to_string(), is_active.into());
        }

        match self.db.update(users::ENTITY, id, changes).await {
            Ok(result) if result.modified_count == 0 => {
                Ok(ServiceResponse::not_found(format!("User {} not found", id)))
            }
            Ok(_) => self.get(id).await,
            Err(e) => recover(e),
        }
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<ServiceResponse<()>> {
        let result = self.db.delete(users::ENTITY, id).await?;
        if result.deleted_count == 0 {
            return Ok(ServiceResponse::not_found(format!("User {} not found", id)));
        }
        info!("Deleted user {}", id);
        Ok(ServiceResponse::done("User deleted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a b@x.com").is_err());
        assert!(normalize_email("a@x").is_err());
    }

    #[test]
    fn test_check_role() {
        assert!(check_role("admin").is_ok());
        assert!(check_role("root").is_err());
    }
}
