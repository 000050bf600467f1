use crate::response::{model, models, recover, ServiceResponse};
use convo_core::ServiceResult;
use convo_db::{record, QuerySpec, UniversalDatabaseService};
use convo_entities::settings::{self, Model as Setting};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const MAX_KEY_LENGTH: usize = 100;

fn check_key(key: &str) -> Result<&str, String> {
    let key = key.trim();
    if key.is_empty() {
        return Err("setting key is required".to_string());
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(format!(
            "setting key must be at most {} characters",
            MAX_KEY_LENGTH
        ));
    }
    Ok(key)
}

/// Per-user key/value preferences
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<UniversalDatabaseService>,
}

impl SettingsService {
    pub fn new(db: Arc<UniversalDatabaseService>) -> Self {
        Self { db }
    }

    fn query(user_id: &str, key: &str) -> QuerySpec {
        QuerySpec::new()
            .where_eq("userId", user_id)
            .where_eq("key", key)
    }

    async fn find(&self, user_id: &str, key: &str) -> ServiceResult<Option<Setting>> {
        match self.db.find_one(settings::ENTITY, Self::query(user_id, key)).await? {
            Some(record) => Ok(Some(model(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, user_id: &str, key: &str) -> ServiceResult<ServiceResponse<Value>> {
        Ok(match self.find(user_id, key).await? {
            Some(setting) => ServiceResponse::ok(setting.value.unwrap_or(Value::Null)),
            None => ServiceResponse::not_found(format!("Setting {} not found", key)),
        })
    }

    /// Insert or overwrite.
    ///
    /// Probe and write are separate calls, so two concurrent first writes
    /// of the same key can both insert.
    pub async fn set(
        &self,
        user_id: &str,
        key: &str,
        value: Value,
    ) -> ServiceResult<ServiceResponse<Setting>> {
        let key = match check_key(key) {
            Ok(key) => key,
            Err(message) => return Ok(ServiceResponse::invalid(message)),
        };

        let write = match self.find(user_id, key).await? {
            Some(existing) => {
                debug!("Updating setting {} for {}", key, user_id);
                self.db
                    .update(settings::ENTITY, &existing.id, record! { "value" => value })
                    .await
                    .map(|_| ())
            }
            None => {
                debug!("Creating setting {} for {}", key, user_id);
                let record = record! {
                    "userId" => user_id,
                    "key" => key,
                    "value" => value
                };
                self.db.insert(settings::ENTITY, record).await.map(|_| ())
            }
        };
        if let Err(e) = write {
            return recover(e);
        }

        Ok(match self.find(user_id, key).await? {
            Some(setting) => ServiceResponse::ok(setting),
            None => ServiceResponse::not_found(format!("Setting {} not found", key)),
        })
    }

    pub async fn list(
        &self,
        user_id: &str,
    ) -> ServiceResult<ServiceResponse<BTreeMap<String, Value>>> {
        let result = self
            .db
            .find_many(settings::ENTITY, QuerySpec::new().where_eq("userId", user_id))
            .await?;
        let settings: Vec<Setting> = models(&result.data)?;
        Ok(ServiceResponse::ok(
            settings
                .into_iter()
                .map(|s| (s.key, s.value.unwrap_or(Value::Null)))
                .collect(),
        ))
    }

    pub async fn delete(&self, user_id: &str, key: &str) -> ServiceResult<ServiceResponse<()>> {
        let result = self
            .db
            .delete_many(settings::ENTITY, Self::query(user_id, key))
            .await?;
        if result.deleted_count == 0 {
            return Ok(ServiceResponse::not_found(format!("Setting {} not found", key)));
        }
        Ok(ServiceResponse::done("Setting deleted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert_eq!(check_key(" theme ").unwrap(), "theme");
        assert!(check_key("").is_err());
        assert!(check_key(&"k".repeat(101)).is_err());
    }
}
