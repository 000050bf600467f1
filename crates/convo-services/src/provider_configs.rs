use crate::response::{model, models, recover, ServiceResponse};
use convo_core::{EncryptionService, ServiceResult};
use convo_db::{record, QuerySpec, Record, SortDirection, UniversalDatabaseService, CREATED_AT};
use convo_entities::provider_configs::{self, Model as ProviderConfig};
use convo_entities::DBDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// LLM providers a user can store credentials for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Replicate,
    Xai,
}

static OPENAI_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").expect("valid pattern"));
static ANTHROPIC_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk-ant-[A-Za-z0-9_-]{20,}$").expect("valid pattern"));
static GOOGLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^AIza[0-9A-Za-z_-]{35}$").expect("valid pattern"));
static REPLICATE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r8_[A-Za-z0-9]{20,}$").expect("valid pattern"));
static XAI_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^xai-[A-Za-z0-9]{20,}$").expect("valid pattern"));

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Replicate,
        Provider::Xai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Replicate => "replicate",
            Provider::Xai => "xai",
        }
    }

    fn key_pattern(&self) -> &'static Regex {
        match self {
            Provider::OpenAi => &OPENAI_KEY,
            Provider::Anthropic => &ANTHROPIC_KEY,
            Provider::Google => &GOOGLE_KEY,
            Provider::Replicate => &REPLICATE_KEY,
            Provider::Xai => &XAI_KEY,
        }
    }

    pub fn accepts_key(&self, key: &str) -> bool {
        self.key_pattern().is_match(key)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Provider::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown provider '{}', expected one of {}", s, names.join(", "))
            })
    }
}

/// `sk-a...wxyz`; short keys are fully hidden
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(8);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// A provider config as returned to callers: the key is masked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigView {
    pub id: String,
    pub provider: String,
    pub name: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub models: Option<Value>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderConfigRequest {
    pub provider: String,
    pub api_key: String,
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub models: Option<Value>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderConfigRequest {
    pub api_key: Option<String>,
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub models: Option<Value>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct ProviderConfigService {
    db: Arc<UniversalDatabaseService>,
    encryption: Arc<EncryptionService>,
}

impl ProviderConfigService {
    pub fn new(db: Arc<UniversalDatabaseService>, encryption: Arc<EncryptionService>) -> Self {
        Self { db, encryption }
    }

    fn missing<T>(id: &str) -> ServiceResponse<T> {
        ServiceResponse::not_found(format!("Provider config {} not found", id))
    }

    /// Plain key of a stored config. Keys that do not decrypt are returned
    /// as stored, for rows written before encryption was enabled.
    fn reveal(&self, config: &ProviderConfig) -> String {
        match self.encryption.decrypt_string(&config.api_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    "Could not decrypt API key of provider config {}, using stored value: {}",
                    config.id, e
                );
                config.api_key.clone()
            }
        }
    }

    fn view(&self, config: ProviderConfig) -> ProviderConfigView {
        let api_key = mask_api_key(&self.reveal(&config));
        ProviderConfigView {
            id: config.id,
            provider: config.provider,
            name: config.name,
            api_key,
            base_url: config.base_url,
            models: config.models,
            is_default: config.is_default,
            is_active: config.is_active,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }

    async fn owned(&self, user_id: &str, id: &str) -> ServiceResult<Option<ProviderConfig>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("userId", user_id);
        match self.db.find_one(provider_configs::ENTITY, query).await? {
            Some(record) => Ok(Some(model(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn create(
        &self,
        user_id: &str,
        request: CreateProviderConfigRequest,
    ) -> ServiceResult<ServiceResponse<ProviderConfigView>> {
        let provider = match request.provider.parse::<Provider>() {
            Ok(provider) => provider,
            Err(message) => return Ok(ServiceResponse::invalid(message)),
        };
        let api_key = request.api_key.trim();
        if !provider.accepts_key(api_key) {
            return Ok(ServiceResponse::invalid(format!(
                "API key does not look like a {} key",
                provider
            )));
        }

        let encrypted = self.encryption.encrypt_string(api_key)?;
        let mut record = record! {
            "userId" => user_id,
            "provider" => provider.as_str(),
            "apiKey" => encrypted,
            "name" => request.name,
            "baseUrl" => request.base_url
        };
        if let Some(models) = request.models {
            record.insert("models".to_string(), models.into());
        }

        let id = match self.db.insert(provider_configs::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };
        info!("Stored {} provider config {} for {}", provider, id, user_id);

        if request.is_default {
            let response = self.set_default(user_id, &id).await?;
            if !response.success {
                return Ok(response);
            }
        }
        self.get(user_id, &id).await
    }

    pub async fn get(
        &self,
        user_id: &str,
        id: &str,
    ) -> ServiceResult<ServiceResponse<ProviderConfigView>> {
        Ok(match self.owned(user_id, id).await? {
            Some(config) => ServiceResponse::ok(self.view(config)),
            None => Self::missing(id),
        })
    }

    pub async fn list(
        &self,
        user_id: &str,
    ) -> ServiceResult<ServiceResponse<Vec<ProviderConfigView>>> {
        let query = QuerySpec::new()
            .where_eq("userId", user_id)
            .order_by(CREATED_AT, SortDirection::Asc);
        let result = self.db.find_many(provider_configs::ENTITY, query).await?;
        let configs: Vec<ProviderConfig> = models(&result.data)?;
        Ok(ServiceResponse::ok(
            configs.into_iter().map(|c| self.view(c)).collect(),
        ))
    }

    pub async fn get_default(
        &self,
        user_id: &str,
    ) -> ServiceResult<ServiceResponse<ProviderConfigView>> {
        let query = QuerySpec::new()
            .where_eq("userId", user_id)
            .where_eq("isDefault", true);
        match self.db.find_one(provider_configs::ENTITY, query).await? {
            Some(record) => Ok(ServiceResponse::ok(self.view(model(&record)?))),
            None => Ok(ServiceResponse::not_found("No default provider configured")),
        }
    }

    /// Decrypted key for outbound provider calls
    pub async fn api_key(&self, user_id: &str, id: &str) -> ServiceResult<ServiceResponse<String>> {
        Ok(match self.owned(user_id, id).await? {
            Some(config) => ServiceResponse::ok(self.reveal(&config)),
            None => Self::missing(id),
        })
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        request: UpdateProviderConfigRequest,
    ) -> ServiceResult<ServiceResponse<ProviderConfigView>> {
        let Some(existing) = self.owned(user_id, id).await? else {
            return Ok(Self::missing(id));
        };

        let mut changes = Record::new();
        if let Some(api_key) = &request.api_key {
            let api_key = api_key.trim();
            let accepted = existing
                .provider
                .parse::<Provider>()
                .map(|p| p.accepts_key(api_key))
                .unwrap_or(false);
            if !accepted {
                return Ok(ServiceResponse::invalid(format!(
                    "API key does not look like a {} key",
                    existing.provider
                )));
            }
            changes.insert(
                "apiKey".to_string(),
                self.encryption.encrypt_string(api_key)?.into(),
            );
        }
        if let Some(name) = request.name {
            changes.insert("name".to_string(), name.into());
        }
        if let Some(base_url) = request.base_url {
            changes.insert("baseUrl".to_string(), base_url.into());
        }
        if let Some(models) = request.models {
            changes.insert("models".to_string(), models.into());
        }
        if let Some(is_active) = request.is_active {
            changes.insert("isActive".to_string(), is_active.into());
        }

        match self.db.update(provider_configs::ENTITY, id, changes).await {
            Ok(result) if result.modified_count == 0 => Ok(Self::missing(id)),
            Ok(_) => self.get(user_id, id).await,
            Err(e) => recover(e),
        }
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> ServiceResult<ServiceResponse<()>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("userId", user_id);
        let result = self.db.delete_many(provider_configs::ENTITY, query).await?;
        if result.deleted_count == 0 {
            return Ok(Self::missing(id));
        }
        info!("Deleted provider config {}", id);
        Ok(ServiceResponse::done("Provider config deleted"))
    }

    /// Make `id` the user's only default.
    ///
    /// Clearing the old default and setting the new one are two separate
    /// writes; a failure between them leaves the user without a default.
    pub async fn set_default(
        &self,
        user_id: &str,
        id: &str,
    ) -> ServiceResult<ServiceResponse<ProviderConfigView>> {
        if self.owned(user_id, id).await?.is_none() {
            return Ok(Self::missing(id));
        }

        let cleared = self
            .db
            .update_many(
                provider_configs::ENTITY,
                record! { "isDefault" => false },
                QuerySpec::new()
                    .where_eq("userId", user_id)
                    .where_eq("isDefault", true),
            )
            .await?;
        if cleared.modified_count > 0 {
            info!("Cleared {} previous default provider(s) for {}", cleared.modified_count, user_id);
        }

        let result = self
            .db
            .update(provider_configs::ENTITY, id, record! { "isDefault" => true })
            .await?;
        if result.modified_count == 0 {
            return Ok(Self::missing(id));
        }
        self.get(user_id, id).await
    }
}
