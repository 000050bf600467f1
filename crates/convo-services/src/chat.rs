use crate::response::{model, models, paging, recover, Page, ServiceResponse};
use convo_core::ServiceResult;
use convo_db::{
    record, QuerySpec, Record, SortDirection, UniversalDatabaseService, CREATED_AT, UPDATED_AT,
};
use convo_entities::chat_messages::{self, Model as ChatMessage};
use convo_entities::chat_sessions::{self, Model as ChatSession};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: Option<String>,
    pub workspace_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub is_archived: Option<bool>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    pub role: String,
    pub content: String,
    pub model: Option<String>,
    pub tokens: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Clone)]
pub struct ChatService {
    db: Arc<UniversalDatabaseService>,
}

impl ChatService {
    pub fn new(db: Arc<UniversalDatabaseService>) -> Self {
        Self { db }
    }

    fn missing<T>(id: &str) -> ServiceResponse<T> {
        ServiceResponse::not_found(format!("Chat session {} not found", id))
    }

    async fn owned(&self, user_id: &str, id: &str) -> ServiceResult<Option<ChatSession>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("userId", user_id);
        match self.db.find_one(chat_sessions::ENTITY, query).await? {
            Some(record) => Ok(Some(model(&record)?)),
            None => Ok(None),
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        request: CreateSessionRequest,
    ) -> ServiceResult<ServiceResponse<ChatSession>> {
        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let record = record! {
            "userId" => user_id,
            "workspaceId" => request.workspace_id,
            "title" => title,
            "provider" => request.provider,
            "model" => request.model,
            "systemPrompt" => request.system_prompt
        };
        let id = match self.db.insert(chat_sessions::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };
        info!("Created chat session {} for {}", id, user_id);

        self.get_session(user_id, &id).await
    }

    pub async fn get_session(
        &self,
        user_id: &str,
        id: &str,
    ) -> ServiceResult<ServiceResponse<ChatSession>> {
        Ok(match self.owned(user_id, id).await? {
            Some(session) => ServiceResponse::ok(session),
            None => Self::missing(id),
        })
    }

    /// Most recently active first
    pub async fn list_sessions(
        &self,
        user_id: &str,
        params: ListSessionsQuery,
    ) -> ServiceResult<ServiceResponse<Page<ChatSession>>> {
        let (limit, offset) = paging(params.limit, params.offset);
        let mut query = QuerySpec::new().where_eq("userId", user_id);
        if let Some(workspace_id) = params.workspace_id {
            query = query.where_eq("workspaceId", workspace_id);
        }
        if !params.include_archived {
            query = query.where_eq("isArchived", false);
        }
        let query = query
            .order_by(UPDATED_AT, SortDirection::Desc)
            .limit(limit)
            .offset(offset);

        let result = self.db.find_many(chat_sessions::ENTITY, query).await?;
        Ok(ServiceResponse::ok(Page {
            items: models(&result.data)?,
            total: result.total,
            limit,
            offset,
        }))
    }

    /// Rename, archive or switch model
    pub async fn update_session(
        &self,
        user_id: &str,
        id: &str,
        request: UpdateSessionRequest,
    ) -> ServiceResult<ServiceResponse<ChatSession>> {
        if self.owned(user_id, id).await?.is_none() {
            return Ok(Self::missing(id));
        }

        let mut changes = Record::new();
        if let Some(title) = request.title {
            let title = title.trim();
            if title.is_empty() {
                return Ok(ServiceResponse::invalid("session title cannot be empty"));
            }
            changes.insert("title".to_string(), title.into());
        }
        if let Some(is_archived) = request.is_archived {
            changes.insert("isArchived".to_string(), is_archived.into());
        }
        if let Some(provider) = request.provider {
            changes.insert("provider".to_string(), provider.into());
        }
        if let Some(model) = request.model {
            changes.insert("model".to_string(), model.into());
        }
        if let Some(system_prompt) = request.system_prompt {
            changes.insert("systemPrompt".to_string(), system_prompt.into());
        }

        match self.db.update(chat_sessions::ENTITY, id, changes).await {
            Ok(result) if result.modified_count == 0 => Ok(Self::missing(id)),
            Ok(_) => self.get_session(user_id, id).await,
            Err(e) => recover(e),
        }
    }

    /// Removes the session and its messages.
    ///
    /// Messages go first and the session second, as two independent calls: a
    /// failure in between leaves an empty session behind.
    pub async fn delete_session(
        &self,
        user_id: &str,
        id: &str,
    ) -> ServiceResult<ServiceResponse<()>> {
        if self.owned(user_id, id).await?.is_none() {
            return Ok(Self::missing(id));
        }

        let messages = self
            .db
            .delete_many(
                chat_messages::ENTITY,
                QuerySpec::new().where_eq("sessionId", id),
            )
            .await?;
        let result = self.db.delete(chat_sessions::ENTITY, id).await?;
        if result.deleted_count == 0 {
            return Ok(Self::missing(id));
        }

        info!(
            "Deleted chat session {} with {} messages",
            id, messages.deleted_count
        );
        Ok(ServiceResponse::done("Chat session deleted"))
    }

    /// Append a message and bump the session's `updatedAt`
    pub async fn add_message(
        &self,
        user_id: &str,
        session_id: &str,
        request: AddMessageRequest,
    ) -> ServiceResult<ServiceResponse<ChatMessage>> {
        if !chat_messages::ROLES.contains(&request.role.as_str()) {
            return Ok(ServiceResponse::invalid(format!(
                "message role must be one of {}",
                chat_messages::ROLES.join(", ")
            )));
        }
        if request.content.trim().is_empty() {
            return Ok(ServiceResponse::invalid("message content is required"));
        }
        if self.owned(user_id, session_id).await?.is_none() {
            return Ok(Self::missing(session_id));
        }

        let mut record = record! {
            "sessionId" => session_id,
            "role" => request.role,
            "content" => request.content,
            "model" => request.model,
            "tokens" => request.tokens
        };
        if let Some(metadata) = request.metadata {
            record.insert("metadata".to_string(), metadata.into());
        }

        let id = match self.db.insert(chat_messages::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };

        // Empty partial: only updatedAt is restamped
        if let Err(e) = self
            .db
            .update(chat_sessions::ENTITY, session_id, Record::new())
            .await
        {
            warn!("Failed to touch chat session {}: {}", session_id, e);
        }

        match self.db.find_by_id(chat_messages::ENTITY, &id).await? {
            Some(record) => Ok(ServiceResponse::ok(model(&record)?)),
            None => Ok(ServiceResponse::not_found(format!("Message {} not found", id))),
        }
    }

    /// Oldest first
    pub async fn list_messages(
        &self,
        user_id: &str,
        session_id: &str,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> ServiceResult<ServiceResponse<Page<ChatMessage>>> {
        if self.owned(user_id, session_id).await?.is_none() {
            return Ok(Self::missing(session_id));
        }

        let (limit, offset) = paging(limit, offset);
        let query = QuerySpec::new()
            .where_eq("sessionId", session_id)
            .order_by(CREATED_AT, SortDirection::Asc)
            .limit(limit)
            .offset(offset);

        let result = self.db.find_many(chat_messages::ENTITY, query).await?;
        Ok(ServiceResponse::ok(Page {
            limit,
            offset,
            total: result.total,
            items: models::<ChatMessage>(&result.data)?,
        }))
    }
}
