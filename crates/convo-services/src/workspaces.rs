use crate::response::{model, models, recover, ServiceResponse};
use convo_core::ServiceResult;
use convo_db::{record, QuerySpec, Record, SortDirection, UniversalDatabaseService, CREATED_AT};
use convo_entities::workspaces::{self, Model as Workspace};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub settings: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub settings: Option<Value>,
}

fn check_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("workspace name is required".to_string());
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "workspace name must be at most {} characters",
            MAX_NAME_LENGTH
        ));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct WorkspaceService {
    db: Arc<UniversalDatabaseService>,
}

impl WorkspaceService {
    pub fn new(db: Arc<UniversalDatabaseService>) -> Self {
        Self { db }
    }

    /// The workspace when it exists and belongs to `owner_id`
    async fn owned(&self, owner_id: &str, id: &str) -> ServiceResult<Option<Workspace>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("ownerId", owner_id);
        match self.db.find_one(workspaces::ENTITY, query).await? {
            Some(record) => Ok(Some(model(&record)?)),
            None => Ok(None),
        }
    }

    fn missing<T>(id: &str) -> ServiceResponse<T> {
        ServiceResponse::not_found(format!("Workspace {} not found", id))
    }

    pub async fn create(
        &self,
        owner_id: &str,
        request: CreateWorkspaceRequest,
    ) -> ServiceResult<ServiceResponse<Workspace>> {
        let name = match check_name(&request.name) {
            Ok(name) => name,
            Err(message) => return Ok(ServiceResponse::invalid(message)),
        };

        let mut record = record! {
            "ownerId" => owner_id,
            "name" => name,
            "description" => request.description,
            "isDefault" => request.is_default
        };
        if let Some(settings) = request.settings {
            record.insert("settings".to_string(), settings.into());
        }

        let id = match self.db.insert(workspaces::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };
        info!("Created workspace {} for {}", id, owner_id);

        self.get(owner_id, &id).await
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> ServiceResult<ServiceResponse<Workspace>> {
        Ok(match self.owned(owner_id, id).await? {
            Some(workspace) => ServiceResponse::ok(workspace),
            None => Self::missing(id),
        })
    }

    /// Oldest first
    pub async fn list_for_owner(
        &self,
        owner_id: &str,
    ) -> ServiceResult<ServiceResponse<Vec<Workspace>>> {
        let query = QuerySpec::new()
            .where_eq("ownerId", owner_id)
            .order_by(CREATED_AT, SortDirection::Asc);
        let result = self.db.find_many(workspaces::ENTITY, query).await?;
        Ok(ServiceResponse::ok(models(&result.data)?))
    }

    pub async fn update(
        &self,
        owner_id: &str,
        id: &str,
        request: UpdateWorkspaceRequest,
    ) -> ServiceResult<ServiceResponse<Workspace>> {
        if self.owned(owner_id, id).await?.is_none() {
            return Ok(Self::missing(id));
        }

        let mut changes = Record::new();
        if let Some(name) = &request.name {
            match check_name(name) {
                Ok(name) => {
                    changes.insert("name".to_string(), name.into());
                }
                Err(message) => return Ok(ServiceResponse::invalid(message)),
            }
        }
        if let Some(description) = request.description {
            changes.insert("description".to_string(), description.into());
        }
        if let Some(is_default) = request.is_default {
            changes.insert("isDefault".to_string(), is_default.into());
        }
        if let Some(settings) = request.settings {
            changes.insert("settings".to_string(), settings.into());
        }

        match self.db.update(workspaces::ENTITY, id, changes).await {
            Ok(result) if result.modified_count == 0 => Ok(Self::missing(id)),
            Ok(_) => self.get(owner_id, id).await,
            Err(e) => recover(e),
        }
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> ServiceResult<ServiceResponse<()>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("ownerId", owner_id);
        let result = self.db.delete_many(workspaces::ENTITY, query).await?;
        if result.deleted_count == 0 {
            return Ok(Self::missing(id));
        }
        info!("Deleted workspace {}", id);
        Ok(ServiceResponse::done("Workspace deleted"))
    }
}
