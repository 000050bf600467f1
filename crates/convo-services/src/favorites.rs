use crate::response::{model, models, recover, ServiceResponse};
use convo_core::ServiceResult;
use convo_db::{record, QuerySpec, SortDirection, UniversalDatabaseService, CREATED_AT};
use convo_entities::favorites::{self, Model as Favorite};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const ITEM_TYPES: [&str; 3] = ["session", "model", "prompt"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFavoriteRequest {
    pub item_type: String,
    pub item_id: String,
    pub label: Option<String>,
}

#[derive(Clone)]
pub struct FavoriteService {
    db: Arc<UniversalDatabaseService>,
}

impl FavoriteService {
    pub fn new(db: Arc<UniversalDatabaseService>) -> Self {
        Self { db }
    }

    pub async fn add(
        &self,
        user_id: &str,
        request: AddFavoriteRequest,
    ) -> ServiceResult<ServiceResponse<Favorite>> {
        if !ITEM_TYPES.contains(&request.item_type.as_str()) {
            return Ok(ServiceResponse::invalid(format!(
                "item type must be one of {}",
                ITEM_TYPES.join(", ")
            )));
        }
        let item_id = request.item_id.trim();
        if item_id.is_empty() {
            return Ok(ServiceResponse::invalid("item id is required"));
        }

        let duplicate = QuerySpec::new()
            .where_eq("userId", user_id)
            .where_eq("itemType", request.item_type.as_str())
            .where_eq("itemId", item_id);
        if self.db.exists(favorites::ENTITY, duplicate).await? {
            return Ok(ServiceResponse::conflict(format!(
                "{} {} is already a favorite",
                request.item_type, item_id
            )));
        }

        // New favorites go to the end of the list
        let position = self
            .db
            .count(favorites::ENTITY, QuerySpec::new().where_eq("userId", user_id))
            .await?;

        let record = record! {
            "userId" => user_id,
            "itemType" => request.item_type.as_str(),
            "itemId" => item_id,
            "label" => request.label,
            "sortOrder" => position as i64
        };
        let id = match self.db.insert(favorites::ENTITY, record).await {
            Ok(result) => result.id.unwrap_or_default(),
            Err(e) => return recover(e),
        };
        info!("Added favorite {} ({} {}) for {}", id, request.item_type, item_id, user_id);

        match self.db.find_by_id(favorites::ENTITY, &id).await? {
            Some(record) => Ok(ServiceResponse::ok(model(&record)?)),
            None => Ok(ServiceResponse::not_found(format!("Favorite {} not found", id))),
        }
    }

    pub async fn remove(&self, user_id: &str, id: &str) -> ServiceResult<ServiceResponse<()>> {
        let query = QuerySpec::new()
            .where_eq("id", id)
            .where_eq("userId", user_id);
        let result = self.db.delete_many(favorites::ENTITY, query).await?;
        if result.deleted_count == 0 {
            return Ok(ServiceResponse::not_found(format!("Favorite {} not found", id)));
        }
        Ok(ServiceResponse::done("Favorite removed"))
    }

    /// In the user's chosen order, ties broken by age
    pub async fn list(&self, user_id: &str) -> ServiceResult<ServiceResponse<Vec<Favorite>>> {
        let query = QuerySpec::new()
            .where_eq("userId", user_id)
            .order_by("sortOrder", SortDirection::Asc)
            .order_by(CREATED_AT, SortDirection::Asc);
        let result = self.db.find_many(favorites::ENTITY, query).await?;
        Ok(ServiceResponse::ok(models(&result.data)?))
    }

    /// Assign `sortOrder` by position in `ids`.
    ///
    /// One update per favorite, issued in sequence: a failure part way
    /// through leaves the earlier positions written. Ids that are not the
    /// user's favorites are skipped.
    pub async fn reorder(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> ServiceResult<ServiceResponse<Vec<Favorite>>> {
        for (position, id) in ids.iter().enumerate() {
            let result = self
                .db
                .update_many(
                    favorites::ENTITY,
                    record! { "sortOrder" => position as i64 },
                    QuerySpec::new()
                        .where_eq("id", id.as_str())
                        .where_eq("userId", user_id),
                )
                .await?;
            if result.modified_count == 0 {
                debug!("Skipped favorite {} while reordering for {}", id, user_id);
            }
        }
        self.list(user_id).await
    }
}
