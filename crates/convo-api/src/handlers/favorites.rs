use crate::extract::CallerId;
use crate::response::{created, ok, ApiResult};
use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use convo_services::{AddFavoriteRequest, AppContext};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<String>,
}

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/order", put(reorder_favorites))
        .route("/favorites/{id}", delete(remove_favorite))
}

async fn add_favorite(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<AddFavoriteRequest>,
) -> ApiResult {
    created(ctx.favorites.add(caller.as_str(), request).await)
}

async fn list_favorites(caller: CallerId, State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.favorites.list(caller.as_str()).await)
}

async fn reorder_favorites(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult {
    ok(ctx.favorites.reorder(caller.as_str(), &request.ids).await)
}

async fn remove_favorite(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.favorites.remove(caller.as_str(), &id).await)
}
