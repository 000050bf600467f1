use crate::extract::CallerId;
use crate::response::{created, ok, ApiResult};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use convo_services::{AppContext, CreateWorkspaceRequest, UpdateWorkspaceRequest};
use std::sync::Arc;

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route(
            "/workspaces/{id}",
            get(get_workspace)
                .patch(update_workspace)
                .delete(delete_workspace),
        )
}

async fn create_workspace(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<CreateWorkspaceRequest>,
) -> ApiResult {
    created(ctx.workspaces.create(caller.as_str(), request).await)
}

async fn list_workspaces(caller: CallerId, State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.workspaces.list_for_owner(caller.as_str()).await)
}

async fn get_workspace(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.workspaces.get(caller.as_str(), &id).await)
}

async fn update_workspace(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateWorkspaceRequest>,
) -> ApiResult {
    ok(ctx.workspaces.update(caller.as_str(), &id, request).await)
}

async fn delete_workspace(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.workspaces.delete(caller.as_str(), &id).await)
}
