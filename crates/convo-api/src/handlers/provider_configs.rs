use crate::extract::CallerId;
use crate::response::{created, ok, ApiResult};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use convo_services::{AppContext, CreateProviderConfigRequest, UpdateProviderConfigRequest};
use std::sync::Arc;

/// Responses only ever carry masked keys
pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/providers", get(list_providers).post(create_provider))
        .route("/providers/default", get(get_default_provider))
        .route(
            "/providers/{id}",
            get(get_provider)
                .patch(update_provider)
                .delete(delete_provider),
        )
        .route("/providers/{id}/default", post(set_default_provider))
}

async fn create_provider(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<CreateProviderConfigRequest>,
) -> ApiResult {
    created(ctx.provider_configs.create(caller.as_str(), request).await)
}

async fn list_providers(caller: CallerId, State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.provider_configs.list(caller.as_str()).await)
}

async fn get_default_provider(caller: CallerId, State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.provider_configs.get_default(caller.as_str()).await)
}

async fn get_provider(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.provider_configs.get(caller.as_str(), &id).await)
}

async fn update_provider(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProviderConfigRequest>,
) -> ApiResult {
    ok(ctx
        .provider_configs
        .update(caller.as_str(), &id, request)
        .await)
}

async fn delete_provider(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.provider_configs.delete(caller.as_str(), &id).await)
}

async fn set_default_provider(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.provider_configs.set_default(caller.as_str(), &id).await)
}
