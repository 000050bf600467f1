use crate::extract::CallerId;
use crate::response::{ok, ApiResult};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use convo_services::AppContext;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: Value,
}

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new().route("/settings", get(list_settings)).route(
        "/settings/{key}",
        get(get_setting).put(set_setting).delete(delete_setting),
    )
}

async fn list_settings(caller: CallerId, State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.settings.list(caller.as_str()).await)
}

async fn get_setting(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(key): Path<String>,
) -> ApiResult {
    ok(ctx.settings.get(caller.as_str(), &key).await)
}

async fn set_setting(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(key): Path<String>,
    Json(request): Json<SetSettingRequest>,
) -> ApiResult {
    ok(ctx.settings.set(caller.as_str(), &key, request.value).await)
}

async fn delete_setting(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(key): Path<String>,
) -> ApiResult {
    ok(ctx.settings.delete(caller.as_str(), &key).await)
}
