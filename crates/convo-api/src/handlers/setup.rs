use crate::response::{ok, ApiResult};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use convo_db::BackendConfig;
use convo_services::AppContext;
use std::sync::Arc;

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/setup/status", get(setup_status))
        .route("/setup/test", post(test_backend))
        .route("/setup/apply", post(apply_backend))
}

async fn setup_status(State(ctx): State<Arc<AppContext>>) -> ApiResult {
    ok(ctx.setup.status().await)
}

async fn test_backend(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<BackendConfig>,
) -> ApiResult {
    ok(ctx.setup.test(&config).await)
}

async fn apply_backend(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<BackendConfig>,
) -> ApiResult {
    ok(ctx.setup.apply(config).await)
}
