use super::Paging;
use crate::extract::CallerId;
use crate::response::{created, ok, ApiResult};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use convo_services::{
    AddMessageRequest, AppContext, CreateSessionRequest, ListSessionsQuery, UpdateSessionRequest,
};
use std::sync::Arc;

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/chat/sessions", get(list_sessions).post(create_session))
        .route(
            "/chat/sessions/{id}",
            get(get_session).patch(update_session).delete(delete_session),
        )
        .route(
            "/chat/sessions/{id}/messages",
            get(list_messages).post(add_message),
        )
}

async fn create_session(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult {
    created(ctx.chat.create_session(caller.as_str(), request).await)
}

async fn list_sessions(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ListSessionsQuery>,
) -> ApiResult {
    ok(ctx.chat.list_sessions(caller.as_str(), params).await)
}

async fn get_session(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.chat.get_session(caller.as_str(), &id).await)
}

async fn update_session(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult {
    ok(ctx.chat.update_session(caller.as_str(), &id, request).await)
}

async fn delete_session(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> ApiResult {
    ok(ctx.chat.delete_session(caller.as_str(), &id).await)
}

async fn add_message(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(request): Json<AddMessageRequest>,
) -> ApiResult {
    created(ctx.chat.add_message(caller.as_str(), &id, request).await)
}

async fn list_messages(
    caller: CallerId,
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Query(paging): Query<Paging>,
) -> ApiResult {
    ok(ctx
        .chat
        .list_messages(caller.as_str(), &id, paging.limit, paging.offset)
        .await)
}
