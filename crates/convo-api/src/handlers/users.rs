use super::Paging;
use crate::response::{created, ok, ApiResult};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use convo_services::{AppContext, CreateUserRequest, UpdateUserRequest};
use std::sync::Arc;

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/by-email/{email}", get(get_user_by_email))
        .route(
            "/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

async fn create_user(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult {
    created(ctx.users.create(request).await)
}

async fn list_users(State(ctx): State<Arc<AppContext>>, Query(paging): Query<Paging>) -> ApiResult {
    ok(ctx.users.list(paging.limit, paging.offset).await)
}

async fn get_user(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult {
    ok(ctx.users.get(&id).await)
}

async fn get_user_by_email(
    State(ctx): State<Arc<AppContext>>,
    Path(email): Path<String>,
) -> ApiResult {
    ok(ctx.users.get_by_email(&email).await)
}

async fn update_user(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult {
    ok(ctx.users.update(&id, request).await)
}

async fn delete_user(State(ctx): State<Arc<AppContext>>, Path(id): Path<String>) -> ApiResult {
    ok(ctx.users.delete(&id).await)
}
