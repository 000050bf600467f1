//! HTTP surface of Convo.
//!
//! Every entity service is exposed as JSON routes; failures are returned as
//! RFC 7807 problem details. Requests acting on a user's own data identify
//! the caller through the `x-user-id` header.

pub mod extract;
pub mod handlers;
pub mod response;

pub use extract::{CallerId, USER_ID_HEADER};

use axum::Router;
use convo_services::AppContext;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Complete application router, ready to serve
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .nest("/api", handlers::configure_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
