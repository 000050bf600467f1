mod chat;
mod favorites;
mod provider_configs;
mod settings;
mod setup;
mod users;
mod workspaces;

use axum::Router;
use convo_services::AppContext;
use serde::Deserialize;
use std::sync::Arc;

/// `?limit=&offset=`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Paging {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn configure_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .merge(users::configure_routes())
        .merge(workspaces::configure_routes())
        .merge(chat::configure_routes())
        .merge(provider_configs::configure_routes())
        .merge(favorites::configure_routes())
        .merge(settings::configure_routes())
        .merge(setup::configure_routes())
}
