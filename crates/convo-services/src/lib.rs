//! Entity services for Convo.
//!
//! Each service wraps the [`UniversalDatabaseService`](convo_db::UniversalDatabaseService)
//! with input validation and response shaping. Expected failures come back
//! as unsuccessful [`ServiceResponse`]s; `Err` means something went wrong
//! underneath.

pub mod chat;
pub mod context;
pub mod favorites;
pub mod provider_configs;
pub mod response;
pub mod settings;
pub mod setup;
pub mod users;
pub mod workspaces;

pub use chat::{
    AddMessageRequest, ChatService, CreateSessionRequest, ListSessionsQuery, UpdateSessionRequest,
};
pub use context::AppContext;
pub use favorites::{AddFavoriteRequest, FavoriteService};
pub use provider_configs::{
    CreateProviderConfigRequest, Provider, ProviderConfigService, ProviderConfigView,
    UpdateProviderConfigRequest,
};
pub use response::{Failure, Page, ServiceResponse};
pub use settings::SettingsService;
pub use setup::{ConfigStore, FileConfigStore, SetupService, SetupStatus};
pub use users::{CreateUserRequest, UpdateUserRequest, UserService};
pub use workspaces::{CreateWorkspaceRequest, UpdateWorkspaceRequest, WorkspaceService};
