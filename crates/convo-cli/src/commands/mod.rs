pub mod database;
pub mod ensure_schemas;
pub mod serve;
pub mod setup;

pub use ensure_schemas::EnsureSchemasCommand;
pub use serve::ServeCommand;
pub use setup::SetupCommand;
