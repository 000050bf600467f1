use super::database::DatabaseArgs;
use clap::Args;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:4000", env = "CONVO_ADDRESS")]
    pub address: String,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let ctx = self.database.context().await?;

        // Tables are also created lazily on first use, so an unreachable
        // backend here only delays startup work until setup is applied
        if let Err(e) = ctx.db.ensure_all().await {
            warn!("Could not prepare schemas at startup: {}", e);
        }

        let app = convo_api::router(ctx);
        let listener = TcpListener::bind(&self.address).await?;
        info!("Convo API listening on {}", self.address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Convo API server exited");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
