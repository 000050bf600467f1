use super::database::DatabaseArgs;
use anyhow::anyhow;
use clap::Args;
use colored::Colorize;
use tracing::debug;

/// Non-interactive setup: describe the backend with `--db-*` flags (or the
/// matching `CONVO_DB_*` variables)
#[derive(Args)]
pub struct SetupCommand {
    /// Only test the connection, do not switch or persist
    #[arg(long)]
    pub test_only: bool,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl SetupCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let candidate = self
            .database
            .flag_config()?
            .ok_or_else(|| anyhow!("--db-type (or CONVO_DB_TYPE) is required for setup"))?;
        debug!("Setup candidate: {}", candidate.connection_string());

        let ctx = self.database.context().await?;
        let target = candidate.connection_string();

        if self.test_only {
            let tested = ctx.setup.test(&candidate).await?;
            return report(tested.success, tested.message, &target);
        }

        let applied = ctx.setup.switch(candidate).await?;
        report(applied.success, applied.message.clone(), &target)?;
        if let Some(status) = applied.data {
            println!(
                "  Saved to {} ({} backend, connected: {})",
                self.database.config_store().path().display(),
                status.backend,
                status.connected
            );
        }
        Ok(())
    }
}

fn report(success: bool, message: Option<String>, target: &str) -> anyhow::Result<()> {
    let message = message.unwrap_or_else(|| "Backend configured".to_string());
    if success {
        println!("{} {}", "✓".bright_green(), message);
        println!("  {}", target.bright_white());
        Ok(())
    } else {
        eprintln!("{} {}", "✗".bright_red(), message);
        Err(anyhow!("setup failed for {}", target))
    }
}
