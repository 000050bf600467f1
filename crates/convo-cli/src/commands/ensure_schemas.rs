use super::database::DatabaseArgs;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct EnsureSchemasCommand {
    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl EnsureSchemasCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let ctx = self.database.context().await?;
        let kind = ctx.db.backend_kind().await;

        ctx.db.ensure_all().await?;

        let schemas = ctx.db.registry().list().await;
        println!(
            "{} {} schemas ready on {}",
            "✓".bright_green(),
            schemas.len(),
            kind.to_string().bright_white().bold()
        );
        for schema in schemas {
            println!("  • {}", schema.storage_name(kind));
        }
        Ok(())
    }
}
