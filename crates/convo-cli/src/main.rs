//! Convo CLI - runs the API server and manages the database backend

mod commands;

use clap::{Parser, Subcommand};
use commands::{EnsureSchemasCommand, ServeCommand, SetupCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CONVO_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "CONVO_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Test, apply and persist a database backend configuration
    Setup(SetupCommand),
    /// Create every entity table/collection on the configured backend
    EnsureSchemas(EnsureSchemasCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.clone();

    // RUST_LOG wins when set; otherwise every convo crate at the requested
    // level and noisy dependencies at warn
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "convo={level},\
             convo_cli={level},\
             convo_api={level},\
             convo_core={level},\
             convo_services={level},\
             convo_entities={level},\
             convo_db={level},\
             convo_db_postgres={level},\
             convo_db_mysql={level},\
             convo_db_sqlite={level},\
             convo_db_mongodb={level},\
             convo_db_supabase={level},\
             tower_http={level},\
             sqlx=warn,\
             tokio_postgres=warn,\
             mongodb=warn,\
             h2=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Setup(setup_cmd) => setup_cmd.execute(),
        Commands::EnsureSchemas(ensure_cmd) => ensure_cmd.execute(),
    }
}
