use std::path::PathBuf;

use clap::Parser;
use leadflow_store::Database;

#[derive(Parser, Debug)]
#[command(name = "leadflow", about = "Lead retrieval and distribution service")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 9200)]
    port: u16,

    /// SQLite database file. Defaults to ~/.leadflow/leadflow.db
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db_path = args.db_path.unwrap_or_else(|| {
        let dir = dirs_home().join(".leadflow");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::error!(error = %e, "failed to create data directory");
            std::process::exit(1);
        }
        dir.join("leadflow.db")
    });

    let db = match Database::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, path = %db_path.display(), "failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path.display(), "database opened");

    let config = leadflow_server::ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = match leadflow_server::start(config, db).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };
    tracing::info!(port = handle.port, "leadflow ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl+c");
    }
    tracing::info!("shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
