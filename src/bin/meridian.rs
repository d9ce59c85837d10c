//! Operator CLI: database migrations and build info. The orchestrator and
//! worker processes are started via their own binaries
//! (`meridian-orchestrator-server`, `meridian-worker`), not through this one.

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[derive(Parser)]
#[command(name = "meridian", about = "Operator CLI for the meridian commerce analytics fabric")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Print build and version information.
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Migrate { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .connect(&database_url)
                .await
                .map_err(|e| format!("failed to connect to database: {e}"))?;
            sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| format!("migration failed: {e}"))?;
            info!("migrations applied");
        }
        Command::Version => {
            println!("meridian {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
