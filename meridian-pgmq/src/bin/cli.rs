//! Small operator CLI for inspecting and draining queues by hand.

use clap::{Parser, Subcommand};
use meridian_pgmq::PgmqClient;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "meridian-pgmq-cli", about = "Inspect and manage durable queues")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a queue if it doesn't already exist.
    Create { queue: String },
    /// Report queue depth and age metrics.
    Metrics { queue: String },
    /// Drain up to `limit` messages without acknowledging them.
    Peek {
        queue: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Permanently delete a message by id.
    Delete { queue: String, msg_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database_url)
        .await?;
    let client = PgmqClient::new_with_pool(pool).await;

    match cli.command {
        Command::Create { queue } => {
            client.create_queue(&queue).await?;
            println!("created queue {queue}");
        }
        Command::Metrics { queue } => {
            let metrics = client.queue_metrics(&queue).await?;
            println!("{metrics:?}");
        }
        Command::Peek { queue, limit } => {
            let messages = client.read_messages(&queue, Some(0), Some(limit)).await?;
            for message in messages {
                println!("{} {}", message.msg_id, message.message);
            }
        }
        Command::Delete { queue, msg_id } => {
            client.delete_message(&queue, msg_id).await?;
            println!("deleted {msg_id} from {queue}");
        }
    }
    Ok(())
}
