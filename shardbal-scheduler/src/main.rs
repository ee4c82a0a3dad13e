//! shardbal Admin Tool
//!
//! Operator access to the recovery records of a stopped balancer scheduler:
//! - `pending` - List commands that will be replayed on the next start
//! - `inspect` - Show the stored command of one record
//! - `forget` - Delete one record so it is never replayed
//! - `count` - Number of surviving records

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shardbal_core::command::{CommandKind, PersistedCommandRecord};
use shardbal_core::types::RequestId;
use shardbal_scheduler::SchedulerConfig;
use shardbal_storage::{AsyncWrapper, CommandStore, CommandStoreSync, SledCommandStore};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardbal-admin")]
#[command(about = "Inspect and repair balancer scheduler recovery records")]
#[command(version)]
struct Cli {
    /// Directory of the scheduler's sled store
    #[arg(long, global = true, env = "SHARDBAL_STORE_PATH")]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List surviving recovery records
    Pending,

    /// Pretty-print the stored command of a record
    Inspect {
        /// Request id of the record
        request_id: String,
    },

    /// Delete a record so it is not replayed
    Forget {
        /// Request id of the record
        request_id: String,
    },

    /// Count surviving recovery records
    Count,
}

fn kind_label(record: &PersistedCommandRecord) -> String {
    match CommandKind::detect(&record.remote_command) {
        Ok(kind) => kind.to_string(),
        Err(_) => "unknown".to_string(),
    }
}

fn parse_request_id(raw: &str) -> Result<RequestId> {
    raw.parse()
        .with_context(|| format!("'{}' is not a valid request id", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let store_path = match cli.store_path {
        Some(path) => path,
        None => SchedulerConfig::from_env()?.store_path,
    };
    if !store_path.exists() {
        bail!("No scheduler store at {}", store_path.display());
    }

    let store = AsyncWrapper::new(
        SledCommandStore::open(&store_path)
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );
    info!(path = %store_path.display(), "Opened scheduler store");

    match cli.command {
        Commands::Pending => {
            let records = store.scan_all().await?;
            if records.is_empty() {
                println!("No pending balancer commands");
            }
            for record in &records {
                println!(
                    "{}  {:<12} {:<30} -> {}{}",
                    record.request_id,
                    kind_label(record),
                    record.nss,
                    record.target,
                    if record.requires_distributed_lock {
                        "  (dist lock)"
                    } else {
                        ""
                    }
                );
            }
        }

        Commands::Inspect { request_id } => {
            let request_id = parse_request_id(&request_id)?;
            let Some(record) = store.inner().get(request_id)? else {
                bail!("No record for request {}", request_id);
            };

            println!("Request:   {}", record.request_id);
            println!("Kind:      {}", kind_label(&record));
            println!("Namespace: {}", record.nss);
            println!("Target:    {}", record.target);
            println!("Dist lock: {}", record.requires_distributed_lock);

            match serde_json::from_slice::<serde_json::Value>(&record.remote_command) {
                Ok(command) => println!("{}", serde_json::to_string_pretty(&command)?),
                Err(e) => {
                    warn!(error = %e, "Stored command is not valid JSON");
                    println!("{:?}", record.remote_command);
                }
            }
        }

        Commands::Forget { request_id } => {
            let request_id = parse_request_id(&request_id)?;
            if !store.delete(request_id).await? {
                bail!("No record for request {}", request_id);
            }
            store.flush().await?;
            println!("Forgot request {}", request_id);
        }

        Commands::Count => {
            println!("{}", store.count().await?);
        }
    }

    Ok(())
}
