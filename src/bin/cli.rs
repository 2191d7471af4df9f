use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gesture_store::config::{self, StorageConfig};
use gesture_store::model::{ExportFormat, ExportOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory. Defaults to $GESTURE_STORE_DATA_DIR, then `data`.
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Collection counts and on-disk usage.
    Stats,
    /// Export gestures to exports/.
    Export {
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
        #[arg(long)]
        include_metadata: bool,
    },
    /// Export all LeRobot data points as one JSON dataset.
    ExportDataset,
    /// Snapshot everything to backups/.
    Backup,
    /// Replace all collections with a backup.
    Restore { path: String },
    ListBackups,
    /// Past exports.
    History,
    ClearCache,
    /// Delete every collection, export and backup.
    ClearAll {
        #[arg(long)]
        yes: bool,
    },
    SecureSet { key: String, value: String },
    SecureGet { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut settings = StorageConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir.into();
    }
    let store = config::open(&settings).with_context(|| format!("opening store in {:?}", settings.data_dir))?;

    match cli.command {
        Commands::Stats => {
            let stats = store.get_storage_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Export { format, include_metadata } => {
            let path = store.export_data(ExportOptions { format, include_metadata }).await?;
            println!("{}", path);
        }
        Commands::ExportDataset => {
            println!("{}", store.export_lerobot_dataset().await?);
        }
        Commands::Backup => {
            println!("{}", store.create_backup().await?);
        }
        Commands::Restore { path } => {
            store.restore_backup(&path).await?;
            let stats = store.get_storage_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::ListBackups => {
            println!("{}", serde_json::to_string_pretty(&store.list_backups().await)?);
        }
        Commands::History => {
            println!("{}", serde_json::to_string_pretty(&store.get_export_history().await)?);
        }
        Commands::ClearCache => {
            store.clear_cache().await?;
            println!("OK");
        }
        Commands::ClearAll { yes } => {
            if !yes {
                bail!("clear-all deletes every recording, export and backup; pass --yes to confirm");
            }
            if !store.clear_all_data().await {
                bail!("failed to clear collections");
            }
            println!("OK");
        }
        Commands::SecureSet { key, value } => {
            if !store.store_secure_data(&key, &value).await {
                bail!("failed to store secret (is {} set?)", config::MASTER_KEY_ENV);
            }
            println!("OK");
        }
        Commands::SecureGet { key } => match store.get_secure_data(&key).await {
            Some(value) => println!("{}", value),
            None => bail!("no secret stored under {}", key),
        },
    }

    Ok(())
}
