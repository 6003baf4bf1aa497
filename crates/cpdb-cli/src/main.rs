mod db;
mod process;
mod profiles;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cpdb_core::{ProfileStatus, ReviewStatus};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "cpdb-cli")]
#[command(about = "Candidate profile pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Import and browse candidate profiles
    Profiles {
        #[command(subcommand)]
        command: ProfilesCommands,
    },
    /// Advance one profile through the pipeline
    Process {
        id: Uuid,
        /// Reprocess a profile that is already completed or failed
        #[arg(long)]
        force: bool,
    },
    /// Advance many profiles concurrently
    Batch {
        /// Profile ids to process
        #[arg(long, num_args = 1.., conflicts_with = "pending")]
        ids: Vec<Uuid>,
        /// Process every profile that has not reached a terminal status
        #[arg(long)]
        pending: bool,
        /// Maximum profiles in flight (defaults to `CPDB_MAX_CONCURRENT_PROFILES`)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Stop starting new stage attempts after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Reprocess profiles that are already completed or failed
        #[arg(long)]
        force: bool,
    },
    /// Show a profile's current status and outputs
    Status { id: Uuid },
    /// Show a profile's processing log
    Logs { id: Uuid },
    /// Show or record a reviewer's verdict on a profile
    Review {
        id: Uuid,
        /// unknown, candidate or not_candidate
        #[arg(long)]
        status: Option<ReviewStatus>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List completed profiles by rank
    Rankings {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Count profiles per status
    Stats,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
    /// Upsert profiles from the configured profiles file
    Seed,
}

#[derive(Debug, Subcommand)]
enum ProfilesCommands {
    /// Upsert profiles from a YAML file
    Import { file: PathBuf },
    List {
        /// Only profiles in this status
        #[arg(long)]
        status: Option<ProfileStatus>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("cpdb-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = cpdb_core::load_app_config()?;
    init_tracing(&config.log_level);
    tracing::debug!(env = %config.env, "configuration loaded");

    let pool = cpdb_db::connect_pool(
        &config.database_url,
        cpdb_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => db::run_db_ping(&pool).await?,
            DbCommands::Migrate => db::run_db_migrate(&pool).await?,
            DbCommands::Seed => profiles::run_import(&pool, &config.profiles_path).await?,
        },
        Commands::Profiles { command } => match command {
            ProfilesCommands::Import { file } => profiles::run_import(&pool, &file).await?,
            ProfilesCommands::List { status, limit } => {
                profiles::run_list(&pool, status, limit).await?;
            }
        },
        Commands::Process { id, force } => process::run_process(&pool, &config, id, force).await?,
        Commands::Batch {
            ids,
            pending,
            concurrency,
            deadline_secs,
            force,
        } => {
            let request = process::BatchRequest {
                ids,
                pending,
                concurrency,
                deadline_secs,
                force,
            };
            process::run_batch(&pool, &config, request).await?;
        }
        Commands::Status { id } => profiles::run_status(&pool, id).await?,
        Commands::Logs { id } => profiles::run_logs(&pool, id).await?,
        Commands::Review { id, status, notes } => {
            profiles::run_review(&pool, id, status, notes).await?;
        }
        Commands::Rankings { limit } => profiles::run_rankings(&pool, limit).await?,
        Commands::Stats => profiles::run_stats(&pool).await?,
    }

    Ok(())
}
