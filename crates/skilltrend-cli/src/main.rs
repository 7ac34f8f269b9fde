use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skilltrend_core::AppConfig;
use skilltrend_store::{JobStore, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "skilltrend-cli")]
#[command(about = "Job listing ingestion and skill demand statistics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch listings and store jobs and skills.
    Sync {
        /// Ingest into memory only; nothing is written to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Serve the statistics API.
    Serve,
    /// Print skill statistics.
    Stats,
    /// Print taxonomy category names.
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync { dry_run: false }) {
        Commands::Sync { dry_run } => {
            let report = skilltrend_sync::run_sync_once_from_env(dry_run).await?;
            println!("sync complete: {}", report.summary_line());
        }
        Commands::Migrate => {
            connect(&AppConfig::from_env()?)
                .await?
                .migrate()
                .await
                .context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Serve => {
            skilltrend_web::serve_from_config(&AppConfig::from_env()?).await?;
        }
        Commands::Stats => {
            let stats = connect(&AppConfig::from_env()?)
                .await?
                .skill_statistics()
                .await
                .context("loading skill statistics")?;
            for row in stats {
                println!(
                    "{:<20} {:<10} demand={:<5} total_demand={}",
                    row.skill, row.category, row.demand, row.total_demand
                );
            }
        }
        Commands::Categories => {
            let taxonomy = AppConfig::from_env()?
                .load_taxonomy()
                .context("loading taxonomy")?;
            for name in taxonomy.category_names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> Result<PgStore> {
    PgStore::from_config(config)
        .await
        .context("connecting to database")
}
