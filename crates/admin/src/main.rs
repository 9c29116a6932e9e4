use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use storage::Database;
use storage::dto::leaderboard::{LeaderboardMetric, LeaderboardQuery};
use storage::models::{FormatId, ListField};
use storage::repository::config::ConfigRepository;
use storage::repository::map::MapRepository;
use storage::services::leaderboard::{achievement_assignments, get_leaderboard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "maplist-admin")]
#[command(about = "Map ladder maintenance and leaderboard tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Print the standings of a format
    Leaderboard {
        #[arg(long)]
        format: FormatId,

        #[arg(long, default_value = "points")]
        metric: LeaderboardMetric,

        /// Reference time (RFC 3339), defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },
    /// Print the achievement role each user currently earns
    Roles {
        #[arg(long)]
        format: FormatId,

        #[arg(long, default_value = "points")]
        metric: LeaderboardMetric,
    },
    /// Show a map's list membership
    Map {
        code: String,

        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Check that both placement ladders have no gaps or duplicates
    AuditLadders {
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("maplist_admin={},storage={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let db = Database::connect(
        &config.database_url,
        config.max_connections,
        config.lock_timeout_ms,
    )
    .await
    .context("Failed to initialize database")?;

    match cli.command {
        Commands::Migrate => {
            tracing::info!("Running database migrations");
            db.run_migrations()
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database migrations completed successfully");
        }
        Commands::Leaderboard {
            format,
            metric,
            as_of,
            json,
        } => {
            let query = LeaderboardQuery {
                format,
                metric,
                as_of,
            };
            handle_leaderboard(&db, &query, json).await?;
        }
        Commands::Roles { format, metric } => {
            let query = LeaderboardQuery {
                format,
                metric,
                as_of: None,
            };
            handle_roles(&db, &query).await?;
        }
        Commands::Map { code, as_of } => {
            handle_map(&db, &code, as_of.unwrap_or_else(Utc::now)).await?;
        }
        Commands::AuditLadders { as_of } => {
            handle_audit(&db, as_of.unwrap_or_else(Utc::now)).await?;
        }
    }

    Ok(())
}

async fn handle_leaderboard(db: &Database, query: &LeaderboardQuery, json: bool) -> anyhow::Result<()> {
    let store = ConfigRepository::new(db.pool());
    let entries = get_leaderboard(db.pool(), &store, query)
        .await
        .context("Failed to compute leaderboard")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{:>5}  {:>12}  {}", entry.rank, entry.score, entry.user_id);
    }
    tracing::info!("{} users ranked on {} ({})", entries.len(), query.format, query.metric);
    Ok(())
}

async fn handle_roles(db: &Database, query: &LeaderboardQuery) -> anyhow::Result<()> {
    let store = ConfigRepository::new(db.pool());
    let assignments = achievement_assignments(db.pool(), &store, query)
        .await
        .context("Failed to evaluate achievement roles")?;

    for assignment in &assignments {
        println!("{}  {}", assignment.user_id, assignment.role.name);
    }
    Ok(())
}

async fn handle_map(db: &Database, code: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
    let repo = MapRepository::new(db.pool());
    let map = repo
        .find(code)
        .await
        .with_context(|| format!("Map {code} not found"))?;
    let version = repo
        .meta_as_of(code, at)
        .await
        .with_context(|| format!("Map {code} has no list history as of {at}"))?;

    println!("{}", serde_json::to_string_pretty(&map)?);
    println!("{}", serde_json::to_string_pretty(&version)?);
    Ok(())
}

async fn handle_audit(db: &Database, at: DateTime<Utc>) -> anyhow::Result<()> {
    let repo = MapRepository::new(db.pool());
    let mut broken = 0;

    for field in [ListField::PlacementCurver, ListField::PlacementAllver] {
        let audit = repo.audit_ladder(field, at).await?;
        if audit.is_dense() {
            tracing::info!("✓ {}: {} maps, dense", field, audit.size);
        } else {
            broken += 1;
            tracing::error!(
                "✗ {}: {} maps, duplicates {:?}, missing {:?}, out of range {:?}",
                field,
                audit.size,
                audit.duplicates,
                audit.missing,
                audit.out_of_range
            );
        }
    }

    if broken > 0 {
        bail!("{broken} ladder(s) failed the audit");
    }
    Ok(())
}
