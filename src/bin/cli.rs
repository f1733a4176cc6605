//! Course availability notifier CLI
//!
//! Local execution entry point: single passes, the scheduler loop, and
//! inspection of the state directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use notifier::{
    channels::LocalInbox,
    config::build_engine,
    error::{AppError, Result},
    models::{Config, Item, SubscriberId},
    pipeline::Scheduler,
    storage::{DedupCache, LocalStorage, SnapshotStore, StatusCache},
    utils::display_path,
};

/// notifier - Course availability change notifications
#[derive(Parser, Debug)]
#[command(
    name = "notifier",
    version,
    about = "Detects course availability changes and notifies subscribers"
)]
struct Cli {
    /// Path to state directory containing config and data files
    #[arg(short, long, default_value = "storage")]
    state_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single pass now
    Run,

    /// Run passes on the configured interval until Ctrl-C
    Watch {
        /// Override the configured interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Validate the configuration file
    Validate,

    /// Show cache and catalog info
    Info,

    /// List or update a subscriber's web inbox
    Inbox {
        subscriber: String,

        /// Mark an entry as read
        #[arg(long)]
        mark_read: Option<String>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.state_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Command::Run => {
            let engine = build_engine(&config, &cli.state_dir)?;
            let report = engine.run_pass().await?;
            if report.channel_failures() > 0 {
                log::warn!("{} channel deliveries failed", report.channel_failures());
            }
        }

        Command::Watch { interval } => {
            config.validate()?;
            let engine = Arc::new(build_engine(&config, &cli.state_dir)?);
            let scheduler = Scheduler::new(engine);
            let interval = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.scheduler.interval());

            log::info!("Running a pass every {}s (Ctrl-C to stop)", interval.as_secs());
            scheduler
                .run_every(interval, config.scheduler.run_on_start, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Failed to listen for Ctrl-C: {}", e);
                    }
                })
                .await;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let subscriptions = config.paths.subscriptions_path(&cli.state_dir);
            if subscriptions.exists() {
                let content = std::fs::read_to_string(&subscriptions)?;
                serde_json::from_str::<notifier::services::SubscriptionData>(&content)?;
                log::info!("✓ Subscriptions OK");
            } else {
                log::warn!("Subscriptions not found at {}", subscriptions.display());
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            let cwd = std::env::current_dir()?;
            log::info!("State directory: {}", display_path(&cli.state_dir, &cwd));

            let engine = build_engine(&config, &cli.state_dir)?;
            log::info!("Status cache: {} items", engine.status().len().await?);
            log::info!("Dedup cache: {} live keys", engine.dedup().live_keys().await?);

            match engine.snapshots().load_catalog().await? {
                Some(snapshot) => log::info!(
                    "Last pass: {} items at {}",
                    snapshot.count,
                    snapshot.updated_at
                ),
                None => log::info!("No pass has completed yet."),
            }
            if let Some(held) = engine.snapshots().load_held().await? {
                log::warn!(
                    "Snapshot of {} items held back at {}, next consistent pass accepts it",
                    held.count,
                    held.held_at
                );
            }

            if config.catalog.url.is_none() {
                let path = config.paths.catalog_path(&cli.state_dir);
                match Item::load_all(&path) {
                    Ok(items) => log::info!(
                        "Catalog file: {} items ({} open)",
                        items.len(),
                        items.iter().filter(|i| i.open).count()
                    ),
                    Err(e) => log::warn!("Catalog file {}: {}", display_path(&path, &cwd), e),
                }
            }
        }

        Command::Inbox {
            subscriber,
            mark_read,
        } => {
            let inbox = LocalInbox::new(LocalStorage::new(&cli.state_dir));
            let subscriber = SubscriberId::new(subscriber);

            if let Some(entry_id) = mark_read {
                if !inbox.mark_read(&subscriber, &entry_id).await? {
                    return Err(AppError::validation(format!(
                        "No inbox entry {} for {}",
                        entry_id, subscriber
                    )));
                }
                log::info!("Marked {} as read", entry_id);
            }

            let entries = inbox.list(&subscriber).await?;
            if entries.is_empty() {
                log::info!("Inbox of {} is empty", subscriber);
            }
            for entry in entries {
                println!(
                    "{} {} {:<7} {} ({}){}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.direction.as_str(),
                    entry.item,
                    entry.title,
                    if entry.read { "" } else { " *" }
                );
            }
        }
    }

    Ok(())
}
