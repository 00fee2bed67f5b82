//! tsmirror CLI
//!
//! Local execution entry point. For AWS Lambda, use `tsmirror-sync-lambda`
//! and `tsmirror-analytics-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tsmirror::{
    config::{build_queue, build_store, load_config},
    error::{AppError, Result},
    models::Config,
    pipeline::{self, AnalyticsConsumer, RunReport},
    queue::MemoryQueue,
    utils,
};

/// tsmirror - incremental time-series directory mirror
#[derive(Parser, Debug)]
#[command(
    name = "tsmirror",
    version,
    about = "Mirror a public time-series directory tree and analyze it"
)]
struct Cli {
    /// TOML configuration file (environment keys override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local object store root, used when no bucket is configured
    #[arg(short, long, default_value = "storage")]
    store_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the source, mirror changed files and publish completion
    /// (requires QUEUE_URL)
    Sync,

    /// Run the analyses over the mirrored datasets
    Analyze {
        /// Also write the report as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run full pipeline: Sync → Analyze via an in-process queue
    Pipeline,

    /// List mirrored keys
    List {
        /// Key prefix (default: the configured destination prefix)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Turn an unpublished run into a process failure.
fn ensure_published(report: &RunReport, config: &Config) -> Result<()> {
    match &report.publish_error {
        Some(message) => Err(AppError::Publish {
            attempts: config.retry.max_attempts,
            message: message.clone(),
        }),
        None => Ok(()),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_logging(
        cli.verbose,
        config
            .as_ref()
            .map(|c| c.logging.level.as_str())
            .unwrap_or("info"),
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
    };

    match cli.command {
        Command::Sync => {
            let store = build_store(&config, Some(cli.store_dir.as_path())).await?;
            let queue = build_queue(&config).await.inspect_err(|_| {
                log::error!("`sync` needs a durable queue; use `pipeline` for a local run");
            })?;
            let report = pipeline::run_sync(&config, store, queue).await?;
            ensure_published(&report, &config)?;
            log::info!("Sync complete!");
        }

        Command::Analyze { output } => {
            let store = build_store(&config, Some(cli.store_dir.as_path())).await?;
            let report = pipeline::run_analytics(store.as_ref(), &config.analytics, None).await?;
            utils::log::analytics_report(&report, config.analytics.report_limit);

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                log::info!("Report saved to {}", path.display());
            }
        }

        Command::Pipeline => {
            let store = build_store(&config, Some(cli.store_dir.as_path())).await?;
            let queue = Arc::new(MemoryQueue::from_config(&config.queue));

            log::info!("Step 1/2: Syncing...");
            let report = pipeline::run_sync(&config, Arc::clone(&store), queue.clone()).await?;
            ensure_published(&report, &config)?;

            log::info!("Step 2/2: Analyzing...");
            let consumer = AnalyticsConsumer::new(store, queue, config.analytics.clone());
            match consumer.poll_once().await? {
                Some(_) => log::info!("Pipeline complete!"),
                None => log::warn!("No completion message was available"),
            }
        }

        Command::List { prefix } => {
            let store = build_store(&config, Some(cli.store_dir.as_path())).await?;
            let prefix = prefix.unwrap_or_else(|| format!("{}/", config.destination.prefix));
            let keys = store.list(&prefix).await?;

            for key in &keys {
                println!("{key}");
            }
            log::info!("{} objects under {}{}", keys.len(), store.describe(), prefix);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            utils::log::summary(
                "Configuration",
                &[
                    ("Source", config.source.root_url.clone()),
                    ("Max depth", config.source.max_depth.to_string()),
                    (
                        "Workers (crawl/sync)",
                        format!("{}/{}", config.source.workers, config.sync.workers),
                    ),
                    (
                        "Destination",
                        config
                            .destination
                            .bucket
                            .clone()
                            .unwrap_or_else(|| cli.store_dir.display().to_string()),
                    ),
                    ("Budget", format!("{}s", config.budget.ceiling_secs)),
                ],
            );
            log::info!("All validations passed!");
        }
    }

    Ok(())
}
