//! Curator host process
//!
//! Loads the curation config, opens the tracking store and runs the curator
//! actors until Ctrl-C. Without a chain client wired in, events are replayed
//! from a JSON-lines file (or stdin) and votes are only logged.
//!
//! # Usage
//!
//! ```bash
//! # Validate a config file and exit
//! curator --config curator-config.yaml --check
//!
//! # Replay recorded events against a scratch database
//! curator --config curator-config.yaml --database-path /tmp/curator-db --events events.jsonl
//!
//! # Config from CURATOR_CONFIG or ./curator-config.{json,yaml,toml}
//! RUST_LOG=curation=debug curator --events -
//! ```

mod replay;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use curation::external::SourceResult;
use curation::{ChainEvent, Collaborators, Curator, CuratorConfig, EventSource};
use tokio::io::BufReader;
use tracing::info;

use replay::{ContentCache, DryRunExecutor, FixedResourceLevel, JsonLinesEvents};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (.json, .yaml or .toml). Defaults to CURATOR_CONFIG, then
    /// ./curator-config.{json,yaml,toml}
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tracking store directory (overrides the config and CURATOR_DATABASE_PATH)
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// JSON-lines event file to replay, or "-" for stdin
    #[arg(long)]
    events: Option<PathBuf>,

    /// Resource level reported to the curator, as a fraction
    #[arg(long, default_value_t = 1.0)]
    resource_level: f64,

    /// Validate the configuration and exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

fn load_config(args: &Args) -> Result<CuratorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = CuratorConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => CuratorConfig::from_env().context("Failed to load config")?,
    };
    if let Some(path) = &args.database_path {
        config.database_path = path.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_events(args: &Args, cache: ContentCache) -> Result<Option<Box<dyn EventSource>>> {
    let Some(path) = &args.events else {
        return Ok(None);
    };
    let events: Box<dyn EventSource> = if path.as_os_str() == "-" {
        Box::new(JsonLinesEvents::new(BufReader::new(tokio::io::stdin()), cache))
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open event file {}", path.display()))?;
        Box::new(JsonLinesEvents::new(BufReader::new(file), cache))
    };
    Ok(Some(events))
}

/// Stream that never yields, for runs without an event file.
struct NoEvents;

#[async_trait]
impl EventSource for NoEvents {
    async fn next_event(&mut self) -> SourceResult<Option<ChainEvent>> {
        std::future::pending::<()>().await;
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curator=info".parse()?)
                .add_directive("curation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let policy = config.to_policy()?;
    info!(
        authors = policy.authors().count(),
        delegates = policy.delegates().count(),
        database = %config.database_path.display(),
        "Configuration loaded"
    );
    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    let curator = Curator::open(&config).context("Failed to open curator")?;
    let cache = ContentCache::new();
    let events: Box<dyn EventSource> = match open_events(&args, cache.clone()).await? {
        Some(events) => events,
        None => {
            info!("No event file given, waiting for Ctrl-C");
            Box::new(NoEvents)
        }
    };
    let executor = Arc::new(DryRunExecutor::new());

    let handle = curator.spawn(Collaborators {
        events,
        executor: executor.clone(),
        fetcher: Arc::new(cache.clone()),
        resource: Arc::new(FixedResourceLevel(args.resource_level)),
        history: None,
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C");

    let tracked = handle.store().tracked_count()?;
    handle.shutdown().await?;
    info!(
        seen = cache.len(),
        votes = executor.submitted(),
        tracked,
        "Curator exited"
    );
    Ok(())
}
