//! `bosund` — the bosun cluster manager daemon.
//!
//! Binary entrypoint that runs the reconciliation service over a local
//! in-process fleet: cluster membership, the configuration store, and the
//! janitor driving periodic cleanup passes.
//!
//! # Usage
//!
//! ```text
//! bosund start                        # run the reconciliation service
//! bosund start -c bosun.toml          # start with a config file
//! bosund bucket create default        # create a bucket
//! bosund bucket list                  # list buckets
//! bosund cleanup default              # one-shot pass for one bucket
//! bosund status                       # buckets, maps and balance
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use bosun_cluster::{ClusterState, LeaseService, LocalLeases};
use bosun_config::{ConfigStore, NoopReplicator, Replicator};
use bosun_janitor::{CleanupOptions, Janitor, MemoryNodes, NodeApi};
use bosun_ring::is_balanced;
use bosun_types::{BucketConfig, Member, MemberState, NodeId, StorageEngine};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "bosund", version, about = "Bosun cluster manager daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation service.
    Start {
        /// Override data directory (useful for running multiple instances).
        #[arg(short, long, env = "BOSUN_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Override the node name.
        #[arg(short, long)]
        name: Option<String>,

        /// Override seconds between periodic cleanup passes.
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show buckets, maps and balance from the local config store.
    Status,

    /// Run one cleanup pass for one bucket and exit.
    Cleanup {
        /// Bucket to reconcile.
        bucket: String,
    },

    /// Bucket administration.
    Bucket {
        #[command(subcommand)]
        action: BucketCommands,
    },
}

#[derive(Subcommand)]
enum BucketCommands {
    /// Create a bucket. The next cleanup pass places it on the cluster.
    Create {
        /// Bucket name.
        name: String,

        /// Vbucket count. Must be a power of two.
        #[arg(short, long)]
        vbuckets: Option<u16>,

        /// Replica copies per vbucket.
        #[arg(short, long)]
        replicas: Option<u8>,

        /// Use the ephemeral storage engine (no disk persistence on the
        /// data nodes; enables the unsafe-failover check).
        #[arg(short, long)]
        ephemeral: bool,
    },

    /// List buckets in the local config store.
    List,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Start {
            data_dir,
            name,
            interval,
        } => {
            // CLI args override config file values.
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(name) = name {
                config.node.name = name;
            }
            if let Some(secs) = interval {
                config.janitor.pass_interval_secs = Some(secs);
            }
            cmd_start(config).await
        }
        Commands::Status => cmd_status(&config),
        Commands::Cleanup { bucket } => cmd_cleanup(&config, &bucket).await,
        Commands::Bucket { action } => match action {
            BucketCommands::Create {
                name,
                vbuckets,
                replicas,
                ephemeral,
            } => cmd_bucket_create(&config, &name, vbuckets, replicas, ephemeral),
            BucketCommands::List => cmd_bucket_list(&config),
        },
    }
}

// -----------------------------------------------------------------------
// Service construction
// -----------------------------------------------------------------------

/// The local deployment: membership, config store, and the janitor wired
/// over an in-process fleet.
struct Service {
    cluster: Arc<ClusterState>,
    store: Arc<ConfigStore>,
    janitor: Arc<Janitor>,
}

/// Build the service from config: every `[cluster] nodes` entry becomes an
/// active member backed by a simulated data node.
async fn build_service(config: &CliConfig) -> Result<Service> {
    std::fs::create_dir_all(&config.node.data_dir)
        .context("failed to create data directory")?;

    let local_id = NodeId::from_name(&config.node.name);
    let cluster = ClusterState::new(local_id);
    let nodes = MemoryNodes::new();
    for name in config.member_names() {
        let node_id = NodeId::from_name(&name);
        cluster
            .add_member(Member {
                node_id,
                name,
                state: MemberState::Active,
                generation: 1,
            })
            .await;
        nodes.add_node(node_id).await;
    }

    let store = Arc::new(
        ConfigStore::open(config.node.data_dir.join("config"), local_id)
            .context("failed to open config store")?,
    );

    let janitor = Janitor::new(
        Arc::clone(&cluster),
        Arc::clone(&store),
        nodes as Arc<dyn NodeApi>,
        Arc::new(NoopReplicator) as Arc<dyn Replicator>,
        Arc::new(LocalLeases::new()) as Arc<dyn LeaseService>,
    );

    Ok(Service {
        cluster,
        store,
        janitor,
    })
}

fn cleanup_options(config: &CliConfig) -> CleanupOptions {
    CleanupOptions {
        query_timeout: Some(config.query_timeout()),
        ..CleanupOptions::default()
    }
}

/// Open the config store without the rest of the service, for read-mostly
/// commands.
fn open_store(config: &CliConfig) -> Result<ConfigStore> {
    let path = config.node.data_dir.join("config");
    std::fs::create_dir_all(&config.node.data_dir)
        .context("failed to create data directory")?;
    ConfigStore::open(&path, NodeId::from_name(&config.node.name)).map_err(|e| {
        anyhow::anyhow!(
            "cannot open config store at {}. Is the node running? ({e})",
            path.display(),
        )
    })
}

// -----------------------------------------------------------------------
// bosund start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    info!("starting bosund");
    info!(
        node = %config.node.name,
        data_dir = %config.node.data_dir.display(),
        members = config.member_names().len(),
        interval = ?config.pass_interval(),
        "node configuration"
    );

    let service = build_service(&config).await?;
    let options = cleanup_options(&config);

    info!(node_id = %service.cluster.local_node_id(), "reconciliation service running");

    let mut ticks = tokio::time::interval(config.pass_interval());
    let mut events = service.cluster.subscribe();
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                run_passes(&service.janitor, &service.store, &options).await;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    info!(?event, "membership changed, running a pass");
                    run_passes(&service.janitor, &service.store, &options).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "membership events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    info!(passes = service.janitor.pass_count(), "bosund stopped");
    Ok(())
}

/// One round of cleanup over every bucket in the store.
async fn run_passes(janitor: &Janitor, store: &ConfigStore, options: &CleanupOptions) {
    let buckets = match store.list_buckets() {
        Ok(buckets) => buckets,
        Err(error) => {
            error!(%error, "failed to list buckets");
            return;
        }
    };
    if buckets.is_empty() {
        return;
    }

    let batch: Vec<(String, CleanupOptions)> = buckets
        .into_iter()
        .map(|bucket| (bucket, options.clone()))
        .collect();
    for (bucket, result) in janitor.cleanup_buckets(&batch).await {
        if let Err(error) = result {
            warn!(bucket, kind = ?error.kind(), %error, "cleanup pass failed");
        }
    }
}

// -----------------------------------------------------------------------
// bosund status
// -----------------------------------------------------------------------

fn cmd_status(config: &CliConfig) -> Result<()> {
    let store = open_store(config)?;

    let buckets = store.list_buckets()?;
    println!("Buckets: {}", buckets.len());
    for name in &buckets {
        let Some(stored) = store.get_bucket(name)? else {
            continue;
        };
        let bucket = stored.value;
        match &bucket.map {
            Some(map) => {
                let balance = if is_balanced(map, &bucket.servers) {
                    "balanced"
                } else {
                    "unbalanced"
                };
                println!(
                    "  {name}: {} vbuckets x {} copies on {} server(s), {balance}",
                    map.num_vbuckets(),
                    map.chain_len(),
                    bucket.servers.len(),
                );
            }
            None => println!("  {name}: no vbucket map yet"),
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------
// bosund cleanup
// -----------------------------------------------------------------------

async fn cmd_cleanup(config: &CliConfig, bucket: &str) -> Result<()> {
    let service = build_service(config).await?;
    let options = cleanup_options(config);

    service
        .janitor
        .cleanup(bucket, &options)
        .await
        .map_err(|error| anyhow::anyhow!("cleanup failed ({:?}): {error}", error.kind()))?;

    println!("Bucket {bucket:?} reconciled.");
    Ok(())
}

// -----------------------------------------------------------------------
// bosund bucket
// -----------------------------------------------------------------------

fn cmd_bucket_create(
    config: &CliConfig,
    name: &str,
    vbuckets: Option<u16>,
    replicas: Option<u8>,
    ephemeral: bool,
) -> Result<()> {
    let vbuckets = vbuckets.unwrap_or_else(|| config.num_vbuckets());
    let replicas = replicas.unwrap_or_else(|| config.num_replicas());
    ensure!(
        vbuckets.is_power_of_two(),
        "vbucket count must be a power of two, got {vbuckets}"
    );

    let store = open_store(config)?;

    // The server list starts empty; the janitor populates it from the
    // active members on the first pass.
    let mut bucket = BucketConfig::new(name, vbuckets, replicas);
    if ephemeral {
        bucket.storage = StorageEngine::Ephemeral;
    }
    store
        .create_bucket(bucket)
        .with_context(|| format!("failed to create bucket {name:?}"))?;

    println!("Bucket {name:?} created; the next cleanup pass will place it.");
    Ok(())
}

fn cmd_bucket_list(config: &CliConfig) -> Result<()> {
    let store = open_store(config)?;
    let buckets = store.list_buckets()?;
    if buckets.is_empty() {
        println!("No buckets.");
        return Ok(());
    }
    for name in buckets {
        println!("{name}");
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
