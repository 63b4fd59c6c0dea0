use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use shardwork::{
    InMemoryStore, NodeId, RegistryConfig, ShardIndex, ShardSessionRecord, ShardedWorkRegistry,
    StoreConfig, WorkerId,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardwork", version, about = "Sharded work registry playground")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Let several nodes race for the same shards
    Simulate(SimulateArgs),
    /// Print the session records stored in a snapshot
    Inspect {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[derive(Args)]
struct SimulateArgs {
    #[arg(long, default_value_t = 3)]
    nodes: u32,
    #[arg(long, default_value_t = 8)]
    shards: u32,
    #[arg(long, default_value_t = 2)]
    workers_per_node: u32,
    #[arg(long, default_value_t = 3)]
    rounds: u32,
    /// Inactivity period after which abandoned shards are reclaimed
    #[arg(long, default_value_t = 50)]
    expiry_ms: u64,
    /// Load the store from and save it to this snapshot file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Simulate(args) => simulate(args).await,
        Command::Inspect { snapshot } => inspect(snapshot).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shardwork=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let mut store_config = StoreConfig::in_memory();
    if let Some(path) = &args.snapshot {
        store_config = store_config.snapshot_path(path);
    }
    let store = store_config.open().await.context("opening store")?;
    let expiry = Duration::from_millis(args.expiry_ms);
    let shards = ShardIndex::all(args.shards)?;

    // One registry per node: nodes only coordinate through the store.
    let mut nodes = Vec::new();
    for n in 0..args.nodes {
        let node = NodeId::new(format!("node-{}", n))?;
        let registry = ShardedWorkRegistry::new(
            Arc::new(store.clone()),
            RegistryConfig::new().session_expiry(expiry),
        )?;
        nodes.push((node, registry));
    }

    for round in 1..=args.rounds {
        let mut tasks = Vec::new();
        for (node, registry) in &nodes {
            for w in 0..args.workers_per_node {
                let worker = WorkerId::new(node.clone(), format!("worker-{}", w))?;
                let registry = registry.clone();
                let shards = shards.clone();
                tasks.push(tokio::spawn(async move {
                    run_worker(registry, worker, shards).await
                }));
            }
        }

        let mut claimed = 0;
        for result in join_all(tasks).await {
            claimed += result.context("worker task panicked")??;
        }
        println!("round {}: {} shard(s) picked up", round, claimed);

        tokio::time::sleep(expiry + Duration::from_millis(10)).await;
        if let Some((_, registry)) = nodes.first() {
            let released = registry.release_expired().await?;
            println!("round {}: {} abandoned shard(s) reclaimed", round, released.len());
        }
    }

    if let Some((_, registry)) = nodes.first() {
        print_records(registry.all_records().await?);
    }
    let stats = store.stats();
    println!(
        "transactions: {} begun, {} committed, {} aborted ({} conflicts)",
        stats.begun, stats.committed, stats.aborted, stats.conflicted
    );

    if let Some(path) = &args.snapshot {
        store
            .save_to(path)
            .await
            .with_context(|| format!("saving snapshot to {}", path.display()))?;
    }
    Ok(())
}

/// Pick up every shard it can, finish every other one and abandon the rest.
async fn run_worker(
    registry: ShardedWorkRegistry,
    worker: WorkerId,
    shards: Vec<ShardIndex>,
) -> shardwork::Result<usize> {
    let mut picked = 0;
    for shard in shards {
        let Some(session) = registry.pick_up_as(shard, worker.clone()).await? else {
            continue;
        };
        picked += 1;
        if shard.index() % 2 == 0 {
            session.complete().await?;
        }
    }
    Ok(picked)
}

async fn inspect(snapshot: PathBuf) -> Result<()> {
    if !snapshot.exists() {
        anyhow::bail!("snapshot {} does not exist", snapshot.display());
    }
    let store = InMemoryStore::open(&snapshot)
        .await
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
    let registry = ShardedWorkRegistry::new(Arc::new(store), RegistryConfig::default())?;
    print_records(registry.all_records().await?);
    Ok(())
}

fn print_records(mut records: Vec<ShardSessionRecord>) {
    records.sort_by_key(|record| record.index);
    println!("{:<10} {:<28} {}", "shard", "worker", "last picked");
    for record in records {
        let worker = record
            .worker
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let picked = record
            .when_last_picked
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {:<28} {}", record.index.to_string(), worker, picked);
    }
}
