//! `sgraph-indexer`: follows the graph program and serves `sg_*` queries.
//!
//! # Usage
//!
//! ```text
//! sgraph-indexer                               # defaults, file store
//! sgraph-indexer -c indexer.toml               # with a config file
//! sgraph-indexer --memory -l 127.0.0.1:9000    # throwaway mirror
//! sgraph-indexer --rpc-url https://api.devnet.solana.com
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use sgraph_indexer::{
    FileStore, IndexerConfig, MemoryStore, Processor, RelationStore, RpcServer, RpcSource,
    StoreBackend,
};

#[derive(Parser)]
#[command(
    name = "sgraph-indexer",
    version,
    about = "Relation graph indexer and JSON-RPC query service"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep the mirror in memory only.
    #[arg(long)]
    memory: bool,

    /// Override the JSON-RPC listen address (e.g. "127.0.0.1:8080").
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the ledger RPC URL.
    #[arg(long)]
    rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = IndexerConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    // CLI args override config file values.
    if cli.memory {
        config.store.backend = "memory".to_string();
    }
    if let Some(addr) = cli.listen {
        config.server.listen_addr = addr;
    }
    if let Some(url) = cli.rpc_url {
        config.rpc.url = url;
    }

    run(config).await
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: IndexerConfig) -> Result<()> {
    let program_id = config.program_id()?;
    let backend = config.store_backend()?;
    info!(
        rpc = %config.rpc.url,
        commitment = %config.rpc.commitment,
        program = %program_id,
        listen = %config.server.listen_addr,
        depth = config.tree.depth,
        "indexer configuration"
    );

    let store: Arc<dyn RelationStore> = match backend {
        StoreBackend::Memory => {
            info!("using in-memory mirror");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File(path) => Arc::new(
            FileStore::open(&path)
                .await
                .with_context(|| format!("failed to open mirror at {}", path.display()))?,
        ),
    };
    if let Some(checkpoint) = store.checkpoint().await? {
        info!(
            slot = checkpoint.cursor.slot,
            signature = %checkpoint.cursor.signature,
            "resuming from checkpoint"
        );
    }

    let source = Arc::new(RpcSource::new(
        config.rpc.url.clone(),
        program_id,
        config.rpc.commitment.clone(),
    ));
    let processor = Processor::new(source, store.clone(), program_id, config.ingest_config());
    let server = RpcServer::new(store, processor.status(), config.tree.depth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest = tokio::spawn(async move { processor.run(shutdown_rx).await });

    let listen = config.server.listen_addr.clone();
    let mut server_shutdown = shutdown_tx.subscribe();
    let mut serve = tokio::spawn(async move {
        server
            .serve_with_shutdown(&listen, async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            None
        }
        result = &mut serve => Some(result),
    };
    let _ = shutdown_tx.send(true);
    let served = match finished {
        Some(result) => result,
        None => serve.await,
    };
    ingest.await.context("ingestion task panicked")?;
    served
        .context("server task panicked")?
        .context("JSON-RPC server failed")?;

    info!("indexer stopped");
    Ok(())
}
