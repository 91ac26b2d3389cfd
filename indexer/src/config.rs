//! TOML configuration for the indexer.
//!
//! Every section is optional; missing values fall back to the defaults
//! below. Command-line flags are applied on top by `main`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use graph::state::{TreeConfig, MAX_SUPPORTED_DEPTH};
use serde::Deserialize;

use crate::error::{IndexerError, IndexerResult};
use crate::ingest::IngestConfig;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Ledger RPC node.
    pub rpc: RpcSection,
    /// Ingestion loop tuning.
    pub ingest: IngestSection,
    /// Mirror storage backend.
    pub store: StoreSection,
    /// JSON-RPC endpoint.
    pub server: ServerSection,
    /// Commitment tree shape.
    pub tree: TreeSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[rpc]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub url: String,
    /// `confirmed` or `finalized`.
    pub commitment: String,
    /// Graph program id; defaults to the built-in one.
    pub program_id: Option<String>,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8899".to_string(),
            commitment: "confirmed".to_string(),
            program_id: None,
        }
    }
}

/// `[ingest]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Transactions fetched per step.
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    /// Seconds between progress reports.
    pub report_interval_secs: u64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval_ms: 1000,
            report_interval_secs: 30,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
    /// Database directory for the file backend.
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path: PathBuf::from("sgraph-mirror"),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// `[tree]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TreeSection {
    /// Must match the depth the on-ledger tree was bound with.
    pub depth: u32,
}

impl Default for TreeSection {
    fn default() -> Self {
        Self {
            depth: TreeConfig::GRAPH.max_depth,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Mirror backend selected by `[store] backend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File(PathBuf),
}

impl IndexerConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> IndexerResult<Self> {
        let config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> IndexerResult<Self> {
        toml::from_str(s).map_err(|e| IndexerError::Config {
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> IndexerResult<()> {
        if self.tree.depth == 0 || self.tree.depth > MAX_SUPPORTED_DEPTH {
            return Err(IndexerError::Config {
                message: format!("tree depth must be in 1..={MAX_SUPPORTED_DEPTH}"),
            });
        }
        if self.ingest.batch_size == 0 {
            return Err(IndexerError::Config {
                message: "ingest batch_size must be positive".to_string(),
            });
        }
        self.program_id()?;
        self.store_backend()?;
        Ok(())
    }

    pub fn program_id(&self) -> IndexerResult<Pubkey> {
        match self.rpc.program_id.as_deref() {
            None | Some("") => Ok(graph::ID),
            Some(id) => Pubkey::from_str(id).map_err(|_| IndexerError::Config {
                message: format!("invalid program_id: {id}"),
            }),
        }
    }

    pub fn store_backend(&self) -> IndexerResult<StoreBackend> {
        match self.store.backend.as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File(self.store.path.clone())),
            other => Err(IndexerError::Config {
                message: format!("unknown store backend: {other}"),
            }),
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            batch_size: self.ingest.batch_size,
            poll_interval: Duration::from_millis(self.ingest.poll_interval_ms),
            report_interval: Duration::from_secs(self.ingest.report_interval_secs),
        }
    }
}
