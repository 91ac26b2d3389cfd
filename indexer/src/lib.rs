//! Off-chain mirror of the relation graph.
//!
//! The indexer follows the graph program's change log, keeps every relation
//! it has seen in a [`RelationStore`] and answers queries over JSON-RPC.
//!
//! ```text
//! EventSource --fetch--> Processor --decode/apply--> RelationStore <--find-- RpcServer
//! ```
//!
//! Records are keyed by leaf index and resolved last-write-wins on
//! `(disconnected, seq)`, so replays and out-of-order delivery converge on
//! the same mirror.

pub mod config;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod proof;
pub mod query;
pub mod server;
pub mod source;
pub mod store;
pub mod types;

pub use config::{IndexerConfig, StoreBackend};
pub use error::{IndexerError, IndexerResult};
pub use ingest::{IngestConfig, LagStatus, Processor, StatusHandle, StatusSnapshot};
pub use query::{FindRelationsParams, RelationFilter};
pub use server::RpcServer;
pub use source::{EventSource, MemorySource, RpcSource, SourceTransaction};
pub use store::{FileStore, MemoryStore, RelationStore};
pub use types::{Checkpoint, Cursor, RelationRecord, TreeState};
