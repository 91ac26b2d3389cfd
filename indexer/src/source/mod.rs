//! Where change-log transactions come from.
//!
//! An [`EventSource`] hands out transactions touching the graph program in
//! chronological order, resuming after a [`Cursor`]. Implementations:
//!
//! - [`MemorySource`]: an in-process list, for replay and tests
//! - [`RpcSource`]: a ledger JSON-RPC node

mod memory;
mod rpc;

use async_trait::async_trait;

use crate::error::IndexerResult;
use crate::types::Cursor;

pub use memory::MemorySource;
pub use rpc::RpcSource;

/// A transaction that invoked the graph program, with its log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTransaction {
    pub slot: u64,
    pub signature: String,
    /// Empty for failed transactions; they carry no events.
    pub logs: Vec<String>,
}

impl SourceTransaction {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            slot: self.slot,
            signature: self.signature.clone(),
        }
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Up to `limit` transactions after `after` (from the beginning when
    /// `None`), oldest first. Calling again with the same cursor returns
    /// the same transactions.
    async fn fetch(
        &self,
        after: Option<&Cursor>,
        limit: usize,
    ) -> IndexerResult<Vec<SourceTransaction>>;

    /// Most recent slot known to the source, for lag reporting.
    async fn latest_slot(&self) -> IndexerResult<u64>;
}
