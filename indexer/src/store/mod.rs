//! Mirror storage.
//!
//! A [`RelationStore`] holds one [`RelationRecord`] per leaf index together
//! with the [`Checkpoint`] it reflects. Implementations:
//!
//! - [`MemoryStore`]: process memory only
//! - [`FileStore`]: fjall database, one atomic write batch per apply
//!
//! # Dedup
//!
//! Records are keyed by leaf index. An incoming record replaces the stored
//! one only when its [`recency`](RelationRecord::recency) is strictly
//! greater, so replaying an event, or receiving an older one late, leaves
//! the mirror unchanged.

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::IndexerResult;
use crate::query::RelationFilter;
use crate::types::{Checkpoint, RelationRecord};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Outcome of applying one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Leaves seen for the first time
    pub inserted: usize,
    /// Leaves whose stored state was superseded
    pub replaced: usize,
    /// Records no newer than what is stored
    pub ignored: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub records: usize,
    pub disconnected: usize,
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Apply `records` and record `checkpoint` as one step.
    async fn apply(
        &self,
        records: Vec<RelationRecord>,
        checkpoint: Checkpoint,
    ) -> IndexerResult<ApplyStats>;

    /// Progress the mirror reflects; `None` before the first batch.
    async fn checkpoint(&self) -> IndexerResult<Option<Checkpoint>>;

    /// Records matching `filter`, newest leaf first.
    async fn find(&self, filter: &RelationFilter) -> IndexerResult<Vec<RelationRecord>>;

    async fn get(&self, leaf_index: u32) -> IndexerResult<Option<RelationRecord>>;

    /// Every record, ascending by leaf index.
    async fn all(&self) -> IndexerResult<Vec<RelationRecord>>;

    async fn stats(&self) -> IndexerResult<StoreStats>;
}
