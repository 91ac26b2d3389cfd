use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::IndexerResult;
use crate::query::RelationFilter;
use crate::store::{ApplyStats, RelationStore, StoreStats};
use crate::types::{Checkpoint, RelationRecord};

type Index = HashMap<Pubkey, BTreeSet<u32>>;

#[derive(Default)]
struct Mirror {
    records: BTreeMap<u32, RelationRecord>,
    by_from: Index,
    by_to: Index,
    by_provider: Index,
    checkpoint: Option<Checkpoint>,
}

impl Mirror {
    fn upsert(&mut self, record: RelationRecord, stats: &mut ApplyStats) {
        let index = record.leaf_index;
        match self.records.get(&index) {
            Some(stored) if record.recency() <= stored.recency() => {
                stats.ignored += 1;
                return;
            }
            Some(_) => stats.replaced += 1,
            None => stats.inserted += 1,
        }

        if let Some(previous) = self.records.remove(&index) {
            unindex(&mut self.by_from, &previous.from, index);
            unindex(&mut self.by_to, &previous.to, index);
            unindex(&mut self.by_provider, &previous.provider, index);
        }
        self.by_from.entry(record.from).or_default().insert(index);
        self.by_to.entry(record.to).or_default().insert(index);
        self.by_provider.entry(record.provider).or_default().insert(index);
        self.records.insert(index, record);
    }

    /// Smallest candidate set the filter allows, newest first.
    fn candidates(&self, filter: &RelationFilter) -> Vec<u32> {
        let below = |set: &BTreeSet<u32>| -> Vec<u32> {
            match filter.after {
                Some(after) => set.range(..after).rev().copied().collect(),
                None => set.iter().rev().copied().collect(),
            }
        };
        let indexed = filter
            .from
            .as_ref()
            .map(|key| self.by_from.get(key))
            .or_else(|| filter.to.as_ref().map(|key| self.by_to.get(key)));
        if let Some(set) = indexed {
            return set.map(below).unwrap_or_default();
        }
        if let [provider] = filter.providers.as_slice() {
            return self.by_provider.get(provider).map(below).unwrap_or_default();
        }

        match filter.after {
            Some(after) => self.records.range(..after).rev().map(|(k, _)| *k).collect(),
            None => self.records.keys().rev().copied().collect(),
        }
    }

    fn find(&self, filter: &RelationFilter) -> Vec<RelationRecord> {
        self.candidates(filter)
            .into_iter()
            .filter_map(|index| self.records.get(&index))
            .filter(|record| filter.matches(record))
            .take(filter.limit)
            .cloned()
            .collect()
    }
}

fn unindex(index: &mut Index, key: &Pubkey, leaf: u32) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&leaf);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

/// In-memory mirror. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    mirror: Arc<RwLock<Mirror>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_sync(&self, records: Vec<RelationRecord>, checkpoint: Checkpoint) -> ApplyStats {
        let mut mirror = self.mirror.write();
        let mut stats = ApplyStats::default();
        for record in records {
            mirror.upsert(record, &mut stats);
        }
        mirror.checkpoint = Some(checkpoint);
        stats
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn apply(
        &self,
        records: Vec<RelationRecord>,
        checkpoint: Checkpoint,
    ) -> IndexerResult<ApplyStats> {
        Ok(self.apply_sync(records, checkpoint))
    }

    async fn checkpoint(&self) -> IndexerResult<Option<Checkpoint>> {
        Ok(self.mirror.read().checkpoint.clone())
    }

    async fn find(&self, filter: &RelationFilter) -> IndexerResult<Vec<RelationRecord>> {
        Ok(self.mirror.read().find(filter))
    }

    async fn get(&self, leaf_index: u32) -> IndexerResult<Option<RelationRecord>> {
        Ok(self.mirror.read().records.get(&leaf_index).cloned())
    }

    async fn all(&self) -> IndexerResult<Vec<RelationRecord>> {
        Ok(self.mirror.read().records.values().cloned().collect())
    }

    async fn stats(&self) -> IndexerResult<StoreStats> {
        let mirror = self.mirror.read();
        Ok(StoreStats {
            records: mirror.records.len(),
            disconnected: mirror
                .records
                .values()
                .filter(|record| record.disconnected_at.is_some())
                .count(),
        })
    }
}
