use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{IndexerError, IndexerResult};
use crate::query::RelationFilter;
use crate::store::{ApplyStats, RelationStore, StoreStats};
use crate::types::{Checkpoint, RelationRecord};

const LAYOUT_VERSION: u32 = 1;

const VERSION_KEY: &[u8] = b"version";
const CHECKPOINT_KEY: &[u8] = b"checkpoint";
const RECORDS_KEY: &[u8] = b"records";
const DISCONNECTED_KEY: &[u8] = b"disconnected";
const EMPTY: &[u8] = &[];

/// Mirror persisted in a fjall database.
///
/// Keyspaces:
///
/// - `relations`: big-endian leaf index to JSON record
/// - `by_from`, `by_to`, `by_provider`: key bytes ++ big-endian leaf index
/// - `meta`: layout version, checkpoint and record counters
///
/// Each [`apply`](RelationStore::apply) writes only the leaves it touches,
/// plus the checkpoint, in one atomic batch.
pub struct FileStore {
    path: PathBuf,
    db: Database,
    relations: Keyspace,
    by_from: Keyspace,
    by_to: Keyspace,
    by_provider: Keyspace,
    meta: Keyspace,
    write: Mutex<()>,
}

#[derive(Default)]
struct Counters {
    records: u64,
    disconnected: u64,
}

impl FileStore {
    /// Open the database directory at `path`, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> IndexerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::builder(&path).open()?;
        let relations = db.keyspace("relations", KeyspaceCreateOptions::default)?;
        let by_from = db.keyspace("by_from", KeyspaceCreateOptions::default)?;
        let by_to = db.keyspace("by_to", KeyspaceCreateOptions::default)?;
        let by_provider = db.keyspace("by_provider", KeyspaceCreateOptions::default)?;
        let meta = db.keyspace("meta", KeyspaceCreateOptions::default)?;

        match meta.get(VERSION_KEY)? {
            Some(bytes) => {
                let version = decode_u32(&bytes)?;
                if version != LAYOUT_VERSION {
                    return Err(IndexerError::storage(format!(
                        "unsupported mirror layout version {version} in {}",
                        path.display()
                    )));
                }
            }
            None => meta.insert(VERSION_KEY, LAYOUT_VERSION.to_be_bytes().as_slice())?,
        }

        let store = Self {
            path,
            db,
            relations,
            by_from,
            by_to,
            by_provider,
            meta,
            write: Mutex::new(()),
        };
        let counters = store.counters()?;
        info!(
            path = %store.path.display(),
            records = counters.records,
            "opened mirror database"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn counters(&self) -> IndexerResult<Counters> {
        Ok(Counters {
            records: self.meta.get(RECORDS_KEY)?.map_or(Ok(0), |b| decode_u64(&b))?,
            disconnected: self
                .meta
                .get(DISCONNECTED_KEY)?
                .map_or(Ok(0), |b| decode_u64(&b))?,
        })
    }

    fn load(&self, leaf_index: u32) -> IndexerResult<Option<RelationRecord>> {
        match self.relations.get(leaf_index.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn apply_batch(
        &self,
        records: Vec<RelationRecord>,
        checkpoint: &Checkpoint,
    ) -> IndexerResult<ApplyStats> {
        let _guard = self.write.lock();
        let mut stats = ApplyStats::default();
        let mut stored: BTreeMap<u32, Option<RelationRecord>> = BTreeMap::new();
        let mut pending: BTreeMap<u32, RelationRecord> = BTreeMap::new();

        for record in records {
            let index = record.leaf_index;
            if !stored.contains_key(&index) {
                stored.insert(index, self.load(index)?);
            }
            let current = pending
                .get(&index)
                .or_else(|| stored.get(&index).and_then(Option::as_ref));
            match current {
                Some(current) if record.recency() <= current.recency() => {
                    stats.ignored += 1;
                    continue;
                }
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
            pending.insert(index, record);
        }

        let mut counters = self.counters()?;
        let mut batch = self.db.batch();
        for (index, record) in &pending {
            let previous = stored.get(index).and_then(Option::as_ref);
            match previous {
                Some(previous) => {
                    for (keyspace, old, new) in [
                        (&self.by_from, &previous.from, &record.from),
                        (&self.by_to, &previous.to, &record.to),
                        (&self.by_provider, &previous.provider, &record.provider),
                    ] {
                        if old != new {
                            batch.remove(keyspace, index_key(old, *index));
                        }
                    }
                    if previous.disconnected_at.is_some() {
                        counters.disconnected = counters.disconnected.saturating_sub(1);
                    }
                }
                None => counters.records += 1,
            }
            if record.disconnected_at.is_some() {
                counters.disconnected += 1;
            }

            batch.insert(&self.by_from, index_key(&record.from, *index), EMPTY);
            batch.insert(&self.by_to, index_key(&record.to, *index), EMPTY);
            batch.insert(&self.by_provider, index_key(&record.provider, *index), EMPTY);
            batch.insert(
                &self.relations,
                index.to_be_bytes().as_slice(),
                serde_json::to_vec(record)?,
            );
        }
        batch.insert(&self.meta, RECORDS_KEY, counters.records.to_be_bytes().as_slice());
        batch.insert(&self.meta, DISCONNECTED_KEY, counters.disconnected.to_be_bytes().as_slice());
        batch.insert(&self.meta, CHECKPOINT_KEY, serde_json::to_vec(checkpoint)?);
        batch.commit()?;

        debug!(
            path = %self.path.display(),
            written = pending.len(),
            slot = checkpoint.cursor.slot,
            "committed mirror batch"
        );
        Ok(stats)
    }

    /// Records listed under `key` in `keyspace`, newest leaf first.
    fn scan_index(
        &self,
        keyspace: &Keyspace,
        key: &Pubkey,
        filter: &RelationFilter,
    ) -> IndexerResult<Vec<RelationRecord>> {
        let lower = Bound::Included(index_key(key, 0));
        let upper = match filter.after {
            Some(after) => Bound::Excluded(index_key(key, after)),
            None => Bound::Included(index_key(key, u32::MAX)),
        };
        let mut found = Vec::new();
        for guard in keyspace.range((lower, upper)).rev() {
            if found.len() >= filter.limit {
                break;
            }
            let entry = guard.key()?;
            let leaf_index = decode_u32(&entry[entry.len() - 4..])?;
            if let Some(record) = self.load(leaf_index)? {
                if filter.matches(&record) {
                    found.push(record);
                }
            }
        }
        Ok(found)
    }

    fn scan_relations(&self, filter: &RelationFilter) -> IndexerResult<Vec<RelationRecord>> {
        let upper = match filter.after {
            Some(after) => Bound::Excluded(after.to_be_bytes().to_vec()),
            None => Bound::Unbounded,
        };
        let mut found = Vec::new();
        for guard in self.relations.range((Bound::Unbounded, upper)).rev() {
            if found.len() >= filter.limit {
                break;
            }
            let record: RelationRecord = serde_json::from_slice(&guard.value()?)?;
            if filter.matches(&record) {
                found.push(record);
            }
        }
        Ok(found)
    }
}

fn index_key(key: &Pubkey, leaf_index: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(36);
    bytes.extend_from_slice(key.as_ref());
    bytes.extend_from_slice(&leaf_index.to_be_bytes());
    bytes
}

fn decode_u32(bytes: &[u8]) -> IndexerResult<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| IndexerError::storage(format!("expected 4 bytes, got {}", bytes.len())))?;
    Ok(u32::from_be_bytes(array))
}

fn decode_u64(bytes: &[u8]) -> IndexerResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| IndexerError::storage(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

#[async_trait]
impl RelationStore for FileStore {
    async fn apply(
        &self,
        records: Vec<RelationRecord>,
        checkpoint: Checkpoint,
    ) -> IndexerResult<ApplyStats> {
        self.apply_batch(records, &checkpoint)
    }

    async fn checkpoint(&self) -> IndexerResult<Option<Checkpoint>> {
        match self.meta.get(CHECKPOINT_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find(&self, filter: &RelationFilter) -> IndexerResult<Vec<RelationRecord>> {
        if let Some(from) = &filter.from {
            return self.scan_index(&self.by_from, from, filter);
        }
        if let Some(to) = &filter.to {
            return self.scan_index(&self.by_to, to, filter);
        }
        if let [provider] = filter.providers.as_slice() {
            return self.scan_index(&self.by_provider, provider, filter);
        }
        self.scan_relations(filter)
    }

    async fn get(&self, leaf_index: u32) -> IndexerResult<Option<RelationRecord>> {
        self.load(leaf_index)
    }

    async fn all(&self) -> IndexerResult<Vec<RelationRecord>> {
        let mut records = Vec::new();
        for guard in self.relations.iter() {
            records.push(serde_json::from_slice(&guard.value()?)?);
        }
        Ok(records)
    }

    async fn stats(&self) -> IndexerResult<StoreStats> {
        let counters = self.counters()?;
        Ok(StoreStats {
            records: counters.records as usize,
            disconnected: counters.disconnected as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cursor;

    fn record(leaf_index: u32, seq: u64) -> RelationRecord {
        RelationRecord {
            leaf_index,
            from: Pubkey::new_unique(),
            to: Pubkey::new_unique(),
            provider: Pubkey::new_unique(),
            connected_at: 1_700_000_000,
            disconnected_at: None,
            extra: vec![7, 7],
            seq,
        }
    }

    fn checkpoint(slot: u64) -> Checkpoint {
        Checkpoint {
            cursor: Cursor {
                slot,
                signature: format!("sig-{slot}"),
            },
            tree: None,
        }
    }

    #[tokio::test]
    async fn test_restart_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror");

        let records = vec![record(0, 1), record(1, 2)];
        {
            let store = FileStore::open(&path).await.unwrap();
            assert_eq!(store.checkpoint().await.unwrap(), None);
            store.apply(records.clone(), checkpoint(42)).await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.checkpoint().await.unwrap(), Some(checkpoint(42)));
        assert_eq!(reopened.all().await.unwrap(), records);
        assert_eq!(reopened.stats().await.unwrap().records, 2);

        // Re-applying the last batch after a restart changes nothing.
        let stats = reopened.apply(records.clone(), checkpoint(42)).await.unwrap();
        assert_eq!(stats.ignored, 2);
        assert_eq!(reopened.all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_disconnect_replaces_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("mirror")).await.unwrap();

        let connected = record(0, 1);
        let mut disconnected = connected.clone();
        disconnected.disconnected_at = Some(1_700_000_100);
        disconnected.seq = 4;

        // both states in one batch, newest last, then the stale one again
        let stats = store
            .apply(
                vec![connected.clone(), disconnected.clone(), connected.clone()],
                checkpoint(1),
            )
            .await
            .unwrap();
        assert_eq!(
            stats,
            ApplyStats {
                inserted: 1,
                replaced: 1,
                ignored: 1,
            }
        );
        assert_eq!(store.get(0).await.unwrap(), Some(disconnected.clone()));
        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                records: 1,
                disconnected: 1,
            }
        );

        let by_from = RelationFilter {
            from: Some(connected.from),
            ..RelationFilter::default()
        };
        assert_eq!(store.find(&by_from).await.unwrap(), vec![disconnected]);
    }

    #[tokio::test]
    async fn test_find_pages_through_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("mirror")).await.unwrap();

        let alice = Pubkey::new_unique();
        let provider = Pubkey::new_unique();
        let mut records: Vec<RelationRecord> = (0..5).map(|i| record(i, u64::from(i) + 1)).collect();
        for r in records.iter_mut().filter(|r| r.leaf_index != 2) {
            r.from = alice;
        }
        records[3].provider = provider;
        store.apply(records.clone(), checkpoint(9)).await.unwrap();

        let page = RelationFilter {
            from: Some(alice),
            limit: 2,
            ..RelationFilter::default()
        };
        let first = store.find(&page).await.unwrap();
        assert_eq!(first.iter().map(|r| r.leaf_index).collect::<Vec<_>>(), vec![4, 3]);
        let second = store
            .find(&RelationFilter {
                after: Some(3),
                ..page.clone()
            })
            .await
            .unwrap();
        assert_eq!(second.iter().map(|r| r.leaf_index).collect::<Vec<_>>(), vec![1, 0]);

        let by_provider = RelationFilter {
            providers: vec![provider],
            ..RelationFilter::default()
        };
        assert_eq!(store.find(&by_provider).await.unwrap(), vec![records[3].clone()]);

        let to = RelationFilter {
            to: Some(records[2].to),
            ..RelationFilter::default()
        };
        assert_eq!(store.find(&to).await.unwrap(), vec![records[2].clone()]);

        let unfiltered = RelationFilter {
            after: Some(2),
            ..RelationFilter::default()
        };
        let below = store.find(&unfiltered).await.unwrap();
        assert_eq!(below.iter().map(|r| r.leaf_index).collect::<Vec<_>>(), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_rejects_unknown_layout_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror");
        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .meta
                .insert(VERSION_KEY, 9u32.to_be_bytes().as_slice())
                .unwrap();
        }
        assert!(matches!(
            FileStore::open(&path).await,
            Err(IndexerError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("mirror")).await.unwrap();
        store.meta.insert(CHECKPOINT_KEY, b"not json".as_slice()).unwrap();
        assert!(matches!(
            store.checkpoint().await,
            Err(IndexerError::Serialization(_))
        ));
    }
}
