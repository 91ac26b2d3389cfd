use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{IndexerError, IndexerResult};
use crate::source::{EventSource, SourceTransaction};
use crate::types::Cursor;

/// In-memory transaction stream. Clones share the same stream.
#[derive(Clone, Default)]
pub struct MemorySource {
    transactions: Arc<RwLock<Vec<SourceTransaction>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tx: SourceTransaction) {
        self.transactions.write().push(tx);
    }

    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}

#[async_trait]
impl EventSource for MemorySource {
    async fn fetch(
        &self,
        after: Option<&Cursor>,
        limit: usize,
    ) -> IndexerResult<Vec<SourceTransaction>> {
        let transactions = self.transactions.read();
        let start = match after {
            None => 0,
            Some(cursor) => {
                transactions
                    .iter()
                    .position(|tx| tx.signature == cursor.signature)
                    .ok_or_else(|| {
                        IndexerError::source_error(format!(
                            "unknown cursor signature {}",
                            cursor.signature
                        ))
                    })?
                    + 1
            }
        };
        Ok(transactions.iter().skip(start).take(limit).cloned().collect())
    }

    async fn latest_slot(&self) -> IndexerResult<u64> {
        Ok(self
            .transactions
            .read()
            .last()
            .map(|tx| tx.slot)
            .unwrap_or(0))
    }
}
