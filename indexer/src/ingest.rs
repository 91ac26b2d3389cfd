//! Change-log ingestion loop.
//!
//! The [`Processor`] pulls transactions from an [`EventSource`], decodes the
//! relation events they carry and applies them to a [`RelationStore`]
//! together with the cursor of the last transaction, so the store always
//! knows where to resume.
//!
//! A transaction whose logs were truncated by the runtime may have lost
//! events. The cursor never moves past one: the step applies what precedes
//! it and fails with [`IndexerError::LogTruncated`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anchor_lang::prelude::Pubkey;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::decode::{decode_transaction, logs_truncated};
use crate::error::{IndexerError, IndexerResult};
use crate::source::{EventSource, SourceTransaction};
use crate::store::{ApplyStats, RelationStore};
use crate::types::{Checkpoint, Cursor, RelationRecord, TreeState};

/// Slots behind the ledger still reported as up to date.
pub const DELAY_TOLERANCE: u64 = 250;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum transactions per step
    pub batch_size: usize,
    /// Wait before polling again once caught up or after an error
    pub poll_interval: Duration,
    pub report_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_millis(1000),
            report_interval: Duration::from_secs(30),
        }
    }
}

/// How far ingestion trails the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LagStatus {
    /// Processed slot is ahead of the reported latest slot
    Unknown,
    UpToDate { behind: u64 },
    CatchingUp { behind: u64 },
    Stalled { behind: u64 },
}

impl LagStatus {
    /// `rate` is processed slots per second since the previous report.
    pub fn evaluate(latest_slot: u64, processed_slot: u64, rate: f64) -> Self {
        let Some(behind) = latest_slot.checked_sub(processed_slot) else {
            return LagStatus::Unknown;
        };
        if behind < DELAY_TOLERANCE {
            LagStatus::UpToDate { behind }
        } else if rate > 1.0 {
            LagStatus::CatchingUp { behind }
        } else {
            LagStatus::Stalled { behind }
        }
    }
}

impl fmt::Display for LagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LagStatus::Unknown => write!(f, "UNKNOWN"),
            LagStatus::UpToDate { behind } => write!(f, "UP-TO-DATE ({behind} slots behind)"),
            LagStatus::CatchingUp { behind } => write!(f, "CATCHING UP ({behind} slots behind)"),
            LagStatus::Stalled { behind } => write!(f, "STALLED!!! ({behind} slots behind)"),
        }
    }
}

/// Ingestion progress as served by `sg_status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub cursor: Option<Cursor>,
    pub tree: Option<TreeState>,
    pub latest_slot: Option<u64>,
    /// Processed slots per second over the last report window
    pub rate: f64,
    pub status: String,
    pub events_applied: u64,
    pub events_skipped: u64,
}

/// Shared view of [`StatusSnapshot`]; clones observe the same status.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn get(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        f(&mut self.inner.write());
    }
}

/// Result of one [`Processor::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub transactions: usize,
    pub events: usize,
    pub skipped: usize,
    pub stats: ApplyStats,
}

struct ReportWindow {
    started: Instant,
    slot: u64,
}

pub struct Processor {
    source: Arc<dyn EventSource>,
    store: Arc<dyn RelationStore>,
    program_id: Pubkey,
    config: IngestConfig,
    status: StatusHandle,
}

impl Processor {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn RelationStore>,
        program_id: Pubkey,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            store,
            program_id,
            config,
            status: StatusHandle::default(),
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Fetch, decode and apply one batch.
    pub async fn step(&self) -> IndexerResult<StepOutcome> {
        let checkpoint = self.store.checkpoint().await?;
        let batch = self
            .source
            .fetch(
                checkpoint.as_ref().map(|c| &c.cursor),
                self.config.batch_size,
            )
            .await?;
        let cut = batch.iter().position(|tx| logs_truncated(&tx.logs));
        let usable = &batch[..cut.unwrap_or(batch.len())];
        let truncated = cut.map(|i| &batch[i]);
        let Some(last) = usable.last() else {
            if let Some(checkpoint) = checkpoint {
                self.status.update(|s| {
                    s.cursor = Some(checkpoint.cursor);
                    s.tree = checkpoint.tree;
                });
            }
            return match truncated {
                Some(tx) => Err(truncated_error(tx)),
                None => Ok(StepOutcome::default()),
            };
        };

        let mut tree = checkpoint.and_then(|c| c.tree);
        let mut records = Vec::new();
        let mut skipped = 0;
        for tx in usable {
            for decoded in decode_transaction(tx, &self.program_id) {
                match decoded {
                    Ok(event) => {
                        if tree.map_or(true, |t| event.seq > t.seq) {
                            tree = Some(TreeState {
                                seq: event.seq,
                                root: event.root,
                            });
                        }
                        records.push(RelationRecord::from_event(&event));
                    }
                    Err(e) => {
                        warn!(slot = tx.slot, signature = %tx.signature, error = %e, "skipping malformed event");
                        skipped += 1;
                    }
                }
            }
        }

        let events = records.len();
        let cursor = last.cursor();
        let stats = self
            .store
            .apply(
                records,
                Checkpoint {
                    cursor: cursor.clone(),
                    tree,
                },
            )
            .await?;

        debug!(
            transactions = usable.len(),
            events,
            skipped,
            inserted = stats.inserted,
            replaced = stats.replaced,
            ignored = stats.ignored,
            slot = cursor.slot,
            "applied batch"
        );

        self.status.update(|s| {
            s.cursor = Some(cursor);
            s.tree = tree;
            s.events_applied += events as u64;
            s.events_skipped += skipped as u64;
        });

        if let Some(tx) = truncated {
            return Err(truncated_error(tx));
        }
        Ok(StepOutcome {
            transactions: usable.len(),
            events,
            skipped,
            stats,
        })
    }

    /// Ingest until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(program = %self.program_id, batch_size = self.config.batch_size, "ingestion started");
        let mut window = self.resume().await;

        while !*shutdown.borrow() {
            let idle = match self.step().await {
                Ok(outcome) => outcome.transactions == 0,
                Err(e) => {
                    error!(error = %e, "ingestion step failed");
                    true
                }
            };

            if window.started.elapsed() >= self.config.report_interval {
                self.report(&mut window).await;
            }

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("ingestion stopped");
    }

    /// Seed the status and the first report window from the durable
    /// checkpoint, so the first rate reflects this run only.
    async fn resume(&self) -> ReportWindow {
        let checkpoint = match self.store.checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!(error = %e, "read checkpoint");
                None
            }
        };
        if let Some(checkpoint) = &checkpoint {
            info!(slot = checkpoint.cursor.slot, signature = %checkpoint.cursor.signature, "resuming");
            self.status.update(|s| {
                s.cursor = Some(checkpoint.cursor.clone());
                s.tree = checkpoint.tree;
            });
        }
        ReportWindow {
            started: Instant::now(),
            slot: checkpoint.map_or(0, |c| c.cursor.slot),
        }
    }

    fn processed_slot(&self) -> u64 {
        self.status.get().cursor.map_or(0, |c| c.slot)
    }

    async fn report(&self, window: &mut ReportWindow) {
        let latest = match self.source.latest_slot().await {
            Ok(slot) => slot,
            Err(e) => {
                error!(error = %e, "fetch latest slot");
                return;
            }
        };

        let processed = self.processed_slot();
        let elapsed = window.started.elapsed().as_secs_f64();
        let gained = processed.saturating_sub(window.slot);
        let rate = if elapsed > 0.0 {
            gained as f64 / elapsed
        } else {
            0.0
        };
        let lag = LagStatus::evaluate(latest, processed, rate);

        info!(
            "{gained} new slots since {elapsed:.1}s; rate = {rate:.2} slots/s; status = [{lag}]"
        );
        self.status.update(|s| {
            s.latest_slot = Some(latest);
            s.rate = rate;
            s.status = lag.to_string();
        });

        window.started = Instant::now();
        window.slot = processed;
    }
}

fn truncated_error(tx: &SourceTransaction) -> IndexerError {
    IndexerError::LogTruncated {
        slot: tx.slot,
        signature: tx.signature.clone(),
    }
}
