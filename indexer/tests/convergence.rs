//! Replaying the change log in any order that keeps each leaf's own
//! history in order yields the same mirror.

mod common;

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use graph::RelationEvent;
use sgraph_indexer::{
    IngestConfig, MemorySource, MemoryStore, Processor, RelationRecord, RelationStore,
};

use common::Ledger;

/// Connect six relations and disconnect three of them, one event per
/// transaction.
fn history() -> Vec<RelationEvent> {
    let mut ledger = Ledger::new();
    let provider = Pubkey::new_unique();
    let mut events = Vec::new();
    for i in 0..6u8 {
        events.push(ledger.add(
            Pubkey::new_from_array([i; 32]),
            Pubkey::new_from_array([i + 100; 32]),
            provider,
            vec![i],
        ));
    }
    for leaf in [4, 1, 5] {
        events.push(ledger.disconnect(leaf));
    }
    events
}

async fn mirror_of(events: &[RelationEvent]) -> Vec<RelationRecord> {
    let mut ledger = Ledger::new();
    let source = MemorySource::new();
    for event in events {
        source.push(ledger.transaction(std::slice::from_ref(event)));
    }
    let store = MemoryStore::new();
    let processor = Processor::new(
        Arc::new(source),
        Arc::new(store.clone()),
        graph::ID,
        IngestConfig {
            batch_size: 4,
            ..IngestConfig::default()
        },
    );
    while processor.step().await.unwrap().transactions > 0 {}
    store.all().await.unwrap()
}

/// Stable reorder by a key, keeping relative order inside each leaf.
fn grouped_by_leaf(events: &[RelationEvent], descending: bool) -> Vec<RelationEvent> {
    let mut out = events.to_vec();
    out.sort_by_key(|e| {
        if descending {
            u32::MAX - e.leaf_index
        } else {
            e.leaf_index
        }
    });
    out
}

/// Deterministic interleaving: repeatedly take the head of a per-leaf
/// queue chosen by a small LCG.
fn interleaved(events: &[RelationEvent], mut state: u64) -> Vec<RelationEvent> {
    let mut queues: Vec<Vec<RelationEvent>> = Vec::new();
    for event in events {
        let leaf = event.leaf_index as usize;
        if queues.len() <= leaf {
            queues.resize(leaf + 1, Vec::new());
        }
        queues[leaf].push(event.clone());
    }
    for queue in &mut queues {
        queue.reverse();
    }

    let mut out = Vec::new();
    while queues.iter().any(|q| !q.is_empty()) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let live: Vec<usize> = (0..queues.len()).filter(|&i| !queues[i].is_empty()).collect();
        let pick = live[(state >> 33) as usize % live.len()];
        if let Some(event) = queues[pick].pop() {
            out.push(event);
        }
    }
    out
}

#[tokio::test]
async fn reorderings_preserving_leaf_history_converge() {
    let events = history();
    let expected = mirror_of(&events).await;
    assert_eq!(expected.len(), 6);
    assert_eq!(
        expected.iter().filter(|r| r.disconnected_at.is_some()).count(),
        3
    );

    let mut orderings = vec![
        grouped_by_leaf(&events, false),
        grouped_by_leaf(&events, true),
    ];
    for seed in [1, 7, 42, 1234] {
        orderings.push(interleaved(&events, seed));
    }
    for ordering in orderings {
        assert_eq!(mirror_of(&ordering).await, expected);
    }
}

#[tokio::test]
async fn replayed_stream_converges() {
    let events = history();
    let expected = mirror_of(&events).await;

    let mut doubled = events.clone();
    doubled.extend(events.iter().cloned());
    assert_eq!(mirror_of(&doubled).await, expected);
}

#[tokio::test]
async fn late_connect_does_not_undo_disconnect() {
    let events = history();
    let expected = mirror_of(&events).await;

    // Every disconnect delivered before any connect.
    let mut reversed = events.clone();
    reversed.reverse();
    assert_eq!(mirror_of(&reversed).await, expected);
}
