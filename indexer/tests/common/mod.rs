#![allow(dead_code)]

use anchor_lang::prelude::Pubkey;
use graph::state::{ConcurrentMerkleTree, Node, TreeConfig};
use graph::{Relation, RelationChange, RelationEvent};
use sgraph_indexer::decode::invocation_logs;
use sgraph_indexer::proof::MirrorTree;
use sgraph_indexer::SourceTransaction;

/// Off-ledger stand-in for the graph program: a real commitment tree plus
/// the relations written into it, producing the events the program emits.
pub struct Ledger {
    pub tree_key: Pubkey,
    data: Vec<u8>,
    relations: Vec<Relation>,
    clock: i64,
    slot: u64,
}

impl Ledger {
    pub fn new() -> Self {
        let config = TreeConfig::GRAPH;
        let mut data = vec![0u8; config.space()];
        ConcurrentMerkleTree::initialize(&mut data[..], config, Pubkey::new_unique(), 0).unwrap();
        Self {
            tree_key: Pubkey::new_unique(),
            data,
            relations: Vec::new(),
            clock: 1_700_000_000,
            slot: 100,
        }
    }

    pub fn root(&self) -> Node {
        ConcurrentMerkleTree::load(&self.data[..]).unwrap().root()
    }

    pub fn add(&mut self, from: Pubkey, to: Pubkey, provider: Pubkey, extra: Vec<u8>) -> RelationEvent {
        self.clock += 1;
        let relation = Relation::new(from, to, provider, self.clock, extra);
        let mut tree = ConcurrentMerkleTree::load(&mut self.data[..]).unwrap();
        let leaf_index = tree.append(relation.leaf_hash()).unwrap();
        let event = RelationEvent {
            tree: self.tree_key,
            leaf_index,
            seq: tree.sequence_number(),
            root: tree.root(),
            change: RelationChange::Connected,
            relation: relation.clone(),
        };
        self.relations.push(relation);
        event
    }

    pub fn disconnect(&mut self, leaf_index: u32) -> RelationEvent {
        self.clock += 1;
        let mirror = MirrorTree::build(
            TreeConfig::GRAPH.max_depth,
            self.relations
                .iter()
                .enumerate()
                .map(|(i, r)| (i as u32, r.leaf_hash())),
        )
        .unwrap();
        let proof = mirror.proof(leaf_index).unwrap();

        let relation = &mut self.relations[leaf_index as usize];
        let previous = relation.leaf_hash();
        relation.disconnect(self.clock).unwrap();

        let mut tree = ConcurrentMerkleTree::load(&mut self.data[..]).unwrap();
        let root = tree.root();
        tree.set_leaf(root, previous, relation.leaf_hash(), &proof, leaf_index)
            .unwrap();
        RelationEvent {
            tree: self.tree_key,
            leaf_index,
            seq: tree.sequence_number(),
            root: tree.root(),
            change: RelationChange::Disconnected,
            relation: relation.clone(),
        }
    }

    /// Wrap `events` in the logs of one graph program invocation.
    pub fn transaction(&mut self, events: &[RelationEvent]) -> SourceTransaction {
        self.slot += 1;
        SourceTransaction {
            slot: self.slot,
            signature: format!("tx-{}", self.slot),
            logs: invocation_logs(&graph::ID, events),
        }
    }
}
