use anchor_lang::prelude::*;

use crate::state::Relation;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationChange {
    Connected,
    Disconnected,
}

/// Change log entry: the full leaf payload of every tree mutation, so
/// observers can rebuild relations without holding the tree.
#[event]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEvent {
    pub tree: Pubkey,
    pub leaf_index: u32,
    /// Tree sequence number after the mutation
    pub seq: u64,
    /// Tree root after the mutation
    pub root: [u8; 32],
    pub change: RelationChange,
    pub relation: Relation,
}
