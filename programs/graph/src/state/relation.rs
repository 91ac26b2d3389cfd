use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::state::merkle::{hash_leaf_parts, Node};

/// Leaf encoding version, first byte of every leaf preimage.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LeafType {
    Unknown = 0,
    RelationV1 = 1,
}

/// Directed edge `from -> to` published by `provider`.
///
/// Relations live only as tree leaves and in the change log; nothing stores
/// them in an account. Disconnecting rewrites the same leaf.
#[account]
#[derive(Debug, PartialEq, Eq)]
pub struct Relation {
    pub from: Pubkey,
    pub to: Pubkey,
    pub provider: Pubkey,
    pub connected_at: i64,
    pub disconnected_at: Option<i64>,
    /// Opaque provider payload
    pub extra: Vec<u8>,
}

impl Relation {
    pub fn new(from: Pubkey, to: Pubkey, provider: Pubkey, connected_at: i64, extra: Vec<u8>) -> Self {
        Self {
            from,
            to,
            provider,
            connected_at,
            disconnected_at: None,
            extra,
        }
    }

    pub fn is_active(&self) -> bool {
        self.disconnected_at.is_none()
    }

    /// Leaf committed to the tree for this relation.
    pub fn leaf_hash(&self) -> Node {
        let version = [LeafType::RelationV1 as u8];
        let connected_at = self.connected_at.to_le_bytes();
        let has_disconnect = [u8::from(self.disconnected_at.is_some())];
        let disconnected_at = self.disconnected_at.unwrap_or(0).to_le_bytes();
        hash_leaf_parts(&[
            version.as_ref(),
            self.from.as_ref(),
            self.to.as_ref(),
            self.provider.as_ref(),
            connected_at.as_ref(),
            has_disconnect.as_ref(),
            disconnected_at.as_ref(),
            self.extra.as_ref(),
        ])
    }

    pub fn disconnect(&mut self, now: i64) -> Result<()> {
        require!(self.is_active(), GraphError::AlreadyDisconnected);
        self.disconnected_at = Some(now);
        Ok(())
    }
}
