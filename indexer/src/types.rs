//! Mirror records and their JSON wire form.
//!
//! Keys and hashes are base58 strings, `extra` is base64 and timestamps are
//! unix seconds. The same shapes are used on the JSON-RPC wire and in the
//! file store records.

use anchor_lang::prelude::Pubkey;
use graph::state::Node;
use graph::{Relation, RelationEvent};
use serde::{Deserialize, Serialize};

/// One relation as mirrored from the change log, keyed by its leaf index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationRecord {
    pub leaf_index: u32,
    #[serde(with = "pubkey_string")]
    pub from: Pubkey,
    #[serde(with = "pubkey_string")]
    pub to: Pubkey,
    #[serde(with = "pubkey_string")]
    pub provider: Pubkey,
    pub connected_at: i64,
    pub disconnected_at: Option<i64>,
    #[serde(with = "base64_bytes")]
    pub extra: Vec<u8>,
    /// Tree sequence number of the mutation that produced this state
    pub seq: u64,
}

impl RelationRecord {
    pub fn from_event(event: &RelationEvent) -> Self {
        let relation = &event.relation;
        Self {
            leaf_index: event.leaf_index,
            from: relation.from,
            to: relation.to,
            provider: relation.provider,
            connected_at: relation.connected_at,
            disconnected_at: relation.disconnected_at,
            extra: relation.extra.clone(),
            seq: event.seq,
        }
    }

    /// Ordering key for last-write-wins. A disconnected state always beats
    /// a connected one; otherwise the later tree mutation wins.
    pub fn recency(&self) -> (bool, u64) {
        (self.disconnected_at.is_some(), self.seq)
    }

    pub fn to_relation(&self) -> Relation {
        Relation {
            from: self.from,
            to: self.to,
            provider: self.provider,
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
            extra: self.extra.clone(),
        }
    }

    pub fn leaf_hash(&self) -> Node {
        self.to_relation().leaf_hash()
    }
}

/// Position in the source stream: the last transaction fully applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub slot: u64,
    pub signature: String,
}

/// Latest tree state seen in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeState {
    pub seq: u64,
    #[serde(with = "hash_string")]
    pub root: Node,
}

/// Durable ingestion progress, stored together with the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub cursor: Cursor,
    pub tree: Option<TreeState>,
}

/// Base58 rendering of a 32-byte hash, as ledger tooling prints them.
pub fn encode_hash(node: &Node) -> String {
    anchor_lang::solana_program::hash::Hash::new_from_array(*node).to_string()
}

pub mod pubkey_string {
    use std::str::FromStr;

    use anchor_lang::prelude::Pubkey;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(D::Error::custom)
    }
}

pub mod hash_string {
    use std::str::FromStr;

    use anchor_lang::solana_program::hash::Hash;
    use graph::state::Node;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(node: &Node, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&Hash::new_from_array(*node))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Node, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_str(&s)
            .map(|hash| hash.to_bytes())
            .map_err(D::Error::custom)
    }
}

pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(D::Error::custom)
    }
}
