//! Commitment tree reconstruction from mirrored leaves.
//!
//! Relations are appended left to right, so the mirror's leaf hashes form a
//! dense prefix of the tree. Each level is kept as a vector covering that
//! prefix; everything to the right is an empty subtree. A mirror with a hole
//! in that prefix cannot reproduce the ledger's root and is rejected.

use graph::state::{empty_nodes, hash_nodes, Node, MAX_SUPPORTED_DEPTH};

use crate::error::{IndexerError, IndexerResult};
use crate::types::RelationRecord;

pub struct MirrorTree {
    depth: u32,
    empties: Vec<Node>,
    levels: Vec<Vec<Node>>,
}

impl MirrorTree {
    /// Build a tree of `depth` from `(leaf_index, leaf_hash)` pairs, which
    /// must cover `0..n` in ascending order.
    pub fn build(
        depth: u32,
        leaves: impl IntoIterator<Item = (u32, Node)>,
    ) -> IndexerResult<Self> {
        if depth == 0 || depth > MAX_SUPPORTED_DEPTH {
            return Err(IndexerError::Config {
                message: format!("unsupported tree depth {depth}"),
            });
        }
        let empties = empty_nodes(depth);
        let capacity = 1u64 << depth;

        let mut bottom: Vec<Node> = Vec::new();
        for (index, hash) in leaves {
            if u64::from(index) >= capacity {
                return Err(IndexerError::InvalidParams {
                    message: format!("leaf {index} outside a depth {depth} tree"),
                });
            }
            if index as usize != bottom.len() {
                return Err(IndexerError::inconsistent(format!(
                    "expected leaf {}, found leaf {index}",
                    bottom.len()
                )));
            }
            bottom.push(hash);
        }

        let mut levels = Vec::with_capacity(depth as usize + 1);
        levels.push(bottom);
        for level in 0..depth as usize {
            let parents = levels[level]
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&empties[level]);
                    hash_nodes(&pair[0], right)
                })
                .collect();
            levels.push(parents);
        }

        Ok(Self {
            depth,
            empties,
            levels,
        })
    }

    /// Build from mirrored records, ascending by leaf index.
    pub fn from_records(depth: u32, records: &[RelationRecord]) -> IndexerResult<Self> {
        Self::build(
            depth,
            records.iter().map(|record| (record.leaf_index, record.leaf_hash())),
        )
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of leaves written.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn leaf(&self, index: u32) -> Node {
        self.node(0, index as usize)
    }

    pub fn root(&self) -> Node {
        self.node(self.depth as usize, 0)
    }

    /// Full-depth sibling path for `index`, leaf level first.
    pub fn proof(&self, index: u32) -> IndexerResult<Vec<Node>> {
        if u64::from(index) >= 1u64 << self.depth {
            return Err(IndexerError::InvalidParams {
                message: format!("leaf {index} outside a depth {} tree", self.depth),
            });
        }
        Ok((0..self.depth as usize)
            .map(|level| self.node(level, ((index as usize) >> level) ^ 1))
            .collect())
    }

    fn node(&self, level: usize, position: usize) -> Node {
        self.levels[level]
            .get(position)
            .copied()
            .unwrap_or(self.empties[level])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::prelude::Pubkey;
    use graph::state::{hash_leaf, verify_proof, ConcurrentMerkleTree, TreeConfig};

    const CONFIG: TreeConfig = TreeConfig {
        max_depth: 5,
        max_buffer_size: 8,
        canopy_depth: 0,
    };

    fn leaf(i: u32) -> Node {
        hash_leaf(&i.to_le_bytes())
    }

    #[test]
    fn test_empty_tree_root() {
        let tree = MirrorTree::build(5, std::iter::empty()).unwrap();
        assert_eq!(tree.root(), empty_nodes(5)[5]);
    }

    #[test]
    fn test_matches_onchain_tree() {
        let mut data = vec![0u8; CONFIG.space()];
        let mut onchain =
            ConcurrentMerkleTree::initialize(&mut data[..], CONFIG, Pubkey::new_unique(), 0)
                .unwrap();

        let mut leaves = Vec::new();
        for i in 0..11 {
            onchain.append(leaf(i)).unwrap();
            leaves.push((i, leaf(i)));
        }
        let mirror = MirrorTree::build(5, leaves.clone()).unwrap();
        assert_eq!(mirror.root(), onchain.root());

        // Replace leaf 3 on-ledger with a proof from the mirror.
        let proof = mirror.proof(3).unwrap();
        let root = onchain.root();
        onchain.set_leaf(root, leaf(3), leaf(100), &proof, 3).unwrap();
        leaves[3].1 = leaf(100);
        let mirror = MirrorTree::build(5, leaves).unwrap();
        assert_eq!(mirror.root(), onchain.root());
    }

    #[test]
    fn test_proofs_verify() {
        let leaves: Vec<(u32, Node)> = (0..7).map(|i| (i, leaf(i))).collect();
        let tree = MirrorTree::build(4, leaves.clone()).unwrap();
        for (index, hash) in leaves {
            let proof = tree.proof(index).unwrap();
            assert_eq!(proof.len(), 4);
            assert!(verify_proof(&proof, &tree.root(), &hash, index));
        }
        // Unused slot proves the empty leaf.
        let proof = tree.proof(12).unwrap();
        assert!(verify_proof(&proof, &tree.root(), &empty_nodes(0)[0], 12));
    }

    #[test]
    fn test_rejects_gaps() {
        let gap = MirrorTree::build(4, [(0, leaf(0)), (2, leaf(2))]);
        assert!(matches!(gap, Err(IndexerError::Inconsistent { .. })));
        let unordered = MirrorTree::build(4, [(1, leaf(1)), (0, leaf(0))]);
        assert!(matches!(unordered, Err(IndexerError::Inconsistent { .. })));

        let dense = MirrorTree::build(4, (0..3).map(|i| (i, leaf(i)))).unwrap();
        assert_eq!(dense.len(), 3);
        assert_eq!(dense.leaf(2), leaf(2));
        assert_eq!(dense.leaf(3), empty_nodes(0)[0]);
    }

    #[test]
    fn test_out_of_range() {
        let full: Vec<(u32, Node)> = (0..9).map(|i| (i, leaf(i))).collect();
        assert!(matches!(
            MirrorTree::build(3, full),
            Err(IndexerError::InvalidParams { .. })
        ));
        let tree = MirrorTree::build(3, [(0, leaf(0))]).unwrap();
        assert!(tree.proof(8).is_err());
        assert!(MirrorTree::build(0, std::iter::empty()).is_err());
    }
}
