//! Concurrent Merkle tree stored in a raw, program-owned account.
//!
//! Writers may submit proofs built against any of the last
//! `max_buffer_size` roots. Every mutation records its root and the new
//! path in a changelog ring; a proof against an older root is brought up to
//! date by replaying the changelog entries written after it. Appends never
//! need a caller proof: the tree keeps a proof for its rightmost leaf.
//!
//! Account layout:
//!
//! ```text
//! header      TreeHeader::SPACE bytes (borsh, zero padded)
//! changelog   max_buffer_size x (root | path[depth] | index u32 | reserved u32)
//! rightmost   proof[depth] | leaf | next index u32 | reserved u32
//! canopy      (2^(canopy_depth + 1) - 2) nodes, top levels below the root
//! ```

use std::ops::{Deref, DerefMut};

use anchor_lang::prelude::*;

use crate::errors::GraphError;
use crate::state::merkle::{compute_root, empty_nodes, hash_to_parent, Node, EMPTY_NODE};

const NODE_SIZE: usize = 32;
const INDEX_SIZE: usize = 8; // u32 index + u32 reserved

/// Leaf indices are `u32`, so depth stays below 32.
pub const MAX_SUPPORTED_DEPTH: u32 = 30;

/// Sizing parameters, fixed when the tree is bound.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeConfig {
    /// Capacity is `2^max_depth` leaves.
    pub max_depth: u32,
    /// Number of recent roots a proof may be built against.
    pub max_buffer_size: u32,
    /// Upper levels cached on-ledger; callers may omit that many proof nodes.
    pub canopy_depth: u32,
}

impl TreeConfig {
    /// Sizing every graph tree is bound with.
    pub const GRAPH: TreeConfig = TreeConfig {
        max_depth: 30,          // ~1 billion relations
        max_buffer_size: 2048,
        canopy_depth: 15,
    };

    pub fn validate(&self) -> Result<()> {
        require!(
            self.max_depth > 0 && self.max_depth <= MAX_SUPPORTED_DEPTH,
            GraphError::InvalidTreeConfig
        );
        require!(self.max_buffer_size > 0, GraphError::InvalidTreeConfig);
        require!(
            self.canopy_depth < self.max_depth,
            GraphError::InvalidTreeConfig
        );
        Ok(())
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.max_depth
    }

    /// Shortest proof accepted from callers.
    pub fn min_proof_len(&self) -> usize {
        (self.max_depth - self.canopy_depth) as usize
    }

    fn depth(&self) -> usize {
        self.max_depth as usize
    }

    fn changelog_size(&self) -> usize {
        NODE_SIZE * (1 + self.depth()) + INDEX_SIZE
    }

    fn rightmost_size(&self) -> usize {
        NODE_SIZE * (self.depth() + 1) + INDEX_SIZE
    }

    fn canopy_len(&self) -> usize {
        (1usize << (self.canopy_depth + 1)) - 2
    }

    /// Exact account size for a tree with this configuration.
    pub fn space(&self) -> usize {
        TreeHeader::SPACE
            + self.max_buffer_size as usize * self.changelog_size()
            + self.rightmost_size()
            + self.canopy_len() * NODE_SIZE
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeHeader {
    pub config: TreeConfig,
    /// Controller allowed to mutate the tree
    pub authority: Pubkey,
    pub creation_slot: u64,
    /// Number of mutations applied since creation
    pub sequence_number: u64,
    /// Changelog slot holding the current root
    pub active_index: u64,
    /// Number of valid changelog entries
    pub buffer_size: u64,
}

impl TreeHeader {
    pub const SPACE: usize = 128;

    pub fn is_initialized(&self) -> bool {
        self.config.max_depth != 0
    }
}

fn read_header(data: &[u8]) -> Result<TreeHeader> {
    require!(
        data.len() >= TreeHeader::SPACE,
        GraphError::InvalidTreeAccount
    );
    TreeHeader::deserialize(&mut &data[..TreeHeader::SPACE])
        .map_err(|_| error!(GraphError::TreeNotInitialized))
}

/// Full-depth proof checked against the root at sequence number `seq`.
/// Only [`ConcurrentMerkleTree::verify_leaf`] produces one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafProof {
    index: u32,
    seq: u64,
    nodes: Vec<Node>,
}

impl LeafProof {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// View over tree account data. `D` is `&[u8]` for read-only use and
/// `&mut [u8]` for mutation.
pub struct ConcurrentMerkleTree<D> {
    header: TreeHeader,
    data: D,
}

impl<D: Deref<Target = [u8]>> ConcurrentMerkleTree<D> {
    pub fn load(data: D) -> Result<Self> {
        let header = read_header(&data)?;
        require!(header.is_initialized(), GraphError::TreeNotInitialized);
        require!(
            data.len() == header.config.space(),
            GraphError::InvalidTreeAccount
        );
        Ok(Self { header, data })
    }

    pub fn header(&self) -> &TreeHeader {
        &self.header
    }

    pub fn root(&self) -> Node {
        self.changelog_root(self.header.active_index as usize)
    }

    pub fn sequence_number(&self) -> u64 {
        self.header.sequence_number
    }

    /// Number of leaves appended so far; also the index of the next append.
    pub fn num_leaves(&self) -> u32 {
        self.read_u32(self.rightmost_offset() + NODE_SIZE * (self.depth() + 1))
    }

    /// Check that `leaf` sits at `index` without mutating the tree. The
    /// returned proof is valid against the current root and can be handed
    /// to [`replace_leaf`](Self::replace_leaf).
    pub fn verify_leaf(
        &self,
        root: Node,
        leaf: Node,
        proof: &[Node],
        index: u32,
    ) -> Result<LeafProof> {
        let nodes = self.fast_forward_proof(&root, &leaf, proof, index)?;
        Ok(LeafProof {
            index,
            seq: self.sequence_number(),
            nodes,
        })
    }

    fn fast_forward_proof(
        &self,
        root: &Node,
        leaf: &Node,
        proof: &[Node],
        index: u32,
    ) -> Result<Vec<Node>> {
        require!(
            index < self.num_leaves(),
            GraphError::LeafIndexOutOfBounds
        );
        let mut proof = self.fill_proof(proof, index)?;
        let steps = self
            .find_root(root)
            .ok_or_else(|| error!(GraphError::StaleProof))?;

        let max = self.max_buffer();
        let active = self.header.active_index as usize;
        let mut latest_leaf = None;
        for step in (0..steps).rev() {
            let slot = (active + max - step) % max;
            let changed = self.changelog_index(slot);
            if changed == index {
                latest_leaf = Some(self.changelog_path_node(slot, 0));
                continue;
            }
            let critbit = (31 - (index ^ changed).leading_zeros()) as usize;
            proof[critbit] = self.changelog_path_node(slot, critbit);
        }

        if let Some(latest) = latest_leaf {
            require!(latest == *leaf, GraphError::InvalidProof);
        }
        require!(
            compute_root(&proof, leaf, index) == self.root(),
            GraphError::InvalidProof
        );

        Ok(proof)
    }

    /// Number of changelog entries written after `root`, if it is still
    /// in the buffer.
    fn find_root(&self, root: &Node) -> Option<usize> {
        let max = self.max_buffer();
        let active = self.header.active_index as usize;
        (0..self.header.buffer_size as usize)
            .find(|step| self.changelog_root((active + max - step) % max) == *root)
    }

    fn fill_proof(&self, proof: &[Node], index: u32) -> Result<Vec<Node>> {
        let depth = self.depth();
        require!(
            proof.len() <= depth && proof.len() >= self.header.config.min_proof_len(),
            GraphError::InvalidProof
        );

        let mut full = Vec::with_capacity(depth);
        full.extend_from_slice(proof);
        if full.len() < depth {
            let empties = empty_nodes(self.header.config.max_depth);
            for level in full.len()..depth {
                let sibling = ((index >> level) ^ 1) as usize;
                let cached = self.read_node(self.canopy_offset(level, sibling));
                full.push(if cached == EMPTY_NODE {
                    empties[level]
                } else {
                    cached
                });
            }
        }
        Ok(full)
    }

    // ----- layout -----

    fn depth(&self) -> usize {
        self.header.config.depth()
    }

    fn max_buffer(&self) -> usize {
        self.header.config.max_buffer_size as usize
    }

    fn changelog_offset(&self, slot: usize) -> usize {
        TreeHeader::SPACE + slot * self.header.config.changelog_size()
    }

    fn rightmost_offset(&self) -> usize {
        self.changelog_offset(self.max_buffer())
    }

    fn canopy_offset(&self, level: usize, position: usize) -> usize {
        let from_root = self.depth() - level;
        let base = self.rightmost_offset() + self.header.config.rightmost_size();
        base + ((1usize << from_root) - 2 + position) * NODE_SIZE
    }

    fn changelog_root(&self, slot: usize) -> Node {
        self.read_node(self.changelog_offset(slot))
    }

    fn changelog_path_node(&self, slot: usize, level: usize) -> Node {
        self.read_node(self.changelog_offset(slot) + NODE_SIZE * (1 + level))
    }

    fn changelog_index(&self, slot: usize) -> u32 {
        self.read_u32(self.changelog_offset(slot) + NODE_SIZE * (1 + self.depth()))
    }

    fn rightmost_proof(&self) -> Vec<Node> {
        let base = self.rightmost_offset();
        (0..self.depth())
            .map(|level| self.read_node(base + NODE_SIZE * level))
            .collect()
    }

    fn rightmost_leaf(&self) -> Node {
        self.read_node(self.rightmost_offset() + NODE_SIZE * self.depth())
    }

    fn read_node(&self, offset: usize) -> Node {
        let mut node = EMPTY_NODE;
        node.copy_from_slice(&self.data[offset..offset + NODE_SIZE]);
        node
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }
}

impl<D: DerefMut<Target = [u8]>> ConcurrentMerkleTree<D> {
    /// Lay out an empty tree over account data of exactly `config.space()`
    /// bytes.
    pub fn initialize(
        mut data: D,
        config: TreeConfig,
        authority: Pubkey,
        creation_slot: u64,
    ) -> Result<Self> {
        config.validate()?;
        require!(
            data.len() == config.space(),
            GraphError::InvalidTreeAccount
        );
        require!(
            !read_header(&data)?.is_initialized(),
            GraphError::AlreadyBound
        );

        data.fill(0);
        let header = TreeHeader {
            config,
            authority,
            creation_slot,
            sequence_number: 0,
            active_index: 0,
            buffer_size: 1,
        };
        let mut tree = Self { header, data };

        let depth = config.depth();
        let empties = empty_nodes(config.max_depth);
        tree.write_changelog(0, &empties[depth], &empties[..depth], 0);
        tree.write_rightmost(&empties[..depth], &EMPTY_NODE, 0);
        tree.flush_header()?;

        Ok(tree)
    }

    /// Append `leaf` at the next free index and return that index.
    pub fn append(&mut self, leaf: Node) -> Result<u32> {
        let index = self.num_leaves();
        require!(
            u64::from(index) < self.header.config.capacity(),
            GraphError::TreeFull
        );

        let mut proof = self.rightmost_proof();
        if index > 0 {
            // Below the lowest set bit of `index` the new leaf only has
            // empty siblings; at that bit its sibling is the subtree ending
            // with the previous leaf.
            let previous = index - 1;
            let intersection = index.trailing_zeros() as usize;
            let empties = empty_nodes(intersection as u32);
            let mut node = self.rightmost_leaf();
            for level in 0..intersection {
                let is_left = (previous >> level) & 1 == 0;
                node = hash_to_parent(&node, &proof[level], is_left);
                proof[level] = empties[level];
            }
            proof[intersection] = node;
        }

        self.apply_change(&leaf, &proof, index)?;
        self.write_rightmost(&proof, &leaf, index + 1);

        Ok(index)
    }

    /// Replace `previous_leaf` at `index` by `new_leaf`.
    ///
    /// `proof` is built against `root`, which may be any root still held in
    /// the changelog buffer, and may omit the nodes covered by the canopy.
    /// Returns the new root.
    pub fn set_leaf(
        &mut self,
        root: Node,
        previous_leaf: Node,
        new_leaf: Node,
        proof: &[Node],
        index: u32,
    ) -> Result<Node> {
        let proof = self.verify_leaf(root, previous_leaf, proof, index)?;
        self.replace_leaf(proof, new_leaf)
    }

    /// Write `new_leaf` at the index `proof` was verified for. The proof
    /// must have been produced at the current sequence number.
    pub fn replace_leaf(&mut self, proof: LeafProof, new_leaf: Node) -> Result<Node> {
        require!(
            proof.seq == self.sequence_number(),
            GraphError::StaleProof
        );
        let path = self.apply_change(&new_leaf, &proof.nodes, proof.index)?;
        self.update_rightmost_proof(&new_leaf, &path, proof.index);
        Ok(self.root())
    }

    /// Write a changelog entry for `leaf` at `index` and advance the
    /// header. Returns the new path, leaf first.
    fn apply_change(&mut self, leaf: &Node, proof: &[Node], index: u32) -> Result<Vec<Node>> {
        let mut path = Vec::with_capacity(proof.len());
        let mut node = *leaf;
        for (level, sibling) in proof.iter().enumerate() {
            path.push(node);
            node = hash_to_parent(&node, sibling, (index >> level) & 1 == 0);
        }

        let max = u64::from(self.header.config.max_buffer_size);
        let slot = (self.header.active_index + 1) % max;
        self.write_changelog(slot as usize, &node, &path, index);
        self.write_canopy(&path, index);

        self.header.active_index = slot;
        self.header.buffer_size = (self.header.buffer_size + 1).min(max);
        self.header.sequence_number = self
            .header
            .sequence_number
            .checked_add(1)
            .ok_or_else(|| error!(GraphError::Overflow))?;
        self.flush_header()?;

        Ok(path)
    }

    fn update_rightmost_proof(&mut self, leaf: &Node, path: &[Node], index: u32) {
        // set_leaf only touches appended leaves, so there is a last leaf
        let last = self.num_leaves() - 1;
        let base = self.rightmost_offset();
        if index == last {
            self.write_node(base + NODE_SIZE * self.depth(), leaf);
        } else {
            let critbit = (31 - (index ^ last).leading_zeros()) as usize;
            self.write_node(base + NODE_SIZE * critbit, &path[critbit]);
        }
    }

    fn write_canopy(&mut self, path: &[Node], index: u32) {
        let depth = self.depth();
        let first = self.header.config.min_proof_len();
        for level in first..depth {
            let position = (index >> level) as usize;
            let offset = self.canopy_offset(level, position);
            self.write_node(offset, &path[level]);
        }
    }

    fn flush_header(&mut self) -> Result<()> {
        let mut out: &mut [u8] = &mut self.data[..TreeHeader::SPACE];
        self.header
            .serialize(&mut out)
            .map_err(|_| error!(GraphError::InvalidTreeAccount))
    }

    fn write_changelog(&mut self, slot: usize, root: &Node, path: &[Node], index: u32) {
        let base = self.changelog_offset(slot);
        self.write_node(base, root);
        for (level, node) in path.iter().enumerate() {
            self.write_node(base + NODE_SIZE * (1 + level), node);
        }
        self.write_u32(base + NODE_SIZE * (1 + self.depth()), index);
    }

    fn write_rightmost(&mut self, proof: &[Node], leaf: &Node, next_index: u32) {
        let base = self.rightmost_offset();
        let depth = self.depth();
        for (level, node) in proof.iter().enumerate() {
            self.write_node(base + NODE_SIZE * level, node);
        }
        self.write_node(base + NODE_SIZE * depth, leaf);
        self.write_u32(base + NODE_SIZE * (depth + 1), next_index);
    }

    fn write_node(&mut self, offset: usize, node: &Node) {
        self.data[offset..offset + NODE_SIZE].copy_from_slice(node);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
