use solana_program::keccak;

/// A tree node: leaf hash, internal node or root.
pub type Node = [u8; 32];

/// Value of a leaf slot that has never been written.
pub const EMPTY_NODE: Node = [0u8; 32];

/// Domain separation prefixes.
/// Prevents second pre-image attacks by distinguishing leaves from internal nodes.
const LEAF_PREFIX: [u8; 1] = [0x00];
const NODE_PREFIX: [u8; 1] = [0x01];

/// Hash a leaf node with domain separation.
/// leaf_hash = keccak256(0x00 || data)
pub fn hash_leaf(data: &[u8]) -> Node {
    hash_leaf_parts(&[data])
}

/// Same as [`hash_leaf`] over the concatenation of `parts`, without
/// building the concatenation.
pub fn hash_leaf_parts(parts: &[&[u8]]) -> Node {
    let mut input: Vec<&[u8]> = Vec::with_capacity(1 + parts.len());
    input.push(LEAF_PREFIX.as_ref());
    input.extend_from_slice(parts);
    keccak::hashv(&input).to_bytes()
}

/// Hash two child nodes into a parent node with domain separation.
/// node_hash = keccak256(0x01 || left || right)
pub fn hash_nodes(left: &Node, right: &Node) -> Node {
    keccak::hashv(&[NODE_PREFIX.as_ref(), left.as_ref(), right.as_ref()]).to_bytes()
}

/// Parent of `node` and `sibling`, where `node_is_left` tells on which side
/// `node` sits.
pub fn hash_to_parent(node: &Node, sibling: &Node, node_is_left: bool) -> Node {
    if node_is_left {
        hash_nodes(node, sibling)
    } else {
        hash_nodes(sibling, node)
    }
}

/// Root of a subtree of height `level` whose leaves are all empty.
pub fn empty_node(level: u32) -> Node {
    let mut node = EMPTY_NODE;
    for _ in 0..level {
        node = hash_nodes(&node, &node);
    }
    node
}

/// Empty subtree roots for every level `0..=depth`.
pub fn empty_nodes(depth: u32) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(depth as usize + 1);
    let mut node = EMPTY_NODE;
    nodes.push(node);
    for _ in 0..depth {
        node = hash_nodes(&node, &node);
        nodes.push(node);
    }
    nodes
}

/// Fold `leaf` up through `proof` and return the resulting root.
pub fn compute_root(proof: &[Node], leaf: &Node, index: u32) -> Node {
    let mut computed = *leaf;
    for (level, sibling) in proof.iter().enumerate() {
        let is_left = (u64::from(index) >> level) & 1 == 0;
        computed = hash_to_parent(&computed, sibling, is_left);
    }
    computed
}

/// Verify a Merkle proof against a known root.
///
/// # Arguments
/// * `proof` - The sibling hashes along the path from leaf to root
/// * `root` - The expected Merkle root
/// * `leaf` - The leaf hash to verify
/// * `index` - The leaf's position in the tree (determines left/right at each level)
///
/// # Returns
/// `true` if the proof is valid, `false` otherwise
pub fn verify_proof(proof: &[Node], root: &Node, leaf: &Node, index: u32) -> bool {
    compute_root(proof, leaf, index) == *root
}
