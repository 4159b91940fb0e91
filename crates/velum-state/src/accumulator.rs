// Consensus-critical. Changes require spec update + tests.
//! Append-only incremental Merkle accumulator for note commitments.
//!
//! The accumulator streams an unbounded number of leaves into O(log n)
//! storage: one optional node per tree level (the "frontier"). At level
//! `i` a value is present exactly when bit `i` of the leaf count is set,
//! i.e. the frontier encodes the length in binary over completed subtree
//! roots.
//!
//! The tradeoff of frontier-only storage is that membership proofs for
//! arbitrary historical leaves require replay; this structure only answers
//! appends and roots. The hash function is injected and fixed at
//! construction.

use std::sync::Arc;

use velum_core::{Hash32, Hasher};

/// The dirty cells produced by simulating a single append.
///
/// Entry `j` belongs to tree level `j`; `indices[j]` is the node's index
/// at that level. Overwriting exactly these cells in the persistent store
/// keeps the on-disk frontier reconstructible (see `store`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontierUpdate {
    /// Updated node values, lowest level first.
    pub nodes: Vec<Hash32>,
    /// Index of each updated node within its level.
    pub indices: Vec<u64>,
}

/// Append-only frontier tree with an anchor root at every size.
#[derive(Clone)]
pub struct IncrementalAccumulator {
    frontier: Vec<Option<Hash32>>,
    length: u64,
    hasher: Arc<dyn Hasher>,
}

impl core::fmt::Debug for IncrementalAccumulator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IncrementalAccumulator")
            .field("length", &self.length)
            .field("frontier", &self.frontier)
            .finish()
    }
}

impl IncrementalAccumulator {
    /// Create a new empty accumulator over the given hasher.
    pub fn new(hasher: Arc<dyn Hasher>) -> Self {
        Self {
            frontier: Vec::new(),
            length: 0,
            hasher,
        }
    }

    /// Reassemble an accumulator from a previously persisted frontier.
    pub fn from_parts(hasher: Arc<dyn Hasher>, frontier: Vec<Option<Hash32>>, length: u64) -> Self {
        Self {
            frontier,
            length,
            hasher,
        }
    }

    /// Number of committed leaves.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Whether no leaf has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The stored frontier, one optional node per level.
    pub fn frontier(&self) -> &[Option<Hash32>] {
        &self.frontier
    }

    fn leaf_hash(&self, data: &[u8]) -> Hash32 {
        self.hasher.hash(&[data])
    }

    fn node_hash(&self, left: &Hash32, right: &Hash32) -> Hash32 {
        self.hasher.hash(&[left.as_bytes(), right.as_bytes()])
    }

    /// Stream new leaves into the tree. Never fails.
    pub fn append_many<B: AsRef<[u8]>>(&mut self, data: &[B]) {
        for datum in data {
            self.append(datum.as_ref());
        }
    }

    /// Append a single leaf.
    pub fn append(&mut self, datum: &[u8]) {
        let mut node = self.leaf_hash(datum);
        let mut stored = false;

        for level in 0..self.frontier.len() {
            match self.frontier[level].take() {
                // A stored value is always the left sibling: combine and
                // carry the parent upward, leaving the cell cleared.
                Some(sibling) => node = self.node_hash(&sibling, &node),
                // Empty cell: the carried node becomes the right-most node
                // at this level.
                None => {
                    self.frontier[level] = Some(node);
                    stored = true;
                    break;
                }
            }
        }

        if !stored {
            // Walked past the top; the tree grows one level.
            self.frontier.push(Some(node));
        }
        self.length += 1;
    }

    /// Simulate appending one leaf without mutating the frontier.
    ///
    /// Returns the `(node, index)` sequence the persistent store must
    /// overwrite so the accumulator can be rebuilt from disk. Followed by a
    /// real [`append`](Self::append) of the same datum, the persisted cells
    /// and the in-memory state agree exactly.
    pub fn simulate_append(&self, datum: &[u8]) -> FrontierUpdate {
        let mut node = self.leaf_hash(datum);
        let mut idx = self.length;

        let mut nodes = Vec::new();
        let mut indices = Vec::new();
        let mut stored = false;

        for slot in &self.frontier {
            nodes.push(node);
            indices.push(idx);
            idx /= 2;
            match slot {
                Some(sibling) => node = self.node_hash(sibling, &node),
                None => {
                    stored = true;
                    break;
                }
            }
        }

        if !stored {
            nodes.push(node);
            indices.push(idx);
        }

        FrontierUpdate { nodes, indices }
    }

    /// The root of the tree built so far.
    ///
    /// An empty tree has the all-zero root; a single leaf's root is its
    /// leaf hash.
    pub fn root(&self) -> Hash32 {
        if self.length == 0 {
            return Hash32::zero();
        }
        self.path_to_root()
            .last()
            .copied()
            .flatten()
            .unwrap_or_else(Hash32::zero)
    }

    /// Path from the right-most stored subtree up to the overall root,
    /// indexed by level. Levels below the lowest stored node are `None`;
    /// the final entry is the root.
    ///
    /// Empty right subtrees above the lowest stored node are filled by
    /// duplicating the running node; duplication never happens against a
    /// populated right subtree.
    pub fn path_to_root(&self) -> Vec<Option<Hash32>> {
        let mut paths: Vec<Option<Hash32>> = vec![None; self.frontier.len() + 1];

        // Lowest level holding a value: the top of the largest complete
        // subtree not yet combined.
        let Some(lowest) = self.frontier.iter().position(Option::is_some) else {
            return paths;
        };
        let Some(mut node) = self.frontier[lowest] else {
            return paths;
        };
        paths[lowest] = Some(node);

        if lowest + 1 >= self.frontier.len() {
            // Full binary tree: the lowest stored node is the root.
            let last = paths.len() - 1;
            paths[last] = Some(node);
            return paths;
        }

        // The subtree at `lowest` is a left subtree with an empty right
        // sibling; duplicate it to get its parent.
        node = self.node_hash(&node, &node);
        paths[lowest + 1] = Some(node);

        for (offset, slot) in self.frontier[lowest + 1..].iter().enumerate() {
            let sibling = (*slot).unwrap_or(node);
            node = self.node_hash(&sibling, &node);
            paths[lowest + offset + 2] = Some(node);
        }
        paths
    }
}
