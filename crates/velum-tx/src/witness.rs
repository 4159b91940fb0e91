//! Witness paths over a shard's commitment list.
//!
//! The on-chain accumulator retains only its frontier, so spenders build
//! membership witnesses client-side from the full commitment list they
//! track per shard. The tree shape mirrors the accumulator exactly —
//! including right-duplication of trailing nodes — so a witness root
//! equals the accumulator root at the same length.

use velum_core::{Commitment, Hash32, Hasher};

/// Authentication path from a leaf to the tree root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleWitness {
    /// Sibling node per level, leaf level first.
    pub path: Vec<Hash32>,
    /// Whether the witnessed node is the right child at each level.
    pub index_bits: Vec<bool>,
    /// Root the path authenticates against.
    pub root: Hash32,
}

impl MerkleWitness {
    /// The trivial path dummy notes carry; authenticates against the
    /// reserved zero anchor.
    pub fn dummy() -> Self {
        Self {
            path: Vec::new(),
            index_bits: Vec::new(),
            root: Hash32::zero(),
        }
    }

    /// Fold the path over `leaf` and compare with the stored root.
    pub fn verify(&self, hasher: &dyn Hasher, leaf: &Hash32) -> bool {
        if self.path.len() != self.index_bits.len() {
            return false;
        }
        let mut node = *leaf;
        for (sibling, is_right) in self.path.iter().zip(&self.index_bits) {
            node = if *is_right {
                hasher.hash(&[sibling.as_bytes(), node.as_bytes()])
            } else {
                hasher.hash(&[node.as_bytes(), sibling.as_bytes()])
            };
        }
        node == self.root
    }
}

/// Root of the full tree over `commitments`; zero when the list is empty.
pub fn tree_root(hasher: &dyn Hasher, commitments: &[Commitment]) -> Hash32 {
    if commitments.is_empty() {
        return Hash32::zero();
    }
    let mut level = leaf_level(hasher, commitments);
    while level.len() > 1 {
        level = parent_level(hasher, &level);
    }
    level[0]
}

/// Build the witness for `target` within `commitments`.
///
/// Returns `None` when `target` is absent from the list; the caller
/// attaches the shard context to the error.
pub fn build_witness(
    hasher: &dyn Hasher,
    commitments: &[Commitment],
    target: &Commitment,
) -> Option<MerkleWitness> {
    let position = commitments.iter().position(|c| c == target)?;

    let mut level = leaf_level(hasher, commitments);
    let mut idx = position;
    let mut path = Vec::new();
    let mut index_bits = Vec::new();

    while level.len() > 1 {
        let sibling_idx = idx ^ 1;
        // A trailing node with no right sibling pairs with itself.
        let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
        path.push(sibling);
        index_bits.push(idx & 1 == 1);

        level = parent_level(hasher, &level);
        idx /= 2;
    }

    Some(MerkleWitness {
        path,
        index_bits,
        root: level[0],
    })
}

fn leaf_level(hasher: &dyn Hasher, commitments: &[Commitment]) -> Vec<Hash32> {
    commitments
        .iter()
        .map(|c| hasher.hash(&[c.as_bytes()]))
        .collect()
}

fn parent_level(hasher: &dyn Hasher, level: &[Hash32]) -> Vec<Hash32> {
    level
        .chunks(2)
        .map(|pair| {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            hasher.hash(&[left.as_bytes(), right.as_bytes()])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use velum_core::Blake3Hasher;
    use velum_state::IncrementalAccumulator;

    fn commitments(n: u64) -> Vec<Commitment> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&i.to_le_bytes());
                Commitment(bytes)
            })
            .collect()
    }

    #[test]
    fn witness_root_matches_accumulator_root() {
        let hasher = Blake3Hasher;
        for n in 1u64..=17 {
            let cms = commitments(n);
            let mut acc = IncrementalAccumulator::new(Arc::new(Blake3Hasher));
            for cm in &cms {
                acc.append(cm.as_bytes());
            }
            assert_eq!(tree_root(&hasher, &cms), acc.root(), "{n} leaves");
        }
    }

    #[test]
    fn every_position_verifies() {
        let hasher = Blake3Hasher;
        let cms = commitments(11);
        let root = tree_root(&hasher, &cms);
        for cm in &cms {
            let witness = build_witness(&hasher, &cms, cm).unwrap();
            assert_eq!(witness.root, root);
            assert!(witness.verify(&hasher, &hasher.hash(&[cm.as_bytes()])));
        }
    }

    #[test]
    fn absent_commitment_yields_none() {
        let hasher = Blake3Hasher;
        let cms = commitments(4);
        assert!(build_witness(&hasher, &cms, &Commitment([0xee; 32])).is_none());
    }

    #[test]
    fn tampered_path_fails_verification() {
        let hasher = Blake3Hasher;
        let cms = commitments(8);
        let mut witness = build_witness(&hasher, &cms, &cms[3]).unwrap();
        witness.path[0] = Hash32([0xaa; 32]);
        assert!(!witness.verify(&hasher, &hasher.hash(&[cms[3].as_bytes()])));
    }
}
