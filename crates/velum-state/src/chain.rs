//! Process-wide chain state: one accumulator per shard plus the global
//! nullifier set.
//!
//! Concurrency model: the pair is held behind a single `RwLock`. The block
//! apply path is the only writer and holds the exclusive lock for the
//! duration of a block so frontier appends and nullifier insertions commit
//! atomically; mempool and RPC readers take shared locks. Anchor lookups
//! are monotonic: once recorded at a given length, an anchor never changes.
//!
//! Pass the handle explicitly to every consumer; there is no ambient
//! global.

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;

use velum_core::{Hash32, Hasher, ShardId};

use crate::accumulator::IncrementalAccumulator;
use crate::nullifier::ShardedNullifierSet;

/// Historical anchor roots of one shard, addressable both ways.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
    by_root: HashMap<Hash32, u64>,
    by_length: HashMap<u64, Hash32>,
    latest: Option<(u64, Hash32)>,
}

impl AnchorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the root observed at `length`.
    pub fn record(&mut self, length: u64, root: Hash32) {
        self.by_root.insert(root, length);
        self.by_length.insert(length, root);
        if self.latest.map_or(true, |(l, _)| length >= l) {
            self.latest = Some((length, root));
        }
    }

    /// Whether `root` was ever recorded. Stale anchors stay valid.
    pub fn contains_root(&self, root: &Hash32) -> bool {
        self.by_root.contains_key(root)
    }

    /// Length at which `root` was recorded.
    pub fn length_of(&self, root: &Hash32) -> Option<u64> {
        self.by_root.get(root).copied()
    }

    /// Root recorded at `length`, if any.
    pub fn root_at(&self, length: u64) -> Option<Hash32> {
        self.by_length.get(&length).copied()
    }

    /// Most recent recorded `(length, root)`.
    pub fn latest(&self) -> Option<(u64, Hash32)> {
        self.latest
    }
}

/// Accumulator and anchor history of a single shard.
pub struct ShardLedger {
    /// The shard's commitment accumulator.
    pub accumulator: IncrementalAccumulator,
    /// Every anchor root the shard has published.
    pub anchors: AnchorRegistry,
}

impl ShardLedger {
    /// Create an empty shard ledger over the given hasher.
    pub fn new(hasher: Arc<dyn Hasher>) -> Self {
        Self {
            accumulator: IncrementalAccumulator::new(hasher),
            anchors: AnchorRegistry::new(),
        }
    }

    /// Record the accumulator's current root as an anchor.
    pub fn record_current_anchor(&mut self) -> Hash32 {
        let root = self.accumulator.root();
        self.anchors.record(self.accumulator.length(), root);
        root
    }
}

/// The process-wide accumulator + nullifier pair.
pub struct ChainState {
    shards: HashMap<ShardId, ShardLedger>,
    /// Spent-note tags across all shards.
    pub nullifiers: ShardedNullifierSet,
    hasher: Arc<dyn Hasher>,
}

impl ChainState {
    /// Create an empty chain state over the given hasher.
    pub fn new(hasher: Arc<dyn Hasher>) -> Self {
        Self {
            shards: HashMap::new(),
            nullifiers: ShardedNullifierSet::new(),
            hasher,
        }
    }

    /// Read access to one shard's ledger, if it exists.
    pub fn shard(&self, shard: ShardId) -> Option<&ShardLedger> {
        self.shards.get(&shard)
    }

    /// Write access to one shard's ledger, creating it on first use.
    pub fn shard_mut(&mut self, shard: ShardId) -> &mut ShardLedger {
        let hasher = Arc::clone(&self.hasher);
        self.shards
            .entry(shard)
            .or_insert_with(|| ShardLedger::new(hasher))
    }

    /// Install a reloaded shard ledger (restart path).
    pub fn install_shard(&mut self, shard: ShardId, ledger: ShardLedger) {
        self.shards.insert(shard, ledger);
    }

    /// Shards currently tracked.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether `root` is a recorded historical anchor of `shard`.
    ///
    /// The all-zero root is the empty accumulator and is accepted for any
    /// shard; dummy inputs anchor to it.
    pub fn is_historical_root(&self, shard: ShardId, root: &Hash32) -> bool {
        if root.is_zero() {
            return true;
        }
        self.shards
            .get(&shard)
            .is_some_and(|ledger| ledger.anchors.contains_root(root))
    }
}

/// Shared handle to the process-wide chain state.
pub type ChainHandle = Arc<RwLock<ChainState>>;

/// Create a fresh chain handle over the given hasher.
pub fn new_chain_handle(hasher: Arc<dyn Hasher>) -> ChainHandle {
    Arc::new(RwLock::new(ChainState::new(hasher)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use velum_core::Blake3Hasher;

    #[test]
    fn anchors_are_monotonic_and_stale_friendly() {
        let mut state = ChainState::new(Arc::new(Blake3Hasher));
        let ledger = state.shard_mut(1);

        ledger.accumulator.append(b"a");
        let early = ledger.record_current_anchor();
        ledger.accumulator.append_many(&[b"b", b"c", b"d"]);
        let late = ledger.record_current_anchor();

        assert!(state.is_historical_root(1, &early));
        assert!(state.is_historical_root(1, &late));
        assert_eq!(state.shard(1).unwrap().anchors.latest().unwrap().1, late);
    }

    #[test]
    fn zero_root_is_always_historical() {
        let state = ChainState::new(Arc::new(Blake3Hasher));
        assert!(state.is_historical_root(42, &Hash32::zero()));
    }

    #[test]
    fn unknown_root_is_rejected() {
        let mut state = ChainState::new(Arc::new(Blake3Hasher));
        state.shard_mut(0).accumulator.append(b"a");
        state.shard_mut(0).record_current_anchor();
        assert!(!state.is_historical_root(0, &Hash32([9u8; 32])));
    }

    #[test]
    fn registry_round_trips_length_and_root() {
        let mut registry = AnchorRegistry::new();
        let root = Hash32([5u8; 32]);
        registry.record(10, root);
        assert_eq!(registry.length_of(&root), Some(10));
        assert_eq!(registry.root_at(10), Some(root));
    }

    #[test]
    fn handle_supports_concurrent_readers() {
        let handle = new_chain_handle(Arc::new(Blake3Hasher));
        {
            let mut state = handle.write().unwrap();
            state.shard_mut(2).accumulator.append(b"cm");
            state.shard_mut(2).record_current_anchor();
        }
        let a = handle.read().unwrap();
        let b = handle.try_read();
        assert_eq!(a.shard(2).unwrap().accumulator.length(), 1);
        assert!(b.is_ok());
    }
}
