// Consensus-critical. Changes require spec update + tests.
//! Accumulator persistence protocol over a narrow key/value contract.
//!
//! Only the dirty frontier cells reported by `simulate_append` are written,
//! keyed by `(level, index_at_level)`. Because every written cell is the
//! root of a *completed* subtree, a cell is written exactly once and the
//! frontier at any historical length remains reconstructible bit-for-bit.
//!
//! Persisted layout (bit-exact):
//! - `acc/<shard>/level=<l>/idx=<i>` → 32-byte node
//! - `acc/<shard>/len`               → 8-byte big-endian leaf count
//! - `acc/<shard>/anchor/len=<L>`    → 32-byte root, `L` 8-byte big-endian
//! - `nf/<shard>/<nf>`               → empty value (presence only)
//! - `loan/<loan_id>`                → borsh `Vec<TxId>`
//! - `tx/<hash>`                     → borsh transaction record

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use velum_core::{Hash32, Hasher, Nullifier, ShardId, TxId};

use crate::accumulator::IncrementalAccumulator;
use crate::error::StateError;

/// Narrow key/value contract the ledger persists through.
///
/// Keys live in a lexicographic key space; values are opaque bytes.
pub trait KvStore: Send + Sync {
    /// Read the value at `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;
    /// Write `value` at `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StateError>;
    /// All `(key, value)` pairs whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError>;
}

/// In-memory [`KvStore`] for tests and embedding.
#[derive(Default)]
pub struct MemoryKv {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StateError::Store("memory store poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StateError::Store("memory store poisoned".into()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StateError::Store("memory store poisoned".into()))?;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Key of one frontier cell.
pub fn frontier_cell_key(shard: ShardId, level: usize, idx: u64) -> Vec<u8> {
    format!("acc/{shard}/level={level}/idx={idx}").into_bytes()
}

/// Key of a shard's persisted leaf count.
pub fn accumulator_len_key(shard: ShardId) -> Vec<u8> {
    format!("acc/{shard}/len").into_bytes()
}

/// Key of the anchor root recorded at `length`.
pub fn anchor_key(shard: ShardId, length: u64) -> Vec<u8> {
    let mut key = format!("acc/{shard}/anchor/len=").into_bytes();
    key.extend_from_slice(&length.to_be_bytes());
    key
}

/// Prefix covering every anchor of a shard.
pub fn anchor_prefix(shard: ShardId) -> Vec<u8> {
    format!("acc/{shard}/anchor/len=").into_bytes()
}

/// Key marking a nullifier as spent on a shard.
pub fn nullifier_key(shard: ShardId, nf: &Nullifier) -> Vec<u8> {
    let mut key = format!("nf/{shard}/").into_bytes();
    key.extend_from_slice(nf.as_bytes());
    key
}

/// Key of the loan index entry for `loan_id`.
pub fn loan_key(loan_id: &[u8]) -> Vec<u8> {
    let mut key = b"loan/".to_vec();
    key.extend_from_slice(loan_id);
    key
}

/// Key of a stored transaction record.
pub fn tx_key(txid: &TxId) -> Vec<u8> {
    let mut key = b"tx/".to_vec();
    key.extend_from_slice(txid.as_bytes());
    key
}

/// Append leaves, writing only the dirty frontier cells.
///
/// For each datum the dirty `(level, index)` cells from `simulate_append`
/// are written before the in-memory append; the shard's length is written
/// once at the end of the batch.
pub fn persist_append<B: AsRef<[u8]>>(
    kv: &dyn KvStore,
    shard: ShardId,
    acc: &mut IncrementalAccumulator,
    data: &[B],
) -> Result<(), StateError> {
    for datum in data {
        let update = acc.simulate_append(datum.as_ref());
        for (level, (node, idx)) in update.nodes.iter().zip(&update.indices).enumerate() {
            kv.put(&frontier_cell_key(shard, level, *idx), node.as_bytes())?;
        }
        acc.append(datum.as_ref());
    }
    kv.put(&accumulator_len_key(shard), &acc.length().to_be_bytes())
}

/// Record the current root as the anchor at the current length.
pub fn record_anchor(
    kv: &dyn KvStore,
    shard: ShardId,
    acc: &IncrementalAccumulator,
) -> Result<Hash32, StateError> {
    let root = acc.root();
    kv.put(&anchor_key(shard, acc.length()), root.as_bytes())?;
    Ok(root)
}

/// Rebuild a shard's accumulator at its persisted length.
pub fn load_accumulator(
    kv: &dyn KvStore,
    shard: ShardId,
    hasher: Arc<dyn Hasher>,
) -> Result<IncrementalAccumulator, StateError> {
    let length = match kv.get(&accumulator_len_key(shard))? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .try_into()
                .map_err(|_| StateError::CorruptState("accumulator length is not 8 bytes"))?;
            u64::from_be_bytes(arr)
        }
        None => 0,
    };
    load_accumulator_at(kv, shard, length, hasher)
}

/// Rebuild a shard's accumulator as it was at `length`.
///
/// The frontier at `length` holds, at each set bit `l`, the completed
/// subtree root with index `(length >> l) - 1`; all of those cells were
/// written by the simulate protocol and are never overwritten.
pub fn load_accumulator_at(
    kv: &dyn KvStore,
    shard: ShardId,
    length: u64,
    hasher: Arc<dyn Hasher>,
) -> Result<IncrementalAccumulator, StateError> {
    let levels = if length == 0 {
        0
    } else {
        64 - length.leading_zeros() as usize
    };

    let mut frontier = Vec::with_capacity(levels);
    for level in 0..levels {
        if (length >> level) & 1 == 1 {
            let idx = (length >> level) - 1;
            let bytes = kv
                .get(&frontier_cell_key(shard, level, idx))?
                .ok_or(StateError::CorruptState("missing frontier cell"))?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| StateError::CorruptState("frontier cell is not 32 bytes"))?;
            frontier.push(Some(Hash32(arr)));
        } else {
            frontier.push(None);
        }
    }

    Ok(IncrementalAccumulator::from_parts(hasher, frontier, length))
}

/// All recorded anchors of a shard, ordered by length.
pub fn load_anchors(kv: &dyn KvStore, shard: ShardId) -> Result<Vec<(u64, Hash32)>, StateError> {
    let prefix = anchor_prefix(shard);
    let mut anchors = Vec::new();
    for (key, value) in kv.scan_prefix(&prefix)? {
        let suffix = &key[prefix.len()..];
        let len_bytes: [u8; 8] = suffix
            .try_into()
            .map_err(|_| StateError::CorruptState("anchor key length suffix is not 8 bytes"))?;
        let root: [u8; 32] = value
            .as_slice()
            .try_into()
            .map_err(|_| StateError::CorruptState("anchor record is not 32 bytes"))?;
        anchors.push((u64::from_be_bytes(len_bytes), Hash32(root)));
    }
    anchors.sort_by_key(|(length, _)| *length);
    Ok(anchors)
}

/// Mark a nullifier spent on disk. Presence-only, zero-byte value.
pub fn persist_nullifier(kv: &dyn KvStore, shard: ShardId, nf: &Nullifier) -> Result<(), StateError> {
    kv.put(&nullifier_key(shard, nf), &[])
}

/// All persisted nullifiers, with the shard each belongs to.
pub fn load_nullifiers(kv: &dyn KvStore) -> Result<Vec<(ShardId, Nullifier)>, StateError> {
    let mut out = Vec::new();
    for (key, _) in kv.scan_prefix(b"nf/")? {
        let rest = &key[3..];
        let slash = rest
            .iter()
            .position(|b| *b == b'/')
            .ok_or(StateError::CorruptState("malformed nullifier key"))?;
        let shard: ShardId = core::str::from_utf8(&rest[..slash])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(StateError::CorruptState("malformed nullifier key shard"))?;
        let nf: [u8; 32] = rest[slash + 1..]
            .try_into()
            .map_err(|_| StateError::CorruptState("nullifier key is not 32 bytes"))?;
        out.push((shard, Nullifier(nf)));
    }
    Ok(out)
}

/// Shards that have persisted accumulator state.
pub fn load_shard_ids(kv: &dyn KvStore) -> Result<Vec<ShardId>, StateError> {
    let mut shards = Vec::new();
    for (key, _) in kv.scan_prefix(b"acc/")? {
        let rest = &key[4..];
        let Some(slash) = rest.iter().position(|b| *b == b'/') else {
            continue;
        };
        if &rest[slash + 1..] != b"len" {
            continue;
        }
        let shard: ShardId = core::str::from_utf8(&rest[..slash])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(StateError::CorruptState("malformed accumulator length key"))?;
        shards.push(shard);
    }
    shards.sort_unstable();
    Ok(shards)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use velum_core::Blake3Hasher;

    fn hasher() -> Arc<dyn Hasher> {
        Arc::new(Blake3Hasher)
    }

    #[test]
    fn persisted_cells_rebuild_frontier_bit_for_bit() {
        let kv = MemoryKv::new();
        let mut acc = IncrementalAccumulator::new(hasher());

        let data: Vec<Vec<u8>> = (0u64..21).map(|i| i.to_le_bytes().to_vec()).collect();
        persist_append(&kv, 1, &mut acc, &data).unwrap();

        let reloaded = load_accumulator(&kv, 1, hasher()).unwrap();
        assert_eq!(reloaded.length(), acc.length());
        assert_eq!(reloaded.frontier(), acc.frontier());
        assert_eq!(reloaded.root(), acc.root());
    }

    #[test]
    fn historical_frontiers_are_reconstructible() {
        let kv = MemoryKv::new();
        let mut acc = IncrementalAccumulator::new(hasher());
        let mut roots = Vec::new();

        for i in 0u64..17 {
            persist_append(&kv, 0, &mut acc, &[i.to_le_bytes()]).unwrap();
            roots.push((acc.length(), acc.root()));
        }

        for (length, root) in roots {
            let historical = load_accumulator_at(&kv, 0, length, hasher()).unwrap();
            assert_eq!(historical.root(), root, "length {length}");
        }
    }

    #[test]
    fn anchors_are_lookupable_by_length() {
        let kv = MemoryKv::new();
        let mut acc = IncrementalAccumulator::new(hasher());

        persist_append(&kv, 2, &mut acc, &[b"a".to_vec(), b"b".to_vec()]).unwrap();
        let first = record_anchor(&kv, 2, &acc).unwrap();
        persist_append(&kv, 2, &mut acc, &[b"c".to_vec()]).unwrap();
        let second = record_anchor(&kv, 2, &acc).unwrap();

        let anchors = load_anchors(&kv, 2).unwrap();
        assert_eq!(anchors, vec![(2, first), (3, second)]);
    }

    #[test]
    fn nullifier_round_trip() {
        let kv = MemoryKv::new();
        persist_nullifier(&kv, 0, &Nullifier([1u8; 32])).unwrap();
        persist_nullifier(&kv, 7, &Nullifier([2u8; 32])).unwrap();

        let mut loaded = load_nullifiers(&kv).unwrap();
        loaded.sort_by_key(|(shard, _)| *shard);
        assert_eq!(
            loaded,
            vec![(0, Nullifier([1u8; 32])), (7, Nullifier([2u8; 32]))]
        );
    }

    #[test]
    fn shard_discovery() {
        let kv = MemoryKv::new();
        let mut a = IncrementalAccumulator::new(hasher());
        let mut b = IncrementalAccumulator::new(hasher());
        persist_append(&kv, 3, &mut a, &[b"x".to_vec()]).unwrap();
        persist_append(&kv, 250, &mut b, &[b"y".to_vec()]).unwrap();

        assert_eq!(load_shard_ids(&kv).unwrap(), vec![3, 250]);
    }

    #[test]
    fn empty_store_loads_empty_accumulator() {
        let kv = MemoryKv::new();
        let acc = load_accumulator(&kv, 9, hasher()).unwrap();
        assert_eq!(acc.length(), 0);
        assert_eq!(acc.root(), Hash32::zero());
    }
}
