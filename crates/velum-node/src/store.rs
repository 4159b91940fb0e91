//! sled-backed implementation of the ledger's key/value contract.

use std::path::Path;

use velum_state::{KvStore, StateError};

const TREE_LEDGER: &str = "ledger";

/// Durable [`KvStore`] over a single sled tree.
pub struct SledKv {
    _db: sled::Db,
    tree: sled::Tree,
}

impl SledKv {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let db = sled::open(path).map_err(|e| StateError::Store(e.to_string()))?;
        let tree = db
            .open_tree(TREE_LEDGER)
            .map_err(|e| StateError::Store(e.to_string()))?;
        Ok(Self { _db: db, tree })
    }

    /// Flush outstanding writes to disk.
    pub fn flush(&self) -> Result<(), StateError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StateError::Store(e.to_string()))
    }
}

impl KvStore for SledKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.tree
            .get(key)
            .map(|v| v.map(|ivec| ivec.to_vec()))
            .map_err(|e| StateError::Store(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StateError> {
        self.tree
            .insert(key, value)
            .map(|_| ())
            .map_err(|e| StateError::Store(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (k, v) = item.map_err(|e| StateError::Store(e.to_string()))?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_and_prefix_scan() {
        let dir = tempdir().unwrap();
        let kv = SledKv::open(&dir.path().join("db")).unwrap();

        kv.put(b"acc/1/len", &7u64.to_be_bytes()).unwrap();
        kv.put(b"acc/1/level=0/idx=6", &[1u8; 32]).unwrap();
        kv.put(b"nf/1/x", &[]).unwrap();

        assert_eq!(kv.get(b"acc/1/len").unwrap().unwrap(), 7u64.to_be_bytes());
        assert!(kv.get(b"missing").unwrap().is_none());

        let acc_keys = kv.scan_prefix(b"acc/").unwrap();
        assert_eq!(acc_keys.len(), 2);
        let nf_keys = kv.scan_prefix(b"nf/").unwrap();
        assert_eq!(nf_keys.len(), 1);
    }
}
