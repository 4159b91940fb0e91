//! The hash capability injected into the accumulator and PRF wiring.

use crate::constants::HASH32_LEN;
use crate::types::Hash32;

/// Collision-resistant compression over a variable number of byte arguments.
///
/// Implementations must be deterministic: the same argument sequence always
/// yields the same digest. The accumulator invokes this with one argument
/// (leaf hash of a datum) or two (internal node `H(left, right)`); whether
/// arguments are concatenated or framed is the implementation's choice.
pub trait Hasher: Send + Sync {
    /// Hash the arguments, in order, into 32 bytes.
    fn hash(&self, parts: &[&[u8]]) -> Hash32;
}

/// Default hasher: BLAKE3 over the concatenated arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn hash(&self, parts: &[&[u8]]) -> Hash32 {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        let mut arr = [0u8; HASH32_LEN];
        arr.copy_from_slice(hasher.finalize().as_bytes());
        Hash32(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let h = Blake3Hasher;
        assert_eq!(h.hash(&[b"a", b"b"]), h.hash(&[b"a", b"b"]));
    }

    #[test]
    fn argument_order_matters() {
        let h = Blake3Hasher;
        assert_ne!(h.hash(&[b"a", b"b"]), h.hash(&[b"b", b"a"]));
    }
}
