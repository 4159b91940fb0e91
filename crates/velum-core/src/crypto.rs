//! PRF and digest wiring for notes, nullifiers, and ownership MACs.
//!
//! Important: this crate does not implement novel cryptography. Every
//! derivation here is a domain-separated digest over audited primitives;
//! the zk proving system itself lives behind the oracle trait in
//! `velum-tx`.

use sha3::digest::{ExtendableOutput, Update, XofReader};

use crate::constants::*;
use crate::keys::SpendingKey;
use crate::types::{Commitment, Hash32, Nullifier};

/// Derive the nullifier of a note: `nf = PRF(sk, rho)`.
///
/// Published when the note is spent; uniqueness across all shards is the
/// double-spend guard.
pub fn derive_nullifier(sk: &SpendingKey, rho: &[u8; 32]) -> Nullifier {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DS_NULLIFIER);
    hasher.update(sk.as_bytes());
    hasher.update(rho);
    let mut out = [0u8; NULLIFIER_LEN];
    out.copy_from_slice(hasher.finalize().as_bytes());
    Nullifier(out)
}

/// Derive a note commitment binding `(value, apk, rho, r)`.
pub fn note_commitment(value: u64, apk: &[u8; 32], rho: &[u8; 32], r: &[u8; 32]) -> Commitment {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DS_COMMITMENT);
    hasher.update(&value.to_le_bytes());
    hasher.update(apk);
    hasher.update(rho);
    hasher.update(r);
    let mut out = [0u8; COMMITMENT_LEN];
    out.copy_from_slice(hasher.finalize().as_bytes());
    Commitment(out)
}

/// Per-input ownership MAC: `PRF(index, ask, h_sig)`.
///
/// Proves knowledge of the spending key that authorized input `index`
/// without revealing it.
pub fn prf_mac(index: u64, ask: &[u8; 32], h_sig: &Hash32) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DS_MAC);
    hasher.update(&index.to_le_bytes());
    hasher.update(ask);
    hasher.update(h_sig.as_bytes());
    let mut out = [0u8; HASH32_LEN];
    out.copy_from_slice(hasher.finalize().as_bytes());
    Hash32(out)
}

/// SHAKE-256 digest truncated to 32 bytes.
///
/// Loan requests commit to a withdrawal key with this digest; the matching
/// withdraw transaction reveals the preimage.
pub fn shake256_digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = sha3::Shake256::default();
    hasher.update(bytes);
    let mut reader = hasher.finalize_xof();
    let mut out = [0u8; 32];
    reader.read(&mut out);
    out
}
