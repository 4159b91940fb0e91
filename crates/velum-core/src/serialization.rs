// Consensus-critical. Changes require spec update + tests.
//! Canonical serialization helpers.
//!
//! Rule: stored and gossiped records are encoded with Borsh. The
//! *signing* record of a transaction uses the bespoke byte layout defined
//! in `velum-tx` and is digested with [`double_hash32`].

use crate::constants::HASH32_LEN;
use crate::types::{CoreError, Hash32};
use borsh::to_vec;

/// Encode a value with canonical Borsh encoding.
pub fn to_bytes<T: borsh::BorshSerialize>(v: &T) -> Result<Vec<u8>, CoreError> {
    to_vec(v).map_err(|_| CoreError::InvalidValue("borsh serialization failed"))
}

/// Hash bytes with blake3 under a domain separator and return 32 bytes.
pub fn hash32(domain_sep: &[u8], bytes: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    hasher.update(bytes);
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(hasher.finalize().as_bytes());
    Hash32(arr)
}

/// Double hash: `H(H(bytes))`. Used for canonical transaction hashing.
pub fn double_hash32(bytes: &[u8]) -> Hash32 {
    let inner = blake3::hash(bytes);
    let mut hasher = blake3::Hasher::new();
    hasher.update(inner.as_bytes());
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(hasher.finalize().as_bytes());
    Hash32(arr)
}

/// Append an unsigned LEB128 varint to `out`.
pub fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Read an unsigned LEB128 varint from `bytes` starting at `*pos`.
///
/// Advances `*pos` past the varint on success.
pub fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, CoreError> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *bytes.get(*pos).ok_or(CoreError::MalformedVarint)?;
        *pos += 1;
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(CoreError::MalformedVarint);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}
