// Consensus-critical. Changes require spec update + tests.
//! Canonical protocol types for Velum v1.
//!
//! This module defines the consensus-visible value types used across the
//! pipeline. All types here must remain backward-compatible once released.

use crate::constants::*;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors related to parsing, validation, or construction of core types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// A varint was truncated or overlong.
    #[error("malformed varint")]
    MalformedVarint,
}

/// Horizontal partition of chain state. Nullifier uniqueness spans shards.
pub type ShardId = u8;

/// Transaction identifier: the canonical double-hash of the record.
pub type TxId = Hash32;

/// Opaque loan identifier chosen by the borrower.
pub type LoanId = Vec<u8>;

macro_rules! bytes32_newtype {
    ($(#[$doc:meta])* $name:ident, $len:path) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Returns the all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Returns the underlying byte array.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns `true` if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self(value)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                if bytes.len() != $len {
                    return Err(CoreError::InvalidHexLength {
                        expected: $len,
                        got: bytes.len(),
                    });
                }
                let mut arr = [0u8; $len];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }
    };
}

bytes32_newtype!(
    /// Fixed-size 32-byte hash used throughout the protocol.
    Hash32,
    HASH32_LEN
);

bytes32_newtype!(
    /// Binding hash of an output note; the identity of spendable value on
    /// chain.
    Commitment,
    COMMITMENT_LEN
);

bytes32_newtype!(
    /// Publishable spent-tag of a note. Appears at most once, ever, across
    /// all shards.
    Nullifier,
    NULLIFIER_LEN
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash32_hex_round_trip() {
        let h = Hash32([0xab; 32]);
        let s = h.to_string();
        assert_eq!(s.len(), 64);
        let back: Hash32 = s.parse().unwrap();
        assert_eq!(back, h);

        let prefixed: Hash32 = format!("0x{s}").parse().unwrap();
        assert_eq!(prefixed, h);
    }

    #[test]
    fn hash32_rejects_bad_length() {
        let err = "abcd".parse::<Hash32>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidHexLength { got: 2, .. }));
    }

    #[test]
    fn zero_detection() {
        assert!(Commitment::zero().is_zero());
        assert!(!Nullifier([1u8; 32]).is_zero());
    }
}
