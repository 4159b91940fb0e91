//! Protocol-wide constants for Velum v1.

/// Protocol semantic version carried in every transaction.
pub const PROTOCOL_VERSION: i8 = 1;

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Length in bytes of a note commitment.
pub const COMMITMENT_LEN: usize = 32;

/// Length in bytes of a nullifier.
pub const NULLIFIER_LEN: usize = 32;

/// Number of input slots in a join-split description.
pub const JS_INPUTS: usize = 2;

/// Number of output slots in a join-split description.
pub const JS_OUTPUTS: usize = 2;

/// Length of the uncompressed `X || Y` signing public key.
pub const SIG_PUBKEY_LEN: usize = 64;

/// Length of the fixed `r || s` ECDSA signature encoding.
pub const SIG_LEN: usize = 64;

/// Length of a compressed SEC1 note-transmission key.
pub const TRANSMISSION_KEY_LEN: usize = 33;

/// Shard that dummy inputs conventionally reference.
///
/// Dummy witness paths validate trivially against the all-zero anchor
/// reserved on this shard.
pub const DUMMY_SHARD: u8 = 0;

/// Maximum serialized transaction size (in bytes) accepted before
/// verification. A DoS bound, not a protocol limitation.
pub const MAX_TX_BYTES: usize = 200_000;

/// Domain separator for spend-address derivation.
pub const DS_ADDRESS: &[u8] = b"VELUM::ADDRESS::V1";

/// Domain separator for viewing-key derivation.
pub const DS_VIEWING_KEY: &[u8] = b"VELUM::VIEWING_KEY::V1";

/// Domain separator for note-commitment derivation.
pub const DS_COMMITMENT: &[u8] = b"VELUM::COMMITMENT::V1";

/// Domain separator for nullifier derivation.
pub const DS_NULLIFIER: &[u8] = b"VELUM::NULLIFIER::V1";

/// Domain separator for the per-input ownership MACs.
pub const DS_MAC: &[u8] = b"VELUM::MAC::V1";

/// Domain separator for the `h_sig` binding value of a description.
pub const DS_HSIG: &[u8] = b"VELUM::HSIG::V1";

/// Domain separator for output-note `rho` derivation inside the prover.
pub const DS_RHO: &[u8] = b"VELUM::RHO::V1";

/// Domain separator for per-output note-encryption keys.
pub const DS_ENC_KEY: &[u8] = b"VELUM::ENC_KEY::V1";

/// Domain separator used by the hash-bound stand-in prover.
pub const DS_PROOF: &[u8] = b"VELUM::PROOF::V1";
