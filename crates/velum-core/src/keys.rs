//! Key material for shielded ownership and note transmission.
//!
//! A spending key authorizes spends (nullifier derivation, ownership MACs);
//! the viewing keypair derived from it receives encrypted note plaintexts.
//! Hierarchical wallet derivation is out of scope; keys here are flat.

use borsh::{BorshDeserialize, BorshSerialize};
use k256::SecretKey;
use rand_core::{OsRng, RngCore};
use zeroize::Zeroize;

use crate::constants::*;
use crate::serialization::hash32;

/// Secret key authorizing spends of notes it owns.
#[derive(Clone, PartialEq, Eq, Zeroize, BorshSerialize, BorshDeserialize)]
pub struct SpendingKey(pub [u8; 32]);

impl SpendingKey {
    /// Generate a fresh random spending key.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl core::fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Never print key material.
        f.write_str("SpendingKey(..)")
    }
}

/// Public address parts a sender needs to pay someone.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct PaymentAddress {
    /// Spend address the note is bound to.
    pub apk: [u8; 32],
    /// Compressed SEC1 transmission key for note encryption.
    pub pk_enc: [u8; TRANSMISSION_KEY_LEN],
}

/// Derive the spend address of a spending key.
pub fn spend_address(sk: &SpendingKey) -> [u8; 32] {
    *hash32(DS_ADDRESS, sk.as_bytes()).as_bytes()
}

/// Derive the note-transmission secret of a spending key.
///
/// Rejection-samples a valid secp256k1 secret scalar from the key bytes;
/// the retry probability is negligible.
pub fn viewing_secret(sk: &SpendingKey) -> SecretKey {
    let mut counter: u8 = 0;
    loop {
        let mut input = Vec::with_capacity(33);
        input.extend_from_slice(sk.as_bytes());
        input.push(counter);
        let candidate = hash32(DS_VIEWING_KEY, &input);
        if let Ok(secret) = SecretKey::from_slice(candidate.as_bytes()) {
            return secret;
        }
        counter = counter.wrapping_add(1);
    }
}

/// Derive the full payment address of a spending key.
pub fn payment_address(sk: &SpendingKey) -> PaymentAddress {
    let secret = viewing_secret(sk);
    let point = secret.public_key().to_sec1_bytes();
    let mut pk_enc = [0u8; TRANSMISSION_KEY_LEN];
    pk_enc.copy_from_slice(&point);
    PaymentAddress {
        apk: spend_address(sk),
        pk_enc,
    }
}

/// The full key set a wallet holds for one account.
#[derive(Clone)]
pub struct KeySet {
    /// The spend-authorizing secret.
    pub spend: SpendingKey,
    /// The address published to payers.
    pub address: PaymentAddress,
}

impl KeySet {
    /// Derive the key set of a spending key.
    pub fn from_spending_key(spend: SpendingKey) -> Self {
        let address = payment_address(&spend);
        Self { spend, address }
    }

    /// Generate a fresh random key set.
    pub fn random() -> Self {
        Self::from_spending_key(SpendingKey::random())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn address_is_deterministic() {
        let sk = SpendingKey([9u8; 32]);
        assert_eq!(payment_address(&sk), payment_address(&sk));
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        let a = payment_address(&SpendingKey([1u8; 32]));
        let b = payment_address(&SpendingKey([2u8; 32]));
        assert_ne!(a.apk, b.apk);
        assert_ne!(a.pk_enc, b.pk_enc);
    }

    #[test]
    fn transmission_key_parses_as_point() {
        let sk = SpendingKey::random();
        let addr = payment_address(&sk);
        assert!(k256::PublicKey::from_sec1_bytes(&addr.pk_enc).is_ok());
    }

    #[test]
    fn debug_hides_key_material() {
        let sk = SpendingKey([0x41u8; 32]);
        assert_eq!(format!("{sk:?}"), "SpendingKey(..)");
    }
}
