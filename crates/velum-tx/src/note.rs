//! Plaintext note records and the join-split input/output slots.

use borsh::{BorshDeserialize, BorshSerialize};
use rand_core::{OsRng, RngCore};

use velum_core::{
    derive_nullifier, note_commitment, payment_address, Commitment, Nullifier, PaymentAddress,
    SpendingKey, TRANSMISSION_KEY_LEN,
};

use crate::witness::MerkleWitness;

/// A spendable value record.
///
/// `commitment = H(value, apk, rho, r)` appears on chain when the note is
/// created; `nullifier = PRF(sk, rho)` is published when it is spent. A
/// note is destroyed (logically) when its nullifier first appears.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Note {
    /// Value in atoms.
    pub value: u64,
    /// Spend address of the owner.
    pub apk: [u8; 32],
    /// Nullifier seed, fixed by the prover for output notes.
    pub rho: [u8; 32],
    /// Commitment trapdoor.
    pub r: [u8; 32],
    /// Optional cleartext memo carried to the recipient.
    pub memo: Vec<u8>,
}

impl Note {
    /// A payment note whose `rho`/`r` the prover will fill in.
    pub fn pay(value: u64, apk: [u8; 32], memo: Vec<u8>) -> Self {
        Self {
            value,
            apk,
            rho: [0u8; 32],
            r: [0u8; 32],
            memo,
        }
    }

    /// A zero-value note bound to the given key with fresh randomness.
    pub fn dummy(sk: &SpendingKey) -> Self {
        let mut rho = [0u8; 32];
        let mut r = [0u8; 32];
        OsRng.fill_bytes(&mut rho);
        OsRng.fill_bytes(&mut r);
        Self {
            value: 0,
            apk: velum_core::spend_address(sk),
            rho,
            r,
            memo: Vec::new(),
        }
    }

    /// The commitment binding this note.
    pub fn commitment(&self) -> Commitment {
        note_commitment(self.value, &self.apk, &self.rho, &self.r)
    }

    /// The nullifier this note publishes when spent with `sk`.
    pub fn nullifier(&self, sk: &SpendingKey) -> Nullifier {
        derive_nullifier(sk, &self.rho)
    }
}

/// One input slot of a join-split description.
#[derive(Clone, Debug)]
pub struct JsInput {
    /// The note being spent.
    pub note: Note,
    /// Key authorizing the spend.
    pub key: SpendingKey,
    /// Witness path rooted at the input's anchor.
    pub witness: MerkleWitness,
}

impl JsInput {
    /// Dummy input: zero-value note under a random key with a dummy path.
    pub fn dummy() -> Self {
        let key = SpendingKey::random();
        Self {
            note: Note::dummy(&key),
            key,
            witness: MerkleWitness::dummy(),
        }
    }

    /// The nullifier this input publishes.
    pub fn nullifier(&self) -> Nullifier {
        self.note.nullifier(&self.key)
    }
}

/// One output slot of a join-split description.
#[derive(Clone, Debug)]
pub struct JsOutput {
    /// The note being created.
    pub note: Note,
    /// Transmission key the note plaintext is encrypted under.
    pub enc_key: [u8; TRANSMISSION_KEY_LEN],
}

impl JsOutput {
    /// An output paying `value` to `address`.
    pub fn to(address: &PaymentAddress, value: u64, memo: Vec<u8>) -> Self {
        Self {
            note: Note::pay(value, address.apk, memo),
            enc_key: address.pk_enc,
        }
    }

    /// Dummy output: zero-value note to a fresh random address.
    pub fn dummy() -> Self {
        let key = SpendingKey::random();
        let address = payment_address(&key);
        Self {
            note: Note::dummy(&key),
            enc_key: address.pk_enc,
        }
    }
}
