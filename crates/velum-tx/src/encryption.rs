//! Output-note encryption.
//!
//! Each description carries one ephemeral key; every output plaintext is
//! encrypted under a ChaCha20-Poly1305 key derived from the ephemeral
//! Diffie–Hellman shared secret with that output's transmission key,
//! bound to `h_sig` and the output index.

use borsh::{BorshDeserialize, BorshSerialize};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use k256::ecdh::EphemeralSecret;
use k256::{PublicKey, SecretKey};
use rand_core::OsRng;

use velum_core::{
    hash32, note_commitment, Commitment, Hash32, DS_ENC_KEY, TRANSMISSION_KEY_LEN,
};

use crate::error::TxError;
use crate::note::{JsOutput, Note};

/// The fields a recipient needs to reconstruct a note.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NotePlaintext {
    /// Note value in atoms.
    pub value: u64,
    /// Nullifier seed.
    pub rho: [u8; 32],
    /// Commitment trapdoor.
    pub r: [u8; 32],
    /// Cleartext memo.
    pub memo: Vec<u8>,
}

/// Ciphertexts of a description's outputs plus the ephemeral key.
#[derive(Clone, Debug)]
pub struct EncryptedNotes {
    /// One ciphertext per output, in output order.
    pub ciphertexts: Vec<Vec<u8>>,
    /// Compressed SEC1 ephemeral public key.
    pub ephemeral_pubkey: [u8; TRANSMISSION_KEY_LEN],
}

fn symmetric_key(shared: &[u8], epk: &[u8], h_sig: &Hash32, index: usize) -> [u8; 32] {
    let mut input = Vec::with_capacity(shared.len() + epk.len() + 33);
    input.extend_from_slice(shared);
    input.extend_from_slice(epk);
    input.extend_from_slice(h_sig.as_bytes());
    input.push(index as u8);
    *hash32(DS_ENC_KEY, &input).as_bytes()
}

/// Encrypt every output note under its transmission key.
pub fn encrypt_output_notes(
    outputs: &[JsOutput],
    h_sig: &Hash32,
) -> Result<EncryptedNotes, TxError> {
    let esk = EphemeralSecret::random(&mut OsRng);
    let epk_point = esk.public_key();
    let epk_encoded = epk_point.to_sec1_bytes();
    let mut ephemeral_pubkey = [0u8; TRANSMISSION_KEY_LEN];
    ephemeral_pubkey.copy_from_slice(&epk_encoded);

    let mut ciphertexts = Vec::with_capacity(outputs.len());
    for (index, output) in outputs.iter().enumerate() {
        let pk = PublicKey::from_sec1_bytes(&output.enc_key)
            .map_err(|_| TxError::NoteEncryption("invalid transmission key"))?;
        let shared = esk.diffie_hellman(&pk);
        let key = symmetric_key(
            shared.raw_secret_bytes().as_slice(),
            &ephemeral_pubkey,
            h_sig,
            index,
        );

        let plaintext = NotePlaintext {
            value: output.note.value,
            rho: output.note.rho,
            r: output.note.r,
            memo: output.note.memo.clone(),
        };
        let bytes = borsh::to_vec(&plaintext)
            .map_err(|_| TxError::NoteEncryption("plaintext encoding failed"))?;

        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| TxError::NoteEncryption("bad symmetric key"))?;
        // The key is unique per (ephemeral key, output index); a fixed
        // nonce is safe here.
        let nonce = Nonce::default();
        let ciphertext = cipher
            .encrypt(&nonce, bytes.as_slice())
            .map_err(|_| TxError::NoteEncryption("encryption failed"))?;
        ciphertexts.push(ciphertext);
    }

    Ok(EncryptedNotes {
        ciphertexts,
        ephemeral_pubkey,
    })
}

/// Attempt to decrypt one output of a description with a viewing secret.
///
/// Returns the reconstructed note only when the recomputed commitment
/// matches the on-chain `commitment`, so a successful decryption is also
/// an ownership proof.
pub fn try_decrypt_note(
    viewing: &SecretKey,
    apk: &[u8; 32],
    ephemeral_pubkey: &[u8; TRANSMISSION_KEY_LEN],
    h_sig: &Hash32,
    index: usize,
    ciphertext: &[u8],
    commitment: &Commitment,
) -> Option<Note> {
    let epk = PublicKey::from_sec1_bytes(ephemeral_pubkey).ok()?;
    let shared = k256::ecdh::diffie_hellman(viewing.to_nonzero_scalar(), epk.as_affine());
    let key = symmetric_key(
        shared.raw_secret_bytes().as_slice(),
        ephemeral_pubkey,
        h_sig,
        index,
    );

    let cipher = ChaCha20Poly1305::new_from_slice(&key).ok()?;
    let nonce = Nonce::default();
    let bytes = cipher.decrypt(&nonce, ciphertext).ok()?;
    let plaintext = NotePlaintext::try_from_slice(&bytes).ok()?;

    let note = Note {
        value: plaintext.value,
        apk: *apk,
        rho: plaintext.rho,
        r: plaintext.r,
        memo: plaintext.memo,
    };
    if note_commitment(note.value, apk, &note.rho, &note.r) != *commitment {
        return None;
    }
    Some(note)
}
