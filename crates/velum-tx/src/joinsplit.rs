//! Join-split descriptions: the atomic unit of shielded value transfer.

use borsh::{BorshDeserialize, BorshSerialize};

use velum_core::{
    write_varint, Commitment, Hash32, Nullifier, TRANSMISSION_KEY_LEN,
};

use crate::note::Note;

/// Coin direction marker carried by each description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum DescKind {
    /// Standard shielded transfer creating output coins.
    OutCoin,
    /// Conversion form consuming transparent value.
    InCoin,
}

impl DescKind {
    const fn tag(self) -> u8 {
        match self {
            DescKind::OutCoin => 0,
            DescKind::InCoin => 1,
        }
    }
}

/// One join-split: fixed-shape inputs and outputs plus a zk proof.
///
/// Immutable once the enclosing transaction is signed. Each input's anchor
/// must equal the accumulator root of some prior state of the chain the
/// input came from; `sum(inputs) + reward = sum(outputs) + fee_contribution`
/// is enforced by the proof.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct JoinSplitDesc {
    /// Anchor root per input, in input order.
    pub anchors: Vec<Hash32>,
    /// Nullifier per input.
    pub nullifiers: Vec<Nullifier>,
    /// Commitment per output.
    pub commitments: Vec<Commitment>,
    /// Opaque zk proof.
    pub proof: Vec<u8>,
    /// Output-note ciphertexts, in output order.
    pub encrypted_notes: Vec<Vec<u8>>,
    /// Ephemeral key the ciphertexts were derived from.
    pub ephemeral_pubkey: [u8; TRANSMISSION_KEY_LEN],
    /// Seed that produced this description's `h_sig`.
    pub h_sig_seed: [u8; 32],
    /// Coin direction.
    pub kind: DescKind,
    /// Minted value; zero outside the salary form.
    pub reward: u64,
    /// Ownership MAC per input.
    pub macs: Vec<Hash32>,
    /// Plaintext output notes, attached only by non-privacy variants
    /// (loan payments, dividend payouts, salary).
    pub notes: Option<Vec<Note>>,
}

impl JoinSplitDesc {
    /// Append this description's canonical bytes to `out`.
    ///
    /// Part of the transaction signing record; every field participates.
    pub fn encode_canonical(&self, out: &mut Vec<u8>) {
        write_varint(out, self.anchors.len() as u64);
        for anchor in &self.anchors {
            out.extend_from_slice(anchor.as_bytes());
        }
        write_varint(out, self.nullifiers.len() as u64);
        for nf in &self.nullifiers {
            out.extend_from_slice(nf.as_bytes());
        }
        write_varint(out, self.commitments.len() as u64);
        for cm in &self.commitments {
            out.extend_from_slice(cm.as_bytes());
        }
        write_varint(out, self.proof.len() as u64);
        out.extend_from_slice(&self.proof);
        write_varint(out, self.encrypted_notes.len() as u64);
        for ct in &self.encrypted_notes {
            write_varint(out, ct.len() as u64);
            out.extend_from_slice(ct);
        }
        out.extend_from_slice(&self.ephemeral_pubkey);
        out.extend_from_slice(&self.h_sig_seed);
        out.push(self.kind.tag());
        out.extend_from_slice(&self.reward.to_le_bytes());
        write_varint(out, self.macs.len() as u64);
        for mac in &self.macs {
            out.extend_from_slice(mac.as_bytes());
        }
        match &self.notes {
            None => out.push(0),
            Some(notes) => {
                out.push(1);
                write_varint(out, notes.len() as u64);
                for note in notes {
                    out.extend_from_slice(&note.value.to_le_bytes());
                    out.extend_from_slice(&note.apk);
                    out.extend_from_slice(&note.rho);
                    out.extend_from_slice(&note.r);
                    write_varint(out, note.memo.len() as u64);
                    out.extend_from_slice(&note.memo);
                }
            }
        }
    }

    /// Estimated serialized size of one description, in bytes.
    pub fn estimate_size() -> u64 {
        let anchors = 2 * 32;
        let nullifiers = 2 * 32;
        let commitments = 2 * 32;
        let proof = 192;
        let ciphertexts = 2 * 120;
        let epk = TRANSMISSION_KEY_LEN as u64;
        let seed = 32;
        let tail = 1 + 8 + 2 * 32;
        anchors + nullifiers + commitments + proof + ciphertexts + epk + seed + tail
    }
}
