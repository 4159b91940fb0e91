// Consensus-critical. Changes require spec update + tests.
//! The base transaction record, its canonical hash, and signing.

use borsh::{BorshDeserialize, BorshSerialize};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::generic_array::GenericArray;
use k256::EncodedPoint;
use rand_core::OsRng;
use std::time::{SystemTime, UNIX_EPOCH};

use velum_core::{
    double_hash32, write_varint, ShardId, TxId, PROTOCOL_VERSION, SIG_LEN, SIG_PUBKEY_LEN,
};

use crate::error::TxError;
use crate::joinsplit::JoinSplitDesc;

/// Transaction kind tag; carried in the canonical record as UTF-8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum TxKind {
    /// Ordinary shielded transfer.
    Normal,
    /// Reward-minting (coinbase) form; never relayed.
    Salary,
    /// Loan request carrying the borrower's parameters.
    LoanRequest,
    /// Lender's accept/reject answer to a request.
    LoanResponse,
    /// Repayment against an accepted loan.
    LoanPayment,
    /// Withdrawal revealing the request's key preimage.
    LoanWithdraw,
    /// Dividend distribution to token holders.
    DividendPayout,
    /// Validator-candidate registration.
    RegisterCandidate,
}

impl TxKind {
    /// Stable UTF-8 tag used in the canonical record.
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Normal => "normal",
            TxKind::Salary => "salary",
            TxKind::LoanRequest => "loan-request",
            TxKind::LoanResponse => "loan-response",
            TxKind::LoanPayment => "loan-payment",
            TxKind::LoanWithdraw => "loan-withdraw",
            TxKind::DividendPayout => "dividend-payout",
            TxKind::RegisterCandidate => "register-candidate",
        }
    }
}

/// A signed bundle of join-split descriptions.
///
/// Immutable after signing: the signature covers the canonical hash of
/// every other field.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    /// Protocol version.
    pub version: i8,
    /// Kind tag.
    pub kind: TxKind,
    /// Creation time (Unix seconds).
    pub lock_time: i64,
    /// Fee in atoms; applied by the first description only.
    pub fee: u64,
    /// The join-split descriptions, in construction order.
    pub descs: Vec<JoinSplitDesc>,
    /// Uncompressed `X || Y` signing key.
    pub sig_pubkey: [u8; SIG_PUBKEY_LEN],
    /// Fixed `r || s` signature; absent until signed.
    pub sig: Option<[u8; SIG_LEN]>,
    /// Last byte of the sender address: the sender's shard id.
    pub address_last_byte: u8,
}

impl Transaction {
    /// Fresh unsigned transaction with a newly generated signing key.
    pub fn template(kind: TxKind, sender_shard: ShardId) -> (Self, SigningKey) {
        let signing_key = SigningKey::random(&mut OsRng);
        let sig_pubkey = encode_sig_pubkey(&signing_key);
        let lock_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let tx = Self {
            version: PROTOCOL_VERSION,
            kind,
            lock_time,
            fee: 0,
            descs: Vec::new(),
            sig_pubkey,
            sig: None,
            address_last_byte: sender_shard,
        };
        (tx, signing_key)
    }

    /// Canonical record:
    /// `version ‖ kind ‖ lock_time ‖ fee ‖ varint(desc_count) ‖ descs ‖
    /// sig_pubkey ‖ [sig] ‖ address_last_byte`.
    pub fn encode_record(&self, include_sig: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.version as u8);
        out.extend_from_slice(self.kind.as_str().as_bytes());
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        write_varint(&mut out, self.descs.len() as u64);
        for desc in &self.descs {
            desc.encode_canonical(&mut out);
        }
        out.extend_from_slice(&self.sig_pubkey);
        if include_sig {
            if let Some(sig) = &self.sig {
                out.extend_from_slice(sig);
            }
        }
        out.push(self.address_last_byte);
        out
    }

    /// Canonical transaction hash: `H(H(record))` with the signature
    /// bytes omitted, so the hash is stable across signing.
    pub fn hash(&self) -> TxId {
        double_hash32(&self.encode_record(false))
    }

    /// Sign the canonical hash. Fails on an already-signed transaction.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), TxError> {
        if self.sig.is_some() {
            return Err(TxError::MalformedTransaction(
                "transaction is already signed",
            ));
        }
        if encode_sig_pubkey(key) != self.sig_pubkey {
            return Err(TxError::MalformedTransaction(
                "signing key does not match sig_pubkey",
            ));
        }
        let digest = self.hash();
        let signature: Signature = key.sign(digest.as_bytes());
        let mut bytes = [0u8; SIG_LEN];
        bytes.copy_from_slice(signature.to_bytes().as_slice());
        self.sig = Some(bytes);
        Ok(())
    }

    /// Verify the signature over the canonical hash.
    pub fn verify_signature(&self) -> Result<(), TxError> {
        let Some(sig_bytes) = &self.sig else {
            return Err(TxError::SignatureInvalid);
        };
        let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(&self.sig_pubkey));
        let verifying_key =
            VerifyingKey::from_encoded_point(&point).map_err(|_| TxError::SignatureInvalid)?;
        let signature =
            Signature::from_slice(sig_bytes).map_err(|_| TxError::SignatureInvalid)?;
        let digest = self.hash();
        verifying_key
            .verify(digest.as_bytes(), &signature)
            .map_err(|_| TxError::SignatureInvalid)
    }

    /// Sum of every description's minted reward.
    pub fn total_reward(&self) -> u64 {
        self.descs.iter().map(|d| d.reward).sum()
    }

    /// Whether any description mints reward.
    pub fn carries_reward(&self) -> bool {
        self.descs.iter().any(|d| d.reward != 0)
    }

    /// The salary/coinbase shape: exactly one description minting reward.
    pub fn is_salary_form(&self) -> bool {
        self.descs.len() == 1 && self.descs[0].reward > 0
    }

    /// Estimated virtual size in kilobytes.
    pub fn virtual_size(&self) -> u64 {
        let version = 1u64;
        let kind = 8u64;
        let lock_time = 8u64;
        let fee = 8u64;
        let descs = (self.descs.len().max(1) as u64) * JoinSplitDesc::estimate_size();
        let keys = SIG_PUBKEY_LEN as u64 + SIG_LEN as u64;
        let bytes = version + kind + lock_time + fee + descs + keys;
        bytes.div_ceil(1024)
    }
}

/// Estimated size in kilobytes of a transfer built from `usable_notes`
/// inputs and `payments` outputs.
pub fn estimate_tx_size(usable_notes: usize, payments: usize) -> u64 {
    let header = 1u64 + 8 + 8 + 8;
    let desc_count = (usable_notes + payments).saturating_sub(3).max(1) as u64;
    let keys = SIG_PUBKEY_LEN as u64 + SIG_LEN as u64;
    (header + desc_count * JoinSplitDesc::estimate_size() + keys).div_ceil(1024)
}

fn plaintext_value(tx: &Transaction) -> u64 {
    tx.descs
        .iter()
        .filter_map(|d| d.notes.as_ref())
        .flatten()
        .map(|n| n.value)
        .sum()
}

/// Stable-sort transactions by the total value of their plaintext notes.
pub fn sort_by_total_value(txs: &mut [Transaction], ascending: bool) {
    txs.sort_by(|a, b| {
        let va = plaintext_value(a);
        let vb = plaintext_value(b);
        if ascending {
            va.cmp(&vb)
        } else {
            vb.cmp(&va)
        }
    });
}

fn encode_sig_pubkey(key: &SigningKey) -> [u8; SIG_PUBKEY_LEN] {
    let point = key.verifying_key().to_encoded_point(false);
    let mut out = [0u8; SIG_PUBKEY_LEN];
    // Skip the 0x04 uncompressed tag.
    out.copy_from_slice(&point.as_bytes()[1..]);
    out
}
