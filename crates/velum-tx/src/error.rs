//! Transaction construction and validation errors.
//!
//! Policy: transient errors (proof, signature, balance) reject the
//! offending transaction without blocking others; state errors are fatal
//! and propagate through the block-apply path. Every rejection is recorded
//! against the transaction hash by the caller.

use thiserror::Error;

use velum_core::{Commitment, Hash32, ShardId, TxId};
use velum_state::StateError;

/// Errors produced while building or validating transactions.
#[derive(Debug, Error)]
pub enum TxError {
    /// The witness root computed over the supplied commitments does not
    /// match the caller-provided anchor for this shard.
    #[error("anchor mismatch on shard {shard}: expected {expected}, computed {computed}")]
    AnchorMismatch {
        /// Shard whose anchor disagreed.
        shard: ShardId,
        /// Anchor supplied by the caller.
        expected: Hash32,
        /// Root computed from the commitments list.
        computed: Hash32,
    },

    /// An anchor is not present in any stored root history.
    #[error("unknown anchor {anchor}")]
    AnchorUnknown {
        /// The unrecognized anchor root.
        anchor: Hash32,
    },

    /// A nullifier is already present, or repeats within the transaction.
    #[error("double spend in transaction {0}")]
    DoubleSpend(TxId),

    /// Total sender value is below payments plus fee.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The first description's inputs cannot cover the fee.
    #[error("input note values too small to pay fee")]
    FeeUnpayable,

    /// An input's commitment is absent from the expected shard.
    #[error("commitment {commitment} missing from shard {shard}")]
    CommitmentMissing {
        /// Shard whose commitment list was consulted.
        shard: ShardId,
        /// The missing commitment.
        commitment: Commitment,
    },

    /// The zk oracle rejected the proof.
    #[error("proof invalid")]
    ProofInvalid,

    /// The transaction signature does not verify.
    #[error("signature invalid")]
    SignatureInvalid,

    /// `sum(inputs) + reward != sum(outputs) + fee`.
    #[error("balance mismatch")]
    BalanceMismatch,

    /// Structural violation (arity, missing field, wrong kind).
    #[error("malformed transaction: {0}")]
    MalformedTransaction(&'static str),

    /// Note encryption or decryption failed.
    #[error("note encryption failed: {0}")]
    NoteEncryption(&'static str),

    /// Loan request parameters disagree with the chain's current params.
    #[error("loan params mismatch")]
    LoanParamsMismatch,

    /// The loan id already exists on some shard.
    #[error("duplicate loan id")]
    DuplicateLoanId,

    /// No stored loan request matches the referenced id.
    #[error("loan request missing")]
    LoanRequestMissing,

    /// No accepted loan response matches the referenced id.
    #[error("loan response missing")]
    LoanResponseMissing,

    /// The referenced loan already has a response.
    #[error("loan already responded")]
    LoanAlreadyResponded,

    /// SHAKE-256 of the provided key does not match the request digest.
    #[error("loan key mismatch")]
    LoanKeyMismatch,

    /// The recipient is not in the computed holder list.
    #[error("recipient not eligible for dividend")]
    DividendIneligible,

    /// A recipient UTXO already carries a payout marker at or past this
    /// proposal.
    #[error("dividend already paid")]
    DividendAlreadyPaid,

    /// A payout note value disagrees with the computed amount.
    #[error("dividend amount mismatch")]
    DividendAmountMismatch,

    /// A holder appears more than once in the computed payout list.
    #[error("duplicate dividend entry")]
    DividendDuplicate,

    /// Persisted state is inconsistent. Fatal.
    #[error("corrupt state: {0}")]
    CorruptState(&'static str),

    /// Underlying state/storage failure. Fatal.
    #[error(transparent)]
    State(#[from] StateError),
}
