//! Ledger errors.

use thiserror::Error;

use velum_core::TxId;
use velum_state::StateError;
use velum_tx::TxError;

/// Errors surfaced by the persisted ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Storage or reload failure. Fatal: the node must halt.
    #[error(transparent)]
    State(#[from] StateError),

    /// A transaction in the block failed validation; the whole block is
    /// rejected and in-memory state must be discarded.
    #[error("transaction {tx} rejected: {source}")]
    TxRejected {
        /// Hash of the offending transaction.
        tx: TxId,
        /// The underlying validation failure.
        #[source]
        source: TxError,
    },

    /// A transaction's sender shard disagrees with the block's shard.
    #[error("transaction shard does not match block shard")]
    ShardMismatch,

    /// The chain-state lock was poisoned by a panicking writer.
    #[error("chain state lock poisoned")]
    LockPoisoned,
}
