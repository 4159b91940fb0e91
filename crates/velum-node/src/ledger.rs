//! The persisted ledger and the block-apply path.
//!
//! One writer, many readers: `apply_block` holds the chain-state write
//! lock for the whole block, so frontier appends and nullifier insertions
//! become visible atomically. Mempool-facing checks take shared locks.
//! Any error out of `apply_block` is fatal for this process: partially
//! applied in-memory state must not be reused.

use std::sync::{Arc, RwLock};

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, info};

use velum_core::{to_bytes, Hash32, Hasher, Nullifier, ShardId, TxId};
use velum_state::{
    load_accumulator, load_anchors, load_nullifiers, load_shard_ids, loan_key, persist_append,
    persist_nullifier, record_anchor, tx_key, AnchorRegistry, ChainHandle, ChainState,
    IncrementalAccumulator, KvStore, NullifierInsert, ShardLedger, StateError,
};
use velum_tx::{
    DividendView, LedgerView, LoanParams, Transaction, TransactionVariant, TxError, Validator,
    ZkOracle,
};

use crate::error::LedgerError;

/// Minimal block container the apply path consumes.
///
/// Consensus (voting, headers, proof-of-whatever) lives outside this core;
/// a block here is an ordered batch of transactions for one shard.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    /// Protocol version.
    pub version: i8,
    /// Shard this block extends.
    pub shard: ShardId,
    /// Height within the shard.
    pub height: u64,
    /// Transactions, in application order.
    pub txs: Vec<TransactionVariant>,
}

/// The process-wide persisted ledger.
pub struct Ledger {
    kv: Arc<dyn KvStore>,
    chain: ChainHandle,
    hasher: Arc<dyn Hasher>,
    loan_params: RwLock<LoanParams>,
}

impl Ledger {
    /// Open the ledger, reloading every shard's frontier, anchors, and
    /// nullifiers from the store.
    pub fn open(kv: Arc<dyn KvStore>, hasher: Arc<dyn Hasher>) -> Result<Self, LedgerError> {
        let mut state = ChainState::new(Arc::clone(&hasher));

        for shard in load_shard_ids(&*kv)? {
            let accumulator = load_accumulator(&*kv, shard, Arc::clone(&hasher))?;
            let recorded = load_anchors(&*kv, shard)?;
            info!(
                "reloaded shard {shard}: {} commitments, {} anchors",
                accumulator.length(),
                recorded.len(),
            );
            let mut anchors = AnchorRegistry::new();
            for (length, root) in recorded {
                anchors.record(length, root);
            }
            state.install_shard(shard, ShardLedger { accumulator, anchors });
        }

        for (shard, nf) in load_nullifiers(&*kv)? {
            state.nullifiers.insert(shard, nf);
        }

        Ok(Self {
            kv,
            chain: Arc::new(RwLock::new(state)),
            hasher,
            loan_params: RwLock::new(LoanParams::default()),
        })
    }

    /// Handle to the shared chain state.
    pub fn chain(&self) -> ChainHandle {
        Arc::clone(&self.chain)
    }

    /// Replace the chain's loan parameters (governance path).
    pub fn set_loan_params(&self, params: LoanParams) -> Result<(), LedgerError> {
        *self
            .loan_params
            .write()
            .map_err(|_| LedgerError::LockPoisoned)? = params;
        Ok(())
    }

    fn current_loan_params(&self) -> Result<LoanParams, LedgerError> {
        self.loan_params
            .read()
            .map(|p| *p)
            .map_err(|_| LedgerError::LockPoisoned)
    }

    /// Apply one block under the exclusive lock.
    ///
    /// Transactions are validated and applied in order; within a
    /// transaction, nullifier insertions and commitment appends happen in
    /// description order. A rejected transaction rejects the whole block.
    pub fn apply_block(
        &self,
        block: &Block,
        oracle: &dyn ZkOracle,
        dividends: Option<&dyn DividendView>,
    ) -> Result<(), LedgerError> {
        let loan_params = self.current_loan_params()?;
        let mut state = self.chain.write().map_err(|_| LedgerError::LockPoisoned)?;

        for variant in &block.txs {
            let base = variant.base();
            let hash = variant.hash();
            if base.address_last_byte != block.shard {
                return Err(LedgerError::ShardMismatch);
            }

            {
                let view = StateView {
                    state: &state,
                    kv: &*self.kv,
                    hasher: Arc::clone(&self.hasher),
                    loan_params,
                };
                let validator = Validator::new(&view, oracle);
                validator
                    .validate_variant(variant, block.shard, dividends)
                    .map_err(|source| LedgerError::TxRejected { tx: hash, source })?;
            }

            self.apply_descriptions(&mut state, block.shard, base)?;
            self.store_record(variant, &hash)?;
            debug!("applied transaction {hash}");
        }

        info!(
            "applied block shard {} height {} ({} txs)",
            block.shard,
            block.height,
            block.txs.len()
        );
        Ok(())
    }

    fn apply_descriptions(
        &self,
        state: &mut ChainState,
        shard: ShardId,
        tx: &Transaction,
    ) -> Result<(), LedgerError> {
        for desc in &tx.descs {
            for nf in &desc.nullifiers {
                if state.nullifiers.insert(shard, *nf) == NullifierInsert::AlreadyPresent {
                    // Validation passed moments ago under the same lock.
                    return Err(StateError::CorruptState(
                        "validated nullifier already present",
                    )
                    .into());
                }
                persist_nullifier(&*self.kv, shard, nf)?;
            }

            let ledger_shard = state.shard_mut(shard);
            let leaves: Vec<[u8; 32]> = desc.commitments.iter().map(|c| *c.as_bytes()).collect();
            persist_append(&*self.kv, shard, &mut ledger_shard.accumulator, &leaves)?;
            let root = record_anchor(&*self.kv, shard, &ledger_shard.accumulator)?;
            ledger_shard
                .anchors
                .record(ledger_shard.accumulator.length(), root);
        }
        Ok(())
    }

    fn store_record(&self, variant: &TransactionVariant, hash: &TxId) -> Result<(), LedgerError> {
        let bytes = to_bytes(variant)
            .map_err(|_| StateError::CorruptState("transaction record encoding failed"))?;
        self.kv.put(&tx_key(hash), &bytes)?;

        let loan_id = match variant {
            TransactionVariant::LoanRequest(t) => Some(t.data.loan_id.clone()),
            TransactionVariant::LoanResponse(t) => Some(t.data.loan_id.clone()),
            _ => None,
        };
        if let Some(loan_id) = loan_id {
            let key = loan_key(&loan_id);
            let mut ids: Vec<TxId> = match self.kv.get(&key)? {
                Some(bytes) => Vec::<TxId>::try_from_slice(&bytes)
                    .map_err(|_| StateError::CorruptState("loan index decoding failed"))?,
                None => Vec::new(),
            };
            ids.push(*hash);
            let bytes = to_bytes(&ids)
                .map_err(|_| StateError::CorruptState("loan index encoding failed"))?;
            self.kv.put(&key, &bytes)?;
        }
        Ok(())
    }

    /// Stored transactions indexed under a loan id, in storage order.
    pub fn loan_transactions(
        &self,
        loan_id: &[u8],
    ) -> Result<Vec<TransactionVariant>, LedgerError> {
        let ids: Vec<TxId> = match self.kv.get(&loan_key(loan_id))? {
            Some(bytes) => Vec::<TxId>::try_from_slice(&bytes)
                .map_err(|_| StateError::CorruptState("loan index decoding failed"))?,
            None => Vec::new(),
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.kv.get(&tx_key(&id))? {
                let variant = TransactionVariant::try_from_slice(&bytes)
                    .map_err(|_| StateError::CorruptState("transaction record decoding failed"))?;
                out.push(variant);
            }
        }
        Ok(out)
    }

    /// Mempool-facing double-spend check under a shared lock.
    pub fn check_double_spend(
        &self,
        tx: &Transaction,
        oracle: &dyn ZkOracle,
    ) -> Result<(), LedgerError> {
        let loan_params = self.current_loan_params()?;
        let state = self.chain.read().map_err(|_| LedgerError::LockPoisoned)?;
        let view = StateView {
            state: &state,
            kv: &*self.kv,
            hasher: Arc::clone(&self.hasher),
            loan_params,
        };
        Validator::new(&view, oracle)
            .validate_double_spend(tx)
            .map_err(|source| LedgerError::TxRejected {
                tx: tx.hash(),
                source,
            })
    }

    /// Relay-path validation under a shared lock.
    pub fn validate_for_relay(
        &self,
        tx: &Transaction,
        oracle: &dyn ZkOracle,
    ) -> Result<(), LedgerError> {
        let loan_params = self.current_loan_params()?;
        let state = self.chain.read().map_err(|_| LedgerError::LockPoisoned)?;
        let view = StateView {
            state: &state,
            kv: &*self.kv,
            hasher: Arc::clone(&self.hasher),
            loan_params,
        };
        Validator::new(&view, oracle)
            .validate_for_relay(tx)
            .map_err(|source| LedgerError::TxRejected {
                tx: tx.hash(),
                source,
            })
    }
}

/// Validator-facing view over the locked chain state plus the store.
struct StateView<'a> {
    state: &'a ChainState,
    kv: &'a dyn KvStore,
    hasher: Arc<dyn Hasher>,
    loan_params: LoanParams,
}

impl LedgerView for StateView<'_> {
    fn anchor_location(&self, root: &Hash32) -> Option<(ShardId, u64)> {
        for shard in self.state.shard_ids() {
            if let Some(length) = self
                .state
                .shard(shard)
                .and_then(|l| l.anchors.length_of(root))
            {
                return Some((shard, length));
            }
        }
        None
    }

    fn accumulator_at(
        &self,
        shard: ShardId,
        length: u64,
    ) -> Result<IncrementalAccumulator, TxError> {
        Ok(velum_state::load_accumulator_at(
            self.kv,
            shard,
            length,
            Arc::clone(&self.hasher),
        )?)
    }

    fn latest_anchor(&self, shard: ShardId) -> Option<(u64, Hash32)> {
        self.state.shard(shard).and_then(|l| l.anchors.latest())
    }

    fn nullifier_shard(&self, nf: &Nullifier) -> Option<ShardId> {
        self.state.nullifiers.contains_any(nf)
    }

    fn loan_txs(&self, loan_id: &[u8]) -> Result<Vec<TxId>, TxError> {
        match self.kv.get(&loan_key(loan_id))? {
            Some(bytes) => Vec::<TxId>::try_from_slice(&bytes)
                .map_err(|_| TxError::CorruptState("loan index decoding failed")),
            None => Ok(Vec::new()),
        }
    }

    fn transaction(&self, id: &TxId) -> Result<Option<TransactionVariant>, TxError> {
        match self.kv.get(&tx_key(id))? {
            Some(bytes) => TransactionVariant::try_from_slice(&bytes)
                .map(Some)
                .map_err(|_| TxError::CorruptState("transaction record decoding failed")),
            None => Ok(None),
        }
    }

    fn loan_params(&self, _shard: ShardId) -> LoanParams {
        self.loan_params
    }

    fn loan_id_exists(&self, loan_id: &[u8]) -> Result<bool, TxError> {
        Ok(self.kv.get(&loan_key(loan_id))?.is_some())
    }
}
