//! Transaction validation against chain state.
//!
//! Per description: anchor freshness, nullifier uniqueness, balance (via
//! the proof, and directly wherever plaintext notes are disclosed),
//! signature, and proof verification. Double-spend checking is a dedicated
//! step because the mempool invokes it independently.
//!
//! Anchors of descriptions after the first may reference roots that only
//! exist once the transaction's own earlier outputs are appended; those
//! interstitial roots are recomputed here by replaying the earlier
//! descriptions on a frontier loaded at a recorded historical length.

use hashbrown::HashSet;

use velum_core::{shake256_digest, Hash32, Nullifier, ShardId, TxId, JS_INPUTS, JS_OUTPUTS};
use velum_state::IncrementalAccumulator;

use crate::error::TxError;
use crate::oracle::{VerifyContext, ZkOracle};
use crate::tx::Transaction;
use crate::variants::{
    LoanParams, LoanResponseKind, PayoutProposal, TransactionVariant, TxDividendPayout,
    TxLoanPayment, TxLoanRequest, TxLoanResponse, TxLoanWithdraw,
};

/// Read access to the ledger the validator checks against.
pub trait LedgerView {
    /// Shard and length at which `root` was recorded, if ever.
    fn anchor_location(&self, root: &Hash32) -> Option<(ShardId, u64)>;

    /// The shard's accumulator as it was at `length`.
    fn accumulator_at(&self, shard: ShardId, length: u64)
        -> Result<IncrementalAccumulator, TxError>;

    /// The shard's most recent recorded `(length, root)`.
    fn latest_anchor(&self, shard: ShardId) -> Option<(u64, Hash32)>;

    /// Shard holding `nf`, if it was ever published.
    fn nullifier_shard(&self, nf: &Nullifier) -> Option<ShardId>;

    /// Hashes of stored transactions indexed under `loan_id`.
    fn loan_txs(&self, loan_id: &[u8]) -> Result<Vec<TxId>, TxError>;

    /// A stored transaction by hash.
    fn transaction(&self, id: &TxId) -> Result<Option<TransactionVariant>, TxError>;

    /// The chain's current loan parameters for `shard`.
    fn loan_params(&self, shard: ShardId) -> LoanParams;

    /// Whether `loan_id` exists on any shard.
    fn loan_id_exists(&self, loan_id: &[u8]) -> Result<bool, TxError>;
}

/// Token-holder data the dividend rules consume.
///
/// Balances and reward markers belong to the token subsystem, an external
/// collaborator; the validator only reads them.
pub trait DividendView {
    /// Spend addresses holding the token.
    fn token_holders(&self, token_id: &Hash32) -> Vec<[u8; 32]>;
    /// UTXO identifiers owned by `apk`.
    fn account_utxos(&self, apk: &[u8; 32]) -> Vec<Hash32>;
    /// Payout marker the UTXO last received.
    fn utxo_reward(&self, utxo: &Hash32) -> Result<u64, TxError>;
    /// Token value carried by the UTXO.
    fn utxo_value(&self, utxo: &Hash32) -> u64;
}

/// Validates transactions against a ledger view and the zk oracle.
pub struct Validator<'a, L: LedgerView + ?Sized> {
    ledger: &'a L,
    oracle: &'a dyn ZkOracle,
}

impl<'a, L: LedgerView + ?Sized> Validator<'a, L> {
    /// Bind a validator to its collaborators.
    pub fn new(ledger: &'a L, oracle: &'a dyn ZkOracle) -> Self {
        Self { ledger, oracle }
    }

    /// Full validation: shape, reward form, anchors, nullifiers, plaintext
    /// balance, signature, and proof.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), TxError> {
        self.check_shape(tx)?;
        self.check_reward_form(tx)?;
        self.check_anchors(tx)?;
        self.validate_double_spend(tx)?;
        self.check_plaintext_notes(tx)?;
        tx.verify_signature()?;
        self.check_proofs(tx)?;
        Ok(())
    }

    /// Relay-path validation. Reward-minting transactions must not be
    /// propagated across the network.
    pub fn validate_for_relay(&self, tx: &Transaction) -> Result<(), TxError> {
        if tx.carries_reward() {
            return Err(TxError::MalformedTransaction(
                "reward transactions are not relayed",
            ));
        }
        self.validate_transaction(tx)
    }

    /// The dedicated double-spend step: fails if any nullifier already
    /// exists on any shard, or repeats within the transaction itself.
    pub fn validate_double_spend(&self, tx: &Transaction) -> Result<(), TxError> {
        let hash = tx.hash();
        let mut seen: HashSet<Nullifier> = HashSet::new();
        for desc in &tx.descs {
            for nf in &desc.nullifiers {
                if !seen.insert(*nf) {
                    return Err(TxError::DoubleSpend(hash));
                }
                if self.ledger.nullifier_shard(nf).is_some() {
                    return Err(TxError::DoubleSpend(hash));
                }
            }
        }
        Ok(())
    }

    /// Dispatch base validation plus the variant's domain invariants.
    pub fn validate_variant(
        &self,
        variant: &TransactionVariant,
        shard: ShardId,
        dividends: Option<&dyn DividendView>,
    ) -> Result<(), TxError> {
        self.validate_transaction(variant.base())?;
        match variant {
            TransactionVariant::Normal(_)
            | TransactionVariant::Salary(_)
            | TransactionVariant::RegisterCandidate(_) => Ok(()),
            TransactionVariant::LoanRequest(t) => self.validate_loan_request(t, shard),
            TransactionVariant::LoanResponse(t) => self.validate_loan_response(t),
            TransactionVariant::LoanPayment(t) => self.validate_loan_payment(t),
            TransactionVariant::LoanWithdraw(t) => self.validate_loan_withdraw(t),
            TransactionVariant::DividendPayout(t) => match dividends {
                Some(view) => self.validate_dividend_payout(view, t),
                None => Err(TxError::MalformedTransaction(
                    "dividend payout requires token holder data",
                )),
            },
        }
    }

    fn check_shape(&self, tx: &Transaction) -> Result<(), TxError> {
        if tx.descs.is_empty() {
            return Err(TxError::MalformedTransaction("transaction has no descriptions"));
        }
        if tx.encode_record(true).len() > velum_core::MAX_TX_BYTES {
            return Err(TxError::MalformedTransaction("transaction exceeds size bound"));
        }
        for desc in &tx.descs {
            if desc.nullifiers.len() != JS_INPUTS
                || desc.anchors.len() != JS_INPUTS
                || desc.macs.len() != JS_INPUTS
                || desc.commitments.len() != JS_OUTPUTS
                || desc.encrypted_notes.len() != JS_OUTPUTS
            {
                return Err(TxError::MalformedTransaction("description arity mismatch"));
            }
        }
        Ok(())
    }

    fn check_reward_form(&self, tx: &Transaction) -> Result<(), TxError> {
        if tx.carries_reward() && !tx.is_salary_form() {
            return Err(TxError::MalformedTransaction(
                "reward requires the single-description salary form",
            ));
        }
        Ok(())
    }

    fn check_anchors(&self, tx: &Transaction) -> Result<(), TxError> {
        let sender_shard = tx.address_last_byte;
        let mut interstitial_roots: HashSet<Hash32> = HashSet::new();
        let mut interstitial: Option<IncrementalAccumulator> = None;

        for desc in &tx.descs {
            for anchor in &desc.anchors {
                if anchor.is_zero() {
                    // Reserved anchor; dummy paths validate trivially.
                    continue;
                }
                if self.ledger.anchor_location(anchor).is_some() {
                    // Historical, possibly stale. Still valid.
                    continue;
                }
                if interstitial_roots.contains(anchor) {
                    continue;
                }
                return Err(TxError::AnchorUnknown { anchor: *anchor });
            }

            // This description's outputs land on the sender shard; replay
            // them so later descriptions may anchor to the grown tree.
            if interstitial.is_none() {
                let base_length = desc
                    .anchors
                    .iter()
                    .find_map(|a| {
                        self.ledger
                            .anchor_location(a)
                            .filter(|(shard, _)| *shard == sender_shard)
                    })
                    .map(|(_, length)| length)
                    .or_else(|| self.ledger.latest_anchor(sender_shard).map(|(l, _)| l))
                    .unwrap_or(0);
                interstitial = Some(self.ledger.accumulator_at(sender_shard, base_length)?);
            }
            if let Some(acc) = interstitial.as_mut() {
                for cm in &desc.commitments {
                    acc.append(cm.as_bytes());
                }
                interstitial_roots.insert(acc.root());
            }
        }
        Ok(())
    }

    fn check_plaintext_notes(&self, tx: &Transaction) -> Result<(), TxError> {
        for (index, desc) in tx.descs.iter().enumerate() {
            let Some(notes) = &desc.notes else { continue };
            if notes.len() != desc.commitments.len() {
                return Err(TxError::MalformedTransaction(
                    "plaintext note count disagrees with commitments",
                ));
            }
            for (note, cm) in notes.iter().zip(&desc.commitments) {
                if note.commitment() != *cm {
                    return Err(TxError::MalformedTransaction(
                        "plaintext note does not bind its commitment",
                    ));
                }
            }
            if desc.reward > 0 {
                // Salary form: no real inputs, so the disclosed outputs
                // plus the fee must consume the minted value exactly.
                let fee = if index == 0 { tx.fee } else { 0 };
                let out_total = notes
                    .iter()
                    .try_fold(0u64, |acc, n| acc.checked_add(n.value))
                    .ok_or(TxError::BalanceMismatch)?;
                if out_total.checked_add(fee) != Some(desc.reward) {
                    return Err(TxError::BalanceMismatch);
                }
            }
        }
        Ok(())
    }

    fn check_proofs(&self, tx: &Transaction) -> Result<(), TxError> {
        for desc in &tx.descs {
            let ok = self.oracle.verify(&VerifyContext {
                proof: &desc.proof,
                sig_pubkey: &tx.sig_pubkey,
                anchors: &desc.anchors,
                nullifiers: &desc.nullifiers,
                commitments: &desc.commitments,
                macs: &desc.macs,
                reward: desc.reward,
            });
            if !ok {
                return Err(TxError::ProofInvalid);
            }
        }
        Ok(())
    }

    /// Loan request: params must match the chain's and the id must be new.
    pub fn validate_loan_request(
        &self,
        tx: &TxLoanRequest,
        shard: ShardId,
    ) -> Result<(), TxError> {
        if tx.data.params != self.ledger.loan_params(shard) {
            return Err(TxError::LoanParamsMismatch);
        }
        if self.ledger.loan_id_exists(&tx.data.loan_id)? {
            return Err(TxError::DuplicateLoanId);
        }
        Ok(())
    }

    /// Loan response: a stored request must exist and must not already
    /// have a response.
    pub fn validate_loan_response(&self, tx: &TxLoanResponse) -> Result<(), TxError> {
        let mut found_request = false;
        for id in self.ledger.loan_txs(&tx.data.loan_id)? {
            match self.ledger.transaction(&id)? {
                Some(TransactionVariant::LoanResponse(_)) => {
                    return Err(TxError::LoanAlreadyResponded);
                }
                Some(TransactionVariant::LoanRequest(_)) => found_request = true,
                _ => {}
            }
        }
        if !found_request {
            return Err(TxError::LoanRequestMissing);
        }
        Ok(())
    }

    /// Loan payment: an accepted response must exist and every
    /// description must disclose its notes.
    pub fn validate_loan_payment(&self, tx: &TxLoanPayment) -> Result<(), TxError> {
        for desc in &tx.tx.descs {
            if desc.notes.is_none() {
                return Err(TxError::MalformedTransaction(
                    "loan payment must disclose its notes",
                ));
            }
        }
        let mut found_accepted = false;
        for id in self.ledger.loan_txs(&tx.data.loan_id)? {
            if let Some(TransactionVariant::LoanResponse(resp)) = self.ledger.transaction(&id)? {
                if resp.data.response == LoanResponseKind::Accept {
                    found_accepted = true;
                }
            }
        }
        if !found_accepted {
            return Err(TxError::LoanResponseMissing);
        }
        Ok(())
    }

    /// Loan withdrawal: the stored request's key digest must match
    /// SHAKE-256 of the revealed key, and the stored response must be an
    /// acceptance.
    pub fn validate_loan_withdraw(&self, tx: &TxLoanWithdraw) -> Result<(), TxError> {
        let mut found_accepted = false;
        let mut key_correct = false;
        for id in self.ledger.loan_txs(&tx.data.loan_id)? {
            match self.ledger.transaction(&id)? {
                Some(TransactionVariant::LoanRequest(request)) => {
                    if shake256_digest(&tx.data.key) == request.data.key_digest {
                        key_correct = true;
                    }
                }
                Some(TransactionVariant::LoanResponse(response)) => {
                    if response.data.response == LoanResponseKind::Accept {
                        found_accepted = true;
                    }
                }
                _ => {}
            }
        }
        if !found_accepted {
            return Err(TxError::LoanResponseMissing);
        }
        if !key_correct {
            return Err(TxError::LoanKeyMismatch);
        }
        Ok(())
    }

    /// Dividend payout: every recipient note must match the computed
    /// holder amounts, appear exactly once, and not already be rewarded.
    pub fn validate_dividend_payout(
        &self,
        view: &dyn DividendView,
        tx: &TxDividendPayout,
    ) -> Result<(), TxError> {
        let proposal = tx.data.proposal();
        let (_, holder_amounts) = amount_per_account(view, &proposal)?;

        for desc in &tx.tx.descs {
            let Some(notes) = &desc.notes else {
                return Err(TxError::MalformedTransaction(
                    "dividend payout must disclose its notes",
                ));
            };
            for note in notes {
                for utxo in view.account_utxos(&note.apk) {
                    if view.utxo_reward(&utxo)? >= proposal.payout_id {
                        return Err(TxError::DividendAlreadyPaid);
                    }
                }

                let matches: Vec<u64> = holder_amounts
                    .iter()
                    .filter(|(holder, _)| *holder == note.apk)
                    .map(|(_, amount)| *amount)
                    .collect();
                match matches.as_slice() {
                    [] => return Err(TxError::DividendIneligible),
                    [amount] => {
                        if *amount != note.value {
                            return Err(TxError::DividendAmountMismatch);
                        }
                    }
                    // Duplicate holder entries are a protocol-level
                    // anomaly; rejected rather than summed.
                    _ => return Err(TxError::DividendDuplicate),
                }
            }
        }
        Ok(())
    }
}

/// Total token supply and the per-holder amounts still owed for this
/// payout round.
///
/// A holder is owed value from every UTXO whose reward marker predates
/// the proposal; holders with nothing owed are omitted.
pub fn amount_per_account(
    view: &dyn DividendView,
    proposal: &PayoutProposal,
) -> Result<(u64, Vec<([u8; 32], u64)>), TxError> {
    let holders = view.token_holders(&proposal.token_id);

    let mut total_supply: u64 = 0;
    for holder in &holders {
        for utxo in view.account_utxos(holder) {
            total_supply = total_supply.saturating_add(view.utxo_value(&utxo));
        }
    }

    let mut owed = Vec::new();
    for holder in &holders {
        let mut amount: u64 = 0;
        for utxo in view.account_utxos(holder) {
            if view.utxo_reward(&utxo)? < proposal.payout_id {
                amount = amount.saturating_add(view.utxo_value(&utxo));
            }
        }
        if amount > 0 {
            owed.push((*holder, amount));
        }
    }
    Ok((total_supply, owed))
}
