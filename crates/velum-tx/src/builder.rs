//! Multi-description transaction construction.
//!
//! The builder partitions sender notes and payment intents across join-
//! split descriptions: largest inputs and payments first, fee carried by
//! the first description, change notes re-queued as future inputs until
//! both lists are exhausted, and every slot padded to the fixed shape
//! with dummy notes.

use hashbrown::HashMap;
use log::debug;

use velum_core::{
    payment_address, prf_mac, Commitment, Hash32, Hasher, Nullifier, PaymentAddress, ShardId,
    SpendingKey, DUMMY_SHARD, JS_INPUTS, JS_OUTPUTS,
};

use crate::encryption::encrypt_output_notes;
use crate::error::TxError;
use crate::joinsplit::{DescKind, JoinSplitDesc};
use crate::note::{JsInput, JsOutput, Note};
use crate::oracle::{ProofContext, ZkOracle};
use crate::tx::{Transaction, TxKind};
use crate::witness::build_witness;

/// One payment intent.
#[derive(Clone, Debug)]
pub struct PaymentInfo {
    /// Recipient address.
    pub address: PaymentAddress,
    /// Amount in atoms.
    pub amount: u64,
    /// Memo delivered inside the encrypted note.
    pub memo: Vec<u8>,
}

/// Everything the builder needs besides the spending key.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    /// Ordered payment intents.
    pub payments: Vec<PaymentInfo>,
    /// Anchor root per shard at the caller's view of the chain.
    pub roots: HashMap<ShardId, Hash32>,
    /// Spendable notes per shard.
    pub inventory: HashMap<ShardId, Vec<Note>>,
    /// Commitments-to-date per shard, in append order.
    pub commitments: HashMap<ShardId, Vec<Commitment>>,
    /// Fee in atoms, carried by the first description.
    pub fee: u64,
    /// The sender's shard; change and new outputs land here.
    pub sender_shard: ShardId,
}

struct PendingInput {
    shard: ShardId,
    note: Note,
}

/// Build an ordinary shielded transfer.
pub fn build_transfer(
    hasher: &dyn Hasher,
    sender_key: &SpendingKey,
    request: TransferRequest,
    oracle: &dyn ZkOracle,
) -> Result<Transaction, TxError> {
    build_transfer_as(TxKind::Normal, hasher, sender_key, request, oracle, false)
}

/// Build a transfer with an explicit kind tag, optionally disclosing the
/// output-note plaintexts (required by the non-privacy variants).
pub fn build_transfer_as(
    kind: TxKind,
    hasher: &dyn Hasher,
    sender_key: &SpendingKey,
    request: TransferRequest,
    oracle: &dyn ZkOracle,
    disclose_notes: bool,
) -> Result<Transaction, TxError> {
    let sender_address = payment_address(sender_key);

    let mut inputs: Vec<PendingInput> = Vec::new();
    for (shard, notes) in request.inventory {
        for note in notes {
            inputs.push(PendingInput { shard, note });
        }
    }

    let requested = request
        .payments
        .iter()
        .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
        .ok_or(TxError::InsufficientFunds)?;
    let required = requested
        .checked_add(request.fee)
        .ok_or(TxError::InsufficientFunds)?;
    let available = inputs
        .iter()
        .try_fold(0u64, |acc, q| acc.checked_add(q.note.value))
        .ok_or(TxError::InsufficientFunds)?;
    if available < required {
        return Err(TxError::InsufficientFunds);
    }
    if inputs.is_empty() && request.payments.is_empty() {
        return Err(TxError::MalformedTransaction(
            "transfer requires inputs or payments",
        ));
    }

    let (mut tx, signing_key) = Transaction::template(kind, request.sender_shard);
    let mut payments = request.payments;
    let mut commitments = request.commitments;
    let mut change_queue: Vec<PendingInput> = Vec::new();
    let mut first_desc = true;

    while !inputs.is_empty() || !payments.is_empty() || !change_queue.is_empty() {
        inputs.sort_by_key(|q| q.note.value);
        payments.sort_by_key(|p| p.amount);

        // --- choose inputs: a re-queued change note fills the reserved
        // slot; fresh notes fill the rest, largest first. Pulling past the
        // reserved slot happens only while the fee due is uncovered.
        let fee_due = if first_desc { request.fee } else { 0 };
        let mut selected: Vec<PendingInput> = Vec::new();
        let mut input_value: u64 = 0;

        while selected.len() < JS_INPUTS {
            let Some(change) = change_queue.pop() else { break };
            input_value += change.note.value;
            selected.push(change);
        }
        let mut fresh = 0usize;
        while selected.len() < JS_INPUTS && !inputs.is_empty() {
            if fresh >= JS_INPUTS - 1 && input_value >= fee_due {
                break;
            }
            let Some(next) = inputs.pop() else { break };
            debug!(
                "choose input note: value {} shard {}",
                next.note.value, next.shard
            );
            input_value += next.note.value;
            fresh += 1;
            selected.push(next);
        }

        if first_desc {
            if input_value < fee_due {
                return Err(TxError::FeeUnpayable);
            }
            input_value -= fee_due;
        }

        // --- witnesses for the real inputs, one shared root per shard
        let mut witnessed = Vec::with_capacity(selected.len());
        let mut desc_roots: HashMap<ShardId, Hash32> = HashMap::new();
        for pending in selected {
            let commitment = pending.note.commitment();
            let list = commitments.get(&pending.shard).ok_or(TxError::CommitmentMissing {
                shard: pending.shard,
                commitment,
            })?;
            let witness =
                build_witness(hasher, list, &commitment).ok_or(TxError::CommitmentMissing {
                    shard: pending.shard,
                    commitment,
                })?;
            desc_roots.insert(pending.shard, witness.root);
            witnessed.push((pending, witness));
        }

        // The first description's roots must agree with the caller's view.
        if first_desc {
            for (shard, computed) in &desc_roots {
                let expected = request.roots.get(shard).copied().unwrap_or_else(Hash32::zero);
                if expected != *computed {
                    return Err(TxError::AnchorMismatch {
                        shard: *shard,
                        expected,
                        computed: *computed,
                    });
                }
            }
        }
        // Reserved anchor for dummy inputs.
        desc_roots.entry(DUMMY_SHARD).or_insert_with(Hash32::zero);

        let mut js_inputs: Vec<JsInput> = Vec::with_capacity(JS_INPUTS);
        let mut anchors: Vec<Hash32> = Vec::with_capacity(JS_INPUTS);
        for (pending, witness) in witnessed {
            anchors.push(desc_roots[&pending.shard]);
            js_inputs.push(JsInput {
                note: pending.note,
                key: sender_key.clone(),
                witness,
            });
        }
        while js_inputs.len() < JS_INPUTS {
            debug!("pad dummy input note");
            js_inputs.push(JsInput::dummy());
            anchors.push(desc_roots[&DUMMY_SHARD]);
        }

        // --- choose outputs, leaving room for one change output
        let mut outputs: Vec<JsOutput> = Vec::new();
        let mut change_slot: Option<usize> = None;
        loop {
            if outputs.len() >= JS_OUTPUTS - 1 || input_value == 0 || payments.is_empty() {
                break;
            }
            let fits = payments.last().is_some_and(|p| p.amount <= input_value);
            if fits {
                if let Some(p) = payments.pop() {
                    input_value -= p.amount;
                    debug!("pay {} in full", p.amount);
                    outputs.push(JsOutput::to(&p.address, p.amount, p.memo));
                }
            } else if let Some(p) = payments.last_mut() {
                p.amount -= input_value;
                debug!("pay {} partially, {} remains", input_value, p.amount);
                outputs.push(JsOutput::to(&p.address, input_value, p.memo.clone()));
                input_value = 0;
            }
        }

        if input_value > 0 && payments.last().is_some_and(|p| p.amount == input_value) {
            // Exactly one more payment fits the leftover value.
            if let Some(p) = payments.pop() {
                debug!("attach exact payment {}", p.amount);
                outputs.push(JsOutput::to(&p.address, p.amount, p.memo));
            }
        } else if input_value > 0 || !payments.is_empty() {
            // Change to the sender keeps the chain going; re-queued (even
            // at zero value) while payments remain.
            debug!("emit change note of {}", input_value);
            change_slot = Some(outputs.len());
            outputs.push(JsOutput::to(&sender_address, input_value, Vec::new()));
        }

        while outputs.len() < JS_OUTPUTS {
            debug!("pad dummy output note");
            outputs.push(JsOutput::dummy());
        }

        // --- prove, seal, and append the description
        let ctx = ProofContext::new(tx.sig_pubkey, anchors.clone(), 0, fee_due);
        let bundle = oracle.prove(&js_inputs, &mut outputs, &ctx)?;

        let nullifiers: Vec<Nullifier> = js_inputs.iter().map(JsInput::nullifier).collect();
        let out_commitments: Vec<Commitment> =
            outputs.iter().map(|o| o.note.commitment()).collect();
        let macs: Vec<Hash32> = js_inputs
            .iter()
            .enumerate()
            .map(|(i, input)| prf_mac(i as u64, input.key.as_bytes(), &bundle.h_sig))
            .collect();
        let encrypted = encrypt_output_notes(&outputs, &bundle.h_sig)?;

        tx.descs.push(JoinSplitDesc {
            anchors,
            nullifiers,
            commitments: out_commitments.clone(),
            proof: bundle.proof,
            encrypted_notes: encrypted.ciphertexts,
            ephemeral_pubkey: encrypted.ephemeral_pubkey,
            h_sig_seed: bundle.seed,
            kind: DescKind::OutCoin,
            reward: 0,
            macs,
            notes: disclose_notes.then(|| outputs.iter().map(|o| o.note.clone()).collect()),
        });
        if first_desc {
            tx.fee = request.fee;
        }

        // New output commitments become witnessable by later descriptions.
        let sender_list = commitments.entry(request.sender_shard).or_default();
        sender_list.extend(out_commitments);

        if let Some(slot) = change_slot {
            if !payments.is_empty() {
                debug!("re-queue change note for next description");
                change_queue.push(PendingInput {
                    shard: request.sender_shard,
                    note: outputs[slot].note.clone(),
                });
            }
        }

        first_desc = false;
    }

    tx.sign(&signing_key)?;
    debug!("built transfer with {} descriptions", tx.descs.len());
    Ok(tx)
}

/// Build the single-description reward (salary/coinbase) form.
///
/// No real inputs; `reward - fee` is paid to `recipient` and the output
/// notes are disclosed in plaintext. Salary transactions are applied from
/// blocks only and never relayed.
pub fn build_salary_tx(
    recipient: &PaymentAddress,
    reward: u64,
    fee: u64,
    shard: ShardId,
    oracle: &dyn ZkOracle,
) -> Result<Transaction, TxError> {
    let value = reward.checked_sub(fee).ok_or(TxError::FeeUnpayable)?;
    let (mut tx, signing_key) = Transaction::template(TxKind::Salary, shard);
    tx.fee = fee;

    let js_inputs = vec![JsInput::dummy(), JsInput::dummy()];
    let mut outputs = vec![JsOutput::to(recipient, value, Vec::new()), JsOutput::dummy()];
    let anchors = vec![Hash32::zero(); JS_INPUTS];

    let ctx = ProofContext::new(tx.sig_pubkey, anchors.clone(), reward, fee);
    let bundle = oracle.prove(&js_inputs, &mut outputs, &ctx)?;

    let nullifiers: Vec<Nullifier> = js_inputs.iter().map(JsInput::nullifier).collect();
    let out_commitments: Vec<Commitment> = outputs.iter().map(|o| o.note.commitment()).collect();
    let macs: Vec<Hash32> = js_inputs
        .iter()
        .enumerate()
        .map(|(i, input)| prf_mac(i as u64, input.key.as_bytes(), &bundle.h_sig))
        .collect();
    let encrypted = encrypt_output_notes(&outputs, &bundle.h_sig)?;

    tx.descs.push(JoinSplitDesc {
        anchors,
        nullifiers,
        commitments: out_commitments,
        proof: bundle.proof,
        encrypted_notes: encrypted.ciphertexts,
        ephemeral_pubkey: encrypted.ephemeral_pubkey,
        h_sig_seed: bundle.seed,
        kind: DescKind::OutCoin,
        reward,
        macs,
        notes: Some(outputs.iter().map(|o| o.note.clone()).collect()),
    });

    tx.sign(&signing_key)?;
    Ok(tx)
}
