//! End-to-end pipeline scenarios: build, validate, spend, and reject.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use velum_core::{
    payment_address, Blake3Hasher, Commitment, Hash32, Hasher, Nullifier, ShardId, SpendingKey,
    TxId,
};
use velum_state::{
    load_accumulator_at, persist_append, record_anchor, IncrementalAccumulator, MemoryKv,
};
use velum_tx::{
    build_salary_tx, build_transfer, HashBoundOracle, LedgerView, LoanParams, Note, PaymentInfo,
    TransactionVariant, TransferRequest, TxError, Validator,
};

const SENDER_SHARD: ShardId = 1;

/// In-memory ledger view backing the validator in tests.
struct MemLedger {
    kv: MemoryKv,
    anchors: HashMap<Hash32, (ShardId, u64)>,
    latest: HashMap<ShardId, (u64, Hash32)>,
    nullifiers: HashSet<Nullifier>,
    loans: HashMap<Vec<u8>, Vec<TxId>>,
    txs: HashMap<TxId, TransactionVariant>,
    params: LoanParams,
}

impl MemLedger {
    fn new() -> Self {
        Self {
            kv: MemoryKv::new(),
            anchors: HashMap::new(),
            latest: HashMap::new(),
            nullifiers: HashSet::new(),
            loans: HashMap::new(),
            txs: HashMap::new(),
            params: LoanParams::default(),
        }
    }

    /// Append commitments on a shard and record the resulting anchor.
    fn commit(&mut self, shard: ShardId, cms: &[Commitment]) -> Hash32 {
        let mut acc = load_accumulator_at(
            &self.kv,
            shard,
            self.latest.get(&shard).map(|(l, _)| *l).unwrap_or(0),
            hasher(),
        )
        .unwrap();
        let data: Vec<Vec<u8>> = cms.iter().map(|c| c.as_bytes().to_vec()).collect();
        persist_append(&self.kv, shard, &mut acc, &data).unwrap();
        let root = record_anchor(&self.kv, shard, &acc).unwrap();
        self.anchors.insert(root, (shard, acc.length()));
        self.latest.insert(shard, (acc.length(), root));
        root
    }

    fn store_tx(&mut self, loan_id: &[u8], variant: TransactionVariant) {
        let hash = variant.hash();
        self.loans.entry(loan_id.to_vec()).or_default().push(hash);
        self.txs.insert(hash, variant);
    }
}

impl LedgerView for MemLedger {
    fn anchor_location(&self, root: &Hash32) -> Option<(ShardId, u64)> {
        self.anchors.get(root).copied()
    }

    fn accumulator_at(
        &self,
        shard: ShardId,
        length: u64,
    ) -> Result<IncrementalAccumulator, TxError> {
        Ok(load_accumulator_at(&self.kv, shard, length, hasher())?)
    }

    fn latest_anchor(&self, shard: ShardId) -> Option<(u64, Hash32)> {
        self.latest.get(&shard).copied()
    }

    fn nullifier_shard(&self, nf: &Nullifier) -> Option<ShardId> {
        self.nullifiers.contains(nf).then_some(SENDER_SHARD)
    }

    fn loan_txs(&self, loan_id: &[u8]) -> Result<Vec<TxId>, TxError> {
        Ok(self.loans.get(loan_id).cloned().unwrap_or_default())
    }

    fn transaction(&self, id: &TxId) -> Result<Option<TransactionVariant>, TxError> {
        Ok(self.txs.get(id).cloned())
    }

    fn loan_params(&self, _shard: ShardId) -> LoanParams {
        self.params
    }

    fn loan_id_exists(&self, loan_id: &[u8]) -> Result<bool, TxError> {
        Ok(self.loans.contains_key(loan_id))
    }
}

fn hasher() -> Arc<dyn Hasher> {
    Arc::new(Blake3Hasher)
}

fn funded_note(sk: &SpendingKey, value: u64, seed: u8) -> Note {
    Note {
        value,
        apk: velum_core::spend_address(sk),
        rho: [seed; 32],
        r: [seed.wrapping_add(1); 32],
        memo: Vec::new(),
    }
}

/// Fund the sender with the given note values and return the request
/// skeleton plus the ledger that recorded the anchor.
fn setup(sender: &SpendingKey, values: &[u64]) -> (MemLedger, TransferRequest, Vec<Note>) {
    let notes: Vec<Note> = values
        .iter()
        .enumerate()
        .map(|(i, v)| funded_note(sender, *v, (i as u8) * 2 + 10))
        .collect();
    let cms: Vec<Commitment> = notes.iter().map(Note::commitment).collect();

    let mut ledger = MemLedger::new();
    let root = ledger.commit(SENDER_SHARD, &cms);

    let mut roots = HashMap::new();
    roots.insert(SENDER_SHARD, root);
    let mut inventory = HashMap::new();
    inventory.insert(SENDER_SHARD, notes.clone());
    let mut commitments = HashMap::new();
    commitments.insert(SENDER_SHARD, cms);

    let request = TransferRequest {
        payments: Vec::new(),
        roots,
        inventory,
        commitments,
        fee: 0,
        sender_shard: SENDER_SHARD,
    };
    (ledger, request, notes)
}

fn pay(to: &SpendingKey, amount: u64) -> PaymentInfo {
    PaymentInfo {
        address: payment_address(to),
        amount,
        memo: Vec::new(),
    }
}

#[test]
fn split_payment_across_two_descriptions() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (_ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 9)];
    request.fee = 1;

    let oracle = HashBoundOracle;
    // Disclose the notes so the description shapes are observable.
    let tx = velum_tx::build_transfer_as(
        velum_tx::TxKind::Normal,
        &Blake3Hasher,
        &sender,
        request,
        &oracle,
        true,
    )
    .unwrap();

    assert_eq!(tx.descs.len(), 2);
    assert_eq!(tx.fee, 1);
    assert!(tx.verify_signature().is_ok());

    let recipient_apk = payment_address(&recipient).apk;
    let sender_apk = payment_address(&sender).apk;

    // First description: 7 in, 6 to the recipient plus a zero-value
    // change note back to the sender.
    let first = tx.descs[0].notes.as_ref().unwrap();
    assert_eq!(first[0].value, 6);
    assert_eq!(first[0].apk, recipient_apk);
    assert_eq!(first[1].value, 0);
    assert_eq!(first[1].apk, sender_apk);

    // Second description: the 3-note plus the reused change pay the
    // remaining 3; the spare slot is a dummy.
    let second = tx.descs[1].notes.as_ref().unwrap();
    assert_eq!(second[0].value, 3);
    assert_eq!(second[0].apk, recipient_apk);
    assert_eq!(second[1].value, 0);
    assert_ne!(second[1].apk, sender_apk);

    // Final accounting: the recipient is credited 9 and the fee is 1.
    let credited: u64 = tx
        .descs
        .iter()
        .flat_map(|d| d.notes.as_ref().unwrap())
        .filter(|n| n.apk == recipient_apk)
        .map(|n| n.value)
        .sum();
    assert_eq!(credited, 9);
}

#[test]
fn built_transfer_validates_including_interstitial_anchor() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 9)];
    request.fee = 1;

    let oracle = HashBoundOracle;
    let tx = build_transfer(&Blake3Hasher, &sender, request, &oracle).unwrap();

    let validator = Validator::new(&ledger, &oracle);
    validator.validate_transaction(&tx).unwrap();
    validator.validate_for_relay(&tx).unwrap();
}

#[test]
fn insufficient_funds_is_rejected_upfront() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (_ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 10)];
    request.fee = 1;

    let err = build_transfer(&Blake3Hasher, &sender, request, &HashBoundOracle).unwrap_err();
    assert!(matches!(err, TxError::InsufficientFunds));
}

#[test]
fn missing_commitment_is_rejected() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (_ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 5)];
    // Drop the funding commitments: witnesses can no longer be built.
    request.commitments.insert(SENDER_SHARD, Vec::new());

    let err = build_transfer(&Blake3Hasher, &sender, request, &HashBoundOracle).unwrap_err();
    assert!(matches!(err, TxError::CommitmentMissing { shard: SENDER_SHARD, .. }));
}

#[test]
fn wrong_anchor_is_rejected() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (_ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 5)];
    request.roots.insert(SENDER_SHARD, Hash32([0xab; 32]));

    let err = build_transfer(&Blake3Hasher, &sender, request, &HashBoundOracle).unwrap_err();
    assert!(matches!(err, TxError::AnchorMismatch { shard: SENDER_SHARD, .. }));
}

#[test]
fn empty_payments_produce_change_only_descriptions() {
    let sender = SpendingKey::random();
    let (_ledger, request, _notes) = setup(&sender, &[5, 2]);

    let tx = build_transfer(&Blake3Hasher, &sender, request, &HashBoundOracle).unwrap();
    // All inputs return to the sender as change.
    assert!(!tx.descs.is_empty());
    assert_eq!(tx.fee, 0);
}

#[test]
fn double_spend_is_rejected_second_time() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (mut ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 9)];
    request.fee = 1;

    let oracle = HashBoundOracle;
    let tx = build_transfer(&Blake3Hasher, &sender, request.clone(), &oracle).unwrap();

    {
        let validator = Validator::new(&ledger, &oracle);
        validator.validate_transaction(&tx).unwrap();
    }

    // First transaction accepted: its nullifiers enter the set.
    for desc in &tx.descs {
        for nf in &desc.nullifiers {
            ledger.nullifiers.insert(*nf);
        }
    }

    // A second spend of the same notes shares real nullifiers.
    let tx2 = build_transfer(&Blake3Hasher, &sender, request, &oracle).unwrap();
    let validator = Validator::new(&ledger, &oracle);
    let err = validator.validate_double_spend(&tx2).unwrap_err();
    assert!(matches!(err, TxError::DoubleSpend(hash) if hash == tx2.hash()));
}

#[test]
fn stale_anchor_is_accepted_without_conflicting_nullifiers() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (mut ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 9)];
    request.fee = 1;

    let oracle = HashBoundOracle;
    let tx = build_transfer(&Blake3Hasher, &sender, request, &oracle).unwrap();

    // The chain moves on: 150 unrelated commitments land on the shard.
    let filler: Vec<Commitment> = (0u64..150)
        .map(|i| {
            let mut bytes = [0xc0u8; 32];
            bytes[..8].copy_from_slice(&i.to_le_bytes());
            Commitment(bytes)
        })
        .collect();
    ledger.commit(SENDER_SHARD, &filler);

    let validator = Validator::new(&ledger, &oracle);
    validator.validate_transaction(&tx).unwrap();
}

#[test]
fn tampered_nullifier_breaks_the_proof() {
    let sender = SpendingKey::random();
    let recipient = SpendingKey::random();
    let (ledger, mut request, _notes) = setup(&sender, &[7, 3]);
    request.payments = vec![pay(&recipient, 9)];
    request.fee = 1;

    let oracle = HashBoundOracle;
    let mut tx = build_transfer(&Blake3Hasher, &sender, request, &oracle).unwrap();
    tx.descs[0].nullifiers[0] = Nullifier([0x99; 32]);

    let validator = Validator::new(&ledger, &oracle);
    // Signature breaks first (the record covers nullifiers); re-signing is
    // impossible without the key, and even ignoring the signature the
    // proof digest no longer matches.
    assert!(validator.validate_transaction(&tx).is_err());
}

#[test]
fn salary_transactions_are_not_relayed() {
    let miner = SpendingKey::random();
    let oracle = HashBoundOracle;
    let tx = build_salary_tx(&payment_address(&miner), 50, 0, SENDER_SHARD, &oracle).unwrap();

    let ledger = MemLedger::new();
    let validator = Validator::new(&ledger, &oracle);
    validator.validate_transaction(&tx).unwrap();
    assert!(validator.validate_for_relay(&tx).is_err());
}

#[test]
fn salary_balance_is_checked_against_plaintext_notes() {
    let miner = SpendingKey::random();
    let oracle = HashBoundOracle;
    let mut tx = build_salary_tx(&payment_address(&miner), 50, 0, SENDER_SHARD, &oracle).unwrap();

    // Claim a larger reward than the disclosed outputs carry.
    tx.descs[0].reward = 60;
    let ledger = MemLedger::new();
    let validator = Validator::new(&ledger, &oracle);
    assert!(validator.validate_transaction(&tx).is_err());
}
