//! Typed transaction variants: loans, dividends, candidate registration.
//!
//! Each variant is a base transaction plus an attached domain record; the
//! variant hash extends the base hash with the record's canonical bytes
//! under the same double-hash. Domain invariants live in `validator`.

use borsh::{BorshDeserialize, BorshSerialize};

use velum_core::{double_hash32, write_varint, Hash32, LoanId, TxId};

use crate::tx::{Transaction, TxKind};

/// Chain-wide loan parameters a request must match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LoanParams {
    /// Interest rate in basis points.
    pub interest_rate: u64,
    /// Maturity in blocks.
    pub maturity: u64,
    /// Blocks until collateral liquidation may start.
    pub liquidation_start: u64,
}

/// Borrower's loan request record.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LoanRequest {
    /// Parameters the borrower agreed to.
    pub params: LoanParams,
    /// Unique loan identifier (unique across all shards).
    pub loan_id: LoanId,
    /// SHAKE-256 digest of the withdrawal key.
    pub key_digest: [u8; 32],
}

/// Lender's answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum LoanResponseKind {
    /// Loan granted.
    Accept,
    /// Loan refused.
    Reject,
}

/// Lender's response record.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LoanResponse {
    /// The request being answered.
    pub loan_id: LoanId,
    /// Accept or reject.
    pub response: LoanResponseKind,
}

/// Repayment record.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LoanPayment {
    /// The loan being repaid.
    pub loan_id: LoanId,
    /// Whether this payment goes toward the principal.
    pub pay_principle: bool,
}

/// Withdrawal record revealing the key preimage.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LoanWithdraw {
    /// The loan being withdrawn.
    pub loan_id: LoanId,
    /// Preimage of the request's `key_digest`.
    pub key: Vec<u8>,
}

/// A governance proposal to pay dividends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PayoutProposal {
    /// Token whose holders are paid.
    pub token_id: Hash32,
    /// Monotonic payout round id; UTXO reward markers compare against it.
    pub payout_id: u64,
}

/// Dividend payout record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DividendPayout {
    /// Payout round being executed.
    pub payout_id: u64,
    /// Token whose holders are paid.
    pub token_id: Hash32,
}

impl DividendPayout {
    /// The proposal this payout executes.
    pub fn proposal(&self) -> PayoutProposal {
        PayoutProposal {
            token_id: self.token_id,
            payout_id: self.payout_id,
        }
    }
}

/// Validator-candidate registration record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RegisterCandidate {
    /// Node public key of the candidate.
    pub node_pubkey: [u8; 32],
}

fn extended_hash(base: &Transaction, extra: &[u8]) -> TxId {
    let mut record = Vec::with_capacity(32 + extra.len());
    record.extend_from_slice(base.hash().as_bytes());
    record.extend_from_slice(extra);
    double_hash32(&record)
}

macro_rules! variant_wrapper {
    ($(#[$doc:meta])* $name:ident, $data:ty, $encode:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
        pub struct $name {
            /// The underlying fee-paying transaction.
            pub tx: Transaction,
            /// The attached domain record.
            pub data: $data,
        }

        impl $name {
            /// Wrap a base transaction with the domain record.
            pub fn new(tx: Transaction, data: $data) -> Self {
                Self { tx, data }
            }

            /// Canonical hash: the base hash extended with the record.
            pub fn hash(&self) -> TxId {
                let encode: fn(&$data) -> Vec<u8> = $encode;
                extended_hash(&self.tx, &encode(&self.data))
            }
        }
    };
}

variant_wrapper!(
    /// A loan request transaction.
    TxLoanRequest,
    LoanRequest,
    |data| {
        let mut out = Vec::new();
        out.extend_from_slice(&data.params.interest_rate.to_le_bytes());
        out.extend_from_slice(&data.params.maturity.to_le_bytes());
        out.extend_from_slice(&data.params.liquidation_start.to_le_bytes());
        write_varint(&mut out, data.loan_id.len() as u64);
        out.extend_from_slice(&data.loan_id);
        out.extend_from_slice(&data.key_digest);
        out
    }
);

variant_wrapper!(
    /// A loan response transaction.
    TxLoanResponse,
    LoanResponse,
    |data| {
        let mut out = Vec::new();
        write_varint(&mut out, data.loan_id.len() as u64);
        out.extend_from_slice(&data.loan_id);
        out.push(match data.response {
            LoanResponseKind::Accept => 1,
            LoanResponseKind::Reject => 0,
        });
        out
    }
);

variant_wrapper!(
    /// A loan payment transaction; its notes are disclosed in plaintext.
    TxLoanPayment,
    LoanPayment,
    |data| {
        let mut out = Vec::new();
        write_varint(&mut out, data.loan_id.len() as u64);
        out.extend_from_slice(&data.loan_id);
        out.push(u8::from(data.pay_principle));
        out
    }
);

variant_wrapper!(
    /// A loan withdrawal transaction.
    TxLoanWithdraw,
    LoanWithdraw,
    |data| {
        let mut out = Vec::new();
        write_varint(&mut out, data.loan_id.len() as u64);
        out.extend_from_slice(&data.loan_id);
        write_varint(&mut out, data.key.len() as u64);
        out.extend_from_slice(&data.key);
        out
    }
);

variant_wrapper!(
    /// A dividend payout transaction; its notes are disclosed in plaintext.
    TxDividendPayout,
    DividendPayout,
    |data| {
        let mut out = Vec::new();
        out.extend_from_slice(&data.payout_id.to_le_bytes());
        out.extend_from_slice(data.token_id.as_bytes());
        out
    }
);

variant_wrapper!(
    /// A validator-candidate registration transaction.
    TxRegisterCandidate,
    RegisterCandidate,
    |data| data.node_pubkey.to_vec()
);

/// The tagged sum of every transaction form the chain accepts.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum TransactionVariant {
    /// Ordinary shielded transfer.
    Normal(Transaction),
    /// Reward-minting form.
    Salary(Transaction),
    /// Loan request.
    LoanRequest(TxLoanRequest),
    /// Loan response.
    LoanResponse(TxLoanResponse),
    /// Loan payment.
    LoanPayment(TxLoanPayment),
    /// Loan withdrawal.
    LoanWithdraw(TxLoanWithdraw),
    /// Dividend payout.
    DividendPayout(TxDividendPayout),
    /// Candidate registration.
    RegisterCandidate(TxRegisterCandidate),
}

impl TransactionVariant {
    /// The kind tag this variant carries.
    pub fn kind(&self) -> TxKind {
        match self {
            TransactionVariant::Normal(_) => TxKind::Normal,
            TransactionVariant::Salary(_) => TxKind::Salary,
            TransactionVariant::LoanRequest(_) => TxKind::LoanRequest,
            TransactionVariant::LoanResponse(_) => TxKind::LoanResponse,
            TransactionVariant::LoanPayment(_) => TxKind::LoanPayment,
            TransactionVariant::LoanWithdraw(_) => TxKind::LoanWithdraw,
            TransactionVariant::DividendPayout(_) => TxKind::DividendPayout,
            TransactionVariant::RegisterCandidate(_) => TxKind::RegisterCandidate,
        }
    }

    /// The underlying base transaction.
    pub fn base(&self) -> &Transaction {
        match self {
            TransactionVariant::Normal(tx) | TransactionVariant::Salary(tx) => tx,
            TransactionVariant::LoanRequest(t) => &t.tx,
            TransactionVariant::LoanResponse(t) => &t.tx,
            TransactionVariant::LoanPayment(t) => &t.tx,
            TransactionVariant::LoanWithdraw(t) => &t.tx,
            TransactionVariant::DividendPayout(t) => &t.tx,
            TransactionVariant::RegisterCandidate(t) => &t.tx,
        }
    }

    /// Canonical hash, extended with the variant record where present.
    pub fn hash(&self) -> TxId {
        match self {
            TransactionVariant::Normal(tx) | TransactionVariant::Salary(tx) => tx.hash(),
            TransactionVariant::LoanRequest(t) => t.hash(),
            TransactionVariant::LoanResponse(t) => t.hash(),
            TransactionVariant::LoanPayment(t) => t.hash(),
            TransactionVariant::LoanWithdraw(t) => t.hash(),
            TransactionVariant::DividendPayout(t) => t.hash(),
            TransactionVariant::RegisterCandidate(t) => t.hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Transaction {
        Transaction::template(TxKind::LoanRequest, 0).0
    }

    #[test]
    fn variant_hash_extends_base_hash() {
        let tx = base();
        let wrapped = TxLoanRequest::new(
            tx.clone(),
            LoanRequest {
                params: LoanParams::default(),
                loan_id: vec![1, 2, 3],
                key_digest: [7u8; 32],
            },
        );
        assert_ne!(wrapped.hash(), tx.hash());
    }

    #[test]
    fn variant_hash_binds_the_record() {
        let tx = base();
        let a = TxLoanWithdraw::new(
            tx.clone(),
            LoanWithdraw {
                loan_id: vec![1],
                key: vec![2],
            },
        );
        let b = TxLoanWithdraw::new(
            tx,
            LoanWithdraw {
                loan_id: vec![1],
                key: vec![3],
            },
        );
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn tagged_sum_dispatch() {
        let tx = base();
        let variant = TransactionVariant::LoanResponse(TxLoanResponse::new(
            tx.clone(),
            LoanResponse {
                loan_id: vec![9],
                response: LoanResponseKind::Accept,
            },
        ));
        assert_eq!(variant.kind(), TxKind::LoanResponse);
        assert_eq!(variant.base().lock_time, tx.lock_time);
        assert_ne!(variant.hash(), tx.hash());
    }

    #[test]
    fn borsh_round_trip() {
        let variant = TransactionVariant::DividendPayout(TxDividendPayout::new(
            base(),
            DividendPayout {
                payout_id: 4,
                token_id: Hash32([8u8; 32]),
            },
        ));
        let bytes = borsh::to_vec(&variant).unwrap();
        let back = TransactionVariant::try_from_slice(&bytes).unwrap();
        assert_eq!(back, variant);
    }
}
