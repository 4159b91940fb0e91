//! The zk proving system, treated as a black-box oracle.
//!
//! `prove` receives the private inputs and fills in the output-note
//! randomness (Sprout-style: `rho_i` is derived from `phi` and `h_sig`),
//! returning an opaque proof plus the binding values. `verify` sees only
//! the public inputs. Neither side of the contract exposes circuit
//! internals to the rest of the pipeline.

use rand_core::{OsRng, RngCore};

use velum_core::{
    hash32, Commitment, Hash32, Nullifier, DS_HSIG, DS_PROOF, DS_RHO, JS_INPUTS, JS_OUTPUTS,
    SIG_PUBKEY_LEN,
};

use crate::error::TxError;
use crate::note::{JsInput, JsOutput};

/// Public context handed to the prover alongside the slots.
#[derive(Clone, Debug)]
pub struct ProofContext {
    /// Signing key the proof is bound to.
    pub sig_pubkey: [u8; SIG_PUBKEY_LEN],
    /// Anchor root per input, in input order.
    pub anchors: Vec<Hash32>,
    /// Minted value (salary/coinbase form only).
    pub reward: u64,
    /// Fee contributed by this description.
    pub fee: u64,
    /// Pre-chosen `h_sig` seed; fresh randomness when absent.
    pub seed: Option<[u8; 32]>,
    /// Pre-chosen `phi`; fresh randomness when absent.
    pub phi: Option<[u8; 32]>,
    /// Pre-chosen output trapdoors; fresh randomness when absent.
    pub output_randomness: Option<Vec<[u8; 32]>>,
}

impl ProofContext {
    /// Context with fresh randomness for everything optional.
    pub fn new(sig_pubkey: [u8; SIG_PUBKEY_LEN], anchors: Vec<Hash32>, reward: u64, fee: u64) -> Self {
        Self {
            sig_pubkey,
            anchors,
            reward,
            fee,
            seed: None,
            phi: None,
            output_randomness: None,
        }
    }
}

/// What `prove` hands back.
#[derive(Clone, Debug)]
pub struct ProofBundle {
    /// Opaque proof bytes.
    pub proof: Vec<u8>,
    /// Binding value the MACs and note ciphertexts key off.
    pub h_sig: Hash32,
    /// Seed that produced `h_sig`.
    pub seed: [u8; 32],
    /// Output-note `rho` derivation seed.
    pub phi: [u8; 32],
}

/// The public inputs of a verification call.
#[derive(Clone, Debug)]
pub struct VerifyContext<'a> {
    /// Opaque proof bytes.
    pub proof: &'a [u8],
    /// Signing key the proof is bound to.
    pub sig_pubkey: &'a [u8; SIG_PUBKEY_LEN],
    /// Anchor root per input.
    pub anchors: &'a [Hash32],
    /// Published nullifiers.
    pub nullifiers: &'a [Nullifier],
    /// Published commitments.
    pub commitments: &'a [Commitment],
    /// Per-input ownership MACs.
    pub macs: &'a [Hash32],
    /// Minted value.
    pub reward: u64,
}

/// The proving system contract.
pub trait ZkOracle: Send + Sync {
    /// Produce a proof over the description, filling output randomness.
    fn prove(
        &self,
        inputs: &[JsInput],
        outputs: &mut [JsOutput],
        ctx: &ProofContext,
    ) -> Result<ProofBundle, TxError>;

    /// Check a proof against its public inputs.
    fn verify(&self, check: &VerifyContext<'_>) -> bool;
}

/// Derive `h_sig` binding the seed, nullifiers, and signing key.
pub fn derive_h_sig(seed: &[u8; 32], nullifiers: &[Nullifier], sig_pubkey: &[u8; 64]) -> Hash32 {
    let mut input = Vec::with_capacity(32 + nullifiers.len() * 32 + 64);
    input.extend_from_slice(seed);
    for nf in nullifiers {
        input.extend_from_slice(nf.as_bytes());
    }
    input.extend_from_slice(sig_pubkey);
    hash32(DS_HSIG, &input)
}

fn derive_rho(phi: &[u8; 32], index: usize, h_sig: &Hash32) -> [u8; 32] {
    let mut input = Vec::with_capacity(65);
    input.extend_from_slice(phi);
    input.push(index as u8);
    input.extend_from_slice(h_sig.as_bytes());
    *hash32(DS_RHO, &input).as_bytes()
}

fn proof_digest(
    sig_pubkey: &[u8; 64],
    anchors: &[Hash32],
    nullifiers: &[Nullifier],
    commitments: &[Commitment],
    reward: u64,
) -> Vec<u8> {
    let mut input = Vec::new();
    input.extend_from_slice(sig_pubkey);
    for anchor in anchors {
        input.extend_from_slice(anchor.as_bytes());
    }
    for nf in nullifiers {
        input.extend_from_slice(nf.as_bytes());
    }
    for cm in commitments {
        input.extend_from_slice(cm.as_bytes());
    }
    input.extend_from_slice(&reward.to_le_bytes());
    hash32(DS_PROOF, &input).as_bytes().to_vec()
}

/// Deterministic stand-in oracle.
///
/// The "proof" is a digest over exactly the verify-visible publics, so
/// `verify` can recompute and compare. Balance is enforced at proving
/// time the way a real circuit would.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashBoundOracle;

impl ZkOracle for HashBoundOracle {
    fn prove(
        &self,
        inputs: &[JsInput],
        outputs: &mut [JsOutput],
        ctx: &ProofContext,
    ) -> Result<ProofBundle, TxError> {
        if inputs.len() != JS_INPUTS || outputs.len() != JS_OUTPUTS {
            return Err(TxError::MalformedTransaction(
                "join-split slots must be fully populated",
            ));
        }
        if ctx.anchors.len() != JS_INPUTS {
            return Err(TxError::MalformedTransaction("one anchor per input required"));
        }

        // The circuit's value equation.
        let in_total: u64 = inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.note.value))
            .ok_or(TxError::BalanceMismatch)?;
        let out_total: u64 = outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.note.value))
            .ok_or(TxError::BalanceMismatch)?;
        let lhs = in_total.checked_add(ctx.reward).ok_or(TxError::BalanceMismatch)?;
        let rhs = out_total.checked_add(ctx.fee).ok_or(TxError::BalanceMismatch)?;
        if lhs != rhs {
            return Err(TxError::BalanceMismatch);
        }

        let seed = ctx.seed.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });
        let phi = ctx.phi.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });

        let nullifiers: Vec<Nullifier> = inputs.iter().map(JsInput::nullifier).collect();
        let h_sig = derive_h_sig(&seed, &nullifiers, &ctx.sig_pubkey);

        for (index, output) in outputs.iter_mut().enumerate() {
            output.note.rho = derive_rho(&phi, index, &h_sig);
            output.note.r = match &ctx.output_randomness {
                Some(r) => *r.get(index).ok_or(TxError::MalformedTransaction(
                    "output randomness arity mismatch",
                ))?,
                None => {
                    let mut bytes = [0u8; 32];
                    OsRng.fill_bytes(&mut bytes);
                    bytes
                }
            };
        }
        let commitments: Vec<Commitment> =
            outputs.iter().map(|o| o.note.commitment()).collect();

        let proof = proof_digest(
            &ctx.sig_pubkey,
            &ctx.anchors,
            &nullifiers,
            &commitments,
            ctx.reward,
        );

        Ok(ProofBundle {
            proof,
            h_sig,
            seed,
            phi,
        })
    }

    fn verify(&self, check: &VerifyContext<'_>) -> bool {
        if check.macs.len() != JS_INPUTS {
            return false;
        }
        let expected = proof_digest(
            check.sig_pubkey,
            check.anchors,
            check.nullifiers,
            check.commitments,
            check.reward,
        );
        check.proof == expected.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::{payment_address, SpendingKey};

    fn balanced_slots() -> (Vec<JsInput>, Vec<JsOutput>) {
        let sk = SpendingKey::random();
        let address = payment_address(&sk);
        let mut spend = JsInput::dummy();
        spend.note.value = 10;
        let inputs = vec![spend, JsInput::dummy()];
        let outputs = vec![JsOutput::to(&address, 9, Vec::new()), JsOutput::dummy()];
        (inputs, outputs)
    }

    #[test]
    fn prove_then_verify_round_trips() {
        let oracle = HashBoundOracle;
        let (inputs, mut outputs) = balanced_slots();
        let ctx = ProofContext::new([1u8; 64], vec![Hash32::zero(); JS_INPUTS], 0, 1);

        let bundle = oracle.prove(&inputs, &mut outputs, &ctx).unwrap();
        let nullifiers: Vec<Nullifier> = inputs.iter().map(JsInput::nullifier).collect();
        let commitments: Vec<Commitment> =
            outputs.iter().map(|o| o.note.commitment()).collect();
        let macs = vec![Hash32::zero(); JS_INPUTS];

        assert!(oracle.verify(&VerifyContext {
            proof: &bundle.proof,
            sig_pubkey: &ctx.sig_pubkey,
            anchors: &ctx.anchors,
            nullifiers: &nullifiers,
            commitments: &commitments,
            macs: &macs,
            reward: 0,
        }));

        // Any mutated public input must break verification.
        let mut wrong = commitments.clone();
        wrong[0] = Commitment([0xcc; 32]);
        assert!(!oracle.verify(&VerifyContext {
            proof: &bundle.proof,
            sig_pubkey: &ctx.sig_pubkey,
            anchors: &ctx.anchors,
            nullifiers: &nullifiers,
            commitments: &wrong,
            macs: &macs,
            reward: 0,
        }));
    }

    #[test]
    fn unbalanced_description_is_rejected() {
        let oracle = HashBoundOracle;
        let (inputs, mut outputs) = balanced_slots();
        // Fee of 5 breaks `10 + 0 = 9 + fee`.
        let ctx = ProofContext::new([1u8; 64], vec![Hash32::zero(); JS_INPUTS], 0, 5);
        assert!(matches!(
            oracle.prove(&inputs, &mut outputs, &ctx),
            Err(TxError::BalanceMismatch)
        ));
    }

    #[test]
    fn reward_balances_with_no_real_inputs() {
        let oracle = HashBoundOracle;
        let sk = SpendingKey::random();
        let address = payment_address(&sk);
        let inputs = vec![JsInput::dummy(), JsInput::dummy()];
        let mut outputs = vec![JsOutput::to(&address, 50, Vec::new()), JsOutput::dummy()];
        let ctx = ProofContext::new([2u8; 64], vec![Hash32::zero(); JS_INPUTS], 50, 0);
        assert!(oracle.prove(&inputs, &mut outputs, &ctx).is_ok());
    }

    #[test]
    fn prover_fills_output_randomness() {
        let oracle = HashBoundOracle;
        let (inputs, mut outputs) = balanced_slots();
        let ctx = ProofContext::new([1u8; 64], vec![Hash32::zero(); JS_INPUTS], 0, 1);
        oracle.prove(&inputs, &mut outputs, &ctx).unwrap();
        assert_ne!(outputs[0].note.rho, [0u8; 32]);
        assert_ne!(outputs[0].note.r, [0u8; 32]);
    }
}
