use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::psbt::{Psbt, PsbtSighashType};
use bitcoin::secp256k1::Message;
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut,
    Txid, Witness,
};

use crate::onchain::coin_select::P2TR_DUST_SAT;
use crate::onchain::htlc::HtlcTemplate;
use crate::onchain::keys::SwapSigner;
use crate::onchain::rpc::BitcoinOps;
use crate::onchain::verify::FundingOutpoint;
use crate::crypto::sha256;
use crate::error::SwapError;

// One script-path input plus one P2TR output.
const SPEND_VBYTES: f64 = 10.5 + 120.0 + 43.0;
const MIN_FEE_SAT: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct ClaimResult {
    pub txid: Txid,
    pub tx_hex: String,
    pub lp_address: Address,
    pub fee_sat: u64,
}

fn spend_fee_sat(fee_rate_sat_per_vb: f64) -> u64 {
    ((fee_rate_sat_per_vb * SPEND_VBYTES).ceil() as u64).max(MIN_FEE_SAT)
}

fn spend_output_value(funding: &FundingOutpoint, fee_sat: u64) -> Result<u64, SwapError> {
    let output_sat = funding.value_sat.saturating_sub(fee_sat);
    if output_sat < P2TR_DUST_SAT {
        return Err(SwapError::DustAfterFee {
            output_sat,
            dust_sat: P2TR_DUST_SAT,
        });
    }
    Ok(output_sat)
}

fn htlc_input(funding: &FundingOutpoint, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output: OutPoint {
            txid: funding.txid,
            vout: funding.vout,
        },
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::default(),
    }
}

/// Build and sign the claim transaction: a script-path spend of the claim
/// tapleaf, paying the whole HTLC value minus fee to the LP's own Taproot
/// address. The finished witness stack is exactly
/// `[sig, preimage, claimScript, controlBlock]`.
pub fn build_claim_tx(
    template: &HtlcTemplate,
    funding: &FundingOutpoint,
    preimage: [u8; 32],
    lp_signer: &SwapSigner,
    fee_rate_sat_per_vb: f64,
) -> Result<(Transaction, Address, u64), SwapError> {
    if sha256(&preimage) != template.payment_hash {
        return Err(SwapError::InvalidInput(
            "preimage does not hash to the template payment hash".into(),
        ));
    }
    if lp_signer.xonly_pubkey() != template.lp_xonly {
        return Err(SwapError::InvalidInput(
            "signer key does not match the claim leaf pubkey".into(),
        ));
    }

    let fee_sat = spend_fee_sat(fee_rate_sat_per_vb);
    let output_sat = spend_output_value(funding, fee_sat)?;

    let claim_script = template.claim_script();
    let control_block = template.claim_control_block()?;
    let lp_address = lp_signer.taproot_address();

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![htlc_input(funding, Sequence::MAX)],
        output: vec![TxOut {
            value: Amount::from_sat(output_sat),
            script_pubkey: lp_address.script_pubkey(),
        }],
    };

    let prevout = TxOut {
        value: Amount::from_sat(funding.value_sat),
        script_pubkey: template.script_pubkey()?,
    };

    let secp = Secp256k1::new();
    let mut cache = SighashCache::new(&tx);
    let sighash = cache
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&[prevout]),
            TapLeafHash::from_script(&claim_script, LeafVersion::TapScript),
            TapSighashType::Default,
        )
        .map_err(|e| SwapError::Internal(format!("claim sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::taproot::Signature {
        signature: secp.sign_schnorr(&msg, &lp_signer.keypair(&secp)),
        sighash_type: TapSighashType::Default,
    };

    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(preimage);
    witness.push(claim_script.as_bytes());
    witness.push(control_block.serialize());
    tx.input[0].witness = witness;

    Ok((tx, lp_address, fee_sat))
}

pub async fn claim_htlc<B: BitcoinOps>(
    rpc: &B,
    template: &HtlcTemplate,
    funding: &FundingOutpoint,
    preimage: [u8; 32],
    lp_signer: &SwapSigner,
    fee_rate_sat_per_vb: f64,
) -> Result<ClaimResult, SwapError> {
    let (tx, lp_address, fee_sat) =
        build_claim_tx(template, funding, preimage, lp_signer, fee_rate_sat_per_vb)?;
    let tx_hex = serialize_hex(&tx);
    let txid = rpc.send_raw_transaction(&tx_hex).await?;

    tracing::info!(%txid, %lp_address, fee_sat, "broadcast htlc claim");

    Ok(ClaimResult {
        txid,
        tx_hex,
        lp_address,
        fee_sat,
    })
}

#[derive(Debug, Clone)]
pub struct RefundPsbt {
    pub psbt: Psbt,
    pub fee_sat: u64,
}

/// Build the unsigned refund PSBT: `nLockTime = tLock`, a non-final input
/// sequence so CLTV is enforceable, one output to the user's refund
/// address, and the refund tapleaf plus control block attached for the
/// refund holder to sign once the timelock matures.
pub fn build_refund_psbt(
    template: &HtlcTemplate,
    funding: &FundingOutpoint,
    refund_address: &Address,
    fee_rate_sat_per_vb: f64,
) -> Result<RefundPsbt, SwapError> {
    let fee_sat = spend_fee_sat(fee_rate_sat_per_vb);
    let output_sat = spend_output_value(funding, fee_sat)?;

    let lock_time = LockTime::from_height(template.t_lock)
        .map_err(|e| SwapError::InvalidInput(format!("tLock {}: {e}", template.t_lock)))?;

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time,
        input: vec![htlc_input(funding, Sequence::ENABLE_LOCKTIME_NO_RBF)],
        output: vec![TxOut {
            value: Amount::from_sat(output_sat),
            script_pubkey: refund_address.script_pubkey(),
        }],
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
        .map_err(|e| SwapError::Internal(format!("build refund psbt: {e}")))?;
    let input = &mut psbt.inputs[0];
    input.witness_utxo = Some(TxOut {
        value: Amount::from_sat(funding.value_sat),
        script_pubkey: template.script_pubkey()?,
    });
    input.sighash_type = Some(PsbtSighashType::from(TapSighashType::Default));
    input.tap_scripts.insert(
        template.refund_control_block()?,
        (template.refund_script(), LeafVersion::TapScript),
    );

    Ok(RefundPsbt { psbt, fee_sat })
}

/// Complete a refund PSBT with the user's key after tLock has matured.
/// Witness stack for the refund leaf: `[sig, refundScript, controlBlock]`.
pub fn sign_and_finalize_refund(
    refund: &RefundPsbt,
    template: &HtlcTemplate,
    user_signer: &SwapSigner,
) -> Result<Transaction, SwapError> {
    if user_signer.xonly_pubkey() != template.user_xonly {
        return Err(SwapError::InvalidInput(
            "signer key does not match the refund leaf pubkey".into(),
        ));
    }

    let prevout = refund.psbt.inputs[0]
        .witness_utxo
        .clone()
        .ok_or_else(|| SwapError::Internal("refund psbt is missing its witness utxo".into()))?;

    let mut tx = refund.psbt.unsigned_tx.clone();
    let refund_script = template.refund_script();

    let secp = Secp256k1::new();
    let mut cache = SighashCache::new(&tx);
    let sighash = cache
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&[prevout]),
            TapLeafHash::from_script(&refund_script, LeafVersion::TapScript),
            TapSighashType::Default,
        )
        .map_err(|e| SwapError::Internal(format!("refund sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::taproot::Signature {
        signature: secp.sign_schnorr(&msg, &user_signer.keypair(&secp)),
        sighash_type: TapSighashType::Default,
    };

    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(refund_script.as_bytes());
    witness.push(template.refund_control_block()?.serialize());
    tx.input[0].witness = witness;

    Ok(tx)
}
