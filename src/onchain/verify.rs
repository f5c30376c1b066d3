use bitcoin::Txid;

use crate::onchain::htlc::HtlcTemplate;
use crate::onchain::rpc::BitcoinOps;
use crate::crypto::msat_to_sat_ceil;
use crate::error::SwapError;

/// The confirmed on-chain HTLC output a claim or refund spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingOutpoint {
    pub txid: Txid,
    pub vout: u32,
    pub value_sat: u64,
}

/// Result of a successful funding verification. Re-running the verifier
/// on the same confirmed funding yields an equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcIdentification {
    pub outpoint: FundingOutpoint,
    pub amount_sat: u64,
    pub confirmations: u32,
    pub script_pubkey_hex: String,
}

/// Verify that the funding outpoint pays a byte-exact reconstruction of
/// the HTLC described by `template`, is confirmed deeply enough, and
/// covers the invoice amount. No retries; callers may wrap this in a
/// bounded poll.
pub async fn verify_funding<B: BitcoinOps>(
    rpc: &B,
    template: &HtlcTemplate,
    funding_txid: Txid,
    funding_vout: u32,
    invoice_amount_msat: u64,
    min_confs: u32,
) -> Result<HtlcIdentification, SwapError> {
    let tx = rpc.get_raw_transaction(&funding_txid).await?;
    if tx.confirmations < min_confs {
        return Err(SwapError::Timeout(format!(
            "funding tx {funding_txid} has {} of {min_confs} confirmations",
            tx.confirmations
        )));
    }

    // The rebuilt tapscripts must embed the negotiated parameters before
    // the byte comparison, so a bad hash or key reports as a template
    // mismatch rather than an opaque script difference.
    let claim_hex = hex::encode(template.claim_script().as_bytes());
    let refund_hex = hex::encode(template.refund_script().as_bytes());
    if !claim_hex.contains(&hex::encode(template.payment_hash)) {
        return Err(SwapError::TemplateMismatch(
            "claim script does not embed the payment hash".into(),
        ));
    }
    if !claim_hex.contains(&hex::encode(template.lp_xonly.serialize())) {
        return Err(SwapError::TemplateMismatch(
            "claim script does not embed the LP pubkey".into(),
        ));
    }
    if !refund_hex.contains(&hex::encode(template.user_xonly.serialize())) {
        return Err(SwapError::TemplateMismatch(
            "refund script does not embed the user refund pubkey".into(),
        ));
    }

    let output = rpc
        .get_transaction_output(&funding_txid, funding_vout, None, true)
        .await?;

    let expected_spk_hex = hex::encode(template.script_pubkey()?.as_bytes());
    let spk_bytes = hex::decode(&output.script_pubkey_hex)
        .map_err(|e| SwapError::Rpc(format!("funding scriptPubKey hex: {e}")))?;
    if spk_bytes.len() != 34 || spk_bytes[0] != 0x51 {
        return Err(SwapError::ScriptPubKeyMismatch {
            txid: funding_txid,
            vout: funding_vout,
        });
    }
    if output.script_pubkey_hex != expected_spk_hex {
        return Err(SwapError::ScriptPubKeyMismatch {
            txid: funding_txid,
            vout: funding_vout,
        });
    }

    let invoice_sat = msat_to_sat_ceil(invoice_amount_msat);
    if output.value_sat < invoice_sat {
        return Err(SwapError::AmountTooLow {
            output_sat: output.value_sat,
            invoice_sat,
        });
    }

    Ok(HtlcIdentification {
        outpoint: FundingOutpoint {
            txid: funding_txid,
            vout: funding_vout,
            value_sat: output.value_sat,
        },
        amount_sat: output.value_sat,
        confirmations: tx.confirmations,
        script_pubkey_hex: output.script_pubkey_hex,
    })
}
