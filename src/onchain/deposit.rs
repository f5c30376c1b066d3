use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash as _;
use bitcoin::key::TapTweak as _;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut,
    Txid, Witness,
};

use crate::onchain::coin_select::{select_coins, InputKind};
use crate::onchain::keys::SwapSigner;
use crate::onchain::rpc::BitcoinOps;
use crate::error::SwapError;

#[derive(Debug, Clone)]
pub struct DepositResult {
    pub txid: Txid,
    pub fee_sat: u64,
    pub change_sat: u64,
    pub change_address: Address,
    pub input_count: usize,
    pub psbt_base64: String,
}

/// Fund the HTLC address from the signer's own Taproot UTXOs: scan, select
/// coins, build a PSBT, key-path sign every input with the tweaked key,
/// finalize and broadcast.
pub async fn build_and_broadcast_deposit<B: BitcoinOps>(
    rpc: &B,
    signer: &SwapSigner,
    htlc_address: &Address,
    amount_sat: u64,
    fee_rate_sat_per_vb: f64,
) -> Result<DepositResult, SwapError> {
    let funding_spk = signer.taproot_script_pubkey();
    let utxos = rpc
        .scan_utxos_by_script(&hex::encode(funding_spk.as_bytes()))
        .await?;
    let selection = select_coins(&utxos, amount_sat, fee_rate_sat_per_vb, InputKind::P2tr)?;

    let change_address = signer.taproot_address();

    let inputs: Vec<TxIn> = selection
        .inputs
        .iter()
        .map(|utxo| TxIn {
            previous_output: OutPoint {
                txid: utxo.txid,
                vout: utxo.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        })
        .collect();

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(amount_sat),
        script_pubkey: htlc_address.script_pubkey(),
    }];
    if selection.change_sat > 0 {
        outputs.push(TxOut {
            value: Amount::from_sat(selection.change_sat),
            script_pubkey: change_address.script_pubkey(),
        });
    }

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
        .map_err(|e| SwapError::Internal(format!("build deposit psbt: {e}")))?;

    let prevouts: Vec<TxOut> = selection
        .inputs
        .iter()
        .map(|utxo| TxOut {
            value: Amount::from_sat(utxo.value_sat),
            script_pubkey: funding_spk.clone(),
        })
        .collect();
    for (psbt_input, prevout) in psbt.inputs.iter_mut().zip(&prevouts) {
        psbt_input.witness_utxo = Some(prevout.clone());
        psbt_input.tap_internal_key = Some(signer.xonly_pubkey());
    }

    let secp = Secp256k1::new();
    let tweaked = signer.keypair(&secp).tap_tweak(&secp, None).to_inner();

    let unsigned_tx = psbt.unsigned_tx.clone();
    let mut cache = SighashCache::new(&unsigned_tx);
    for index in 0..psbt.inputs.len() {
        let sighash = cache
            .taproot_key_spend_signature_hash(
                index,
                &Prevouts::All(&prevouts),
                TapSighashType::Default,
            )
            .map_err(|e| SwapError::Internal(format!("deposit sighash: {e}")))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = bitcoin::taproot::Signature {
            signature: secp.sign_schnorr(&msg, &tweaked),
            sighash_type: TapSighashType::Default,
        };

        let input = &mut psbt.inputs[index];
        input.tap_key_sig = Some(signature);
        let mut witness = Witness::new();
        witness.push(signature.to_vec());
        input.final_script_witness = Some(witness);
    }

    let psbt_base64 = psbt.to_string();
    let tx = psbt
        .extract_tx()
        .map_err(|e| SwapError::Internal(format!("extract deposit tx: {e}")))?;
    let txid = rpc.send_raw_transaction(&serialize_hex(&tx)).await?;

    tracing::info!(
        %txid,
        amount_sat,
        fee_sat = selection.fee_sat,
        change_sat = selection.change_sat,
        inputs = selection.inputs.len(),
        "broadcast htlc deposit"
    );

    Ok(DepositResult {
        txid,
        fee_sat: selection.fee_sat,
        change_sat: selection.change_sat,
        change_address,
        input_count: selection.inputs.len(),
        psbt_base64,
    })
}
