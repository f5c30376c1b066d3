use bitcoin::Txid;

use crate::error::SwapError;

const TX_OVERHEAD_VBYTES: f64 = 10.5;
const P2TR_INPUT_VBYTES: f64 = 58.0;
const P2WPKH_INPUT_VBYTES: f64 = 68.0;
const P2TR_OUTPUT_VBYTES: f64 = 43.0;
const MIN_FEE_SAT: u64 = 1_000;

pub const P2TR_DUST_SAT: u64 = 330;
pub const P2WPKH_DUST_SAT: u64 = 294;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    P2tr,
    P2wpkh,
}

impl InputKind {
    fn input_vbytes(self) -> f64 {
        match self {
            InputKind::P2tr => P2TR_INPUT_VBYTES,
            InputKind::P2wpkh => P2WPKH_INPUT_VBYTES,
        }
    }

    pub fn dust_limit_sat(self) -> u64 {
        match self {
            InputKind::P2tr => P2TR_DUST_SAT,
            InputKind::P2wpkh => P2WPKH_DUST_SAT,
        }
    }
}

/// A spendable output of the funding key, as reported by the node's
/// UTXO-set scan.
#[derive(Debug, Clone)]
pub struct CandidateUtxo {
    pub txid: Txid,
    pub vout: u32,
    pub value_sat: u64,
    pub script_hex: String,
}

#[derive(Debug, Clone)]
pub struct CoinSelection {
    pub inputs: Vec<CandidateUtxo>,
    pub fee_sat: u64,
    pub change_sat: u64,
}

pub fn estimate_fee_sat(
    fee_rate_sat_per_vb: f64,
    input_count: usize,
    output_count: usize,
    kind: InputKind,
) -> u64 {
    let vbytes = TX_OVERHEAD_VBYTES
        + kind.input_vbytes() * input_count as f64
        + P2TR_OUTPUT_VBYTES * output_count as f64;
    let fee = (fee_rate_sat_per_vb * vbytes).ceil() as u64;
    fee.max(MIN_FEE_SAT)
}

/// Greedy largest-first selection: accumulate inputs until the sum covers
/// the target plus the fee for the current input count. Change is only
/// kept when it clears the dust limit; sub-dust residue is absorbed into
/// the fee.
pub fn select_coins(
    utxos: &[CandidateUtxo],
    target_sat: u64,
    fee_rate_sat_per_vb: f64,
    kind: InputKind,
) -> Result<CoinSelection, SwapError> {
    if utxos.is_empty() {
        return Err(SwapError::NoUtxos);
    }

    let mut sorted: Vec<CandidateUtxo> = utxos.to_vec();
    sorted.sort_by(|a, b| b.value_sat.cmp(&a.value_sat));

    let mut selected: Vec<CandidateUtxo> = Vec::new();
    let mut sum: u64 = 0;
    for utxo in sorted {
        sum += utxo.value_sat;
        selected.push(utxo);

        // Assume a change output while probing; the no-change case only
        // lowers the fee.
        let fee = estimate_fee_sat(fee_rate_sat_per_vb, selected.len(), 2, kind);
        if sum >= target_sat + fee {
            let change = sum - target_sat - fee;
            if change >= kind.dust_limit_sat() {
                return Ok(CoinSelection {
                    inputs: selected,
                    fee_sat: fee,
                    change_sat: change,
                });
            }
            // Sub-dust remainder: no change output, so everything above
            // the target is absorbed into the fee.
            return Ok(CoinSelection {
                fee_sat: sum - target_sat,
                change_sat: 0,
                inputs: selected,
            });
        }
    }

    let fee = estimate_fee_sat(fee_rate_sat_per_vb, selected.len(), 2, kind);
    Err(SwapError::FundsUnavailable {
        needed_sat: target_sat + fee,
        available_sat: sum,
    })
}
