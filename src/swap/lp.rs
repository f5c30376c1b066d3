use std::fmt;
use std::str::FromStr as _;
use std::time::Duration;

use bitcoin::Txid;

use crate::onchain::htlc::HtlcTemplate;
use crate::onchain::keys::SwapSigner;
use crate::onchain::rpc::BitcoinOps;
use crate::onchain::spend::claim_htlc;
use crate::onchain::verify::verify_funding;
use crate::config::Config;
use crate::crypto::{parse_payment_hash, sha256};
use crate::error::SwapError;
use crate::lightning::rln::{PaymentStatus, PreimageStatus, RlnOps};
use crate::swap::channel::SubmarineFetch;
use crate::swap::{poll, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};

const FETCH_ATTEMPTS: u32 = 1_800;
const FETCH_INTERVAL: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpState {
    AwaitingData,
    Verified,
    Paying,
    PaymentSettled,
    Claimed,
    Failed,
    TimedOut,
}

impl fmt::Display for LpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LpState::AwaitingData => "AWAITING_DATA",
            LpState::Verified => "VERIFIED",
            LpState::Paying => "PAYING",
            LpState::PaymentSettled => "PAYMENT_SETTLED",
            LpState::Claimed => "CLAIMED",
            LpState::Failed => "FAILED",
            LpState::TimedOut => "TIMED_OUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct LpReport {
    pub state: LpState,
    pub payment_hash: Option<String>,
    pub claim_txid: Option<Txid>,
    pub failure: Option<SwapError>,
}

impl LpReport {
    fn failed(payment_hash: Option<String>, failure: SwapError) -> Self {
        Self {
            state: LpState::Failed,
            payment_hash,
            claim_txid: None,
            failure: Some(failure),
        }
    }
}

fn enter(state: LpState) {
    tracing::info!(state = %state, "lp state");
}

enum PreimageVerdict {
    Settled(String),
    Rejected(PreimageStatus),
}

/// Drive a swap as the LP: fetch the submarine record, verify the
/// on-chain HTLC against the invoice, front the Lightning payment, then
/// claim the HTLC with the revealed preimage.
pub async fn run_lp<B, R, F>(
    cfg: &Config,
    rpc: &B,
    rln: &R,
    fetcher: &F,
) -> Result<LpReport, SwapError>
where
    B: BitcoinOps,
    R: RlnOps,
    F: SubmarineFetch,
{
    enter(LpState::AwaitingData);
    let signer = SwapSigner::from_wif(&cfg.wif, cfg.network)?;

    let data = poll("submarine data", FETCH_ATTEMPTS, FETCH_INTERVAL, move || {
        fetcher.fetch()
    })
    .await?;
    let Some(data) = data else {
        return Ok(LpReport {
            state: LpState::TimedOut,
            payment_hash: None,
            claim_txid: None,
            failure: Some(SwapError::Timeout("no submarine data was published".into())),
        });
    };

    let decoded = rln.decode_invoice(&data.invoice).await?;
    let payment_hash = parse_payment_hash(&decoded.payment_hash)?;
    let payment_hash_hex = decoded.payment_hash.clone();
    tracing::info!(
        payment_hash = %payment_hash_hex,
        amt_msat = decoded.amt_msat,
        t_lock = data.t_lock,
        funding_txid = %data.funding_txid,
        "decoded submarine invoice"
    );

    // tLock comes from the record verbatim; recomputing it from the chain
    // tip here would break the byte-exact script reconstruction.
    let template = HtlcTemplate::new(
        payment_hash,
        &signer.compressed_pubkey_hex(),
        &data.user_refund_pubkey_hex,
        data.t_lock,
    )?;
    let funding_txid = Txid::from_str(&data.funding_txid)
        .map_err(|e| SwapError::InvalidInput(format!("fundingTxid: {e}")))?;

    let funding = match verify_funding(
        rpc,
        &template,
        funding_txid,
        data.funding_vout,
        decoded.amt_msat,
        cfg.min_confs,
    )
    .await
    {
        Ok(funding) => funding,
        Err(err) if err.is_counterparty_fault() => {
            tracing::warn!(error = %err, "htlc verification rejected the swap");
            return Ok(LpReport::failed(Some(payment_hash_hex), err));
        }
        Err(err) => return Err(err),
    };
    enter(LpState::Verified);
    tracing::info!(
        amount_sat = funding.amount_sat,
        confirmations = funding.confirmations,
        "verified on-chain htlc"
    );

    enter(LpState::Paying);
    let pay = rln.pay_invoice(&data.invoice).await?;
    if pay.status == PaymentStatus::Failed {
        return Ok(LpReport::failed(
            Some(payment_hash_hex),
            SwapError::Rln("sendpayment reported Failed".into()),
        ));
    }
    enter(LpState::PaymentSettled);

    let hash_hex = &payment_hash_hex;
    let verdict = poll(
        "payment preimage",
        DEFAULT_POLL_ATTEMPTS,
        DEFAULT_POLL_INTERVAL,
        move || async move {
            let response = rln.get_payment_preimage(hash_hex).await?;
            Ok(match response.status {
                PreimageStatus::Succeeded => match response.preimage {
                    Some(preimage) => Some(PreimageVerdict::Settled(preimage)),
                    None => None,
                },
                PreimageStatus::Cancelled | PreimageStatus::Failed | PreimageStatus::Timeout => {
                    Some(PreimageVerdict::Rejected(response.status))
                }
                PreimageStatus::Pending | PreimageStatus::Claimable => None,
            })
        },
    )
    .await?;

    let preimage_hex = match verdict {
        Some(PreimageVerdict::Settled(preimage)) => preimage,
        Some(PreimageVerdict::Rejected(status)) => {
            return Ok(LpReport::failed(
                Some(payment_hash_hex),
                SwapError::Rln(format!("payment ended {status:?} without a preimage")),
            ));
        }
        None => {
            return Ok(LpReport {
                state: LpState::TimedOut,
                payment_hash: Some(payment_hash_hex),
                claim_txid: None,
                failure: Some(SwapError::Timeout(
                    "payment never settled with a preimage".into(),
                )),
            });
        }
    };

    let preimage: [u8; 32] = hex::decode(&preimage_hex)
        .map_err(|e| SwapError::Rln(format!("preimage hex: {e}")))?
        .try_into()
        .map_err(|_| SwapError::Rln("preimage must be 32 bytes".into()))?;
    if sha256(&preimage) != payment_hash {
        return Ok(LpReport::failed(
            Some(payment_hash_hex),
            SwapError::PreimageMismatch,
        ));
    }

    let claim = claim_htlc(
        rpc,
        &template,
        &funding.outpoint,
        preimage,
        &signer,
        cfg.fee_rate_sat_per_vb,
    )
    .await?;
    enter(LpState::Claimed);

    Ok(LpReport {
        state: LpState::Claimed,
        payment_hash: Some(payment_hash_hex),
        claim_txid: Some(claim.txid),
        failure: None,
    })
}
