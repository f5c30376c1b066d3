use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::Txid;
use rand::RngCore as _;

use crate::onchain::deposit::build_and_broadcast_deposit;
use crate::onchain::htlc::HtlcTemplate;
use crate::onchain::keys::SwapSigner;
use crate::onchain::rpc::BitcoinOps;
use crate::config::Config;
use crate::crypto::{msat_to_sat_ceil, sha256};
use crate::error::SwapError;
use crate::lightning::rln::{HodlInvoiceRequest, HodlPaymentStatus, InvoiceStatus, RlnOps};
use crate::swap::channel::SubmarinePublish;
use crate::swap::store::HodlStore;
use crate::swap::{
    poll, HodlRecord, SubmarineData, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};

/// Margin the on-chain timelock must hold beyond the invoice expiry, so a
/// refund is always possible after the invoice can no longer settle.
const LOCKTIME_SAFETY_MARGIN_SEC: u64 = 3_600;
const SECONDS_PER_BLOCK: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Draft,
    Invoiced,
    FundingBuilt,
    FundingConfirmed,
    Published,
    WaitingClaimable,
    Settling,
    Settled,
    Failed,
    TimedOut,
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserState::Draft => "DRAFT",
            UserState::Invoiced => "INVOICED",
            UserState::FundingBuilt => "FUNDING_BUILT",
            UserState::FundingConfirmed => "FUNDING_CONFIRMED",
            UserState::Published => "PUBLISHED",
            UserState::WaitingClaimable => "WAITING_CLAIMABLE",
            UserState::Settling => "SETTLING",
            UserState::Settled => "SETTLED",
            UserState::Failed => "FAILED",
            UserState::TimedOut => "TIMED_OUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct UserReport {
    pub state: UserState,
    pub payment_hash: String,
    pub htlc_address: Option<String>,
    pub funding_txid: Option<Txid>,
    pub t_lock: Option<u32>,
    pub invoice_status: Option<InvoiceStatus>,
    pub failure: Option<SwapError>,
}

fn enter(state: UserState) {
    tracing::info!(state = %state, "user state");
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

enum HodlVerdict {
    Claimable,
    AlreadySettled,
    Rejected(HodlPaymentStatus),
}

/// Drive a swap as the USER: create the HODL invoice, fund the HTLC
/// on-chain, publish the submarine record, then settle the invoice once
/// the LP's payment is claimable.
pub async fn run_user<B, R, P>(
    cfg: &Config,
    rpc: &B,
    rln: &R,
    store: &HodlStore,
    publisher: &P,
) -> Result<UserReport, SwapError>
where
    B: BitcoinOps,
    R: RlnOps,
    P: SubmarinePublish,
{
    enter(UserState::Draft);

    let refund_window_sec = u64::from(cfg.locktime_blocks) * SECONDS_PER_BLOCK;
    if refund_window_sec <= cfg.hodl_expiry_sec + LOCKTIME_SAFETY_MARGIN_SEC {
        return Err(SwapError::Config(format!(
            "LOCKTIME_BLOCKS={} gives a {refund_window_sec}s refund window, which does not \
             clear HODL_EXPIRY_SEC={} plus a {LOCKTIME_SAFETY_MARGIN_SEC}s margin",
            cfg.locktime_blocks, cfg.hodl_expiry_sec
        )));
    }

    let signer = SwapSigner::from_wif(&cfg.wif, cfg.network)?;
    let lp_pubkey_hex = cfg
        .lp_pubkey_hex
        .as_deref()
        .ok_or_else(|| SwapError::Config("LP_PUBKEY_HEX is required for USER".into()))?;
    let amount_msat = cfg
        .swap_amount_msat
        .ok_or_else(|| SwapError::Config("SWAP_AMOUNT_MSAT is required for USER".into()))?;

    let mut preimage = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut preimage);
    let payment_hash = sha256(&preimage);
    let payment_hash_hex = hex::encode(payment_hash);
    let preimage_hex = hex::encode(preimage);

    let hodl = rln
        .invoice_hodl(&HodlInvoiceRequest {
            payment_hash: payment_hash_hex.clone(),
            expiry_sec: cfg.hodl_expiry_sec,
            amt_msat: amount_msat,
        })
        .await?;
    enter(UserState::Invoiced);

    // Persisting the record must succeed before any on-chain activity;
    // losing the preimage would strand the LP's payment.
    store.put(&HodlRecord {
        payment_hash: payment_hash_hex.clone(),
        preimage: preimage_hex.clone(),
        amount_msat,
        expiry_sec: cfg.hodl_expiry_sec,
        invoice: hodl.invoice.clone(),
        payment_secret: hodl.payment_secret.clone(),
        created_at_ms: now_ms(),
    })?;

    let tip = rpc.get_block_count().await?;
    let t_lock = u32::try_from(tip + u64::from(cfg.locktime_blocks)).map_err(|_| {
        SwapError::InvalidInput(format!(
            "tLock overflows u32: tip {tip} + {} blocks",
            cfg.locktime_blocks
        ))
    })?;

    let template = HtlcTemplate::new(
        payment_hash,
        lp_pubkey_hex,
        &signer.compressed_pubkey_hex(),
        t_lock,
    )?;
    let htlc_address = template.address(cfg.network)?;
    tracing::info!(%htlc_address, t_lock, payment_hash = %payment_hash_hex, "built htlc");
    enter(UserState::FundingBuilt);

    let amount_sat = msat_to_sat_ceil(amount_msat);
    let deposit = match build_and_broadcast_deposit(
        rpc,
        &signer,
        &htlc_address,
        amount_sat,
        cfg.fee_rate_sat_per_vb,
    )
    .await
    {
        Ok(deposit) => deposit,
        Err(err) => {
            // The invoice exists but can never be paid against a missing
            // HTLC; cancel it before giving up.
            if let Err(cancel_err) = rln.invoice_cancel(&payment_hash_hex).await {
                tracing::warn!(error = %cancel_err, "cancel hodl invoice after deposit failure");
            }
            return Err(err);
        }
    };

    let htlc_spk_hex = hex::encode(template.script_pubkey()?.as_bytes());
    let spk_hex = &htlc_spk_hex;
    let min_confs = cfg.min_confs;
    let deposit_txid = deposit.txid;
    let funding_vout = poll(
        "htlc funding confirmations",
        DEFAULT_POLL_ATTEMPTS,
        DEFAULT_POLL_INTERVAL,
        move || async move {
            let utxos = rpc.scan_utxos_by_script(spk_hex).await?;
            let Some(utxo) = utxos.iter().find(|u| u.txid == deposit_txid) else {
                return Ok(None);
            };
            let tx = rpc.get_raw_transaction(&deposit_txid).await?;
            if tx.confirmations < min_confs {
                return Ok(None);
            }
            Ok(Some(utxo.vout))
        },
    )
    .await?;

    let Some(funding_vout) = funding_vout else {
        if let Err(cancel_err) = rln.invoice_cancel(&payment_hash_hex).await {
            tracing::warn!(error = %cancel_err, "cancel hodl invoice after funding timeout");
        }
        return Ok(UserReport {
            state: UserState::TimedOut,
            payment_hash: payment_hash_hex,
            htlc_address: Some(htlc_address.to_string()),
            funding_txid: Some(deposit.txid),
            t_lock: Some(t_lock),
            invoice_status: None,
            failure: Some(SwapError::Timeout(
                "htlc funding never reached the confirmation target".into(),
            )),
        });
    };
    enter(UserState::FundingConfirmed);

    publisher
        .publish(&SubmarineData {
            invoice: hodl.invoice.clone(),
            funding_txid: deposit.txid.to_string(),
            funding_vout,
            user_refund_pubkey_hex: signer.compressed_pubkey_hex(),
            t_lock,
        })
        .await?;
    enter(UserState::Published);

    let mut report = UserReport {
        state: UserState::Published,
        payment_hash: payment_hash_hex.clone(),
        htlc_address: Some(htlc_address.to_string()),
        funding_txid: Some(deposit.txid),
        t_lock: Some(t_lock),
        invoice_status: None,
        failure: None,
    };

    enter(UserState::WaitingClaimable);
    let hash_hex = &payment_hash_hex;
    let verdict = poll(
        "hodl payment claimable",
        DEFAULT_POLL_ATTEMPTS,
        DEFAULT_POLL_INTERVAL,
        move || async move {
            let payment = rln.get_payment(hash_hex).await?;
            if !payment.inbound {
                return Err(SwapError::Rln(format!(
                    "payment {hash_hex} is not inbound"
                )));
            }
            tracing::debug!(
                status = ?payment.status,
                amt_msat = payment.amt_msat,
                asset_id = ?payment.asset_id,
                asset_amount = ?payment.asset_amount,
                payee_pubkey = ?payment.payee_pubkey,
                "hodl payment status"
            );
            Ok(match payment.status {
                HodlPaymentStatus::Claimable => Some(HodlVerdict::Claimable),
                HodlPaymentStatus::Succeeded => Some(HodlVerdict::AlreadySettled),
                HodlPaymentStatus::Cancelled | HodlPaymentStatus::Failed => {
                    Some(HodlVerdict::Rejected(payment.status))
                }
                HodlPaymentStatus::Pending => None,
            })
        },
    )
    .await?;

    match verdict {
        Some(HodlVerdict::Claimable) => {
            enter(UserState::Settling);
            rln.invoice_settle(&payment_hash_hex, &preimage_hex).await?;
            report.state = UserState::Settled;
        }
        Some(HodlVerdict::AlreadySettled) => {
            report.state = UserState::Settled;
        }
        Some(HodlVerdict::Rejected(status)) => {
            report.state = UserState::Failed;
            report.failure = Some(SwapError::Rln(format!(
                "hodl payment ended {status:?} before settling"
            )));
            return Ok(report);
        }
        None => {
            report.state = UserState::TimedOut;
            report.failure = Some(SwapError::Timeout(
                "no claimable payment arrived for the hodl invoice".into(),
            ));
            return Ok(report);
        }
    }
    enter(UserState::Settled);

    let invoice = &hodl.invoice;
    report.invoice_status = poll(
        "invoice terminal status",
        DEFAULT_POLL_ATTEMPTS,
        DEFAULT_POLL_INTERVAL,
        move || async move {
            let status = rln.invoice_status(invoice).await?;
            Ok(status.is_terminal().then_some(status))
        },
    )
    .await?;

    Ok(report)
}
