pub mod channel;
pub mod lp;
pub mod store;
pub mod user;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SwapError;

/// Durable record of a HODL invoice the USER created, keyed by payment
/// hash. Immutable after creation; only the USER reads it back, to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HodlRecord {
    pub payment_hash: String,
    pub preimage: String,
    pub amount_msat: u64,
    pub expiry_sec: u64,
    pub invoice: String,
    pub payment_secret: String,
    pub created_at_ms: u64,
}

/// The one record the USER publishes for the LP. Field names are the wire
/// contract; `tLock` is reused verbatim by the LP, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineData {
    pub invoice: String,
    pub funding_txid: String,
    pub funding_vout: u32,
    pub user_refund_pubkey_hex: String,
    pub t_lock: u32,
}

pub const DEFAULT_POLL_ATTEMPTS: u32 = 120;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);

/// Run `f` up to `attempts` times, sleeping `interval` between tries.
/// `Ok(None)` from `f` means "not ready yet"; exhausting the budget
/// returns `Ok(None)` so callers map it to a timed-out state rather than
/// an error.
pub(crate) async fn poll<T, F, Fut>(
    description: &str,
    attempts: u32,
    interval: Duration,
    mut f: F,
) -> Result<Option<T>, SwapError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, SwapError>>,
{
    for attempt in 1..=attempts {
        if let Some(value) = f().await? {
            return Ok(Some(value));
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    tracing::warn!(description, attempts, "poll budget exhausted");
    Ok(None)
}
