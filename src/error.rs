use bitcoin::Txid;

/// Engine-level error. Every failure the swap engine can produce maps to
/// one of these kinds; adapters wrap their transport errors with the
/// origin message so orchestrators can report them verbatim.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("insufficient funds: need {needed_sat} sat including fee, have {available_sat} sat")]
    FundsUnavailable { needed_sat: u64, available_sat: u64 },

    #[error("no spendable utxos found for the funding key")]
    NoUtxos,

    #[error("htlc template mismatch: {0}")]
    TemplateMismatch(String),

    #[error("on-chain scriptPubKey of {txid}:{vout} does not match the reconstructed htlc output")]
    ScriptPubKeyMismatch { txid: Txid, vout: u32 },

    #[error("htlc output underfunds the invoice: {output_sat} sat < {invoice_sat} sat")]
    AmountTooLow { output_sat: u64, invoice_sat: u64 },

    #[error("claim output is dust after fee: {output_sat} sat < {dust_sat} sat")]
    DustAfterFee { output_sat: u64, dust_sat: u64 },

    #[error("preimage does not hash to the expected payment hash")]
    PreimageMismatch,

    #[error("bitcoin rpc: {0}")]
    Rpc(String),

    #[error("rln: {0}")]
    Rln(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Kinds that indicate an adversarial or buggy counterparty. These are
    /// never retried and abort the swap before any payment is sent.
    pub fn is_counterparty_fault(&self) -> bool {
        matches!(
            self,
            SwapError::TemplateMismatch(_)
                | SwapError::ScriptPubKeyMismatch { .. }
                | SwapError::AmountTooLow { .. }
                | SwapError::PreimageMismatch
        )
    }
}
