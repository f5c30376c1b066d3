use std::str::FromStr as _;

use bitcoin::Txid;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::onchain::coin_select::CandidateUtxo;
use crate::crypto::btc_to_sat;
use crate::error::SwapError;

/// A transaction as reported by verbose `getrawtransaction`.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub txid: Txid,
    pub confirmations: u32,
    pub outputs: Vec<RawTxOut>,
}

#[derive(Debug, Clone)]
pub struct RawTxOut {
    pub vout: u32,
    pub value_sat: u64,
    pub script_pubkey_hex: String,
}

#[derive(Debug, Clone)]
pub struct TxOutInfo {
    pub value_sat: u64,
    pub script_pubkey_hex: String,
}

/// The narrow set of node operations the swap engine consumes.
#[allow(async_fn_in_trait)]
pub trait BitcoinOps {
    async fn get_block_count(&self) -> Result<u64, SwapError>;

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransaction, SwapError>;

    /// Fetch a specific output. With `require_unspent` the output must
    /// still be in the UTXO set; with an expected scriptPubKey the node's
    /// answer must match it.
    async fn get_transaction_output(
        &self,
        txid: &Txid,
        vout: u32,
        expected_script_pubkey_hex: Option<&str>,
        require_unspent: bool,
    ) -> Result<TxOutInfo, SwapError>;

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Txid, SwapError>;

    /// Scan the UTXO set for outputs locked to the given raw script.
    async fn scan_utxos_by_script(
        &self,
        script_hex: &str,
    ) -> Result<Vec<CandidateUtxo>, SwapError>;
}

/// JSON-RPC client for bitcoind with basic auth.
#[derive(Debug, Clone)]
pub struct BitcoinRpcClient {
    client: reqwest::Client,
    url: String,
    user: String,
    pass: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct VerboseTx {
    txid: String,
    #[serde(default)]
    confirmations: u32,
    vout: Vec<VerboseVout>,
}

#[derive(Debug, Deserialize)]
struct VerboseVout {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKeyObject,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKeyObject {
    hex: String,
}

#[derive(Debug, Deserialize)]
struct GetTxOutResult {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKeyObject,
}

#[derive(Debug, Deserialize)]
struct ScanTxOutSetResult {
    success: bool,
    #[serde(default)]
    unspents: Vec<ScanUnspent>,
}

#[derive(Debug, Deserialize)]
struct ScanUnspent {
    txid: String,
    vout: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
    amount: f64,
}

impl BitcoinRpcClient {
    pub fn new(url: &str, user: &str, pass: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            user: user.to_string(),
            pass: pass.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SwapError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "thunder-swap",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&body)
            .send()
            .await
            .map_err(|e| SwapError::Rpc(format!("{method}: {e}")))?;

        let status = response.status();
        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| SwapError::Rpc(format!("{method}: bad response ({status}): {e}")))?;

        if let Some(err) = rpc.error {
            return Err(SwapError::Rpc(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }
        // Some calls (gettxout on a spent output) legitimately return null.
        Ok(rpc.result.unwrap_or(Value::Null))
    }

    fn parse_txid(raw: &str, origin: &str) -> Result<Txid, SwapError> {
        Txid::from_str(raw).map_err(|e| SwapError::Rpc(format!("{origin}: bad txid {raw:?}: {e}")))
    }
}

impl BitcoinOps for BitcoinRpcClient {
    async fn get_block_count(&self) -> Result<u64, SwapError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| SwapError::Rpc(format!("getblockcount: non-numeric result {result}")))
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransaction, SwapError> {
        let result = self
            .call("getrawtransaction", json!([txid.to_string(), true]))
            .await?;
        let tx: VerboseTx = serde_json::from_value(result)
            .map_err(|e| SwapError::Rpc(format!("getrawtransaction: decode: {e}")))?;

        Ok(RawTransaction {
            txid: Self::parse_txid(&tx.txid, "getrawtransaction")?,
            confirmations: tx.confirmations,
            outputs: tx
                .vout
                .into_iter()
                .map(|out| RawTxOut {
                    vout: out.n,
                    value_sat: btc_to_sat(out.value),
                    script_pubkey_hex: out.script_pub_key.hex,
                })
                .collect(),
        })
    }

    async fn get_transaction_output(
        &self,
        txid: &Txid,
        vout: u32,
        expected_script_pubkey_hex: Option<&str>,
        require_unspent: bool,
    ) -> Result<TxOutInfo, SwapError> {
        let info = if require_unspent {
            let result = self
                .call("gettxout", json!([txid.to_string(), vout, false]))
                .await?;
            if result.is_null() {
                return Err(SwapError::Rpc(format!(
                    "gettxout: output {txid}:{vout} is spent or unknown"
                )));
            }
            let out: GetTxOutResult = serde_json::from_value(result)
                .map_err(|e| SwapError::Rpc(format!("gettxout: decode: {e}")))?;
            TxOutInfo {
                value_sat: btc_to_sat(out.value),
                script_pubkey_hex: out.script_pub_key.hex,
            }
        } else {
            let tx = self.get_raw_transaction(txid).await?;
            let out = tx
                .outputs
                .into_iter()
                .find(|out| out.vout == vout)
                .ok_or_else(|| {
                    SwapError::Rpc(format!("getrawtransaction: {txid} has no output {vout}"))
                })?;
            TxOutInfo {
                value_sat: out.value_sat,
                script_pubkey_hex: out.script_pubkey_hex,
            }
        };

        if let Some(expected) = expected_script_pubkey_hex {
            if info.script_pubkey_hex != expected {
                return Err(SwapError::ScriptPubKeyMismatch { txid: *txid, vout });
            }
        }
        Ok(info)
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<Txid, SwapError> {
        let result = self.call("sendrawtransaction", json!([tx_hex])).await?;
        let raw = result.as_str().ok_or_else(|| {
            SwapError::Rpc(format!("sendrawtransaction: non-string result {result}"))
        })?;
        Self::parse_txid(raw, "sendrawtransaction")
    }

    async fn scan_utxos_by_script(
        &self,
        script_hex: &str,
    ) -> Result<Vec<CandidateUtxo>, SwapError> {
        let descriptor = format!("raw({script_hex})");
        let result = self
            .call("scantxoutset", json!(["start", [descriptor]]))
            .await?;
        let scan: ScanTxOutSetResult = serde_json::from_value(result)
            .map_err(|e| SwapError::Rpc(format!("scantxoutset: decode: {e}")))?;
        if !scan.success {
            return Err(SwapError::Rpc("scantxoutset: scan did not complete".into()));
        }

        scan.unspents
            .into_iter()
            .map(|u| {
                Ok(CandidateUtxo {
                    txid: Self::parse_txid(&u.txid, "scantxoutset")?,
                    vout: u.vout,
                    value_sat: btc_to_sat(u.amount),
                    script_hex: u.script_pub_key,
                })
            })
            .collect()
    }
}
