use std::collections::HashMap;
use std::str::FromStr as _;
use std::sync::Mutex;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::deserialize;
use bitcoin::{OutPoint, Sequence, Transaction, Txid};
use thunder_swap::error::SwapError;
use thunder_swap::onchain::coin_select::CandidateUtxo;
use thunder_swap::onchain::rpc::{BitcoinOps, RawTransaction, RawTxOut, TxOutInfo};

#[derive(Debug, Clone)]
struct MockUtxo {
    value_sat: u64,
    script_hex: String,
}

#[derive(Debug, Clone)]
struct StoredTx {
    confirmed_at: u64,
    outputs: Vec<MockUtxo>,
}

#[derive(Debug, Default)]
struct NodeState {
    height: u64,
    utxos: HashMap<OutPoint, MockUtxo>,
    txs: HashMap<Txid, StoredTx>,
    broadcasts: Vec<Transaction>,
}

/// In-memory stand-in for bitcoind: a UTXO set, instant mining of
/// broadcast transactions, and nLockTime finality checks.
#[derive(Debug, Default)]
pub struct MockBitcoinNode {
    state: Mutex<NodeState>,
}

impl MockBitcoinNode {
    pub fn new(height: u64) -> Self {
        let node = Self::default();
        node.state.lock().unwrap().height = height;
        node
    }

    /// Register a confirmed UTXO, deep enough for any confirmation target.
    pub fn seed_utxo(&self, seed: u8, vout: u32, value_sat: u64, script_hex: &str) -> OutPoint {
        let txid = Txid::from_str(&format!("{:064x}", u64::from(seed))).expect("txid");
        let outpoint = OutPoint { txid, vout };
        let utxo = MockUtxo {
            value_sat,
            script_hex: script_hex.to_string(),
        };

        let mut state = self.state.lock().unwrap();
        let mut outputs = vec![
            MockUtxo {
                value_sat: 0,
                script_hex: String::new(),
            };
            vout as usize + 1
        ];
        outputs[vout as usize] = utxo.clone();
        state.txs.insert(
            txid,
            StoredTx {
                confirmed_at: 1,
                outputs,
            },
        );
        state.utxos.insert(outpoint, utxo);
        outpoint
    }

    pub fn mine(&self, blocks: u64) {
        self.state.lock().unwrap().height += blocks;
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn last_broadcast(&self) -> Option<Transaction> {
        self.state.lock().unwrap().broadcasts.last().cloned()
    }
}

impl BitcoinOps for MockBitcoinNode {
    async fn get_block_count(&self) -> Result<u64, SwapError> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<RawTransaction, SwapError> {
        let state = self.state.lock().unwrap();
        let stored = state
            .txs
            .get(txid)
            .ok_or_else(|| SwapError::Rpc(format!("getrawtransaction: unknown txid {txid}")))?;
        Ok(RawTransaction {
            txid: *txid,
            confirmations: (state.height - stored.confirmed_at + 1) as u32,
            outputs: stored
                .outputs
                .iter()
                .enumerate()
                .map(|(n, out)| RawTxOut {
                    vout: n as u32,
                    value_sat: out.value_sat,
                    script_pubkey_hex: out.script_hex.clone(),
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
        let state = self.state.lock().unwrap();
        let outpoint = OutPoint { txid: *txid, vout };
        let info = if require_unspent {
            let utxo = state.utxos.get(&outpoint).ok_or_else(|| {
                SwapError::Rpc(format!("gettxout: output {txid}:{vout} is spent or unknown"))
            })?;
            TxOutInfo {
                value_sat: utxo.value_sat,
                script_pubkey_hex: utxo.script_hex.clone(),
            }
        } else {
            let stored = state
                .txs
                .get(txid)
                .ok_or_else(|| SwapError::Rpc(format!("unknown txid {txid}")))?;
            let out = stored
                .outputs
                .get(vout as usize)
                .ok_or_else(|| SwapError::Rpc(format!("{txid} has no output {vout}")))?;
            TxOutInfo {
                value_sat: out.value_sat,
                script_pubkey_hex: out.script_hex.clone(),
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
        let bytes = hex::decode(tx_hex).map_err(|e| SwapError::Rpc(format!("bad tx hex: {e}")))?;
        let tx: Transaction =
            deserialize(&bytes).map_err(|e| SwapError::Rpc(format!("bad raw tx: {e}")))?;
        let txid = tx.compute_txid();

        let mut state = self.state.lock().unwrap();

        // nLockTime finality, the check the refund path depends on.
        if let LockTime::Blocks(height) = tx.lock_time {
            let locked = u64::from(height.to_consensus_u32());
            let has_nonfinal_input = tx.input.iter().any(|i| i.sequence != Sequence::MAX);
            if has_nonfinal_input && locked > state.height {
                return Err(SwapError::Rpc(format!(
                    "sendrawtransaction: non-final (code -26): locktime {locked} > height {}",
                    state.height
                )));
            }
        }

        for input in &tx.input {
            if !state.utxos.contains_key(&input.previous_output) {
                return Err(SwapError::Rpc(format!(
                    "sendrawtransaction: bad-txns-inputs-missingorspent: {}",
                    input.previous_output
                )));
            }
        }
        for input in &tx.input {
            state.utxos.remove(&input.previous_output);
        }

        let outputs: Vec<MockUtxo> = tx
            .output
            .iter()
            .map(|out| MockUtxo {
                value_sat: out.value.to_sat(),
                script_hex: hex::encode(out.script_pubkey.as_bytes()),
            })
            .collect();
        for (vout, out) in outputs.iter().enumerate() {
            state.utxos.insert(
                OutPoint {
                    txid,
                    vout: vout as u32,
                },
                out.clone(),
            );
        }

        // Instant mining: the broadcast lands in the current tip block.
        let confirmed_at = state.height;
        state.txs.insert(
            txid,
            StoredTx {
                confirmed_at,
                outputs,
            },
        );
        state.broadcasts.push(tx);
        Ok(txid)
    }

    async fn scan_utxos_by_script(
        &self,
        script_hex: &str,
    ) -> Result<Vec<CandidateUtxo>, SwapError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .utxos
            .iter()
            .filter(|(_, utxo)| utxo.script_hex == script_hex)
            .map(|(outpoint, utxo)| CandidateUtxo {
                txid: outpoint.txid,
                vout: outpoint.vout,
                value_sat: utxo.value_sat,
                script_hex: utxo.script_hex.clone(),
            })
            .collect())
    }
}
