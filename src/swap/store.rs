use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SwapError;
use crate::swap::HodlRecord;

const STORE_DIR: &str = ".thunder-swap";
const STORE_FILE: &str = "hodl_store.json";

/// File-backed store of HODL records, keyed by payment-hash hex. Writes
/// go to a temp file in the same directory and are renamed into place, so
/// a crash mid-write never corrupts existing records.
#[derive(Debug, Clone)]
pub struct HodlStore {
    path: PathBuf,
}

impl HodlStore {
    /// Open the per-user store at `~/.thunder-swap/hodl_store.json`.
    pub fn open_default() -> Result<Self, SwapError> {
        let home = dirs::home_dir()
            .ok_or_else(|| SwapError::Config("cannot determine the home directory".into()))?;
        Self::open(home.join(STORE_DIR).join(STORE_FILE))
    }

    pub fn open(path: PathBuf) -> Result<Self, SwapError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    SwapError::Internal(format!("create store dir {}: {e}", dir.display()))
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the record for its payment hash.
    pub fn put(&self, record: &HodlRecord) -> Result<(), SwapError> {
        let mut records = self.load()?;
        records.insert(record.payment_hash.clone(), record.clone());

        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| SwapError::Internal(format!("encode hodl store: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            SwapError::Internal(format!("write {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            SwapError::Internal(format!("rename into {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    pub fn get(&self, payment_hash: &str) -> Result<Option<HodlRecord>, SwapError> {
        Ok(self.load()?.remove(payment_hash))
    }

    fn load(&self) -> Result<BTreeMap<String, HodlRecord>, SwapError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SwapError::Internal(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| SwapError::Internal(format!("decode {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str) -> HodlRecord {
        HodlRecord {
            payment_hash: hash.into(),
            preimage: "aa".repeat(32),
            amount_msat: 20_000_000,
            expiry_sec: 86_400,
            invoice: "lnbcrt1...".into(),
            payment_secret: "secret".into(),
            created_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = std::env::temp_dir().join(format!("hodl-store-{}", std::process::id()));
        let store = HodlStore::open(dir.join("hodl_store.json")).expect("open");

        let hash = "11".repeat(32);
        store.put(&record(&hash)).expect("put");
        let loaded = store.get(&hash).expect("get").expect("present");
        assert_eq!(loaded.payment_hash, hash);
        assert!(store.get(&"22".repeat(32)).expect("get").is_none());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn put_replaces_an_existing_record() {
        let dir = std::env::temp_dir().join(format!("hodl-store-replace-{}", std::process::id()));
        let store = HodlStore::open(dir.join("hodl_store.json")).expect("open");

        let hash = "33".repeat(32);
        store.put(&record(&hash)).expect("put");
        let mut updated = record(&hash);
        updated.invoice = "lnbcrt2...".into();
        store.put(&updated).expect("replace");

        let loaded = store.get(&hash).expect("get").expect("present");
        assert_eq!(loaded.invoice, "lnbcrt2...");

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn no_temp_file_remains_after_write() {
        let dir = std::env::temp_dir().join(format!("hodl-store-tmp-{}", std::process::id()));
        let store = HodlStore::open(dir.join("hodl_store.json")).expect("open");
        store.put(&record(&"44".repeat(32))).expect("put");
        assert!(!dir.join("hodl_store.json.tmp").exists());

        std::fs::remove_dir_all(dir).ok();
    }
}
