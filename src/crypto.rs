use bitcoin::hashes::{sha256, Hash as _};
use bitcoin::secp256k1::PublicKey;
use bitcoin::XOnlyPublicKey;

use crate::error::SwapError;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(data).to_byte_array()
}

/// Parse a 66-char hex compressed secp256k1 public key (02/03 prefix).
pub fn parse_compressed_pubkey(hex_str: &str) -> Result<PublicKey, SwapError> {
    if hex_str.len() != 66 {
        return Err(SwapError::InvalidInput(format!(
            "compressed pubkey must be 66 hex chars, got {}",
            hex_str.len()
        )));
    }
    if !hex_str.starts_with("02") && !hex_str.starts_with("03") {
        return Err(SwapError::InvalidInput(
            "compressed pubkey must start with 02 or 03".into(),
        ));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| SwapError::InvalidInput(format!("pubkey hex: {e}")))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| SwapError::InvalidInput(format!("not a secp256k1 point: {e}")))
}

/// Drop the parity prefix of a compressed pubkey and re-validate the
/// result as an x-only point.
pub fn xonly_from_compressed(hex_str: &str) -> Result<XOnlyPublicKey, SwapError> {
    let pubkey = parse_compressed_pubkey(hex_str)?;
    Ok(XOnlyPublicKey::from(pubkey))
}

pub fn parse_payment_hash(hex_str: &str) -> Result<[u8; 32], SwapError> {
    if hex_str.len() != 64 {
        return Err(SwapError::InvalidInput(format!(
            "payment hash must be 64 hex chars, got {}",
            hex_str.len()
        )));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| SwapError::InvalidInput(format!("payment hash hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| SwapError::InvalidInput("payment hash must be 32 bytes".into()))
}

/// Invoice msat floor in sats. Ceiling so a rounded-down deposit can never
/// underfund the invoice. Do not use for sat -> msat conversions.
pub fn msat_to_sat_ceil(msat: u64) -> u64 {
    msat.div_ceil(1000)
}

/// Node amounts arrive as BTC floats; `round` recovers the exact sat value.
pub fn btc_to_sat(btc: f64) -> u64 {
    (btc * 1e8).round() as u64
}
