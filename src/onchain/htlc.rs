use bitcoin::hashes::{sha256, Hash as _};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::opcodes::all::{OP_CHECKSIG, OP_CLTV, OP_DROP, OP_EQUALVERIFY, OP_SHA256};
use bitcoin::taproot::{ControlBlock, LeafVersion, NodeInfo, TapNodeHash, TaprootSpendInfo};
use bitcoin::{Address, Network, ScriptBuf, XOnlyPublicKey};

use crate::crypto;
use crate::error::SwapError;

/// Nothing-up-my-sleeve seed for the shared internal key. The key-path
/// spend of every swap HTLC is provably unusable because nobody knows a
/// discrete log for the derived point.
const INTERNAL_KEY_SEED: &[u8] = b"HODL_INVOICE_P2TR_HTLC_INTERNAL_KEY_v0";

/// Derive the deterministic unspendable internal key: hash the seed, then
/// `seed || be32(attempt)` for attempts 1..=255, returning the first
/// digest that is a valid x-only point. The derivation is pure and must
/// stay byte-identical across implementations.
pub fn internal_key() -> Result<XOnlyPublicKey, SwapError> {
    for attempt in 0u32..=255 {
        let candidate = if attempt == 0 {
            sha256::Hash::hash(INTERNAL_KEY_SEED)
        } else {
            let mut data = INTERNAL_KEY_SEED.to_vec();
            data.extend_from_slice(&attempt.to_be_bytes());
            sha256::Hash::hash(&data)
        };
        if let Ok(key) = XOnlyPublicKey::from_slice(candidate.as_byte_array()) {
            return Ok(key);
        }
    }
    Err(SwapError::Internal(
        "no valid internal key in 256 derivation attempts".into(),
    ))
}

/// Everything both parties need to agree on to reconstruct the HTLC
/// output byte-for-byte.
#[derive(Debug, Clone)]
pub struct HtlcTemplate {
    pub payment_hash: [u8; 32],
    pub lp_xonly: XOnlyPublicKey,
    pub user_xonly: XOnlyPublicKey,
    pub t_lock: u32,
}

impl HtlcTemplate {
    pub fn new(
        payment_hash: [u8; 32],
        lp_pubkey_hex: &str,
        user_pubkey_hex: &str,
        t_lock: u32,
    ) -> Result<Self, SwapError> {
        Ok(Self {
            payment_hash,
            lp_xonly: crypto::xonly_from_compressed(lp_pubkey_hex)?,
            user_xonly: crypto::xonly_from_compressed(user_pubkey_hex)?,
            t_lock,
        })
    }

    /// `OP_SHA256 <H> OP_EQUALVERIFY <lpXOnly> OP_CHECKSIG`
    pub fn claim_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_SHA256)
            .push_slice(self.payment_hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_slice(self.lp_xonly.serialize())
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// `<tLock> OP_CLTV OP_DROP <userXOnly> OP_CHECKSIG`
    pub fn refund_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_int(self.t_lock as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_slice(self.user_xonly.serialize())
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn claim_leaf_hash(&self) -> TapNodeHash {
        TapNodeHash::from_script(&self.claim_script(), LeafVersion::TapScript)
    }

    pub fn refund_leaf_hash(&self) -> TapNodeHash {
        TapNodeHash::from_script(&self.refund_script(), LeafVersion::TapScript)
    }

    /// The two-leaf taproot tree over the shared internal key. Merkle
    /// ordering and the output-key parity bit come from the library tree,
    /// never hand-assembled.
    pub fn spend_info(&self) -> Result<TaprootSpendInfo, SwapError> {
        let secp = Secp256k1::new();
        let ver = LeafVersion::TapScript;
        let claim = NodeInfo::new_leaf_with_ver(self.claim_script(), ver);
        let refund = NodeInfo::new_leaf_with_ver(self.refund_script(), ver);
        let node = NodeInfo::combine(claim, refund)
            .map_err(|e| SwapError::Internal(format!("combine tapleaves: {e}")))?;
        Ok(TaprootSpendInfo::from_node_info(&secp, internal_key()?, node))
    }

    pub fn merkle_root(&self) -> TapNodeHash {
        TapNodeHash::from_node_hashes(self.claim_leaf_hash(), self.refund_leaf_hash())
    }

    /// Reconstruct the on-chain scriptPubKey: `OP_1 || outputKey`, 34
    /// bytes. The verifier compares this byte-for-byte with the funding
    /// output.
    pub fn script_pubkey(&self) -> Result<ScriptBuf, SwapError> {
        let secp = Secp256k1::new();
        Ok(ScriptBuf::new_p2tr(
            &secp,
            internal_key()?,
            Some(self.merkle_root()),
        ))
    }

    pub fn address(&self, network: Network) -> Result<Address, SwapError> {
        let secp = Secp256k1::new();
        Ok(Address::p2tr(
            &secp,
            internal_key()?,
            Some(self.merkle_root()),
            network,
        ))
    }

    /// Control block for a claim-leaf spend: leaf version with the
    /// output-key parity bit, the internal key, and the refund leaf hash
    /// as the single-element merkle path.
    pub fn claim_control_block(&self) -> Result<ControlBlock, SwapError> {
        self.spend_info()?
            .control_block(&(self.claim_script(), LeafVersion::TapScript))
            .ok_or_else(|| SwapError::Internal("claim leaf missing from taproot tree".into()))
    }

    /// Control block for the refund-leaf spend path.
    pub fn refund_control_block(&self) -> Result<ControlBlock, SwapError> {
        self.spend_info()?
            .control_block(&(self.refund_script(), LeafVersion::TapScript))
            .ok_or_else(|| SwapError::Internal("refund leaf missing from taproot tree".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LP_PK: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const USER_PK: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    fn template() -> HtlcTemplate {
        HtlcTemplate::new([0xab; 32], LP_PK, USER_PK, 120_500).expect("valid template")
    }

    #[test]
    fn internal_key_is_deterministic_and_valid() {
        let a = internal_key().expect("derives");
        let b = internal_key().expect("derives");
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn script_pubkey_is_34_bytes_of_segwit_v1() {
        let spk = template().script_pubkey().expect("spk");
        let bytes = spk.as_bytes();
        assert_eq!(bytes.len(), 34);
        assert_eq!(bytes[0], 0x51);
        assert_eq!(bytes[1], 0x20);
    }

    #[test]
    fn leaf_order_does_not_change_the_output() {
        let t = template();
        let secp = Secp256k1::new();
        let ver = LeafVersion::TapScript;
        let forward = NodeInfo::combine(
            NodeInfo::new_leaf_with_ver(t.claim_script(), ver),
            NodeInfo::new_leaf_with_ver(t.refund_script(), ver),
        )
        .expect("combine");
        let reversed = NodeInfo::combine(
            NodeInfo::new_leaf_with_ver(t.refund_script(), ver),
            NodeInfo::new_leaf_with_ver(t.claim_script(), ver),
        )
        .expect("combine");

        let key = internal_key().expect("internal key");
        let a = TaprootSpendInfo::from_node_info(&secp, key, forward);
        let b = TaprootSpendInfo::from_node_info(&secp, key, reversed);
        assert_eq!(a.output_key(), b.output_key());
        assert_eq!(a.merkle_root(), Some(t.merkle_root()));
    }

    #[test]
    fn scripts_embed_the_template_parameters() {
        let t = template();
        let claim_hex = hex::encode(t.claim_script().as_bytes());
        let refund_hex = hex::encode(t.refund_script().as_bytes());

        assert!(claim_hex.contains(&hex::encode(t.payment_hash)));
        assert!(claim_hex.contains(&hex::encode(t.lp_xonly.serialize())));
        assert!(refund_hex.contains(&hex::encode(t.user_xonly.serialize())));
    }

    #[test]
    fn claim_control_block_carries_the_refund_sibling() {
        let t = template();
        let control = t.claim_control_block().expect("control block");
        let serialized = control.serialize();

        // leaf version byte with parity bit, 32-byte internal key, one
        // 32-byte merkle step.
        assert_eq!(serialized.len(), 65);
        assert_eq!(serialized[0] & 0xfe, 0xc0);
        assert_eq!(
            &serialized[1..33],
            internal_key().expect("internal key").serialize().as_slice()
        );
        assert_eq!(
            &serialized[33..65],
            t.refund_leaf_hash().to_byte_array().as_slice()
        );
    }

    #[test]
    fn address_matches_reconstructed_script_pubkey() {
        let t = template();
        let address = t.address(Network::Regtest).expect("address");
        assert_eq!(address.script_pubkey(), t.script_pubkey().expect("spk"));
        assert!(address.to_string().starts_with("bcrt1p"));
    }

    #[test]
    fn refund_script_encodes_locktime_minimally() {
        let small = HtlcTemplate::new([1; 32], LP_PK, USER_PK, 16).expect("template");
        // 16 encodes as OP_PUSHNUM_16, not a data push.
        assert_eq!(small.refund_script().as_bytes()[0], 0x60);

        let large = template();
        // 120_500 = 0x01D6B4 -> 3-byte little-endian push.
        assert_eq!(&large.refund_script().as_bytes()[..4], &[0x03, 0xb4, 0xd6, 0x01]);
    }
}
