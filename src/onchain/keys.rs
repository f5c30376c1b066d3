use bitcoin::secp256k1::{Keypair, Secp256k1, Signing, Verification};
use bitcoin::{Address, Network, NetworkKind, PrivateKey, PublicKey, ScriptBuf, XOnlyPublicKey};

use crate::error::SwapError;

/// A role's signing identity, derived once from its WIF key. Exposes the
/// compressed and x-only pubkeys plus the key-path-only Taproot address
/// (BIP-86 shape: own key as internal key, empty script tree).
#[derive(Debug, Clone)]
pub struct SwapSigner {
    privkey: PrivateKey,
    public_key: PublicKey,
    xonly: XOnlyPublicKey,
    network: Network,
}

impl SwapSigner {
    pub fn from_wif(wif: &str, network: Network) -> Result<Self, SwapError> {
        let privkey = PrivateKey::from_wif(wif)
            .map_err(|e| SwapError::InvalidInput(format!("WIF: {e}")))?;
        if !privkey.compressed {
            return Err(SwapError::InvalidInput(
                "uncompressed WIF keys are not supported".into(),
            ));
        }
        if privkey.network != NetworkKind::from(network) {
            return Err(SwapError::InvalidInput(format!(
                "WIF network mismatch: key is for {:?}, configured network is {network}",
                privkey.network
            )));
        }

        let secp = Secp256k1::new();
        let public_key = privkey.public_key(&secp);
        let xonly = XOnlyPublicKey::from(public_key.inner);

        Ok(Self {
            privkey,
            public_key,
            xonly,
            network,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn compressed_pubkey_hex(&self) -> String {
        hex::encode(self.public_key.to_bytes())
    }

    pub fn xonly_pubkey(&self) -> XOnlyPublicKey {
        self.xonly
    }

    pub fn xonly_pubkey_hex(&self) -> String {
        hex::encode(self.xonly.serialize())
    }

    /// Key-path-only Taproot address: BIP-341 tweak with an empty merkle
    /// root, the standard BIP-86 address shape.
    pub fn taproot_address(&self) -> Address {
        let secp = Secp256k1::new();
        Address::p2tr(&secp, self.xonly, None, self.network)
    }

    pub fn taproot_script_pubkey(&self) -> ScriptBuf {
        self.taproot_address().script_pubkey()
    }

    pub fn keypair<C: Signing + Verification>(&self, secp: &Secp256k1<C>) -> Keypair {
        Keypair::from_secret_key(secp, &self.privkey.inner)
    }
}
