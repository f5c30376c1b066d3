use bitcoin::secp256k1::SecretKey;
use bitcoin::{Network, NetworkKind, PrivateKey};
use thunder_swap::onchain::keys::SwapSigner;

pub fn test_wif(byte: u8) -> String {
    let key = SecretKey::from_slice(&[byte; 32]).expect("secret key");
    PrivateKey::new(key, NetworkKind::Test).to_wif()
}

pub fn test_signer(byte: u8) -> SwapSigner {
    SwapSigner::from_wif(&test_wif(byte), Network::Regtest).expect("valid wif")
}
