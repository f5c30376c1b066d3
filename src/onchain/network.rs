use bitcoin::Network;

use crate::error::SwapError;

/// Map a configuration network tag to chain parameters. The address HRP
/// and WIF version byte follow from the returned [`Network`].
pub fn network_from_tag(tag: &str) -> Result<Network, SwapError> {
    match tag {
        "regtest" => Ok(Network::Regtest),
        "signet" => Ok(Network::Signet),
        "testnet" => Ok(Network::Testnet),
        "mainnet" => Ok(Network::Bitcoin),
        other => Err(SwapError::Config(format!(
            "unknown NETWORK tag {other:?}: expected regtest, signet, testnet or mainnet"
        ))),
    }
}

pub fn address_hrp(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "bc",
        Network::Regtest => "bcrt",
        _ => "tb",
    }
}
