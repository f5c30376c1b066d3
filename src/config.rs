use std::str::FromStr;

use bitcoin::Network;

use crate::onchain::network::network_from_tag;
use crate::crypto;
use crate::error::SwapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Lp,
}

impl FromStr for Role {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "LP" => Ok(Role::Lp),
            other => Err(SwapError::Config(format!(
                "CLIENT_ROLE must be USER or LP, got {other:?}"
            ))),
        }
    }
}

/// Role configuration, loaded from the environment. Keys are
/// case-sensitive; see `from_env` for which are role-specific.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub bitcoin_rpc_url: String,
    pub bitcoin_rpc_user: String,
    pub bitcoin_rpc_pass: String,
    pub wif: String,
    pub network: Network,
    pub min_confs: u32,
    pub locktime_blocks: u32,
    pub fee_rate_sat_per_vb: f64,
    /// The LP's compressed pubkey, required by the USER to build the
    /// claim leaf. The LP derives it from its own WIF instead.
    pub lp_pubkey_hex: Option<String>,
    pub rln_base_url: String,
    pub rln_api_key: Option<String>,
    pub hodl_expiry_sec: u64,
    pub client_comm_port: u16,
    /// Where the LP fetches the submarine record; LP-only.
    pub user_comm_url: Option<String>,
    /// Invoice amount for the swap; USER-only.
    pub swap_amount_msat: Option<u64>,
}

fn required(key: &str) -> Result<String, SwapError> {
    std::env::var(key).map_err(|_| SwapError::Config(format!("{key} is not set")))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Result<T, SwapError>
where
    T::Err: std::fmt::Display,
{
    let raw = required(key)?;
    raw.parse()
        .map_err(|e| SwapError::Config(format!("{key}={raw:?}: {e}")))
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> Result<T, SwapError>
where
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| SwapError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, SwapError> {
        Self::from_env_with_role(None)
    }

    /// Load the configuration, optionally overriding `CLIENT_ROLE` (the
    /// binary's `--role` flag).
    pub fn from_env_with_role(role_override: Option<Role>) -> Result<Self, SwapError> {
        let role = match role_override {
            Some(role) => role,
            None => parsed("CLIENT_ROLE")?,
        };
        let network = network_from_tag(&required("NETWORK")?)?;

        let fee_rate_sat_per_vb: f64 = parsed("FEE_RATE_SAT_PER_VB")?;
        if !(fee_rate_sat_per_vb > 0.0) {
            return Err(SwapError::Config(format!(
                "FEE_RATE_SAT_PER_VB must be positive, got {fee_rate_sat_per_vb}"
            )));
        }

        let lp_pubkey_hex = optional("LP_PUBKEY_HEX");
        if let Some(hex) = &lp_pubkey_hex {
            crypto::parse_compressed_pubkey(hex)
                .map_err(|e| SwapError::Config(format!("LP_PUBKEY_HEX: {e}")))?;
        }

        let user_comm_url = optional("USER_COMM_URL");
        let swap_amount_msat = match optional("SWAP_AMOUNT_MSAT") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                SwapError::Config(format!("SWAP_AMOUNT_MSAT={raw:?}: {e}"))
            })?),
            None => None,
        };

        match role {
            Role::User => {
                if lp_pubkey_hex.is_none() {
                    return Err(SwapError::Config("LP_PUBKEY_HEX is required for USER".into()));
                }
                if swap_amount_msat.is_none() {
                    return Err(SwapError::Config(
                        "SWAP_AMOUNT_MSAT is required for USER".into(),
                    ));
                }
            }
            Role::Lp => {
                if user_comm_url.is_none() {
                    return Err(SwapError::Config("USER_COMM_URL is required for LP".into()));
                }
            }
        }

        Ok(Self {
            role,
            bitcoin_rpc_url: required("BITCOIN_RPC_URL")?,
            bitcoin_rpc_user: required("BITCOIN_RPC_USER")?,
            bitcoin_rpc_pass: required("BITCOIN_RPC_PASS")?,
            wif: required("WIF")?,
            network,
            min_confs: parsed("MIN_CONFS")?,
            locktime_blocks: parsed("LOCKTIME_BLOCKS")?,
            fee_rate_sat_per_vb,
            lp_pubkey_hex,
            rln_base_url: required("RLN_BASE_URL")?,
            rln_api_key: optional("RLN_API_KEY"),
            hodl_expiry_sec: parsed_or("HODL_EXPIRY_SEC", 86_400)?,
            client_comm_port: parsed_or("CLIENT_COMM_PORT", 9_999)?,
            user_comm_url,
            swap_amount_msat,
        })
    }
}
