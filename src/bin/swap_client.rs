use std::path::PathBuf;
use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use thunder_swap::config::{Config, Role};
use thunder_swap::lightning::rln::RlnClient;
use thunder_swap::onchain::rpc::BitcoinRpcClient;
use thunder_swap::swap::channel::{HttpSubmarineFetcher, SubmarinePublisher};
use thunder_swap::swap::lp::{run_lp, LpState};
use thunder_swap::swap::store::HodlStore;
use thunder_swap::swap::user::{run_user, UserState};

#[derive(Debug, clap::Parser)]
struct Args {
    /// Override CLIENT_ROLE from the environment (USER or LP).
    #[arg(long)]
    role: Option<String>,

    /// Override the default hodl store location.
    #[arg(long)]
    store_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    thunder_swap::logging::init().ok();
    let args = Args::parse();

    let role_override = args
        .role
        .as_deref()
        .map(Role::from_str)
        .transpose()
        .context("parse --role")?;
    let cfg = Config::from_env_with_role(role_override).context("load configuration")?;

    let rpc = BitcoinRpcClient::new(
        &cfg.bitcoin_rpc_url,
        &cfg.bitcoin_rpc_user,
        &cfg.bitcoin_rpc_pass,
    );
    let rln = RlnClient::new(&cfg.rln_base_url, cfg.rln_api_key.clone());

    match cfg.role {
        Role::User => {
            let store = match args.store_path {
                Some(path) => HodlStore::open(path),
                None => HodlStore::open_default(),
            }
            .context("open hodl store")?;
            let publisher = SubmarinePublisher::bind(cfg.client_comm_port)
                .await
                .context("bind submarine channel")?;

            let report = run_user(&cfg, &rpc, &rln, &store, &publisher)
                .await
                .context("user swap")?;

            tracing::info!(
                state = %report.state,
                payment_hash = %report.payment_hash,
                funding_txid = ?report.funding_txid,
                invoice_status = ?report.invoice_status,
                "user swap finished"
            );
            if report.state != UserState::Settled {
                if let Some(failure) = &report.failure {
                    tracing::error!(error = %failure, "swap did not settle");
                }
                std::process::exit(1);
            }
        }
        Role::Lp => {
            let user_comm_url = cfg
                .user_comm_url
                .as_deref()
                .context("USER_COMM_URL is required for LP")?;
            let fetcher = HttpSubmarineFetcher::new(user_comm_url);

            let report = run_lp(&cfg, &rpc, &rln, &fetcher).await.context("lp swap")?;

            tracing::info!(
                state = %report.state,
                payment_hash = ?report.payment_hash,
                claim_txid = ?report.claim_txid,
                "lp swap finished"
            );
            if report.state != LpState::Claimed {
                if let Some(failure) = &report.failure {
                    tracing::error!(error = %failure, "swap did not claim");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
