use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::RwLock;

use crate::error::SwapError;
use crate::swap::SubmarineData;

pub const SUBMARINE_PATH: &str = "/submarine-data";

type Slot = Arc<RwLock<Option<SubmarineData>>>;

#[allow(async_fn_in_trait)]
pub trait SubmarinePublish {
    async fn publish(&self, data: &SubmarineData) -> Result<(), SwapError>;
}

#[allow(async_fn_in_trait)]
pub trait SubmarineFetch {
    /// `Ok(None)` means the USER has not published yet; the fetch is
    /// idempotent either way.
    async fn fetch(&self) -> Result<Option<SubmarineData>, SwapError>;
}

/// USER side of the channel: a one-record HTTP server. Serves 404 until
/// the record is published, the full JSON record afterwards.
pub struct SubmarinePublisher {
    slot: Slot,
    local_addr: SocketAddr,
}

impl SubmarinePublisher {
    pub async fn bind(port: u16) -> Result<Self, SwapError> {
        let slot: Slot = Arc::new(RwLock::new(None));
        let app = Router::new()
            .route(SUBMARINE_PATH, get(serve_record))
            .with_state(slot.clone());

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| SwapError::Config(format!("bind submarine channel port {port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SwapError::Internal(format!("submarine channel local addr: {e}")))?;

        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::warn!(error = %err, "submarine channel server stopped");
            }
        });

        tracing::info!(%local_addr, "submarine channel listening");
        Ok(Self { slot, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl SubmarinePublish for SubmarinePublisher {
    async fn publish(&self, data: &SubmarineData) -> Result<(), SwapError> {
        *self.slot.write().await = Some(data.clone());
        tracing::info!(
            funding_txid = %data.funding_txid,
            funding_vout = data.funding_vout,
            t_lock = data.t_lock,
            "published submarine data"
        );
        Ok(())
    }
}

async fn serve_record(State(slot): State<Slot>) -> Response {
    match slot.read().await.clone() {
        Some(data) => Json(data).into_response(),
        None => (StatusCode::NOT_FOUND, "not ready").into_response(),
    }
}

/// LP side of the channel: polls the USER's comm endpoint. A refused
/// connection or a 404 both mean "not ready yet".
#[derive(Debug, Clone)]
pub struct HttpSubmarineFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpSubmarineFetcher {
    pub fn new(user_comm_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}{SUBMARINE_PATH}", user_comm_url.trim_end_matches('/')),
        }
    }
}

impl SubmarineFetch for HttpSubmarineFetcher {
    async fn fetch(&self) -> Result<Option<SubmarineData>, SwapError> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => return Ok(None),
            Err(err) => {
                return Err(SwapError::Internal(format!(
                    "fetch submarine data from {}: {err}",
                    self.url
                )));
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let data = response.json().await.map_err(|e| {
                    SwapError::Internal(format!("decode submarine data: {e}"))
                })?;
                Ok(Some(data))
            }
            status => Err(SwapError::Internal(format!(
                "submarine channel returned {status}"
            ))),
        }
    }
}
