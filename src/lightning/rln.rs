use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::SwapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Pending,
}

/// Status of a HODL payment as reported by `getpayment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HodlPaymentStatus {
    Pending,
    Claimable,
    Succeeded,
    Cancelled,
    Failed,
}

/// Status of a `getpaymentpreimage` wait, which can additionally time out
/// node-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreimageStatus {
    Pending,
    Claimable,
    Succeeded,
    Cancelled,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Succeeded,
    Cancelled,
    Failed,
    Expired,
}

impl InvoiceStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvoiceStatus::Pending)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodedInvoice {
    pub payment_hash: String,
    pub amt_msat: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayResponse {
    pub status: PaymentStatus,
    pub payment_hash: String,
    pub payment_secret: String,
}

/// Payment details from `getpayment`. RGB payments also carry asset
/// terms, which the engine logs but does not act on; the node timestamps
/// are carried for wire compatibility only.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetails {
    pub amt_msat: u64,
    #[serde(default)]
    pub asset_amount: Option<u64>,
    #[serde(default)]
    pub asset_id: Option<String>,
    pub payment_hash: String,
    pub inbound: bool,
    pub status: HodlPaymentStatus,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<u64>,
    #[serde(default)]
    pub payee_pubkey: Option<String>,
    #[serde(default)]
    pub preimage: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GetPaymentResponse {
    payment: PaymentDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreimageResponse {
    pub status: PreimageStatus,
    #[serde(default)]
    pub preimage: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HodlInvoiceRequest {
    pub payment_hash: String,
    pub expiry_sec: u64,
    pub amt_msat: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HodlInvoiceResponse {
    pub invoice: String,
    pub payment_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
struct InvoiceStatusResponse {
    status: InvoiceStatus,
}

/// The RLN operations the swap engine consumes, transport-agnostic so the
/// orchestrators can run against an in-process node in tests.
#[allow(async_fn_in_trait)]
pub trait RlnOps {
    async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice, SwapError>;
    async fn pay_invoice(&self, invoice: &str) -> Result<PayResponse, SwapError>;
    async fn get_payment(&self, payment_hash: &str) -> Result<PaymentDetails, SwapError>;
    async fn get_payment_preimage(
        &self,
        payment_hash: &str,
    ) -> Result<PreimageResponse, SwapError>;
    async fn invoice_hodl(
        &self,
        request: &HodlInvoiceRequest,
    ) -> Result<HodlInvoiceResponse, SwapError>;
    async fn invoice_settle(
        &self,
        payment_hash: &str,
        payment_preimage: &str,
    ) -> Result<(), SwapError>;
    async fn invoice_cancel(&self, payment_hash: &str) -> Result<(), SwapError>;
    async fn invoice_status(&self, invoice: &str) -> Result<InvoiceStatus, SwapError>;
}

/// HTTP client for the RGB-Lightning node, with optional bearer auth.
#[derive(Debug, Clone)]
pub struct RlnClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RlnClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, SwapError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SwapError::Rln(format!("POST {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SwapError::Rln(format!("POST {path}: {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| SwapError::Rln(format!("POST {path}: decode response: {e}")))
    }

    async fn post_ack(&self, path: &str, body: serde_json::Value) -> Result<(), SwapError> {
        let _: serde_json::Value = self.post_json(path, body).await?;
        Ok(())
    }
}

impl RlnOps for RlnClient {
    async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice, SwapError> {
        self.post_json("/decodelninvoice", json!({ "invoice": invoice }))
            .await
    }

    async fn pay_invoice(&self, invoice: &str) -> Result<PayResponse, SwapError> {
        self.post_json("/sendpayment", json!({ "invoice": invoice }))
            .await
    }

    async fn get_payment(&self, payment_hash: &str) -> Result<PaymentDetails, SwapError> {
        let response: GetPaymentResponse = self
            .post_json("/getpayment", json!({ "payment_hash": payment_hash }))
            .await?;
        Ok(response.payment)
    }

    async fn get_payment_preimage(
        &self,
        payment_hash: &str,
    ) -> Result<PreimageResponse, SwapError> {
        self.post_json("/getpaymentpreimage", json!({ "payment_hash": payment_hash }))
            .await
    }

    async fn invoice_hodl(
        &self,
        request: &HodlInvoiceRequest,
    ) -> Result<HodlInvoiceResponse, SwapError> {
        self.post_json(
            "/invoice/hodl",
            serde_json::to_value(request)
                .map_err(|e| SwapError::Internal(format!("encode hodl request: {e}")))?,
        )
        .await
    }

    async fn invoice_settle(
        &self,
        payment_hash: &str,
        payment_preimage: &str,
    ) -> Result<(), SwapError> {
        self.post_ack(
            "/invoice/settle",
            json!({
                "payment_hash": payment_hash,
                "payment_preimage": payment_preimage,
            }),
        )
        .await
    }

    async fn invoice_cancel(&self, payment_hash: &str) -> Result<(), SwapError> {
        self.post_ack("/invoice/cancel", json!({ "payment_hash": payment_hash }))
            .await
    }

    async fn invoice_status(&self, invoice: &str) -> Result<InvoiceStatus, SwapError> {
        let response: InvoiceStatusResponse = self
            .post_json("/invoicestatus", json!({ "invoice": invoice }))
            .await?;
        Ok(response.status)
    }
}
