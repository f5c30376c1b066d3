use std::collections::HashMap;
use std::sync::Mutex;

use thunder_swap::crypto::sha256;
use thunder_swap::error::SwapError;
use thunder_swap::lightning::rln::{
    DecodedInvoice, HodlInvoiceRequest, HodlInvoiceResponse, HodlPaymentStatus, InvoiceStatus,
    PayResponse, PaymentDetails, PaymentStatus, PreimageResponse, PreimageStatus, RlnOps,
};

#[derive(Debug, Clone)]
struct MockInvoice {
    payment_hash: String,
    amt_msat: u64,
    payment_secret: String,
    status: HodlPaymentStatus,
    preimage: Option<String>,
}

#[derive(Debug, Default)]
struct RlnState {
    invoices: HashMap<String, MockInvoice>,
    by_invoice: HashMap<String, String>,
    pay_calls: u32,
    fail_payments: bool,
    preimage_override: Option<String>,
}

/// Scriptable stand-in for the RGB-Lightning node, shared by both roles
/// the way a real swap shares one RLN instance.
#[derive(Debug, Default)]
pub struct MockRln {
    state: Mutex<RlnState>,
}

impl MockRln {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `sendpayment` report Failed.
    pub fn fail_payments(&self) {
        self.state.lock().unwrap().fail_payments = true;
    }

    /// Report this preimage from `getpaymentpreimage` instead of the real
    /// one once the payment succeeds.
    pub fn override_preimage(&self, preimage_hex: &str) {
        self.state.lock().unwrap().preimage_override = Some(preimage_hex.to_string());
    }

    pub fn pay_call_count(&self) -> u32 {
        self.state.lock().unwrap().pay_calls
    }

    pub fn invoice_count(&self) -> usize {
        self.state.lock().unwrap().invoices.len()
    }

    pub fn hodl_status(&self, payment_hash: &str) -> Option<HodlPaymentStatus> {
        self.state
            .lock()
            .unwrap()
            .invoices
            .get(payment_hash)
            .map(|i| i.status)
    }
}

impl RlnOps for MockRln {
    async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice, SwapError> {
        let state = self.state.lock().unwrap();
        let hash = state
            .by_invoice
            .get(invoice)
            .ok_or_else(|| SwapError::Rln(format!("decode: unknown invoice {invoice}")))?;
        let entry = &state.invoices[hash];
        Ok(DecodedInvoice {
            payment_hash: entry.payment_hash.clone(),
            amt_msat: entry.amt_msat,
            expires_at: None,
        })
    }

    async fn pay_invoice(&self, invoice: &str) -> Result<PayResponse, SwapError> {
        let mut state = self.state.lock().unwrap();
        state.pay_calls += 1;

        let hash = state
            .by_invoice
            .get(invoice)
            .cloned()
            .ok_or_else(|| SwapError::Rln(format!("pay: unknown invoice {invoice}")))?;

        if state.fail_payments {
            let entry = state.invoices.get_mut(&hash).expect("invoice exists");
            entry.status = HodlPaymentStatus::Failed;
            return Ok(PayResponse {
                status: PaymentStatus::Failed,
                payment_hash: hash,
                payment_secret: String::new(),
            });
        }

        // A HODL payment parks as claimable until the recipient settles.
        let entry = state.invoices.get_mut(&hash).expect("invoice exists");
        entry.status = HodlPaymentStatus::Claimable;
        Ok(PayResponse {
            status: PaymentStatus::Pending,
            payment_hash: entry.payment_hash.clone(),
            payment_secret: entry.payment_secret.clone(),
        })
    }

    async fn get_payment(&self, payment_hash: &str) -> Result<PaymentDetails, SwapError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .invoices
            .get(payment_hash)
            .ok_or_else(|| SwapError::Rln(format!("getpayment: unknown hash {payment_hash}")))?;
        Ok(PaymentDetails {
            amt_msat: entry.amt_msat,
            asset_amount: None,
            asset_id: None,
            payment_hash: entry.payment_hash.clone(),
            inbound: true,
            status: entry.status,
            created_at: None,
            updated_at: None,
            payee_pubkey: None,
            preimage: entry.preimage.clone(),
        })
    }

    async fn get_payment_preimage(
        &self,
        payment_hash: &str,
    ) -> Result<PreimageResponse, SwapError> {
        let state = self.state.lock().unwrap();
        let entry = state.invoices.get(payment_hash).ok_or_else(|| {
            SwapError::Rln(format!("getpaymentpreimage: unknown hash {payment_hash}"))
        })?;
        let (status, preimage) = match entry.status {
            HodlPaymentStatus::Pending => (PreimageStatus::Pending, None),
            HodlPaymentStatus::Claimable => (PreimageStatus::Claimable, None),
            HodlPaymentStatus::Succeeded => {
                let preimage = state
                    .preimage_override
                    .clone()
                    .or_else(|| entry.preimage.clone());
                (PreimageStatus::Succeeded, preimage)
            }
            HodlPaymentStatus::Cancelled => (PreimageStatus::Cancelled, None),
            HodlPaymentStatus::Failed => (PreimageStatus::Failed, None),
        };
        Ok(PreimageResponse { status, preimage })
    }

    async fn invoice_hodl(
        &self,
        request: &HodlInvoiceRequest,
    ) -> Result<HodlInvoiceResponse, SwapError> {
        let invoice = format!("lnbcrt-hodl-{}", request.payment_hash);
        let payment_secret = format!("secret-{}", &request.payment_hash[..8]);

        let mut state = self.state.lock().unwrap();
        state.invoices.insert(
            request.payment_hash.clone(),
            MockInvoice {
                payment_hash: request.payment_hash.clone(),
                amt_msat: request.amt_msat,
                payment_secret: payment_secret.clone(),
                status: HodlPaymentStatus::Pending,
                preimage: None,
            },
        );
        state
            .by_invoice
            .insert(invoice.clone(), request.payment_hash.clone());

        Ok(HodlInvoiceResponse {
            invoice,
            payment_secret,
        })
    }

    async fn invoice_settle(
        &self,
        payment_hash: &str,
        payment_preimage: &str,
    ) -> Result<(), SwapError> {
        let preimage: [u8; 32] = hex::decode(payment_preimage)
            .map_err(|e| SwapError::Rln(format!("settle: bad preimage hex: {e}")))?
            .try_into()
            .map_err(|_| SwapError::Rln("settle: preimage must be 32 bytes".into()))?;
        if hex::encode(sha256(&preimage)) != payment_hash {
            return Err(SwapError::Rln("settle: preimage does not match hash".into()));
        }

        let mut state = self.state.lock().unwrap();
        let entry = state
            .invoices
            .get_mut(payment_hash)
            .ok_or_else(|| SwapError::Rln(format!("settle: unknown hash {payment_hash}")))?;
        if entry.status != HodlPaymentStatus::Claimable {
            return Err(SwapError::Rln(format!(
                "settle: payment is {:?}, not Claimable",
                entry.status
            )));
        }
        entry.status = HodlPaymentStatus::Succeeded;
        entry.preimage = Some(payment_preimage.to_string());
        Ok(())
    }

    async fn invoice_cancel(&self, payment_hash: &str) -> Result<(), SwapError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .invoices
            .get_mut(payment_hash)
            .ok_or_else(|| SwapError::Rln(format!("cancel: unknown hash {payment_hash}")))?;
        entry.status = HodlPaymentStatus::Cancelled;
        Ok(())
    }

    async fn invoice_status(&self, invoice: &str) -> Result<InvoiceStatus, SwapError> {
        let state = self.state.lock().unwrap();
        let hash = state
            .by_invoice
            .get(invoice)
            .ok_or_else(|| SwapError::Rln(format!("status: unknown invoice {invoice}")))?;
        Ok(match state.invoices[hash].status {
            HodlPaymentStatus::Pending | HodlPaymentStatus::Claimable => InvoiceStatus::Pending,
            HodlPaymentStatus::Succeeded => InvoiceStatus::Succeeded,
            HodlPaymentStatus::Cancelled => InvoiceStatus::Cancelled,
            HodlPaymentStatus::Failed => InvoiceStatus::Failed,
        })
    }
}
