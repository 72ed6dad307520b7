use crate::config::CashflowsConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// What the checkout asks the gateway to collect. `amount` is in pence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentJobRequest {
    pub amount: i64,
    pub currency: String,
    /// Our order id; echoed back by the gateway as `orderReference`.
    pub reference: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentJob {
    pub job_reference: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_job(&self, request: &PaymentJobRequest) -> AppResult<PaymentJob>;

    /// Current gateway status of a payment job, e.g. `captured` or `declined`.
    async fn job_status(&self, job_reference: &str) -> AppResult<String>;

    /// Checks a webhook body against the signature header the gateway sent with it.
    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;
}

/// Whether card checkout is available. Chosen once at startup.
#[derive(Clone)]
pub enum CardPayments {
    Configured(Arc<dyn PaymentGateway>),
    Disabled,
}

impl CardPayments {
    pub fn from_config(cfg: &CashflowsConfig) -> AppResult<Self> {
        if !cfg.is_configured() {
            log::warn!("Cashflows credentials not configured, card payments disabled");
            return Ok(CardPayments::Disabled);
        }
        Ok(CardPayments::Configured(Arc::new(CashflowsClient::new(
            cfg.clone(),
        )?)))
    }

    pub fn gateway(&self) -> Option<&Arc<dyn PaymentGateway>> {
        match self {
            CardPayments::Configured(gateway) => Some(gateway),
            CardPayments::Disabled => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gateway().is_some()
    }

    /// A disabled gateway accepts no webhooks.
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        self.gateway()
            .is_some_and(|g| g.verify_webhook(body, signature))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobBody<'a> {
    amount_to_collect: String,
    currency: &'a str,
    order_reference: &'a str,
    description: &'a str,
    return_url_success: &'a str,
    return_url_cancel: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    payment_job_reference: String,
    action_url: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
}

/// Cashflows REST client. Requests are authenticated with the `ConfigurationId`
/// header and a `Hash` of `api_secret + body` keyed by `api_secret`.
#[derive(Clone)]
pub struct CashflowsClient {
    http: Client,
    cfg: CashflowsConfig,
}

impl CashflowsClient {
    pub fn new(cfg: CashflowsConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent("prize-draw-backend/cashflows")
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, cfg })
    }

    fn request_hash(&self, body: &str) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.cfg.api_secret.as_bytes())
            .map_err(|e| AppError::ConfigError(format!("Invalid Cashflows secret: {e}")))?;
        mac.update(self.cfg.api_secret.as_bytes());
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.cfg.gateway_url.trim_end_matches('/'), path)
    }
}

async fn gateway_error(resp: reqwest::Response, what: &str) -> AppError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    AppError::ExternalApiError(format!(
        "Cashflows {what} failed: HTTP {}: {}",
        status.as_u16(),
        text
    ))
}

/// 金额格式: 便士 -> "12.34"
fn format_amount(pence: i64) -> String {
    format!("{}.{:02}", pence / 100, pence % 100)
}

#[async_trait]
impl PaymentGateway for CashflowsClient {
    async fn create_job(&self, request: &PaymentJobRequest) -> AppResult<PaymentJob> {
        let body = serde_json::to_string(&CreateJobBody {
            amount_to_collect: format_amount(request.amount),
            currency: &request.currency,
            order_reference: &request.reference,
            description: &request.description,
            return_url_success: &request.success_url,
            return_url_cancel: &request.cancel_url,
        })?;
        let hash = self.request_hash(&body)?;

        let resp = self
            .http
            .post(self.endpoint("/payment-jobs"))
            .header("Content-Type", "application/json")
            .header("ConfigurationId", &self.cfg.merchant_id)
            .header("Hash", hash)
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(gateway_error(resp, "payment job").await);
        }

        let job: CreateJobResponse = resp.json().await?;
        log::info!(
            "Cashflows payment job {} created for order {}",
            job.payment_job_reference,
            request.reference
        );
        Ok(PaymentJob {
            job_reference: job.payment_job_reference,
            redirect_url: job.action_url,
        })
    }

    async fn job_status(&self, job_reference: &str) -> AppResult<String> {
        // 无请求体的 GET 对空字符串签名
        let hash = self.request_hash("")?;
        let resp = self
            .http
            .get(self.endpoint(&format!("/payment-jobs/{job_reference}")))
            .header("Content-Type", "application/json")
            .header("ConfigurationId", &self.cfg.merchant_id)
            .header("Hash", hash)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(gateway_error(resp, "payment job status").await);
        }
        let body: JobStatusResponse = resp.json().await?;
        Ok(body.status)
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        if self.cfg.webhook_secret.is_empty() {
            log::warn!("Cashflows webhook secret not configured, rejecting webhook");
            return false;
        }
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.cfg.webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }
}
