//! Backend seams: where orders go and where positions are read from

use crate::messages::{Acknowledgement, OrderRequest};
use async_trait::async_trait;
use portfolio_types::{Credentials, EngineError, EngineResult, InstrumentId};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use valuation_store::StoreHandle;

/// Execution backend accepting validated orders
#[async_trait]
pub trait OrderBackend: Send + Sync {
    async fn submit(&self, request: OrderRequest) -> EngineResult<Acknowledgement>;
}

/// Read access to current positions and prices for validation
pub trait PositionBook: Send + Sync {
    fn held_shares(&self, id: InstrumentId) -> Decimal;
    fn last_price(&self, id: InstrumentId) -> Option<Decimal>;
}

impl PositionBook for StoreHandle {
    fn held_shares(&self, id: InstrumentId) -> Decimal {
        StoreHandle::held_shares(self, id)
    }

    fn last_price(&self, id: InstrumentId) -> Option<Decimal> {
        StoreHandle::last_price(self, id).map(|tick| tick.price)
    }
}

/// Submits orders over HTTP with bearer auth
pub struct HttpOrderBackend {
    base_url: String,
    credentials: Credentials,
    client: Client,
}

impl HttpOrderBackend {
    /// Only connecting is bounded by `connect_timeout`. Once a request is sent
    /// it runs until the backend answers; the caller's wait is bounded
    /// separately by the gateway.
    pub fn new(base_url: &str, connect_timeout: Duration, credentials: Credentials) -> EngineResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }
}

#[async_trait]
impl OrderBackend for HttpOrderBackend {
    async fn submit(&self, request: OrderRequest) -> EngineResult<Acknowledgement> {
        let url = format!("{}{}", self.base_url, request.path());
        let body = request.body()?;
        debug!("POST {} {}", url, body);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.credentials.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| EngineError::Transport(e.to_string()))?;
        interpret_response(status, &text)
    }
}

/// Map a submission response to an acknowledgement or the matching error
///
/// Failure reasons come from the `detail` field verbatim when present.
pub fn interpret_response(status: StatusCode, body: &str) -> EngineResult<Acknowledgement> {
    if status.is_success() {
        return Ok(serde_json::from_str(body).unwrap_or_default());
    }

    let reason = rejection_reason(body).unwrap_or_else(|| status.to_string());
    if status == StatusCode::UNAUTHORIZED {
        Err(EngineError::Auth(reason))
    } else {
        Err(EngineError::BackendRejection(reason))
    }
}

fn rejection_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        // Request validation failures list one entry per field
        Value::Array(entries) => entries
            .first()
            .and_then(|entry| entry.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}
