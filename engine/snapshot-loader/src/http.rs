//! HTTP snapshot source

use crate::config::SnapshotConfig;
use crate::source::{normalize_records, PortfolioRecord, SnapshotSource};
use async_trait::async_trait;
use portfolio_types::{Credentials, EngineError, EngineResult, Holding};
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

/// Fetches `GET {base_url}/api/portfolio/{user_id}` with bearer auth
pub struct HttpSnapshotLoader {
    config: SnapshotConfig,
    credentials: Credentials,
    client: Client,
}

impl HttpSnapshotLoader {
    pub fn new(config: SnapshotConfig, credentials: Credentials) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EngineError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, credentials, client })
    }

    fn url(&self, user_id: &str) -> String {
        format!("{}/api/portfolio/{}", self.config.base_url.trim_end_matches('/'), user_id)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotLoader {
    async fn load(&self, user_id: &str) -> EngineResult<Vec<Holding>> {
        let response = self
            .client
            .get(self.url(user_id))
            .header(reqwest::header::AUTHORIZATION, self.credentials.authorization())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        let records = decode_snapshot(status, &body)?;
        debug!("Snapshot returned {} records", records.len());
        Ok(normalize_records(records))
    }
}

/// Map a snapshot response to records or the matching error
pub(crate) fn decode_snapshot(status: StatusCode, body: &str) -> EngineResult<Vec<PortfolioRecord>> {
    if status == StatusCode::UNAUTHORIZED {
        error!("Snapshot fetch rejected credentials");
        return Err(EngineError::Auth(format!("snapshot fetch returned {}", status)));
    }
    if !status.is_success() {
        return Err(EngineError::Transport(format!("snapshot fetch returned {}: {}", status, body)));
    }
    Ok(serde_json::from_str(body)?)
}

fn transport_error(err: reqwest::Error) -> EngineError {
    if err.is_decode() {
        EngineError::Decode(err.to_string())
    } else {
        EngineError::Transport(err.to_string())
    }
}
