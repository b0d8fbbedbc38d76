//! HTTP pool client
//!
//! Talks to a controller that exposes, per profile:
//! - `GET  {base}/profiles/{profile}/engines` returning a JSON array of engine ids
//! - `POST {base}/profiles/{profile}/submit` taking `{"payload", "block"}`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{ClientError, DistributionView, EngineId, PoolClient, PoolConnector};

/// Default controller endpoint
pub const DEFAULT_CONTROLLER_URL: &str = "http://127.0.0.1:8181";

const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    payload: &'a Value,
    block: bool,
}

/// Connection-level failures mean the controller is not up yet.
///
/// Besides refused connections this covers a controller that accepts and then
/// resets or closes the connection before answering.
fn map_request_error(e: reqwest::Error) -> ClientError {
    if e.is_connect() || e.is_timeout() || e.is_request() || has_io_source(&e) {
        ClientError::Unreachable(e.to_string())
    } else {
        ClientError::Http(e.to_string())
    }
}

fn has_io_source(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = std::error::Error::source(err);
    }
    false
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: text,
        });
    }
    Ok(response)
}

#[derive(Clone)]
pub struct HttpPoolConnector {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPoolConnector {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PoolConnector for HttpPoolConnector {
    async fn connect(&self, profile: &str) -> Result<Arc<dyn PoolClient>, ClientError> {
        Ok(Arc::new(HttpPoolClient {
            http: self.http.clone(),
            profile_url: format!("{}/profiles/{}", self.base_url, profile),
            profile: profile.to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

pub struct HttpPoolClient {
    http: reqwest::Client,
    profile_url: String,
    profile: String,
    closed: Arc<AtomicBool>,
}

impl HttpPoolClient {
    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed(self.profile.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PoolClient for HttpPoolClient {
    async fn engine_ids(&self) -> Result<Vec<EngineId>, ClientError> {
        self.ensure_open()?;

        let url = format!("{}/engines", self.profile_url);
        let response = self.http.get(&url).send().await.map_err(map_request_error)?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    fn load_balanced_view(&self) -> Box<dyn DistributionView> {
        Box::new(HttpDistributionView {
            http: self.http.clone(),
            submit_url: format!("{}/submit", self.profile_url),
            profile: self.profile.clone(),
            closed: self.closed.clone(),
            blocking: false,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shares the closed flag of the client it was derived from
pub struct HttpDistributionView {
    http: reqwest::Client,
    submit_url: String,
    profile: String,
    closed: Arc<AtomicBool>,
    blocking: bool,
}

#[async_trait]
impl DistributionView for HttpDistributionView {
    fn set_blocking(&mut self, block: bool) {
        self.blocking = block;
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    async fn submit(&self, payload: Value) -> Result<Value, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed(self.profile.clone()));
        }

        let body = SubmitRequest {
            payload: &payload,
            block: self.blocking,
        };
        let response = self
            .http
            .post(&self.submit_url)
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}
