//! Engine request execution: endpoint rotation, transport and retry

use async_trait::async_trait;
use parking_lot::Mutex;
use presto_config::{DataSourceConfig, RetrySettings};
use presto_shared::{PrestoError, PrestoResult};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Engine endpoints in rotation order
#[derive(Debug)]
pub struct EndpointRing {
    endpoints: Mutex<VecDeque<String>>,
}

impl EndpointRing {
    pub fn new(endpoints: impl IntoIterator<Item = String>) -> Self {
        Self {
            endpoints: Mutex::new(endpoints.into_iter().collect()),
        }
    }

    /// Take the head endpoint and move it to the back
    pub fn next(&self) -> Option<String> {
        let mut endpoints = self.endpoints.lock();
        let head = endpoints.pop_front()?;
        endpoints.push_back(head.clone());
        Some(head)
    }

    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.lock().is_empty()
    }

    /// Current order, head first
    pub fn snapshot(&self) -> Vec<String> {
        self.endpoints.lock().iter().cloned().collect()
    }
}

/// Backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            initial_delay: settings.initial_delay(),
            max_delay: settings.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Status 0 (no response) and anything below 300 are worth another try
    pub fn is_retryable(&self, status: u16) -> bool {
        status == 0 || status < 300
    }

    pub fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Form-ish text the engine reads the query from
    Text(String),
    Json(Value),
}

/// One logical call to the engine, sent to whichever endpoint is next
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub path: String,
    pub body: RequestBody,
}

impl EngineRequest {
    pub fn query(sql: &str, database: &str) -> Self {
        Self {
            path: "/".to_string(),
            body: RequestBody::Text(format!("query={sql};&db={database}")),
        }
    }

    pub fn write_series(payload: Value) -> Self {
        Self {
            path: "/series".to_string(),
            body: RequestBody::Json(payload),
        }
    }

    /// SQL carried by a query request
    pub fn sql(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Text(text) => text
                .strip_prefix("query=")
                .and_then(|rest| rest.rsplit_once(";&db="))
                .map(|(sql, _)| sql),
            RequestBody::Json(_) => None,
        }
    }
}

/// Failed attempt. Status 0 means no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status {status}: {body}")]
pub struct TransportFailure {
    pub status: u16,
    pub body: String,
}

impl TransportFailure {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            body: err.to_string(),
        }
    }
}

/// A single attempt against a single endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, endpoint: &str, request: &EngineRequest)
        -> Result<Value, TransportFailure>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
}

impl Credentials {
    pub fn from_config(config: &DataSourceConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            key: config.key.clone(),
        }
    }
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_client(reqwest::Client::new(), credentials)
    }

    pub fn with_client(client: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// `<endpoint><path><key>` with the credentials as `u`/`p` parameters
    pub fn request_url(&self, endpoint: &str, path: &str) -> Result<Url, TransportFailure> {
        let key = self.credentials.key.as_deref().unwrap_or("");
        let raw = format!("{}{}{}", endpoint.trim_end_matches('/'), path, key);
        let mut url = Url::parse(&raw).map_err(TransportFailure::network)?;

        if self.credentials.username.is_some() || self.credentials.password.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(user) = &self.credentials.username {
                query.append_pair("u", user);
            }
            if let Some(password) = &self.credentials.password {
                query.append_pair("p", password);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        request: &EngineRequest,
    ) -> Result<Value, TransportFailure> {
        let url = self.request_url(endpoint, &request.path)?;

        let builder = match &request.body {
            RequestBody::Text(text) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "text/plain")
                .body(text.clone()),
            RequestBody::Json(payload) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload.to_string()),
        };

        let response = builder.send().await.map_err(TransportFailure::network)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(TransportFailure::network)?;

        if !status.is_success() {
            return Err(TransportFailure {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        // plain text acknowledgements are passed through as strings
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }
}

/// Sends requests with rotation, retry and cancellation. Cheap to clone.
#[derive(Clone)]
pub struct RequestExecutor {
    ring: Arc<EndpointRing>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl RequestExecutor {
    pub fn new(ring: Arc<EndpointRing>, transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            ring,
            transport,
            policy,
            timeout: None,
        }
    }

    pub fn from_config(config: &DataSourceConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            Arc::new(EndpointRing::new(config.urls.iter().cloned())),
            transport,
            RetryPolicy::from(&config.retry),
        )
        .with_timeout(config.request_timeout())
    }

    /// Upper bound on one logical request, retries included
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ring(&self) -> &EndpointRing {
        &self.ring
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> PrestoResult<Value> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute_with_retry(request, cancel))
                .await
                .map_err(|_| PrestoError::Timeout {
                    duration_ms: limit.as_millis() as u64,
                })?,
            None => self.execute_with_retry(request, cancel).await,
        }
    }

    async fn execute_with_retry(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> PrestoResult<Value> {
        let mut delay = self.policy.first_delay();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let endpoint = self.ring.next().ok_or_else(|| PrestoError::InvalidConfig {
                message: "no engine endpoints configured".to_string(),
                field: Some("urls".to_string()),
            })?;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PrestoError::Cancelled),
                outcome = self.transport.send(&endpoint, request) => outcome,
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(failure) if self.policy.is_retryable(failure.status) => {
                    log::warn!(
                        "engine request to {} failed (attempt {}, status {}): {}; retrying in {:?}",
                        endpoint,
                        attempt,
                        failure.status,
                        failure.body,
                        delay
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PrestoError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = self.policy.next_delay(delay);
                }
                Err(failure) => {
                    return Err(PrestoError::Engine {
                        status: failure.status,
                        body: failure.body,
                    })
                }
            }
        }
    }
}
