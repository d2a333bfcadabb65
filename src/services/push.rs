//! Push transport: delivers one "sync" message to one device.

use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;

/// Kind of every message this server sends.
pub const SYNC_MESSAGE: &str = "sync";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("push rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("push retries exhausted after {attempts} attempts, last status {status}")]
    Exhausted { attempts: u32, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushMessage<'a> {
    pub push_token: &'a str,
    pub collapse_key: &'a str,
    pub sync_token: Option<&'a str>,
}

pub trait PushTransport: Send + Sync {
    fn send<'a>(&'a self, message: PushMessage<'a>) -> BoxFuture<'a, Result<(), PushError>>;
}

#[derive(Serialize)]
struct PushData<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Serialize)]
struct PushBody<'a> {
    registration_id: &'a str,
    collapse_key: &'a str,
    data: PushData<'a>,
}

/// Posts messages as JSON to a push gateway, retrying transient failures with
/// exponential backoff.
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    retries: u32,
    backoff: Duration,
}

impl HttpPushTransport {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            retries,
            backoff,
        }
    }

    pub fn build(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        retries: u32,
        backoff: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, endpoint, api_key, retries, backoff))
    }

    async fn send_once(&self, body: &PushBody<'_>) -> Result<reqwest::StatusCode, PushError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("key={api_key}"));
        }
        let response = request.send().await?;
        let status = response.status();
        // success and retriable statuses are left to the caller
        if status.is_success()
            || status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Ok(status);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_with_retry(&self, message: PushMessage<'_>) -> Result<(), PushError> {
        let body = PushBody {
            registration_id: message.push_token,
            collapse_key: message.collapse_key,
            data: PushData {
                message: SYNC_MESSAGE,
                token: message.sync_token,
            },
        };
        let attempts = self.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.send_once(&body).await;
            let last_status = match outcome {
                Ok(status) if status.is_success() => return Ok(()),
                Ok(status) => status.as_u16(),
                Err(PushError::Request(err)) if attempt < attempts => {
                    tracing::debug!(attempt, reason = %err, "push request failed, retrying");
                    0
                }
                Err(err) => return Err(err),
            };
            if attempt >= attempts {
                return Err(PushError::Exhausted {
                    attempts,
                    status: last_status,
                });
            }
            let delay = self.backoff.saturating_mul(1 << (attempt - 1).min(16));
            tracing::debug!(
                attempt,
                status = last_status,
                delay = ?delay,
                "push deferred, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl PushTransport for HttpPushTransport {
    fn send<'a>(&'a self, message: PushMessage<'a>) -> BoxFuture<'a, Result<(), PushError>> {
        Box::pin(self.send_with_retry(message))
    }
}

/// Stand-in used when no push gateway is configured; only logs what would be sent.
pub struct LogPushTransport;

impl PushTransport for LogPushTransport {
    fn send<'a>(&'a self, message: PushMessage<'a>) -> BoxFuture<'a, Result<(), PushError>> {
        Box::pin(async move {
            tracing::info!(
                collapse_key = message.collapse_key,
                sync_token = message.sync_token,
                "push gateway not configured, message dropped"
            );
            Ok(())
        })
    }
}
