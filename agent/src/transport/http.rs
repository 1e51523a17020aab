//! HTTP transport for the remote endpoint.

use super::wire::{self, SetRequest};
use super::{GetOutcome, RemoteTransport, SetOutcome, TransportError};
use async_trait::async_trait;
use clubsync_engine::Document;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use std::time::Duration;

/// Talks to the remote endpoint over HTTP.
///
/// The endpoint only accepts "simple" requests, so writes are sent as
/// `text/plain` even though the body is JSON.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn read_body(response: reqwest::Response) -> Result<(u16, String), TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_error)?;
        Ok((status, body))
    }
}

/// Cache buster appended to every request.
fn cache_buster() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn get(&self) -> GetOutcome {
        let t = cache_buster();
        let sent = self
            .client
            .get(&self.endpoint)
            .query(&[("op", "get"), ("token", self.token.as_str()), ("t", t.as_str())])
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => return GetOutcome::Failed(request_error(e)),
        };
        match Self::read_body(response).await {
            Ok((status, body)) => wire::decode_get(status, &body),
            Err(e) => GetOutcome::Failed(e),
        }
    }

    async fn set(&self, data: &Document, base_updated_at: Option<&str>) -> SetOutcome {
        let body = match serde_json::to_string(&SetRequest::new(data, base_updated_at)) {
            Ok(body) => body,
            Err(e) => return SetOutcome::Failed(TransportError::Request(e.to_string())),
        };

        let t = cache_buster();
        let sent = self
            .client
            .post(&self.endpoint)
            .query(&[("token", self.token.as_str()), ("t", t.as_str())])
            .header(CONTENT_TYPE, "text/plain;charset=utf-8")
            .header(CACHE_CONTROL, "no-store")
            .body(body)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => return SetOutcome::Failed(request_error(e)),
        };
        match Self::read_body(response).await {
            Ok((status, body)) => wire::decode_set(status, &body),
            Err(e) => SetOutcome::Failed(e),
        }
    }
}
