//! HTTP transport seam
//!
//! The client talks to providers only through [`Transport`]. The production
//! implementation wraps a `ureq` agent; tests and offline runs substitute
//! in-process implementations.

use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// A request header as `(name, value)`
pub type Header = (&'static str, String);

/// Status and raw body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A response carrying a JSON document
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, for error messages
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The exchange itself failed: DNS, connect, TLS, timeout or body read
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Blocking HTTP exchange. Non-2xx statuses are returned, not raised.
pub trait Transport {
    fn post_json(
        &self,
        url: &str,
        headers: &[Header],
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError>;

    fn get(&self, url: &str, headers: &[Header]) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post_json(
        &self,
        url: &str,
        headers: &[Header],
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        (**self).post_json(url, headers, body)
    }

    fn get(&self, url: &str, headers: &[Header]) -> Result<HttpResponse, TransportError> {
        (**self).get(url, headers)
    }
}

/// `ureq`-backed transport. The agent's connection pool is reused across calls.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &[Header],
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .send_json(body)
            .map_err(|e| TransportError(format!("POST {} failed: {}", url, e)))?;
        read_response(response)
    }

    fn get(&self, url: &str, headers: &[Header]) -> Result<HttpResponse, TransportError> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .call()
            .map_err(|e| TransportError(format!("GET {} failed: {}", url, e)))?;
        read_response(response)
    }
}

fn read_response(
    response: ureq::http::Response<ureq::Body>,
) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let mut reader = response.into_body().into_reader();
    let mut body = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut body)
        .map_err(|e| TransportError(format!("Failed to read response body: {}", e)))?;
    Ok(HttpResponse { status, body })
}
