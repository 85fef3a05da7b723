//! Client transports
//!
//! A [`Transport`] carries one encoded `methodCall` to a server and returns
//! the raw HTTP status and body. [`HttpTransport`] speaks HTTP through
//! `reqwest`; [`LoopbackTransport`] hands the body straight to an in-process
//! [`Dispatcher`], which keeps tests free of sockets and lets them count
//! round trips.

use super::server::XML_CONTENT_TYPE;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, Request};
use crate::error::RpcError;
use http::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Status and body of one transport round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends an encoded call and returns the server's reply
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// [`RpcError::Transport`] when no HTTP response was received.
    fn send(&self, body: String) -> Result<TransportResponse, RpcError>;

    /// Human-readable target, for logs
    fn endpoint(&self) -> String;
}

/// HTTP(S) transport with a cookie store and a request timeout
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// [`RpcError::Transport`] if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, RpcError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn send(&self, body: String) -> Result<TransportResponse, RpcError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body)
            .send()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .to_vec();
        debug!(url = %self.url, status, body_len = body.len(), "RPC response received");
        Ok(TransportResponse { status, body })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// In-process transport that dispatches straight into a [`Dispatcher`]
#[derive(Debug)]
pub struct LoopbackTransport {
    dispatcher: Dispatcher,
    path: String,
    requests: AtomicUsize,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, path: impl Into<String>) -> Self {
        Self {
            dispatcher,
            path: path.into(),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of calls sent so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, body: String) -> Result<TransportResponse, RpcError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(Method::POST, self.path.as_str())
            .with_header("Content-Type", XML_CONTENT_TYPE)
            .with_body(body);
        let response = self.dispatcher.dispatch(&request);
        Ok(TransportResponse {
            status: response.status,
            body: response.body,
        })
    }

    fn endpoint(&self) -> String {
        format!("loopback:{}", self.path)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, body: String) -> Result<TransportResponse, RpcError> {
        (**self).send(body)
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}
