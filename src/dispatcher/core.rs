//! Dispatcher core module - hot path for request dispatch.
//!
//! # JSF Compliance (Rule 206)
//!
//! The router and every handler table are immutable after construction, so
//! concurrent dispatch needs no locking. Allocations on this path are limited
//! to the response body and error formatting.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::error::DispatchError;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::router::Router;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path
///
/// Header names use `Arc<str>`: the default headers are cloned into every
/// response and `Arc::clone()` is an atomic increment rather than a copy.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Headers attached to every response before the handler runs
pub const DEFAULT_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Methods",
        "GET,PUT,POST,DELETE,PATCH,OPTIONS,HEAD",
    ),
    (
        "Access-Control-Expose-Headers",
        "Access-Control-Allow-Origin",
    ),
    (
        "Access-Control-Allow-Headers",
        "Origin,X-Requested-Width,Content-Type,Accept,Authorization,X-CSRFToken,X-API-Key",
    ),
];

fn find_header<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// An inbound HTTP request as seen by handlers
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Decoded query string parameters, in order of appearance
    pub query_params: Vec<(String, String)>,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            query_params: Vec::new(),
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header; a valid `x-request-id` also becomes the request id
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            if let Ok(id) = value.trim().parse::<RequestId>() {
                self.request_id = id;
            }
        }
        self.headers.push((Arc::from(name), value));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Get a query parameter by name; the last occurrence wins
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The body as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` when the body is not valid UTF-8.
    pub fn body_text(&self) -> Result<&str, DispatchError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| DispatchError::MalformedRequest(format!("body is not UTF-8: {e}")))
    }
}

/// The response a handler populates in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    /// Replace the body and its content type
    pub fn set_body(&mut self, content_type: &str, body: impl Into<Vec<u8>>) {
        self.set_header("Content-Type", content_type);
        self.body = body.into();
    }

    /// Set a `text/plain` body
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.set_body("text/plain; charset=utf-8", text.into().into_bytes());
    }

    #[must_use]
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Renders a [`DispatchError`] into the response body
///
/// The dispatcher sets the status code; implementations only choose the body.
/// Implementations must not reveal the content of non-public errors.
pub trait ErrorFormat: Send + Sync {
    fn format_error(&self, err: &DispatchError, res: &mut Response);
}

/// Default format: the error message as plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextErrors;

impl ErrorFormat for PlainTextErrors {
    fn format_error(&self, err: &DispatchError, res: &mut Response) {
        if err.is_public() {
            res.set_text(err.to_string());
        } else {
            res.set_text("Internal Server Error");
        }
    }
}

/// Matches requests against a [`Router`] and invokes the winning handler
#[derive(Clone)]
pub struct Dispatcher {
    router: Router,
    root: String,
    default_headers: HeaderVec,
    error_format: Arc<dyn ErrorFormat>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("root", &self.root)
            .finish()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            root: String::new(),
            default_headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| (Arc::from(*k), (*v).to_owned()))
                .collect(),
            error_format: Arc::new(PlainTextErrors),
        }
    }

    /// Strip `root` from request paths before matching (e.g. `/api`)
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_error_format(mut self, format: Arc<dyn ErrorFormat>) -> Self {
        self.error_format = format;
        self
    }

    /// Add or replace a header sent on every response
    #[must_use]
    pub fn with_default_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.default_headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.default_headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    fn fresh_response(&self, request: &Request) -> Response {
        let mut res = Response {
            status: 200,
            headers: self.default_headers.clone(),
            body: Vec::new(),
        };
        res.set_header(REQUEST_ID_HEADER, request.request_id.to_string());
        res
    }

    fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        if self.root.is_empty() {
            return path;
        }
        match path.strip_prefix(self.root.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => {
                warn!(
                    path = %path,
                    root = %self.root,
                    "Request path does not begin with server root; likely a misconfiguration"
                );
                path
            }
        }
    }

    fn fail(&self, request: &Request, err: &DispatchError) -> Response {
        let mut res = self.fresh_response(request);
        res.status = err.status_code();
        self.error_format.format_error(err, &mut res);
        res
    }

    /// Dispatch a request to the first matching handler
    ///
    /// Never fails: every outcome, including a handler panic, is expressed as
    /// a response status.
    #[must_use]
    pub fn dispatch(&self, request: &Request) -> Response {
        let request_id = request.request_id;
        let mut res = self.fresh_response(request);

        if request.method.as_str().eq_ignore_ascii_case(Method::OPTIONS.as_str()) {
            debug!(request_id = %request_id, path = %request.path, "Answering preflight request");
            return res;
        }

        let path = self.relative_path(&request.path);
        let Some(route_match) = self.router.route(&request.method, path) else {
            let err = DispatchError::NotFound {
                method: request.method.to_string(),
                path: path.to_owned(),
            };
            return self.fail(request, &err);
        };

        info!(
            request_id = %request_id,
            table = %route_match.table,
            handler_name = %route_match.route.handler_name(),
            method = %request.method,
            path = %path,
            "Request dispatched to handler"
        );

        let start = Instant::now();
        let handler = route_match.route.handler();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (**handler)(request, &mut res, &route_match.captures)
        }));

        match outcome {
            Ok(Ok(())) => {
                info!(
                    request_id = %request_id,
                    handler_name = %route_match.route.handler_name(),
                    status = res.status,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Handler response received"
                );
                res
            }
            Ok(Err(err)) => {
                if err.is_public() {
                    warn!(
                        request_id = %request_id,
                        handler_name = %route_match.route.handler_name(),
                        status = err.status_code(),
                        error = %err,
                        "Received exception in handler"
                    );
                } else {
                    error!(
                        request_id = %request_id,
                        handler_name = %route_match.route.handler_name(),
                        error = ?err,
                        "Unexpected exception in application"
                    );
                }
                self.fail(request, &err)
            }
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                error!(
                    request_id = %request_id,
                    handler_name = %route_match.route.handler_name(),
                    panic_message = %panic_message,
                    "Handler panicked - CRITICAL"
                );
                let err = DispatchError::Internal(anyhow::anyhow!("handler panicked"));
                self.fail(request, &err)
            }
        }
    }
}
