//! # Error Taxonomy
//!
//! Three error families, one per phase of a request's life:
//!
//! - [`ConfigError`] - raised while building handler tables, registering RPC
//!   methods or loading configuration. These are process-fatal: a server must
//!   not begin serving with an inconsistent registry.
//! - [`DispatchError`] - raised while dispatching one HTTP request. Every
//!   variant maps to an HTTP status through [`DispatchError::status_code`].
//! - [`RpcError`] - raised by the XML-RPC layer on either side of the wire.
//!   Server-side occurrences are encoded as in-band faults; client-side
//!   occurrences are returned to the caller.

use crate::rpc::Fault;
use thiserror::Error;

/// Errors detected at registration / startup time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A route pattern failed to compile as a regular expression
    #[error("invalid path pattern '{pattern}' for handler '{handler}': {source}")]
    InvalidPattern {
        handler: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// A handler declared with `handler()` never received a path
    #[error("handler '{handler}' in table '{table}' has no path")]
    MissingPath { table: String, handler: String },
    /// A handler declared with `handler()` never received a method
    #[error("handler '{handler}' in table '{table}' has no HTTP methods")]
    MissingMethods { table: String, handler: String },
    /// A reverse URL template with unbalanced braces or an empty field
    #[error("invalid reverse template '{template}' for handler '{handler}': {reason}")]
    InvalidTemplate {
        handler: String,
        template: String,
        reason: String,
    },
    /// An HTTP method name that `http::Method` refuses
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    /// The configured transport driver is not available
    #[error("server driver '{0}' is not supported")]
    UnsupportedDriver(String),
    /// The configuration document could not be read or parsed
    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Domain errors raised while dispatching a single HTTP request.
///
/// Handlers return these to signal a failure that should become an HTTP
/// status code. `NotFound` is reserved for the dispatcher's own "no route
/// matched" outcome; handlers that cannot find a resource return
/// `ResourceNotFound` so both cases stay distinguishable in tests and logs.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler found matching method {method} and path {path}")]
    NotFound { method: String, path: String },
    #[error("{0}")]
    ResourceNotFound(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("authentication required: {0}")]
    Unauthorized(String),
    #[error("permission denied: {0}")]
    Forbidden(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Anything else. Never shown to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    /// HTTP status code for this error kind
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) | DispatchError::MalformedRequest(_) => 400,
            DispatchError::Unauthorized(_) => 401,
            DispatchError::Forbidden(_) => 403,
            DispatchError::NotFound { .. } | DispatchError::ResourceNotFound(_) => 404,
            DispatchError::UnsupportedMethod(_) => 405,
            DispatchError::TooManyRequests(_) => 429,
            DispatchError::NotImplemented(_) => 501,
            DispatchError::Internal(_) => 500,
        }
    }

    /// Whether the message may be sent to the client verbatim
    #[must_use]
    pub fn is_public(&self) -> bool {
        !matches!(self, DispatchError::Internal(_))
    }
}

/// Errors raised by the XML-RPC server, codec and client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// The wire body could not be parsed
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    /// The method name is not registered
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    /// Argument count or type does not match the declared signature
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A response could not be decoded, or its value violates the signature
    #[error("bad response: {0}")]
    BadResponse(String),
    /// An application-level fault returned by a method implementation
    #[error("fault {}: {}", .0.code, .0.message)]
    Fault(Fault),
    /// A method name was registered twice
    #[error("a method named '{0}' is already registered")]
    DuplicateMethod(String),
    /// A method was registered in an unusable state
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The HTTP client transport failed
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<RpcError> for DispatchError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::MalformedRequest(msg) => DispatchError::MalformedRequest(msg),
            RpcError::UnsupportedMethod(msg) => DispatchError::UnsupportedMethod(msg),
            RpcError::BadRequest(msg) => DispatchError::BadRequest(msg),
            other => DispatchError::Internal(anyhow::Error::new(other)),
        }
    }
}
