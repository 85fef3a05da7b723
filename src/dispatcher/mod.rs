//! # Dispatcher Module
//!
//! Turns an inbound [`Request`] into a populated [`Response`] by walking the
//! router's handler tables and invoking the first matching handler.
//!
//! ## Request Flow
//!
//! 1. Default headers (CORS) and the request id are applied to the response
//! 2. `OPTIONS` requests are answered immediately (preflight)
//! 3. The configured server root is stripped from the path
//! 4. The router finds the first route matching method and path
//! 5. The handler runs with `(request, response, captures)`
//! 6. A returned [`DispatchError`](crate::error::DispatchError) becomes a
//!    status code and an error body rendered by the [`ErrorFormat`]
//!
//! ## Error Handling
//!
//! - No matching route returns 404
//! - Domain errors map to their status code (see
//!   [`DispatchError::status_code`](crate::error::DispatchError::status_code))
//! - Internal errors and handler panics return 500 with a generic body; the
//!   details only reach the log

mod core;
#[cfg(test)]
mod tests;

pub use core::{
    Dispatcher, ErrorFormat, HeaderVec, PlainTextErrors, Request, Response, DEFAULT_HEADERS,
    MAX_INLINE_HEADERS,
};
