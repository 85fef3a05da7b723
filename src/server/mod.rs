//! # Server Module
//!
//! HTTP transport plumbing on top of `may_minihttp`: each connection runs in
//! a `may` coroutine, each request is converted into a dispatcher
//! [`Request`](crate::dispatcher::Request), dispatched, and the resulting
//! response written back.
//!
//! ```rust,ignore
//! let service = AppService::new(dispatcher);
//! let handle = HttpServer(service).start("127.0.0.1:8080")?;
//! handle.wait_ready()?;
//! // ...
//! handle.stop();
//! ```

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_method, parse_query_params, parse_request};
pub use response::write_response;
pub use service::AppService;
