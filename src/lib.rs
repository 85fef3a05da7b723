//! # rpcrouter
//!
//! **rpcrouter** is a coroutine-powered HTTP request router with an XML-RPC
//! server and client built on top of it.
//!
//! ## Overview
//!
//! Handlers are declared as `(HTTP methods, path regex) -> handler` tables at
//! startup. An incoming request is matched against the tables, first match
//! wins, and the handler receives the named captures of the path. The XML-RPC
//! server is one such table with a single `POST /RPC2` route; the client is a
//! name-based caller that validates arguments against the signatures the
//! server publishes through `system.methodSignature`.
//!
//! ## Architecture
//!
//! - **[`router`]** - Handler tables, pattern anchoring, capture extraction
//! - **[`dispatcher`]** - Request/response model, error-to-status mapping
//! - **[`server`]** - HTTP transport on `may_minihttp`
//! - **[`rpc`]** - XML-RPC values, codec, signatures, server and client
//! - **[`config`]** - YAML configuration with environment overrides
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - The `rpcrouter` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client as RpcClient
//!     participant Http as server::AppService
//!     participant Disp as dispatcher::Dispatcher
//!     participant Router as router::Router
//!     participant Rpc as rpc::RpcServer
//!
//!     Client->>Client: validate args against signature
//!     Client->>Http: POST /RPC2 (methodCall)
//!     Http->>Disp: dispatch(Request)
//!     Disp->>Router: route(POST, /RPC2)
//!     Router-->>Disp: RouteMatch + Captures
//!     Disp->>Rpc: rpc_endpoint handler
//!     Rpc->>Rpc: decode, validate, execute, validate return
//!     Rpc-->>Disp: methodResponse (value or fault)
//!     Disp-->>Http: Response 200 text/xml
//!     Http-->>Client: methodResponse
//!     Client->>Client: validate return, map fault to RpcError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rpcrouter::config::ServerConfig;
//! use rpcrouter::rpc::{RpcMethod, RpcServer, TypeTag, Value};
//!
//! let mut builder = RpcServer::builder();
//! builder.register(
//!     RpcMethod::new("echo", |args| Ok(args[0].clone()))
//!         .sign_request([TypeTag::String])
//!         .sign_response(TypeTag::String),
//! )?;
//! builder.build().serve(&ServerConfig::default())?;
//! ```
//!
//! ## Runtime Considerations
//!
//! rpcrouter uses the `may` coroutine runtime, not tokio. Every connection
//! runs in a coroutine; the coroutine stack size is set with
//! `RPCR_STACK_SIZE`. The HTTP client is blocking.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod router;
pub mod rpc;
pub mod server;

pub use config::{AppConfig, ClientConfig, ServerConfig};
pub use dispatcher::{Dispatcher, Request, Response};
pub use error::{ConfigError, DispatchError, RpcError};
pub use router::{Captures, HandlerTable, Router};
pub use rpc::{RpcClient, RpcMethod, RpcServer, Value};
