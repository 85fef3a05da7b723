//! # XML-RPC Module
//!
//! Remote procedure calls layered on the router: the server is a single
//! `POST /RPC2` route, and the client is a thin name-based caller on top of a
//! [`Transport`].
//!
//! ## Components
//!
//! - [`value`] - [`Value`] and its wire [`TypeTag`]
//! - [`codec`] - `methodCall` / `methodResponse` documents and [`Fault`]s
//! - [`signature`] - positional (`[return, params...]`) and named contracts
//!   and their validation
//! - [`server`] - method registration and call execution
//! - [`introspection`] - `system.listMethods`, `system.methodSignature`
//! - [`client`] / [`transport`] - calling remote methods
//!
//! ## Example
//!
//! ```rust,ignore
//! use rpcrouter::params;
//! use rpcrouter::rpc::{LoopbackTransport, RpcClient, RpcMethod, RpcServer, TypeTag, Value};
//!
//! let mut builder = RpcServer::builder();
//! builder.register(
//!     RpcMethod::new("add", |args| {
//!         Ok(Value::Int(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
//!     })
//!     .sign_request([TypeTag::Int, TypeTag::Int])
//!     .sign_response(TypeTag::Int),
//! )?;
//! let server = builder.build();
//!
//! let client = RpcClient::new(LoopbackTransport::new(server.dispatcher()?, server.path()));
//! assert_eq!(client.call("add", &params![2, 3])?, Value::Int(5));
//! ```
//!
//! ## Fault Codes
//!
//! | Code     | Meaning                                      | Client error        |
//! |----------|----------------------------------------------|---------------------|
//! | `-32700` | request could not be parsed                  | `MalformedRequest`  |
//! | `-32600` | arguments do not match the signature         | `BadRequest`        |
//! | `-32601` | no such method                               | `UnsupportedMethod` |
//! | `-32603` | server returned a value of the wrong type    | `BadResponse`       |
//! | `-32500` | application failure                          | `Fault`             |
//! | other    | raised by a method implementation            | `Fault`             |

pub mod client;
pub mod codec;
pub mod introspection;
pub mod server;
pub mod signature;
pub mod transport;
pub mod value;

pub use client::{MethodProxy, RpcClient};
pub use codec::{
    decode_call, decode_response, encode_call, encode_response, Fault, MethodCall, MethodResponse,
};
pub use introspection::{builtin_signature, LIST_METHODS, METHOD_SIGNATURE};
pub use server::{
    FaultFormat, MethodFn, RpcMethod, RpcServer, RpcServerBuilder, DEFAULT_RPC_PATH,
    XML_CONTENT_TYPE,
};
pub use signature::{MethodSignature, NamedParam, NamedSignature, Signature};
pub use transport::{HttpTransport, LoopbackTransport, Transport, TransportResponse};
pub use value::{TypeTag, Value, DATETIME_FORMAT};
