//! XML-RPC client
//!
//! Methods are called by name, so names that are not Rust identifiers
//! (`system.listMethods`) work the same as any other. Before the first call
//! to a name the client fetches its signature through
//! `system.methodSignature` and caches it; every call is then validated
//! locally, and a call with bad arguments never reaches the network.
//!
//! A server that answers `system.listMethods` with "method not found" does
//! not offer introspection. Calls to it are sent without validation.

use super::codec::{decode_response, encode_call, Fault, MethodCall, MethodResponse};
use super::introspection::{builtin_signature, LIST_METHODS, METHOD_SIGNATURE};
use super::signature::MethodSignature;
use super::transport::{HttpTransport, Transport};
use super::value::Value;
use crate::config::ClientConfig;
use crate::error::RpcError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A connection to one XML-RPC endpoint
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    signatures: DashMap<String, MethodSignature>,
    known_methods: Vec<String>,
    introspection_failed: bool,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.transport.endpoint())
            .field("cached_signatures", &self.signatures.len())
            .field("introspection_failed", &self.introspection_failed)
            .finish()
    }
}

impl RpcClient {
    /// Create a client over `transport`
    ///
    /// Calls `system.listMethods` once and keeps the result (see
    /// [`RpcClient::known_methods`]). A server without introspection is
    /// tolerated: the list stays empty and later calls skip validation. Any
    /// other failure is logged and the list stays empty.
    pub fn new(transport: impl Transport + 'static) -> Self {
        let mut client = Self {
            transport: Arc::new(transport),
            signatures: DashMap::new(),
            known_methods: Vec::new(),
            introspection_failed: false,
        };
        match client.list_methods() {
            Ok(names) => {
                info!(
                    endpoint = %client.transport.endpoint(),
                    methods_count = names.len(),
                    "Remote methods listed"
                );
                client.known_methods = names;
            }
            Err(RpcError::UnsupportedMethod(_)) => {
                warn!(
                    endpoint = %client.transport.endpoint(),
                    "Server does not support introspection, calls will not be validated"
                );
                client.introspection_failed = true;
            }
            Err(err) => warn!(
                endpoint = %client.transport.endpoint(),
                error = %err,
                "Could not list remote methods"
            ),
        }
        client
    }

    /// Connect over HTTP(S) as described by `config`
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] if the HTTP client cannot be constructed.
    pub fn connect(config: &ClientConfig) -> Result<Self, RpcError> {
        Ok(Self::new(HttpTransport::new(config)?))
    }

    /// Names returned by `system.listMethods` when the client was created
    #[must_use]
    pub fn known_methods(&self) -> &[String] {
        &self.known_methods
    }

    /// Whether the server turned out not to offer `system.listMethods`
    #[must_use]
    pub fn introspection_failed(&self) -> bool {
        self.introspection_failed
    }

    /// A callable bound to `name`
    #[must_use]
    pub fn method(&self, name: impl Into<String>) -> MethodProxy<'_> {
        MethodProxy {
            client: self,
            name: name.into(),
        }
    }

    /// Call `system.listMethods` now
    ///
    /// # Errors
    ///
    /// Any error [`RpcClient::call`] can return.
    pub fn list_methods(&self) -> Result<Vec<String>, RpcError> {
        let names = self.call(LIST_METHODS, &[])?;
        match names {
            Value::Array(items) => items.into_iter().map(String::try_from).collect(),
            other => Err(RpcError::BadResponse(format!(
                "{LIST_METHODS} returned {}",
                other.type_tag()
            ))),
        }
    }

    /// The signature of `name`, from the cache or from the server
    ///
    /// Concurrent misses may both fetch; the last write wins, and both
    /// writes carry the same signature.
    ///
    /// # Errors
    ///
    /// [`RpcError::UnsupportedMethod`] if the server does not know the name,
    /// or any transport or decoding error.
    pub fn method_signature(&self, name: &str) -> Result<MethodSignature, RpcError> {
        if let Some(signature) = builtin_signature(name) {
            return Ok(signature);
        }
        if let Some(cached) = self.signatures.get(name) {
            return Ok(cached.clone());
        }
        let raw = self.invoke(METHOD_SIGNATURE, &[Value::from(name)])?;
        let signature = MethodSignature::from_wire(&raw)?;
        debug!(method = %name, signature = %signature, "Method signature cached");
        self.signatures.insert(name.to_owned(), signature.clone());
        Ok(signature)
    }

    /// Call `name` with `args`
    ///
    /// # Errors
    ///
    /// - [`RpcError::BadRequest`] if `args` do not match the signature or
    ///   hold a non-finite double (detected locally, nothing is sent), or the
    ///   server rejected them
    /// - [`RpcError::UnsupportedMethod`] for an unknown name
    /// - [`RpcError::BadResponse`] for an undecodable reply or a value of the
    ///   wrong type
    /// - [`RpcError::Fault`] for an application fault
    /// - [`RpcError::Transport`] when the server could not be reached
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, RpcError> {
        if self.introspection_failed && builtin_signature(name).is_none() {
            debug!(method = %name, "Calling without a signature");
            return self.invoke(name, args);
        }
        let signature = self.method_signature(name)?;
        let matched = signature.validate_args(name, args)?;
        let value = self.invoke(name, args)?;
        if let Some(matched) = matched {
            matched.validate_return(name, &value)?;
        }
        Ok(value)
    }

    /// Call a method signed with named arguments
    ///
    /// ```rust,ignore
    /// client.call_named("pow", [("base", Value::Int(3))])?;
    /// ```
    ///
    /// # Errors
    ///
    /// See [`RpcClient::call`].
    pub fn call_named<K>(
        &self,
        name: &str,
        members: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Value, RpcError>
    where
        K: Into<String>,
    {
        let members: BTreeMap<String, Value> =
            members.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.call(name, &[Value::Struct(members)])
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, RpcError> {
        if let Some(index) = args.iter().position(|arg| !arg.is_finite()) {
            return Err(RpcError::BadRequest(format!(
                "{name} argument {index} holds a non-finite double"
            )));
        }
        let body = encode_call(&MethodCall::new(name, args.to_vec()));
        let response = self.transport.send(body)?;
        match (response.status, decode_response(&response.body)) {
            (200, Ok(MethodResponse::Success(value))) => Ok(value),
            (200, Ok(MethodResponse::Fault(fault))) => {
                debug!(method = %name, fault_code = fault.code, "RPC fault received");
                Err(fault.into())
            }
            (200, Err(err)) => Err(err),
            (400, Ok(MethodResponse::Fault(fault))) if fault.code == Fault::PARSE_ERROR => {
                debug!(method = %name, fault_code = fault.code, "Server could not parse the call");
                Err(fault.into())
            }
            (status, _) => Err(RpcError::BadResponse(format!(
                "HTTP status {status} from {}",
                self.transport.endpoint()
            ))),
        }
    }
}

/// A remote method bound to one client and one name
#[derive(Debug, Clone)]
pub struct MethodProxy<'a> {
    client: &'a RpcClient,
    name: String,
}

impl MethodProxy<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// See [`RpcClient::call`].
    pub fn call(&self, args: &[Value]) -> Result<Value, RpcError> {
        self.client.call(&self.name, args)
    }

    /// # Errors
    ///
    /// See [`RpcClient::method_signature`].
    pub fn signature(&self) -> Result<MethodSignature, RpcError> {
        self.client.method_signature(&self.name)
    }
}

/// Build an argument vector from native values
///
/// ```rust,ignore
/// client.call("add", &params![2, 3])?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::rpc::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::rpc::Value::from($arg)),+]
    };
}
