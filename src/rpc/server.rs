//! XML-RPC server
//!
//! Methods are registered on an [`RpcServerBuilder`] at process start and
//! frozen into an [`RpcServer`]. The server owns a single route,
//! `POST /RPC2` by default, and answers every call on it with HTTP 200 and
//! either a value or a fault. Only an undecodable body is reported at the
//! HTTP level (400, with a `-32700` fault body).

use super::codec::{decode_call, encode_response, Fault, MethodCall, MethodResponse};
use super::introspection::{self, LIST_METHODS, METHOD_SIGNATURE};
use super::signature::{MethodSignature, NamedSignature, Signature};
use super::value::{TypeTag, Value};
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, ErrorFormat, Response};
use crate::error::{ConfigError, DispatchError, RpcError};
use crate::router::{HandlerTable, Router};
use crate::server::{AppService, HttpServer, ServerHandle};
use anyhow::Context;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default path of the RPC endpoint
pub const DEFAULT_RPC_PATH: &str = "/RPC2";

/// Content type of every RPC body
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Implementation of a user method
pub type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Value, RpcError> + Send + Sync>;

#[derive(Clone)]
enum Implementation {
    ListMethods,
    MethodSignature,
    Function(MethodFn),
}

/// A method declaration, passed to [`RpcServerBuilder::register`]
///
/// ```rust,ignore
/// let add = RpcMethod::new("add", |args| {
///     let (a, b) = (args[0].as_i64(), args[1].as_i64());
///     Ok(Value::Int(a.unwrap_or(0) + b.unwrap_or(0)))
/// })
/// .sign_request([TypeTag::Int, TypeTag::Int])
/// .sign_response(TypeTag::Int)
/// .help("Add two integers");
/// ```
///
/// Arguments reach the implementation only after they passed the request
/// signature, so positional access by declared type is safe. A method signed
/// with [`RpcMethod::sign_named_request`] receives exactly one struct, with
/// the defaults of omitted optional members filled in:
///
/// ```rust,ignore
/// let pow = RpcMethod::new("pow", |args| {
///     let members = args[0].as_struct().cloned().unwrap_or_default();
///     let base = members.get("base").and_then(Value::as_i64).unwrap_or(0);
///     let exponent = members.get("exponent").and_then(Value::as_i64).unwrap_or(0);
///     Ok(Value::Int(base.pow(exponent as u32)))
/// })
/// .sign_named_request(NamedSignature::new().required("base", TypeTag::Int).optional("exponent", 2))
/// .sign_response(TypeTag::Int);
/// ```
pub struct RpcMethod {
    name: String,
    params: Vec<Vec<TypeTag>>,
    named_params: Option<NamedSignature>,
    returns: Option<TypeTag>,
    named_returns: Option<NamedSignature>,
    help: String,
    implementation: Implementation,
}

impl RpcMethod {
    pub fn new<F>(name: impl Into<String>, implementation: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            named_params: None,
            returns: None,
            named_returns: None,
            help: String::new(),
            implementation: Implementation::Function(Arc::new(implementation)),
        }
    }

    fn builtin(name: &str, implementation: Implementation, help: &str) -> Self {
        let signature = introspection::builtin_positional(name)
            .unwrap_or_else(|| Signature::new(TypeTag::Array, []));
        Self {
            name: name.to_owned(),
            params: vec![signature.params],
            named_params: None,
            returns: Some(signature.returns),
            named_returns: None,
            help: help.to_owned(),
            implementation,
        }
    }

    /// Declare the parameter types
    ///
    /// Each call adds an alternative; a call is accepted when it matches any
    /// of them. A method never signed takes no arguments.
    #[must_use]
    pub fn sign_request(mut self, params: impl IntoIterator<Item = TypeTag>) -> Self {
        self.params.push(params.into_iter().collect());
        self
    }

    /// Take a single struct of named arguments instead of positional ones
    #[must_use]
    pub fn sign_named_request(mut self, signature: NamedSignature) -> Self {
        self.named_params = Some(signature);
        self
    }

    /// Declare the return type
    ///
    /// Every method needs this or [`RpcMethod::sign_named_response`].
    #[must_use]
    pub fn sign_response(mut self, returns: TypeTag) -> Self {
        self.returns = Some(returns);
        self
    }

    /// Return a struct with these members; absent optional members are
    /// filled with their defaults before the response is encoded
    #[must_use]
    pub fn sign_named_response(mut self, signature: NamedSignature) -> Self {
        self.named_returns = Some(signature);
        self
    }

    #[must_use]
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = text.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
enum Returns {
    Type(TypeTag),
    Named(NamedSignature),
}

impl Returns {
    fn type_tag(&self) -> TypeTag {
        match self {
            Returns::Type(tag) => *tag,
            Returns::Named(_) => TypeTag::Struct,
        }
    }

    /// Check a return value, filling the defaults of a named response
    fn complete(&self, method: &str, value: Value) -> Result<Value, RpcError> {
        let value = match self {
            Returns::Type(tag) => {
                if value.type_tag() != *tag {
                    return Err(RpcError::BadResponse(format!(
                        "{method} must return {tag}, returned {}",
                        value.type_tag()
                    )));
                }
                value
            }
            Returns::Named(named) => {
                named.validate_return(method, &value)?;
                match value {
                    Value::Struct(mut members) => {
                        named.fill_defaults(&mut members);
                        Value::Struct(members)
                    }
                    other => other,
                }
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(RpcError::BadResponse(format!(
                "{method} returned a non-finite double"
            )))
        }
    }
}

struct RegisteredMethod {
    name: String,
    signature: MethodSignature,
    returns: Returns,
    help: String,
    implementation: Implementation,
}

/// Registered methods in registration order, indexed by name
pub(crate) struct MethodTable {
    methods: Vec<RegisteredMethod>,
    index: HashMap<String, usize>,
}

impl MethodTable {
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }

    fn get(&self, name: &str) -> Option<&RegisteredMethod> {
        self.index.get(name).map(|&i| &self.methods[i])
    }

    pub(crate) fn signature(&self, name: &str) -> Option<&MethodSignature> {
        self.get(name).map(|m| &m.signature)
    }
}

/// Collects method registrations; see [`RpcServer::builder`]
pub struct RpcServerBuilder {
    table: MethodTable,
    path: String,
}

impl Default for RpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServerBuilder {
    /// A builder with the introspection methods already registered
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            table: MethodTable {
                methods: Vec::new(),
                index: HashMap::new(),
            },
            path: DEFAULT_RPC_PATH.to_owned(),
        };
        builder.insert(RpcMethod::builtin(
            LIST_METHODS,
            Implementation::ListMethods,
            "List the names of every method this server offers",
        ));
        builder.insert(RpcMethod::builtin(
            METHOD_SIGNATURE,
            Implementation::MethodSignature,
            "Return the signature of the named method: [return_type, param_types...]",
        ));
        builder
    }

    /// Serve on `path` instead of `/RPC2`
    pub fn path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    fn insert(&mut self, method: RpcMethod) {
        let returns = match (method.named_returns, method.returns) {
            (Some(named), _) => Returns::Named(named),
            (None, returns) => Returns::Type(returns.unwrap_or(TypeTag::Array)),
        };
        let signature = match method.named_params {
            Some(named) => MethodSignature::Named(named),
            None => {
                let mut alternatives = method.params;
                if alternatives.is_empty() {
                    alternatives.push(Vec::new());
                }
                MethodSignature::Positional(
                    alternatives
                        .into_iter()
                        .map(|params| Signature::new(returns.type_tag(), params))
                        .collect(),
                )
            }
        };
        self.table
            .index
            .insert(method.name.clone(), self.table.methods.len());
        self.table.methods.push(RegisteredMethod {
            name: method.name,
            signature,
            returns,
            help: method.help,
            implementation: method.implementation,
        });
    }

    /// Add a method to the table
    ///
    /// # Errors
    ///
    /// - [`RpcError::DuplicateMethod`] if the name is taken, built-ins included
    /// - [`RpcError::Configuration`] if the method has no response signature,
    ///   or mixes positional and named signatures on one side
    pub fn register(&mut self, method: RpcMethod) -> Result<&mut Self, RpcError> {
        if self.table.index.contains_key(&method.name) {
            return Err(RpcError::DuplicateMethod(method.name));
        }
        let conflict = match (&method.returns, &method.named_returns) {
            (None, None) => Some("has no response signature"),
            (Some(_), Some(_)) => Some("has both a positional and a named response signature"),
            _ if method.named_params.is_some() && !method.params.is_empty() => {
                Some("has both positional and named request signatures")
            }
            _ => None,
        };
        if let Some(conflict) = conflict {
            return Err(RpcError::Configuration(format!(
                "method '{}' {conflict}",
                method.name
            )));
        }
        debug!(
            method = %method.name,
            alternatives = method.params.len(),
            named = method.named_params.is_some(),
            "RPC method registered"
        );
        self.insert(method);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> RpcServer {
        info!(
            path = %self.path,
            methods_count = self.table.methods.len(),
            "RPC server built"
        );
        RpcServer {
            table: Arc::new(self.table),
            path: Arc::from(self.path),
        }
    }
}

/// An immutable XML-RPC method table bound to an HTTP path
///
/// Cloning is cheap; clones share the table.
#[derive(Clone)]
pub struct RpcServer {
    table: Arc<MethodTable>,
    path: Arc<str>,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("path", &self.path)
            .field("methods", &self.method_names())
            .finish()
    }
}

impl RpcServer {
    #[must_use]
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Registered names in registration order, built-ins first
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        self.table.names().collect()
    }

    /// The signature `system.methodSignature` publishes for `name`
    #[must_use]
    pub fn signature(&self, name: &str) -> Option<&MethodSignature> {
        self.table.signature(name)
    }

    /// Help text given at registration (empty when none was given)
    #[must_use]
    pub fn help(&self, name: &str) -> Option<&str> {
        self.table.get(name).map(|m| m.help.as_str())
    }

    /// Execute one decoded call
    ///
    /// Every failure becomes a fault; this never fails at the Rust level.
    #[must_use]
    pub fn call(&self, call: &MethodCall) -> MethodResponse {
        match self.execute(call) {
            Ok(value) => MethodResponse::Success(value),
            Err(err) => {
                let fault = Fault::from(&err);
                warn!(
                    method = %call.method_name,
                    fault_code = fault.code,
                    fault_string = %fault.message,
                    "RPC call answered with fault"
                );
                MethodResponse::Fault(fault)
            }
        }
    }

    fn execute(&self, call: &MethodCall) -> Result<Value, RpcError> {
        let name = call.method_name.as_str();
        let method = self
            .table
            .get(name)
            .ok_or_else(|| RpcError::UnsupportedMethod(name.to_owned()))?;
        method.signature.validate_args(name, &call.params)?;
        let args: Cow<'_, [Value]> = match &method.signature {
            MethodSignature::Named(named) => {
                let mut members = NamedSignature::members(name, &call.params)?.into_owned();
                named.fill_defaults(&mut members);
                Cow::Owned(vec![Value::Struct(members)])
            }
            MethodSignature::Positional(_) => Cow::Borrowed(call.params.as_slice()),
        };
        debug!(method = %name, args = call.params.len(), "RPC method invoked");

        let value = match &method.implementation {
            Implementation::ListMethods => introspection::list_methods(&self.table),
            Implementation::MethodSignature => {
                introspection::method_signature(&self.table, &call.params)?
            }
            Implementation::Function(f) => {
                match catch_unwind(AssertUnwindSafe(|| f(&*args))) {
                    Ok(result) => result?,
                    Err(panic) => {
                        let panic_message = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_owned())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_owned());
                        error!(method = %name, panic_message = %panic_message, "RPC method panicked");
                        return Err(RpcError::Fault(Fault::new(
                            Fault::APPLICATION_ERROR,
                            format!("{name} failed"),
                        )));
                    }
                }
            }
        };

        method.returns.complete(name, value).map_err(|err| {
            error!(method = %name, error = %err, "RPC method violated its own return signature");
            err
        })
    }

    /// Decode a request body, execute it and encode the response
    ///
    /// # Errors
    ///
    /// [`RpcError::MalformedRequest`] when the body is not a valid call.
    pub fn handle(&self, body: &[u8]) -> Result<String, RpcError> {
        let call = decode_call(body)?;
        Ok(encode_response(&self.call(&call)))
    }

    /// A table holding the single `POST {path}` route
    ///
    /// # Errors
    ///
    /// Fails when the configured path is not a valid pattern.
    pub fn handler_table(&self) -> Result<HandlerTable, ConfigError> {
        let server = self.clone();
        let mut table = HandlerTable::builder("RpcServer");
        table
            .handler("rpc_endpoint", move |req, res, _caps| {
                let xml = server.handle(&req.body)?;
                res.set_body(XML_CONTENT_TYPE, xml.into_bytes());
                Ok(())
            })
            .methods(["POST"])
            .path(&regex::escape(&self.path));
        table.build()
    }

    /// # Errors
    ///
    /// See [`RpcServer::handler_table`].
    pub fn router(&self) -> Result<Router, ConfigError> {
        Ok(Router::new(self.handler_table()?))
    }

    /// A dispatcher that renders dispatch-level errors as XML faults
    ///
    /// # Errors
    ///
    /// See [`RpcServer::handler_table`].
    pub fn dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        Ok(Dispatcher::new(self.router()?).with_error_format(Arc::new(FaultFormat)))
    }

    /// Bind the HTTP transport and serve in the background
    ///
    /// # Errors
    ///
    /// Fails on an unsupported driver or when the address cannot be bound.
    pub fn start(&self, config: &ServerConfig) -> anyhow::Result<ServerHandle> {
        config.check_driver()?;
        let mut dispatcher = self.dispatcher()?;
        if let Some(root) = &config.root {
            dispatcher = dispatcher.with_root(root.as_str());
        }
        let service = AppService::new(dispatcher);
        let handle = HttpServer(service)
            .start((config.host.as_str(), config.port))
            .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
        info!(
            host = %config.host,
            port = config.port,
            path = %self.path,
            driver = %config.driver,
            "RPC server listening"
        );
        Ok(handle)
    }

    /// Serve in the foreground until the transport stops
    ///
    /// # Errors
    ///
    /// See [`RpcServer::start`]; also fails if the server coroutine panicked.
    pub fn serve(&self, config: &ServerConfig) -> anyhow::Result<()> {
        let handle = self.start(config)?;
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("server coroutine panicked"))
    }
}

/// Renders dispatch-level errors as `methodResponse` faults
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultFormat;

impl ErrorFormat for FaultFormat {
    fn format_error(&self, err: &DispatchError, res: &mut Response) {
        let fault = match err {
            DispatchError::MalformedRequest(msg) => Fault::new(Fault::PARSE_ERROR, msg.as_str()),
            DispatchError::BadRequest(msg) => Fault::new(Fault::INVALID_REQUEST, msg.as_str()),
            DispatchError::UnsupportedMethod(msg) => {
                Fault::new(Fault::METHOD_NOT_FOUND, msg.as_str())
            }
            DispatchError::Internal(_) => {
                Fault::new(Fault::INTERNAL_ERROR, "Internal Server Error")
            }
            other => Fault::new(Fault::APPLICATION_ERROR, other.to_string()),
        };
        res.set_body(
            XML_CONTENT_TYPE,
            encode_response(&MethodResponse::Fault(fault)).into_bytes(),
        );
    }
}
