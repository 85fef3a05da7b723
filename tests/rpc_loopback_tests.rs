//! XML-RPC client against an in-process server
//!
//! The loopback transport dispatches straight into the server's dispatcher,
//! so these tests can count exactly how many calls reach the wire.

use rpcrouter::dispatcher::Dispatcher;
use rpcrouter::error::RpcError;
use rpcrouter::params;
use rpcrouter::router::{HandlerTable, Router};
use rpcrouter::rpc::{
    decode_call, encode_response, Fault, FaultFormat, LoopbackTransport, MethodResponse,
    MethodSignature, NamedSignature, RpcClient, RpcMethod, RpcServer, Signature, Transport,
    TransportResponse, TypeTag, Value, DEFAULT_RPC_PATH, LIST_METHODS, METHOD_SIGNATURE,
    XML_CONTENT_TYPE,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn server() -> RpcServer {
    let mut builder = RpcServer::builder();
    builder
        .register(
            RpcMethod::new("add", |args| {
                let a = args[0].as_i64().unwrap_or_default();
                let b = args[1].as_i64().unwrap_or_default();
                Ok(Value::Int(a + b))
            })
            .sign_request([TypeTag::Int, TypeTag::Int])
            .sign_response(TypeTag::Int),
        )
        .unwrap()
        .register(
            RpcMethod::new("withdraw", |args| {
                let amount = args[0].as_f64().unwrap_or_default();
                if amount > 100.0 {
                    return Err(RpcError::Fault(Fault::new(4, "insufficient funds")));
                }
                Ok(Value::Double(100.0 - amount))
            })
            .sign_request([TypeTag::Double])
            .sign_response(TypeTag::Double),
        )
        .unwrap()
        .register(
            RpcMethod::new("profile", |args| {
                let mut members = BTreeMap::new();
                members.insert("name".to_owned(), args[0].clone());
                members.insert(
                    "tags".to_owned(),
                    Value::Array(vec!["admin".into(), "ops".into()]),
                );
                members.insert("avatar".to_owned(), Value::Base64(vec![0, 159, 146, 150]));
                Ok(Value::Struct(members))
            })
            .sign_request([TypeTag::String])
            .sign_response(TypeTag::Struct),
        )
        .unwrap()
        .register(
            RpcMethod::new("broken", |_| Ok(Value::from("not a number")))
                .sign_response(TypeTag::Int),
        )
        .unwrap()
        .register(
            RpcMethod::new("greet", |args| {
                let members = args[0].as_struct().cloned().unwrap_or_default();
                let name = members.get("name").and_then(Value::as_str).unwrap_or_default();
                let greeting = members.get("greeting").and_then(Value::as_str).unwrap_or_default();
                Ok(Value::from(format!("{greeting}, {name}")))
            })
            .sign_named_request(
                NamedSignature::new()
                    .required("name", TypeTag::String)
                    .optional("greeting", "hello"),
            )
            .sign_response(TypeTag::String),
        )
        .unwrap()
        .register(
            RpcMethod::new("double", |args| match &args[0] {
                Value::Int(n) => Ok(Value::Int(n * 2)),
                Value::Double(n) => Ok(Value::Double(n * 2.0)),
                other => Ok(other.clone()),
            })
            .sign_request([TypeTag::Int])
            .sign_request([TypeTag::Double])
            .sign_response(TypeTag::Int),
        )
        .unwrap();
    builder.build()
}

fn connect(server: &RpcServer) -> (RpcClient, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new(
        server.dispatcher().unwrap(),
        server.path(),
    ));
    (RpcClient::new(Arc::clone(&transport)), transport)
}

#[test]
fn test_list_methods_in_registration_order() {
    let (client, _) = connect(&server());
    let expected = vec![
        LIST_METHODS,
        METHOD_SIGNATURE,
        "add",
        "withdraw",
        "profile",
        "broken",
        "greet",
        "double",
    ];
    assert_eq!(client.list_methods().unwrap(), expected);
    assert_eq!(client.known_methods(), expected.as_slice());
}

#[test]
fn test_method_signature() {
    let (client, _) = connect(&server());
    assert_eq!(
        client.method_signature("add").unwrap(),
        MethodSignature::from(Signature::new(TypeTag::Int, [TypeTag::Int, TypeTag::Int]))
    );
    assert_eq!(
        client.method_signature("add").unwrap().to_string(),
        "[int, int, int]"
    );
}

#[test]
fn test_call_success() {
    let (client, _) = connect(&server());
    assert_eq!(client.call("add", &params![2, 3]).unwrap(), Value::Int(5));
    assert_eq!(client.method("withdraw").call(&params![40.5]).unwrap(), Value::Double(59.5));
}

#[test]
fn test_struct_result() {
    let (client, _) = connect(&server());
    let profile = client.call("profile", &params!["ada"]).unwrap();
    let members = profile.as_struct().unwrap();
    assert_eq!(members["name"], Value::from("ada"));
    assert_eq!(members["tags"].as_array().unwrap().len(), 2);
    assert_eq!(members["avatar"].as_bytes(), Some(&[0u8, 159, 146, 150][..]));
}

#[test]
fn test_bad_arguments_never_reach_the_server() {
    let (client, transport) = connect(&server());
    client.method_signature("add").unwrap();
    let before = transport.request_count();

    let err = client.call("add", &params![2, "x"]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));
    let err = client.call("add", &params![2]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));
    // int and double are distinct types
    let err = client.call("add", &params![2, 3.0]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));

    assert_eq!(transport.request_count(), before);
}

#[test]
fn test_unknown_method() {
    let (client, _) = connect(&server());
    let err = client.call("subtract", &params![5, 3]).unwrap_err();
    assert_eq!(err, RpcError::UnsupportedMethod("subtract".into()));
}

#[test]
fn test_signature_fetched_once() {
    let (client, transport) = connect(&server());
    // construction lists the methods
    assert_eq!(transport.request_count(), 1);

    client.call("add", &params![1, 1]).unwrap();
    assert_eq!(transport.request_count(), 3);
    client.call("add", &params![2, 2]).unwrap();
    client.call("add", &params![3, 3]).unwrap();
    assert_eq!(transport.request_count(), 5);
}

#[test]
fn test_builtin_signatures_are_local() {
    let (client, transport) = connect(&server());
    let before = transport.request_count();
    client.method_signature(LIST_METHODS).unwrap();
    client.method_signature(METHOD_SIGNATURE).unwrap();
    assert_eq!(transport.request_count(), before);
}

#[test]
fn test_application_fault() {
    let (client, _) = connect(&server());
    let err = client.call("withdraw", &params![500.0]).unwrap_err();
    assert_eq!(err, RpcError::Fault(Fault::new(4, "insufficient funds")));
}

#[test]
fn test_server_return_violation_is_bad_response() {
    let (client, _) = connect(&server());
    let err = client.call("broken", &params![]).unwrap_err();
    assert!(matches!(err, RpcError::BadResponse(_)));
}

#[test]
fn test_custom_path() {
    let mut builder = RpcServer::builder();
    builder.path("/xmlrpc");
    let server = builder.build();
    assert_ne!(server.path(), DEFAULT_RPC_PATH);
    let (client, _) = connect(&server);
    assert_eq!(client.list_methods().unwrap(), vec![LIST_METHODS, METHOD_SIGNATURE]);
}

#[test]
fn test_wrong_endpoint_is_tolerated_at_construction() {
    let server = server();
    let transport = LoopbackTransport::new(server.dispatcher().unwrap(), "/nowhere");
    let client = RpcClient::new(transport);
    assert!(client.known_methods().is_empty());
    assert!(!client.introspection_failed());
    // the 404 carries a fault body, but the status decides
    assert!(matches!(
        client.call("add", &params![1, 2]),
        Err(RpcError::BadResponse(msg)) if msg.contains("404")
    ));
}

#[test]
fn test_named_call() {
    let (client, transport) = connect(&server());
    assert_eq!(
        client.method_signature("greet").unwrap().to_string(),
        "{greeting = \"hello\", name: string}"
    );
    assert_eq!(
        client.call_named("greet", [("name", Value::from("ada"))]).unwrap(),
        Value::from("hello, ada")
    );
    assert_eq!(
        client
            .call_named("greet", [("name", Value::from("ada")), ("greeting", Value::from("hi"))])
            .unwrap(),
        Value::from("hi, ada")
    );

    let before = transport.request_count();
    let err = client.call_named("greet", [("greeting", Value::from("hi"))]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));
    let err = client.call("greet", &params!["ada"]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));
    assert_eq!(transport.request_count(), before);
}

#[test]
fn test_alternative_signatures() {
    let (client, transport) = connect(&server());
    assert_eq!(client.call("double", &params![21]).unwrap(), Value::Int(42));

    // the double alternative is accepted locally; its int return type is
    // then violated by the server, which reports it
    let err = client.call("double", &params![1.5]).unwrap_err();
    assert!(matches!(err, RpcError::BadResponse(_)));

    let before = transport.request_count();
    let err = client.call("double", &params!["x"]).unwrap_err();
    assert!(matches!(err, RpcError::BadRequest(_)));
    assert_eq!(transport.request_count(), before);
}

#[test]
fn test_non_finite_double_is_not_sent() {
    let (client, transport) = connect(&server());
    client.method_signature("withdraw").unwrap();
    let before = transport.request_count();
    for n in [f64::NAN, f64::INFINITY] {
        let err = client.call("withdraw", &params![n]).unwrap_err();
        assert!(matches!(err, RpcError::BadRequest(_)), "{err:?}");
    }
    assert_eq!(transport.request_count(), before);
}

/// A bare endpoint that answers `echo` and nothing else
fn server_without_introspection() -> Dispatcher {
    let mut table = HandlerTable::builder("EchoOnly");
    table.register(["POST"], DEFAULT_RPC_PATH, |req, res, _caps| {
        let call = decode_call(&req.body)?;
        let response = match (call.method_name.as_str(), call.params.as_slice()) {
            ("echo", [value]) => MethodResponse::Success(value.clone()),
            (name, _) => MethodResponse::Fault(Fault::new(Fault::METHOD_NOT_FOUND, name)),
        };
        res.set_body(XML_CONTENT_TYPE, encode_response(&response).into_bytes());
        Ok(())
    });
    Dispatcher::new(Router::new(table.build().unwrap())).with_error_format(Arc::new(FaultFormat))
}

#[test]
fn test_server_without_introspection() {
    let transport = Arc::new(LoopbackTransport::new(
        server_without_introspection(),
        DEFAULT_RPC_PATH,
    ));
    let client = RpcClient::new(Arc::clone(&transport));
    assert!(client.introspection_failed());
    assert!(client.known_methods().is_empty());
    assert_eq!(transport.request_count(), 1);

    assert_eq!(client.call("echo", &params!["hi"]).unwrap(), Value::from("hi"));
    assert_eq!(client.call("echo", &params![7]).unwrap(), Value::Int(7));
    // one round trip per call, no signature lookups
    assert_eq!(transport.request_count(), 3);

    let err = client.call("missing", &params![]).unwrap_err();
    assert_eq!(err, RpcError::UnsupportedMethod("missing".into()));
}

/// Answers every request with the same status and body
struct FixedTransport {
    status: u16,
    body: String,
}

impl Transport for FixedTransport {
    fn send(&self, _body: String) -> Result<TransportResponse, RpcError> {
        Ok(TransportResponse {
            status: self.status,
            body: self.body.clone().into_bytes(),
        })
    }

    fn endpoint(&self) -> String {
        format!("fixed:{}", self.status)
    }
}

fn fixed(status: u16, response: MethodResponse) -> RpcClient {
    RpcClient::new(FixedTransport {
        status,
        body: encode_response(&response),
    })
}

#[test]
fn test_http_status_decides_before_body() {
    let parse = Fault::new(Fault::PARSE_ERROR, "unclosed tag");
    let err = fixed(400, MethodResponse::Fault(parse)).list_methods().unwrap_err();
    assert_eq!(err, RpcError::MalformedRequest("unclosed tag".into()));

    let custom = Fault::new(4, "insufficient funds");
    let err = fixed(200, MethodResponse::Fault(custom.clone())).list_methods().unwrap_err();
    assert_eq!(err, RpcError::Fault(custom.clone()));

    for status in [400, 404, 500, 503] {
        let err = fixed(status, MethodResponse::Fault(custom.clone()))
            .list_methods()
            .unwrap_err();
        assert!(matches!(err, RpcError::BadResponse(_)), "{status}: {err:?}");
    }

    let err = fixed(500, MethodResponse::Success(Value::Array(vec![])))
        .list_methods()
        .unwrap_err();
    assert!(matches!(err, RpcError::BadResponse(_)));
}
