use super::{Dispatcher, ErrorFormat, Request, Response};
use crate::error::DispatchError;
use crate::ids::REQUEST_ID_HEADER;
use crate::router::{Captures, HandlerTable, Router};
use http::Method;
use std::sync::Arc;

fn sample_router() -> Router {
    let mut table = HandlerTable::builder("Sample");
    table.register(["GET"], "/hello/(?P<name>[^/]+)", |_req, res, caps| {
        res.set_text(format!("hello {}", caps.get("name").unwrap_or("?")));
        Ok(())
    });
    table.register(["POST"], "/echo", |req, res, _caps| {
        let body = req.body_text()?;
        res.set_text(body.to_owned());
        Ok(())
    });
    table.register(["GET"], "/missing", |_req, _res, _caps| {
        Err(DispatchError::ResourceNotFound("no such widget".into()))
    });
    table.register(["GET"], "/denied", |_req, _res, _caps| {
        Err(DispatchError::Forbidden("not yours".into()))
    });
    table.register(["GET"], "/boom", |_req, _res, _caps| {
        Err(DispatchError::Internal(anyhow::anyhow!("connection string postgres://secret")))
    });
    table.register(["GET"], "/panic", |_req, _res, _caps| -> Result<(), DispatchError> {
        panic!("handler exploded")
    });
    Router::new(table.build().unwrap())
}

#[test]
fn test_dispatch_passes_captures() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/hello/world"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "hello world");
}

#[test]
fn test_no_route_is_404() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/nope"));
    assert_eq!(res.status, 404);
    assert!(res.body_text().contains("/nope"));
}

#[test]
fn test_wrong_method_is_404() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::DELETE, "/echo"));
    assert_eq!(res.status, 404);
}

#[test]
fn test_domain_errors_map_to_status() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/missing"));
    assert_eq!(res.status, 404);
    assert!(res.body_text().contains("no such widget"));

    let res = dispatcher.dispatch(&Request::new(Method::GET, "/denied"));
    assert_eq!(res.status, 403);
}

#[test]
fn test_internal_error_does_not_leak() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/boom"));
    assert_eq!(res.status, 500);
    assert!(!res.body_text().contains("secret"));
}

#[test]
fn test_panicking_handler_is_500() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/panic"));
    assert_eq!(res.status, 500);
    assert!(!res.body_text().contains("exploded"));

    // the dispatcher keeps working afterwards
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/hello/again"));
    assert_eq!(res.status, 200);
}

#[test]
fn test_malformed_body_is_400() {
    let dispatcher = Dispatcher::new(sample_router());
    let req = Request::new(Method::POST, "/echo").with_body(vec![0xff, 0xfe, 0x00]);
    let res = dispatcher.dispatch(&req);
    assert_eq!(res.status, 400);
}

#[test]
fn test_default_headers_on_every_response() {
    let dispatcher = Dispatcher::new(sample_router());
    for path in ["/hello/x", "/nope", "/boom"] {
        let res = dispatcher.dispatch(&Request::new(Method::GET, path));
        assert_eq!(res.get_header("access-control-allow-origin"), Some("*"));
        assert!(res.get_header(REQUEST_ID_HEADER).is_some());
    }
}

#[test]
fn test_options_skips_handlers() {
    let dispatcher = Dispatcher::new(sample_router());
    let res = dispatcher.dispatch(&Request::new(Method::OPTIONS, "/panic"));
    assert_eq!(res.status, 200);
    assert!(res.body.is_empty());
    assert!(res.get_header("Access-Control-Allow-Methods").is_some());
}

#[test]
fn test_request_id_is_echoed() {
    let dispatcher = Dispatcher::new(sample_router());
    let req = Request::new(Method::GET, "/hello/x");
    let expected = req.request_id.to_string();
    let res = dispatcher.dispatch(&req);
    assert_eq!(res.get_header(REQUEST_ID_HEADER), Some(expected.as_str()));
}

#[test]
fn test_root_prefix_is_stripped() {
    let dispatcher = Dispatcher::new(sample_router()).with_root("/api/");
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/api/hello/root"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "hello root");

    // outside the root: matched unchanged
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/hello/bare"));
    assert_eq!(res.status, 200);
}

#[test]
fn test_default_header_override() {
    let dispatcher = Dispatcher::new(sample_router())
        .with_default_header("Access-Control-Allow-Origin", "https://example.com");
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/hello/x"));
    assert_eq!(
        res.get_header("Access-Control-Allow-Origin"),
        Some("https://example.com")
    );
    let count = res
        .headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("access-control-allow-origin"))
        .count();
    assert_eq!(count, 1);
}

struct Bracketed;

impl ErrorFormat for Bracketed {
    fn format_error(&self, err: &DispatchError, res: &mut Response) {
        res.set_text(format!("[{}]", err.status_code()));
    }
}

#[test]
fn test_custom_error_format() {
    let dispatcher = Dispatcher::new(sample_router()).with_error_format(Arc::new(Bracketed));
    let res = dispatcher.dispatch(&Request::new(Method::GET, "/nope"));
    assert_eq!(res.status, 404);
    assert_eq!(res.body_text(), "[404]");
}

#[test]
fn test_handler_sees_request_headers_and_query() {
    let mut table = HandlerTable::builder("Inspect");
    table.register(["GET"], "/inspect", |req: &Request, res: &mut Response, _: &Captures| {
        let agent = req.get_header("user-agent").unwrap_or("none");
        let page = req.get_query_param("page").unwrap_or("1");
        res.set_text(format!("{agent}:{page}"));
        Ok(())
    });
    let dispatcher = Dispatcher::new(Router::new(table.build().unwrap()));
    let mut req = Request::new(Method::GET, "/inspect").with_header("User-Agent", "probe");
    req.query_params = vec![("page".into(), "2".into()), ("page".into(), "3".into())];
    let res = dispatcher.dispatch(&req);
    assert_eq!(res.body_text(), "probe:3");
}

#[test]
fn test_lowercase_methods_dispatch() {
    let dispatcher = Dispatcher::new(sample_router());
    let get = Method::from_bytes(b"get").unwrap();
    let res = dispatcher.dispatch(&Request::new(get, "/hello/there"));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "hello there");

    let options = Method::from_bytes(b"options").unwrap();
    let res = dispatcher.dispatch(&Request::new(options, "/boom"));
    assert_eq!(res.status, 200);
    assert!(res.body.is_empty());
}
