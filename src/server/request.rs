use crate::dispatcher::{HeaderVec, Request};
use crate::error::DispatchError;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use http::Method;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter
/// names and values. Repeated names are kept in order of appearance.
///
/// # Arguments
///
/// * `path` - The full URL path (e.g., `/users?limit=10&offset=20`)
#[must_use]
pub fn parse_query_params(path: &str) -> Vec<(String, String)> {
    match path.split_once('?') {
        Some((_, query_str)) => url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => Vec::new(),
    }
}

/// Parse a request-line method, upper-cased so `get` and `GET` are one method
///
/// # Errors
///
/// `MalformedRequest` when the name is not a valid HTTP token.
pub fn parse_method(raw: &str) -> Result<Method, DispatchError> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| DispatchError::MalformedRequest(format!("invalid method '{raw}'")))
}

/// Convert a `may_minihttp::Request` into a dispatcher [`Request`]
///
/// # Errors
///
/// `MalformedRequest` when the method is not a valid HTTP token or the body
/// cannot be read.
pub fn parse_request(req: may_minihttp::Request) -> Result<Request, DispatchError> {
    let method = parse_method(req.method())?;
    let raw_path = req.path().to_string();
    let path = raw_path.split('?').next().unwrap_or("/").to_string();

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                Arc::from(h.name.to_ascii_lowercase()),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();
    let request_id = RequestId::from_header_or_new(
        headers
            .iter()
            .find(|(k, _)| k.as_ref() == REQUEST_ID_HEADER)
            .map(|(_, v)| v.as_str()),
    );
    debug!(
        request_id = %request_id,
        header_count = headers.len(),
        "Headers extracted"
    );

    let query_params = parse_query_params(&raw_path);

    let mut body = Vec::new();
    req.body()
        .read_to_end(&mut body)
        .map_err(|e| DispatchError::MalformedRequest(format!("failed to read body: {e}")))?;

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        query_param_count = query_params.len(),
        body_size_bytes = body.len(),
        "HTTP request parsed"
    );

    Ok(Request {
        request_id,
        method,
        path,
        query_params,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=hello%20world&x=3");
        assert_eq!(
            q,
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "hello world".to_string()),
                ("x".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_method_is_upper_cased() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method("Get").unwrap(), Method::GET);
        assert_eq!(parse_method("purge").unwrap().as_str(), "PURGE");
        assert!(matches!(
            parse_method("BAD METHOD"),
            Err(DispatchError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_no_query_string() {
        assert!(parse_query_params("/RPC2").is_empty());
    }
}
