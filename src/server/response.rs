use crate::dispatcher::Response;
use crate::ids::REQUEST_ID_HEADER;
use dashmap::DashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Upper bound on distinct header lines kept for the writer
const MAX_INTERNED_HEADERS: usize = 1024;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        418 => "I'm a teapot",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// `may_minihttp` only accepts `&'static str` header lines.
///
/// Lines are leaked once and reused. Headers are drawn from a small fixed
/// set (CORS defaults, content types); past `capacity` distinct lines new
/// ones are dropped with a warning instead of growing the leak.
struct HeaderLines {
    lines: DashMap<String, &'static str>,
    capacity: usize,
}

impl HeaderLines {
    fn new(capacity: usize) -> Self {
        Self {
            lines: DashMap::new(),
            capacity,
        }
    }

    fn intern(&self, name: &str, value: &str) -> Option<&'static str> {
        let line = format!("{name}: {value}");
        if let Some(existing) = self.lines.get(&line) {
            return Some(*existing);
        }
        if self.lines.len() >= self.capacity {
            warn!(
                header = %name,
                capacity = self.capacity,
                "Header line table full, header not written"
            );
            return None;
        }
        let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
        self.lines.insert(line, leaked);
        Some(leaked)
    }
}

fn intern_header_line(name: &str, value: &str) -> Option<&'static str> {
    static LINES: OnceLock<HeaderLines> = OnceLock::new();
    LINES
        .get_or_init(|| HeaderLines::new(MAX_INTERNED_HEADERS))
        .intern(name, value)
}

/// Header lines to put on the wire for `response`
///
/// The per-request `x-request-id` header is left out: every line passed to
/// `may_minihttp` must live for the whole process. The id is in the logs.
fn header_lines(response: &Response) -> Vec<&'static str> {
    response
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(REQUEST_ID_HEADER))
        .filter_map(|(name, value)| intern_header_line(name, value))
        .collect()
}

/// Write a dispatcher [`Response`] onto the wire
pub fn write_response(res: &mut may_minihttp::Response, response: Response) {
    res.status_code(usize::from(response.status), status_reason(response.status));
    for line in header_lines(&response) {
        res.header(line);
    }
    res.body_vec(response.body);
}
