//! Router core module - hot path for request routing.
//!
//! # JSF Compliance (Rule 206)
//!
//! Route tables are compiled once at startup. Matching borrows the compiled
//! tables and only allocates for captured parameter values.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::dispatcher::{Request, Response};
use crate::error::{ConfigError, DispatchError};
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of captured path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated capture storage for the hot path.
///
/// Names are `Arc<str>` shared with the compiled route; values are per-request.
/// A `None` value is an optional group that did not participate in the match.
pub type CaptureVec = SmallVec<[(Arc<str>, Option<String>); MAX_INLINE_PARAMS]>;

/// Handler signature: `(request, response, captures)`.
///
/// Handlers mutate the response in place and report domain failures through
/// [`DispatchError`].
pub type Handler =
    Arc<dyn Fn(&Request, &mut Response, &Captures) -> Result<(), DispatchError> + Send + Sync>;

/// Named capture groups extracted from a matched path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    params: CaptureVec,
}

impl Captures {
    /// Value of a named group, `None` when the group is unknown or did not match
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Whether the pattern declares a group with this name (matched or not)
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|(k, _)| k.as_ref() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params.iter().map(|(k, v)| (k.as_ref(), v.as_deref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Convert to a HashMap. Allocates; prefer [`Captures::get`] in handlers.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, Option<String>> {
        self.params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// One (method, path pattern, handler) binding
pub struct Route {
    method: Method,
    pattern: String,
    regex: Regex,
    /// Pattern has no leading `/` and is matched against the path without it
    relative: bool,
    group_names: Vec<Arc<str>>,
    handler_name: Arc<str>,
    handler: Handler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

impl Route {
    fn compile(
        method: Method,
        pattern: &str,
        handler_name: Arc<str>,
        handler: Handler,
    ) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            ConfigError::InvalidPattern {
                handler: handler_name.to_string(),
                pattern: pattern.to_string(),
                source,
            }
        })?;
        let group_names = regex.capture_names().flatten().map(Arc::from).collect();
        let relative = !pattern.trim_start_matches('^').starts_with('/');
        Ok(Self {
            method,
            pattern: pattern.to_string(),
            regex,
            relative,
            group_names,
            handler_name,
            handler,
        })
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Full-match the path against this route's pattern
    ///
    /// The method comparison is done by the caller; this only looks at the path.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Captures> {
        let subject = if self.relative {
            path.strip_prefix('/').unwrap_or(path)
        } else {
            path
        };
        let caps = self.regex.captures(subject)?;
        let params = self
            .group_names
            .iter()
            .map(|name| {
                let value = caps.name(name).map(|m| decode_capture(m.as_str()));
                (Arc::clone(name), value)
            })
            .collect();
        Some(Captures { params })
    }
}

fn decode_capture(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_owned(),
    }
}

fn parse_method(name: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(name.to_ascii_uppercase().as_bytes())
        .map_err(|_| ConfigError::InvalidMethod(name.to_owned()))
}

enum TemplatePart {
    Literal(String),
    Field(String),
}

/// A named URL template attached to a handler with [`PendingHandler::reverse`]
///
/// `{field}` placeholders are filled from keyword arguments; `{{` and `}}`
/// are literal braces.
pub struct ReverseTemplate {
    name: String,
    template: String,
    parts: Vec<TemplatePart>,
}

impl std::fmt::Debug for ReverseTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseTemplate")
            .field("name", &self.name)
            .field("template", &self.template)
            .finish()
    }
}

impl ReverseTemplate {
    fn compile(handler: &str, name: &str, template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTemplate {
            handler: handler.to_owned(),
            template: template.to_owned(),
            reason: reason.to_owned(),
        };
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unclosed '{'")),
                            Some(c) => field.push(c),
                        }
                    }
                    if field.is_empty() {
                        return Err(invalid("empty field name"));
                    }
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(TemplatePart::Field(field));
                }
                '}' => return Err(invalid("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }
        Ok(Self {
            name: name.to_owned(),
            template: template.to_owned(),
            parts,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fill the template and normalise the result
    ///
    /// Fields missing from `args` become empty, values are percent-encoded
    /// (slashes kept), runs of `/` collapse to one and a trailing `/` is
    /// dropped. An empty result is `/`.
    #[must_use]
    pub fn format(&self, args: &[(&str, &str)]) -> String {
        let mut url = String::with_capacity(self.template.len());
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => url.push_str(text),
                TemplatePart::Field(field) => {
                    let value = args
                        .iter()
                        .rev()
                        .find(|(k, _)| *k == field.as_str())
                        .map_or("", |(_, v)| *v);
                    url.push_str(&urlencoding::encode(value).replace("%2F", "/"));
                }
            }
        }
        while url.contains("//") {
            url = url.replace("//", "/");
        }
        let trimmed = url.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_owned()
        } else {
            trimmed.to_owned()
        }
    }
}

/// An ordered, immutable collection of routes owned by one server type
#[derive(Debug)]
pub struct HandlerTable {
    name: String,
    routes: Vec<Route>,
    reverses: Vec<ReverseTemplate>,
}

impl HandlerTable {
    /// Start declaring a table
    pub fn builder(name: impl Into<String>) -> HandlerTableBuilder {
        HandlerTableBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route (in registration order) accepting `method` and `path`
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Route, Captures)> {
        for route in &self.routes {
            let Some(captures) = route.match_path(path) else {
                continue;
            };
            if route.method.as_str().eq_ignore_ascii_case(method.as_str()) {
                return Some((route, captures));
            }
            debug!(
                table = %self.name,
                handler_name = %route.handler_name,
                path = %path,
                method = %method,
                "Handler matched on path but not method"
            );
        }
        None
    }

    /// Named URL templates, in declaration order
    #[must_use]
    pub fn reverses(&self) -> &[ReverseTemplate] {
        &self.reverses
    }

    /// Build the URL registered under `name`; the first declaration wins
    #[must_use]
    pub fn resolve(&self, name: &str, args: &[(&str, &str)]) -> Option<String> {
        self.reverses
            .iter()
            .find(|reverse| reverse.name == name)
            .map(|reverse| reverse.format(args))
    }
}

struct PendingEntry {
    name: Arc<str>,
    handler: Handler,
    pattern: Option<String>,
    methods: Vec<String>,
    reverse: Option<(String, String)>,
}

/// Accumulates route declarations and compiles them into a [`HandlerTable`]
///
/// Two declaration styles are supported and may be mixed:
///
/// ```rust,ignore
/// let mut table = HandlerTable::builder("FileServer");
///
/// // One call: methods, pattern, handler
/// table.register(["GET", "HEAD"], "(?P<file_path>.*)", serve_file);
///
/// // Incremental: path and methods attached in either order
/// table.handler("upload", upload).methods(["PUT"]).path("/upload/(?P<name>[^/]+)");
///
/// // Named URL, built later with `Router::resolve("Upload", &[("name", "a.txt")])`
/// table
///     .handler("show_upload", show)
///     .methods(["GET"])
///     .path("/upload/(?P<name>[^/]+)")
///     .reverse("Upload", "/upload/{name}");
///
/// let table = table.build()?;
/// ```
pub struct HandlerTableBuilder {
    name: String,
    entries: Vec<PendingEntry>,
}

impl HandlerTableBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Register `handler` for every method in `methods` on `pattern`
    pub fn register<M, S, F>(&mut self, methods: M, pattern: &str, handler: F) -> &mut Self
    where
        M: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Request, &mut Response, &Captures) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    {
        let methods: Vec<String> = methods
            .into_iter()
            .map(|m| m.as_ref().to_ascii_uppercase())
            .collect();
        let name = format!("{} {}", methods.join(","), pattern);
        self.entries.push(PendingEntry {
            name: Arc::from(name),
            handler: Arc::new(handler),
            pattern: Some(pattern.to_owned()),
            methods,
            reverse: None,
        });
        self
    }

    /// Declare a named handler; attach its path and methods on the returned entry
    pub fn handler<F>(&mut self, name: &str, handler: F) -> PendingHandler<'_>
    where
        F: Fn(&Request, &mut Response, &Captures) -> Result<(), DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(PendingEntry {
            name: Arc::from(name),
            handler: Arc::new(handler),
            pattern: None,
            methods: Vec::new(),
            reverse: None,
        });
        let idx = self.entries.len() - 1;
        PendingHandler {
            entry: &mut self.entries[idx],
        }
    }

    /// Compile every declaration, in order, into an immutable table
    ///
    /// # Errors
    ///
    /// Fails on the first handler missing a path or methods, on an invalid
    /// HTTP method name, on a pattern that does not compile, or on a
    /// malformed reverse template.
    pub fn build(self) -> Result<HandlerTable, ConfigError> {
        let mut routes = Vec::with_capacity(self.entries.len());
        let mut reverses = Vec::new();
        for entry in self.entries {
            if let Some((name, template)) = &entry.reverse {
                reverses.push(ReverseTemplate::compile(&entry.name, name, template)?);
            }
            let pattern = entry.pattern.ok_or_else(|| ConfigError::MissingPath {
                table: self.name.clone(),
                handler: entry.name.to_string(),
            })?;
            if entry.methods.is_empty() {
                return Err(ConfigError::MissingMethods {
                    table: self.name.clone(),
                    handler: entry.name.to_string(),
                });
            }
            for method in &entry.methods {
                routes.push(Route::compile(
                    parse_method(method)?,
                    &pattern,
                    Arc::clone(&entry.name),
                    Arc::clone(&entry.handler),
                )?);
            }
        }
        info!(
            table = %self.name,
            routes_count = routes.len(),
            reverses_count = reverses.len(),
            "Handler table compiled"
        );
        Ok(HandlerTable {
            name: self.name,
            routes,
            reverses,
        })
    }
}

/// A handler declared through [`HandlerTableBuilder::handler`]
pub struct PendingHandler<'a> {
    entry: &'a mut PendingEntry,
}

impl PendingHandler<'_> {
    /// Attach (or replace) the path pattern
    pub fn path(self, pattern: &str) -> Self {
        self.entry.pattern = Some(pattern.to_owned());
        self
    }

    /// Attach (or replace) the HTTP methods
    pub fn methods<M, S>(self, methods: M) -> Self
    where
        M: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entry.methods = methods
            .into_iter()
            .map(|m| m.as_ref().to_ascii_uppercase())
            .collect();
        self
    }

    /// Name this handler's URL for [`Router::resolve`]
    ///
    /// `template` uses `{field}` placeholders, e.g. `/article/{id}`.
    pub fn reverse(self, name: &str, template: &str) -> Self {
        self.entry.reverse = Some((name.to_owned(), template.to_owned()));
        self
    }
}

/// Result of successfully matching a request to a route
#[derive(Debug)]
pub struct RouteMatch<'a> {
    /// Name of the table the route was found in
    pub table: &'a str,
    pub route: &'a Route,
    pub captures: Captures,
}

/// Searches an ordered list of handler tables, most-derived first
///
/// Deriving never mutates the parent's tables: [`Router::derive`] returns a new
/// router that shares them behind `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct Router {
    tables: Vec<Arc<HandlerTable>>,
}

impl Router {
    #[must_use]
    pub fn new(table: HandlerTable) -> Self {
        Self {
            tables: vec![Arc::new(table)],
        }
    }

    /// Build from tables already in search order
    #[must_use]
    pub fn from_tables(tables: Vec<Arc<HandlerTable>>) -> Self {
        Self { tables }
    }

    /// A router whose `table` is searched before every table of `self`
    #[must_use]
    pub fn derive(&self, table: HandlerTable) -> Self {
        let mut tables = Vec::with_capacity(self.tables.len() + 1);
        tables.push(Arc::new(table));
        tables.extend(self.tables.iter().map(Arc::clone));
        Self { tables }
    }

    #[must_use]
    pub fn tables(&self) -> &[Arc<HandlerTable>] {
        &self.tables
    }

    /// One line per route, in search order
    #[must_use]
    pub fn describe_routes(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|table| {
                table.routes.iter().map(move |route| {
                    format!(
                        "[{}] {} {} -> {}",
                        table.name, route.method, route.pattern, route.handler_name
                    )
                })
            })
            .collect()
    }

    /// Build the URL named `name` from the first table that declares it
    ///
    /// # Errors
    ///
    /// [`DispatchError::ResourceNotFound`] listing the tables searched when
    /// no table declares the name.
    pub fn resolve(&self, name: &str, args: &[(&str, &str)]) -> Result<String, DispatchError> {
        for table in &self.tables {
            if let Some(url) = table.resolve(name, args) {
                debug!(table = %table.name, reverse_name = %name, url = %url, "URL resolved");
                return Ok(url);
            }
        }
        let tried = self
            .tables
            .iter()
            .map(|table| table.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(DispatchError::ResourceNotFound(format!(
            "no view with name {name} (tried {tried})"
        )))
    }

    /// Find the first route matching `method` and `path`
    ///
    /// First match wins: there is no specificity ranking.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        debug!(method = %method, path = %path, tables = self.tables.len(), "Route match attempt");
        let match_start = Instant::now();

        for table in &self.tables {
            if let Some((route, captures)) = table.find(method, path) {
                let match_duration = match_start.elapsed();
                if match_duration > Duration::from_millis(1) {
                    warn!(
                        method = %method,
                        path = %path,
                        table = %table.name,
                        handler_name = %route.handler_name,
                        duration_us = match_duration.as_micros(),
                        "Slow route matching detected"
                    );
                } else {
                    debug!(
                        method = %method,
                        path = %path,
                        table = %table.name,
                        handler_name = %route.handler_name,
                        route_pattern = %route.pattern,
                        duration_us = match_duration.as_micros(),
                        "Route matched"
                    );
                }
                return Some(RouteMatch {
                    table: &table.name,
                    route,
                    captures,
                });
            }
        }

        warn!(
            method = %method,
            path = %path,
            duration_us = match_start.elapsed().as_micros(),
            "No route matched"
        );
        None
    }
}
