//! # Router Module
//!
//! Declarative handler tables and the first-match-wins route search.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling `(HTTP method, path pattern) -> handler` declarations into
//!   immutable [`HandlerTable`]s at startup
//! - Searching tables in most-derived-first order
//! - Extracting named capture groups from the matched path
//!
//! ## Pattern Syntax
//!
//! Patterns are regular expressions and are always fully anchored. Named
//! groups (`(?P<name>...)`) become [`Captures`] passed to the handler; an
//! optional group that did not participate in the match is present with no
//! value. A pattern without a leading `/` is matched against the request path
//! with its leading `/` removed:
//!
//! ```rust,ignore
//! table.register(["GET"], "(?P<file_path>.*)", serve_file);
//! // GET /a/b.txt  ->  file_path = "a/b.txt"
//! ```
//!
//! ## Table Composition
//!
//! A server type owns one table. A type built on top of another derives the
//! parent's router, putting its own table first:
//!
//! ```rust,ignore
//! let base = Router::new(base_table);
//! let derived = base.derive(derived_table); // derived_table, then base_table
//! ```
//!
//! The first matching route wins. Registration order is the only priority;
//! there is no specificity scoring.
//!
//! ## Reverse Resolution
//!
//! A handler may carry a named URL template. [`Router::resolve`] fills it in,
//! searching tables in the same order as dispatch:
//!
//! ```rust,ignore
//! table.handler("article", show).methods(["GET"])
//!     .path(r"/article/(?P<id>\d+)")
//!     .reverse("Articles", "/article/{id}");
//! assert_eq!(router.resolve("Articles", &[("id", "21")])?, "/article/21");
//! ```

mod core;

pub use core::{
    CaptureVec, Captures, Handler, HandlerTable, HandlerTableBuilder, PendingHandler,
    ReverseTemplate, Route, RouteMatch, Router, MAX_INLINE_PARAMS,
};
