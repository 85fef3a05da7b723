//! # CLI Module
//!
//! Command-line interface for running a demo XML-RPC server and talking to
//! any XML-RPC endpoint.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Serve the demo method set (`add`, `subtract`, `concat`, `now`):
//!
//! ```bash
//! rpcrouter serve --config rpcrouter.yaml --port 8080
//! ```
//!
//! ### `list`
//!
//! Print the methods a server offers, with their signatures:
//!
//! ```bash
//! rpcrouter list --host localhost --port 8080
//! ```
//!
//! ### `call`
//!
//! Call a method. Arguments are converted to the types the server declares
//! for the method (`int`, `double`, `boolean`, `string`, `base64`,
//! `dateTime.iso8601`):
//!
//! ```bash
//! rpcrouter call add 2 3 --port 8080
//! ```
//!
//! ### `routes`
//!
//! Print the demo server's route table without starting it.
//!
//! ## Logging
//!
//! `RPCR_LOG_LEVEL` and `RPCR_LOG_FORMAT` control output (see
//! [`crate::logging`]).

mod commands;

pub use commands::{demo_server, parse_arg, parse_args, run_cli, Cli, Commands, ConnectArgs};
