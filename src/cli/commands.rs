use crate::config::{AppConfig, ClientConfig, RuntimeConfig};
use crate::error::RpcError;
use crate::logging;
use crate::rpc::{
    Fault, MethodSignature, NamedSignature, RpcClient, RpcMethod, RpcServer, TypeTag, Value,
    DATETIME_FORMAT,
};
use std::collections::BTreeMap;
use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Command-line interface for rpcrouter
#[derive(Parser)]
#[command(name = "rpcrouter")]
#[command(about = "XML-RPC server and client", version, long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Where to find the server
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Configuration file (YAML); its `client:` section is used
    #[arg(short, long, env = "RPCR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Endpoint path (default /RPC2)
    #[arg(long)]
    pub path: Option<String>,

    /// Use https
    #[arg(long, default_value_t = false)]
    pub secure: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the demo methods over HTTP
    Serve {
        /// Configuration file (YAML); its `server:` section is used
        #[arg(short, long, env = "RPCR_CONFIG")]
        config: Option<PathBuf>,

        /// Bind host (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List the methods a server offers
    List {
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Call a remote method
    Call {
        /// Method name, e.g. `add` or `system.methodSignature`
        method: String,

        /// Arguments, converted to the types the method declares
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Print the demo server's routes
    Routes,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }
}

fn client_config(connect: &ConnectArgs) -> anyhow::Result<ClientConfig> {
    let mut config = load_config(connect.config.as_deref())?.client;
    if let Some(host) = &connect.host {
        config.host.clone_from(host);
    }
    if connect.port.is_some() {
        config.port = connect.port;
    }
    if let Some(path) = &connect.path {
        config.path.clone_from(path);
    }
    if connect.secure {
        config.secure = true;
    }
    Ok(config)
}

fn int_arg(args: &[Value], index: usize) -> i64 {
    args.get(index).and_then(Value::as_i64).unwrap_or_default()
}

fn overflow(op: &str) -> RpcError {
    RpcError::Fault(Fault::new(
        Fault::APPLICATION_ERROR,
        format!("integer overflow in {op}"),
    ))
}

/// The method set served by `rpcrouter serve`
///
/// # Errors
///
/// Only on a registration conflict, which would be a bug in this function.
pub fn demo_server() -> Result<RpcServer, RpcError> {
    let mut builder = RpcServer::builder();
    builder
        .register(
            RpcMethod::new("add", |args| {
                int_arg(args, 0)
                    .checked_add(int_arg(args, 1))
                    .map(Value::Int)
                    .ok_or_else(|| overflow("add"))
            })
            .sign_request([TypeTag::Int, TypeTag::Int])
            .sign_response(TypeTag::Int)
            .help("Add two integers"),
        )?
        .register(
            RpcMethod::new("subtract", |args| {
                int_arg(args, 0)
                    .checked_sub(int_arg(args, 1))
                    .map(Value::Int)
                    .ok_or_else(|| overflow("subtract"))
            })
            .sign_request([TypeTag::Int, TypeTag::Int])
            .sign_response(TypeTag::Int)
            .help("Subtract the second integer from the first"),
        )?
        .register(
            RpcMethod::new("concat", |args| {
                let joined: String = args.iter().filter_map(Value::as_str).collect();
                Ok(Value::String(joined))
            })
            .sign_request([TypeTag::String, TypeTag::String])
            .sign_response(TypeTag::String)
            .help("Concatenate two strings"),
        )?
        .register(
            RpcMethod::new("now", |_| Ok(Value::DateTime(chrono::Utc::now().naive_utc())))
                .sign_response(TypeTag::DateTime)
                .help("Current server time (UTC)"),
        )?
        .register(
            RpcMethod::new("pow", |args| {
                let members = args.first().and_then(Value::as_struct);
                let member = |name: &str| members.and_then(|m| m.get(name)).and_then(Value::as_i64);
                let base = member("base").unwrap_or_default();
                let exponent = u32::try_from(member("exponent").unwrap_or_default())
                    .map_err(|_| RpcError::BadRequest("pow exponent must not be negative".into()))?;
                base.checked_pow(exponent).map(Value::Int).ok_or_else(|| overflow("pow"))
            })
            .sign_named_request(
                NamedSignature::new()
                    .required("base", TypeTag::Int)
                    .optional("exponent", 2),
            )
            .sign_response(TypeTag::Int)
            .help("Raise base to exponent (default 2)"),
        )?;
    Ok(builder.build())
}

/// Convert a command-line argument to a value of type `tag`
///
/// # Errors
///
/// Fails when `raw` is not a valid literal for `tag`, or `tag` is a
/// container type.
pub fn parse_arg(raw: &str, tag: TypeTag) -> anyhow::Result<Value> {
    let value = match tag {
        TypeTag::Int => Value::Int(raw.parse().with_context(|| format!("'{raw}' is not an int"))?),
        TypeTag::Double => {
            Value::Double(raw.parse().with_context(|| format!("'{raw}' is not a double"))?)
        }
        TypeTag::Boolean => match raw {
            "1" | "true" => Value::Boolean(true),
            "0" | "false" => Value::Boolean(false),
            _ => bail!("'{raw}' is not a boolean"),
        },
        TypeTag::String => Value::String(raw.to_owned()),
        TypeTag::Base64 => Value::Base64(
            STANDARD
                .decode(raw)
                .with_context(|| format!("'{raw}' is not base64"))?,
        ),
        TypeTag::DateTime => Value::DateTime(
            NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
                .with_context(|| format!("'{raw}' is not {DATETIME_FORMAT}"))?,
        ),
        TypeTag::Array | TypeTag::Struct => bail!("{tag} arguments cannot be given on the command line"),
    };
    Ok(value)
}

/// Convert command-line arguments for `method` using its signature
///
/// Positional methods take one argument per parameter of the first
/// alternative with a matching count. Named methods take `name=value` pairs.
///
/// # Errors
///
/// Fails on a count mismatch, an unknown or malformed member, or any
/// [`parse_arg`] failure.
pub fn parse_args(
    method: &str,
    signature: &MethodSignature,
    raw_args: &[String],
) -> anyhow::Result<Vec<Value>> {
    match signature {
        MethodSignature::Positional(alternatives) => {
            let Some(chosen) = alternatives.iter().find(|s| s.params.len() == raw_args.len()) else {
                bail!("{method} {signature} does not take {} argument(s)", raw_args.len());
            };
            raw_args
                .iter()
                .zip(&chosen.params)
                .map(|(raw, tag)| parse_arg(raw, *tag))
                .collect()
        }
        MethodSignature::Named(named) => {
            let mut members = BTreeMap::new();
            for raw in raw_args {
                let Some((name, value)) = raw.split_once('=') else {
                    bail!("{method} takes name=value arguments, got '{raw}'");
                };
                let Some(param) = named.get(name) else {
                    bail!("{method} {signature} has no member '{name}'");
                };
                members.insert(name.to_owned(), parse_arg(value, param.type_tag())?);
            }
            Ok(vec![Value::Struct(members)])
        }
    }
}

fn serve(config: Option<&Path>, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    RuntimeConfig::from_env().apply();
    let mut config = load_config(config)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let server = demo_server()?;
    info!(methods = ?server.method_names(), "Serving demo methods");
    server.serve(&config.server)
}

fn list(connect: &ConnectArgs) -> anyhow::Result<()> {
    let client = RpcClient::connect(&client_config(connect)?)?;
    for name in client.list_methods()? {
        match client.method_signature(&name) {
            Ok(signature) => println!("{name} {signature}"),
            Err(err) => {
                warn!(method = %name, error = %err, "Signature unavailable");
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn call(method: &str, raw_args: &[String], connect: &ConnectArgs) -> anyhow::Result<()> {
    let client = RpcClient::connect(&client_config(connect)?)?;
    let signature = client.method_signature(method)?;
    let args = parse_args(method, &signature, raw_args)?;
    let result = client.call(method, &args)?;
    println!("{result}");
    Ok(())
}

/// Parse the command line and run the selected command
///
/// # Errors
///
/// Any failure of the selected command.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(err) = logging::init_from_env() {
        eprintln!("Warning: {err:#}");
    }
    match cli.command {
        Commands::Serve { config, host, port } => serve(config.as_deref(), host, port),
        Commands::List { connect } => list(&connect),
        Commands::Call {
            method,
            args,
            connect,
        } => call(&method, &args, &connect),
        Commands::Routes => {
            for line in demo_server()?.router()?.describe_routes() {
                println!("{line}");
            }
            Ok(())
        }
    }
}
