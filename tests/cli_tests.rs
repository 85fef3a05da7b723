mod common;

use common::test_server::RpcTestServer;
use std::process::Command;

fn rpcrouter() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rpcrouter"));
    cmd.env("RPCR_LOG_LEVEL", "error").env_remove("RPCR_CONFIG");
    cmd
}

#[test]
fn test_cli_routes() {
    let output = rpcrouter().arg("routes").output().expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[RpcServer] POST /RPC2 -> rpc_endpoint"), "{stdout}");
}

#[test]
fn test_cli_call_and_list() {
    let server = rpcrouter::cli::demo_server().unwrap();
    let fixture = RpcTestServer::start(&server);
    let port = fixture.addr().port().to_string();

    let output = rpcrouter()
        .args(["call", "subtract", "-5", "3", "--host", "127.0.0.1", "--port", &port])
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "-8");

    let output = rpcrouter()
        .args(["list", "--host", "127.0.0.1", "--port", &port])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("add [int, int, int]"), "{stdout}");
    assert!(stdout.contains("now [dateTime.iso8601]"), "{stdout}");
    assert!(stdout.contains("pow {base: int, exponent = 2}"), "{stdout}");

    let output = rpcrouter()
        .args(["call", "pow", "base=3", "exponent=4", "--host", "127.0.0.1", "--port", &port])
        .output()
        .expect("run cli");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "81");
}

#[test]
fn test_cli_call_rejects_bad_argument() {
    let server = rpcrouter::cli::demo_server().unwrap();
    let fixture = RpcTestServer::start(&server);
    let port = fixture.addr().port().to_string();

    let output = rpcrouter()
        .args(["call", "add", "2", "two", "--host", "127.0.0.1", "--port", &port])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not an int"));
}
