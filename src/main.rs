fn main() -> anyhow::Result<()> {
    rpcrouter::cli::run_cli()
}
