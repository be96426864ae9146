use clap::Parser;
use mcp_bridge::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mcp_bridge::init_tracing(&cli.log_level, cli.log_json);
    mcp_bridge::run(cli).await?;
    Ok(())
}
