mod cli;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

use cilens_sync::ProviderRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting cilens-sync");

    let registry = ProviderRegistry::with_builtin_providers();
    cli.execute(&registry).await?;

    Ok(())
}
