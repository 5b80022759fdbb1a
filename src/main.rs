use anyhow::Result;
use clap::Parser;
use webguide::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    webguide::run(args).await
}
