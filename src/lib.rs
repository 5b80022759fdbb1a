pub mod agent;
pub mod chat;
pub mod cli;
pub mod config;
pub mod llm;
pub mod redact;
pub mod site;
pub mod tools;

use anyhow::{Context, Result};
use cli::{CliArgs, Command};
use config::AppConfig;
use site::data::WebsiteData;
use tracing_subscriber::EnvFilter;

pub async fn run(args: CliArgs) -> Result<()> {
    init_tracing();

    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { data } => {
            let website_data = WebsiteData::load(&data)
                .with_context(|| format!("Failed to load website data from {}", data.display()))?;
            let addr = config.server.bind_addr()?;
            site::server::serve(addr, website_data).await
        }
        Command::Chat { agent_url } => match agent_url {
            Some(url) => cli::run_remote_repl(&url).await,
            None => cli::run_local_repl(&config).await,
        },
        Command::Ask { question } => cli::ask_once(&config, &question).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}
