use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "webguide",
    about = "Website guide demo: site API, Gemini-backed agent, and chat client"
)]
pub struct CliArgs {
    /// Path to the config file (defaults to $XDG_CONFIG_HOME/webguide/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the website details API server
    Serve {
        /// Directory holding the website JSON documents
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
    /// Start an interactive chat (local agent, or remote when --agent-url is given)
    Chat {
        /// Base URL of a remote agent API to talk to instead of the local agent
        #[arg(long)]
        agent_url: Option<String>,
    },
    /// Ask the local agent a single question and print the answer
    Ask {
        /// The question to ask
        question: String,
    },
}
