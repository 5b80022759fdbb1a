mod args;
mod repl;

pub use args::{CliArgs, Command};
pub use repl::{ask_once, run_local_repl, run_remote_repl};
