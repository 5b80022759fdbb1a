mod loop_impl;
mod prompt;

pub use loop_impl::{AgentAnswer, AgentConfig, AgentProgressEvent, run_question_with_events};
pub use prompt::AGENT_SYSTEM_PROMPT;
