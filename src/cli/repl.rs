use crate::agent::{AgentConfig, AgentProgressEvent, run_question_with_events};
use crate::chat::{AgentApiClient, ChatError, ReplySummary};
use crate::config::AppConfig;
use crate::llm::gemini::GeminiProvider;
use crate::llm::provider::LlmError;
use crate::tools::WebsiteApiClient;
use anyhow::{Context, Result, anyhow};
use std::io::{BufRead, Write};
use tokio::task::spawn_blocking;

const APP_NAME: &str = "webguide";
const DEFAULT_USER_ID: &str = "local-user";

/// Interactive loop against the in-process agent.
pub async fn run_local_repl(config: &AppConfig) -> Result<()> {
    let (provider, tools_client) = build_local_agent(config)?;
    let agent_config = AgentConfig::default();

    println!("Chatting with the local agent. Type 'exit' or 'quit' to leave.");
    loop {
        let Some(line) = read_line("you> ").await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match run_question_with_events(
            &provider,
            &tools_client,
            question,
            &agent_config,
            &mut print_progress,
        )
        .await
        {
            Ok(answer) => {
                if answer.degraded {
                    println!("assistant (degraded)> {}", answer.text);
                } else {
                    println!("assistant> {}", answer.text);
                }
            }
            Err(err) => println!("Assistant unavailable: {err:#}"),
        }
    }

    println!("Bye!");
    Ok(())
}

/// Interactive loop against a remote agent API, with per-transport fallback
/// handled by the client.
pub async fn run_remote_repl(agent_url: &str) -> Result<()> {
    let http = reqwest::Client::new();
    let client = AgentApiClient::new(http, agent_url, APP_NAME);

    match client.health_check().await {
        Ok(true) => println!("Agent at {agent_url} is up."),
        Ok(false) => println!("Agent at {agent_url} answered the health check with an error."),
        Err(err) => println!("Could not reach the agent health endpoint: {err}"),
    }

    let session_id = match client.create_session(DEFAULT_USER_ID).await {
        Ok(id) => Some(id),
        Err(err) => {
            println!("Proceeding without a session ({err}).");
            None
        }
    };

    println!("Chatting with {agent_url}. Type 'exit' or 'quit' to leave.");
    loop {
        let Some(line) = read_line("you> ").await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        match client
            .send_message(message, DEFAULT_USER_ID, session_id.as_deref())
            .await
        {
            Ok(summary) => print_summary(&summary),
            Err(ChatError::AllTransportsFailed { attempts }) => {
                println!("Assistant unavailable: every transport failed.");
                for (path, error) in attempts {
                    println!("  {path}: {error}");
                }
            }
            Err(err) => println!("Assistant unavailable: {err}"),
        }
    }

    println!("Bye!");
    Ok(())
}

/// One-shot question against the in-process agent.
pub async fn ask_once(config: &AppConfig, question: &str) -> Result<()> {
    let (provider, tools_client) = build_local_agent(config)?;
    let answer = run_question_with_events(
        &provider,
        &tools_client,
        question,
        &AgentConfig::default(),
        &mut print_progress,
    )
    .await?;

    if answer.degraded {
        println!("(degraded answer)");
    }
    println!("{}", answer.text);
    Ok(())
}

fn build_local_agent(config: &AppConfig) -> Result<(GeminiProvider, WebsiteApiClient)> {
    let http = reqwest::Client::new();
    let provider = GeminiProvider::new(
        http.clone(),
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    )
    .map_err(|err| match err {
        LlmError::MissingApiKey => anyhow!(
            "Missing Gemini API key. Set GEMINI_API_KEY or add gemini_api_key to the config file."
        ),
        other => anyhow!(other),
    })?;
    let tools_client = WebsiteApiClient::new(http, &config.website_api_url);
    Ok((provider, tools_client))
}

fn print_progress(event: AgentProgressEvent) {
    match event {
        AgentProgressEvent::ToolRequest { name, .. } => {
            println!("  [calling {name}]");
        }
        AgentProgressEvent::ToolResult {
            name,
            response_json,
            ..
        } => {
            if response_json["ok"] == serde_json::json!(false) {
                println!("  [{name} failed: {}]", response_json["error"]["code"]);
            }
        }
        AgentProgressEvent::StepStarted { .. } | AgentProgressEvent::ModelResponse { .. } => {}
    }
}

fn print_summary(summary: &ReplySummary) {
    for (name, _) in &summary.tool_calls {
        println!("  [agent called {name}]");
    }
    if summary.final_text.is_empty() {
        println!("assistant> (no text in the reply)");
    } else {
        println!("assistant> {}", summary.final_text);
    }
}

/// Reads one line from stdin without blocking the runtime. Returns `None` on
/// end of input.
async fn read_line(prompt: &str) -> Result<Option<String>> {
    let prompt = prompt.to_string();
    spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        write!(stdout, "{prompt}").context("Failed to write prompt")?;
        stdout.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 { Ok(None) } else { Ok(Some(line)) }
    })
    .await
    .context("Input task failed")?
}
