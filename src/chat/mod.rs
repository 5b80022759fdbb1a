//! Client for a deployed agent service. The service surface varies between
//! deployments, so each message is pushed through an ordered list of candidate
//! transports; the first one that answers wins.

use reqwest::Client;
use serde_json::{Value, json};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const MESSAGE_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Candidate agent endpoints, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    RunSse,
    Run,
    Chat,
    Direct,
}

pub const TRANSPORT_ORDER: [Transport; 4] =
    [Transport::RunSse, Transport::Run, Transport::Chat, Transport::Direct];

impl Transport {
    pub fn path(self) -> &'static str {
        match self {
            Self::RunSse => "/run_sse",
            Self::Run => "/run",
            Self::Chat => "/chat",
            Self::Direct => "/",
        }
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    HttpStatus { status: u16, body: String },
    Transport(String),
    AllTransportsFailed { attempts: Vec<(String, String)> },
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpStatus { status, body } => {
                write!(f, "agent request failed with status {status}: {body}")
            }
            Self::Transport(msg) => write!(f, "agent transport error: {msg}"),
            Self::AllTransportsFailed { attempts } => {
                write!(f, "all agent endpoints failed:")?;
                for (transport, reason) in attempts {
                    write!(f, " [{transport}: {reason}]")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ChatError {}

/// What a reply boils down to once the event stream is reduced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplySummary {
    pub final_text: String,
    pub tool_calls: Vec<(String, Value)>,
    pub tool_responses: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub struct AgentApiClient {
    http: Client,
    base_url: String,
    app_name: String,
}

impl AgentApiClient {
    pub fn new(http: Client, base_url: &str, app_name: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_name: app_name.to_string(),
        }
    }

    /// Any 2xx from the health endpoint counts as healthy.
    pub async fn health_check(&self) -> Result<bool, ChatError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;
        Ok(response.status().is_success())
    }

    pub async fn create_session(&self, user_id: &str) -> Result<String, ChatError> {
        let session_id = format!("session-{}", unix_seconds());
        let url = format!(
            "{}/apps/{}/users/{user_id}/sessions/{session_id}",
            self.base_url, self.app_name
        );
        let response = self
            .http
            .post(&url)
            .timeout(SESSION_TIMEOUT)
            .json(&json!({}))
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        if response.status().is_success() {
            info!(%session_id, "created agent session");
            Ok(session_id)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ChatError::HttpStatus { status, body })
        }
    }

    /// Tries each candidate transport in order; the first success
    /// short-circuits the probe.
    pub async fn send_message(
        &self,
        message: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<ReplySummary, ChatError> {
        let mut attempts = Vec::new();
        for transport in TRANSPORT_ORDER {
            debug!(%transport, "trying agent transport");
            match self.attempt(transport, message, user_id, session_id).await {
                Ok(summary) => {
                    info!(%transport, "agent replied");
                    return Ok(summary);
                }
                Err(err) => {
                    debug!(%transport, error = %err, "agent transport failed");
                    attempts.push((transport.path().to_string(), err.to_string()));
                }
            }
        }
        Err(ChatError::AllTransportsFailed { attempts })
    }

    async fn attempt(
        &self,
        transport: Transport,
        message: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<ReplySummary, ChatError> {
        let payload = build_payload(transport, &self.app_name, message, user_id, session_id);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, transport.path()))
            .timeout(MESSAGE_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(ChatError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(400).collect(),
            });
        }

        let summary = match transport {
            Transport::RunSse => summarize_events(&parse_sse_events(&body)),
            _ => match serde_json::from_str::<Value>(&body) {
                Ok(Value::Array(events)) => summarize_events(&events),
                Ok(value) => summarize_value(&value),
                Err(err) => return Err(ChatError::Transport(format!("invalid reply body: {err}"))),
            },
        };
        Ok(summary)
    }
}

fn build_payload(
    transport: Transport,
    app_name: &str,
    message: &str,
    user_id: &str,
    session_id: Option<&str>,
) -> Value {
    match transport {
        Transport::RunSse | Transport::Run => json!({
            "appName": app_name,
            "userId": user_id,
            "sessionId": session_id,
            "newMessage": {
                "role": "user",
                "parts": [{"text": message}]
            }
        }),
        Transport::Chat => json!({
            "message": message,
            "user_id": user_id,
            "session_id": session_id,
        }),
        Transport::Direct => json!({
            "query": message,
            "user_id": user_id,
            "session_id": session_id,
        }),
    }
}

/// Collects the JSON payloads of `data:` lines; malformed lines are skipped.
pub fn parse_sse_events(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

/// Reduces an event list to the model's final text plus the tool traffic seen
/// along the way.
pub fn summarize_events(events: &[Value]) -> ReplySummary {
    let mut summary = ReplySummary::default();
    let mut texts = Vec::new();

    for event in events {
        let content = &event["content"];
        let parts = content["parts"].as_array().cloned().unwrap_or_default();

        for part in &parts {
            if content["role"] == json!("model")
                && let Some(text) = part["text"].as_str()
                && !text.trim().is_empty()
            {
                texts.push(text.trim().to_string());
            }

            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or("unknown").to_string();
                summary
                    .tool_calls
                    .push((name, call.get("args").cloned().unwrap_or(Value::Null)));
            }

            if let Some(response) = part.get("functionResponse") {
                let name = response["name"].as_str().unwrap_or("unknown").to_string();
                summary.tool_responses.push((
                    name,
                    response.get("response").cloned().unwrap_or(Value::Null),
                ));
            }
        }
    }

    summary.final_text = texts.join(" ");
    summary
}

/// Fallback for transports that return a single JSON object instead of an
/// event list.
pub fn summarize_value(value: &Value) -> ReplySummary {
    let mut summary = ReplySummary::default();

    for field in ["text", "response", "message", "output", "result"] {
        if let Some(text) = value.get(field).and_then(Value::as_str)
            && !text.trim().is_empty()
        {
            summary.final_text = text.trim().to_string();
            return summary;
        }
    }

    summary.final_text = serde_json::to_string(value).unwrap_or_default();
    summary
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::{
        AgentApiClient, ChatError, TRANSPORT_ORDER, Transport, parse_sse_events, summarize_events,
        summarize_value,
    };
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn transport_order_starts_with_sse_and_ends_with_root() {
        assert_eq!(TRANSPORT_ORDER[0], Transport::RunSse);
        assert_eq!(TRANSPORT_ORDER[3], Transport::Direct);
        assert_eq!(Transport::Direct.path(), "/");
    }

    #[test]
    fn parse_sse_events_skips_malformed_lines() {
        let body = "data: {\"a\": 1}\n\nnoise\ndata: not json\ndata: {\"b\": 2}\n";
        let events = parse_sse_events(body);
        assert_eq!(events, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn summarize_events_extracts_model_text_and_tool_traffic() {
        let events = vec![
            json!({
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "get_website_navigation", "args": {"section": "pricing"}}}]
                }
            }),
            json!({
                "content": {
                    "role": "user",
                    "parts": [{"functionResponse": {"name": "get_website_navigation", "response": {"ok": true}}}]
                }
            }),
            json!({
                "content": {
                    "role": "model",
                    "parts": [{"text": "Here is the pricing page."}]
                }
            }),
        ];

        let summary = summarize_events(&events);
        assert_eq!(summary.final_text, "Here is the pricing page.");
        assert_eq!(summary.tool_calls.len(), 1);
        assert_eq!(summary.tool_calls[0].0, "get_website_navigation");
        assert_eq!(summary.tool_responses.len(), 1);
    }

    #[test]
    fn summarize_value_prefers_known_text_fields() {
        let summary = summarize_value(&json!({"response": "direct reply", "extra": 1}));
        assert_eq!(summary.final_text, "direct reply");

        let summary = summarize_value(&json!({"unknown": true}));
        assert_eq!(summary.final_text, "{\"unknown\":true}");
    }

    #[tokio::test]
    async fn send_message_falls_back_to_next_transport_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run_sse"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .and(body_string_contains("newMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"content": {"role": "model", "parts": [{"text": "hello from /run"}]}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = AgentApiClient::new(reqwest::Client::new(), &server.uri(), "agent");
        let summary = client
            .send_message("hi", "user-1", Some("session-1"))
            .await
            .expect("reply");
        assert_eq!(summary.final_text, "hello from /run");
    }

    #[tokio::test]
    async fn send_message_parses_sse_stream_from_first_transport() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"streamed reply\"}]}}\n",
            "\n",
            "data: not json\n",
        );
        Mock::given(method("POST"))
            .and(path("/run_sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = AgentApiClient::new(reqwest::Client::new(), &server.uri(), "agent");
        let summary = client
            .send_message("hi", "user-1", None)
            .await
            .expect("reply");
        assert_eq!(summary.final_text, "streamed reply");
    }

    #[tokio::test]
    async fn send_message_reports_all_attempts_when_everything_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let client = AgentApiClient::new(reqwest::Client::new(), &server.uri(), "agent");
        let err = client
            .send_message("hi", "user-1", None)
            .await
            .expect_err("all fail");
        let ChatError::AllTransportsFailed { attempts } = err else {
            panic!("expected AllTransportsFailed");
        };
        assert_eq!(attempts.len(), 4);
        assert_eq!(attempts[0].0, "/run_sse");
    }

    #[tokio::test]
    async fn health_check_reports_2xx_as_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = AgentApiClient::new(reqwest::Client::new(), &server.uri(), "agent");
        assert!(client.health_check().await.expect("health"));
    }

    #[tokio::test]
    async fn create_session_returns_generated_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = AgentApiClient::new(reqwest::Client::new(), &server.uri(), "agent");
        let session_id = client.create_session("user-1").await.expect("session");
        assert!(session_id.starts_with("session-"));
    }
}
