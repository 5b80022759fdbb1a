//! End to end flow: a real website API server, a mocked Gemini endpoint, and
//! the agent loop wiring the two together.

use reqwest::Client;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use webguide::agent::{AgentConfig, AgentProgressEvent, run_question_with_events};
use webguide::llm::gemini::GeminiProvider;
use webguide::site::data::{NavigationSection, Service, WebsiteData};
use webguide::site::server::build_router;
use webguide::tools::WebsiteApiClient;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GEMINI_PATH: &str = "/v1beta/models/test-model:generateContent";

fn website_data() -> WebsiteData {
    WebsiteData::from_parts(
        vec![
            Service {
                id: 1,
                name: "Cloud Solutions".to_string(),
                description: "Cloud migration and hosting".to_string(),
            },
            Service {
                id: 2,
                name: "Data Analytics".to_string(),
                description: "Pipelines and dashboards".to_string(),
            },
        ],
        vec![NavigationSection {
            id: 1,
            section: "pricing".to_string(),
            url: "https://fictionsolutions.com/pricing".to_string(),
            description: None,
        }],
    )
    .expect("test data")
}

async fn spawn_site_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(Arc::new(website_data()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn provider_for(gemini: &MockServer) -> GeminiProvider {
    GeminiProvider::new(
        Client::new(),
        Some("test-key".to_string()),
        "test-model".to_string(),
        gemini.uri(),
    )
    .expect("provider")
}

fn function_call_reply(name: &str, args: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "finishReason": "STOP",
            "content": {
                "role": "model",
                "parts": [{"functionCall": {"name": name, "args": args}}]
            }
        }]
    }))
}

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "finishReason": "STOP",
            "content": {"role": "model", "parts": [{"text": text}]}
        }]
    }))
}

#[tokio::test]
async fn agent_answers_service_question_via_live_site_api() {
    let site_addr = spawn_site_server().await;
    let gemini = MockServer::start().await;

    // Second model turn: the request carries the tool result back, including
    // real service names fetched from the live site server.
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_string_contains("functionResponse"))
        .and(body_string_contains("Cloud Solutions"))
        .respond_with(text_reply("We offer Cloud Solutions and Data Analytics."))
        .expect(1)
        .mount(&gemini)
        .await;

    // First model turn: ask for the tool.
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(function_call_reply("get_website_services", json!({})))
        .expect(1)
        .mount(&gemini)
        .await;

    let provider = provider_for(&gemini);
    let tools_client = WebsiteApiClient::new(Client::new(), &format!("http://{site_addr}"));

    let mut events = Vec::new();
    let answer = run_question_with_events(
        &provider,
        &tools_client,
        "What services do you offer?",
        &AgentConfig::default(),
        &mut |event| events.push(event),
    )
    .await
    .expect("agent answer");

    assert_eq!(answer.text, "We offer Cloud Solutions and Data Analytics.");
    assert!(!answer.degraded);

    let tool_names: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            AgentProgressEvent::ToolRequest { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tool_names, vec!["get_website_services"]);

    let tool_result = events
        .iter()
        .find_map(|event| match event {
            AgentProgressEvent::ToolResult { response_json, .. } => Some(response_json),
            _ => None,
        })
        .expect("tool result event");
    assert_eq!(tool_result["ok"], json!(true));
    assert_eq!(tool_result["result"]["services"][0]["name"], json!("Cloud Solutions"));
}

#[tokio::test]
async fn agent_reports_unknown_section_from_live_site_api() {
    let site_addr = spawn_site_server().await;
    let gemini = MockServer::start().await;

    // The 404 from the site server must reach the model as a not_found error,
    // not as a transport failure.
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_string_contains("functionResponse"))
        .and(body_string_contains("not_found"))
        .respond_with(text_reply("There is no downloads page on the site."))
        .expect(1)
        .mount(&gemini)
        .await;

    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(function_call_reply(
            "get_website_navigation",
            json!({"section": "downloads"}),
        ))
        .expect(1)
        .mount(&gemini)
        .await;

    let provider = provider_for(&gemini);
    let tools_client = WebsiteApiClient::new(Client::new(), &format!("http://{site_addr}"));

    let answer = run_question_with_events(
        &provider,
        &tools_client,
        "Where can I download your software?",
        &AgentConfig::default(),
        &mut |_| {},
    )
    .await
    .expect("agent answer");

    assert_eq!(answer.text, "There is no downloads page on the site.");
    assert!(!answer.degraded);
}

#[tokio::test]
async fn agent_resolves_navigation_url_end_to_end() {
    let site_addr = spawn_site_server().await;
    let gemini = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_string_contains("functionResponse"))
        .and(body_string_contains("https://fictionsolutions.com/pricing"))
        .respond_with(text_reply(
            "You can find pricing at https://fictionsolutions.com/pricing",
        ))
        .expect(1)
        .mount(&gemini)
        .await;

    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(function_call_reply(
            "get_website_navigation",
            json!({"section": "pricing"}),
        ))
        .expect(1)
        .mount(&gemini)
        .await;

    let provider = provider_for(&gemini);
    let tools_client = WebsiteApiClient::new(Client::new(), &format!("http://{site_addr}"));

    let answer = run_question_with_events(
        &provider,
        &tools_client,
        "Where do I find your pricing?",
        &AgentConfig::default(),
        &mut |_| {},
    )
    .await
    .expect("agent answer");

    assert!(answer.text.contains("https://fictionsolutions.com/pricing"));
}
