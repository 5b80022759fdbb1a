use serde_json::{Value, json};

use super::client::{ToolError, WebsiteApiClient};
use crate::llm::provider::{AssistantPart, FunctionDeclaration};

#[derive(Debug, Clone)]
pub struct FunctionCallSpec {
    pub id: Option<String>,
    pub name: String,
    pub args_json: Value,
}

/// The closed set of requests the model can make, parsed from the untyped
/// function-call protocol before any network work happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ServiceList,
    NavigationLookup { section: String },
}

pub fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "get_website_services".to_string(),
            description: "Retrieve the current list of services offered on the website"
                .to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        FunctionDeclaration {
            name: "get_website_navigation".to_string(),
            description: "Resolve a website section name (for example 'pricing') to its URL"
                .to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "section": {
                        "type": "string",
                        "description": "The website section to look up"
                    }
                },
                "required": ["section"]
            }),
        },
    ]
}

impl ToolRequest {
    /// Returns the typed request, or a ready-to-send error envelope when the
    /// call does not fit the declared contract.
    fn parse(call: &FunctionCallSpec) -> Result<Self, Value> {
        match call.name.as_str() {
            "get_website_services" => {
                if call.args_json.is_null()
                    || call
                        .args_json
                        .as_object()
                        .is_some_and(|obj| obj.is_empty())
                {
                    Ok(Self::ServiceList)
                } else {
                    Err(error_envelope(
                        "invalid_args",
                        "get_website_services does not accept arguments",
                        json!({ "args": call.args_json }),
                    ))
                }
            }
            "get_website_navigation" => {
                let section = call
                    .args_json
                    .get("section")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                match section {
                    Some(section) => Ok(Self::NavigationLookup {
                        section: section.to_string(),
                    }),
                    None => Err(error_envelope(
                        "invalid_args",
                        "get_website_navigation requires a non-empty 'section' string",
                        json!({ "args": call.args_json }),
                    )),
                }
            }
            other => Err(error_envelope(
                "unknown_function",
                &format!("unknown function: {other}"),
                json!({}),
            )),
        }
    }
}

/// Runs every requested call against the query service and wraps each outcome
/// in a function-response part. Failures become structured error payloads, so
/// the model always gets a result to narrate.
pub async fn dispatch_calls(
    client: &WebsiteApiClient,
    calls: &[FunctionCallSpec],
) -> Vec<AssistantPart> {
    let mut responses = Vec::with_capacity(calls.len());
    for call in calls {
        let response_json = dispatch_one(client, call).await;
        responses.push(AssistantPart::FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response_json,
            thought_signature: None,
        });
    }
    responses
}

async fn dispatch_one(client: &WebsiteApiClient, call: &FunctionCallSpec) -> Value {
    let request = match ToolRequest::parse(call) {
        Ok(request) => request,
        Err(envelope) => return envelope,
    };

    match request {
        ToolRequest::ServiceList => match client.fetch_services().await {
            Ok(services) => json!({
                "ok": true,
                "result": { "services": services }
            }),
            Err(err) => map_tool_error(err),
        },
        ToolRequest::NavigationLookup { section } => match client.fetch_navigation(&section).await
        {
            Ok(nav) => json!({
                "ok": true,
                "result": { "url": nav.url }
            }),
            Err(err) => map_tool_error(err),
        },
    }
}

fn map_tool_error(err: ToolError) -> Value {
    match err {
        ToolError::Timeout => error_envelope("timeout", "Service request timed out", json!({})),
        ToolError::SectionNotFound { section } => error_envelope(
            "not_found",
            &format!("no navigation section named '{section}'"),
            json!({ "section": section }),
        ),
        ToolError::Transport(_) | ToolError::HttpStatus { .. } | ToolError::Parse(_) => {
            error_envelope("transport", &err.to_string(), json!({}))
        }
    }
}

fn error_envelope(code: &str, message: &str, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
