use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::provider::{
    AssistantCandidate, AssistantInput, AssistantMessage, AssistantOutput, AssistantPart,
    AssistantRole, LlmError, LlmProvider, LlmResult, ToolCallingMode,
};
use crate::redact::{redact_text_body, redact_url, truncate_for_log};

const LOG_BODY_MAX_CHARS: usize = 4_000;

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        model: String,
        base_url: String,
    ) -> LlmResult<Self> {
        let api_key = api_key
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(input: &AssistantInput) -> GeminiGenerateRequest {
        let tools = if input.tools.is_empty() {
            vec![]
        } else {
            vec![GeminiTool {
                function_declarations: input
                    .tools
                    .iter()
                    .map(|decl| GeminiFunctionDeclaration {
                        name: decl.name.clone(),
                        description: decl.description.clone(),
                        parameters: decl.parameters_json_schema.clone(),
                    })
                    .collect(),
            }]
        };

        GeminiGenerateRequest {
            contents: input.messages.iter().map(encode_message).collect(),
            system_instruction: input.system_instruction.as_ref().map(|text| {
                GeminiSystemInstruction {
                    parts: vec![GeminiPart {
                        text: Some(text.clone()),
                        ..GeminiPart::default()
                    }],
                }
            }),
            tool_config: match (tools.is_empty(), input.tool_calling_mode) {
                (true, ToolCallingMode::Auto) => None,
                (_, mode) => Some(GeminiToolConfig {
                    function_calling_config: GeminiFunctionCallingConfig {
                        mode: match mode {
                            ToolCallingMode::Auto => "AUTO".to_string(),
                            ToolCallingMode::Disabled => "NONE".to_string(),
                        },
                    },
                }),
            },
            tools,
        }
    }
}

impl LlmProvider for GeminiProvider {
    async fn generate(&self, input: AssistantInput) -> LlmResult<AssistantOutput> {
        let payload = Self::build_request(&input);

        let request = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .build()
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        debug!(url = %redact_url(request.url()), "gemini request");

        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        debug!(
            status = status.as_u16(),
            body = %truncate_for_log(&redact_text_body(&body), LOG_BODY_MAX_CHARS),
            "gemini response"
        );

        if !status.is_success() {
            let body = body.chars().take(400).collect::<String>();
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = serde_json::from_str::<GeminiGenerateResponse>(&body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        Ok(decode_response(parsed))
    }
}

fn encode_message(message: &AssistantMessage) -> GeminiContent {
    GeminiContent {
        role: Some(
            match message.role {
                AssistantRole::User => "user",
                AssistantRole::Model => "model",
            }
            .to_string(),
        ),
        parts: message.parts.iter().map(encode_part).collect(),
    }
}

fn encode_part(part: &AssistantPart) -> GeminiPart {
    match part {
        AssistantPart::Text {
            text,
            thought_signature,
        } => GeminiPart {
            text: Some(text.clone()),
            thought_signature: thought_signature.clone(),
            ..GeminiPart::default()
        },
        AssistantPart::FunctionCall {
            id,
            name,
            args_json,
            thought_signature,
        } => GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: id.clone(),
                name: name.clone(),
                args: args_json.clone(),
            }),
            thought_signature: thought_signature.clone(),
            ..GeminiPart::default()
        },
        AssistantPart::FunctionResponse {
            id,
            name,
            response_json,
            thought_signature,
        } => GeminiPart {
            function_response: Some(GeminiFunctionResponse {
                id: id.clone(),
                name: name.clone(),
                response: response_json.clone(),
            }),
            thought_signature: thought_signature.clone(),
            ..GeminiPart::default()
        },
    }
}

fn decode_response(resp: GeminiGenerateResponse) -> AssistantOutput {
    AssistantOutput {
        candidates: resp
            .candidates
            .into_iter()
            .map(|candidate| {
                let parts = candidate
                    .content
                    .map(|content| content.parts)
                    .unwrap_or_default();
                let safety_blocked = matches!(
                    candidate.finish_reason.as_deref(),
                    Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST")
                        | Some("PROHIBITED_CONTENT")
                );
                AssistantCandidate {
                    message: AssistantMessage {
                        role: AssistantRole::Model,
                        parts: parts.iter().filter_map(decode_part).collect(),
                    },
                    finish_reason: candidate.finish_reason,
                    safety_blocked,
                }
            })
            .collect(),
    }
}

fn decode_part(part: &GeminiPart) -> Option<AssistantPart> {
    if let Some(call) = &part.function_call {
        return Some(AssistantPart::FunctionCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args_json: call.args.clone(),
            thought_signature: part.thought_signature.clone(),
        });
    }

    if let Some(response) = &part.function_response {
        return Some(AssistantPart::FunctionResponse {
            id: response.id.clone(),
            name: response.name.clone(),
            response_json: response.response.clone(),
            thought_signature: part.thought_signature.clone(),
        });
    }

    part.text.as_ref().map(|text| AssistantPart::Text {
        text: text.clone(),
        thought_signature: part.thought_signature.clone(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: GeminiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionCallingConfig {
    mode: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct GeminiFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    args: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct GeminiFunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiGenerateResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}
