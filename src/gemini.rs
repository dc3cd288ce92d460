//! Gemini API Client
//!
//! `generateContent` with function calling. Each run sends a single user turn
//! holding the whole prompt; the loop keeps its own context.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::model::{
    FunctionCall, FunctionDeclaration, ModelClient, ModelReply, ModelRequest, ModelResponse,
    TokenUsage,
};

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

/// API request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolBlock<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolBlock<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// API response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: crate::config::DEFAULT_API_BASE.to_string(),
            model: model.into(),
        }
    }

    /// Override the API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Create from config; fails when no API key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .gemini_api_key
            .as_deref()
            .ok_or(AgentError::MissingApiKey)?;
        Ok(Self::new(api_key, &config.model).with_api_base(&config.gemini_api_base))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

fn build_request(request: &ModelRequest) -> GenerateRequest<'_> {
    let tools = if request.functions.is_empty() {
        Vec::new()
    } else {
        vec![ToolBlock {
            function_declarations: &request.functions,
        }]
    };

    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![TextPart {
                text: request.prompt.clone(),
            }],
        }],
        tools,
        generation_config: GenerationConfig {
            temperature: request.temperature,
        },
    }
}

/// Collapse the first candidate into the tagged reply shape.
///
/// Text parts are concatenated; the first function call part wins.
fn parse_response(response: GenerateResponse) -> ModelResponse {
    let usage = response
        .usage_metadata
        .map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return ModelResponse { reply: None, usage };
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = String::new();
    let mut function_call = None;
    for part in parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if function_call.is_none() {
            function_call = part.function_call.map(|fc| FunctionCall {
                name: fc.name,
                args: fc.args.unwrap_or_else(|| Value::Object(Default::default())),
            });
        }
    }

    ModelResponse {
        reply: Some(ModelReply {
            text: (!text.is_empty()).then_some(text),
            function_call,
        }),
        usage,
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = build_request(request);

        debug!(
            "Calling Gemini API: model={}, prompt_len={}, functions={}",
            self.model,
            request.prompt.len(),
            request.functions.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelApi { status, body });
        }

        let raw = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&raw)
            .map_err(|e| AgentError::ModelResponse(e.to_string()))?;
        let result = parse_response(parsed);

        info!(
            "Gemini response: model={}, in={}, out={}, text={}, call={}",
            self.model,
            result.usage.input_tokens,
            result.usage.output_tokens,
            result.reply.as_ref().is_some_and(|r| r.text.is_some()),
            result
                .reply
                .as_ref()
                .and_then(|r| r.function_call.as_ref())
                .map(|c| c.name.as_str())
                .unwrap_or("-"),
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Value) -> ModelResponse {
        parse_response(serde_json::from_value(raw).unwrap())
    }

    #[test]
    fn test_request_body_shape() {
        let request = ModelRequest {
            prompt: "task: open the login page".to_string(),
            functions: vec![FunctionDeclaration {
                name: "playwright_navigate".to_string(),
                description: "Navigate to a URL".to_string(),
                parameters: json!({ "type": "object", "properties": { "url": { "type": "string" } } }),
            }],
            temperature: 0.0,
        };

        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "task: open the login page");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "playwright_navigate");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["parameters"]["properties"]["url"]["type"],
            "string"
        );
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn test_request_without_functions_omits_tools() {
        let request = ModelRequest {
            prompt: "hello".to_string(),
            functions: vec![],
            temperature: 0.0,
        };
        let body = serde_json::to_value(build_request(&request)).unwrap();
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_text_and_call_in_either_order() {
        let text_first = parse(json!({
            "candidates": [{ "content": { "role": "model", "parts": [
                { "text": "Navigating to the login page" },
                { "functionCall": { "name": "playwright_navigate", "args": { "url": "https://example.com" } } }
            ]}}],
            "usageMetadata": { "promptTokenCount": 120, "candidatesTokenCount": 14 }
        }));
        let reply = text_first.reply.unwrap();
        assert_eq!(reply.text.as_deref(), Some("Navigating to the login page"));
        assert_eq!(reply.function_call.as_ref().unwrap().name, "playwright_navigate");
        assert_eq!(text_first.usage.input_tokens, 120);
        assert_eq!(text_first.usage.output_tokens, 14);

        let call_first = parse(json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "playwright_click", "args": { "selector": "#kc-login" } } },
                { "text": "Clicking login" }
            ]}}]
        }));
        let reply = call_first.reply.unwrap();
        assert_eq!(reply.text.as_deref(), Some("Clicking login"));
        assert_eq!(reply.function_call.unwrap().args["selector"], "#kc-login");
    }

    #[test]
    fn test_parse_call_without_args() {
        let response = parse(json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "playwright_get_visible_html" } }
            ]}}]
        }));
        let reply = response.reply.unwrap();
        assert!(reply.text.is_none());
        assert_eq!(reply.function_call.unwrap().args, json!({}));
    }

    #[test]
    fn test_parse_empty_candidates() {
        assert!(parse(json!({ "candidates": [] })).reply.is_none());
        assert!(parse(json!({})).reply.is_none());
    }

    #[test]
    fn test_parse_candidate_without_content() {
        let response = parse(json!({ "candidates": [{ "finishReason": "SAFETY" }] }));
        assert_eq!(response.reply, Some(ModelReply::default()));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = Config::default();
        assert!(matches!(
            GeminiClient::from_config(&config),
            Err(AgentError::MissingApiKey)
        ));

        let config = Config {
            gemini_api_key: Some("k".to_string()),
            ..Config::default()
        };
        let client = GeminiClient::from_config(&config).unwrap();
        assert_eq!(client.model(), "gemini-2.0-flash");
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(!format!("{:?}", client).contains("\"k\""));
    }
}
