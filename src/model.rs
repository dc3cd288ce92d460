//! Model client seam
//!
//! The conversation loop only sees this tagged shape. Provider wire formats
//! (part ordering, candidate lists) stay inside the client implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::mcp::ToolDescriptor;
use crate::schema::clean_schema;

/// Function declaration offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDescriptor> for FunctionDeclaration {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: clean_schema(&tool.input_schema),
        }
    }
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// One generation request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub functions: Vec<FunctionDeclaration>,
    pub temperature: f32,
}

/// The first candidate of a reply, as optional text plus optional call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
        }
    }

    pub fn call(name: impl Into<String>, args: Value) -> Self {
        Self {
            text: None,
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Token accounting for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Model output; `reply` is None when the provider returned no candidates
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub reply: Option<ModelReply>,
    pub usage: TokenUsage,
}

impl ModelResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn reply(reply: ModelReply) -> Self {
        Self {
            reply: Some(reply),
            usage: TokenUsage::default(),
        }
    }
}

/// Language model behind the loop
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declaration_uses_sanitized_schema() {
        let tool = ToolDescriptor {
            name: "playwright_fill".to_string(),
            description: "Fill an input".to_string(),
            input_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": { "selector": { "type": "string" } }
            }),
        };

        let decl = FunctionDeclaration::from(&tool);
        assert_eq!(decl.name, "playwright_fill");
        assert_eq!(
            decl.parameters,
            json!({ "type": "object", "properties": { "selector": { "type": "string" } } })
        );
    }

    #[test]
    fn test_reply_builders() {
        let reply = ModelReply::call("playwright_click", json!({ "selector": "#login" }))
            .with_text("Clicking the login button");
        assert_eq!(reply.text.as_deref(), Some("Clicking the login button"));
        assert_eq!(reply.function_call.unwrap().args["selector"], "#login");

        assert!(ModelResponse::empty().reply.is_none());
    }
}
