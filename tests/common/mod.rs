//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use uiflow_agent::{
    error::Result, AgentError, Config, ModelClient, ModelReply, ModelRequest, ModelResponse,
    ToolConnector, ToolDescriptor, ToolSession, TranscriptConfig,
};

/// One scripted model turn
pub enum Turn {
    Respond(ModelResponse),
    Fail(String),
    Panic(&'static str),
}

impl Turn {
    pub fn text(text: &str) -> Self {
        Turn::Respond(ModelResponse::reply(ModelReply::text(text)))
    }

    pub fn call(name: &str, args: Value) -> Self {
        Turn::Respond(ModelResponse::reply(ModelReply::call(name, args)))
    }

    pub fn empty() -> Self {
        Turn::Respond(ModelResponse::empty())
    }
}

/// Model that plays back a script, then repeats the fallback forever
pub struct ScriptedModel {
    script: Mutex<VecDeque<Turn>>,
    fallback: Option<ModelResponse>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(turns.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn always(response: ModelResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn last_request(&self) -> Option<ModelRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let turn = self.script.lock().unwrap().pop_front();
        match turn {
            Some(Turn::Respond(response)) => Ok(response),
            Some(Turn::Fail(message)) => Err(AgentError::ModelApi {
                status: 500,
                body: message,
            }),
            Some(Turn::Panic(message)) => panic!("{}", message),
            None => match &self.fallback {
                Some(response) => Ok(response.clone()),
                None => Err(AgentError::ModelResponse("script exhausted".to_string())),
            },
        }
    }
}

/// What the scripted tool server saw
#[derive(Default)]
pub struct ToolLog {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl ToolLog {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Tool server double; results are played back in order, then "ok"
pub struct ScriptedTools {
    pub log: Arc<ToolLog>,
    tools: Vec<ToolDescriptor>,
    results: Arc<Mutex<VecDeque<std::result::Result<Value, String>>>>,
    fail_connect: bool,
    fail_list: bool,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self {
            log: Arc::new(ToolLog::default()),
            tools: vec![
                ToolDescriptor {
                    name: "playwright_navigate".to_string(),
                    description: "Navigate to a URL".to_string(),
                    input_schema: json!({
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "url": { "type": "string" },
                            "headers": { "type": "object", "additionalProperties": { "type": "string" } }
                        },
                        "required": ["url"]
                    }),
                },
                ToolDescriptor {
                    name: "playwright_click".to_string(),
                    description: "Click an element".to_string(),
                    input_schema: json!({
                        "type": "object",
                        "properties": { "selector": { "type": "string" } }
                    }),
                },
            ],
            results: Arc::new(Mutex::new(VecDeque::new())),
            fail_connect: false,
            fail_list: false,
        }
    }

    pub fn with_results(self, results: Vec<std::result::Result<Value, String>>) -> Self {
        *self.results.lock().unwrap() = results.into();
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }
}

#[async_trait]
impl ToolConnector for ScriptedTools {
    async fn connect(&self) -> Result<Box<dyn ToolSession>> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(AgentError::Spawn {
                command: "npx".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "npx not found"),
            });
        }
        Ok(Box::new(ScriptedSession {
            log: self.log.clone(),
            tools: self.tools.clone(),
            results: self.results.clone(),
            fail_list: self.fail_list,
        }))
    }
}

struct ScriptedSession {
    log: Arc<ToolLog>,
    tools: Vec<ToolDescriptor>,
    results: Arc<Mutex<VecDeque<std::result::Result<Value, String>>>>,
    fail_list: bool,
}

#[async_trait]
impl ToolSession for ScriptedSession {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        if self.fail_list {
            return Err(AgentError::Protocol("tools/list result missing tools array".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(AgentError::Rpc {
                code: -32603,
                message,
            }),
            None => Ok(text_result("ok")),
        }
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// MCP text content result
pub fn text_result(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }], "isError": false })
}

/// Config writing per-run transcripts into `dir`
pub fn test_config(dir: &Path) -> Config {
    Config {
        gemini_api_key: Some("test-key".to_string()),
        transcript: TranscriptConfig {
            dir: dir.to_path_buf(),
            fixed_name: None,
            verbose: false,
        },
        ..Config::default()
    }
}

/// Parse a transcript file into JSON
pub fn read_transcript(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("transcript file missing");
    serde_json::from_str(&raw).expect("transcript is not JSON")
}

/// Count `tool_call` entries in a transcript JSON array
pub fn tool_entries(transcript: &Value) -> Vec<&Value> {
    transcript
        .as_array()
        .expect("transcript is not an array")
        .iter()
        .filter(|e| e["type"] == "tool_call")
        .collect()
}
