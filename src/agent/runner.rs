//! Conversation Loop
//!
//! Call the model, maybe call a tool, repeat until the model says the
//! sentinel. Everything that goes wrong inside the loop is written into the
//! context and shown to the model on the next turn; only setup failures and
//! the optional iteration cap end a run early.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::{Context, ContextEntry, CLOSING_NOTICE, SENTINEL};
use super::transcript::{Transcript, TranscriptStore};
use crate::config::{Config, LoopPolicy};
use crate::error::{AgentError, Result};
use crate::mcp::{render_tool_result, ToolConnector, ToolSession};
use crate::model::{FunctionDeclaration, ModelClient, ModelRequest, TokenUsage};

/// Progress reported while a run is going
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Lifecycle notice
    Status(String),
    /// Text produced by the model
    Text(String),
    /// Final transcript, compact JSON
    Transcript(String),
}

impl RunEvent {
    pub fn into_text(self) -> String {
        match self {
            RunEvent::Status(s) | RunEvent::Text(s) | RunEvent::Transcript(s) => s,
        }
    }
}

/// Result of a run that reached the sentinel
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: usize,
    pub model_calls: usize,
    pub tool_calls: usize,
    pub usage: TokenUsage,
    pub context: Context,
    pub transcript: Transcript,
    /// None when the transcript could not be written
    pub transcript_path: Option<PathBuf>,
}

/// Instruction sent ahead of the context on every turn
pub fn system_instruction(task: &str) -> String {
    format!(
        r#"
You are a UI flow testing agent with access to browser automation tools.
You will be given a task that tests a web application.
Do not restate or explain the task.
When every required tool call is done, reply with "{sentinel}" followed by your result.
Work through the task like this:
- Read the task and work out which tool calls it needs.
- Whenever you call a tool, also say what you are doing.
- If the page does something unexpected and a tool result does not show up, fetch the page HTML,
  analyse it and call the right tool based on what you find.
IMPORTANT: If a tool call fails two times in a row, reply with "{sentinel}" and what you found.
task: {task}
"#,
        sentinel = SENTINEL,
        task = task
    )
}

/// Mutable state of one run
struct Run {
    id: String,
    started_at: DateTime<Utc>,
    instruction: String,
    functions: Vec<FunctionDeclaration>,
    context: Context,
    transcript: Transcript,
    iterations: usize,
    model_calls: usize,
    tool_calls: usize,
    usage: TokenUsage,
}

impl Run {
    fn new(id: String, task: &str, functions: Vec<FunctionDeclaration>) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            instruction: system_instruction(task),
            functions,
            context: Context::new(),
            transcript: Transcript::new(),
            iterations: 0,
            model_calls: 0,
            tool_calls: 0,
            usage: TokenUsage::default(),
        }
    }

    fn prompt(&self) -> String {
        format!("{}\nprevious_tool_calls: {}", self.instruction, self.context.render())
    }

    fn into_outcome(self, transcript_path: Option<PathBuf>) -> RunOutcome {
        RunOutcome {
            run_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            iterations: self.iterations,
            model_calls: self.model_calls,
            tool_calls: self.tool_calls,
            usage: self.usage,
            context: self.context,
            transcript: self.transcript,
            transcript_path,
        }
    }
}

impl RunOutcome {
    /// Wall-clock duration of the run
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

enum Step {
    Continue,
    Done(Option<PathBuf>),
}

/// Drives runs against a model and a tool server
pub struct Agent {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolConnector>,
    transcripts: TranscriptStore,
    policy: LoopPolicy,
    temperature: f32,
}

impl Agent {
    pub fn new(
        config: &Config,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolConnector>,
    ) -> Self {
        Self {
            model,
            tools,
            transcripts: TranscriptStore::new(config.transcript.clone()),
            policy: config.policy.clone(),
            temperature: config.temperature,
        }
    }

    /// Execute one run for `task`, reporting progress on `events`
    pub async fn run(&self, task: &str, events: &mpsc::Sender<RunEvent>) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        info!("Starting run {}", run_id);

        let mut session = self.tools.connect().await.map_err(|e| {
            error!("Run {}: tool session failed: {}", run_id, e);
            e
        })?;
        info!("Session initialized.");
        emit(events, RunEvent::Status("Session initialized.".to_string())).await;

        let functions = match session.list_tools().await {
            Ok(tools) => tools.iter().map(FunctionDeclaration::from).collect::<Vec<_>>(),
            Err(e) => {
                error!("Run {}: listing tools failed: {}", run_id, e);
                session.close().await;
                return Err(AgentError::Setup(format!("tools/list failed: {}", e)));
            }
        };
        debug!(
            "Run {}: prepared {} function declarations",
            run_id,
            functions.len()
        );

        let mut run = Run::new(run_id, task, functions);
        let result = self.drive(&mut run, session.as_mut(), events).await;

        info!("Closing session...");
        session.close().await;

        result.map(|path| run.into_outcome(path))
    }

    async fn drive(
        &self,
        run: &mut Run,
        session: &mut dyn ToolSession,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<Option<PathBuf>> {
        loop {
            if let Some(max) = self.policy.max_iterations {
                if run.iterations >= max {
                    warn!("Run {}: iteration limit {} reached", run.id, max);
                    return Err(AgentError::IterationLimit(max));
                }
            }
            run.iterations += 1;

            match self.step(run, session, events).await {
                Ok(Step::Done(path)) => return Ok(path),
                Ok(Step::Continue) => {}
                Err(e) => {
                    warn!("Error in loop: {}", e);
                    run.context.push(ContextEntry::error(&e));
                }
            }

            let errored = run.context.entries().last().is_some_and(ContextEntry::is_error);
            if errored && !self.policy.retry_backoff.is_zero() {
                tokio::time::sleep(self.policy.retry_backoff).await;
            }

            // A model that answers instantly must not starve the runtime
            tokio::task::yield_now().await;
        }
    }

    async fn step(
        &self,
        run: &mut Run,
        session: &mut dyn ToolSession,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<Step> {
        let request = ModelRequest {
            prompt: run.prompt(),
            functions: run.functions.clone(),
            temperature: self.temperature,
        };

        debug!("Run {}: sending prompt to model (iteration {})", run.id, run.iterations);
        let response = self.model.generate(&request).await?;
        run.model_calls += 1;
        run.usage.input_tokens += response.usage.input_tokens;
        run.usage.output_tokens += response.usage.output_tokens;

        let Some(reply) = response.reply else {
            info!("No candidates in response, retrying...");
            run.context.push(ContextEntry::error("Empty response from model"));
            return Ok(Step::Continue);
        };

        if self.transcripts.verbose() {
            run.transcript.record_reply(&reply);
        }

        if let Some(text) = reply.text.as_deref().filter(|t| !t.trim().is_empty()) {
            if text.contains(SENTINEL) {
                info!(
                    "Received done signal. tokens: input: {}, output: {}",
                    run.usage.input_tokens, run.usage.output_tokens
                );
                emit(events, RunEvent::Text(format!("{} {}", text, CLOSING_NOTICE))).await;
                run.context.push(ContextEntry::Sentinel);
                return Ok(Step::Done(self.finish(run, events).await));
            }

            debug!("Model output: {}", text);
            run.context.push(ContextEntry::Utterance(text.to_string()));
            emit(events, RunEvent::Text(text.to_string())).await;
        }

        let Some(call) = reply.function_call else {
            debug!("No function call detected, updating context");
            run.context.push(ContextEntry::error("No function call in response"));
            return Ok(Step::Continue);
        };

        info!("Calling tool: {} with args: {}", call.name, call.args);
        run.tool_calls += 1;
        let raw = session.call_tool(&call.name, call.args.clone()).await?;
        let result = render_tool_result(&raw);
        debug!("Result from tool '{}': {}", call.name, result);

        run.transcript.record_tool_call(&call.name, &call.args, &result);
        run.context.push(ContextEntry::ToolCall {
            name: call.name,
            args: call.args,
            result,
        });

        Ok(Step::Continue)
    }

    /// Persist and stream the transcript. Failures here are logged, not retried.
    async fn finish(&self, run: &Run, events: &mpsc::Sender<RunEvent>) -> Option<PathBuf> {
        let path = match self.transcripts.write(&run.id, &run.transcript).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Run {}: failed to write transcript: {}", run.id, e);
                None
            }
        };

        match run.transcript.to_json() {
            Ok(json) => emit(events, RunEvent::Transcript(json)).await,
            Err(e) => error!("Run {}: failed to encode transcript: {}", run.id, e),
        }

        path
    }
}

async fn emit(events: &mpsc::Sender<RunEvent>, event: RunEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver dropped; run continues without a listener");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_embeds_task_and_sentinel() {
        let text = system_instruction("Log in as demo/demo and check the dashboard");
        assert!(text.contains("task: Log in as demo/demo and check the dashboard"));
        assert!(text.contains(SENTINEL));
        assert!(text.contains("two times in a row"));
    }

    #[test]
    fn test_prompt_appends_context() {
        let mut run = Run::new("r".to_string(), "open example.com", vec![]);
        assert!(run.prompt().ends_with("\nprevious_tool_calls: []"));

        run.context.push(ContextEntry::error("Empty response from model"));
        assert!(run
            .prompt()
            .ends_with("\nprevious_tool_calls: [\"Error: Empty response from model\"]"));
    }

    #[test]
    fn test_event_text() {
        assert_eq!(RunEvent::Status("a".into()).into_text(), "a");
        assert_eq!(RunEvent::Transcript("[]".into()).into_text(), "[]");
    }
}
