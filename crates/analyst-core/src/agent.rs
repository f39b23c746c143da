use std::collections::HashMap;
use std::sync::Arc;

use analyst_model::{
    CompletionRequest, FunctionCall, Message, MessageContent, ModelProvider, ResponseEvent, Role,
};
use analyst_tools::{ToolCall, ToolOutput, ToolRegistry};
use chrono::Utc;
use thiserror::Error;

use crate::capsule::extract_capsule;
use crate::session::Session;
use crate::types::{QueryMode, RunCapsule, RunStatus};

/// Fixed, user-facing reply substituted for the assistant's response when
/// the turn hits its recursion cap without producing a text-only answer.
pub const RECURSION_LIMIT_MESSAGE: &str =
    "I wasn't able to finish answering this within the allotted number of \
     steps. Please try rephrasing your question or breaking it into a \
     smaller request.";

#[derive(Debug, Error)]
pub enum AgentTurnError {
    #[error("agent hit its recursion limit without producing a final answer")]
    RecursionLimit,
    #[error("model completion failed: {0}")]
    Model(#[from] anyhow::Error),
}

/// Drives one reason-act turn: stream model text/tool-call events, dispatch
/// tool calls to the registry, append results, and repeat until the model
/// replies in text only or the round budget is exhausted.
pub struct Agent {
    pub session: Session,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    max_rounds: u32,
}

impl Agent {
    pub fn new(
        session: Session,
        tools: Arc<ToolRegistry>,
        model: Arc<dyn ModelProvider>,
        max_rounds: u32,
    ) -> Self {
        Self {
            session,
            tools,
            model,
            max_rounds,
        }
    }

    /// Runs one turn to completion. `dataset_id`/`question` are recorded
    /// into the resulting capsule; the caller is responsible for having
    /// already pushed the assembled system/history/user messages onto
    /// `self.session` before calling this.
    pub async fn run_turn(
        &mut self,
        run_id: impl Into<String>,
        dataset_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Result<(Vec<Message>, RunCapsule), AgentTurnError> {
        let dataset_id = dataset_id.into();
        let question = question.into();
        let turn_start = self.session.messages.len();
        let started = std::time::Instant::now();

        let mut rounds_left = self.max_rounds;
        loop {
            let tool_schemas: Vec<analyst_model::ToolSchema> = self
                .tools
                .schemas()
                .into_iter()
                .map(|s| analyst_model::ToolSchema {
                    name: s.name,
                    description: s.description,
                    parameters: s.parameters,
                })
                .collect();

            let req = CompletionRequest {
                messages: self.session.messages.clone(),
                tools: tool_schemas,
                stream: true,
            };

            let (text, tool_calls) = stream_one_turn(self.model.as_ref(), req).await?;

            if tool_calls.is_empty() {
                self.session.push(Message::assistant(text));
                break;
            }

            if rounds_left == 0 {
                return Err(AgentTurnError::RecursionLimit);
            }
            rounds_left -= 1;

            // Phase 1: push all assistant tool-call messages before any
            // tool-result message (parallel tool-call wire format).
            for tc in &tool_calls {
                self.session.push(Message {
                    role: Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: tc.id.clone(),
                        function: FunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.args.to_string(),
                        },
                    },
                });
            }

            // Phase 2: execute every tool call concurrently. One task
            // panicking never cancels its siblings.
            let mut tasks = Vec::with_capacity(tool_calls.len());
            for tc in tool_calls.clone() {
                let registry = Arc::clone(&self.tools);
                tasks.push(tokio::spawn(async move { registry.execute(&tc).await }));
            }

            let mut outputs: Vec<ToolOutput> = Vec::with_capacity(tool_calls.len());
            for (i, task) in tasks.into_iter().enumerate() {
                let output = match task.await {
                    Ok(output) => output,
                    Err(e) => ToolOutput::err(
                        &tool_calls[i].id,
                        format!("tool execution panicked: {e}"),
                    ),
                };
                outputs.push(output);
            }

            // Phase 3: push all tool-result messages.
            for output in &outputs {
                self.session
                    .push(Message::tool_result(&output.call_id, &output.content));
            }
        }

        let exec_time_ms = started.elapsed().as_millis() as u64;
        let trace = self.session.messages[turn_start..].to_vec();
        let (mut capsule, assistant_text) = extract_capsule(
            &trace,
            run_id,
            Utc::now(),
            dataset_id,
            None,
            question,
            exec_time_ms,
        );
        capsule.exec_time_ms = exec_time_ms;

        let _ = assistant_text;
        Ok((trace, capsule))
    }
}

/// Builds the fixed-message capsule+reply pair the orchestrator substitutes
/// when a turn fails via [`AgentTurnError::RecursionLimit`].
pub fn recursion_limit_capsule(
    run_id: impl Into<String>,
    dataset_id: impl Into<String>,
    question: impl Into<String>,
) -> RunCapsule {
    use analyst_sandbox::{RunOutcomeStatus, RunnerErrorDetail, RunnerErrorType, RunnerResult};

    RunCapsule {
        run_id: run_id.into(),
        created_at: Utc::now(),
        dataset_id: dataset_id.into(),
        dataset_version_hash: None,
        question: question.into(),
        query_mode: QueryMode::Chat,
        plan_json: None,
        compiled_sql: None,
        python_code: None,
        status: RunStatus::Failed,
        result_json: RunnerResult {
            status: RunOutcomeStatus::Error,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            exec_time_ms: 0,
            stdout_trunc: None,
            stderr_trunc: None,
            error: Some(RunnerErrorDetail {
                error_type: RunnerErrorType::AgentRecursionLimit,
                message: "Agent exceeded its round budget for this turn.".into(),
            }),
        },
        error_json: Some(RunnerErrorDetail {
            error_type: RunnerErrorType::AgentRecursionLimit,
            message: "Agent exceeded its round budget for this turn.".into(),
        }),
        exec_time_ms: 0,
    }
}

/// Streams one model completion to the end, accumulating text and any
/// tool calls (keyed by the provider's parallel-tool-call index).
async fn stream_one_turn(
    model: &dyn ModelProvider,
    req: CompletionRequest,
) -> anyhow::Result<(String, Vec<ToolCall>)> {
    use futures::StreamExt;

    let mut stream = model.complete(req).await?;

    let mut full_text = String::new();
    let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(delta) => full_text.push_str(&delta),
            ResponseEvent::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let ptc = pending.entry(index).or_insert_with(PendingToolCall::default);
                if !id.is_empty() {
                    ptc.id = id;
                }
                if !name.is_empty() {
                    ptc.name = name;
                }
                ptc.args_buf.push_str(&arguments);
            }
            ResponseEvent::Usage { .. } | ResponseEvent::Error(_) | ResponseEvent::Done => {}
        }
    }

    let mut ordered: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
    ordered.sort_by_key(|(idx, _)| *idx);

    let mut tool_calls = Vec::with_capacity(ordered.len());
    for (i, (_, ptc)) in ordered.into_iter().enumerate() {
        if ptc.name.is_empty() {
            continue;
        }
        let args = serde_json::from_str(&ptc.args_buf).unwrap_or(serde_json::Value::Null);
        let id = if ptc.id.is_empty() {
            format!("tc_synthetic_{i}")
        } else {
            ptc.id
        };
        tool_calls.push(ToolCall {
            id,
            name: ptc.name,
            args,
        });
    }

    Ok((full_text, tool_calls))
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}
