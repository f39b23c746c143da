use std::sync::Arc;

use analyst_core::{
    dataset_schema_fragment, prior_run_fragment, recursion_limit_capsule, role_and_mandate_fragment,
    Agent, AgentTurnError, MessageRole, QueryMode, RunCapsule, RunStatus, ThreadMessage,
    RECURSION_LIMIT_MESSAGE,
};
use analyst_datasets::dataset_schema;
use analyst_model::Message as ModelMessage;
use analyst_sandbox::{RunOutcomeStatus, RunnerErrorType, RunnerResult};
use analyst_tools::ToolCall;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::fastpath::classify_fast_path;
use crate::http::dto::{ChatResponse, Details, ResultDto, StreamEvent};
use crate::state::AppState;
use crate::summarize::summarize_result;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Drives one chat turn end to end: persistence, fast-path/agent-path
/// branching, and the uniform response shape, mirroring the five
/// responsibilities this server's turn handling is grounded on.
pub struct SessionOrchestrator {
    state: AppState,
}

impl SessionOrchestrator {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn handle_turn(
        &self,
        dataset_id: &str,
        message: &str,
        thread_id: Option<String>,
    ) -> Result<ChatResponse, OrchestratorError> {
        let (run_id, thread_id, history, ds_content_hash) =
            self.begin_turn(dataset_id, message, thread_id).await?;

        let (capsule, assistant_message) = match classify_fast_path(message) {
            Some((mode, code)) => self.run_fast_path(&run_id, dataset_id, mode, &code).await?,
            None => {
                self.run_agent_path(&run_id, dataset_id, message, &history)
                    .await?
            }
        };

        self.finish_turn(capsule, assistant_message, thread_id, ds_content_hash)
            .await
    }

    /// Streaming variant: emits typed events over `tx` while the turn
    /// executes, ending in exactly one `done` (optionally preceded by an
    /// `error`). Agent-path tool activity is replayed from the completed
    /// turn's trace rather than streamed incrementally — the turn engine
    /// does not expose intermediate tool-call/tool-result hooks, only a
    /// completed `(trace, capsule)` pair, so this reconstructs the same
    /// event sequence after the fact instead of threading a channel
    /// through `Agent::run_turn`. Token text is likewise emitted as one
    /// chunk containing the full reply, not per-model-delta.
    pub async fn handle_turn_streaming(
        &self,
        dataset_id: &str,
        message: &str,
        thread_id: Option<String>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let _ = tx
            .send(StreamEvent::Status {
                stage: "planning".into(),
            })
            .await;

        let begin = self.begin_turn(dataset_id, message, thread_id).await;
        let (run_id, thread_id, history, ds_content_hash) = match begin {
            Ok(v) => v,
            Err(e) => {
                send_error(&tx, &e).await;
                let _ = tx.send(StreamEvent::Done { run_id: String::new() }).await;
                return;
            }
        };

        let fast_path = classify_fast_path(message);
        let is_fast_path = fast_path.is_some();
        let _ = tx
            .send(StreamEvent::Status {
                stage: if fast_path.is_some() {
                    "executing"
                } else {
                    "reasoning"
                }
                .into(),
            })
            .await;

        let outcome = match fast_path {
            Some((mode, code)) => self.run_fast_path(&run_id, dataset_id, mode, &code).await,
            None => {
                let outcome = self
                    .run_agent_path(&run_id, dataset_id, message, &history)
                    .await;
                if let Ok((capsule, _)) = &outcome {
                    // The turn engine only hands back a completed trace, not
                    // a live hook per tool call, so the one execution tool a
                    // capsule ever records is replayed here as a single
                    // call/result pair rather than streamed as it happens.
                    if capsule.compiled_sql.is_some() || capsule.python_code.is_some() {
                        let name = if capsule.compiled_sql.is_some() {
                            "execute_sql"
                        } else {
                            "execute_python"
                        };
                        let _ = tx
                            .send(StreamEvent::ToolCall {
                                name: name.to_string(),
                                args: serde_json::json!({"dataset_id": capsule.dataset_id}),
                            })
                            .await;
                        let _ = tx
                            .send(StreamEvent::ToolResult {
                                name: name.to_string(),
                                is_error: capsule.error_json.is_some(),
                            })
                            .await;
                    }
                }
                outcome
            }
        };

        let (capsule, assistant_message) = match outcome {
            Ok(v) => v,
            Err(e) => {
                send_error(&tx, &e).await;
                let _ = tx.send(StreamEvent::Done { run_id }).await;
                return;
            }
        };

        // Fast paths make no model call, so no token text is ever produced;
        // synthetic status events bracket a single result/done pair instead.
        if !is_fast_path {
            let _ = tx
                .send(StreamEvent::Token {
                    text: assistant_message.clone(),
                })
                .await;
        }

        match self
            .finish_turn(capsule, assistant_message, thread_id, ds_content_hash)
            .await
        {
            Ok(response) => {
                let run_id = response.run_id.clone();
                let _ = tx.send(StreamEvent::Result { response }).await;
                let _ = tx.send(StreamEvent::Done { run_id }).await;
            }
            Err(e) => {
                send_error(&tx, &e).await;
                let _ = tx.send(StreamEvent::Done { run_id }).await;
            }
        }
    }

    /// Step 1 of the per-turn responsibilities: mint the run id, load the
    /// thread's recent history, and persist the new user message before
    /// the model or any tool is ever invoked.
    async fn begin_turn(
        &self,
        dataset_id: &str,
        message: &str,
        thread_id: Option<String>,
    ) -> Result<(String, String, Vec<ThreadMessage>, Option<String>), OrchestratorError> {
        let ds = self
            .state
            .datasets
            .get(dataset_id)
            .map_err(|_| OrchestratorError::DatasetNotFound(dataset_id.to_string()))?;
        let content_hash = ds.content_hash.clone();

        let run_id = Uuid::new_v4().to_string();
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let history = self
            .state
            .messages
            .recent(&thread_id, self.state.agent.thread_history_window as u32)
            .await?;

        self.state
            .messages
            .append(&ThreadMessage {
                thread_id: thread_id.clone(),
                created_at: Utc::now(),
                dataset_id: dataset_id.to_string(),
                role: MessageRole::User,
                content: message.to_string(),
                run_id: Some(run_id.clone()),
                metadata: None,
            })
            .await?;

        Ok((run_id, thread_id, history, content_hash))
    }

    /// Fast path: dispatch the appropriate execution tool directly and
    /// summarize the result deterministically — no model call at all.
    async fn run_fast_path(
        &self,
        run_id: &str,
        dataset_id: &str,
        mode: QueryMode,
        code: &str,
    ) -> Result<(RunCapsule, String), OrchestratorError> {
        let tool_name = match mode {
            QueryMode::Sql => "execute_sql",
            QueryMode::Python => "execute_python",
            QueryMode::Chat | QueryMode::Plan => unreachable!("fast path only yields sql/python"),
        };
        let args = match mode {
            QueryMode::Sql => serde_json::json!({"dataset_id": dataset_id, "sql": code}),
            _ => serde_json::json!({"dataset_id": dataset_id, "python_code": code}),
        };

        let tool = self
            .state
            .tools
            .get(tool_name)
            .expect("execution tools are always registered");
        let output = tool
            .execute(&ToolCall {
                id: run_id.to_string(),
                name: tool_name.to_string(),
                args,
            })
            .await;

        let result: RunnerResult = serde_json::from_str(&output.content)
            .unwrap_or_else(|_| RunnerResult::error(RunnerErrorType::RunnerInternalError, output.content.clone()));
        let envelope: serde_json::Value =
            serde_json::from_str(&output.content).unwrap_or(serde_json::Value::Null);
        let compiled_sql = envelope
            .get("compiled_sql")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let python_code = envelope
            .get("python_code")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let status = derive_fast_path_status(&result);
        let assistant_message = summarize_result(&result);

        let capsule = RunCapsule {
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            dataset_id: dataset_id.to_string(),
            dataset_version_hash: None,
            question: format!(
                "{}: {code}",
                if mode == QueryMode::Sql { "sql" } else { "python" }
            ),
            query_mode: mode,
            plan_json: None,
            compiled_sql,
            python_code,
            status,
            error_json: result.error.clone(),
            exec_time_ms: result.exec_time_ms,
            result_json: result,
        };

        Ok((capsule, assistant_message))
    }

    /// Agent path: assemble the system prompt (role/mandate + schema +
    /// optional prior-run context), replay recent history, and run the
    /// reason-act loop to completion.
    async fn run_agent_path(
        &self,
        run_id: &str,
        dataset_id: &str,
        message: &str,
        history: &[ThreadMessage],
    ) -> Result<(RunCapsule, String), OrchestratorError> {
        let projection = dataset_schema(&self.state.datasets, dataset_id)?;

        let mut system_prompt = role_and_mandate_fragment();
        system_prompt.push_str("\n\n");
        system_prompt.push_str(&dataset_schema_fragment(&projection));

        if let Some(prior) = self.last_succeeded_capsule(history).await {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&prior_run_fragment(&prior));
        }

        let mut session = self.state.new_session();
        session.push(ModelMessage::system(system_prompt));
        for m in history {
            session.push(match m.role {
                MessageRole::User => ModelMessage::user(&m.content),
                MessageRole::Assistant => ModelMessage::assistant(&m.content),
            });
        }
        session.push(ModelMessage::user(message));

        let mut agent = Agent::new(
            session,
            Arc::clone(&self.state.tools),
            Arc::clone(&self.state.model),
            self.state.agent.max_rounds,
        );

        match agent.run_turn(run_id, dataset_id, message).await {
            Ok((trace, capsule)) => {
                let assistant_message = trace
                    .iter()
                    .rev()
                    .find_map(|m| m.as_text().map(str::to_string))
                    .unwrap_or_default();
                Ok((capsule, assistant_message))
            }
            Err(AgentTurnError::RecursionLimit) => Ok((
                recursion_limit_capsule(run_id, dataset_id, message),
                RECURSION_LIMIT_MESSAGE.to_string(),
            )),
            Err(AgentTurnError::Model(e)) => Err(OrchestratorError::Internal(e)),
        }
    }

    /// Looks up the capsule behind the most recent assistant message in
    /// `history` that has a run id, for use as optional follow-up context.
    /// Only a succeeded prior run is worth summarizing into the prompt.
    async fn last_succeeded_capsule(&self, history: &[ThreadMessage]) -> Option<RunCapsule> {
        let run_id = history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && m.run_id.is_some())?
            .run_id
            .clone()?;
        let capsule = self.state.capsules.get(&run_id).await.ok()??;
        (capsule.status == RunStatus::Succeeded).then_some(capsule)
    }

    /// Steps 3-5 shared by both paths: persist the capsule and the
    /// assistant's reply, then build the uniform response object.
    async fn finish_turn(
        &self,
        mut capsule: RunCapsule,
        assistant_message: String,
        thread_id: String,
        ds_content_hash: Option<String>,
    ) -> Result<ChatResponse, OrchestratorError> {
        capsule.dataset_version_hash = ds_content_hash;
        self.state.capsules.insert(&capsule).await?;

        self.state
            .messages
            .append(&ThreadMessage {
                thread_id: thread_id.clone(),
                created_at: Utc::now(),
                dataset_id: capsule.dataset_id.clone(),
                role: MessageRole::Assistant,
                content: assistant_message.clone(),
                run_id: Some(capsule.run_id.clone()),
                metadata: None,
            })
            .await?;

        Ok(ChatResponse {
            assistant_message,
            run_id: capsule.run_id.clone(),
            thread_id,
            status: capsule.status,
            result: ResultDto {
                columns: capsule.result_json.columns.clone(),
                rows: capsule.result_json.rows.clone(),
                row_count: capsule.result_json.row_count,
                exec_time_ms: capsule.result_json.exec_time_ms,
                error: capsule.error_json.clone(),
            },
            details: Details {
                dataset_id: capsule.dataset_id,
                query_mode: capsule.query_mode,
                plan_json: capsule.plan_json,
                compiled_sql: capsule.compiled_sql,
                python_code: capsule.python_code,
            },
        })
    }
}

fn derive_fast_path_status(result: &RunnerResult) -> RunStatus {
    match result.status {
        RunOutcomeStatus::Success => RunStatus::Succeeded,
        RunOutcomeStatus::Timeout => RunStatus::TimedOut,
        RunOutcomeStatus::Error => match result.error.as_ref().map(|e| e.error_type) {
            Some(RunnerErrorType::Timeout) => RunStatus::TimedOut,
            Some(RunnerErrorType::SqlPolicyViolation) | Some(RunnerErrorType::FeatureDisabled) => {
                RunStatus::Rejected
            }
            _ => RunStatus::Failed,
        },
    }
}

async fn send_error(tx: &mpsc::Sender<StreamEvent>, e: &OrchestratorError) {
    let error_type = match e {
        OrchestratorError::DatasetNotFound(_) => "NOT_FOUND",
        OrchestratorError::Internal(_) => "RUNNER_INTERNAL_ERROR",
    };
    let _ = tx
        .send(StreamEvent::Error {
            error_type: error_type.to_string(),
            message: e.to_string(),
        })
        .await;
}
