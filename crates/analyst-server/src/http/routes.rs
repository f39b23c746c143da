use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use analyst_datasets::dataset_schema;

use crate::http::dto::{
    ChatRequest, ChatResponse, MessagesQuery, RunQueryType, RunStatusDto, RunSubmitRequest,
    StreamEvent,
};
use crate::http::error::ApiError;
use crate::orchestrator::SessionOrchestrator;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/datasets", get(list_datasets))
        .route("/datasets/:dataset_id/schema", get(get_dataset_schema))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/runs", post(submit_run))
        .route("/runs/:run_id", get(get_run))
        .route("/runs/:run_id/status", get(get_run_status))
        .route("/threads/:thread_id/messages", get(thread_messages))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn home() -> Html<&'static str> {
    Html(include_str!("../../templates/home.html"))
}

async fn list_datasets(State(state): State<AppState>) -> Json<Vec<analyst_datasets::DatasetDescriptor>> {
    Json(state.datasets.list().to_vec())
}

async fn get_dataset_schema(
    State(state): State<AppState>,
    Path(dataset_id): Path<String>,
) -> Result<Json<analyst_datasets::DatasetSchemaProjection>, ApiError> {
    let projection = dataset_schema(&state.datasets, &dataset_id)
        .map_err(|_| ApiError::NotFound(format!("unknown dataset: {dataset_id}")))?;
    Ok(Json(projection))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let orchestrator = SessionOrchestrator::new(state);
    let response = orchestrator
        .handle_turn(&req.dataset_id, &req.message, req.thread_id)
        .await?;
    Ok(Json(response))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let orchestrator = SessionOrchestrator::new(state);

    tokio::spawn(async move {
        orchestrator
            .handle_turn_streaming(&req.dataset_id, &req.message, req.thread_id, tx)
            .await;
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|event| {
        let event_name = stream_event_name(&event);
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event_name).data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn stream_event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Status { .. } => "status",
        StreamEvent::Token { .. } => "token",
        StreamEvent::ToolCall { .. } => "tool_call",
        StreamEvent::ToolResult { .. } => "tool_result",
        StreamEvent::Result { .. } => "result",
        StreamEvent::Error { .. } => "error",
        StreamEvent::Done { .. } => "done",
    }
}

/// Direct run submission: the same fast-path tool dispatch `/chat` uses for
/// a `sql:`/`python:`-prefixed message, addressed by an explicit
/// `query_type` instead of a message prefix. Query-plan submissions go
/// through the agent-path execution tool directly rather than the
/// classifier, since plans have no textual fast-path prefix.
async fn submit_run(
    State(state): State<AppState>,
    Json(req): Json<RunSubmitRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = match req.query_type {
        RunQueryType::Sql => format!("sql: {}", req.sql.unwrap_or_default()),
        RunQueryType::Python => format!("python: {}", req.python_code.unwrap_or_default()),
        RunQueryType::Plan => {
            return Err(ApiError::BadRequest(
                "query_type \"plan\" is not yet supported via /runs; use /chat".to_string(),
            ))
        }
    };

    let orchestrator = SessionOrchestrator::new(state);
    let response = orchestrator
        .handle_turn(&req.dataset_id, &message, req.thread_id)
        .await?;
    Ok(Json(response))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<analyst_core::RunCapsule>, ApiError> {
    let capsule = state
        .capsules
        .get(&run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown run: {run_id}")))?;
    Ok(Json(capsule))
}

async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Json<RunStatusDto> {
    let status = match state.capsules.get(&run_id).await {
        Ok(Some(capsule)) => run_status_str(capsule.status).to_string(),
        _ => "not_found".to_string(),
    };
    Json(RunStatusDto { run_id, status })
}

fn run_status_str(status: analyst_core::RunStatus) -> &'static str {
    match status {
        analyst_core::RunStatus::Succeeded => "succeeded",
        analyst_core::RunStatus::Failed => "failed",
        analyst_core::RunStatus::Rejected => "rejected",
        analyst_core::RunStatus::TimedOut => "timed_out",
    }
}

async fn thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<analyst_core::ThreadMessage>>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200) as u32;
    let messages = state.messages.recent(&thread_id, limit).await?;
    Ok(Json(messages))
}
