use std::sync::Arc;

use analyst_config::{AgentConfig, SandboxConfig};
use analyst_datasets::Registry;
use analyst_model::ScriptedMockProvider;
use analyst_sandbox::MockExecutor;
use analyst_server::http::dto::StreamEvent;
use analyst_server::{AppState, SessionOrchestrator};
use analyst_store::{SqliteCapsuleStore, SqliteMessageStore};
use analyst_tools::build_registry;
use serde_json::json;
use tokio::sync::mpsc;

fn registry_with_orders_dataset(dir: &std::path::Path) -> Arc<Registry> {
    std::fs::write(
        dir.join("registry.json"),
        br#"{"datasets": [{"id": "ecommerce", "name": "E-commerce", "files": [
            {"name": "orders.csv", "path": "ecommerce/orders.csv", "schema": {}}
        ]}]}"#,
    )
    .unwrap();
    Arc::new(Registry::load(dir).unwrap())
}

fn state_with(
    dir: &tempfile::TempDir,
    datasets: Arc<Registry>,
    executor: Arc<MockExecutor>,
    model: ScriptedMockProvider,
) -> AppState {
    let sandbox = SandboxConfig::default();
    let tools = Arc::new(build_registry(
        Arc::clone(&datasets),
        executor,
        sandbox.clone(),
    ));
    let db_path = dir.path().join("test.sqlite3");
    AppState {
        datasets,
        tools,
        model: Arc::new(model),
        capsules: Arc::new(SqliteCapsuleStore::open(&db_path).unwrap()),
        messages: Arc::new(SqliteMessageStore::open(&db_path).unwrap()),
        sandbox,
        agent: AgentConfig::default(),
    }
}

#[tokio::test]
async fn fast_path_sql_prefix_skips_the_model_and_persists_a_capsule() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = registry_with_orders_dataset(dir.path());
    let executor = Arc::new(MockExecutor::always_success(
        vec!["order_id".into()],
        vec![vec![json!(1)], vec![json!(2)]],
    ));
    // A model that would error if ever invoked: fast path must never call it.
    let model = ScriptedMockProvider::new(vec![]);
    let state = state_with(&dir, datasets, executor, model);
    let orchestrator = SessionOrchestrator::new(state.clone());

    let response = orchestrator
        .handle_turn("ecommerce", "sql: SELECT * FROM orders", None)
        .await
        .unwrap();

    assert_eq!(response.result.row_count, 2);
    assert_eq!(response.details.compiled_sql.as_deref(), Some("SELECT * FROM orders"));
    assert!(response.assistant_message.contains("2 row"));

    let capsule = state.capsules.get(&response.run_id).await.unwrap().unwrap();
    assert_eq!(capsule.status, analyst_core::RunStatus::Succeeded);
}

#[tokio::test]
async fn fast_path_rejects_unknown_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = registry_with_orders_dataset(dir.path());
    let executor = Arc::new(MockExecutor::always_success(vec![], vec![]));
    let model = ScriptedMockProvider::new(vec![]);
    let state = state_with(&dir, datasets, executor, model);
    let orchestrator = SessionOrchestrator::new(state);

    let err = orchestrator
        .handle_turn("nope", "sql: SELECT 1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, analyst_server::OrchestratorError::DatasetNotFound(_)));
}

#[tokio::test]
async fn agent_path_runs_a_full_turn_and_persists_thread_history() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = registry_with_orders_dataset(dir.path());
    let executor = Arc::new(MockExecutor::always_success(
        vec!["n".into()],
        vec![vec![json!(7)]],
    ));
    let model = ScriptedMockProvider::tool_then_text(
        "call-1",
        "execute_sql",
        r#"{"dataset_id":"ecommerce","sql":"SELECT COUNT(*) AS n FROM orders"}"#,
        "There are 7 orders.",
    );
    let state = state_with(&dir, datasets, executor, model);
    let orchestrator = SessionOrchestrator::new(state.clone());

    let response = orchestrator
        .handle_turn("ecommerce", "how many orders are there?", None)
        .await
        .unwrap();

    assert_eq!(response.assistant_message, "There are 7 orders.");
    assert_eq!(response.status, analyst_core::RunStatus::Succeeded);

    let history = state.messages.recent(&response.thread_id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, analyst_core::MessageRole::User);
    assert_eq!(history[1].role, analyst_core::MessageRole::Assistant);
}

#[tokio::test]
async fn second_turn_on_same_thread_sees_prior_history() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = registry_with_orders_dataset(dir.path());
    let executor = Arc::new(MockExecutor::always_success(vec![], vec![]));
    let model = ScriptedMockProvider::always_text("ok");
    let state = state_with(&dir, datasets, executor, model);
    let orchestrator = SessionOrchestrator::new(state);

    let first = orchestrator
        .handle_turn("ecommerce", "sql: SELECT 1", None)
        .await
        .unwrap();
    let second = orchestrator
        .handle_turn("ecommerce", "what about yesterday?", Some(first.thread_id.clone()))
        .await
        .unwrap();

    assert_eq!(second.thread_id, first.thread_id);
    assert_ne!(second.run_id, first.run_id);
}

#[tokio::test]
async fn streaming_fast_path_emits_planning_then_executing_then_result_then_done() {
    let dir = tempfile::tempdir().unwrap();
    let datasets = registry_with_orders_dataset(dir.path());
    let executor = Arc::new(MockExecutor::always_success(
        vec!["order_id".into()],
        vec![vec![json!(1)]],
    ));
    let model = ScriptedMockProvider::new(vec![]);
    let state = state_with(&dir, datasets, executor, model);
    let orchestrator = SessionOrchestrator::new(state);

    let (tx, mut rx) = mpsc::channel(16);
    orchestrator
        .handle_turn_streaming("ecommerce", "sql: SELECT * FROM orders", None, tx)
        .await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(
        matches!(&events[0], StreamEvent::Status { stage } if stage == "planning"),
        "expected first event to be status(planning), got {:?}",
        events[0]
    );
    assert!(
        matches!(&events[1], StreamEvent::Status { stage } if stage == "executing"),
        "expected second event to be status(executing), got {:?}",
        events[1]
    );
    assert!(
        events
            .iter()
            .all(|e| !matches!(e, StreamEvent::Token { .. })),
        "fast path must not emit a token event"
    );
    let run_id = match events.last() {
        Some(StreamEvent::Done { run_id }) => run_id.clone(),
        other => panic!("expected last event to be done, got {other:?}"),
    };
    assert!(!run_id.is_empty());
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::Result { response } if response.run_id == run_id)));
}
