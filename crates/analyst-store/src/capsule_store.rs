use std::path::{Path, PathBuf};

use analyst_core::{QueryMode, RunCapsule, RunStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::schema::open_and_init;

#[async_trait]
pub trait CapsuleStore: Send + Sync {
    async fn insert(&self, capsule: &RunCapsule) -> anyhow::Result<()>;
    async fn get(&self, run_id: &str) -> anyhow::Result<Option<RunCapsule>>;
}

/// SQLite-backed capsule store. Grounded on the Python storage module this
/// crate supersedes: one row per completed turn, `run_id` as primary key,
/// JSON columns for the plan/result/error blobs.
pub struct SqliteCapsuleStore {
    db_path: PathBuf,
}

impl SqliteCapsuleStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        open_and_init(&db_path)?;
        Ok(Self { db_path })
    }
}

#[async_trait]
impl CapsuleStore for SqliteCapsuleStore {
    async fn insert(&self, capsule: &RunCapsule) -> anyhow::Result<()> {
        let conn = open_and_init(&self.db_path)?;
        conn.execute(
            "INSERT INTO run_capsules (
               run_id, created_at, dataset_id, dataset_version_hash, question,
               query_mode, plan_json, compiled_sql, python_code, status,
               result_json, error_json, exec_time_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                capsule.run_id,
                capsule.created_at.to_rfc3339(),
                capsule.dataset_id,
                capsule.dataset_version_hash,
                capsule.question,
                query_mode_str(capsule.query_mode),
                capsule
                    .plan_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                capsule.compiled_sql,
                capsule.python_code,
                run_status_str(capsule.status),
                serde_json::to_string(&capsule.result_json)?,
                capsule
                    .error_json
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                capsule.exec_time_ms,
            ],
        )?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> anyhow::Result<Option<RunCapsule>> {
        let conn = open_and_init(&self.db_path)?;
        let row = conn
            .query_row(
                "SELECT run_id, created_at, dataset_id, dataset_version_hash, question,
                        query_mode, plan_json, compiled_sql, python_code, status,
                        result_json, error_json, exec_time_ms
                 FROM run_capsules WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                        row.get::<_, u64>(12)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            run_id,
            created_at,
            dataset_id,
            dataset_version_hash,
            question,
            query_mode,
            plan_json,
            compiled_sql,
            python_code,
            status,
            result_json,
            error_json,
            exec_time_ms,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(RunCapsule {
            run_id,
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            dataset_id,
            dataset_version_hash,
            question: question.unwrap_or_default(),
            query_mode: parse_query_mode(&query_mode)?,
            plan_json: plan_json.map(|s| serde_json::from_str(&s)).transpose()?,
            compiled_sql,
            python_code,
            status: parse_run_status(&status)?,
            result_json: serde_json::from_str(
                &result_json.unwrap_or_else(|| "{\"status\":\"error\"}".to_string()),
            )?,
            error_json: error_json.map(|s| serde_json::from_str(&s)).transpose()?,
            exec_time_ms,
        }))
    }
}

fn query_mode_str(mode: QueryMode) -> &'static str {
    match mode {
        QueryMode::Chat => "chat",
        QueryMode::Sql => "sql",
        QueryMode::Plan => "plan",
        QueryMode::Python => "python",
    }
}

fn parse_query_mode(s: &str) -> anyhow::Result<QueryMode> {
    Ok(match s {
        "chat" => QueryMode::Chat,
        "sql" => QueryMode::Sql,
        "plan" => QueryMode::Plan,
        "python" => QueryMode::Python,
        other => anyhow::bail!("unknown query_mode in store: {other}"),
    })
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
        RunStatus::Rejected => "rejected",
        RunStatus::TimedOut => "timed_out",
    }
}

fn parse_run_status(s: &str) -> anyhow::Result<RunStatus> {
    Ok(match s {
        "succeeded" => RunStatus::Succeeded,
        "failed" => RunStatus::Failed,
        "rejected" => RunStatus::Rejected,
        "timed_out" => RunStatus::TimedOut,
        other => anyhow::bail!("unknown status in store: {other}"),
    })
}
