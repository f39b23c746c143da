use std::path::{Path, PathBuf};

use analyst_core::{MessageRole, ThreadMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::schema::open_and_init;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &ThreadMessage) -> anyhow::Result<()>;

    /// Returns up to `limit` most recent messages for the thread, in
    /// ascending (chronological) order.
    async fn recent(&self, thread_id: &str, limit: u32) -> anyhow::Result<Vec<ThreadMessage>>;
}

/// SQLite-backed thread message log. History is total and monotonic;
/// `recent` implements the "most-recent-N-but-ascending" read pattern this
/// store is grounded on: select the newest N by primary key, then reorder
/// ascending so callers see the window in conversation order.
pub struct SqliteMessageStore {
    db_path: PathBuf,
}

impl SqliteMessageStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        open_and_init(&db_path)?;
        Ok(Self { db_path })
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &ThreadMessage) -> anyhow::Result<()> {
        let conn = open_and_init(&self.db_path)?;
        conn.execute(
            "INSERT INTO thread_messages (
               thread_id, created_at, dataset_id, role, content, run_id, metadata_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.thread_id,
                message.created_at.to_rfc3339(),
                message.dataset_id,
                role_str(message.role),
                message.content,
                message.run_id,
                message
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        Ok(())
    }

    async fn recent(&self, thread_id: &str, limit: u32) -> anyhow::Result<Vec<ThreadMessage>> {
        let conn = open_and_init(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, created_at, dataset_id, role, content, run_id, metadata_json
             FROM (
               SELECT * FROM thread_messages
               WHERE thread_id = ?1
               ORDER BY id DESC
               LIMIT ?2
             ) recent
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![thread_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (thread_id, created_at, dataset_id, role, content, run_id, metadata_json) = row?;
            out.push(ThreadMessage {
                thread_id,
                created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
                dataset_id,
                role: parse_role(&role)?,
                content,
                run_id,
                metadata: metadata_json.map(|s| serde_json::from_str(&s)).transpose()?,
            });
        }
        Ok(out)
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn parse_role(s: &str) -> anyhow::Result<MessageRole> {
    Ok(match s {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        other => anyhow::bail!("unknown role in store: {other}"),
    })
}
