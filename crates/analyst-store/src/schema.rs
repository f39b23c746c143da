use std::path::Path;

use rusqlite::Connection;

/// Opens (creating if absent) the shared sqlite file and ensures both
/// tables and their indices exist. Also runs the `python_code` column
/// migration for databases created before that column existed, mirroring
/// the storage module this crate is grounded on.
pub(crate) fn open_and_init(path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS run_capsules (
          run_id TEXT PRIMARY KEY,
          created_at TEXT NOT NULL,
          dataset_id TEXT NOT NULL,
          dataset_version_hash TEXT,
          question TEXT,
          query_mode TEXT NOT NULL,
          plan_json TEXT,
          compiled_sql TEXT,
          python_code TEXT,
          status TEXT NOT NULL,
          result_json TEXT,
          error_json TEXT,
          exec_time_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_run_capsules_created_at ON run_capsules(created_at);
        CREATE INDEX IF NOT EXISTS idx_run_capsules_dataset_id ON run_capsules(dataset_id);

        CREATE TABLE IF NOT EXISTS thread_messages (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          thread_id TEXT NOT NULL,
          created_at TEXT NOT NULL,
          dataset_id TEXT,
          role TEXT NOT NULL,
          content TEXT NOT NULL,
          run_id TEXT,
          metadata_json TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_thread_messages_thread_id ON thread_messages(thread_id);
        CREATE INDEX IF NOT EXISTS idx_thread_messages_thread_id_id ON thread_messages(thread_id, id);
        ",
    )?;

    let has_python_code: bool = conn
        .prepare("PRAGMA table_info(run_capsules)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == "python_code");
    if !has_python_code {
        conn.execute("ALTER TABLE run_capsules ADD COLUMN python_code TEXT", [])?;
    }

    Ok(conn)
}
