use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

use crate::model::Run;
use crate::session::SessionStatus;

/// Answer to a cache-check query, used to decide between auto-loading cached
/// data and prompting for a new collection.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub exists: bool,
    pub last_updated: Option<String>,
    pub total_runs: i64,
    pub is_complete: bool,
}

const KEY_SESSION_STATUS: &str = "session_status";
const KEY_CURRENT_REPO: &str = "current_repo";

/// Durable key/value cache backing the run store.
///
/// Holds the runs list keyed by repository, the streaming status object, and
/// the current-repository pointer, so a load-from-cache path can rehydrate
/// the aggregation pipeline without restarting the stream.
pub struct CacheDb {
    conn: Mutex<Connection>,
}

impl CacheDb {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS repo_runs (
                repo TEXT PRIMARY KEY,
                runs_json TEXT NOT NULL,
                is_complete INTEGER NOT NULL DEFAULT 0,
                total_runs INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        ",
        )?;
        Ok(())
    }

    pub fn store_runs(&self, repo: &str, runs: &[Run], is_complete: bool) -> anyhow::Result<()> {
        let runs_json = serde_json::to_string(runs)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO repo_runs (repo, runs_json, is_complete, total_runs, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![repo, runs_json, is_complete as i32, runs.len() as i64, now],
        )?;
        Ok(())
    }

    pub fn load_runs(&self, repo: &str) -> anyhow::Result<Option<(Vec<Run>, bool)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT runs_json, is_complete FROM repo_runs WHERE repo = ?1",
                [repo],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? != 0,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((json, is_complete)) => {
                let runs: Vec<Run> = serde_json::from_str(&json)?;
                Ok(Some((runs, is_complete)))
            }
            None => Ok(None),
        }
    }

    pub fn mark_complete(&self, repo: &str) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE repo_runs SET is_complete = 1, last_updated = ?2 WHERE repo = ?1",
            rusqlite::params![repo, now],
        )?;
        Ok(())
    }

    pub fn cache_status(&self, repo: &str) -> anyhow::Result<CacheStatus> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT last_updated, total_runs, is_complete FROM repo_runs WHERE repo = ?1",
                [repo],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)? != 0,
                    ))
                },
            )
            .optional()?;
        Ok(match row {
            Some((last_updated, total_runs, is_complete)) => CacheStatus {
                exists: true,
                last_updated: Some(last_updated),
                total_runs,
                is_complete,
            },
            None => CacheStatus {
                exists: false,
                last_updated: None,
                total_runs: 0,
                is_complete: false,
            },
        })
    }

    pub fn clear(&self, repo: Option<&str>) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        match repo {
            Some(key) => {
                conn.execute("DELETE FROM repo_runs WHERE repo = ?1", [key])?;
            }
            None => {
                conn.execute("DELETE FROM repo_runs", [])?;
                conn.execute(
                    "DELETE FROM kv_state WHERE key IN (?1, ?2)",
                    [KEY_SESSION_STATUS, KEY_CURRENT_REPO],
                )?;
            }
        }
        Ok(())
    }

    pub fn save_status(&self, status: &SessionStatus) -> anyhow::Result<()> {
        let value = serde_json::to_string(status)?;
        self.put_kv(KEY_SESSION_STATUS, &value)
    }

    pub fn load_status(&self) -> anyhow::Result<Option<SessionStatus>> {
        Ok(self
            .get_kv(KEY_SESSION_STATUS)?
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    pub fn set_current_repo(&self, repo: &str) -> anyhow::Result<()> {
        self.put_kv(KEY_CURRENT_REPO, repo)
    }

    pub fn current_repo(&self) -> anyhow::Result<Option<String>> {
        self.get_kv(KEY_CURRENT_REPO)
    }

    fn put_kv(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO kv_state (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    fn get_kv(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv_state WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }
}
