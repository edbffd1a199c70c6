//! SQLite-backed session summary cache.
//!
//! Raw logs remain the source of truth; the cache only avoids
//! re-parsing unchanged files during project scans. Rows are invalidated
//! by file size and mtime, never by content inspection.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use sessionlens_types::Session;

/// Staleness tolerance for mtime comparison, in seconds.
const MTIME_EPSILON: f64 = 0.001;

pub struct MetadataCache {
    conn: Connection,
}

impl MetadataCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open metadata cache {}", db_path.display()))?;
        // execute_batch tolerates the row that journal_mode returns
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let cache = Self { conn: Connection::open_in_memory()? };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session_metadata (
                session_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mtime REAL NOT NULL,
                first_message TEXT NOT NULL DEFAULT '',
                message_count INTEGER NOT NULL DEFAULT 0,
                is_ongoing INTEGER NOT NULL DEFAULT 0,
                git_branch TEXT NOT NULL DEFAULT '',
                created_at REAL NOT NULL,
                modified_at REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_project
            ON session_metadata(project_id);
            "#,
        )?;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT session_id, project_id, file_path, file_size, mtime,
                        first_message, message_count, is_ongoing, git_branch,
                        created_at, modified_at
                 FROM session_metadata WHERE session_id = ?1",
                [session_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// All cached sessions of a project, newest mtime first.
    pub fn get_for_project(&self, project_id: &str) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, project_id, file_path, file_size, mtime,
                    first_message, message_count, is_ongoing, git_branch,
                    created_at, modified_at
             FROM session_metadata
             WHERE project_id = ?1
             ORDER BY modified_at DESC",
        )?;

        let sessions = stmt
            .query_map([project_id], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn put(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session_metadata
             (session_id, project_id, file_path, file_size, mtime,
              first_message, message_count, is_ongoing, git_branch,
              created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &session.id,
                &session.project_id,
                &session.file_path,
                session.file_size as i64,
                session.modified_at,
                &session.first_message,
                session.message_count as i64,
                // Live state is never restored from here; see is_ongoing docs
                false,
                &session.git_branch,
                session.created_at,
                session.modified_at,
            ],
        )?;
        Ok(())
    }

    /// A row is stale on a miss, a size change, or an mtime drift above
    /// one millisecond.
    pub fn is_stale(&self, session_id: &str, file_size: u64, mtime: f64) -> Result<bool> {
        let row: Option<(i64, f64)> = self
            .conn
            .query_row(
                "SELECT file_size, mtime FROM session_metadata WHERE session_id = ?1",
                [session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            None => true,
            Some((cached_size, cached_mtime)) => {
                cached_size != file_size as i64 || (cached_mtime - mtime).abs() > MTIME_EPSILON
            }
        })
    }

    pub fn remove(&self, session_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM session_metadata WHERE session_id = ?1", [session_id])?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM session_metadata", [])?;
        Ok(())
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project_id: row.get(1)?,
        // Derived from the project id at runtime, not stored
        project_path: String::new(),
        file_path: row.get(2)?,
        file_size: row.get::<_, i64>(3)? as u64,
        created_at: row.get(9)?,
        modified_at: row.get(10)?,
        first_message: row.get(5)?,
        message_count: row.get::<_, i64>(6)? as u64,
        is_ongoing: false,
        git_branch: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session(id: &str, project_id: &str, mtime: f64) -> Session {
        Session {
            id: id.to_string(),
            project_id: project_id.to_string(),
            project_path: String::new(),
            file_path: format!("/tmp/{id}.jsonl"),
            file_size: 1024,
            created_at: mtime - 100.0,
            modified_at: mtime,
            first_message: "Fix the bug".to_string(),
            message_count: 42,
            is_ongoing: false,
            git_branch: "main".to_string(),
        }
    }

    #[test]
    fn test_put_and_get() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();

        let got = cache.get("s1").unwrap().unwrap();
        assert_eq!(got.id, "s1");
        assert_eq!(got.project_id, "p1");
        assert_eq!(got.first_message, "Fix the bug");
        assert_eq!(got.message_count, 42);
        assert_eq!(got.git_branch, "main");
    }

    #[test]
    fn test_get_missing_is_none() {
        let cache = MetadataCache::open_in_memory().unwrap();
        assert!(cache.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_get_for_project_newest_first() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("old", "p1", 1000.0)).unwrap();
        cache.put(&sample_session("new", "p1", 2000.0)).unwrap();
        cache.put(&sample_session("other", "p2", 3000.0)).unwrap();

        let sessions = cache.get_for_project("p1").unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_staleness_miss() {
        let cache = MetadataCache::open_in_memory().unwrap();
        assert!(cache.is_stale("missing", 100, 1000.0).unwrap());
    }

    #[test]
    fn test_staleness_size_change() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();

        assert!(!cache.is_stale("s1", 1024, 1000.0).unwrap());
        assert!(cache.is_stale("s1", 2048, 1000.0).unwrap());
    }

    #[test]
    fn test_staleness_mtime_tolerance() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();

        // Within one millisecond: fresh
        assert!(!cache.is_stale("s1", 1024, 1000.0005).unwrap());
        // Beyond one millisecond: stale
        assert!(cache.is_stale("s1", 1024, 1000.002).unwrap());
    }

    #[test]
    fn test_is_ongoing_never_persists() {
        let cache = MetadataCache::open_in_memory().unwrap();
        let mut session = sample_session("s1", "p1", 1000.0);
        session.is_ongoing = true;
        cache.put(&session).unwrap();

        assert!(!cache.get("s1").unwrap().unwrap().is_ongoing);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();
        cache.put(&sample_session("s2", "p1", 2000.0)).unwrap();

        cache.remove("s1").unwrap();
        assert!(cache.get("s1").unwrap().is_none());
        assert!(cache.get("s2").unwrap().is_some());

        cache.clear().unwrap();
        assert!(cache.get_for_project("p1").unwrap().is_empty());
    }

    #[test]
    fn test_put_replaces_existing_row() {
        let cache = MetadataCache::open_in_memory().unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();

        let mut updated = sample_session("s1", "p1", 2000.0);
        updated.message_count = 99;
        updated.project_id = "p2".to_string();
        cache.put(&updated).unwrap();

        let got = cache.get("s1").unwrap().unwrap();
        assert_eq!(got.message_count, 99);

        // The project index follows the primary row
        assert!(cache.get_for_project("p1").unwrap().is_empty());
        assert_eq!(cache.get_for_project("p2").unwrap().len(), 1);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");
        let cache = MetadataCache::open(&path).unwrap();
        cache.put(&sample_session("s1", "p1", 1000.0)).unwrap();
        drop(cache);

        let reopened = MetadataCache::open(&path).unwrap();
        assert!(reopened.get("s1").unwrap().is_some());
    }
}
