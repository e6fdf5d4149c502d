//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Every logical operation runs inside one transaction; bulk statements are
//! chunked so no single statement binds more than a few hundred parameters.

use crate::state::{ArticleState, RunStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{Article, Graph, QueueCounts, RunRecord};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashSet;
use std::path::Path;

/// Maximum number of rows written by one bulk statement
const CHUNK_SIZE: usize = 50;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates a database file and ensures the schema exists
    ///
    /// Missing parent directories are created.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Opens a database file that must already exist
    ///
    /// Unlike [`SqliteStorage::new`] this never creates the file or its
    /// directories, so read-only commands cannot mistake a wrong path for
    /// an empty crawl.
    pub fn open_existing(path: &Path) -> StorageResult<Self> {
        if !path.is_file() {
            return Err(StorageError::DatabaseNotFound(path.to_path_buf()));
        }
        Self::new(path)
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl ToSql for ArticleState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_value()))
    }
}

impl FromSql for ArticleState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        ArticleState::from_db_value(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        identifier: row.get(1)?,
        state: row.get(2)?,
        discovered_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Reads a run row; the inner error reports a status this build does not know
fn row_to_run(row: &Row<'_>) -> rusqlite::Result<StorageResult<RunRecord>> {
    let raw_status: String = row.get(4)?;
    let Some(status) = RunStatus::from_db_string(&raw_status) else {
        return Ok(Err(StorageError::InvalidRunStatus(raw_status)));
    };

    Ok(Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status,
        recovered_articles: row.get::<_, i64>(5)? as u64,
        started_batches: row.get::<_, i64>(6)? as u64,
    }))
}

/// Drops repeated identifiers, keeping the first occurrence
fn dedupe(identifiers: &[String]) -> Vec<&String> {
    let mut seen = HashSet::with_capacity(identifiers.len());
    identifiers
        .iter()
        .filter(|identifier| seen.insert(identifier.as_str()))
        .collect()
}

/// Inserts unknown identifiers as queued; known ones are left untouched
fn insert_queued<S: AsRef<str>>(
    conn: &Connection,
    identifiers: &[S],
    timestamp: &str,
) -> rusqlite::Result<usize> {
    let mut inserted = 0;

    for chunk in identifiers.chunks(CHUNK_SIZE) {
        let placeholders = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO articles (identifier, state, discovered_at, updated_at) VALUES {}",
            placeholders
        );
        let values = chunk.iter().flat_map(|identifier| {
            [
                Value::Text(identifier.as_ref().to_string()),
                Value::Integer(ArticleState::Queued.to_db_value()),
                Value::Text(timestamp.to_string()),
                Value::Text(timestamp.to_string()),
            ]
        });
        inserted += conn.execute(&sql, params_from_iter(values))?;
    }

    Ok(inserted)
}

fn insert_mappings<S: AsRef<str>>(
    conn: &Connection,
    source: &str,
    targets: &[S],
) -> rusqlite::Result<()> {
    for chunk in targets.chunks(CHUNK_SIZE) {
        let placeholders = vec!["(?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO mappings (source_identifier, target_identifier) VALUES {}",
            placeholders
        );
        let values = chunk.iter().flat_map(|target| {
            [
                Value::Text(source.to_string()),
                Value::Text(target.as_ref().to_string()),
            ]
        });
        conn.execute(&sql, params_from_iter(values))?;
    }

    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Work Queue =====

    fn enqueue(&mut self, identifiers: &[String]) -> StorageResult<usize> {
        if identifiers.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let inserted = insert_queued(&tx, identifiers, &now())?;
        tx.commit()?;

        Ok(inserted)
    }

    fn claim(&mut self, limit: usize) -> StorageResult<Vec<Article>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let timestamp = now();
        let tx = self.conn.transaction()?;

        let mut claimed = {
            let mut stmt = tx.prepare(
                "SELECT id, identifier, state, discovered_at, updated_at
                 FROM articles WHERE state = ?1 ORDER BY id LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![ArticleState::Queued, limit as i64], row_to_article)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for chunk in claimed.chunks(CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE articles SET state = ?, updated_at = ? WHERE id IN ({})",
                placeholders
            );
            let values = [
                Value::Integer(ArticleState::Working.to_db_value()),
                Value::Text(timestamp.clone()),
            ]
            .into_iter()
            .chain(chunk.iter().map(|article| Value::Integer(article.id)));
            tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;

        for article in &mut claimed {
            article.state = ArticleState::Working;
            article.updated_at = timestamp.clone();
        }

        Ok(claimed)
    }

    fn complete(&mut self, identifier: &str, targets: &[String]) -> StorageResult<()> {
        let timestamp = now();
        let tx = self.conn.transaction()?;

        let raw_state: Option<i64> = tx
            .query_row(
                "SELECT state FROM articles WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()?;
        let state = raw_state
            .map(|raw| ArticleState::from_db_value(raw).ok_or(StorageError::InvalidState(raw)))
            .transpose()?;

        // Dropping `tx` on this path rolls back, leaving the store untouched
        let completable =
            state.is_some_and(|current| current.can_transition_to(ArticleState::Ready));
        if !completable {
            return Err(StorageError::NotWorking {
                identifier: identifier.to_string(),
                state,
            });
        }

        let targets = dedupe(targets);

        tx.execute(
            "DELETE FROM mappings WHERE source_identifier = ?1",
            params![identifier],
        )?;
        insert_mappings(&tx, identifier, &targets)?;
        insert_queued(&tx, &targets, &timestamp)?;
        tx.execute(
            "UPDATE articles SET state = ?1, updated_at = ?2 WHERE identifier = ?3",
            params![ArticleState::Ready, timestamp, identifier],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn recover_stale_work(&mut self) -> StorageResult<usize> {
        let recovered = self.conn.execute(
            "UPDATE articles SET state = ?1, updated_at = ?2 WHERE state = ?3",
            params![ArticleState::Queued, now(), ArticleState::Working],
        )?;
        Ok(recovered)
    }

    // ===== Graph Reads =====

    fn snapshot_graph(&self) -> StorageResult<Graph> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_identifier, target_identifier FROM mappings ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut graph = Graph::new();
        for row in rows {
            let (source, target) = row?;
            graph.entry(source).or_default().push(target);
        }

        Ok(graph)
    }

    fn get_article(&self, identifier: &str) -> StorageResult<Option<Article>> {
        let article = self
            .conn
            .query_row(
                "SELECT id, identifier, state, discovered_at, updated_at
                 FROM articles WHERE identifier = ?1",
                params![identifier],
                row_to_article,
            )
            .optional()?;

        Ok(article)
    }

    fn ready_articles(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier FROM articles WHERE state = ?1 ORDER BY id")?;

        let articles = stmt
            .query_map(params![ArticleState::Ready], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(articles)
    }

    fn get_mappings(&self, identifier: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_identifier FROM mappings WHERE source_identifier = ?1 ORDER BY id",
        )?;

        let targets = stmt
            .query_map(params![identifier], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(targets)
    }

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<QueueCounts> {
        let mut counts = QueueCounts::default();

        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM articles GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (raw_state, count) = row?;
            match ArticleState::from_db_value(raw_state) {
                Some(ArticleState::Queued) => counts.queued = count as u64,
                Some(ArticleState::Working) => counts.working = count as u64,
                Some(ArticleState::Ready) => counts.ready = count as u64,
                None => return Err(StorageError::InvalidState(raw_state)),
            }
        }

        let mappings: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mappings", [], |row| row.get(0))?;
        counts.mappings = mappings as u64;

        Ok(counts)
    }

    // ===== Run Management =====

    fn interrupt_stale_runs(&mut self) -> StorageResult<usize> {
        let interrupted = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE status = ?2",
            params![
                RunStatus::Interrupted.to_db_string(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(interrupted)
    }

    fn create_run(&mut self, config_hash: &str, recovered_articles: u64) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status, recovered_articles) VALUES (?1, ?2, ?3, ?4)",
            params![
                now(),
                config_hash,
                RunStatus::Running.to_db_string(),
                recovered_articles as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        started_batches: u64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, started_batches = ?3 WHERE id = ?4",
            params![
                status.to_db_string(),
                now(),
                started_batches as i64,
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, recovered_articles, started_batches
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                row_to_run,
            )
            .optional()?;

        run.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn state_of(storage: &SqliteStorage, identifier: &str) -> Option<ArticleState> {
        storage
            .get_article(identifier)
            .unwrap()
            .map(|article| article.state)
    }

    fn sorted(mut values: Vec<String>) -> Vec<String> {
        values.sort();
        values
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_enqueue_registers_queued_articles() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let inserted = storage.enqueue(&ids(&["A", "B"])).unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Queued));
        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Queued));
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let set = ids(&["A", "B", "C"]);

        storage.enqueue(&set).unwrap();
        let before = storage.count_articles().unwrap();
        let inserted = storage.enqueue(&set).unwrap();

        assert_eq!(inserted, 0);
        assert_eq!(storage.count_articles().unwrap(), before);
    }

    #[test]
    fn test_enqueue_never_regresses_state() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A", "B"])).unwrap();
        storage.claim(1).unwrap();
        storage.complete("A", &[]).unwrap();
        storage.claim(1).unwrap();

        storage.enqueue(&ids(&["A", "B"])).unwrap();

        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Ready));
        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Working));
    }

    #[test]
    fn test_enqueue_empty_input() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.enqueue(&[]).unwrap(), 0);
    }

    #[test]
    fn test_enqueue_large_input_is_chunked() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let many: Vec<String> = (0..(CHUNK_SIZE * 3 + 7))
            .map(|i| format!("Article_{}", i))
            .collect();

        let inserted = storage.enqueue(&many).unwrap();

        assert_eq!(inserted, many.len());
        assert_eq!(storage.count_articles().unwrap().queued, many.len() as u64);
    }

    #[test]
    fn test_claim_moves_queued_to_working() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();

        let claimed = storage.claim(1).unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].identifier, "A");
        assert_eq!(claimed[0].state, ArticleState::Working);
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Working));
    }

    #[test]
    fn test_claim_respects_limit_and_discovery_order() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A", "B", "C", "D"])).unwrap();

        let first: Vec<_> = storage
            .claim(2)
            .unwrap()
            .into_iter()
            .map(|a| a.identifier)
            .collect();
        let second: Vec<_> = storage
            .claim(5)
            .unwrap()
            .into_iter()
            .map(|a| a.identifier)
            .collect();

        assert_eq!(first, ids(&["A", "B"]));
        assert_eq!(second, ids(&["C", "D"]));
        assert!(storage.claim(5).unwrap().is_empty());
    }

    #[test]
    fn test_claim_more_than_chunk() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let many: Vec<String> = (0..(CHUNK_SIZE * 2 + 1))
            .map(|i| format!("Article_{}", i))
            .collect();
        storage.enqueue(&many).unwrap();

        let claimed = storage.claim(many.len()).unwrap();

        assert_eq!(claimed.len(), many.len());
        let counts = storage.count_articles().unwrap();
        assert_eq!(counts.working, many.len() as u64);
        assert_eq!(counts.queued, 0);
    }

    #[test]
    fn test_claim_zero_limit() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();

        assert!(storage.claim(0).unwrap().is_empty());
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Queued));
    }

    #[test]
    fn test_complete_records_edges_and_enqueues_targets() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();

        storage.complete("A", &ids(&["B", "C"])).unwrap();

        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Ready));
        assert_eq!(sorted(storage.get_mappings("A").unwrap()), ids(&["B", "C"]));
        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Queued));
        assert_eq!(state_of(&storage, "C"), Some(ArticleState::Queued));

        let next: Vec<_> = storage
            .claim(2)
            .unwrap()
            .into_iter()
            .map(|a| a.identifier)
            .collect();
        assert_eq!(sorted(next), ids(&["B", "C"]));
        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Working));
        assert_eq!(state_of(&storage, "C"), Some(ArticleState::Working));
    }

    #[test]
    fn test_complete_does_not_touch_known_targets() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A", "B"])).unwrap();
        storage.claim(2).unwrap();

        storage.complete("A", &ids(&["B"])).unwrap();

        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Working));
    }

    #[test]
    fn test_complete_deduplicates_targets() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();

        storage.complete("A", &ids(&["B", "B", "C"])).unwrap();

        assert_eq!(storage.get_mappings("A").unwrap(), ids(&["B", "C"]));
    }

    #[test]
    fn test_complete_replaces_previous_edges() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();
        storage.complete("A", &ids(&["B", "C"])).unwrap();

        // Simulate a re-fetch of A in a later run
        storage
            .conn
            .execute(
                "UPDATE articles SET state = ?1 WHERE identifier = 'A'",
                params![ArticleState::Working],
            )
            .unwrap();
        storage.complete("A", &ids(&["C", "D"])).unwrap();

        assert_eq!(sorted(storage.get_mappings("A").unwrap()), ids(&["C", "D"]));
        assert_eq!(storage.count_articles().unwrap().mappings, 2);
    }

    #[test]
    fn test_complete_with_no_targets_reaches_ready() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();

        storage.complete("A", &[]).unwrap();

        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Ready));
        assert!(storage.get_mappings("A").unwrap().is_empty());
    }

    #[test]
    fn test_complete_requires_working_state() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        let before = storage.count_articles().unwrap();

        let result = storage.complete("A", &ids(&["B"]));

        assert!(matches!(
            result,
            Err(StorageError::NotWorking {
                state: Some(ArticleState::Queued),
                ..
            })
        ));
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Queued));
        assert_eq!(state_of(&storage, "B"), None);
        assert_eq!(storage.count_articles().unwrap(), before);
    }

    #[test]
    fn test_complete_unknown_identifier() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let result = storage.complete("Ghost", &ids(&["B"]));

        assert!(matches!(
            result,
            Err(StorageError::NotWorking { state: None, .. })
        ));
        assert_eq!(storage.count_articles().unwrap(), QueueCounts::default());
    }

    #[test]
    fn test_complete_twice_fails_second_time() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();
        storage.complete("A", &ids(&["B"])).unwrap();

        let result = storage.complete("A", &ids(&["C"]));

        assert!(matches!(
            result,
            Err(StorageError::NotWorking {
                state: Some(ArticleState::Ready),
                ..
            })
        ));
        assert_eq!(storage.get_mappings("A").unwrap(), ids(&["B"]));
    }

    #[test]
    fn test_recover_stale_work_only_touches_working() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A", "B", "C"])).unwrap();
        storage.claim(2).unwrap();
        storage.complete("A", &[]).unwrap();

        let recovered = storage.recover_stale_work().unwrap();

        assert_eq!(recovered, 1);
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Ready));
        assert_eq!(state_of(&storage, "B"), Some(ArticleState::Queued));
        assert_eq!(state_of(&storage, "C"), Some(ArticleState::Queued));
    }

    #[test]
    fn test_recovered_article_is_claimable_again() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage
            .conn
            .execute(
                "UPDATE articles SET state = ?1 WHERE identifier = 'A'",
                params![ArticleState::Working],
            )
            .unwrap();

        storage.recover_stale_work().unwrap();

        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Queued));
        let claimed = storage.claim(1).unwrap();
        assert_eq!(claimed[0].identifier, "A");
    }

    #[test]
    fn test_snapshot_graph() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage.claim(1).unwrap();
        storage.complete("A", &ids(&["B", "C"])).unwrap();
        storage.claim(1).unwrap();
        storage.complete("B", &ids(&["A"])).unwrap();

        let graph = storage.snapshot_graph().unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph["A"], ids(&["B", "C"]));
        assert_eq!(graph["B"], ids(&["A"]));
        assert!(!graph.contains_key("C"));
    }

    #[test]
    fn test_ready_articles() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A", "B"])).unwrap();
        storage.claim(2).unwrap();
        storage.complete("B", &[]).unwrap();

        assert_eq!(storage.ready_articles().unwrap(), ids(&["B"]));
    }

    #[test]
    fn test_invalid_state_is_reported() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.enqueue(&ids(&["A"])).unwrap();
        storage
            .conn
            .execute("UPDATE articles SET state = 7", [])
            .unwrap();

        assert!(matches!(
            storage.complete("A", &[]),
            Err(StorageError::InvalidState(7))
        ));
        assert!(storage.get_article("A").is_err());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());

        let first = storage.create_run("hash", 0).unwrap();
        assert_eq!(storage.interrupt_stale_runs().unwrap(), 1);

        let second = storage.create_run("hash", 3).unwrap();
        storage
            .finish_run(second, RunStatus::BudgetExhausted, 12)
            .unwrap();

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert!(second > first);
        assert_eq!(latest.id, second);
        assert_eq!(latest.status, RunStatus::BudgetExhausted);
        assert_eq!(latest.recovered_articles, 3);
        assert_eq!(latest.started_batches, 12);
        assert!(latest.finished_at.is_some());
    }

    #[test]
    fn test_unknown_run_status_is_reported() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.create_run("hash", 0).unwrap();
        storage
            .conn
            .execute("UPDATE runs SET status = 'paused'", [])
            .unwrap();

        match storage.get_latest_run() {
            Err(StorageError::InvalidRunStatus(status)) => assert_eq!(status, "paused"),
            other => panic!("expected an invalid run status, got {:?}", other),
        }
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crawl.db");

        assert!(matches!(
            SqliteStorage::open_existing(&path),
            Err(StorageError::DatabaseNotFound(_))
        ));
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.enqueue(&ids(&["A"])).unwrap();
        }

        let storage = SqliteStorage::open_existing(&path).unwrap();
        assert_eq!(storage.count_articles().unwrap().queued, 1);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crawl.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.enqueue(&ids(&["A", "B"])).unwrap();
            storage.claim(1).unwrap();
        }

        let mut storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Working));
        assert_eq!(storage.recover_stale_work().unwrap(), 1);
        assert_eq!(state_of(&storage, "A"), Some(ArticleState::Queued));
    }
}
