//! Repository Implementation

use crate::model::{ExamAttempt, ViolationEvent, ViolationSource};
use crate::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS exam_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        exam_id INTEGER NOT NULL,
        student_id INTEGER NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        submitted INTEGER NOT NULL DEFAULT 0,
        terminated INTEGER NOT NULL DEFAULT 0,
        behavior_count INTEGER NOT NULL DEFAULT 0,
        camera_count INTEGER NOT NULL DEFAULT 0,
        cheating_count INTEGER NOT NULL DEFAULT 0,
        final_marks REAL NOT NULL DEFAULT 0,
        UNIQUE(exam_id, student_id)
    )",
    "CREATE TABLE IF NOT EXISTS violation_events (
        id TEXT PRIMARY KEY,
        attempt_id INTEGER NOT NULL,
        exam_id INTEGER NOT NULL,
        student_id INTEGER NOT NULL,
        source TEXT NOT NULL,
        kind TEXT NOT NULL,
        confidence REAL,
        evidence_ref TEXT,
        recorded_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_events_attempt ON violation_events(attempt_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_recorded ON violation_events(recorded_at)",
];

/// In-memory backend state
struct MemoryStore {
    attempts: Mutex<HashMap<i64, ExamAttempt>>,
    by_exam_student: Mutex<HashMap<(i64, i64), i64>>,
    events: Mutex<Vec<ViolationEvent>>,
    next_attempt_id: Mutex<i64>,
}

enum Backend {
    Memory(MemoryStore),
    Sqlite(SqlitePool),
}

/// Repository for attempt and violation-event access
pub struct Repository {
    backend: Backend,
}

impl Repository {
    /// Create an in-memory repository (tests, ephemeral runs)
    pub fn in_memory() -> Self {
        info!("Creating in-memory repository");
        Self {
            backend: Backend::Memory(MemoryStore {
                attempts: Mutex::new(HashMap::new()),
                by_exam_student: Mutex::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                next_attempt_id: Mutex::new(1),
            }),
        }
    }

    /// Open (and migrate) a SQLite-backed repository
    pub async fn with_sqlite(url: &str) -> Result<Self, StorageError> {
        info!("Opening SQLite repository at {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self {
            backend: Backend::Sqlite(pool),
        })
    }

    /// Create the attempt row for (exam, student), or return the existing
    /// one. One row per pair; re-entry resumes rather than restarting.
    pub async fn open_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt, StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                let mut index = lock(&store.by_exam_student)?;
                let mut attempts = lock(&store.attempts)?;

                if let Some(id) = index.get(&(exam_id, student_id)) {
                    return attempts.get(id).cloned().ok_or(StorageError::NotFound);
                }

                let mut next_id = lock(&store.next_attempt_id)?;
                let mut attempt = ExamAttempt::started(exam_id, student_id, now);
                attempt.id = *next_id;
                *next_id += 1;

                index.insert((exam_id, student_id), attempt.id);
                attempts.insert(attempt.id, attempt.clone());
                debug!("Created attempt {} for exam {}", attempt.id, exam_id);
                Ok(attempt)
            }
            Backend::Sqlite(pool) => {
                if let Some(existing) = self.find_attempt(pool, exam_id, student_id).await? {
                    return Ok(existing);
                }

                let inserted = sqlx::query(
                    "INSERT INTO exam_attempts (exam_id, student_id, start_time) VALUES (?, ?, ?)",
                )
                .bind(exam_id)
                .bind(student_id)
                .bind(encode_time(now))
                .execute(pool)
                .await;

                match inserted {
                    Ok(result) => {
                        let mut attempt = ExamAttempt::started(exam_id, student_id, now);
                        attempt.id = result.last_insert_rowid();
                        debug!("Created attempt {} for exam {}", attempt.id, exam_id);
                        Ok(attempt)
                    }
                    // A concurrent opener may win the UNIQUE(exam_id, student_id) race
                    Err(_) => self
                        .find_attempt(pool, exam_id, student_id)
                        .await?
                        .ok_or(StorageError::NotFound),
                }
            }
        }
    }

    async fn find_attempt(
        &self,
        pool: &SqlitePool,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<ExamAttempt>, StorageError> {
        sqlx::query("SELECT * FROM exam_attempts WHERE exam_id = ? AND student_id = ?")
            .bind(exam_id)
            .bind(student_id)
            .fetch_optional(pool)
            .await?
            .map(|row| decode_attempt(&row))
            .transpose()
    }

    /// Fetch one attempt by id
    pub async fn attempt(&self, id: i64) -> Result<Option<ExamAttempt>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(lock(&store.attempts)?.get(&id).cloned()),
            Backend::Sqlite(pool) => sqlx::query("SELECT * FROM exam_attempts WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?
                .map(|row| decode_attempt(&row))
                .transpose(),
        }
    }

    /// Persist the mutable fields of an attempt row
    pub async fn update_attempt(&self, attempt: &ExamAttempt) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                let mut attempts = lock(&store.attempts)?;
                match attempts.get_mut(&attempt.id) {
                    Some(row) => {
                        *row = attempt.clone();
                        Ok(())
                    }
                    None => Err(StorageError::NotFound),
                }
            }
            Backend::Sqlite(pool) => {
                let result = sqlx::query(
                    "UPDATE exam_attempts SET end_time = ?, submitted = ?, terminated = ?, \
                     behavior_count = ?, camera_count = ?, cheating_count = ?, final_marks = ? \
                     WHERE id = ?",
                )
                .bind(attempt.end_time.map(encode_time))
                .bind(attempt.submitted as i64)
                .bind(attempt.terminated as i64)
                .bind(attempt.behavior_count as i64)
                .bind(attempt.camera_count as i64)
                .bind(attempt.cheating_count as i64)
                .bind(attempt.final_marks)
                .bind(attempt.id)
                .execute(pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StorageError::NotFound);
                }
                Ok(())
            }
        }
    }

    /// Append one violation event. Events are never updated or deleted.
    pub async fn append_event(&self, event: &ViolationEvent) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                lock(&store.events)?.push(event.clone());
                Ok(())
            }
            Backend::Sqlite(pool) => {
                sqlx::query(
                    "INSERT INTO violation_events \
                     (id, attempt_id, exam_id, student_id, source, kind, confidence, evidence_ref, recorded_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(event.id.to_string())
                .bind(event.attempt_id)
                .bind(event.exam_id)
                .bind(event.student_id)
                .bind(event.source.as_str())
                .bind(&event.kind)
                .bind(event.confidence.map(|c| c as f64))
                .bind(&event.evidence_ref)
                .bind(encode_time(event.recorded_at))
                .execute(pool)
                .await?;
                Ok(())
            }
        }
    }

    /// Event log for one attempt, oldest first
    pub async fn events_for_attempt(
        &self,
        attempt_id: i64,
    ) -> Result<Vec<ViolationEvent>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(lock(&store.events)?
                .iter()
                .filter(|e| e.attempt_id == attempt_id)
                .cloned()
                .collect()),
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(
                    "SELECT * FROM violation_events WHERE attempt_id = ? ORDER BY recorded_at",
                )
                .bind(attempt_id)
                .fetch_all(pool)
                .await?;
                rows.iter().map(decode_event).collect()
            }
        }
    }

    /// All attempts for one student
    pub async fn attempts_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<ExamAttempt>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                let mut attempts: Vec<ExamAttempt> = lock(&store.attempts)?
                    .values()
                    .filter(|a| a.student_id == student_id)
                    .cloned()
                    .collect();
                attempts.sort_by_key(|a| a.id);
                Ok(attempts)
            }
            Backend::Sqlite(pool) => {
                let rows =
                    sqlx::query("SELECT * FROM exam_attempts WHERE student_id = ? ORDER BY id")
                        .bind(student_id)
                        .fetch_all(pool)
                        .await?;
                rows.iter().map(|r| decode_attempt(r)).collect()
            }
        }
    }

    /// Submitted attempts for one exam (results reporting)
    pub async fn submitted_attempts_for_exam(
        &self,
        exam_id: i64,
    ) -> Result<Vec<ExamAttempt>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                let mut attempts: Vec<ExamAttempt> = lock(&store.attempts)?
                    .values()
                    .filter(|a| a.exam_id == exam_id && a.submitted)
                    .cloned()
                    .collect();
                attempts.sort_by_key(|a| a.id);
                Ok(attempts)
            }
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(
                    "SELECT * FROM exam_attempts WHERE exam_id = ? AND submitted = 1 ORDER BY id",
                )
                .bind(exam_id)
                .fetch_all(pool)
                .await?;
                rows.iter().map(|r| decode_attempt(r)).collect()
            }
        }
    }

    /// (behavior, camera) event counts recorded at or after `cutoff`
    pub async fn events_since(&self, cutoff: DateTime<Utc>) -> Result<(u64, u64), StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                let events = lock(&store.events)?;
                let behavior = events
                    .iter()
                    .filter(|e| e.recorded_at >= cutoff && e.source == ViolationSource::Behavior)
                    .count() as u64;
                let camera = events
                    .iter()
                    .filter(|e| e.recorded_at >= cutoff && e.source == ViolationSource::Camera)
                    .count() as u64;
                Ok((behavior, camera))
            }
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(
                    "SELECT source, COUNT(*) AS n FROM violation_events \
                     WHERE recorded_at >= ? GROUP BY source",
                )
                .bind(encode_time(cutoff))
                .fetch_all(pool)
                .await?;

                let mut behavior = 0u64;
                let mut camera = 0u64;
                for row in &rows {
                    let source: String = row.try_get("source").map_err(decode_err)?;
                    let n: i64 = row.try_get("n").map_err(decode_err)?;
                    match ViolationSource::parse(&source) {
                        Some(ViolationSource::Behavior) => behavior = n as u64,
                        Some(ViolationSource::Camera) => camera = n as u64,
                        None => {}
                    }
                }
                Ok((behavior, camera))
            }
        }
    }

    /// Total attempt rows
    pub async fn attempt_count(&self) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(lock(&store.attempts)?.len() as u64),
            Backend::Sqlite(pool) => {
                let row = sqlx::query("SELECT COUNT(*) AS n FROM exam_attempts")
                    .fetch_one(pool)
                    .await?;
                let n: i64 = row.try_get("n").map_err(decode_err)?;
                Ok(n as u64)
            }
        }
    }

    /// Total violation-event rows
    pub async fn event_count(&self) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(lock(&store.events)?.len() as u64),
            Backend::Sqlite(pool) => {
                let row = sqlx::query("SELECT COUNT(*) AS n FROM violation_events")
                    .fetch_one(pool)
                    .await?;
                let n: i64 = row.try_get("n").map_err(decode_err)?;
                Ok(n as u64)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
}

fn decode_err(e: sqlx::Error) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Fixed-width RFC 3339 (UTC, microseconds) so stored timestamps compare
/// lexicographically in chronological order.
fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_attempt(row: &SqliteRow) -> Result<ExamAttempt, StorageError> {
    let start_time: String = row.try_get("start_time").map_err(decode_err)?;
    let end_time: Option<String> = row.try_get("end_time").map_err(decode_err)?;

    Ok(ExamAttempt {
        id: row.try_get("id").map_err(decode_err)?,
        exam_id: row.try_get("exam_id").map_err(decode_err)?,
        student_id: row.try_get("student_id").map_err(decode_err)?,
        start_time: parse_time(&start_time)?,
        end_time: end_time.as_deref().map(parse_time).transpose()?,
        submitted: row.try_get::<i64, _>("submitted").map_err(decode_err)? != 0,
        terminated: row.try_get::<i64, _>("terminated").map_err(decode_err)? != 0,
        behavior_count: row.try_get::<i64, _>("behavior_count").map_err(decode_err)? as u32,
        camera_count: row.try_get::<i64, _>("camera_count").map_err(decode_err)? as u32,
        cheating_count: row.try_get::<i64, _>("cheating_count").map_err(decode_err)? as u32,
        final_marks: row.try_get("final_marks").map_err(decode_err)?,
    })
}

fn decode_event(row: &SqliteRow) -> Result<ViolationEvent, StorageError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let source: String = row.try_get("source").map_err(decode_err)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(decode_err)?;

    Ok(ViolationEvent {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Serialization(e.to_string()))?,
        attempt_id: row.try_get("attempt_id").map_err(decode_err)?,
        exam_id: row.try_get("exam_id").map_err(decode_err)?,
        student_id: row.try_get("student_id").map_err(decode_err)?,
        source: ViolationSource::parse(&source)
            .ok_or_else(|| StorageError::Serialization(format!("unknown source: {source}")))?,
        kind: row.try_get("kind").map_err(decode_err)?,
        confidence: row
            .try_get::<Option<f64>, _>("confidence")
            .map_err(decode_err)?
            .map(|c| c as f32),
        evidence_ref: row.try_get("evidence_ref").map_err(decode_err)?,
        recorded_at: parse_time(&recorded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_for(attempt: &ExamAttempt, source: ViolationSource, kind: &str) -> ViolationEvent {
        ViolationEvent::new(attempt, source, kind, Some(0.9), None, Utc::now())
    }

    #[tokio::test]
    async fn test_open_attempt_resumes_existing() {
        let repo = Repository::in_memory();

        let first = repo.open_attempt(1, 7, Utc::now()).await.unwrap();
        let second = repo.open_attempt(1, 7, Utc::now()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.attempt_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_pairs_get_distinct_attempts() {
        let repo = Repository::in_memory();

        let a = repo.open_attempt(1, 7, Utc::now()).await.unwrap();
        let b = repo.open_attempt(1, 8, Utc::now()).await.unwrap();
        let c = repo.open_attempt(2, 7, Utc::now()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let repo = Repository::in_memory();
        let mut attempt = repo.open_attempt(1, 7, Utc::now()).await.unwrap();

        attempt.behavior_count = 2;
        attempt.cheating_count = 2;
        repo.update_attempt(&attempt).await.unwrap();

        let loaded = repo.attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(loaded.cheating_count, 2);
        assert!(loaded.is_active());
    }

    #[tokio::test]
    async fn test_update_unknown_attempt_fails() {
        let repo = Repository::in_memory();
        let ghost = ExamAttempt::started(1, 7, Utc::now());

        assert!(matches!(
            repo.update_attempt(&ghost).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_events_append_and_filter() {
        let repo = Repository::in_memory();
        let a = repo.open_attempt(1, 7, Utc::now()).await.unwrap();
        let b = repo.open_attempt(1, 8, Utc::now()).await.unwrap();

        repo.append_event(&event_for(&a, ViolationSource::Behavior, "tab_switch"))
            .await
            .unwrap();
        repo.append_event(&event_for(&a, ViolationSource::Camera, "no_face_detected"))
            .await
            .unwrap();
        repo.append_event(&event_for(&b, ViolationSource::Behavior, "tab_switch"))
            .await
            .unwrap();

        let events = repo.events_for_attempt(a.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(repo.event_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_events_since_counts_by_source() {
        let repo = Repository::in_memory();
        let a = repo.open_attempt(1, 7, Utc::now()).await.unwrap();

        let old = ViolationEvent::new(
            &a,
            ViolationSource::Behavior,
            "tab_switch",
            None,
            None,
            Utc::now() - Duration::seconds(60),
        );
        repo.append_event(&old).await.unwrap();
        repo.append_event(&event_for(&a, ViolationSource::Camera, "no_face_detected"))
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::seconds(10);
        let (behavior, camera) = repo.events_since(cutoff).await.unwrap();
        assert_eq!(behavior, 0);
        assert_eq!(camera, 1);
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("proctor.db").display());
        let repo = Repository::with_sqlite(&url).await.unwrap();

        let mut attempt = repo.open_attempt(3, 9, Utc::now()).await.unwrap();
        let resumed = repo.open_attempt(3, 9, Utc::now()).await.unwrap();
        assert_eq!(attempt.id, resumed.id);

        attempt.camera_count = 1;
        attempt.cheating_count = 1;
        repo.update_attempt(&attempt).await.unwrap();
        repo.append_event(&event_for(
            &attempt,
            ViolationSource::Camera,
            "face_too_small",
        ))
        .await
        .unwrap();

        let loaded = repo.attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(loaded.camera_count, 1);

        let events = repo.events_for_attempt(attempt.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "face_too_small");
        assert_eq!(events[0].source, ViolationSource::Camera);
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("proctor.db").display());

        let attempt_id = {
            let repo = Repository::with_sqlite(&url).await.unwrap();
            let mut attempt = repo.open_attempt(5, 11, Utc::now()).await.unwrap();
            attempt.behavior_count = 2;
            attempt.cheating_count = 2;
            repo.update_attempt(&attempt).await.unwrap();
            attempt.id
        };

        let repo = Repository::with_sqlite(&url).await.unwrap();
        let loaded = repo.attempt(attempt_id).await.unwrap().unwrap();
        assert_eq!(loaded.cheating_count, 2);
    }
}
