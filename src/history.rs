//! Transcription history and settings store
//!
//! SQLite-backed store for completed transcriptions plus a small key-value
//! settings table (used for the persisted trigger-key rebind). Saving is
//! fire-and-forget from the session's perspective: a failed insert is
//! logged, never fatal.

use crate::error::StoreError;
use chrono::{DateTime, Local, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

/// Settings key under which the rebound trigger key is stored
pub const SETTING_TRIGGER_KEY: &str = "trigger_key";

/// A stored transcription record
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptRecord {
    pub id: i64,
    pub text: String,
    pub raw_text: Option<String>,
    pub word_count: i64,
    pub duration_seconds: f64,
    pub model: Option<String>,
    pub cleanup_used: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate usage statistics
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub total_transcriptions: i64,
    pub total_words: i64,
    pub total_minutes: f64,
    pub avg_wpm: f64,
    pub today_count: i64,
    pub today_words: i64,
}

/// The slice of the store the session orchestrator needs: persistence is a
/// collaborator it hands results to, nothing more
pub trait TranscriptSink: Send + Sync {
    fn save(
        &self,
        text: &str,
        raw_text: &str,
        duration_seconds: f64,
        model: &str,
        cleanup_used: bool,
    ) -> Result<i64, StoreError>;
}

/// SQLite history store
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open or create the store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transcriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                raw_text TEXT,
                word_count INTEGER NOT NULL DEFAULT 0,
                duration_seconds REAL NOT NULL DEFAULT 0,
                model TEXT,
                cleanup_used INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_transcriptions_created_at
                ON transcriptions(created_at DESC);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )?;
        Ok(())
    }

    /// Save a transcription; returns the new record id
    pub fn save_transcription(
        &self,
        text: &str,
        raw_text: &str,
        duration_seconds: f64,
        model: &str,
        cleanup_used: bool,
    ) -> Result<i64, StoreError> {
        let word_count = text.split_whitespace().count() as i64;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO transcriptions
                (text, raw_text, word_count, duration_seconds, model, cleanup_used, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                text,
                raw_text,
                word_count,
                duration_seconds,
                model,
                cleanup_used as i32,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get recent transcriptions, newest first
    pub fn get_transcriptions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TranscriptRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, text, raw_text, word_count, duration_seconds, model, cleanup_used, created_at
            FROM transcriptions
            ORDER BY created_at DESC, id DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;
        let records = stmt
            .query_map(params![limit, offset], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Get a single transcription by id
    pub fn get_transcription(&self, id: i64) -> Result<Option<TranscriptRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                r#"
                SELECT id, text, raw_text, word_count, duration_seconds, model, cleanup_used, created_at
                FROM transcriptions WHERE id = ?1
                "#,
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Delete a transcription by id; returns whether a row was removed
    pub fn delete_transcription(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM transcriptions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Clear all history; returns the number of deleted records
    pub fn clear_history(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM transcriptions", [])?)
    }

    /// Calculate aggregate usage statistics
    pub fn get_statistics(&self) -> Result<UsageStats, StoreError> {
        let today_start = local_midnight_timestamp();
        let conn = self.conn.lock().unwrap();

        let (total, words, minutes, wpm) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(word_count), 0),
                COALESCE(SUM(duration_seconds), 0) / 60.0,
                CASE
                    WHEN SUM(duration_seconds) > 0
                    THEN SUM(word_count) * 60.0 / SUM(duration_seconds)
                    ELSE 0
                END
            FROM transcriptions
            "#,
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            },
        )?;

        let (today_count, today_words) = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(word_count), 0)
            FROM transcriptions
            WHERE created_at >= ?1
            "#,
            params![today_start],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        Ok(UsageStats {
            total_transcriptions: total,
            total_words: words,
            total_minutes: (minutes * 10.0).round() / 10.0,
            avg_wpm: (wpm * 10.0).round() / 10.0,
            today_count,
            today_words,
        })
    }

    /// Get a setting value
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Set a setting value
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl TranscriptSink for HistoryStore {
    fn save(
        &self,
        text: &str,
        raw_text: &str,
        duration_seconds: f64,
        model: &str,
        cleanup_used: bool,
    ) -> Result<i64, StoreError> {
        self.save_transcription(text, raw_text, duration_seconds, model, cleanup_used)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TranscriptRecord> {
    Ok(TranscriptRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        raw_text: row.get(2)?,
        word_count: row.get(3)?,
        duration_seconds: row.get(4)?,
        model: row.get(5)?,
        cleanup_used: row.get::<_, i64>(6)? != 0,
        created_at: timestamp_to_datetime(row.get(7)?),
    })
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Unix timestamp of the most recent local midnight
fn local_midnight_timestamp() -> i64 {
    let midnight = Local::now().date_naive().and_hms_opt(0, 0, 0);
    midnight
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}
