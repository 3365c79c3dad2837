//! Persisted interview and chat records
//!
//! One SQLite row per record. Records are immutable once appended and are
//! read back by calendar date (diary playback) or recency and keyword
//! (reply context). The coordinator is the only writer, so the store does
//! no locking of its own.

use crate::error::StoreError;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Answer to a daily interview question
    Interview,
    /// Something the user said in chat
    Chat,
}

impl MemoryKind {
    fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Interview => "interview",
            MemoryKind::Chat => "chat",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "interview" => MemoryKind::Interview,
            _ => MemoryKind::Chat,
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub date: NaiveDate,
    pub kind: MemoryKind,
    pub question: Option<String>,
    pub transcript: String,
    pub audio_ref: Option<PathBuf>,
}

impl NewMemory {
    pub fn interview(question: Option<String>, transcript: impl Into<String>) -> Self {
        Self {
            date: Local::now().date_naive(),
            kind: MemoryKind::Interview,
            question,
            transcript: transcript.into(),
            audio_ref: None,
        }
    }

    pub fn chat(transcript: impl Into<String>) -> Self {
        Self {
            date: Local::now().date_naive(),
            kind: MemoryKind::Chat,
            question: None,
            transcript: transcript.into(),
            audio_ref: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn with_audio(mut self, path: Option<PathBuf>) -> Self {
        self.audio_ref = path;
        self
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub date: NaiveDate,
    pub kind: MemoryKind,
    pub question: Option<String>,
    pub transcript: String,
    pub audio_ref: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// One-line summary for listings and prompts
    pub fn summary(&self) -> String {
        match &self.question {
            Some(q) if !q.is_empty() => format!("Q: {} A: {}", q, self.transcript),
            _ => self.transcript.clone(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<(MemoryRecord, String)> {
        let date: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let audio_ref: Option<String> = row.get(5)?;
        let created_ms: i64 = row.get(6)?;
        let record = MemoryRecord {
            id: row.get(0)?,
            date: NaiveDate::MIN,
            kind: MemoryKind::parse(&kind),
            question: row.get(3)?,
            transcript: row.get(4)?,
            audio_ref: audio_ref.map(PathBuf::from),
            created_at: Utc
                .timestamp_millis_opt(created_ms)
                .single()
                .unwrap_or_default(),
        };
        Ok((record, date))
    }
}

/// SQLite-backed record store
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                kind TEXT NOT NULL,
                question TEXT,
                transcript TEXT NOT NULL DEFAULT '',
                audio_ref TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_date ON memories(date);
            "#,
        )?;
        Ok(())
    }

    /// Append a record and return its id. Never rejects a record.
    pub fn append(&self, record: &NewMemory) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO memories (date, kind, question, transcript, audio_ref, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.date.format(DATE_FORMAT).to_string(),
                record.kind.as_str(),
                record.question,
                record.transcript,
                record
                    .audio_ref
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                Utc::now().timestamp_millis(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!("Stored {} record {} for {}", record.kind, id, record.date);
        Ok(id)
    }

    fn select(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, MemoryRecord::from_row)?;
        let records = rows
            .map(|row| -> Result<MemoryRecord, StoreError> {
                let (mut record, date) = row?;
                record.date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|_| StoreError::InvalidDate(date))?;
                Ok(record)
            })
            .collect();
        records
    }

    /// Records for `date`, in creation order
    pub fn query(&self, date: NaiveDate) -> Result<Vec<MemoryRecord>, StoreError> {
        self.select(
            "SELECT id, date, kind, question, transcript, audio_ref, created_at
             FROM memories WHERE date = ?1 ORDER BY id ASC",
            params![date.format(DATE_FORMAT).to_string()],
        )
    }

    /// The `n` most recent records, newest first
    pub fn latest_n(&self, n: usize) -> Result<Vec<MemoryRecord>, StoreError> {
        self.select(
            "SELECT id, date, kind, question, transcript, audio_ref, created_at
             FROM memories ORDER BY id DESC LIMIT ?1",
            params![n as i64],
        )
    }

    /// Records whose transcript or question contains `keyword`, newest first
    pub fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MemoryRecord>, StoreError> {
        let pattern = format!("%{}%", escape_like(keyword));
        self.select(
            r"SELECT id, date, kind, question, transcript, audio_ref, created_at
              FROM memories
              WHERE transcript LIKE ?1 ESCAPE '\' OR question LIKE ?1 ESCAPE '\'
              ORDER BY id DESC LIMIT ?2",
            params![pattern, limit as i64],
        )
    }

    /// Number of records on `date`
    pub fn count_on(&self, date: NaiveDate) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE date = ?1",
            params![date.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Dates that have at least one record, newest first
    pub fn dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM memories ORDER BY date DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let dates = rows
            .map(|row| -> Result<NaiveDate, StoreError> {
                let date = row?;
                NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|_| StoreError::InvalidDate(date))
            })
            .collect();
        dates
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
