//! SQLite-backed store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::traits::{TaskFilter, TaskStore, TranscriptStore};
use super::types::{
    ApprovalStatus, CachedTranscript, DeliveryError, DeliveryRecord, DeliveryStatus,
    ExtractedTask, NewTask, Priority, TaskStatus,
};
use super::StoreError;
use crate::transcript::RawTranscript;

const TASK_COLUMNS: &str = "id, transcript_external_id, task_item, assignee_emails, \
     assignee_names, priority, brief_description, due_date, status, meets_word_count, \
     meets_description_length, extraction_order, confidence, source_sentences, \
     approval_status, auto_push_enabled, reviewer, review_notes, reviewed_at, \
     delivery_status, remote_item_id, delivered_at, delivery_errors, created_at, updated_at";

const TRANSCRIPT_COLUMNS: &str = "id, external_id, meeting_title, meeting_date, \
     participant_count, duration_minutes, raw_payload, content_hash, processed, is_valid, \
     created_at, updated_at";

/// SQLite store implementing both [`TranscriptStore`] and [`TaskStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transcripts (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                meeting_title TEXT NOT NULL,
                meeting_date TEXT,
                participant_count INTEGER NOT NULL DEFAULT 0,
                duration_minutes INTEGER NOT NULL DEFAULT 0,
                raw_payload TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                is_valid INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transcripts_meeting_date
                ON transcripts(meeting_date);
            CREATE INDEX IF NOT EXISTS idx_transcripts_processed
                ON transcripts(processed);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                transcript_external_id TEXT NOT NULL,
                task_item TEXT NOT NULL,
                assignee_emails TEXT NOT NULL,
                assignee_names TEXT NOT NULL,
                priority TEXT NOT NULL,
                brief_description TEXT NOT NULL,
                due_date TEXT,
                status TEXT NOT NULL,
                meets_word_count INTEGER NOT NULL,
                meets_description_length INTEGER NOT NULL,
                extraction_order INTEGER NOT NULL,
                confidence REAL NOT NULL,
                source_sentences TEXT NOT NULL,
                approval_status TEXT NOT NULL DEFAULT 'pending',
                auto_push_enabled INTEGER NOT NULL DEFAULT 0,
                reviewer TEXT,
                review_notes TEXT,
                reviewed_at TEXT,
                delivery_status TEXT NOT NULL DEFAULT 'pending',
                remote_item_id TEXT,
                delivered_at TEXT,
                delivery_errors TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_transcript
                ON tasks(transcript_external_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_approval
                ON tasks(approval_status);
            CREATE INDEX IF NOT EXISTS idx_tasks_delivery
                ON tasks(delivery_status);
            "#,
        )?;
        Ok(())
    }

    fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
        value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    fn row_to_transcript(row: &rusqlite::Row) -> rusqlite::Result<CachedTranscript> {
        let meeting_date: Option<String> = row.get(3)?;
        let raw_payload: String = row.get(6)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        Ok(CachedTranscript {
            id: row.get(0)?,
            external_id: row.get(1)?,
            meeting_title: row.get(2)?,
            meeting_date: Self::parse_datetime(meeting_date),
            participant_count: row.get(4)?,
            duration_minutes: row.get(5)?,
            raw_payload: serde_json::from_str(&raw_payload)
                .unwrap_or(serde_json::Value::Null),
            content_hash: row.get(7)?,
            processed: row.get(8)?,
            is_valid: row.get(9)?,
            created_at: Self::parse_datetime(Some(created_at)).unwrap_or_else(Utc::now),
            updated_at: Self::parse_datetime(Some(updated_at)).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ExtractedTask> {
        let assignee_emails: String = row.get(3)?;
        let assignee_names: String = row.get(4)?;
        let priority: String = row.get(5)?;
        let due_date: Option<String> = row.get(7)?;
        let status: String = row.get(8)?;
        let source_sentences: String = row.get(13)?;
        let approval_status: String = row.get(14)?;
        let reviewed_at: Option<String> = row.get(18)?;
        let delivery_status: String = row.get(19)?;
        let delivered_at: Option<String> = row.get(21)?;
        let delivery_errors: String = row.get(22)?;
        let created_at: String = row.get(23)?;
        let updated_at: String = row.get(24)?;

        Ok(ExtractedTask {
            id: row.get(0)?,
            transcript_external_id: row.get(1)?,
            task_item: row.get(2)?,
            assignee_emails: serde_json::from_str(&assignee_emails).unwrap_or_default(),
            assignee_names: serde_json::from_str(&assignee_names).unwrap_or_default(),
            priority: Priority::from_label(&priority),
            brief_description: row.get(6)?,
            due_date: Self::parse_datetime(due_date),
            status: TaskStatus::from_label(&status),
            meets_word_count: row.get(9)?,
            meets_description_length: row.get(10)?,
            extraction_order: row.get(11)?,
            confidence: row.get(12)?,
            source_sentences: serde_json::from_str(&source_sentences).unwrap_or_default(),
            approval_status: match approval_status.as_str() {
                "approved" => ApprovalStatus::Approved,
                "rejected" => ApprovalStatus::Rejected,
                _ => ApprovalStatus::Pending,
            },
            auto_push_enabled: row.get(15)?,
            reviewer: row.get(16)?,
            review_notes: row.get(17)?,
            reviewed_at: Self::parse_datetime(reviewed_at),
            delivery: DeliveryRecord {
                status: match delivery_status.as_str() {
                    "delivered" => DeliveryStatus::Delivered,
                    "failed" => DeliveryStatus::Failed,
                    _ => DeliveryStatus::Pending,
                },
                remote_item_id: row.get(20)?,
                delivered_at: Self::parse_datetime(delivered_at),
                errors: serde_json::from_str(&delivery_errors).unwrap_or_default(),
            },
            created_at: Self::parse_datetime(Some(created_at)).unwrap_or_else(Utc::now),
            updated_at: Self::parse_datetime(Some(updated_at)).unwrap_or_else(Utc::now),
        })
    }

    fn approval_label(status: ApprovalStatus) -> &'static str {
        match status {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    fn delivery_label(status: DeliveryStatus) -> &'static str {
        match status {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    fn get_task_locked(
        conn: &Connection,
        id: &str,
    ) -> Result<ExtractedTask, StoreError> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        match conn.query_row(&sql, params![id], Self::row_to_task) {
            Ok(task) => Ok(task),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(format!("task {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_review(
        &self,
        id: &str,
        verdict: ApprovalStatus,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ExtractedTask, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::get_task_locked(&conn, id)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET approval_status = ?, reviewer = ?, review_notes = ?, \
             reviewed_at = ?, updated_at = ? WHERE id = ?",
            params![Self::approval_label(verdict), reviewer, notes, now, now, id],
        )?;
        Self::get_task_locked(&conn, id)
    }
}

impl TranscriptStore for SqliteStore {
    fn upsert(&self, raw: &RawTranscript) -> Result<CachedTranscript, StoreError> {
        let conn = self.conn.lock().unwrap();

        let sql = format!(
            "SELECT {} FROM transcripts WHERE external_id = ?",
            TRANSCRIPT_COLUMNS
        );
        match conn.query_row(&sql, params![raw.id], Self::row_to_transcript) {
            Ok(existing) => {
                debug!(external_id = %raw.id, "transcript already stored, keeping first write");
                return Ok(existing);
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        let cached = CachedTranscript::from_raw(raw);
        conn.execute(
            "INSERT INTO transcripts (id, external_id, meeting_title, meeting_date, \
             participant_count, duration_minutes, raw_payload, content_hash, processed, \
             is_valid, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                cached.id,
                cached.external_id,
                cached.meeting_title,
                cached.meeting_date.map(|d| d.to_rfc3339()),
                cached.participant_count,
                cached.duration_minutes,
                cached.raw_payload.to_string(),
                cached.content_hash,
                cached.processed,
                cached.is_valid,
                cached.created_at.to_rfc3339(),
                cached.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(cached)
    }

    fn get(&self, external_id: &str) -> Result<Option<CachedTranscript>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM transcripts WHERE external_id = ?",
            TRANSCRIPT_COLUMNS
        );
        match conn.query_row(&sql, params![external_id], Self::row_to_transcript) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_unprocessed(&self, limit: u32) -> Result<Vec<CachedTranscript>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM transcripts WHERE processed = 0 AND is_valid = 1 \
             ORDER BY meeting_date ASC LIMIT ?",
            TRANSCRIPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], Self::row_to_transcript)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<CachedTranscript>, StoreError> {
        let conn = self.conn.lock().unwrap();
        // meeting_date is stored as RFC 3339 in UTC, so a date prefix match
        // selects the whole UTC day.
        let sql = format!(
            "SELECT {} FROM transcripts WHERE meeting_date LIKE ? \
             ORDER BY meeting_date ASC",
            TRANSCRIPT_COLUMNS
        );
        let prefix = format!("{}%", date.format("%Y-%m-%d"));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![prefix], Self::row_to_transcript)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn list_recent(&self, limit: u32) -> Result<Vec<CachedTranscript>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM transcripts ORDER BY meeting_date DESC LIMIT ?",
            TRANSCRIPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], Self::row_to_transcript)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn mark_processed(&self, external_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE transcripts SET processed = 1, updated_at = ? WHERE external_id = ?",
            params![Utc::now().to_rfc3339(), external_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!(
                "transcript {}",
                external_id
            )));
        }
        Ok(())
    }

    fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM transcripts", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

impl TaskStore for SqliteStore {
    fn insert_tasks(
        &self,
        transcript_external_id: &str,
        tasks: Vec<NewTask>,
        force: bool,
    ) -> Result<Vec<ExtractedTask>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE transcript_external_id = ?",
            params![transcript_external_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            if !force {
                return Err(StoreError::AlreadyExtracted(
                    transcript_external_id.to_string(),
                ));
            }
            conn.execute(
                "DELETE FROM tasks WHERE transcript_external_id = ?",
                params![transcript_external_id],
            )?;
        }

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(tasks.len());
        for task in tasks {
            let row = ExtractedTask {
                id: uuid::Uuid::new_v4().to_string(),
                transcript_external_id: transcript_external_id.to_string(),
                task_item: task.task_item,
                assignee_emails: task.assignee_emails,
                assignee_names: task.assignee_names,
                priority: task.priority,
                brief_description: task.brief_description,
                due_date: task.due_date,
                status: task.status,
                meets_word_count: task.meets_word_count,
                meets_description_length: task.meets_description_length,
                extraction_order: task.extraction_order,
                confidence: task.confidence,
                source_sentences: task.source_sentences,
                approval_status: ApprovalStatus::Pending,
                auto_push_enabled: false,
                reviewer: None,
                review_notes: None,
                reviewed_at: None,
                delivery: DeliveryRecord::default(),
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO tasks (id, transcript_external_id, task_item, assignee_emails, \
                 assignee_names, priority, brief_description, due_date, status, \
                 meets_word_count, meets_description_length, extraction_order, confidence, \
                 source_sentences, approval_status, auto_push_enabled, delivery_status, \
                 delivery_errors, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    row.id,
                    row.transcript_external_id,
                    row.task_item,
                    serde_json::to_string(&row.assignee_emails)
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    serde_json::to_string(&row.assignee_names)
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    row.priority.label(),
                    row.brief_description,
                    row.due_date.map(|d| d.to_rfc3339()),
                    row.status.label(),
                    row.meets_word_count,
                    row.meets_description_length,
                    row.extraction_order,
                    row.confidence,
                    serde_json::to_string(&row.source_sentences)
                        .map_err(|e| StoreError::Database(e.to_string()))?,
                    Self::approval_label(row.approval_status),
                    row.auto_push_enabled,
                    Self::delivery_label(row.delivery.status),
                    "[]",
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )?;
            inserted.push(row);
        }
        Ok(inserted)
    }

    fn get_task(&self, id: &str) -> Result<Option<ExtractedTask>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match Self::get_task_locked(&conn, id) {
            Ok(task) => Ok(Some(task)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractedTask>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.approval_status {
            conditions.push("approval_status = ?");
            values.push(Box::new(Self::approval_label(status).to_string()));
        }
        if let Some(status) = filter.delivery_status {
            conditions.push("delivery_status = ?");
            values.push(Box::new(Self::delivery_label(status).to_string()));
        }
        if let Some(ref external_id) = filter.transcript_external_id {
            conditions.push("transcript_external_id = ?");
            values.push(Box::new(external_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY created_at ASC, extraction_order ASC \
             LIMIT ? OFFSET ?",
            TASK_COLUMNS, where_clause
        );
        values.push(Box::new(filter.limit.unwrap_or(500)));
        values.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql)?;
        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(value_refs.as_slice(), Self::row_to_task)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn approve(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ExtractedTask, StoreError> {
        self.set_review(id, ApprovalStatus::Approved, reviewer, notes)
    }

    fn reject(
        &self,
        id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<ExtractedTask, StoreError> {
        self.set_review(id, ApprovalStatus::Rejected, reviewer, notes)
    }

    fn record_delivery_success(
        &self,
        id: &str,
        remote_item_id: &str,
    ) -> Result<ExtractedTask, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::get_task_locked(&conn, id)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET delivery_status = 'delivered', remote_item_id = ?, \
             delivered_at = ?, updated_at = ? WHERE id = ?",
            params![remote_item_id, now, now, id],
        )?;
        Self::get_task_locked(&conn, id)
    }

    fn record_delivery_failure(
        &self,
        id: &str,
        message: &str,
    ) -> Result<ExtractedTask, StoreError> {
        let conn = self.conn.lock().unwrap();
        let task = Self::get_task_locked(&conn, id)?;

        let mut errors = task.delivery.errors;
        errors.push(DeliveryError {
            at: Utc::now(),
            message: message.to_string(),
        });
        let errors_json = serde_json::to_string(&errors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET delivery_status = 'failed', delivery_errors = ?, \
             updated_at = ? WHERE id = ?",
            params![errors_json, now, id],
        )?;
        Self::get_task_locked(&conn, id)
    }

    fn count(&self, filter: &TaskFilter) -> Result<i64, StoreError> {
        // Delegate to list for filter handling; task volumes are small.
        Ok(self.list(filter)?.len() as i64)
    }
}
