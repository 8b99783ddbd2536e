// src/corpus/store.rs — SQLite operations

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::infra::errors::Result;
use crate::playbook::metrics::ExecutionObservation;
use crate::playbook::types::{
    Playbook, PlaybookMetrics, PlaybookStatus, SimilarityRecord, TagVocabularyEntry,
};

/// Low-level SQLite operations for the playbook corpus, tag vocabulary and
/// similarity matrix.
///
/// The connection sits behind a mutex so one store can be shared via `Arc`
/// across async tasks; no lock is ever held across an await point (all
/// methods are synchronous).
pub struct Store {
    conn: Mutex<Connection>,
}

const PLAYBOOK_COLUMNS: &str = "id, name, description, version, status, playbook_type, type_tags, \
     domain, scenario, complexity, stakeholders, tags, actions, source_learning_ids, parent_id, \
     optimization_count, usage_count, success_rate, avg_outcome_score, avg_execution_time_ms, \
     last_used, user_satisfaction, created_at, updated_at";

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Poisoning requires a panic inside a store call; propagating it
        // would only repeat that panic with less context.
        self.conn.lock().expect("store connection poisoned")
    }

    // -- Playbooks --

    pub fn insert_playbook(&self, p: &Playbook) -> Result<()> {
        self.conn().execute(
            &format!("INSERT INTO playbooks ({PLAYBOOK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"),
            params![
                p.id,
                p.name,
                p.description,
                p.version,
                p.status.as_str(),
                p.playbook_type,
                serde_json::to_string(&p.type_tags)?,
                p.domain,
                p.scenario,
                p.complexity,
                serde_json::to_string(&p.stakeholders)?,
                serde_json::to_string(&p.tags)?,
                serde_json::to_string(&p.actions)?,
                serde_json::to_string(&p.source_learning_ids)?,
                p.parent_id,
                p.optimization_count,
                p.metrics.usage_count,
                p.metrics.success_rate,
                p.metrics.avg_outcome_score,
                p.metrics.avg_execution_time_ms,
                p.metrics.last_used.map(|t| t.to_rfc3339()),
                p.metrics.user_satisfaction,
                p.created_at.to_rfc3339(),
                p.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_playbook(&self, p: &Playbook) -> Result<()> {
        self.conn().execute(
            "UPDATE playbooks SET name = ?2, description = ?3, version = ?4, status = ?5,
             playbook_type = ?6, type_tags = ?7, domain = ?8, scenario = ?9, complexity = ?10,
             stakeholders = ?11, tags = ?12, actions = ?13, source_learning_ids = ?14,
             parent_id = ?15, optimization_count = ?16, usage_count = ?17, success_rate = ?18,
             avg_outcome_score = ?19, avg_execution_time_ms = ?20, last_used = ?21,
             user_satisfaction = ?22, updated_at = ?23
             WHERE id = ?1",
            params![
                p.id,
                p.name,
                p.description,
                p.version,
                p.status.as_str(),
                p.playbook_type,
                serde_json::to_string(&p.type_tags)?,
                p.domain,
                p.scenario,
                p.complexity,
                serde_json::to_string(&p.stakeholders)?,
                serde_json::to_string(&p.tags)?,
                serde_json::to_string(&p.actions)?,
                serde_json::to_string(&p.source_learning_ids)?,
                p.parent_id,
                p.optimization_count,
                p.metrics.usage_count,
                p.metrics.success_rate,
                p.metrics.avg_outcome_score,
                p.metrics.avg_execution_time_ms,
                p.metrics.last_used.map(|t| t.to_rfc3339()),
                p.metrics.user_satisfaction,
                p.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_playbook(&self, id: &str) -> Result<Option<Playbook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYBOOK_COLUMNS} FROM playbooks WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_playbook)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn delete_playbook(&self, id: &str) -> Result<bool> {
        let count = self
            .conn()
            .execute("DELETE FROM playbooks WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYBOOK_COLUMNS} FROM playbooks ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_playbook)?;
        collect(rows)
    }

    pub fn list_by_status(&self, status: PlaybookStatus) -> Result<Vec<Playbook>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYBOOK_COLUMNS} FROM playbooks WHERE status = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![status.as_str()], row_to_playbook)?;
        collect(rows)
    }

    pub fn update_metrics(
        &self,
        id: &str,
        metrics: &PlaybookMetrics,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE playbooks SET usage_count = ?2, success_rate = ?3, avg_outcome_score = ?4,
             avg_execution_time_ms = ?5, last_used = ?6, user_satisfaction = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                metrics.usage_count,
                metrics.success_rate,
                metrics.avg_outcome_score,
                metrics.avg_execution_time_ms,
                metrics.last_used.map(|t| t.to_rfc3339()),
                metrics.user_satisfaction,
                updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn set_status(
        &self,
        id: &str,
        status: PlaybookStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE playbooks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn count_playbooks(&self) -> Result<i64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM playbooks", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- Executions --

    pub fn insert_execution(
        &self,
        playbook_id: &str,
        obs: &ExecutionObservation,
        executed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO playbook_executions (id, playbook_id, success, outcome_score,
             duration_ms, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                playbook_id,
                obs.success,
                obs.outcome_score,
                obs.duration_ms.map(|ms| ms as i64),
                executed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn count_executions(&self, playbook_id: &str) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM playbook_executions WHERE playbook_id = ?1",
            params![playbook_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // -- Tag vocabulary --

    pub fn upsert_tag(&self, entry: &TagVocabularyEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tag_vocabulary (name, keywords, confidence, first_identified,
             playbook_count, auto_discovered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO UPDATE SET
                keywords = ?2, confidence = ?3, playbook_count = ?5, auto_discovered = ?6",
            params![
                entry.name,
                serde_json::to_string(&entry.keywords)?,
                entry.confidence,
                entry.first_identified.to_rfc3339(),
                entry.playbook_count,
                entry.auto_discovered,
            ],
        )?;
        Ok(())
    }

    pub fn get_tag(&self, name: &str) -> Result<Option<TagVocabularyEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, keywords, confidence, first_identified, playbook_count, auto_discovered
             FROM tag_vocabulary WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], row_to_tag)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn all_tags(&self) -> Result<Vec<TagVocabularyEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, keywords, confidence, first_identified, playbook_count, auto_discovered
             FROM tag_vocabulary ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_tag)?;
        collect(rows)
    }

    pub fn increment_tag_playbook_count(&self, name: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tag_vocabulary SET playbook_count = playbook_count + 1 WHERE name = ?1",
            params![name],
        )?;
        Ok(())
    }

    // -- Tag similarity --

    /// Fetch the similarity row for a canonicalized pair.
    pub fn get_similarity(&self, tag1: &str, tag2: &str) -> Result<Option<SimilarityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tag1, tag2, score, co_occurrence, updated_at
             FROM tag_similarity WHERE tag1 = ?1 AND tag2 = ?2",
        )?;
        let mut rows = stmt.query_map(params![tag1, tag2], row_to_similarity)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite the row for `record`'s pair.
    pub fn upsert_similarity(&self, record: &SimilarityRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tag_similarity (tag1, tag2, score, co_occurrence, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tag1, tag2) DO UPDATE SET
                score = ?3, co_occurrence = ?4, updated_at = ?5",
            params![
                record.tag1,
                record.tag2,
                record.score,
                record.co_occurrence as i64,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All pairs involving `tag` with score >= threshold, best first.
    pub fn similar_records(&self, tag: &str, threshold: f64) -> Result<Vec<SimilarityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tag1, tag2, score, co_occurrence, updated_at
             FROM tag_similarity
             WHERE (tag1 = ?1 OR tag2 = ?1) AND score >= ?2
             ORDER BY score DESC",
        )?;
        let rows = stmt.query_map(params![tag, threshold], row_to_similarity)?;
        collect(rows)
    }

    /// Atomically replace the whole similarity matrix (rebuild).
    pub fn replace_similarities(&self, records: &[SimilarityRecord]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tag_similarity", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tag_similarity (tag1, tag2, score, co_occurrence, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.tag1,
                    r.tag2,
                    r.score,
                    r.co_occurrence as i64,
                    r.updated_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn all_similarities(&self) -> Result<Vec<SimilarityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT tag1, tag2, score, co_occurrence, updated_at FROM tag_similarity",
        )?;
        let rows = stmt.query_map([], row_to_similarity)?;
        collect(rows)
    }

    pub fn count_similarities(&self) -> Result<i64> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM tag_similarity", [], |row| row.get(0))?;
        Ok(count)
    }
}

// -- Row mapping helpers --

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

fn row_to_playbook(row: &Row<'_>) -> rusqlite::Result<Playbook> {
    let status_raw: String = row.get(4)?;
    let status = PlaybookStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown playbook status '{status_raw}'").into(),
        )
    })?;

    Ok(Playbook {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        version: row.get(3)?,
        status,
        playbook_type: row.get(5)?,
        type_tags: json_col(row, 6)?,
        domain: row.get(7)?,
        scenario: row.get(8)?,
        complexity: row.get(9)?,
        stakeholders: json_col(row, 10)?,
        tags: json_col(row, 11)?,
        actions: json_col(row, 12)?,
        source_learning_ids: json_col(row, 13)?,
        parent_id: row.get(14)?,
        optimization_count: row.get(15)?,
        metrics: PlaybookMetrics {
            usage_count: row.get(16)?,
            success_rate: row.get(17)?,
            avg_outcome_score: row.get(18)?,
            avg_execution_time_ms: row.get(19)?,
            last_used: opt_time_col(row, 20)?,
            user_satisfaction: row.get(21)?,
        },
        created_at: time_col(row, 22)?,
        updated_at: time_col(row, 23)?,
    })
}

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<TagVocabularyEntry> {
    Ok(TagVocabularyEntry {
        name: row.get(0)?,
        keywords: json_col(row, 1)?,
        confidence: row.get(2)?,
        first_identified: time_col(row, 3)?,
        playbook_count: row.get(4)?,
        auto_discovered: row.get(5)?,
    })
}

fn row_to_similarity(row: &Row<'_>) -> rusqlite::Result<SimilarityRecord> {
    let co_occurrence: i64 = row.get(3)?;
    Ok(SimilarityRecord {
        tag1: row.get(0)?,
        tag2: row.get(1)?,
        score: row.get(2)?,
        co_occurrence: co_occurrence.max(0) as u64,
        updated_at: time_col(row, 4)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}
