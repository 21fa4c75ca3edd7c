//! Generation call log.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::Database;
use crate::types::Result;

/// One generation call as sent to the provider
#[derive(Debug, Clone)]
pub struct GenerationLog {
    pub id: String,
    pub prompt_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub prompt: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub model: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

pub struct LogStore<'a> {
    db: &'a Database,
}

impl<'a> LogStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, log: &GenerationLog) -> Result<()> {
        self.db.conn()?.execute(
            "INSERT INTO generation_logs (id, prompt_id, user_id, project_id, prompt, output,
                error, model, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                log.id,
                log.prompt_id,
                log.user_id,
                log.project_id,
                log.prompt,
                log.output,
                log.error,
                log.model,
                log.duration_ms as i64,
                log.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn count_for_prompt(&self, prompt_id: &str) -> Result<usize> {
        let count: i64 = self.db.conn()?.query_row(
            "SELECT COUNT(*) FROM generation_logs WHERE prompt_id = ?1",
            params![prompt_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
