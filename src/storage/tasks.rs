//! Durable mirror of scheduled tasks.

use rusqlite::{OptionalExtension, params};

use super::Database;
use super::database::{opt_time_column, time_column};
use crate::types::{Result, ResultExt, Task, TaskType};

pub struct TaskStore<'a> {
    db: &'a Database,
}

impl<'a> TaskStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or overwrite the task's state, keyed by `task_id`
    pub fn upsert(&self, task: &Task) -> Result<()> {
        self.db
            .conn()?
            .execute(
                r#"
            INSERT INTO analysis_tasks (task_id, product_id, user_id, project_id, task_type,
                scheduled_time, prompt_block_id, executed, success, error, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(task_id) DO UPDATE SET
                executed = excluded.executed,
                success = excluded.success,
                error = excluded.error,
                completed_at = excluded.completed_at
            "#,
                params![
                    task.task_id,
                    task.product_id,
                    task.user_id,
                    task.project_id,
                    task.task_type.as_str(),
                    task.scheduled_time.to_rfc3339(),
                    task.prompt_block_id,
                    task.executed,
                    task.success,
                    task.error,
                    task.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .with_context_fn(|| format!("Failed to persist task {}", task.task_id))?;
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let task = self
            .db
            .conn()?
            .query_row(
                "SELECT task_id, product_id, user_id, project_id, task_type, scheduled_time,
                        prompt_block_id, executed, success, error, completed_at
                 FROM analysis_tasks WHERE task_id = ?1",
                params![task_id],
                Self::map_row,
            )
            .optional()?;
        Ok(task)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let task_type: String = row.get(4)?;
        let task_type = task_type.parse::<TaskType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(Task {
            task_id: row.get(0)?,
            product_id: row.get(1)?,
            user_id: row.get(2)?,
            project_id: row.get(3)?,
            task_type,
            scheduled_time: time_column(row, 5)?,
            prompt_block_id: row.get(6)?,
            executed: row.get(7)?,
            success: row.get(8)?,
            error: row.get(9)?,
            completed_at: opt_time_column(row, 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_upsert_by_task_id() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let store = TaskStore::new(&db);

        let mut task = Task {
            task_id: "1700000000_p1_0".into(),
            product_id: "p1".into(),
            user_id: "u1".into(),
            project_id: "proj".into(),
            task_type: TaskType::MarketResearch,
            scheduled_time: Utc::now(),
            prompt_block_id: Some("b1".into()),
            executed: false,
            success: None,
            error: None,
            completed_at: None,
        };
        store.upsert(&task).unwrap();
        assert_eq!(store.get(&task.task_id).unwrap().unwrap().success, None);

        task.mark_failed("Timeout after 300s");
        store.upsert(&task).unwrap();

        let loaded = store.get(&task.task_id).unwrap().unwrap();
        assert!(loaded.executed);
        assert_eq!(loaded.success, Some(false));
        assert_eq!(loaded.task_type, TaskType::MarketResearch);
        assert_eq!(loaded.prompt_block_id.as_deref(), Some("b1"));
        assert!(loaded.completed_at.is_some());
        assert!(store.get("unknown").unwrap().is_none());
    }
}
