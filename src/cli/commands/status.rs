//! Status Command
//!
//! Look up a task in the persisted task mirror.

use crate::cli::output::{self, Format};
use crate::cli::CommandContext;
use crate::storage::TaskStore;
use crate::types::{EntityKind, ForgeError, Result};

pub fn run(task_id: &str, format: Format) -> Result<()> {
    let ctx = CommandContext::load()?;
    let task = TaskStore::new(&ctx.db)
        .get(task_id)?
        .ok_or_else(|| ForgeError::not_found(EntityKind::Task, task_id))?;

    if format == Format::Json {
        return output::json(&task);
    }

    output::section(&format!("Task {}", task.task_id));
    output::field("Product", &task.product_id);
    output::field("User", &task.user_id);
    output::field("Project", &task.project_id);
    output::field("Type", task.task_type);
    output::field("Scheduled", task.scheduled_time.to_rfc3339());
    if let Some(block) = &task.prompt_block_id {
        output::field("Prompt block", block);
    }
    output::field("Executed", task.executed);
    output::field(
        "Success",
        task.success
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    if let Some(err) = &task.error {
        output::field("Error", err);
    }
    Ok(())
}
