//! Analyze Command
//!
//! Schedule analysis tasks for one or more products, wait for the queue to
//! drain (including any category completion it triggers) and report the
//! outcome of each task.

use std::time::Duration;

use crate::cli::output::{self, Format};
use crate::cli::CommandContext;
use crate::types::{Result, Task, TaskType};

pub struct AnalyzeOptions {
    pub products: Vec<String>,
    pub user: String,
    pub project: String,
    pub delay_secs: u64,
    pub task_type: TaskType,
    pub prompt_block: Option<String>,
    pub format: Format,
}

pub async fn run(options: AnalyzeOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let engine = ctx.engine()?;
    let scheduler = engine.scheduler();

    let mut task_ids = Vec::with_capacity(options.products.len());
    for product_id in &options.products {
        let task_id = scheduler
            .schedule(
                product_id,
                &options.user,
                &options.project,
                Duration::from_secs(options.delay_secs),
                options.task_type,
                options.prompt_block.as_deref(),
            )
            .await?;
        task_ids.push(task_id);
    }

    if options.format == Format::Text {
        output::info(&format!(
            "Scheduled {} {} task(s), waiting for completion",
            task_ids.len(),
            options.task_type
        ));
    }

    scheduler.drain().await;

    let mut tasks: Vec<Task> = Vec::with_capacity(task_ids.len());
    for task_id in &task_ids {
        if let Some(task) = scheduler.get_status(task_id)? {
            tasks.push(task);
        }
    }

    match options.format {
        Format::Json => output::json(&tasks)?,
        Format::Text => {
            for task in &tasks {
                match (task.success, &task.error) {
                    (Some(true), _) => {
                        output::success(&format!("{} ({})", task.product_id, task.task_id))
                    }
                    (_, Some(err)) => {
                        output::warning(&format!("{} failed: {}", task.product_id, err))
                    }
                    _ => output::warning(&format!("{} did not run", task.product_id)),
                }
            }
        }
    }

    Ok(())
}
