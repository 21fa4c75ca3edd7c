//! Queue Command
//!
//! Analysis progress for a category or the whole store.

use crate::analysis::queue_status;
use crate::cli::output::{self, Format};
use crate::cli::{CommandContext, category_filter};
use crate::types::Result;

pub fn run(category: Option<String>, subcategory: Option<String>, format: Format) -> Result<()> {
    let ctx = CommandContext::load()?;
    let key = category_filter(category, subcategory)?;
    let status = queue_status(&ctx.db, key.as_ref(), &ctx.config.analysis.prompt_category)?;

    if format == Format::Json {
        return output::json(&status);
    }

    match &key {
        Some(key) => output::section(&format!("Queue: {}", key)),
        None => output::section("Queue: all categories"),
    }
    output::field("Products", status.total_products);
    output::field("Completed", status.completed);
    output::field("In progress", status.in_progress);
    output::field("Pending", status.pending);
    output::field("Failed", status.failed);
    output::field("Active prompt blocks", status.active_prompt_blocks);
    output::field("Master recipes", status.master_recipes_generated);
    output::field("Complete", format!("{:.2}%", status.percentage_complete));
    Ok(())
}
