//! Recipes Command
//!
//! List master recipes, or regenerate a category's recipes in place.

use console::style;

use crate::cli::output::{self, Format};
use crate::cli::{CommandContext, category_filter};
use crate::storage::RecipeStore;
use crate::types::{CategoryKey, Result};

pub fn list(category: Option<String>, subcategory: Option<String>, format: Format) -> Result<()> {
    let ctx = CommandContext::load()?;
    let key = category_filter(category, subcategory)?;
    let recipes = RecipeStore::new(&ctx.db).list(key.as_ref())?;

    if format == Format::Json {
        return output::json(&recipes);
    }

    if recipes.is_empty() {
        output::info("No master recipes yet");
        return Ok(());
    }

    for recipe in &recipes {
        output::section(&format!(
            "{} · {}",
            recipe.category_key(),
            recipe.prompt_block_title
        ));
        println!(
            "{}",
            style(format!(
                "{} products, updated {}",
                recipe.product_count,
                recipe.updated_at.format("%Y-%m-%d %H:%M")
            ))
            .dim()
        );
        println!("{}", recipe.content);
    }
    Ok(())
}

pub async fn regenerate(category: String, subcategory: String, user: String) -> Result<()> {
    let ctx = CommandContext::load()?;
    let engine = ctx.engine()?;
    let key = CategoryKey::new(category, subcategory);

    let report = engine.generator().regenerate(&key, &user).await?;

    output::success(&format!("Regenerated master recipes for {}", key));
    output::field("Updated", report.updated);
    output::field("Skipped", report.skipped);
    if report.failed > 0 {
        output::warning(&format!("{} blocks failed to generate", report.failed));
    }
    if report.analyzed < report.expected {
        output::warning(&format!(
            "Only {}/{} products analyzed so far",
            report.analyzed, report.expected
        ));
    }
    Ok(())
}
