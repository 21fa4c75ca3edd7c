//! Init Command
//!
//! Create the project directory, default config and database.

use crate::config::ConfigLoader;
use crate::storage::Database;
use crate::types::{ForgeError, Result};

use crate::cli::output;

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;

    if root.join(ConfigLoader::project_dir()).exists() && !force {
        return Err(ForgeError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    let project_dir = ConfigLoader::init_project(&root)?;

    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let config = ConfigLoader::load()?;
    let db = Database::open(&config.storage.database)?;
    db.initialize()?;

    output::success(&format!("Initialized RecipeForge in {}/", project_dir.display()));
    output::field("Database", config.storage.database.display());
    println!();
    println!("Next steps:");
    println!("  1. recipeforge import prompts <prompts.json>");
    println!("  2. recipeforge import products <products.json>");
    println!("  3. recipeforge analyze --product <id> --user <id> --project <id>");

    Ok(())
}
