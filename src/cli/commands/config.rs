//! Config Command
//!
//! Usage:
//!   recipeforge config show [-f json]
//!   recipeforge config path
//!   recipeforge config init [-g] [--force]

use crate::cli::output::{self, Format};
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(format: Format) -> Result<()> {
    ConfigLoader::show_config(format == Format::Json)
}

pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

pub fn init_global(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_global(force)?;
    output::success("Initialized global configuration");
    output::field("Directory", dir.display());
    Ok(())
}

pub fn init_project() -> Result<()> {
    let root = std::env::current_dir()?;
    let dir = ConfigLoader::init_project(&root)?;
    output::success("Initialized project configuration");
    output::field("Directory", dir.display());
    output::field("Config", ConfigLoader::project_config_path().display());
    Ok(())
}
