//! CLI Common Utilities
//!
//! Shared initialization and context for command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::{ProviderConfig, create_provider};
use crate::analysis::Engine;
use crate::config::{Config, ConfigLoader};
use crate::storage::{Database, SharedDatabase};
use crate::types::{CategoryKey, ForgeError, Result};

/// Resources every data command needs
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub db: SharedDatabase,
}

impl CommandContext {
    /// Validate initialization, load config and open the database
    pub fn load() -> Result<Self> {
        require_initialized()?;
        let config = ConfigLoader::load()?;
        let db = Database::open(&config.storage.database)?;
        db.initialize()?;

        Ok(Self {
            config,
            db: Arc::new(db),
        })
    }

    /// Build the analysis engine on the already-open database
    pub fn engine(&self) -> Result<Engine> {
        let provider = create_provider(&ProviderConfig::from(&self.config.llm))?;
        Ok(Engine::new(self.config.clone(), self.db.clone(), provider))
    }
}

/// Returns the `.recipeforge` directory, or `NotInitialized`
pub fn require_initialized() -> Result<PathBuf> {
    if !ConfigLoader::is_project_initialized() {
        return Err(ForgeError::NotInitialized);
    }
    Ok(ConfigLoader::project_dir())
}

/// Category filter from paired `--category`/`--subcategory` flags
pub fn category_filter(
    category: Option<String>,
    subcategory: Option<String>,
) -> Result<Option<CategoryKey>> {
    match (category, subcategory) {
        (Some(c), Some(s)) => Ok(Some(CategoryKey::new(c, s))),
        (None, None) => Ok(None),
        _ => Err(ForgeError::Validation(
            "--category and --subcategory must be given together".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_filter_requires_both() {
        assert!(category_filter(None, None).unwrap().is_none());
        let key = category_filter(Some("Home".into()), Some("Kitchen".into()))
            .unwrap()
            .unwrap();
        assert_eq!(key.to_string(), "Home>Kitchen");
        assert!(category_filter(Some("Home".into()), None).is_err());
    }
}
