//! Category-level master recipes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::CategoryKey;

/// Synthesized summary of every analysis for one block within a category
///
/// At most one exists per `(prompt_block_id, category, subcategory)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRecipe {
    pub id: String,
    pub prompt_block_id: String,
    #[serde(default)]
    pub prompt_block_title: String,
    pub category: String,
    pub subcategory: String,
    pub content: String,
    #[serde(default)]
    pub product_count: usize,
    #[serde(default)]
    pub product_ids: Vec<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MasterRecipe {
    pub fn category_key(&self) -> CategoryKey {
        CategoryKey::new(&self.category, &self.subcategory)
    }
}

/// One product's success recipe for one analysis block
///
/// Written by the competitor pipeline after a block succeeds; master recipes
/// prefer these over raw analyses. The latest per `(product_id, prompt_block_id)` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecipe {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub product_title: String,
    pub prompt_block_id: String,
    #[serde(default)]
    pub prompt_block_title: String,
    pub category: String,
    pub subcategory: String,
    pub content: String,
    pub user_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
