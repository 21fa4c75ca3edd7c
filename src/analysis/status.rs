//! Queue progress snapshot for a category or the whole store.

use serde::Serialize;

use crate::storage::{Database, ProductStore, PromptStore, RecipeStore};
use crate::types::{CategoryKey, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub total_products: usize,
    pub completed: usize,
    pub in_progress: usize,
    /// Products never picked up by an analysis
    pub pending: usize,
    pub failed: usize,
    pub active_prompt_blocks: usize,
    pub master_recipes_generated: usize,
    /// Completed share of all products, two decimals
    pub percentage_complete: f64,
}

/// Progress counts for one category, or across all products when `key` is `None`
pub fn queue_status(
    db: &Database,
    key: Option<&CategoryKey>,
    prompt_category: &str,
) -> Result<QueueStatus> {
    let counts = ProductStore::new(db).status_counts(key)?;
    let active_prompt_blocks = PromptStore::new(db).count_active(prompt_category)?;
    let master_recipes_generated = RecipeStore::new(db).count(key)?;

    let percentage_complete = if counts.total == 0 {
        0.0
    } else {
        let raw = counts.completed as f64 / counts.total as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    };

    Ok(QueueStatus {
        category: key.map(|k| k.category.clone()),
        subcategory: key.map(|k| k.subcategory.clone()),
        total_products: counts.total,
        completed: counts.completed,
        in_progress: counts.in_progress,
        pending: counts.pending(),
        failed: counts.failed,
        active_prompt_blocks,
        master_recipes_generated,
        percentage_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::prompt_category;
    use crate::types::{AnalysisStatus, CategoryHierarchy, Product, PromptBlock};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_empty_store() {
        let db = setup();
        let status = queue_status(&db, None, prompt_category::COMPETITOR_ANALYSIS).unwrap();
        assert_eq!(status.total_products, 0);
        assert_eq!(status.percentage_complete, 0.0);
        assert!(status.category.is_none());
    }

    #[test]
    fn test_counts_by_status() {
        let db = setup();
        let products = ProductStore::new(&db);
        for id in ["p1", "p2", "p3"] {
            products
                .upsert(&Product::new(
                    id,
                    "u1",
                    "Mug",
                    Some(CategoryHierarchy::new("Home", &["Kitchen"])),
                ))
                .unwrap();
        }
        products
            .upsert(&Product::new(
                "other",
                "u1",
                "Phone",
                Some(CategoryHierarchy::new("Electronics", &["Phones"])),
            ))
            .unwrap();
        products
            .set_analysis_status("p1", AnalysisStatus::Completed, None)
            .unwrap();
        products
            .set_analysis_status("p2", AnalysisStatus::Failed, Some("boom"))
            .unwrap();
        PromptStore::new(&db)
            .upsert(&PromptBlock::new(
                "b1",
                prompt_category::COMPETITOR_ANALYSIS,
                "Keywords",
                "Analyze",
            ))
            .unwrap();

        let key = CategoryKey::new("Home", "Kitchen");
        let status = queue_status(&db, Some(&key), prompt_category::COMPETITOR_ANALYSIS).unwrap();

        assert_eq!(status.total_products, 3);
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.pending, 1);
        assert_eq!(status.in_progress, 0);
        assert_eq!(status.active_prompt_blocks, 1);
        assert_eq!(status.master_recipes_generated, 0);
        assert_eq!(status.percentage_complete, 33.33);

        let all = queue_status(&db, None, prompt_category::COMPETITOR_ANALYSIS).unwrap();
        assert_eq!(all.total_products, 4);
        assert_eq!(all.percentage_complete, 25.0);
    }
}
