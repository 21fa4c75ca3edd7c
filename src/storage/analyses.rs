//! Analysis result collection.

use rusqlite::params;

use super::Database;
use super::database::{json_column, log_filter_warn, time_column};
use crate::types::{AnalysisResult, CategoryKey, Result};

const RESULT_COLUMNS: &str = "id, product_id, project_id, prompt_block_id, prompt_block_title, \
     user_id, category, subcategory, input_data, output, error, model, duration_ms, rerun, \
     created_at";

pub struct AnalysisStore<'a> {
    db: &'a Database,
}

impl<'a> AnalysisStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Rows are immutable once written; every run appends.
    pub fn insert(&self, result: &AnalysisResult) -> Result<()> {
        let input = serde_json::to_string(&result.input_data)?;
        self.db.conn()?.execute(
            r#"
            INSERT INTO analysis_results (id, product_id, project_id, prompt_block_id,
                prompt_block_title, user_id, category, subcategory, input_data, output, error,
                model, duration_ms, rerun, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                result.id,
                result.product_id,
                result.project_id,
                result.prompt_block_id,
                result.prompt_block_title,
                result.user_id,
                result.category,
                result.subcategory,
                input,
                result.output,
                result.error,
                result.model,
                result.duration_ms as i64,
                result.rerun,
                result.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn for_product(&self, product_id: &str) -> Result<Vec<AnalysisResult>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM analysis_results WHERE product_id = ?1 ORDER BY created_at, rowid",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![product_id], Self::map_row)?
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable analysis result"))
            .collect();
        Ok(rows)
    }

    /// Successful analyses of one block within a category, oldest first
    pub fn successful_for_block(
        &self,
        prompt_block_id: &str,
        key: &CategoryKey,
        limit: usize,
    ) -> Result<Vec<AnalysisResult>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM analysis_results
             WHERE prompt_block_id = ?1 AND category = ?2 AND subcategory = ?3
               AND output IS NOT NULL AND error IS NULL
             ORDER BY created_at, rowid
             LIMIT ?4",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![prompt_block_id, key.category, key.subcategory, limit as i64],
                Self::map_row,
            )?
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable analysis result"))
            .collect();
        Ok(rows)
    }

    /// Products in the category with a row for every active block of
    /// `prompt_category`. Failed rows count: a block is done once attempted,
    /// so a product cut off part-way through its blocks is not analyzed.
    pub fn count_analyzed_products(&self, key: &CategoryKey, prompt_category: &str) -> Result<usize> {
        let count: i64 = self.db.conn()?.query_row(
            "SELECT COUNT(*) FROM (
                 SELECT ar.product_id
                 FROM analysis_results ar
                 JOIN prompt_blocks pb ON pb.id = ar.prompt_block_id
                 WHERE ar.category = ?1 AND ar.subcategory = ?2
                   AND pb.prompt_category = ?3 AND pb.is_active = 1
                 GROUP BY ar.product_id
                 HAVING COUNT(DISTINCT ar.prompt_block_id) = (
                     SELECT COUNT(*) FROM prompt_blocks
                     WHERE prompt_category = ?3 AND is_active = 1
                 )
             )",
            params![key.category, key.subcategory, prompt_category],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisResult> {
        let duration_ms: i64 = row.get(12)?;
        Ok(AnalysisResult {
            id: row.get(0)?,
            product_id: row.get(1)?,
            project_id: row.get(2)?,
            prompt_block_id: row.get(3)?,
            prompt_block_title: row.get(4)?,
            user_id: row.get(5)?,
            category: row.get(6)?,
            subcategory: row.get(7)?,
            input_data: json_column(row, 8)?,
            output: row.get(9)?,
            error: row.get(10)?,
            model: row.get(11)?,
            duration_ms: duration_ms.max(0) as u64,
            rerun: row.get(13)?,
            created_at: time_column(row, 14)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PromptStore;
    use crate::types::PromptBlock;
    use chrono::Utc;
    use serde_json::json;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn result(id: &str, product: &str, block: &str, output: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            id: id.into(),
            product_id: product.into(),
            project_id: Some("proj".into()),
            prompt_block_id: block.into(),
            prompt_block_title: "Keywords".into(),
            user_id: "u1".into(),
            category: "Electronics".into(),
            subcategory: "Phones".into(),
            input_data: json!({"product_data": {"id": product}}),
            output: output.map(String::from),
            error: output.is_none().then(|| "generation failed".to_string()),
            model: "test-model".into(),
            duration_ms: 12,
            rerun: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_counts_products_with_every_block_attempted() {
        let db = setup();
        let prompts = PromptStore::new(&db);
        prompts
            .upsert(&PromptBlock::new("b1", "competitor_analysis", "Keywords", "T"))
            .unwrap();
        prompts
            .upsert(&PromptBlock::new("b2", "competitor_analysis", "Pricing", "T"))
            .unwrap();
        prompts
            .upsert(&PromptBlock::new("m1", "market_research", "Trends", "T"))
            .unwrap();

        let store = AnalysisStore::new(&db);
        store.insert(&result("a1", "p1", "b1", Some("ok"))).unwrap();
        store.insert(&result("a2", "p1", "b2", None)).unwrap();
        store.insert(&result("a3", "p2", "b1", None)).unwrap();
        store.insert(&result("a4", "p3", "m1", Some("trend"))).unwrap();

        let key = CategoryKey::new("Electronics", "Phones");
        // p2 has attempted only one of the two blocks
        assert_eq!(
            store.count_analyzed_products(&key, "competitor_analysis").unwrap(),
            1
        );
        assert_eq!(store.count_analyzed_products(&key, "market_research").unwrap(), 1);

        store.insert(&result("a5", "p2", "b2", Some("late"))).unwrap();
        assert_eq!(
            store.count_analyzed_products(&key, "competitor_analysis").unwrap(),
            2
        );
        assert_eq!(
            store
                .count_analyzed_products(
                    &CategoryKey::new("Electronics", "Tablets"),
                    "competitor_analysis"
                )
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_successful_for_block_excludes_failures() {
        let db = setup();
        let store = AnalysisStore::new(&db);
        store.insert(&result("a1", "p1", "b1", Some("first"))).unwrap();
        store.insert(&result("a2", "p2", "b1", None)).unwrap();
        store.insert(&result("a3", "p3", "b1", Some("third"))).unwrap();
        store.insert(&result("a4", "p1", "b2", Some("other"))).unwrap();

        let key = CategoryKey::new("Electronics", "Phones");
        let rows = store.successful_for_block("b1", &key, 100).unwrap();
        let outputs: Vec<_> = rows.iter().filter_map(|r| r.output.as_deref()).collect();
        assert_eq!(outputs, vec!["first", "third"]);

        let loaded = store.for_product("p1").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].input_data["product_data"]["id"], "p1");
        assert_eq!(loaded[0].duration_ms, 12);
    }
}
