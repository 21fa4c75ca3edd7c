//! Per-product success recipe collection.

use rusqlite::params;

use super::Database;
use super::database::{log_filter_warn, time_column};
use crate::types::{CategoryKey, ProductRecipe, Result};

const PRODUCT_RECIPE_COLUMNS: &str = "id, product_id, product_title, prompt_block_id, \
     prompt_block_title, category, subcategory, content, user_id, project_id, created_at, \
     updated_at";

pub struct ProductRecipeStore<'a> {
    db: &'a Database,
}

impl<'a> ProductRecipeStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert, or replace the content of the product's recipe for the block
    pub fn upsert(&self, recipe: &ProductRecipe) -> Result<()> {
        self.db.conn()?.execute(
            r#"
            INSERT INTO product_recipes (id, product_id, product_title, prompt_block_id,
                prompt_block_title, category, subcategory, content, user_id, project_id,
                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(product_id, prompt_block_id) DO UPDATE SET
                product_title = excluded.product_title,
                prompt_block_title = excluded.prompt_block_title,
                category = excluded.category,
                subcategory = excluded.subcategory,
                content = excluded.content,
                user_id = excluded.user_id,
                project_id = excluded.project_id,
                updated_at = excluded.updated_at
            "#,
            params![
                recipe.id,
                recipe.product_id,
                recipe.product_title,
                recipe.prompt_block_id,
                recipe.prompt_block_title,
                recipe.category,
                recipe.subcategory,
                recipe.content,
                recipe.user_id,
                recipe.project_id,
                recipe.created_at.to_rfc3339(),
                recipe.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn for_block(
        &self,
        prompt_block_id: &str,
        key: &CategoryKey,
        limit: usize,
    ) -> Result<Vec<ProductRecipe>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM product_recipes
             WHERE prompt_block_id = ?1 AND category = ?2 AND subcategory = ?3
             ORDER BY created_at, id
             LIMIT ?4",
            PRODUCT_RECIPE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(
                params![prompt_block_id, key.category, key.subcategory, limit as i64],
                Self::map_row,
            )?
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable product recipe"))
            .collect();
        Ok(recipes)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRecipe> {
        Ok(ProductRecipe {
            id: row.get(0)?,
            product_id: row.get(1)?,
            product_title: row.get(2)?,
            prompt_block_id: row.get(3)?,
            prompt_block_title: row.get(4)?,
            category: row.get(5)?,
            subcategory: row.get(6)?,
            content: row.get(7)?,
            user_id: row.get(8)?,
            project_id: row.get(9)?,
            created_at: time_column(row, 10)?,
            updated_at: time_column(row, 11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn recipe(id: &str, product: &str, block: &str, content: &str) -> ProductRecipe {
        let now = Utc::now();
        ProductRecipe {
            id: id.into(),
            product_id: product.into(),
            product_title: format!("Title {}", product),
            prompt_block_id: block.into(),
            prompt_block_title: "Keywords".into(),
            category: "Home".into(),
            subcategory: "Kitchen".into(),
            content: content.into(),
            user_id: "u1".into(),
            project_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_latest_recipe_per_product_and_block_wins() {
        let db = setup();
        let store = ProductRecipeStore::new(&db);
        let kitchen = CategoryKey::new("Home", "Kitchen");

        store.upsert(&recipe("r1", "p1", "b1", "first")).unwrap();
        store.upsert(&recipe("r2", "p1", "b1", "second")).unwrap();
        store.upsert(&recipe("r3", "p2", "b1", "other product")).unwrap();
        store.upsert(&recipe("r4", "p1", "b2", "other block")).unwrap();

        let found = store.for_block("b1", &kitchen, 100).unwrap();
        assert_eq!(found.len(), 2);
        let p1 = found.iter().find(|r| r.product_id == "p1").unwrap();
        assert_eq!(p1.id, "r1");
        assert_eq!(p1.content, "second");

        assert!(
            store
                .for_block("b1", &CategoryKey::new("Home", "Bath"), 100)
                .unwrap()
                .is_empty()
        );
    }
}
