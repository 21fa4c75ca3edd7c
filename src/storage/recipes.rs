//! Master recipe collection.
//!
//! Uniqueness per `(prompt_block_id, category, subcategory)` is enforced by a
//! unique index; [`RecipeStore::insert_if_absent`] relies on it so racing
//! creators cannot both win.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::database::{json_column, log_filter_warn, time_column};
use crate::types::{CategoryKey, MasterRecipe, Result};

const RECIPE_COLUMNS: &str = "id, prompt_block_id, prompt_block_title, category, subcategory, \
     content, product_count, product_ids, user_id, created_at, updated_at";

pub struct RecipeStore<'a> {
    db: &'a Database,
}

impl<'a> RecipeStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn exists(&self, prompt_block_id: &str, key: &CategoryKey) -> Result<bool> {
        let found: Option<i64> = self
            .db
            .conn()?
            .query_row(
                "SELECT 1 FROM master_recipes
                 WHERE prompt_block_id = ?1 AND category = ?2 AND subcategory = ?3",
                params![prompt_block_id, key.category, key.subcategory],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get(&self, prompt_block_id: &str, key: &CategoryKey) -> Result<Option<MasterRecipe>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM master_recipes
             WHERE prompt_block_id = ?1 AND category = ?2 AND subcategory = ?3",
            RECIPE_COLUMNS
        );
        let recipe = conn
            .query_row(
                &sql,
                params![prompt_block_id, key.category, key.subcategory],
                Self::map_row,
            )
            .optional()?;
        Ok(recipe)
    }

    /// Insert unless a recipe already exists for the block and category.
    /// Returns whether this call created it.
    pub fn insert_if_absent(&self, recipe: &MasterRecipe) -> Result<bool> {
        let product_ids = serde_json::to_string(&recipe.product_ids)?;
        let inserted = self.db.conn()?.execute(
            r#"
            INSERT OR IGNORE INTO master_recipes (id, prompt_block_id, prompt_block_title,
                category, subcategory, content, product_count, product_ids, user_id,
                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                recipe.id,
                recipe.prompt_block_id,
                recipe.prompt_block_title,
                recipe.category,
                recipe.subcategory,
                recipe.content,
                recipe.product_count as i64,
                product_ids,
                recipe.user_id,
                recipe.created_at.to_rfc3339(),
                recipe.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Replace content in place, keeping the original id and creation time
    pub fn upsert(&self, recipe: &MasterRecipe) -> Result<()> {
        let product_ids = serde_json::to_string(&recipe.product_ids)?;
        self.db.conn()?.execute(
            r#"
            INSERT INTO master_recipes (id, prompt_block_id, prompt_block_title, category,
                subcategory, content, product_count, product_ids, user_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(prompt_block_id, category, subcategory) DO UPDATE SET
                prompt_block_title = excluded.prompt_block_title,
                content = excluded.content,
                product_count = excluded.product_count,
                product_ids = excluded.product_ids,
                user_id = excluded.user_id,
                updated_at = ?12
            "#,
            params![
                recipe.id,
                recipe.prompt_block_id,
                recipe.prompt_block_title,
                recipe.category,
                recipe.subcategory,
                recipe.content,
                recipe.product_count as i64,
                product_ids,
                recipe.user_id,
                recipe.created_at.to_rfc3339(),
                recipe.updated_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Recipes for one category, or all of them when `key` is `None`
    pub fn list(&self, key: Option<&CategoryKey>) -> Result<Vec<MasterRecipe>> {
        let conn = self.db.conn()?;
        let (filter, args): (&str, Vec<&str>) = match key {
            Some(k) => (
                "WHERE category = ?1 AND subcategory = ?2",
                vec![k.category.as_str(), k.subcategory.as_str()],
            ),
            None => ("", Vec::new()),
        };
        let sql = format!(
            "SELECT {} FROM master_recipes {} ORDER BY category, subcategory, created_at",
            RECIPE_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(rusqlite::params_from_iter(args), Self::map_row)?
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable master recipe"))
            .collect();
        Ok(recipes)
    }

    pub fn count(&self, key: Option<&CategoryKey>) -> Result<usize> {
        let conn = self.db.conn()?;
        let count: i64 = match key {
            Some(k) => conn.query_row(
                "SELECT COUNT(*) FROM master_recipes WHERE category = ?1 AND subcategory = ?2",
                params![k.category, k.subcategory],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM master_recipes", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MasterRecipe> {
        let product_count: i64 = row.get(6)?;
        Ok(MasterRecipe {
            id: row.get(0)?,
            prompt_block_id: row.get(1)?,
            prompt_block_title: row.get(2)?,
            category: row.get(3)?,
            subcategory: row.get(4)?,
            content: row.get(5)?,
            product_count: product_count.max(0) as usize,
            product_ids: json_column(row, 7)?,
            user_id: row.get(8)?,
            created_at: time_column(row, 9)?,
            updated_at: time_column(row, 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn recipe(id: &str, content: &str) -> MasterRecipe {
        let now = Utc::now();
        MasterRecipe {
            id: id.into(),
            prompt_block_id: "b1".into(),
            prompt_block_title: "Keywords".into(),
            category: "Home".into(),
            subcategory: "Kitchen".into(),
            content: content.into(),
            product_count: 2,
            product_ids: vec!["p1".into(), "p2".into()],
            user_id: "u1".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_if_absent_is_unique() {
        let db = setup();
        let store = RecipeStore::new(&db);
        let key = CategoryKey::new("Home", "Kitchen");

        assert!(!store.exists("b1", &key).unwrap());
        assert!(store.insert_if_absent(&recipe("r1", "first")).unwrap());
        assert!(!store.insert_if_absent(&recipe("r2", "second")).unwrap());

        assert!(store.exists("b1", &key).unwrap());
        assert_eq!(store.count(Some(&key)).unwrap(), 1);
        assert_eq!(store.get("b1", &key).unwrap().unwrap().content, "first");
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let db = setup();
        let store = RecipeStore::new(&db);
        let key = CategoryKey::new("Home", "Kitchen");

        store.insert_if_absent(&recipe("r1", "first")).unwrap();
        let mut replacement = recipe("r2", "regenerated");
        replacement.product_count = 3;
        store.upsert(&replacement).unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "r1");
        assert_eq!(all[0].content, "regenerated");
        assert_eq!(all[0].product_count, 3);
        assert_eq!(store.list(Some(&key)).unwrap().len(), 1);
        assert_eq!(store.count(None).unwrap(), 1);
    }
}
