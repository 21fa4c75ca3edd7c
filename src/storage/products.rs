//! Product collection.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use serde_json::{Map, Value};

use super::Database;
use super::database::{json_column, opt_json_column, opt_time_column, time_column};
use crate::types::{
    AnalysisStatus, CategoryKey, EntityKind, ForgeError, Product, Result, ResultExt,
};

const PRODUCT_COLUMNS: &str = "id, user_id, project_id, url, title, price, description, \
     category_hierarchy, rating, review_count, features, image_url, analysis_results, \
     analysis_status, analysis_error, analyzed_at, created_at, updated_at";

/// Per-status product counts within a category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductStatusCounts {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
}

impl ProductStatusCounts {
    /// Products with no analysis status yet
    pub fn pending(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.in_progress + self.failed)
    }
}

pub struct ProductStore<'a> {
    db: &'a Database,
}

impl<'a> ProductStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or replace a product; category columns are derived from its hierarchy
    pub fn upsert(&self, product: &Product) -> Result<()> {
        let key = product.category_key();
        let hierarchy = product
            .category_hierarchy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let features = serde_json::to_string(&product.features)?;
        let results = product
            .analysis_results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.conn()?.execute(
            r#"
            INSERT INTO products (id, user_id, project_id, url, title, price, description,
                category_hierarchy, main_category, subcategory, rating, review_count, features,
                image_url, analysis_results, analysis_status, analysis_error, analyzed_at,
                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                project_id = excluded.project_id,
                url = excluded.url,
                title = excluded.title,
                price = excluded.price,
                description = excluded.description,
                category_hierarchy = excluded.category_hierarchy,
                main_category = excluded.main_category,
                subcategory = excluded.subcategory,
                rating = excluded.rating,
                review_count = excluded.review_count,
                features = excluded.features,
                image_url = excluded.image_url,
                updated_at = excluded.updated_at
            "#,
            params![
                product.id,
                product.user_id,
                product.project_id,
                product.url,
                product.title,
                product.price,
                product.description,
                hierarchy,
                key.as_ref().map(|k| k.category.as_str()),
                key.as_ref().map(|k| k.subcategory.as_str()),
                product.rating,
                product.review_count,
                features,
                product.image_url,
                results,
                product.analysis_status.map(|s| s.as_str()),
                product.analysis_error,
                product.analyzed_at.map(|t| t.to_rfc3339()),
                product.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Product>> {
        let conn = self.db.conn()?;
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = conn
            .query_row(&sql, params![id], Self::map_row)
            .optional()
            .with_context_fn(|| format!("Failed to load product {}", id))?;
        Ok(product)
    }

    /// Load a product or fail with `NotFound`
    pub fn require(&self, id: &str) -> Result<Product> {
        self.get(id)?
            .ok_or_else(|| ForgeError::not_found(EntityKind::Product, id))
    }

    /// Number of persisted products whose hierarchy maps to `key`
    pub fn count_in_category(&self, key: &CategoryKey) -> Result<usize> {
        let count: i64 = self.db.conn()?.query_row(
            "SELECT COUNT(*) FROM products WHERE main_category = ?1 AND subcategory = ?2",
            params![key.category, key.subcategory],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Status counts for one category, or across all products when `key` is `None`
    pub fn status_counts(&self, key: Option<&CategoryKey>) -> Result<ProductStatusCounts> {
        let conn = self.db.conn()?;
        let (filter, args): (&str, Vec<&str>) = match key {
            Some(k) => (
                "WHERE main_category = ?1 AND subcategory = ?2",
                vec![k.category.as_str(), k.subcategory.as_str()],
            ),
            None => ("", Vec::new()),
        };
        let sql = format!(
            "SELECT analysis_status, COUNT(*) FROM products {} GROUP BY analysis_status",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
            let status: Option<String> = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count as usize))
        })?;

        let mut counts = ProductStatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            counts.total += count;
            match status.as_deref().and_then(AnalysisStatus::parse) {
                Some(AnalysisStatus::Completed) => counts.completed += count,
                Some(AnalysisStatus::InProgress) => counts.in_progress += count,
                Some(AnalysisStatus::Failed) => counts.failed += count,
                None => {}
            }
        }
        Ok(counts)
    }

    pub fn set_analysis_status(
        &self,
        id: &str,
        status: AnalysisStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let analyzed_at = matches!(status, AnalysisStatus::Completed).then(|| now.clone());
        self.db
            .conn()?
            .execute(
                "UPDATE products
                 SET analysis_status = ?1, analysis_error = ?2,
                     analyzed_at = COALESCE(?3, analyzed_at), updated_at = ?4
                 WHERE id = ?5",
                params![status.as_str(), error, analyzed_at, now, id],
            )
            .with_context_fn(|| format!("Failed to update analysis status for {}", id))?;
        Ok(())
    }

    /// Merge per-block results into the product's aggregate map and stamp `analyzed_at`
    pub fn merge_analysis_results(&self, id: &str, results: &Map<String, Value>) -> Result<()> {
        let results = results.clone();
        let id = id.to_string();
        self.db.transaction(move |conn| {
            let existing: Option<Option<String>> = conn
                .query_row(
                    "SELECT analysis_results FROM products WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(existing) = existing else {
                return Err(ForgeError::not_found(EntityKind::Product, id));
            };

            let mut merged: Map<String, Value> = match existing {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Map::new(),
            };
            merged.extend(results);

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "UPDATE products SET analysis_results = ?1, analyzed_at = ?2, updated_at = ?2
                 WHERE id = ?3",
                params![serde_json::to_string(&merged)?, now, id],
            )?;
            Ok(())
        })
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
        let status: Option<String> = row.get(13)?;
        Ok(Product {
            id: row.get(0)?,
            user_id: row.get(1)?,
            project_id: row.get(2)?,
            url: row.get(3)?,
            title: row.get(4)?,
            price: row.get(5)?,
            description: row.get(6)?,
            category_hierarchy: opt_json_column(row, 7)?,
            rating: row.get(8)?,
            review_count: row.get(9)?,
            features: json_column(row, 10)?,
            image_url: row.get(11)?,
            analysis_results: opt_json_column(row, 12)?,
            analysis_status: status.as_deref().and_then(AnalysisStatus::parse),
            analysis_error: row.get(14)?,
            analyzed_at: opt_time_column(row, 15)?,
            created_at: time_column(row, 16)?,
            updated_at: time_column(row, 17)?,
        })
    }
}
