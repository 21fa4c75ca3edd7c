//! Prompt block collection.

use rusqlite::{OptionalExtension, params};

use super::Database;
use super::database::{log_filter_warn, time_column};
use crate::constants::prompt_category;
use crate::types::{PromptBlock, Result, ResultExt, SortOrder};

const BLOCK_COLUMNS: &str = "id, prompt_category, block_title, input_prompt, output_example, \
     is_active, master_recipe_prompt, analyzed_products_count, limit_hint, skip_hint, \
     sort_field, sort_order, created_at, target_block_id";

pub struct PromptStore<'a> {
    db: &'a Database,
}

impl<'a> PromptStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn upsert(&self, block: &PromptBlock) -> Result<()> {
        let sort_order = match block.sort_order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        self.db.conn()?.execute(
            r#"
            INSERT INTO prompt_blocks (id, prompt_category, block_title, input_prompt,
                output_example, is_active, master_recipe_prompt, analyzed_products_count,
                limit_hint, skip_hint, sort_field, sort_order, created_at, target_block_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                prompt_category = excluded.prompt_category,
                block_title = excluded.block_title,
                input_prompt = excluded.input_prompt,
                output_example = excluded.output_example,
                is_active = excluded.is_active,
                master_recipe_prompt = excluded.master_recipe_prompt,
                limit_hint = excluded.limit_hint,
                skip_hint = excluded.skip_hint,
                sort_field = excluded.sort_field,
                sort_order = excluded.sort_order,
                target_block_id = excluded.target_block_id
            "#,
            params![
                block.id,
                block.prompt_category,
                block.block_title,
                block.input_prompt,
                block.output_example,
                block.is_active,
                block.master_recipe_prompt,
                block.analyzed_products_count,
                block.limit,
                block.skip,
                block.sort_field,
                sort_order,
                block.created_at.to_rfc3339(),
                block.target_block_id,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<PromptBlock>> {
        let conn = self.db.conn()?;
        let sql = format!("SELECT {} FROM prompt_blocks WHERE id = ?1", BLOCK_COLUMNS);
        let block = conn
            .query_row(&sql, params![id], Self::map_row)
            .optional()
            .with_context_fn(|| format!("Failed to load prompt block {}", id))?;
        Ok(block)
    }

    /// Active blocks of a prompt category in stable fetch order
    pub fn active_blocks(&self, prompt_category: &str, limit: usize) -> Result<Vec<PromptBlock>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM prompt_blocks
             WHERE prompt_category = ?1 AND is_active = 1
             ORDER BY created_at, id
             LIMIT ?2",
            BLOCK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let blocks = stmt
            .query_map(params![prompt_category, limit as i64], Self::map_row)?
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable prompt block"))
            .collect();
        Ok(blocks)
    }

    /// Most recently created active block of a prompt category
    pub fn latest_active(&self, prompt_category: &str) -> Result<Option<PromptBlock>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM prompt_blocks
             WHERE prompt_category = ?1 AND is_active = 1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            BLOCK_COLUMNS
        );
        let block = conn
            .query_row(&sql, params![prompt_category], Self::map_row)
            .optional()?;
        Ok(block)
    }

    /// Product recipe template for an analysis block: one written for the
    /// block first, then the newest unscoped one
    pub fn product_recipe_template(&self, block_id: &str) -> Result<Option<PromptBlock>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM prompt_blocks
             WHERE prompt_category = ?1 AND is_active = 1
               AND (target_block_id = ?2 OR target_block_id IS NULL)
             ORDER BY target_block_id IS NULL, created_at DESC, id DESC
             LIMIT 1",
            BLOCK_COLUMNS
        );
        let block = conn
            .query_row(
                &sql,
                params![prompt_category::PRODUCT_RECIPE, block_id],
                Self::map_row,
            )
            .optional()?;
        Ok(block)
    }

    pub fn count_active(&self, prompt_category: &str) -> Result<usize> {
        let count: i64 = self.db.conn()?.query_row(
            "SELECT COUNT(*) FROM prompt_blocks WHERE prompt_category = ?1 AND is_active = 1",
            params![prompt_category],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn increment_analyzed_count(&self, id: &str) -> Result<()> {
        self.db
            .conn()?
            .execute(
                "UPDATE prompt_blocks SET analyzed_products_count = analyzed_products_count + 1
                 WHERE id = ?1",
                params![id],
            )
            .with_context_fn(|| format!("Failed to bump analyzed count for block {}", id))?;
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromptBlock> {
        let sort_order: String = row.get(11)?;
        Ok(PromptBlock {
            id: row.get(0)?,
            prompt_category: row.get(1)?,
            block_title: row.get(2)?,
            input_prompt: row.get(3)?,
            output_example: row.get(4)?,
            is_active: row.get(5)?,
            master_recipe_prompt: row.get(6)?,
            analyzed_products_count: row.get(7)?,
            limit: row.get(8)?,
            skip: row.get(9)?,
            sort_field: row.get(10)?,
            sort_order: if sort_order == "asc" {
                SortOrder::Asc
            } else {
                SortOrder::Desc
            },
            created_at: time_column(row, 12)?,
            target_block_id: row.get(13)?,
        })
    }
}
