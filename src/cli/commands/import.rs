//! Import Command
//!
//! Bulk-load scraped products or prompt blocks from a JSON file holding
//! either one record or an array of records. Records are upserted by ID;
//! malformed records are skipped with a warning.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cli::{CommandContext, output};
use crate::storage::{ProductStore, PromptStore};
use crate::types::{ForgeError, Product, PromptBlock, Result};

pub fn products(file: &Path) -> Result<()> {
    let ctx = CommandContext::load()?;
    let (records, skipped) = read_records::<Product>(file)?;

    let store = ProductStore::new(&ctx.db);
    let mut uncategorized = 0;
    for product in &records {
        if product.category_key().is_none() {
            uncategorized += 1;
        }
        store.upsert(product)?;
    }

    output::success(&format!("Imported {} products", records.len()));
    if uncategorized > 0 {
        output::warning(&format!(
            "{} products lack a complete category hierarchy and cannot be analyzed",
            uncategorized
        ));
    }
    report_skipped(skipped);
    Ok(())
}

pub fn prompts(file: &Path) -> Result<()> {
    let ctx = CommandContext::load()?;
    let (records, skipped) = read_records::<PromptBlock>(file)?;

    let store = PromptStore::new(&ctx.db);
    for block in &records {
        store.upsert(block)?;
    }

    output::success(&format!("Imported {} prompt blocks", records.len()));
    report_skipped(skipped);
    Ok(())
}

fn report_skipped(skipped: usize) {
    if skipped > 0 {
        output::warning(&format!("Skipped {} malformed records", skipped));
    }
}

/// Parse records, returning the valid ones and the number skipped
fn read_records<T: DeserializeOwned>(file: &Path) -> Result<(Vec<T>, usize)> {
    let content = std::fs::read_to_string(file)?;
    parse_records(&content)
}

fn parse_records<T: DeserializeOwned>(content: &str) -> Result<(Vec<T>, usize)> {
    let raw = match serde_json::from_str::<Value>(content)? {
        Value::Array(items) => items,
        item @ Value::Object(_) => vec![item],
        _ => {
            return Err(ForgeError::Validation(
                "Expected a JSON object or array of objects".to_string(),
            ));
        }
    };

    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for (index, item) in raw.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping record {}: {}", index, e);
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_skips_malformed() {
        let content = r#"[
            {"id": "p1", "user_id": "u1", "title": "Mug",
             "category_hierarchy": {"main_category": "Home", "sub_categories": ["Kitchen"]}},
            {"id": "p2"}
        ]"#;
        let (products, skipped) = parse_records::<Product>(content).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(products[0].category_key().unwrap().to_string(), "Home>Kitchen");
    }

    #[test]
    fn test_parse_single_object() {
        let content = r#"{"id": "b1", "prompt_category": "competitor_analysis",
                          "block_title": "Keywords", "input_prompt": "Analyze"}"#;
        let (blocks, skipped) = parse_records::<PromptBlock>(content).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_parse_rejects_scalars() {
        assert!(parse_records::<Product>("42").is_err());
    }
}
