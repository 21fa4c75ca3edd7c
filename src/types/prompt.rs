//! Administrator-defined prompt blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort direction hint for product selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// One dimension of analysis applied uniformly to every product in a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBlock {
    pub id: String,
    /// Prompt category, e.g. `competitor_analysis` or `market_research`
    pub prompt_category: String,
    pub block_title: String,
    /// Template sent with the structured product input
    pub input_prompt: String,
    #[serde(default)]
    pub output_example: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Template used to synthesize the category master recipe
    #[serde(default)]
    pub master_recipe_prompt: Option<String>,
    /// Analysis block a `product_recipe` template is written for
    #[serde(default)]
    pub target_block_id: Option<String>,
    #[serde(default)]
    pub analyzed_products_count: i64,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl PromptBlock {
    pub fn new(
        id: impl Into<String>,
        prompt_category: impl Into<String>,
        block_title: impl Into<String>,
        input_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt_category: prompt_category.into(),
            block_title: block_title.into(),
            input_prompt: input_prompt.into(),
            output_example: String::new(),
            is_active: true,
            master_recipe_prompt: None,
            target_block_id: None,
            analyzed_products_count: 0,
            limit: None,
            skip: None,
            sort_field: None,
            sort_order: SortOrder::Desc,
            created_at: Utc::now(),
        }
    }

    pub fn with_master_recipe_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.master_recipe_prompt = Some(prompt.into());
        self
    }

    pub fn for_block(mut self, block_id: impl Into<String>) -> Self {
        self.target_block_id = Some(block_id.into());
        self
    }

    /// Master recipe template, if one is configured and non-blank
    pub fn master_recipe_template(&self) -> Option<&str> {
        self.master_recipe_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    /// Analysis template with the output example appended as guidance
    pub fn analysis_template(&self) -> String {
        if self.output_example.trim().is_empty() {
            self.input_prompt.clone()
        } else {
            format!(
                "{}\n\nExample output:\n{}",
                self.input_prompt.trim_end(),
                self.output_example
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_master_prompt_is_absent() {
        let block = PromptBlock::new("b1", "competitor_analysis", "Keywords", "Analyze")
            .with_master_recipe_prompt("   ");
        assert!(block.master_recipe_template().is_none());
    }

    #[test]
    fn test_analysis_template_includes_example() {
        let mut block = PromptBlock::new("b1", "competitor_analysis", "Keywords", "Analyze this");
        assert_eq!(block.analysis_template(), "Analyze this");

        block.output_example = "1. Primary keyword".into();
        let template = block.analysis_template();
        assert!(template.starts_with("Analyze this"));
        assert!(template.ends_with("1. Primary keyword"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let block: PromptBlock = serde_json::from_value(serde_json::json!({
            "id": "b1",
            "prompt_category": "competitor_analysis",
            "block_title": "Pricing",
            "input_prompt": "Analyze pricing"
        }))
        .unwrap();
        assert!(block.is_active);
        assert_eq!(block.sort_order, SortOrder::Desc);
        assert_eq!(block.analyzed_products_count, 0);
    }
}
