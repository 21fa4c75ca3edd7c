//! Per-product, per-block analysis rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::product::CategoryKey;

/// One generation run of a prompt block against a product
///
/// Exactly one row is written per attempted block. Failed generations keep
/// `output = None` and carry the failure in `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub prompt_block_id: String,
    #[serde(default)]
    pub prompt_block_title: String,
    pub user_id: String,
    pub category: String,
    pub subcategory: String,
    pub input_data: Value,
    pub output: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Whether the short-output heuristic re-ran the call
    #[serde(default)]
    pub rerun: bool,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        self.output.is_some() && self.error.is_none()
    }

    pub fn category_key(&self) -> CategoryKey {
        CategoryKey::new(&self.category, &self.subcategory)
    }

    /// Inline value recorded into the product's aggregate result map
    pub fn summary_value(&self) -> Value {
        match (&self.output, &self.error) {
            (Some(text), None) => Value::String(text.clone()),
            (_, Some(err)) => Value::String(format!("Error: {}", err)),
            (None, None) => Value::String("Error: empty generation result".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(output: Option<&str>, error: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            id: "a1".into(),
            product_id: "p1".into(),
            project_id: None,
            prompt_block_id: "b1".into(),
            prompt_block_title: "Keywords".into(),
            user_id: "u1".into(),
            category: "Home".into(),
            subcategory: "Kitchen".into(),
            input_data: Value::Null,
            output: output.map(String::from),
            error: error.map(String::from),
            model: "test".into(),
            duration_ms: 0,
            rerun: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_value() {
        assert_eq!(row(Some("great"), None).summary_value(), "great");
        assert_eq!(
            row(None, Some("quota exceeded")).summary_value(),
            "Error: quota exceeded"
        );
        assert!(!row(None, Some("x")).is_success());
        assert_eq!(row(Some("x"), None).category_key().to_string(), "Home>Kitchen");
    }
}
