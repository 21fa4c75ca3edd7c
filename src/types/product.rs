//! Scraped product records and their category hierarchy.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ForgeError, Result};

/// Separator between main category and subcategory in a [`CategoryKey`]
pub const CATEGORY_KEY_SEPARATOR: char = '>';

/// Marketplace category hierarchy as scraped from a product page
///
/// `sub_categories` runs from broadest to narrowest; the narrowest entry is
/// the subcategory products are grouped by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHierarchy {
    pub main_category: String,
    #[serde(default)]
    pub sub_categories: Vec<String>,
}

impl CategoryHierarchy {
    pub fn new(main: impl Into<String>, subs: &[&str]) -> Self {
        Self {
            main_category: main.into(),
            sub_categories: subs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The one canonical key derivation; every component groups through this.
    pub fn key(&self) -> Option<CategoryKey> {
        let main = self.main_category.trim();
        let sub = self.sub_categories.last().map(|s| s.trim())?;
        if main.is_empty() || sub.is_empty() {
            return None;
        }
        Some(CategoryKey::new(main, sub))
    }
}

/// Composite `"{category}>{subcategory}"` identifier used for completion tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryKey {
    pub category: String,
    pub subcategory: String,
}

impl CategoryKey {
    pub fn new(category: impl Into<String>, subcategory: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.category, CATEGORY_KEY_SEPARATOR, self.subcategory
        )
    }
}

/// Product-level analysis progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    InProgress,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A scraped e-commerce product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_hierarchy: Option<CategoryHierarchy>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub review_count: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Block title -> generated text or `"Error: ..."`
    #[serde(default)]
    pub analysis_results: Option<Map<String, Value>>,
    #[serde(default)]
    pub analysis_status: Option<AnalysisStatus>,
    #[serde(default)]
    pub analysis_error: Option<String>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Minimal product for ingestion; remaining fields start empty.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        title: impl Into<String>,
        category_hierarchy: Option<CategoryHierarchy>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            project_id: None,
            url: String::new(),
            title: title.into(),
            price: None,
            description: None,
            category_hierarchy,
            rating: None,
            review_count: None,
            features: Vec::new(),
            image_url: None,
            analysis_results: None,
            analysis_status: None,
            analysis_error: None,
            analyzed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn category_key(&self) -> Option<CategoryKey> {
        self.category_hierarchy.as_ref().and_then(|h| h.key())
    }

    /// Category key, or `IncompleteCategory` when main or sub category is missing
    pub fn require_category_key(&self) -> Result<CategoryKey> {
        self.category_key()
            .ok_or_else(|| ForgeError::IncompleteCategory {
                product_id: self.id.clone(),
            })
    }

    /// Structured generation input built from product fields
    pub fn generation_input(&self) -> Value {
        serde_json::json!({
            "product_data": {
                "id": self.id,
                "title": self.title,
                "description": self.description,
                "price": self.price,
                "features": self.features,
                "rating": self.rating,
                "review_count": self.review_count,
                "category": self.category_hierarchy,
            }
        })
    }
}
