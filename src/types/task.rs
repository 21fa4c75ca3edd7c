//! Scheduled analysis tasks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which analysis pipeline a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    StandardAnalysis,
    CompetitorAnalysis,
    MarketResearch,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardAnalysis => "standard_analysis",
            Self::CompetitorAnalysis => "competitor_analysis",
            Self::MarketResearch => "market_research",
        }
    }

    /// Market research runs a single named block
    pub fn requires_prompt_block(&self) -> bool {
        matches!(self, Self::MarketResearch)
    }

    /// Whether finishing this task counts toward category completion
    pub fn tracks_category(&self) -> bool {
        !self.requires_prompt_block()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "standard_analysis" | "standard" => Ok(Self::StandardAnalysis),
            "competitor_analysis" | "competitor" => Ok(Self::CompetitorAnalysis),
            "market_research" => Ok(Self::MarketResearch),
            _ => Err(format!(
                "Unknown task type '{}'. Valid values: standard_analysis, competitor_analysis, market_research",
                s
            )),
        }
    }
}

/// One scheduled invocation of the analysis pipeline against a single product
///
/// Also the status object exposed to callers. `success` stays `None` until the
/// worker has executed the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub product_id: String,
    pub user_id: String,
    pub project_id: String,
    pub task_type: TaskType,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_block_id: Option<String>,
    pub executed: bool,
    pub success: Option<bool>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn mark_succeeded(&mut self) {
        self.executed = true;
        self.success = Some(true);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.executed = true;
        self.success = Some(false);
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_parse() {
        assert_eq!(
            "market_research".parse::<TaskType>().unwrap(),
            TaskType::MarketResearch
        );
        assert_eq!(
            "competitor-analysis".parse::<TaskType>().unwrap(),
            TaskType::CompetitorAnalysis
        );
        assert!("deep".parse::<TaskType>().is_err());
        assert_eq!(TaskType::default().to_string(), "standard_analysis");
    }

    #[test]
    fn test_status_serialization_omits_absent_block() {
        let task = Task {
            task_id: "1_p1_0".into(),
            product_id: "p1".into(),
            user_id: "u1".into(),
            project_id: "proj".into(),
            task_type: TaskType::StandardAnalysis,
            scheduled_time: Utc::now(),
            prompt_block_id: None,
            executed: false,
            success: None,
            error: None,
            completed_at: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("prompt_block_id").is_none());
        assert_eq!(json["task_type"], "standard_analysis");
        assert!(json["success"].is_null());
    }

    #[test]
    fn test_mark_failed_sets_executed() {
        let mut task = Task {
            task_id: "1_p1_0".into(),
            product_id: "p1".into(),
            user_id: "u1".into(),
            project_id: "proj".into(),
            task_type: TaskType::MarketResearch,
            scheduled_time: Utc::now(),
            prompt_block_id: Some("b1".into()),
            executed: false,
            success: None,
            error: None,
            completed_at: None,
        };
        task.mark_failed("boom");
        assert!(task.executed);
        assert_eq!(task.success, Some(false));
        assert_eq!(task.error.as_deref(), Some("boom"));
    }
}
