//! Styled terminal output.

use console::style;
use serde::Serialize;

use crate::types::{ForgeError, Result};

pub fn success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", style("⚠").yellow(), message);
}

pub fn info(message: &str) {
    println!("{} {}", style("ℹ").blue(), message);
}

pub fn section(title: &str) {
    println!("\n{}", style(title).bold());
    println!("{}", "─".repeat(40));
}

/// Aligned `label: value` row
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<22} {}", style(format!("{}:", label)).dim(), value);
}

pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(ForgeError::Json)?;
    println!("{}", text);
    Ok(())
}

/// Output format selected by `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid format '{}'. Valid values: text, json", s)),
        }
    }
}
