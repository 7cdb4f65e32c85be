use serde::{Deserialize, Serialize};

/// A markdown skill: reusable instructions the planner can pull into context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Path relative to the skills dir without `.md`, e.g. `office/excel_chart`.
    pub id: String,
    /// Display name from the metadata block.
    pub name: String,
    pub description: String,
    /// When the skill applies.
    pub role: String,
    pub example: String,
    pub rules: Vec<String>,
    /// Full markdown, returned by `invoke_skill`.
    pub body: String,
}

impl Skill {
    /// First path segment, `general` for top-level files.
    pub fn category(&self) -> &str {
        match self.id.split_once('/') {
            Some((cat, _)) => cat,
            None => "general",
        }
    }
}
