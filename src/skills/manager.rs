use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::SkillsConfig;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::skills::loader;
use crate::skills::types::Skill;

/// Summary of one skill for the settings UI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkillMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub enabled: bool,
}

/// Loaded skills plus the set enabled for planning.
#[derive(Debug, Default, Clone)]
pub struct SkillsManager {
    skills: BTreeMap<String, Skill>,
    enabled: Vec<String>,
}

impl SkillsManager {
    /// An empty `enabled` list enables every loaded skill.
    pub fn from_skills(skills: Vec<Skill>, enabled: &[String]) -> Self {
        let skills: BTreeMap<String, Skill> = skills.into_iter().map(|s| (s.id.clone(), s)).collect();
        let enabled = if enabled.is_empty() {
            skills.keys().cloned().collect()
        } else {
            for id in enabled.iter().filter(|id| !skills.contains_key(*id)) {
                tracing::warn!(skill = %id, "enabled skill was not found");
            }
            enabled.iter().filter(|id| skills.contains_key(*id)).cloned().collect()
        };
        Self { skills, enabled }
    }

    pub async fn load(config: &SkillsConfig) -> SeeClawResult<Self> {
        let Some(dir) = &config.dir else {
            return Ok(Self::default());
        };
        let skills = loader::load_dir(dir).await?;
        let manager = Self::from_skills(skills, &config.enabled);
        tracing::info!(loaded = manager.skills.len(), enabled = manager.enabled.len(), "skills ready");
        Ok(manager)
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.get(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.iter().any(|e| e == id)
    }

    pub fn has_enabled(&self) -> bool {
        !self.enabled.is_empty()
    }

    pub fn enabled_skills(&self) -> impl Iterator<Item = &Skill> {
        self.enabled.iter().filter_map(|id| self.skills.get(id))
    }

    pub fn metadata(&self) -> Vec<SkillMetadata> {
        self.skills
            .values()
            .map(|s| SkillMetadata {
                id: s.id.clone(),
                name: s.name.clone(),
                description: s.description.clone(),
                category: s.category().to_string(),
                enabled: self.is_enabled(&s.id),
            })
            .collect()
    }

    /// Skills section appended to the system prompt, if any skill is enabled.
    pub fn planner_context(&self) -> Option<String> {
        if !self.has_enabled() {
            return None;
        }
        let mut ctx = String::from(
            "# Available skills\nCall `invoke_skill` with the skill id to load its full instructions.\n",
        );
        for skill in self.enabled_skills() {
            ctx.push_str(&format!("\n- `{}`: {}", skill.id, skill.description));
            if !skill.role.is_empty() {
                ctx.push_str(&format!(" (use when {})", skill.role));
            }
        }
        Some(ctx)
    }

    /// Body of an enabled skill, with the caller's inputs appended.
    pub fn invoke(&self, id: &str, inputs: &Value) -> SeeClawResult<String> {
        let skill = self
            .skills
            .get(id)
            .filter(|s| self.is_enabled(&s.id))
            .ok_or_else(|| SeeClawError::Skills(format!("skill '{id}' is not available")))?;
        let mut text = format!("Skill `{}` instructions:\n{}", skill.id, skill.body.trim_end());
        if !inputs.is_null() && inputs.as_object().map_or(true, |o| !o.is_empty()) {
            text.push_str(&format!("\nInputs: {inputs}"));
        }
        Ok(text)
    }
}
