use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::AgentAction;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::som_grid::MAX_GRID_N;
use crate::perception::stability::StabilityConfig;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub experience: ExperienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (env var SEECLAW_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Tool-calling model that drives the run loop.
    pub planner: Option<RoleEntry>,
    /// Conversational replies shown to the user.
    pub chat: Option<RoleEntry>,
    /// Vision / image-understanding model.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    pub model: String,
    /// Use SSE streaming. `false` sends a single JSON request.
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub allow_terminal_commands: bool,
    #[serde(default)]
    pub allow_file_operations: bool,
    /// Action type names (`mouse_click`, `execute_terminal`, ...) gated on user approval.
    #[serde(default)]
    pub require_approval_for: Vec<String>,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    /// 0 = unbounded.
    #[serde(default)]
    pub max_loop_duration_minutes: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allow_terminal_commands: false,
            allow_file_operations: false,
            require_approval_for: vec!["execute_terminal".to_string()],
            max_consecutive_failures: default_max_failures(),
            max_loop_duration_minutes: 0,
        }
    }
}

fn default_max_failures() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// N for the N×N grid fallback. 12 suits dense UIs, 8 sparse ones.
    pub grid_n: u32,
    /// ONNX detector model. Unset means grid-only perception.
    pub detector_model: Option<PathBuf>,
    /// Class names of the detector model, in output order.
    pub detector_classes: Vec<String>,
    /// Detections below this confidence are discarded; if none survive the grid is used.
    pub min_confidence: f32,
    /// Draw boxes and ids onto the image sent to the model.
    pub annotate: bool,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            grid_n: 12,
            detector_model: None,
            detector_classes: crate::perception::yolo_detector::default_ui_class_names(),
            min_confidence: 0.3,
            annotate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Trailing history entries included in each planning prompt.
    pub history_window: usize,
    /// Transport retries within one planning cycle.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            history_window: 12,
            max_retries: 2,
            retry_backoff_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptsConfig {
    /// Replaces the built-in system prompt when set.
    pub system_template: Option<String>,
    /// Wraps retrieved experience; `{experience}` is substituted.
    pub experience_template: Option<String>,
    /// JSON tool catalog replacing the built-in one.
    pub tools_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerEntry {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SkillsConfig {
    pub dir: Option<PathBuf>,
    /// Skill names offered to the planner. Empty = every loaded skill.
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExperienceConfig {
    /// Markdown experience file. Unset = `<data dir>/SeeClaw/experience.md`.
    pub path: Option<PathBuf>,
    /// Entries injected into the first planning prompt.
    pub max_recall: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Rejects configurations that cannot drive a run. Called on every load and
    /// before any run starts.
    pub fn validate(&self) -> SeeClawResult<()> {
        if !self.llm.providers.contains_key(&self.llm.active_provider) {
            return Err(SeeClawError::Config(format!(
                "active provider '{}' is not defined under [llm.providers]",
                self.llm.active_provider
            )));
        }
        let roles = [
            ("planner", &self.llm.roles.planner),
            ("chat", &self.llm.roles.chat),
            ("vision", &self.llm.roles.vision),
        ];
        for (role, entry) in roles {
            if let Some(entry) = entry {
                if !self.llm.providers.contains_key(&entry.provider) {
                    return Err(SeeClawError::Config(format!(
                        "role '{role}' references unknown provider '{}'",
                        entry.provider
                    )));
                }
            }
        }

        let grid_n = self.perception.grid_n;
        if grid_n == 0 || grid_n > MAX_GRID_N {
            return Err(SeeClawError::Config(format!(
                "perception.grid_n must be in 1..={MAX_GRID_N}, got {grid_n}"
            )));
        }
        let confidence = self.perception.min_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(SeeClawError::Config(format!(
                "perception.min_confidence must be within [0, 1], got {confidence}"
            )));
        }

        if self.stability.interval_ms == 0 {
            return Err(SeeClawError::Config(
                "stability.interval_ms must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.stability.diff_threshold) {
            return Err(SeeClawError::Config(format!(
                "stability.diff_threshold must be within [0, 1], got {}",
                self.stability.diff_threshold
            )));
        }

        for name in &self.safety.require_approval_for {
            if !AgentAction::TYPE_NAMES.contains(&name.as_str()) {
                return Err(SeeClawError::Config(format!(
                    "safety.require_approval_for contains unknown action type '{name}'"
                )));
            }
        }

        Ok(())
    }

    /// Drops an action type from the approval list ("always allow").
    /// Returns whether anything changed.
    pub fn allow_always(&mut self, action_type: &str) -> bool {
        let before = self.safety.require_approval_for.len();
        self.safety
            .require_approval_for
            .retain(|name| name != action_type);
        before != self.safety.require_approval_for.len()
    }
}

/// Search order: next to the executable, working directory, platform config dir.
fn resolve_config_path() -> SeeClawResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("seeclaw").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in platform config dir");
            return Ok(candidate);
        }
    }

    Err(SeeClawError::Config(
        "config.toml not found next to executable, in working directory or in the config dir"
            .into(),
    ))
}

pub fn load_config() -> SeeClawResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> SeeClawResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> SeeClawResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> SeeClawResult<()> {
    let path = resolve_config_path()?;
    save_config_to(config, &path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> SeeClawResult<()> {
    config.validate()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
