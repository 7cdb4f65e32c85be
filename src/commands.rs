use std::time::Duration;

use serde::Deserialize;
use tauri::State;
use tokio::sync::Mutex;

use crate::agent_engine::engine::EngineHandle;
use crate::agent_engine::settings::RunSettings;
use crate::agent_engine::state::{ApprovalDecision, LoopConfig, LoopMode};
use crate::config::{self, AppConfig};

/// Shared state behind every command.
pub struct AppState {
    pub engine: EngineHandle,
    pub config: Mutex<AppConfig>,
    /// Action type of the approval currently shown to the user, set by the
    /// event forwarder when `action_required` goes out.
    pub pending_action_type: Mutex<Option<String>>,
}

impl AppState {
    pub fn new(engine: EngineHandle, config: AppConfig) -> Self {
        Self {
            engine,
            config: Mutex::new(config),
            pending_action_type: Mutex::new(None),
        }
    }
}

/// Loop settings as the UI sends them. Missing limits come from `[safety]`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopArgs {
    pub mode: LoopMode,
    pub max_duration_minutes: Option<u32>,
    pub max_failures: Option<u32>,
}

impl LoopArgs {
    fn into_loop_config(self, safety: &config::SafetyConfig) -> LoopConfig {
        let minutes = self.max_duration_minutes.unwrap_or(safety.max_loop_duration_minutes);
        LoopConfig {
            mode: self.mode,
            max_duration: Duration::from_secs(u64::from(minutes) * 60),
            max_consecutive_failures: self.max_failures.unwrap_or(safety.max_consecutive_failures),
        }
    }
}

/// Ping command for IPC verification.
#[tauri::command]
pub async fn ping() -> Result<String, String> {
    Ok("pong".to_string())
}

#[tauri::command]
pub async fn get_version() -> Result<String, String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Start a run; returns its id. Settings are snapshotted from the current config.
#[tauri::command]
pub async fn start_task(
    state: State<'_, AppState>,
    goal: String,
    loop_args: Option<LoopArgs>,
) -> Result<String, String> {
    let settings = {
        let cfg = state.config.lock().await;
        let loop_config = loop_args.map(|args| args.into_loop_config(&cfg.safety));
        RunSettings::from_config(&cfg, loop_config).map_err(|e| e.to_string())?
    };
    state.pending_action_type.lock().await.take();
    let run_id = state
        .engine
        .start_task(goal, settings)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!(run_id = %run_id, "start_task accepted");
    Ok(run_id)
}

#[tauri::command]
pub async fn stop_task(state: State<'_, AppState>) -> Result<bool, String> {
    Ok(state.engine.stop_task())
}

/// Answer the pending approval. `always_allow` removes the action type from
/// `[safety].require_approval_for` and saves config.toml; the running task
/// keeps its snapshot, later runs pick the change up.
#[tauri::command]
pub async fn confirm_action(
    state: State<'_, AppState>,
    approved: bool,
    always_allow: bool,
) -> Result<(), String> {
    tracing::info!(approved, always_allow, "confirm_action");
    if approved && always_allow {
        if let Some(action_type) = state.pending_action_type.lock().await.take() {
            let mut cfg = state.config.lock().await;
            if cfg.allow_always(&action_type) {
                config::save_config(&cfg).map_err(|e| e.to_string())?;
                tracing::info!(action_type = %action_type, "action type no longer requires approval");
            }
        }
    }
    state
        .engine
        .submit_approval(ApprovalDecision { approved, always_allow })
        .await
        .map_err(|e| e.to_string())
}

/// Current config with API keys blanked.
#[tauri::command]
pub async fn get_config(state: State<'_, AppState>) -> Result<AppConfig, String> {
    let mut cfg = state.config.lock().await.clone();
    redact_keys(&mut cfg);
    Ok(cfg)
}

/// Validate, persist and adopt a config edited in the UI. Keys left blank keep
/// their stored value. Provider and perception changes reach the engine with
/// the next run; MCP servers, skills and the experience file are read at
/// startup only.
#[tauri::command]
pub async fn save_config_ui(state: State<'_, AppState>, new_config: AppConfig) -> Result<(), String> {
    let mut current = state.config.lock().await;
    let merged = merge_keys(new_config, &current);
    let update = crate::build_reconfiguration(&merged).map_err(|e| e.to_string())?;
    config::save_config(&merged).map_err(|e| e.to_string())?;
    state.engine.reconfigure(update);
    *current = merged;
    Ok(())
}

fn redact_keys(cfg: &mut AppConfig) {
    for entry in cfg.llm.providers.values_mut() {
        if entry.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            entry.api_key = Some(String::new());
        }
    }
}

fn merge_keys(mut incoming: AppConfig, current: &AppConfig) -> AppConfig {
    for (id, entry) in incoming.llm.providers.iter_mut() {
        if entry.api_key.as_deref().map_or(true, str::is_empty) {
            entry.api_key = current.llm.providers.get(id).and_then(|p| p.api_key.clone());
        }
    }
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::ProviderEntry;

    fn with_key(key: Option<&str>) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.active_provider = "zhipu".into();
        cfg.llm.providers.insert(
            "zhipu".into(),
            ProviderEntry {
                display_name: "Zhipu".into(),
                api_base: "https://open.bigmodel.cn/api/paas/v4".into(),
                model: "glm-4v-plus".into(),
                temperature: 0.1,
                api_key: key.map(String::from),
            },
        );
        cfg
    }

    #[test]
    fn keys_are_redacted_and_restored() {
        let stored = with_key(Some("sk-secret"));
        let mut shown = stored.clone();
        redact_keys(&mut shown);
        assert_eq!(shown.llm.providers["zhipu"].api_key.as_deref(), Some(""));

        let merged = merge_keys(shown, &stored);
        assert_eq!(merged.llm.providers["zhipu"].api_key.as_deref(), Some("sk-secret"));

        let unset = merge_keys(with_key(None), &with_key(None));
        assert_eq!(unset.llm.providers["zhipu"].api_key, None);
    }

    #[test]
    fn loop_args_fall_back_to_safety_limits() {
        let safety = config::SafetyConfig::default();
        let cfg = LoopArgs {
            mode: LoopMode::Timed,
            max_duration_minutes: Some(10),
            max_failures: None,
        }
        .into_loop_config(&safety);
        assert_eq!(cfg.max_duration, Duration::from_secs(600));
        assert_eq!(cfg.max_consecutive_failures, safety.max_consecutive_failures);
    }
}
