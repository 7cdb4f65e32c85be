use std::time::Duration;

use crate::agent_engine::state::LoopConfig;
use crate::config::{AppConfig, SafetyConfig};
use crate::errors::SeeClawResult;
use crate::perception::stability::StabilityConfig;

/// Immutable per-run settings, snapshotted from config when a run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub loop_config: LoopConfig,
    pub require_approval_for: Vec<String>,
    pub allow_terminal_commands: bool,
    pub allow_file_operations: bool,
    pub stability: StabilityConfig,
    pub history_window: usize,
}

impl RunSettings {
    /// `loop_config` overrides the limits from `[safety]` when given.
    pub fn from_config(config: &AppConfig, loop_config: Option<LoopConfig>) -> SeeClawResult<Self> {
        let loop_config = loop_config.unwrap_or_else(|| default_loop_config(&config.safety));
        loop_config.validate()?;
        Ok(Self {
            loop_config,
            require_approval_for: config.safety.require_approval_for.clone(),
            allow_terminal_commands: config.safety.allow_terminal_commands,
            allow_file_operations: config.safety.allow_file_operations,
            stability: config.stability.clone(),
            history_window: config.planner.history_window,
        })
    }
}

/// Timed when `max_loop_duration_minutes` is set, otherwise until done.
pub fn default_loop_config(safety: &SafetyConfig) -> LoopConfig {
    match safety.max_loop_duration_minutes {
        0 => LoopConfig::until_done(safety.max_consecutive_failures),
        minutes => LoopConfig::timed(
            Duration::from_secs(u64::from(minutes) * 60),
            safety.max_consecutive_failures,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::LoopMode;

    #[test]
    fn loop_limits_follow_safety_section() {
        let mut cfg = AppConfig::default();
        cfg.safety.max_consecutive_failures = 4;
        let s = RunSettings::from_config(&cfg, None).unwrap();
        assert_eq!(s.loop_config, LoopConfig::until_done(4));
        assert_eq!(s.require_approval_for, vec!["execute_terminal".to_string()]);

        cfg.safety.max_loop_duration_minutes = 2;
        let s = RunSettings::from_config(&cfg, None).unwrap();
        assert_eq!(s.loop_config.mode, LoopMode::Timed);
        assert_eq!(s.loop_config.max_duration, Duration::from_secs(120));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cfg = AppConfig::default();
        assert!(RunSettings::from_config(&cfg, Some(LoopConfig::timed(Duration::ZERO, 3))).is_err());
    }
}
