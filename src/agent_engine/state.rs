use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SeeClawError, SeeClawResult};

/// Lifecycle states of one agent run. Exactly one is active at a time and
/// only the engine task mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    /// Fresh perception + one planner turn. The planner's verdict on goal
    /// completion is folded into this same turn.
    Planning { goal: String },
    Executing { action: AgentAction },
    /// Waiting for the screen to settle after an action that changes it.
    AwaitingStability { action: AgentAction },
    /// Suspended until the user approves or rejects the action.
    AwaitingApproval { action: AgentAction },
    Error { message: String },
    Done { summary: String },
}

impl AgentState {
    pub fn tag(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Planning { .. } => "planning",
            AgentState::Executing { .. } => "executing",
            AgentState::AwaitingStability { .. } => "awaiting_stability",
            AgentState::AwaitingApproval { .. } => "awaiting_approval",
            AgentState::Error { .. } => "error",
            AgentState::Done { .. } => "done",
        }
    }

    /// States that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Idle | AgentState::Error { .. } | AgentState::Done { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDistance {
    Short,
    Medium,
    Long,
}

impl ScrollDistance {
    /// Wheel notches sent to the input device.
    pub fn notches(self) -> i32 {
        match self {
            ScrollDistance::Short => 3,
            ScrollDistance::Medium => 8,
            ScrollDistance::Long => 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    MouseClick { element_id: String },
    MouseDoubleClick { element_id: String },
    MouseRightClick { element_id: String },
    Scroll {
        direction: ScrollDirection,
        distance: ScrollDistance,
        element_id: Option<String>,
    },
    TypeText { text: String, clear_first: bool },
    Hotkey { keys: String },
    KeyPress { key: String },
    GetViewport { annotate: bool },
    ExecuteTerminal { command: String, reason: String },
    McpCall {
        server_name: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    InvokeSkill {
        skill_name: String,
        inputs: serde_json::Value,
    },
    Wait { milliseconds: u32 },
    FinishTask { summary: String },
    ReportFailure {
        reason: String,
        last_attempted_action: Option<String>,
    },
}

impl AgentAction {
    /// Every action type name, as used in `safety.require_approval_for`.
    pub const TYPE_NAMES: &'static [&'static str] = &[
        "mouse_click",
        "mouse_double_click",
        "mouse_right_click",
        "scroll",
        "type_text",
        "hotkey",
        "key_press",
        "get_viewport",
        "execute_terminal",
        "mcp_call",
        "invoke_skill",
        "wait",
        "finish_task",
        "report_failure",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            AgentAction::MouseClick { .. } => "mouse_click",
            AgentAction::MouseDoubleClick { .. } => "mouse_double_click",
            AgentAction::MouseRightClick { .. } => "mouse_right_click",
            AgentAction::Scroll { .. } => "scroll",
            AgentAction::TypeText { .. } => "type_text",
            AgentAction::Hotkey { .. } => "hotkey",
            AgentAction::KeyPress { .. } => "key_press",
            AgentAction::GetViewport { .. } => "get_viewport",
            AgentAction::ExecuteTerminal { .. } => "execute_terminal",
            AgentAction::McpCall { .. } => "mcp_call",
            AgentAction::InvokeSkill { .. } => "invoke_skill",
            AgentAction::Wait { .. } => "wait",
            AgentAction::FinishTask { .. } => "finish_task",
            AgentAction::ReportFailure { .. } => "report_failure",
        }
    }

    /// Whether performing this action is expected to change what is on screen,
    /// so the next perception must wait for the screen to settle.
    pub fn changes_screen(&self) -> bool {
        matches!(
            self,
            AgentAction::MouseClick { .. }
                | AgentAction::MouseDoubleClick { .. }
                | AgentAction::MouseRightClick { .. }
                | AgentAction::Scroll { .. }
                | AgentAction::TypeText { .. }
                | AgentAction::Hotkey { .. }
                | AgentAction::KeyPress { .. }
                | AgentAction::ExecuteTerminal { .. }
        )
    }

    /// `finish_task` / `report_failure` end the run instead of being executed.
    pub fn is_completion_signal(&self) -> bool {
        matches!(
            self,
            AgentAction::FinishTask { .. } | AgentAction::ReportFailure { .. }
        )
    }

    /// Short human-readable description for logs and the planning history.
    pub fn describe(&self) -> String {
        match self {
            AgentAction::MouseClick { element_id } => format!("click {element_id}"),
            AgentAction::MouseDoubleClick { element_id } => format!("double-click {element_id}"),
            AgentAction::MouseRightClick { element_id } => format!("right-click {element_id}"),
            AgentAction::Scroll {
                direction,
                distance,
                element_id,
            } => match element_id {
                Some(id) => format!("scroll {direction:?} {distance:?} at {id}"),
                None => format!("scroll {direction:?} {distance:?}"),
            },
            AgentAction::TypeText { text, clear_first } => {
                if *clear_first {
                    format!("clear field and type {text:?}")
                } else {
                    format!("type {text:?}")
                }
            }
            AgentAction::Hotkey { keys } => format!("hotkey {keys}"),
            AgentAction::KeyPress { key } => format!("press {key}"),
            AgentAction::GetViewport { .. } => "request fresh viewport".to_string(),
            AgentAction::ExecuteTerminal { command, .. } => format!("run `{command}`"),
            AgentAction::McpCall {
                server_name,
                tool_name,
                ..
            } => format!("call {server_name}/{tool_name}"),
            AgentAction::InvokeSkill { skill_name, .. } => format!("invoke skill {skill_name}"),
            AgentAction::Wait { milliseconds } => format!("wait {milliseconds}ms"),
            AgentAction::FinishTask { summary } => format!("finish: {summary}"),
            AgentAction::ReportFailure { reason, .. } => format!("report failure: {reason}"),
        }
    }
}

/// Outcome of one executed action. Appended to run history, never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: AgentAction,
    pub success: bool,
    pub error: Option<String>,
    /// Text produced by the action (terminal output, extension result, skill body).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ActionResult {
    pub fn succeeded(action: AgentAction, output: Option<String>) -> Self {
        Self {
            action,
            success: true,
            error: None,
            output,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn failed(action: AgentAction, error: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            error: Some(error.into()),
            output: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    UntilDone,
    Timed,
    FailureLimit,
}

/// Termination policy for one run. Read-only for the run's lifetime.
///
/// Every configured limit applies regardless of `mode`; the mode only states
/// which limit the caller relies on and is checked by [`LoopConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub mode: LoopMode,
    /// Zero means unbounded.
    pub max_duration: Duration,
    /// Zero means unbounded.
    pub max_consecutive_failures: u32,
}

impl LoopConfig {
    pub fn until_done(max_consecutive_failures: u32) -> Self {
        Self {
            mode: LoopMode::UntilDone,
            max_duration: Duration::ZERO,
            max_consecutive_failures,
        }
    }

    pub fn timed(max_duration: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            mode: LoopMode::Timed,
            max_duration,
            max_consecutive_failures,
        }
    }

    pub fn failure_limit(max_consecutive_failures: u32) -> Self {
        Self {
            mode: LoopMode::FailureLimit,
            max_duration: Duration::ZERO,
            max_consecutive_failures,
        }
    }

    pub fn validate(&self) -> SeeClawResult<()> {
        match self.mode {
            LoopMode::Timed if self.max_duration.is_zero() => Err(SeeClawError::Config(
                "timed loop mode requires a non-zero max_duration".into(),
            )),
            LoopMode::FailureLimit if self.max_consecutive_failures == 0 => {
                Err(SeeClawError::Config(
                    "failure_limit loop mode requires a non-zero max_consecutive_failures".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Raised when the safety gate intercepts an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub action: AgentAction,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    /// "Always allow this action type". Persisted by the caller, never by the gate.
    #[serde(default)]
    pub always_allow: bool,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            always_allow: false,
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            always_allow: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_cover_every_variant_and_match_serde_tag() {
        let actions = vec![
            AgentAction::MouseClick { element_id: "1".into() },
            AgentAction::MouseDoubleClick { element_id: "1".into() },
            AgentAction::MouseRightClick { element_id: "1".into() },
            AgentAction::Scroll {
                direction: ScrollDirection::Down,
                distance: ScrollDistance::Short,
                element_id: None,
            },
            AgentAction::TypeText { text: "x".into(), clear_first: false },
            AgentAction::Hotkey { keys: "ctrl+s".into() },
            AgentAction::KeyPress { key: "enter".into() },
            AgentAction::GetViewport { annotate: true },
            AgentAction::ExecuteTerminal { command: "ls".into(), reason: String::new() },
            AgentAction::McpCall {
                server_name: "fs".into(),
                tool_name: "read".into(),
                arguments: serde_json::json!({}),
            },
            AgentAction::InvokeSkill { skill_name: "os/open".into(), inputs: serde_json::json!({}) },
            AgentAction::Wait { milliseconds: 10 },
            AgentAction::FinishTask { summary: "ok".into() },
            AgentAction::ReportFailure { reason: "no".into(), last_attempted_action: None },
        ];
        assert_eq!(actions.len(), AgentAction::TYPE_NAMES.len());
        for action in actions {
            let json = serde_json::to_value(&action).unwrap();
            assert_eq!(json["type"], action.type_name());
            assert!(AgentAction::TYPE_NAMES.contains(&action.type_name()));
        }
    }

    #[test]
    fn state_serializes_with_tag() {
        let state = AgentState::Planning { goal: "open notepad".into() };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "planning");
        assert_eq!(json["goal"], "open notepad");
        assert_eq!(state.tag(), "planning");
    }

    #[test]
    fn loop_config_validation_requires_the_limit_the_mode_relies_on() {
        assert!(LoopConfig::until_done(0).validate().is_ok());
        assert!(LoopConfig::timed(Duration::ZERO, 5).validate().is_err());
        assert!(LoopConfig::timed(Duration::from_secs(60), 0).validate().is_ok());
        assert!(LoopConfig::failure_limit(0).validate().is_err());
        assert!(LoopConfig::failure_limit(3).validate().is_ok());
    }

    #[test]
    fn only_input_like_actions_change_the_screen() {
        assert!(AgentAction::MouseClick { element_id: "A1".into() }.changes_screen());
        assert!(!AgentAction::Wait { milliseconds: 5 }.changes_screen());
        assert!(!AgentAction::GetViewport { annotate: true }.changes_screen());
        assert!(AgentAction::FinishTask { summary: String::new() }.is_completion_signal());
    }
}
