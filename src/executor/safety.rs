/// Human-in-the-loop gate.
///
/// A pure function of the configured action-type set. It keeps no memory of
/// previous decisions; "always allow" is persisted by the caller into config
/// and takes effect from the next run.
use std::collections::HashSet;

use crate::agent_engine::state::{AgentAction, ApprovalRequest};

#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    require: HashSet<String>,
}

impl SafetyGate {
    pub fn new<I, S>(require_approval_for: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            require: require_approval_for.into_iter().map(Into::into).collect(),
        }
    }

    pub fn requires_approval(&self, action: &AgentAction) -> bool {
        self.require.contains(action.type_name())
    }

    pub fn intercept(&self, action: &AgentAction) -> ApprovalRequest {
        let reason = match action {
            AgentAction::ExecuteTerminal { command, reason } if !reason.is_empty() => {
                format!("Run terminal command `{command}`: {reason}")
            }
            _ => format!(
                "'{}' actions require approval: {}",
                action.type_name(),
                action.describe()
            ),
        };
        ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.clone(),
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_driven_only_by_type_names() {
        let gate = SafetyGate::new(["execute_terminal", "mouse_click"]);
        let click = AgentAction::MouseClick { element_id: "A1".into() };
        let typing = AgentAction::TypeText { text: "x".into(), clear_first: false };
        assert!(gate.requires_approval(&click));
        assert!(!gate.requires_approval(&typing));
        // No memory: same answer every time.
        assert!(gate.requires_approval(&click));
    }

    #[test]
    fn intercept_carries_action_and_reason() {
        let gate = SafetyGate::new(["execute_terminal"]);
        let action = AgentAction::ExecuteTerminal {
            command: "dir".into(),
            reason: "list files".into(),
        };
        let req = gate.intercept(&action);
        assert_eq!(req.action, action);
        assert!(req.reason.contains("dir"));
        assert!(req.reason.contains("list files"));
        assert_ne!(req.id, gate.intercept(&action).id);
    }
}
