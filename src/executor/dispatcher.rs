use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::state::{ActionResult, AgentAction};
use crate::errors::{SeeClawError, SeeClawResult};
use crate::executor::coordinator::locate;
use crate::executor::input::{parse_key_combo, InputDevice, KeyToken, MouseButton};
use crate::executor::terminal::{self, COMMAND_TIMEOUT};
use crate::executor::text_input::deliver_text;
use crate::mcp::ExtensionRegistry;
use crate::perception::types::PerceptionSnapshot;
use crate::skills::manager::SkillsManager;

/// Longest `wait` the model may request.
pub const MAX_WAIT: Duration = Duration::from_secs(30);

/// What terminal commands may do during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalPolicy {
    pub allow_commands: bool,
    pub allow_file_operations: bool,
    pub timeout: Duration,
}

impl TerminalPolicy {
    pub fn new(allow_commands: bool, allow_file_operations: bool) -> Self {
        Self {
            allow_commands,
            allow_file_operations,
            timeout: COMMAND_TIMEOUT,
        }
    }
}

/// Performs one action at a time. Every failure ends up in the returned
/// [`ActionResult`]; nothing escapes as an error.
pub struct Executor {
    input: Arc<dyn InputDevice>,
    extensions: Arc<dyn ExtensionRegistry>,
    skills: Arc<SkillsManager>,
    terminal: TerminalPolicy,
}

impl Executor {
    pub fn new(
        input: Arc<dyn InputDevice>,
        extensions: Arc<dyn ExtensionRegistry>,
        skills: Arc<SkillsManager>,
        terminal: TerminalPolicy,
    ) -> Self {
        Self {
            input,
            extensions,
            skills,
            terminal,
        }
    }

    pub async fn execute(&self, action: &AgentAction, snapshot: &PerceptionSnapshot) -> ActionResult {
        match self.dispatch(action, snapshot).await {
            Ok(output) => {
                tracing::info!(action = %action.describe(), "action succeeded");
                ActionResult::succeeded(action.clone(), output)
            }
            Err(e) => {
                tracing::warn!(action = %action.describe(), error = %e, "action failed");
                ActionResult::failed(action.clone(), e.to_string())
            }
        }
    }

    async fn dispatch(&self, action: &AgentAction, snapshot: &PerceptionSnapshot) -> SeeClawResult<Option<String>> {
        match action {
            AgentAction::MouseClick { element_id } => {
                let at = locate(element_id, snapshot)?;
                self.input.click(at, MouseButton::Left, 1).await?;
                Ok(None)
            }
            AgentAction::MouseDoubleClick { element_id } => {
                let at = locate(element_id, snapshot)?;
                self.input.click(at, MouseButton::Left, 2).await?;
                Ok(None)
            }
            AgentAction::MouseRightClick { element_id } => {
                let at = locate(element_id, snapshot)?;
                self.input.click(at, MouseButton::Right, 1).await?;
                Ok(None)
            }
            AgentAction::Scroll {
                direction,
                distance,
                element_id,
            } => {
                let at = element_id.as_deref().map(|id| locate(id, snapshot)).transpose()?;
                self.input.scroll(at, *direction, distance.notches()).await?;
                Ok(None)
            }
            AgentAction::TypeText { text, clear_first } => {
                deliver_text(self.input.as_ref(), text, *clear_first).await?;
                Ok(None)
            }
            AgentAction::Hotkey { keys } => {
                let combo = parse_key_combo(keys)?;
                self.input.key_combo(&combo).await?;
                Ok(None)
            }
            AgentAction::KeyPress { key } => {
                let token = KeyToken::parse(key)
                    .ok_or_else(|| SeeClawError::Executor(format!("unknown key '{key}'")))?;
                self.input.key_combo(&[token]).await?;
                Ok(None)
            }
            AgentAction::GetViewport { annotate: true } => Ok(Some("a fresh annotated screenshot follows on the next step".into())),
            AgentAction::GetViewport { annotate: false } => Ok(Some("a fresh raw screenshot follows on the next step".into())),
            AgentAction::ExecuteTerminal { command, .. } => self.run_terminal(command).await.map(Some),
            AgentAction::McpCall {
                server_name,
                tool_name,
                arguments,
            } => self
                .extensions
                .call_tool(server_name, tool_name, arguments.clone())
                .await
                .map(Some),
            AgentAction::InvokeSkill { skill_name, inputs } => self.skills.invoke(skill_name, inputs).map(Some),
            AgentAction::Wait { milliseconds } => {
                let wait = Duration::from_millis(u64::from(*milliseconds)).min(MAX_WAIT);
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            AgentAction::FinishTask { .. } | AgentAction::ReportFailure { .. } => Err(SeeClawError::Executor(
                format!("'{}' ends the run and cannot be executed", action.type_name()),
            )),
        }
    }

    async fn run_terminal(&self, command: &str) -> SeeClawResult<String> {
        if !self.terminal.allow_commands {
            return Err(SeeClawError::Executor("terminal commands are disabled in settings".into()));
        }
        if !self.terminal.allow_file_operations && terminal::is_file_operation(command) {
            return Err(SeeClawError::Executor(format!(
                "'{command}' modifies files and file operations are disabled in settings"
            )));
        }
        let output = terminal::run_command(command, self.terminal.timeout).await?;
        if output.success() {
            Ok(output.summary())
        } else {
            Err(SeeClawError::Executor(format!("command failed\n{}", output.summary())))
        }
    }
}
