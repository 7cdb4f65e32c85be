use base64::Engine as _;

use crate::agent_engine::state::ActionResult;
use crate::config::PromptsConfig;
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl};
use crate::perception::annotator::build_element_list;
use crate::perception::som_grid::{build_grid_prompt, GridSpec};
use crate::perception::types::{PerceptionSnapshot, PerceptionSource};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are SeeClaw, a desktop GUI automation agent.

Each turn you receive the user's goal, a fresh screenshot, the list of targets on screen \
and the outcome of your previous actions.

Rules:
- Call exactly one tool per turn.
- Address click and scroll targets by the `element_id` from the element list, or by the \
grid cell label (e.g. \"C4\") when the screenshot shows a grid.
- If a previous action failed, read the error and try a different approach.
- When the goal is achieved, call `finish_task` with a short summary.
- When the goal cannot be achieved, call `report_failure` with the reason.
- Reason briefly before every tool call.
- Respond in the same language as the user's goal.";

const DEFAULT_EXPERIENCE_TEMPLATE: &str = "Experience from similar past tasks:\n{experience}";

/// Per-cycle inputs to prompt assembly.
pub struct PlanningContext<'a> {
    pub goal: &'a str,
    pub snapshot: &'a PerceptionSnapshot,
    /// Full run history; only the trailing window is rendered.
    pub history: &'a [ActionResult],
    pub experience: Option<&'a str>,
    /// Why the previous planning turn produced nothing executable.
    pub note: Option<&'a str>,
}

/// Builds the message list for one planning call. Fixed for a run.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    experience_template: String,
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(prompts: &PromptsConfig, skills_context: Option<&str>, history_window: usize) -> Self {
        let mut system = prompts
            .system_template
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if let Some(skills) = skills_context.filter(|s| !s.is_empty()) {
            system.push_str("\n\n");
            system.push_str(skills);
        }
        Self {
            system,
            experience_template: prompts
                .experience_template
                .clone()
                .unwrap_or_else(|| DEFAULT_EXPERIENCE_TEMPLATE.to_string()),
            history_window,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    pub fn build(&self, ctx: &PlanningContext<'_>) -> Vec<ChatMessage> {
        let mut parts = vec![ContentPart::Text {
            text: format!("Goal: {}", ctx.goal),
        }];

        if let Some(exp) = ctx.experience.filter(|e| !e.trim().is_empty()) {
            parts.push(ContentPart::Text {
                text: self.experience_template.replace("{experience}", exp),
            });
        }

        if let Some(history) = self.render_history(ctx.history) {
            parts.push(ContentPart::Text { text: history });
        }

        if let Some(note) = ctx.note {
            parts.push(ContentPart::Text {
                text: format!("Your previous reply could not be used: {note}. Call exactly one tool."),
            });
        }

        parts.push(ContentPart::Text {
            text: perception_text(ctx.snapshot),
        });

        if let Some(png) = ctx.snapshot.image() {
            let b64 = base64::engine::general_purpose::STANDARD.encode(png);
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{b64}"),
                },
            });
        }

        vec![ChatMessage::system(self.system.clone()), ChatMessage::user_parts(parts)]
    }

    fn render_history(&self, history: &[ActionResult]) -> Option<String> {
        if history.is_empty() || self.history_window == 0 {
            return None;
        }
        let skip = history.len().saturating_sub(self.history_window);
        let mut lines = vec![format!("Previous actions ({} total, most recent last):", history.len())];
        for (i, result) in history.iter().enumerate().skip(skip) {
            let status = if result.success { "ok" } else { "FAILED" };
            let mut line = format!("{}. {} -> {status}", i + 1, result.action.describe());
            if let Some(err) = &result.error {
                line.push_str(&format!(" ({err})"));
            }
            lines.push(line);
            if let Some(out) = result.output.as_deref().filter(|o| !o.is_empty()) {
                lines.push(indent(out));
            }
        }
        Some(lines.join("\n"))
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("   {l}")).collect::<Vec<_>>().join("\n")
}

fn perception_text(snapshot: &PerceptionSnapshot) -> String {
    match (snapshot.source(), snapshot.grid_n()) {
        (PerceptionSource::SomGrid, Some(n)) => match GridSpec::new(n) {
            Ok(grid) => build_grid_prompt(grid),
            Err(_) => build_element_list(snapshot.elements()),
        },
        _ => build_element_list(snapshot.elements()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::AgentAction;
    use crate::llm::types::MessageContent;
    use crate::perception::types::CaptureMeta;

    fn meta() -> CaptureMeta {
        CaptureMeta {
            logical_width: 1920,
            logical_height: 1080,
            scale_factor: 1.0,
            monitor_origin_x: 0,
            monitor_origin_y: 0,
            monitor_index: 0,
        }
    }

    fn grid_snapshot() -> PerceptionSnapshot {
        let grid = GridSpec::new(8).unwrap();
        PerceptionSnapshot::grid(Some(vec![1, 2, 3]), grid.elements(), meta(), 8)
    }

    fn click(id: &str, ok: bool) -> ActionResult {
        let action = AgentAction::MouseClick { element_id: id.into() };
        if ok {
            ActionResult::succeeded(action, None)
        } else {
            ActionResult::failed(action, "no such element")
        }
    }

    #[test]
    fn user_message_carries_goal_grid_hint_and_image() {
        let builder = PromptBuilder::new(&PromptsConfig::default(), None, 5);
        let snapshot = grid_snapshot();
        let msgs = builder.build(&PlanningContext {
            goal: "open settings",
            snapshot: &snapshot,
            history: &[],
            experience: None,
            note: None,
        });
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        let text = msgs[1].text_content();
        assert!(text.contains("Goal: open settings"));
        assert!(text.contains("8x8 grid"));
        assert!(text.contains("H8"));
        let MessageContent::Parts(parts) = &msgs[1].content else {
            panic!("expected multipart user message");
        };
        assert!(matches!(
            parts.last(),
            Some(ContentPart::ImageUrl { image_url }) if image_url.url.starts_with("data:image/png;base64,")
        ));
    }

    #[test]
    fn history_is_bounded_and_shows_failures() {
        let builder = PromptBuilder::new(&PromptsConfig::default(), None, 2);
        let history = vec![click("A1", true), click("B2", true), click("C3", false)];
        let snapshot = grid_snapshot();
        let text = builder.build(&PlanningContext {
            goal: "g",
            snapshot: &snapshot,
            history: &history,
            experience: None,
            note: Some("no tool call"),
        })[1]
            .text_content();
        assert!(!text.contains("click A1"));
        assert!(text.contains("2. click B2 -> ok"));
        assert!(text.contains("3. click C3 -> FAILED (no such element)"));
        assert!(text.contains("could not be used: no tool call"));
    }

    #[test]
    fn system_override_skills_and_experience_template_apply() {
        let prompts = PromptsConfig {
            system_template: Some("Custom agent.".into()),
            experience_template: Some("Past: {experience}".into()),
            tools_file: None,
        };
        let builder = PromptBuilder::new(&prompts, Some("Skills:\n- excel: spreadsheets"), 5);
        assert!(builder.system_prompt().starts_with("Custom agent."));
        assert!(builder.system_prompt().ends_with("- excel: spreadsheets"));

        let snapshot = grid_snapshot();
        let text = builder.build(&PlanningContext {
            goal: "g",
            snapshot: &snapshot,
            history: &[],
            experience: Some("use the ribbon"),
            note: None,
        })[1]
            .text_content();
        assert!(text.contains("Past: use the ribbon"));
    }
}
