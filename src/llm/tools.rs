use std::path::Path;

use serde_json::Value;

use crate::agent_engine::state::{AgentAction, ScrollDirection, ScrollDistance};
use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::types::{ToolCall, ToolDef};

/// Prefix of tool names contributed by MCP servers: `mcp__<server>__<tool>`.
pub const MCP_PREFIX: &str = "mcp__";

/// Built-in tool definitions, embedded at compile time.
pub fn load_builtin_tools() -> SeeClawResult<Vec<ToolDef>> {
    let json = include_str!("../../prompts/tools/builtin.json");
    serde_json::from_str(json)
        .map_err(|e| SeeClawError::Config(format!("failed to parse builtin tools: {e}")))
}

/// Tool definitions from `prompts.tools_file` when set, else the built-ins.
pub fn load_tools(tools_file: Option<&Path>) -> SeeClawResult<Vec<ToolDef>> {
    let Some(path) = tools_file else {
        return load_builtin_tools();
    };
    let json = std::fs::read_to_string(path).map_err(|e| {
        SeeClawError::Config(format!("cannot read tools file {}: {e}", path.display()))
    })?;
    let tools: Vec<ToolDef> = serde_json::from_str(&json)
        .map_err(|e| SeeClawError::Config(format!("invalid tools file {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), count = tools.len(), "loaded tool definitions");
    Ok(tools)
}

pub fn mcp_tool_name(server: &str, tool: &str) -> String {
    format!("{MCP_PREFIX}{server}__{tool}")
}

fn split_mcp_tool_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(MCP_PREFIX)?;
    let (server, tool) = rest.split_once("__")?;
    (!server.is_empty() && !tool.is_empty()).then_some((server, tool))
}

/// The tool list offered to the model for one run.
///
/// `execute_terminal` is hidden when terminal commands are disabled and
/// `invoke_skill` when no skill is enabled.
pub fn catalog(
    builtin: &[ToolDef],
    allow_terminal: bool,
    has_skills: bool,
    extensions: Vec<ToolDef>,
) -> Vec<ToolDef> {
    builtin
        .iter()
        .filter(|t| allow_terminal || t.name() != "execute_terminal")
        .filter(|t| has_skills || t.name() != "invoke_skill")
        .cloned()
        .chain(extensions)
        .collect()
}

fn str_arg(args: &Value, tool: &str, key: &str) -> SeeClawResult<String> {
    args[key]
        .as_str()
        .map(String::from)
        .ok_or_else(|| SeeClawError::Agent(format!("{tool}: missing string argument '{key}'")))
}

fn enum_arg<T: serde::de::DeserializeOwned>(args: &Value, tool: &str, key: &str, default: T) -> SeeClawResult<T> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| SeeClawError::Agent(format!("{tool}: invalid '{key}' value {v}"))),
    }
}

/// Convert the model's tool call into a typed action.
pub fn parse_tool_call(tc: &ToolCall) -> SeeClawResult<AgentAction> {
    let name = tc.function.name.as_str();
    let raw = tc.function.arguments.trim();
    let args: Value = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw)
            .map_err(|e| SeeClawError::Agent(format!("{name}: arguments are not valid JSON: {e}")))?
    };

    if let Some((server, tool)) = split_mcp_tool_name(name) {
        return Ok(AgentAction::McpCall {
            server_name: server.to_string(),
            tool_name: tool.to_string(),
            arguments: args,
        });
    }

    let action = match name {
        "mouse_click" => AgentAction::MouseClick {
            element_id: str_arg(&args, name, "element_id")?,
        },
        "mouse_double_click" => AgentAction::MouseDoubleClick {
            element_id: str_arg(&args, name, "element_id")?,
        },
        "mouse_right_click" => AgentAction::MouseRightClick {
            element_id: str_arg(&args, name, "element_id")?,
        },
        "scroll" => AgentAction::Scroll {
            direction: enum_arg(&args, name, "direction", ScrollDirection::Down)?,
            distance: enum_arg(&args, name, "distance", ScrollDistance::Short)?,
            element_id: args["element_id"].as_str().map(String::from),
        },
        "type_text" => AgentAction::TypeText {
            text: str_arg(&args, name, "text")?,
            clear_first: args["clear_first"].as_bool().unwrap_or(false),
        },
        "hotkey" => AgentAction::Hotkey {
            keys: str_arg(&args, name, "keys")?,
        },
        "key_press" => AgentAction::KeyPress {
            key: str_arg(&args, name, "key")?,
        },
        "get_viewport" => AgentAction::GetViewport {
            annotate: args["annotate"].as_bool().unwrap_or(true),
        },
        "execute_terminal" => AgentAction::ExecuteTerminal {
            command: str_arg(&args, name, "command")?,
            reason: args["reason"].as_str().unwrap_or_default().to_string(),
        },
        "mcp_call" => AgentAction::McpCall {
            server_name: str_arg(&args, name, "server_name")?,
            tool_name: str_arg(&args, name, "tool_name")?,
            arguments: args.get("arguments").cloned().unwrap_or(Value::Null),
        },
        "invoke_skill" => AgentAction::InvokeSkill {
            skill_name: str_arg(&args, name, "skill_name")?,
            inputs: args.get("inputs").cloned().unwrap_or(Value::Null),
        },
        "wait" => AgentAction::Wait {
            milliseconds: args["milliseconds"]
                .as_u64()
                .map(|ms| ms.min(u32::MAX as u64) as u32)
                .unwrap_or(1000),
        },
        "finish_task" => AgentAction::FinishTask {
            summary: args["summary"].as_str().unwrap_or_default().to_string(),
        },
        "report_failure" => AgentAction::ReportFailure {
            reason: str_arg(&args, name, "reason")?,
            last_attempted_action: args["last_attempted_action"].as_str().map(String::from),
        },
        other => return Err(SeeClawError::Agent(format!("unknown tool: {other}"))),
    };
    Ok(action)
}
