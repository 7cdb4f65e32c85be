use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::types::{ProviderDelta, ToolCallDelta};

/// Parse one SSE line (OpenAI-compatible format) into provider deltas.
///
/// Keep-alives, comments and non-`data:` lines yield nothing. A single event
/// may carry reasoning, content and tool-call fragments at once.
pub fn parse_sse_line(line: &str) -> SeeClawResult<Vec<ProviderDelta>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(vec![ProviderDelta::Done]);
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| SeeClawError::SseParsing(e.to_string()))?;

    if let Some(err) = json.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown provider error");
        return Err(SeeClawError::Provider(message.to_string()));
    }

    let mut out = Vec::new();
    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(out);
    };
    let delta = &first["delta"];

    // DeepSeek / GLM expose chain-of-thought as reasoning_content.
    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            out.push(ProviderDelta::Reasoning(reasoning.to_string()));
        }
    }
    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            out.push(ProviderDelta::Content(content.to_string()));
        }
    }
    if let Some(calls) = delta["tool_calls"].as_array() {
        for (pos, call) in calls.iter().enumerate() {
            let non_empty = |v: &serde_json::Value| v.as_str().filter(|s| !s.is_empty()).map(String::from);
            out.push(ProviderDelta::ToolCall(ToolCallDelta {
                index: call["index"].as_u64().map(|i| i as usize).unwrap_or(pos),
                id: non_empty(&call["id"]),
                name: non_empty(&call["function"]["name"]),
                arguments: call["function"]["arguments"].as_str().map(String::from),
            }));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_keepalives_and_comments() {
        assert!(parse_sse_line("").unwrap().is_empty());
        assert!(parse_sse_line(": ping").unwrap().is_empty());
        assert!(parse_sse_line("event: message").unwrap().is_empty());
    }

    #[test]
    fn parses_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), vec![ProviderDelta::Done]);
    }

    #[test]
    fn parses_reasoning_and_content() {
        let line = r#"data: {"choices":[{"delta":{"reasoning_content":"hmm","content":"Hi"}}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            vec![
                ProviderDelta::Reasoning("hmm".into()),
                ProviderDelta::Content("Hi".into())
            ]
        );
    }

    #[test]
    fn parses_tool_call_fragments() {
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_9","type":"function","function":{"name":"mouse_click","arguments":"{\"elem"}}]}}]}"#;
        let deltas = parse_sse_line(line).unwrap();
        assert_eq!(
            deltas,
            vec![ProviderDelta::ToolCall(ToolCallDelta {
                index: 1,
                id: Some("call_9".into()),
                name: Some("mouse_click".into()),
                arguments: Some("{\"elem".into()),
            })]
        );
    }

    #[test]
    fn surfaces_inline_errors_and_bad_json() {
        let err = parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#).unwrap_err();
        assert!(matches!(err, SeeClawError::Provider(_)));
        assert!(matches!(parse_sse_line("data: {nope"), Err(SeeClawError::SseParsing(_))));
    }
}
