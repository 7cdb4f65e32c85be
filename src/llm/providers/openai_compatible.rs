// OpenAI-compatible chat completions: GLM/Zhipu, OpenAI, DeepSeek, Qwen, OpenRouter.
use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::provider::{DeltaStream, LlmProvider};
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, ProviderDelta, ToolCallDelta, ToolDef};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// `api_base` may be the full endpoint or the API root.
    fn endpoint(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> SeeClawResult<DeltaStream> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(&tools)?;
            body["tool_choice"] = serde_json::json!("auto");
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            tools = tools.len(),
            "sending LLM request"
        );
        tracing::debug!(
            body = %serde_json::to_string(&redact_images(&body)).unwrap_or_default(),
            "request body (base64 omitted)"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SeeClawError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(SeeClawError::Provider(format!("{status}: {err_body}")));
        }

        if cfg.stream {
            let body = response
                .bytes_stream()
                .map(|chunk| {
                    chunk
                        .map(|b| b.to_vec())
                        .map_err(|e| SeeClawError::Network(e.to_string()))
                })
                .boxed();
            Ok(sse_delta_stream(body))
        } else {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| SeeClawError::Provider(format!("invalid JSON response: {e}")))?;
            let deltas = completion_to_deltas(&json)?;
            tracing::info!(deltas = deltas.len(), "LLM JSON response received");
            Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
        }
    }
}

/// Copy of a request body with inline images replaced, for logging only.
fn redact_images(body: &serde_json::Value) -> serde_json::Value {
    let mut body = body.clone();
    let parts = body
        .get_mut("messages")
        .and_then(|m| m.as_array_mut())
        .into_iter()
        .flatten()
        .filter_map(|msg| msg.get_mut("content").and_then(|c| c.as_array_mut()))
        .flatten();
    for part in parts {
        if part["type"] == "image_url" {
            part["image_url"]["url"] = serde_json::Value::String("<omitted_base64_image>".into());
        }
    }
    body
}

struct SseState {
    body: BoxStream<'static, SeeClawResult<Vec<u8>>>,
    buf: Vec<u8>,
    pending: VecDeque<SeeClawResult<ProviderDelta>>,
    saw_done: bool,
    finished: bool,
}

impl SseState {
    fn push_line(&mut self, raw: &[u8]) {
        if self.saw_done {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        match sse_parser::parse_sse_line(&line) {
            Ok(deltas) => {
                for delta in deltas {
                    let done = delta == ProviderDelta::Done;
                    self.pending.push_back(Ok(delta));
                    if done {
                        self.saw_done = true;
                        self.finished = true;
                        break;
                    }
                }
            }
            Err(SeeClawError::SseParsing(e)) => tracing::debug!("SSE line skipped: {e}"),
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.push_line(&line);
        }
    }
}

/// Turn a raw SSE byte stream into provider deltas. Lines may be split across
/// chunks; a stream that ends without `[DONE]` still terminates with `Done`.
pub fn sse_delta_stream(body: BoxStream<'static, SeeClawResult<Vec<u8>>>) -> DeltaStream {
    let state = SseState {
        body,
        buf: Vec::new(),
        pending: VecDeque::new(),
        saw_done: false,
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(&chunk);
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    let rest = std::mem::take(&mut st.buf);
                    st.push_line(&rest);
                    if !st.saw_done {
                        st.pending.push_back(Ok(ProviderDelta::Done));
                    }
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Non-streaming completion → the same delta sequence a stream would produce.
fn completion_to_deltas(json: &serde_json::Value) -> SeeClawResult<Vec<ProviderDelta>> {
    if let Some(err) = json.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown provider error");
        return Err(SeeClawError::Provider(message.to_string()));
    }
    let message = &json["choices"][0]["message"];
    let mut out = Vec::new();
    if let Some(reasoning) = message["reasoning_content"].as_str().filter(|s| !s.is_empty()) {
        out.push(ProviderDelta::Reasoning(reasoning.to_string()));
    }
    if let Some(content) = message["content"].as_str().filter(|s| !s.is_empty()) {
        out.push(ProviderDelta::Content(content.to_string()));
    }
    if let Some(calls) = message["tool_calls"].as_array() {
        for (index, tc) in calls.iter().enumerate() {
            out.push(ProviderDelta::ToolCall(ToolCallDelta {
                index,
                id: tc["id"].as_str().map(String::from),
                name: tc["function"]["name"].as_str().map(String::from),
                arguments: Some(tc["function"]["arguments"].as_str().unwrap_or("{}").to_string()),
            }));
        }
    }
    out.push(ProviderDelta::Done);
    Ok(out)
}
