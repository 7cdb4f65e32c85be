use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::state::AgentAction;
use crate::config::PlannerConfig;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::llm::registry::ModelBinding;
use crate::llm::tools::parse_tool_call;
use crate::llm::types::{
    ChatMessage, FunctionCall, ProviderDelta, StreamChunk, StreamChunkKind, ToolCall, ToolCallDelta, ToolDef,
};

/// What one planning turn decided.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// An ordinary action to gate and execute.
    Next { action: AgentAction, rationale: String },
    /// The model judged the goal complete.
    Finish { summary: String },
    /// The model judged the goal unreachable.
    Failure { reason: String },
    /// No usable action: no tool call, a malformed one, or the provider kept
    /// failing. Counts as one failed cycle.
    Unusable { detail: String },
}

/// Merges streamed tool-call fragments by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, (String, String, String)>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.0 = id;
        }
        if let Some(name) = delta.name {
            entry.1.push_str(&name);
        }
        if let Some(args) = delta.arguments {
            entry.2.push_str(&args);
        }
    }

    /// Completed calls in index order; fragments that never got a name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|(_, (_, name, _))| !name.is_empty())
            .map(|(index, (id, name, arguments))| ToolCall {
                id: if id.is_empty() { format!("call_{index}") } else { id },
                call_type: "function".into(),
                function: FunctionCall { name, arguments },
            })
            .collect()
    }
}

struct Turn {
    content: String,
    calls: Vec<ToolCall>,
}

/// Streams one planning call per cycle and extracts at most one action.
pub struct Planner {
    binding: ModelBinding,
    max_retries: u32,
    backoff: Duration,
}

impl Planner {
    pub fn new(binding: ModelBinding, config: &PlannerConfig) -> Self {
        Self {
            binding,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.binding.provider.name()
    }

    /// Run one planning turn. Stream chunks are handed to `on_chunk` as they
    /// arrive. Transport errors are retried with linear backoff, each retry
    /// announced by a [`StreamChunkKind::Retry`] chunk; once retries are
    /// exhausted the turn is [`PlanOutcome::Unusable`]. Only cancellation is
    /// returned as an error.
    pub async fn plan<F>(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDef],
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> SeeClawResult<PlanOutcome>
    where
        F: FnMut(StreamChunk) + Send,
    {
        let mut attempt = 0u32;
        loop {
            match self.turn(&messages, tools, cancel, &mut on_chunk).await {
                Ok(turn) => return Ok(interpret(turn)),
                Err(SeeClawError::Cancelled) => return Err(SeeClawError::Cancelled),
                Err(e) => {
                    on_chunk(StreamChunk::new(StreamChunkKind::Error, e.to_string()));
                    if !e.is_retryable() || attempt >= self.max_retries {
                        tracing::error!(error = %e, attempts = attempt + 1, "planning call failed");
                        return Ok(PlanOutcome::Unusable {
                            detail: format!("model call failed: {e}"),
                        });
                    }
                    attempt += 1;
                    let delay = self.backoff * attempt;
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying planning call");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SeeClawError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    on_chunk(StreamChunk::new(StreamChunkKind::Retry, format!("attempt {}", attempt + 1)));
                }
            }
        }
    }

    async fn turn<F>(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
        cancel: &CancellationToken,
        on_chunk: &mut F,
    ) -> SeeClawResult<Turn>
    where
        F: FnMut(StreamChunk) + Send,
    {
        let provider = self.binding.provider.clone();
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SeeClawError::Cancelled),
            s = provider.stream_chat(messages.to_vec(), tools.to_vec(), &self.binding.call) => s?,
        };

        let mut content = String::new();
        let mut acc = ToolCallAccumulator::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SeeClawError::Cancelled),
                n = stream.next() => n,
            };
            match next {
                None | Some(Ok(ProviderDelta::Done)) => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(ProviderDelta::Reasoning(text))) => {
                    on_chunk(StreamChunk::new(StreamChunkKind::Reasoning, text));
                }
                Some(Ok(ProviderDelta::Content(text))) => {
                    content.push_str(&text);
                    on_chunk(StreamChunk::new(StreamChunkKind::Content, text));
                }
                Some(Ok(ProviderDelta::ToolCall(delta))) => acc.push(delta),
            }
        }

        let calls = acc.finish();
        if let Some(first) = calls.first() {
            on_chunk(StreamChunk::new(StreamChunkKind::ToolCall, first.function.name.clone()));
        }
        on_chunk(StreamChunk::new(StreamChunkKind::Done, ""));
        Ok(Turn { content, calls })
    }
}

fn interpret(turn: Turn) -> PlanOutcome {
    let Turn { content, calls } = turn;
    let Some(first) = calls.first() else {
        return PlanOutcome::Unusable {
            detail: "the model answered without calling a tool".into(),
        };
    };
    if calls.len() > 1 {
        let dropped: Vec<&str> = calls[1..].iter().map(|c| c.function.name.as_str()).collect();
        tracing::warn!(honored = %first.function.name, ?dropped, "multiple tool calls in one turn, only the first is used");
    }
    match parse_tool_call(first) {
        Ok(AgentAction::FinishTask { summary }) => PlanOutcome::Finish { summary },
        Ok(AgentAction::ReportFailure { reason, .. }) => PlanOutcome::Failure { reason },
        Ok(action) => PlanOutcome::Next {
            action,
            rationale: content.trim().to_string(),
        },
        Err(e) => PlanOutcome::Unusable {
            detail: format!("unusable tool call: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures_util::stream;

    use super::*;
    use crate::llm::provider::{DeltaStream, LlmProvider};
    use crate::llm::types::CallConfig;

    /// Replays one scripted response per call.
    struct Scripted {
        turns: Mutex<VecDeque<SeeClawResult<Vec<ProviderDelta>>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(turns: Vec<SeeClawResult<Vec<ProviderDelta>>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_chat(&self, _: Vec<ChatMessage>, _: Vec<ToolDef>, _: &CallConfig) -> SeeClawResult<DeltaStream> {
            *self.calls.lock().unwrap() += 1;
            let next = self.turns.lock().unwrap().pop_front().unwrap_or(Ok(vec![ProviderDelta::Done]));
            next.map(|deltas| stream::iter(deltas.into_iter().map(Ok)).boxed())
        }
    }

    fn planner(provider: Arc<Scripted>, max_retries: u32) -> Planner {
        let binding = ModelBinding {
            provider,
            call: CallConfig {
                model: "m".into(),
                stream: true,
                temperature: 0.1,
            },
        };
        let config = PlannerConfig {
            max_retries,
            retry_backoff_ms: 10,
            ..PlannerConfig::default()
        };
        Planner::new(binding, &config)
    }

    fn tool(index: usize, name: Option<&str>, args: &str) -> ProviderDelta {
        ProviderDelta::ToolCall(ToolCallDelta {
            index,
            id: name.map(|_| format!("call_{index}")),
            name: name.map(String::from),
            arguments: Some(args.to_string()),
        })
    }

    #[tokio::test]
    async fn merges_fragments_and_forwards_chunks_in_order() {
        let provider = Scripted::new(vec![Ok(vec![
            ProviderDelta::Reasoning("thinking".into()),
            ProviderDelta::Content("Click ".into()),
            ProviderDelta::Content("OK".into()),
            tool(0, Some("mouse_click"), "{\"element_"),
            tool(0, None, "id\":\"B3\"}"),
            ProviderDelta::Done,
        ])]);
        let mut seen = Vec::new();
        let outcome = planner(provider, 0)
            .plan(Vec::new(), &[], &CancellationToken::new(), |c| seen.push(c))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PlanOutcome::Next {
                action: AgentAction::MouseClick { element_id: "B3".into() },
                rationale: "Click OK".into(),
            }
        );
        let kinds: Vec<StreamChunkKind> = seen.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamChunkKind::Reasoning,
                StreamChunkKind::Content,
                StreamChunkKind::Content,
                StreamChunkKind::ToolCall,
                StreamChunkKind::Done
            ]
        );
    }

    #[tokio::test]
    async fn only_first_tool_call_is_honored() {
        let provider = Scripted::new(vec![Ok(vec![
            tool(0, Some("key_press"), "{\"key\":\"enter\"}"),
            tool(1, Some("finish_task"), "{\"summary\":\"done\"}"),
            ProviderDelta::Done,
        ])]);
        let outcome = planner(provider, 0)
            .plan(Vec::new(), &[], &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PlanOutcome::Next {
                action: AgentAction::KeyPress { key: "enter".into() },
                rationale: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn completion_signals_map_to_outcomes() {
        let provider = Scripted::new(vec![
            Ok(vec![tool(0, Some("finish_task"), "{\"summary\":\"saved\"}")]),
            Ok(vec![tool(0, Some("report_failure"), "{\"reason\":\"locked\"}")]),
            Ok(vec![ProviderDelta::Content("I am not sure".into())]),
        ]);
        let p = planner(provider, 0);
        let cancel = CancellationToken::new();
        assert_eq!(
            p.plan(Vec::new(), &[], &cancel, |_| {}).await.unwrap(),
            PlanOutcome::Finish { summary: "saved".into() }
        );
        assert_eq!(
            p.plan(Vec::new(), &[], &cancel, |_| {}).await.unwrap(),
            PlanOutcome::Failure { reason: "locked".into() }
        );
        assert!(matches!(
            p.plan(Vec::new(), &[], &cancel, |_| {}).await.unwrap(),
            PlanOutcome::Unusable { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transport_errors_then_gives_up() {
        let provider = Scripted::new(vec![
            Err(SeeClawError::Network("reset".into())),
            Ok(vec![tool(0, Some("wait"), "{\"milliseconds\":5}")]),
        ]);
        let outcome = planner(provider.clone(), 2)
            .plan(Vec::new(), &[], &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PlanOutcome::Next {
                action: AgentAction::Wait { milliseconds: 5 },
                rationale: String::new(),
            }
        );
        assert_eq!(*provider.calls.lock().unwrap(), 2);

        let failing = Scripted::new(vec![
            Err(SeeClawError::Provider("503".into())),
            Err(SeeClawError::Provider("503".into())),
        ]);
        let outcome = planner(failing.clone(), 1)
            .plan(Vec::new(), &[], &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert!(matches!(outcome, PlanOutcome::Unusable { .. }));
        assert_eq!(*failing.calls.lock().unwrap(), 2);
    }

    /// Streams some text, then drops the connection on the first call.
    struct Flaky {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl LlmProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn stream_chat(&self, _: Vec<ChatMessage>, _: Vec<ToolDef>, _: &CallConfig) -> SeeClawResult<DeltaStream> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            let items = if call == 1 {
                vec![
                    Ok(ProviderDelta::Content("Clicking the".into())),
                    Err(SeeClawError::Network("connection reset".into())),
                ]
            } else {
                vec![
                    Ok(ProviderDelta::Content("Clicking the button".into())),
                    Ok(tool(0, Some("mouse_click"), "{\"element_id\":\"A1\"}")),
                    Ok(ProviderDelta::Done),
                ]
            };
            Ok(stream::iter(items).boxed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_partial_stream_is_announced() {
        let provider = Arc::new(Flaky { calls: Mutex::new(0) });
        let binding = ModelBinding {
            provider: provider.clone(),
            call: CallConfig {
                model: "m".into(),
                stream: true,
                temperature: 0.1,
            },
        };
        let p = Planner::new(
            binding,
            &PlannerConfig {
                max_retries: 1,
                retry_backoff_ms: 10,
                ..PlannerConfig::default()
            },
        );
        let mut seen = Vec::new();
        let outcome = p
            .plan(Vec::new(), &[], &CancellationToken::new(), |c| seen.push(c))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PlanOutcome::Next {
                action: AgentAction::MouseClick { element_id: "A1".into() },
                rationale: "Clicking the button".into(),
            }
        );
        let kinds: Vec<StreamChunkKind> = seen.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamChunkKind::Content,
                StreamChunkKind::Error,
                StreamChunkKind::Retry,
                StreamChunkKind::Content,
                StreamChunkKind::ToolCall,
                StreamChunkKind::Done
            ]
        );
        assert_eq!(seen[2].content, "attempt 2");
        assert_eq!(*provider.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let provider = Scripted::new(vec![Ok(vec![tool(0, Some("wait"), "{}")])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = planner(provider, 0).plan(Vec::new(), &[], &cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, SeeClawError::Cancelled));
    }
}
