use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::SeeClawResult;
use crate::llm::types::{CallConfig, ChatMessage, ProviderDelta, ToolDef};

pub type DeltaStream = BoxStream<'static, SeeClawResult<ProviderDelta>>;

/// Unified LLM provider trait. Each vendor format implements this one capability;
/// the engine never depends on a concrete provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (matches the config.toml key).
    fn name(&self) -> &str;

    /// Start a chat completion and stream incremental text / tool-call deltas,
    /// terminated by [`ProviderDelta::Done`]. Errors before the first delta are
    /// returned directly; mid-stream failures arrive as `Err` items.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
        cfg: &CallConfig,
    ) -> SeeClawResult<DeltaStream>;
}
