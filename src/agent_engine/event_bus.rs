use serde::Serialize;
use tokio::sync::broadcast;

use crate::agent_engine::state::{AgentState, ApprovalRequest};
use crate::llm::types::StreamChunk;
use crate::perception::types::PerceptionSource;

pub const EVENT_CAPACITY: usize = 1024;

/// Everything the engine tells the presentation layer, in causal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        run_id: String,
        state: AgentState,
    },
    /// Informational progress label.
    Activity {
        run_id: String,
        label: String,
    },
    StreamChunk {
        run_id: String,
        chunk: StreamChunk,
    },
    ApprovalRequired {
        run_id: String,
        request: ApprovalRequest,
    },
    PerceptionCaptured {
        run_id: String,
        /// Base64 PNG as shown to the model.
        image_base64: Option<String>,
        source: PerceptionSource,
        grid_n: Option<u32>,
        element_count: usize,
    },
}

impl EngineEvent {
    /// Channel name on the desktop event bridge.
    pub fn channel(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "agent_state_changed",
            EngineEvent::Activity { .. } => "agent_activity",
            EngineEvent::StreamChunk { .. } => "llm_stream_chunk",
            EngineEvent::ApprovalRequired { .. } => "action_required",
            EngineEvent::PerceptionCaptured { .. } => "viewport_captured",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            EngineEvent::StateChanged { run_id, .. }
            | EngineEvent::Activity { run_id, .. }
            | EngineEvent::StreamChunk { run_id, .. }
            | EngineEvent::ApprovalRequired { run_id, .. }
            | EngineEvent::PerceptionCaptured { run_id, .. } => run_id,
        }
    }
}

/// Broadcast fan-out of engine events. Emitting never blocks the engine;
/// slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("engine event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}
