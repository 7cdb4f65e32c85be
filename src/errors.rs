use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeeClawError {
    /// Malformed or inconsistent configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The screen capture device is unavailable. Fatal to the current run.
    #[error("Screen capture error: {0}")]
    Capture(String),

    /// Element detection or image processing failed. Perception falls back to the grid.
    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    /// Device or dispatch failure while performing an action.
    #[error("Executor error: {0}")]
    Executor(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Skills error: {0}")]
    Skills(String),

    #[error("Experience store error: {0}")]
    Experience(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Task cancelled")]
    Cancelled,
}

impl SeeClawError {
    /// Transport-level failures that the planner retries within one cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeeClawError::Network(_)
                | SeeClawError::Provider(_)
                | SeeClawError::SseParsing(_)
                | SeeClawError::Http(_)
        )
    }
}

impl serde::Serialize for SeeClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type SeeClawResult<T> = Result<T, SeeClawError>;
