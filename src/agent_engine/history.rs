use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::AgentAction;
use crate::errors::SeeClawResult;

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unix milliseconds.
    pub ts: i64,
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<AgentAction>,
}

impl RunRecord {
    pub fn new(role: &str, content: impl Into<String>, action: Option<AgentAction>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            role: role.to_string(),
            content: Some(content.into()),
            action,
        }
    }
}

/// Append-only JSONL audit log for one run. Never read back by the engine.
pub struct RunLog {
    run_id: String,
    file_path: Option<PathBuf>,
    records: Vec<RunRecord>,
}

impl RunLog {
    /// Log into `dir`, or `<data_local_dir>/SeeClaw/sessions` when `None`.
    /// Falls back to memory only when the directory cannot be created.
    pub fn open(dir: Option<&Path>, run_id: &str) -> Self {
        let dir = dir.map(Path::to_path_buf).or_else(default_sessions_dir);
        let file_path = dir.and_then(|d| match std::fs::create_dir_all(&d) {
            Ok(()) => Some(d.join(format!("session_{run_id}.jsonl"))),
            Err(e) => {
                tracing::warn!(dir = %d.display(), error = %e, "run log directory unavailable, keeping log in memory");
                None
            }
        });
        Self {
            run_id: run_id.to_string(),
            file_path,
            records: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Keep the record and append it to the file. Write errors are logged only.
    pub fn push(&mut self, record: RunRecord) {
        if let Err(e) = self.append(&record) {
            tracing::warn!(run_id = %self.run_id, error = %e, "failed to append run log");
        }
        self.records.push(record);
    }

    fn append(&self, record: &RunRecord) -> SeeClawResult<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn default_sessions_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("SeeClaw").join("sessions"))
}
