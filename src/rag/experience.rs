use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::agent_engine::state::ActionResult;
use crate::config::ExperienceConfig;
use crate::errors::{SeeClawError, SeeClawResult};

pub const DEFAULT_MAX_RECALL: usize = 3;
const ENTRY_HEADER: &str = "## ";

/// Long-term memory: contributes a text block to the planning prompt and
/// learns from finished runs.
#[async_trait]
pub trait ExperienceSource: Send + Sync {
    async fn recall(&self, goal: &str) -> SeeClawResult<Option<String>>;

    async fn record(&self, goal: &str, steps: &[ActionResult], summary: &str) -> SeeClawResult<()>;
}

pub struct NoExperience;

#[async_trait]
impl ExperienceSource for NoExperience {
    async fn recall(&self, _goal: &str) -> SeeClawResult<Option<String>> {
        Ok(None)
    }

    async fn record(&self, _goal: &str, _steps: &[ActionResult], _summary: &str) -> SeeClawResult<()> {
        Ok(())
    }
}

/// Append-only markdown file, one `## <goal>` section per successful run.
/// Recall ranks sections by word overlap with the new goal.
pub struct ExperienceStore {
    path: PathBuf,
    max_recall: usize,
}

impl ExperienceStore {
    pub fn new(path: impl Into<PathBuf>, max_recall: usize) -> Self {
        Self {
            path: path.into(),
            max_recall,
        }
    }

    /// `experience.path`, else `<data_local_dir>/SeeClaw/experience.md`.
    pub fn from_config(config: &ExperienceConfig) -> SeeClawResult<Self> {
        let path = match &config.path {
            Some(p) => p.clone(),
            None => dirs::data_local_dir()
                .ok_or_else(|| SeeClawError::Experience("no local data directory".into()))?
                .join("SeeClaw")
                .join("experience.md"),
        };
        Ok(Self::new(path, config.max_recall.unwrap_or(DEFAULT_MAX_RECALL)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn keywords(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            word.push(c);
            continue;
        }
        if word.len() > 2 {
            out.insert(std::mem::take(&mut word));
        }
        word.clear();
        // CJK and other non-ASCII letters count one character at a time.
        if c.is_alphanumeric() {
            out.insert(c.to_string());
        }
    }
    if word.len() > 2 {
        out.insert(word);
    }
    out
}

fn split_entries(content: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.starts_with(ENTRY_HEADER) {
            if let Some(s) = start {
                entries.push(content[s..offset].trim_end());
            }
            start = Some(offset);
        }
        offset += line.len();
    }
    if let Some(s) = start {
        entries.push(content[s..].trim_end());
    }
    entries
}

fn render_entry(goal: &str, steps: &[ActionResult], summary: &str) -> String {
    let mut entry = format!(
        "{ENTRY_HEADER}{}\n_recorded {}_\n\n",
        goal.trim().replace('\n', " "),
        chrono::Utc::now().to_rfc3339()
    );
    for (i, step) in steps.iter().enumerate() {
        let status = if step.success { "ok" } else { "failed" };
        entry.push_str(&format!("{}. {} ({status})\n", i + 1, step.action.describe()));
    }
    entry.push_str(&format!("\nResult: {}\n\n", summary.trim()));
    entry
}

#[async_trait]
impl ExperienceSource for ExperienceStore {
    async fn recall(&self, goal: &str) -> SeeClawResult<Option<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SeeClawError::Experience(format!("read {}: {e}", self.path.display()))),
        };
        let wanted = keywords(goal);
        if wanted.is_empty() {
            return Ok(None);
        }

        let mut scored: Vec<(usize, usize, &str)> = split_entries(&content)
            .into_iter()
            .enumerate()
            .map(|(pos, entry)| (keywords(entry).intersection(&wanted).count(), pos, entry))
            .filter(|(score, _, _)| *score > 0)
            .collect();
        // Best score first; newer entries win ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        let picked: Vec<&str> = scored.into_iter().take(self.max_recall).map(|(_, _, e)| e).collect();
        tracing::debug!(goal = %goal, recalled = picked.len(), "experience recall");
        Ok((!picked.is_empty()).then(|| picked.join("\n\n")))
    }

    async fn record(&self, goal: &str, steps: &[ActionResult], summary: &str) -> SeeClawResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SeeClawError::Experience(format!("open {}: {e}", self.path.display())))?;
        file.write_all(render_entry(goal, steps, summary).as_bytes()).await?;
        file.flush().await?;
        tracing::info!(path = %self.path.display(), "experience recorded");
        Ok(())
    }
}
