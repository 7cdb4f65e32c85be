use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::errors::{SeeClawError, SeeClawResult};

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
/// Captured output kept per stream.
const MAX_OUTPUT_CHARS: usize = 4000;

fn file_op_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?ix)
            (^|[\s;&|(])
            (rm|rmdir|del|erase|rd|mv|move|cp|copy|xcopy|robocopy|ren|rename|mkdir|md|touch|
             chmod|chown|truncate|shred|dd|
             remove-item|move-item|copy-item|new-item|rename-item|set-content|out-file)
            ($|\s)
            |>{1,2}",
        )
        .ok()
    })
    .as_ref()
}

/// True when the command creates, moves, copies or deletes files.
/// Fails closed if the pattern cannot be built.
pub fn is_file_operation(command: &str) -> bool {
    file_op_pattern().map_or(true, |re| re.is_match(command))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text folded back into the planning context.
    pub fn summary(&self) -> String {
        let mut out = format!("exit code: {}", self.exit_code.map_or("killed".to_string(), |c| c.to_string()));
        if !self.stdout.trim().is_empty() {
            out.push_str("\nstdout:\n");
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            out.push_str("\nstderr:\n");
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    cut.push_str("\n…[truncated]");
    cut
}

fn shell_command(command: &str) -> tokio::process::Command {
    if cfg!(target_os = "windows") {
        let mut cmd = tokio::process::Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", command]);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Run `command` through the platform shell. The child is killed on timeout.
pub async fn run_command(command: &str, timeout: Duration) -> SeeClawResult<CommandOutput> {
    let mut cmd = shell_command(command);
    cmd.kill_on_drop(true).stdin(std::process::Stdio::null());

    tracing::info!(command = %command, "running terminal command");
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            SeeClawError::Executor(format!("command timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|e| SeeClawError::Executor(format!("spawn '{command}': {e}")))?;

    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: truncate(String::from_utf8_lossy(&output.stdout).into_owned()),
        stderr: truncate(String::from_utf8_lossy(&output.stderr).into_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_file_mutations() {
        assert!(is_file_operation("rm -rf /tmp/x"));
        assert!(is_file_operation("cd build && del /q *.obj"));
        assert!(is_file_operation("Remove-Item foo.txt"));
        assert!(is_file_operation("echo hi > out.txt"));
        assert!(!is_file_operation("ls -la"));
        assert!(!is_file_operation("git status"));
        assert!(!is_file_operation("echo format"));
    }

    #[test]
    fn long_output_is_truncated() {
        let text = "x".repeat(MAX_OUTPUT_CHARS + 10);
        assert!(truncate(text).ends_with("[truncated]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let out = run_command("echo hello; echo oops 1>&2; exit 3", COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn times_out() {
        let err = run_command("sleep 5", Duration::from_millis(100)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
