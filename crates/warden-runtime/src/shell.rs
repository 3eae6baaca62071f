use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use warden_config::schema::ExecutionConfig;
use warden_core::{CommandOutput, Executor, Result, WardenError};

/// Runs commands through `sh -c` on the local host.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    working_dir: Option<PathBuf>,
    max_output_chars: usize,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl ShellExecutor {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            working_dir: config.working_dir.clone(),
            max_output_chars: config.max_output_chars,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    fn name(&self) -> &str {
        "shell"
    }

    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        info!(
            command = command,
            timeout_secs = timeout.as_secs(),
            "executing shell command"
        );

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        // Pipe stdin to /dev/null so interactive commands fail fast instead of hanging
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| WardenError::Timeout {
                secs: timeout.as_secs(),
            })?
            .map_err(|e| WardenError::Executor(format!("failed to spawn sh: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(CommandOutput {
            // Killed by a signal: no exit code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: stdout.chars().take(self.max_output_chars).collect(),
            stderr: stderr.chars().take(self.max_output_chars).collect(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
