use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw result of running one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands on behalf of the engine (local shell, SSH, Docker, ...).
///
/// A failing command surfaces as a non-zero `exit_code`; a backend that could
/// not run the command at all returns `Err`. Never a silent no-op.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, command: &str, timeout: Duration) -> crate::Result<CommandOutput>;
}
