//! Deterministic collaborators for tests.
//!
//! None of these touch the host: commands are matched against scripted
//! responses and every invocation is recorded for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use warden_core::{
    Action, ActionSpec, CandidateProvider, CheckpointProvider, CommandOutput, Discovery,
    Executor, Result, TierContext, WardenError,
};

/// A scripted reply to one command.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// If set, `run` returns this as an executor error instead of output.
    pub error: Option<String>,
    /// Sleep before replying (for timeout and race tests).
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Self {
            exit_code: code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// An executor that answers from a script. Unscripted commands succeed
/// with empty output.
#[derive(Default)]
pub struct MockExecutor {
    responses: Mutex<HashMap<String, MockResponse>>,
    /// Every command received, in order.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, command: &str, response: MockResponse) -> Self {
        self.responses.lock().insert(command.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == command).count()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().push(command.to_string());
        let response = self
            .responses
            .lock()
            .get(command)
            .cloned()
            .unwrap_or_default();

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = response.error {
            return Err(WardenError::Executor(error));
        }
        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            duration_ms: response.delay.map(|d| d.as_millis() as u64).unwrap_or(1),
        })
    }
}

/// A provider that always returns the same candidates and findings,
/// unless switched offline.
pub struct StaticCandidates {
    name: String,
    candidates: Vec<ActionSpec>,
    findings: Vec<String>,
    offline: AtomicBool,
    /// Every context the provider was asked with.
    pub contexts: Arc<Mutex<Vec<TierContext>>>,
}

impl StaticCandidates {
    pub fn new(name: &str, candidates: Vec<ActionSpec>) -> Self {
        Self {
            name: name.to_string(),
            candidates,
            findings: Vec::new(),
            offline: AtomicBool::new(false),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_findings(mut self, findings: Vec<&str>) -> Self {
        self.findings = findings.into_iter().map(String::from).collect();
        self
    }

    pub fn discover_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// While offline, every `discover` fails as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl CandidateProvider for StaticCandidates {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self, ctx: &TierContext) -> Result<Discovery> {
        self.contexts.lock().push(ctx.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(WardenError::CandidateProvider {
                tier: ctx.tier.to_string(),
                reason: format!("{} is offline", self.name),
            });
        }
        Ok(Discovery {
            candidates: self.candidates.clone(),
            findings: self.findings.clone(),
        })
    }
}

/// A provider that is unreachable for the first `failures` calls, then
/// delegates to an inner list of candidates.
pub struct FailingCandidates {
    remaining_failures: AtomicU32,
    attempts: AtomicU32,
    candidates: Vec<ActionSpec>,
}

impl FailingCandidates {
    /// Never recovers.
    pub fn always() -> Self {
        Self::failing_times(u32::MAX, Vec::new())
    }

    pub fn failing_times(failures: u32, candidates: Vec<ActionSpec>) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
            candidates,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateProvider for FailingCandidates {
    fn name(&self) -> &str {
        "failing"
    }

    async fn discover(&self, ctx: &TierContext) -> Result<Discovery> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WardenError::CandidateProvider {
                tier: ctx.tier.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(Discovery::new(self.candidates.clone()))
    }
}

/// A checkpoint provider that returns queued snapshots, or fails when
/// told to.
#[derive(Default)]
pub struct MockCheckpoint {
    snapshots: Mutex<VecDeque<serde_json::Value>>,
    fail: bool,
    pub captured: Arc<Mutex<Vec<uuid::Uuid>>>,
}

impl MockCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_snapshot(self, snapshot: serde_json::Value) -> Self {
        self.snapshots.lock().push_back(snapshot);
        self
    }

    pub fn capture_count(&self) -> usize {
        self.captured.lock().len()
    }
}

#[async_trait]
impl CheckpointProvider for MockCheckpoint {
    async fn capture(&self, action: &Action) -> Result<serde_json::Value> {
        self.captured.lock().push(action.id);
        if self.fail {
            return Err(WardenError::Checkpoint("snapshot backend offline".into()));
        }
        Ok(self
            .snapshots
            .lock()
            .pop_front()
            .unwrap_or_else(|| serde_json::json!({ "action_id": action.id })))
    }
}
