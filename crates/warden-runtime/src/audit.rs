use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use warden_core::{Event, EventBus, Result};
use warden_store::SqliteStore;

/// Appends every engine event to the audit log and the log stream.
/// Heartbeats are only traced.
pub struct AuditRecorder {
    store: SqliteStore,
    bus: EventBus,
}

impl AuditRecorder {
    pub fn new(store: SqliteStore, bus: EventBus) -> Self {
        Self { store, bus }
    }

    pub fn record(&self, event: &Event) -> Result<()> {
        let details = serde_json::to_string(event)?;
        self.store
            .audit(event.kind(), event.action_id(), Some(&details))
    }

    /// Subscribe now and consume events on a background task until
    /// `Event::Shutdown` or the bus closes.
    pub fn spawn(self) -> JoinHandle<()> {
        let rx = self.bus.subscribe();
        tokio::spawn(self.consume(rx, std::future::pending::<()>()))
    }

    /// Subscribe now and consume events until [`AuditSession::finish`].
    /// For short-lived processes that never publish `Event::Shutdown`.
    pub fn session(self) -> AuditSession {
        let rx = self.bus.subscribe();
        let (stop, stopped) = oneshot::channel();
        AuditSession {
            stop,
            handle: tokio::spawn(self.consume(rx, stopped)),
        }
    }

    async fn consume(self, mut rx: broadcast::Receiver<Event>, stop: impl Future) {
        tokio::pin!(stop);
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(event) => {
                        if !self.on_event(event) {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => self.on_lagged(skipped),
                    Err(RecvError::Closed) => return,
                },
                _ = &mut stop => break,
            }
        }

        // Stopped: record whatever was published before the stop request.
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if !self.on_event(event) {
                        return;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => self.on_lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return,
            }
        }
    }

    /// Returns false once the recorder should stop.
    fn on_event(&self, event: Event) -> bool {
        if let Event::Heartbeat { timestamp } = event {
            trace!(%timestamp, "heartbeat");
            return true;
        }
        log_event(&event);
        if let Err(e) = self.record(&event) {
            error!(kind = event.kind(), error = %e, "failed to write audit entry");
        }
        !matches!(event, Event::Shutdown)
    }

    fn on_lagged(&self, skipped: u64) {
        warn!(skipped, "audit recorder lagged, events dropped");
        if let Err(e) = self.store.audit(
            "audit_lagged",
            None,
            Some(&format!("{{\"skipped\":{skipped}}}")),
        ) {
            error!(error = %e, "failed to record lagged marker");
        }
    }
}

/// A recorder bound to one command's lifetime.
pub struct AuditSession {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl AuditSession {
    /// Record every event already published, then stop the recorder.
    pub async fn finish(self) {
        if self.stop.send(()).is_err() {
            debug!("audit recorder already stopped");
        }
        if let Err(e) = self.handle.await {
            warn!(error = %e, "audit recorder ended abnormally");
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::ActionProposed {
            action_id,
            risk_level,
            description,
        } => info!(%action_id, risk = %risk_level, %description, "audit: proposed"),
        Event::ActionApproved {
            action_id,
            approved_by,
        } => info!(%action_id, %approved_by, "audit: approved"),
        Event::ActionTerminal {
            action_id,
            status,
            risk_level,
            ..
        } => info!(%action_id, %status, risk = %risk_level, "audit: terminal"),
        Event::SweepCompleted {
            tier,
            total,
            successful,
            failed,
        } => info!(%tier, total, successful, failed, "audit: sweep completed"),
        Event::SweepFailed {
            tier,
            attempts,
            error,
        } => error!(%tier, attempts, %error, "audit: sweep failed"),
        Event::Heartbeat { .. } => {}
        Event::Shutdown => info!("audit: shutdown"),
    }
}
