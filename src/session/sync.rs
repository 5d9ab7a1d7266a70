//! Step Sync - Background delivery of step telemetry.
//!
//! Step patches are queued on an unbounded channel and delivered by a single
//! worker task:
//! - Senders never wait on the network
//! - Failures are logged and dropped (no retry, no coalescing)
//! - `flush` lets callers wait until everything queued so far was attempted

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::api::{SessionService, StepPatch};

enum SyncCommand {
    Update { session_id: String, patch: StepPatch },
    Flush(oneshot::Sender<()>),
}

/// Handle to the step telemetry worker
#[derive(Clone)]
pub struct StepSync {
    tx: mpsc::UnboundedSender<SyncCommand>,
}

impl StepSync {
    /// Spawn the worker; must be called within a tokio runtime
    pub fn spawn(service: Arc<dyn SessionService>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(service, rx));
        Self { tx }
    }

    /// Queue a patch for delivery
    pub fn send(&self, session_id: &str, patch: StepPatch) {
        let command = SyncCommand::Update {
            session_id: session_id.to_string(),
            patch,
        };
        if self.tx.send(command).is_err() {
            warn!("step sync worker stopped, dropping update");
        }
    }

    /// Wait until every patch queued before this call has been attempted
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run(service: Arc<dyn SessionService>, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            SyncCommand::Update { session_id, patch } => {
                match service.update_session_step(&session_id, &patch).await {
                    Ok(()) => debug!(
                        session_id = %session_id,
                        step = patch.step_key(),
                        "step synced"
                    ),
                    Err(e) => warn!(
                        session_id = %session_id,
                        step = patch.step_key(),
                        error = %e,
                        "step sync failed"
                    ),
                }
            }
            SyncCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("step sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockSessionService;

    #[tokio::test]
    async fn test_updates_delivered_in_order() {
        let service = Arc::new(MockSessionService::new());
        let sync = StepSync::spawn(service.clone());

        sync.send(
            "s-1",
            StepPatch::Size {
                size: "30x40".to_string(),
            },
        );
        sync.send("s-1", StepPatch::Upload);
        sync.flush().await;

        let updates = service.get_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].1.step_key(), "SIZE");
        assert_eq!(updates[1], ("s-1".to_string(), StepPatch::Upload));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let service = Arc::new(MockSessionService::new());
        *service.update_fails.lock().unwrap() = true;
        let sync = StepSync::spawn(service.clone());

        sync.send("s-1", StepPatch::Upload);
        sync.flush().await;

        *service.update_fails.lock().unwrap() = false;
        sync.send("s-1", StepPatch::Upload);
        sync.flush().await;

        assert_eq!(service.get_updates().len(), 1);
    }
}
