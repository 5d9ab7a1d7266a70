//! Remote session identity and lifecycle
//!
//! The [`SessionManager`] resolves a session id (reusing the cached one while
//! the backend still reports it open), forwards step telemetry through
//! [`StepSync`] and submits the lead exactly once.

pub mod sync;

pub use sync::StepSync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, LifecycleStatus, SessionService, StepPatch};
use crate::lead::Lead;
use crate::state::{ClientStore, SESSION_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Resolving,
    Active(String),
    /// Creation failed; the next resolve tries again
    Unavailable,
    Finalized {
        session_id: String,
        entry_number: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    #[error("no session is available, please try again")]
    NoSession,
    #[error("a submission is already in progress")]
    InFlight,
    #[error("the session was closed remotely, please try again")]
    Conflict,
    #[error("submission rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("submission failed: {0}")]
    Network(String),
}

impl FinalizeError {
    /// Whether submitting again may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FinalizeError::InFlight)
    }
}

impl From<ApiError> for FinalizeError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict { .. } => FinalizeError::Conflict,
            ApiError::HttpError {
                status,
                code,
                message,
                ..
            } => FinalizeError::Rejected {
                status,
                code,
                message,
            },
            ApiError::Unauthorized { status, .. } => FinalizeError::Rejected {
                status,
                code: None,
                message: err.to_string(),
            },
            other => FinalizeError::Network(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSuccess {
    pub session_id: String,
    pub entry_number: Option<u64>,
}

impl FinalizeSuccess {
    /// Human reference for the submitted entry, e.g. `#42`
    pub fn entry_reference(&self) -> Option<String> {
        self.entry_number.map(|n| format!("#{}", n))
    }
}

/// Clears the in-flight flag when a finalize attempt ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SessionManager {
    service: Arc<dyn SessionService>,
    store: Arc<dyn ClientStore>,
    sync: StepSync,
    origin_url: String,
    state: Mutex<SessionState>,
    /// Serializes resolution so only one creation is ever in flight
    resolving: tokio::sync::Mutex<()>,
    finalizing: AtomicBool,
}

impl SessionManager {
    /// Create a manager; spawns the step sync worker on the current runtime
    pub fn new(
        service: Arc<dyn SessionService>,
        store: Arc<dyn ClientStore>,
        origin_url: impl Into<String>,
    ) -> Self {
        Self {
            sync: StepSync::spawn(service.clone()),
            service,
            store,
            origin_url: origin_url.into(),
            state: Mutex::new(SessionState::Uninitialized),
            resolving: tokio::sync::Mutex::new(()),
            finalizing: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self.lock_state() = state;
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn current_id(&self) -> Option<String> {
        match &*self.lock_state() {
            SessionState::Active(id) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Active(_))
    }

    pub fn is_finalized(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Finalized { .. })
    }

    /// Resolve the session id, reusing the cached one when it is still open
    ///
    /// Returns `None` when no session could be created or the session is
    /// already finalized.
    pub async fn resolve_or_create(&self) -> Option<String> {
        let _guard = self.resolving.lock().await;

        match self.state() {
            SessionState::Active(id) => return Some(id),
            SessionState::Finalized { .. } => return None,
            _ => {}
        }

        self.set_state(SessionState::Resolving);
        let resolved = self.resolve().await;
        self.set_state(match &resolved {
            Some(id) => SessionState::Active(id.clone()),
            None => SessionState::Unavailable,
        });
        resolved
    }

    async fn resolve(&self) -> Option<String> {
        if let Some(cached) = self.store.get(SESSION_KEY) {
            match self.service.session_status(&cached).await {
                Ok(record) if record.lifecycle_status.is_reusable() => {
                    info!(session_id = %cached, "resuming session");
                    return Some(cached);
                }
                Ok(record) => info!(
                    session_id = %cached,
                    status = ?record.lifecycle_status,
                    "cached session is closed, starting a new one"
                ),
                Err(e) => warn!(
                    session_id = %cached,
                    error = %e,
                    "could not verify cached session, starting a new one"
                ),
            }
            self.forget();
        }

        match self.service.create_session(&self.origin_url).await {
            Ok(session_id) => {
                if let Err(e) = self.store.set(SESSION_KEY, &session_id) {
                    warn!(error = %e, "failed to cache session id");
                }
                info!(session_id = %session_id, "session created");
                Some(session_id)
            }
            Err(e) => {
                warn!(error = %e, "session creation failed, continuing without a session");
                None
            }
        }
    }

    /// Report step progress; never waits on the network
    pub fn update_step(&self, patch: StepPatch) {
        match self.current_id() {
            Some(session_id) => self.sync.send(&session_id, patch),
            None => debug!(step = patch.step_key(), "no active session, step not synced"),
        }
    }

    /// Wait until queued step updates have been attempted
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Submit the lead for the active session
    pub async fn finalize(&self, lead: &Lead) -> Result<FinalizeSuccess, FinalizeError> {
        if self.finalizing.swap(true, Ordering::SeqCst) {
            return Err(FinalizeError::InFlight);
        }
        let _in_flight = InFlightGuard(&self.finalizing);

        let session_id = self.current_id().ok_or(FinalizeError::NoSession)?;
        let payload = lead.to_payload(&session_id);

        match self.service.finalize_session(&payload).await {
            Ok(receipt) => Ok(self.complete(session_id, receipt.entry_number)),
            Err(ApiError::Conflict { entry_number, .. }) => {
                match self.service.session_status(&session_id).await {
                    Ok(record) if record.lifecycle_status == LifecycleStatus::Finalized => {
                        info!(session_id = %session_id, "session was already finalized");
                        Ok(self.complete(session_id, record.entry_number.or(entry_number)))
                    }
                    Ok(record) => {
                        warn!(
                            session_id = %session_id,
                            status = ?record.lifecycle_status,
                            "finalize conflict, discarding session"
                        );
                        self.invalidate(&session_id);
                        Err(FinalizeError::Conflict)
                    }
                    Err(e) => {
                        warn!(
                            session_id = %session_id,
                            error = %e,
                            "finalize conflict and status check failed, discarding session"
                        );
                        self.invalidate(&session_id);
                        Err(FinalizeError::Conflict)
                    }
                }
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "finalize failed");
                Err(e.into())
            }
        }
    }

    fn complete(&self, session_id: String, entry_number: Option<u64>) -> FinalizeSuccess {
        self.forget();
        self.set_state(SessionState::Finalized {
            session_id: session_id.clone(),
            entry_number,
        });
        info!(session_id = %session_id, ?entry_number, "lead submitted");
        FinalizeSuccess {
            session_id,
            entry_number,
        }
    }

    /// Drop a session the backend no longer accepts
    fn invalidate(&self, session_id: &str) {
        self.forget();
        let mut state = self.lock_state();
        if *state == SessionState::Active(session_id.to_string()) {
            *state = SessionState::Uninitialized;
        }
    }

    /// Clear the cached id and start over
    pub fn reset(&self) {
        self.forget();
        self.set_state(SessionState::Uninitialized);
    }

    fn forget(&self) {
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "failed to clear cached session id");
        }
    }
}
