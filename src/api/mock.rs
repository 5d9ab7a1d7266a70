//! In-process collaborators for tests and offline runs
//!
//! Each mock records the calls it receives and lets a test script failures,
//! conflicts and paused transfers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::catalog::{
    CatalogSource, RawBackgroundColor, RawCatalog, RawFrameColor, RawMockupVariant, RawSize,
};
use super::error::ApiError;
use super::session::{
    FinalizePayload, FinalizeReceipt, LifecycleStatus, SessionRecord, SessionService, StepPatch,
};
use super::storage::{
    FileTransfer, GrantRequest, GrantTarget, ProgressSink, UploadGrant, UploadGrantService,
};
use crate::upload::PhotoFile;

const MOCK_PROVIDER: &str = "mock";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted outcome for the next finalize call
#[derive(Debug, Clone)]
pub enum MockFinalize {
    /// 2xx with this entry number
    Accept(u64),
    /// 409; when `already_finalized` the remote record flips to Finalized with `entry_number`
    Conflict {
        already_finalized: bool,
        entry_number: Option<u64>,
    },
    /// Any other HTTP failure
    Fail(u16),
}

#[derive(Debug, Clone)]
pub struct MockRemoteSession {
    pub status: LifecycleStatus,
    pub entry_number: Option<u64>,
}

/// Mock session service
#[derive(Default)]
pub struct MockSessionService {
    pub sessions: Arc<Mutex<HashMap<String, MockRemoteSession>>>,
    pub updates: Arc<Mutex<Vec<(String, StepPatch)>>>,
    pub finalized: Arc<Mutex<Vec<FinalizePayload>>>,
    pub finalize_script: Arc<Mutex<VecDeque<MockFinalize>>>,
    pub create_calls: Arc<Mutex<u32>>,
    pub status_calls: Arc<Mutex<u32>>,
    /// When set, `create_session` fails with a network error
    pub create_fails: Arc<Mutex<bool>>,
    /// When set, `update_session_step` fails with HTTP 500
    pub update_fails: Arc<Mutex<bool>>,
    /// Artificial latency for `create_session` and `finalize_session`
    pub latency: Arc<Mutex<Duration>>,
}

impl MockSessionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose session creation always fails
    pub fn unavailable() -> Self {
        let mock = Self::new();
        *locked(&mock.create_fails) = true;
        mock
    }

    /// Add a pre-existing remote session
    pub fn add_session(&self, session_id: &str, status: LifecycleStatus) {
        locked(&self.sessions).insert(
            session_id.to_string(),
            MockRemoteSession {
                status,
                entry_number: None,
            },
        );
    }

    /// Queue the outcome of the next finalize call
    pub fn script_finalize(&self, outcome: MockFinalize) {
        locked(&self.finalize_script).push_back(outcome);
    }

    pub fn set_latency(&self, latency: Duration) {
        *locked(&self.latency) = latency;
    }

    pub fn create_count(&self) -> u32 {
        *locked(&self.create_calls)
    }

    pub fn status_count(&self) -> u32 {
        *locked(&self.status_calls)
    }

    pub fn get_updates(&self) -> Vec<(String, StepPatch)> {
        locked(&self.updates).clone()
    }

    pub fn get_finalized(&self) -> Vec<FinalizePayload> {
        locked(&self.finalized).clone()
    }

    pub fn status_of(&self, session_id: &str) -> Option<LifecycleStatus> {
        locked(&self.sessions)
            .get(session_id)
            .map(|s| s.status.clone())
    }

    async fn simulate_latency(&self) {
        let latency = *locked(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SessionService for MockSessionService {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn create_session(&self, _origin_url: &str) -> Result<String, ApiError> {
        *locked(&self.create_calls) += 1;
        self.simulate_latency().await;

        if *locked(&self.create_fails) {
            return Err(ApiError::network(MOCK_PROVIDER, "connection refused"));
        }

        let session_id = Uuid::new_v4().to_string();
        self.add_session(&session_id, LifecycleStatus::Start);
        Ok(session_id)
    }

    async fn update_session_step(
        &self,
        session_id: &str,
        patch: &StepPatch,
    ) -> Result<(), ApiError> {
        if *locked(&self.update_fails) {
            return Err(ApiError::http(MOCK_PROVIDER, 500, "update failed"));
        }
        locked(&self.updates).push((session_id.to_string(), patch.clone()));
        Ok(())
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionRecord, ApiError> {
        *locked(&self.status_calls) += 1;
        let sessions = locked(&self.sessions);
        let remote = sessions.get(session_id).ok_or_else(|| {
            ApiError::invalid_response(MOCK_PROVIDER, format!("session {} not found", session_id))
        })?;
        Ok(SessionRecord {
            session_id: session_id.to_string(),
            lifecycle_status: remote.status.clone(),
            entry_number: remote.entry_number,
            created_at: Some(Utc::now()),
        })
    }

    async fn finalize_session(
        &self,
        payload: &FinalizePayload,
    ) -> Result<FinalizeReceipt, ApiError> {
        self.simulate_latency().await;

        let next = locked(&self.finalize_script).pop_front();
        let outcome = next.unwrap_or_else(|| {
            let count = locked(&self.finalized).len() as u64;
            MockFinalize::Accept(count + 1)
        });

        match outcome {
            MockFinalize::Accept(entry_number) => {
                locked(&self.finalized).push(payload.clone());
                if let Some(remote) = locked(&self.sessions).get_mut(&payload.session_id) {
                    remote.status = LifecycleStatus::Finalized;
                    remote.entry_number = Some(entry_number);
                }
                Ok(FinalizeReceipt {
                    entry_number: Some(entry_number),
                    lifecycle_status: Some("FINALIZED".to_string()),
                })
            }
            MockFinalize::Conflict {
                already_finalized,
                entry_number,
            } => {
                if already_finalized {
                    let mut sessions = locked(&self.sessions);
                    let remote = sessions
                        .entry(payload.session_id.clone())
                        .or_insert(MockRemoteSession {
                            status: LifecycleStatus::Start,
                            entry_number: None,
                        });
                    remote.status = LifecycleStatus::Finalized;
                    remote.entry_number = entry_number;
                }
                Err(ApiError::conflict(MOCK_PROVIDER, "session already closed"))
            }
            MockFinalize::Fail(status) => {
                Err(ApiError::http(MOCK_PROVIDER, status, "finalize rejected"))
            }
        }
    }
}

/// Mock storage: issues grants and performs scripted transfers
pub struct MockStorage {
    pub grant_requests: Arc<Mutex<Vec<(String, Vec<GrantRequest>)>>>,
    pub transfers: Arc<Mutex<Vec<UploadGrant>>>,
    /// When set, grant requests fail
    pub grant_fails: Arc<Mutex<bool>>,
    /// When set, grant requests never resolve
    pub grant_hangs: Arc<Mutex<bool>>,
    /// When set, transfers fail after reporting their first step
    pub transfer_fails: Arc<Mutex<bool>>,
    /// Progress values reported by each transfer, in order
    pub steps: Arc<Mutex<Vec<u8>>>,
    /// Transfers wait on this gate after reporting `pause_at`
    pub pause_at: Arc<Mutex<Option<u8>>>,
    pub gate: Arc<Notify>,
    /// Notified whenever a transfer reaches `pause_at`
    pub paused: Arc<Notify>,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self {
            grant_requests: Arc::new(Mutex::new(Vec::new())),
            transfers: Arc::new(Mutex::new(Vec::new())),
            grant_fails: Arc::new(Mutex::new(false)),
            grant_hangs: Arc::new(Mutex::new(false)),
            transfer_fails: Arc::new(Mutex::new(false)),
            steps: Arc::new(Mutex::new(vec![25, 50, 75, 100])),
            pause_at: Arc::new(Mutex::new(None)),
            gate: Arc::new(Notify::new()),
            paused: Arc::new(Notify::new()),
        }
    }
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose grant service always fails
    pub fn failing_grants() -> Self {
        let mock = Self::new();
        *locked(&mock.grant_fails) = true;
        mock
    }

    /// Create a mock whose transfers stop at `progress` until `release` is called
    pub fn paused_at(progress: u8) -> Self {
        let mock = Self::new();
        *locked(&mock.pause_at) = Some(progress);
        mock
    }

    /// Let paused transfers continue
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    pub fn get_grant_requests(&self) -> Vec<(String, Vec<GrantRequest>)> {
        locked(&self.grant_requests).clone()
    }

    pub fn transfer_count(&self) -> usize {
        locked(&self.transfers).len()
    }
}

#[async_trait]
impl UploadGrantService for MockStorage {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn create_upload_grants(
        &self,
        session_id: &str,
        files: &[GrantRequest],
    ) -> Result<Vec<UploadGrant>, ApiError> {
        locked(&self.grant_requests).push((session_id.to_string(), files.to_vec()));

        if *locked(&self.grant_hangs) {
            std::future::pending::<()>().await;
        }
        if *locked(&self.grant_fails) {
            return Err(ApiError::http(MOCK_PROVIDER, 503, "storage unavailable"));
        }

        Ok(files
            .iter()
            .enumerate()
            .map(|(idx, file)| UploadGrant {
                index: idx,
                path: format!("{}/{}.{}", session_id, Uuid::new_v4(), file.ext),
                target: GrantTarget::Token(Uuid::new_v4().to_string()),
            })
            .collect())
    }
}

#[async_trait]
impl FileTransfer for MockStorage {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn transfer(
        &self,
        grant: &UploadGrant,
        _file: &PhotoFile,
        progress: ProgressSink,
    ) -> Result<(), ApiError> {
        locked(&self.transfers).push(grant.clone());

        let steps = locked(&self.steps).clone();
        let pause_at = *locked(&self.pause_at);
        let fails = *locked(&self.transfer_fails);

        for (i, step) in steps.into_iter().enumerate() {
            progress(step);
            if fails && i == 0 {
                return Err(ApiError::network(MOCK_PROVIDER, "connection reset"));
            }
            if pause_at == Some(step) {
                let released = self.gate.notified();
                self.paused.notify_waiters();
                released.await;
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Mock catalog source
pub struct MockCatalogSource {
    pub catalog: Arc<Mutex<Result<RawCatalog, ApiError>>>,
    pub fetch_calls: Arc<Mutex<u32>>,
}

impl MockCatalogSource {
    pub fn new(catalog: RawCatalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(Ok(catalog))),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Create a source whose every fetch fails
    pub fn failing() -> Self {
        Self {
            catalog: Arc::new(Mutex::new(Err(ApiError::network(
                MOCK_PROVIDER,
                "catalog unreachable",
            )))),
            fetch_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn fetch_count(&self) -> u32 {
        *locked(&self.fetch_calls)
    }

    /// Small catalog matching the production shape
    pub fn sample() -> RawCatalog {
        let size = |id: &str, label: &str, price: f64, promo: f64, order: i64| RawSize {
            size: Some(id.to_string()),
            label: Some(label.to_string()),
            name: Some(id.to_string()),
            price: Some(price),
            promo_price: Some(promo),
            discount: Some(20.0),
            bg_img: None,
            display_order: Some(order),
        };
        let frame = |id: i64, name: &str, prefix: &str, hex: &str| RawFrameColor {
            id: Some(serde_json::json!(id)),
            name: Some(name.to_string()),
            prefix: Some(prefix.to_string()),
            hex: Some(hex.to_string()),
            display_order: Some(id),
            display_name_pt: None,
        };
        let background = |name: &str, hex: &str, order: i64| RawBackgroundColor {
            name: Some(name.to_string()),
            hex: Some(hex.to_string()),
            display_order: Some(order),
        };

        RawCatalog {
            sizes: vec![
                size("20x30", "Discreto", 49.9, 39.9, 1),
                size("30x40", "Equilibrado", 74.9, 59.9, 2),
            ],
            frame_colors: vec![
                frame(1, "Preto", "preto", "#1a1a1a"),
                frame(2, "Branco", "branco", "#ffffff"),
            ],
            background_colors: vec![
                background("azul", "#4A7FB5", 1),
                background("rosa", "#E8A0BF", 2),
            ],
            mockup_variants: vec![RawMockupVariant {
                size: Some("30x40".to_string()),
                frame_prefix: Some("preto".to_string()),
                background_name: Some("azul".to_string()),
                image_url: Some("https://cdn.example/mockups/30x40-preto-azul.png".to_string()),
            }],
            support_contact: Some("+351 912 345 678".to_string()),
        }
    }
}

#[async_trait]
impl CatalogSource for MockCatalogSource {
    fn name(&self) -> &str {
        MOCK_PROVIDER
    }

    async fn fetch(&self) -> Result<RawCatalog, ApiError> {
        *locked(&self.fetch_calls) += 1;
        locked(&self.catalog).clone()
    }
}
