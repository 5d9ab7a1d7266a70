//! Photo upload slots
//!
//! The [`UploadOrchestrator`] owns three slots. Assigning a file starts an
//! independent pipeline task: grant, transfer with real progress, and on any
//! failure a simulated progress run so the visitor is never blocked.
//!
//! Every pipeline carries the slot generation it started under. Removing or
//! replacing a file bumps the generation, and writes from superseded
//! pipelines are discarded.

pub mod file;
pub mod simulator;

pub use file::PhotoFile;
pub use simulator::ProgressSimulator;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{
    ApiError, FileTransfer, GrantRequest, ProgressSink, StepPatch, UploadGrant,
    UploadGrantService,
};
use crate::config::UploadConfig;
use crate::session::SessionManager;

/// Number of photo slots
pub const SLOT_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Empty,
    Selected,
    Uploading,
    Completed,
    Failed,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotStatus::Empty => "empty",
            SlotStatus::Selected => "selected",
            SlotStatus::Uploading => "uploading",
            SlotStatus::Completed => "completed",
            SlotStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSlot {
    pub index: usize,
    pub file: Option<PhotoFile>,
    pub progress: u8,
    pub grant: Option<UploadGrant>,
    pub status: SlotStatus,
    /// Progress is simulated because the real upload failed
    pub degraded: bool,
    pub generation: u64,
}

impl UploadSlot {
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            file: None,
            progress: 0,
            grant: None,
            status: SlotStatus::Empty,
            degraded: false,
            generation: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.status == SlotStatus::Completed
    }

    fn reset(&mut self) {
        self.file = None;
        self.progress = 0;
        self.grant = None;
        self.status = SlotStatus::Empty;
        self.degraded = false;
        self.generation += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("slot {0} does not exist")]
    NoSuchSlot(usize),
    #[error("slot {0} is not available until the previous slots hold a photo")]
    SlotHidden(usize),
    #[error("'{0}' is not an accepted photo type")]
    UnsupportedType(String),
    #[error("photo is {size} bytes, the limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("photo is empty")]
    EmptyFile,
}

type SlotTable = Arc<Mutex<Vec<UploadSlot>>>;

fn lock_slots(slots: &SlotTable) -> MutexGuard<'_, Vec<UploadSlot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writes to one slot on behalf of one pipeline run
///
/// Every write checks the generation first; a stale writer changes nothing.
#[derive(Clone)]
struct SlotWriter {
    slots: SlotTable,
    index: usize,
    generation: u64,
}

impl SlotWriter {
    fn update(&self, f: impl FnOnce(&mut UploadSlot)) -> bool {
        let mut slots = lock_slots(&self.slots);
        match slots.get_mut(self.index) {
            Some(slot) if slot.generation == self.generation => {
                f(slot);
                true
            }
            _ => false,
        }
    }

    fn is_current(&self) -> bool {
        self.update(|_| {})
    }

    fn progress(&self) -> u8 {
        lock_slots(&self.slots)
            .get(self.index)
            .map(|s| s.progress)
            .unwrap_or(0)
    }

    /// Raise progress; never lowers it and never touches a finished slot
    fn report(&self, value: u8) -> bool {
        self.update(|slot| {
            if matches!(slot.status, SlotStatus::Selected | SlotStatus::Uploading) {
                slot.status = SlotStatus::Uploading;
                slot.progress = slot.progress.max(value.min(100));
            }
        })
    }

    fn sink(&self) -> ProgressSink {
        let writer = self.clone();
        Arc::new(move |value| {
            writer.report(value);
        })
    }

    fn complete(&self) -> bool {
        self.update(|slot| {
            slot.progress = 100;
            slot.status = SlotStatus::Completed;
        })
    }
}

#[derive(Debug, Error)]
enum GrantFailure {
    #[error("no active session")]
    NoSession,
    #[error("no grant returned")]
    Empty,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Everything a pipeline task needs, owned so the task is `'static`
#[derive(Clone)]
struct Pipeline {
    grants: Arc<dyn UploadGrantService>,
    transfer: Arc<dyn FileTransfer>,
    session: Arc<SessionManager>,
    settings: UploadConfig,
    simulator: ProgressSimulator,
}

impl Pipeline {
    async fn run(self, writer: SlotWriter, file: PhotoFile) {
        match self.acquire_grant(&file).await {
            Ok(grant) => {
                if !writer.update(|slot| {
                    slot.grant = Some(grant.clone());
                    slot.status = SlotStatus::Uploading;
                }) {
                    return;
                }
                match self.transfer.transfer(&grant, &file, writer.sink()).await {
                    Ok(()) => {
                        self.finish(&writer, false);
                        return;
                    }
                    Err(e) => warn!(slot = writer.index, error = %e, "photo transfer failed"),
                }
            }
            Err(e) => warn!(slot = writer.index, error = %e, "upload grant unavailable"),
        }

        if !writer.is_current() {
            debug!(slot = writer.index, "slot changed during upload, dropping result");
            return;
        }

        if !self.settings.simulate_on_failure {
            writer.update(|slot| slot.status = SlotStatus::Failed);
            return;
        }

        info!(slot = writer.index, "upload degraded, simulating progress");
        writer.update(|slot| {
            slot.degraded = true;
            slot.status = SlotStatus::Uploading;
        });
        let start = writer.progress();
        if self.simulator.run(start, |value| writer.report(value)).await {
            self.finish(&writer, true);
        }
    }

    async fn acquire_grant(&self, file: &PhotoFile) -> Result<UploadGrant, GrantFailure> {
        let session_id = self.session.current_id().ok_or(GrantFailure::NoSession)?;
        let request = [GrantRequest {
            ext: file.extension().unwrap_or_else(|| "jpg".to_string()),
        }];

        let call = self.grants.create_upload_grants(&session_id, &request);
        let grants = match self.settings.grant_timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ApiError::timeout(self.grants.name(), limit.as_secs()))??,
            None => call.await?,
        };

        grants.into_iter().next().ok_or(GrantFailure::Empty)
    }

    fn finish(&self, writer: &SlotWriter, degraded: bool) {
        if writer.complete() {
            info!(slot = writer.index, degraded, "photo uploaded");
            self.session.update_step(StepPatch::Upload);
        }
    }
}

pub struct UploadOrchestrator {
    slots: SlotTable,
    pipeline: Pipeline,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UploadOrchestrator {
    pub fn new(
        grants: Arc<dyn UploadGrantService>,
        transfer: Arc<dyn FileTransfer>,
        session: Arc<SessionManager>,
        settings: UploadConfig,
    ) -> Self {
        let slots = (0..SLOT_COUNT).map(UploadSlot::empty).collect();
        Self {
            slots: Arc::new(Mutex::new(slots)),
            pipeline: Pipeline {
                grants,
                transfer,
                simulator: ProgressSimulator::from_config(&settings),
                session,
                settings,
            },
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all slots
    pub fn slots(&self) -> Vec<UploadSlot> {
        lock_slots(&self.slots).clone()
    }

    pub fn slot(&self, index: usize) -> Option<UploadSlot> {
        lock_slots(&self.slots).get(index).cloned()
    }

    /// A slot can take a new photo once every slot before it holds one
    pub fn is_reachable(&self, index: usize) -> bool {
        let slots = lock_slots(&self.slots);
        index < slots.len() && slots[..index].iter().all(|s| !s.is_empty())
    }

    /// Indices of slots to show: every reachable slot plus any holding a photo
    pub fn visible_slots(&self) -> Vec<usize> {
        let slots = lock_slots(&self.slots);
        let prefix = slots.iter().take_while(|s| !s.is_empty()).count();
        slots
            .iter()
            .filter(|s| s.index <= prefix || !s.is_empty())
            .map(|s| s.index)
            .collect()
    }

    fn check_file(&self, file: &PhotoFile) -> Result<(), UploadError> {
        let settings = &self.pipeline.settings;
        let ext = file.extension().unwrap_or_default();
        if !settings.accepted_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(UploadError::UnsupportedType(file.name().to_string()));
        }
        if file.is_empty() {
            return Err(UploadError::EmptyFile);
        }
        let size = file.len() as u64;
        if size > settings.max_file_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: settings.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Put a photo in a slot and start uploading it
    ///
    /// Replacing a photo supersedes any pipeline still running for the slot.
    pub fn assign(&self, index: usize, file: PhotoFile) -> Result<JoinHandle<()>, UploadError> {
        if index >= SLOT_COUNT {
            return Err(UploadError::NoSuchSlot(index));
        }
        self.check_file(&file)?;

        let writer = {
            let mut slots = lock_slots(&self.slots);
            let reachable = slots[..index].iter().all(|s| !s.is_empty());
            let slot = &mut slots[index];
            if !reachable && slot.is_empty() {
                return Err(UploadError::SlotHidden(index));
            }
            slot.reset();
            slot.file = Some(file.clone());
            slot.status = SlotStatus::Selected;
            SlotWriter {
                slots: self.slots.clone(),
                index,
                generation: slot.generation,
            }
        };

        debug!(slot = index, name = file.name(), bytes = file.len(), "photo assigned");
        let handle = tokio::spawn(self.pipeline.clone().run(writer, file));
        Ok(handle)
    }

    /// Same as [`assign`](Self::assign), keeping the task for [`settle`](Self::settle)
    pub fn assign_tracked(&self, index: usize, file: PhotoFile) -> Result<(), UploadError> {
        let handle = self.assign(index, file)?;
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    /// Clear a slot; any pipeline still running for it becomes stale
    pub fn remove(&self, index: usize) -> Result<(), UploadError> {
        let mut slots = lock_slots(&self.slots);
        let slot = slots.get_mut(index).ok_or(UploadError::NoSuchSlot(index))?;
        slot.reset();
        debug!(slot = index, generation = slot.generation, "photo removed");
        Ok(())
    }

    /// Wait for every tracked pipeline to finish
    pub async fn settle(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "upload task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockSessionService, MockStorage};
    use crate::state::MemoryStore;

    fn fast_settings() -> UploadConfig {
        UploadConfig {
            tick_ms: 1,
            ..UploadConfig::default()
        }
    }

    async fn setup(storage: Arc<MockStorage>, settings: UploadConfig) -> UploadOrchestrator {
        let service = Arc::new(MockSessionService::new());
        let session = Arc::new(SessionManager::new(
            service,
            Arc::new(MemoryStore::new()),
            "cli://test",
        ));
        session.resolve_or_create().await.unwrap();
        UploadOrchestrator::new(storage.clone(), storage, session, settings)
    }

    fn photo(name: &str) -> PhotoFile {
        PhotoFile::new(name, vec![0u8; 1024])
    }

    #[tokio::test]
    async fn test_upload_completes_with_real_progress() {
        let storage = Arc::new(MockStorage::new());
        let uploads = setup(storage.clone(), fast_settings()).await;

        uploads.assign(0, photo("a.jpg")).unwrap().await.unwrap();

        let slot = uploads.slot(0).unwrap();
        assert_eq!(slot.status, SlotStatus::Completed);
        assert_eq!(slot.progress, 100);
        assert!(!slot.degraded);
        assert!(slot.grant.is_some());
        assert_eq!(storage.transfer_count(), 1);
        assert_eq!(storage.get_grant_requests()[0].1[0].ext, "jpg");
    }

    #[tokio::test]
    async fn test_grant_failure_degrades_to_simulation() {
        let storage = Arc::new(MockStorage::failing_grants());
        let uploads = setup(storage.clone(), fast_settings()).await;

        uploads.assign(0, photo("a.png")).unwrap().await.unwrap();

        let slot = uploads.slot(0).unwrap();
        assert_eq!(slot.status, SlotStatus::Completed);
        assert_eq!(slot.progress, 100);
        assert!(slot.degraded);
        assert_eq!(storage.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_keeps_progress_monotonic() {
        let storage = Arc::new(MockStorage::new());
        *storage.transfer_fails.lock().unwrap() = true;
        let uploads = setup(storage.clone(), fast_settings()).await;

        uploads.assign(0, photo("a.jpg")).unwrap().await.unwrap();

        let slot = uploads.slot(0).unwrap();
        assert_eq!(slot.status, SlotStatus::Completed);
        assert!(slot.degraded);
    }

    #[tokio::test]
    async fn test_failure_without_simulation_leaves_failed() {
        let storage = Arc::new(MockStorage::failing_grants());
        let settings = UploadConfig {
            simulate_on_failure: false,
            ..fast_settings()
        };
        let uploads = setup(storage, settings).await;

        uploads.assign(0, photo("a.jpg")).unwrap().await.unwrap();

        assert_eq!(uploads.slot(0).unwrap().status, SlotStatus::Failed);
    }

    #[tokio::test]
    async fn test_grant_timeout_degrades() {
        let storage = Arc::new(MockStorage::new());
        *storage.grant_hangs.lock().unwrap() = true;
        let uploads = setup(storage, fast_settings()).await;

        // paused clock auto-advances past the 20s grant deadline
        tokio::time::pause();
        uploads.assign(0, photo("a.jpg")).unwrap().await.unwrap();

        let slot = uploads.slot(0).unwrap();
        assert!(slot.degraded);
        assert_eq!(slot.status, SlotStatus::Completed);
    }

    #[tokio::test]
    async fn test_sequential_reveal() {
        let storage = Arc::new(MockStorage::new());
        let uploads = setup(storage, fast_settings()).await;

        assert_eq!(uploads.visible_slots(), vec![0]);
        assert!(!uploads.is_reachable(1));
        assert_eq!(
            uploads.assign(1, photo("b.jpg")).unwrap_err(),
            UploadError::SlotHidden(1)
        );

        uploads.assign(0, photo("a.jpg")).unwrap().await.unwrap();
        assert!(uploads.is_reachable(1));
        assert!(!uploads.is_reachable(2));
        assert_eq!(uploads.visible_slots(), vec![0, 1]);

        uploads.assign(1, photo("b.jpg")).unwrap().await.unwrap();
        assert_eq!(uploads.visible_slots(), vec![0, 1, 2]);

        uploads.remove(0).unwrap();
        assert!(!uploads.is_reachable(2));
        assert_eq!(uploads.visible_slots(), vec![0, 1]);
        assert!(!uploads.is_reachable(SLOT_COUNT));
    }

    #[tokio::test]
    async fn test_rejected_files_mutate_nothing() {
        let storage = Arc::new(MockStorage::new());
        let settings = UploadConfig {
            max_file_bytes: 10,
            ..fast_settings()
        };
        let uploads = setup(storage.clone(), settings).await;

        assert!(matches!(
            uploads.assign(0, photo("a.gif")),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            uploads.assign(0, photo("a.jpg")),
            Err(UploadError::TooLarge { size: 1024, limit: 10 })
        ));
        assert_eq!(
            uploads.assign(0, PhotoFile::new("a.jpg", Vec::new())).unwrap_err(),
            UploadError::EmptyFile
        );
        assert_eq!(
            uploads.assign(3, photo("a.jpg")).unwrap_err(),
            UploadError::NoSuchSlot(3)
        );

        assert_eq!(uploads.slot(0).unwrap().status, SlotStatus::Empty);
        assert!(storage.get_grant_requests().is_empty());
    }

    #[tokio::test]
    async fn test_remove_mid_upload_discards_late_progress() {
        let storage = Arc::new(MockStorage::paused_at(50));
        let uploads = setup(storage.clone(), fast_settings()).await;

        let paused = storage.paused.notified();
        let handle = uploads.assign(0, photo("a.jpg")).unwrap();
        paused.await;
        assert_eq!(uploads.slot(0).unwrap().progress, 50);

        uploads.remove(0).unwrap();
        storage.release();
        handle.await.unwrap();

        let slot = uploads.slot(0).unwrap();
        assert_eq!(slot.status, SlotStatus::Empty);
        assert_eq!(slot.progress, 0);
        assert!(slot.grant.is_none());
    }

    #[tokio::test]
    async fn test_settle_waits_for_tracked_uploads() {
        let storage = Arc::new(MockStorage::new());
        let uploads = setup(storage, fast_settings()).await;

        uploads.assign_tracked(0, photo("a.jpg")).unwrap();
        uploads.assign_tracked(1, photo("b.webp")).unwrap();
        uploads.settle().await;

        assert!(uploads.slots()[..2].iter().all(UploadSlot::is_completed));
    }
}
