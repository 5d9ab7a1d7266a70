//! Funnel composition root
//!
//! The [`Wizard`] owns every funnel component and is the only thing a front
//! end talks to. Reads are synchronous; the network is only awaited by
//! [`Wizard::start`] and [`Wizard::finalize`].

pub mod selection;
pub mod support;

pub use selection::{Selection, SelectionEvent, SelectionField, SelectionStore};

use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{Backend, StepPatch};
use crate::catalog::{CatalogResolver, CatalogSnapshot, PricePair};
use crate::config::Config;
use crate::lead::{Lead, LeadError};
use crate::session::{FinalizeError, FinalizeSuccess, SessionManager, SessionState};
use crate::state::ClientStore;
use crate::steps::{CompletionEvaluator, CompletionRule, Step, StepGraph, StepId, StepStatus};
use crate::upload::{PhotoFile, UploadError, UploadOrchestrator, UploadSlot};

/// Result of pressing "continue"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Moved(usize),
    /// Current step incomplete; the message is also kept as the transient message
    Blocked(String),
    /// Last step complete; the caller should collect the lead and call `finalize`
    FinalizeRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("step {0} does not exist")]
    OutOfRange(usize),
    #[error("step {index} is locked until step {first_incomplete} is complete")]
    Locked {
        index: usize,
        first_incomplete: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    InvalidLead(#[from] LeadError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

fn blocked_message(rule: CompletionRule) -> &'static str {
    match rule {
        CompletionRule::SizeChosen => "Choose a size to continue",
        CompletionRule::ColorsChosen => "Choose a frame and a background color to continue",
        CompletionRule::Personalized => "Finish personalizing your frame to continue",
        CompletionRule::PhotosUploaded => {
            "Add at least one photo and wait for the upload to finish"
        }
    }
}

pub struct Wizard {
    backend: Backend,
    graph: StepGraph,
    catalog: Arc<CatalogResolver>,
    session: Arc<SessionManager>,
    uploads: UploadOrchestrator,
    selection: SelectionStore,
    current: usize,
    visited: BTreeSet<StepId>,
    message: Option<String>,
    support_template: String,
}

impl Wizard {
    /// Build the funnel; must be called within a tokio runtime
    pub fn new(config: &Config, backend: Backend, store: Arc<dyn ClientStore>) -> Self {
        let session = Arc::new(SessionManager::new(
            backend.sessions.clone(),
            store,
            config.api.origin_url.clone(),
        ));
        let uploads = UploadOrchestrator::new(
            backend.grants.clone(),
            backend.transfer.clone(),
            session.clone(),
            config.upload.clone(),
        );

        Self {
            backend,
            graph: StepGraph::new(config.wizard.layout),
            catalog: Arc::new(CatalogResolver::new()),
            session,
            uploads,
            selection: SelectionStore::new(),
            current: 0,
            visited: BTreeSet::new(),
            message: None,
            support_template: config.wizard.support_message.clone(),
        }
    }

    /// Load the catalog and resolve the session concurrently
    ///
    /// Color defaults are applied as soon as the catalog arrives, even while
    /// the session is still resolving.
    pub async fn start(&mut self) {
        let Self {
            backend,
            catalog,
            session,
            selection,
            ..
        } = self;

        let apply_catalog = async {
            catalog.load(backend.catalog.as_ref()).await;
            let (frame, background) = catalog.default_colors();
            selection.apply_defaults(frame.as_deref(), background.as_deref());
        };
        let ((), session_id) = tokio::join!(apply_catalog, session.resolve_or_create());

        info!(
            offline = self.catalog.is_offline(),
            session = session_id.as_deref().unwrap_or("none"),
            "funnel started"
        );
    }

    /// Fetch the catalog without touching the session or the selection
    pub async fn load_catalog(&self) -> bool {
        self.catalog.load(self.backend.catalog.as_ref()).await
    }

    // --- components ---

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn catalog(&self) -> &CatalogResolver {
        &self.catalog
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn uploads(&self) -> &UploadOrchestrator {
        &self.uploads
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    // --- gating ---

    fn evaluate<R>(&self, f: impl FnOnce(&CompletionEvaluator<'_>) -> R) -> R {
        let slots = self.uploads.slots();
        let evaluator = CompletionEvaluator::new(&self.graph, self.selection.selection(), &slots);
        f(&evaluator)
    }

    pub fn is_complete(&self, id: StepId) -> bool {
        self.evaluate(|e| e.is_complete(id))
    }

    pub fn can_access(&self, index: usize) -> bool {
        self.evaluate(|e| e.can_access(index))
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.evaluate(|e| e.statuses())
    }

    /// Apply a navigation route; unknown or gated routes redirect
    pub fn navigate(&mut self, route: Option<&str>) -> usize {
        let requested = route.and_then(|r| self.graph.index_of_route(r));
        self.current = self.evaluate(|e| e.resolve(requested));
        debug!(?route, index = self.current, "navigated");
        self.current
    }

    /// Index of the step to show, re-checked against current gating
    pub fn current_index(&self) -> usize {
        self.evaluate(|e| e.resolve(Some(self.current)))
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.graph.get(self.current_index())
    }

    pub fn visited(&self) -> Vec<StepId> {
        self.visited.iter().copied().collect()
    }

    pub fn transient_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn advance(&mut self) -> AdvanceOutcome {
        let index = self.current_index();
        let Some(step) = self.graph.get(index) else {
            return AdvanceOutcome::Blocked(String::new());
        };

        if !self.evaluate(|e| e.is_index_complete(index)) {
            let message = blocked_message(step.rule).to_string();
            debug!(step = %step.id, "advance blocked");
            self.message = Some(message.clone());
            return AdvanceOutcome::Blocked(message);
        }

        self.message = None;
        self.visited.insert(step.id);
        if self.graph.is_last(index) {
            return AdvanceOutcome::FinalizeRequested;
        }

        self.current = index + 1;
        AdvanceOutcome::Moved(self.current)
    }

    /// Go to the previous step; `None` on the first step
    pub fn back(&mut self) -> Option<usize> {
        let index = self.current_index();
        if index == 0 {
            return None;
        }
        self.current = index - 1;
        Some(self.current)
    }

    pub fn step_click(&mut self, index: usize) -> Result<usize, NavigationError> {
        if index >= self.graph.len() {
            return Err(NavigationError::OutOfRange(index));
        }
        let (accessible, first_incomplete) =
            self.evaluate(|e| (e.can_access(index), e.redirect_target()));
        if !accessible {
            return Err(NavigationError::Locked {
                index,
                first_incomplete,
            });
        }
        self.current = index;
        Ok(index)
    }

    // --- selection ---

    pub fn selection(&self) -> &Selection {
        self.selection.selection()
    }

    pub fn history(&self) -> &[SelectionEvent] {
        self.selection.history()
    }

    fn sync(&self, patch: Option<StepPatch>) {
        if let Some(patch) = patch {
            self.session.update_step(patch);
        }
    }

    pub fn set_size(&mut self, size: &str) {
        let patch = self.selection.set_size(size);
        self.sync(patch);
    }

    pub fn set_frame(&mut self, prefix: &str) {
        let patch = self.selection.set_frame(prefix);
        self.sync(patch);
    }

    pub fn set_background(&mut self, name: &str) {
        let patch = self.selection.set_background(name);
        self.sync(patch);
    }

    // --- photos ---

    /// Put a photo in a slot and start its upload
    pub fn assign_photo(&mut self, index: usize, file: PhotoFile) -> Result<(), UploadError> {
        self.uploads.assign_tracked(index, file)?;
        self.message = None;
        Ok(())
    }

    pub fn remove_photo(&mut self, index: usize) -> Result<(), UploadError> {
        self.uploads.remove(index)
    }

    pub fn slots(&self) -> Vec<UploadSlot> {
        self.uploads.slots()
    }

    pub fn visible_slots(&self) -> Vec<usize> {
        self.uploads.visible_slots()
    }

    /// Wait for every started upload to finish
    pub async fn settle_uploads(&self) {
        self.uploads.settle().await;
    }

    // --- catalog reads ---

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog.snapshot()
    }

    pub fn price(&self) -> PricePair {
        self.catalog.resolve_price(self.selection().size.as_deref())
    }

    pub fn mockup(&self) -> Option<String> {
        self.catalog.resolve_mockup(self.selection())
    }

    pub fn is_offline(&self) -> bool {
        self.catalog.is_offline()
    }

    /// WhatsApp help link mentioning the current size and frame
    pub fn support_link(&self) -> anyhow::Result<Url> {
        let snapshot = self.catalog.snapshot();
        let selection = self.selection();
        let size_label = selection.size.as_ref().map(|s| format!("{}cm", s));
        let frame_label = selection.frame.as_deref().map(|prefix| {
            snapshot
                .frame(prefix)
                .map(|f| f.display_name_pt.clone().unwrap_or_else(|| f.name.clone()))
                .unwrap_or_else(|| prefix.to_string())
        });

        support::support_link(
            &snapshot.support_contact,
            &self.support_template,
            size_label.as_deref(),
            frame_label.as_deref(),
        )
    }

    // --- submission ---

    /// Validate and submit the lead, resolving a session first if needed
    pub async fn finalize(&mut self, lead: &Lead) -> Result<FinalizeSuccess, SubmitError> {
        lead.validate()?;
        if !self.session.is_active() {
            self.session.resolve_or_create().await;
        }
        Ok(self.session.finalize(lead).await?)
    }

    /// Wait until queued step updates have been sent
    pub async fn flush(&self) {
        self.session.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::mock::{MockCatalogSource, MockSessionService, MockStorage};
    use crate::state::MemoryStore;
    use crate::steps::StepLayout;

    struct Harness {
        wizard: Wizard,
        sessions: Arc<MockSessionService>,
    }

    async fn harness(layout: StepLayout) -> Harness {
        let sessions = Arc::new(MockSessionService::new());
        let storage = Arc::new(MockStorage::new());
        let backend = Backend {
            catalog: Arc::new(MockCatalogSource::new(MockCatalogSource::sample())),
            sessions: sessions.clone(),
            grants: storage.clone(),
            transfer: storage,
        };
        let mut config = Config::default();
        config.wizard.layout = layout;
        config.upload.tick_ms = 1;

        let mut wizard = Wizard::new(&config, backend, Arc::new(MemoryStore::new()));
        wizard.start().await;
        Harness { wizard, sessions }
    }

    #[tokio::test]
    async fn test_start_applies_catalog_defaults() {
        let h = harness(StepLayout::Combined).await;
        let selection = h.wizard.selection();
        assert_eq!(selection.frame.as_deref(), Some("preto"));
        assert_eq!(selection.background.as_deref(), Some("azul"));
        assert_eq!(selection.size, None);
        assert!(h.wizard.history().is_empty());
        assert!(h.wizard.session().is_active());
    }

    #[tokio::test]
    async fn test_defaults_do_not_wait_on_session() {
        let sessions = Arc::new(MockSessionService::new());
        sessions.set_latency(Duration::from_secs(3600));
        let storage = Arc::new(MockStorage::new());
        let backend = Backend {
            catalog: Arc::new(MockCatalogSource::new(MockCatalogSource::sample())),
            sessions,
            grants: storage.clone(),
            transfer: storage,
        };
        let mut wizard = Wizard::new(&Config::default(), backend, Arc::new(MemoryStore::new()));

        let started = tokio::time::timeout(Duration::from_millis(200), wizard.start()).await;

        assert!(started.is_err());
        assert!(!wizard.catalog().is_loading());
        assert_eq!(wizard.selection().frame.as_deref(), Some("preto"));
        assert_eq!(wizard.selection().background.as_deref(), Some("azul"));
        assert!(!wizard.session().is_active());
    }

    #[tokio::test]
    async fn test_visited_steps_in_funnel_order() {
        let mut h = harness(StepLayout::Split).await;
        h.wizard.set_size("20x30");
        assert_eq!(h.wizard.advance(), AdvanceOutcome::Moved(1));
        assert_eq!(h.wizard.advance(), AdvanceOutcome::Moved(2));
        assert_eq!(h.wizard.back(), Some(1));
        assert_eq!(h.wizard.advance(), AdvanceOutcome::Moved(2));

        assert_eq!(h.wizard.visited(), vec![StepId::Size, StepId::Colors]);
    }

    #[tokio::test]
    async fn test_advance_blocked_sets_message() {
        let mut h = harness(StepLayout::Combined).await;

        let outcome = h.wizard.advance();
        assert!(matches!(outcome, AdvanceOutcome::Blocked(_)));
        assert!(h.wizard.transient_message().is_some());
        assert_eq!(h.wizard.current_index(), 0);

        h.wizard.set_size("30x40");
        assert_eq!(h.wizard.advance(), AdvanceOutcome::Moved(1));
        assert_eq!(h.wizard.transient_message(), None);
        assert_eq!(h.wizard.visited(), vec![StepId::Personalization]);
    }

    #[tokio::test]
    async fn test_step_click_respects_gating() {
        let mut h = harness(StepLayout::Split).await;

        assert_eq!(
            h.wizard.step_click(2),
            Err(NavigationError::Locked {
                index: 2,
                first_incomplete: 0
            })
        );
        assert_eq!(h.wizard.step_click(7), Err(NavigationError::OutOfRange(7)));

        h.wizard.set_size("20x30");
        // colors already defaulted from the catalog
        assert_eq!(h.wizard.step_click(2), Ok(2));
        assert_eq!(h.wizard.back(), Some(1));
        assert_eq!(h.wizard.back(), Some(0));
        assert_eq!(h.wizard.back(), None);
    }

    #[tokio::test]
    async fn test_navigate_redirects_gated_route() {
        let mut h = harness(StepLayout::Combined).await;

        assert_eq!(h.wizard.navigate(Some("/upload")), 0);
        assert_eq!(h.wizard.navigate(Some("/nowhere")), 0);
        assert_eq!(h.wizard.navigate(None), 0);

        h.wizard.set_size("30x40");
        assert_eq!(h.wizard.navigate(Some("/upload")), 1);
        assert_eq!(h.wizard.current_step().map(|s| s.id), Some(StepId::Upload));
    }

    #[tokio::test]
    async fn test_setters_sync_step_patches() {
        let mut h = harness(StepLayout::Split).await;

        h.wizard.set_size("30x40");
        h.wizard.set_frame("branco");
        h.wizard.flush().await;

        let keys: Vec<&str> = h
            .sessions
            .get_updates()
            .iter()
            .map(|(_, p)| p.step_key())
            .collect();
        assert_eq!(keys, vec!["SIZE", "COLORS"]);
    }

    #[tokio::test]
    async fn test_price_and_mockup_follow_selection() {
        let mut h = harness(StepLayout::Combined).await;
        assert_eq!(h.wizard.price().price, 49.9);
        assert_eq!(h.wizard.mockup(), None);

        h.wizard.set_size("30x40");
        assert_eq!(h.wizard.price().promo_price, 59.9);
        assert!(h.wizard.mockup().is_some());
        assert!(!h.wizard.is_offline());
    }

    #[tokio::test]
    async fn test_support_link_mentions_selection() {
        let mut h = harness(StepLayout::Combined).await;
        h.wizard.set_size("30x40");

        let url = h.wizard.support_link().unwrap();
        assert!(url.as_str().starts_with("https://wa.me/351912345678?text="));
        let text = url.query_pairs().next().unwrap().1.into_owned();
        assert!(text.contains("30x40cm"));
        assert!(text.contains("Preto"));
    }

    #[tokio::test]
    async fn test_assign_clears_message() {
        let mut h = harness(StepLayout::Combined).await;
        h.wizard.set_size("30x40");
        h.wizard.advance();

        assert!(matches!(h.wizard.advance(), AdvanceOutcome::Blocked(_)));
        h.wizard
            .assign_photo(0, PhotoFile::new("a.jpg", vec![1, 2, 3]))
            .unwrap();
        assert_eq!(h.wizard.transient_message(), None);

        h.wizard.settle_uploads().await;
        assert_eq!(h.wizard.advance(), AdvanceOutcome::FinalizeRequested);
    }

    #[tokio::test]
    async fn test_invalid_lead_is_not_submitted() {
        let mut h = harness(StepLayout::Combined).await;
        let lead = Lead::email("Ana", "Silva", "not-an-email");

        let err = h.wizard.finalize(&lead).await.unwrap_err();
        assert!(matches!(err, SubmitError::InvalidLead(LeadError::InvalidEmail(_))));
        assert!(h.sessions.get_finalized().is_empty());
    }
}
