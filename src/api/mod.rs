//! Backend collaborator interfaces and their implementations
//!
//! This module provides:
//! - Traits for the catalog source, session service, upload grants and file transfer
//! - An HTTP backend implementing all of them
//! - In-process mocks for tests and offline runs
//! - Error handling shared by every collaborator

pub mod catalog;
pub mod error;
pub mod http;
pub mod mock;
pub mod session;
pub mod storage;

pub use catalog::{CatalogSource, RawCatalog};
pub use error::ApiError;
pub use http::HttpBackend;
pub use session::{
    FinalizePayload, FinalizeReceipt, LifecycleStatus, SessionRecord, SessionService, StepPatch,
};
pub use storage::{
    FileTransfer, GrantRequest, GrantTarget, ProgressSink, UploadGrant, UploadGrantService,
};

use std::sync::Arc;

use crate::config::ApiConfig;
use mock::{MockCatalogSource, MockSessionService, MockStorage};

/// The set of collaborators the funnel talks to
///
/// Built once at startup and handed to the wizard; every field is a trait
/// object so tests and offline runs can swap implementations.
#[derive(Clone)]
pub struct Backend {
    pub catalog: Arc<dyn CatalogSource>,
    pub sessions: Arc<dyn SessionService>,
    pub grants: Arc<dyn UploadGrantService>,
    pub transfer: Arc<dyn FileTransfer>,
}

impl Backend {
    /// Build the HTTP backend from configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Arc::new(HttpBackend::new(config)?);
        Ok(Self {
            catalog: http.clone(),
            sessions: http.clone(),
            grants: http.clone(),
            transfer: http,
        })
    }

    /// Backend with no reachable services: the catalog falls back, sessions
    /// are unavailable and uploads run in degraded mode
    pub fn offline() -> Self {
        let storage = Arc::new(MockStorage::failing_grants());
        Self {
            catalog: Arc::new(MockCatalogSource::failing()),
            sessions: Arc::new(MockSessionService::unavailable()),
            grants: storage.clone(),
            transfer: storage,
        }
    }

    /// Build from configuration, falling back to offline when not configured
    pub fn from_config_or_offline(config: &ApiConfig) -> Self {
        match Self::from_config(config) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "backend not available, running offline");
                Self::offline()
            }
        }
    }

    /// Get a summary of the configured collaborators
    pub fn summary(&self) -> String {
        format!(
            "catalog: {}, sessions: {}, grants: {}, transfer: {}",
            self.catalog.name(),
            self.sessions.name(),
            self.grants.name(),
            self.transfer.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_falls_back_offline() {
        let backend = Backend::from_config_or_offline(&ApiConfig::default());
        assert_eq!(
            backend.summary(),
            "catalog: mock, sessions: mock, grants: mock, transfer: mock"
        );
    }

    #[test]
    fn test_configured_uses_http() {
        let config = ApiConfig {
            base_url: "https://example.supabase.co".to_string(),
            anon_key: "anon".to_string(),
            ..ApiConfig::default()
        };
        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.sessions.name(), "supabase");
    }
}
