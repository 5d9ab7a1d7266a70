//! Live catalog holder with offline fallback, price and mockup lookups

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{info, warn};

use super::CatalogSnapshot;
use crate::api::CatalogSource;
use crate::wizard::Selection;

/// Price shown while running on the fallback catalog
const OFFLINE_PRICE: PricePair = PricePair {
    price: 49.9,
    promo_price: 39.9,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePair {
    pub price: f64,
    pub promo_price: f64,
}

#[derive(Debug)]
struct CatalogState {
    snapshot: Arc<CatalogSnapshot>,
    loading: bool,
    offline: bool,
    error: Option<String>,
}

/// Holds the current catalog snapshot and answers price and preview lookups
#[derive(Debug)]
pub struct CatalogResolver {
    state: RwLock<CatalogState>,
}

impl Default for CatalogResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogResolver {
    /// Start on the fallback snapshot, marked as loading
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState {
                snapshot: Arc::new(CatalogSnapshot::fallback()),
                loading: true,
                offline: false,
                error: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch and install a snapshot; on any failure install the fallback
    ///
    /// Returns true when the remote catalog was installed.
    pub async fn load(&self, source: &dyn CatalogSource) -> bool {
        self.write().loading = true;

        let result = source
            .fetch()
            .await
            .map_err(|e| e.to_string())
            .and_then(|raw| CatalogSnapshot::from_raw(raw).map_err(|e| e.to_string()));

        let mut state = self.write();
        state.loading = false;
        match result {
            Ok(snapshot) => {
                info!(
                    source = source.name(),
                    sizes = snapshot.sizes.len(),
                    mockups = snapshot.mockup_variants.len(),
                    "catalog loaded"
                );
                state.snapshot = Arc::new(snapshot);
                state.offline = false;
                state.error = None;
                true
            }
            Err(error) => {
                warn!(source = source.name(), error = %error, "catalog unavailable, using fallback");
                state.snapshot = Arc::new(CatalogSnapshot::fallback());
                state.offline = true;
                state.error = Some(error);
                false
            }
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.read().snapshot.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn is_offline(&self) -> bool {
        self.read().offline
    }

    pub fn load_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Price pair for a size id; unknown or missing sizes use the first entry
    pub fn resolve_price(&self, size: Option<&str>) -> PricePair {
        let state = self.read();
        if state.offline {
            return OFFLINE_PRICE;
        }
        let sizes = &state.snapshot.sizes;
        size.and_then(|id| sizes.iter().find(|s| s.id == id))
            .or_else(|| sizes.first())
            .map(|s| PricePair {
                price: s.price,
                promo_price: s.promo_price,
            })
            .unwrap_or(OFFLINE_PRICE)
    }

    /// Authored preview image for the exact size/frame/background combination
    pub fn resolve_mockup(&self, selection: &Selection) -> Option<String> {
        let size = selection.size.as_deref()?;
        let (frame, background) = selection.colors()?;
        self.read()
            .snapshot
            .mockup_variants
            .iter()
            .find(|m| m.matches(size, frame, background))
            .map(|m| m.image_url.clone())
    }

    /// First frame prefix and first background name, if any
    pub fn default_colors(&self) -> (Option<String>, Option<String>) {
        let state = self.read();
        (
            state.snapshot.frame_colors.first().map(|f| f.prefix.clone()),
            state.snapshot.background_colors.first().map(|b| b.name.clone()),
        )
    }

    pub fn support_contact(&self) -> String {
        self.read().snapshot.support_contact.clone()
    }
}
