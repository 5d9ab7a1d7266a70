//! Catalog source trait and raw row types
//!
//! Rows arrive loosely typed from the backend; `catalog::CatalogSnapshot`
//! validates them into strict values before anything else sees them.

use async_trait::async_trait;
use serde::Deserialize;

use crate::api::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct RawSize {
    pub size: Option<String>,
    pub label: Option<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub promo_price: Option<f64>,
    pub discount: Option<f64>,
    pub bg_img: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFrameColor {
    pub id: Option<serde_json::Value>,
    pub name: Option<String>,
    pub prefix: Option<String>,
    pub hex: Option<String>,
    pub display_order: Option<i64>,
    pub display_name_pt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBackgroundColor {
    pub name: Option<String>,
    pub hex: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMockupVariant {
    pub size: Option<String>,
    pub frame_prefix: Option<String>,
    pub background_name: Option<String>,
    pub image_url: Option<String>,
}

/// Everything one catalog read returns
#[derive(Debug, Clone, Default)]
pub struct RawCatalog {
    pub sizes: Vec<RawSize>,
    pub frame_colors: Vec<RawFrameColor>,
    pub background_colors: Vec<RawBackgroundColor>,
    pub mockup_variants: Vec<RawMockupVariant>,
    /// `support_whatsapp` setting, if the backend has one
    pub support_contact: Option<String>,
}

/// Trait for the remote product catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &str;

    /// Read all active catalog rows
    async fn fetch(&self) -> Result<RawCatalog, ApiError>;
}
