//! Product catalog snapshot
//!
//! Raw rows from a [`CatalogSource`](crate::api::CatalogSource) are validated
//! into strict values here. A snapshot is always complete: either every row
//! of one load passed validation, or the built-in fallback is used.

pub mod resolver;

pub use resolver::{CatalogResolver, PricePair};

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::api::catalog::{RawBackgroundColor, RawFrameColor, RawMockupVariant, RawSize};
use crate::api::RawCatalog;

/// Support contact used when the backend has none
pub const FALLBACK_SUPPORT_CONTACT: &str = "+351913954511";

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap());

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("{table} row {row} is missing '{field}'")]
    MissingField {
        table: &'static str,
        row: usize,
        field: &'static str,
    },
    #[error("{table} '{key}' has invalid color '{value}'")]
    InvalidHex {
        table: &'static str,
        key: String,
        value: String,
    },
    #[error("size '{size}' has a negative price")]
    NegativePrice { size: String },
    #[error("size '{size}' promo price {promo_price} exceeds price {price}")]
    PromoAbovePrice {
        size: String,
        price: f64,
        promo_price: f64,
    },
    #[error("{table} has duplicate entry '{key}'")]
    Duplicate { table: &'static str, key: String },
    #[error("{0} is empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeOption {
    pub id: String,
    pub label: String,
    pub name: String,
    pub price: f64,
    pub promo_price: f64,
    /// Percent
    pub discount: f64,
    pub card_image: Option<String>,
    pub display_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameColor {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub hex: String,
    pub display_order: i64,
    pub display_name_pt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundColor {
    pub name: String,
    pub hex: String,
    pub display_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MockupVariant {
    pub size: String,
    pub frame_prefix: String,
    pub background_name: String,
    pub image_url: String,
}

impl MockupVariant {
    pub fn matches(&self, size: &str, frame_prefix: &str, background_name: &str) -> bool {
        self.size == size && self.frame_prefix == frame_prefix && self.background_name == background_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSnapshot {
    pub sizes: Vec<SizeOption>,
    pub frame_colors: Vec<FrameColor>,
    pub background_colors: Vec<BackgroundColor>,
    pub mockup_variants: Vec<MockupVariant>,
    pub support_contact: String,
}

fn required(
    value: Option<String>,
    table: &'static str,
    row: usize,
    field: &'static str,
) -> Result<String, CatalogError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CatalogError::MissingField { table, row, field }),
    }
}

fn checked_hex(table: &'static str, key: &str, hex: String) -> Result<String, CatalogError> {
    if HEX_COLOR.is_match(&hex) {
        Ok(hex)
    } else {
        Err(CatalogError::InvalidHex {
            table,
            key: key.to_string(),
            value: hex,
        })
    }
}

fn check_unique(
    table: &'static str,
    keys: impl IntoIterator<Item = String>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(CatalogError::Duplicate { table, key });
        }
    }
    Ok(())
}

fn parse_size(row: usize, raw: RawSize) -> Result<SizeOption, CatalogError> {
    const TABLE: &str = "sizes";
    let id = required(raw.size, TABLE, row, "size")?;
    let price = raw.price.ok_or(CatalogError::MissingField {
        table: TABLE,
        row,
        field: "price",
    })?;
    let promo_price = raw.promo_price.ok_or(CatalogError::MissingField {
        table: TABLE,
        row,
        field: "promo_price",
    })?;

    if price < 0.0 || promo_price < 0.0 {
        return Err(CatalogError::NegativePrice { size: id });
    }
    if promo_price > price {
        return Err(CatalogError::PromoAbovePrice {
            size: id,
            price,
            promo_price,
        });
    }

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| id.clone());
    Ok(SizeOption {
        label: raw
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| name.clone()),
        name,
        price,
        promo_price,
        discount: raw.discount.unwrap_or(0.0),
        card_image: raw.bg_img.filter(|s| !s.is_empty()),
        display_order: raw.display_order.unwrap_or(0),
        id,
    })
}

fn parse_frame(row: usize, raw: RawFrameColor) -> Result<FrameColor, CatalogError> {
    const TABLE: &str = "frame_colors";
    let prefix = required(raw.prefix, TABLE, row, "prefix")?;
    let name = required(raw.name, TABLE, row, "name")?;
    let hex = checked_hex(TABLE, &prefix, required(raw.hex, TABLE, row, "hex")?)?;
    let id = match raw.id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => prefix.clone(),
    };
    Ok(FrameColor {
        id,
        name,
        prefix,
        hex,
        display_order: raw.display_order.unwrap_or(0),
        display_name_pt: raw.display_name_pt.filter(|s| !s.is_empty()),
    })
}

fn parse_background(row: usize, raw: RawBackgroundColor) -> Result<BackgroundColor, CatalogError> {
    const TABLE: &str = "background_colors";
    let name = required(raw.name, TABLE, row, "name")?;
    let hex = checked_hex(TABLE, &name, required(raw.hex, TABLE, row, "hex")?)?;
    Ok(BackgroundColor {
        name,
        hex,
        display_order: raw.display_order.unwrap_or(0),
    })
}

fn parse_mockup(row: usize, raw: RawMockupVariant) -> Result<MockupVariant, CatalogError> {
    const TABLE: &str = "mockup_variants";
    Ok(MockupVariant {
        size: required(raw.size, TABLE, row, "size")?,
        frame_prefix: required(raw.frame_prefix, TABLE, row, "frame_prefix")?,
        background_name: required(raw.background_name, TABLE, row, "background_name")?,
        image_url: required(raw.image_url, TABLE, row, "image_url")?,
    })
}

impl CatalogSnapshot {
    /// Validate a raw catalog; any bad row rejects the whole load
    pub fn from_raw(raw: RawCatalog) -> Result<Self, CatalogError> {
        let mut sizes = raw
            .sizes
            .into_iter()
            .enumerate()
            .map(|(i, r)| parse_size(i, r))
            .collect::<Result<Vec<_>, _>>()?;
        let mut frame_colors = raw
            .frame_colors
            .into_iter()
            .enumerate()
            .map(|(i, r)| parse_frame(i, r))
            .collect::<Result<Vec<_>, _>>()?;
        let mut background_colors = raw
            .background_colors
            .into_iter()
            .enumerate()
            .map(|(i, r)| parse_background(i, r))
            .collect::<Result<Vec<_>, _>>()?;
        let mockup_variants = raw
            .mockup_variants
            .into_iter()
            .enumerate()
            .map(|(i, r)| parse_mockup(i, r))
            .collect::<Result<Vec<_>, _>>()?;

        if sizes.is_empty() {
            return Err(CatalogError::Empty("sizes"));
        }
        if frame_colors.is_empty() {
            return Err(CatalogError::Empty("frame_colors"));
        }
        if background_colors.is_empty() {
            return Err(CatalogError::Empty("background_colors"));
        }

        check_unique("sizes", sizes.iter().map(|s| s.id.clone()))?;
        check_unique("frame_colors", frame_colors.iter().map(|f| f.prefix.clone()))?;
        check_unique(
            "background_colors",
            background_colors.iter().map(|b| b.name.clone()),
        )?;
        check_unique(
            "mockup_variants",
            mockup_variants
                .iter()
                .map(|m| format!("{}/{}/{}", m.size, m.frame_prefix, m.background_name)),
        )?;

        // sort_by_key is stable, so equal orders keep the upstream order
        sizes.sort_by_key(|s| s.display_order);
        frame_colors.sort_by_key(|f| f.display_order);
        background_colors.sort_by_key(|b| b.display_order);

        let support_contact = raw
            .support_contact
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SUPPORT_CONTACT.to_string());

        Ok(Self {
            sizes,
            frame_colors,
            background_colors,
            mockup_variants,
            support_contact,
        })
    }

    /// Built-in catalog used whenever a load fails
    pub fn fallback() -> Self {
        let size = |id: &str, label: &str, price: f64, promo_price: f64, order: i64| SizeOption {
            id: id.to_string(),
            label: label.to_string(),
            name: id.to_string(),
            price,
            promo_price,
            discount: 20.0,
            card_image: None,
            display_order: order,
        };
        let frame = |order: i64, name: &str, prefix: &str, hex: &str, pt: &str| FrameColor {
            id: order.to_string(),
            name: name.to_string(),
            prefix: prefix.to_string(),
            hex: hex.to_string(),
            display_order: order,
            display_name_pt: Some(pt.to_string()),
        };
        let background = |name: &str, hex: &str, order: i64| BackgroundColor {
            name: name.to_string(),
            hex: hex.to_string(),
            display_order: order,
        };

        Self {
            sizes: vec![
                size("20x30", "Discreto", 49.9, 39.9, 1),
                size("30x40", "Equilibrado", 74.9, 59.9, 2),
                size("40x50", "Impactante", 99.9, 79.9, 3),
                size("70x50", "Marcante", 124.9, 99.9, 4),
            ],
            frame_colors: vec![
                frame(1, "Preto", "preto", "#1a1a1a", "Preta"),
                frame(2, "Branco", "branco", "#ffffff", "Branca"),
            ],
            background_colors: vec![
                background("azul", "#4A7FB5", 1),
                background("amarelo", "#E8C840", 2),
                background("taupe", "#B8A99A", 3),
                background("rosa", "#E8A0BF", 4),
                background("laranja", "#E8813A", 5),
                background("cinza", "#9CA3AF", 6),
            ],
            mockup_variants: Vec::new(),
            support_contact: FALLBACK_SUPPORT_CONTACT.to_string(),
        }
    }

    pub fn size(&self, id: &str) -> Option<&SizeOption> {
        self.sizes.iter().find(|s| s.id == id)
    }

    pub fn frame(&self, prefix: &str) -> Option<&FrameColor> {
        self.frame_colors.iter().find(|f| f.prefix == prefix)
    }

    pub fn background(&self, name: &str) -> Option<&BackgroundColor> {
        self.background_colors.iter().find(|b| b.name == name)
    }
}
