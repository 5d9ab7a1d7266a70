//! frame-builder - Step-gated product configuration funnel
//!
//! The library drives a visitor through size, color and photo steps, keeps a
//! resumable session in sync with a tracking backend, uploads photos with a
//! simulated fallback, and prices the selection from a remote catalog.

pub mod api;
pub mod catalog;
pub mod config;
pub mod lead;
pub mod logging;
pub mod session;
pub mod state;
pub mod steps;
pub mod upload;
pub mod wizard;

pub use api::Backend;
pub use config::Config;
pub use lead::{Contact, Lead};
pub use wizard::{AdvanceOutcome, Wizard};
