//! Session service trait and wire types
//!
//! The session service tracks a visitor's progress through the funnel on the
//! backend. Its record is advisory; local gating never reads it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::error::ApiError;

/// Remote lifecycle of a tracked session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Session is open and may be reused
    Start,
    /// A lead was submitted for this session
    Finalized,
    /// Any other backend state (abandoned, expired, ...)
    Other(String),
}

impl LifecycleStatus {
    /// Parse a backend status string, case-insensitive
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "START" | "STARTED" => LifecycleStatus::Start,
            "FINALIZED" => LifecycleStatus::Finalized,
            _ => LifecycleStatus::Other(raw.to_string()),
        }
    }

    pub fn is_reusable(&self) -> bool {
        matches!(self, LifecycleStatus::Start)
    }
}

impl<'de> Deserialize<'de> for LifecycleStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(LifecycleStatus::parse(&raw))
    }
}

/// Authoritative session state as reported by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub lifecycle_status: LifecycleStatus,
    #[serde(default)]
    pub entry_number: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Step telemetry patch, keyed by the step that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "current_step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPatch {
    Size {
        size: String,
    },
    Colors {
        frame_prefix: String,
        background_name: String,
    },
    Upload,
}

impl StepPatch {
    /// Wire tag for this patch
    pub fn step_key(&self) -> &'static str {
        match self {
            StepPatch::Size { .. } => "SIZE",
            StepPatch::Colors { .. } => "COLORS",
            StepPatch::Upload => "UPLOAD",
        }
    }
}

/// Body of `update_session_step`
#[derive(Debug, Serialize)]
pub struct StepUpdateRequest<'a> {
    pub session_id: &'a str,
    #[serde(flatten)]
    pub patch: &'a StepPatch,
}

/// Body of `finalize_session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizePayload {
    pub session_id: String,
    pub first_name: String,
    pub last_name: String,
    pub whatsapp_full: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub dial_code: Option<String>,
    pub whatsapp_number: Option<String>,
}

/// Successful `finalize_session` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeReceipt {
    #[serde(default)]
    pub entry_number: Option<u64>,
    #[serde(default)]
    pub lifecycle_status: Option<String>,
}

/// Trait for the remote session tracking service
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    /// Create a new remote session for the given origin URL, returning its id
    async fn create_session(&self, origin_url: &str) -> Result<String, ApiError>;

    /// Record step progress for a session
    async fn update_session_step(&self, session_id: &str, patch: &StepPatch)
        -> Result<(), ApiError>;

    /// Read the authoritative state of a session
    async fn session_status(&self, session_id: &str) -> Result<SessionRecord, ApiError>;

    /// Submit the lead and close the session
    async fn finalize_session(&self, payload: &FinalizePayload)
        -> Result<FinalizeReceipt, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_parse() {
        assert_eq!(LifecycleStatus::parse("START"), LifecycleStatus::Start);
        assert_eq!(LifecycleStatus::parse("finalized"), LifecycleStatus::Finalized);
        assert_eq!(
            LifecycleStatus::parse("ABANDONED"),
            LifecycleStatus::Other("ABANDONED".to_string())
        );
        assert!(!LifecycleStatus::parse("ABANDONED").is_reusable());
    }

    #[test]
    fn test_step_update_serializes_tagged() {
        let patch = StepPatch::Colors {
            frame_prefix: "preto".to_string(),
            background_name: "azul".to_string(),
        };
        let body = serde_json::to_value(StepUpdateRequest {
            session_id: "abc",
            patch: &patch,
        })
        .unwrap();

        assert_eq!(body["session_id"], "abc");
        assert_eq!(body["current_step"], "COLORS");
        assert_eq!(body["frame_prefix"], "preto");
        assert_eq!(body["background_name"], "azul");
    }

    #[test]
    fn test_upload_patch_has_only_tag() {
        let body = serde_json::to_value(StepUpdateRequest {
            session_id: "abc",
            patch: &StepPatch::Upload,
        })
        .unwrap();
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(body["current_step"], "UPLOAD");
        assert_eq!(StepPatch::Upload.step_key(), "UPLOAD");
    }

    #[test]
    fn test_session_record_deserialize() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"session_id":"s1","lifecycle_status":"FINALIZED","entry_number":42}"#,
        )
        .unwrap();
        assert_eq!(record.lifecycle_status, LifecycleStatus::Finalized);
        assert_eq!(record.entry_number, Some(42));
        assert!(record.created_at.is_none());
    }
}
