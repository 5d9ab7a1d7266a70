//! Upload grant service and file transfer traits

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::upload::PhotoFile;

/// Receives transfer progress as a percentage (0..=100)
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// How a grant authorizes the transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantTarget {
    /// Pre-signed URL accepting a direct PUT
    SignedUrl(String),
    /// Upload token for the object path
    Token(String),
}

/// Short-lived credential for one client-to-storage transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadGrant {
    pub index: usize,
    pub path: String,
    pub target: GrantTarget,
}

/// One file requested in a grant call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantRequest {
    pub ext: String,
}

/// Wire row from `create_upload_urls`
#[derive(Debug, Deserialize)]
pub struct GrantRow {
    pub idx: usize,
    pub path: String,
    #[serde(default)]
    pub signed_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl TryFrom<GrantRow> for UploadGrant {
    type Error = String;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        let target = match (row.signed_url, row.token) {
            (Some(url), _) if !url.is_empty() => GrantTarget::SignedUrl(url),
            (_, Some(token)) if !token.is_empty() => GrantTarget::Token(token),
            _ => return Err(format!("grant {} carries neither signed_url nor token", row.idx)),
        };
        if row.path.is_empty() {
            return Err(format!("grant {} has an empty path", row.idx));
        }
        Ok(UploadGrant {
            index: row.idx,
            path: row.path,
            target,
        })
    }
}

/// Trait for the service issuing per-file upload grants
#[async_trait]
pub trait UploadGrantService: Send + Sync {
    fn name(&self) -> &str;

    /// Request one grant per file, scoped to the session
    async fn create_upload_grants(
        &self,
        session_id: &str,
        files: &[GrantRequest],
    ) -> Result<Vec<UploadGrant>, ApiError>;
}

/// Trait for the primitive that moves file bytes using a grant
#[async_trait]
pub trait FileTransfer: Send + Sync {
    fn name(&self) -> &str;

    /// Transfer the file, reporting progress proportional to bytes sent
    async fn transfer(
        &self,
        grant: &UploadGrant,
        file: &PhotoFile,
        progress: ProgressSink,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(signed_url: Option<&str>, token: Option<&str>) -> GrantRow {
        GrantRow {
            idx: 0,
            path: "sessions/s1/0.jpg".to_string(),
            signed_url: signed_url.map(str::to_string),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_grant_prefers_signed_url() {
        let grant = UploadGrant::try_from(row(Some("https://x/put"), Some("tok"))).unwrap();
        assert_eq!(grant.target, GrantTarget::SignedUrl("https://x/put".to_string()));
    }

    #[test]
    fn test_grant_falls_back_to_token() {
        let grant = UploadGrant::try_from(row(Some(""), Some("tok"))).unwrap();
        assert_eq!(grant.target, GrantTarget::Token("tok".to_string()));
    }

    #[test]
    fn test_grant_without_credential_rejected() {
        assert!(UploadGrant::try_from(row(None, None)).is_err());
    }
}
