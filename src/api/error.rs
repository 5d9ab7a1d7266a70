//! Collaborator error types shared by the catalog, session and storage services

use std::fmt;

/// Errors that can occur when talking to a backend collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401 or 403 - anon key missing, invalid or lacking permission
    Unauthorized { provider: String, status: u16 },
    /// 409 Conflict - the remote record is already in a state that rejects the call
    Conflict {
        provider: String,
        code: Option<String>,
        message: String,
        entry_number: Option<u64>,
    },
    /// Network, TLS or connection error
    NetworkError { provider: String, message: String },
    /// Call did not resolve within its deadline
    Timeout { provider: String, after_secs: u64 },
    /// Other non-2xx HTTP responses
    HttpError {
        provider: String,
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Response body did not match the expected shape
    InvalidResponse { provider: String, message: String },
    /// Collaborator not configured (no base URL or key)
    NotConfigured { provider: String },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Check if this is a 409 conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    /// HTTP status associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::HttpError { status, .. } => {
                Some(*status)
            }
            ApiError::Conflict { .. } => Some(409),
            _ => None,
        }
    }

    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            ApiError::Unauthorized { provider, .. } => provider,
            ApiError::Conflict { provider, .. } => provider,
            ApiError::NetworkError { provider, .. } => provider,
            ApiError::Timeout { provider, .. } => provider,
            ApiError::HttpError { provider, .. } => provider,
            ApiError::InvalidResponse { provider, .. } => provider,
            ApiError::NotConfigured { provider } => provider,
        }
    }

    /// Create a network error for a provider
    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error for a provider
    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create a conflict error without a body
    pub fn conflict(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Conflict {
            provider: provider.into(),
            code: None,
            message: message.into(),
            entry_number: None,
        }
    }

    /// Create an invalid-response error for a provider
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for a provider
    pub fn timeout(provider: impl Into<String>, after_secs: u64) -> Self {
        ApiError::Timeout {
            provider: provider.into(),
            after_secs,
        }
    }

    /// Create a not configured error for a provider
    pub fn not_configured(provider: impl Into<String>) -> Self {
        ApiError::NotConfigured {
            provider: provider.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider, status } => {
                write!(f, "{}: Unauthorized ({})", provider, status)
            }
            ApiError::Conflict {
                provider,
                code,
                message,
                ..
            } => match code {
                Some(code) => write!(f, "{}: Conflict (409) [{}] - {}", provider, code, message),
                None => write!(f, "{}: Conflict (409) - {}", provider, message),
            },
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::Timeout {
                provider,
                after_secs,
            } => {
                write!(f, "{}: Timed out after {}s", provider, after_secs)
            }
            ApiError::HttpError {
                provider,
                status,
                code,
                message,
            } => match code {
                Some(code) => write!(f, "{}: HTTP {} [{}] - {}", provider, status, code, message),
                None => write!(f, "{}: HTTP {} - {}", provider, status, message),
            },
            ApiError::InvalidResponse { provider, message } => {
                write!(f, "{}: Invalid response - {}", provider, message)
            }
            ApiError::NotConfigured { provider } => {
                write!(f, "{}: Not configured (no base URL or key)", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth_error() {
        let err = ApiError::Unauthorized {
            provider: "session".to_string(),
            status: 401,
        };
        assert!(err.is_auth_error());
        assert!(!ApiError::network("session", "reset").is_auth_error());
    }

    #[test]
    fn test_status() {
        assert_eq!(ApiError::conflict("session", "dup").status(), Some(409));
        assert_eq!(ApiError::http("session", 502, "bad").status(), Some(502));
        assert_eq!(ApiError::timeout("storage", 20).status(), None);
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(ApiError::not_configured("catalog").provider_name(), "catalog");
        assert_eq!(ApiError::timeout("storage", 5).provider_name(), "storage");
    }

    #[test]
    fn test_display() {
        let err = ApiError::HttpError {
            provider: "session".to_string(),
            status: 422,
            code: Some("INVALID_LEAD".to_string()),
            message: "email required".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "session: HTTP 422 [INVALID_LEAD] - email required"
        );

        let err = ApiError::not_configured("catalog");
        assert_eq!(
            err.to_string(),
            "catalog: Not configured (no base URL or key)"
        );
    }
}
