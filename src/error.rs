//! Error types for tickbridge
//!
//! Every failure to reach GitHub or Zendesk is tagged with the system that
//! produced it, so the request boundary can report which side is broken
//! without inspecting the underlying transport error.

use std::fmt;
use thiserror::Error;

/// Result type alias for tickbridge operations
pub type Result<T> = std::result::Result<T, TickBridgeError>;

/// The external system an API error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiSystem {
    /// Issue tracker (GitHub Issues)
    GitHub,
    /// Helpdesk (Zendesk)
    Zendesk,
}

impl fmt::Display for ApiSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiSystem::GitHub => write!(f, "GitHub"),
            ApiSystem::Zendesk => write!(f, "Zendesk"),
        }
    }
}

/// What went wrong talking to an external system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Credentials rejected (401/403 without rate limit)
    Auth,
    /// Rate limited by the remote API
    RateLimited,
    /// Requested record does not exist
    NotFound,
    /// Any other non-success HTTP status
    Status,
    /// Connection failure, timeout, or other transport problem
    Transport,
    /// Response body could not be decoded
    Payload,
}

/// Comprehensive error type for tickbridge operations
#[derive(Error, Debug)]
pub enum TickBridgeError {
    /// Failure talking to GitHub or Zendesk
    #[error("could not connect to {system}: {detail}")]
    Api {
        system: ApiSystem,
        kind: ApiErrorKind,
        detail: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown credential group
    #[error("Credential group not found: {0}")]
    GroupNotFound(String),

    /// Cache backend errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Errors carrying context about what was being attempted
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

impl TickBridgeError {
    /// Build a GitHub-tagged API error
    pub fn github(kind: ApiErrorKind, detail: impl Into<String>) -> Self {
        Self::Api {
            system: ApiSystem::GitHub,
            kind,
            detail: detail.into(),
        }
    }

    /// Build a Zendesk-tagged API error
    pub fn zendesk(kind: ApiErrorKind, detail: impl Into<String>) -> Self {
        Self::Api {
            system: ApiSystem::Zendesk,
            kind,
            detail: detail.into(),
        }
    }

    /// Tag a transport-level reqwest error with the system that raised it
    pub fn from_reqwest(system: ApiSystem, err: reqwest::Error) -> Self {
        let kind = if err.is_decode() {
            ApiErrorKind::Payload
        } else if err.is_status() {
            match err.status().map(|s| s.as_u16()) {
                Some(401) | Some(403) => ApiErrorKind::Auth,
                Some(404) => ApiErrorKind::NotFound,
                Some(429) => ApiErrorKind::RateLimited,
                _ => ApiErrorKind::Status,
            }
        } else {
            ApiErrorKind::Transport
        };

        Self::Api {
            system,
            kind,
            detail: err.to_string(),
        }
    }

    /// The external system that failed, if this is an API error
    pub fn api_system(&self) -> Option<ApiSystem> {
        match self {
            Self::Api { system, .. } => Some(*system),
            _ => None,
        }
    }

    /// True if the remote API reported the record as missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: ApiErrorKind::NotFound,
                ..
            }
        )
    }

    /// Message shown to the person looking at the dashboard
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { .. } => format!("{}. Try adjusting your account settings.", self),
            other => other.to_string(),
        }
    }
}
