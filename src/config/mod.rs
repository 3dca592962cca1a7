//! Configuration system
//!
//! Loads ~/.config/tickbridge/config.yaml with:
//! - Credential groups (GitHub repository + Zendesk account pairs)
//! - Association field settings per group
//! - Cache backend selection

mod credential_group;
mod tickbridge_config;
pub mod validation;

pub use credential_group::{AssociationSettings, CredentialGroup, GitHubSettings, ZendeskSettings};
pub use tickbridge_config::{CacheBackend, CacheSettings, TickBridgeConfig};
pub use validation::{validate_config, validate_config_result, validate_group, ValidationError};
