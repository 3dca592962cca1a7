//! Credential group configuration
//!
//! A credential group pairs one GitHub repository with one Zendesk account and
//! scopes one cache entry. Tokens are never stored in the file; each side names
//! the environment variable that holds its secret.

use crate::association::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};

/// GitHub side of a credential group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// REST API base URL (e.g., "https://api.github.com" or "https://github.example.com/api/v3")
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Organization or user
    pub owner: String,

    /// Repository name
    pub repo: String,

    /// Environment variable holding the access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

impl GitHubSettings {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_url: default_github_api_url(),
            owner: owner.into(),
            repo: repo.into(),
            token_env: None,
        }
    }

    /// Resolve the access token from the environment
    pub fn token(&self) -> Option<String> {
        read_env_token(self.token_env.as_deref())
    }
}

/// Zendesk side of a credential group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZendeskSettings {
    /// Account subdomain (`<subdomain>.zendesk.com`)
    pub subdomain: String,

    /// Overrides `https://<subdomain>.zendesk.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Agent email used for API token auth
    pub email: String,

    /// Environment variable holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// A ticket carrying any of these tags is reconciled
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

fn default_tags() -> Vec<String> {
    vec!["product_enhancement".to_string()]
}

impl ZendeskSettings {
    pub fn new(subdomain: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            base_url: None,
            email: email.into(),
            token_env: None,
            tags: default_tags(),
        }
    }

    /// Resolve the API token from the environment
    pub fn token(&self) -> Option<String> {
        read_env_token(self.token_env.as_deref())
    }

    /// Account base URL without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.zendesk.com", self.subdomain),
        }
    }

    /// Agent-facing URL of a ticket
    pub fn ticket_url(&self, id: u64) -> String {
        format!("{}/agent/tickets/{}", self.base_url(), id)
    }

    /// Query matching tickets with any of the tags, regardless of status
    pub fn tag_query(&self) -> String {
        let mut query = String::from("type:ticket");
        for tag in &self.tags {
            query.push_str(" tags:");
            query.push_str(tag);
        }
        query
    }

    /// Search query for a full rebuild (every unsolved tagged ticket)
    pub fn full_query(&self) -> String {
        format!("{} status<solved", self.tag_query())
    }
}

/// Where the association lives on helpdesk tickets and how it is spelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSettings {
    /// Zendesk custom field id holding `<prefix>-<number>`
    pub field_id: u64,

    /// Literal naming the issue tracker in the field value
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl AssociationSettings {
    pub fn new(field_id: u64) -> Self {
        Self {
            field_id,
            prefix: default_prefix(),
        }
    }
}

/// One GitHub + Zendesk pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialGroup {
    /// Group identifier; also the cache key
    pub id: String,

    pub github: GitHubSettings,

    pub zendesk: ZendeskSettings,

    pub association: AssociationSettings,

    /// Hours added to UTC when timestamps are displayed
    #[serde(default)]
    pub utc_offset: i32,
}

impl CredentialGroup {
    pub fn new(
        id: impl Into<String>,
        github: GitHubSettings,
        zendesk: ZendeskSettings,
        association: AssociationSettings,
    ) -> Self {
        Self {
            id: id.into(),
            github,
            zendesk,
            association,
            utc_offset: 0,
        }
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset = hours;
        self
    }
}

fn read_env_token(token_env: Option<&str>) -> Option<String> {
    token_env
        .map(|name| name.trim_start_matches('$'))
        .and_then(|name| std::env::var(name).ok())
        .filter(|value| !value.is_empty())
}
