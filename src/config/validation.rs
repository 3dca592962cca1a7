//! Configuration validation
//!
//! Checks a tickbridge configuration before any API call is made:
//! - At least one group, no duplicate group ids
//! - GitHub and Zendesk identifiers present
//! - Association field and prefix usable
//! - Token environment variables set

use super::credential_group::CredentialGroup;
use super::tickbridge_config::TickBridgeConfig;
use crate::TickBridgeError;
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub group: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            group: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref group) = self.group {
            write!(f, "[{}] {}: {}", group, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a tickbridge configuration
pub fn validate_config(config: &TickBridgeConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.groups.is_empty() {
        errors.push(ValidationError::new(
            "groups",
            "At least one credential group must be defined",
        ));
    }

    let mut seen_ids = HashSet::new();
    for group in &config.groups {
        if !seen_ids.insert(&group.id) {
            errors.push(ValidationError::new(
                "groups",
                format!("Duplicate group id: {}", group.id),
            ));
        }
    }

    for group in &config.groups {
        if let Err(mut group_errors) = validate_group(group) {
            errors.append(&mut group_errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single credential group
pub fn validate_group(group: &CredentialGroup) -> ValidationResult {
    let mut errors = Vec::new();
    let mut push = |field: &str, message: String| {
        errors.push(ValidationError::new(field, message).with_group(&group.id));
    };

    if group.id.trim().is_empty() {
        push("id", "Group id cannot be empty".to_string());
    }

    if !group.github.api_url.starts_with("http://") && !group.github.api_url.starts_with("https://")
    {
        push(
            "github.api_url",
            format!("Invalid API URL: {}", group.github.api_url),
        );
    }
    if group.github.owner.trim().is_empty() {
        push("github.owner", "Owner cannot be empty".to_string());
    }
    if group.github.repo.trim().is_empty() {
        push("github.repo", "Repository cannot be empty".to_string());
    }
    check_token_env(&mut push, "github.token_env", group.github.token_env.as_deref());

    if group.zendesk.subdomain.trim().is_empty() && group.zendesk.base_url.is_none() {
        push("zendesk.subdomain", "Subdomain cannot be empty".to_string());
    }
    if !group.zendesk.email.contains('@') {
        push(
            "zendesk.email",
            format!("Invalid agent email: {}", group.zendesk.email),
        );
    }
    if group.zendesk.tags.iter().any(|t| t.trim().is_empty()) {
        push("zendesk.tags", "Tags cannot be blank".to_string());
    }
    check_token_env(&mut push, "zendesk.token_env", group.zendesk.token_env.as_deref());

    if group.association.field_id == 0 {
        push(
            "association.field_id",
            "Custom field id must be greater than 0".to_string(),
        );
    }
    if group.association.prefix.is_empty() || group.association.prefix.contains('-') {
        push(
            "association.prefix",
            format!(
                "Prefix must be non-empty and contain no '-': {:?}",
                group.association.prefix
            ),
        );
    }

    if !(-12..=14).contains(&group.utc_offset) {
        push(
            "utc_offset",
            format!("UTC offset out of range: {}", group.utc_offset),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_token_env(push: &mut impl FnMut(&str, String), field: &str, token_env: Option<&str>) {
    match token_env {
        None => push(field, "Token environment variable not configured".to_string()),
        Some(name) => {
            let name = name.trim_start_matches('$');
            if std::env::var(name).is_err() {
                push(
                    field,
                    format!("Environment variable {} is not set", name),
                );
            }
        }
    }
}

/// Validate and convert to a crate error listing every problem
pub fn validate_config_result(config: &TickBridgeConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        TickBridgeError::Config(format!(
            "Configuration validation failed:\n  {}",
            messages.join("\n  ")
        ))
    })
}
