//! GitHub Issues Integration Adapter
//!
//! Reads counterpart issues for one repository through the REST v3 API.

use super::{IssueQuery, IssueTracker};
use crate::config::GitHubSettings;
use crate::error::{ApiErrorKind, ApiSystem};
use crate::model::{Ticket, TicketStatus};
use crate::{Result, TickBridgeError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for list queries (can return large pages)
const LIST_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for single issue fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest page GitHub serves
const DEFAULT_PAGE_SIZE: u32 = 100;

/// GitHub API client scoped to one repository
pub struct GitHubAdapter {
    client: Client,
    settings: GitHubSettings,
    auth_token: Option<String>,
    page_size: u32,
}

/// GitHub issue (REST API format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    /// Present when the "issue" is a pull request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn to_ticket(&self) -> Ticket {
        Ticket {
            id: self.number,
            status: map_github_state(&self.state),
            updated_at: self.updated_at,
            subject: self.title.clone(),
            body: self.body.clone(),
            url: self.html_url.clone(),
            requester_id: None,
            custom_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    #[serde(default)]
    message: String,
}

/// Map GitHub issue state to a ticket status
pub fn map_github_state(state: &str) -> TicketStatus {
    match state.to_ascii_lowercase().as_str() {
        "closed" => TicketStatus::Closed,
        _ => TicketStatus::Open,
    }
}

impl GitHubAdapter {
    /// Create a new GitHub adapter for one credential group
    ///
    /// The token is read from the group's `token_env` variable.
    pub fn new(settings: &GitHubSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(LIST_TIMEOUT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("tickbridge/0.3"),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/vnd.github.v3+json"),
                );
                headers
            })
            .build()
            .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::GitHub, e))?;

        Ok(Self {
            client,
            auth_token: settings.token(),
            settings: settings.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// `owner/repo`
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.settings.owner, self.settings.repo)
    }

    fn issues_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo
        )
    }

    /// Send a request and decode a JSON body, tagging failures as GitHub errors
    async fn send<T: DeserializeOwned>(
        &self,
        mut request: RequestBuilder,
        timeout: Duration,
        what: &str,
    ) -> Result<T> {
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::GitHub, e))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::GitHub, e)),
            StatusCode::NOT_FOUND => Err(TickBridgeError::github(
                ApiErrorKind::NotFound,
                format!("{} not found in {}", what, self.repo_path()),
            )),
            StatusCode::UNAUTHORIZED => Err(TickBridgeError::github(
                ApiErrorKind::Auth,
                "authentication failed",
            )),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let exhausted = response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    == Some("0");
                if exhausted || response.status() == StatusCode::TOO_MANY_REQUESTS {
                    let retry_after = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(60);
                    Err(TickBridgeError::github(
                        ApiErrorKind::RateLimited,
                        format!("rate limited, retry after {} seconds", retry_after),
                    ))
                } else {
                    Err(TickBridgeError::github(
                        ApiErrorKind::Auth,
                        format!("access to {} forbidden", self.repo_path()),
                    ))
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<GitHubErrorBody>(&body)
                    .map(|b| b.message)
                    .unwrap_or(body);
                Err(TickBridgeError::github(
                    ApiErrorKind::Status,
                    format!("HTTP {}: {}", status, message),
                ))
            }
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubAdapter {
    async fn fetch_issues(
        &self,
        query: &IssueQuery,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ticket>> {
        let url = self.issues_url();
        let mut tickets = Vec::new();
        let mut page: u32 = 1;

        debug!(
            repo = %self.repo_path(),
            state = query.state.as_str(),
            since = ?since,
            "Listing GitHub issues"
        );

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("state", query.state.as_str().to_string()),
                ("sort", "updated".to_string()),
                ("direction", "asc".to_string()),
                ("per_page", self.page_size.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(since) = since {
                params.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
            }

            let batch: Vec<GitHubIssue> = self
                .send(self.client.get(&url).query(&params), LIST_TIMEOUT, "repository")
                .await?;
            let returned = batch.len();

            tickets.extend(
                batch
                    .iter()
                    .filter(|issue| !issue.is_pull_request())
                    .map(GitHubIssue::to_ticket),
            );

            if returned < self.page_size as usize {
                break;
            }
            page += 1;
        }

        info!(
            repo = %self.repo_path(),
            issues = tickets.len(),
            pages = page,
            "GitHub issue listing complete"
        );

        Ok(tickets)
    }

    async fn fetch_issue(&self, number: u64) -> Result<Ticket> {
        let url = format!("{}/{}", self.issues_url(), number);

        debug!(repo = %self.repo_path(), number, "Fetching GitHub issue");

        let issue: GitHubIssue = self
            .send(self.client.get(&url), GET_TIMEOUT, &format!("issue #{}", number))
            .await?;
        Ok(issue.to_ticket())
    }
}
