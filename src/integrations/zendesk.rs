//! Zendesk Integration Adapter
//!
//! Reads tagged enhancement tickets and requester names through the REST v2 API.

use super::Helpdesk;
use crate::config::ZendeskSettings;
use crate::error::{ApiErrorKind, ApiSystem};
use crate::model::{CustomField, Ticket, TicketStatus};
use crate::{Result, TickBridgeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-request timeout for search pages
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for single ticket and user fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest page the search endpoint serves
const SEARCH_PAGE_SIZE: u32 = 100;

/// Zendesk API client for one account
pub struct ZendeskAdapter {
    client: Client,
    settings: ZendeskSettings,
    base_url: String,
    auth_token: Option<String>,
}

/// Zendesk ticket (REST API format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZendeskTicket {
    pub id: u64,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub requester_id: Option<u64>,
    /// Search results carry `fields`, ticket show carries `custom_fields`
    #[serde(default)]
    pub custom_fields: Vec<ZendeskField>,
    #[serde(default)]
    pub fields: Vec<ZendeskField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZendeskField {
    pub id: u64,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZendeskSearchResponse {
    #[serde(default)]
    pub results: Vec<ZendeskTicket>,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ZendeskTicketResponse {
    ticket: ZendeskTicket,
}

#[derive(Debug, Deserialize)]
struct ZendeskUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ZendeskUserResponse {
    user: ZendeskUser,
}

#[derive(Debug, Deserialize)]
struct ZendeskErrorBody {
    #[serde(default)]
    error: serde_json::Value,
    #[serde(default)]
    description: Option<String>,
}

/// Map a Zendesk status to a ticket status
///
/// `solved` and `closed` are both finished from the helpdesk's point of view.
pub fn map_zendesk_status(status: &str) -> TicketStatus {
    match status.to_ascii_lowercase().as_str() {
        "solved" | "closed" => TicketStatus::Closed,
        _ => TicketStatus::Open,
    }
}

impl ZendeskTicket {
    /// Custom fields from whichever list the endpoint populated; string values only
    pub fn normalized_fields(&self) -> Vec<CustomField> {
        let source = if self.custom_fields.is_empty() {
            &self.fields
        } else {
            &self.custom_fields
        };
        source
            .iter()
            .map(|f| CustomField {
                id: f.id,
                value: f.value.as_str().map(str::to_string),
            })
            .collect()
    }

    pub fn to_ticket(&self, settings: &ZendeskSettings) -> Ticket {
        Ticket {
            id: self.id,
            status: map_zendesk_status(&self.status),
            updated_at: self.updated_at,
            subject: self.subject.clone().unwrap_or_default(),
            body: self.description.clone(),
            url: settings.ticket_url(self.id),
            requester_id: self.requester_id,
            custom_fields: self.normalized_fields(),
        }
    }
}

impl ZendeskAdapter {
    /// Create a new Zendesk adapter for one credential group
    pub fn new(settings: &ZendeskSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static("tickbridge/0.3"),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::Zendesk, e))?;

        Ok(Self {
            client,
            base_url: settings.base_url(),
            auth_token: settings.token(),
            settings: settings.clone(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full search query, narrowed by last update date when `since` is set
    ///
    /// Search filters by whole days and `>` excludes the given day, so the
    /// filter starts the day before `since`. The reconciler merges by id and
    /// re-applying an unchanged ticket is a no-op.
    pub fn search_query(query: &str, since: Option<DateTime<Utc>>) -> String {
        match since {
            Some(since) => {
                let day = since.date_naive().pred_opt().unwrap_or(since.date_naive());
                format!("{} updated>{}", query, day.format("%Y-%m-%d"))
            }
            None => query.to_string(),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: RequestBuilder,
        timeout: Duration,
        what: &str,
    ) -> Result<T> {
        if let Some(ref token) = self.auth_token {
            request = request.basic_auth(format!("{}/token", self.settings.email), Some(token));
        }

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::Zendesk, e))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| TickBridgeError::from_reqwest(ApiSystem::Zendesk, e)),
            StatusCode::NOT_FOUND => Err(TickBridgeError::zendesk(
                ApiErrorKind::NotFound,
                format!("{} not found", what),
            )),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TickBridgeError::zendesk(
                ApiErrorKind::Auth,
                format!("authentication failed for {}", self.settings.email),
            )),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(TickBridgeError::zendesk(
                    ApiErrorKind::RateLimited,
                    format!("rate limited, retry after {} seconds", retry_after),
                ))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = match serde_json::from_str::<ZendeskErrorBody>(&body) {
                    Ok(parsed) => parsed
                        .description
                        .unwrap_or_else(|| parsed.error.to_string()),
                    Err(_) => body,
                };
                Err(TickBridgeError::zendesk(
                    ApiErrorKind::Status,
                    format!("HTTP {}: {}", status, message),
                ))
            }
        }
    }
}

#[async_trait]
impl Helpdesk for ZendeskAdapter {
    async fn search_tickets(
        &self,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ticket>> {
        let query = Self::search_query(query, since);
        debug!(query = %query, "Searching Zendesk tickets");

        let per_page = SEARCH_PAGE_SIZE.to_string();
        let first = self
            .client
            .get(format!("{}/api/v2/search.json", self.base_url))
            .query(&[("query", query.as_str()), ("per_page", per_page.as_str())]);
        let mut page: ZendeskSearchResponse = self.send(first, SEARCH_TIMEOUT, "search").await?;

        let mut tickets = Vec::new();
        let mut visited = HashSet::new();
        let mut pages = 1;

        loop {
            tickets.extend(page.results.iter().map(|t| t.to_ticket(&self.settings)));

            let Some(next) = page.next_page.take() else {
                break;
            };
            if !visited.insert(next.clone()) {
                warn!(url = %next, "Zendesk returned a repeated next_page, stopping");
                break;
            }

            page = self
                .send(self.client.get(&next), SEARCH_TIMEOUT, "search page")
                .await?;
            pages += 1;
        }

        info!(tickets = tickets.len(), pages, "Zendesk search complete");
        Ok(tickets)
    }

    async fn fetch_ticket(&self, id: u64) -> Result<Ticket> {
        let url = format!("{}/api/v2/tickets/{}.json", self.base_url, id);
        debug!(id, "Fetching Zendesk ticket");

        let response: ZendeskTicketResponse = self
            .send(self.client.get(&url), GET_TIMEOUT, &format!("ticket {}", id))
            .await?;
        Ok(response.ticket.to_ticket(&self.settings))
    }

    async fn fetch_user_name(&self, id: u64) -> Result<String> {
        let url = format!("{}/api/v2/users/{}.json", self.base_url, id);
        debug!(id, "Fetching Zendesk user");

        let response: ZendeskUserResponse = self
            .send(self.client.get(&url), GET_TIMEOUT, &format!("user {}", id))
            .await?;
        Ok(response.user.name)
    }
}
