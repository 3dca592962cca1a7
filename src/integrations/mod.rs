//! External Integrations
//!
//! Read-only adapters for the two ticket systems being reconciled.
//!
//! # Overview
//!
//! - **GitHub**: REST v3 adapter for the issue tracker (counterpart tickets)
//! - **Zendesk**: REST v2 adapter for the helpdesk (enhancement requests)
//!
//! Each adapter is built from one credential group's settings, so credentials
//! never leak between groups. The [`IssueTracker`] and [`Helpdesk`] traits are
//! the seam the reconciler works against, which lets tests drive it with fakes.
//!
//! Adapters follow pagination until exhausted and never retry: a single failed
//! page fails the whole fetch with an error tagged by the system that raised it.

pub mod github;
pub mod zendesk;

use crate::model::Ticket;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use github::{GitHubAdapter, GitHubIssue};
pub use zendesk::{ZendeskAdapter, ZendeskTicket};

/// Issue state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }
}

/// Filter for listing issues
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub state: IssueState,
}

impl IssueQuery {
    pub fn all() -> Self {
        Self {
            state: IssueState::All,
        }
    }

    pub fn open() -> Self {
        Self::default()
    }
}

/// The issue tracker holding counterpart tickets
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// List issues, following every page; `since` limits to issues updated after it
    async fn fetch_issues(
        &self,
        query: &IssueQuery,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ticket>>;

    /// Fetch a single issue by number
    async fn fetch_issue(&self, number: u64) -> Result<Ticket>;
}

/// The helpdesk holding enhancement requests
#[async_trait]
pub trait Helpdesk: Send + Sync {
    /// Run a ticket search, following every page; `since` limits to tickets updated after it
    async fn search_tickets(&self, query: &str, since: Option<DateTime<Utc>>)
        -> Result<Vec<Ticket>>;

    /// Fetch a single ticket by id
    async fn fetch_ticket(&self, id: u64) -> Result<Ticket>;

    /// Display name of a user (ticket requester)
    async fn fetch_user_name(&self, id: u64) -> Result<String>;
}
