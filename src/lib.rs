//! tickbridge - Helpdesk to issue-tracker reconciliation
//!
//! Keeps product-enhancement tickets in Zendesk in step with the GitHub issues
//! they reference through a custom field holding `<prefix>-<number>`, and
//! sorts every open ticket into a worklist for the support team.
//!
//! # Architecture
//!
//! - **association**: Parser for the association field value
//! - **classify**: Full classification of helpdesk tickets into buckets
//! - **reconcile**: Cache rebuild and incremental updates per credential group
//! - **cache**: Cache backends (SQLite, in-memory)
//! - **integrations**: External system adapters (GitHub, Zendesk)
//! - **config**: Credential groups and cache settings
//! - **dashboard**: Plain-text rendering of the buckets

// Core modules
pub mod association;
pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;

// Components
pub mod cache;
pub mod dashboard;
pub mod integrations;
pub mod logging;

// Re-exports
pub use error::{Result, TickBridgeError};
