//! Association field parsing
//!
//! A helpdesk ticket names its issue-tracker counterpart in a custom field
//! holding `<prefix>-<number>`, e.g. `gh-42`.

use crate::model::Ticket;
use serde::{Deserialize, Serialize};

/// Prefix used when a group does not configure one
pub const DEFAULT_PREFIX: &str = "gh";

/// Outcome of parsing an association string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Association {
    /// No value in the field
    Absent,
    /// A value that is not `<prefix>-<number>`; keeps the original text
    Malformed(String),
    /// Counterpart issue number
    Valid(u64),
}

impl Association {
    /// Parse a raw field value against the expected prefix
    pub fn parse(raw: Option<&str>, prefix: &str) -> Self {
        let raw = match raw {
            None | Some("") => return Association::Absent,
            Some(raw) => raw,
        };

        let Some((head, tail)) = raw.split_once('-') else {
            return Association::Malformed(raw.to_string());
        };

        if head != prefix || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return Association::Malformed(raw.to_string());
        }

        match tail.parse::<u64>() {
            Ok(number) => Association::Valid(number),
            Err(_) => Association::Malformed(raw.to_string()),
        }
    }

    /// Parse the association field of a helpdesk ticket
    pub fn from_ticket(ticket: &Ticket, field_id: u64, prefix: &str) -> Self {
        Self::parse(ticket.custom_field(field_id), prefix)
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            Association::Valid(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parse with the default `gh` prefix
pub fn parse(raw: Option<&str>) -> Association {
    Association::parse(raw, DEFAULT_PREFIX)
}
