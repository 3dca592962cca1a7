//! Core data structures
//!
//! - [`Ticket`]: a normalized record from either GitHub or Zendesk
//! - [`Enhancement`]: one helpdesk ticket plus whatever we know about its counterpart
//! - [`Buckets`]: the classification produced by a full rebuild
//! - [`CacheEntry`]: everything cached for one credential group

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Two-valued ticket status shared by both systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn is_open(self) -> bool {
        self == TicketStatus::Open
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom field on a helpdesk ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: u64,
    /// String value; non-string values are normalized to `None`
    pub value: Option<String>,
}

/// A ticket from either external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Issue number (GitHub) or ticket id (Zendesk)
    pub id: u64,
    pub status: TicketStatus,
    pub updated_at: DateTime<Utc>,
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Browser URL for the ticket
    pub url: String,
    /// Helpdesk only
    #[serde(default)]
    pub requester_id: Option<u64>,
    /// Helpdesk only
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

impl Ticket {
    /// Raw string value of a custom field, if set
    pub fn custom_field(&self, field_id: u64) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|f| f.id == field_id)
            .and_then(|f| f.value.as_deref())
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Helpdesk half of an enhancement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpdeskRecord {
    pub id: u64,
    pub subject: String,
    pub requester: String,
    pub status: TicketStatus,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

/// Issue-tracker half of a resolved enhancement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterpart {
    pub number: u64,
    pub url: String,
    pub status: TicketStatus,
    pub updated_at: DateTime<Utc>,
}

impl Counterpart {
    pub fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            number: ticket.id,
            url: ticket.url.clone(),
            status: ticket.status,
            updated_at: ticket.updated_at,
        }
    }
}

/// How a helpdesk ticket relates to the issue tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Link {
    /// Association field empty
    Missing,
    /// Association field set but not `<prefix>-<number>`
    Malformed { raw: String },
    /// Counterpart found
    Resolved(Counterpart),
    /// Association parses but the counterpart was not in the fetched set
    Unresolved { number: u64 },
}

/// Display bucket of an enhancement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Tracking,
    NeedAttention,
    Unassociated,
    MalformedAssociation,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::Tracking,
        Bucket::NeedAttention,
        Bucket::Unassociated,
        Bucket::MalformedAssociation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Tracking => "tracking",
            Bucket::NeedAttention => "need_attention",
            Bucket::Unassociated => "unassociated",
            Bucket::MalformedAssociation => "malformed_association",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One helpdesk ticket and its link to the issue tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enhancement {
    pub helpdesk: HelpdeskRecord,
    pub link: Link,
}

impl Enhancement {
    pub fn id(&self) -> u64 {
        self.helpdesk.id
    }

    /// Display bucket, or `None` for an unresolved link
    pub fn bucket(&self) -> Option<Bucket> {
        match &self.link {
            Link::Missing => Some(Bucket::Unassociated),
            Link::Malformed { .. } => Some(Bucket::MalformedAssociation),
            Link::Resolved(c) if c.status.is_open() => Some(Bucket::Tracking),
            Link::Resolved(_) => Some(Bucket::NeedAttention),
            Link::Unresolved { .. } => None,
        }
    }

    pub fn counterpart(&self) -> Option<&Counterpart> {
        match &self.link {
            Link::Resolved(c) => Some(c),
            _ => None,
        }
    }

    /// Counterpart number this record points at, resolved or not
    pub fn linked_number(&self) -> Option<u64> {
        match &self.link {
            Link::Resolved(c) => Some(c.number),
            Link::Unresolved { number } => Some(*number),
            _ => None,
        }
    }
}

/// Lightweight summary row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickRef {
    pub helpdesk_id: u64,
    pub subject: String,
    pub bucket: Option<Bucket>,
}

/// Result of a full classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    pub tracking: Vec<Enhancement>,
    pub need_attention: Vec<Enhancement>,
    pub unassociated: Vec<Enhancement>,
    pub malformed_association: Vec<Enhancement>,
    /// Valid links whose counterpart was not fetched; not displayed as a bucket
    pub unresolved: Vec<Enhancement>,
}

impl Buckets {
    /// File an enhancement under the list its link dictates
    pub fn push(&mut self, enhancement: Enhancement) {
        match enhancement.bucket() {
            Some(Bucket::Tracking) => self.tracking.push(enhancement),
            Some(Bucket::NeedAttention) => self.need_attention.push(enhancement),
            Some(Bucket::Unassociated) => self.unassociated.push(enhancement),
            Some(Bucket::MalformedAssociation) => self.malformed_association.push(enhancement),
            None => self.unresolved.push(enhancement),
        }
    }

    pub fn get(&self, bucket: Bucket) -> &[Enhancement] {
        match bucket {
            Bucket::Tracking => &self.tracking,
            Bucket::NeedAttention => &self.need_attention,
            Bucket::Unassociated => &self.unassociated,
            Bucket::MalformedAssociation => &self.malformed_association,
        }
    }

    /// Number of records across the four display buckets
    pub fn displayed_len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.get(*b).len()).sum()
    }

    pub fn sort_by_id(&mut self) {
        for list in [
            &mut self.tracking,
            &mut self.need_attention,
            &mut self.unassociated,
            &mut self.malformed_association,
            &mut self.unresolved,
        ] {
            list.sort_by_key(|e| e.id());
        }
    }

    pub fn into_enhancements(self) -> impl Iterator<Item = Enhancement> {
        self.tracking
            .into_iter()
            .chain(self.need_attention)
            .chain(self.unassociated)
            .chain(self.malformed_association)
            .chain(self.unresolved)
    }
}

/// Per-bucket record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub tracking: usize,
    pub need_attention: usize,
    pub unassociated: usize,
    pub malformed_association: usize,
    pub unresolved: usize,
}

/// Cached reconciliation state for one credential group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Enhancement records keyed by helpdesk ticket id
    pub enhancements: BTreeMap<u64, Enhancement>,
    /// Helpdesk requester id -> display name
    pub requester_names: BTreeMap<u64, String>,
    /// Fetched counterpart tickets keyed by issue number
    pub counterpart_tickets: BTreeMap<u64, Ticket>,
    /// Counterpart numbers referenced by helpdesk associations
    pub tracked_numbers: BTreeSet<u64>,
    pub last_updated: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(last_updated: DateTime<Utc>) -> Self {
        Self {
            enhancements: BTreeMap::new(),
            requester_names: BTreeMap::new(),
            counterpart_tickets: BTreeMap::new(),
            tracked_numbers: BTreeSet::new(),
            last_updated,
        }
    }

    pub fn get(&self, helpdesk_id: u64) -> Option<&Enhancement> {
        self.enhancements.get(&helpdesk_id)
    }

    /// Records in a display bucket, sorted by helpdesk id
    pub fn bucket(&self, bucket: Bucket) -> Vec<&Enhancement> {
        self.enhancements
            .values()
            .filter(|e| e.bucket() == Some(bucket))
            .collect()
    }

    pub fn tracking(&self) -> Vec<&Enhancement> {
        self.bucket(Bucket::Tracking)
    }

    pub fn need_attention(&self) -> Vec<&Enhancement> {
        self.bucket(Bucket::NeedAttention)
    }

    pub fn unassociated(&self) -> Vec<&Enhancement> {
        self.bucket(Bucket::Unassociated)
    }

    pub fn malformed_association(&self) -> Vec<&Enhancement> {
        self.bucket(Bucket::MalformedAssociation)
    }

    /// Records whose valid association points at an unfetched counterpart
    pub fn unresolved(&self) -> Vec<&Enhancement> {
        self.enhancements
            .values()
            .filter(|e| e.bucket().is_none())
            .collect()
    }

    /// Summary rows sorted by helpdesk id
    pub fn quick_reference(&self) -> Vec<QuickRef> {
        self.enhancements
            .values()
            .map(|e| QuickRef {
                helpdesk_id: e.id(),
                subject: e.helpdesk.subject.clone(),
                bucket: e.bucket(),
            })
            .collect()
    }

    pub fn counts(&self) -> BucketCounts {
        let mut counts = BucketCounts::default();
        for enhancement in self.enhancements.values() {
            match enhancement.bucket() {
                Some(Bucket::Tracking) => counts.tracking += 1,
                Some(Bucket::NeedAttention) => counts.need_attention += 1,
                Some(Bucket::Unassociated) => counts.unassociated += 1,
                Some(Bucket::MalformedAssociation) => counts.malformed_association += 1,
                None => counts.unresolved += 1,
            }
        }
        counts
    }

    /// Same entry with the timestamp zeroed, for comparisons that ignore freshness
    pub fn without_timestamp(&self) -> Self {
        Self {
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            ..self.clone()
        }
    }
}

/// Render a timestamp as `MM/DD/YYYY @ HH:MM AM` shifted by a UTC offset in hours
pub fn format_timestamp(ts: DateTime<Utc>, utc_offset_hours: i32) -> String {
    let shifted = ts + Duration::hours(i64::from(utc_offset_hours));
    shifted.format("%m/%d/%Y @ %I:%M %p").to_string()
}
