//! Full classification of helpdesk tickets against their counterparts
//!
//! Every open helpdesk ticket lands in exactly one of the four display
//! buckets, or in the separate unresolved list when its association names an
//! issue that was not fetched.

use crate::association::Association;
use crate::config::AssociationSettings;
use crate::model::{Buckets, Counterpart, Enhancement, HelpdeskRecord, Link, Ticket};
use std::collections::BTreeMap;
use tracing::debug;

/// Name shown when a requester id is missing from the reference table
pub const UNKNOWN_REQUESTER: &str = "Unknown requester";

/// Counterpart tickets keyed by issue number
pub type CounterpartIndex = BTreeMap<u64, Ticket>;

/// Index a list of counterpart tickets by number
pub fn index_counterparts(tickets: impl IntoIterator<Item = Ticket>) -> CounterpartIndex {
    tickets.into_iter().map(|t| (t.id, t)).collect()
}

/// Build the helpdesk half of an enhancement record
pub fn helpdesk_record(ticket: &Ticket, requester_names: &BTreeMap<u64, String>) -> HelpdeskRecord {
    let requester = ticket
        .requester_id
        .and_then(|id| requester_names.get(&id))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_REQUESTER.to_string());

    HelpdeskRecord {
        id: ticket.id,
        subject: ticket.subject.clone(),
        requester,
        status: ticket.status,
        updated_at: ticket.updated_at,
        url: ticket.url.clone(),
    }
}

/// Turn a parsed association into a link using the fetched counterparts
pub fn resolve_link(association: Association, counterparts: &CounterpartIndex) -> Link {
    match association {
        Association::Absent => Link::Missing,
        Association::Malformed(raw) => Link::Malformed { raw },
        Association::Valid(number) => match counterparts.get(&number) {
            Some(ticket) => Link::Resolved(Counterpart::from_ticket(ticket)),
            None => Link::Unresolved { number },
        },
    }
}

/// Classify a single helpdesk ticket
pub fn classify_ticket(
    ticket: &Ticket,
    counterparts: &CounterpartIndex,
    requester_names: &BTreeMap<u64, String>,
    rule: &AssociationSettings,
) -> Enhancement {
    let association = Association::from_ticket(ticket, rule.field_id, &rule.prefix);
    Enhancement {
        helpdesk: helpdesk_record(ticket, requester_names),
        link: resolve_link(association, counterparts),
    }
}

/// Classify every open helpdesk ticket into buckets sorted by helpdesk id
///
/// Closed helpdesk tickets are skipped. A helpdesk id that appears more than
/// once is classified from its last occurrence.
pub fn classify(
    helpdesk_tickets: &[Ticket],
    counterparts: &CounterpartIndex,
    requester_names: &BTreeMap<u64, String>,
    rule: &AssociationSettings,
) -> Buckets {
    let mut by_id: BTreeMap<u64, Enhancement> = BTreeMap::new();

    for ticket in helpdesk_tickets {
        if !ticket.is_open() {
            debug!(ticket = ticket.id, "Skipping closed helpdesk ticket");
            continue;
        }
        by_id.insert(
            ticket.id,
            classify_ticket(ticket, counterparts, requester_names, rule),
        );
    }

    let mut buckets = Buckets::default();
    for enhancement in by_id.into_values() {
        buckets.push(enhancement);
    }
    buckets.sort_by_id();

    debug!(
        tracking = buckets.tracking.len(),
        need_attention = buckets.need_attention.len(),
        unassociated = buckets.unassociated.len(),
        malformed = buckets.malformed_association.len(),
        unresolved = buckets.unresolved.len(),
        "Classified helpdesk tickets"
    );

    buckets
}
