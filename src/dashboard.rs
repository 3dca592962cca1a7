//! Plain-text rendering of a group's cache entry
//!
//! One section per bucket, then the unresolved links. Rows inside each
//! section are ordered by helpdesk ticket id.

use crate::model::{format_timestamp, Bucket, CacheEntry, Enhancement, Link, QuickRef};

const SUBJECT_WIDTH: usize = 40;
const REQUESTER_WIDTH: usize = 20;

/// Section heading for a bucket
pub fn bucket_title(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Tracking => "Tracking",
        Bucket::NeedAttention => "Need attention (counterpart closed)",
        Bucket::Unassociated => "Unassociated",
        Bucket::MalformedAssociation => "Malformed association",
    }
}

/// Render the full dashboard for one group
pub fn render(entry: &CacheEntry, utc_offset: i32) -> String {
    let mut lines = vec![format!(
        "Last updated: {}",
        format_timestamp(entry.last_updated, utc_offset)
    )];

    for bucket in Bucket::ALL {
        let records = entry.bucket(bucket);
        lines.push(String::new());
        lines.push(format!("{} ({})", bucket_title(bucket), records.len()));
        if records.is_empty() {
            lines.push("  (none)".to_string());
            continue;
        }
        lines.push(format!(
            "  {:<8} {:<subject$} {:<requester$} {:<22} {}",
            "Ticket",
            "Subject",
            "Requester",
            "Updated",
            link_heading(bucket),
            subject = SUBJECT_WIDTH,
            requester = REQUESTER_WIDTH,
        ));
        lines.extend(records.iter().map(|r| render_row(r, utc_offset)));
    }

    let unresolved = entry.unresolved();
    if !unresolved.is_empty() {
        lines.push(String::new());
        lines.push(format!("Unresolved links ({})", unresolved.len()));
        lines.extend(unresolved.iter().map(|r| render_row(r, utc_offset)));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn link_heading(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Tracking | Bucket::NeedAttention => "Issue",
        Bucket::Unassociated => "",
        Bucket::MalformedAssociation => "Field value",
    }
}

fn render_row(record: &Enhancement, utc_offset: i32) -> String {
    let link = match &record.link {
        Link::Missing => String::new(),
        Link::Malformed { raw } => format!("{:?}", raw),
        Link::Resolved(c) => format!(
            "#{} {} (updated {})",
            c.number,
            c.status,
            format_timestamp(c.updated_at, utc_offset)
        ),
        Link::Unresolved { number } => format!("#{} not found", number),
    };

    format!(
        "  {:<8} {:<subject$} {:<requester$} {:<22} {}",
        record.id(),
        truncate(&record.helpdesk.subject, SUBJECT_WIDTH),
        truncate(&record.helpdesk.requester, REQUESTER_WIDTH),
        format_timestamp(record.helpdesk.updated_at, utc_offset),
        link,
        subject = SUBJECT_WIDTH,
        requester = REQUESTER_WIDTH,
    )
    .trim_end()
    .to_string()
}

/// Render the quick-reference listing
pub fn render_summary(rows: &[QuickRef]) -> String {
    rows.iter()
        .map(|row| {
            let bucket = row.bucket.map(Bucket::as_str).unwrap_or("unresolved");
            format!(
                "{:<8} {:<22} {}\n",
                row.helpdesk_id,
                bucket,
                truncate(&row.subject, SUBJECT_WIDTH)
            )
        })
        .collect()
}

/// Cut to `width` characters, marking the cut with "..."
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Counterpart, HelpdeskRecord, TicketStatus};
    use chrono::{TimeZone, Utc};

    fn record(id: u64, subject: &str, link: Link) -> Enhancement {
        Enhancement {
            helpdesk: HelpdeskRecord {
                id,
                subject: subject.to_string(),
                requester: "Grace Hopper".to_string(),
                status: TicketStatus::Open,
                updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 14, 5, 0).unwrap(),
                url: format!("https://acme.zendesk.com/agent/tickets/{}", id),
            },
            link,
        }
    }

    fn entry() -> CacheEntry {
        let mut entry = CacheEntry::new(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap());
        let counterpart = Counterpart {
            number: 17,
            url: "https://github.com/acme/app/issues/17".to_string(),
            status: TicketStatus::Closed,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
        };
        for e in [
            record(503, "Export to CSV", Link::Missing),
            record(501, "Dark mode", Link::Resolved(counterpart)),
            record(502, "Bulk edit", Link::Malformed { raw: "gh17".to_string() }),
            record(504, "SSO", Link::Unresolved { number: 99 }),
        ] {
            entry.enhancements.insert(e.id(), e);
        }
        entry
    }

    #[test]
    fn test_render_sections() {
        let text = render(&entry(), 0);

        assert!(text.starts_with("Last updated: 05/02/2024 @ 09:00 AM"));
        assert!(text.contains("Tracking (0)\n  (none)"));
        assert!(text.contains("Need attention (counterpart closed) (1)"));
        assert!(text.contains("#17 closed (updated 05/02/2024 @ 08:00 AM)"));
        assert!(text.contains("\"gh17\""));
        assert!(text.contains("Unresolved links (1)"));
        assert!(text.contains("#99 not found"));
    }

    #[test]
    fn test_render_applies_offset() {
        let text = render(&entry(), -7);
        assert!(text.starts_with("Last updated: 05/02/2024 @ 02:00 AM"));
        assert!(text.contains("05/01/2024 @ 07:05 AM"));
    }

    #[test]
    fn test_summary_sorted_by_id() {
        let text = render_summary(&entry().quick_reference());
        let ids: Vec<&str> = text
            .lines()
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(ids, vec!["501", "502", "503", "504"]);
        assert!(text.contains("need_attention"));
        assert!(text.contains("unresolved"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long subject line", 10), "a very ...");
    }
}
