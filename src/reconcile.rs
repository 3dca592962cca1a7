//! Full rebuild and incremental update of a group's cache entry
//!
//! A group with no cache entry is rebuilt from a full fetch of both systems.
//! Afterwards each update fetches only what changed since `last_updated` and
//! merges it into a private copy of the entry, which is written back whole.
//! Every fetch completes before the merge starts, so a failing fetch leaves
//! the cached entry untouched.

use crate::association::Association;
use crate::cache::CacheStore;
use crate::classify::{self, CounterpartIndex};
use crate::config::{AssociationSettings, CredentialGroup};
use crate::integrations::{GitHubAdapter, Helpdesk, IssueQuery, IssueTracker, ZendeskAdapter};
use crate::model::{CacheEntry, Counterpart, Link, Ticket};
use crate::{Result, TickBridgeError};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Minutes subtracted from the wall clock when recording `last_updated`, so changes
/// landing while a fetch is in flight are picked up by the next update.
pub const CLOCK_SKEW_MINUTES: i64 = 10;

pub fn clock_skew() -> Duration {
    Duration::minutes(CLOCK_SKEW_MINUTES)
}

/// What the reconciler needs to know about a group besides its credentials
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub association: AssociationSettings,
    /// Helpdesk search for a full rebuild
    pub full_query: String,
    /// Helpdesk search for an incremental update (the adapter narrows it by date)
    pub update_query: String,
}

impl ReconcileSettings {
    pub fn from_group(group: &CredentialGroup) -> Self {
        Self {
            association: group.association.clone(),
            full_query: group.zendesk.full_query(),
            update_query: group.zendesk.tag_query(),
        }
    }
}

/// Everything fetched for one incremental update
#[derive(Debug, Clone, Default)]
pub struct UpdateDelta {
    /// Issues changed since the last update, any state
    pub counterparts: Vec<Ticket>,
    /// Helpdesk tickets changed since the last update, any status
    pub helpdesk_tickets: Vec<Ticket>,
    /// Names for requester ids not already in the entry
    pub requester_names: BTreeMap<u64, String>,
    /// Newly referenced issues fetched one at a time
    pub referenced: Vec<Ticket>,
}

/// Keeps cache entries in step with both ticket systems
pub struct Reconciler<S: CacheStore> {
    cache: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: CacheStore> Reconciler<S> {
    pub fn new(cache: S) -> Self {
        Self {
            cache,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &S {
        &self.cache
    }

    /// Cached entry without contacting either system
    pub fn cached(&self, group_id: &str) -> Result<Option<CacheEntry>> {
        self.cache.get(group_id)
    }

    fn group_lock(&self, group_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| TickBridgeError::Cache("group lock registry poisoned".to_string()))?;
        Ok(locks.entry(group_id.to_string()).or_default().clone())
    }

    /// Bring a group's entry up to date using its configured credentials
    pub async fn update(&self, group: &CredentialGroup) -> Result<CacheEntry> {
        let tracker = GitHubAdapter::new(&group.github)?;
        let helpdesk = ZendeskAdapter::new(&group.zendesk)?;
        let settings = ReconcileSettings::from_group(group);
        self.update_with(&group.id, &settings, &tracker, &helpdesk)
            .await
    }

    /// Discard a group's entry and rebuild it using its configured credentials
    pub async fn rebuild(&self, group: &CredentialGroup) -> Result<CacheEntry> {
        let tracker = GitHubAdapter::new(&group.github)?;
        let helpdesk = ZendeskAdapter::new(&group.zendesk)?;
        let settings = ReconcileSettings::from_group(group);
        self.rebuild_with(&group.id, &settings, &tracker, &helpdesk)
            .await
    }

    /// Bring a group's entry up to date: rebuild when absent, merge changes otherwise
    pub async fn update_with(
        &self,
        group_id: &str,
        settings: &ReconcileSettings,
        tracker: &dyn IssueTracker,
        helpdesk: &dyn Helpdesk,
    ) -> Result<CacheEntry> {
        let lock = self.group_lock(group_id)?;
        let _guard = lock.lock().await;

        let entry = match self.cache.get(group_id)? {
            Some(entry) => entry,
            None => {
                info!(group = group_id, "No cache entry, rebuilding");
                let entry = build_entry(settings, tracker, helpdesk).await?;
                self.cache.set(group_id, &entry)?;
                return Ok(entry);
            }
        };

        let delta = fetch_delta(&entry, settings, tracker, helpdesk).await?;
        info!(
            group = group_id,
            since = %entry.last_updated,
            counterparts = delta.counterparts.len(),
            helpdesk_tickets = delta.helpdesk_tickets.len(),
            "Merging changes"
        );

        let merged = merge(entry, delta, &settings.association, Utc::now());
        self.cache.set(group_id, &merged)?;
        Ok(merged)
    }

    /// Rebuild a group's entry from a full fetch, replacing whatever is cached
    pub async fn rebuild_with(
        &self,
        group_id: &str,
        settings: &ReconcileSettings,
        tracker: &dyn IssueTracker,
        helpdesk: &dyn Helpdesk,
    ) -> Result<CacheEntry> {
        let lock = self.group_lock(group_id)?;
        let _guard = lock.lock().await;

        info!(group = group_id, "Rebuilding cache entry");
        let entry = build_entry(settings, tracker, helpdesk).await?;
        self.cache.set(group_id, &entry)?;
        Ok(entry)
    }
}

/// Build a complete entry from a full fetch of both systems
pub async fn build_entry(
    settings: &ReconcileSettings,
    tracker: &dyn IssueTracker,
    helpdesk: &dyn Helpdesk,
) -> Result<CacheEntry> {
    let rule = &settings.association;
    let tickets: Vec<Ticket> = helpdesk
        .search_tickets(&settings.full_query, None)
        .await?
        .into_iter()
        .filter(Ticket::is_open)
        .collect();

    let requester_ids: BTreeSet<u64> = tickets.iter().filter_map(|t| t.requester_id).collect();
    let requester_names = fetch_requester_names(helpdesk, requester_ids).await?;

    let numbers: BTreeSet<u64> = tickets
        .iter()
        .filter_map(|t| Association::from_ticket(t, rule.field_id, &rule.prefix).number())
        .collect();
    let counterparts =
        classify::index_counterparts(fetch_counterparts(tracker, numbers.iter().copied()).await?);

    let buckets = classify::classify(&tickets, &counterparts, &requester_names, rule);

    let mut entry = CacheEntry::new(Utc::now() - clock_skew());
    entry
        .enhancements
        .extend(buckets.into_enhancements().map(|e| (e.id(), e)));
    entry.requester_names = requester_names;
    entry.counterpart_tickets = counterparts;
    entry.tracked_numbers = numbers;

    debug!(
        records = entry.enhancements.len(),
        counterparts = entry.counterpart_tickets.len(),
        "Built cache entry"
    );
    Ok(entry)
}

/// Fetch everything that changed since the entry was last updated
pub async fn fetch_delta(
    entry: &CacheEntry,
    settings: &ReconcileSettings,
    tracker: &dyn IssueTracker,
    helpdesk: &dyn Helpdesk,
) -> Result<UpdateDelta> {
    let rule = &settings.association;
    let since = Some(entry.last_updated);

    let counterparts = tracker.fetch_issues(&IssueQuery::all(), since).await?;
    let helpdesk_tickets = helpdesk.search_tickets(&settings.update_query, since).await?;

    let open_tickets = || helpdesk_tickets.iter().filter(|t| t.is_open());

    let new_requesters: BTreeSet<u64> = open_tickets()
        .filter_map(|t| t.requester_id)
        .filter(|id| !entry.requester_names.contains_key(id))
        .collect();
    let requester_names = fetch_requester_names(helpdesk, new_requesters).await?;

    let changed_numbers: BTreeSet<u64> = counterparts.iter().map(|t| t.id).collect();
    let new_numbers: BTreeSet<u64> = open_tickets()
        .filter_map(|t| Association::from_ticket(t, rule.field_id, &rule.prefix).number())
        .filter(|n| !entry.tracked_numbers.contains(n) && !changed_numbers.contains(n))
        .collect();
    let referenced = fetch_counterparts(tracker, new_numbers).await?;

    Ok(UpdateDelta {
        counterparts,
        helpdesk_tickets,
        requester_names,
        referenced,
    })
}

/// Apply fetched changes to an entry
///
/// Counterparts are applied before helpdesk tickets, so a helpdesk ticket
/// re-homed in the same update sees its counterpart's latest state.
pub fn merge(
    mut entry: CacheEntry,
    delta: UpdateDelta,
    rule: &AssociationSettings,
    now: DateTime<Utc>,
) -> CacheEntry {
    entry.requester_names.extend(delta.requester_names);

    // Issues nobody referenced yet, adopted if a helpdesk ticket points at them
    let mut staged: CounterpartIndex = BTreeMap::new();

    for issue in delta.counterparts {
        if entry.tracked_numbers.contains(&issue.id) {
            refresh_counterpart(&mut entry, issue);
        } else {
            staged.insert(issue.id, issue);
        }
    }
    staged.extend(delta.referenced.into_iter().map(|t| (t.id, t)));

    let mut queued = Vec::new();
    for ticket in delta.helpdesk_tickets {
        if !ticket.is_open() {
            if entry.enhancements.remove(&ticket.id).is_some() {
                debug!(ticket = ticket.id, "Removed closed helpdesk ticket");
            }
            continue;
        }

        adopt_counterpart(&mut entry, &mut staged, &ticket, rule);
        if entry.enhancements.contains_key(&ticket.id) {
            let enhancement = classify::classify_ticket(
                &ticket,
                &entry.counterpart_tickets,
                &entry.requester_names,
                rule,
            );
            debug!(ticket = ticket.id, bucket = ?enhancement.bucket(), "Re-homed helpdesk ticket");
            entry.enhancements.insert(ticket.id, enhancement);
        } else {
            queued.push(ticket);
        }
    }

    if !queued.is_empty() {
        let buckets = classify::classify(
            &queued,
            &entry.counterpart_tickets,
            &entry.requester_names,
            rule,
        );
        entry
            .enhancements
            .extend(buckets.into_enhancements().map(|e| (e.id(), e)));
    }

    prune_untracked(&mut entry);
    entry.last_updated = now - clock_skew();
    entry
}

/// Replace a tracked counterpart and every link pointing at it
fn refresh_counterpart(entry: &mut CacheEntry, issue: Ticket) {
    let counterpart = Counterpart::from_ticket(&issue);
    for enhancement in entry.enhancements.values_mut() {
        if enhancement.linked_number() != Some(issue.id) {
            continue;
        }
        let before = enhancement.bucket();
        enhancement.link = Link::Resolved(counterpart.clone());
        if enhancement.bucket() != before {
            debug!(
                ticket = enhancement.id(),
                number = issue.id,
                from = ?before,
                to = ?enhancement.bucket(),
                "Counterpart change moved record"
            );
        }
    }
    entry.counterpart_tickets.insert(issue.id, issue);
}

/// Move a staged counterpart into the entry when a helpdesk ticket references it
fn adopt_counterpart(
    entry: &mut CacheEntry,
    staged: &mut CounterpartIndex,
    ticket: &Ticket,
    rule: &AssociationSettings,
) {
    let Some(number) = Association::from_ticket(ticket, rule.field_id, &rule.prefix).number()
    else {
        return;
    };
    if let Some(issue) = staged.remove(&number) {
        entry.counterpart_tickets.insert(number, issue);
    }
    entry.tracked_numbers.insert(number);
}

/// Drop counterparts no record links to any more
fn prune_untracked(entry: &mut CacheEntry) {
    let linked: BTreeSet<u64> = entry
        .enhancements
        .values()
        .filter_map(|e| e.linked_number())
        .collect();
    entry.tracked_numbers.retain(|n| linked.contains(n));
    entry
        .counterpart_tickets
        .retain(|n, _| linked.contains(n));
}

async fn fetch_requester_names(
    helpdesk: &dyn Helpdesk,
    ids: impl IntoIterator<Item = u64>,
) -> Result<BTreeMap<u64, String>> {
    let mut names = BTreeMap::new();
    for id in ids {
        match helpdesk.fetch_user_name(id).await {
            Ok(name) => {
                names.insert(id, name);
            }
            Err(e) if e.is_not_found() => {
                warn!(requester = id, "Requester not found, leaving unnamed");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(names)
}

/// Fetch issues one at a time; a missing issue is skipped so its link stays unresolved
async fn fetch_counterparts(
    tracker: &dyn IssueTracker,
    numbers: impl IntoIterator<Item = u64>,
) -> Result<Vec<Ticket>> {
    let mut issues = Vec::new();
    for number in numbers {
        match tracker.fetch_issue(number).await {
            Ok(issue) => issues.push(issue),
            Err(e) if e.is_not_found() => {
                warn!(number, "Referenced issue not found");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::classify::tests::{helpdesk, issue, names, rule};
    use crate::error::ApiErrorKind;
    use crate::model::{Bucket, TicketStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeTracker {
        issues: Mutex<Vec<Ticket>>,
        fail: AtomicBool,
        single_fetches: AtomicUsize,
    }

    impl FakeTracker {
        fn with(issues: Vec<Ticket>) -> Self {
            Self {
                issues: Mutex::new(issues),
                ..Default::default()
            }
        }

        fn upsert(&self, ticket: Ticket) {
            let mut issues = self.issues.lock().unwrap();
            issues.retain(|t| t.id != ticket.id);
            issues.push(ticket);
        }
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn fetch_issues(
            &self,
            _query: &IssueQuery,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Ticket>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TickBridgeError::github(ApiErrorKind::Transport, "connection refused"));
            }
            Ok(self
                .issues
                .lock()
                .unwrap()
                .iter()
                .filter(|t| since.map_or(true, |s| t.updated_at >= s))
                .cloned()
                .collect())
        }

        async fn fetch_issue(&self, number: u64) -> Result<Ticket> {
            self.single_fetches.fetch_add(1, Ordering::SeqCst);
            self.issues
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == number)
                .cloned()
                .ok_or_else(|| TickBridgeError::github(ApiErrorKind::NotFound, "no such issue"))
        }
    }

    #[derive(Default)]
    struct FakeHelpdesk {
        tickets: Mutex<Vec<Ticket>>,
        queries: Mutex<Vec<String>>,
        fail: AtomicBool,
        users_unavailable: AtomicBool,
    }

    impl FakeHelpdesk {
        fn with(tickets: Vec<Ticket>) -> Self {
            Self {
                tickets: Mutex::new(tickets),
                ..Default::default()
            }
        }

        fn upsert(&self, ticket: Ticket) {
            let mut tickets = self.tickets.lock().unwrap();
            tickets.retain(|t| t.id != ticket.id);
            tickets.push(ticket);
        }

        fn full_searches(&self) -> usize {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .filter(|q| q.contains("status<solved"))
                .count()
        }
    }

    #[async_trait]
    impl Helpdesk for FakeHelpdesk {
        async fn search_tickets(
            &self,
            query: &str,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Ticket>> {
            self.queries.lock().unwrap().push(query.to_string());
            tokio::task::yield_now().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(TickBridgeError::zendesk(ApiErrorKind::Status, "HTTP 503"));
            }
            let open_only = query.contains("status<solved");
            Ok(self
                .tickets
                .lock()
                .unwrap()
                .iter()
                .filter(|t| !open_only || t.is_open())
                .filter(|t| since.map_or(true, |s| t.updated_at >= s))
                .cloned()
                .collect())
        }

        async fn fetch_ticket(&self, id: u64) -> Result<Ticket> {
            self.tickets
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| TickBridgeError::zendesk(ApiErrorKind::NotFound, "no such ticket"))
        }

        async fn fetch_user_name(&self, id: u64) -> Result<String> {
            if self.users_unavailable.load(Ordering::SeqCst) {
                return Err(TickBridgeError::zendesk(ApiErrorKind::Status, "HTTP 500"));
            }
            names()
                .get(&id)
                .cloned()
                .ok_or_else(|| TickBridgeError::zendesk(ApiErrorKind::NotFound, "no such user"))
        }
    }

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            association: rule(),
            full_query: "type:ticket tags:product_enhancement status<solved".to_string(),
            update_query: "type:ticket tags:product_enhancement".to_string(),
        }
    }

    fn touched(mut ticket: Ticket) -> Ticket {
        ticket.updated_at = Utc::now();
        ticket
    }

    fn closed(mut ticket: Ticket) -> Ticket {
        ticket.status = TicketStatus::Closed;
        touched(ticket)
    }

    #[tokio::test]
    async fn test_missing_entry_triggers_rebuild() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17")), helpdesk(502, None)]);
        let reconciler = Reconciler::new(MemoryCache::new());

        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        assert_eq!(desk.full_searches(), 1);
        assert_eq!(entry.tracking().len(), 1);
        assert_eq!(entry.unassociated().len(), 1);
        assert_eq!(entry.get(501).unwrap().helpdesk.requester, "Grace Hopper");
        assert_eq!(entry.tracked_numbers, BTreeSet::from([17]));
        assert!(entry.last_updated <= Utc::now() - clock_skew());
        assert_eq!(reconciler.cached("acme").unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_counterpart_close_and_reopen_moves_record() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17"))]);
        let reconciler = Reconciler::new(MemoryCache::new());

        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        let tracked = entry.tracking();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].id(), 501);
        assert_eq!(tracked[0].counterpart().unwrap().number, 17);

        tracker.upsert(touched(issue(17, TicketStatus::Closed)));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert!(entry.tracking().is_empty());
        let attention = entry.need_attention();
        assert_eq!(attention.len(), 1);
        assert_eq!(attention[0].counterpart().unwrap().status, TicketStatus::Closed);
        assert_eq!(desk.full_searches(), 1);

        tracker.upsert(touched(issue(17, TicketStatus::Open)));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert_eq!(entry.tracking().len(), 1);
        assert!(entry.need_attention().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17")), helpdesk(503, Some("x"))]);
        let reconciler = Reconciler::new(MemoryCache::new());
        reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        // Changes newer than last_updated are returned by both updates
        desk.upsert(touched(helpdesk(504, Some("gh-17"))));
        tracker.upsert(touched(issue(17, TicketStatus::Closed)));

        let first = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        let second = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        assert_eq!(first.without_timestamp(), second.without_timestamp());
        assert_eq!(second.need_attention().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_helpdesk_ticket_removed() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17")), helpdesk(502, None)]);
        let reconciler = Reconciler::new(MemoryCache::new());
        reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        desk.upsert(closed(helpdesk(501, Some("gh-17"))));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        assert!(entry.get(501).is_none());
        assert!(Bucket::ALL
            .iter()
            .all(|b| entry.bucket(*b).iter().all(|e| e.id() != 501)));
        assert!(entry.tracked_numbers.is_empty());
        assert!(entry.counterpart_tickets.is_empty());
        assert_eq!(entry.unassociated().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17"))]);
        let reconciler = Reconciler::new(MemoryCache::new());
        let before = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        tracker.upsert(touched(issue(17, TicketStatus::Closed)));
        desk.fail.store(true, Ordering::SeqCst);

        let err = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap_err();
        assert_eq!(err.api_system(), Some(crate::error::ApiSystem::Zendesk));
        assert_eq!(reconciler.cached("acme").unwrap(), Some(before.clone()));

        desk.fail.store(false, Ordering::SeqCst);
        tracker.fail.store(true, Ordering::SeqCst);
        let err = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap_err();
        assert_eq!(err.api_system(), Some(crate::error::ApiSystem::GitHub));
        assert_eq!(reconciler.cached("acme").unwrap(), Some(before));
    }

    #[tokio::test]
    async fn test_failed_rebuild_writes_nothing() {
        let tracker = FakeTracker::default();
        let desk = FakeHelpdesk::default();
        desk.fail.store(true, Ordering::SeqCst);
        let reconciler = Reconciler::new(MemoryCache::new());

        assert!(reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .is_err());
        assert_eq!(reconciler.cached("acme").unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_requester_falls_back_to_unknown() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let mut orphan = helpdesk(502, Some("gh-17"));
        orphan.requester_id = Some(404);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17")), orphan]);
        let reconciler = Reconciler::new(MemoryCache::new());

        let entry = reconciler
            .rebuild_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();

        assert_eq!(entry.get(501).unwrap().helpdesk.requester, "Grace Hopper");
        assert_eq!(
            entry.get(502).unwrap().helpdesk.requester,
            classify::UNKNOWN_REQUESTER
        );
        assert_eq!(entry.tracking().len(), 2);
        assert!(!entry.requester_names.contains_key(&404));
    }

    #[tokio::test]
    async fn test_requester_lookup_failure_aborts_rebuild() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17"))]);
        desk.users_unavailable.store(true, Ordering::SeqCst);
        let reconciler = Reconciler::new(MemoryCache::new());

        let err = reconciler
            .rebuild_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap_err();

        assert_eq!(err.api_system(), Some(crate::error::ApiSystem::Zendesk));
        assert!(!err.is_not_found());
        assert_eq!(reconciler.cached("acme").unwrap(), None);
    }

    #[tokio::test]
    async fn test_association_edit_rehomes_record() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh17"))]);
        let reconciler = Reconciler::new(MemoryCache::new());

        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert_eq!(entry.malformed_association().len(), 1);

        // Agent fixes the typo; 17 is fetched individually since nothing tracked it
        desk.upsert(touched(helpdesk(501, Some("gh-17"))));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert!(entry.malformed_association().is_empty());
        assert_eq!(entry.tracking().len(), 1);
        assert_eq!(tracker.single_fetches.load(Ordering::SeqCst), 1);

        desk.upsert(touched(helpdesk(501, None)));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert_eq!(entry.unassociated().len(), 1);
        assert!(entry.tracked_numbers.is_empty());
    }

    #[tokio::test]
    async fn test_new_ticket_with_missing_issue_is_unresolved() {
        let tracker = FakeTracker::default();
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-99"))]);
        let reconciler = Reconciler::new(MemoryCache::new());

        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert_eq!(entry.unresolved().len(), 1);
        assert_eq!(entry.counts().unresolved, 1);
        assert_eq!(entry.tracked_numbers, BTreeSet::from([99]));

        // The issue appears later and resolves the link through the changed set
        tracker.upsert(touched(issue(99, TicketStatus::Open)));
        let entry = reconciler
            .update_with("acme", &settings(), &tracker, &desk)
            .await
            .unwrap();
        assert!(entry.unresolved().is_empty());
        assert_eq!(entry.tracking().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_rebuild_once() {
        let tracker = FakeTracker::with(vec![issue(17, TicketStatus::Open)]);
        let desk = FakeHelpdesk::with(vec![helpdesk(501, Some("gh-17"))]);
        let reconciler = Reconciler::new(MemoryCache::new());
        let settings = settings();

        let (a, b) = tokio::join!(
            reconciler.update_with("acme", &settings, &tracker, &desk),
            reconciler.update_with("acme", &settings, &tracker, &desk),
        );

        assert_eq!(a.unwrap().without_timestamp(), b.unwrap().without_timestamp());
        assert_eq!(desk.full_searches(), 1);
    }

    #[test]
    fn test_merge_new_counterpart_is_staged_until_referenced() {
        let now = Utc::now();
        let entry = CacheEntry::new(now);
        let delta = UpdateDelta {
            counterparts: vec![issue(40, TicketStatus::Open)],
            ..Default::default()
        };

        let merged = merge(entry, delta, &rule(), now);
        assert!(merged.counterpart_tickets.is_empty());
        assert!(merged.tracked_numbers.is_empty());
        assert_eq!(merged.last_updated, now - clock_skew());

        let delta = UpdateDelta {
            counterparts: vec![issue(40, TicketStatus::Open)],
            helpdesk_tickets: vec![helpdesk(600, Some("gh-40"))],
            requester_names: names(),
            ..Default::default()
        };
        let merged = merge(merged, delta, &rule(), now);
        assert_eq!(merged.tracking().len(), 1);
        assert_eq!(merged.get(600).unwrap().helpdesk.requester, "Grace Hopper");
        assert!(merged.counterpart_tickets.contains_key(&40));
    }
}
