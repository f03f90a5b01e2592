use anyhow::{bail, Result};
use site_warden::engine::{ReconcileError, Reconciler};
use site_warden::rules::{MemoryRuleTable, NativeRule, RuleTable, RuleTableUpdate};
use site_warden::store::types::{BlockedWebsite, RuleAssignments, RuleId};
use site_warden::store::{
    IdentityStore, MappingStore, MemoryIdentityStore, MemoryMappingStore, Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const BLOCK_PAGE: &str = "/blocked.html";

// --- Mocks ---

/// Counts batch applications so tests can assert "zero mutations".
struct CountingRuleTable {
    inner: MemoryRuleTable,
    applies: AtomicUsize,
}

impl CountingRuleTable {
    fn new() -> Self {
        Self {
            inner: MemoryRuleTable::new(),
            applies: AtomicUsize::new(0),
        }
    }

    fn with_rules(rules: Vec<NativeRule>) -> Self {
        Self {
            inner: MemoryRuleTable::with_rules(rules),
            applies: AtomicUsize::new(0),
        }
    }

    fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RuleTable for CountingRuleTable {
    async fn active_rules(&self) -> Result<Vec<NativeRule>> {
        self.inner.active_rules().await
    }

    async fn apply(&self, update: RuleTableUpdate) -> Result<()> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(update).await
    }
}

/// Rule table whose atomic update always fails, leaving its rules untouched.
struct FailingRuleTable {
    inner: MemoryRuleTable,
}

#[async_trait::async_trait]
impl RuleTable for FailingRuleTable {
    async fn active_rules(&self) -> Result<Vec<NativeRule>> {
        self.inner.active_rules().await
    }

    async fn apply(&self, _update: RuleTableUpdate) -> Result<()> {
        bail!("simulated native update failure")
    }
}

/// Identity store whose reads fail.
struct UnreadableIdentityStore {
    inner: MemoryIdentityStore,
}

#[async_trait::async_trait]
impl IdentityStore for UnreadableIdentityStore {
    async fn load(&self) -> Result<Vec<BlockedWebsite>> {
        bail!("simulated storage read failure")
    }

    async fn save(&self, websites: &[BlockedWebsite]) -> Result<()> {
        self.inner.save(websites).await
    }

    fn subscribe(&self) -> Subscription {
        self.inner.subscribe()
    }
}

/// Mapping store that accepts reads but rejects writes.
struct ReadOnlyMappingStore {
    inner: MemoryMappingStore,
}

#[async_trait::async_trait]
impl MappingStore for ReadOnlyMappingStore {
    async fn load(&self) -> Result<RuleAssignments> {
        self.inner.load().await
    }

    async fn save(&self, _assignments: &RuleAssignments) -> Result<()> {
        bail!("simulated storage write failure")
    }
}

// --- Helpers ---

fn site(uuid: Uuid, url: &str) -> BlockedWebsite {
    BlockedWebsite {
        uuid,
        url: url.to_string(),
    }
}

async fn assert_converged(table: &dyn RuleTable, mapping: &dyn MappingStore) {
    let live: Vec<RuleId> = table
        .active_rules()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    let assignments = mapping.load().await.unwrap();
    let mut assigned: Vec<RuleId> = assignments.uuid_to_rule_id.values().copied().collect();
    let mut live_sorted = live.clone();
    assigned.sort_unstable();
    live_sorted.sort_unstable();
    assert_eq!(
        live_sorted, assigned,
        "live rule IDs must equal the assignment value set"
    );
}

// --- Tests ---

#[tokio::test]
async fn test_new_entry_gets_rule_and_assignment() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());
    let a = Uuid::new_v4();
    identity.save(&[site(a, "example.com")]).await.unwrap();

    let reconciler = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    let outcome = reconciler.reconcile().await.unwrap();

    assert_eq!(outcome.rules_added, 1);
    assert_eq!(outcome.rules_removed, 0);

    let active = table.active_rules().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, 1);
    assert_eq!(
        active[0].condition.regex_filter,
        "^https?://(www\\.)?example\\.com"
    );

    let assignments = mapping.load().await.unwrap();
    assert_eq!(assignments.uuid_to_rule_id[&a], 1);
    assert_eq!(assignments.next_rule_id, 2);
    assert_converged(table.as_ref(), mapping.as_ref()).await;
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());
    identity
        .save(&[site(Uuid::new_v4(), "example.com")])
        .await
        .unwrap();

    let reconciler = Reconciler::new(identity, mapping, table.clone(), BLOCK_PAGE);
    reconciler.reconcile().await.unwrap();
    let second = reconciler.reconcile().await.unwrap();

    assert!(second.is_noop());
    assert_eq!(table.apply_count(), 1, "converged run must not touch the table");
}

#[tokio::test]
async fn test_emptying_the_list_clears_rules_but_not_the_counter() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());
    identity
        .save(&[site(Uuid::new_v4(), "example.com")])
        .await
        .unwrap();

    let reconciler = Reconciler::new(identity.clone(), mapping.clone(), table.clone(), BLOCK_PAGE);
    reconciler.reconcile().await.unwrap();

    identity.save(&[]).await.unwrap();
    let outcome = reconciler.reconcile().await.unwrap();

    assert_eq!(outcome.rules_removed, 1);
    assert!(table.active_rules().await.unwrap().is_empty());

    let assignments = mapping.load().await.unwrap();
    assert!(assignments.uuid_to_rule_id.is_empty());
    assert_eq!(assignments.next_rule_id, 2);
}

#[tokio::test]
async fn test_stability_and_no_reuse_across_churn() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    identity
        .save(&[site(a, "a.com"), site(b, "b.com")])
        .await
        .unwrap();

    let reconciler = Reconciler::new(identity.clone(), mapping.clone(), table.clone(), BLOCK_PAGE);
    reconciler.reconcile().await.unwrap();

    // Drop b, add c. a must keep its rule; c must not inherit b's retired ID.
    let c = Uuid::new_v4();
    identity
        .save(&[site(a, "a.com"), site(c, "c.com")])
        .await
        .unwrap();
    reconciler.reconcile().await.unwrap();

    let assignments = mapping.load().await.unwrap();
    assert_eq!(assignments.uuid_to_rule_id[&a], 1);
    assert_eq!(assignments.uuid_to_rule_id[&c], 3);
    assert_eq!(assignments.next_rule_id, 4);

    let mut live: Vec<RuleId> = table
        .active_rules()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    live.sort_unstable();
    assert_eq!(live, vec![1, 3]);
    assert_converged(table.as_ref(), mapping.as_ref()).await;
}

#[tokio::test]
async fn test_recovers_missing_native_rule_with_old_id() {
    // Mapping says rule 5 exists but the table lost it (e.g. prior crash).
    let identity = Arc::new(MemoryIdentityStore::new());
    let a = Uuid::new_v4();
    identity.save(&[site(a, "x.com")]).await.unwrap();

    let mut prior = RuleAssignments::default();
    prior.uuid_to_rule_id.insert(a, 5);
    prior.next_rule_id = 6;
    let mapping = Arc::new(MemoryMappingStore::with_assignments(prior.clone()));
    let table = Arc::new(CountingRuleTable::new());

    let reconciler = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    let outcome = reconciler.reconcile().await.unwrap();

    assert_eq!(outcome.rules_added, 1);
    let active = table.active_rules().await.unwrap();
    assert_eq!(active[0].id, 5, "must reuse the persisted ID, not allocate");
    assert_eq!(mapping.load().await.unwrap(), prior);
}

#[tokio::test]
async fn test_sweeps_orphan_rules_left_by_partial_failure() {
    // A rule nothing maps to is live; it must be removed.
    let identity = Arc::new(MemoryIdentityStore::new());
    let a = Uuid::new_v4();
    identity.save(&[site(a, "a.com")]).await.unwrap();

    let orphan = site_warden::rules::build_redirect_rule(9, "stale.com", BLOCK_PAGE);
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::with_rules(vec![orphan]));

    let reconciler = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    let outcome = reconciler.reconcile().await.unwrap();

    assert_eq!(outcome.rules_added, 1);
    assert_eq!(outcome.rules_removed, 1);
    assert_converged(table.as_ref(), mapping.as_ref()).await;
}

#[tokio::test]
async fn test_read_failure_mutates_nothing() {
    let identity = Arc::new(UnreadableIdentityStore {
        inner: MemoryIdentityStore::new(),
    });
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());

    let reconciler = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    let err = reconciler.reconcile().await.unwrap_err();

    assert!(matches!(err, ReconcileError::StorageRead(_)));
    assert_eq!(table.apply_count(), 0);
    assert_eq!(mapping.load().await.unwrap(), RuleAssignments::default());
}

#[tokio::test]
async fn test_native_failure_keeps_assignments_and_retries_cleanly() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let a = Uuid::new_v4();
    identity.save(&[site(a, "example.com")]).await.unwrap();
    let mapping = Arc::new(MemoryMappingStore::new());

    let failing = Arc::new(FailingRuleTable {
        inner: MemoryRuleTable::new(),
    });
    let reconciler = Reconciler::new(identity.clone(), mapping.clone(), failing, BLOCK_PAGE);
    let err = reconciler.reconcile().await.unwrap_err();

    assert!(matches!(err, ReconcileError::NativeUpdate(_)));
    // Assignments untouched, so the retry starts from the same point.
    assert_eq!(mapping.load().await.unwrap(), RuleAssignments::default());

    // Retry against a healthy table converges and allocates the same ID the
    // failed run would have.
    let table = Arc::new(CountingRuleTable::new());
    let retry = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    retry.reconcile().await.unwrap();
    assert_eq!(mapping.load().await.unwrap().uuid_to_rule_id[&a], 1);
    assert_converged(table.as_ref(), mapping.as_ref()).await;
}

#[tokio::test]
async fn test_mapping_write_failure_surfaces_after_rules_land() {
    let identity = Arc::new(MemoryIdentityStore::new());
    let a = Uuid::new_v4();
    identity.save(&[site(a, "example.com")]).await.unwrap();

    let readonly = Arc::new(ReadOnlyMappingStore {
        inner: MemoryMappingStore::new(),
    });
    let table = Arc::new(CountingRuleTable::new());

    let reconciler = Reconciler::new(identity.clone(), readonly, table.clone(), BLOCK_PAGE);
    let err = reconciler.reconcile().await.unwrap_err();
    assert!(matches!(err, ReconcileError::StorageWrite(_)));

    // The rule landed; a later run with a working mapping store converges to
    // the same assignment because it sees rule 1 already live.
    let mapping = Arc::new(MemoryMappingStore::new());
    let retry = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);
    let outcome = retry.reconcile().await.unwrap();
    assert!(outcome.is_noop());
    assert_eq!(mapping.load().await.unwrap().uuid_to_rule_id[&a], 1);
    assert_converged(table.as_ref(), mapping.as_ref()).await;
}

#[tokio::test]
async fn test_overlapping_runs_end_converged() {
    // Two reconcilers over the same stores, fired back to back without an
    // intervening change. The second run sees the first one's writes and
    // becomes a pure no-op recomputation.
    let identity = Arc::new(MemoryIdentityStore::new());
    identity
        .save(&[site(Uuid::new_v4(), "a.com"), site(Uuid::new_v4(), "b.com")])
        .await
        .unwrap();
    let mapping = Arc::new(MemoryMappingStore::new());
    let table = Arc::new(CountingRuleTable::new());

    let first = Reconciler::new(identity.clone(), mapping.clone(), table.clone(), BLOCK_PAGE);
    let second = Reconciler::new(identity, mapping.clone(), table.clone(), BLOCK_PAGE);

    let (r1, r2) = tokio::join!(first.reconcile(), second.reconcile());
    r1.unwrap();
    r2.unwrap();

    assert_converged(table.as_ref(), mapping.as_ref()).await;
    let active = table.active_rules().await.unwrap();
    assert_eq!(active.len(), 2);
}
