// ── Concurrent tag store ──
//
// Lock-free concurrent storage keyed by tag identity, with a single
// atomic counter handing out scan orders. Per-key atomicity comes from
// the `DashMap` entry API: the order is allocated while the vacant
// entry is held, so concurrent first sightings of one key allocate
// exactly once and the sequence has no gaps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::Tag;

/// Which branch an [`TagStore::upsert`] took.
#[derive(Debug, Clone)]
pub enum Upserted {
    Added(Arc<Tag>),
    Updated(Arc<Tag>),
}

impl Upserted {
    pub fn tag(&self) -> &Arc<Tag> {
        match self {
            Self::Added(tag) | Self::Updated(tag) => tag,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Authoritative map of known tags.
pub struct TagStore {
    by_key: DashMap<String, Arc<Tag>>,

    /// Last scan order handed out. Never reset, so orders are never reused.
    last_order: AtomicU64,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,
}

impl Default for TagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TagStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            by_key: DashMap::new(),
            last_order: AtomicU64::new(0),
            version,
        }
    }

    /// Insert a new tag built by `insert`, or apply `update` to the known one.
    ///
    /// `insert` receives the freshly allocated scan order. Exactly one of the
    /// two closures runs, under the key's shard lock.
    pub fn upsert(
        &self,
        key: &str,
        insert: impl FnOnce(u64) -> Tag,
        update: impl FnOnce(&mut Tag),
    ) -> Upserted {
        self.upsert_and_then(key, insert, update, |_| {})
    }

    /// Like [`upsert`](Self::upsert), then hand the result to `commit`
    /// before the shard lock is released.
    ///
    /// Commits for one key therefore run in mutation order, which keeps
    /// notifications about a tag in the order its changes were applied.
    pub fn upsert_and_then(
        &self,
        key: &str,
        insert: impl FnOnce(u64) -> Tag,
        update: impl FnOnce(&mut Tag),
        commit: impl FnOnce(&Upserted),
    ) -> Upserted {
        let result = match self.by_key.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let tag = Arc::make_mut(entry.get_mut());
                update(tag);
                let result = Upserted::Updated(Arc::clone(entry.get()));
                commit(&result);
                result
            }
            Entry::Vacant(entry) => {
                let order = self.next_order();
                let tag = Arc::new(insert(order));
                let _held = entry.insert(Arc::clone(&tag));
                let result = Upserted::Added(tag);
                commit(&result);
                result
            }
        };
        self.bump_version();
        result
    }

    /// Apply `update` to a known tag. `None` when the key is unknown.
    pub fn update(&self, key: &str, update: impl FnOnce(&mut Tag)) -> Option<Arc<Tag>> {
        self.update_and_then(key, update, |_| {})
    }

    /// Like [`update`](Self::update), with `commit` run under the shard lock.
    pub fn update_and_then(
        &self,
        key: &str,
        update: impl FnOnce(&mut Tag),
        commit: impl FnOnce(&Arc<Tag>),
    ) -> Option<Arc<Tag>> {
        let updated = self.by_key.get_mut(key).map(|mut entry| {
            update(Arc::make_mut(entry.value_mut()));
            let tag = Arc::clone(entry.value());
            commit(&tag);
            tag
        })?;
        self.bump_version();
        Some(updated)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Tag>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Remove every tag classified into `zone`. Returns how many were removed.
    pub fn clear_zone(&self, zone: &str) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|_, tag| tag.zone != zone);
        let removed = before.saturating_sub(self.by_key.len());
        if removed > 0 {
            self.bump_version();
        }
        removed
    }

    /// Remove every tag. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let removed = self.by_key.len();
        self.by_key.clear();
        self.bump_version();
        removed
    }

    /// All tags ordered by first sighting.
    pub fn snapshot(&self) -> Vec<Arc<Tag>> {
        let mut tags: Vec<Arc<Tag>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        tags.sort_by_key(|tag| tag.scan_order);
        tags
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Highest scan order allocated so far (0 before the first tag).
    pub fn last_order(&self) -> u64 {
        self.last_order.load(Ordering::Acquire)
    }

    /// Subscribe to the mutation counter.
    pub fn subscribe_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn next_order(&self) -> u64 {
        self.last_order.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::*;
    use crate::model::Enrichment;

    fn tag(key: &str, zone: &str, order: u64) -> Tag {
        let now = Utc::now();
        Tag {
            identity_key: key.into(),
            raw_hex: key.into(),
            decoded_text: key.into(),
            antenna: 1,
            signal_strength: None,
            source_reader: "dock-1".into(),
            seen_count: 1,
            zone: zone.into(),
            enrichment: Enrichment::default(),
            scan_order: order,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    #[test]
    fn repeated_sightings_keep_the_first_order() {
        let store = TagStore::new();
        for _ in 0..5 {
            store.upsert("4646", |order| tag("4646", "dock", order), |t| t.seen_count += 1);
        }
        let stored = store.get("4646").unwrap();
        assert_eq!(stored.seen_count, 5);
        assert_eq!(stored.scan_order, 1);
        assert_eq!(store.last_order(), 1);
    }

    #[test]
    fn update_on_unknown_key_is_none() {
        let store = TagStore::new();
        assert!(store.update("nope", |t| t.seen_count += 1).is_none());
        assert_eq!(store.last_order(), 0);
    }

    #[test]
    fn clear_zone_keeps_other_zones_and_orders_are_not_reused() {
        let store = TagStore::new();
        store.upsert("a", |o| tag("a", "dock", o), |_| {});
        store.upsert("b", |o| tag("b", "yard", o), |_| {});
        assert_eq!(store.clear_zone("dock"), 1);
        assert!(!store.contains("a"));
        assert!(store.contains("b"));

        let readded = store.upsert("a", |o| tag("a", "dock", o), |_| {});
        assert!(readded.is_added());
        assert_eq!(readded.tag().scan_order, 3);
    }

    #[test]
    fn snapshot_is_ordered_by_scan_order() {
        let store = TagStore::new();
        for key in ["c", "a", "b"] {
            store.upsert(key, |o| tag(key, "dock", o), |_| {});
        }
        let keys: Vec<_> = store.snapshot().iter().map(|t| t.identity_key.clone()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn mutations_bump_the_version() {
        let store = TagStore::new();
        let rx = store.subscribe_version();
        store.upsert("a", |o| tag("a", "dock", o), |_| {});
        store.clear_all();
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_allocate_gap_free_orders() {
        let store = Arc::new(TagStore::new());
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    // Half the keys are shared between workers.
                    let key = if i % 2 == 0 {
                        format!("shared-{i}")
                    } else {
                        format!("w{worker}-{i}")
                    };
                    store.upsert(&key, |o| tag(&key, "dock", o), |t| t.seen_count += 1);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let orders: HashSet<u64> = store.snapshot().iter().map(|t| t.scan_order).collect();
        let expected: HashSet<u64> = (1..=store.len() as u64).collect();
        assert_eq!(orders, expected);
        assert_eq!(store.get("shared-0").unwrap().seen_count, 8);
    }

    #[test]
    fn commits_run_with_the_mutated_tag() {
        let store = TagStore::new();
        let mut seen = Vec::new();
        store.upsert_and_then("a", |o| tag("a", "dock", o), |_| {}, |r| seen.push(r.is_added()));
        store.upsert_and_then("a", |o| tag("a", "dock", o), |t| t.seen_count += 1, |r| {
            seen.push(r.is_added());
        });
        let mut count = 0;
        store.update_and_then("a", |t| t.seen_count += 1, |t| count = t.seen_count);
        store.update_and_then("nope", |_| {}, |_| panic!("commit for an unknown key"));

        assert_eq!(seen, vec![true, false]);
        assert_eq!(count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn commits_for_one_key_follow_mutation_order() {
        let store = Arc::new(TagStore::new());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                for _ in 0..200 {
                    store.upsert_and_then(
                        "shared",
                        |o| tag("shared", "dock", o),
                        |t| t.seen_count += 1,
                        |r| log.lock().unwrap().push(r.tag().seen_count),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        let expected: Vec<u64> = (1..=1600).collect();
        assert_eq!(*log, expected);
    }
}
