// ── Reference cache ──
//
// TTL-bounded lookup table for tag enrichment, loaded on demand from a
// `ReferenceSource`. The table is swapped atomically on reload; readers
// never observe a half-built table.
//
// One reload runs at a time. A lookup arriving while a reload is in
// flight answers from the current table if it holds data, and only
// waits when the table is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tagflow_api::{ReferenceSource, ReferenceTable};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ReferenceColumns, ReferenceConfig};
use crate::error::CoreError;
use crate::model::{Enrichment, NOT_AVAILABLE, ReferenceEntry};

type Table = HashMap<String, Arc<ReferenceEntry>>;

struct CacheState {
    table: Arc<Table>,
    /// `None` until the first successful load, and after an invalidation.
    expires_at: Option<Instant>,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            table: Arc::new(HashMap::new()),
            expires_at: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now < at)
    }

    fn get(&self, key: &str) -> Option<Arc<ReferenceEntry>> {
        self.table.get(key).cloned()
    }
}

/// Normalized form of a reference key: trimmed, lowercase.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// On-demand, TTL-bounded reference table.
pub struct ReferenceCache<S> {
    source: S,
    columns: ReferenceColumns,
    ttl: Duration,
    state: ArcSwap<CacheState>,
    reload_lock: Mutex<()>,
}

impl<S: ReferenceSource> ReferenceCache<S> {
    pub fn new(source: S, config: &ReferenceConfig) -> Self {
        Self {
            source,
            columns: config.columns.clone(),
            ttl: config.ttl,
            state: ArcSwap::from_pointee(CacheState::empty()),
            reload_lock: Mutex::new(()),
        }
    }

    /// Find the entry for `key`, reloading first when empty or expired.
    ///
    /// `None` when the key is absent or the reload failed.
    pub async fn lookup(&self, key: &str) -> Option<Arc<ReferenceEntry>> {
        let key = normalize_key(key);
        let state = self.state.load_full();
        if state.is_fresh(Instant::now()) {
            return state.get(&key);
        }

        if let Ok(_guard) = self.reload_lock.try_lock() {
            // Another reload may have finished between the load and the lock.
            let current = self.state.load_full();
            if current.is_fresh(Instant::now()) {
                return current.get(&key);
            }
            return match self.reload_locked().await {
                Ok(_) => self.state.load().get(&key),
                Err(_) => None,
            };
        }

        if !state.table.is_empty() {
            debug!(key = %key, "reload in flight, answering from stale table");
            return state.get(&key);
        }

        let _guard = self.reload_lock.lock().await;
        let current = self.state.load_full();
        if current.is_fresh(Instant::now()) {
            current.get(&key)
        } else {
            None
        }
    }

    /// Fetch the whole dataset and swap it in. Returns the entry count.
    ///
    /// On failure the previous contents stay but are marked expired.
    pub async fn reload(&self) -> Result<usize, CoreError> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked().await
    }

    /// Drop the table without fetching. The next lookup reloads.
    pub fn force_refresh(&self) {
        self.state.store(Arc::new(CacheState::empty()));
        info!("reference cache cleared");
    }

    /// Entries in the current table.
    pub fn len(&self) -> usize {
        self.state.load().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the table is loaded and within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.state.load().is_fresh(Instant::now())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn reload_locked(&self) -> Result<usize, CoreError> {
        let built = match self.source.fetch_all().await {
            Ok(table) => build_table(&table, &self.columns),
            Err(e) => Err(CoreError::from_source(&e)),
        };

        match built {
            Ok(table) => {
                let count = table.len();
                self.state.store(Arc::new(CacheState {
                    table: Arc::new(table),
                    expires_at: Some(Instant::now() + self.ttl),
                }));
                info!(entries = count, "reference cache reloaded");
                Ok(count)
            }
            Err(e) => {
                let previous = self.state.load_full();
                self.state.store(Arc::new(CacheState {
                    table: Arc::clone(&previous.table),
                    expires_at: None,
                }));
                warn!(
                    operation = "reload",
                    kind = %e.kind(),
                    error = %e,
                    "reference cache reload failed"
                );
                Err(e)
            }
        }
    }
}

/// Key the rows by the identity column. Duplicate keys keep the first row.
fn build_table(source: &ReferenceTable, columns: &ReferenceColumns) -> Result<Table, CoreError> {
    let key_idx = source
        .column_index(&columns.key)
        .ok_or_else(|| CoreError::SourceUnavailable {
            message: format!("reference data has no '{}' column", columns.key),
        })?;

    let item_code = source.column_index(&columns.item_code);
    let description = source.column_index(&columns.description);
    let category = source.column_index(&columns.category);
    let location = source.column_index(&columns.location);
    let owner = source.column_index(&columns.owner);

    let mut table = HashMap::with_capacity(source.rows.len());
    for row in &source.rows {
        let key = row.get(key_idx).map(|k| normalize_key(k)).unwrap_or_default();
        if key.is_empty() {
            continue;
        }
        let enrichment = Enrichment {
            item_code: field(row, item_code),
            description: field(row, description),
            category: field(row, category),
            location: field(row, location),
            owner: field(row, owner),
        };
        table
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ReferenceEntry { key, enrichment }));
    }
    Ok(table)
}

fn field(row: &[String], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map_or_else(|| NOT_AVAILABLE.to_owned(), str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MockSource;

    fn config() -> ReferenceConfig {
        ReferenceConfig::default()
    }

    fn sample() -> ReferenceTable {
        ReferenceTable {
            columns: vec!["Tag ID".into(), "Description".into(), "Owner".into()],
            rows: vec![
                vec!["FF-0001".into(), "Pallet jack".into(), "Stores".into()],
                vec![" ff-0002 ".into(), "Forklift".into(), String::new()],
            ],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_loads_once_and_ignores_case() {
        let cache = ReferenceCache::new(MockSource::new(sample()), &config());

        let entry = cache.lookup("ff-0001").await.unwrap();
        assert_eq!(entry.enrichment.description, "Pallet jack");
        assert_eq!(entry.enrichment.item_code, NOT_AVAILABLE);

        let entry = cache.lookup("FF-0002").await.unwrap();
        assert_eq!(entry.enrichment.owner, NOT_AVAILABLE);

        assert!(cache.lookup("FF-9999").await.is_none());
        assert_eq!(cache.source().fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_table_reloads() {
        let cache = ReferenceCache::new(MockSource::new(sample()), &config());
        cache.lookup("FF-0001").await.unwrap();

        tokio::time::advance(Duration::from_secs(60 * 60 + 1)).await;
        cache.lookup("FF-0001").await.unwrap();
        assert_eq!(cache.source().fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_triggers_exactly_one_reload() {
        let cache = ReferenceCache::new(MockSource::new(sample()), &config());
        cache.lookup("FF-0001").await.unwrap();

        cache.force_refresh();
        assert!(cache.is_empty());
        assert_eq!(cache.source().fetches(), 1);

        cache.lookup("FF-0001").await.unwrap();
        cache.lookup("FF-0002").await.unwrap();
        assert_eq!(cache.source().fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reload_keeps_table_but_answers_none() {
        let cache = ReferenceCache::new(MockSource::new(sample()), &config());
        cache.lookup("FF-0001").await.unwrap();

        cache.source().fail_next(1);
        tokio::time::advance(Duration::from_secs(60 * 60 + 1)).await;
        assert!(cache.lookup("FF-0001").await.is_none());
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_fresh());

        // Still expired, so the next lookup tries again and succeeds.
        assert!(cache.lookup("FF-0001").await.is_some());
        assert_eq!(cache.source().fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_column_is_source_unavailable() {
        let table = ReferenceTable {
            columns: vec!["Serial".into()],
            rows: vec![vec!["FF-0001".into()]],
        };
        let cache = ReferenceCache::new(MockSource::new(table), &config());
        let err = cache.reload().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_during_reload_uses_stale_table() {
        let source = MockSource::new(sample()).with_delay(Duration::from_secs(2));
        let cache = Arc::new(ReferenceCache::new(source, &config()));
        cache.reload().await.unwrap();
        tokio::time::advance(Duration::from_secs(60 * 60 + 1)).await;

        let reloading = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.reload().await })
        };
        tokio::task::yield_now().await;

        // The reload is parked in the source; this lookup must not wait for it.
        let entry = cache.lookup("ff-0001").await.unwrap();
        assert_eq!(entry.enrichment.description, "Pallet jack");
        assert_eq!(cache.source().fetches(), 2);

        reloading.await.unwrap().unwrap();
        assert!(cache.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_on_empty_table_waits_for_the_reload_in_flight() {
        let source = MockSource::new(sample()).with_delay(Duration::from_secs(2));
        let cache = Arc::new(ReferenceCache::new(source, &config()));

        let reloading = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.reload().await })
        };
        tokio::task::yield_now().await;

        // Nothing stale to answer from, so the lookup rides on that reload.
        let entry = cache.lookup("ff-0002").await.unwrap();
        assert_eq!(entry.enrichment.description, "Forklift");
        assert_eq!(cache.source().fetches(), 1);
        assert_eq!(reloading.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_on_empty_table_is_none_when_the_reload_in_flight_fails() {
        let source = MockSource::new(sample()).with_delay(Duration::from_secs(2));
        source.fail_next(1);
        let cache = Arc::new(ReferenceCache::new(source, &config()));

        let reloading = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.reload().await })
        };
        tokio::task::yield_now().await;

        assert!(cache.lookup("FF-0001").await.is_none());
        // The waiting lookup does not start a second fetch of its own.
        assert_eq!(cache.source().fetches(), 1);
        assert!(cache.is_empty());
        assert!(reloading.await.unwrap().is_err());
    }
}
