//! services/studio/src/cache/store.rs
//!
//! The in-memory entity cache shared by the client facade and the session.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::invalidation::Mutation;
use super::key::CacheKey;

/// Mutations remembered for settling reads that were in flight while they ran.
const MUTATION_LOG: usize = 64;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
    stale: bool,
}

impl Entry {
    fn fresh<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            fetched_at: Instant::now(),
            stale: false,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    /// Bumped by every mutation, purge and clear.
    generation: u64,
    recent: VecDeque<(u64, Mutation)>,
}

impl Inner {
    /// Whether anything since `observed` invalidated or removed `key`. When
    /// the log no longer reaches back that far the answer is yes.
    fn touched_since(&self, key: &CacheKey, observed: u64) -> bool {
        if self.generation == observed {
            return false;
        }
        match self.recent.front() {
            Some((first, _)) if *first <= observed + 1 => self
                .recent
                .iter()
                .filter(|(generation, _)| *generation > observed)
                .any(|(_, mutation)| mutation.touches(key)),
            _ => true,
        }
    }

    fn forget_history(&mut self) {
        self.generation += 1;
        self.recent.clear();
    }
}

/// Maps typed keys to the last fetched value of an entity or list.
///
/// A value is served from the cache only while it is *fresh*: not marked
/// stale by an invalidation and younger than `stale_time`. Values are stored
/// type-erased and cloned out on read; a read with the wrong type is a miss.
///
/// Reads record the cache `generation` before they go to the network and
/// settle through `insert_fetched`; an answer overtaken by a mutation of the
/// same entry is not stored.
pub struct EntityCache {
    inner: RwLock<Inner>,
    stale_time: Duration,
}

impl EntityCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            stale_time,
        }
    }

    /// The cached value, only if it is fresh.
    pub async fn get_fresh<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.read().await;
        let entry = inner.entries.get(key)?;
        if entry.stale || entry.fetched_at.elapsed() >= self.stale_time {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// The cached value regardless of freshness.
    pub async fn peek<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let inner = self.inner.read().await;
        inner.entries.get(key)?.value.downcast_ref::<T>().cloned()
    }

    /// `Some(true)` when the entry exists but would not be served.
    pub async fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .map(|e| e.stale || e.fetched_at.elapsed() >= self.stale_time)
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().await.entries.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Stores a value the caller knows to be current, such as the entity a
    /// mutation just returned.
    pub async fn insert<T>(&self, key: CacheKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.inner.write().await.entries.insert(key, Entry::fresh(value));
    }

    /// Stores the answer of a read that started at generation `observed`.
    /// Returns `false` and leaves the entry alone when a mutation, purge or
    /// clear has touched `key` since.
    pub async fn insert_fetched<T>(&self, key: CacheKey, value: T, observed: u64) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut inner = self.inner.write().await;
        if inner.touched_since(&key, observed) {
            debug!(kind = key.kind.as_str(), "Discarded a read overtaken by a mutation.");
            return false;
        }
        inner.entries.insert(key, Entry::fresh(value));
        true
    }

    pub async fn remove_key(&self, key: &CacheKey) {
        self.inner.write().await.entries.remove(key);
    }

    /// Drops every entry namespaced by `org`.
    pub async fn remove_organization(&self, org: Uuid) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|key, _| key.organization_id != Some(org));
        inner.forget_history();
        let dropped = before - inner.entries.len();
        debug!(organization_id = %org, dropped, "Purged organization cache entries.");
        dropped
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.forget_history();
    }

    /// Applies a mutation's invalidations and removals under one write lock,
    /// so no reader observes half of it.
    pub async fn apply(&self, mutation: &Mutation) {
        let invalidations = mutation.invalidations();
        let removals = mutation.removals();
        let mut inner = self.inner.write().await;
        inner.entries.retain(|key, _| !removals.iter().any(|t| t.matches(key)));
        for (key, entry) in inner.entries.iter_mut() {
            if invalidations.iter().any(|t| t.matches(key)) {
                entry.stale = true;
            }
        }
        inner.generation += 1;
        let generation = inner.generation;
        inner.recent.push_back((generation, *mutation));
        while inner.recent.len() > MUTATION_LOG {
            inner.recent.pop_front();
        }
        debug!(?mutation, generation, "Applied cache invalidation.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::domain::{ContentSearchParams, UsageQuery};

    #[tokio::test(start_paused = true)]
    async fn fresh_reads_expire_after_stale_time() {
        let cache = EntityCache::new(Duration::from_secs(300));
        let key = CacheKey::usage_limits(Uuid::new_v4());
        cache.insert(key.clone(), 42u64).await;

        assert_eq!(cache.get_fresh::<u64>(&key).await, Some(42));
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get_fresh::<u64>(&key).await, None);
        assert_eq!(cache.peek::<u64>(&key).await, Some(42));
        assert_eq!(cache.is_stale(&key).await, Some(true));
    }

    #[tokio::test]
    async fn wrong_type_is_a_miss() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let key = CacheKey::user();
        cache.insert(key.clone(), "someone".to_string()).await;
        assert_eq!(cache.get_fresh::<u64>(&key).await, None);
    }

    #[tokio::test]
    async fn apply_marks_and_removes_in_one_step() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let org = Uuid::new_v4();
        let id = Uuid::new_v4();
        let list = CacheKey::content_list(org, &ContentSearchParams::default());
        let detail = CacheKey::content_detail(org, id);
        let stats = CacheKey::usage_stats(org, &UsageQuery::default());
        cache.insert(list.clone(), 1u8).await;
        cache.insert(detail.clone(), 2u8).await;
        cache.insert(stats.clone(), 3u8).await;

        cache.apply(&Mutation::ContentDeleted { org, content_id: id }).await;

        assert_eq!(cache.is_stale(&list).await, Some(true));
        assert!(!cache.contains(&detail).await);
        assert_eq!(cache.get_fresh::<u8>(&stats).await, Some(3));
    }

    #[tokio::test]
    async fn organization_purge_leaves_other_tenants_alone() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let (o1, o2) = (Uuid::new_v4(), Uuid::new_v4());
        cache.insert(CacheKey::usage_limits(o1), 1u8).await;
        cache.insert(CacheKey::usage_limits(o2), 2u8).await;
        cache.insert(CacheKey::user(), 3u8).await;

        assert_eq!(cache.remove_organization(o1).await, 1);
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get_fresh::<u8>(&CacheKey::usage_limits(o2)).await, Some(2));
    }

    #[tokio::test]
    async fn read_overtaken_by_a_mutation_is_not_stored() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let org = Uuid::new_v4();
        let list = CacheKey::content_list(org, &ContentSearchParams::default());
        let limits = CacheKey::usage_limits(org);

        let observed = cache.generation().await;
        cache
            .apply(&Mutation::ContentGenerated {
                org,
                content_id: Uuid::new_v4(),
            })
            .await;

        assert!(!cache.insert_fetched(list.clone(), 1u8, observed).await);
        assert!(!cache.contains(&list).await);
        // Untouched keys still settle normally.
        let style = CacheKey::style_detail(org, Uuid::new_v4());
        assert!(cache.insert_fetched(style.clone(), 2u8, observed).await);
        assert_eq!(cache.get_fresh::<u8>(&style).await, Some(2));
        assert!(!cache.insert_fetched(limits, 3u8, observed).await);
    }

    #[tokio::test]
    async fn clear_discards_every_read_in_flight() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let observed = cache.generation().await;
        cache.clear().await;
        assert!(!cache.insert_fetched(CacheKey::organizations(), 1u8, observed).await);
        assert!(cache.is_empty().await);

        let observed = cache.generation().await;
        assert!(cache.insert_fetched(CacheKey::organizations(), 1u8, observed).await);
    }

    #[tokio::test]
    async fn reads_older_than_the_mutation_log_are_discarded() {
        let cache = EntityCache::new(Duration::from_secs(60));
        let org = Uuid::new_v4();
        let observed = cache.generation().await;
        for _ in 0..=MUTATION_LOG {
            cache.apply(&Mutation::ProfileUpdated).await;
        }
        assert!(!cache.insert_fetched(CacheKey::usage_limits(org), 1u8, observed).await);
    }
}
