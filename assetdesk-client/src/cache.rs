//! View cache with explicit freshness contracts.
//!
//! Every server-backed view the client renders lives in a slot keyed by its
//! [`ViewKey`] and, for lists, the canonical query string. Writes never touch
//! cached data; they mark the affected slots stale and announce the keys on a
//! broadcast channel so live views can re-fetch on their own schedule.
//!
//! Each key also carries an invalidation sequence. A reader takes a
//! [`Watermark`] before its remote call and hands it back to
//! [`ViewCache::store`]; a response whose key was invalidated in the meantime
//! is not cached. Slots expire after the configured entry TTL and the oldest
//! slot is evicted once the cache is full.

use crate::tickets::DashboardStats;
use assetdesk_core::{EntityRow, ListPage, Mutation, Relation, ViewKey, Worknote};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const INVALIDATION_CHANNEL_CAPACITY: usize = 256;

/// Staleness tolerance a reader signs up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Accept entries marked stale as long as they were fetched within
    /// `max_staleness`.
    BestEffort { max_staleness: Duration },
    /// Only entries no mutation has invalidated since they were fetched.
    #[default]
    Consistent,
}

impl Freshness {
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    pub fn consistent() -> Self {
        Self::Consistent
    }

    fn accepts(&self, stale: bool, age: Duration) -> bool {
        match self {
            Freshness::Consistent => !stale,
            Freshness::BestEffort { max_staleness } => !stale || age <= *max_staleness,
        }
    }
}

/// Cached payload of one view.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedView {
    Page(ListPage<EntityRow>),
    Entity(EntityRow),
    Relations(Vec<Relation>),
    Worknotes(Vec<Worknote>),
    Dashboard(DashboardStats),
}

/// A cache hit with its age and invalidation state.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    stale: bool,
}

impl<T> CacheRead<T> {
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Whether a mutation has invalidated this entry since it was fetched.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn age(&self) -> Duration {
        age_of(self.cached_at)
    }

    /// Map the value, dropping the hit when `f` returns `None`.
    pub fn filter_map<U>(self, f: impl FnOnce(T) -> Option<U>) -> Option<CacheRead<U>> {
        Some(CacheRead {
            value: f(self.value)?,
            cached_at: self.cached_at,
            stale: self.stale,
        })
    }
}

fn age_of(cached_at: DateTime<Utc>) -> Duration {
    (Utc::now() - cached_at).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    view: CachedView,
    fetched_at: DateTime<Utc>,
    stale: bool,
}

type Slot = (ViewKey, Option<String>);

/// A point in one key's invalidation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    key: ViewKey,
    sequence: u64,
}

impl Watermark {
    pub fn key(&self) -> ViewKey {
        self.key
    }
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    sequence: u64,
    invalidated_at: DateTime<Utc>,
}

/// Size and age bounds for cached slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Slots older than this are dropped, stale or not.
    pub entry_ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(3600),
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<Slot, CacheEntry>,
    generations: HashMap<ViewKey, Generation>,
    sequence: u64,
    /// Highest sequence dropped from `generations`. Keys without a
    /// generation report this, so pruning can only make a watermark look
    /// older, never newer.
    pruned_through: u64,
}

impl Slots {
    fn current(&self, key: ViewKey) -> u64 {
        self.generations
            .get(&key)
            .map_or(self.pruned_through, |generation| generation.sequence)
    }

    fn bump(&mut self, key: ViewKey, now: DateTime<Utc>) {
        self.sequence += 1;
        self.generations.insert(
            key,
            Generation {
                sequence: self.sequence,
                invalidated_at: now,
            },
        );
    }

    /// Drop expired slots and generations, then make room for `incoming`.
    fn evict(&mut self, limits: CacheLimits, now: DateTime<Utc>, incoming: &Slot) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| elapsed(entry.fetched_at, now) < limits.entry_ttl);

        let mut pruned_through = self.pruned_through;
        self.generations.retain(|_, generation| {
            let keep = elapsed(generation.invalidated_at, now) < limits.entry_ttl;
            if !keep {
                pruned_through = pruned_through.max(generation.sequence);
            }
            keep
        });
        self.pruned_through = pruned_through;

        if !self.entries.contains_key(incoming) {
            while !self.entries.is_empty() && self.entries.len() >= limits.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.fetched_at)
                    .map(|(slot, _)| slot.clone());
                match oldest {
                    Some(slot) => self.entries.remove(&slot),
                    None => break,
                };
            }
        }
        before.saturating_sub(self.entries.len())
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Shared view cache. Cheap to read, safe to share behind an `Arc`.
#[derive(Debug)]
pub struct ViewCache {
    slots: RwLock<Slots>,
    limits: CacheLimits,
    invalidations: broadcast::Sender<ViewKey>,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCache {
    pub fn new() -> Self {
        Self::with_limits(CacheLimits::default())
    }

    pub fn with_limits(limits: CacheLimits) -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            slots: RwLock::new(Slots::default()),
            limits,
            invalidations,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take before fetching whatever will be stored under `key`.
    pub fn watermark(&self, key: ViewKey) -> Watermark {
        Watermark {
            key,
            sequence: self.read().current(key),
        }
    }

    /// Store a view fetched after `since` was taken, clearing any stale mark
    /// on the slot.
    ///
    /// Returns `false`, leaving the slot untouched, when the key was
    /// invalidated after `since`: the response may predate that mutation.
    pub fn store(&self, since: Watermark, query: Option<&str>, view: CachedView) -> bool {
        let now = Utc::now();
        let slot = (since.key, query.map(str::to_string));
        let mut slots = self.write();
        if slots.current(since.key) != since.sequence {
            tracing::debug!(key = ?since.key, "Dropped view invalidated while in flight");
            return false;
        }
        let evicted = slots.evict(self.limits, now, &slot);
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted cached views");
        }
        slots.entries.insert(
            slot,
            CacheEntry {
                view,
                fetched_at: now,
                stale: false,
            },
        );
        true
    }

    pub fn get(
        &self,
        key: ViewKey,
        query: Option<&str>,
        freshness: Freshness,
    ) -> Option<CacheRead<CachedView>> {
        let slots = self.read();
        let entry = slots.entries.get(&(key, query.map(str::to_string)))?;
        let age = age_of(entry.fetched_at);
        if age >= self.limits.entry_ttl || !freshness.accepts(entry.stale, age) {
            return None;
        }
        Some(CacheRead {
            value: entry.view.clone(),
            cached_at: entry.fetched_at,
            stale: entry.stale,
        })
    }

    /// `None` when nothing is cached for the slot.
    pub fn is_stale(&self, key: ViewKey, query: Option<&str>) -> Option<bool> {
        self.read()
            .entries
            .get(&(key, query.map(str::to_string)))
            .map(|entry| entry.stale)
    }

    /// Mark every slot under `keys` stale, advance their watermarks and
    /// announce each key.
    ///
    /// Returns immediately; re-fetching is up to subscribers. Returns the
    /// number of slots marked.
    pub fn invalidate(&self, keys: &[ViewKey]) -> usize {
        let now = Utc::now();
        let mut marked = 0usize;
        {
            let mut slots = self.write();
            for key in keys {
                slots.bump(*key, now);
            }
            for ((slot_key, _), entry) in slots.entries.iter_mut() {
                if keys.contains(slot_key) && !entry.stale {
                    entry.stale = true;
                    marked += 1;
                }
            }
        }
        for key in keys {
            // No subscribers is fine: nothing is live to refresh.
            let _ = self.invalidations.send(*key);
        }
        tracing::debug!(keys = keys.len(), slots = marked, "Invalidated cached views");
        marked
    }

    /// Invalidate exactly the views `mutation` declares as affected.
    pub fn apply(&self, mutation: &Mutation) -> Vec<ViewKey> {
        let keys = mutation.affected_views();
        self.invalidate(&keys);
        keys
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewKey> {
        self.invalidations.subscribe()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn clear(&self) {
        self.write().entries.clear();
    }
}
