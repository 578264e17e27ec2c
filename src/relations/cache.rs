// =============================================================================
// Concord Relation View Engine - Relation Cache Module
// =============================================================================
//
// Project: Concord - Discord-style client for the Matrix protocol
// Author: arkSong (arksong2018@gmail.com)
// Contributors: Concord Development Team
// Date: 2026-10-16
// Version: 0.3.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Versioned cache shared by the thread and reaction views. Entries are
//   stamped with the timeline version they were computed from and only served
//   while that stamp still matches the live timeline. Invalidation marks an
//   entry stale and gives it a fresh generation, so a computation that started
//   before the latest invalidation can never be stored. Generations are drawn
//   from one cache-wide counter and never reused, including across clears and
//   evictions.
//
// =============================================================================

use std::num::NonZeroUsize;

use concord_core::TimelineVersion;
use lru::LruCache;
use ruma::{EventId, OwnedEventId, OwnedRoomId, RoomId};
use serde::Serialize;
use tracing::{debug, trace};

/// Which derived view an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    ThreadMetadata,
    ThreadReplies,
    RoomThreads,
    Reactions { include_redacted: bool },
}

/// Cache key: (room, anchor event, view kind).
///
/// Room-level views have no anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub room_id: OwnedRoomId,
    pub anchor: Option<OwnedEventId>,
    pub kind: ViewKind,
}

impl CacheKey {
    pub fn anchored(room_id: &RoomId, anchor: &EventId, kind: ViewKind) -> Self {
        Self {
            room_id: room_id.to_owned(),
            anchor: Some(anchor.to_owned()),
            kind,
        }
    }

    pub fn room(room_id: &RoomId, kind: ViewKind) -> Self {
        Self {
            room_id: room_id.to_owned(),
            anchor: None,
            kind,
        }
    }
}

/// Observable state of an entry; `Absent` is the key not being present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Cached,
    Stale,
}

#[derive(Debug)]
struct CacheEntry<T> {
    value: Option<T>,
    version: TimelineVersion,
    state: EntryState,
    generation: u64,
}

/// Proof that a computation for `key` started at `generation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeTicket {
    key: CacheKey,
    generation: u64,
}

/// Counters exposed for debugging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub patches: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// LRU-bounded, version-stamped cache of derived views
pub struct RelationCache<T> {
    entries: LruCache<CacheKey, CacheEntry<T>>,
    stats: CacheStats,
    /// Last generation handed out
    generation: u64,
}

impl<T: Clone> RelationCache<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
            generation: 0,
        }
    }

    /// Cached value, if the entry is fresh for `current`
    pub fn get(&mut self, key: &CacheKey, current: &TimelineVersion) -> Option<T> {
        let hit = match self.entries.get(key) {
            Some(entry) if entry.state == EntryState::Cached && entry.version == *current => {
                entry.value.clone()
            }
            _ => None,
        };

        if hit.is_some() {
            self.stats.hits += 1;
            trace!(?key, "Cache hit");
        } else {
            self.stats.misses += 1;
            trace!(?key, "Cache miss");
        }
        hit
    }

    /// State of an entry, without touching recency
    pub fn state(&self, key: &CacheKey) -> Option<EntryState> {
        self.entries.peek(key).map(|entry| entry.state)
    }

    /// Version an entry was computed from, if it is cached
    pub fn version(&self, key: &CacheKey) -> Option<&TimelineVersion> {
        self.entries
            .peek(key)
            .filter(|entry| entry.state == EntryState::Cached)
            .map(|entry| &entry.version)
    }

    /// Start a computation for `key`
    pub fn begin(&mut self, key: &CacheKey) -> ComputeTicket {
        if let Some(entry) = self.entries.get(key) {
            return ComputeTicket {
                key: key.clone(),
                generation: entry.generation,
            };
        }

        let generation = next_generation(&mut self.generation);
        let placeholder = CacheEntry {
            value: None,
            version: TimelineVersion::default(),
            state: EntryState::Stale,
            generation,
        };
        self.push(key.clone(), placeholder);
        ComputeTicket {
            key: key.clone(),
            generation,
        }
    }

    /// Store the result of a computation.
    ///
    /// Returns false, leaving the entry stale, if the key was invalidated,
    /// cleared or evicted since `begin`.
    pub fn complete(&mut self, ticket: ComputeTicket, value: T, version: TimelineVersion) -> bool {
        match self.entries.get_mut(&ticket.key) {
            Some(entry) if entry.generation == ticket.generation => {
                entry.value = Some(value);
                entry.version = version;
                entry.state = EntryState::Cached;
                true
            }
            _ => {
                debug!(key = ?ticket.key, "Discarding view computed before the latest invalidation");
                false
            }
        }
    }

    /// Compute-and-store in one step
    pub fn insert(&mut self, key: &CacheKey, value: T, version: TimelineVersion) -> bool {
        let ticket = self.begin(key);
        self.complete(ticket, value, version)
    }

    /// Apply an incremental update to a cached entry.
    ///
    /// `accept` sees the version the entry was computed from; the patch is
    /// applied and the entry restamped with `to` only if it returns true.
    pub fn patch<A, F>(&mut self, key: &CacheKey, accept: A, to: TimelineVersion, update: F) -> bool
    where
        A: FnOnce(&TimelineVersion) -> bool,
        F: FnOnce(&mut T),
    {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.state != EntryState::Cached || !accept(&entry.version) {
            return false;
        }
        let Some(value) = entry.value.as_mut() else {
            return false;
        };

        update(value);
        entry.version = to;
        self.stats.patches += 1;
        true
    }

    /// Mark one entry stale; no-op for unknown keys
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        match self.entries.peek_mut(key) {
            Some(entry) => {
                Self::mark_stale(entry, next_generation(&mut self.generation));
                self.stats.invalidations += 1;
                trace!(?key, "Invalidated cache entry");
                true
            }
            None => false,
        }
    }

    /// Mark every entry anchored at `anchor` in `room_id` stale
    pub fn invalidate_anchor(&mut self, room_id: &RoomId, anchor: &EventId) -> usize {
        self.invalidate_where(|key| *key.room_id == *room_id && key.anchor.as_deref() == Some(anchor))
    }

    /// Mark every entry of `room_id` stale
    pub fn invalidate_room(&mut self, room_id: &RoomId) -> usize {
        self.invalidate_where(|key| *key.room_id == *room_id)
    }

    fn invalidate_where<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut count = 0;
        for (key, entry) in self.entries.iter_mut() {
            if predicate(key) {
                Self::mark_stale(entry, next_generation(&mut self.generation));
                count += 1;
            }
        }
        self.stats.invalidations += count as u64;
        count
    }

    fn mark_stale(entry: &mut CacheEntry<T>, generation: u64) {
        entry.value = None;
        entry.state = EntryState::Stale;
        entry.generation = generation;
    }

    fn push(&mut self, key: CacheKey, entry: CacheEntry<T>) {
        if let Some((evicted, _)) = self.entries.push(key.clone(), entry) {
            if evicted != key {
                self.stats.evictions += 1;
                trace!(key = ?evicted, "Evicted cache entry");
            }
        }
    }

    /// Drop every entry; in-flight computations will not be stored
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += dropped as u64;
        debug!("🔧 Cleared {} cached views", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}

fn next_generation(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}
