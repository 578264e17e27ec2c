// =============================================================================
// Concord Relation View Engine - Engine Facade Module
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
//   The facade the UI talks to. It binds one protocol client, owns the view
//   cache, and listens to the client's new-event and redaction notifications
//   over an mpsc channel. Pending notifications are applied before every read,
//   so a read never observes a view older than the last delivered event.
//
// Architecture:
//   • Reads are synchronous over a timeline snapshot
//   • Sends and redactions are the only await points
//   • Subscriptions are deregistered when the engine is dropped
//
// =============================================================================

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use concord_common::{ConcordError, Result};
use concord_core::{
    utils::{log_operation_end, log_operation_start},
    EngineConfig, Event, NotificationKind, OutgoingMessage, ProtocolClient, RoomHandle, SubscriptionId,
    TimelineNotification, TimelineVersion,
};
use ruma::{EventId, OwnedEventId, OwnedRoomId, RoomId};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, instrument, warn};

use super::{
    cache::{CacheKey, CacheStats, EntryState, RelationCache, ViewKind},
    parser::{parse_relation, Relation},
    reactions::{AggregateOptions, MessageReactions, ReactionAction, ReactionResult, ReactionState},
    threads::{
        build_room_threads, build_thread_metadata, collect_thread_replies, MutationResult, RoomThread,
        ThreadFilter, ThreadMetadata, ThreadReply, ThreadRepliesOptions,
    },
};

/// Value stored in the view cache
#[derive(Debug, Clone)]
enum CachedView {
    Metadata(Option<Arc<ThreadMetadata>>),
    Replies(Arc<Vec<ThreadReply>>),
    RoomThreads(Arc<Vec<RoomThread>>),
    Reactions(ReactionState),
}

/// Mutable state guarded by the engine
struct EngineState {
    cache: RelationCache<CachedView>,
    /// Per room, the relation of every related event seen so far, so
    /// redactions can be routed after the redacted content is gone
    relations: HashMap<OwnedRoomId, HashMap<OwnedEventId, Relation>>,
}

impl EngineState {
    fn index_relations(&mut self, room_id: &RoomId, events: &[Event]) {
        let index = self.relations.entry(room_id.to_owned()).or_default();
        for event in events {
            if index.contains_key(&event.event_id) {
                continue;
            }
            let relation = parse_relation(event);
            if relation != Relation::None {
                index.insert(event.event_id.clone(), relation);
            }
        }
    }

    fn index_relation(&mut self, room_id: &RoomId, event_id: &EventId, relation: Relation) {
        if relation == Relation::None {
            return;
        }
        self.relations
            .entry(room_id.to_owned())
            .or_default()
            .insert(event_id.to_owned(), relation);
    }

    fn indexed_relation(&self, room_id: &RoomId, event_id: &EventId) -> Option<Relation> {
        self.relations.get(room_id)?.get(event_id).cloned()
    }

    fn invalidate_thread(&mut self, room_id: &RoomId, root: &EventId) {
        self.cache
            .invalidate(&CacheKey::anchored(room_id, root, ViewKind::ThreadMetadata));
        self.cache
            .invalidate(&CacheKey::anchored(room_id, root, ViewKind::ThreadReplies));
        self.cache.invalidate(&CacheKey::room(room_id, ViewKind::RoomThreads));
    }
}

/// A single annotation change applied to cached reaction views
#[derive(Clone, Copy)]
enum ReactionChange<'a> {
    Added(&'a Event),
    Redacted { redaction: &'a EventId, reaction: &'a EventId },
}

fn reaction_key(room_id: &RoomId, target: &EventId, include_redacted: bool) -> CacheKey {
    CacheKey::anchored(room_id, target, ViewKind::Reactions { include_redacted })
}

/// Relation-derived views over the rooms of one client session
pub struct RelationViewEngine {
    client: Arc<dyn ProtocolClient>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    notifications: Mutex<UnboundedReceiver<TimelineNotification>>,
    subscriptions: Vec<SubscriptionId>,
}

impl RelationViewEngine {
    /// Bind `client` and subscribe to its live-update notifications
    pub fn new(client: Arc<dyn ProtocolClient>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| ConcordError::Config("Cache capacity cannot be 0".into()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = vec![
            client.subscribe(NotificationKind::NewEvent, tx.clone()),
            client.subscribe(NotificationKind::Redaction, tx),
        ];
        info!(
            "✅ Relation view engine bound (cache capacity {}, incremental reactions {})",
            capacity, config.incremental_reactions
        );

        Ok(Self {
            client,
            config,
            state: Mutex::new(EngineState {
                cache: RelationCache::new(capacity),
                relations: HashMap::new(),
            }),
            notifications: Mutex::new(rx),
            subscriptions,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Apply every queued notification; returns how many were applied
    pub fn process_notifications(&self) -> usize {
        let mut rx = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        let mut applied = 0;
        while let Ok(notification) = rx.try_recv() {
            self.apply_notification(notification);
            applied += 1;
        }
        if applied > 0 {
            debug!("🔧 Applied {} timeline notifications", applied);
        }
        applied
    }

    fn apply_notification(&self, notification: TimelineNotification) {
        match notification {
            TimelineNotification::NewEvent { room_id, event } => self.on_new_event(&room_id, &event),
            TimelineNotification::Redaction { room_id, redaction } => self.on_redaction(&room_id, &redaction),
        }
    }

    fn on_new_event(&self, room_id: &RoomId, event: &Event) {
        if event.redacts.is_some() {
            // handled by the redaction stream
            return;
        }

        let relation = parse_relation(event);
        let mut state = self.lock_state();
        state.index_relation(room_id, &event.event_id, relation.clone());

        match relation {
            Relation::Thread { root_event_id } => {
                debug!("🔧 New reply {} in thread {}", event.event_id, root_event_id);
                state.invalidate_thread(room_id, &root_event_id);
            }
            Relation::Annotation(annotation) => {
                debug!("🔧 New reaction {} on {}", event.event_id, annotation.target_event_id);
                self.patch_reactions(
                    &mut state,
                    room_id,
                    &annotation.target_event_id,
                    ReactionChange::Added(event),
                );
            }
            Relation::None => {}
        }
    }

    fn on_redaction(&self, room_id: &RoomId, redaction: &Event) {
        let Some(redacted) = redaction.redacts.as_deref() else {
            warn!("Redaction {} without a target", redaction.event_id);
            return;
        };

        let mut state = self.lock_state();
        match state.indexed_relation(room_id, redacted) {
            Some(Relation::Annotation(annotation)) => {
                debug!("🔧 Reaction {} on {} redacted", redacted, annotation.target_event_id);
                self.patch_reactions(
                    &mut state,
                    room_id,
                    &annotation.target_event_id,
                    ReactionChange::Redacted {
                        redaction: &redaction.event_id,
                        reaction: redacted,
                    },
                );
            }
            Some(Relation::Thread { root_event_id }) => {
                debug!("🔧 Reply {} in thread {} redacted", redacted, root_event_id);
                state.invalidate_thread(room_id, &root_event_id);
            }
            // roots and plain messages are not indexed
            Some(Relation::None) | None => {
                let dropped = state.cache.invalidate_room(room_id);
                debug!("🔧 Unknown event {} redacted, invalidated {} views", redacted, dropped);
            }
        }
    }

    /// Incrementally update both reaction views of `target`, or invalidate
    /// them when the cached entry is not exactly one step behind.
    ///
    /// An added annotation must be the last event of the live timeline. A
    /// redaction may also have been applied in place (live version unchanged).
    /// The view that keeps redacted reactions is always recomputed after a
    /// redaction, since the client may strip the redacted event's relation.
    fn patch_reactions(&self, state: &mut EngineState, room_id: &RoomId, target: &EventId, change: ReactionChange<'_>) {
        let live = self.client.room(room_id).map(|room| room.version());

        for include_redacted in [false, true] {
            let key = reaction_key(room_id, target, include_redacted);
            let patched = match (&live, self.config.incremental_reactions) {
                (Some(live), true) => match change {
                    ReactionChange::Added(event) => state.cache.patch(
                        &key,
                        |computed| computed.is_followed_by(live, &event.event_id),
                        live.clone(),
                        |view| {
                            if let CachedView::Reactions(reactions) = view {
                                reactions.apply_annotation(event);
                            }
                        },
                    ),
                    ReactionChange::Redacted { redaction, reaction } if !include_redacted => state.cache.patch(
                        &key,
                        |computed| computed.is_followed_by(live, redaction) || computed == live,
                        live.clone(),
                        |view| {
                            if let CachedView::Reactions(reactions) = view {
                                reactions.apply_redaction(reaction);
                            }
                        },
                    ),
                    ReactionChange::Redacted { .. } => false,
                },
                _ => false,
            };
            if !patched {
                state.cache.invalidate(&key);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Cached reads
    // ---------------------------------------------------------------------

    /// Serve `key` from the cache, or scan the room and cache the result
    fn read_view<F>(&self, room: &dyn RoomHandle, room_id: &RoomId, key: CacheKey, compute: F) -> CachedView
    where
        F: FnOnce(&[Event]) -> CachedView,
    {
        let current = room.version();
        let mut state = self.lock_state();
        if let Some(view) = state.cache.get(&key, &current) {
            return view;
        }

        let start = Instant::now();
        let ticket = state.cache.begin(&key);
        let events = room.events();
        let version = TimelineVersion::of(&events);
        state.index_relations(room_id, &events);

        let view = compute(&events);
        state.cache.complete(ticket, view.clone(), version);
        debug!("✅ Computed {:?} over {} events in {:?}", key.kind, events.len(), start.elapsed());
        view
    }

    /// Metadata of the thread rooted at `root`; `None` when nothing replies to it
    #[instrument(level = "debug", skip(self))]
    pub fn thread_metadata(&self, room_id: &RoomId, root: &EventId) -> Option<Arc<ThreadMetadata>> {
        self.process_notifications();
        let room = self.client.room(room_id)?;
        let me = self.client.user_id();

        let key = CacheKey::anchored(room_id, root, ViewKind::ThreadMetadata);
        match self.read_view(room.as_ref(), room_id, key, |events| {
            CachedView::Metadata(build_thread_metadata(room_id, events, root, me.as_deref()).map(Arc::new))
        }) {
            CachedView::Metadata(metadata) => metadata,
            _ => None,
        }
    }

    /// Replies to `root` in timeline order, cut to `options.max_replies`
    #[instrument(level = "debug", skip(self))]
    pub fn thread_replies(
        &self,
        room_id: &RoomId,
        root: &EventId,
        options: ThreadRepliesOptions,
    ) -> Vec<ThreadReply> {
        self.process_notifications();
        let Some(room) = self.client.room(room_id) else {
            return Vec::new();
        };

        let key = CacheKey::anchored(room_id, root, ViewKind::ThreadReplies);
        let replies = match self.read_view(room.as_ref(), room_id, key, |events| {
            CachedView::Replies(Arc::new(collect_thread_replies(events, root)))
        }) {
            CachedView::Replies(replies) => replies,
            _ => return Vec::new(),
        };

        let limit = options.max_replies.unwrap_or(replies.len());
        replies.iter().take(limit).cloned().collect()
    }

    /// Every thread in the room, most recently active first
    #[instrument(level = "debug", skip(self))]
    pub fn room_threads(&self, room_id: &RoomId) -> Vec<RoomThread> {
        self.room_threads_filtered(room_id, ThreadFilter::All)
    }

    /// Thread directory restricted by `filter`
    #[instrument(level = "debug", skip(self))]
    pub fn room_threads_filtered(&self, room_id: &RoomId, filter: ThreadFilter) -> Vec<RoomThread> {
        self.process_notifications();
        let Some(room) = self.client.room(room_id) else {
            return Vec::new();
        };
        let me = self.client.user_id();

        let key = CacheKey::room(room_id, ViewKind::RoomThreads);
        match self.read_view(room.as_ref(), room_id, key, |events| {
            CachedView::RoomThreads(Arc::new(build_room_threads(room_id, events, me.as_deref())))
        }) {
            CachedView::RoomThreads(threads) => threads.iter().filter(|t| filter.matches(t)).cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn reaction_state(&self, room_id: &RoomId, event_id: &EventId, options: AggregateOptions) -> Option<ReactionState> {
        self.process_notifications();
        let room = self.client.room(room_id)?;

        let key = reaction_key(room_id, event_id, options.include_redacted);
        match self.read_view(room.as_ref(), room_id, key, |events| {
            CachedView::Reactions(ReactionState::from_timeline(events, event_id, options))
        }) {
            CachedView::Reactions(state) => Some(state),
            _ => None,
        }
    }

    /// Reactions on `event_id`; empty when the room is unknown locally
    #[instrument(level = "debug", skip(self))]
    pub fn aggregate(&self, room_id: &RoomId, event_id: &EventId, options: AggregateOptions) -> MessageReactions {
        let me = self.client.user_id();
        match self.reaction_state(room_id, event_id, options) {
            Some(state) => state.project(me.as_deref()),
            None => MessageReactions::empty(event_id),
        }
    }

    /// Full recompute of the reaction aggregate straight from the live
    /// timeline, bypassing the cache
    pub fn recompute_reactions(&self, room_id: &RoomId, event_id: &EventId, options: AggregateOptions) -> MessageReactions {
        let start = log_operation_start("recompute_reactions");
        let me = self.client.user_id();
        let reactions = match self.client.room(room_id) {
            Some(room) => ReactionState::from_timeline(&room.events(), event_id, options).project(me.as_deref()),
            None => MessageReactions::empty(event_id),
        };
        log_operation_end("recompute_reactions", start);
        reactions
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Send a text reply into the thread rooted at `root`
    #[instrument(skip(self, content), fields(room_id = %room_id, root = %root))]
    pub async fn send_thread_reply(&self, room_id: &RoomId, root: &EventId, content: &str) -> MutationResult {
        let start = Instant::now();
        let body = content.trim();
        if body.is_empty() {
            debug!("Rejecting empty thread reply");
            return MutationResult::from(Err(ConcordError::Validation("Content cannot be empty".into())));
        }

        let message = OutgoingMessage::thread_reply(root.to_owned(), body);
        let result = self.client.send_message(room_id, message).await;
        match &result {
            Ok(event_id) => info!("✅ Sent thread reply {} in {:?}", event_id, start.elapsed()),
            Err(e) => warn!("❌ Thread reply failed: {}", e),
        }
        MutationResult::from(result)
    }

    /// Add the session user's `emoji` reaction on `event_id`, or remove every
    /// reaction event they hold with that key
    #[instrument(skip(self), fields(room_id = %room_id, event_id = %event_id))]
    pub async fn toggle_reaction(&self, room_id: &RoomId, event_id: &EventId, emoji: &str) -> ReactionResult {
        match self.toggle_reaction_inner(room_id, event_id, emoji).await {
            Ok((action, affected)) => {
                info!("✅ Reaction {} {:?} ({})", emoji, action, affected);
                ReactionResult::done(action, affected)
            }
            Err(e) => {
                warn!("❌ Reaction toggle failed: {}", e);
                ReactionResult::failed(&e)
            }
        }
    }

    async fn toggle_reaction_inner(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        emoji: &str,
    ) -> Result<(ReactionAction, OwnedEventId)> {
        if emoji.trim().is_empty() {
            return Err(ConcordError::Validation("Reaction cannot be empty".into()));
        }
        let me = self
            .client
            .user_id()
            .ok_or_else(|| ConcordError::Auth("Not logged in".into()))?;

        let held = self
            .reaction_state(room_id, event_id, AggregateOptions::default())
            .map(|state| state.reaction_events_of(&me, emoji))
            .unwrap_or_default();

        // a user can hold the same key more than once; removing clears all of them
        let Some(first) = held.first().cloned() else {
            let message = OutgoingMessage::reaction(event_id.to_owned(), emoji);
            let sent = self.client.send_message(room_id, message).await?;
            return Ok((ReactionAction::Added, sent));
        };
        for reaction_id in &held {
            self.client.redact_event(room_id, reaction_id, None).await?;
        }
        Ok((ReactionAction::Removed, first))
    }

    // ---------------------------------------------------------------------
    // Cache management
    // ---------------------------------------------------------------------

    /// Drop every cached view
    pub fn clear_cache(&self) {
        let mut state = self.lock_state();
        state.cache.clear();
        state.relations.clear();
    }

    /// Invalidate the thread views of `root`; no-op if none are cached
    pub fn invalidate_thread_cache(&self, room_id: &RoomId, root: &EventId) {
        self.lock_state().invalidate_thread(room_id, root);
    }

    /// Invalidate both reaction views of `event_id`
    pub fn invalidate_reactions(&self, room_id: &RoomId, event_id: &EventId) {
        let mut state = self.lock_state();
        for include_redacted in [false, true] {
            state.cache.invalidate(&reaction_key(room_id, event_id, include_redacted));
        }
    }

    /// Invalidate every view of a room and forget its relation index
    pub fn invalidate_room(&self, room_id: &RoomId) -> usize {
        let mut state = self.lock_state();
        state.relations.remove(room_id);
        state.cache.invalidate_room(room_id)
    }

    /// State of a cache entry; `None` means absent
    pub fn entry_state(&self, key: &CacheKey) -> Option<EntryState> {
        self.lock_state().cache.state(key)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_state().cache.stats()
    }
}

impl Drop for RelationViewEngine {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.client.unsubscribe(id);
        }
        debug!("🔧 Relation view engine torn down");
    }
}
