// =============================================================================
// Concord Relation View Engine - Thread Index Module
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
//   Thread metadata, reply lists and the room-level thread directory, built
//   from a timeline snapshot in one oldest-to-newest pass. Thread views are
//   never patched: the engine either serves a cached value or rebuilds it.
//
// =============================================================================

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use concord_common::ConcordError;
use concord_core::{utils::timestamp_to_datetime, Event, Timestamp};
use ruma::{EventId, OwnedEventId, OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde::Serialize;

use super::parser::thread_root_id;

/// Aggregated state of one thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMetadata {
    pub root_event_id: OwnedEventId,
    pub room_id: OwnedRoomId,
    pub reply_count: usize,
    pub latest_reply_ts: Timestamp,
    /// Senders of replies. The root author only appears if they replied.
    pub participants: BTreeSet<OwnedUserId>,
    pub user_participated: bool,
}

impl ThreadMetadata {
    pub fn latest_reply_time(&self) -> Option<DateTime<Utc>> {
        timestamp_to_datetime(self.latest_reply_ts)
    }
}

/// One reply in a thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadReply {
    pub event: Event,
    pub sender: OwnedUserId,
    /// Message body, empty when the event carries none
    pub content: String,
    pub timestamp: Timestamp,
    pub is_edited: bool,
    pub is_redacted: bool,
}

impl ThreadReply {
    pub fn from_event(event: &Event) -> Self {
        Self {
            sender: event.sender.clone(),
            content: event.body().unwrap_or_default().to_owned(),
            timestamp: event.origin_server_ts,
            is_edited: event.replaced_by.is_some(),
            is_redacted: event.redacted,
            event: event.clone(),
        }
    }
}

/// Options for `thread_replies`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadRepliesOptions {
    /// Keep only the first `n` replies in timeline order
    pub max_replies: Option<usize>,
}

/// Entry of the room thread directory
#[derive(Debug, Clone, PartialEq)]
pub struct RoomThread {
    pub metadata: Arc<ThreadMetadata>,
    /// The root event, when it is present in the local timeline
    pub root: Option<Event>,
}

/// Thread directory filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadFilter {
    #[default]
    All,
    /// Only threads the session user replied in
    Participated,
}

impl ThreadFilter {
    pub fn matches(&self, thread: &RoomThread) -> bool {
        match self {
            ThreadFilter::All => true,
            ThreadFilter::Participated => thread.metadata.user_participated,
        }
    }
}

/// Outcome of `send_thread_reply`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<OwnedEventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<OwnedEventId, ConcordError>> for MutationResult {
    fn from(result: Result<OwnedEventId, ConcordError>) -> Self {
        match result {
            Ok(event_id) => Self {
                success: true,
                event_id: Some(event_id),
                error: None,
            },
            Err(err) => Self {
                success: false,
                event_id: None,
                error: Some(err.message().to_owned()),
            },
        }
    }
}

/// Running totals for one root during a scan
struct ThreadAccumulator {
    reply_count: usize,
    latest_reply_ts: Timestamp,
    participants: BTreeSet<OwnedUserId>,
    /// Timeline position used to break ties in the directory
    arrival: usize,
}

impl ThreadAccumulator {
    fn new(arrival: usize) -> Self {
        Self {
            reply_count: 0,
            latest_reply_ts: 0,
            participants: BTreeSet::new(),
            arrival,
        }
    }

    fn add(&mut self, reply: &Event) {
        self.reply_count += 1;
        self.latest_reply_ts = self.latest_reply_ts.max(reply.origin_server_ts);
        self.participants.insert(reply.sender.clone());
    }

    fn finish(self, room_id: &RoomId, root: OwnedEventId, current_user: Option<&UserId>) -> ThreadMetadata {
        let user_participated = current_user.is_some_and(|me| self.participants.contains(me));
        ThreadMetadata {
            root_event_id: root,
            room_id: room_id.to_owned(),
            reply_count: self.reply_count,
            latest_reply_ts: self.latest_reply_ts,
            participants: self.participants,
            user_participated,
        }
    }
}

/// Metadata of the thread rooted at `root`, `None` if nothing replies to it
pub fn build_thread_metadata(
    room_id: &RoomId,
    events: &[Event],
    root: &EventId,
    current_user: Option<&UserId>,
) -> Option<ThreadMetadata> {
    let mut acc = ThreadAccumulator::new(0);
    for event in events {
        if thread_root_id(event).as_deref() == Some(root) {
            acc.add(event);
        }
    }

    (acc.reply_count > 0).then(|| acc.finish(room_id, root.to_owned(), current_user))
}

/// Replies to `root` in timeline order
pub fn collect_thread_replies(events: &[Event], root: &EventId) -> Vec<ThreadReply> {
    events
        .iter()
        .filter(|event| thread_root_id(event).as_deref() == Some(root))
        .map(ThreadReply::from_event)
        .collect()
}

/// Every thread in the room, most recently active first
pub fn build_room_threads(room_id: &RoomId, events: &[Event], current_user: Option<&UserId>) -> Vec<RoomThread> {
    let positions: HashMap<&EventId, usize> = events
        .iter()
        .enumerate()
        .map(|(pos, event)| (&*event.event_id, pos))
        .collect();

    let mut threads: HashMap<OwnedEventId, ThreadAccumulator> = HashMap::new();
    for (pos, event) in events.iter().enumerate() {
        let Some(root) = thread_root_id(event) else {
            continue;
        };
        let arrival = positions.get(&*root).copied().unwrap_or(pos);
        threads
            .entry(root)
            .or_insert_with(|| ThreadAccumulator::new(arrival))
            .add(event);
    }

    let mut directory: Vec<(usize, RoomThread)> = threads
        .into_iter()
        .map(|(root, acc)| {
            let arrival = acc.arrival;
            let root_event = positions.get(&*root).map(|&pos| events[pos].clone());
            let metadata = Arc::new(acc.finish(room_id, root, current_user));
            (arrival, RoomThread { metadata, root: root_event })
        })
        .collect();

    directory.sort_by(|(a_arrival, a), (b_arrival, b)| {
        b.metadata
            .latest_reply_ts
            .cmp(&a.metadata.latest_reply_ts)
            .then_with(|| a_arrival.cmp(b_arrival))
    });
    directory.into_iter().map(|(_, thread)| thread).collect()
}
