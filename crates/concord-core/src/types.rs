//! Core types for Concord
//!
//! This module defines the timeline-facing types shared by the protocol client
//! bindings and the relation view engine: observed events, the cheap timeline
//! version stamp, live-update notifications and the outgoing relation payloads.
//!
//! Identifiers are the protocol's own (`ruma`) owned id types, so a malformed id
//! can never reach the engine's indexes.

use ruma::{OwnedEventId, OwnedRoomId, OwnedUserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds since the unix epoch, as carried by `origin_server_ts`
pub type Timestamp = u64;

/// A timeline event as observed locally.
///
/// Events are immutable once observed. A redaction does not rewrite the
/// original event in place; the client re-delivers it with `redacted` set and
/// appends the redaction event (whose `redacts` names the target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: OwnedEventId,
    pub sender: OwnedUserId,
    pub origin_server_ts: Timestamp,
    #[serde(default)]
    pub content: Value,
    /// Raw relation descriptor, when the client exposes it outside `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Value>,
    #[serde(default)]
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<OwnedEventId>,
    /// Id of the latest replacement (edit) event, if the message was edited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<OwnedEventId>,
}

impl Event {
    pub fn new(
        event_id: OwnedEventId,
        sender: OwnedUserId,
        origin_server_ts: Timestamp,
        content: Value,
    ) -> Self {
        Self {
            event_id,
            sender,
            origin_server_ts,
            content,
            relation: None,
            redacted: false,
            redacts: None,
            replaced_by: None,
        }
    }

    /// Attach a raw relation descriptor
    pub fn with_relation(mut self, relation: Value) -> Self {
        self.relation = Some(relation);
        self
    }

    /// Mark the event as redacted
    pub fn into_redacted(mut self) -> Self {
        self.redacted = true;
        self
    }

    /// Turn the event into a redaction of `target`
    pub fn redacting(mut self, target: OwnedEventId) -> Self {
        self.redacts = Some(target);
        self
    }

    /// Record that the event was replaced by a later edit
    pub fn edited_by(mut self, replacement: OwnedEventId) -> Self {
        self.replaced_by = Some(replacement);
        self
    }

    /// Text body of a message event, if any
    pub fn body(&self) -> Option<&str> {
        self.content.get("body").and_then(Value::as_str)
    }
}

/// Version stamp of a room timeline.
///
/// Two stamps are equal only if the timeline has the same length and ends on
/// the same event, which is enough for an append-mostly sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineVersion {
    pub len: usize,
    pub last_event_id: Option<OwnedEventId>,
}

impl TimelineVersion {
    /// Stamp for a timeline snapshot
    pub fn of(events: &[Event]) -> Self {
        Self {
            len: events.len(),
            last_event_id: events.last().map(|e| e.event_id.clone()),
        }
    }

    /// Whether `next` is this version with exactly `event_id` appended
    pub fn is_followed_by(&self, next: &TimelineVersion, event_id: &ruma::EventId) -> bool {
        next.len == self.len + 1 && next.last_event_id.as_deref() == Some(event_id)
    }
}

/// Which live-update stream a subscription listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NewEvent,
    Redaction,
}

/// A live-update notification delivered by the protocol client
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineNotification {
    /// A new event was appended to the room's live timeline
    NewEvent { room_id: OwnedRoomId, event: Event },
    /// `redaction` (whose `redacts` names the target) was applied in the room
    Redaction { room_id: OwnedRoomId, redaction: Event },
}

impl TimelineNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            TimelineNotification::NewEvent { .. } => NotificationKind::NewEvent,
            TimelineNotification::Redaction { .. } => NotificationKind::Redaction,
        }
    }

    pub fn room_id(&self) -> &ruma::RoomId {
        match self {
            TimelineNotification::NewEvent { room_id, .. }
            | TimelineNotification::Redaction { room_id, .. } => room_id,
        }
    }
}

/// Handle returned by a subscription, used to deregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Relation types this client sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelType {
    Thread,
    Annotation,
}

/// Outgoing `relatesTo` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatesTo {
    pub rel_type: RelType,
    pub event_id: OwnedEventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Payload handed to `ProtocolClient::send_message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub relates_to: RelatesTo,
}

impl OutgoingMessage {
    /// Text reply inside the thread anchored at `root`
    pub fn thread_reply(root: OwnedEventId, body: impl Into<String>) -> Self {
        Self {
            msgtype: Some("text".to_owned()),
            body: Some(body.into()),
            relates_to: RelatesTo {
                rel_type: RelType::Thread,
                event_id: root,
                key: None,
            },
        }
    }

    /// Emoji annotation on `target`
    pub fn reaction(target: OwnedEventId, key: impl Into<String>) -> Self {
        Self {
            msgtype: None,
            body: None,
            relates_to: RelatesTo {
                rel_type: RelType::Annotation,
                event_id: target,
                key: Some(key.into()),
            },
        }
    }
}
