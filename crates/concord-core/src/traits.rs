//! Collaborator traits for Concord
//!
//! The relation view engine never talks to the network itself. Everything it
//! needs from the protocol client (room timelines, sends, redactions, live
//! updates, the session identity) goes through these two traits, so the
//! engine can be bound to a real SDK client or to an in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;
use ruma::{EventId, OwnedEventId, OwnedUserId, RoomId};
use tokio::sync::mpsc::UnboundedSender;

use crate::types::{Event, NotificationKind, OutgoingMessage, SubscriptionId, TimelineNotification, TimelineVersion};
use crate::Result;

/// A room known locally to the protocol client
pub trait RoomHandle: Send + Sync {
    /// Snapshot of the live timeline, oldest first
    fn events(&self) -> Vec<Event>;

    /// Version stamp of the live timeline.
    ///
    /// Must equal `TimelineVersion::of(&self.events())` and be cheap: it is
    /// consulted on every cached read.
    fn version(&self) -> TimelineVersion;
}

/// The protocol client the engine is bound to
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Look up a room; `None` while the room is not synced locally
    fn room(&self, room_id: &RoomId) -> Option<Arc<dyn RoomHandle>>;

    /// Send a message-like event, returning the new event id.
    ///
    /// A rejection is reported as `ConcordError::Transport`.
    async fn send_message(&self, room_id: &RoomId, message: OutgoingMessage) -> Result<OwnedEventId>;

    /// Redact an event, returning the id of the redaction event
    async fn redact_event(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        reason: Option<String>,
    ) -> Result<OwnedEventId>;

    /// Register `sink` for notifications of `kind`
    fn subscribe(&self, kind: NotificationKind, sink: UnboundedSender<TimelineNotification>) -> SubscriptionId;

    /// Deregister a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);

    /// The session's user id, if logged in
    fn user_id(&self) -> Option<OwnedUserId>;
}
