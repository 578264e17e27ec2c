//! In-memory protocol client shared by the integration tests

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use concord::{
    core::{NotificationKind, OutgoingMessage, SubscriptionId, TimelineNotification, TimelineVersion, Timestamp},
    ConcordError, Event, ProtocolClient, Result, RoomHandle,
};
use ruma::{EventId, OwnedEventId, OwnedRoomId, OwnedUserId, RoomId, UserId};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;

pub const ALICE: &str = "@alice:example.org";
pub const BOB: &str = "@bob:example.org";
pub const CAROL: &str = "@carol:example.org";

/// First timestamp handed out to events created by the fake server
const SERVER_CLOCK_START: Timestamp = 100_000;

pub fn room_id() -> OwnedRoomId {
    RoomId::parse("!general:example.org").unwrap()
}

pub fn event_id(id: &str) -> OwnedEventId {
    EventId::parse(format!("${id}:example.org")).unwrap()
}

pub fn user_id(id: &str) -> OwnedUserId {
    UserId::parse(id).unwrap()
}

pub fn message(id: &str, sender: &str, ts: Timestamp, body: &str) -> Event {
    Event::new(event_id(id), user_id(sender), ts, json!({ "msgtype": "text", "body": body }))
}

pub fn reply(id: &str, sender: &str, ts: Timestamp, root: &str, body: &str) -> Event {
    Event::new(
        event_id(id),
        user_id(sender),
        ts,
        json!({
            "msgtype": "text",
            "body": body,
            "relatesTo": { "relType": "thread", "eventId": event_id(root) }
        }),
    )
}

pub fn reaction(id: &str, sender: &str, ts: Timestamp, target: &str, key: &str) -> Event {
    Event::new(
        event_id(id),
        user_id(sender),
        ts,
        json!({
            "relatesTo": { "relType": "annotation", "eventId": event_id(target), "key": key }
        }),
    )
}

/// Room timeline that counts full scans
#[derive(Default)]
pub struct FakeRoom {
    events: Mutex<Vec<Event>>,
    scans: AtomicUsize,
}

impl FakeRoom {
    /// How many times the engine read the whole timeline
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn append(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Re-deliver `target` as redacted; false if it is not in the timeline
    fn mark_redacted(&self, target: &EventId) -> bool {
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|event| *event.event_id == *target) {
            Some(event) => {
                event.redacted = true;
                true
            }
            None => false,
        }
    }
}

impl RoomHandle for FakeRoom {
    fn events(&self) -> Vec<Event> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.snapshot()
    }

    fn version(&self) -> TimelineVersion {
        TimelineVersion::of(&self.events.lock().unwrap())
    }
}

type Subscriber = (SubscriptionId, NotificationKind, UnboundedSender<TimelineNotification>);

/// Protocol client backed by in-memory rooms; sends land in the timeline
/// immediately and are announced to subscribers
pub struct FakeClient {
    user: Option<OwnedUserId>,
    rooms: Mutex<HashMap<OwnedRoomId, Arc<FakeRoom>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    rejection: Mutex<Option<String>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl FakeClient {
    pub fn new(user: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            user: user.map(user_id),
            rooms: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            rejection: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Register a room holding `history`, without announcing it
    pub fn add_room(&self, room_id: &RoomId, history: Vec<Event>) -> Arc<FakeRoom> {
        let room = Arc::new(FakeRoom::default());
        for event in history {
            room.append(event);
        }
        self.rooms.lock().unwrap().insert(room_id.to_owned(), room.clone());
        room
    }

    fn fake_room(&self, room_id: &RoomId) -> Option<Arc<FakeRoom>> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    /// Append an event without notifying anyone (a gap the engine missed)
    pub fn append_silently(&self, room_id: &RoomId, event: Event) {
        if let Some(room) = self.fake_room(room_id) {
            room.append(event);
        }
    }

    /// Append an event and announce it
    pub fn push(&self, room_id: &RoomId, event: Event) {
        self.append_silently(room_id, event.clone());
        self.notify(TimelineNotification::NewEvent {
            room_id: room_id.to_owned(),
            event,
        });
    }

    /// Redact `target` on behalf of `sender`, returning the redaction event id
    pub fn redact(&self, room_id: &RoomId, target: &EventId, sender: &UserId) -> Option<OwnedEventId> {
        let room = self.fake_room(room_id)?;
        if !room.mark_redacted(target) {
            return None;
        }

        let redaction = Event::new(self.next_event_id(), sender.to_owned(), self.tick(), json!({}))
            .redacting(target.to_owned());
        room.append(redaction.clone());

        // clients announce the redaction event itself as well
        self.notify(TimelineNotification::NewEvent {
            room_id: room_id.to_owned(),
            event: redaction.clone(),
        });
        let redaction_id = redaction.event_id.clone();
        self.notify(TimelineNotification::Redaction {
            room_id: room_id.to_owned(),
            redaction,
        });
        Some(redaction_id)
    }

    /// Redact `target` the way clients apply a redaction to an already
    /// synced event: the target is re-delivered as redacted and the redaction
    /// is announced, but the timeline does not grow
    pub fn redact_in_place(&self, room_id: &RoomId, target: &EventId, sender: &UserId) -> Option<OwnedEventId> {
        let room = self.fake_room(room_id)?;
        if !room.mark_redacted(target) {
            return None;
        }

        let redaction = Event::new(self.next_event_id(), sender.to_owned(), self.tick(), json!({}))
            .redacting(target.to_owned());
        let redaction_id = redaction.event_id.clone();
        self.notify(TimelineNotification::Redaction {
            room_id: room_id.to_owned(),
            redaction,
        });
        Some(redaction_id)
    }

    /// Make every following send fail with `reason`
    pub fn reject_sends(&self, reason: &str) {
        *self.rejection.lock().unwrap() = Some(reason.to_owned());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    fn notify(&self, notification: TimelineNotification) {
        let kind = notification.kind();
        for (_, subscribed, sink) in self.subscribers.lock().unwrap().iter() {
            if *subscribed == kind {
                let _ = sink.send(notification.clone());
            }
        }
    }

    fn next_event_id(&self) -> OwnedEventId {
        event_id(&format!("server{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn tick(&self) -> Timestamp {
        SERVER_CLOCK_START + self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    fn room(&self, room_id: &RoomId) -> Option<Arc<dyn RoomHandle>> {
        self.fake_room(room_id).map(|room| room as Arc<dyn RoomHandle>)
    }

    async fn send_message(&self, room_id: &RoomId, message: OutgoingMessage) -> Result<OwnedEventId> {
        if let Some(reason) = self.rejection.lock().unwrap().clone() {
            return Err(ConcordError::Transport(reason));
        }
        let sender = self
            .user
            .clone()
            .ok_or_else(|| ConcordError::Auth("Not logged in".into()))?;
        if self.fake_room(room_id).is_none() {
            return Err(ConcordError::NotFound(format!("Unknown room {room_id}")));
        }

        let content = serde_json::to_value(&message)?;
        let event = Event::new(self.next_event_id(), sender, self.tick(), content);
        let event_id = event.event_id.clone();
        self.sent.lock().unwrap().push(message);
        self.push(room_id, event);
        Ok(event_id)
    }

    async fn redact_event(&self, room_id: &RoomId, event_id: &EventId, _reason: Option<String>) -> Result<OwnedEventId> {
        if let Some(reason) = self.rejection.lock().unwrap().clone() {
            return Err(ConcordError::Transport(reason));
        }
        let sender = self
            .user
            .clone()
            .ok_or_else(|| ConcordError::Auth("Not logged in".into()))?;
        self.redact(room_id, event_id, &sender)
            .ok_or_else(|| ConcordError::NotFound(format!("Unknown event {event_id}")))
    }

    fn subscribe(&self, kind: NotificationKind, sink: UnboundedSender<TimelineNotification>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().unwrap().push((id, kind, sink));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().unwrap().retain(|(subscribed, _, _)| *subscribed != id);
    }

    fn user_id(&self) -> Option<OwnedUserId> {
        self.user.clone()
    }
}
