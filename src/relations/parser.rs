// =============================================================================
// Concord Relation View Engine - Relation Parser Module
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
//   Structural, defensive parsing of relation metadata. Every consumer in the
//   engine pattern-matches the `Relation` produced here instead of probing
//   optional JSON fields. Malformed or partial relation objects are never an
//   error, only "no relation".
//
// =============================================================================

use concord_common::ConcordError;
use concord_core::Event;
use ruma::{EventId, OwnedEventId};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// Content key used by the client SDK for relation descriptors
const RELATES_TO: &str = "relatesTo";
/// Content key used on the Matrix wire
const M_RELATES_TO: &str = "m.relates_to";

/// A validated emoji annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    pub target_event_id: OwnedEventId,
    pub key: String,
}

/// Relation carried by an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Relation {
    #[default]
    None,
    Thread { root_event_id: OwnedEventId },
    Annotation(Annotation),
}

impl Relation {
    /// Event the relation points at
    pub fn anchor(&self) -> Option<&OwnedEventId> {
        match self {
            Relation::None => None,
            Relation::Thread { root_event_id } => Some(root_event_id),
            Relation::Annotation(annotation) => Some(&annotation.target_event_id),
        }
    }
}

/// Both the SDK (`relType`/`eventId`) and the Matrix (`rel_type`/`event_id`)
/// spellings are accepted. A mistyped field fails the whole descriptor.
#[derive(Deserialize)]
struct RelationShape {
    #[serde(rename = "relType", alias = "rel_type")]
    rel_type: String,
    #[serde(rename = "eventId", alias = "event_id")]
    event_id: String,
    #[serde(default)]
    key: Option<Value>,
}

/// Validate a single relation descriptor object.
///
/// Relation types this engine does not track are `Ok(Relation::None)`;
/// a descriptor that claims a tracked type but does not validate is
/// `ConcordError::MalformedRelation`.
pub fn validate_descriptor(descriptor: &Value) -> Result<Relation, ConcordError> {
    let shape = RelationShape::deserialize(descriptor).map_err(|e| ConcordError::MalformedRelation(e.to_string()))?;

    match shape.rel_type.as_str() {
        "thread" | "m.thread" | "io.element.thread" => Ok(Relation::Thread {
            root_event_id: EventId::parse(&shape.event_id)?,
        }),
        "annotation" | "m.annotation" => {
            let target_event_id = EventId::parse(&shape.event_id)?;
            match shape.key.as_ref().and_then(Value::as_str) {
                Some(key) if !key.is_empty() => Ok(Relation::Annotation(Annotation {
                    target_event_id,
                    key: key.to_owned(),
                })),
                _ => Err(ConcordError::MalformedRelation(format!(
                    "annotation on {} without a usable key",
                    target_event_id
                ))),
            }
        }
        _ => Ok(Relation::None),
    }
}

/// Parse a single relation descriptor object; malformed ones are no relation
pub fn parse_descriptor(descriptor: &Value) -> Relation {
    validate_descriptor(descriptor).unwrap_or_else(|e| {
        trace!("Ignoring relation descriptor: {}", e);
        Relation::None
    })
}

/// Resolve the relation of an event.
///
/// The client-provided descriptor wins, then `content.relatesTo`, then the
/// raw `content["m.relates_to"]`.
pub fn parse_relation(event: &Event) -> Relation {
    let candidates = [
        event.relation.as_ref(),
        event.content.get(RELATES_TO),
        event.content.get(M_RELATES_TO),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(parse_descriptor)
        .find(|relation| *relation != Relation::None)
        .unwrap_or_default()
}

/// Whether the event is a reply inside a thread
pub fn is_thread_reply(event: &Event) -> bool {
    matches!(parse_relation(event), Relation::Thread { .. })
}

/// Root of the thread the event replies in
pub fn thread_root_id(event: &Event) -> Option<OwnedEventId> {
    match parse_relation(event) {
        Relation::Thread { root_event_id } => Some(root_event_id),
        _ => None,
    }
}

/// Validate annotation content of the shape
/// `{relatesTo: {relType: "annotation", eventId, key}}`.
///
/// Stricter than the bare shape: an empty `key` string is rejected too.
pub fn classify_annotation(content: &Value) -> Option<Annotation> {
    [content.get(RELATES_TO), content.get(M_RELATES_TO)]
        .into_iter()
        .flatten()
        .find_map(|descriptor| match parse_descriptor(descriptor) {
            Relation::Annotation(annotation) => Some(annotation),
            _ => None,
        })
}
