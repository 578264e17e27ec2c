// =============================================================================
// Concord Relation View Engine - Reaction Aggregator Module
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
//   Per-message emoji reaction aggregates. The aggregate is kept as, for each
//   key, the reacting users and the reaction events each of them sent, so a
//   user reacting twice with the same key is counted once and a single
//   annotation or redaction can be applied without rescanning the timeline.
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use concord_common::ConcordError;
use concord_core::Event;
use ruma::{EventId, OwnedEventId, OwnedUserId, UserId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::parser::{parse_relation, Annotation, Relation};

/// Options for `aggregate`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Count reactions whose event was redacted
    pub include_redacted: bool,
}

/// Reactions with one emoji key on one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReaction {
    pub key: String,
    pub users: BTreeSet<OwnedUserId>,
    pub count: usize,
    pub current_user_reacted: bool,
}

/// All reactions on one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReactions {
    pub event_id: OwnedEventId,
    pub reactions: BTreeMap<String, MessageReaction>,
    pub total_count: usize,
}

/// Aggregation state behind a cached reaction view.
///
/// `keys` maps emoji key → user → that user's reaction events with the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionState {
    target: OwnedEventId,
    include_redacted: bool,
    keys: BTreeMap<String, BTreeMap<OwnedUserId, BTreeSet<OwnedEventId>>>,
}

impl ReactionState {
    pub fn new(target: &EventId, options: AggregateOptions) -> Self {
        Self {
            target: target.to_owned(),
            include_redacted: options.include_redacted,
            keys: BTreeMap::new(),
        }
    }

    /// Full aggregation over a timeline snapshot
    pub fn from_timeline(events: &[Event], target: &EventId, options: AggregateOptions) -> Self {
        let mut state = Self::new(target, options);
        for event in events {
            state.apply_annotation(event);
        }
        state
    }

    pub fn target(&self) -> &EventId {
        &self.target
    }

    /// Account for one annotation event; returns whether anything changed
    pub fn apply_annotation(&mut self, event: &Event) -> bool {
        let Relation::Annotation(Annotation { target_event_id, key }) = parse_relation(event) else {
            return false;
        };
        if target_event_id != self.target {
            return false;
        }
        if event.redacted && !self.include_redacted {
            trace!("Skipping redacted reaction {}", event.event_id);
            return false;
        }

        self.keys
            .entry(key)
            .or_default()
            .entry(event.sender.clone())
            .or_default()
            .insert(event.event_id.clone())
    }

    /// Account for the redaction of `reaction_id`; returns whether anything changed
    pub fn apply_redaction(&mut self, reaction_id: &EventId) -> bool {
        if self.include_redacted {
            return false;
        }

        let mut changed = false;
        for users in self.keys.values_mut() {
            for events in users.values_mut() {
                changed |= events.remove(reaction_id);
            }
            users.retain(|_, events| !events.is_empty());
        }
        self.keys.retain(|_, users| !users.is_empty());
        changed
    }

    /// Every reaction event `user` holds with `key`, oldest id order
    pub fn reaction_events_of(&self, user: &UserId, key: &str) -> Vec<OwnedEventId> {
        self.keys
            .get(key)
            .and_then(|users| users.get(user))
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Public view for the session user
    pub fn project(&self, current_user: Option<&UserId>) -> MessageReactions {
        let reactions: BTreeMap<String, MessageReaction> = self
            .keys
            .iter()
            .map(|(key, users)| {
                let users: BTreeSet<OwnedUserId> = users.keys().cloned().collect();
                let current_user_reacted = current_user.is_some_and(|me| users.contains(me));
                let reaction = MessageReaction {
                    key: key.clone(),
                    count: users.len(),
                    users,
                    current_user_reacted,
                };
                (key.clone(), reaction)
            })
            .collect();

        MessageReactions {
            event_id: self.target.clone(),
            total_count: reactions.values().map(|r| r.count).sum(),
            reactions,
        }
    }
}

impl MessageReactions {
    /// Aggregate with no reactions
    pub fn empty(event_id: &EventId) -> Self {
        Self {
            event_id: event_id.to_owned(),
            reactions: BTreeMap::new(),
            total_count: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MessageReaction> {
        self.reactions.get(key)
    }

    /// Reactions by count, most popular first; equal counts by key
    pub fn sorted(&self) -> Vec<&MessageReaction> {
        let mut sorted: Vec<&MessageReaction> = self.reactions.values().collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        sorted
    }

    /// List-based form for transport or storage
    pub fn to_wire(&self) -> ReactionsWire {
        ReactionsWire {
            event_id: self.event_id.clone(),
            reactions: self
                .reactions
                .values()
                .map(|reaction| ReactionWire {
                    key: reaction.key.clone(),
                    users: reaction.users.iter().cloned().collect(),
                    count: reaction.count,
                    current_user_reacted: reaction.current_user_reacted,
                })
                .collect(),
            total_count: self.total_count,
        }
    }

    /// Rebuild from the wire form.
    ///
    /// Users are deduplicated and every count is recomputed from the user
    /// sets; the counts carried on the wire are not trusted. Duplicate keys
    /// are merged.
    pub fn from_wire(wire: ReactionsWire, current_user: Option<&UserId>) -> Result<Self, ConcordError> {
        let mut reactions: BTreeMap<String, MessageReaction> = BTreeMap::new();
        for entry in wire.reactions {
            if entry.key.is_empty() {
                return Err(ConcordError::Validation("Reaction key cannot be empty".to_string()));
            }
            let reaction = reactions.entry(entry.key.clone()).or_insert_with(|| MessageReaction {
                key: entry.key,
                users: BTreeSet::new(),
                count: 0,
                current_user_reacted: false,
            });
            reaction.users.extend(entry.users);
        }

        for reaction in reactions.values_mut() {
            reaction.count = reaction.users.len();
            reaction.current_user_reacted = match current_user {
                Some(me) => reaction.users.contains(me),
                None => false,
            };
        }
        reactions.retain(|_, reaction| reaction.count > 0);

        Ok(Self {
            event_id: wire.event_id,
            total_count: reactions.values().map(|r| r.count).sum(),
            reactions,
        })
    }
}

/// Wire form of one reaction key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionWire {
    pub key: String,
    pub users: Vec<OwnedUserId>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub current_user_reacted: bool,
}

/// Wire form of `MessageReactions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionsWire {
    pub event_id: OwnedEventId,
    pub reactions: Vec<ReactionWire>,
    #[serde(default)]
    pub total_count: usize,
}

/// What a toggle did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Added,
    Removed,
}

/// Outcome of `toggle_reaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ReactionAction>,
    /// The new annotation, or the reaction that was redacted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<OwnedEventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReactionResult {
    pub fn done(action: ReactionAction, event_id: OwnedEventId) -> Self {
        Self {
            success: true,
            action: Some(action),
            event_id: Some(event_id),
            error: None,
        }
    }

    pub fn failed(err: &ConcordError) -> Self {
        Self {
            success: false,
            action: None,
            event_id: None,
            error: Some(err.message().to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::{owned_event_id, owned_user_id};
    use serde_json::json;
    use test_log::test;

    fn reaction(id: &str, sender: &str, target: &str, key: &str) -> Event {
        Event::new(
            EventId::parse(id).unwrap(),
            UserId::parse(sender).unwrap(),
            1000,
            json!({ "relatesTo": { "relType": "annotation", "eventId": target, "key": key } }),
        )
    }

    const M: &str = "$m:example.org";
    const A: &str = "@alice:example.org";
    const B: &str = "@bob:example.org";

    #[test]
    fn test_duplicate_user_counts_once() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", B, M, "👍"),
            reaction("$r3:example.org", A, M, "👍"),
        ];
        let state = ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default());
        let view = state.project(Some(&owned_user_id!("@alice:example.org")));

        let thumbs = view.get("👍").unwrap();
        assert_eq!(thumbs.count, 2);
        assert_eq!(thumbs.users.len(), 2);
        assert!(thumbs.current_user_reacted);
        assert_eq!(view.total_count, 2);
    }

    #[test]
    fn test_filters_target_redacted_and_malformed() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", B, "$other:example.org", "👍"),
            reaction("$r3:example.org", B, M, "🎉").into_redacted(),
            Event::new(
                owned_event_id!("$r4:example.org"),
                owned_user_id!("@carol:example.org"),
                1000,
                json!({ "relatesTo": { "relType": "annotation", "eventId": M } }),
            ),
        ];
        let target = owned_event_id!("$m:example.org");

        let view = ReactionState::from_timeline(&events, &target, Default::default()).project(None);
        assert_eq!(view.reactions.len(), 1);
        assert_eq!(view.total_count, 1);
        assert!(!view.get("👍").unwrap().current_user_reacted);

        let with_redacted = ReactionState::from_timeline(
            &events,
            &target,
            AggregateOptions { include_redacted: true },
        )
        .project(None);
        assert_eq!(with_redacted.total_count, 2);
        assert_eq!(with_redacted.get("🎉").unwrap().count, 1);
    }

    #[test]
    fn test_total_is_sum_of_counts() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", B, M, "👍"),
            reaction("$r3:example.org", B, M, "🎉"),
        ];
        let view = ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default())
            .project(None);
        let sum: usize = view.reactions.values().map(|r| r.count).sum();
        assert_eq!(view.total_count, sum);
        assert_eq!(view.total_count, 3);
    }

    #[test]
    fn test_redaction_keeps_other_event_of_same_user() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", A, M, "👍"),
        ];
        let mut state =
            ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default());

        assert!(state.apply_redaction(&owned_event_id!("$r1:example.org")));
        assert_eq!(state.project(None).get("👍").unwrap().count, 1);

        assert!(state.apply_redaction(&owned_event_id!("$r2:example.org")));
        assert!(state.project(None).reactions.is_empty());
        assert!(!state.apply_redaction(&owned_event_id!("$r2:example.org")));
    }

    #[test]
    fn test_reaction_event_lookup() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", A, M, "👍"),
        ];
        let state = ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default());
        assert_eq!(
            state.reaction_events_of(&owned_user_id!("@alice:example.org"), "👍"),
            vec![owned_event_id!("$r1:example.org"), owned_event_id!("$r2:example.org")]
        );
        assert!(state.reaction_events_of(&owned_user_id!("@bob:example.org"), "👍").is_empty());
        assert!(state.reaction_events_of(&owned_user_id!("@alice:example.org"), "🎉").is_empty());
    }

    #[test]
    fn test_sorted_by_count_then_key() {
        let events = vec![
            reaction("$r1:example.org", A, M, "🎉"),
            reaction("$r2:example.org", A, M, "👍"),
            reaction("$r3:example.org", B, M, "👍"),
            reaction("$r4:example.org", B, M, "😀"),
        ];
        let view = ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default())
            .project(None);
        let keys: Vec<&str> = view.sorted().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys[0], "👍");
        assert_eq!(keys.len(), 3);
        assert!(keys[1] < keys[2]);
    }

    #[test]
    fn test_wire_import_recounts_and_dedups() {
        let wire: ReactionsWire = serde_json::from_value(json!({
            "eventId": M,
            "reactions": [
                { "key": "👍", "users": [A, B, A], "count": 99 },
                { "key": "👍", "users": ["@carol:example.org"] },
                { "key": "🎉", "users": [] }
            ],
            "totalCount": 1000
        }))
        .unwrap();

        let view = MessageReactions::from_wire(wire, Some(&owned_user_id!("@bob:example.org"))).unwrap();
        let thumbs = view.get("👍").unwrap();
        assert_eq!(thumbs.count, 3);
        assert!(thumbs.current_user_reacted);
        assert!(view.get("🎉").is_none());
        assert_eq!(view.total_count, 3);
    }

    #[test]
    fn test_wire_export_lists_users() {
        let events = vec![
            reaction("$r1:example.org", A, M, "👍"),
            reaction("$r2:example.org", B, M, "👍"),
        ];
        let view = ReactionState::from_timeline(&events, &owned_event_id!("$m:example.org"), Default::default())
            .project(Some(&owned_user_id!("@bob:example.org")));
        let wire = serde_json::to_value(view.to_wire()).unwrap();
        assert_eq!(
            wire,
            json!({
                "eventId": M,
                "reactions": [
                    { "key": "👍", "users": [A, B], "count": 2, "currentUserReacted": true }
                ],
                "totalCount": 2
            })
        );
    }

    #[test]
    fn test_wire_rejects_empty_key() {
        let wire = ReactionsWire {
            event_id: owned_event_id!("$m:example.org"),
            reactions: vec![ReactionWire {
                key: String::new(),
                users: vec![owned_user_id!("@alice:example.org")],
                count: 1,
                current_user_reacted: false,
            }],
            total_count: 1,
        };
        assert!(matches!(
            MessageReactions::from_wire(wire, None),
            Err(ConcordError::Validation(_))
        ));
    }

    #[test]
    fn test_reaction_result_serialization() {
        let ok = ReactionResult::done(ReactionAction::Added, owned_event_id!("$r:example.org"));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "success": true, "action": "added", "eventId": "$r:example.org" })
        );

        let failed = ReactionResult::failed(&ConcordError::Transport("rate limited".into()));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "success": false, "error": "rate limited" })
        );
    }
}
