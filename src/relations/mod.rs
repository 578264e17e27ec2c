// =============================================================================
// Concord Relation View Engine - Relations Module
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
//   Relation-derived views over room timelines: thread indexes and reaction
//   aggregates, their versioned cache, and the engine facade that keeps them
//   consistent with the live timeline.
//
// =============================================================================

pub mod cache;
pub mod engine;
pub mod parser;
pub mod reactions;
pub mod threads;

pub use cache::{CacheKey, CacheStats, EntryState, RelationCache, ViewKind};
pub use engine::RelationViewEngine;
pub use parser::{classify_annotation, is_thread_reply, parse_relation, thread_root_id, Annotation, Relation};
pub use reactions::{
    AggregateOptions, MessageReaction, MessageReactions, ReactionAction, ReactionResult, ReactionState,
    ReactionWire, ReactionsWire,
};
pub use threads::{
    MutationResult, RoomThread, ThreadFilter, ThreadMetadata, ThreadReply, ThreadRepliesOptions,
};
