// =============================================================================
// Concord Relation View Engine - Library Crate
// =============================================================================
//
// Project: Concord - Discord-style client for the Matrix protocol
// Author: arkSong (arksong2018@gmail.com)
// Date: 2026-10-16
// Version: 0.3.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Relation-derived view engine for the Concord chat client. Turns the flat
//   timeline of a Matrix room into thread indexes and reaction aggregates,
//   cached per (room, anchor, view) and kept consistent with the live
//   timeline through the protocol client's notifications.
//
// Dependencies:
//   • Tokio channels for live-update delivery
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix identifiers with ruma
//
// =============================================================================

pub mod logging;
pub mod relations;

// Re-export common types
pub use ruma;
pub use tracing;

// Re-export workspace crates
pub use concord_common as common;
pub use concord_core as core;

pub use concord_common::{ConcordError, Result};
pub use concord_core::{EngineConfig, Event, ProtocolClient, RoomHandle};
pub use relations::RelationViewEngine;
