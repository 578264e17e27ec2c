//! Concord Core Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//!
//! Fundamental types, collaborator traits and configuration shared by the
//! Concord relation view engine and the protocol client bindings.
//!
//! # Features
//! - Timeline event model and version stamps
//! - `ProtocolClient` / `RoomHandle` collaborator traits
//! - Engine configuration loading
//! - Logging and timestamp utilities
//!
//! # Examples
//! ```rust
//! use concord_core::{EngineConfig, Result};
//!
//! fn example() -> Result<()> {
//!     let config = EngineConfig::default();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod traits;
pub mod types;
pub mod utils;

pub use concord_common::{ConcordError, Result};
pub use config::{EngineConfig, LoggingConfig};
pub use traits::{ProtocolClient, RoomHandle};
pub use types::{
    Event, NotificationKind, OutgoingMessage, RelType, RelatesTo, SubscriptionId,
    TimelineNotification, TimelineVersion, Timestamp,
};
