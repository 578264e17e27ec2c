//! Concord Common
//!
//! Shared error type for every Concord crate.

pub mod error;

pub use error::{ConcordError, Result};
