// =============================================================================
// Concord Relation View Engine - Logging Module
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
//   Tracing subscriber setup for hosts embedding the engine.
//
// =============================================================================

use concord_common::{ConcordError, Result};
use concord_core::LoggingConfig;
use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

/// Build the filter for `config`, falling back to `warn` when the directive
/// does not parse
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    match EnvFilter::try_new(&config.filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("It looks like your log filter is invalid. The following error occurred while parsing it: {e}");
            EnvFilter::new("warn")
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_span_events(span_events);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConcordError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
