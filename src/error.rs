//! # Error Types
//!
//! This module defines all error types for the score cursor.
//!
//! Two families live in [`CursorError`]:
//!
//! ## Runtime conditions
//! Raised while handling clock, pointer and layout events. None of them is
//! fatal; the overlay degrades to "hold the last visual state" or "skip this
//! frame" and never lets them cross the clock-event boundary.
//! - `GeometryUnavailable` - layout not yet produced for an occurrence
//! - `OccurrenceResolutionMiss` - no occurrence covers an expanded tick
//! - `DiscontinuityDetected` - tick delta over the jump threshold
//! - `MalformedBeat` - zero or negative beat duration
//!
//! ## Loading errors
//! Returned to whoever loads a score, a config or a fixture.
//! - `InvalidScore` - structural validation failure with the bar number
//! - `ConfigError` - invalid YAML configuration
//! - `FixtureError` - invalid YAML layout fixture
//!
//! ## Usage
//! ```rust
//! use score_cursor::{CursorError, FollowConfig};
//!
//! match FollowConfig::from_yaml("drag-threshold: -1") {
//!     Ok(_) => unreachable!(),
//!     Err(CursorError::ConfigError(message)) => assert!(message.contains("drag-threshold")),
//!     Err(e) => panic!("unexpected error: {}", e),
//! }
//! ```

use crate::types::{ExpandedTick, Tick};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CursorError {
    /// Layout geometry is missing for a bar occurrence.
    ///
    /// # Example
    /// ```
    /// # use score_cursor::CursorError;
    /// let err = CursorError::GeometryUnavailable { bar_index: 4, occurrence: 1 };
    /// assert_eq!(err.to_string(), "Geometry unavailable for bar 5 (occurrence 2)");
    /// ```
    #[error("Geometry unavailable for bar {} (occurrence {})", bar_index + 1, occurrence + 1)]
    GeometryUnavailable { bar_index: usize, occurrence: usize },

    /// No bar or beat occurrence covers the expanded tick.
    #[error("No occurrence covers expanded tick {tick}")]
    OccurrenceResolutionMiss { tick: ExpandedTick },

    /// The clock jumped further than the discontinuity threshold.
    ///
    /// # Example
    /// ```
    /// # use score_cursor::CursorError;
    /// let err = CursorError::DiscontinuityDetected { from: 19200, to: 9600 };
    /// assert_eq!(err.to_string(), "Clock discontinuity from tick 19200 to tick 9600");
    /// ```
    #[error("Clock discontinuity from tick {from} to tick {to}")]
    DiscontinuityDetected { from: ExpandedTick, to: ExpandedTick },

    /// A beat whose duration is zero or negative.
    #[error("Malformed beat {} in bar {}: duration {duration}", beat_index + 1, bar_index + 1)]
    MalformedBeat {
        bar_index: usize,
        beat_index: usize,
        duration: Tick,
    },

    /// Structural validation error, `bar` is 1-indexed.
    ///
    /// # Example
    /// ```
    /// # use score_cursor::CursorError;
    /// let err = CursorError::InvalidScore {
    ///     bar: 3,
    ///     message: "Repeat end (:||) found without a matching repeat start (||:)".to_string(),
    /// };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Invalid score at bar 3: Repeat end (:||) found without a matching repeat start (||:)"
    /// );
    /// ```
    #[error("Invalid score at bar {bar}: {message}")]
    InvalidScore { bar: usize, message: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid layout fixture: {0}")]
    FixtureError(String),
}

impl CursorError {
    /// True for the conditions an event handler absorbs instead of reporting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CursorError::GeometryUnavailable { .. }
                | CursorError::OccurrenceResolutionMiss { .. }
                | CursorError::DiscontinuityDetected { .. }
                | CursorError::MalformedBeat { .. }
        )
    }
}
