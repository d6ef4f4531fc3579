//! # Overlay Module
//!
//! The controller that ties the resolver, cursor, loop manager and gesture
//! tester to the outside world: clock events in, indicator frames and loop
//! boundaries out.
//!
//! ## Sub-modules
//! - `controller` - [`PlaybackOverlay`], one per active overlay
//! - `transport` - [`Transport`] trait and [`SimulatedTransport`]
//!
//! ## Event Entry Points
//! - [`PlaybackOverlay::on_layout_finished`] - rebuild the occurrence table,
//!   cancel any gesture, re-anchor the loop
//! - [`PlaybackOverlay::on_position_changed`] - resolve, interpolate, wrap
//! - [`PlaybackOverlay::on_loop_wrapped`] - engine-side wrap, reset follow state
//! - [`PlaybackOverlay::on_pointer_down`] / `_move` / `_up` - loop gestures
//!
//! Runtime failures (missing geometry, resolution misses, malformed beats,
//! clock jumps) never leave these entry points. They are logged and the
//! frame is skipped, so the indicator holds its last position.
//!
//! ## Example
//! ```rust
//! use score_cursor::layout::{Grid, StaticLayout};
//! use score_cursor::overlay::{PlaybackOverlay, SimulatedTransport};
//! use score_cursor::{FollowConfig, Score, StructuralBar};
//!
//! let score = Score {
//!     bars: (0..4).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect(),
//! };
//! let layout = StaticLayout::with_grid(score, None, Grid::default());
//!
//! let mut overlay = PlaybackOverlay::new(FollowConfig::default(), SimulatedTransport::playing());
//! overlay.on_layout_finished(&layout).unwrap();
//!
//! let frame = overlay.on_position_changed(0).unwrap();
//! assert_eq!(frame.x, 8.0);
//! ```

mod controller;
mod transport;

pub use controller::PlaybackOverlay;
pub use transport::{Advance, SimulatedTransport, Transport};

#[cfg(test)]
mod tests;
