//! # Layout Module
//!
//! The boundary to the score renderer, and the per-layout-pass occurrence
//! table everything else resolves against.
//!
//! ## Sub-modules
//! - `table` - [`OccurrenceTable`], rebuilt once per layout pass
//! - `fixture` - [`StaticLayout`], a serde-backed renderer for tests and the CLI
//!
//! ## Geometry Normalization
//! Renderers hand out geometry with optional and nested shapes. This module
//! is the only place that knows the fallback chains; past it, geometry is a
//! fixed record ([`VisualBar`] / [`BeatGeometry`]):
//!
//! - bar rectangle: the bar's own rect, else the union of its beat rects
//! - beat anchor X: the explicit note anchor, else the first note head's
//!   centre, else the beat rect's centre
//!
//! ## Example
//! ```rust
//! use score_cursor::layout::{RawBeatGeometry, BeatGeometry};
//! use score_cursor::Rect;
//!
//! let raw = RawBeatGeometry {
//!     rect: Some(Rect::new(100.0, 0.0, 40.0, 80.0)),
//!     anchor_x: None,
//!     note_heads: vec![Rect::new(104.0, 30.0, 10.0, 8.0)],
//! };
//! assert_eq!(raw.normalize().anchor_x, Some(109.0));
//! ```

mod fixture;
mod table;

pub use fixture::{Grid, StaticLayout};
pub use table::{BarOccurrence, BeatOccurrence, OccurrenceTable};

use crate::score::{ExpansionEntry, Score};
use crate::types::Rect;
use serde::{Deserialize, Serialize};

/// The renderer/score collaborator.
///
/// Visual bars are reported in layout order. A structural bar may be drawn
/// several times (unrolled repeats) or once for several passes (repeat signs).
pub trait ScoreRenderer {
    /// Structural bars, beats and repeat marks.
    fn structure(&self) -> &Score;

    /// One entry per repeat pass of each bar, in playback order.
    fn expansion(&self) -> Vec<ExpansionEntry> {
        self.structure().expansion()
    }

    /// Number of bars drawn on screen.
    fn visual_bar_count(&self) -> usize;

    /// Geometry of the visual bar at `position` in layout order, `None` if
    /// the renderer has not produced it yet.
    fn visual_bar(&self, position: usize) -> Option<RawBarGeometry>;
}

/// Beat geometry as the renderer reports it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBeatGeometry {
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub anchor_x: Option<f64>,
    #[serde(default)]
    pub note_heads: Vec<Rect>,
}

/// Bar geometry as the renderer reports it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBarGeometry {
    pub bar_index: usize,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub beats: Vec<RawBeatGeometry>,
}

/// Normalized beat geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeatGeometry {
    pub rect: Option<Rect>,
    pub anchor_x: Option<f64>,
}

/// One bar as drawn on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualBar {
    /// Index into the occurrence table's visual list
    pub slot: usize,
    /// Position in the renderer's layout order
    pub position: usize,
    pub bar_index: usize,
    /// How many earlier visual bars share this structural index
    pub ordinal: usize,
    pub rect: Option<Rect>,
    pub beats: Vec<BeatGeometry>,
}

impl RawBeatGeometry {
    pub fn normalize(&self) -> BeatGeometry {
        let anchor_x = self
            .anchor_x
            .or_else(|| self.note_heads.first().map(Rect::center_x))
            .or_else(|| self.rect.as_ref().map(Rect::center_x));
        BeatGeometry {
            rect: self.rect,
            anchor_x,
        }
    }
}

impl RawBarGeometry {
    pub fn normalize(&self, slot: usize, position: usize, ordinal: usize) -> VisualBar {
        let rect = self.rect.or_else(|| {
            self.beats
                .iter()
                .filter_map(|beat| beat.rect)
                .reduce(|acc, r| acc.union(&r))
        });
        VisualBar {
            slot,
            position,
            bar_index: self.bar_index,
            ordinal,
            rect,
            beats: self.beats.iter().map(RawBeatGeometry::normalize).collect(),
        }
    }
}

impl VisualBar {
    /// Horizontal span a beat owns for hit-testing: from its left edge to the
    /// next beat's left edge (or the bar's right edge). Beats the renderer
    /// draws with near-zero width still own the gap up to their neighbour.
    pub fn beat_span(&self, beat_index: usize) -> Option<(f64, f64)> {
        let bar = self.rect?;
        let left = self.beats.get(beat_index)?.rect?.x;
        let right = self.beats[beat_index + 1..]
            .iter()
            .find_map(|beat| beat.rect.map(|r| r.x))
            .unwrap_or(bar.right());
        Some((left, right.max(left)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_prefers_explicit_value() {
        let raw = RawBeatGeometry {
            rect: Some(Rect::new(0.0, 0.0, 50.0, 10.0)),
            anchor_x: Some(3.0),
            note_heads: vec![Rect::new(10.0, 0.0, 10.0, 10.0)],
        };
        assert_eq!(raw.normalize().anchor_x, Some(3.0));
    }

    #[test]
    fn test_anchor_falls_back_to_rect_center() {
        let raw = RawBeatGeometry {
            rect: Some(Rect::new(0.0, 0.0, 50.0, 10.0)),
            ..Default::default()
        };
        assert_eq!(raw.normalize().anchor_x, Some(25.0));
        assert_eq!(RawBeatGeometry::default().normalize().anchor_x, None);
    }

    #[test]
    fn test_bar_rect_falls_back_to_beat_union() {
        let raw = RawBarGeometry {
            bar_index: 2,
            rect: None,
            beats: vec![
                RawBeatGeometry { rect: Some(Rect::new(10.0, 5.0, 20.0, 30.0)), ..Default::default() },
                RawBeatGeometry::default(),
                RawBeatGeometry { rect: Some(Rect::new(60.0, 0.0, 20.0, 30.0)), ..Default::default() },
            ],
        };
        let visual = raw.normalize(3, 7, 1);
        assert_eq!(visual.rect, Some(Rect::new(10.0, 0.0, 70.0, 35.0)));
        assert_eq!(visual.position, 7);
        assert_eq!(visual.ordinal, 1);
    }

    #[test]
    fn test_beat_span_reaches_next_beat() {
        let raw = RawBarGeometry {
            bar_index: 0,
            rect: Some(Rect::new(0.0, 0.0, 200.0, 50.0)),
            beats: vec![
                // Sustained note drawn with no width
                RawBeatGeometry { rect: Some(Rect::new(0.0, 0.0, 0.0, 50.0)), ..Default::default() },
                RawBeatGeometry { rect: Some(Rect::new(120.0, 0.0, 80.0, 50.0)), ..Default::default() },
            ],
        };
        let visual = raw.normalize(0, 0, 0);
        assert_eq!(visual.beat_span(0), Some((0.0, 120.0)));
        assert_eq!(visual.beat_span(1), Some((120.0, 200.0)));
        assert_eq!(visual.beat_span(2), None);
    }
}
