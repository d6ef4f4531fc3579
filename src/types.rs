//! Shared value types
//!
//! Ticks, screen rectangles and the small enums that flow between the
//! resolver, the cursor, the loop manager and the gesture tester.

use serde::{Deserialize, Serialize};

/// Structural musical time. Not unique under repeats.
pub type Tick = i64;

/// Position in the repeat-expanded playback timeline. Unique per sounding instant.
pub type ExpandedTick = i64;

/// Axis-aligned rectangle in the renderer's content coordinate space
/// (scroll and scale already applied).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Left/top edges inclusive, right/bottom edges exclusive, so adjacent
    /// bars never both claim the shared edge.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// Identity of a structural beat.
///
/// Two occurrences of the same beat on different repeat passes compare
/// equal: identity is the structural start plus the bar index, never the
/// occurrence object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeatId {
    pub bar_index: usize,
    pub structural_start: Tick,
}

/// Interpolation target selection, chosen once per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Walk toward the next beat's note anchor in the same bar.
    TowardNextBeat,
    /// Walk toward the bar's right edge (last beat, or no usable next beat).
    TowardBarEnd,
}

/// Unit a loop gesture snaps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Bar,
    Beat,
}

/// How a loop boundary is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapPolicy {
    /// Hand the range to the playback engine's native loop field.
    #[default]
    Declarative,
    /// Watch every clock tick and seek back to the start near the end.
    Manual,
}

/// Loop range pushed to the playback engine. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBounds {
    pub start: ExpandedTick,
    pub end: ExpandedTick,
}

/// Indicator transform: horizontal position plus the row it is drawn in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorFrame {
    pub x: f64,
    pub y: f64,
    pub height: f64,
}
