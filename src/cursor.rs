//! # Cursor Interpolator
//!
//! Turns resolved beat state into an on-screen playback indicator that moves
//! smoothly inside a beat.
//!
//! ## Walk Modes
//! Chosen once per beat, at entry, and never re-evaluated mid-beat:
//! - [`WalkMode::TowardNextBeat`]: the next beat occurrence is in the same
//!   bar occurrence and has an anchor; walk from this beat's anchor to it
//! - [`WalkMode::TowardBarEnd`]: otherwise walk to the bar's right edge
//!
//! Motion is always anchor-to-target displacement. The beat's own drawn
//! width plays no part, so beats drawn with near-zero width still move.
//!
//! ## Frozen State
//! Per-beat values live in [`Latch`]es. A latch can be filled while
//! `Unset` or `Provisional`, becomes `Frozen` once a frame from an exact
//! resolution has been emitted, and is only cleared on a beat change or an
//! explicit [`CursorInterpolator::reset`].

use crate::config::FollowConfig;
use crate::error::CursorError;
use crate::layout::OccurrenceTable;
use crate::resolver::{BeatUpdate, ResolvedBeat};
use crate::types::{CursorFrame, ExpandedTick, WalkMode};

/// Fill-but-never-clear slot for a per-beat value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Latch<T> {
    Unset,
    Provisional(T),
    Frozen(T),
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Latch::Unset
    }
}

impl<T: Copy> Latch<T> {
    pub fn get(&self) -> Option<T> {
        match self {
            Latch::Unset => None,
            Latch::Provisional(value) | Latch::Frozen(value) => Some(*value),
        }
    }

    /// Store `value` unless the latch is frozen.
    pub fn offer(&mut self, value: T) {
        if !self.is_frozen() {
            *self = Latch::Provisional(value);
        }
    }

    pub fn freeze(&mut self) {
        if let Latch::Provisional(value) = *self {
            *self = Latch::Frozen(value);
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Latch::Frozen(_))
    }

    fn clear(&mut self) {
        *self = Latch::Unset;
    }
}

/// Where the cursor walks to during the current beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkTarget {
    pub mode: WalkMode,
    pub x: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorState {
    /// Beat being walked; carries the frozen beat start and duration
    pub beat: Option<ResolvedBeat>,
    pub anchor: Latch<f64>,
    pub target: Latch<WalkTarget>,
}

impl CursorState {
    pub fn walk_mode(&self) -> Option<WalkMode> {
        self.target.get().map(|target| target.mode)
    }

    fn enter(&mut self, beat: ResolvedBeat) {
        self.beat = Some(beat);
        self.anchor.clear();
        self.target.clear();
    }
}

#[derive(Debug, Clone)]
pub struct CursorInterpolator {
    state: CursorState,
    last: Option<CursorFrame>,
    min_pixel_delta: f64,
    paused_pin_progress: f64,
}

impl CursorInterpolator {
    pub fn new(config: &FollowConfig) -> Self {
        Self {
            state: CursorState::default(),
            last: None,
            min_pixel_delta: config.min_pixel_delta,
            paused_pin_progress: config.paused_pin_progress,
        }
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn last_frame(&self) -> Option<CursorFrame> {
        self.last
    }

    /// Drop all frozen state. The next frame is computed from scratch and
    /// always emitted.
    pub fn reset(&mut self) {
        self.state = CursorState::default();
        self.last = None;
    }

    /// Compute the indicator for `tick`.
    ///
    /// `Ok(None)` means the frame would move the indicator by less than the
    /// minimum pixel delta and was suppressed.
    pub fn frame(
        &mut self,
        table: &OccurrenceTable,
        update: &BeatUpdate,
        tick: ExpandedTick,
        playing: bool,
    ) -> Result<Option<CursorFrame>, CursorError> {
        let beat = update.beat;
        let same_beat = self
            .state
            .beat
            .is_some_and(|current| current.beat == beat.beat && current.id == beat.id);
        if update.entered || update.discontinuity || !same_beat {
            self.state.enter(beat);
        } else {
            // Same occurrence, possibly upgraded from a provisional snap
            self.state.beat = Some(beat);
        }

        let occurrence = table
            .beat(beat.beat)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick })?;
        if beat.duration <= 0 {
            return Err(CursorError::MalformedBeat {
                bar_index: beat.id.bar_index,
                beat_index: occurrence.beat_index,
                duration: beat.duration,
            });
        }
        let bar = table
            .bar(beat.bar)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick })?;
        let bar_rect = table.bar_rect(bar)?;

        let anchor = match self.state.anchor.get() {
            Some(anchor) if self.state.anchor.is_frozen() => anchor,
            _ => {
                let anchor = table.beat_anchor(occurrence)?;
                self.state.anchor.offer(anchor);
                anchor
            }
        };

        let target = match self.state.target.get() {
            Some(target) if self.state.target.is_frozen() => target,
            _ => {
                let target = choose_target(table, &beat, anchor, bar_rect.right());
                self.state.target.offer(target);
                target
            }
        };

        let progress = ((tick - beat.start) as f64 / beat.duration as f64).clamp(0.0, 1.0);
        let mut x = anchor + progress * (target.x - anchor);
        if target.mode == WalkMode::TowardNextBeat {
            x = x.min(target.x);
        }
        if !playing && progress >= self.paused_pin_progress {
            x = anchor;
        }

        if beat.exact {
            self.state.anchor.freeze();
            self.state.target.freeze();
        }

        let frame = CursorFrame {
            x,
            y: bar_rect.y,
            height: bar_rect.height,
        };
        if let Some(last) = self.last {
            if (frame.x - last.x).abs() < self.min_pixel_delta && frame.y == last.y && frame.height == last.height {
                return Ok(None);
            }
        }
        self.last = Some(frame);
        Ok(Some(frame))
    }
}

fn choose_target(table: &OccurrenceTable, beat: &ResolvedBeat, anchor: f64, bar_right: f64) -> WalkTarget {
    let next_anchor = beat
        .next
        .and_then(|id| table.beat(id))
        .filter(|next| next.bar == beat.bar)
        .and_then(|next| table.beat_anchor(next).ok())
        .filter(|&x| x >= anchor);

    match next_anchor {
        Some(x) => WalkTarget {
            mode: WalkMode::TowardNextBeat,
            x,
        },
        None => WalkTarget {
            mode: WalkMode::TowardBarEnd,
            x: bar_right,
        },
    }
}
