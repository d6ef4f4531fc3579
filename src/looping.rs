//! # Loop Range Manager
//!
//! Owns the loop selection in expanded-tick space, derives the playback
//! boundary from it and enforces that boundary under one of two wrap
//! policies.
//!
//! ## Wrap Policies
//! - **Declarative**: the range goes to the playback engine's own loop field
//!   with the end pushed one tick past the selection, so the engine emits a
//!   tick at or after the true end before it wraps
//! - **Manual**: the engine loop field stays empty; every clock tick is
//!   checked and once `tick >= end - margin` the transport is sent back to
//!   the start
//!
//! ## Anchoring
//! Selections are stored with the `(bar index, occurrence, offset)` of both
//! ends. Bar and beat occurrences die with each layout pass, so after a
//! relayout both ends are re-resolved from their anchors.

use crate::config::FollowConfig;
use crate::error::CursorError;
use crate::gesture::{GestureOutcome, Hit};
use crate::layout::{BarOccurrence, OccurrenceTable, VisualBar};
use crate::resolver::BeatResolver;
use crate::timeline::TimelineExpander;
use crate::types::{ExpandedTick, Granularity, LoopBounds, Rect, Tick, WrapPolicy};

/// One end of a selection, in layout-independent terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopAnchor {
    pub bar_index: usize,
    pub occurrence: usize,
    /// Ticks from the bar occurrence's start
    pub offset: Tick,
}

/// Loop region. `start <= end`; `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSelection {
    pub start: ExpandedTick,
    pub end: ExpandedTick,
    pub start_anchor: LoopAnchor,
    pub end_anchor: LoopAnchor,
}

impl LoopSelection {
    pub fn len(&self) -> Tick {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Changed(LoopSelection),
    Cleared,
}

pub type LoopListener = Box<dyn FnMut(&LoopEvent)>;

pub struct LoopRangeManager {
    enabled: bool,
    selection: Option<LoopSelection>,
    policy: WrapPolicy,
    granularity: Granularity,
    fine: bool,
    wrap_margin: Tick,
    end_scan_limit: Tick,
    end_scan_step: Tick,
    listeners: Vec<LoopListener>,
}

impl std::fmt::Debug for LoopRangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopRangeManager")
            .field("enabled", &self.enabled)
            .field("selection", &self.selection)
            .field("policy", &self.policy)
            .field("granularity", &self.granularity)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl LoopRangeManager {
    pub fn new(config: &FollowConfig) -> Self {
        Self {
            enabled: false,
            selection: None,
            policy: config.wrap_policy,
            granularity: config.granularity,
            fine: config.fine_hit_testing,
            wrap_margin: config.wrap_margin,
            end_scan_limit: config.end_scan_limit,
            end_scan_step: config.end_scan_step.max(1),
            listeners: Vec::new(),
        }
    }

    pub fn selection(&self) -> Option<&LoopSelection> {
        self.selection.as_ref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn policy(&self) -> WrapPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: WrapPolicy) {
        self.policy = policy;
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.granularity = granularity;
    }

    /// Register a change/clear callback.
    pub fn subscribe(&mut self, listener: impl FnMut(&LoopEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self, event: LoopEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Range for the engine's native loop field. Only set under the
    /// declarative policy with an enabled, non-empty selection.
    pub fn engine_bounds(&self) -> Option<LoopBounds> {
        match (self.enabled, self.policy, self.selection) {
            (true, WrapPolicy::Declarative, Some(selection)) if !selection.is_empty() => Some(LoopBounds {
                start: selection.start,
                end: selection.end + 1,
            }),
            _ => None,
        }
    }

    /// Where playback actually turns around for the current selection.
    pub fn effective_end(&self) -> Option<ExpandedTick> {
        let selection = self.selection?;
        Some(match self.policy {
            WrapPolicy::Declarative => selection.end + 1,
            WrapPolicy::Manual => selection.end,
        })
    }

    /// Manual wrap check, run on every clock tick. Returns the tick to seek
    /// to when the boundary has been reached.
    pub fn on_tick(&self, tick: ExpandedTick) -> Option<ExpandedTick> {
        if !self.enabled || self.policy != WrapPolicy::Manual {
            return None;
        }
        let selection = self.selection.filter(|s| !s.is_empty())?;
        let threshold = (selection.end - self.wrap_margin).max(selection.start + 1);
        if tick >= threshold {
            log::debug!(
                target: "cursor::loop",
                "tick {} reached loop end {}, wrapping to {}",
                tick,
                selection.end,
                selection.start
            );
            return Some(selection.start);
        }
        None
    }

    /// Turn a finished gesture into a selection.
    ///
    /// A gesture that never resolved a different unit selects the unit under
    /// the press, whatever happened at release.
    pub fn commit(&mut self, table: &OccurrenceTable, gesture: &GestureOutcome) -> Result<LoopSelection, CursorError> {
        if !gesture.crossed {
            let (start, end) = self.unit_range(table, &gesture.press)?;
            return self.select(table, start, end);
        }

        let (low, high) = if gesture.release.tick < gesture.press.tick {
            (&gesture.release, &gesture.press)
        } else {
            (&gesture.press, &gesture.release)
        };

        let (start, end) = if self.fine && high.tick > low.tick {
            (low.tick, high.tick)
        } else {
            let (start, _) = self.unit_range(table, low)?;
            let (_, end) = self.unit_range(table, high)?;
            (start, end)
        };
        self.select(table, start, end)
    }

    /// Select a whole bar, anchored at the pass nearest `reference`.
    pub fn select_bar(
        &mut self,
        table: &OccurrenceTable,
        bar_index: usize,
        reference: ExpandedTick,
    ) -> Result<LoopSelection, CursorError> {
        let bar = TimelineExpander::new(table)
            .nearest(bar_index, reference)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick: reference })?;
        let end = self.derive_end(table, bar);
        self.select(table, bar.expanded_start, end)
    }

    /// Select an explicit expanded range. Reversed ranges are swapped; an
    /// empty one widens to the unit containing `start`.
    pub fn select_ticks(
        &mut self,
        table: &OccurrenceTable,
        start: ExpandedTick,
        end: ExpandedTick,
    ) -> Result<LoopSelection, CursorError> {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        if start == end {
            let bar = table
                .bar_at(start)
                .ok_or(CursorError::OccurrenceResolutionMiss { tick: start })?;
            let (start, end) = match self.granularity {
                Granularity::Bar => (bar.expanded_start, self.derive_end(table, bar)),
                Granularity::Beat => {
                    let beat = BeatResolver::new(table)
                        .resolve(start)
                        .ok_or(CursorError::OccurrenceResolutionMiss { tick: start })?;
                    (beat.expanded_start, beat.end())
                }
            };
            return self.select(table, start, end);
        }
        self.select(table, start, end)
    }

    pub fn clear(&mut self) {
        if self.selection.take().is_some() {
            self.notify(LoopEvent::Cleared);
        }
    }

    /// Re-resolve the selection against a fresh occurrence table.
    pub fn relayout(&mut self, table: &OccurrenceTable) {
        let Some(old) = self.selection else {
            return;
        };
        let start = reanchor(table, &old.start_anchor, old.start);
        let end = reanchor(table, &old.end_anchor, old.end);

        match (start, end) {
            (Some(start), Some(end)) if start < end => {
                if start != old.start || end != old.end {
                    log::debug!(
                        target: "cursor::loop",
                        "loop re-anchored from [{}, {}) to [{}, {})",
                        old.start,
                        old.end,
                        start,
                        end
                    );
                }
                if let Err(e) = self.select(table, start, end) {
                    log::debug!(target: "cursor::loop", "dropping loop after relayout: {}", e);
                    self.clear();
                }
            }
            _ => {
                log::debug!(
                    target: "cursor::loop",
                    "loop [{}, {}) no longer resolves after relayout",
                    old.start,
                    old.end
                );
                self.clear();
            }
        }
    }

    /// Screen rectangles covering the selection, one per visual bar it
    /// touches.
    pub fn highlight_rects(&self, table: &OccurrenceTable) -> Vec<Rect> {
        let Some(selection) = self.selection else {
            return Vec::new();
        };
        let mut rects: Vec<Rect> = Vec::new();
        for bar in table
            .bars()
            .iter()
            .filter(|bar| bar.expanded_start < selection.end && bar.end() > selection.start)
        {
            let Some(visual) = bar.visual.and_then(|slot| table.visual(slot)) else {
                continue;
            };
            let Some(bar_rect) = visual.rect else {
                continue;
            };
            let left = tick_x(table, bar, visual, selection.start.max(bar.expanded_start));
            let right = if selection.end >= bar.end() {
                bar_rect.right()
            } else {
                tick_x(table, bar, visual, selection.end)
            };
            let rect = Rect::new(left, bar_rect.y, (right - left).max(0.0), bar_rect.height);
            if !rects.contains(&rect) {
                rects.push(rect);
            }
        }
        rects
    }

    /// Range of the bar or beat under a hit.
    fn unit_range(&self, table: &OccurrenceTable, hit: &Hit) -> Result<(ExpandedTick, ExpandedTick), CursorError> {
        let bar = table
            .bar(hit.bar)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick: hit.tick })?;
        let beat = hit.beat_index.and_then(|i| table.beats_of(bar).get(i));
        match (self.granularity, beat) {
            (Granularity::Beat, Some(beat)) => Ok((beat.expanded_start, beat.end())),
            _ => Ok((bar.expanded_start, self.derive_end(table, bar))),
        }
    }

    /// True end of a bar occurrence: the end of its last sounding beat.
    ///
    /// Bars ending in a rest or a tie have no beat at `end - 1`, so the scan
    /// walks backward in bounded steps until a beat resolves.
    pub fn derive_end(&self, table: &OccurrenceTable, bar: &BarOccurrence) -> ExpandedTick {
        let resolver = BeatResolver::new(table);
        let last = bar.end() - 1;
        let floor = (last - self.end_scan_limit).max(bar.expanded_start);
        let mut probe = last;
        while probe >= floor {
            if let Some(beat) = resolver.resolve(probe).filter(|beat| beat.bar == bar.id) {
                return beat.end();
            }
            probe -= self.end_scan_step;
        }
        bar.end()
    }

    fn select(&mut self, table: &OccurrenceTable, start: ExpandedTick, end: ExpandedTick) -> Result<LoopSelection, CursorError> {
        let start_bar = table
            .bar_at(start)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick: start })?;
        let end_bar = table
            .bar_at(end - 1)
            .ok_or(CursorError::OccurrenceResolutionMiss { tick: end - 1 })?;
        let selection = LoopSelection {
            start,
            end: end.max(start),
            start_anchor: anchor_of(start_bar, start),
            end_anchor: anchor_of(end_bar, end),
        };
        if self.selection != Some(selection) {
            self.selection = Some(selection);
            self.notify(LoopEvent::Changed(selection));
        }
        Ok(selection)
    }
}

fn anchor_of(bar: &BarOccurrence, tick: ExpandedTick) -> LoopAnchor {
    LoopAnchor {
        bar_index: bar.bar_index,
        occurrence: bar.occurrence,
        offset: tick - bar.expanded_start,
    }
}

fn reanchor(table: &OccurrenceTable, anchor: &LoopAnchor, previous: ExpandedTick) -> Option<ExpandedTick> {
    let bar = table
        .occurrence(anchor.bar_index, anchor.occurrence)
        .or_else(|| TimelineExpander::new(table).nearest(anchor.bar_index, previous))?;
    Some(bar.expanded_start + anchor.offset.min(bar.duration))
}

/// Horizontal position of a tick inside a bar occurrence's drawing.
fn tick_x(table: &OccurrenceTable, bar: &BarOccurrence, visual: &VisualBar, tick: ExpandedTick) -> f64 {
    let Some(bar_rect) = visual.rect else {
        return 0.0;
    };
    let in_beat = table
        .beats_of(bar)
        .iter()
        .find(|beat| beat.contains(tick))
        .and_then(|beat| Some((beat, visual.beats.get(beat.beat_index)?.rect?)));
    let x = match in_beat {
        Some((beat, rect)) => rect.x + rect.width * (tick - beat.expanded_start) as f64 / beat.duration as f64,
        None => bar_rect.x + bar_rect.width * (tick - bar.expanded_start) as f64 / bar.duration as f64,
    };
    x.clamp(bar_rect.x, bar_rect.right())
}
