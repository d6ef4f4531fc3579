//! # Gesture Hit Tester
//!
//! Maps pointer coordinates (content space, scroll and scale already applied)
//! to bar/beat occurrences and expanded ticks, and tracks one
//! press-move-release cycle.
//!
//! ## Hit-testing
//! Visual bars are walked in layout order; each carries its per-index
//! ordinal, so a hit resolves to `(bar index, occurrence)` and from there to
//! an expanded start via the occurrence table. Where several passes share one
//! drawing, the pass nearest the reference tick wins.
//!
//! Resolved ticks are clamped to the containing bar, so a pointer sitting on
//! a shared edge never resolves into the neighbour.
//!
//! ## Drag Intent
//! `Idle -> Pressed -> Dragging`, with the last step gated on a pixel
//! threshold. Whether the gesture was a drag is a flag accumulated over every
//! move ("did any move resolve a different unit than the press"), never a
//! comparison made only at release.

use crate::config::FollowConfig;
use crate::layout::{BeatOccurrence, OccurrenceTable, VisualBar};
use crate::timeline::TimelineExpander;
use crate::types::{ExpandedTick, Granularity, Tick};

/// A resolved pointer position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Bar occurrence id
    pub bar: usize,
    pub bar_index: usize,
    pub occurrence: usize,
    /// Beat within the structural bar, if the bar has drawn beats
    pub beat_index: Option<usize>,
    /// Visual slot that was hit
    pub visual: usize,
    pub tick: ExpandedTick,
}

impl Hit {
    fn same_unit(&self, other: &Hit, granularity: Granularity) -> bool {
        match granularity {
            Granularity::Bar => self.bar == other.bar,
            Granularity::Beat => self.bar == other.bar && self.beat_index == other.beat_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Pressed,
    Dragging,
}

/// State scoped to one press-move-release cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    pub press: Hit,
    pub origin: (f64, f64),
    pub crossed: bool,
    pub dragging: bool,
    /// Last resolved hit while dragging
    pub last: Hit,
}

/// What a completed gesture selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureOutcome {
    pub press: Hit,
    pub release: Hit,
    pub crossed: bool,
}

#[derive(Debug, Clone)]
pub struct GestureHitTester {
    state: Option<GestureState>,
    granularity: Granularity,
    fine: bool,
    drag_threshold: f64,
}

impl GestureHitTester {
    pub fn new(config: &FollowConfig) -> Self {
        Self {
            state: None,
            granularity: config.granularity,
            fine: config.fine_hit_testing,
            drag_threshold: config.drag_threshold,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.granularity = granularity;
    }

    pub fn state(&self) -> Option<&GestureState> {
        self.state.as_ref()
    }

    pub fn phase(&self) -> GesturePhase {
        match self.state {
            None => GesturePhase::Idle,
            Some(state) if state.dragging => GesturePhase::Dragging,
            Some(_) => GesturePhase::Pressed,
        }
    }

    /// Resolve a point to a bar/beat occurrence and tick.
    pub fn hit_test(&self, table: &OccurrenceTable, x: f64, y: f64, reference: ExpandedTick) -> Option<Hit> {
        let visual = table
            .visuals()
            .iter()
            .find(|visual| visual.rect.is_some_and(|rect| rect.contains(x, y)))?;
        let bar = TimelineExpander::new(table).nearest_for_visual(visual.bar_index, visual.slot, reference)?;
        let beat_index = beat_under(visual, x);
        let beats = table.beats_of(bar);

        let tick = match (self.granularity, self.fine) {
            (_, true) => fine_tick(visual, beat_index, x, bar.expanded_start, bar.duration, beats),
            (Granularity::Beat, false) => beat_index
                .and_then(|i| beats.get(i))
                .map_or(bar.expanded_start, |beat| beat.expanded_start),
            (Granularity::Bar, false) => bar.expanded_start,
        };

        Some(Hit {
            bar: bar.id,
            bar_index: bar.bar_index,
            occurrence: bar.occurrence,
            beat_index,
            visual: visual.slot,
            tick: tick.clamp(bar.expanded_start, bar.end() - 1),
        })
    }

    /// Start a gesture. Presses outside every bar are ignored.
    pub fn press(&mut self, table: &OccurrenceTable, x: f64, y: f64, reference: ExpandedTick) -> Option<Hit> {
        let hit = self.hit_test(table, x, y, reference)?;
        self.state = Some(GestureState {
            press: hit,
            origin: (x, y),
            crossed: false,
            dragging: false,
            last: hit,
        });
        Some(hit)
    }

    /// Track pointer movement. Returns the hit under the pointer once the
    /// gesture is dragging.
    pub fn move_to(&mut self, table: &OccurrenceTable, x: f64, y: f64) -> Option<Hit> {
        let granularity = self.granularity;
        let threshold = self.drag_threshold;
        let state = self.state.as_mut()?;

        if !state.dragging {
            let (ox, oy) = state.origin;
            if (x - ox).hypot(y - oy) <= threshold {
                return None;
            }
            state.dragging = true;
        }

        let reference = state.press.tick;
        let hit = self.hit_test(table, x, y, reference)?;
        let state = self.state.as_mut()?;
        if !hit.same_unit(&state.press, granularity) {
            state.crossed = true;
        }
        state.last = hit;
        Some(hit)
    }

    /// Finish the gesture.
    pub fn release(&mut self, table: &OccurrenceTable, x: f64, y: f64) -> Option<GestureOutcome> {
        let state = self.state.take()?;
        let release = if state.crossed {
            self.hit_test(table, x, y, state.press.tick).unwrap_or(state.last)
        } else {
            state.press
        };
        Some(GestureOutcome {
            press: state.press,
            release,
            crossed: state.crossed,
        })
    }

    /// Drop any gesture in progress.
    pub fn cancel(&mut self) {
        if self.state.take().is_some() {
            log::debug!(target: "cursor::gesture", "gesture cancelled");
        }
    }
}

/// Beat whose span contains `x`; before the first span, the first beat.
fn beat_under(visual: &VisualBar, x: f64) -> Option<usize> {
    let spans: Vec<(usize, (f64, f64))> = (0..visual.beats.len())
        .filter_map(|i| visual.beat_span(i).map(|span| (i, span)))
        .collect();
    spans
        .iter()
        .rev()
        .find(|(_, (left, _))| x >= *left)
        .or_else(|| spans.first())
        .map(|(i, _)| *i)
}

fn fine_tick(
    visual: &VisualBar,
    beat_index: Option<usize>,
    x: f64,
    bar_start: ExpandedTick,
    bar_duration: Tick,
    beats: &[BeatOccurrence],
) -> ExpandedTick {
    let in_beat = beat_index.and_then(|i| Some((visual.beat_span(i)?, beats.get(i)?)));
    let ((left, right), start, duration) = match (in_beat, visual.rect) {
        (Some((span, beat)), _) => (span, beat.expanded_start, beat.duration),
        (None, Some(rect)) => ((rect.x, rect.right()), bar_start, bar_duration),
        (None, None) => return bar_start,
    };
    if right <= left {
        return start;
    }
    let fraction = ((x - left) / (right - left)).clamp(0.0, 1.0);
    start + (fraction * duration as f64).floor() as ExpandedTick
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Grid, StaticLayout};
    use crate::score::{Score, StructuralBar};

    fn table(unrolled: bool) -> OccurrenceTable {
        let mut bars: Vec<StructuralBar> = (0..4).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect();
        bars[1].repeat_start = true;
        bars[2].repeat_end = true;
        let layout = StaticLayout::with_grid(Score { bars }, None, Grid { unrolled, ..Grid::default() });
        OccurrenceTable::build(&layout).unwrap()
    }

    fn tester(granularity: Granularity, fine: bool) -> GestureHitTester {
        GestureHitTester::new(&FollowConfig {
            granularity,
            fine_hit_testing: fine,
            ..FollowConfig::default()
        })
    }

    #[test]
    fn test_bar_center_hits_occurrence_start() {
        let table = table(true);
        let tester = tester(Granularity::Bar, false);
        for bar in table.bars() {
            let rect = table.bar_rect(bar).unwrap();
            let hit = tester.hit_test(&table, rect.center_x(), rect.center_y(), 0).unwrap();
            assert_eq!(hit.tick, bar.expanded_start);
            assert_eq!(hit.bar, bar.id);
        }
    }

    #[test]
    fn test_unrolled_hit_picks_drawn_pass() {
        let table = table(true);
        let tester = tester(Granularity::Bar, false);
        // Layout 0 1 2 1 | 2 3: fourth slot is the second pass of bar 1
        let hit = tester.hit_test(&table, 650.0, 40.0, 0).unwrap();
        assert_eq!((hit.bar_index, hit.occurrence), (1, 1));
        assert_eq!(hit.tick, 3 * 1920);
    }

    #[test]
    fn test_folded_hit_uses_reference() {
        let table = table(false);
        let tester = tester(Granularity::Bar, false);
        let near_second_pass = 3 * 1920 + 100;
        let hit = tester.hit_test(&table, 250.0, 40.0, near_second_pass).unwrap();
        assert_eq!(hit.occurrence, 1);
        let hit = tester.hit_test(&table, 250.0, 40.0, 0).unwrap();
        assert_eq!(hit.occurrence, 0);
    }

    #[test]
    fn test_beat_granularity_snaps_to_beat_start() {
        let table = table(true);
        let tester = tester(Granularity::Beat, false);
        let hit = tester.hit_test(&table, 130.0, 40.0, 0).unwrap();
        assert_eq!(hit.beat_index, Some(2));
        assert_eq!(hit.tick, 960);
    }

    #[test]
    fn test_fine_mode_is_proportional_and_clamped() {
        let table = table(true);
        let tester = tester(Granularity::Bar, true);
        let hit = tester.hit_test(&table, 125.0, 40.0, 0).unwrap();
        assert_eq!(hit.tick, 960 + 240);
        let edge = tester.hit_test(&table, 199.999, 40.0, 0).unwrap();
        assert_eq!(edge.bar, 0);
        assert!(edge.tick <= 1919);
    }

    #[test]
    fn test_miss_outside_bars() {
        let table = table(true);
        let tester = tester(Granularity::Bar, false);
        assert!(tester.hit_test(&table, 10.0, 90.0, 0).is_none());
        assert!(tester.hit_test(&table, -1.0, 10.0, 0).is_none());
    }

    #[test]
    fn test_jitter_below_threshold_stays_pressed() {
        let table = table(true);
        let mut tester = tester(Granularity::Bar, false);
        tester.press(&table, 100.0, 40.0, 0).unwrap();
        assert!(tester.move_to(&table, 101.5, 41.0).is_none());
        assert_eq!(tester.phase(), GesturePhase::Pressed);
    }

    #[test]
    fn test_sub_pixel_drift_is_not_a_drag() {
        let table = table(true);
        let mut tester = tester(Granularity::Bar, false);
        let press = tester.press(&table, 100.0, 40.0, 0).unwrap();
        assert_eq!(press.tick, 0);
        for dx in [0.3, 0.6, 0.9] {
            tester.move_to(&table, 100.0 + dx, 40.0);
        }
        let outcome = tester.release(&table, 100.9, 40.0).unwrap();
        assert!(!outcome.crossed);
        assert_eq!(outcome.release, press);
        assert_eq!(tester.phase(), GesturePhase::Idle);
    }

    #[test]
    fn test_crossing_is_remembered_after_returning() {
        let table = table(true);
        let mut tester = tester(Granularity::Bar, false);
        tester.press(&table, 100.0, 40.0, 0).unwrap();
        tester.move_to(&table, 300.0, 40.0).unwrap();
        assert_eq!(tester.phase(), GesturePhase::Dragging);
        tester.move_to(&table, 110.0, 40.0).unwrap();
        let outcome = tester.release(&table, 110.0, 40.0).unwrap();
        assert!(outcome.crossed);
        assert_eq!(outcome.release.bar, 0);
    }

    #[test]
    fn test_drag_inside_one_bar_at_beat_granularity() {
        let table = table(true);
        let mut tester = tester(Granularity::Beat, false);
        tester.press(&table, 10.0, 40.0, 0).unwrap();
        tester.move_to(&table, 160.0, 40.0).unwrap();
        let outcome = tester.release(&table, 160.0, 40.0).unwrap();
        assert!(outcome.crossed);
        assert_eq!(outcome.release.beat_index, Some(3));
    }

    #[test]
    fn test_cancel_drops_gesture() {
        let table = table(true);
        let mut tester = tester(Granularity::Bar, false);
        tester.press(&table, 100.0, 40.0, 0).unwrap();
        tester.cancel();
        assert_eq!(tester.phase(), GesturePhase::Idle);
        assert!(tester.release(&table, 100.0, 40.0).is_none());
    }
}
