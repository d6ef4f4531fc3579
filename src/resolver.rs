//! # Beat Resolver
//!
//! Maps an expanded tick to the beat occurrence that owns it, and keeps the
//! result cached across clock events.
//!
//! ## Resolution
//! 1. Find the bar occurrence whose `[start, start + duration)` contains the tick
//! 2. Walk that bar's beats in playback order for the one containing the tick
//!
//! A structural fallback ([`BeatResolver::resolve_structural`]) reads the tick
//! as a structural tick and answers with the first pass of that beat. It is
//! repeat-unsafe and only used for an initial snap when exact resolution
//! misses. A snap is held, re-checked on every event, until exact resolution
//! succeeds; a miss while tracking an exact beat is an error.
//!
//! ## Gating
//! [`BeatTracker::update`] runs on every clock event, so full resolution (and
//! the bounded boundary scans that come with it) only happens when the cached
//! beat no longer contains the tick or the clock jumped. Everything else is a
//! range check on the cached beat.
//!
//! ## Boundary Scans
//! On re-resolution the tracker probes tick by tick:
//! - backward (bounded) until the beat identity changes; the last tick with
//!   the same identity is the frozen beat start
//! - forward (bounded) to the next beat occurrence; `None` means the beat is
//!   the last one in its bar

use crate::config::FollowConfig;
use crate::error::CursorError;
use crate::layout::{BeatOccurrence, OccurrenceTable};
use crate::timeline::TimelineExpander;
use crate::types::{BeatId, ExpandedTick, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub backward: Tick,
    pub forward: Tick,
}

/// Result of the boundary scans from one entry tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatBoundaries {
    /// Frozen expanded start of the beat
    pub start: ExpandedTick,
    /// Next beat occurrence in the same bar occurrence
    pub next: Option<usize>,
    /// Resolver calls the scans made
    pub probes: u64,
}

pub struct BeatResolver<'a> {
    table: &'a OccurrenceTable,
}

impl<'a> BeatResolver<'a> {
    pub fn new(table: &'a OccurrenceTable) -> Self {
        Self { table }
    }

    /// Occurrence-exact resolution.
    pub fn resolve(&self, tick: ExpandedTick) -> Option<&'a BeatOccurrence> {
        let bar = self.table.bar_at(tick)?;
        self.table.beats_of(bar).iter().find(|beat| beat.contains(tick))
    }

    /// First-pass beat for a structural tick. Ignores which repeat pass is
    /// playing.
    pub fn resolve_structural(&self, tick: Tick) -> Option<&'a BeatOccurrence> {
        // Nearest to tick 0 is always the first pass
        let target = TimelineExpander::new(self.table).expand_tick(tick, 0)?;
        let bar = self.table.bar_at(target)?;
        self.table.beats_of(bar).iter().find(|beat| beat.contains(target))
    }

    /// Probe around `entry` for the beat's start and its successor.
    ///
    /// Pure in its inputs: scanning twice from the same tick gives the same
    /// answer. `None` if `entry` itself does not resolve.
    pub fn scan_boundaries(&self, entry: ExpandedTick, limits: ScanLimits) -> Option<BeatBoundaries> {
        let beat = self.resolve(entry)?;
        let mut probes = 0u64;

        let mut start = entry;
        let mut exhausted = true;
        for step in 1..=limits.backward {
            probes += 1;
            match self.resolve(entry - step) {
                Some(b) if b.beat_id == beat.beat_id && b.bar == beat.bar => start = entry - step,
                _ => {
                    exhausted = false;
                    break;
                }
            }
        }
        if exhausted && start > beat.expanded_start {
            log::debug!(
                target: "cursor::resolver",
                "backward scan hit its bound at {}, using occurrence start {}",
                start,
                beat.expanded_start
            );
            start = beat.expanded_start;
        }

        let mut next = None;
        for step in 1..=limits.forward {
            probes += 1;
            let tick = entry + step;
            match self.resolve(tick) {
                Some(b) if b.beat_id == beat.beat_id && b.bar == beat.bar => continue,
                Some(b) => {
                    if b.bar == beat.bar {
                        next = Some(b.id);
                    }
                    break;
                }
                // Gap inside the bar (no beat drawn there): keep walking
                None if self.table.bar_at(tick).is_some_and(|bar| bar.id == beat.bar) => continue,
                None => break,
            }
        }

        Some(BeatBoundaries { start, next, probes })
    }
}

/// Cached beat state handed to the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedBeat {
    /// Beat occurrence id
    pub beat: usize,
    /// Bar occurrence id
    pub bar: usize,
    pub id: BeatId,
    pub start: ExpandedTick,
    pub duration: Tick,
    pub next: Option<usize>,
    /// False when produced by the structural fallback
    pub exact: bool,
}

impl ResolvedBeat {
    pub fn contains(&self, tick: ExpandedTick) -> bool {
        tick >= self.start && tick < self.start + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatUpdate {
    pub beat: ResolvedBeat,
    /// The beat changed since the previous event
    pub entered: bool,
    /// The clock jumped and all cached state was dropped first
    pub discontinuity: bool,
}

/// Gated, cached beat resolution for a stream of clock events.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    current: Option<ResolvedBeat>,
    last_tick: Option<ExpandedTick>,
    limits: ScanLimits,
    discontinuity_threshold: Tick,
    miss_logged: bool,
    resolutions: u64,
    probes: u64,
}

impl BeatTracker {
    pub fn new(config: &FollowConfig) -> Self {
        Self {
            current: None,
            last_tick: None,
            limits: ScanLimits {
                backward: config.backward_scan_limit,
                forward: config.forward_scan_limit,
            },
            discontinuity_threshold: config.discontinuity_threshold,
            miss_logged: false,
            resolutions: 0,
            probes: 0,
        }
    }

    pub fn current(&self) -> Option<&ResolvedBeat> {
        self.current.as_ref()
    }

    /// Number of full (ungated) resolutions so far.
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }

    /// Resolver calls made by boundary scans so far.
    pub fn probes(&self) -> u64 {
        self.probes
    }

    /// Drop cached state; the next event re-resolves from scratch.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_tick = None;
    }

    /// A new layout pass: cached occurrence ids are meaningless now.
    pub fn invalidate(&mut self) {
        self.reset();
        self.miss_logged = false;
    }

    fn check_continuity(&self, tick: ExpandedTick) -> Result<(), CursorError> {
        match self.last_tick {
            Some(last) if (tick - last).abs() > self.discontinuity_threshold => {
                Err(CursorError::DiscontinuityDetected { from: last, to: tick })
            }
            _ => Ok(()),
        }
    }

    pub fn update(&mut self, table: &OccurrenceTable, tick: ExpandedTick) -> Result<BeatUpdate, CursorError> {
        let mut discontinuity = false;
        if let Err(jump) = self.check_continuity(tick) {
            log::debug!(target: "cursor::resolver", "{}, resetting beat state", jump);
            self.current = None;
            discontinuity = true;
        }
        self.last_tick = Some(tick);

        if let Some(current) = self.current {
            if current.exact && current.contains(tick) {
                return Ok(BeatUpdate {
                    beat: current,
                    entered: false,
                    discontinuity,
                });
            }
        }

        let previous = self.current.take();
        let fallback = previous.map_or(true, |p| !p.exact);
        let resolved = self.resolve(table, tick, fallback)?;
        self.current = Some(resolved);
        Ok(BeatUpdate {
            beat: resolved,
            entered: previous.map_or(true, |p| p.id != resolved.id || p.beat != resolved.beat),
            discontinuity,
        })
    }

    fn resolve(&mut self, table: &OccurrenceTable, tick: ExpandedTick, fallback: bool) -> Result<ResolvedBeat, CursorError> {
        self.resolutions += 1;
        let resolver = BeatResolver::new(table);

        if let Some(bounds) = resolver.scan_boundaries(tick, self.limits) {
            self.probes += bounds.probes;
            let beat = resolver.resolve(tick).ok_or(CursorError::OccurrenceResolutionMiss { tick })?;
            return Ok(ResolvedBeat {
                beat: beat.id,
                bar: beat.bar,
                id: beat.beat_id,
                start: bounds.start,
                duration: beat.duration,
                next: bounds.next,
                exact: true,
            });
        }

        let miss = CursorError::OccurrenceResolutionMiss { tick };
        if !self.miss_logged {
            log::warn!(target: "cursor::resolver", "{}, falling back to structural lookup", miss);
            self.miss_logged = true;
        }
        if !fallback {
            return Err(miss);
        }

        let beat = resolver.resolve_structural(tick).ok_or(miss)?;
        let next = beat
            .next
            .and_then(|id| table.beat(id))
            .filter(|next| next.bar == beat.bar)
            .map(|next| next.id);
        Ok(ResolvedBeat {
            beat: beat.id,
            bar: beat.bar,
            id: beat.beat_id,
            start: beat.expanded_start,
            duration: beat.duration,
            next,
            exact: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Grid, StaticLayout};
    use crate::score::{Score, StructuralBar, StructuralBeat};

    fn table_with_order(bars: Vec<StructuralBar>, order: Option<Vec<usize>>) -> OccurrenceTable {
        let layout = StaticLayout::with_grid(Score { bars }, order, Grid::default());
        OccurrenceTable::build(&layout).unwrap()
    }

    fn three_pass_table() -> OccurrenceTable {
        let bars = (0..10).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect();
        let order = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9];
        table_with_order(bars, Some(order))
    }

    #[test]
    fn test_resolve_covers_beat_range_exactly() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        for beat in table.beats_of(table.occurrence(5, 1).unwrap()) {
            for tick in beat.expanded_start..beat.end() {
                assert_eq!(resolver.resolve(tick).map(|b| b.id), Some(beat.id));
            }
            assert_ne!(resolver.resolve(beat.end()).map(|b| b.id), Some(beat.id));
            assert_ne!(resolver.resolve(beat.expanded_start - 1).map(|b| b.id), Some(beat.id));
        }
    }

    #[test]
    fn test_resolve_outside_timeline() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        assert!(resolver.resolve(-1).is_none());
        assert!(resolver.resolve(table.end()).is_none());
    }

    #[test]
    fn test_structural_fallback_has_structural_bias() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        // Structural tick of bar 5 beat 2 always lands on the first pass
        let beat = resolver.resolve_structural(9600 + 480).unwrap();
        assert_eq!(beat.expanded_start, 9600 + 480);
        assert_eq!(table.bar(beat.bar).unwrap().occurrence, 0);
    }

    #[test]
    fn test_scan_finds_start_and_next() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        let limits = ScanLimits { backward: 2000, forward: 4000 };

        let bounds = resolver.scan_boundaries(19200 + 700, limits).unwrap();
        assert_eq!(bounds.start, 19200 + 480);
        let next = table.beat(bounds.next.unwrap()).unwrap();
        assert_eq!(next.expanded_start, 19200 + 960);
    }

    #[test]
    fn test_scan_last_beat_in_bar_has_no_next() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        let limits = ScanLimits { backward: 2000, forward: 4000 };
        let bounds = resolver.scan_boundaries(19200 + 1500, limits).unwrap();
        assert_eq!(bounds.start, 19200 + 1440);
        assert_eq!(bounds.next, None);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let table = three_pass_table();
        let resolver = BeatResolver::new(&table);
        let limits = ScanLimits { backward: 2000, forward: 4000 };
        let first = resolver.scan_boundaries(28800 + 1000, limits);
        let second = resolver.scan_boundaries(28800 + 1000, limits);
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_bound_falls_back_to_occurrence_start() {
        // One whole-bar beat, longer than the backward bound
        let bars = vec![StructuralBar::uniform(0, 1, 3840)];
        let table = table_with_order(bars, None);
        let resolver = BeatResolver::new(&table);
        let bounds = resolver
            .scan_boundaries(3000, ScanLimits { backward: 2000, forward: 4000 })
            .unwrap();
        assert_eq!(bounds.start, 0);
        assert_eq!(bounds.next, None);
    }

    #[test]
    fn test_scan_walks_over_gaps_inside_a_bar() {
        // Beats at 0 and 1440, nothing drawn in between
        let bar = StructuralBar {
            start: 0,
            duration: 1920,
            beats: vec![
                StructuralBeat { offset: 0, duration: 480 },
                StructuralBeat { offset: 1440, duration: 480 },
            ],
            repeat_start: false,
            repeat_end: false,
            ending: None,
        };
        let table = table_with_order(vec![bar], None);
        let bounds = BeatResolver::new(&table)
            .scan_boundaries(100, ScanLimits { backward: 2000, forward: 4000 })
            .unwrap();
        assert_eq!(table.beat(bounds.next.unwrap()).unwrap().expanded_start, 1440);
    }

    #[test]
    fn test_tracker_gates_scans_within_a_beat() {
        let table = three_pass_table();
        let mut tracker = BeatTracker::new(&FollowConfig::default());

        let first = tracker.update(&table, 19200).unwrap();
        assert!(first.entered);
        let resolutions = tracker.resolutions();
        let probes = tracker.probes();

        for tick in (19200..19680).step_by(16) {
            let update = tracker.update(&table, tick).unwrap();
            assert!(!update.entered);
            assert_eq!(update.beat.beat, first.beat.beat);
        }
        assert_eq!(tracker.resolutions(), resolutions);
        assert_eq!(tracker.probes(), probes);

        let second = tracker.update(&table, 19680).unwrap();
        assert!(second.entered);
        assert_eq!(tracker.resolutions(), resolutions + 1);
    }

    #[test]
    fn test_tracker_distinguishes_repeat_passes() {
        let table = three_pass_table();
        let mut tracker = BeatTracker::new(&FollowConfig::default());
        let update = tracker.update(&table, 19200 + 10).unwrap();
        assert_eq!(update.beat.start, 19200);
        assert_eq!(table.bar(update.beat.bar).unwrap().occurrence, 1);
    }

    #[test]
    fn test_tracker_detects_discontinuity() {
        let table = three_pass_table();
        let mut tracker = BeatTracker::new(&FollowConfig::default());
        tracker.update(&table, 19200).unwrap();
        tracker.update(&table, 19300).unwrap();

        let jump = tracker.update(&table, 9600 + 100).unwrap();
        assert!(jump.discontinuity);
        assert!(jump.entered);
        assert_eq!(jump.beat.start, 9600);
    }

    #[test]
    fn test_tracker_miss_while_tracking_is_an_error() {
        let table = three_pass_table();
        let mut tracker = BeatTracker::new(&FollowConfig::default());
        tracker.update(&table, table.end() - 100).unwrap();
        let result = tracker.update(&table, table.end() + 10);
        assert_eq!(result, Err(CursorError::OccurrenceResolutionMiss { tick: table.end() + 10 }));
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_tracker_initial_snap_uses_structural_fallback() {
        let bars = vec![StructuralBar::uniform(0, 4, 480), StructuralBar::uniform(1920, 4, 480)];
        // Expansion only covers bar 1, placed at expanded tick 0
        let table = table_with_order(bars, Some(vec![1]));
        let mut tracker = BeatTracker::new(&FollowConfig::default());

        let snap = tracker.update(&table, 1920 + 10).unwrap();
        assert!(!snap.beat.exact);
        assert_eq!(snap.beat.id.bar_index, 1);
        assert_eq!(snap.beat.start, 0);

        // Outside both timelines there is nothing to fall back to
        tracker.reset();
        assert!(tracker.update(&table, 10_000).is_err());
    }

    #[test]
    fn test_tracker_holds_structural_snap_through_misses() {
        let bars = vec![StructuralBar::uniform(0, 4, 480), StructuralBar::uniform(1920, 4, 480)];
        let table = table_with_order(bars, Some(vec![1]));
        let mut tracker = BeatTracker::new(&FollowConfig::default());

        let first = tracker.update(&table, 1920).unwrap();
        assert!(first.entered);
        for tick in (1936..=2000).step_by(16) {
            let update = tracker.update(&table, tick).unwrap();
            assert!(!update.beat.exact);
            assert!(!update.entered, "re-entered at {}", tick);
            assert_eq!(update.beat.beat, first.beat.beat);
        }

        // Exact resolution takes over as soon as it succeeds
        let exact = tracker.update(&table, 600).unwrap();
        assert!(exact.beat.exact);
        assert!(exact.entered);
        assert_eq!(exact.beat.start, 480);
    }
}
