//! # Timeline Expander
//!
//! Maps a structural bar (or a structural tick) to a concrete pass in the
//! expanded timeline, choosing the pass closest to a reference tick.
//!
//! ## Why a reference
//! Under repeats a structural bar has several expanded starts. The pass that
//! matters is the one nearest to where playback currently is; picking the
//! first pass (structural bias) would send a loop or a seek back to the first
//! time through the repeat.
//!
//! ## Cost
//! A linear scan over the passes of one bar. Pass counts are small, so
//! nothing is cached here.
//!
//! ## Example
//! ```rust
//! use score_cursor::layout::{OccurrenceTable, StaticLayout, Grid};
//! use score_cursor::{Score, StructuralBar, TimelineExpander};
//!
//! let score = Score {
//!     bars: (0..10).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect(),
//! };
//! let order = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9];
//! let layout = StaticLayout::with_grid(score, Some(order), Grid::default());
//! let table = OccurrenceTable::build(&layout).unwrap();
//!
//! let expander = TimelineExpander::new(&table);
//! assert_eq!(expander.nearest_start(5, 20000), Some(19200));
//! ```

use crate::layout::{BarOccurrence, OccurrenceTable};
use crate::types::{ExpandedTick, Tick};

pub struct TimelineExpander<'a> {
    table: &'a OccurrenceTable,
}

impl<'a> TimelineExpander<'a> {
    pub fn new(table: &'a OccurrenceTable) -> Self {
        Self { table }
    }

    /// Pass of `bar_index` whose start is closest to `reference`.
    /// Ties go to the pass scanned first. `None` if the bar never sounds.
    pub fn nearest(&self, bar_index: usize, reference: ExpandedTick) -> Option<&'a BarOccurrence> {
        nearest_by_start(self.table.occurrences_of(bar_index), reference)
    }

    pub fn nearest_start(&self, bar_index: usize, reference: ExpandedTick) -> Option<ExpandedTick> {
        self.nearest(bar_index, reference).map(|bar| bar.expanded_start)
    }

    /// Like [`nearest`](Self::nearest), restricted to the passes drawn by one
    /// visual bar. With an unrolled layout that is exactly one pass; with
    /// repeat signs several passes share the drawing and the reference picks.
    pub fn nearest_for_visual(
        &self,
        bar_index: usize,
        visual: usize,
        reference: ExpandedTick,
    ) -> Option<&'a BarOccurrence> {
        nearest_by_start(
            self.table
                .occurrences_of(bar_index)
                .filter(|bar| bar.visual == Some(visual)),
            reference,
        )
    }

    /// Expand a structural tick: find its structural bar, pick the nearest
    /// pass, and keep the offset within the bar.
    pub fn expand_tick(&self, tick: Tick, reference: ExpandedTick) -> Option<ExpandedTick> {
        let bar_index = self.table.score().bar_at(tick)?;
        let offset = tick - self.table.score().bars[bar_index].start;
        self.nearest_start(bar_index, reference).map(|start| start + offset)
    }
}

fn nearest_by_start<'a>(
    candidates: impl Iterator<Item = &'a BarOccurrence>,
    reference: ExpandedTick,
) -> Option<&'a BarOccurrence> {
    let mut best: Option<&BarOccurrence> = None;
    for bar in candidates {
        let closer = match best {
            Some(current) => (bar.expanded_start - reference).abs() < (current.expanded_start - reference).abs(),
            None => true,
        };
        if closer {
            best = Some(bar);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Grid, StaticLayout};
    use crate::score::{Score, StructuralBar};

    fn three_pass_table(unrolled: bool) -> OccurrenceTable {
        let score = Score {
            bars: (0..10).map(|i| StructuralBar::uniform(i * 1920, 4, 480)).collect(),
        };
        let order = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9, 5, 6, 7, 8, 9];
        let layout = StaticLayout::with_grid(score, Some(order), Grid { unrolled, ..Grid::default() });
        OccurrenceTable::build(&layout).unwrap()
    }

    #[test]
    fn test_bar_five_passes() {
        let table = three_pass_table(true);
        let starts: Vec<_> = table.occurrences_of(5).map(|b| b.expanded_start).collect();
        assert_eq!(starts, vec![9600, 19200, 28800]);
    }

    #[test]
    fn test_nearest_to_reference() {
        let table = three_pass_table(true);
        let expander = TimelineExpander::new(&table);
        assert_eq!(expander.nearest_start(5, 20000), Some(19200));
        assert_eq!(expander.nearest_start(5, 0), Some(9600));
        assert_eq!(expander.nearest_start(5, 100_000), Some(28800));
    }

    #[test]
    fn test_tie_goes_to_first_scanned() {
        let table = three_pass_table(true);
        let expander = TimelineExpander::new(&table);
        // 14400 is equidistant from 9600 and 19200
        assert_eq!(expander.nearest_start(5, 14400), Some(9600));
    }

    #[test]
    fn test_unknown_bar_is_unresolved() {
        let table = three_pass_table(true);
        assert_eq!(TimelineExpander::new(&table).nearest(42, 0), None);
    }

    #[test]
    fn test_nearest_for_visual_unrolled_is_exact() {
        let table = three_pass_table(true);
        let expander = TimelineExpander::new(&table);
        let second_drawing = table.visuals_of(5).nth(1).unwrap().slot;
        // Reference near the third pass still resolves to the pass that is drawn
        let bar = expander.nearest_for_visual(5, second_drawing, 28800).unwrap();
        assert_eq!(bar.expanded_start, 19200);
    }

    #[test]
    fn test_nearest_for_visual_folded_uses_reference() {
        let table = three_pass_table(false);
        let expander = TimelineExpander::new(&table);
        let only_drawing = table.visuals_of(5).next().unwrap().slot;
        let bar = expander.nearest_for_visual(5, only_drawing, 28000).unwrap();
        assert_eq!(bar.expanded_start, 28800);
    }

    #[test]
    fn test_expand_structural_tick() {
        let table = three_pass_table(true);
        let expander = TimelineExpander::new(&table);
        // Structural tick 9600 + 480 is beat 2 of bar 5
        assert_eq!(expander.expand_tick(10080, 20000), Some(19680));
        assert_eq!(expander.expand_tick(-5, 0), None);
    }
}
