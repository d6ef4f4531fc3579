//! Occurrence table
//!
//! Built once per layout pass from a [`ScoreRenderer`]. Bar and beat
//! occurrences are stored in playback order, so "the beat after this one"
//! is an index step rather than a search, and `(bar index, occurrence
//! number)` lookups are O(1) instead of a rescan with an ad hoc counter.
//!
//! Occurrence objects are only valid for the layout pass that built them.

use super::{BeatGeometry, ScoreRenderer, VisualBar};
use crate::error::CursorError;
use crate::score::Score;
use crate::types::{BeatId, ExpandedTick, Rect, Tick};
use std::collections::HashMap;
use std::ops::Range;

/// One pass of a structural bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOccurrence {
    pub id: usize,
    pub bar_index: usize,
    /// 0 for the first pass, 1 for the second, ...
    pub occurrence: usize,
    pub expanded_start: ExpandedTick,
    pub duration: Tick,
    /// Visual bar that draws this pass
    pub visual: Option<usize>,
    /// Beat occurrence ids, in playback order
    pub beats: Range<usize>,
}

impl BarOccurrence {
    pub fn end(&self) -> ExpandedTick {
        self.expanded_start + self.duration
    }

    pub fn contains(&self, tick: ExpandedTick) -> bool {
        tick >= self.expanded_start && tick < self.end()
    }
}

/// One pass of a structural beat.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatOccurrence {
    pub id: usize,
    /// Owning bar occurrence id
    pub bar: usize,
    /// Position of the beat within its structural bar
    pub beat_index: usize,
    pub beat_id: BeatId,
    pub expanded_start: ExpandedTick,
    pub duration: Tick,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl BeatOccurrence {
    pub fn end(&self) -> ExpandedTick {
        self.expanded_start + self.duration
    }

    pub fn contains(&self, tick: ExpandedTick) -> bool {
        tick >= self.expanded_start && tick < self.end()
    }
}

#[derive(Debug, Clone)]
pub struct OccurrenceTable {
    score: Score,
    bars: Vec<BarOccurrence>,
    beats: Vec<BeatOccurrence>,
    visuals: Vec<VisualBar>,
    /// bar index -> bar occurrence ids, by occurrence number
    by_bar: HashMap<usize, Vec<usize>>,
    /// bar index -> visual slots, by ordinal
    visuals_by_bar: HashMap<usize, Vec<usize>>,
}

impl OccurrenceTable {
    /// Snapshot the renderer's current layout.
    ///
    /// Fails only if the expansion table is inconsistent with the structure;
    /// missing geometry is recorded as `None` and reported later, per event.
    pub fn build(renderer: &dyn ScoreRenderer) -> Result<Self, CursorError> {
        let score = renderer.structure().clone();

        let mut visuals = Vec::new();
        let mut visuals_by_bar: HashMap<usize, Vec<usize>> = HashMap::new();
        for position in 0..renderer.visual_bar_count() {
            let Some(raw) = renderer.visual_bar(position) else {
                continue;
            };
            if raw.bar_index >= score.bars.len() {
                log::warn!(target: "cursor::layout", "visual bar {} draws unknown bar {}", position, raw.bar_index);
                continue;
            }
            let slot = visuals.len();
            let positions = visuals_by_bar.entry(raw.bar_index).or_default();
            visuals.push(raw.normalize(slot, position, positions.len()));
            positions.push(slot);
        }

        let mut bars = Vec::new();
        let mut beats: Vec<BeatOccurrence> = Vec::new();
        let mut by_bar: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut previous_end: Option<ExpandedTick> = None;

        for entry in renderer.expansion() {
            let structural = score.bars.get(entry.bar_index).ok_or_else(|| CursorError::InvalidScore {
                bar: entry.bar_index + 1,
                message: "Expansion table references a bar the score does not have".to_string(),
            })?;
            if entry.duration <= 0 {
                return Err(CursorError::InvalidScore {
                    bar: entry.bar_index + 1,
                    message: format!("Expanded bar at tick {} has duration {}", entry.expanded_start, entry.duration),
                });
            }
            if let Some(end) = previous_end {
                if entry.expanded_start < end {
                    return Err(CursorError::InvalidScore {
                        bar: entry.bar_index + 1,
                        message: format!("Expanded bar at tick {} overlaps the previous pass ending at {}", entry.expanded_start, end),
                    });
                }
            }
            previous_end = Some(entry.expanded_start + entry.duration);

            let id = bars.len();
            let passes = by_bar.entry(entry.bar_index).or_default();
            let occurrence = passes.len();
            passes.push(id);

            let visual = visuals_by_bar
                .get(&entry.bar_index)
                .and_then(|positions| positions.get(occurrence.min(positions.len() - 1)).copied());

            let first_beat = beats.len();
            for (beat_index, beat) in structural.beats.iter().enumerate() {
                beats.push(BeatOccurrence {
                    id: beats.len(),
                    bar: id,
                    beat_index,
                    beat_id: BeatId {
                        bar_index: entry.bar_index,
                        structural_start: structural.start + beat.offset,
                    },
                    expanded_start: entry.expanded_start + beat.offset,
                    duration: beat.duration,
                    prev: None,
                    next: None,
                });
            }

            bars.push(BarOccurrence {
                id,
                bar_index: entry.bar_index,
                occurrence,
                expanded_start: entry.expanded_start,
                duration: entry.duration,
                visual,
                beats: first_beat..beats.len(),
            });
        }

        let count = beats.len();
        for (i, beat) in beats.iter_mut().enumerate() {
            beat.prev = i.checked_sub(1);
            beat.next = (i + 1 < count).then_some(i + 1);
        }

        log::debug!(
            target: "cursor::layout",
            "occurrence table: {} bar passes, {} beat passes, {} visual bars",
            bars.len(),
            beats.len(),
            visuals.len()
        );

        Ok(Self {
            score,
            bars,
            beats,
            visuals,
            by_bar,
            visuals_by_bar,
        })
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn bars(&self) -> &[BarOccurrence] {
        &self.bars
    }

    pub fn bar(&self, id: usize) -> Option<&BarOccurrence> {
        self.bars.get(id)
    }

    pub fn beat(&self, id: usize) -> Option<&BeatOccurrence> {
        self.beats.get(id)
    }

    pub fn beats_of(&self, bar: &BarOccurrence) -> &[BeatOccurrence] {
        &self.beats[bar.beats.clone()]
    }

    pub fn visuals(&self) -> &[VisualBar] {
        &self.visuals
    }

    pub fn visual(&self, slot: usize) -> Option<&VisualBar> {
        self.visuals.get(slot)
    }

    /// End of the expanded timeline.
    pub fn end(&self) -> ExpandedTick {
        self.bars.last().map(BarOccurrence::end).unwrap_or(0)
    }

    /// Pass `occurrence` of structural bar `bar_index`.
    pub fn occurrence(&self, bar_index: usize, occurrence: usize) -> Option<&BarOccurrence> {
        let id = *self.by_bar.get(&bar_index)?.get(occurrence)?;
        self.bars.get(id)
    }

    /// Every pass of a structural bar, in playback order.
    pub fn occurrences_of(&self, bar_index: usize) -> impl Iterator<Item = &BarOccurrence> {
        self.by_bar
            .get(&bar_index)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.bars.get(id))
    }

    /// Visual bars drawing a structural bar, by ordinal.
    pub fn visuals_of(&self, bar_index: usize) -> impl Iterator<Item = &VisualBar> {
        self.visuals_by_bar
            .get(&bar_index)
            .into_iter()
            .flatten()
            .filter_map(move |&slot| self.visuals.get(slot))
    }

    /// Bar occurrence whose `[start, start + duration)` contains the tick.
    pub fn bar_at(&self, tick: ExpandedTick) -> Option<&BarOccurrence> {
        let idx = self.bars.partition_point(|bar| bar.expanded_start <= tick);
        let bar = self.bars.get(idx.checked_sub(1)?)?;
        bar.contains(tick).then_some(bar)
    }

    /// Screen rectangle of a bar occurrence.
    pub fn bar_rect(&self, bar: &BarOccurrence) -> Result<Rect, CursorError> {
        bar.visual
            .and_then(|slot| self.visuals.get(slot))
            .and_then(|visual| visual.rect)
            .ok_or(CursorError::GeometryUnavailable {
                bar_index: bar.bar_index,
                occurrence: bar.occurrence,
            })
    }

    /// Normalized geometry of a beat occurrence.
    pub fn beat_geometry(&self, beat: &BeatOccurrence) -> Option<BeatGeometry> {
        let bar = self.bars.get(beat.bar)?;
        let visual = self.visuals.get(bar.visual?)?;
        visual.beats.get(beat.beat_index).copied()
    }

    /// Note-anchor X of a beat occurrence.
    pub fn beat_anchor(&self, beat: &BeatOccurrence) -> Result<f64, CursorError> {
        self.beat_geometry(beat)
            .and_then(|geometry| geometry.anchor_x)
            .ok_or_else(|| {
                let (bar_index, occurrence) = self
                    .bars
                    .get(beat.bar)
                    .map(|bar| (bar.bar_index, bar.occurrence))
                    .unwrap_or((beat.beat_id.bar_index, 0));
                CursorError::GeometryUnavailable { bar_index, occurrence }
            })
    }
}
