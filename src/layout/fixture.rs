//! Static layout fixture
//!
//! A [`ScoreRenderer`] backed by plain data: a structural score, an optional
//! explicit playback order, and visual bar geometry either listed by hand or
//! generated on a regular grid. Loadable from YAML:
//!
//! ```yaml
//! score:
//!   bars:
//!     - { start: 0, duration: 1920, beats: [{ offset: 0, duration: 960 }, { offset: 960, duration: 960 }] }
//!     - { start: 1920, duration: 1920, repeat_start: true, repeat_end: true,
//!         beats: [{ offset: 0, duration: 1920 }] }
//! grid:
//!   bar-width: 240
//!   bars-per-row: 4
//! ```

use super::{RawBarGeometry, RawBeatGeometry, ScoreRenderer};
use crate::error::CursorError;
use crate::score::{expansion_from_order, ExpansionEntry, Score};
use crate::types::Rect;
use serde::{Deserialize, Serialize};

/// Side of the square note head the grid draws at the start of each beat.
const NOTE_HEAD_SIZE: f64 = 8.0;

/// Regular bar grid, laid out left to right in rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Grid {
    pub left: f64,
    pub top: f64,
    pub bar_width: f64,
    pub row_height: f64,
    pub row_gap: f64,
    pub bars_per_row: usize,
    /// Draw every repeat pass (true) or each structural bar once (false)
    pub unrolled: bool,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            bar_width: 200.0,
            row_height: 80.0,
            row_gap: 20.0,
            bars_per_row: 4,
            unrolled: true,
        }
    }
}

impl Grid {
    /// Rectangle of the visual bar at `position` in layout order.
    pub fn bar_rect(&self, position: usize) -> Rect {
        let per_row = self.bars_per_row.max(1);
        let row = (position / per_row) as f64;
        let col = (position % per_row) as f64;
        Rect::new(
            self.left + col * self.bar_width,
            self.top + row * (self.row_height + self.row_gap),
            self.bar_width,
            self.row_height,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticLayout {
    pub score: Score,
    /// Explicit playback order; derived from the repeat marks when absent
    #[serde(default)]
    pub playback_order: Option<Vec<usize>>,
    #[serde(default)]
    pub visual_bars: Vec<RawBarGeometry>,
}

#[derive(Deserialize)]
struct FixtureFile {
    score: Score,
    #[serde(default)]
    playback_order: Option<Vec<usize>>,
    #[serde(default)]
    visual_bars: Vec<RawBarGeometry>,
    #[serde(default)]
    grid: Option<Grid>,
}

impl StaticLayout {
    /// Lay the score out on a grid.
    pub fn with_grid(score: Score, playback_order: Option<Vec<usize>>, grid: Grid) -> Self {
        let drawn: Vec<usize> = if grid.unrolled {
            playback_order.clone().unwrap_or_else(|| score.playback_order())
        } else {
            (0..score.bars.len()).collect()
        };

        let visual_bars = drawn
            .iter()
            .enumerate()
            .filter_map(|(position, &bar_index)| {
                let bar = score.bars.get(bar_index)?;
                let rect = grid.bar_rect(position);
                let beats = bar
                    .beats
                    .iter()
                    .map(|beat| {
                        let x = rect.x + rect.width * beat.offset as f64 / bar.duration as f64;
                        let width = rect.width * beat.duration as f64 / bar.duration as f64;
                        RawBeatGeometry {
                            rect: Some(Rect::new(x, rect.y, width, rect.height)),
                            anchor_x: None,
                            note_heads: vec![Rect::new(
                                x + NOTE_HEAD_SIZE / 2.0,
                                rect.center_y() - NOTE_HEAD_SIZE / 2.0,
                                NOTE_HEAD_SIZE,
                                NOTE_HEAD_SIZE,
                            )],
                        }
                    })
                    .collect();
                Some(RawBarGeometry {
                    bar_index,
                    rect: Some(rect),
                    beats,
                })
            })
            .collect();

        Self {
            score,
            playback_order,
            visual_bars,
        }
    }

    /// Parse and validate a YAML fixture. Visual bars listed explicitly win
    /// over a `grid` section.
    pub fn from_yaml(content: &str) -> Result<Self, CursorError> {
        let file: FixtureFile =
            serde_yaml::from_str(content).map_err(|e| CursorError::FixtureError(e.to_string()))?;
        file.score.validate()?;

        if let Some(order) = &file.playback_order {
            if let Some(&bad) = order.iter().find(|&&i| i >= file.score.bars.len()) {
                return Err(CursorError::FixtureError(format!(
                    "playback_order references bar {} but the score has {} bars",
                    bad,
                    file.score.bars.len()
                )));
            }
        }

        if file.visual_bars.is_empty() {
            let grid = file.grid.unwrap_or_default();
            return Ok(Self::with_grid(file.score, file.playback_order, grid));
        }

        Ok(Self {
            score: file.score,
            playback_order: file.playback_order,
            visual_bars: file.visual_bars,
        })
    }
}

impl ScoreRenderer for StaticLayout {
    fn structure(&self) -> &Score {
        &self.score
    }

    fn expansion(&self) -> Vec<ExpansionEntry> {
        match &self.playback_order {
            Some(order) => expansion_from_order(&self.score, order),
            None => self.score.expansion(),
        }
    }

    fn visual_bar_count(&self) -> usize {
        self.visual_bars.len()
    }

    fn visual_bar(&self, position: usize) -> Option<RawBarGeometry> {
        self.visual_bars.get(position).cloned()
    }
}
