//! # Structural Score
//!
//! The structural (first-pass) view of a score: bars with their beats and
//! repeat marks, as supplied by the score collaborator.
//!
//! ## Responsibilities
//! - Validate the structure (durations, beat placement, repeat and volta marks)
//! - Unroll repeats and volta endings into the playback order of bars
//! - Turn the playback order into the expansion table of expanded starts
//!
//! ## Repeats
//! - Simple repeats: `||: ... :||` plays the section twice
//! - Volta endings: the 1st ending plays on the first pass, the 2nd on the second
//! - A repeat end with no start replays from the beginning of the score
//!
//! ## Example
//! ```rust
//! use score_cursor::{Score, StructuralBar};
//!
//! let mut bars: Vec<StructuralBar> = (0..3)
//!     .map(|i| StructuralBar::uniform(i as i64 * 1920, 4, 480))
//!     .collect();
//! bars[1].repeat_start = true;
//! bars[1].repeat_end = true;
//! let score = Score { bars };
//!
//! assert!(score.validate().is_ok());
//! assert_eq!(score.playback_order(), vec![0, 1, 1, 2]);
//! assert_eq!(score.expansion()[2].expanded_start, 3840);
//! ```

use crate::error::CursorError;
use crate::types::{ExpandedTick, Tick};
use serde::{Deserialize, Serialize};

/// Volta bracket on a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ending {
    First,
    Second,
}

/// A beat inside a bar. `offset` is relative to the bar's structural start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralBeat {
    pub offset: Tick,
    pub duration: Tick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralBar {
    pub start: Tick,
    pub duration: Tick,
    #[serde(default)]
    pub beats: Vec<StructuralBeat>,
    #[serde(default)]
    pub repeat_start: bool, // ||: at the beginning of the bar
    #[serde(default)]
    pub repeat_end: bool, // :|| at the end of the bar
    #[serde(default)]
    pub ending: Option<Ending>,
}

impl StructuralBar {
    /// A bar of `beats` equal beats with no repeat marks.
    pub fn uniform(start: Tick, beats: usize, beat_duration: Tick) -> Self {
        Self {
            start,
            duration: beats as Tick * beat_duration,
            beats: (0..beats)
                .map(|i| StructuralBeat {
                    offset: i as Tick * beat_duration,
                    duration: beat_duration,
                })
                .collect(),
            repeat_start: false,
            repeat_end: false,
            ending: None,
        }
    }

    pub fn end(&self) -> Tick {
        self.start + self.duration
    }
}

/// One pass of one structural bar in the expanded timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionEntry {
    pub bar_index: usize,
    pub expanded_start: ExpandedTick,
    pub duration: Tick,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub bars: Vec<StructuralBar>,
}

impl Score {
    /// Validate a score for structural correctness
    ///
    /// Checks four rules:
    /// 1. Bars have positive durations and contiguous structural starts
    /// 2. Beats have positive durations, lie inside their bar and do not overlap
    /// 3. Repeat markers are properly matched
    /// 4. Endings are correctly structured
    pub fn validate(&self) -> Result<(), CursorError> {
        let mut expected_start: Option<Tick> = None;
        // Bar number of the open ||:
        let mut open_repeat: Option<usize> = None;
        let mut closed_any = false;

        for (i, bar) in self.bars.iter().enumerate() {
            let bar_number = i + 1;
            validate_bar(bar, i, expected_start)?;
            expected_start = Some(bar.end());

            if bar.repeat_start {
                if open_repeat.is_some() {
                    return Err(invalid(bar_number, "Repeat start (||:) inside a repeat that is still open"));
                }
                open_repeat = Some(bar_number);
            }
            if bar.repeat_end {
                // A bare :|| only returns to the top before any other repeat
                if open_repeat.is_none() && closed_any {
                    return Err(invalid(bar_number, "Repeat end (:||) has no repeat start (||:) to return to"));
                }
                open_repeat = None;
                closed_any = true;
            }

            match bar.ending {
                Some(Ending::First) if !bar.repeat_end => {
                    return Err(invalid(bar_number, "First ending (1.) has no repeat end (:||)"));
                }
                Some(Ending::Second) if bar.repeat_end => {
                    return Err(invalid(bar_number, "Second ending (2.) carries a repeat end (:||)"));
                }
                Some(Ending::Second) if i == 0 || self.bars[i - 1].ending != Some(Ending::First) => {
                    return Err(invalid(bar_number, "Second ending (2.) does not follow a first ending (1.)"));
                }
                _ => {}
            }
        }

        match open_repeat {
            Some(start_bar) => Err(invalid(start_bar, "Repeat start (||:) is never closed by a repeat end (:||)")),
            None => Ok(()),
        }
    }

    /// Structural bar indices in the order they sound, repeats unrolled.
    pub fn playback_order(&self) -> Vec<usize> {
        let bars = &self.bars;
        let mut sequence = Vec::new();
        let mut i = 0;

        // A leading :|| with no ||: before it repeats from the first bar
        let implicit_start = bars
            .iter()
            .find(|bar| bar.repeat_start || bar.repeat_end)
            .is_some_and(|bar| !bar.repeat_start);

        while i < bars.len() {
            if bars[i].repeat_start || (i == 0 && implicit_start) {
                let repeat_start_idx = i;
                let mut repeat_end_idx: Option<usize> = None;
                let mut first_ending_start: Option<usize> = None;
                let mut second_ending_start: Option<usize> = None;

                for (j, bar) in bars.iter().enumerate().skip(i) {
                    if bar.ending == Some(Ending::First) && first_ending_start.is_none() {
                        first_ending_start = Some(j);
                    }
                    if bar.repeat_end {
                        repeat_end_idx = Some(j);
                        if let Some(next) = bars.get(j + 1) {
                            if next.ending == Some(Ending::Second) {
                                second_ending_start = Some(j + 1);
                            }
                        }
                        break;
                    }
                }

                // Unclosed repeat plays straight through
                let repeat_end_idx = match repeat_end_idx {
                    Some(idx) => idx,
                    None => {
                        sequence.push(i);
                        i += 1;
                        continue;
                    }
                };

                // Main section is everything before the volta brackets
                let main_section_end = first_ending_start.unwrap_or(repeat_end_idx + 1);

                // First pass: main section plus first ending (if any)
                sequence.extend(repeat_start_idx..=repeat_end_idx);

                // Second pass: main section again, then the second ending
                sequence.extend(repeat_start_idx..main_section_end);
                if first_ending_start.is_none() {
                    i = repeat_end_idx + 1;
                } else if let Some(second_start) = second_ending_start {
                    let mut second_ending_end = second_start;
                    for (k, bar) in bars.iter().enumerate().skip(second_start + 1) {
                        if bar.repeat_start || bar.ending.is_some() {
                            break;
                        }
                        second_ending_end = k;
                    }
                    sequence.extend(second_start..=second_ending_end);
                    i = second_ending_end + 1;
                } else {
                    i = repeat_end_idx + 1;
                }
            } else {
                sequence.push(i);
                i += 1;
            }
        }

        sequence
    }

    /// Expansion table: one entry per sounding bar, expanded starts contiguous from 0.
    pub fn expansion(&self) -> Vec<ExpansionEntry> {
        expansion_from_order(self, &self.playback_order())
    }

    /// Structural bar containing a structural tick.
    pub fn bar_at(&self, tick: Tick) -> Option<usize> {
        let idx = self.bars.partition_point(|bar| bar.start <= tick);
        if idx == 0 {
            return None;
        }
        let bar = &self.bars[idx - 1];
        (tick < bar.end()).then_some(idx - 1)
    }
}

/// Expansion table for an explicit playback order (e.g. D.S./D.C. forms the
/// repeat marks cannot express).
pub fn expansion_from_order(score: &Score, order: &[usize]) -> Vec<ExpansionEntry> {
    let mut expanded_start: ExpandedTick = 0;
    order
        .iter()
        .filter_map(|&bar_index| {
            let bar = score.bars.get(bar_index)?;
            let entry = ExpansionEntry {
                bar_index,
                expanded_start,
                duration: bar.duration,
            };
            expanded_start += bar.duration;
            Some(entry)
        })
        .collect()
}

fn invalid(bar: usize, message: &str) -> CursorError {
    CursorError::InvalidScore {
        bar,
        message: message.to_string(),
    }
}

fn validate_bar(bar: &StructuralBar, index: usize, expected_start: Option<Tick>) -> Result<(), CursorError> {
    let bar_number = index + 1;

    if bar.duration <= 0 {
        return Err(CursorError::InvalidScore {
            bar: bar_number,
            message: format!("Bar duration must be positive, got {}", bar.duration),
        });
    }
    if let Some(expected) = expected_start {
        if bar.start != expected {
            return Err(CursorError::InvalidScore {
                bar: bar_number,
                message: format!("Bar starts at tick {} but the previous bar ends at {}", bar.start, expected),
            });
        }
    }

    let mut previous_end: Tick = 0;
    for (beat_index, beat) in bar.beats.iter().enumerate() {
        if beat.duration <= 0 {
            return Err(CursorError::MalformedBeat {
                bar_index: index,
                beat_index,
                duration: beat.duration,
            });
        }
        if beat.offset < previous_end {
            return Err(CursorError::InvalidScore {
                bar: bar_number,
                message: format!("Beat {} overlaps the previous beat", beat_index + 1),
            });
        }
        if beat.offset + beat.duration > bar.duration {
            return Err(CursorError::InvalidScore {
                bar: bar_number,
                message: format!(
                    "Beat {} ends at offset {} past the bar duration {}",
                    beat_index + 1,
                    beat.offset + beat.duration,
                    bar.duration
                ),
            });
        }
        previous_end = beat.offset + beat.duration;
    }

    Ok(())
}
